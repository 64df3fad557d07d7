//! S3-compatible back-end. Containers are buckets; object headers travel as
//! user metadata, each value encoded as `type|value`.
//!
//! The SDK is async; the jukebox is not. Each call is driven to completion on
//! a small runtime owned by the store.

use super::{check_name, PropertySet};
use crate::config::Credentials;
use crate::error::JukeboxError;
use anyhow::{Context, Result};
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials as AwsCredentials;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tokio::runtime::Runtime;

const DEFAULT_REGION: &str = "us-east-1";

pub struct S3Storage {
    runtime: Runtime,
    access_key: String,
    secret_key: String,
    endpoint_url: Option<String>,
    region: String,
    client: Option<Client>,
}

impl S3Storage {
    /// Read `access_key`, `secret_key`, `endpoint_url` and `region` from the
    /// credentials.
    ///
    /// # Errors
    ///
    /// [`JukeboxError::StoreUnavailable`] when either key is missing.
    pub fn new(creds: &Credentials) -> Result<Self> {
        let access_key = creds.get("access_key").unwrap_or_default().to_string();
        let secret_key = creds.get("secret_key").unwrap_or_default().to_string();
        if access_key.is_empty() || secret_key.is_empty() {
            return Err(JukeboxError::StoreUnavailable(
                "s3 credentials need access_key and secret_key".to_string(),
            )
            .into());
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .context("Failed to start runtime for S3 client")?;

        Ok(Self {
            runtime,
            access_key,
            secret_key,
            endpoint_url: creds.get("endpoint_url").map(str::to_string),
            region: creds.get("region").unwrap_or(DEFAULT_REGION).to_string(),
            client: None,
        })
    }

    fn client(&self) -> Result<&Client> {
        self.client.as_ref().ok_or_else(|| {
            JukeboxError::StoreUnavailable("s3 storage used before enter".to_string()).into()
        })
    }

    /// Build the client and check the credentials by listing buckets.
    pub fn enter(&mut self) -> Result<()> {
        let credentials =
            AwsCredentials::new(&self.access_key, &self.secret_key, None, None, "jukebox-creds");
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(self.region.clone()))
            .credentials_provider(credentials);
        if let Some(endpoint) = &self.endpoint_url {
            let endpoint = endpoint.trim_end_matches('/').to_string();
            info!("Using S3 endpoint {endpoint}");
            loader = loader.endpoint_url(endpoint);
        }

        let client = self.runtime.block_on(async move {
            let sdk_config = loader.load().await;
            let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
                .force_path_style(true)
                .build();
            Client::from_conf(s3_config)
        });

        self.runtime
            .block_on(client.list_buckets().send())
            .map_err(|e| JukeboxError::StoreUnavailable(format!("s3 authentication failed: {e}")))?;

        self.client = Some(client);
        Ok(())
    }

    pub fn exit(&self) {
        debug!("Leaving S3 storage");
    }

    pub fn has_container(&self, name: &str) -> Result<bool> {
        check_name(name)?;
        let client = self.client()?;
        match self.runtime.block_on(client.head_bucket().bucket(name).send()) {
            Ok(_) => Ok(true),
            Err(err) => match err.as_service_error() {
                Some(service_err) if service_err.is_not_found() => Ok(false),
                _ => Err(JukeboxError::StoreUnavailable(format!("head bucket {name}: {err}")).into()),
            },
        }
    }

    pub fn create_container(&self, name: &str) -> Result<()> {
        check_name(name)?;
        let client = self.client()?;
        self.runtime
            .block_on(client.create_bucket().bucket(name).send())
            .map_err(|e| JukeboxError::StoreUnavailable(format!("create bucket {name}: {e}")))?;
        info!("Created bucket {name}");
        Ok(())
    }

    pub fn delete_container(&self, name: &str) -> Result<()> {
        check_name(name)?;
        let client = self.client()?;
        self.runtime
            .block_on(client.delete_bucket().bucket(name).send())
            .map_err(|e| JukeboxError::StoreUnavailable(format!("delete bucket {name}: {e}")))?;
        info!("Deleted bucket {name}");
        Ok(())
    }

    pub fn list_container_contents(&self, name: &str) -> Result<Vec<String>> {
        check_name(name)?;
        let client = self.client()?;
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let page = self
                .runtime
                .block_on(
                    client
                        .list_objects_v2()
                        .bucket(name)
                        .set_continuation_token(continuation.take())
                        .send(),
                )
                .map_err(|e| JukeboxError::StoreUnavailable(format!("list bucket {name}: {e}")))?;

            keys.extend(page.contents().iter().filter_map(|o| o.key().map(str::to_string)));

            match page.next_continuation_token() {
                Some(token) if page.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        keys.sort();
        Ok(keys)
    }

    pub fn get_container_names(&self) -> Result<Vec<String>> {
        let client = self.client()?;
        let output = self
            .runtime
            .block_on(client.list_buckets().send())
            .map_err(|e| JukeboxError::StoreUnavailable(format!("list buckets: {e}")))?;
        let mut names: Vec<String> = output
            .buckets()
            .iter()
            .filter_map(|b| b.name().map(str::to_string))
            .collect();
        names.sort();
        Ok(names)
    }

    pub fn put_object(
        &self,
        container: &str,
        object: &str,
        bytes: &[u8],
        headers: Option<&PropertySet>,
    ) -> Result<()> {
        check_name(object)?;
        let client = self.client()?;
        let metadata: Option<HashMap<String, String>> = headers.map(|props| {
            props
                .iter()
                .map(|(k, v)| (k.clone(), PropertySet::encode_value(v)))
                .collect()
        });

        self.runtime
            .block_on(
                client
                    .put_object()
                    .bucket(container)
                    .key(object)
                    .body(ByteStream::from(bytes.to_vec()))
                    .set_metadata(metadata)
                    .send(),
            )
            .map_err(|e| {
                JukeboxError::StoreUnavailable(format!("put {container}/{object}: {e}"))
            })?;
        debug!("Stored {container}/{object} ({} bytes)", bytes.len());
        Ok(())
    }

    pub fn get_object(&self, container: &str, object: &str, local_path: &Path) -> Result<u64> {
        check_name(object)?;
        let client = self.client()?;
        let bytes = self.runtime.block_on(async {
            let output = match client.get_object().bucket(container).key(object).send().await {
                Ok(output) => output,
                Err(err) => {
                    let missing = err
                        .as_service_error()
                        .map(|e| e.is_no_such_key())
                        .unwrap_or(false);
                    return Err(if missing {
                        JukeboxError::NotFound(format!("object '{container}/{object}'"))
                    } else {
                        JukeboxError::StoreUnavailable(format!("get {container}/{object}: {err}"))
                    });
                }
            };
            output
                .body
                .collect()
                .await
                .map(|data| data.into_bytes())
                .map_err(|e| {
                    JukeboxError::StoreUnavailable(format!("read {container}/{object}: {e}"))
                })
        })?;

        fs::write(local_path, &bytes)
            .with_context(|| format!("Failed to write {}", local_path.display()))?;
        Ok(bytes.len() as u64)
    }

    pub fn delete_object(&self, container: &str, object: &str) -> Result<()> {
        check_name(object)?;
        let client = self.client()?;
        self.runtime
            .block_on(client.delete_object().bucket(container).key(object).send())
            .map_err(|e| {
                JukeboxError::StoreUnavailable(format!("delete {container}/{object}: {e}"))
            })?;
        Ok(())
    }

    pub fn get_object_metadata(&self, container: &str, object: &str) -> Result<PropertySet> {
        check_name(object)?;
        let client = self.client()?;
        let output = match self
            .runtime
            .block_on(client.head_object().bucket(container).key(object).send())
        {
            Ok(output) => output,
            Err(err) => {
                return match err.as_service_error() {
                    Some(e) if e.is_not_found() => {
                        Err(JukeboxError::NotFound(format!("object '{container}/{object}'")).into())
                    }
                    _ => Err(JukeboxError::StoreUnavailable(format!(
                        "head {container}/{object}: {err}"
                    ))
                    .into()),
                };
            }
        };

        let mut props = PropertySet::new();
        if let Some(metadata) = output.metadata() {
            for (key, text) in metadata {
                match PropertySet::decode_value(text) {
                    Ok(value) => {
                        props.add(key, value);
                    }
                    Err(e) => warn!("Ignoring header {key} on {container}/{object}: {e}"),
                }
            }
        }
        Ok(props)
    }
}
