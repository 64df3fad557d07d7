//! # Object Storage
//!
//! Named blobs grouped into containers. Every back-end offers the same
//! capability set, so [`StorageSystem`] is a plain enum over the variants and
//! callers hold one by capability:
//!
//! - [`fs::FsStorage`] keeps each container as a directory under a root and
//!   each object's headers in a `<object>.meta` sibling.
//! - [`s3::S3Storage`] maps containers onto buckets of an S3-compatible
//!   service.
//!
//! Swift and Azure are recognised names but are not built into this crate;
//! selecting them fails with [`JukeboxError::StoreUnavailable`].

pub mod fs;
pub mod s3;

use crate::config::Credentials;
use crate::error::JukeboxError;
use anyhow::{bail, Result};
use clap::ValueEnum;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Back-end selected with `--storage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize, Default)]
pub enum StorageType {
    /// Local filesystem
    #[default]
    Fs,
    /// S3-compatible object storage
    S3,
    /// OpenStack Swift
    Swift,
    /// Azure blob storage
    Azure,
}

impl StorageType {
    pub fn name(&self) -> &'static str {
        match self {
            StorageType::Fs => "fs",
            StorageType::S3 => "s3",
            StorageType::Swift => "swift",
            StorageType::Azure => "azure",
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A typed header value attached to an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Bool(bool),
    String(String),
    Int(i32),
    Long(i64),
    ULong(u64),
}

impl PropertyValue {
    fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::Bool(_) => "bool",
            PropertyValue::String(_) => "string",
            PropertyValue::Int(_) => "int",
            PropertyValue::Long(_) => "long",
            PropertyValue::ULong(_) => "ulong",
        }
    }

    fn value_text(&self) -> String {
        match self {
            PropertyValue::Bool(b) => b.to_string(),
            PropertyValue::String(s) => s.clone(),
            PropertyValue::Int(i) => i.to_string(),
            PropertyValue::Long(l) => l.to_string(),
            PropertyValue::ULong(u) => u.to_string(),
        }
    }

    fn parse(type_name: &str, text: &str) -> Result<Self> {
        let value = match type_name {
            "bool" => match text {
                "true" => PropertyValue::Bool(true),
                "false" => PropertyValue::Bool(false),
                other => bail!("invalid bool header value '{other}'"),
            },
            "string" => PropertyValue::String(text.to_string()),
            "int" => PropertyValue::Int(text.parse()?),
            "long" => PropertyValue::Long(text.parse()?),
            "ulong" => PropertyValue::ULong(text.parse()?),
            other => bail!("unknown header type '{other}'"),
        };
        Ok(value)
    }
}

/// Headers stored alongside an object.
///
/// Serialised one per line as `type|key|value`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertySet {
    entries: BTreeMap<String, PropertyValue>,
}

impl PropertySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: &str, value: PropertyValue) -> &mut Self {
        self.entries.insert(key.to_string(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.entries.get(key)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key) {
            Some(PropertyValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        match self.get(key) {
            Some(PropertyValue::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn get_long(&self, key: &str) -> Option<i64> {
        match self.get(key) {
            Some(PropertyValue::Long(l)) => Some(*l),
            Some(PropertyValue::Int(i)) => Some(i64::from(*i)),
            _ => None,
        }
    }

    pub fn get_ulong(&self, key: &str) -> Option<u64> {
        match self.get(key) {
            Some(PropertyValue::ULong(u)) => Some(*u),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PropertyValue)> {
        self.entries.iter()
    }

    /// Render as `type|key|value` lines.
    pub fn to_text(&self) -> String {
        let mut text = String::new();
        for (key, value) in &self.entries {
            text.push_str(value.type_name());
            text.push('|');
            text.push_str(key);
            text.push('|');
            text.push_str(&value.value_text());
            text.push('\n');
        }
        text
    }

    /// Parse `type|key|value` lines. Blank lines are skipped; the value may
    /// itself contain `|`.
    pub fn from_text(text: &str) -> Result<Self> {
        let mut props = PropertySet::new();
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            let mut fields = line.splitn(3, '|');
            let (Some(type_name), Some(key), Some(value)) =
                (fields.next(), fields.next(), fields.next())
            else {
                bail!("malformed header line '{line}'");
            };
            props.add(key, PropertyValue::parse(type_name, value)?);
        }
        Ok(props)
    }

    /// Encode a single value as `type|value`, for back-ends whose metadata is
    /// a flat string map.
    pub(crate) fn encode_value(value: &PropertyValue) -> String {
        format!("{}|{}", value.type_name(), value.value_text())
    }

    pub(crate) fn decode_value(text: &str) -> Result<PropertyValue> {
        match text.split_once('|') {
            Some((type_name, value)) => PropertyValue::parse(type_name, value),
            None => Ok(PropertyValue::String(text.to_string())),
        }
    }
}

/// The object store, one variant per back-end.
pub enum StorageSystem {
    Fs(fs::FsStorage),
    S3(s3::S3Storage),
}

impl StorageSystem {
    /// Build the back-end named by `storage_type` from its credentials.
    ///
    /// # Errors
    ///
    /// [`JukeboxError::StoreUnavailable`] for back-ends not built into this
    /// crate, or when required credentials are missing.
    pub fn connect(storage_type: StorageType, creds: &Credentials) -> Result<Self> {
        debug!("Connecting to {storage_type} storage");
        match storage_type {
            StorageType::Fs => Ok(StorageSystem::Fs(fs::FsStorage::new(creds.fs_root_dir()))),
            StorageType::S3 => Ok(StorageSystem::S3(s3::S3Storage::new(creds)?)),
            StorageType::Swift | StorageType::Azure => Err(JukeboxError::StoreUnavailable(
                format!("{storage_type} storage is not built into this jukebox"),
            )
            .into()),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            StorageSystem::Fs(_) => "fs",
            StorageSystem::S3(_) => "s3",
        }
    }

    /// Open and authenticate.
    pub fn enter(&mut self) -> Result<()> {
        match self {
            StorageSystem::Fs(s) => s.enter(),
            StorageSystem::S3(s) => s.enter(),
        }
    }

    /// Release the connection.
    pub fn exit(&self) {
        match self {
            StorageSystem::Fs(s) => s.exit(),
            StorageSystem::S3(s) => s.exit(),
        }
    }

    pub fn has_container(&self, name: &str) -> Result<bool> {
        match self {
            StorageSystem::Fs(s) => s.has_container(name),
            StorageSystem::S3(s) => s.has_container(name),
        }
    }

    pub fn create_container(&self, name: &str) -> Result<()> {
        match self {
            StorageSystem::Fs(s) => s.create_container(name),
            StorageSystem::S3(s) => s.create_container(name),
        }
    }

    pub fn delete_container(&self, name: &str) -> Result<()> {
        match self {
            StorageSystem::Fs(s) => s.delete_container(name),
            StorageSystem::S3(s) => s.delete_container(name),
        }
    }

    pub fn list_container_contents(&self, name: &str) -> Result<Vec<String>> {
        match self {
            StorageSystem::Fs(s) => s.list_container_contents(name),
            StorageSystem::S3(s) => s.list_container_contents(name),
        }
    }

    pub fn get_container_names(&self) -> Result<Vec<String>> {
        match self {
            StorageSystem::Fs(s) => s.get_container_names(),
            StorageSystem::S3(s) => s.get_container_names(),
        }
    }

    pub fn put_object(
        &self,
        container: &str,
        object: &str,
        bytes: &[u8],
        headers: Option<&PropertySet>,
    ) -> Result<()> {
        match self {
            StorageSystem::Fs(s) => s.put_object(container, object, bytes, headers),
            StorageSystem::S3(s) => s.put_object(container, object, bytes, headers),
        }
    }

    /// Download an object to `local_path`, returning the bytes written.
    pub fn get_object(&self, container: &str, object: &str, local_path: &Path) -> Result<u64> {
        match self {
            StorageSystem::Fs(s) => s.get_object(container, object, local_path),
            StorageSystem::S3(s) => s.get_object(container, object, local_path),
        }
    }

    pub fn delete_object(&self, container: &str, object: &str) -> Result<()> {
        match self {
            StorageSystem::Fs(s) => s.delete_object(container, object),
            StorageSystem::S3(s) => s.delete_object(container, object),
        }
    }

    pub fn get_object_metadata(&self, container: &str, object: &str) -> Result<PropertySet> {
        match self {
            StorageSystem::Fs(s) => s.get_object_metadata(container, object),
            StorageSystem::S3(s) => s.get_object_metadata(container, object),
        }
    }
}

/// Object and container names must stay inside their container.
pub(crate) fn check_name(name: &str) -> Result<(), JukeboxError> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(JukeboxError::ConfigInvalid(format!(
            "'{name}' is not a valid container or object name"
        )));
    }
    Ok(())
}
