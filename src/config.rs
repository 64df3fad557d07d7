//! # Configuration Module
//!
//! Runtime options, credentials, and the layout of the working directory.
//!
//! ## Working Directory
//!
//! Everything the jukebox touches locally lives under one base directory (the
//! current directory unless `--directory` is given):
//!
//! - `song-import/`, `playlist-import/`, `album-art-import/` - files to ingest
//! - `song-play/` - the play cache
//! - `jukebox_db.sqlite3` - the catalog
//! - `jukebox.pid` - present while a play session runs
//! - `<storage>_creds.txt` - back-end credentials
//!
//! ## Credentials File
//!
//! Plain `key=value` lines. Whitespace around keys and values is trimmed,
//! lines starting with `#` are comments and unknown keys are ignored.
//!
//! ```text
//! root_dir=/srv/jukebox-store
//! container_prefix=com.example.jb.
//! ```

use crate::error::JukeboxError;
use crate::storage::StorageType;
use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Songs kept ready ahead of the one playing.
pub const DEFAULT_FILE_CACHE_COUNT: usize = 3;

/// Catalog file name, locally and in the metadata container.
pub const DEFAULT_DB_FILE_NAME: &str = "jukebox_db.sqlite3";

pub const PID_FILE_NAME: &str = "jukebox.pid";

/// How long a simulated song "plays" when no audio player is available.
pub const DEFAULT_SIMULATED_PLAY_SECS: u64 = 20;

/// Port of the local control endpoint.
pub const DEFAULT_HTTP_PORT: u16 = 5309;

/// Suffix of files that are still being written.
pub const DOWNLOAD_EXTENSION: &str = "download";

/// Paths derived from the base directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JukeboxPaths {
    pub base_dir: PathBuf,
}

impl Default for JukeboxPaths {
    fn default() -> Self {
        Self::new(".")
    }
}

impl JukeboxPaths {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }

    pub fn song_import_dir(&self) -> PathBuf {
        self.base_dir.join("song-import")
    }

    pub fn playlist_import_dir(&self) -> PathBuf {
        self.base_dir.join("playlist-import")
    }

    pub fn album_art_import_dir(&self) -> PathBuf {
        self.base_dir.join("album-art-import")
    }

    pub fn song_play_dir(&self) -> PathBuf {
        self.base_dir.join("song-play")
    }

    pub fn metadata_db_file(&self) -> PathBuf {
        self.base_dir.join(DEFAULT_DB_FILE_NAME)
    }

    pub fn pid_file(&self) -> PathBuf {
        self.base_dir.join(PID_FILE_NAME)
    }

    pub fn creds_file(&self, storage_type: StorageType) -> PathBuf {
        self.base_dir.join(format!("{}_creds.txt", storage_type.name()))
    }
}

/// Options for one jukebox invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JukeboxOptions {
    pub debug: bool,
    /// Prefetch depth N.
    pub file_cache_count: usize,
    pub check_data_integrity: bool,
    pub use_compression: bool,
    pub use_encryption: bool,
    #[serde(skip)]
    pub encryption_key: Option<String>,
    pub encryption_keyfile: Option<PathBuf>,
    pub storage_type: StorageType,
    /// Shuffle seed; wall-clock time when absent.
    pub shuffle_seed: Option<u64>,
    /// Wrap to the first song after the last one.
    pub repeat: bool,
    pub simulated_play: Duration,
    /// Never spawn the audio program.
    pub simulate_audio: bool,
    /// Control endpoint port, `None` to disable it.
    pub http_port: Option<u16>,
    /// Listen for pause/skip/terminate/info signals.
    pub handle_signals: bool,
}

impl Default for JukeboxOptions {
    fn default() -> Self {
        Self {
            debug: false,
            file_cache_count: DEFAULT_FILE_CACHE_COUNT,
            check_data_integrity: false,
            use_compression: false,
            use_encryption: false,
            encryption_key: None,
            encryption_keyfile: None,
            storage_type: StorageType::Fs,
            shuffle_seed: None,
            repeat: true,
            simulated_play: Duration::from_secs(DEFAULT_SIMULATED_PLAY_SECS),
            simulate_audio: false,
            http_port: Some(DEFAULT_HTTP_PORT),
            handle_signals: true,
        }
    }
}

impl JukeboxOptions {
    /// Reject flag combinations that cannot work.
    ///
    /// # Errors
    ///
    /// [`JukeboxError::ConfigInvalid`] when the cache count is zero, when
    /// encryption is requested without a key, or when both `--key` and
    /// `--keyfile` are given.
    pub fn validate(&self) -> Result<(), JukeboxError> {
        if self.file_cache_count == 0 {
            return Err(JukeboxError::ConfigInvalid(
                "--file-cache-count must be at least 1".to_string(),
            ));
        }
        if self.encryption_key.is_some() && self.encryption_keyfile.is_some() {
            return Err(JukeboxError::ConfigInvalid(
                "use either --key or --keyfile, not both".to_string(),
            ));
        }
        if self.use_encryption
            && self.encryption_key.is_none()
            && self.encryption_keyfile.is_none()
        {
            return Err(JukeboxError::ConfigInvalid(
                "--encrypt requires --key or --keyfile".to_string(),
            ));
        }
        if let Some(keyfile) = &self.encryption_keyfile {
            if !keyfile.is_file() {
                return Err(JukeboxError::ConfigInvalid(format!(
                    "keyfile {} does not exist",
                    keyfile.display()
                )));
            }
        }
        Ok(())
    }

    /// The passphrase, read from the keyfile when one was given.
    pub fn resolve_encryption_key(&self) -> Result<Option<String>> {
        if let Some(key) = &self.encryption_key {
            return Ok(Some(key.clone()));
        }
        match &self.encryption_keyfile {
            Some(path) => {
                let key = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read keyfile {}", path.display()))?;
                let key = key.trim().to_string();
                if key.is_empty() {
                    return Err(JukeboxError::ConfigInvalid(format!(
                        "keyfile {} is empty",
                        path.display()
                    ))
                    .into());
                }
                Ok(Some(key))
            }
            None => Ok(None),
        }
    }
}

/// Key/value pairs from `<storage>_creds.txt`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    values: BTreeMap<String, String>,
    base_dir: PathBuf,
}

impl Credentials {
    /// Parse `key=value` lines.
    pub fn parse(text: &str) -> Self {
        let values = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| line.split_once('='))
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .filter(|(k, _)| !k.is_empty())
            .collect();
        Self { values, base_dir: PathBuf::new() }
    }

    /// Load the credentials for `storage_type`. A missing file yields empty
    /// credentials; relative paths inside resolve against the base directory.
    pub fn load(paths: &JukeboxPaths, storage_type: StorageType) -> Result<Self> {
        let path = paths.creds_file(storage_type);
        let mut creds = if path.exists() {
            debug!("Reading credentials from {}", path.display());
            let text = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read credentials {}", path.display()))?;
            Self::parse(&text)
        } else {
            debug!("No credentials file at {}", path.display());
            Self::default()
        };
        creds.base_dir = paths.base_dir.clone();
        Ok(creds)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }

    pub fn container_prefix(&self) -> &str {
        self.get("container_prefix").unwrap_or("")
    }

    /// Root of the filesystem store; `storage` under the base directory by
    /// default.
    pub fn fs_root_dir(&self) -> PathBuf {
        let root = Path::new(self.get("root_dir").unwrap_or("storage"));
        if root.is_absolute() {
            root.to_path_buf()
        } else {
            self.base_dir.join(root)
        }
    }
}
