//! # Play Cache
//!
//! The directory of songs ready to play. A file is only visible under its
//! song uid once it is complete: writers fill `<uid>.download` and rename it
//! into place, so anything without that suffix can be handed to the player.

use crate::config::DOWNLOAD_EXTENSION;
use crate::error::JukeboxError;
use anyhow::{Context, Result};
use log::{debug, warn};
use md5::{Digest, Md5};
use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

/// Lowercase hex MD5 of a byte slice.
pub fn md5_hex(bytes: &[u8]) -> String {
    hex::encode(Md5::digest(bytes))
}

/// Lowercase hex MD5 of a file, read in chunks.
pub fn file_md5(path: &Path) -> Result<String> {
    let mut file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut hasher = Md5::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = file
            .read(&mut buffer)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[derive(Debug, Clone)]
pub struct LocalCache {
    dir: PathBuf,
}

impl LocalCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ensure_exists(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create play directory {}", self.dir.display()))
    }

    /// Remove every file in the play directory, creating it if needed.
    pub fn clear(&self) -> Result<()> {
        self.ensure_exists()?;
        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read play directory {}", self.dir.display()))?
        {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                fs::remove_file(entry.path())
                    .with_context(|| format!("Failed to remove {}", entry.path().display()))?;
            }
        }
        debug!("Cleared play directory {}", self.dir.display());
        Ok(())
    }

    pub fn path_for(&self, song_uid: &str) -> PathBuf {
        self.dir.join(song_uid)
    }

    pub fn staging_path(&self, song_uid: &str) -> PathBuf {
        self.dir.join(format!("{song_uid}.{DOWNLOAD_EXTENSION}"))
    }

    /// True when the complete file is present.
    pub fn has(&self, song_uid: &str) -> bool {
        self.path_for(song_uid).is_file()
    }

    /// Write `bytes` as the song's file, atomically.
    pub fn admit(&self, song_uid: &str, bytes: &[u8]) -> Result<()> {
        let staging = self.staging_path(song_uid);
        {
            let mut file = File::create(&staging)
                .with_context(|| format!("Failed to create {}", staging.display()))?;
            file.write_all(bytes)
                .with_context(|| format!("Failed to write {}", staging.display()))?;
            file.sync_all()
                .with_context(|| format!("Failed to sync {}", staging.display()))?;
        }
        self.rename_into_place(song_uid, &staging)
    }

    /// Publish a file written directly to [`LocalCache::staging_path`].
    pub fn commit_staged(&self, song_uid: &str) -> Result<()> {
        let staging = self.staging_path(song_uid);
        File::open(&staging)
            .and_then(|file| file.sync_all())
            .with_context(|| format!("Failed to sync {}", staging.display()))?;
        self.rename_into_place(song_uid, &staging)
    }

    fn rename_into_place(&self, song_uid: &str, staging: &Path) -> Result<()> {
        let target = self.path_for(song_uid);
        fs::rename(staging, &target).with_context(|| {
            format!("Failed to move {} to {}", staging.display(), target.display())
        })?;
        debug!("Admitted {song_uid} to play cache");
        Ok(())
    }

    /// Drop a partial download, if any.
    pub fn discard_staged(&self, song_uid: &str) {
        let staging = self.staging_path(song_uid);
        match fs::remove_file(&staging) {
            Ok(()) => debug!("Discarded partial download {}", staging.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {e}", staging.display()),
        }
    }

    /// Remove the song's file. Returns whether one existed.
    pub fn evict(&self, song_uid: &str) -> Result<bool> {
        let path = self.path_for(song_uid);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("Evicted {song_uid} from play cache");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("Failed to evict {}", path.display())),
        }
    }

    /// Whether the song's bytes hash to `expected`. A staged download is
    /// checked in preference to the committed file, so a fetch can verify
    /// before it commits.
    ///
    /// # Errors
    ///
    /// [`JukeboxError::NotFound`] when the song is neither staged nor cached.
    pub fn verify_md5(&self, song_uid: &str, expected: &str) -> Result<bool> {
        let staging = self.staging_path(song_uid);
        let path = if staging.is_file() {
            staging
        } else if self.has(song_uid) {
            self.path_for(song_uid)
        } else {
            return Err(JukeboxError::NotFound(format!("cached song '{song_uid}'")).into());
        };
        let actual = file_md5(&path)?;
        let matches = actual.eq_ignore_ascii_case(expected);
        if !matches {
            debug!("{song_uid}: md5 {actual}, expected {expected}");
        }
        Ok(matches)
    }

    /// Song uids of complete files, sorted.
    pub fn ready_entries(&self) -> Result<Vec<String>> {
        let suffix = format!(".{DOWNLOAD_EXTENSION}");
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read play directory {}", self.dir.display()))?
        {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.ends_with(&suffix) {
                entries.push(name);
            }
        }
        entries.sort();
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cache() -> (LocalCache, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let cache = LocalCache::new(temp_dir.path().join("song-play"));
        cache.ensure_exists().unwrap();
        (cache, temp_dir)
    }

    #[test]
    fn test_md5_hex() {
        assert_eq!(md5_hex(b""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(md5_hex(b"abc"), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn test_admit_is_visible_only_when_complete() {
        let (cache, _temp_dir) = cache();
        fs::write(cache.staging_path("a.mp3"), b"partial").unwrap();
        assert!(!cache.has("a.mp3"));
        assert!(cache.ready_entries().unwrap().is_empty());

        cache.commit_staged("a.mp3").unwrap();
        assert!(cache.has("a.mp3"));
        assert!(!cache.staging_path("a.mp3").exists());

        cache.admit("b.mp3", b"bytes").unwrap();
        assert_eq!(cache.ready_entries().unwrap(), vec!["a.mp3", "b.mp3"]);
    }

    #[test]
    fn test_verify_md5_staged_then_committed() {
        let (cache, _temp_dir) = cache();
        fs::write(cache.staging_path("a.mp3"), b"abc").unwrap();

        assert!(cache.verify_md5("a.mp3", "900150983CD24FB0D6963F7D28E17F72").unwrap());
        assert!(!cache.verify_md5("a.mp3", "00000000000000000000000000000000").unwrap());
        assert!(!cache.has("a.mp3"));

        cache.commit_staged("a.mp3").unwrap();
        assert!(cache.verify_md5("a.mp3", "900150983cd24fb0d6963f7d28e17f72").unwrap());

        let err = cache.verify_md5("b.mp3", "x").unwrap_err();
        assert!(matches!(JukeboxError::kind_of(&err), Some(JukeboxError::NotFound(_))));
    }

    #[test]
    fn test_evict() {
        let (cache, _temp_dir) = cache();
        cache.admit("a.mp3", b"abc").unwrap();
        assert!(cache.evict("a.mp3").unwrap());
        assert!(!cache.evict("a.mp3").unwrap());
        assert!(!cache.has("a.mp3"));
    }

    #[test]
    fn test_clear_empties_directory() {
        let (cache, _temp_dir) = cache();
        cache.admit("a.mp3", b"1").unwrap();
        fs::write(cache.staging_path("b.mp3"), b"2").unwrap();

        cache.clear().unwrap();
        assert_eq!(fs::read_dir(cache.dir()).unwrap().count(), 0);
        cache.discard_staged("b.mp3");
    }
}
