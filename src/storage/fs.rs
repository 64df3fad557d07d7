//! Filesystem back-end: one directory per container under a root directory.

use super::{check_name, PropertySet};
use crate::error::JukeboxError;
use anyhow::{Context, Result};
use log::{debug, info};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const META_SUFFIX: &str = ".meta";

pub struct FsStorage {
    root_dir: PathBuf,
}

impl FsStorage {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self { root_dir: root_dir.into() }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn container_path(&self, container: &str) -> Result<PathBuf, JukeboxError> {
        check_name(container)?;
        Ok(self.root_dir.join(container))
    }

    /// Path of an object inside an existing container.
    fn object_path(&self, container: &str, object: &str) -> Result<PathBuf> {
        check_name(object)?;
        let container_path = self.container_path(container)?;
        if !container_path.is_dir() {
            return Err(JukeboxError::NotFound(format!("container '{container}'")).into());
        }
        Ok(container_path.join(object))
    }

    fn meta_path(object_path: &Path) -> PathBuf {
        let mut name = object_path.as_os_str().to_owned();
        name.push(META_SUFFIX);
        PathBuf::from(name)
    }

    /// Create the root directory if needed.
    pub fn enter(&mut self) -> Result<()> {
        fs::create_dir_all(&self.root_dir).with_context(|| {
            format!("Failed to create storage root {}", self.root_dir.display())
        })?;
        debug!("Filesystem storage rooted at {}", self.root_dir.display());
        Ok(())
    }

    pub fn exit(&self) {
        debug!("Leaving filesystem storage at {}", self.root_dir.display());
    }

    pub fn has_container(&self, name: &str) -> Result<bool> {
        Ok(self.container_path(name)?.is_dir())
    }

    pub fn create_container(&self, name: &str) -> Result<()> {
        let path = self.container_path(name)?;
        fs::create_dir_all(&path)
            .with_context(|| format!("Failed to create container {}", path.display()))?;
        info!("Created container {name}");
        Ok(())
    }

    pub fn delete_container(&self, name: &str) -> Result<()> {
        let path = self.container_path(name)?;
        if !path.is_dir() {
            return Err(JukeboxError::NotFound(format!("container '{name}'")).into());
        }
        fs::remove_dir_all(&path)
            .with_context(|| format!("Failed to delete container {}", path.display()))?;
        info!("Deleted container {name}");
        Ok(())
    }

    /// Object names in a container, sorted, without header files.
    pub fn list_container_contents(&self, name: &str) -> Result<Vec<String>> {
        let path = self.container_path(name)?;
        if !path.is_dir() {
            return Err(JukeboxError::NotFound(format!("container '{name}'")).into());
        }

        let mut objects = Vec::new();
        for entry in fs::read_dir(&path)
            .with_context(|| format!("Failed to list container {}", path.display()))?
        {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if !file_name.ends_with(META_SUFFIX) {
                objects.push(file_name);
            }
        }
        objects.sort();
        Ok(objects)
    }

    pub fn get_container_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root_dir)
            .with_context(|| format!("Failed to read storage root {}", self.root_dir.display()))?
        {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Write the object, then its headers. A put without headers removes any
    /// stale header file.
    pub fn put_object(
        &self,
        container: &str,
        object: &str,
        bytes: &[u8],
        headers: Option<&PropertySet>,
    ) -> Result<()> {
        let path = self.object_path(container, object)?;
        fs::write(&path, bytes)
            .with_context(|| format!("Failed to write object {}", path.display()))?;

        let meta = Self::meta_path(&path);
        match headers {
            Some(props) if !props.is_empty() => {
                fs::write(&meta, props.to_text())
                    .with_context(|| format!("Failed to write headers {}", meta.display()))?;
            }
            _ => match fs::remove_file(&meta) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e).context("Failed to remove stale headers"),
            },
        }

        debug!("Stored {container}/{object} ({} bytes)", bytes.len());
        Ok(())
    }

    pub fn get_object(&self, container: &str, object: &str, local_path: &Path) -> Result<u64> {
        let path = self.object_path(container, object)?;
        if !path.is_file() {
            return Err(JukeboxError::NotFound(format!("object '{container}/{object}'")).into());
        }
        let written = fs::copy(&path, local_path).with_context(|| {
            format!("Failed to copy {} to {}", path.display(), local_path.display())
        })?;
        debug!("Retrieved {container}/{object} ({written} bytes)");
        Ok(written)
    }

    pub fn delete_object(&self, container: &str, object: &str) -> Result<()> {
        let path = self.object_path(container, object)?;
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(JukeboxError::NotFound(format!("object '{container}/{object}'")).into());
            }
            Err(e) => return Err(e).context("Failed to delete object"),
        }

        let meta = Self::meta_path(&path);
        if meta.exists() {
            fs::remove_file(&meta)
                .with_context(|| format!("Failed to delete headers {}", meta.display()))?;
        }
        debug!("Deleted {container}/{object}");
        Ok(())
    }

    pub fn get_object_metadata(&self, container: &str, object: &str) -> Result<PropertySet> {
        let path = self.object_path(container, object)?;
        if !path.is_file() {
            return Err(JukeboxError::NotFound(format!("object '{container}/{object}'")).into());
        }
        let meta = Self::meta_path(&path);
        if !meta.exists() {
            return Ok(PropertySet::new());
        }
        let text = fs::read_to_string(&meta)
            .with_context(|| format!("Failed to read headers {}", meta.display()))?;
        PropertySet::from_text(&text)
            .with_context(|| format!("Malformed headers in {}", meta.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::PropertyValue;
    use tempfile::TempDir;

    fn entered_store() -> (FsStorage, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let mut store = FsStorage::new(temp_dir.path().join("storage"));
        store.enter().expect("enter should create the root");
        (store, temp_dir)
    }

    #[test]
    fn test_container_lifecycle() {
        let (store, _temp_dir) = entered_store();

        assert!(!store.has_container("songs").unwrap());
        store.create_container("songs").unwrap();
        store.create_container("songs").unwrap();
        assert!(store.has_container("songs").unwrap());
        assert_eq!(store.get_container_names().unwrap(), vec!["songs"]);

        store.delete_container("songs").unwrap();
        assert!(!store.has_container("songs").unwrap());
        assert!(store.delete_container("songs").is_err());
    }

    #[test]
    fn test_object_round_trip_with_headers() {
        let (store, temp_dir) = entered_store();
        store.create_container("songs").unwrap();

        let mut headers = PropertySet::new();
        headers.add("encrypted", PropertyValue::Bool(true));
        store.put_object("songs", "a--b--c.mp3", b"hello", Some(&headers)).unwrap();

        assert_eq!(store.list_container_contents("songs").unwrap(), vec!["a--b--c.mp3"]);
        assert_eq!(
            store.get_object_metadata("songs", "a--b--c.mp3").unwrap().get_bool("encrypted"),
            Some(true)
        );

        let local = temp_dir.path().join("copy.mp3");
        assert_eq!(store.get_object("songs", "a--b--c.mp3", &local).unwrap(), 5);
        assert_eq!(fs::read(&local).unwrap(), b"hello");

        store.delete_object("songs", "a--b--c.mp3").unwrap();
        assert!(store.list_container_contents("songs").unwrap().is_empty());
        assert!(!store.root_dir().join("songs/a--b--c.mp3.meta").exists());
    }

    #[test]
    fn test_missing_objects_are_not_found() {
        let (store, temp_dir) = entered_store();
        store.create_container("songs").unwrap();
        let local = temp_dir.path().join("x");

        for err in [
            store.get_object("songs", "nope.mp3", &local).unwrap_err(),
            store.delete_object("songs", "nope.mp3").unwrap_err(),
            store.get_object_metadata("songs", "nope.mp3").unwrap_err(),
            store.put_object("missing", "a.mp3", b"x", None).unwrap_err(),
        ] {
            assert!(matches!(
                JukeboxError::kind_of(&err),
                Some(JukeboxError::NotFound(_))
            ));
        }
    }

    #[test]
    fn test_put_without_headers_clears_stale_meta() {
        let (store, _temp_dir) = entered_store();
        store.create_container("songs").unwrap();

        let mut headers = PropertySet::new();
        headers.add("k", PropertyValue::Int(1));
        store.put_object("songs", "a.mp3", b"1", Some(&headers)).unwrap();
        store.put_object("songs", "a.mp3", b"2", None).unwrap();

        assert!(store.get_object_metadata("songs", "a.mp3").unwrap().is_empty());
    }
}
