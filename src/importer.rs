//! # Importers
//!
//! Move files from the import directories into the object store and record
//! them in the catalog, and mirror deletions the other way.
//!
//! ## Songs
//!
//! Every regular file in `song-import/` named `artist--album--song.ext` is
//! digested (in parallel), transformed by the session's pipeline, uploaded to
//! its artist-letter container with its catalog fields as headers, then
//! inserted into the catalog, or updated when the row differs. If the catalog
//! write fails the upload is deleted again.
//!
//! Per-file failures are counted rather than fatal. Uploading the catalog
//! afterwards is left to the caller.

use crate::cache::file_md5;
use crate::db::Catalog;
use crate::error::JukeboxError;
use crate::library::{Album, Playlist};
use crate::name_codec::{self, ContainerNames, KEY_SEPARATOR};
use crate::song::Song;
use crate::storage::{PropertySet, PropertyValue, StorageSystem};
use crate::transform::Pipeline;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use rayon::prelude::*;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const PROGRESS_BAR_WIDTH: usize = 40;

/// Outcome of an import or delete command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl BatchSummary {
    /// Success unless everything that was attempted failed.
    pub fn is_success(&self) -> bool {
        self.failed == 0 || self.succeeded > 0
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} succeeded, {} failed", self.succeeded, self.failed)?;
        if self.skipped > 0 {
            write!(f, ", {} skipped", self.skipped)?;
        }
        Ok(())
    }
}

/// `[#######.................................] 7/40`
pub fn progress_bar(done: usize, total: usize) -> String {
    let filled = if total == 0 { PROGRESS_BAR_WIDTH } else { done.min(total) * PROGRESS_BAR_WIDTH / total };
    format!(
        "[{}{}] {done}/{total}",
        "#".repeat(filled),
        ".".repeat(PROGRESS_BAR_WIDTH - filled)
    )
}

/// Facts about a source file gathered before upload.
#[derive(Debug)]
struct Digest {
    path: PathBuf,
    file_name: String,
    origin_size: u64,
    file_time: String,
    md5_hash: String,
}

fn digest_file(path: &Path, file_name: &str) -> Result<Digest> {
    let metadata =
        fs::metadata(path).with_context(|| format!("Failed to stat {}", path.display()))?;
    let modified: DateTime<Utc> = metadata
        .modified()
        .with_context(|| format!("No modification time for {}", path.display()))?
        .into();
    Ok(Digest {
        path: path.to_path_buf(),
        file_name: file_name.to_string(),
        origin_size: metadata.len(),
        file_time: modified.to_rfc3339(),
        md5_hash: file_md5(path)?,
    })
}

/// Regular files in `dir`, sorted by name. A missing directory is empty.
fn files_in(dir: &Path) -> Result<Vec<(PathBuf, String)>> {
    if !dir.is_dir() {
        info!("Import directory {} does not exist", dir.display());
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in
        fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))?
    {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push((entry.path(), entry.file_name().to_string_lossy().into_owned()));
        }
    }
    files.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(files)
}

fn song_headers(song: &Song) -> PropertySet {
    let mut headers = PropertySet::new();
    headers
        .add("artist_name", PropertyValue::String(song.artist_name.clone()))
        .add("song_name", PropertyValue::String(song.song_name.clone()))
        .add("file_time", PropertyValue::String(song.file_time.clone()))
        .add("md5_hash", PropertyValue::String(song.md5_hash.clone()))
        .add("origin_size", PropertyValue::ULong(song.origin_size))
        .add("stored_size", PropertyValue::ULong(song.stored_size))
        .add("pad_char_count", PropertyValue::Int(song.pad_char_count as i32))
        .add("compressed", PropertyValue::Bool(song.compressed))
        .add("encrypted", PropertyValue::Bool(song.encrypted));
    headers
}

/// Store and catalog handles for one command.
pub struct Importer<'a> {
    store: &'a StorageSystem,
    catalog: &'a mut Catalog,
    names: &'a ContainerNames,
    pipeline: &'a Pipeline,
    show_progress: bool,
}

impl<'a> Importer<'a> {
    pub fn new(
        store: &'a StorageSystem,
        catalog: &'a mut Catalog,
        names: &'a ContainerNames,
        pipeline: &'a Pipeline,
    ) -> Self {
        Self { store, catalog, names, pipeline, show_progress: false }
    }

    /// Draw the progress bar on stdout while importing songs.
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    fn ensure_container(&self, container: &str) -> Result<()> {
        if !self.store.has_container(container)? {
            self.store.create_container(container)?;
        }
        Ok(())
    }

    fn draw_progress(&self, done: usize, total: usize) {
        if !self.show_progress {
            return;
        }
        let mut stdout = io::stdout();
        let _ = write!(stdout, "\r{}", progress_bar(done, total));
        if done == total {
            let _ = writeln!(stdout);
        }
        let _ = stdout.flush();
    }

    /// Import every song file in `dir`.
    pub fn import_songs(&mut self, dir: &Path) -> Result<BatchSummary> {
        let mut summary = BatchSummary::default();
        let mut candidates = Vec::new();
        for (path, file_name) in files_in(dir)? {
            let has_extension = file_name
                .split_once('.')
                .is_some_and(|(_, ext)| !ext.is_empty());
            if has_extension && name_codec::components_from_file_name(&file_name).is_valid() {
                candidates.push((path, file_name));
            } else {
                warn!("Skipping {file_name}: not named artist--album--song.ext");
                summary.skipped += 1;
            }
        }
        if candidates.is_empty() {
            info!("No songs to import in {}", dir.display());
            return Ok(summary);
        }

        let digests: Vec<(String, Result<Digest>)> = candidates
            .par_iter()
            .map(|(path, file_name)| (file_name.clone(), digest_file(path, file_name)))
            .collect();

        let total = digests.len();
        for (done, (file_name, digest)) in digests.into_iter().enumerate() {
            let outcome = digest.and_then(|digest| self.import_song(&digest));
            match outcome {
                Ok(()) => summary.succeeded += 1,
                Err(e) => {
                    warn!("Failed to import {file_name}: {e:#}");
                    summary.failed += 1;
                }
            }
            self.draw_progress(done + 1, total);
        }

        info!("Song import: {summary}");
        Ok(summary)
    }

    fn import_song(&mut self, digest: &Digest) -> Result<()> {
        let uid = digest.file_name.as_str();
        let triple = name_codec::components_from_file_name(uid);
        let stem = name_codec::key_from_file_name(uid);
        let album_uid = stem.rsplit_once(KEY_SEPARATOR).map(|(album, _)| album.to_string());
        let container = self.names.container_for_song(uid)?;

        let source = fs::read(&digest.path)
            .with_context(|| format!("Failed to read {}", digest.path.display()))?;
        let stored = self.pipeline.encode(&source)?;

        let song = Song {
            song_uid: uid.to_string(),
            artist_name: triple.artist.clone(),
            song_name: triple.song.clone(),
            album_uid,
            file_time: digest.file_time.clone(),
            origin_size: digest.origin_size,
            stored_size: stored.len() as u64,
            pad_char_count: 0,
            md5_hash: digest.md5_hash.clone(),
            compressed: self.pipeline.compresses(),
            encrypted: self.pipeline.encrypts(),
            container_name: container.clone(),
            object_name: uid.to_string(),
        };
        song.validate(self.names)?;

        self.ensure_container(&container)?;
        self.store
            .put_object(&container, uid, &stored, Some(&song_headers(&song)))
            .with_context(|| format!("Failed to upload {uid}"))?;

        if let Err(e) = self.catalog_song(&song) {
            if let Err(rollback) = self.store.delete_object(&container, uid) {
                warn!("Rollback of {container}/{uid} failed: {rollback:#}");
            }
            return Err(e);
        }

        if let Err(e) = self
            .catalog
            .upsert_artist(&triple.artist)
            .and_then(|_| self.catalog.upsert_album(&triple.artist, &triple.album))
        {
            warn!("Artist/album rows for {uid} not updated: {e:#}");
        }
        debug!("Imported {uid} into {container}");
        Ok(())
    }

    fn catalog_song(&mut self, song: &Song) -> Result<()> {
        match self.catalog.retrieve_song(&song.song_uid)? {
            None => self.catalog.insert_song(song),
            Some(existing) if existing != *song => self.catalog.update_song(song),
            Some(_) => {
                debug!("{} unchanged in catalog", song.song_uid);
                Ok(())
            }
        }
    }

    /// Upload each playlist document in `dir` and catalog it by name.
    pub fn import_playlists(&mut self, dir: &Path) -> Result<BatchSummary> {
        let container = self.names.playlists();
        let mut summary = BatchSummary::default();
        for (path, file_name) in files_in(dir)? {
            match self.import_playlist(&container, &path, &file_name) {
                Ok(name) => {
                    info!("Imported playlist '{name}' from {file_name}");
                    summary.succeeded += 1;
                }
                Err(e) => {
                    warn!("Failed to import playlist {file_name}: {e:#}");
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }

    fn import_playlist(&mut self, container: &str, path: &Path, file_name: &str) -> Result<String> {
        let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let playlist = Playlist::from_json(&bytes)?;
        self.ensure_container(container)?;
        self.store.put_object(container, file_name, &bytes, None)?;
        self.catalog.insert_playlist(file_name, &playlist.name, &playlist.tags)?;
        Ok(playlist.name)
    }

    /// Upload each image in `dir` to the album-art container. Album
    /// documents (`*.json`) found alongside go to the albums container under
    /// their album key and are catalogued with their genres.
    pub fn import_album_art(&mut self, dir: &Path) -> Result<BatchSummary> {
        let mut summary = BatchSummary::default();
        for (path, file_name) in files_in(dir)? {
            let outcome = fs::read(&path)
                .with_context(|| format!("Failed to read {}", path.display()))
                .and_then(|bytes| {
                    if file_name.ends_with(".json") {
                        self.import_album_document(&bytes)
                    } else {
                        let container = self.names.album_art();
                        self.ensure_container(&container)?;
                        self.store.put_object(&container, &file_name, &bytes, None)
                    }
                });
            match outcome {
                Ok(()) => summary.succeeded += 1,
                Err(e) => {
                    warn!("Failed to import {file_name}: {e:#}");
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }

    fn import_album_document(&mut self, bytes: &[u8]) -> Result<()> {
        let album = Album::from_json(bytes)?;
        let container = self.names.albums();
        self.ensure_container(&container)?;
        self.store.put_object(&container, &Album::object_name(&album.key()), bytes, None)?;
        let album_uid = self.catalog.catalog_album(&album)?;
        info!("Imported album document {album_uid}");
        Ok(())
    }

    /// Remove one song from store and catalog. Counts a failure when only
    /// one side could be cleaned up.
    fn remove_song(&mut self, song_uid: &str, container: &str, object: &str) -> BatchSummary {
        let mut summary = BatchSummary::default();
        let from_store = self.store.delete_object(container, object);
        if let Err(e) = &from_store {
            warn!("Failed to delete {container}/{object}: {e:#}");
        }
        let from_catalog = self.catalog.delete_song(song_uid);
        if let Err(e) = &from_catalog {
            warn!("Failed to delete catalog row {song_uid}: {e:#}");
        }
        if from_store.is_ok() && from_catalog.is_ok() {
            summary.succeeded += 1;
        } else {
            summary.failed += 1;
        }
        summary
    }

    fn remove_songs(&mut self, songs: Vec<Song>) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for song in songs {
            let one = self.remove_song(&song.song_uid, &song.container_name, &song.object_name);
            summary.succeeded += one.succeeded;
            summary.failed += one.failed;
        }
        summary
    }

    /// # Errors
    ///
    /// [`JukeboxError::NotFound`] when neither store nor catalog knows the
    /// song.
    pub fn delete_song(&mut self, song_uid: &str) -> Result<BatchSummary> {
        let (container, object) = match self.catalog.retrieve_song(song_uid)? {
            Some(song) => (song.container_name, song.object_name),
            None => {
                let container = self.names.container_for_song(song_uid)?;
                let metadata = self.store.get_object_metadata(&container, song_uid);
                if metadata.is_err() {
                    return Err(JukeboxError::NotFound(format!("song '{song_uid}'")).into());
                }
                (container, song_uid.to_string())
            }
        };
        Ok(self.remove_song(song_uid, &container, &object))
    }

    pub fn delete_artist(&mut self, artist: &str) -> Result<BatchSummary> {
        let songs = self.catalog.songs_for_deletion(Some(artist), None)?;
        if songs.is_empty() {
            return Err(JukeboxError::NotFound(format!("songs by '{artist}'")).into());
        }
        info!("Deleting {} song(s) by {artist}", songs.len());
        Ok(self.remove_songs(songs))
    }

    /// Delete every song under an album key such as `The-Who--Whos-Next`,
    /// and the album's document.
    pub fn delete_album(&mut self, album_key: &str) -> Result<BatchSummary> {
        let songs = self.catalog.songs_for_deletion(None, Some(album_key))?;
        let albums = self.names.albums();
        let document = Album::object_name(album_key);
        let has_document = self.store.get_object_metadata(&albums, &document).is_ok();
        if songs.is_empty() && !has_document {
            return Err(JukeboxError::NotFound(format!("album '{album_key}'")).into());
        }

        info!("Deleting {} song(s) of album {album_key}", songs.len());
        let mut summary = self.remove_songs(songs);
        if has_document {
            match self.store.delete_object(&albums, &document) {
                Ok(()) => debug!("Deleted album document {document}"),
                Err(e) => {
                    warn!("Failed to delete album document {document}: {e:#}");
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }

    pub fn delete_playlist(&mut self, name: &str) -> Result<BatchSummary> {
        let uid = self
            .catalog
            .get_playlist_uid(name)?
            .ok_or_else(|| JukeboxError::NotFound(format!("playlist '{name}'")))?;

        let mut summary = BatchSummary::default();
        let from_store = self.store.delete_object(&self.names.playlists(), &uid);
        if let Err(e) = &from_store {
            warn!("Failed to delete playlist document {uid}: {e:#}");
        }
        let from_catalog = self.catalog.delete_playlist(name);
        if let Err(e) = &from_catalog {
            warn!("Failed to delete playlist row {name}: {e:#}");
        }
        if from_store.is_ok() && from_catalog.is_ok() {
            summary.succeeded += 1;
        } else {
            summary.failed += 1;
        }
        Ok(summary)
    }
}
