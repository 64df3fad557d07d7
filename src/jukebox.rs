//! # Jukebox Session
//!
//! One connected store plus the local catalog, and every command that needs
//! both. The catalog is mirrored to the metadata container:
//!
//! - on [`Jukebox::enter`] it is downloaded when missing locally or when the
//!   remote copy's `catalog_modified` header is newer than the local file;
//! - after every mutating command it is uploaded in full.
//!
//! Downloads land in a `.download` file first and are renamed into place.

use crate::cache::LocalCache;
use crate::config::{Credentials, JukeboxOptions, JukeboxPaths, DEFAULT_DB_FILE_NAME, DOWNLOAD_EXTENSION};
use crate::control::ControlSources;
use crate::controller::{self, Controller, SessionSettings};
use crate::db::Catalog;
use crate::error::JukeboxError;
use crate::importer::{BatchSummary, Importer};
use crate::library::{Album, Playlist};
use crate::name_codec::ContainerNames;
use crate::player::Player;
use crate::prefetch::SongFetcher;
use crate::song::Song;
use crate::storage::{PropertySet, PropertyValue, StorageSystem};
use crate::transform::Pipeline;
use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

/// Header carrying the catalog's modification time, in unix seconds.
pub const CATALOG_MODIFIED_HEADER: &str = "catalog_modified";

fn mtime_secs(path: &Path) -> Option<i64> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    let secs = modified.duration_since(UNIX_EPOCH).ok()?.as_secs();
    i64::try_from(secs).ok()
}

pub struct Jukebox {
    options: JukeboxOptions,
    paths: JukeboxPaths,
    names: ContainerNames,
    store: Arc<StorageSystem>,
    pipeline: Pipeline,
    catalog: Option<Catalog>,
}

impl Jukebox {
    /// Validate the options and open the configured store.
    ///
    /// # Errors
    ///
    /// [`JukeboxError::ConfigInvalid`] for bad options and
    /// [`JukeboxError::StoreUnavailable`] when the store cannot be entered.
    pub fn connect(options: JukeboxOptions, paths: JukeboxPaths) -> Result<Self> {
        options.validate()?;
        let creds = Credentials::load(&paths, options.storage_type)?;
        let names = ContainerNames::new(creds.container_prefix());
        let pipeline = Pipeline::from_options(&options)?;

        let mut store = StorageSystem::connect(options.storage_type, &creds)?;
        store.enter().context("Failed to enter object storage")?;
        info!("Connected to {} storage", store.backend_name());

        Ok(Self { options, paths, names, store: Arc::new(store), pipeline, catalog: None })
    }

    pub fn names(&self) -> &ContainerNames {
        &self.names
    }

    pub fn paths(&self) -> &JukeboxPaths {
        &self.paths
    }

    pub fn store(&self) -> &StorageSystem {
        &self.store
    }

    /// Bring the local catalog up to date and open it.
    pub fn enter(&mut self) -> Result<()> {
        if self.catalog.is_some() {
            return Ok(());
        }
        self.download_catalog(false)?;
        let mut catalog = Catalog::open(&self.paths.metadata_db_file())?;
        catalog.set_pipeline(self.pipeline.compresses(), self.pipeline.encrypts());
        self.catalog = Some(catalog);
        Ok(())
    }

    /// Close the catalog and release the store.
    pub fn exit(mut self) -> Result<()> {
        if let Some(catalog) = self.catalog.take() {
            catalog.close()?;
        }
        self.store.exit();
        Ok(())
    }

    pub fn catalog(&self) -> Result<&Catalog> {
        self.catalog
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("catalog used before enter"))
    }

    /// Create every container that does not exist yet. Returns how many
    /// were created.
    pub fn init_storage(&self) -> Result<usize> {
        let mut created = 0;
        for name in self.names.all() {
            if self.store.has_container(&name)? {
                debug!("Container {name} already exists");
            } else {
                self.store.create_container(&name)?;
                created += 1;
            }
        }
        info!("init-storage created {created} container(s)");
        Ok(created)
    }

    /// Fetch the remote catalog when forced, when there is no local copy, or
    /// when the remote copy is newer. Returns whether a download happened.
    fn download_catalog(&self, force: bool) -> Result<bool> {
        let container = self.names.metadata();
        let local = self.paths.metadata_db_file();

        if !self.store.has_container(&container)? {
            debug!("No metadata container {container}; using local catalog");
            return Ok(false);
        }
        let remote = match self.store.get_object_metadata(&container, DEFAULT_DB_FILE_NAME) {
            Ok(headers) => headers,
            Err(e) => match JukeboxError::kind_of(&e) {
                Some(JukeboxError::NotFound(_)) => {
                    debug!("No remote catalog yet");
                    return Ok(false);
                }
                _ => return Err(e),
            },
        };

        let wanted = force
            || !local.exists()
            || match (remote.get_long(CATALOG_MODIFIED_HEADER), mtime_secs(&local)) {
                (Some(remote_secs), Some(local_secs)) => remote_secs > local_secs,
                _ => false,
            };
        if !wanted {
            return Ok(false);
        }

        let staging = PathBuf::from(format!("{}.{DOWNLOAD_EXTENSION}", local.display()));
        if let Err(e) = self.store.get_object(&container, DEFAULT_DB_FILE_NAME, &staging) {
            let _ = fs::remove_file(&staging);
            return Err(e).context("Failed to download catalog");
        }
        fs::rename(&staging, &local)
            .with_context(|| format!("Failed to move catalog into {}", local.display()))?;
        info!("Downloaded catalog from {container}");
        Ok(true)
    }

    /// `retrieve-catalog`: replace the local catalog with the remote one.
    pub fn retrieve_catalog(&mut self) -> Result<()> {
        if let Some(catalog) = self.catalog.take() {
            catalog.close()?;
        }
        if !self.download_catalog(true)? {
            return Err(JukeboxError::NotFound(format!(
                "catalog in container '{}'",
                self.names.metadata()
            ))
            .into());
        }
        self.enter()
    }

    /// Upload the catalog file to the metadata container, stamped with its
    /// modification time.
    pub fn upload_catalog(&self) -> Result<()> {
        let local = self.paths.metadata_db_file();
        let bytes =
            fs::read(&local).with_context(|| format!("Failed to read catalog {}", local.display()))?;
        let container = self.names.metadata();
        if !self.store.has_container(&container)? {
            self.store.create_container(&container)?;
        }

        let mut headers = PropertySet::new();
        headers.add(
            CATALOG_MODIFIED_HEADER,
            PropertyValue::Long(mtime_secs(&local).unwrap_or_default()),
        );
        self.store
            .put_object(&container, DEFAULT_DB_FILE_NAME, &bytes, Some(&headers))
            .context("Failed to upload catalog")?;
        info!("Uploaded catalog ({} bytes) to {container}", bytes.len());
        Ok(())
    }

    /// Best-effort upload after a mutating command.
    fn upload_catalog_after(&self, summary: &BatchSummary) {
        if summary.succeeded == 0 && summary.failed == 0 {
            return;
        }
        if let Err(e) = self.upload_catalog() {
            warn!("Catalog upload failed: {e:#}");
        }
    }

    fn with_importer<F>(&mut self, command: F) -> Result<BatchSummary>
    where
        F: FnOnce(&mut Importer<'_>) -> Result<BatchSummary>,
    {
        let show_progress = !self.options.debug;
        let catalog = self
            .catalog
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("catalog used before enter"))?;
        let mut importer = Importer::new(&self.store, catalog, &self.names, &self.pipeline)
            .with_progress(show_progress);
        let summary = command(&mut importer)?;
        self.upload_catalog_after(&summary);
        Ok(summary)
    }

    pub fn import_songs(&mut self) -> Result<BatchSummary> {
        let dir = self.paths.song_import_dir();
        self.with_importer(|importer| importer.import_songs(&dir))
    }

    pub fn import_playlists(&mut self) -> Result<BatchSummary> {
        let dir = self.paths.playlist_import_dir();
        self.with_importer(|importer| importer.import_playlists(&dir))
    }

    /// Images and album documents from `album-art-import/`.
    pub fn import_album_art(&mut self) -> Result<BatchSummary> {
        let dir = self.paths.album_art_import_dir();
        self.with_importer(|importer| importer.import_album_art(&dir))
    }

    pub fn delete_song(&mut self, song_uid: &str) -> Result<BatchSummary> {
        self.with_importer(|importer| importer.delete_song(song_uid))
    }

    pub fn delete_artist(&mut self, artist: &str) -> Result<BatchSummary> {
        self.with_importer(|importer| importer.delete_artist(artist))
    }

    pub fn delete_album(&mut self, album_key: &str) -> Result<BatchSummary> {
        self.with_importer(|importer| importer.delete_album(album_key))
    }

    pub fn delete_playlist(&mut self, name: &str) -> Result<BatchSummary> {
        self.with_importer(|importer| importer.delete_playlist(name))
    }

    pub fn list_songs(&self, out: &mut impl Write) -> Result<usize> {
        self.catalog()?.show_listings(out)
    }

    pub fn list_artists(&self, out: &mut impl Write) -> Result<usize> {
        self.catalog()?.show_artists(out)
    }

    pub fn list_albums(&self, out: &mut impl Write) -> Result<usize> {
        self.catalog()?.show_albums(out)
    }

    pub fn list_genres(&self, out: &mut impl Write) -> Result<usize> {
        self.catalog()?.show_genres(out)
    }

    pub fn list_playlists(&self, out: &mut impl Write) -> Result<usize> {
        self.catalog()?.show_playlists(out)
    }

    pub fn list_containers(&self, out: &mut impl Write) -> Result<usize> {
        let names = self.store.get_container_names()?;
        for name in &names {
            writeln!(out, "{name}")?;
        }
        Ok(names.len())
    }

    /// Read a whole object into memory through a temporary file.
    fn read_object(&self, container: &str, object: &str) -> Result<Vec<u8>> {
        fs::create_dir_all(&self.paths.base_dir)?;
        let temp = tempfile::NamedTempFile::new_in(&self.paths.base_dir)
            .context("Failed to create temporary file")?;
        self.store.get_object(container, object, temp.path())?;
        fs::read(temp.path()).with_context(|| format!("Failed to read {container}/{object}"))
    }

    pub fn load_album(&self, album_key: &str) -> Result<Album> {
        let bytes = self.read_object(&self.names.albums(), &Album::object_name(album_key))?;
        Album::from_json(&bytes)
    }

    pub fn load_playlist(&self, name: &str) -> Result<Playlist> {
        let uid = self
            .catalog()?
            .get_playlist_uid(name)?
            .ok_or_else(|| JukeboxError::NotFound(format!("playlist '{name}'")))?;
        let bytes = self.read_object(&self.names.playlists(), &uid)?;
        Playlist::from_json(&bytes)
    }

    pub fn show_album(&self, album_key: &str, out: &mut impl Write) -> Result<()> {
        let album = self.load_album(album_key)?;
        writeln!(out, "Album: {} ({})", album.album, album.artist)?;
        if !album.year.is_empty() {
            writeln!(out, "Year: {}", album.year)?;
        }
        if !album.genre.is_empty() {
            writeln!(out, "Genre: {}", album.genre.join(", "))?;
        }
        if !album.album_art.is_empty() {
            writeln!(out, "Album art: {}", album.album_art)?;
        }
        for track in &album.tracks {
            writeln!(out, "{:>3}. {} [{}]", track.number, track.title, track.length)?;
        }
        Ok(())
    }

    pub fn show_playlist(&self, name: &str, out: &mut impl Write) -> Result<()> {
        let playlist = self.load_playlist(name)?;
        writeln!(out, "Playlist: {}", playlist.name)?;
        if !playlist.tags.is_empty() {
            writeln!(out, "Tags: {}", playlist.tags)?;
        }
        for entry in &playlist.songs {
            writeln!(out, "{} - {} ({})", entry.artist, entry.song, entry.album)?;
        }
        Ok(())
    }

    /// Songs for `play`, `shuffle-play` and `play-album`.
    pub fn songs_for(&self, artist: Option<&str>, album: Option<&str>) -> Result<Vec<Song>> {
        self.catalog()?
            .retrieve_songs(artist, album)
            .context("Failed to build play list")
    }

    /// Resolve a playlist's entries to catalogued songs this session can
    /// play, in playlist order.
    pub fn songs_for_playlist(&self, name: &str) -> Result<Vec<Song>> {
        let playlist = self.load_playlist(name)?;
        let catalog = self.catalog()?;
        let mut songs = Vec::new();
        for entry in &playlist.songs {
            let key = entry.song_key();
            match catalog.find_song_by_key(&key)? {
                Some(song)
                    if song.compressed == self.pipeline.compresses()
                        && song.encrypted == self.pipeline.encrypts() =>
                {
                    songs.push(song)
                }
                Some(_) => warn!("Playlist entry {key} is stored with other transforms"),
                None => warn!("Playlist entry {key} is not in the catalog"),
            }
        }
        Ok(songs)
    }

    /// Run a play session over `songs`. Returns the uids played.
    pub fn play(&self, mut songs: Vec<Song>, shuffle: bool) -> Result<Vec<String>> {
        if songs.is_empty() {
            println!("No songs to play");
            return Ok(Vec::new());
        }
        if shuffle {
            let seed = controller::shuffle_songs(&mut songs, self.options.shuffle_seed);
            info!("Shuffle seed {seed}");
        }

        let cache = LocalCache::new(self.paths.song_play_dir());
        let fetcher = SongFetcher::new(
            Arc::clone(&self.store),
            cache,
            self.pipeline.clone(),
            self.options.check_data_integrity,
        );
        let player = if self.options.simulate_audio {
            Player::simulated(self.options.simulated_play)
        } else {
            Player::new(self.options.simulated_play)
        };
        let settings = SessionSettings {
            depth: self.options.file_cache_count,
            repeat: self.options.repeat,
            sources: ControlSources {
                signals: self.options.handle_signals,
                http_port: self.options.http_port,
            },
            pid_file: self.paths.pid_file(),
        };

        Controller::new(songs, fetcher, player, settings).run()
    }
}
