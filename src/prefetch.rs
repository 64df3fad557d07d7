//! # Prefetching
//!
//! Keeps up to N songs downloaded ahead of the one playing, so the next song
//! can start without waiting on the object store.
//!
//! A batch runs on its own thread. It counts complete cache entries other
//! than the playing song; if fewer than N, it walks the song list from the
//! next index (wrapping, stopping before the current one) and downloads the
//! missing songs until N are ahead. The first failure ends the batch and the
//! song is not retried for the rest of the pass. Batches never delete files,
//! so the cache holds at most N + 1 songs.

use crate::cache::LocalCache;
use crate::controller::SessionState;
use crate::error::JukeboxError;
use crate::song::Song;
use crate::storage::StorageSystem;
use crate::transform::Pipeline;
use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::fs;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Byte and time counters for the most recent batch.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PrefetchStats {
    pub songs: usize,
    pub bytes: u64,
    pub elapsed: Duration,
}

impl PrefetchStats {
    /// Bytes per second, when anything was downloaded.
    pub fn throughput(&self) -> Option<f64> {
        let secs = self.elapsed.as_secs_f64();
        (self.bytes > 0 && secs > 0.0).then(|| self.bytes as f64 / secs)
    }

    pub fn summary(&self) -> String {
        match self.throughput() {
            Some(rate) => format!(
                "last prefetch: {} song(s), {} bytes at {:.1} KiB/s",
                self.songs,
                self.bytes,
                rate / 1024.0
            ),
            None => "last prefetch: nothing downloaded".to_string(),
        }
    }
}

/// Moves one song from the object store into the play cache.
pub struct SongFetcher {
    store: Arc<StorageSystem>,
    cache: LocalCache,
    pipeline: Pipeline,
    check_integrity: bool,
}

impl SongFetcher {
    pub fn new(
        store: Arc<StorageSystem>,
        cache: LocalCache,
        pipeline: Pipeline,
        check_integrity: bool,
    ) -> Self {
        Self { store, cache, pipeline, check_integrity }
    }

    pub fn cache(&self) -> &LocalCache {
        &self.cache
    }

    /// Download, restore and optionally verify `song`. Returns the number of
    /// bytes pulled from the store.
    ///
    /// With integrity checks on, the stored byte count is checked against
    /// `stored_size` and the MD5 of the restored bytes against `md5_hash`. All
    /// of this happens on the staged download; the song only becomes visible
    /// in the cache once it passed.
    ///
    /// # Errors
    ///
    /// [`JukeboxError::CorruptDownload`] on a failed check, otherwise whatever
    /// the store reported.
    pub fn fetch(&self, song: &Song) -> Result<u64> {
        let uid = song.song_uid.as_str();
        if song.compressed != self.pipeline.compresses() || song.encrypted != self.pipeline.encrypts()
        {
            return Err(JukeboxError::ConfigInvalid(format!(
                "'{uid}' was stored with compressed={} encrypted={}, which this session cannot read",
                song.compressed, song.encrypted
            ))
            .into());
        }

        let staging = self.cache.staging_path(uid);
        let written = self
            .store
            .get_object(&song.container_name, &song.object_name, &staging)
            .with_context(|| format!("Failed to download {uid}"))
            .and_then(|written| {
                self.check_staged(song, written)?;
                Ok(written)
            });
        match written {
            Ok(written) => {
                debug!("Fetched {uid} ({written} bytes)");
                Ok(written)
            }
            Err(e) => {
                self.cache.discard_staged(uid);
                Err(e)
            }
        }
    }

    /// Size check, restore and MD5 check on the staged file, then commit.
    fn check_staged(&self, song: &Song, written: u64) -> Result<()> {
        let uid = song.song_uid.as_str();
        if self.check_integrity && written != song.stored_size {
            return Err(JukeboxError::CorruptDownload(format!(
                "{uid}: downloaded {written} bytes, catalog says {}",
                song.stored_size
            ))
            .into());
        }

        if !self.pipeline.is_identity() {
            let staging = self.cache.staging_path(uid);
            let stored = fs::read(&staging)
                .with_context(|| format!("Failed to read {}", staging.display()))?;
            let source =
                self.pipeline.decode(&stored).with_context(|| format!("Failed to restore {uid}"))?;
            fs::write(&staging, source)
                .with_context(|| format!("Failed to write {}", staging.display()))?;
        }

        if self.check_integrity && !self.cache.verify_md5(uid, &song.md5_hash)? {
            return Err(JukeboxError::CorruptDownload(format!(
                "{uid}: md5 does not match catalog {}",
                song.md5_hash
            ))
            .into());
        }
        self.cache.commit_staged(uid)
    }
}

/// Indices of the songs the next batch should download, in order.
pub fn plan_batch(state: &SessionState, cache: &LocalCache, depth: usize) -> Result<Vec<usize>> {
    let songs = state.songs();
    if songs.len() < 2 {
        return Ok(Vec::new());
    }
    let index = state.index();
    let current_uid = songs[index].song_uid.as_str();

    let ahead = cache
        .ready_entries()?
        .iter()
        .filter(|uid| uid.as_str() != current_uid)
        .count();
    if ahead >= depth {
        return Ok(Vec::new());
    }
    let budget = depth - ahead;

    let mut planned = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    for step in 1..songs.len() {
        if planned.len() >= budget {
            break;
        }
        let candidate = (index + step) % songs.len();
        let uid = songs[candidate].song_uid.as_str();
        if uid == current_uid || cache.has(uid) || state.has_failed(uid) || !seen.insert(uid) {
            continue;
        }
        planned.push(candidate);
    }
    Ok(planned)
}

fn run_batch(fetcher: &SongFetcher, state: &SessionState, depth: usize) {
    let planned = match plan_batch(state, fetcher.cache(), depth) {
        Ok(planned) => planned,
        Err(e) => {
            warn!("Prefetch skipped: {e:#}");
            return;
        }
    };
    if planned.is_empty() {
        return;
    }

    let started = Instant::now();
    let mut stats = PrefetchStats::default();
    state.set_prefetch_stats(stats);

    for song_index in planned {
        if state.is_exit_requested() {
            debug!("Prefetch stopped, exit requested");
            break;
        }
        let song = &state.songs()[song_index];
        if fetcher.cache().has(&song.song_uid) {
            continue;
        }
        match fetcher.fetch(song) {
            Ok(bytes) => {
                stats.songs += 1;
                stats.bytes += bytes;
                stats.elapsed = started.elapsed();
                state.set_prefetch_stats(stats);
            }
            Err(e) => {
                warn!("Prefetch of {} failed: {e:#}", song.song_uid);
                state.mark_failed(&song.song_uid);
                break;
            }
        }
    }

    if stats.songs > 0 {
        info!(
            "Prefetched {} song(s), {} bytes in {:.2}s",
            stats.songs,
            stats.bytes,
            stats.elapsed.as_secs_f64()
        );
    }
}

/// Owner of the background batch thread.
pub struct Prefetcher {
    fetcher: Arc<SongFetcher>,
    state: Arc<SessionState>,
    depth: usize,
    batch: Option<JoinHandle<()>>,
}

impl Prefetcher {
    pub fn new(fetcher: Arc<SongFetcher>, state: Arc<SessionState>, depth: usize) -> Self {
        Self { fetcher, state, depth, batch: None }
    }

    /// Wait for the previous batch, then start the next one in the
    /// background.
    pub fn ensure_ahead(&mut self) -> Result<()> {
        if self.batch.as_ref().is_some_and(|batch| !batch.is_finished()) {
            debug!("Waiting for the previous prefetch batch");
        }
        self.join();

        let fetcher = Arc::clone(&self.fetcher);
        let state = Arc::clone(&self.state);
        let depth = self.depth;
        let batch = thread::Builder::new()
            .name("jukebox-prefetch".to_string())
            .spawn(move || run_batch(&fetcher, &state, depth))
            .context("Failed to spawn prefetch thread")?;
        self.batch = Some(batch);
        Ok(())
    }

    /// Wait for the running batch, if any.
    pub fn join(&mut self) {
        if let Some(batch) = self.batch.take() {
            if batch.join().is_err() {
                warn!("Prefetch thread panicked");
            }
        }
    }
}

impl Drop for Prefetcher {
    fn drop(&mut self) {
        self.join();
    }
}
