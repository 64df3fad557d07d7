//! # Play Session
//!
//! Drives playback of a fixed song list. The controller owns the list and
//! the current index; a background [`Prefetcher`] reads both to stay ahead,
//! and the [`Player`] blocks on one song at a time.
//!
//! ## Control
//!
//! Control events are posted to a mailbox (see [`crate::control`]) and
//! applied by a dispatcher thread:
//!
//! - **TogglePause** flips `paused`; pausing kills the audio process so the
//!   loop regains control without advancing.
//! - **SkipNext** kills the audio process; the loop advances as usual.
//! - **Terminate** requests exit and kills the audio process.
//! - **ShowInfo** prints the next three songs and the last prefetch rate.
//!
//! ## Failures
//!
//! A song that cannot be downloaded or verified is skipped and not retried
//! until the list wraps around. Only the download of the first song, and a
//! list in which every song fails, end the session with an error.

use crate::cache::LocalCache;
use crate::control::{self, ControlEvent, ControlSources};
use crate::error::JukeboxError;
use crate::player::{AudioHandle, Player};
use crate::prefetch::{PrefetchStats, Prefetcher, SongFetcher};
use crate::song::Song;
use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, sleep};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const PAUSE_POLL: Duration = Duration::from_secs(1);
const DISPATCH_POLL: Duration = Duration::from_millis(100);
const INFO_SONG_COUNT: usize = 3;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State shared between the play loop, the prefetcher and the dispatcher.
///
/// Only the play loop moves the index. The flags are atomics; the audio
/// handle sits behind a mutex because it is killed from other threads.
#[derive(Debug)]
pub struct SessionState {
    songs: Vec<Song>,
    index: AtomicUsize,
    paused: AtomicBool,
    exit_requested: AtomicBool,
    player: Mutex<Option<AudioHandle>>,
    failed: Mutex<HashSet<String>>,
    history: Mutex<Vec<String>>,
    prefetch_stats: Mutex<PrefetchStats>,
}

impl SessionState {
    pub fn new(songs: Vec<Song>) -> Self {
        Self {
            songs,
            index: AtomicUsize::new(0),
            paused: AtomicBool::new(false),
            exit_requested: AtomicBool::new(false),
            player: Mutex::new(None),
            failed: Mutex::new(HashSet::new()),
            history: Mutex::new(Vec::new()),
            prefetch_stats: Mutex::new(PrefetchStats::default()),
        }
    }

    pub fn songs(&self) -> &[Song] {
        &self.songs
    }

    pub fn index(&self) -> usize {
        self.index.load(Ordering::SeqCst)
    }

    pub(crate) fn set_index(&self, index: usize) {
        self.index.store(index, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Flip the pause flag, returning the new value.
    pub fn toggle_pause(&self) -> bool {
        !self.paused.fetch_xor(true, Ordering::SeqCst)
    }

    pub fn is_exit_requested(&self) -> bool {
        self.exit_requested.load(Ordering::SeqCst)
    }

    pub fn request_exit(&self) {
        self.exit_requested.store(true, Ordering::SeqCst);
    }

    pub(crate) fn set_player(&self, handle: AudioHandle) {
        *lock(&self.player) = Some(handle);
    }

    pub(crate) fn clear_player(&self) {
        *lock(&self.player) = None;
    }

    pub(crate) fn with_player<R>(&self, f: impl FnOnce(&mut Option<AudioHandle>) -> R) -> R {
        f(&mut lock(&self.player))
    }

    pub fn has_player(&self) -> bool {
        lock(&self.player).is_some()
    }

    /// Stop whatever is playing. The handle stays in place for the player
    /// to reap.
    pub fn kill_player(&self) {
        if let Some(handle) = lock(&self.player).as_mut() {
            handle.kill();
        }
    }

    pub fn mark_failed(&self, song_uid: &str) {
        lock(&self.failed).insert(song_uid.to_string());
    }

    pub fn has_failed(&self, song_uid: &str) -> bool {
        lock(&self.failed).contains(song_uid)
    }

    fn clear_failed(&self) {
        lock(&self.failed).clear();
    }

    fn record_played(&self, song_uid: &str) {
        lock(&self.history).push(song_uid.to_string());
    }

    /// Uids handed to the player, in order.
    pub fn history(&self) -> Vec<String> {
        lock(&self.history).clone()
    }

    pub fn prefetch_stats(&self) -> PrefetchStats {
        *lock(&self.prefetch_stats)
    }

    pub(crate) fn set_prefetch_stats(&self, stats: PrefetchStats) {
        *lock(&self.prefetch_stats) = stats;
    }

    /// The songs after the current one, wrapping, at most `count`.
    pub fn upcoming(&self, count: usize) -> Vec<&Song> {
        let len = self.songs.len();
        let index = self.index();
        (1..len.min(count + 1))
            .map(|step| &self.songs[(index + step) % len])
            .collect()
    }

    /// What ShowInfo prints.
    pub fn info_text(&self) -> String {
        let mut text = String::new();
        let upcoming = self.upcoming(INFO_SONG_COUNT);
        if upcoming.is_empty() {
            text.push_str("No songs queued after this one\n");
        } else {
            text.push_str("Up next:\n");
            for (n, song) in upcoming.iter().enumerate() {
                let _ = writeln!(
                    text,
                    "  {}. {} ({})",
                    n + 1,
                    song.display_name(),
                    song.album_name()
                );
            }
        }
        let _ = writeln!(text, "{}", self.prefetch_stats().summary());
        text
    }
}

/// Apply one control event.
pub fn handle_event(state: &SessionState, event: ControlEvent, out: &mut impl Write) {
    match event {
        ControlEvent::TogglePause => {
            if state.toggle_pause() {
                info!("Paused");
                state.kill_player();
            } else {
                info!("Resumed");
            }
        }
        ControlEvent::SkipNext => {
            info!("Skipping");
            state.kill_player();
        }
        ControlEvent::Terminate => {
            info!("Terminating");
            state.request_exit();
            state.kill_player();
        }
        ControlEvent::ShowInfo => {
            if let Err(e) = out.write_all(state.info_text().as_bytes()).and_then(|()| out.flush()) {
                warn!("Failed to show info: {e}");
            }
        }
    }
}

/// Permute the list once. Returns the seed so a session can be replayed.
pub fn shuffle_songs(songs: &mut [Song], seed: Option<u64>) -> u64 {
    let seed = seed.unwrap_or_else(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default()
    });
    let mut rng = StdRng::seed_from_u64(seed);
    songs.shuffle(&mut rng);
    debug!("Shuffled {} songs with seed {seed}", songs.len());
    seed
}

/// `jukebox.pid` for the lifetime of a session. Removed on drop.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Write our pid, refusing when the file names a live process.
    ///
    /// # Errors
    ///
    /// [`JukeboxError::ConfigInvalid`] when another session is running.
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Ok(text) = fs::read_to_string(path) {
            match text.trim().parse::<i32>() {
                Ok(pid) if process_alive(pid) => {
                    return Err(JukeboxError::ConfigInvalid(format!(
                        "another jukebox session is running (pid {pid}, {})",
                        path.display()
                    ))
                    .into());
                }
                _ => warn!("Replacing stale pid file {}", path.display()),
            }
        }

        let pid = std::process::id();
        fs::write(path, format!("{pid}\n"))
            .with_context(|| format!("Failed to write pid file {}", path.display()))?;
        debug!("Session pid {pid} written to {}", path.display());
        Ok(Self { path: path.to_path_buf() })
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to remove pid file {}: {e}", self.path.display());
        }
    }
}

#[cfg(unix)]
fn process_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    // Signal 0 only checks that the process exists.
    let result = unsafe { libc::kill(pid, 0) };
    result == 0 || io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
fn process_alive(_pid: i32) -> bool {
    false
}

/// Knobs for one play session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Songs kept ready ahead of the current one.
    pub depth: usize,
    /// Start over after the last song.
    pub repeat: bool,
    pub sources: ControlSources,
    pub pid_file: PathBuf,
}

pub struct Controller {
    state: Arc<SessionState>,
    fetcher: Arc<SongFetcher>,
    player: Player,
    settings: SessionSettings,
    mailbox: Sender<ControlEvent>,
    inbox: Option<Receiver<ControlEvent>>,
}

impl Controller {
    pub fn new(songs: Vec<Song>, fetcher: SongFetcher, player: Player, settings: SessionSettings) -> Self {
        let (mailbox, inbox) = mpsc::channel();
        Self {
            state: Arc::new(SessionState::new(songs)),
            fetcher: Arc::new(fetcher),
            player,
            settings,
            mailbox,
            inbox: Some(inbox),
        }
    }

    pub fn state(&self) -> Arc<SessionState> {
        Arc::clone(&self.state)
    }

    /// Where control events for this session are posted.
    pub fn mailbox(&self) -> Sender<ControlEvent> {
        self.mailbox.clone()
    }

    fn cache(&self) -> &LocalCache {
        self.fetcher.cache()
    }

    /// Play until terminated, or until the end of the list without repeat.
    /// Returns the uids handed to the player.
    ///
    /// # Errors
    ///
    /// Fails when another session holds the pid file (the play directory is
    /// left untouched then), when the first song cannot be fetched, when
    /// every song in the list fails, or with [`JukeboxError::Interrupted`]
    /// when terminated before anything played.
    pub fn run(&mut self) -> Result<Vec<String>> {
        let song_count = self.state.songs().len();
        if song_count == 0 {
            info!("No songs to play");
            return Ok(Vec::new());
        }

        // The play directory belongs to whichever session holds the pid file.
        let _pid_file = PidFile::acquire(&self.settings.pid_file)?;
        self.cache().clear()?;

        let inbox = self
            .inbox
            .take()
            .context("Play session already ran on this controller")?;
        let stop_dispatch = Arc::new(AtomicBool::new(false));
        let dispatcher = {
            let state = Arc::clone(&self.state);
            let stop = Arc::clone(&stop_dispatch);
            thread::Builder::new()
                .name("jukebox-dispatch".to_string())
                .spawn(move || dispatch(&state, &inbox, &stop))
                .context("Failed to spawn dispatcher thread")?
        };
        let _listener = control::listen(self.settings.sources, self.mailbox.clone())?;

        let result = self.play_loop(song_count);

        stop_dispatch.store(true, Ordering::SeqCst);
        if dispatcher.join().is_err() {
            warn!("Dispatcher thread panicked");
        }
        result.map(|()| self.state.history())
    }

    fn play_loop(&mut self, song_count: usize) -> Result<()> {
        let first = &self.state.songs()[0];
        self.fetcher
            .fetch(first)
            .with_context(|| format!("Failed to download first song {}", first.song_uid))?;

        let mut prefetcher =
            Prefetcher::new(Arc::clone(&self.fetcher), Arc::clone(&self.state), self.settings.depth);
        let mut failures_in_a_row = 0;

        while !self.state.is_exit_requested() {
            if self.state.is_paused() {
                sleep(PAUSE_POLL);
                continue;
            }

            if let Err(e) = prefetcher.ensure_ahead() {
                warn!("{e:#}");
            }

            let index = self.state.index();
            let song = &self.state.songs()[index];
            if self.ready_to_play(song, &mut prefetcher) {
                failures_in_a_row = 0;
                info!("[{}/{song_count}] Now playing \"{}\"", index + 1, song.display_name());
                self.state.record_played(&song.song_uid);
                if let Err(e) = self.player.play(song, self.fetcher.cache(), &self.state) {
                    warn!("Playback of {} failed: {e:#}", song.song_uid);
                }
            } else {
                failures_in_a_row += 1;
                if failures_in_a_row >= song_count {
                    error!("Every song in the list failed to download");
                    return Err(JukeboxError::NotFound(
                        "no playable song in the list".to_string(),
                    )
                    .into());
                }
            }

            // Killed by a pause: replay the same song on resume.
            if self.state.is_paused() {
                continue;
            }

            let next = (index + 1) % song_count;
            if next == 0 {
                if !self.settings.repeat {
                    info!("Reached the end of the list");
                    break;
                }
                self.state.clear_failed();
            }
            self.state.set_index(next);
        }

        prefetcher.join();
        if self.state.is_exit_requested() && self.state.history().is_empty() {
            return Err(JukeboxError::Interrupted.into());
        }
        Ok(())
    }

    /// Make sure `song` is cached, fetching it now if the prefetcher has not.
    fn ready_to_play(&self, song: &Song, prefetcher: &mut Prefetcher) -> bool {
        if self.cache().has(&song.song_uid) {
            return true;
        }
        if self.state.has_failed(&song.song_uid) {
            warn!("Skipping {}, it failed earlier in this pass", song.song_uid);
            return false;
        }

        prefetcher.join();
        if self.cache().has(&song.song_uid) {
            return true;
        }
        match self.fetcher.fetch(song) {
            Ok(_) => true,
            Err(e) => {
                warn!("Skipping {}: {e:#}", song.song_uid);
                self.state.mark_failed(&song.song_uid);
                false
            }
        }
    }
}

fn dispatch(state: &SessionState, inbox: &Receiver<ControlEvent>, stop: &AtomicBool) {
    let mut stdout = io::stdout();
    loop {
        match inbox.recv_timeout(DISPATCH_POLL) {
            Ok(event) => {
                debug!("Control event: {event:?}");
                handle_event(state, event, &mut stdout);
            }
            Err(RecvTimeoutError::Timeout) => {
                if stop.load(Ordering::SeqCst) {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}
