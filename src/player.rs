//! # Player
//!
//! Plays one cached song at a time through an external audio program:
//!
//! | Platform | Command |
//! |---|---|
//! | macOS | `afplay <file>` |
//! | Linux, BSD | `mplayer -novideo -nolirc -really-quiet <file>` |
//! | Windows | `mpc-hc64 <file> /play /close /minimized` |
//!
//! The running process is parked in the session's player slot so control
//! events can kill it from another thread. Without an audio program the
//! player simulates playback by waiting a fixed duration, which a kill cuts
//! short the same way.

use crate::cache::LocalCache;
use crate::controller::SessionState;
use crate::error::JukeboxError;
use crate::song::Song;
use anyhow::Result;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::sleep;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// What is currently making noise.
#[derive(Debug)]
pub enum AudioHandle {
    Process(Child),
    /// Set the flag to end a simulated play early.
    Simulated(Arc<AtomicBool>),
}

impl AudioHandle {
    pub fn kill(&mut self) {
        match self {
            AudioHandle::Process(child) => {
                if let Err(e) = child.kill() {
                    debug!("Audio process already gone: {e}");
                }
            }
            AudioHandle::Simulated(cancelled) => cancelled.store(true, Ordering::SeqCst),
        }
    }
}

/// The external program and its arguments around the file path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioCommand {
    pub program: PathBuf,
    pub leading_args: Vec<String>,
    pub trailing_args: Vec<String>,
}

impl AudioCommand {
    /// Program name and arguments for this platform.
    pub fn platform_default() -> (&'static str, &'static [&'static str], &'static [&'static str]) {
        if cfg!(target_os = "macos") {
            ("afplay", &[], &[])
        } else if cfg!(windows) {
            ("mpc-hc64", &[], &["/play", "/close", "/minimized"])
        } else {
            ("mplayer", &["-novideo", "-nolirc", "-really-quiet"], &[])
        }
    }

    /// Locate the platform's audio program on `PATH`.
    pub fn detect() -> Option<Self> {
        let (name, leading, trailing) = Self::platform_default();
        match which::which(name) {
            Ok(program) => {
                debug!("Audio player found at {}", program.display());
                Some(Self {
                    program,
                    leading_args: leading.iter().map(|s| s.to_string()).collect(),
                    trailing_args: trailing.iter().map(|s| s.to_string()).collect(),
                })
            }
            Err(_) => {
                warn!("{}", JukeboxError::PlayerUnavailable(format!("'{name}' not found on PATH")));
                None
            }
        }
    }

    fn spawn(&self, file: &Path) -> std::io::Result<Child> {
        Command::new(&self.program)
            .args(&self.leading_args)
            .arg(file)
            .args(&self.trailing_args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
    }
}

pub struct Player {
    command: Option<AudioCommand>,
    simulated_play: Duration,
}

impl Player {
    /// Use the platform's audio program if present, simulation otherwise.
    pub fn new(simulated_play: Duration) -> Self {
        Self { command: AudioCommand::detect(), simulated_play }
    }

    /// Never spawn anything; every song lasts `simulated_play`.
    pub fn simulated(simulated_play: Duration) -> Self {
        Self { command: None, simulated_play }
    }

    pub fn with_command(command: AudioCommand, simulated_play: Duration) -> Self {
        Self { command: Some(command), simulated_play }
    }

    pub fn is_simulated(&self) -> bool {
        self.command.is_none()
    }

    /// Play a cached song, blocking until it ends or is killed. Unless the
    /// session is paused afterwards, the song's file is evicted.
    ///
    /// # Errors
    ///
    /// [`JukeboxError::NotFound`] when the song is not in the cache.
    pub fn play(&mut self, song: &Song, cache: &LocalCache, state: &SessionState) -> Result<()> {
        if !cache.has(&song.song_uid) {
            return Err(JukeboxError::NotFound(format!("cached song '{}'", song.song_uid)).into());
        }
        let file = cache.path_for(&song.song_uid);

        let spawned = match &self.command {
            Some(command) => match command.spawn(&file) {
                Ok(child) => Some(child),
                Err(e) => {
                    warn!(
                        "{}",
                        JukeboxError::PlayerUnavailable(format!(
                            "{}: {e}",
                            command.program.display()
                        ))
                    );
                    None
                }
            },
            None => None,
        };

        match spawned {
            Some(child) => self.wait_for_process(child, state),
            None => {
                if self.command.take().is_some() {
                    info!("Falling back to simulated playback");
                }
                self.simulate(state);
            }
        }

        if !state.is_paused() {
            cache.evict(&song.song_uid)?;
        }
        Ok(())
    }

    fn wait_for_process(&self, child: Child, state: &SessionState) {
        state.set_player(AudioHandle::Process(child));
        // A pause or quit that landed before the handle was parked.
        if state.is_paused() || state.is_exit_requested() {
            state.kill_player();
        }

        loop {
            let finished = state.with_player(|handle| match handle {
                Some(AudioHandle::Process(child)) => match child.try_wait() {
                    Ok(Some(status)) => {
                        if !status.success() {
                            debug!("Audio process ended with {status}");
                        }
                        true
                    }
                    Ok(None) => false,
                    Err(e) => {
                        warn!("Lost track of audio process: {e}");
                        true
                    }
                },
                _ => true,
            });
            if finished {
                break;
            }
            sleep(POLL_INTERVAL);
        }
        state.clear_player();
    }

    fn simulate(&self, state: &SessionState) {
        let cancelled = Arc::new(AtomicBool::new(false));
        state.set_player(AudioHandle::Simulated(Arc::clone(&cancelled)));
        if state.is_paused() || state.is_exit_requested() {
            state.kill_player();
        }

        let started = Instant::now();
        while !cancelled.load(Ordering::SeqCst) {
            let elapsed = started.elapsed();
            if elapsed >= self.simulated_play {
                break;
            }
            sleep(POLL_INTERVAL.min(self.simulated_play - elapsed));
        }
        state.clear_player();
    }
}
