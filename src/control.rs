//! # Control Sources
//!
//! Pause, skip, terminate and show-info requests arrive asynchronously from
//! outside the play loop. Every source turns them into a [`ControlEvent`] and
//! posts it to one mailbox; the controller drains that mailbox and is the
//! only place the events take effect.
//!
//! ## Sources
//!
//! | Source | Event |
//! |---|---|
//! | `SIGUSR1` | [`ControlEvent::TogglePause`] |
//! | `SIGUSR2` | [`ControlEvent::SkipNext`] |
//! | `SIGINT` | [`ControlEvent::Terminate`] |
//! | `SIGWINCH` | [`ControlEvent::ShowInfo`] |
//! | `GET`/`POST /togglePausePlay` | [`ControlEvent::TogglePause`] |
//! | `GET`/`POST /songAdvance` | [`ControlEvent::SkipNext`] |
//!
//! Both run on a single-threaded tokio runtime inside a dedicated thread.
//! The HTTP listener binds to localhost only.

use anyhow::{Context, Result};
use axum::extract::State;
use axum::routing::get;
use axum::Router;
use log::{debug, info, warn};
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};
use tokio::sync::oneshot;

/// A request to change what the play loop is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    TogglePause,
    SkipNext,
    Terminate,
    ShowInfo,
}

/// Which control sources a session listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlSources {
    pub signals: bool,
    pub http_port: Option<u16>,
}

impl ControlSources {
    /// Nothing but the in-process mailbox.
    pub fn none() -> Self {
        Self { signals: false, http_port: None }
    }

    fn is_empty(&self) -> bool {
        !self.signals && self.http_port.is_none()
    }
}

/// Running control sources. Dropping it stops them.
pub struct ControlListener {
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl Drop for ControlListener {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Control thread panicked");
            }
        }
    }
}

/// Start the requested sources, each posting into `mailbox`.
///
/// A port that cannot be bound is logged and skipped; playback does not
/// depend on the endpoint.
pub fn listen(sources: ControlSources, mailbox: Sender<ControlEvent>) -> Result<ControlListener> {
    if sources.is_empty() {
        debug!("No control sources requested");
        return Ok(ControlListener { shutdown: None, thread: None });
    }

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<()>>();

    let thread = thread::Builder::new()
        .name("jukebox-control".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    let _ = ready_tx
                        .send(Err(anyhow::Error::new(e).context("Failed to start control runtime")));
                    return;
                }
            };

            runtime.block_on(async move {
                if sources.signals {
                    if let Err(e) = listen_for_signals(&mailbox) {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                }
                if let Some(port) = sources.http_port {
                    serve_http(port, mailbox.clone()).await;
                }
                let _ = ready_tx.send(Ok(()));
                let _ = shutdown_rx.await;
                debug!("Control sources shutting down");
            });
        })
        .context("Failed to spawn control thread")?;

    let listener = ControlListener { shutdown: Some(shutdown_tx), thread: Some(thread) };
    match ready_rx.recv() {
        Ok(Ok(())) => Ok(listener),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(anyhow::anyhow!("Control thread exited during startup")),
    }
}

#[cfg(unix)]
fn listen_for_signals(mailbox: &Sender<ControlEvent>) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let bindings = [
        (SignalKind::user_defined1(), ControlEvent::TogglePause),
        (SignalKind::user_defined2(), ControlEvent::SkipNext),
        (SignalKind::interrupt(), ControlEvent::Terminate),
        (SignalKind::window_change(), ControlEvent::ShowInfo),
    ];

    for (kind, event) in bindings {
        let mut stream = signal(kind).context("Failed to install signal handler")?;
        let mailbox = mailbox.clone();
        tokio::spawn(async move {
            while stream.recv().await.is_some() {
                debug!("Signal received: {event:?}");
                if mailbox.send(event).is_err() {
                    break;
                }
            }
        });
    }
    info!("Listening for SIGUSR1 (pause), SIGUSR2 (skip), SIGINT (quit), SIGWINCH (info)");
    Ok(())
}

#[cfg(not(unix))]
fn listen_for_signals(mailbox: &Sender<ControlEvent>) -> Result<()> {
    let mailbox = mailbox.clone();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if mailbox.send(ControlEvent::Terminate).is_err() {
                break;
            }
        }
    });
    Ok(())
}

async fn toggle_pause_play(State(mailbox): State<Sender<ControlEvent>>) -> &'static str {
    post_event(&mailbox, ControlEvent::TogglePause)
}

async fn song_advance(State(mailbox): State<Sender<ControlEvent>>) -> &'static str {
    post_event(&mailbox, ControlEvent::SkipNext)
}

fn post_event(mailbox: &Sender<ControlEvent>, event: ControlEvent) -> &'static str {
    debug!("HTTP control request: {event:?}");
    match mailbox.send(event) {
        Ok(()) => "OK\n",
        Err(_) => "Session ended\n",
    }
}

/// The endpoint's routes, separate from binding so tests can drive them.
pub fn router(mailbox: Sender<ControlEvent>) -> Router {
    Router::new()
        .route("/togglePausePlay", get(toggle_pause_play).post(toggle_pause_play))
        .route("/songAdvance", get(song_advance).post(song_advance))
        .with_state(mailbox)
}

async fn serve_http(port: u16, mailbox: Sender<ControlEvent>) {
    let listener = match tokio::net::TcpListener::bind(("127.0.0.1", port)).await {
        Ok(listener) => listener,
        Err(e) => {
            warn!("Control endpoint disabled, cannot bind port {port}: {e}");
            return;
        }
    };
    info!("Control endpoint listening on http://127.0.0.1:{port}");

    let app = router(mailbox);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            warn!("Control endpoint stopped: {e}");
        }
    });
}
