//! # Error Kinds
//!
//! Every failure the jukebox reports to a user falls into one of these kinds.
//! Operations return `anyhow::Result` and attach context as errors travel up;
//! the kind stays reachable through `downcast_ref` so `main` can decide on the
//! message and exit status, and the play loop can tell a per-song failure from
//! a session failure.

use thiserror::Error;

/// Error kinds raised by the jukebox.
#[derive(Error, Debug)]
pub enum JukeboxError {
    /// Bad flag combination or unusable configuration value.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// The object store could not be reached, authenticated, or is not built.
    #[error("storage unavailable: {0}")]
    StoreUnavailable(String),

    /// An object or catalog row does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A file name or song uid does not map onto a song container.
    #[error("bad shard key: {0}")]
    BadShardKey(String),

    /// Downloaded bytes failed the size or MD5 check.
    #[error("corrupt download: {0}")]
    CorruptDownload(String),

    /// SQL error from the catalog.
    #[error("catalog error: {0}")]
    Catalog(#[from] rusqlite::Error),

    /// The audio executable is missing or failed.
    #[error("player unavailable: {0}")]
    PlayerUnavailable(String),

    /// Terminate was requested while work was in progress.
    #[error("interrupted")]
    Interrupted,
}

impl JukeboxError {
    /// Find the jukebox error kind anywhere in an `anyhow` chain.
    pub fn kind_of(err: &anyhow::Error) -> Option<&JukeboxError> {
        err.chain().find_map(|cause| cause.downcast_ref::<JukeboxError>())
    }
}
