//! Cloud Jukebox: a personal music library kept in object storage and played
//! back through a small local cache.
//!
//! Core modules:
//! - [`jukebox`] - Session facade: store and catalog lifecycle, commands
//! - [`controller`] - Play loop, session state and control events
//! - [`prefetch`] - Background download of upcoming songs
//! - [`player`] - External audio program (or simulated playback)
//! - [`importer`] - Song, playlist and album art ingest; delete commands
//! - [`db`] - SQLite catalog
//! - [`storage`] - Object store back-ends (filesystem, S3)
//!
//! ### Supporting Modules
//!
//! - [`name_codec`] - Artist/album/song keys and container names
//! - [`transform`] - Compression and encryption of stored songs
//! - [`cache`] - The play cache and MD5 digests
//! - [`control`] - Signal and HTTP sources of control events
//! - [`library`] - Album and playlist JSON documents
//! - [`config`] - Options, credentials and working-directory layout
//! - [`cli`] - Command-line interface definitions with clap integration
//! - [`completion`] - Shell completion generation
//!
//! ## Quick Start Example
//!
//! ```no_run
//! use jukebox::config::{JukeboxOptions, JukeboxPaths};
//! use jukebox::jukebox::Jukebox;
//!
//! let mut jukebox = Jukebox::connect(JukeboxOptions::default(), JukeboxPaths::new("."))?;
//! jukebox.enter()?;
//! jukebox.init_storage()?;
//! jukebox.import_songs()?;
//!
//! let songs = jukebox.songs_for(Some("The Who"), None)?;
//! jukebox.play(songs, true)?;
//! jukebox.exit()?;
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Error Handling
//!
//! Public functions return `anyhow::Result`; the failure kind, when there is
//! one, is a [`error::JukeboxError`] somewhere in the chain and can be found
//! with [`error::JukeboxError::kind_of`].

pub mod cache;
pub mod cli;
pub mod completion;
pub mod config;
pub mod control;
pub mod controller;
pub mod db;
pub mod error;
pub mod importer;
pub mod jukebox;
pub mod library;
pub mod name_codec;
pub mod player;
pub mod prefetch;
pub mod song;
pub mod storage;
pub mod transform;
