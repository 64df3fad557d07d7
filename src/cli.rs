//! # Command-Line Interface Module
//!
//! Subcommands and global flags for the jukebox, declared with clap derive
//! macros. Flags are global so they can appear before or after the
//! subcommand:
//!
//! ```bash
//! jukebox --storage s3 --compress import-songs
//! jukebox play-album --artist "The Who" --album "Whos Next"
//! jukebox shuffle-play --seed 42 --once
//! ```

use crate::config::JukeboxOptions;
use crate::storage::StorageType;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shell types supported for completion generation
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    /// Bash shell
    Bash,
    /// Zsh shell
    Zsh,
    /// Fish shell
    Fish,
    /// PowerShell
    PowerShell,
    /// Elvish shell
    Elvish,
}

/// Main application arguments structure.
#[derive(Parser, Debug)]
#[command(name = "jukebox")]
#[command(about = "Cloud Jukebox: your music library in object storage")]
#[command(version)]
#[command(disable_help_subcommand = true)]
pub struct Args {
    /// Log at debug level and hide progress bars
    #[arg(long, global = true)]
    pub debug: bool,

    /// Number of songs kept downloaded ahead of the player
    #[arg(long, global = true, value_name = "COUNT")]
    pub file_cache_count: Option<usize>,

    /// Verify sizes and MD5 digests of downloaded songs
    #[arg(long, global = true)]
    pub integrity_checks: bool,

    /// Compress songs on import; play only compressed songs
    #[arg(long, global = true)]
    pub compress: bool,

    /// Encrypt songs on import; play only encrypted songs
    #[arg(long, global = true)]
    pub encrypt: bool,

    /// Encryption passphrase
    #[arg(long, global = true, value_name = "KEY")]
    pub key: Option<String>,

    /// File holding the encryption passphrase
    #[arg(long, global = true, value_name = "PATH")]
    pub keyfile: Option<PathBuf>,

    /// Object storage back-end
    #[arg(long, global = true, value_enum, default_value_t = StorageType::Fs)]
    pub storage: StorageType,

    /// Restrict to one artist
    #[arg(long, global = true)]
    pub artist: Option<String>,

    /// Restrict to one album
    #[arg(long, global = true)]
    pub album: Option<String>,

    /// Song uid for `delete-song`
    #[arg(long, global = true)]
    pub song: Option<String>,

    /// Playlist name
    #[arg(long, global = true)]
    pub playlist: Option<String>,

    /// Seed for `shuffle-play`
    #[arg(long, global = true)]
    pub seed: Option<u64>,

    /// Stop after one pass instead of repeating the list
    #[arg(long, global = true)]
    pub once: bool,

    /// Working directory holding creds, catalog and import folders
    #[arg(long, global = true, value_name = "PATH")]
    pub directory: Option<PathBuf>,

    /// Never start the audio program; each song waits a fixed time
    #[arg(long, global = true)]
    pub simulate: bool,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

impl Args {
    /// Session options carried by the flags.
    pub fn options(&self) -> JukeboxOptions {
        let defaults = JukeboxOptions::default();
        JukeboxOptions {
            debug: self.debug,
            file_cache_count: self.file_cache_count.unwrap_or(defaults.file_cache_count),
            check_data_integrity: self.integrity_checks,
            use_compression: self.compress,
            use_encryption: self.encrypt,
            encryption_key: self.key.clone(),
            encryption_keyfile: self.keyfile.clone(),
            storage_type: self.storage,
            shuffle_seed: self.seed,
            repeat: !self.once,
            simulate_audio: self.simulate,
            ..defaults
        }
    }

    pub fn base_dir(&self) -> PathBuf {
        self.directory.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    /// Positional target of a delete command, falling back to its flag.
    pub fn delete_target(&self) -> Option<String> {
        let (positional, flag) = match &self.command {
            Command::DeleteSong { target } => (target, &self.song),
            Command::DeleteArtist { target } => (target, &self.artist),
            Command::DeleteAlbum { target } => (target, &self.album),
            Command::DeletePlaylist { target } => (target, &self.playlist),
            _ => return None,
        };
        positional.clone().or_else(|| flag.clone())
    }
}

/// Enumeration of all available subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Upload every song file in `song-import/`
    ///
    /// File names must be `Artist--Album--Song.ext` with spaces written as
    /// dashes.
    ImportSongs,

    /// Upload every playlist JSON in `playlist-import/`
    ImportPlaylists,

    /// Upload every image in `album-art-import/`
    ImportAlbumArt,

    /// Play the catalog, optionally restricted with --artist
    Play,

    /// Play in random order (reproducible with --seed)
    ShufflePlay,

    /// Play one album (--artist and --album)
    PlayAlbum,

    /// Play a stored playlist (--playlist)
    PlayPlaylist,

    /// List catalogued songs
    ListSongs,

    /// List artists
    ListArtists,

    /// List albums
    ListAlbums,

    /// List genres
    ListGenres,

    /// List playlists
    ListPlaylists,

    /// List containers in object storage
    ListContainers,

    /// Show an album document (--artist and --album)
    ShowAlbum,

    /// Show a playlist document (--playlist)
    ShowPlaylist,

    /// Delete one song by uid
    DeleteSong {
        /// Song uid; defaults to --song
        target: Option<String>,
    },

    /// Delete every song by an artist
    DeleteArtist {
        /// Artist name; defaults to --artist
        target: Option<String>,
    },

    /// Delete every song on an album
    DeleteAlbum {
        /// Album key (`Artist--Album`); defaults to --album
        target: Option<String>,
    },

    /// Delete a playlist
    DeletePlaylist {
        /// Playlist name; defaults to --playlist
        target: Option<String>,
    },

    /// Upload the local catalog to object storage
    UploadMetadataDb,

    /// Create every container the jukebox uses
    InitStorage,

    /// Replace the local catalog with the stored copy
    RetrieveCatalog,

    /// Generate shell completions
    ///
    /// Usage: jukebox completion bash > ~/.local/share/bash-completion/completions/jukebox
    Completion {
        /// Shell to generate completions for
        shell: Shell,
    },

    /// Print help
    Help,

    /// Print a one-line usage summary
    Usage,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("jukebox").chain(args.iter().copied()))
            .expect("arguments should parse")
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = parse(&["play", "--artist", "The Who", "--compress", "--file-cache-count", "5"]);
        assert_eq!(args.command, Command::Play);
        assert_eq!(args.artist.as_deref(), Some("The Who"));

        let options = args.options();
        assert!(options.use_compression);
        assert_eq!(options.file_cache_count, 5);
        assert!(options.repeat);
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["list-songs"]);
        let options = args.options();
        assert_eq!(options.storage_type, StorageType::Fs);
        assert_eq!(options.file_cache_count, crate::config::DEFAULT_FILE_CACHE_COUNT);
        assert!(!options.simulate_audio);
        assert_eq!(args.base_dir(), PathBuf::from("."));
    }

    #[test]
    fn test_storage_and_once() {
        let args = parse(&["--storage", "s3", "shuffle-play", "--seed", "7", "--once"]);
        let options = args.options();
        assert_eq!(options.storage_type, StorageType::S3);
        assert_eq!(options.shuffle_seed, Some(7));
        assert!(!options.repeat);
    }

    #[test]
    fn test_delete_target_positional_wins() {
        let args = parse(&["delete-artist", "ABBA", "--artist", "Queen"]);
        assert_eq!(args.delete_target().as_deref(), Some("ABBA"));

        let args = parse(&["delete-playlist", "--playlist", "Road Trip"]);
        assert_eq!(args.delete_target().as_deref(), Some("Road Trip"));

        let args = parse(&["delete-song"]);
        assert_eq!(args.delete_target(), None);
    }

    #[test]
    fn test_help_and_usage_are_subcommands() {
        assert_eq!(parse(&["help"]).command, Command::Help);
        assert_eq!(parse(&["usage"]).command, Command::Usage);
        assert!(Args::try_parse_from(["jukebox", "help", "play"]).is_err());
    }

    #[test]
    fn test_unknown_storage_rejected() {
        assert!(Args::try_parse_from(["jukebox", "--storage", "ftp", "play"]).is_err());
    }
}
