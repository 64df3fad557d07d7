//! # Cloud Jukebox
//!
//! Keeps a music library in object storage and plays it back through a small
//! local cache.
//!
//! ## Usage
//!
//! ```bash
//! # Create the containers, then upload song-import/*
//! jukebox init-storage
//! jukebox import-songs
//!
//! # Play
//! jukebox shuffle-play
//! jukebox play-album --artist "The Who" --album "Whos Next"
//! ```
//!
//! While playing, `kill -USR1` toggles pause and `kill -USR2` skips; the same
//! is available at `http://127.0.0.1:5309/togglePausePlay` and `/songAdvance`.

use anyhow::Result;
use clap::{CommandFactory, Parser};
use jukebox::cli::{self, Command};
use jukebox::config::JukeboxPaths;
use jukebox::error::JukeboxError;
use jukebox::importer::BatchSummary;
use jukebox::jukebox::Jukebox;
use jukebox::name_codec::album_key;
use jukebox::{completion, song::Song};
use log::{debug, info};
use std::io::{self, Write};
use std::process::ExitCode;

fn init_logging(debug: bool) {
    let default_filter = if debug { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

fn missing(flag: &str) -> anyhow::Error {
    JukeboxError::ConfigInvalid(format!("{flag} is required")).into()
}

/// Album key from `--artist` and `--album`, or `--album` alone as a key.
fn album_key_from_flags(args: &cli::Args) -> Result<String> {
    let album = args.album.as_deref().ok_or_else(|| missing("--album"))?;
    Ok(match args.artist.as_deref() {
        Some(artist) => album_key(artist, album),
        None => album.to_string(),
    })
}

fn report(command: &str, summary: &BatchSummary) -> Result<()> {
    println!("{command}: {summary}");
    if summary.is_success() {
        Ok(())
    } else {
        anyhow::bail!("{command} failed for every file")
    }
}

fn play(jukebox: &Jukebox, songs: Vec<Song>, shuffle: bool) -> Result<()> {
    let history = jukebox.play(songs, shuffle)?;
    info!("Session played {} song(s)", history.len());
    Ok(())
}

fn run(args: cli::Args) -> Result<()> {
    let mut stdout = io::stdout();
    match &args.command {
        Command::Help => {
            cli::Args::command().print_long_help()?;
            return Ok(());
        }
        Command::Usage => {
            writeln!(stdout, "{}", cli::Args::command().render_usage())?;
            return Ok(());
        }
        Command::Completion { shell } => {
            let mut cmd = cli::Args::command();
            completion::generate_completions(
                completion::shell_to_completion_shell(shell),
                &mut cmd,
                &mut stdout,
            );
            return Ok(());
        }
        _ => {}
    }

    let paths = JukeboxPaths::new(args.base_dir());
    let mut jukebox = Jukebox::connect(args.options(), paths)?;
    jukebox.enter()?;
    debug!("Running {:?}", args.command);

    let outcome = match &args.command {
        Command::ImportSongs => jukebox.import_songs().and_then(|s| report("import-songs", &s)),
        Command::ImportPlaylists => {
            jukebox.import_playlists().and_then(|s| report("import-playlists", &s))
        }
        Command::ImportAlbumArt => {
            jukebox.import_album_art().and_then(|s| report("import-album-art", &s))
        }
        Command::Play => jukebox
            .songs_for(args.artist.as_deref(), None)
            .and_then(|songs| play(&jukebox, songs, false)),
        Command::ShufflePlay => jukebox
            .songs_for(args.artist.as_deref(), args.album.as_deref())
            .and_then(|songs| play(&jukebox, songs, true)),
        Command::PlayAlbum => match (&args.artist, &args.album) {
            (Some(artist), Some(album)) => jukebox
                .songs_for(Some(artist), Some(album))
                .and_then(|songs| play(&jukebox, songs, false)),
            (None, _) => Err(missing("--artist")),
            (_, None) => Err(missing("--album")),
        },
        Command::PlayPlaylist => match &args.playlist {
            Some(name) => jukebox
                .songs_for_playlist(name)
                .and_then(|songs| play(&jukebox, songs, false)),
            None => Err(missing("--playlist")),
        },
        Command::ListSongs => jukebox.list_songs(&mut stdout).map(drop),
        Command::ListArtists => jukebox.list_artists(&mut stdout).map(drop),
        Command::ListAlbums => jukebox.list_albums(&mut stdout).map(drop),
        Command::ListGenres => jukebox.list_genres(&mut stdout).map(drop),
        Command::ListPlaylists => jukebox.list_playlists(&mut stdout).map(drop),
        Command::ListContainers => jukebox.list_containers(&mut stdout).map(drop),
        Command::ShowAlbum => album_key_from_flags(&args)
            .and_then(|key| jukebox.show_album(&key, &mut stdout)),
        Command::ShowPlaylist => match &args.playlist {
            Some(name) => jukebox.show_playlist(name, &mut stdout),
            None => Err(missing("--playlist")),
        },
        Command::DeleteSong { .. } => match args.delete_target() {
            Some(uid) => jukebox.delete_song(&uid).and_then(|s| report("delete-song", &s)),
            None => Err(missing("--song")),
        },
        Command::DeleteArtist { .. } => match args.delete_target() {
            Some(artist) => {
                jukebox.delete_artist(&artist).and_then(|s| report("delete-artist", &s))
            }
            None => Err(missing("--artist")),
        },
        Command::DeleteAlbum { target } => {
            let key = match target {
                Some(key) => Ok(key.clone()),
                None => album_key_from_flags(&args),
            };
            key.and_then(|key| jukebox.delete_album(&key))
                .and_then(|s| report("delete-album", &s))
        }
        Command::DeletePlaylist { .. } => match args.delete_target() {
            Some(name) => {
                jukebox.delete_playlist(&name).and_then(|s| report("delete-playlist", &s))
            }
            None => Err(missing("--playlist")),
        },
        Command::UploadMetadataDb => jukebox.upload_catalog(),
        Command::InitStorage => jukebox.init_storage().map(|created| {
            println!("init-storage: {created} container(s) created");
        }),
        Command::RetrieveCatalog => jukebox.retrieve_catalog(),
        Command::Completion { .. } | Command::Help | Command::Usage => Ok(()),
    };

    let closed = jukebox.exit();
    outcome.and(closed)
}

fn main() -> ExitCode {
    let args = match cli::Args::try_parse() {
        Ok(args) => args,
        Err(e) if !e.use_stderr() => e.exit(),
        Err(e) => {
            // Usage errors exit 1 like every other failure.
            let _ = e.print();
            return ExitCode::FAILURE;
        }
    };
    init_logging(args.debug);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            println!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
