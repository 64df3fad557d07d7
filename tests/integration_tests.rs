//! # Integration Tests for the Jukebox
//!
//! End-to-end workflows against a filesystem store rooted in a temporary
//! directory: storage setup, import, play sessions with simulated audio,
//! integrity failures and deletes.

use anyhow::Result;
use jukebox::cache::{md5_hex, LocalCache};
use jukebox::config::{Credentials, JukeboxOptions, JukeboxPaths, DEFAULT_DB_FILE_NAME};
use jukebox::control::{ControlEvent, ControlSources};
use jukebox::controller::{Controller, SessionSettings};
use jukebox::error::JukeboxError;
use jukebox::jukebox::Jukebox;
use jukebox::player::Player;
use jukebox::prefetch::SongFetcher;
use jukebox::storage::{StorageSystem, StorageType};
use jukebox::transform::Pipeline;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const PREFIX: &str = "com.example.jb.";

/// Test helper: a working directory whose fs credentials point at `store`.
fn create_workspace() -> Result<TempDir> {
    let temp_dir = TempDir::new()?;
    fs::write(
        temp_dir.path().join("fs_creds.txt"),
        format!("# test store\nroot_dir=store\ncontainer_prefix={PREFIX}\n"),
    )?;
    Ok(temp_dir)
}

fn test_options() -> JukeboxOptions {
    JukeboxOptions {
        simulate_audio: true,
        simulated_play: Duration::from_millis(50),
        http_port: None,
        handle_signals: false,
        repeat: false,
        ..JukeboxOptions::default()
    }
}

fn open_jukebox(dir: &Path, options: JukeboxOptions) -> Result<Jukebox> {
    let mut jukebox = Jukebox::connect(options, JukeboxPaths::new(dir))?;
    jukebox.enter()?;
    Ok(jukebox)
}

/// Drop `count` bytes of seeded noise into `song-import/` and return them.
fn stage_song(dir: &Path, file_name: &str, count: usize, seed: u64) -> Result<Vec<u8>> {
    let import_dir = dir.join("song-import");
    fs::create_dir_all(&import_dir)?;
    let mut bytes = vec![0u8; count];
    StdRng::seed_from_u64(seed).fill_bytes(&mut bytes);
    fs::write(import_dir.join(file_name), &bytes)?;
    Ok(bytes)
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let started = Instant::now();
    while started.elapsed() < timeout {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[cfg(test)]
mod storage_tests {
    use super::*;

    #[test]
    fn test_init_storage_is_idempotent() -> Result<()> {
        let workspace = create_workspace()?;
        let jukebox = open_jukebox(workspace.path(), test_options())?;

        assert_eq!(jukebox.init_storage()?, 40);
        assert_eq!(jukebox.init_storage()?, 0);

        let names = jukebox.store().get_container_names()?;
        assert_eq!(names.len(), 40);
        assert!(names.iter().all(|name| name.starts_with(PREFIX)));
        assert!(names.contains(&format!("{PREFIX}music-metadata")));
        assert!(names.contains(&format!("{PREFIX}0-artist-songs")));
        assert!(names.contains(&format!("{PREFIX}z-artist-songs")));
        jukebox.exit()
    }

    #[test]
    fn test_unbuilt_backends_are_unavailable() -> Result<()> {
        let workspace = create_workspace()?;
        let options = JukeboxOptions { storage_type: StorageType::Swift, ..test_options() };
        let err = Jukebox::connect(options, JukeboxPaths::new(workspace.path()))
            .err()
            .expect("swift is not built in");
        assert!(matches!(
            JukeboxError::kind_of(&err),
            Some(JukeboxError::StoreUnavailable(_))
        ));
        Ok(())
    }

    #[test]
    fn test_invalid_options_rejected_before_connecting() -> Result<()> {
        let workspace = create_workspace()?;
        let options = JukeboxOptions { use_encryption: true, ..test_options() };
        let err = Jukebox::connect(options, JukeboxPaths::new(workspace.path()))
            .err()
            .expect("encryption without a key");
        assert!(matches!(
            JukeboxError::kind_of(&err),
            Some(JukeboxError::ConfigInvalid(_))
        ));
        Ok(())
    }
}

#[cfg(test)]
mod session_tests {
    use super::*;

    #[test]
    fn test_import_then_play() -> Result<()> {
        let workspace = create_workspace()?;
        let uid = "The-Who--Whos-Next--My-Wife.mp3";
        let bytes = stage_song(workspace.path(), uid, 1024, 1)?;

        let mut jukebox = open_jukebox(workspace.path(), test_options())?;
        let summary = jukebox.import_songs()?;
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 0);

        let container = jukebox.names().container_for_song(uid)?;
        assert!(container.starts_with(PREFIX));
        assert!(jukebox
            .store()
            .list_container_contents(&container)?
            .contains(&uid.to_string()));

        let song = jukebox.catalog()?.retrieve_song(uid)?.expect("song row");
        assert_eq!(song.md5_hash, md5_hex(&bytes));
        assert_eq!(song.origin_size, 1024);

        let metadata = jukebox.names().metadata();
        assert!(jukebox
            .store()
            .list_container_contents(&metadata)?
            .contains(&DEFAULT_DB_FILE_NAME.to_string()));

        let songs = jukebox.songs_for(Some("The Who"), None)?;
        assert_eq!(songs.len(), 1);
        let history = jukebox.play(songs, false)?;
        assert_eq!(history, vec![uid.to_string()]);

        let cache = LocalCache::new(jukebox.paths().song_play_dir());
        assert!(cache.ready_entries()?.is_empty());
        assert!(!jukebox.paths().pid_file().exists());
        jukebox.exit()
    }

    #[test]
    fn test_cache_depth_stays_bounded() -> Result<()> {
        let workspace = create_workspace()?;
        for i in 0..5 {
            stage_song(workspace.path(), &format!("ABBA--Arrival--Track-{i}.mp3"), 4096, i)?;
        }
        let options = JukeboxOptions {
            file_cache_count: 2,
            simulated_play: Duration::from_millis(120),
            ..test_options()
        };
        let mut jukebox = open_jukebox(workspace.path(), options)?;
        assert_eq!(jukebox.import_songs()?.succeeded, 5);

        let stop = Arc::new(AtomicBool::new(false));
        let peak = Arc::new(AtomicUsize::new(0));
        let sampler = {
            let cache = LocalCache::new(jukebox.paths().song_play_dir());
            let stop = Arc::clone(&stop);
            let peak = Arc::clone(&peak);
            thread::spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    let ready = cache.ready_entries().map(|e| e.len()).unwrap_or(0);
                    peak.fetch_max(ready, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(2));
                }
            })
        };

        let songs = jukebox.songs_for(None, None)?;
        let history = jukebox.play(songs, false)?;
        stop.store(true, Ordering::SeqCst);
        sampler.join().expect("sampler thread");

        assert_eq!(history.len(), 5);
        let peak = peak.load(Ordering::SeqCst);
        assert!(peak >= 1);
        assert!(peak <= 3, "play directory held {peak} files");
        jukebox.exit()
    }

    #[test]
    fn test_pause_resumes_same_song() -> Result<()> {
        let workspace = create_workspace()?;
        stage_song(workspace.path(), "ABBA--Arrival--Money-Money-Money.mp3", 512, 1)?;
        stage_song(workspace.path(), "ABBA--Arrival--Tiger.mp3", 512, 2)?;
        let mut jukebox = open_jukebox(workspace.path(), test_options())?;
        jukebox.import_songs()?;
        let songs = jukebox.songs_for(None, None)?;
        let first = songs[0].song_uid.clone();

        let paths = jukebox.paths().clone();
        let mut store = StorageSystem::connect(
            StorageType::Fs,
            &Credentials::load(&paths, StorageType::Fs)?,
        )?;
        store.enter()?;
        let fetcher = SongFetcher::new(
            Arc::new(store),
            LocalCache::new(paths.song_play_dir()),
            Pipeline::default(),
            true,
        );
        let settings = SessionSettings {
            depth: 1,
            repeat: false,
            sources: ControlSources::none(),
            pid_file: paths.pid_file(),
        };
        let mut controller =
            Controller::new(songs, fetcher, Player::simulated(Duration::from_secs(30)), settings);
        let state = controller.state();
        let mailbox = controller.mailbox();
        let session = thread::spawn(move || controller.run());

        assert!(wait_until(Duration::from_secs(10), || state.has_player()));
        mailbox.send(ControlEvent::TogglePause)?;
        assert!(wait_until(Duration::from_secs(10), || state.is_paused() && !state.has_player()));
        thread::sleep(Duration::from_millis(200));
        assert_eq!(state.index(), 0);
        assert_eq!(state.history(), vec![first.clone()]);
        assert!(LocalCache::new(paths.song_play_dir()).has(&first));

        mailbox.send(ControlEvent::TogglePause)?;
        assert!(wait_until(Duration::from_secs(10), || state.history().len() == 2));
        assert_eq!(state.history(), vec![first.clone(), first]);
        assert_eq!(state.index(), 0);

        mailbox.send(ControlEvent::Terminate)?;
        let played = session.join().expect("session thread")?;
        assert_eq!(played.len(), 2);
        jukebox.exit()
    }

    #[test]
    fn test_corrupt_song_is_skipped() -> Result<()> {
        let workspace = create_workspace()?;
        let uids = [
            "ABBA--Arrival--Dancing-Queen.mp3",
            "ABBA--Arrival--Knowing-Me.mp3",
            "ABBA--Arrival--Tiger.mp3",
        ];
        for (i, uid) in uids.iter().enumerate() {
            stage_song(workspace.path(), uid, 2048, i as u64)?;
        }
        let options = JukeboxOptions { check_data_integrity: true, ..test_options() };
        let mut jukebox = open_jukebox(workspace.path(), options)?;
        assert_eq!(jukebox.import_songs()?.succeeded, 3);

        // Same length, one byte different.
        let container = jukebox.names().container_for_song(uids[1])?;
        let stored = workspace.path().join("store").join(&container).join(uids[1]);
        let mut bytes = fs::read(&stored)?;
        bytes[100] ^= 0xff;
        fs::write(&stored, bytes)?;

        let songs = jukebox.songs_for(None, None)?;
        assert_eq!(songs.len(), 3);
        let history = jukebox.play(songs, false)?;
        assert_eq!(history, vec![uids[0].to_string(), uids[2].to_string()]);

        let cache = LocalCache::new(jukebox.paths().song_play_dir());
        assert!(!cache.has(uids[1]));
        assert!(cache.ready_entries()?.is_empty());
        jukebox.exit()
    }

    #[test]
    fn test_compressed_encrypted_round_trip() -> Result<()> {
        let workspace = create_workspace()?;
        let uid = "Queen--A-Night-at-the-Opera--Bohemian-Rhapsody.mp3";
        let bytes = stage_song(workspace.path(), uid, 8192, 9)?;
        let options = JukeboxOptions {
            use_compression: true,
            use_encryption: true,
            encryption_key: Some("open sesame".to_string()),
            check_data_integrity: true,
            ..test_options()
        };
        let mut jukebox = open_jukebox(workspace.path(), options)?;
        assert_eq!(jukebox.import_songs()?.succeeded, 1);

        let container = jukebox.names().container_for_song(uid)?;
        let stored = fs::read(workspace.path().join("store").join(&container).join(uid))?;
        assert_ne!(stored, bytes);

        let songs = jukebox.songs_for(Some("Queen"), None)?;
        assert_eq!(songs.len(), 1);
        assert!(songs[0].compressed && songs[0].encrypted);
        assert_eq!(jukebox.play(songs, false)?, vec![uid.to_string()]);
        jukebox.exit()?;

        // Plain sessions do not see transformed songs.
        let plain = open_jukebox(workspace.path(), test_options())?;
        assert!(plain.songs_for(None, None)?.is_empty());
        plain.exit()
    }

    #[test]
    fn test_playlist_play_order() -> Result<()> {
        let workspace = create_workspace()?;
        stage_song(workspace.path(), "ABBA--Arrival--Tiger.mp3", 256, 1)?;
        stage_song(workspace.path(), "Queen--Jazz--Mustapha.mp3", 256, 2)?;
        let playlist_dir = workspace.path().join("playlist-import");
        fs::create_dir_all(&playlist_dir)?;
        fs::write(
            playlist_dir.join("Mix.json"),
            r#"{"name": "Mix", "tags": "test", "songs": [
                {"artist": "Queen", "album": "Jazz", "song": "Mustapha"},
                {"artist": "Nobody", "album": "Nowhere", "song": "Nothing"},
                {"artist": "ABBA", "album": "Arrival", "song": "Tiger"}
            ]}"#,
        )?;

        let mut jukebox = open_jukebox(workspace.path(), test_options())?;
        jukebox.import_songs()?;
        assert_eq!(jukebox.import_playlists()?.succeeded, 1);

        let songs = jukebox.songs_for_playlist("Mix")?;
        let uids: Vec<_> = songs.iter().map(|s| s.song_uid.as_str()).collect();
        assert_eq!(uids, ["Queen--Jazz--Mustapha.mp3", "ABBA--Arrival--Tiger.mp3"]);

        let mut out = Vec::new();
        jukebox.show_playlist("Mix", &mut out)?;
        let text = String::from_utf8(out)?;
        assert!(text.contains("Playlist: Mix"));
        assert!(text.contains("Queen - Mustapha (Jazz)"));
        jukebox.exit()
    }
}

#[cfg(test)]
mod catalog_tests {
    use super::*;

    #[test]
    fn test_delete_album_removes_songs_and_uploads() -> Result<()> {
        let workspace = create_workspace()?;
        stage_song(workspace.path(), "The-Who--Whos-Next--My-Wife.mp3", 128, 1)?;
        stage_song(workspace.path(), "The-Who--Whos-Next--Baba-ORiley.mp3", 128, 2)?;
        stage_song(workspace.path(), "The-Who--Tommy--Pinball-Wizard.mp3", 128, 3)?;

        let mut jukebox = open_jukebox(workspace.path(), test_options())?;
        assert_eq!(jukebox.import_songs()?.succeeded, 3);

        let summary = jukebox.delete_album("The-Who--Whos-Next")?;
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 0);

        let remaining = jukebox.songs_for(None, None)?;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].song_uid, "The-Who--Tommy--Pinball-Wizard.mp3");

        let container = jukebox.names().container_for_song("The-Who--Tommy--Pinball-Wizard.mp3")?;
        let objects = jukebox.store().list_container_contents(&container)?;
        assert!(objects.iter().all(|o| !o.starts_with("The-Who--Whos-Next--")));

        // The stored catalog is the local one.
        let downloaded = workspace.path().join("catalog-copy");
        jukebox
            .store()
            .get_object(&jukebox.names().metadata(), DEFAULT_DB_FILE_NAME, &downloaded)?;
        assert_eq!(fs::read(&downloaded)?, fs::read(jukebox.paths().metadata_db_file())?);

        let err = jukebox.delete_album("The-Who--Whos-Next").err().expect("nothing left");
        assert!(matches!(JukeboxError::kind_of(&err), Some(JukeboxError::NotFound(_))));
        jukebox.exit()
    }

    #[test]
    fn test_fresh_node_downloads_catalog() -> Result<()> {
        let first = create_workspace()?;
        let store_root = first.path().join("store");
        stage_song(first.path(), "ABBA--Arrival--Tiger.mp3", 256, 1)?;
        stage_song(first.path(), "Queen--Jazz--Mustapha.mp3", 256, 2)?;
        let mut jukebox = open_jukebox(first.path(), test_options())?;
        jukebox.import_songs()?;
        jukebox.exit()?;

        let second = TempDir::new()?;
        fs::write(
            second.path().join("fs_creds.txt"),
            format!("root_dir={}\ncontainer_prefix={PREFIX}\n", store_root.display()),
        )?;
        let jukebox = open_jukebox(second.path(), test_options())?;
        assert_eq!(
            fs::read(second.path().join(DEFAULT_DB_FILE_NAME))?,
            fs::read(first.path().join(DEFAULT_DB_FILE_NAME))?
        );

        let mut out = Vec::new();
        assert_eq!(jukebox.list_songs(&mut out)?, 2);
        assert_eq!(jukebox.list_artists(&mut Vec::new())?, 2);
        jukebox.exit()
    }

    #[test]
    fn test_retrieve_catalog_without_remote_copy() -> Result<()> {
        let workspace = create_workspace()?;
        let mut jukebox = open_jukebox(workspace.path(), test_options())?;
        let err = jukebox.retrieve_catalog().err().expect("no remote catalog");
        assert!(matches!(JukeboxError::kind_of(&err), Some(JukeboxError::NotFound(_))));
        Ok(())
    }
}

#[cfg(test)]
mod cli_tests {
    use super::*;
    use std::process::Command;

    fn jukebox_bin() -> Command {
        Command::new(env!("CARGO_BIN_EXE_jukebox"))
    }

    #[test]
    fn test_bad_flag_value_exits_one() -> Result<()> {
        let output = jukebox_bin().args(["--storage", "ftp", "play"]).output()?;
        assert_eq!(output.status.code(), Some(1));
        assert!(String::from_utf8_lossy(&output.stderr).contains("ftp"));
        Ok(())
    }

    #[test]
    fn test_missing_required_flag_exits_one() -> Result<()> {
        let workspace = create_workspace()?;
        let output = jukebox_bin()
            .arg("--directory")
            .arg(workspace.path())
            .arg("play-playlist")
            .output()?;
        assert_eq!(output.status.code(), Some(1));
        assert!(String::from_utf8_lossy(&output.stdout).contains("error: "));
        Ok(())
    }

    #[test]
    fn test_version_exits_zero() -> Result<()> {
        let output = jukebox_bin().arg("--version").output()?;
        assert!(output.status.success());
        assert!(String::from_utf8_lossy(&output.stdout).starts_with("jukebox "));
        Ok(())
    }
}
