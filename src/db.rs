//! # Catalog
//!
//! The SQLite file that indexes the library. It is the authority on which
//! songs exist; the object store only holds their bytes. After every mutating
//! command the whole file is uploaded to the metadata container.
//!
//! ## Schema
//!
//! ```sql
//! genre(genre_uid PK, genre_name, genre_description)
//! artist(artist_uid PK, artist_name, artist_description)
//! album(album_uid PK, album_name, album_description, artist_uid, genre_uid)
//! song(song_uid PK, file_time, origin_file_size, stored_file_size,
//!      pad_char_count, artist_name, artist_uid, song_name, md5_hash,
//!      compressed, encrypted, container_name, object_name, album_uid)
//! playlist(playlist_uid PK, playlist_name, playlist_description)
//! playlist_song(playlist_song_id PK, playlist_uid, song_uid)
//! ```
//!
//! Mutations take `&mut self` and run in a transaction.

use crate::error::JukeboxError;
use crate::library::Album;
use crate::name_codec::{self, KEY_SEPARATOR};
use crate::song::Song;
use anyhow::{Context, Result};
use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::io::Write;
use std::path::{Path, PathBuf};

const SONG_COLUMNS: &str = "song_uid, file_time, origin_file_size, stored_file_size, \
    pad_char_count, artist_name, artist_uid, song_name, md5_hash, compressed, encrypted, \
    container_name, object_name, album_uid";

const CREATE_TABLES: &str = "
    CREATE TABLE IF NOT EXISTS genre (
        genre_uid          TEXT UNIQUE NOT NULL,
        genre_name         TEXT UNIQUE NOT NULL,
        genre_description  TEXT
    );
    CREATE TABLE IF NOT EXISTS artist (
        artist_uid          TEXT UNIQUE NOT NULL,
        artist_name         TEXT UNIQUE NOT NULL,
        artist_description  TEXT
    );
    CREATE TABLE IF NOT EXISTS album (
        album_uid          TEXT UNIQUE NOT NULL,
        album_name         TEXT NOT NULL,
        album_description  TEXT,
        artist_uid         TEXT NOT NULL REFERENCES artist(artist_uid),
        genre_uid          TEXT REFERENCES genre(genre_uid)
    );
    CREATE TABLE IF NOT EXISTS song (
        song_uid          TEXT PRIMARY KEY NOT NULL,
        file_time         TEXT,
        origin_file_size  INTEGER,
        stored_file_size  INTEGER,
        pad_char_count    INTEGER,
        artist_name       TEXT,
        artist_uid        TEXT REFERENCES artist(artist_uid),
        song_name         TEXT NOT NULL,
        md5_hash          TEXT NOT NULL,
        compressed        INTEGER,
        encrypted         INTEGER,
        container_name    TEXT NOT NULL,
        object_name       TEXT NOT NULL,
        album_uid         TEXT REFERENCES album(album_uid)
    );
    CREATE TABLE IF NOT EXISTS playlist (
        playlist_uid          TEXT UNIQUE NOT NULL,
        playlist_name         TEXT UNIQUE NOT NULL,
        playlist_description  TEXT
    );
    CREATE TABLE IF NOT EXISTS playlist_song (
        playlist_song_id  INTEGER PRIMARY KEY,
        playlist_uid      TEXT NOT NULL REFERENCES playlist(playlist_uid),
        song_uid          TEXT NOT NULL REFERENCES song(song_uid)
    );
";

/// Attach a message to a SQL error while keeping it a
/// [`JukeboxError::Catalog`].
trait SqlContext<T> {
    fn sql_context<F: FnOnce() -> String>(self, what: F) -> Result<T>;
}

impl<T> SqlContext<T> for rusqlite::Result<T> {
    fn sql_context<F: FnOnce() -> String>(self, what: F) -> Result<T> {
        self.map_err(JukeboxError::from).with_context(what)
    }
}

fn song_from_row(row: &Row<'_>) -> rusqlite::Result<Song> {
    let origin: i64 = row.get(2)?;
    let stored: i64 = row.get(3)?;
    Ok(Song {
        song_uid: row.get(0)?,
        file_time: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        origin_size: origin.max(0) as u64,
        stored_size: stored.max(0) as u64,
        pad_char_count: row.get::<_, Option<u32>>(4)?.unwrap_or(0),
        artist_name: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        song_name: row.get(7)?,
        md5_hash: row.get(8)?,
        compressed: row.get(9)?,
        encrypted: row.get(10)?,
        container_name: row.get(11)?,
        object_name: row.get(12)?,
        album_uid: row.get(13)?,
    })
}

/// Open handle on the catalog file.
pub struct Catalog {
    conn: Connection,
    path: PathBuf,
    compressed: bool,
    encrypted: bool,
}

impl Catalog {
    /// Open (creating if needed) the catalog at `path` and make sure every
    /// table exists.
    ///
    /// # Errors
    ///
    /// [`JukeboxError::Catalog`] when the file cannot be opened or is not a
    /// SQLite database.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .sql_context(|| format!("Catalog connection refused. Location: {path:?}"))?;
        conn.execute_batch(CREATE_TABLES)
            .sql_context(|| format!("Failed to create catalog tables in {path:?}"))?;
        debug!("Opened catalog {}", path.display());

        Ok(Self { conn, path: path.to_path_buf(), compressed: false, encrypted: false })
    }

    /// Restrict [`Catalog::retrieve_songs`] to songs stored with these
    /// transforms.
    pub fn set_pipeline(&mut self, compressed: bool, encrypted: bool) {
        self.compressed = compressed;
        self.encrypted = encrypted;
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush and close the connection.
    pub fn close(self) -> Result<()> {
        let path = self.path;
        self.conn
            .close()
            .map_err(|(_, e)| e)
            .sql_context(|| format!("Failed to close catalog {path:?}"))
    }

    pub fn insert_song(&mut self, song: &Song) -> Result<()> {
        let tx = self.conn.transaction().sql_context(|| "Failed to begin transaction".into())?;
        tx.execute(
            &format!(
                "INSERT INTO song ({SONG_COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
            ),
            params![
                song.song_uid,
                song.file_time,
                song.origin_size as i64,
                song.stored_size as i64,
                song.pad_char_count,
                song.artist_name,
                name_codec::encode_value(&song.artist_name),
                song.song_name,
                song.md5_hash,
                song.compressed,
                song.encrypted,
                song.container_name,
                song.object_name,
                song.album_uid,
            ],
        )
        .sql_context(|| format!("Failed to INSERT song {}", song.song_uid))?;
        tx.commit().sql_context(|| "Committing SQL transaction failed".into())?;
        Ok(())
    }

    /// Rewrite every column of an existing row.
    ///
    /// # Errors
    ///
    /// [`JukeboxError::NotFound`] when no row has the song's uid.
    pub fn update_song(&mut self, song: &Song) -> Result<()> {
        let tx = self.conn.transaction().sql_context(|| "Failed to begin transaction".into())?;
        let changed = tx
            .execute(
                "UPDATE song SET file_time = ?2, origin_file_size = ?3, stored_file_size = ?4, \
                 pad_char_count = ?5, artist_name = ?6, artist_uid = ?7, song_name = ?8, \
                 md5_hash = ?9, compressed = ?10, encrypted = ?11, container_name = ?12, \
                 object_name = ?13, album_uid = ?14 WHERE song_uid = ?1",
                params![
                    song.song_uid,
                    song.file_time,
                    song.origin_size as i64,
                    song.stored_size as i64,
                    song.pad_char_count,
                    song.artist_name,
                    name_codec::encode_value(&song.artist_name),
                    song.song_name,
                    song.md5_hash,
                    song.compressed,
                    song.encrypted,
                    song.container_name,
                    song.object_name,
                    song.album_uid,
                ],
            )
            .sql_context(|| format!("Failed to UPDATE song {}", song.song_uid))?;
        if changed == 0 {
            return Err(JukeboxError::NotFound(format!("song '{}'", song.song_uid)).into());
        }
        tx.commit().sql_context(|| "Committing SQL transaction failed".into())?;
        Ok(())
    }

    pub fn retrieve_song(&self, song_uid: &str) -> Result<Option<Song>> {
        self.conn
            .query_row(
                &format!("SELECT {SONG_COLUMNS} FROM song WHERE song_uid = ?1"),
                [song_uid],
                song_from_row,
            )
            .optional()
            .sql_context(|| format!("Failed to query song {song_uid}"))
    }

    /// Songs playable with the configured pipeline, ordered by artist then
    /// song.
    ///
    /// With `artist` only rows whose `artist_name` equals it are returned.
    /// With `album` only rows whose object name starts with the album key;
    /// when `artist` is absent `album` is taken to already be an album key
    /// such as `The-Who--Whos-Next`.
    pub fn retrieve_songs(&self, artist: Option<&str>, album: Option<&str>) -> Result<Vec<Song>> {
        let key_prefix = album.map(|album| match artist {
            Some(artist) => name_codec::album_key(artist, album),
            None => album.to_string(),
        });
        self.query_songs(artist, key_prefix.as_deref(), true)
    }

    /// Songs to delete for an artist and/or album key, whatever transforms
    /// they were stored with.
    pub fn songs_for_deletion(
        &self,
        artist: Option<&str>,
        key_prefix: Option<&str>,
    ) -> Result<Vec<Song>> {
        self.query_songs(artist, key_prefix, false)
    }

    fn query_songs(
        &self,
        artist: Option<&str>,
        key_prefix: Option<&str>,
        match_pipeline: bool,
    ) -> Result<Vec<Song>> {
        let key_prefix = key_prefix.map(|key| format!("{key}{KEY_SEPARATOR}"));
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {SONG_COLUMNS} FROM song \
                 WHERE (?1 = 0 OR (compressed = ?2 AND encrypted = ?3)) \
                 AND (?4 IS NULL OR artist_name = ?4) \
                 AND (?5 IS NULL OR instr(object_name, ?5) = 1) \
                 ORDER BY artist_name, song_name"
            ))
            .sql_context(|| "Invalid SQL statement when SELECTing songs".into())?;

        let rows = stmt
            .query_map(
                params![match_pipeline, self.compressed, self.encrypted, artist, key_prefix],
                song_from_row,
            )
            .sql_context(|| "Cannot query songs".into())?;

        let mut songs = Vec::new();
        for song in rows {
            songs.push(song.sql_context(|| "Queried song row is malformed".into())?);
        }
        Ok(songs)
    }

    /// Find a song by its key without extension, as playlists reference
    /// songs.
    pub fn find_song_by_key(&self, song_key: &str) -> Result<Option<Song>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {SONG_COLUMNS} FROM song \
                     WHERE song_uid = ?1 OR instr(song_uid, ?1 || '.') = 1 \
                     ORDER BY song_uid LIMIT 1"
                ),
                [song_key],
                song_from_row,
            )
            .optional()
            .sql_context(|| format!("Failed to look up song key {song_key}"))
    }

    /// Remove a song row. Returns whether a row existed.
    pub fn delete_song(&mut self, song_uid: &str) -> Result<bool> {
        let tx = self.conn.transaction().sql_context(|| "Failed to begin transaction".into())?;
        tx.execute("DELETE FROM playlist_song WHERE song_uid = ?1", [song_uid])
            .sql_context(|| format!("Failed to DELETE playlist entries of {song_uid}"))?;
        let deleted = tx
            .execute("DELETE FROM song WHERE song_uid = ?1", [song_uid])
            .sql_context(|| format!("Failed to DELETE song {song_uid}"))?;
        tx.commit().sql_context(|| "Committing SQL transaction failed".into())?;
        Ok(deleted > 0)
    }

    /// Insert or rename the artist row keyed by `encode(name)`.
    pub fn upsert_artist(&mut self, artist_name: &str) -> Result<String> {
        let artist_uid = name_codec::encode_value(artist_name);
        let tx = self.conn.transaction().sql_context(|| "Failed to begin transaction".into())?;
        tx.execute(
            "INSERT INTO artist (artist_uid, artist_name) VALUES (?1, ?2) \
             ON CONFLICT(artist_uid) DO UPDATE SET artist_name = excluded.artist_name",
            params![artist_uid, artist_name],
        )
        .sql_context(|| format!("Failed to upsert artist {artist_name}"))?;
        tx.commit().sql_context(|| "Committing SQL transaction failed".into())?;
        Ok(artist_uid)
    }

    /// Insert or rename the album row keyed by the album key.
    pub fn upsert_album(&mut self, artist_name: &str, album_name: &str) -> Result<String> {
        let album_uid = name_codec::album_key(artist_name, album_name);
        let artist_uid = name_codec::encode_value(artist_name);
        let tx = self.conn.transaction().sql_context(|| "Failed to begin transaction".into())?;
        tx.execute(
            "INSERT INTO album (album_uid, album_name, artist_uid) VALUES (?1, ?2, ?3) \
             ON CONFLICT(album_uid) DO UPDATE SET album_name = excluded.album_name, \
             artist_uid = excluded.artist_uid",
            params![album_uid, album_name, artist_uid],
        )
        .sql_context(|| format!("Failed to upsert album {album_name}"))?;
        tx.commit().sql_context(|| "Committing SQL transaction failed".into())?;
        Ok(album_uid)
    }

    /// Catalog an album document: its artist, its genres and the album row,
    /// linked to the first listed genre. Returns the album uid.
    pub fn catalog_album(&mut self, album: &Album) -> Result<String> {
        let album_uid = album.key();
        let artist_uid = name_codec::encode_value(&album.artist);
        let tx = self.conn.transaction().sql_context(|| "Failed to begin transaction".into())?;
        tx.execute(
            "INSERT INTO artist (artist_uid, artist_name) VALUES (?1, ?2) \
             ON CONFLICT(artist_uid) DO UPDATE SET artist_name = excluded.artist_name",
            params![artist_uid, album.artist],
        )
        .sql_context(|| format!("Failed to upsert artist {}", album.artist))?;

        let mut genre_uids = Vec::with_capacity(album.genre.len());
        for genre in album.genre.iter().map(|g| g.trim()).filter(|g| !g.is_empty()) {
            let genre_uid = name_codec::encode_value(genre);
            tx.execute(
                "INSERT OR IGNORE INTO genre (genre_uid, genre_name, genre_description) \
                 VALUES (?1, ?2, '')",
                params![genre_uid, genre],
            )
            .sql_context(|| format!("Failed to INSERT genre {genre}"))?;
            genre_uids.push(genre_uid);
        }

        tx.execute(
            "INSERT INTO album (album_uid, album_name, album_description, artist_uid, genre_uid) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT(album_uid) DO UPDATE SET album_name = excluded.album_name, \
             album_description = excluded.album_description, \
             artist_uid = excluded.artist_uid, genre_uid = excluded.genre_uid",
            params![album_uid, album.album, album.wiki, artist_uid, genre_uids.first()],
        )
        .sql_context(|| format!("Failed to upsert album {}", album.album))?;
        tx.commit().sql_context(|| "Committing SQL transaction failed".into())?;
        debug!("Catalogued album {album_uid} with {} genre(s)", genre_uids.len());
        Ok(album_uid)
    }

    /// Insert a playlist row, replacing one with the same name.
    pub fn insert_playlist(&mut self, uid: &str, name: &str, description: &str) -> Result<()> {
        let tx = self.conn.transaction().sql_context(|| "Failed to begin transaction".into())?;
        tx.execute("DELETE FROM playlist WHERE playlist_name = ?1 OR playlist_uid = ?2", [name, uid])
            .sql_context(|| format!("Failed to replace playlist {name}"))?;
        tx.execute(
            "INSERT INTO playlist (playlist_uid, playlist_name, playlist_description) \
             VALUES (?1, ?2, ?3)",
            [uid, name, description],
        )
        .sql_context(|| format!("Failed to INSERT playlist {name}"))?;
        tx.commit().sql_context(|| "Committing SQL transaction failed".into())?;
        info!("Catalogued playlist '{name}'");
        Ok(())
    }

    /// Remove the playlist row with this name. Returns whether a row existed.
    pub fn delete_playlist(&mut self, name: &str) -> Result<bool> {
        let tx = self.conn.transaction().sql_context(|| "Failed to begin transaction".into())?;
        tx.execute(
            "DELETE FROM playlist_song WHERE playlist_uid IN \
             (SELECT playlist_uid FROM playlist WHERE playlist_name = ?1)",
            [name],
        )
        .sql_context(|| format!("Failed to DELETE entries of playlist {name}"))?;
        let deleted = tx
            .execute("DELETE FROM playlist WHERE playlist_name = ?1", [name])
            .sql_context(|| format!("Failed to DELETE playlist {name}"))?;
        tx.commit().sql_context(|| "Committing SQL transaction failed".into())?;
        Ok(deleted > 0)
    }

    pub fn get_playlist_uid(&self, name: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT playlist_uid FROM playlist WHERE playlist_name = ?1",
                [name],
                |row| row.get(0),
            )
            .optional()
            .sql_context(|| format!("Failed to look up playlist {name}"))
    }

    /// Query that yields one printable line per row.
    fn print_rows(&self, out: &mut impl Write, sql: &str) -> Result<usize> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .sql_context(|| format!("Invalid SQL statement: {sql}"))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .sql_context(|| "Cannot query catalog".into())?;

        let mut count = 0;
        for line in rows {
            let line = line.sql_context(|| "Queried row is malformed".into())?;
            writeln!(out, "{line}")?;
            count += 1;
        }
        Ok(count)
    }

    /// `artist, song` for every song.
    pub fn show_listings(&self, out: &mut impl Write) -> Result<usize> {
        self.print_rows(
            out,
            "SELECT artist_name || ', ' || song_name FROM song ORDER BY artist_name, song_name",
        )
    }

    pub fn show_artists(&self, out: &mut impl Write) -> Result<usize> {
        self.print_rows(out, "SELECT artist_name FROM artist ORDER BY artist_name")
    }

    pub fn show_genres(&self, out: &mut impl Write) -> Result<usize> {
        self.print_rows(out, "SELECT genre_name FROM genre ORDER BY genre_name")
    }

    /// `album (artist)` for every album.
    pub fn show_albums(&self, out: &mut impl Write) -> Result<usize> {
        self.print_rows(
            out,
            "SELECT album.album_name || ' (' || COALESCE(artist.artist_name, album.artist_uid) || ')' \
             FROM album LEFT JOIN artist ON album.artist_uid = artist.artist_uid \
             ORDER BY album.album_name",
        )
    }

    /// `uid - name` for every playlist.
    pub fn show_playlists(&self, out: &mut impl Write) -> Result<usize> {
        self.print_rows(
            out,
            "SELECT playlist_uid || ' - ' || playlist_name FROM playlist ORDER BY playlist_name",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::song::tests::sample_song;
    use tempfile::TempDir;

    fn open_catalog() -> (Catalog, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let catalog = Catalog::open(&temp_dir.path().join("jukebox_db.sqlite3"))
            .expect("catalog should open");
        (catalog, temp_dir)
    }

    fn song(uid: &str, artist: &str, title: &str) -> Song {
        Song {
            song_uid: uid.to_string(),
            object_name: uid.to_string(),
            artist_name: artist.to_string(),
            song_name: title.to_string(),
            ..sample_song()
        }
    }

    #[test]
    fn test_insert_retrieve_update() {
        let (mut catalog, _temp_dir) = open_catalog();
        let mut s = sample_song();
        catalog.insert_song(&s).unwrap();
        assert_eq!(catalog.retrieve_song(&s.song_uid).unwrap(), Some(s.clone()));

        s.stored_size = 2048;
        s.md5_hash = "ffff".to_string();
        catalog.update_song(&s).unwrap();
        assert_eq!(catalog.retrieve_song(&s.song_uid).unwrap(), Some(s.clone()));

        assert!(catalog.insert_song(&s).is_err());
    }

    #[test]
    fn test_update_missing_song_is_not_found() {
        let (mut catalog, _temp_dir) = open_catalog();
        let err = catalog.update_song(&sample_song()).unwrap_err();
        assert!(matches!(JukeboxError::kind_of(&err), Some(JukeboxError::NotFound(_))));
    }

    #[test]
    fn test_sql_errors_are_catalog_errors() {
        let (mut catalog, _temp_dir) = open_catalog();
        catalog.insert_song(&sample_song()).unwrap();
        let err = catalog.insert_song(&sample_song()).unwrap_err();
        assert!(matches!(JukeboxError::kind_of(&err), Some(JukeboxError::Catalog(_))));
    }

    #[test]
    fn test_retrieve_songs_filters_and_orders() {
        let (mut catalog, _temp_dir) = open_catalog();
        catalog.insert_song(&song("The-Who--Whos-Next--My-Wife.mp3", "The Who", "My Wife")).unwrap();
        catalog.insert_song(&song("The-Who--Whos-Next--Bargain.mp3", "The Who", "Bargain")).unwrap();
        catalog.insert_song(&song("The-Who--Tommy--Sparks.mp3", "The Who", "Sparks")).unwrap();
        catalog.insert_song(&song("ABBA--Arrival--Dancing-Queen.mp3", "ABBA", "Dancing Queen")).unwrap();

        let all: Vec<String> = catalog
            .retrieve_songs(None, None)
            .unwrap()
            .into_iter()
            .map(|s| s.song_name)
            .collect();
        assert_eq!(all, vec!["Dancing Queen", "Bargain", "My Wife", "Sparks"]);

        assert_eq!(catalog.retrieve_songs(Some("The Who"), None).unwrap().len(), 3);
        assert_eq!(catalog.retrieve_songs(Some("The Who"), Some("Whos Next")).unwrap().len(), 2);
        assert_eq!(catalog.retrieve_songs(None, Some("The-Who--Tommy")).unwrap().len(), 1);
        assert!(catalog.retrieve_songs(Some("Nobody"), None).unwrap().is_empty());
    }

    #[test]
    fn test_retrieve_songs_matches_pipeline() {
        let (mut catalog, _temp_dir) = open_catalog();
        let mut packed = song("ABBA--Arrival--Money.mp3", "ABBA", "Money");
        packed.compressed = true;
        catalog.insert_song(&packed).unwrap();
        catalog.insert_song(&song("ABBA--Arrival--Tiger.mp3", "ABBA", "Tiger")).unwrap();

        assert_eq!(catalog.retrieve_songs(None, None).unwrap()[0].song_name, "Tiger");
        catalog.set_pipeline(true, false);
        let songs = catalog.retrieve_songs(None, None).unwrap();
        assert_eq!(songs.len(), 1);
        assert_eq!(songs[0].song_name, "Money");
        assert_eq!(catalog.songs_for_deletion(Some("ABBA"), None).unwrap().len(), 2);
    }

    #[test]
    fn test_find_song_by_key_ignores_extension() {
        let (mut catalog, _temp_dir) = open_catalog();
        catalog.insert_song(&sample_song()).unwrap();
        let found = catalog.find_song_by_key("The-Who--Whos-Next--My-Wife").unwrap();
        assert_eq!(found.map(|s| s.song_uid).as_deref(), Some("The-Who--Whos-Next--My-Wife.mp3"));
        assert!(catalog.find_song_by_key("The-Who--Whos-Next--My").unwrap().is_none());
    }

    #[test]
    fn test_delete_song() {
        let (mut catalog, _temp_dir) = open_catalog();
        catalog.insert_song(&sample_song()).unwrap();
        assert!(catalog.delete_song("The-Who--Whos-Next--My-Wife.mp3").unwrap());
        assert!(!catalog.delete_song("The-Who--Whos-Next--My-Wife.mp3").unwrap());
        assert!(catalog.retrieve_song("The-Who--Whos-Next--My-Wife.mp3").unwrap().is_none());
    }

    #[test]
    fn test_playlists() {
        let (mut catalog, _temp_dir) = open_catalog();
        catalog.insert_playlist("road-trip.json", "Road Trip", "rock").unwrap();
        assert_eq!(
            catalog.get_playlist_uid("Road Trip").unwrap().as_deref(),
            Some("road-trip.json")
        );
        catalog.insert_playlist("road-trip.json", "Road Trip", "loud").unwrap();

        let mut out = Vec::new();
        assert_eq!(catalog.show_playlists(&mut out).unwrap(), 1);
        assert_eq!(String::from_utf8(out).unwrap(), "road-trip.json - Road Trip\n");

        assert!(catalog.delete_playlist("Road Trip").unwrap());
        assert!(catalog.get_playlist_uid("Road Trip").unwrap().is_none());
    }

    #[test]
    fn test_show_listings_artists_albums_genres() {
        let (mut catalog, _temp_dir) = open_catalog();
        let s = sample_song();
        catalog.insert_song(&s).unwrap();
        catalog.upsert_artist("The Who").unwrap();
        catalog.upsert_artist("The Who").unwrap();
        catalog.upsert_album("The Who", "Whos Next").unwrap();

        let mut out = Vec::new();
        catalog.show_listings(&mut out).unwrap();
        catalog.show_artists(&mut out).unwrap();
        catalog.show_albums(&mut out).unwrap();
        catalog.show_genres(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "The Who, My Wife\nThe Who\nWhos Next (The Who)\n"
        );
    }

    #[test]
    fn test_catalog_album_links_genres() {
        let (mut catalog, _temp_dir) = open_catalog();
        let album = Album {
            artist: "The Who".to_string(),
            album: "Whos Next".to_string(),
            genre: vec!["Rock".to_string(), "Hard Rock".to_string(), " ".to_string()],
            wiki: "Fifth studio album".to_string(),
            ..Default::default()
        };
        assert_eq!(catalog.catalog_album(&album).unwrap(), "The-Who--Whos-Next");
        catalog.catalog_album(&album).unwrap();

        let mut out = Vec::new();
        catalog.show_genres(&mut out).unwrap();
        catalog.show_albums(&mut out).unwrap();
        catalog.show_artists(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Hard Rock\nRock\nWhos Next (The Who)\nThe Who\n"
        );

        let genre_uid: Option<String> = catalog
            .conn
            .query_row(
                "SELECT genre_uid FROM album WHERE album_uid = 'The-Who--Whos-Next'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(genre_uid.as_deref(), Some("Rock"));
    }

    #[test]
    fn test_reopen_keeps_rows() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("catalog.sqlite3");
        let mut catalog = Catalog::open(&path).unwrap();
        catalog.insert_song(&sample_song()).unwrap();
        catalog.close().unwrap();

        let catalog = Catalog::open(&path).unwrap();
        assert!(catalog.retrieve_song("The-Who--Whos-Next--My-Wife.mp3").unwrap().is_some());
    }
}
