//! # Name Codec
//!
//! Maps human-readable (artist, album, song) triples onto object keys and
//! picks the container ("shard") a song lives in.
//!
//! ## Keys
//!
//! Each value is encoded by dropping `'`, `!` and `?` and turning spaces into
//! `-`. Composite keys join encoded values with `--`:
//!
//! ```text
//! The Who / Who's Next / My Wife  ->  The-Who--Whos-Next--My-Wife
//! ```
//!
//! Decoding turns `-` back into spaces. It is lossy and only used for display
//! and for the artist letter.
//!
//! ## Shards
//!
//! Songs are spread over 36 containers, one per leading character of the
//! artist name (`0-9`, `a-z`). A leading "A " or "The " is skipped so that
//! "The Who" files under `w`.

use crate::error::JukeboxError;

/// Separator between the encoded parts of a composite key.
pub const KEY_SEPARATOR: &str = "--";

/// Suffix shared by all per-letter song containers.
pub const SONG_CONTAINER_SUFFIX: &str = "-artist-songs";

/// Characters that get a pre-created song container.
pub const SHARD_LETTERS: &str = "0123456789abcdefghijklmnopqrstuvwxyz";

/// Encode a single value for use inside an object key.
pub fn encode_value(value: &str) -> String {
    value
        .chars()
        .filter(|c| !matches!(c, '\'' | '!' | '?'))
        .map(|c| if c == ' ' { '-' } else { c })
        .collect()
}

/// Decode a key component for display. Not the inverse of [`encode_value`].
pub fn decode_value(value: &str) -> String {
    value.replace('-', " ")
}

/// `encode(artist)--encode(album)`, the key of an album document and the
/// prefix shared by every song on that album.
pub fn album_key(artist: &str, album: &str) -> String {
    format!("{}{KEY_SEPARATOR}{}", encode_value(artist), encode_value(album))
}

/// `encode(artist)--encode(album)--encode(song)`, a song uid without extension.
pub fn song_key(artist: &str, album: &str, song: &str) -> String {
    format!("{}{KEY_SEPARATOR}{}", album_key(artist, album), encode_value(song))
}

/// Decoded components of a song file name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SongTriple {
    pub artist: String,
    pub album: String,
    pub song: String,
}

impl SongTriple {
    /// The empty triple marks a file name that cannot be imported.
    pub fn is_valid(&self) -> bool {
        !self.artist.is_empty() && !self.album.is_empty() && !self.song.is_empty()
    }
}

/// Split a file name such as `The-Who--Whos-Next--My-Wife.mp3` into its
/// decoded triple. Anything other than exactly three `--` separated parts in
/// the stem yields the empty triple.
pub fn components_from_file_name(file_name: &str) -> SongTriple {
    let stem = match file_name.split_once('.') {
        Some((stem, _)) => stem,
        None => file_name,
    };

    let parts: Vec<&str> = stem.split(KEY_SEPARATOR).collect();
    if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
        return SongTriple::default();
    }

    SongTriple {
        artist: decode_value(parts[0]),
        album: decode_value(parts[1]),
        song: decode_value(parts[2]),
    }
}

/// Strip the extension (everything from the first `.`) from a song uid.
pub fn key_from_file_name(file_name: &str) -> &str {
    file_name.split_once('.').map_or(file_name, |(stem, _)| stem)
}

/// The lowercased shard character for a decoded artist name.
pub fn artist_letter(artist: &str) -> Option<char> {
    let skip = if artist.starts_with("A ") {
        2
    } else if artist.starts_with("The ") {
        4
    } else {
        0
    };

    artist
        .chars()
        .nth(skip)
        .map(|c| c.to_ascii_lowercase())
}

/// Container names derived from the configured prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerNames {
    prefix: String,
}

impl ContainerNames {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn metadata(&self) -> String {
        format!("{}music-metadata", self.prefix)
    }

    pub fn album_art(&self) -> String {
        format!("{}album-art", self.prefix)
    }

    pub fn albums(&self) -> String {
        format!("{}albums", self.prefix)
    }

    pub fn playlists(&self) -> String {
        format!("{}playlists", self.prefix)
    }

    /// Song container for an already lowercased shard character.
    pub fn song_container(&self, letter: char) -> String {
        format!("{}{letter}{SONG_CONTAINER_SUFFIX}", self.prefix)
    }

    /// Every container `init-storage` creates: 36 shards then the four
    /// fixed containers.
    pub fn all(&self) -> Vec<String> {
        let mut names: Vec<String> = SHARD_LETTERS
            .chars()
            .map(|letter| self.song_container(letter))
            .collect();
        names.push(self.metadata());
        names.push(self.album_art());
        names.push(self.albums());
        names.push(self.playlists());
        names
    }

    /// Resolve the shard holding `song_uid`.
    ///
    /// # Errors
    ///
    /// [`JukeboxError::BadShardKey`] when the uid does not parse into a
    /// triple or its artist letter has no pre-created container.
    pub fn container_for_song(&self, song_uid: &str) -> Result<String, JukeboxError> {
        let triple = components_from_file_name(song_uid);
        if !triple.is_valid() {
            return Err(JukeboxError::BadShardKey(format!(
                "'{song_uid}' is not of the form artist--album--song.ext"
            )));
        }

        match artist_letter(&triple.artist) {
            Some(letter) if SHARD_LETTERS.contains(letter) => Ok(self.song_container(letter)),
            _ => Err(JukeboxError::BadShardKey(format!(
                "artist '{}' of '{song_uid}' has no song container",
                triple.artist
            ))),
        }
    }
}
