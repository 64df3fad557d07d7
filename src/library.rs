//! Album and playlist documents, stored as JSON objects beside the songs.

use crate::name_codec;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// One track of an [`Album`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub number: u32,
    pub title: String,
    /// Object name of the song blob.
    pub object: String,
    pub length: String,
}

/// Album document, keyed `encode(artist)--encode(album).json` in the albums
/// container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Album {
    pub artist: String,
    pub album: String,
    #[serde(rename = "album-art", default)]
    pub album_art: String,
    #[serde(default)]
    pub year: String,
    #[serde(default)]
    pub genre: Vec<String>,
    #[serde(rename = "type", default)]
    pub album_type: String,
    #[serde(default)]
    pub wiki: String,
    #[serde(default)]
    pub tracks: Vec<Track>,
}

impl Album {
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).context("Malformed album document")
    }

    /// Object name of the document for an album key.
    pub fn object_name(album_key: &str) -> String {
        format!("{album_key}.json")
    }

    pub fn key(&self) -> String {
        name_codec::album_key(&self.artist, &self.album)
    }
}

/// A `(artist, album, song)` reference inside a playlist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistEntry {
    pub artist: String,
    pub album: String,
    pub song: String,
}

impl PlaylistEntry {
    /// Song uid without extension.
    pub fn song_key(&self) -> String {
        name_codec::song_key(&self.artist, &self.album, &self.song)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    pub name: String,
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub songs: Vec<PlaylistEntry>,
}

impl Playlist {
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).context("Malformed playlist document")
    }
}
