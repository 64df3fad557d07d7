use crate::error::JukeboxError;
use crate::name_codec::{self, ContainerNames};
use serde::{Deserialize, Serialize};

/// How a song, and where its blob lives, is stored in the catalog.
///
/// Songs are immutable once uploaded. `song_uid` is also the object name,
/// e.g. `The-Who--Whos-Next--My-Wife.mp3`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    pub song_uid: String,
    pub artist_name: String,
    pub song_name: String,
    /// `encode(artist)--encode(album)`, when known.
    pub album_uid: Option<String>,
    /// Modification time of the source file, ISO-8601.
    pub file_time: String,
    /// Bytes in the source file.
    pub origin_size: u64,
    /// Bytes actually uploaded, after compression/encryption.
    pub stored_size: u64,
    pub pad_char_count: u32,
    /// MD5 over the *source* bytes, lowercase hex.
    pub md5_hash: String,
    pub compressed: bool,
    pub encrypted: bool,
    pub container_name: String,
    pub object_name: String,
}

impl Song {
    /// Check the invariants every catalog row must hold.
    pub fn validate(&self, names: &ContainerNames) -> Result<(), JukeboxError> {
        let expected = names.container_for_song(&self.song_uid)?;
        if expected != self.container_name {
            return Err(JukeboxError::BadShardKey(format!(
                "'{}' belongs in '{expected}', not '{}'",
                self.song_uid, self.container_name
            )));
        }
        if self.md5_hash.is_empty() {
            return Err(JukeboxError::ConfigInvalid(format!(
                "'{}' has no md5 hash",
                self.song_uid
            )));
        }
        if self.stored_size == 0 {
            return Err(JukeboxError::ConfigInvalid(format!(
                "'{}' has a stored size of 0",
                self.song_uid
            )));
        }
        Ok(())
    }

    /// The album name as shown to users, from the uid.
    pub fn album_name(&self) -> String {
        name_codec::components_from_file_name(&self.song_uid).album
    }

    /// `artist - song` for queue listings.
    pub fn display_name(&self) -> String {
        format!("{} - {}", self.artist_name, self.song_name)
    }
}
