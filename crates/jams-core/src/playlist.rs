//! Playlist and song data model.
//!
//! A playlist is a fixed, ordered sequence of songs identified by a label
//! (labels are month + year, e.g. "March 2019").
//! Songs carry only display metadata; the remote track identifier is
//! resolved lazily by the [`resolver`](crate::resolver) and cached on the
//! song for the lifetime of the in-memory playlist. It is never persisted.

use serde::{Deserialize, Serialize};

/// A single song entry inside a playlist.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Song {
    /// Track name.
    pub name: String,
    /// Primary artist name.
    pub artist: String,
    /// Album name, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    /// Lazily resolved remote track URI. Runtime cache only.
    #[serde(skip)]
    pub track_uri: Option<String>,
}

impl Song {
    /// Create a song from its name and artist.
    pub fn new(name: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            artist: artist.into(),
            album: None,
            track_uri: None,
        }
    }

    /// Set the album name.
    #[must_use]
    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self
    }

    /// Set a pre-resolved remote track URI.
    #[must_use]
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.track_uri = Some(uri.into());
        self
    }
}

/// An ordered, labeled sequence of songs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Playlist {
    /// Display label, e.g. "March 2019".
    pub label: String,
    /// The songs, in their fixed playlist order.
    pub songs: Vec<Song>,
}

impl Playlist {
    /// Create a playlist from a label and songs.
    pub fn new(label: impl Into<String>, songs: Vec<Song>) -> Self {
        Self {
            label: label.into(),
            songs,
        }
    }

    /// Number of songs in the playlist.
    #[must_use]
    pub fn len(&self) -> usize {
        self.songs.len()
    }

    /// Whether the playlist holds no songs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }
}
