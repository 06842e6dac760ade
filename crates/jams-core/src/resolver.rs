//! Track resolution: mapping a (name, artist) pair to a playable URI.
//!
//! Playlists are authored as plain song metadata; the remote identifier is
//! only looked up when a song is actually played, and then cached on the
//! song for the lifetime of the in-memory playlist.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::playlist::Song;
use crate::spotify::StreamingApi;

/// Resolves songs to remote track URIs through the provider's search.
pub struct TrackResolver {
    api: Arc<dyn StreamingApi>,
}

impl TrackResolver {
    /// Create a resolver backed by the given API client.
    #[must_use]
    pub fn new(api: Arc<dyn StreamingApi>) -> Self {
        Self { api }
    }

    /// Resolve the song's remote track URI, caching it on the song.
    ///
    /// A cached URI short-circuits without any network traffic. Otherwise
    /// the first search result wins.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the search yields no results.
    pub async fn resolve(&self, token: &str, song: &mut Song) -> Result<String> {
        if let Some(uri) = &song.track_uri {
            debug!("Using cached URI for {} by {}", song.name, song.artist);
            return Ok(uri.clone());
        }

        let found = self
            .api
            .search_track(token, &song.name, &song.artist)
            .await?
            .ok_or_else(|| Error::NotFound {
                name: song.name.clone(),
                artist: song.artist.clone(),
            })?;

        info!(
            "Resolved {} by {} to {}",
            song.name, song.artist, found.uri
        );
        song.track_uri = Some(found.uri.clone());
        Ok(found.uri)
    }
}
