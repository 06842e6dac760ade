//! Bearer-authenticated REST client for the streaming provider.
//!
//! Covers exactly the five calls the playback core needs: play, pause,
//! resume, seek, and track search. Commands are never queued or retried;
//! a non-success status surfaces as [`Error::RemoteCommand`] and leaves
//! local state to the caller.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Default base URL of the provider's Web API.
pub const DEFAULT_API_BASE: &str = "https://api.spotify.com/v1";

/// A track returned by remote search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundTrack {
    /// Opaque track identifier.
    pub id: String,
    /// Playable track URI, the handle play commands take.
    pub uri: String,
    /// Track name as known to the provider.
    pub name: String,
    /// Track duration in milliseconds.
    pub duration_ms: u64,
}

/// The remote command surface of the streaming provider.
///
/// Every method is a single awaitable network call with no implicit
/// retries. The access token is passed per call; token lifecycle belongs
/// to [`AuthManager`](crate::auth::AuthManager).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StreamingApi: Send + Sync {
    /// Start playback of a track, optionally scoped to a device.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RemoteCommand`] on a non-success status and
    /// [`Error::PremiumRequired`] when the account tier forbids playback.
    async fn play_track<'a>(
        &self,
        token: &str,
        uri: &str,
        device_id: Option<&'a str>,
    ) -> Result<()>;

    /// Pause playback.
    async fn pause(&self, token: &str) -> Result<()>;

    /// Resume playback.
    async fn resume(&self, token: &str) -> Result<()>;

    /// Seek within the currently playing track.
    async fn seek(&self, token: &str, position_ms: u64) -> Result<()>;

    /// Search for the best match of a track name + artist pair.
    ///
    /// Returns `Ok(None)` when the search yields no results.
    async fn search_track(
        &self,
        token: &str,
        name: &str,
        artist: &str,
    ) -> Result<Option<FoundTrack>>;
}

// Search response shape, trimmed to the fields the core reads.

#[derive(Debug, Deserialize)]
struct SearchResponse {
    tracks: Option<SearchTracks>,
}

#[derive(Debug, Deserialize)]
struct SearchTracks {
    items: Vec<TrackItem>,
}

#[derive(Debug, Deserialize)]
struct TrackItem {
    id: String,
    uri: String,
    name: String,
    duration_ms: u64,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

/// [`StreamingApi`] implementation against the provider's Web API.
pub struct WebApiClient {
    http: reqwest::Client,
    api_base: String,
}

impl WebApiClient {
    /// Create a client against the production API.
    #[must_use]
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    /// Override the API base URL.
    #[must_use]
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    /// Pull the provider's error message out of a failed response body.
    async fn error_message(response: reqwest::Response) -> String {
        let fallback = "Remote command failed".to_string();
        match response.json::<ApiErrorBody>().await {
            Ok(body) => body
                .error
                .and_then(|detail| detail.message)
                .unwrap_or(fallback),
            Err(_) => fallback,
        }
    }

    /// Map a command response to our error taxonomy. Player commands
    /// usually answer 204 No Content, which counts as success.
    async fn check_command(response: reqwest::Response) -> Result<()> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let message = Self::error_message(response).await;
        warn!("Player command failed with {status}: {message}");
        Err(Error::RemoteCommand {
            status: status.as_u16(),
            message,
        })
    }
}

impl Default for WebApiClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StreamingApi for WebApiClient {
    async fn play_track<'a>(
        &self,
        token: &str,
        uri: &str,
        device_id: Option<&'a str>,
    ) -> Result<()> {
        debug!("Play command for {uri} on device {device_id:?}");
        let mut request = self
            .http
            .put(format!("{}/me/player/play", self.api_base))
            .bearer_auth(token)
            .json(&serde_json::json!({ "uris": [uri] }));
        if let Some(device_id) = device_id {
            request = request.query(&[("device_id", device_id)]);
        }

        let response = request.send().await?;
        let status = response.status();
        match status {
            // The provider answers 404 when no playback device exists yet.
            StatusCode::NOT_FOUND => Err(Error::RemoteCommand {
                status: status.as_u16(),
                message: "No active device; wait for the player to initialize".to_string(),
            }),
            StatusCode::FORBIDDEN => Err(Error::PremiumRequired),
            _ => Self::check_command(response).await,
        }
    }

    async fn pause(&self, token: &str) -> Result<()> {
        debug!("Pause command");
        let response = self
            .http
            .put(format!("{}/me/player/pause", self.api_base))
            .bearer_auth(token)
            .send()
            .await?;
        Self::check_command(response).await
    }

    async fn resume(&self, token: &str) -> Result<()> {
        debug!("Resume command");
        let response = self
            .http
            .put(format!("{}/me/player/play", self.api_base))
            .bearer_auth(token)
            .send()
            .await?;
        Self::check_command(response).await
    }

    async fn seek(&self, token: &str, position_ms: u64) -> Result<()> {
        debug!("Seek command to {position_ms}ms");
        let response = self
            .http
            .put(format!("{}/me/player/seek", self.api_base))
            .query(&[("position_ms", position_ms.to_string())])
            .bearer_auth(token)
            .send()
            .await?;
        Self::check_command(response).await
    }

    async fn search_track(
        &self,
        token: &str,
        name: &str,
        artist: &str,
    ) -> Result<Option<FoundTrack>> {
        let query = format!("track:{name} artist:{artist}");
        debug!("Searching for {query}");
        let response = self
            .http
            .get(format!("{}/search", self.api_base))
            .query(&[("q", query.as_str()), ("type", "track"), ("limit", "1")])
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = Self::error_message(response).await;
            return Err(Error::RemoteCommand {
                status: status.as_u16(),
                message,
            });
        }

        let body: SearchResponse = response.json().await?;
        Ok(body
            .tracks
            .and_then(|tracks| tracks.items.into_iter().next())
            .map(|item| FoundTrack {
                id: item.id,
                uri: item.uri,
                name: item.name,
                duration_ms: item.duration_ms,
            }))
    }
}
