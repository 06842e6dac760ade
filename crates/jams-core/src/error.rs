//! Error types for Historical Jams core operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Historical Jams core operations.
///
/// No operation in this crate retries automatically; every failure is
/// reported to the immediate caller. None of these errors are fatal to a
/// host application - they are scoped to the playback feature.
#[derive(Debug, Error)]
pub enum Error {
    /// Required configuration is missing or invalid (e.g. no client id).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The authorization code could not be exchanged for an access token.
    #[error("Authorization code exchange failed: {0}")]
    AuthExchange(String),

    /// The remote playback engine failed to initialize.
    #[error("Player initialization failed: {0}")]
    Initialization(String),

    /// The remote playback engine rejected the access token.
    #[error("Player authentication failed: {0}")]
    Authentication(String),

    /// The account tier does not permit playback control.
    #[error("Streaming premium subscription required for playback")]
    PremiumRequired,

    /// A track search returned no results.
    #[error("Track not found: {name} by {artist}")]
    NotFound {
        /// Track name that was searched for.
        name: String,
        /// Artist name that was searched for.
        artist: String,
    },

    /// An operation that needs an active session was called while logged out.
    #[error("Not authenticated")]
    AuthenticationRequired,

    /// A remote player command returned a non-success status.
    #[error("Remote player command failed with status {status}: {message}")]
    RemoteCommand {
        /// HTTP status code returned by the provider.
        status: u16,
        /// Error detail from the provider, if any.
        message: String,
    },

    /// Playback was requested with no playlist bound to the session.
    #[error("No playlist selected")]
    NoPlaylist,

    /// A track index does not fit the bound playlist.
    #[error("Track index {index} out of range for playlist of {len} songs")]
    IndexOutOfRange {
        /// The requested index.
        index: usize,
        /// Length of the bound playlist.
        len: usize,
    },

    /// Credential or config storage failed.
    #[error("Storage error at {path}: {message}")]
    Storage {
        /// Path where the error occurred.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Transport-level HTTP failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = Error::NotFound {
            name: "Roundabout".to_string(),
            artist: "Yes".to_string(),
        };
        assert_eq!(err.to_string(), "Track not found: Roundabout by Yes");
    }

    #[test]
    fn test_remote_command_display() {
        let err = Error::RemoteCommand {
            status: 404,
            message: "No active device".to_string(),
        };
        assert!(err.to_string().contains("404"));
        assert!(err.to_string().contains("No active device"));
    }

    #[test]
    fn test_index_out_of_range_display() {
        let err = Error::IndexOutOfRange { index: 7, len: 3 };
        assert_eq!(
            err.to_string(),
            "Track index 7 out of range for playlist of 3 songs"
        );
    }

    #[test]
    fn test_storage_display_includes_path() {
        let err = Error::Storage {
            path: PathBuf::from("/tmp/credentials.json"),
            message: "Failed to write".to_string(),
        };
        assert!(err.to_string().contains("/tmp/credentials.json"));
        assert!(err.to_string().contains("Failed to write"));
    }
}
