//! Historical Jams Core Library
//!
//! This crate provides the playback core for the Historical Jams
//! application:
//! - Streaming-service login via the PKCE authorization-code flow
//! - Track resolution from plain song metadata to playable URIs
//! - Remote playback commands (play, pause, resume, seek) over the Web API
//! - Browser playback-engine lifecycle and event pumping
//! - Playlist session orchestration with shuffle and play-order traversal
//! - A wall-clock-referenced progress clock with end-of-track detection
//!
//! # Error Handling
//!
//! All fallible operations return the crate-wide [`error::Result`], with
//! typed variants for authentication, remote-command, and resolution
//! failures. See the [`error`] module for details.
//!
//! ```rust,ignore
//! use jams_core::{Error, Result};
//!
//! fn do_something() -> Result<()> {
//!     // Your code here
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod player;
pub mod playlist;
pub mod progress;
pub mod resolver;
pub mod session;
pub mod spotify;

pub use auth::{
    AuthManager, CallbackOutcome, CredentialStore, DEFAULT_ACCOUNTS_BASE, FileCredentialStore,
    StoredCredential, VERIFIER_LENGTH,
};
pub use config::{
    DEFAULT_REDIRECT_URI, DEFAULT_SCOPES, DEFAULT_VOLUME, PlayerConfig, data_directory,
};
pub use error::{Error, Result};
pub use player::{
    EngineEvent, EngineFactory, EngineState, PlaybackEngine, PlayerAdapter, PlayerEvent,
};
pub use playlist::{Playlist, Song};
pub use progress::{
    ClockTick, DEFAULT_TICK_INTERVAL, ProgressClock, ProgressEvent, ProgressTicker,
    ProgressTickerHandle,
};
pub use resolver::TrackResolver;
pub use session::{Direction, Orchestrator, PlaybackSession, generate_play_order};
pub use spotify::{DEFAULT_API_BASE, FoundTrack, StreamingApi, WebApiClient};
