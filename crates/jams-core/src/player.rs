//! Remote playback engine adapter.
//!
//! The provider's in-browser playback engine is an externally loaded
//! component that registers itself as a playback device and pushes
//! lifecycle events. This module wraps it behind the [`PlaybackEngine`]
//! trait so the rest of the core (and the tests) never touch the real
//! engine: the host supplies an [`EngineFactory`] that binds an engine
//! instance to an access token.
//!
//! Initialization is a one-shot race: exactly one of `ready`,
//! `initialization_error`, `authentication_error`, or `account_error`
//! decides the outcome. After a successful bring-up a pump task forwards
//! the engine's state pushes to the adapter's subscriber as
//! [`PlayerEvent`]s.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock, mpsc};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Snapshot of the engine's playback state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineState {
    /// URI of the track loaded in the engine, if any.
    pub track_uri: Option<String>,
    /// Playback position in milliseconds.
    pub position_ms: u64,
    /// Track duration in milliseconds.
    pub duration_ms: u64,
    /// Whether playback is paused.
    pub paused: bool,
}

/// Lifecycle and state events pushed by the playback engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// The engine registered as a device and can accept commands.
    Ready {
        /// Identifier of the registered playback device.
        device_id: String,
    },
    /// The device went offline.
    NotReady {
        /// Identifier of the playback device.
        device_id: String,
    },
    /// The engine failed to start.
    InitializationError {
        /// Error detail from the engine.
        message: String,
    },
    /// The engine rejected the access token.
    AuthenticationError {
        /// Error detail from the engine.
        message: String,
    },
    /// The account tier does not permit engine playback.
    AccountError {
        /// Error detail from the engine.
        message: String,
    },
    /// A track failed to play; playback continues to be possible.
    PlaybackError {
        /// Error detail from the engine.
        message: String,
    },
    /// The engine's playback state changed.
    StateChanged(EngineState),
}

/// The opaque in-browser playback engine, seen from the core.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlaybackEngine: Send + Sync {
    /// Connect the engine and return its event stream.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Initialization`] when the engine cannot start
    /// connecting at all.
    async fn connect(&self) -> Result<mpsc::Receiver<EngineEvent>>;

    /// Tear the engine down. Idempotent.
    async fn disconnect(&self);

    /// Current playback state, or `None` when no session exists yet.
    async fn current_state(&self) -> Option<EngineState>;
}

/// Builds engine instances bound to an access token.
///
/// The real implementation loads the provider's player script and
/// constructs its player object with `{name, getOAuthToken, volume}`.
#[cfg_attr(test, mockall::automock)]
pub trait EngineFactory: Send + Sync {
    /// Create an engine bound to the given token and initial volume.
    fn create(&self, access_token: &str, volume: f32) -> Arc<dyn PlaybackEngine>;
}

/// Events the adapter surfaces to its subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    /// The engine's is-playing flag flipped.
    PlayingChanged(bool),
    /// Full state push from the engine, for hosts that want it.
    StateChanged(EngineState),
    /// The registered device went offline.
    DeviceNotReady {
        /// Identifier of the playback device.
        device_id: String,
    },
}

struct Inner {
    engine: Option<Arc<dyn PlaybackEngine>>,
    device_id: Option<String>,
    events: Option<mpsc::Receiver<PlayerEvent>>,
    pump_shutdown: Option<mpsc::Sender<()>>,
}

/// Adapter owning the engine instance and its event pump.
pub struct PlayerAdapter {
    factory: Box<dyn EngineFactory>,
    volume: f32,
    // Serializes bring-up attempts without holding `inner`, so state
    // reads keep answering while the engine connects.
    init_lock: Mutex<()>,
    inner: RwLock<Inner>,
}

impl PlayerAdapter {
    /// Create an adapter that builds engines through the given factory.
    #[must_use]
    pub fn new(factory: Box<dyn EngineFactory>, volume: f32) -> Self {
        Self {
            factory,
            volume,
            init_lock: Mutex::new(()),
            inner: RwLock::new(Inner {
                engine: None,
                device_id: None,
                events: None,
                pump_shutdown: None,
            }),
        }
    }

    /// Bring up the playback engine and wait for device registration.
    ///
    /// The engine is constructed at most once per adapter lifetime; a
    /// second call returns the already-registered device id. The first
    /// terminal engine event decides the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Initialization`], [`Error::Authentication`], or
    /// [`Error::PremiumRequired`] depending on which error event fires.
    pub async fn initialize(&self, access_token: &str) -> Result<String> {
        let _bring_up = self.init_lock.lock().await;
        if let Some(device_id) = self.inner.read().await.device_id.clone() {
            debug!("Player already initialized as device {device_id}");
            return Ok(device_id);
        }

        let engine = self.factory.create(access_token, self.volume);
        let mut engine_rx = engine.connect().await?;

        let device_id = loop {
            match engine_rx.recv().await {
                Some(EngineEvent::Ready { device_id }) => break device_id,
                Some(EngineEvent::InitializationError { message }) => {
                    return Err(Error::Initialization(message));
                }
                Some(EngineEvent::AuthenticationError { message }) => {
                    return Err(Error::Authentication(message));
                }
                Some(EngineEvent::AccountError { message }) => {
                    warn!("Engine account error: {message}");
                    return Err(Error::PremiumRequired);
                }
                Some(event) => {
                    debug!("Engine event before ready: {event:?}");
                }
                None => {
                    return Err(Error::Initialization(
                        "Engine event stream closed before ready".to_string(),
                    ));
                }
            }
        };
        info!("Playback engine ready as device {device_id}");

        let (event_tx, event_rx) = mpsc::channel::<PlayerEvent>(32);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        tokio::spawn(pump_events(engine_rx, event_tx, shutdown_rx));

        let mut inner = self.inner.write().await;
        inner.engine = Some(engine);
        inner.device_id = Some(device_id.clone());
        inner.events = Some(event_rx);
        inner.pump_shutdown = Some(shutdown_tx);
        Ok(device_id)
    }

    /// The registered device id, once initialized.
    pub async fn device_id(&self) -> Option<String> {
        self.inner.read().await.device_id.clone()
    }

    /// Current engine playback state; `None` when no session exists.
    pub async fn current_state(&self) -> Option<EngineState> {
        let engine = self.inner.read().await.engine.clone();
        match engine {
            Some(engine) => engine.current_state().await,
            None => None,
        }
    }

    /// Take the adapter's event stream. Yields `None` after the first
    /// call or before initialization.
    pub async fn take_events(&self) -> Option<mpsc::Receiver<PlayerEvent>> {
        self.inner.write().await.events.take()
    }

    /// Tear down the engine and the event pump. Idempotent.
    pub async fn disconnect(&self) {
        let mut inner = self.inner.write().await;
        if let Some(shutdown) = inner.pump_shutdown.take() {
            let _ = shutdown.send(()).await;
        }
        if let Some(engine) = inner.engine.take() {
            engine.disconnect().await;
            info!("Playback engine disconnected");
        }
        inner.device_id = None;
        inner.events = None;
    }
}

/// Forward engine pushes to the adapter's subscriber, deriving
/// `PlayingChanged` flips from the paused flag.
async fn pump_events(
    mut engine_rx: mpsc::Receiver<EngineEvent>,
    event_tx: mpsc::Sender<PlayerEvent>,
    mut shutdown_rx: mpsc::Receiver<()>,
) {
    let mut last_playing: Option<bool> = None;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!("Player event pump shutting down");
                break;
            }
            event = engine_rx.recv() => {
                match event {
                    Some(EngineEvent::StateChanged(state)) => {
                        let playing = !state.paused;
                        if last_playing != Some(playing) {
                            last_playing = Some(playing);
                            let _ = event_tx.send(PlayerEvent::PlayingChanged(playing)).await;
                        }
                        let _ = event_tx.send(PlayerEvent::StateChanged(state)).await;
                    }
                    Some(EngineEvent::NotReady { device_id }) => {
                        warn!("Playback device {device_id} went offline");
                        let _ = event_tx.send(PlayerEvent::DeviceNotReady { device_id }).await;
                    }
                    Some(EngineEvent::PlaybackError { message }) => {
                        // Not terminal; the engine keeps running.
                        warn!("Playback error: {message}");
                    }
                    Some(event) => {
                        debug!("Ignoring engine event after ready: {event:?}");
                    }
                    None => {
                        debug!("Engine event stream ended");
                        break;
                    }
                }
            }
        }
    }
}
