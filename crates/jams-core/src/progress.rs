//! Locally-ticking playback progress clock.
//!
//! The remote player is the authority on position, but polling it every
//! frame is wasteful. Instead the clock keeps a wall-clock reference point
//! (`now - known_position`) captured at every track change and seek, and a
//! periodic tick derives the current position from it. When the derived
//! position crosses the track duration the clock reports completion exactly
//! once, which the host wires to `advance(Next)`; an explicit guard flag
//! keeps overlapping ticks from firing the advance twice.
//!
//! While the user drags a seek control, ticking is suspended; it resumes,
//! rebased, once the seek command resolves.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, mpsc};
use tokio::time::{Instant, interval};
use tracing::debug;

/// Default tick interval for position updates.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(100);

/// What a single clock observation yielded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockTick {
    /// Nothing to report: stopped, dragging, or track already completed.
    Idle,
    /// Estimated playback position in milliseconds.
    Position(u64),
    /// The track just crossed its duration. Reported exactly once per
    /// rebase; carries the clamped duration.
    Completed(u64),
}

/// Locally simulated playback position, rebased against remote truth at
/// track changes and seeks.
#[derive(Debug)]
pub struct ProgressClock {
    reference: Option<Instant>,
    duration_ms: u64,
    playing: bool,
    dragging: bool,
    end_fired: bool,
}

impl ProgressClock {
    /// A clock with no track bound.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            reference: None,
            duration_ms: 0,
            playing: false,
            dragging: false,
            end_fired: false,
        }
    }

    /// Rebase on a track change: `reference = now - position`, new
    /// duration, and the end-of-track guard is re-armed.
    pub fn rebase(&mut self, position_ms: u64, duration_ms: u64) {
        self.reference = Some(reference_for(position_ms));
        self.duration_ms = duration_ms;
        self.end_fired = false;
        debug!("Progress clock rebased to {position_ms}ms of {duration_ms}ms");
    }

    /// Rebase the position only, keeping the current duration. Used after
    /// a successful seek.
    pub fn rebase_position(&mut self, position_ms: u64) {
        self.reference = Some(reference_for(position_ms));
        self.end_fired = false;
        debug!("Progress clock rebased to {position_ms}ms");
    }

    /// Update the playing flag; a paused clock reports [`ClockTick::Idle`].
    pub const fn set_playing(&mut self, playing: bool) {
        self.playing = playing;
    }

    /// Suspend ticking while the user drags the seek control.
    pub const fn begin_drag(&mut self) {
        self.dragging = true;
    }

    /// Resume ticking after the drag ended and the seek resolved.
    pub const fn end_drag(&mut self) {
        self.dragging = false;
    }

    /// Track duration currently bound to the clock, in milliseconds.
    #[must_use]
    pub const fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    /// Observe the clock at the current instant.
    ///
    /// Yields the estimated position while the track is running, the
    /// clamped duration exactly once when it ends, and [`ClockTick::Idle`]
    /// otherwise.
    pub fn observe(&mut self) -> ClockTick {
        if !self.playing || self.dragging || self.duration_ms == 0 {
            return ClockTick::Idle;
        }
        let Some(reference) = self.reference else {
            return ClockTick::Idle;
        };

        let elapsed = reference.elapsed().as_millis() as u64;
        if elapsed < self.duration_ms {
            ClockTick::Position(elapsed)
        } else if self.end_fired {
            ClockTick::Idle
        } else {
            self.end_fired = true;
            ClockTick::Completed(self.duration_ms)
        }
    }
}

impl Default for ProgressClock {
    fn default() -> Self {
        Self::new()
    }
}

/// A reference instant such that `reference.elapsed() == position`.
fn reference_for(position_ms: u64) -> Instant {
    let now = Instant::now();
    now.checked_sub(Duration::from_millis(position_ms))
        .unwrap_or(now)
}

/// Events emitted by the progress ticker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Estimated playback position in milliseconds.
    Position(u64),
    /// The current track ended. Emitted exactly once per track; the host
    /// wires this to advancing the session.
    TrackEnded,
}

/// Handle for stopping a running progress ticker.
#[derive(Debug, Clone)]
pub struct ProgressTickerHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl ProgressTickerHandle {
    /// Stop the ticker.
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

/// Periodic driver that observes a shared [`ProgressClock`] and emits
/// [`ProgressEvent`]s over a channel.
pub struct ProgressTicker {
    clock: Arc<RwLock<ProgressClock>>,
    tick_interval: Duration,
}

impl ProgressTicker {
    /// Create a ticker over the shared clock with the default interval.
    #[must_use]
    pub const fn new(clock: Arc<RwLock<ProgressClock>>) -> Self {
        Self {
            clock,
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }

    /// Create a ticker with a custom interval.
    #[must_use]
    pub const fn with_interval(clock: Arc<RwLock<ProgressClock>>, tick_interval: Duration) -> Self {
        Self {
            clock,
            tick_interval,
        }
    }

    /// Start ticking.
    ///
    /// Returns a receiver for progress events and a handle to stop the
    /// ticker. Stopping (or dropping the handle's owner at teardown)
    /// clears the periodic tick, per the component lifecycle.
    #[must_use]
    pub fn start(self) -> (mpsc::Receiver<ProgressEvent>, ProgressTickerHandle) {
        let (event_tx, event_rx) = mpsc::channel::<ProgressEvent>(32);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let clock = self.clock;
        let tick_interval = self.tick_interval;

        tokio::spawn(async move {
            let mut timer = interval(tick_interval);

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!("Progress ticker shutting down");
                        break;
                    }
                    _ = timer.tick() => {
                        let tick = clock.write().await.observe();
                        match tick {
                            ClockTick::Idle => {}
                            ClockTick::Position(position) => {
                                let _ = event_tx.send(ProgressEvent::Position(position)).await;
                            }
                            ClockTick::Completed(duration) => {
                                let _ = event_tx.send(ProgressEvent::Position(duration)).await;
                                let _ = event_tx.send(ProgressEvent::TrackEnded).await;
                            }
                        }
                    }
                }
            }
        });

        (event_rx, ProgressTickerHandle { shutdown_tx })
    }
}
