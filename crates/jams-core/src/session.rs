//! Playback session orchestration.
//!
//! The session state machine: which playlist is bound, which track is
//! current, whether playback runs, and the play-order permutation that
//! next/previous traversal follows. All remote commands flow through the
//! [`StreamingApi`]; local state is only mutated after the corresponding
//! remote call succeeds. Play-order regeneration is pure local computation
//! and always succeeds.
//!
//! Commands are not queued or coalesced: a caller must await each command
//! before issuing the next, or local state may interleave unpredictably.
//! There is no internal request queue or mutex.

use std::sync::Arc;

use rand::seq::SliceRandom;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::auth::AuthManager;
use crate::error::{Error, Result};
use crate::player::PlayerAdapter;
use crate::playlist::Playlist;
use crate::progress::ProgressClock;
use crate::resolver::TrackResolver;
use crate::spotify::StreamingApi;

/// Traversal direction for [`Orchestrator::advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Move to the next entry in play order.
    Next,
    /// Move to the previous entry in play order.
    Previous,
}

/// In-memory playback session state. Reset on host reload; never
/// persisted.
#[derive(Debug, Default)]
pub struct PlaybackSession {
    /// The bound playlist, if any.
    pub playlist: Option<Playlist>,
    /// Index of the current track within the playlist. Always a valid
    /// index when set.
    pub current_index: Option<usize>,
    /// Whether playback is believed to be running.
    pub is_playing: bool,
    /// Whether shuffle mode is on.
    pub shuffle: bool,
    /// Permutation of `[0, len)` defining next/previous traversal order.
    /// Regenerated whenever the playlist changes or the length mismatches.
    pub play_order: Vec<usize>,
}

impl PlaybackSession {
    /// Regenerate the play order when it is empty or no longer matches
    /// the playlist length.
    fn ensure_play_order(&mut self, current: Option<usize>) {
        let len = self.playlist.as_ref().map_or(0, Playlist::len);
        if self.play_order.len() != len {
            self.play_order = generate_play_order(len, self.shuffle, current);
        }
    }
}

/// Generate a play order over `len` tracks.
///
/// Unshuffled, this is the identity permutation. Shuffled, it is a
/// uniform Fisher-Yates permutation with `current` (when given) swapped
/// into position 0, so regeneration never jumps the listener away from
/// the track they are hearing.
#[must_use]
pub fn generate_play_order(len: usize, shuffle: bool, current: Option<usize>) -> Vec<usize> {
    let mut order: Vec<usize> = (0..len).collect();
    if shuffle {
        order.shuffle(&mut rand::rng());
        if let Some(current) = current
            && let Some(position) = order.iter().position(|&index| index == current)
            && position != 0
        {
            order.swap(0, position);
        }
    }
    order
}

/// Drives a single playlist-at-a-time, single-device playback session.
pub struct Orchestrator {
    auth: Arc<AuthManager>,
    api: Arc<dyn StreamingApi>,
    resolver: TrackResolver,
    player: Option<Arc<PlayerAdapter>>,
    clock: Arc<RwLock<ProgressClock>>,
    session: PlaybackSession,
}

impl Orchestrator {
    /// Create an orchestrator over the given collaborators.
    #[must_use]
    pub fn new(
        auth: Arc<AuthManager>,
        api: Arc<dyn StreamingApi>,
        clock: Arc<RwLock<ProgressClock>>,
    ) -> Self {
        let resolver = TrackResolver::new(api.clone());
        Self {
            auth,
            api,
            resolver,
            player: None,
            clock,
            session: PlaybackSession::default(),
        }
    }

    /// Attach an initialized player adapter. Play commands are scoped to
    /// its device; without one they target the user's active device,
    /// which is how mobile hosts run where no browser engine exists.
    pub fn attach_player(&mut self, player: Arc<PlayerAdapter>) {
        self.player = Some(player);
    }

    /// Read access to the session state.
    #[must_use]
    pub const fn session(&self) -> &PlaybackSession {
        &self.session
    }

    /// Bind a playlist without starting playback. Clears the current
    /// track and play order.
    pub fn select_playlist(&mut self, playlist: Playlist) {
        info!("Selected playlist {}", playlist.label);
        self.session.playlist = Some(playlist);
        self.session.current_index = None;
        self.session.play_order.clear();
    }

    /// Play the song at `index` in the bound playlist.
    ///
    /// Resolves the song's remote URI on cache miss, issues the remote
    /// play command, and only on success binds the index, marks playback
    /// running, ensures a play order seeded with this index, and rebases
    /// the progress clock from the engine snapshot when one is available.
    ///
    /// # Errors
    ///
    /// Propagates resolver and remote-command failures; session state is
    /// left unchanged on failure.
    pub async fn play(&mut self, index: usize) -> Result<()> {
        let token = self.auth.access_token().ok_or(Error::AuthenticationRequired)?;

        let uri = {
            let playlist = self.session.playlist.as_mut().ok_or(Error::NoPlaylist)?;
            let len = playlist.len();
            let song = playlist
                .songs
                .get_mut(index)
                .ok_or(Error::IndexOutOfRange { index, len })?;
            self.resolver.resolve(&token, song).await?
        };

        let device_id = match &self.player {
            Some(player) => player.device_id().await,
            None => None,
        };
        self.api
            .play_track(&token, &uri, device_id.as_deref())
            .await?;

        self.session.current_index = Some(index);
        self.session.is_playing = true;
        self.session.ensure_play_order(Some(index));
        debug!("Now playing index {index} ({uri})");

        self.rebase_clock_from_engine().await;
        Ok(())
    }

    /// Pause playback. The local flag flips only when the remote command
    /// succeeds.
    ///
    /// # Errors
    ///
    /// Propagates the remote-command failure, leaving `is_playing`
    /// unchanged.
    pub async fn pause(&mut self) -> Result<()> {
        let token = self.auth.access_token().ok_or(Error::AuthenticationRequired)?;
        self.api.pause(&token).await?;
        self.session.is_playing = false;
        self.clock.write().await.set_playing(false);
        Ok(())
    }

    /// Resume playback. The local flag flips only when the remote command
    /// succeeds.
    ///
    /// # Errors
    ///
    /// Propagates the remote-command failure, leaving `is_playing`
    /// unchanged.
    pub async fn resume(&mut self) -> Result<()> {
        let token = self.auth.access_token().ok_or(Error::AuthenticationRequired)?;
        self.api.resume(&token).await?;
        self.session.is_playing = true;
        self.clock.write().await.set_playing(true);
        Ok(())
    }

    /// Flip shuffle mode and regenerate the play order immediately, with
    /// the currently playing index forced to position 0. Never touches
    /// the current index or interrupts playback.
    pub fn toggle_shuffle(&mut self) {
        self.session.shuffle = !self.session.shuffle;
        let len = self.session.playlist.as_ref().map_or(0, Playlist::len);
        self.session.play_order =
            generate_play_order(len, self.session.shuffle, self.session.current_index);
        info!(
            "Shuffle {}",
            if self.session.shuffle { "on" } else { "off" }
        );
    }

    /// Move to the neighboring play-order entry.
    ///
    /// A no-op when no playlist or track is bound, and at the play-order
    /// boundaries: `Next` at the last position and `Previous` at the
    /// first do not wrap around.
    ///
    /// # Errors
    ///
    /// Propagates resolver and remote-command failures from playing the
    /// target track.
    pub async fn advance(&mut self, direction: Direction) -> Result<()> {
        let Some(current) = self.session.current_index else {
            return Ok(());
        };
        if self.session.playlist.is_none() {
            return Ok(());
        }

        self.session.ensure_play_order(Some(current));
        let order = &self.session.play_order;
        let Some(position) = order.iter().position(|&index| index == current) else {
            return Ok(());
        };

        let target = match direction {
            Direction::Next if position + 1 < order.len() => order[position + 1],
            Direction::Previous if position > 0 => order[position - 1],
            _ => {
                debug!("Advance {direction:?} at play-order boundary, ignoring");
                return Ok(());
            }
        };

        self.play(target).await
    }

    /// Seek within the current track. On success the progress clock is
    /// rebased so its reference point is `now - position`.
    ///
    /// # Errors
    ///
    /// Propagates the remote-command failure; the clock is not rebased.
    pub async fn seek(&mut self, position_ms: u64) -> Result<()> {
        let token = self.auth.access_token().ok_or(Error::AuthenticationRequired)?;
        self.api.seek(&token, position_ms).await?;
        self.clock.write().await.rebase_position(position_ms);
        Ok(())
    }

    /// Ingest an is-playing push from the player adapter. This and the
    /// progress tick are the only asynchronous mutation sources of
    /// session state.
    pub async fn apply_remote_playing(&mut self, playing: bool) {
        if self.session.is_playing != playing {
            debug!("Remote is-playing changed to {playing}");
            self.session.is_playing = playing;
        }
        self.clock.write().await.set_playing(playing);
    }

    /// Rebase the progress clock from the engine's snapshot. Without an
    /// attached player (or before the engine has a session) the clock is
    /// reset with an unknown duration and stays idle.
    async fn rebase_clock_from_engine(&self) {
        let state = match &self.player {
            Some(player) => player.current_state().await,
            None => None,
        };
        let mut clock = self.clock.write().await;
        match state {
            Some(state) => clock.rebase(state.position_ms, state.duration_ms),
            None => clock.rebase(0, 0),
        }
        clock.set_playing(true);
    }
}
