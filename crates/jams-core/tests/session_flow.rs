//! End-to-end playback session flows through the public API.
//!
//! These tests drive the orchestrator against a scripted in-process
//! streaming API and an in-memory credential store, covering the full
//! select / play / advance / shuffle / pause lifecycle.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::sync::RwLock;

use jams_core::{
    AuthManager, CredentialStore, Direction, Error, FoundTrack, Orchestrator, PlayerConfig,
    Playlist, ProgressClock, Result, Song, StoredCredential, StreamingApi,
};

// ===== Test doubles =====

/// Credential store that never touches the filesystem.
#[derive(Default)]
struct MemoryStore {
    credential: Mutex<Option<StoredCredential>>,
    verifier: Mutex<Option<String>>,
}

impl CredentialStore for MemoryStore {
    fn load(&self) -> Result<Option<StoredCredential>> {
        Ok(self.credential.lock().unwrap().clone())
    }

    fn save(&self, credential: &StoredCredential) -> Result<()> {
        *self.credential.lock().unwrap() = Some(credential.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.credential.lock().unwrap() = None;
        Ok(())
    }

    fn load_verifier(&self) -> Result<Option<String>> {
        Ok(self.verifier.lock().unwrap().clone())
    }

    fn save_verifier(&self, verifier: &str) -> Result<()> {
        *self.verifier.lock().unwrap() = Some(verifier.to_string());
        Ok(())
    }

    fn clear_verifier(&self) -> Result<()> {
        *self.verifier.lock().unwrap() = None;
        Ok(())
    }
}

/// Scripted streaming API that records every command it receives.
#[derive(Default)]
struct ScriptedApi {
    /// `"name|artist"` -> track to return from search.
    catalog: HashMap<String, FoundTrack>,
    played_uris: Mutex<Vec<String>>,
    search_count: Mutex<usize>,
    pause_count: Mutex<usize>,
    seek_positions: Mutex<Vec<u64>>,
    fail_play: bool,
}

impl ScriptedApi {
    fn with_catalog(songs: &[(&str, &str, &str)]) -> Self {
        let catalog = songs
            .iter()
            .map(|(name, artist, uri)| {
                (
                    format!("{name}|{artist}"),
                    FoundTrack {
                        id: (*uri).to_string(),
                        uri: (*uri).to_string(),
                        name: (*name).to_string(),
                        duration_ms: 200_000,
                    },
                )
            })
            .collect();
        Self {
            catalog,
            ..Default::default()
        }
    }
}

#[async_trait]
impl StreamingApi for ScriptedApi {
    async fn play_track<'a>(
        &self,
        _token: &str,
        uri: &str,
        _device_id: Option<&'a str>,
    ) -> Result<()> {
        if self.fail_play {
            return Err(Error::RemoteCommand {
                status: 502,
                message: "bad gateway".to_string(),
            });
        }
        self.played_uris.lock().unwrap().push(uri.to_string());
        Ok(())
    }

    async fn pause(&self, _token: &str) -> Result<()> {
        *self.pause_count.lock().unwrap() += 1;
        Ok(())
    }

    async fn resume(&self, _token: &str) -> Result<()> {
        Ok(())
    }

    async fn seek(&self, _token: &str, position_ms: u64) -> Result<()> {
        self.seek_positions.lock().unwrap().push(position_ms);
        Ok(())
    }

    async fn search_track(
        &self,
        _token: &str,
        name: &str,
        artist: &str,
    ) -> Result<Option<FoundTrack>> {
        *self.search_count.lock().unwrap() += 1;
        Ok(self.catalog.get(&format!("{name}|{artist}")).cloned())
    }
}

// ===== Fixtures =====

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn authenticated_manager() -> Arc<AuthManager> {
    let store = MemoryStore::default();
    store
        .save(&StoredCredential {
            access_token: "integration-token".to_string(),
            expires_at_ms: now_ms() + 3_600_000,
        })
        .unwrap();
    Arc::new(AuthManager::new(
        PlayerConfig {
            client_id: "integration-client".to_string(),
            ..Default::default()
        },
        Arc::new(store),
    ))
}

fn march_2019() -> Playlist {
    Playlist::new(
        "March 2019",
        vec![
            Song::new("First Light", "Aurora Drive"),
            Song::new("Night Bus", "Aurora Drive"),
            Song::new("Glass Coast", "Vela"),
        ],
    )
}

fn march_catalog() -> Vec<(&'static str, &'static str, &'static str)> {
    vec![
        ("First Light", "Aurora Drive", "spotify:track:first"),
        ("Night Bus", "Aurora Drive", "spotify:track:night"),
        ("Glass Coast", "Vela", "spotify:track:glass"),
    ]
}

fn orchestrator_over(api: Arc<ScriptedApi>) -> Orchestrator {
    // Surface orchestrator tracing when a test fails under --nocapture.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("jams_core=debug")),
        )
        .with_test_writer()
        .try_init();
    Orchestrator::new(
        authenticated_manager(),
        api,
        Arc::new(RwLock::new(ProgressClock::new())),
    )
}

// ===== Tests =====

/// A full sequential listen: play the first track, advance through the
/// playlist, and stop at the end without wrapping around.
#[tokio::test]
async fn test_sequential_playthrough() {
    let api = Arc::new(ScriptedApi::with_catalog(&march_catalog()));
    let mut orch = orchestrator_over(api.clone());

    orch.select_playlist(march_2019());
    orch.play(0).await.expect("play");
    orch.advance(Direction::Next).await.expect("advance");
    orch.advance(Direction::Next).await.expect("advance");
    orch.advance(Direction::Next).await.expect("advance past end");

    let played = api.played_uris.lock().unwrap().clone();
    assert_eq!(
        played,
        vec![
            "spotify:track:first",
            "spotify:track:night",
            "spotify:track:glass",
        ]
    );
    assert_eq!(orch.session().current_index, Some(2));
}

/// Search results are cached on the song, so replaying a track does not
/// hit the search endpoint again.
#[tokio::test]
async fn test_resolution_is_cached_across_replays() {
    let api = Arc::new(ScriptedApi::with_catalog(&march_catalog()));
    let mut orch = orchestrator_over(api.clone());

    orch.select_playlist(march_2019());
    orch.play(0).await.expect("play");
    orch.play(0).await.expect("replay");

    assert_eq!(*api.search_count.lock().unwrap(), 1);
    assert_eq!(api.played_uris.lock().unwrap().len(), 2);
}

/// A song the catalog does not know surfaces as a not-found error and
/// leaves the session untouched.
#[tokio::test]
async fn test_unresolvable_song_reports_not_found() {
    let api = Arc::new(ScriptedApi::with_catalog(&march_catalog()));
    let mut orch = orchestrator_over(api.clone());

    orch.select_playlist(Playlist::new(
        "March 2019",
        vec![Song::new("Unreleased Demo", "Nobody")],
    ));

    let result = orch.play(0).await;
    match result {
        Err(Error::NotFound { name, artist }) => {
            assert_eq!(name, "Unreleased Demo");
            assert_eq!(artist, "Nobody");
        }
        other => panic!("expected NotFound, got {other:?}"),
    }
    assert_eq!(orch.session().current_index, None);
    assert!(api.played_uris.lock().unwrap().is_empty());
}

/// Shuffle on mid-playback keeps the current track audible and first in
/// the regenerated order; every track still appears exactly once.
#[tokio::test]
async fn test_shuffle_mid_playback_keeps_current_first() {
    let api = Arc::new(ScriptedApi::with_catalog(&march_catalog()));
    let mut orch = orchestrator_over(api.clone());

    orch.select_playlist(march_2019());
    orch.play(1).await.expect("play");

    orch.toggle_shuffle();

    let session = orch.session();
    assert!(session.shuffle);
    assert_eq!(session.current_index, Some(1));
    assert_eq!(session.play_order[0], 1);
    let mut sorted = session.play_order.clone();
    sorted.sort_unstable();
    assert_eq!(sorted, vec![0, 1, 2]);

    // Only the original play command went out; the toggle is local.
    assert_eq!(api.played_uris.lock().unwrap().len(), 1);
}

/// A failed play command leaves the previous track current.
#[tokio::test]
async fn test_failed_play_preserves_previous_track() {
    let ok_api = Arc::new(ScriptedApi::with_catalog(&march_catalog()));
    let mut orch = orchestrator_over(ok_api);
    orch.select_playlist(march_2019());
    orch.play(0).await.expect("play");

    // Swap in an API that rejects every play.
    let failing = Arc::new(ScriptedApi {
        fail_play: true,
        ..ScriptedApi::with_catalog(&march_catalog())
    });
    let mut orch2 = orchestrator_over(failing);
    orch2.select_playlist(march_2019());
    assert!(orch2.play(0).await.is_err());
    assert_eq!(orch2.session().current_index, None);
    assert!(!orch2.session().is_playing);
}

/// Pause and seek round-trip through the remote API and the session flag.
#[tokio::test]
async fn test_pause_and_seek_flow() {
    let api = Arc::new(ScriptedApi::with_catalog(&march_catalog()));
    let mut orch = orchestrator_over(api.clone());

    orch.select_playlist(march_2019());
    orch.play(0).await.expect("play");
    assert!(orch.session().is_playing);

    orch.pause().await.expect("pause");
    assert!(!orch.session().is_playing);
    assert_eq!(*api.pause_count.lock().unwrap(), 1);

    orch.resume().await.expect("resume");
    assert!(orch.session().is_playing);

    orch.seek(45_000).await.expect("seek");
    assert_eq!(*api.seek_positions.lock().unwrap(), vec![45_000]);
}

/// Without a stored credential every remote operation is rejected before
/// any network traffic.
#[tokio::test]
async fn test_logged_out_session_rejects_commands() {
    let api = Arc::new(ScriptedApi::with_catalog(&march_catalog()));
    let auth = Arc::new(AuthManager::new(
        PlayerConfig::default(),
        Arc::new(MemoryStore::default()),
    ));
    let mut orch = Orchestrator::new(
        auth,
        api.clone(),
        Arc::new(RwLock::new(ProgressClock::new())),
    );
    orch.select_playlist(march_2019());

    assert!(matches!(
        orch.play(0).await,
        Err(Error::AuthenticationRequired)
    ));
    assert!(matches!(
        orch.pause().await,
        Err(Error::AuthenticationRequired)
    ));
    assert!(matches!(
        orch.seek(1000).await,
        Err(Error::AuthenticationRequired)
    ));
    assert!(api.played_uris.lock().unwrap().is_empty());
}
