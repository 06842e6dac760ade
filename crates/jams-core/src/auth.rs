//! Streaming login and credential management.
//!
//! Implements the provider's Authorization Code flow with PKCE:
//! [`AuthManager::begin_login`] builds the authorization URL and stashes the
//! code verifier, the host redirects the user there, and after the provider
//! redirects back [`AuthManager::complete_login`] exchanges the one-time
//! code for a bearer token. Credentials and the transient verifier survive
//! the redirect round trip through a [`CredentialStore`].
//!
//! Only this module mutates credential state.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::distr::{Alphanumeric, SampleString};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::PlayerConfig;
use crate::error::{Error, Result};

/// Default base URL of the provider's accounts service.
pub const DEFAULT_ACCOUNTS_BASE: &str = "https://accounts.spotify.com";

/// Length of the generated PKCE code verifier. RFC 7636 allows between
/// 43 and 128 characters; we use the maximum.
pub const VERIFIER_LENGTH: usize = 128;

/// A stored access token and its expiry instant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredCredential {
    /// Bearer access token.
    pub access_token: String,
    /// Expiry instant, Unix millis.
    pub expires_at_ms: u64,
}

impl StoredCredential {
    /// Whether the token is still valid at the given instant.
    #[must_use]
    pub const fn is_valid_at(&self, now_ms: u64) -> bool {
        now_ms < self.expires_at_ms
    }
}

/// Durable storage for credentials and the transient PKCE verifier.
///
/// The stand-in for the browser's local storage: one slot for the
/// credential, one for the verifier that must survive the OAuth redirect.
#[cfg_attr(test, mockall::automock)]
pub trait CredentialStore: Send + Sync {
    /// Load the stored credential, if any.
    fn load(&self) -> Result<Option<StoredCredential>>;

    /// Persist the credential.
    fn save(&self, credential: &StoredCredential) -> Result<()>;

    /// Remove the stored credential.
    fn clear(&self) -> Result<()>;

    /// Load the pending PKCE verifier, if any.
    fn load_verifier(&self) -> Result<Option<String>>;

    /// Persist the PKCE verifier for the in-flight login.
    fn save_verifier(&self, verifier: &str) -> Result<()>;

    /// Remove the pending PKCE verifier.
    fn clear_verifier(&self) -> Result<()>;
}

/// File-backed [`CredentialStore`] under the app's data directory.
pub struct FileCredentialStore {
    dir: std::path::PathBuf,
}

impl FileCredentialStore {
    /// Store files under the default data directory.
    #[must_use]
    pub fn new() -> Self {
        Self {
            dir: crate::config::data_directory(),
        }
    }

    /// Store files under a specific directory.
    #[must_use]
    pub const fn with_dir(dir: std::path::PathBuf) -> Self {
        Self { dir }
    }

    fn credential_path(&self) -> std::path::PathBuf {
        self.dir.join("credentials.json")
    }

    fn verifier_path(&self) -> std::path::PathBuf {
        self.dir.join("code_verifier")
    }

    fn write_file(&self, path: &std::path::Path, content: &str) -> Result<()> {
        if !self.dir.exists() {
            std::fs::create_dir_all(&self.dir).map_err(|e| Error::Storage {
                path: self.dir.clone(),
                message: format!("Failed to create credential directory: {e}"),
            })?;
        }
        std::fs::write(path, content).map_err(|e| Error::Storage {
            path: path.to_path_buf(),
            message: format!("Failed to write: {e}"),
        })
    }

    fn remove_file(path: &std::path::Path) -> Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Storage {
                path: path.to_path_buf(),
                message: format!("Failed to remove: {e}"),
            }),
        }
    }
}

impl Default for FileCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<StoredCredential>> {
        let path = self.credential_path();
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path).map_err(|e| Error::Storage {
            path: path.clone(),
            message: format!("Failed to read: {e}"),
        })?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn save(&self, credential: &StoredCredential) -> Result<()> {
        let content = serde_json::to_string_pretty(credential)?;
        self.write_file(&self.credential_path(), &content)
    }

    fn clear(&self) -> Result<()> {
        Self::remove_file(&self.credential_path())
    }

    fn load_verifier(&self) -> Result<Option<String>> {
        let path = self.verifier_path();
        if !path.exists() {
            return Ok(None);
        }
        let verifier = std::fs::read_to_string(&path).map_err(|e| Error::Storage {
            path: path.clone(),
            message: format!("Failed to read: {e}"),
        })?;
        Ok(Some(verifier))
    }

    fn save_verifier(&self, verifier: &str) -> Result<()> {
        self.write_file(&self.verifier_path(), verifier)
    }

    fn clear_verifier(&self) -> Result<()> {
        Self::remove_file(&self.verifier_path())
    }
}

/// Outcome of handling a potential authorization callback URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// The URL carried no authorization code; nothing was done. This is the
    /// normal case on every page load that is not an OAuth redirect.
    NoCallback,
    /// The code was exchanged and a credential stored. The host should
    /// replace the visible URL with `cleaned_url`, which has the
    /// authorization parameters stripped.
    Completed {
        /// The callback URL without its query or fragment.
        cleaned_url: String,
    },
}

impl CallbackOutcome {
    /// Whether a login was completed.
    #[must_use]
    pub const fn handled(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Shape of the provider's token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

/// Owns the login flow and the stored credential.
pub struct AuthManager {
    config: PlayerConfig,
    store: Arc<dyn CredentialStore>,
    http: reqwest::Client,
    accounts_base: String,
    credential: Mutex<Option<StoredCredential>>,
}

impl AuthManager {
    /// Create a manager, loading any previously stored credential.
    ///
    /// An expired stored credential is discarded on load rather than
    /// handed to callers.
    #[must_use]
    pub fn new(config: PlayerConfig, store: Arc<dyn CredentialStore>) -> Self {
        let credential = match store.load() {
            Ok(Some(credential)) if credential.is_valid_at(now_ms()) => {
                debug!("Restored streaming credential from storage");
                Some(credential)
            }
            Ok(Some(_)) => {
                debug!("Stored streaming credential is expired, discarding");
                if let Err(e) = store.clear() {
                    warn!("Failed to clear expired credential: {e}");
                }
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to load stored credential: {e}");
                None
            }
        };

        Self {
            config,
            store,
            http: reqwest::Client::new(),
            accounts_base: DEFAULT_ACCOUNTS_BASE.to_string(),
            credential: Mutex::new(credential),
        }
    }

    /// Override the accounts service base URL.
    #[must_use]
    pub fn with_accounts_base(mut self, base: impl Into<String>) -> Self {
        self.accounts_base = base.into();
        self
    }

    /// Build the authorization URL for a fresh PKCE login.
    ///
    /// Generates and persists a new code verifier; the derived S256
    /// challenge is embedded in the returned URL together with the
    /// requested scopes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when no client id is configured.
    pub fn begin_login(&self) -> Result<String> {
        let client_id = self.config.require_client_id()?;

        let verifier = generate_code_verifier();
        let challenge = derive_code_challenge(&verifier);
        self.store.save_verifier(&verifier)?;

        let scope = PlayerConfig::scope_string();
        let url = Url::parse_with_params(
            &format!("{}/authorize", self.accounts_base),
            [
                ("client_id", client_id),
                ("response_type", "code"),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("scope", scope.as_str()),
                ("code_challenge_method", "S256"),
                ("code_challenge", challenge.as_str()),
            ],
        )
        .map_err(|e| Error::Configuration(format!("Invalid authorization URL: {e}")))?;

        info!("Starting streaming login");
        Ok(url.into())
    }

    /// Handle a potential authorization callback.
    ///
    /// When `current_url` carries no `code` parameter this returns
    /// [`CallbackOutcome::NoCallback`] without any network traffic. A
    /// callback with no matching stored verifier is rejected the same way.
    /// Otherwise the code is exchanged for an access token; the verifier is
    /// deleted whether or not the exchange succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AuthExchange`] when the token endpoint call fails.
    pub async fn complete_login(&self, current_url: &str) -> Result<CallbackOutcome> {
        let url = Url::parse(current_url)
            .map_err(|e| Error::Configuration(format!("Invalid callback URL: {e}")))?;

        let Some(code) = url
            .query_pairs()
            .find(|(key, _)| key == "code")
            .map(|(_, value)| value.into_owned())
        else {
            return Ok(CallbackOutcome::NoCallback);
        };

        let Some(verifier) = self.store.load_verifier()? else {
            warn!("Authorization callback without a stored verifier, ignoring");
            return Ok(CallbackOutcome::NoCallback);
        };

        let exchange = self.exchange_code(&code, &verifier).await;
        // The verifier is single use: gone after one exchange attempt,
        // successful or not.
        if let Err(e) = self.store.clear_verifier() {
            warn!("Failed to clear code verifier: {e}");
        }

        let credential = exchange?;
        self.store.save(&credential)?;
        if let Ok(mut slot) = self.credential.lock() {
            *slot = Some(credential);
        }
        info!("Streaming login completed");

        let mut cleaned = url;
        cleaned.set_query(None);
        cleaned.set_fragment(None);
        Ok(CallbackOutcome::Completed {
            cleaned_url: cleaned.into(),
        })
    }

    async fn exchange_code(&self, code: &str, verifier: &str) -> Result<StoredCredential> {
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("code_verifier", verifier),
        ];

        let response = self
            .http
            .post(format!("{}/api/token", self.accounts_base))
            .form(&params)
            .send()
            .await
            .map_err(|e| Error::AuthExchange(format!("Token request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::AuthExchange(format!(
                "Token endpoint returned {status}: {body}"
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::AuthExchange(format!("Malformed token response: {e}")))?;

        Ok(StoredCredential {
            access_token: token.access_token,
            expires_at_ms: now_ms() + token.expires_in * 1000,
        })
    }

    /// Whether a non-expired token is held.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.credential
            .lock()
            .map(|slot| {
                slot.as_ref()
                    .is_some_and(|credential| credential.is_valid_at(now_ms()))
            })
            .unwrap_or(false)
    }

    /// The access token, only while authenticated.
    ///
    /// Callers cannot distinguish an expired token from never having
    /// logged in; both yield `None`.
    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.credential.lock().ok().and_then(|slot| {
            slot.as_ref()
                .filter(|credential| credential.is_valid_at(now_ms()))
                .map(|credential| credential.access_token.clone())
        })
    }

    /// Clear all stored credential state unconditionally.
    pub fn logout(&self) {
        if let Ok(mut slot) = self.credential.lock() {
            *slot = None;
        }
        if let Err(e) = self.store.clear() {
            warn!("Failed to clear stored credential: {e}");
        }
        if let Err(e) = self.store.clear_verifier() {
            warn!("Failed to clear code verifier: {e}");
        }
        info!("Logged out of streaming session");
    }
}

/// Current wall clock as Unix millis.
fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Generate a fresh random PKCE code verifier.
fn generate_code_verifier() -> String {
    Alphanumeric.sample_string(&mut rand::rng(), VERIFIER_LENGTH)
}

/// Derive the S256 code challenge: URL-safe base64 of the verifier's
/// SHA-256 digest, without padding.
fn derive_code_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_config() -> PlayerConfig {
        PlayerConfig {
            client_id: "client-abc".to_string(),
            ..Default::default()
        }
    }

    fn file_store(dir: &TempDir) -> Arc<FileCredentialStore> {
        Arc::new(FileCredentialStore::with_dir(dir.path().to_path_buf()))
    }

    #[test]
    fn test_code_challenge_rfc7636_vector() {
        // RFC 7636 appendix B.
        let challenge = derive_code_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk");
        assert_eq!(challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
    }

    #[test]
    fn test_verifier_length_and_charset() {
        let verifier = generate_code_verifier();
        assert_eq!(verifier.len(), VERIFIER_LENGTH);
        assert!(verifier.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_begin_login_requires_client_id() {
        let dir = TempDir::new().expect("tempdir");
        let manager = AuthManager::new(PlayerConfig::default(), file_store(&dir));
        assert!(matches!(
            manager.begin_login(),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_begin_login_embeds_challenge_and_persists_verifier() {
        let dir = TempDir::new().expect("tempdir");
        let store = file_store(&dir);
        let manager = AuthManager::new(test_config(), store.clone());

        let url = manager.begin_login().expect("begin_login failed");
        assert!(url.starts_with(DEFAULT_ACCOUNTS_BASE));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(url.contains("client_id=client-abc"));
        assert!(url.contains("response_type=code"));

        let verifier = store
            .load_verifier()
            .expect("load_verifier failed")
            .expect("verifier missing");
        let challenge = derive_code_challenge(&verifier);
        assert!(url.contains(&challenge));
    }

    #[tokio::test]
    async fn test_complete_login_without_code_is_no_callback() {
        let dir = TempDir::new().expect("tempdir");
        let manager = AuthManager::new(test_config(), file_store(&dir))
            // Unroutable on purpose: the no-code path must never touch it.
            .with_accounts_base("http://127.0.0.1:9");

        let outcome = manager
            .complete_login("http://127.0.0.1:5173/historical-jams")
            .await
            .expect("complete_login failed");
        assert_eq!(outcome, CallbackOutcome::NoCallback);
    }

    #[tokio::test]
    async fn test_complete_login_without_verifier_is_rejected() {
        let dir = TempDir::new().expect("tempdir");
        let manager = AuthManager::new(test_config(), file_store(&dir))
            .with_accounts_base("http://127.0.0.1:9");

        let outcome = manager
            .complete_login("http://127.0.0.1:5173/historical-jams?code=one-time-code")
            .await
            .expect("complete_login failed");
        assert_eq!(outcome, CallbackOutcome::NoCallback);
    }

    #[tokio::test]
    async fn test_failed_exchange_discards_verifier() {
        let dir = TempDir::new().expect("tempdir");
        let store = file_store(&dir);
        let manager = AuthManager::new(test_config(), store.clone())
            // Nothing listens here; the exchange must fail.
            .with_accounts_base("http://127.0.0.1:9");

        store.save_verifier("verifier").expect("save_verifier");
        let result = manager
            .complete_login("http://127.0.0.1:5173/historical-jams?code=one-time-code")
            .await;
        assert!(matches!(result, Err(Error::AuthExchange(_))));
        assert_eq!(store.load_verifier().expect("load_verifier"), None);
    }

    #[test]
    fn test_expired_credential_is_not_authenticated() {
        let dir = TempDir::new().expect("tempdir");
        let store = file_store(&dir);
        store
            .save(&StoredCredential {
                access_token: "tok".to_string(),
                expires_at_ms: now_ms().saturating_sub(1),
            })
            .expect("save failed");

        let manager = AuthManager::new(test_config(), store);
        assert!(!manager.is_authenticated());
        assert_eq!(manager.access_token(), None);
    }

    #[test]
    fn test_valid_credential_is_restored() {
        let dir = TempDir::new().expect("tempdir");
        let store = file_store(&dir);
        store
            .save(&StoredCredential {
                access_token: "tok".to_string(),
                expires_at_ms: now_ms() + 3_600_000,
            })
            .expect("save failed");

        let manager = AuthManager::new(test_config(), store);
        assert!(manager.is_authenticated());
        assert_eq!(manager.access_token().as_deref(), Some("tok"));
    }

    #[test]
    fn test_logout_clears_everything() {
        let dir = TempDir::new().expect("tempdir");
        let store = file_store(&dir);
        store
            .save(&StoredCredential {
                access_token: "tok".to_string(),
                expires_at_ms: now_ms() + 3_600_000,
            })
            .expect("save failed");
        store.save_verifier("verifier").expect("save_verifier");

        let manager = AuthManager::new(test_config(), store.clone());
        manager.logout();

        assert!(!manager.is_authenticated());
        assert_eq!(store.load().expect("load"), None);
        assert_eq!(store.load_verifier().expect("load_verifier"), None);
    }

    #[test]
    fn test_file_store_roundtrip() {
        let dir = TempDir::new().expect("tempdir");
        let store = FileCredentialStore::with_dir(dir.path().to_path_buf());

        assert_eq!(store.load().expect("load"), None);

        let credential = StoredCredential {
            access_token: "tok".to_string(),
            expires_at_ms: 42,
        };
        store.save(&credential).expect("save");
        assert_eq!(store.load().expect("load"), Some(credential));

        store.clear().expect("clear");
        assert_eq!(store.load().expect("load"), None);
        // Clearing twice is fine.
        store.clear().expect("clear");
    }
}
