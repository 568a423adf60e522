//! Centralized configuration.
//!
//! Credentials come from a `secrets.json` file with environment variables
//! taking precedence. Run settings are assembled by the CLI and validated
//! here before any reconciliation starts.

use serde::Deserialize;
use std::fmt;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::error::ConfigError;
use crate::scoring::{SimilarityMetric, Threshold};
use crate::search::DEFAULT_CANDIDATE_LIMIT;

/// Secrets file looked up in the working directory when none is given
pub const DEFAULT_SECRETS_FILE: &str = "secrets.json";

/// Max number of tracks processed per run (destination playlist size limit)
pub const MAX_NUMBER_OF_TRACKS: usize = 9999;

pub const SPOTIFY_API_BASE: &str = "https://api.spotify.com/v1/";
pub const SPOTIFY_ACCOUNTS_BASE: &str = "https://accounts.spotify.com/";

// ============================================================================
// Credentials
// ============================================================================

/// On-disk format of `secrets.json`.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SecretsFile {
    spotify_client_id: Option<String>,
    spotify_client_secret: Option<String>,
    user_account_name: Option<String>,
    spotify_user_token: Option<String>,
}

#[derive(Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub account_name: Option<String>,
    /// Pre-obtained user access token, needed only for playlist publishing
    pub user_token: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("account_name", &self.account_name)
            .field("user_token", &self.user_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Credentials {
    /// Load credentials from `path` (or `secrets.json` when None) and the
    /// process environment. An explicitly given file must exist; the default
    /// file is optional when the environment carries everything.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_SECRETS_FILE), false),
        };

        let file = if path.exists() {
            Some(read_secrets(&path)?)
        } else if explicit {
            return Err(ConfigError::SecretsNotFound(path));
        } else {
            None
        };

        Self::from_sources(file, |key| std::env::var(key).ok())
    }

    fn from_sources(
        file: Option<SecretsFile>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let file = file.unwrap_or_default();
        let pick = |key: &str, fallback: Option<String>| {
            env(key).filter(|v| !v.trim().is_empty()).or(fallback)
        };

        Ok(Self {
            client_id: pick("SPOTIFY_CLIENT_ID", file.spotify_client_id)
                .ok_or(ConfigError::MissingCredential("spotify_client_id"))?,
            client_secret: pick("SPOTIFY_CLIENT_SECRET", file.spotify_client_secret)
                .ok_or(ConfigError::MissingCredential("spotify_client_secret"))?,
            account_name: pick("SPOTIFY_USER", file.user_account_name),
            user_token: pick("SPOTIFY_USER_TOKEN", file.spotify_user_token),
        })
    }

    /// Ask for the app credentials on the terminal. Fallback for runs where
    /// neither the secrets file nor the environment carries them.
    pub fn prompt<R: BufRead, W: Write>(input: &mut R, out: &mut W) -> Result<Self, ConfigError> {
        let answer = ask(
            input,
            out,
            "Do you want to continue and manually enter your Spotify data? (y/n): ",
        )?;
        if !answer.eq_ignore_ascii_case("y") {
            return Err(ConfigError::MissingCredential("spotify_client_id"));
        }

        let client_id = ask(input, out, "Enter your Spotify client ID: ")?;
        if client_id.is_empty() {
            return Err(ConfigError::MissingCredential("spotify_client_id"));
        }
        let client_secret = ask(input, out, "Enter your Spotify client secret: ")?;
        if client_secret.is_empty() {
            return Err(ConfigError::MissingCredential("spotify_client_secret"));
        }
        let account_name = ask(input, out, "Enter your Spotify account name: ")?;

        Ok(Self {
            client_id,
            client_secret,
            account_name: Some(account_name).filter(|a| !a.is_empty()),
            user_token: std::env::var("SPOTIFY_USER_TOKEN")
                .ok()
                .filter(|t| !t.trim().is_empty()),
        })
    }
}

/// One trimmed answer line. End of input reads as an empty answer.
fn ask<R: BufRead, W: Write>(input: &mut R, out: &mut W, question: &str) -> Result<String, ConfigError> {
    write!(out, "{}", question).map_err(ConfigError::Prompt)?;
    out.flush().map_err(ConfigError::Prompt)?;
    let mut line = String::new();
    input.read_line(&mut line).map_err(ConfigError::Prompt)?;
    Ok(line.trim().to_string())
}

fn read_secrets(path: &Path) -> Result<SecretsFile, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::InvalidSecrets {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    serde_json::from_str(&text).map_err(|e| ConfigError::InvalidSecrets {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

// ============================================================================
// Run Settings
// ============================================================================

/// Read-only settings shared by every reconciliation in a run.
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    pub threshold: Threshold,
    pub candidate_limit: usize,
    pub max_tracks: usize,
    /// Worker threads for the search phase (0 = rayon default)
    pub workers: usize,
    pub metric: SimilarityMetric,
    /// Compare ASCII-folded forms of both sides
    pub fold_ascii: bool,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            threshold: Threshold::NORMAL,
            candidate_limit: DEFAULT_CANDIDATE_LIMIT,
            max_tracks: MAX_NUMBER_OF_TRACKS,
            workers: 0,
            metric: SimilarityMetric::SequenceMatcher,
            fold_ascii: false,
        }
    }
}

impl ReconcileConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        Threshold::new(self.threshold.value())?;
        if self.candidate_limit == 0 {
            return Err(ConfigError::ZeroCandidateLimit);
        }
        Ok(())
    }
}

/// HTTP settings for the Spotify clients.
#[derive(Debug, Clone)]
pub struct SpotifyConfig {
    pub api_base: Url,
    pub accounts_base: Url,
    /// Per-request timeout
    pub timeout: Duration,
    /// Extra attempts for transient search failures
    pub retries: usize,
    pub retry_backoff: Duration,
}

impl SpotifyConfig {
    /// Settings against the public Spotify endpoints.
    pub fn spotify() -> Result<Self, ConfigError> {
        Self::new(SPOTIFY_API_BASE, SPOTIFY_ACCOUNTS_BASE)
    }

    pub fn new(api_base: &str, accounts_base: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            api_base: Url::parse(api_base)?,
            accounts_base: Url::parse(accounts_base)?,
            timeout: Duration::from_secs(10),
            retries: 2,
            retry_backoff: Duration::from_millis(500),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_file_credentials() {
        let file: SecretsFile = serde_json::from_str(
            r#"{"spotify_client_id": "id", "spotify_client_secret": "secret", "user_account_name": "me"}"#,
        )
        .unwrap();
        let creds = Credentials::from_sources(Some(file), env_from(&[])).unwrap();
        assert_eq!(creds.client_id, "id");
        assert_eq!(creds.client_secret, "secret");
        assert_eq!(creds.account_name.as_deref(), Some("me"));
        assert!(creds.user_token.is_none());
    }

    #[test]
    fn test_env_overrides_file() {
        let file = SecretsFile {
            spotify_client_id: Some("file-id".into()),
            spotify_client_secret: Some("file-secret".into()),
            ..Default::default()
        };
        let creds = Credentials::from_sources(
            Some(file),
            env_from(&[("SPOTIFY_CLIENT_ID", "env-id"), ("SPOTIFY_CLIENT_SECRET", " ")]),
        )
        .unwrap();
        assert_eq!(creds.client_id, "env-id");
        // Blank env values fall back to the file
        assert_eq!(creds.client_secret, "file-secret");
    }

    #[test]
    fn test_missing_secret_is_config_error() {
        let err = Credentials::from_sources(None, env_from(&[("SPOTIFY_CLIENT_ID", "id")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredential("spotify_client_secret")));
    }

    #[test]
    fn test_explicit_missing_file() {
        let err = Credentials::load(Some(Path::new("/definitely/not/here.json"))).unwrap_err();
        assert!(matches!(err, ConfigError::SecretsNotFound(_)));
    }

    #[test]
    fn test_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.json");
        std::fs::write(&path, r#"{"spotify_client": 1}"#).unwrap();
        let err = Credentials::load(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSecrets { .. }));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let creds = Credentials {
            client_id: "id".into(),
            client_secret: "hunter2".into(),
            account_name: None,
            user_token: Some("tok".into()),
        };
        let shown = format!("{:?}", creds);
        assert!(!shown.contains("hunter2"));
        assert!(!shown.contains("\"tok\""));
    }

    #[test]
    fn test_prompt_reads_credentials() {
        let mut input = std::io::Cursor::new("y\nmy-id\n my-secret \nme\n");
        let mut out: Vec<u8> = Vec::new();
        let creds = Credentials::prompt(&mut input, &mut out).unwrap();
        assert_eq!(creds.client_id, "my-id");
        assert_eq!(creds.client_secret, "my-secret");
        assert_eq!(creds.account_name.as_deref(), Some("me"));
        let shown = String::from_utf8(out).unwrap();
        assert!(shown.contains("Enter your Spotify client secret: "));
    }

    #[test]
    fn test_prompt_declined_or_incomplete() {
        let mut out: Vec<u8> = Vec::new();
        let err = Credentials::prompt(&mut std::io::Cursor::new("n\n"), &mut out).unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredential("spotify_client_id")));

        // Input ends before the secret
        let err = Credentials::prompt(&mut std::io::Cursor::new("y\nid\n"), &mut out).unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredential("spotify_client_secret")));
    }

    #[test]
    fn test_prompt_blank_account_is_none() {
        let mut input = std::io::Cursor::new("Y\nid\nsecret\n\n");
        let creds = Credentials::prompt(&mut input, &mut Vec::<u8>::new()).unwrap();
        assert!(creds.account_name.is_none());
    }

    #[test]
    fn test_reconcile_config_validation() {
        assert!(ReconcileConfig::default().validate().is_ok());
        let config = ReconcileConfig {
            candidate_limit: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroCandidateLimit)));
    }

    #[test]
    fn test_spotify_defaults() {
        let config = SpotifyConfig::spotify().unwrap();
        assert_eq!(config.api_base.as_str(), SPOTIFY_API_BASE);
        assert_eq!(config.retries, 2);
    }
}
