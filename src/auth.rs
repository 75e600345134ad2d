//! Credential resolution for the messages API.
//!
//! Two modes are supported: a plain API key sent via `x-api-key`, and an
//! OAuth bearer token sent via `Authorization`. The bearer token comes from
//! the `CLAUDE_CODE_OAUTH_TOKEN` environment variable, or from the
//! credentials file written by the CLI login flow. File-based tokens are
//! refreshed when they are within a fixed buffer of expiry, and the
//! refreshed pair is persisted back to the same file.

use crate::config::Config;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub const OAUTH_TOKEN_ENV: &str = "CLAUDE_CODE_OAUTH_TOKEN";
pub const OAUTH_BETA_HEADER: &str = "oauth-2025-04-20";
const OAUTH_CREDENTIALS_FILE: &str = ".claude/.credentials.json";
const OAUTH_TOKEN_REFRESH_URL: &str = "https://platform.claude.com/v1/oauth/token";
const OAUTH_CLIENT_ID: &str = "9d1c250a-e61b-44d9-88ed-5944d1962f5e";
// Refresh 5 minutes before expiry.
const OAUTH_REFRESH_BUFFER_MS: i64 = 5 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    ApiKey,
    Oauth,
}

impl AuthMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "api_key" | "apikey" | "key" => Some(Self::ApiKey),
            "oauth" | "bearer" => Some(Self::Oauth),
            _ => None,
        }
    }
}

/// A resolved request credential: header name plus value. The two header
/// forms are mutually exclusive by construction.
#[derive(Debug, Clone)]
pub struct AuthHeader {
    pub name: &'static str,
    pub value: String,
    pub mode: AuthMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OauthCredentials {
    pub access_token: String,
    pub refresh_token: String,
    /// Epoch milliseconds.
    pub expires_at: i64,
}

impl OauthCredentials {
    pub fn needs_refresh(&self, now_ms: i64) -> bool {
        now_ms + OAUTH_REFRESH_BUFFER_MS >= self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct TokenRefreshResponse {
    access_token: String,
    refresh_token: String,
    /// Seconds until the new token expires.
    expires_in: i64,
}

/// Produce the auth header for a request, or `AuthMissing` when no usable
/// credential exists. OAuth resolution may perform a refresh round-trip.
pub async fn resolve(config: &Config, http: &reqwest::Client) -> Result<AuthHeader> {
    match config.auth_mode {
        AuthMode::ApiKey => match &config.api_key {
            Some(key) if !key.trim().is_empty() => Ok(AuthHeader {
                name: "x-api-key",
                value: key.clone(),
                mode: AuthMode::ApiKey,
            }),
            _ => Err(Error::AuthMissing(
                "ANTHROPIC_API_KEY is not set".to_string(),
            )),
        },
        AuthMode::Oauth => resolve_oauth(http).await,
    }
}

async fn resolve_oauth(http: &reqwest::Client) -> Result<AuthHeader> {
    if let Ok(token) = std::env::var(OAUTH_TOKEN_ENV) {
        let token = token.trim();
        if !token.is_empty() {
            return Ok(bearer(token.to_string()));
        }
    }

    let path = credentials_path()?;
    let mut credentials = load_credentials(&path)?;
    if credentials.needs_refresh(now_ms()) {
        credentials = refresh_credentials(http, &credentials).await?;
        store_credentials(&path, &credentials)?;
    }
    Ok(bearer(credentials.access_token))
}

fn bearer(token: String) -> AuthHeader {
    AuthHeader {
        name: "authorization",
        value: format!("Bearer {token}"),
        mode: AuthMode::Oauth,
    }
}

pub fn credentials_path() -> Result<PathBuf> {
    let home = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .ok_or_else(|| {
            Error::AuthMissing("cannot locate home directory for OAuth credentials".to_string())
        })?;
    Ok(PathBuf::from(home).join(OAUTH_CREDENTIALS_FILE))
}

pub fn load_credentials(path: &Path) -> Result<OauthCredentials> {
    let raw = fs::read_to_string(path).map_err(|error| {
        Error::AuthMissing(format!(
            "cannot read OAuth credentials at {}: {error}",
            path.display()
        ))
    })?;
    serde_json::from_str(&raw).map_err(|error| {
        Error::AuthMissing(format!(
            "cannot parse OAuth credentials at {}: {error}",
            path.display()
        ))
    })
}

pub fn store_credentials(path: &Path, credentials: &OauthCredentials) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let raw = serde_json::to_string_pretty(credentials)?;
    fs::write(path, raw)?;
    Ok(())
}

async fn refresh_credentials(
    http: &reqwest::Client,
    credentials: &OauthCredentials,
) -> Result<OauthCredentials> {
    let payload = json!({
        "grant_type": "refresh_token",
        "refresh_token": credentials.refresh_token,
        "client_id": OAUTH_CLIENT_ID,
    });
    let response = http
        .post(OAUTH_TOKEN_REFRESH_URL)
        .header("content-type", "application/json")
        .json(&payload)
        .send()
        .await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::AuthMissing(format!(
            "OAuth token refresh failed with HTTP {}: {body}",
            status.as_u16()
        )));
    }
    let refreshed: TokenRefreshResponse = response.json().await?;
    Ok(OauthCredentials {
        access_token: refreshed.access_token,
        refresh_token: refreshed.refresh_token,
        expires_at: now_ms() + refreshed.expires_in * 1000,
    })
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> OauthCredentials {
        OauthCredentials {
            access_token: "at-123".to_string(),
            refresh_token: "rt-456".to_string(),
            expires_at: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_credentials_round_trip_uses_camel_case_fields() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join(".claude/.credentials.json");

        store_credentials(&path, &sample()).expect("store should succeed");
        let raw = std::fs::read_to_string(&path).expect("file exists");
        assert!(raw.contains("accessToken"));
        assert!(raw.contains("refreshToken"));
        assert!(raw.contains("expiresAt"));

        let loaded = load_credentials(&path).expect("load should succeed");
        assert_eq!(loaded.access_token, "at-123");
        assert_eq!(loaded.expires_at, 1_700_000_000_000);
    }

    #[test]
    fn test_needs_refresh_inside_buffer_window() {
        let credentials = sample();
        // Exactly five minutes before expiry is already inside the window.
        assert!(credentials.needs_refresh(credentials.expires_at - OAUTH_REFRESH_BUFFER_MS));
        assert!(credentials.needs_refresh(credentials.expires_at + 1));
        assert!(!credentials.needs_refresh(credentials.expires_at - OAUTH_REFRESH_BUFFER_MS - 1));
    }

    #[test]
    fn test_load_missing_file_is_auth_missing() {
        let temp = TempDir::new().expect("temp dir");
        let result = load_credentials(&temp.path().join("nope.json"));
        assert!(matches!(result, Err(Error::AuthMissing(_))));
    }

    #[test]
    fn test_auth_mode_parse() {
        assert_eq!(AuthMode::parse("api_key"), Some(AuthMode::ApiKey));
        assert_eq!(AuthMode::parse(" OAuth "), Some(AuthMode::Oauth));
        assert_eq!(AuthMode::parse("ldap"), None);
    }

    #[tokio::test]
    async fn test_resolve_api_key_mode_requires_key() {
        let http = reqwest::Client::new();
        let config = Config::default();
        let result = resolve(&config, &http).await;
        assert!(matches!(result, Err(Error::AuthMissing(_))));

        let config = Config {
            api_key: Some("sk-test".to_string()),
            ..Config::default()
        };
        let header = resolve(&config, &http).await.expect("header");
        assert_eq!(header.name, "x-api-key");
        assert_eq!(header.value, "sk-test");
    }
}
