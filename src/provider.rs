//! Third-party identity providers for the login flow.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use url::Url;

use crate::config::{Config, OAuthClientConfig};
use crate::error::{AppError, Result};
use crate::models::{Profile, ProfileValue};

/// Authorization-code login against an external identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Where to send the browser to start a login carrying `state`.
    fn authorize_url(&self, state: &str) -> Result<Url>;

    /// Trades an authorization code for the user's profile.
    /// A code the provider rejects yields `AuthenticationFailed`.
    async fn exchange(&self, code: &str) -> Result<Profile>;
}

/// Configured providers keyed by their route name (`/auth/{name}`).
#[derive(Clone, Default)]
pub struct Providers {
    inner: HashMap<String, Arc<dyn IdentityProvider>>,
}

impl Providers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, provider: impl IdentityProvider + 'static) -> Self {
        self.inner.insert(name.into(), Arc::new(provider));
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.inner.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn IdentityProvider>> {
        self.inner
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::UnknownProvider(name.to_string()))
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let mut providers = Self::new();
        match &config.google {
            Some(google) => {
                providers = providers.with("google", GoogleProvider::new(google.clone())?);
                tracing::info!("Google login enabled");
            }
            None => tracing::warn!(
                "Google OAuth not configured: GOOGLE_CLIENT_ID or GOOGLE_CLIENT_SECRET missing, login disabled"
            ),
        }
        Ok(providers)
    }
}

// === Google ===

const GOOGLE_AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";
const GOOGLE_SCOPES: &str = "profile email";

pub struct GoogleProvider {
    client: reqwest::Client,
    config: OAuthClientConfig,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    sub: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    email_verified: Option<bool>,
    #[serde(default)]
    picture: Option<String>,
}

impl From<GoogleUserInfo> for Profile {
    fn from(info: GoogleUserInfo) -> Self {
        Profile {
            display_name: info.name.unwrap_or_default(),
            emails: info
                .email
                .map(|value| ProfileValue {
                    value,
                    verified: info.email_verified,
                })
                .into_iter()
                .collect(),
            photos: info
                .picture
                .map(|value| ProfileValue {
                    value,
                    verified: None,
                })
                .into_iter()
                .collect(),
            id: info.sub,
        }
    }
}

impl GoogleProvider {
    pub fn new(config: OAuthClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl IdentityProvider for GoogleProvider {
    fn authorize_url(&self, state: &str) -> Result<Url> {
        Ok(Url::parse_with_params(
            GOOGLE_AUTHORIZE_URL,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.callback_url.as_str()),
                ("response_type", "code"),
                ("scope", GOOGLE_SCOPES),
                ("state", state),
            ],
        )?)
    }

    async fn exchange(&self, code: &str) -> Result<Profile> {
        let response = self
            .client
            .post(GOOGLE_TOKEN_URL)
            .form(&[
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.config.callback_url.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?;

        // invalid_grant and friends: the code itself was refused.
        if matches!(
            response.status(),
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED
        ) {
            tracing::warn!(status = %response.status(), "Google rejected authorization code");
            return Err(AppError::AuthenticationFailed);
        }
        let token: TokenResponse = response.error_for_status()?.json().await?;

        let info: GoogleUserInfo = self
            .client
            .get(GOOGLE_USERINFO_URL)
            .bearer_auth(&token.access_token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(info.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn google() -> GoogleProvider {
        GoogleProvider::new(OAuthClientConfig {
            client_id: "client-123".into(),
            client_secret: "secret".into(),
            callback_url: "http://localhost:4000/auth/google/callback".into(),
        })
        .unwrap()
    }

    #[test]
    fn authorize_url_carries_client_and_state() {
        let url = google().authorize_url("xyz").unwrap();
        let params: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(url.host_str(), Some("accounts.google.com"));
        assert_eq!(params["client_id"], "client-123");
        assert_eq!(params["state"], "xyz");
        assert_eq!(params["scope"], "profile email");
        assert_eq!(params["response_type"], "code");
        assert_eq!(
            params["redirect_uri"],
            "http://localhost:4000/auth/google/callback"
        );
    }

    #[test]
    fn userinfo_maps_to_profile() {
        let info: GoogleUserInfo = serde_json::from_value(serde_json::json!({
            "sub": "1093",
            "name": "Alice Anderson",
            "email": "alice@example.com",
            "email_verified": true,
            "picture": "https://example.com/alice.png"
        }))
        .unwrap();
        let profile = Profile::from(info);
        assert_eq!(profile.id, "1093");
        assert_eq!(profile.display_name, "Alice Anderson");
        assert_eq!(profile.emails[0].value, "alice@example.com");
        assert_eq!(profile.emails[0].verified, Some(true));
        assert_eq!(profile.photos.len(), 1);
    }

    #[test]
    fn unknown_provider_is_reported() {
        let err = Providers::new().get("github").err().unwrap();
        assert!(matches!(err, AppError::UnknownProvider(name) if name == "github"));
    }
}
