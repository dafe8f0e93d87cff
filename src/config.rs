use std::env;
use std::time::Duration;

use crate::session::SessionSettings;

const DEFAULT_PORT: u16 = 4000;
const DEFAULT_STORE_URI: &str = "resources.db";
const DEFAULT_GOOGLE_CALLBACK: &str = "http://localhost:4000/auth/google/callback";

#[derive(Debug, Clone)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
    pub callback_url: String,
}

/// Process settings, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// `mongodb://...` for MongoDB, otherwise an embedded database path.
    pub store_uri: String,
    pub production: bool,
    pub session: SessionSettings,
    /// Present only when both the client id and secret are set.
    pub google: Option<OAuthClientConfig>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let production = get("APP_ENV")
            .or_else(|| get("NODE_ENV"))
            .is_some_and(|env| env == "production" || env == "prod");

        let mut session = SessionSettings {
            secure: production,
            ..SessionSettings::default()
        };
        if let Some(name) = get("SESSION_COOKIE_NAME") {
            session.cookie_name = name;
        }
        if let Some(ttl) = get("SESSION_TTL_SECS").and_then(|v| v.parse().ok()) {
            session.ttl = Duration::from_secs(ttl);
        }
        if let Some(ttl) = get("SESSION_LOGIN_TTL_SECS").and_then(|v| v.parse().ok()) {
            session.login_ttl = Duration::from_secs(ttl);
        }

        let google = match (get("GOOGLE_CLIENT_ID"), get("GOOGLE_CLIENT_SECRET")) {
            (Some(client_id), Some(client_secret)) => Some(OAuthClientConfig {
                client_id,
                client_secret,
                callback_url: get("GOOGLE_CALLBACK_URL")
                    .unwrap_or_else(|| DEFAULT_GOOGLE_CALLBACK.into()),
            }),
            _ => None,
        };

        Self {
            port: get("PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            store_uri: get("STORE_URI")
                .or_else(|| get("MONGO_URI"))
                .unwrap_or_else(|| DEFAULT_STORE_URI.into()),
            production,
            session,
            google,
        }
    }
}
