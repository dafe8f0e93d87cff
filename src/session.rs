//! Cookie sessions persisted in the `sessions` collection.
//!
//! The cookie carries `<document id>.<secret>`: the id addresses the stored
//! session directly and the random secret must match it. Everything else
//! lives in the store, so sessions survive restarts and can be revoked
//! server-side. Expired sessions are swept whenever a new one is created.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{header::COOKIE, HeaderMap};
use mongodb::bson::oid::ObjectId;
use rand::RngCore;
use serde_json::Value;

use crate::db::Database;
use crate::error::Result;
use crate::models::{to_field_map, Document, SessionRecord};

pub const SESSIONS: &str = "sessions";
pub const USERS: &str = "users";

const DEFAULT_TTL: Duration = Duration::from_secs(14 * 24 * 60 * 60);
const DEFAULT_LOGIN_TTL: Duration = Duration::from_secs(10 * 60);
const EXPIRES_AT: &str = "expiresAt";

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub cookie_name: String,
    /// Adds the `Secure` attribute to the cookie.
    pub secure: bool,
    /// Lifetime of a logged-in session.
    pub ttl: Duration,
    /// Lifetime of a session that has started a login but not finished it.
    pub login_ttl: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            cookie_name: "sid".into(),
            secure: false,
            ttl: DEFAULT_TTL,
            login_ttl: DEFAULT_LOGIN_TTL,
        }
    }
}

/// A loaded session and the id of the document backing it.
#[derive(Debug, Clone)]
pub struct Session {
    id: ObjectId,
    pub record: SessionRecord,
}

impl Session {
    /// Cookie value identifying this session.
    pub fn token(&self) -> String {
        format!("{}.{}", self.id.to_hex(), self.record.secret)
    }
}

#[derive(Clone)]
pub struct SessionStore {
    db: Arc<Database>,
    settings: Arc<SessionSettings>,
}

impl SessionStore {
    pub fn new(db: Arc<Database>, settings: SessionSettings) -> Self {
        Self {
            db,
            settings: Arc::new(settings),
        }
    }

    /// Session token from the request's cookies, if any.
    pub fn session_id<'a>(&self, headers: &'a HeaderMap) -> Option<&'a str> {
        cookie_value(headers, &self.settings.cookie_name)
    }

    /// Session for the request. Requests without a cookie never touch the store.
    pub async fn current(&self, headers: &HeaderMap) -> Result<Option<Session>> {
        match self.session_id(headers) {
            Some(sid) => self.load(sid).await,
            None => Ok(None),
        }
    }

    pub async fn load(&self, token: &str) -> Result<Option<Session>> {
        let Some((id, secret)) = token.split_once('.') else {
            return Ok(None);
        };
        let Ok(id) = ObjectId::parse_str(id) else {
            return Ok(None);
        };

        let sessions = self.db.collection(SESSIONS)?;
        let Some(doc) = sessions.find_one(&id).await? else {
            return Ok(None);
        };
        let record: SessionRecord = serde_json::from_value(Value::Object(doc.fields))?;
        if record.secret != secret {
            return Ok(None);
        }
        if record.expires_at <= now() {
            sessions.delete_one(&id).await?;
            return Ok(None);
        }

        Ok(Some(Session { id, record }))
    }

    pub async fn create(
        &self,
        user_id: Option<String>,
        oauth_state: Option<String>,
    ) -> Result<Session> {
        let sessions = self.db.collection(SESSIONS)?;
        let purged = sessions.delete_at_most(EXPIRES_AT, now()).await?;
        if purged > 0 {
            tracing::debug!(purged, "removed expired sessions");
        }

        let record = SessionRecord {
            secret: random_token(),
            expires_at: self.expiry(user_id.is_some()),
            user_id,
            oauth_state,
        };
        let id = sessions.insert_one(to_field_map(&record)?).await?;
        Ok(Session { id, record })
    }

    /// Writes the session back and pushes its expiry out by one TTL.
    pub async fn save(&self, session: &mut Session) -> Result<()> {
        session.record.expires_at = self.expiry(session.record.user_id.is_some());
        self.db
            .collection(SESSIONS)?
            .update_one(&session.id, to_field_map(&session.record)?)
            .await?;
        Ok(())
    }

    pub async fn destroy(&self, session: &Session) -> Result<()> {
        self.db.collection(SESSIONS)?.delete_one(&session.id).await?;
        Ok(())
    }

    /// User document the request's session is logged in as.
    pub async fn current_user(&self, headers: &HeaderMap) -> Result<Option<Document>> {
        let Some(session) = self.current(headers).await? else {
            return Ok(None);
        };
        let Some(user_id) = session.record.user_id.as_deref() else {
            return Ok(None);
        };
        let Ok(id) = ObjectId::parse_str(user_id) else {
            tracing::warn!(user_id, "session holds a malformed user id");
            return Ok(None);
        };
        let user = self.db.collection(USERS)?.find_one(&id).await?;
        Ok(user)
    }

    /// `Set-Cookie` value binding the client to `session`.
    pub fn cookie(&self, session: &Session) -> String {
        format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax{}",
            self.settings.cookie_name,
            session.token(),
            self.secure_attr()
        )
    }

    /// `Set-Cookie` value that makes the client drop its session cookie.
    pub fn clear_cookie(&self) -> String {
        format!(
            "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0{}",
            self.settings.cookie_name,
            self.secure_attr()
        )
    }

    fn secure_attr(&self) -> &'static str {
        if self.settings.secure {
            "; Secure"
        } else {
            ""
        }
    }

    fn expiry(&self, logged_in: bool) -> i64 {
        let ttl = if logged_in {
            self.settings.ttl
        } else {
            self.settings.login_ttl
        };
        let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        now().saturating_add(ttl)
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// 256 random bits, hex encoded.
pub fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key == name).then_some(value)
        })
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(cookie: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static(cookie));
        headers
    }

    #[test]
    fn finds_named_cookie_among_others() {
        let headers = headers("theme=dark; sid=abc123; lang=en");
        assert_eq!(cookie_value(&headers, "sid"), Some("abc123"));
        assert_eq!(cookie_value(&headers, "lang"), Some("en"));
    }

    #[test]
    fn ignores_missing_and_empty_cookies() {
        assert_eq!(cookie_value(&headers("theme=dark"), "sid"), None);
        assert_eq!(cookie_value(&headers("sid="), "sid"), None);
        assert_eq!(cookie_value(&HeaderMap::new(), "sid"), None);
    }

    #[test]
    fn tokens_are_unique_hex() {
        let a = random_token();
        let b = random_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn token_joins_id_and_secret() {
        let session = Session {
            id: ObjectId::parse_str("65f1a2b3c4d5e6f708192a3b").unwrap(),
            record: SessionRecord {
                secret: "abc123".into(),
                ..SessionRecord::default()
            },
        };
        assert_eq!(session.token(), "65f1a2b3c4d5e6f708192a3b.abc123");
    }

    #[tokio::test]
    async fn malformed_tokens_never_reach_the_store() {
        let store = SessionStore::new(Arc::new(Database::disconnected()), SessionSettings::default());
        assert!(store.load("deadbeef").await.unwrap().is_none());
        assert!(store.load("not-an-id.abc123").await.unwrap().is_none());
    }

    #[test]
    fn cookie_attributes_follow_settings() {
        let settings = SessionSettings {
            cookie_name: "session".into(),
            secure: true,
            ..SessionSettings::default()
        };
        let store = SessionStore::new(Arc::new(Database::disconnected()), settings);
        let cleared = store.clear_cookie();
        assert!(cleared.starts_with("session=;"));
        assert!(cleared.contains("Max-Age=0"));
        assert!(cleared.ends_with("; Secure"));
    }
}
