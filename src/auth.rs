//! Login, logout and the session gate for protected routes.

use axum::{
    extract::{Path, Query, Request, State},
    http::{
        header::{ACCEPT, SET_COOKIE},
        HeaderMap,
    },
    middleware::Next,
    response::{AppendHeaders, IntoResponse, Redirect, Response},
    Json,
};
use serde_json::Value;

use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{
    to_field_map, CallbackParams, Document, LoginResponse, MessageResponse, Profile, UserRecord,
};
use crate::provider::Providers;
use crate::session::{self, USERS};
use crate::AppState;

const FAILURE_PATH: &str = "/auth/failure";

/// The logged-in user, available to handlers behind [`require_session`].
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Document);

/// Short-circuits with 401 unless the request carries a logged-in session.
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let user = state
        .sessions
        .current_user(request.headers())
        .await?
        .ok_or(AppError::Unauthenticated)?;

    request.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(request).await)
}

/// Browsers get redirects; API clients get JSON.
fn prefers_html(headers: &HeaderMap) -> bool {
    match headers.get(ACCEPT).and_then(|v| v.to_str().ok()) {
        Some(accept) => accept.contains("text/html") || accept.contains("*/*"),
        None => true,
    }
}

fn failure_redirect() -> Response {
    Redirect::to(FAILURE_PATH).into_response()
}

// === Endpoints ===

pub async fn login(
    State(state): State<AppState>,
    Path(provider_name): Path<String>,
    headers: HeaderMap,
) -> Result<Response> {
    let provider = state.providers.get(&provider_name)?;
    let oauth_state = session::random_token();

    let session = match state.sessions.current(&headers).await? {
        Some(mut session) => {
            session.record.oauth_state = Some(oauth_state.clone());
            state.sessions.save(&mut session).await?;
            session
        }
        None => state.sessions.create(None, Some(oauth_state.clone())).await?,
    };

    let url = provider.authorize_url(&oauth_state)?;
    Ok((
        AppendHeaders([(SET_COOKIE, state.sessions.cookie(&session))]),
        Redirect::to(url.as_str()),
    )
        .into_response())
}

pub async fn callback(
    State(state): State<AppState>,
    Path(provider_name): Path<String>,
    Query(params): Query<CallbackParams>,
    headers: HeaderMap,
) -> Result<Response> {
    let provider = state.providers.get(&provider_name)?;

    if let Some(error) = params.error.as_deref() {
        tracing::warn!(provider = %provider_name, error, "provider returned an error");
        return Ok(failure_redirect());
    }
    let Some(session) = state.sessions.current(&headers).await? else {
        tracing::warn!(provider = %provider_name, "callback without a session");
        return Ok(failure_redirect());
    };
    let expected = session.record.oauth_state.as_deref();
    let Some(code) = params.code.as_deref() else {
        return Ok(failure_redirect());
    };
    if expected.is_none() || params.state.as_deref() != expected {
        tracing::warn!(provider = %provider_name, "login state mismatch");
        return Ok(failure_redirect());
    }

    let profile = match provider.exchange(code).await {
        Ok(profile) => profile,
        Err(AppError::AuthenticationFailed) => return Ok(failure_redirect()),
        Err(err) => return Err(err),
    };
    let user = find_or_create_user(&state.db, &provider_name, profile).await?;

    // New session id on login.
    state.sessions.destroy(&session).await?;
    let fresh = state.sessions.create(Some(user.id.to_hex()), None).await?;
    tracing::info!(provider = %provider_name, user = %user.id, "login succeeded");

    let cookie = AppendHeaders([(SET_COOKIE, state.sessions.cookie(&fresh))]);
    if prefers_html(&headers) {
        Ok((cookie, Redirect::to("/")).into_response())
    } else {
        let body = LoginResponse {
            message: "Authentication successful",
            user,
        };
        Ok((cookie, Json(body)).into_response())
    }
}

pub async fn failure() -> AppError {
    AppError::AuthenticationFailed
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<Response> {
    if let Some(session) = state.sessions.current(&headers).await? {
        state.sessions.destroy(&session).await?;
    }

    let cookie = AppendHeaders([(SET_COOKIE, state.sessions.clear_cookie())]);
    if prefers_html(&headers) {
        Ok((cookie, Redirect::to("/")).into_response())
    } else {
        Ok((cookie, Json(MessageResponse { message: "Logged out" })).into_response())
    }
}

pub async fn me(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Option<Document>>> {
    let user = state.sessions.current_user(&headers).await?;
    Ok(Json(user))
}

/// Field holding a user's id at `provider`, e.g. `googleId`.
fn provider_id_field(provider: &str) -> String {
    format!("{provider}Id")
}

/// Looks the user up by provider id; first login inserts them.
/// Existing users are returned as stored, without refreshing their profile.
async fn find_or_create_user(db: &Database, provider: &str, profile: Profile) -> Result<Document> {
    let id_field = provider_id_field(provider);
    let provider_id = Value::String(profile.id);

    let record = UserRecord {
        display_name: profile.display_name,
        emails: profile.emails,
        photos: profile.photos,
        provider: provider.to_string(),
        created_at: chrono::Utc::now().to_rfc3339(),
    };
    let mut fields = to_field_map(&record)?;
    fields.insert(id_field.clone(), provider_id.clone());

    let user = db
        .collection(USERS)?
        .find_or_insert(&id_field, &provider_id, fields)
        .await?;
    Ok(user)
}

/// Makes every configured provider's id field unique in the users collection.
pub async fn ensure_user_indexes(db: &Database, providers: &Providers) -> Result<()> {
    if !db.is_connected() {
        return Ok(());
    }
    let users = db.collection(USERS)?;
    for name in providers.names() {
        users.ensure_unique_index(&provider_id_field(name)).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn accept(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn html_preference() {
        assert!(prefers_html(&HeaderMap::new()));
        assert!(prefers_html(&accept("text/html,application/xhtml+xml")));
        assert!(prefers_html(&accept("*/*")));
        assert!(!prefers_html(&accept("application/json")));
    }
}
