#![allow(dead_code)]

use async_trait::async_trait;
use axum::http::{
    header::{ACCEPT, COOKIE, LOCATION},
    HeaderValue, StatusCode,
};
use axum_test::{TestRequest, TestServer};
use resource_api::error::{AppError, Result};
use resource_api::models::{Profile, ProfileValue};
use resource_api::{create_router, AppState, Database, IdentityProvider, Providers, SessionSettings};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use url::Url;

pub const PROVIDER: &str = "scripted";

/// Stands in for a real identity provider: the authorization code is the
/// user's name, and the code `rejected` is refused.
pub struct ScriptedProvider;

#[async_trait]
impl IdentityProvider for ScriptedProvider {
    fn authorize_url(&self, state: &str) -> Result<Url> {
        Ok(Url::parse_with_params(
            "https://idp.test/authorize",
            &[("state", state)],
        )?)
    }

    async fn exchange(&self, code: &str) -> Result<Profile> {
        if code == "rejected" {
            return Err(AppError::AuthenticationFailed);
        }
        Ok(Profile {
            id: format!("{code}-id"),
            display_name: code.to_string(),
            emails: vec![ProfileValue {
                value: format!("{code}@example.com"),
                verified: Some(true),
            }],
            photos: Vec::new(),
        })
    }
}

fn server_for(db: Arc<Database>, settings: SessionSettings) -> TestServer {
    let providers = Providers::new().with(PROVIDER, ScriptedProvider);
    let state = AppState::new(db, settings, providers);
    TestServer::new(create_router(state)).unwrap()
}

/// Test server plus a handle on its store, for seeding and inspecting documents.
pub fn setup_test_server_with(settings: SessionSettings) -> (TestServer, Arc<Database>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let db = Arc::new(Database::open(db_path.to_str().unwrap()).unwrap());
    (server_for(db.clone(), settings), db, temp_dir)
}

pub fn setup_test_server() -> (TestServer, TempDir) {
    let (server, _db, temp_dir) = setup_test_server_with(SessionSettings::default());
    (server, temp_dir)
}

pub fn setup_disconnected_server() -> TestServer {
    server_for(Arc::new(Database::disconnected()), SessionSettings::default())
}

/// Number of documents in `collection`.
pub async fn count(db: &Database, collection: &str) -> usize {
    db.collection(collection).unwrap().find_all().await.unwrap().len()
}

pub fn json_accept() -> HeaderValue {
    HeaderValue::from_static("application/json")
}

pub fn with_session(request: TestRequest, sid: &str) -> TestRequest {
    request.add_header(COOKIE, HeaderValue::from_str(&format!("sid={sid}")).unwrap())
}

/// Starts a login and returns the session id and the state the provider was handed.
pub async fn begin_login(server: &TestServer) -> (String, String) {
    let response = server.get(&format!("/auth/{PROVIDER}")).await;
    response.assert_status(StatusCode::SEE_OTHER);

    let sid = response.cookie("sid").value().to_string();
    let location = response.header(LOCATION);
    let url = Url::parse(location.to_str().unwrap()).unwrap();
    let state = url
        .query_pairs()
        .find(|(key, _)| key == "state")
        .map(|(_, value)| value.into_owned())
        .unwrap();
    (sid, state)
}

/// Runs the whole login flow for `user` and returns the logged-in session id.
pub async fn login(server: &TestServer, user: &str) -> String {
    let (sid, state) = begin_login(server).await;

    let request = server
        .get(&format!("/auth/{PROVIDER}/callback"))
        .add_query_param("code", user)
        .add_query_param("state", &state)
        .add_header(ACCEPT, json_accept());
    let response = with_session(request, &sid).await;
    response.assert_status_ok();

    response.cookie("sid").value().to_string()
}

pub fn alice() -> Value {
    json!({
        "firstName": "Alice",
        "lastName": "Anderson",
        "email": "alice@example.com",
        "favoriteColor": "blue",
        "birthday": "1990-05-15"
    })
}

pub fn saturn() -> Value {
    json!({
        "name": "Saturn",
        "manufacturer": "Sega",
        "releaseYear": 1994
    })
}
