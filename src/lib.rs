pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod provider;
pub mod resources;
pub mod session;
pub mod validate;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use config::Config;
pub use db::Database;
pub use provider::{IdentityProvider, Providers};
pub use resources::{Contacts, Games, Platforms, Resource};
pub use session::{SessionSettings, SessionStore};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub sessions: SessionStore,
    pub providers: Arc<Providers>,
}

impl AppState {
    pub fn new(db: Arc<Database>, session: SessionSettings, providers: Providers) -> Self {
        Self {
            sessions: SessionStore::new(db.clone(), session),
            db,
            providers: Arc::new(providers),
        }
    }
}

/// The five CRUD routes for `R`, with the session gate on writes if `R` asks for it.
fn resource_routes<R: Resource>(state: &AppState) -> Router<AppState> {
    let mut create = post(handlers::create::<R>);
    let mut modify = put(handlers::update::<R>).delete(handlers::delete::<R>);
    if R::GATED_WRITES {
        let gate = middleware::from_fn_with_state(state.clone(), auth::require_session);
        create = create.route_layer(gate.clone());
        modify = modify.route_layer(gate);
    }

    Router::new()
        .route(
            &format!("/{}", R::PATH),
            get(handlers::list::<R>).merge(create),
        )
        .route(
            &format!("/{}/{{id}}", R::PATH),
            get(handlers::get_one::<R>).merge(modify),
        )
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/healthcheck", get(handlers::healthcheck))
        .merge(resource_routes::<Contacts>(&state))
        .merge(resource_routes::<Games>(&state))
        .merge(resource_routes::<Platforms>(&state))
        // Auth
        .route("/auth/me", get(auth::me))
        .route("/auth/logout", get(auth::logout))
        .route("/auth/failure", get(auth::failure))
        .route("/auth/{provider}", get(auth::login))
        .route("/auth/{provider}/callback", get(auth::callback))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
