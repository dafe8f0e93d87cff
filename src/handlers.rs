use axum::{
    extract::{FromRequest, OptionalFromRequest, Path, Request, State},
    http::StatusCode,
    Extension, Json,
};
use serde_json::{json, Value};

use crate::auth::CurrentUser;
use crate::error::{AppError, Result};
use crate::models::{to_field_map, CreatedResponse, Document};
use crate::resources::Resource;
use crate::validate::parse_id;
use crate::AppState;

/// Request body as JSON. A missing body reads as `null`; a malformed one
/// is rejected with the usual error body.
pub struct JsonBody(pub Value);

impl<S: Send + Sync> FromRequest<S> for JsonBody {
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self> {
        match <Json<Value> as OptionalFromRequest<S>>::from_request(req, state).await {
            Ok(Some(Json(value))) => Ok(Self(value)),
            Ok(None) => Ok(Self(Value::Null)),
            Err(rejection) => Err(AppError::InvalidBody(rejection.body_text())),
        }
    }
}

// === Resource endpoints ===

/// Hex id of the logged-in user on gated routes.
fn actor(user: &Option<Extension<CurrentUser>>) -> Option<String> {
    user.as_ref()
        .map(|Extension(CurrentUser(doc))| doc.id.to_hex())
}

pub async fn list<R: Resource>(State(state): State<AppState>) -> Result<Json<Vec<Document>>> {
    let docs = state.db.collection(R::COLLECTION)?.find_all().await?;
    Ok(Json(docs))
}

pub async fn get_one<R: Resource>(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Document>> {
    let id = parse_id(&id)?;
    let doc = state.db.collection(R::COLLECTION)?.find_one(&id).await?;
    doc.map(Json).ok_or(AppError::NotFound(R::LABEL))
}

pub async fn create<R: Resource>(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
    JsonBody(body): JsonBody,
) -> Result<(StatusCode, Json<CreatedResponse>)> {
    let record = R::validate(&body)?;

    let id = state
        .db
        .collection(R::COLLECTION)?
        .insert_one(to_field_map(&record)?)
        .await?;
    tracing::info!(collection = R::COLLECTION, %id, user = ?actor(&user), "document created");

    Ok((StatusCode::CREATED, Json(CreatedResponse { id: id.to_hex() })))
}

pub async fn update<R: Resource>(
    State(state): State<AppState>,
    Path(id): Path<String>,
    user: Option<Extension<CurrentUser>>,
    JsonBody(body): JsonBody,
) -> Result<StatusCode> {
    let id = parse_id(&id)?;
    let record = R::validate(&body)?;

    let matched = state
        .db
        .collection(R::COLLECTION)?
        .update_one(&id, to_field_map(&record)?)
        .await?;
    if !matched {
        return Err(AppError::NotFound(R::LABEL));
    }
    tracing::info!(collection = R::COLLECTION, %id, user = ?actor(&user), "document updated");

    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete<R: Resource>(
    State(state): State<AppState>,
    Path(id): Path<String>,
    user: Option<Extension<CurrentUser>>,
) -> Result<StatusCode> {
    let id = parse_id(&id)?;

    if !state.db.collection(R::COLLECTION)?.delete_one(&id).await? {
        return Err(AppError::NotFound(R::LABEL));
    }
    tracing::info!(collection = R::COLLECTION, %id, user = ?actor(&user), "document deleted");

    Ok(StatusCode::NO_CONTENT)
}

// === Service ===

pub async fn index() -> &'static str {
    "Resource API running"
}

pub async fn healthcheck(State(state): State<AppState>) -> Json<Value> {
    let store = if state.db.is_connected() {
        "connected"
    } else {
        "disconnected"
    };
    Json(json!({ "state": "OK", "store": store }))
}
