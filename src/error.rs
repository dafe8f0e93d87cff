use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;
use crate::validate::ValidationError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] redb::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] redb::DatabaseError),

    #[error("Database transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Database table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Database storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Database commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    #[error("BSON encoding error: {0}")]
    Bson(#[from] mongodb::bson::ser::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt document: {0}")]
    CorruptDocument(String),

    #[error("Identity provider error: {0}")]
    Provider(#[from] reqwest::Error),

    #[error("Invalid provider URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Database not connected")]
    StoreUnavailable,

    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("Invalid JSON body: {0}")]
    InvalidBody(String),

    #[error("Invalid id format")]
    InvalidIdentifier,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Unknown identity provider: {0}")]
    UnknownProvider(String),

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Authentication failed")]
    AuthenticationFailed,
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InvalidBody(_) | Self::InvalidIdentifier => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFound(_) | Self::UnknownProvider(_) => StatusCode::NOT_FOUND,
            Self::Unauthenticated | Self::AuthenticationFailed => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = match &self {
            Self::Validation(err) => ErrorResponse::for_field(err.field, self.to_string()),
            _ => ErrorResponse::new(self.to_string()),
        };
        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
