use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{AppError, Result};

/// Field values of a stored document, without its id.
pub type FieldMap = Map<String, Value>;

/// Serializes a record into the field map the store persists.
pub fn to_field_map<T: Serialize>(record: &T) -> Result<FieldMap> {
    match serde_json::to_value(record)? {
        Value::Object(fields) => Ok(fields),
        other => Err(AppError::CorruptDocument(format!(
            "record serialized to {other}, expected an object"
        ))),
    }
}

/// A document as read back from the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    #[serde(rename = "_id", serialize_with = "hex_id")]
    pub id: ObjectId,
    #[serde(flatten)]
    pub fields: FieldMap,
}

fn hex_id<S: Serializer>(id: &ObjectId, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&id.to_hex())
}

// === Resources ===

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactRecord {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub favorite_color: String,
    pub birthday: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameRecord {
    pub title: String,
    pub developer: String,
    pub release_date: String,
    pub genre: String,
    /// Id of a platform document. Not checked against the platforms collection.
    pub platform: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformRecord {
    pub name: String,
    pub manufacturer: String,
    pub release_year: i64,
}

#[derive(Debug, Serialize)]
pub struct CreatedResponse {
    pub id: String,
}

// === Auth ===

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileValue {
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified: Option<bool>,
}

/// Identity returned by a provider after a successful code exchange.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Profile {
    pub id: String,
    pub display_name: String,
    pub emails: Vec<ProfileValue>,
    pub photos: Vec<ProfileValue>,
}

/// User document body. The provider-scoped id (`googleId`, ...) is added
/// alongside these fields when the user is inserted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub display_name: String,
    pub emails: Vec<ProfileValue>,
    pub photos: Vec<ProfileValue>,
    pub provider: String,
    pub created_at: String,
}

/// Stored session. The cookie carries the document id and `secret`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub secret: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub oauth_state: Option<String>,
    pub expires_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: &'static str,
    pub user: Document,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

// === Errors ===

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<&'static str>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            field: None,
        }
    }

    pub fn for_field(field: &'static str, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            field: Some(field),
        }
    }
}
