//! Field checks shared by the per-resource validators.

use std::fmt;

use mongodb::bson::oid::ObjectId;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    Missing,
    NotString,
    NotEmail,
    NotInteger,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Missing => "is required",
            Self::NotString => "must be a string",
            Self::NotEmail => "must be a valid email",
            Self::NotInteger => "must be an integer",
        })
    }
}

/// First offending field of a request body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field} {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: Reason,
}

impl ValidationError {
    pub fn new(field: &'static str, reason: Reason) -> Self {
        Self { field, reason }
    }
}

/// Reads typed fields out of a JSON request body.
///
/// A body that is not a JSON object behaves as if every field were absent.
pub struct Fields<'a> {
    body: Option<&'a Map<String, Value>>,
}

impl<'a> Fields<'a> {
    pub fn new(body: &'a Value) -> Self {
        Self {
            body: body.as_object(),
        }
    }

    fn get(&self, field: &'static str) -> std::result::Result<&'a Value, ValidationError> {
        match self.body.and_then(|body| body.get(field)) {
            None | Some(Value::Null) => Err(ValidationError::new(field, Reason::Missing)),
            Some(value) => Ok(value),
        }
    }

    pub fn string(&self, field: &'static str) -> std::result::Result<String, ValidationError> {
        match self.get(field)? {
            Value::String(s) if s.trim().is_empty() => {
                Err(ValidationError::new(field, Reason::Missing))
            }
            Value::String(s) => Ok(s.clone()),
            _ => Err(ValidationError::new(field, Reason::NotString)),
        }
    }

    pub fn email(&self, field: &'static str) -> std::result::Result<String, ValidationError> {
        let value = self.string(field)?;
        if is_email(&value) {
            Ok(value)
        } else {
            Err(ValidationError::new(field, Reason::NotEmail))
        }
    }

    pub fn integer(&self, field: &'static str) -> std::result::Result<i64, ValidationError> {
        self.get(field)?
            .as_i64()
            .ok_or(ValidationError::new(field, Reason::NotInteger))
    }
}

/// `local@domain.tld` with no whitespace anywhere.
fn is_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    let Some((host, tld)) = domain.rsplit_once('.') else {
        return false;
    };
    !local.is_empty() && !host.is_empty() && !tld.is_empty()
}

/// Parses a path identifier into a store id.
pub fn parse_id(raw: &str) -> Result<ObjectId> {
    ObjectId::parse_str(raw).map_err(|_| AppError::InvalidIdentifier)
}
