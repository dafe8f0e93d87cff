//! Resource definitions served by the generic CRUD handlers.

use serde::Serialize;
use serde_json::Value;

use crate::models::{ContactRecord, GameRecord, PlatformRecord};
use crate::validate::{Fields, ValidationError};

/// A named collection exposed through the uniform route set.
pub trait Resource: Send + Sync + 'static {
    /// URL path segment, e.g. `contacts` for `/contacts/{id}`.
    const PATH: &'static str;
    const COLLECTION: &'static str;
    /// Singular name used in "not found" messages.
    const LABEL: &'static str;
    /// Whether create, update and delete require an authenticated session.
    const GATED_WRITES: bool = false;

    type Record: Serialize + Send;

    /// Checks every required field and builds the record to store.
    fn validate(body: &Value) -> Result<Self::Record, ValidationError>;
}

pub struct Contacts;

impl Resource for Contacts {
    const PATH: &'static str = "contacts";
    const COLLECTION: &'static str = "contacts";
    const LABEL: &'static str = "Contact";

    type Record = ContactRecord;

    fn validate(body: &Value) -> Result<ContactRecord, ValidationError> {
        let fields = Fields::new(body);
        Ok(ContactRecord {
            first_name: fields.string("firstName")?,
            last_name: fields.string("lastName")?,
            email: fields.email("email")?,
            favorite_color: fields.string("favoriteColor")?,
            birthday: fields.string("birthday")?,
        })
    }
}

pub struct Games;

impl Resource for Games {
    const PATH: &'static str = "games";
    const COLLECTION: &'static str = "games";
    const LABEL: &'static str = "Game";

    type Record = GameRecord;

    fn validate(body: &Value) -> Result<GameRecord, ValidationError> {
        let fields = Fields::new(body);
        Ok(GameRecord {
            title: fields.string("title")?,
            developer: fields.string("developer")?,
            release_date: fields.string("releaseDate")?,
            genre: fields.string("genre")?,
            platform: fields.string("platform")?,
        })
    }
}

pub struct Platforms;

impl Resource for Platforms {
    const PATH: &'static str = "platforms";
    const COLLECTION: &'static str = "platforms";
    const LABEL: &'static str = "Platform";
    const GATED_WRITES: bool = true;

    type Record = PlatformRecord;

    fn validate(body: &Value) -> Result<PlatformRecord, ValidationError> {
        let fields = Fields::new(body);
        Ok(PlatformRecord {
            name: fields.string("name")?,
            manufacturer: fields.string("manufacturer")?,
            release_year: fields.integer("releaseYear")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::Reason;
    use serde_json::json;

    #[test]
    fn contact_reports_first_missing_field() {
        let body = json!({
            "firstName": "Alice",
            "email": "alice@example.com",
            "favoriteColor": "blue",
            "birthday": "1990-05-15"
        });
        let err = Contacts::validate(&body).unwrap_err();
        assert_eq!(err, ValidationError::new("lastName", Reason::Missing));
    }

    #[test]
    fn contact_rejects_bad_email() {
        let body = json!({
            "firstName": "Alice",
            "lastName": "Anderson",
            "email": "alice.example.com",
            "favoriteColor": "blue",
            "birthday": "1990-05-15"
        });
        let err = Contacts::validate(&body).unwrap_err();
        assert_eq!(err.to_string(), "email must be a valid email");
    }

    #[test]
    fn platform_year_must_be_integer() {
        let body = json!({ "name": "Saturn", "manufacturer": "Sega", "releaseYear": "1994" });
        let err = Platforms::validate(&body).unwrap_err();
        assert_eq!(err, ValidationError::new("releaseYear", Reason::NotInteger));
    }

    #[test]
    fn game_drops_undeclared_fields() {
        let body = json!({
            "title": "Nights",
            "developer": "Sonic Team",
            "releaseDate": "1996-07-05",
            "genre": "Action",
            "platform": "65f1a2b3c4d5e6f708192a3b",
            "rating": 9
        });
        let record = Games::validate(&body).unwrap();
        let stored = serde_json::to_value(&record).unwrap();
        assert_eq!(stored.as_object().unwrap().len(), 5);
        assert!(stored.get("rating").is_none());
        assert_eq!(stored["releaseDate"], "1996-07-05");
    }
}
