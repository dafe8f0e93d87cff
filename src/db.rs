use std::time::Duration;

use futures::TryStreamExt;
use mongodb::bson::{self, doc, oid::ObjectId, Bson};
use mongodb::options::{ClientOptions, IndexOptions, ReturnDocument};
use mongodb::IndexModel;
use redb::{Database as RedbDatabase, ReadableTable, TableDefinition, TableError};
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{Document, FieldMap};

const SERVER_SELECTION_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_MONGO_DATABASE: &str = "test";

enum Backend {
    Embedded(RedbDatabase),
    Mongo(mongodb::Database),
    Disconnected,
}

/// Handle to the document store shared by every request.
pub struct Database {
    backend: Backend,
}

impl Database {
    /// Opens the store named by `uri`: a `mongodb://` or `mongodb+srv://` URI
    /// selects MongoDB, anything else is a path to an embedded database file.
    pub async fn connect(uri: &str) -> Result<Self> {
        if uri.starts_with("mongodb://") || uri.starts_with("mongodb+srv://") {
            Self::connect_mongo(uri).await
        } else {
            Self::open(uri)
        }
    }

    pub fn open(path: &str) -> Result<Self> {
        let db = RedbDatabase::create(path)?;
        tracing::info!(path, "opened embedded store");
        Ok(Self {
            backend: Backend::Embedded(db),
        })
    }

    pub async fn connect_mongo(uri: &str) -> Result<Self> {
        let mut options = ClientOptions::parse(uri).await?;
        options.server_selection_timeout = Some(SERVER_SELECTION_TIMEOUT);
        let client = mongodb::Client::with_options(options)?;
        let db = client
            .default_database()
            .unwrap_or_else(|| client.database(DEFAULT_MONGO_DATABASE));

        // The driver connects lazily; ping so a bad URI surfaces at startup.
        db.run_command(doc! { "ping": 1 }).await?;
        tracing::info!(database = db.name(), "connected to MongoDB");

        Ok(Self {
            backend: Backend::Mongo(db),
        })
    }

    /// A store that answers every collection lookup with `StoreUnavailable`.
    pub fn disconnected() -> Self {
        Self {
            backend: Backend::Disconnected,
        }
    }

    pub fn is_connected(&self) -> bool {
        !matches!(self.backend, Backend::Disconnected)
    }

    pub fn collection<'a>(&'a self, name: &'a str) -> Result<Collection<'a>> {
        let handle = match &self.backend {
            Backend::Embedded(db) => Handle::Embedded(db),
            Backend::Mongo(db) => Handle::Mongo(db.collection::<bson::Document>(name)),
            Backend::Disconnected => return Err(AppError::StoreUnavailable),
        };
        Ok(Collection { name, handle })
    }
}

enum Handle<'a> {
    Embedded(&'a RedbDatabase),
    Mongo(mongodb::Collection<bson::Document>),
}

/// Collection-scoped operations. Every method issues exactly one store call.
pub struct Collection<'a> {
    name: &'a str,
    handle: Handle<'a>,
}

impl Collection<'_> {
    pub async fn find_all(&self) -> Result<Vec<Document>> {
        match &self.handle {
            Handle::Embedded(db) => embedded::find_all(db, self.name),
            Handle::Mongo(coll) => {
                let cursor = coll.find(doc! {}).await?;
                let raw: Vec<bson::Document> = cursor.try_collect().await?;
                raw.into_iter().map(from_bson).collect()
            }
        }
    }

    pub async fn find_one(&self, id: &ObjectId) -> Result<Option<Document>> {
        match &self.handle {
            Handle::Embedded(db) => embedded::find_one(db, self.name, id),
            Handle::Mongo(coll) => coll
                .find_one(doc! { "_id": *id })
                .await?
                .map(from_bson)
                .transpose(),
        }
    }

    /// Returns the first document whose `field` equals `value`, inserting
    /// `fields` when there is none. Lookup and insert happen atomically.
    pub async fn find_or_insert(
        &self,
        field: &str,
        value: &Value,
        mut fields: FieldMap,
    ) -> Result<Document> {
        match &self.handle {
            Handle::Embedded(db) => embedded::find_or_insert(db, self.name, field, value, fields),
            Handle::Mongo(coll) => {
                // The filter's equality field is written on insert.
                fields.remove(field);
                let mut filter = bson::Document::new();
                filter.insert(field, bson::to_bson(value)?);
                let update = doc! { "$setOnInsert": bson::to_document(&fields)? };

                coll.find_one_and_update(filter, update)
                    .upsert(true)
                    .return_document(ReturnDocument::After)
                    .await?
                    .map(from_bson)
                    .transpose()?
                    .ok_or_else(|| {
                        AppError::CorruptDocument(format!("upsert into {} returned nothing", self.name))
                    })
            }
        }
    }

    /// Deletes every document whose integer `field` is at most `bound`.
    /// Returns how many were removed.
    pub async fn delete_at_most(&self, field: &str, bound: i64) -> Result<u64> {
        match &self.handle {
            Handle::Embedded(db) => embedded::delete_at_most(db, self.name, field, bound),
            Handle::Mongo(coll) => {
                let mut filter = bson::Document::new();
                filter.insert(field, doc! { "$lte": bound });
                let result = coll.delete_many(filter).await?;
                Ok(result.deleted_count)
            }
        }
    }

    /// Makes `field` unique among the documents that have it. The embedded
    /// backend relies on `find_or_insert` instead and has nothing to do.
    pub async fn ensure_unique_index(&self, field: &str) -> Result<()> {
        match &self.handle {
            Handle::Embedded(_) => Ok(()),
            Handle::Mongo(coll) => {
                let mut keys = bson::Document::new();
                keys.insert(field, 1);
                let index = IndexModel::builder()
                    .keys(keys)
                    .options(IndexOptions::builder().unique(true).sparse(true).build())
                    .build();
                coll.create_index(index).await?;
                Ok(())
            }
        }
    }

    pub async fn insert_one(&self, fields: FieldMap) -> Result<ObjectId> {
        match &self.handle {
            Handle::Embedded(db) => embedded::insert_one(db, self.name, &fields),
            Handle::Mongo(coll) => {
                let result = coll.insert_one(bson::to_document(&fields)?).await?;
                result.inserted_id.as_object_id().ok_or_else(|| {
                    AppError::CorruptDocument(format!(
                        "insert into {} returned a non-ObjectId id",
                        self.name
                    ))
                })
            }
        }
    }

    /// Sets `fields` on the document, leaving its other fields alone.
    /// Returns whether a document matched.
    pub async fn update_one(&self, id: &ObjectId, fields: FieldMap) -> Result<bool> {
        match &self.handle {
            Handle::Embedded(db) => embedded::update_one(db, self.name, id, fields),
            Handle::Mongo(coll) => {
                let update = doc! { "$set": bson::to_document(&fields)? };
                let result = coll.update_one(doc! { "_id": *id }, update).await?;
                Ok(result.matched_count > 0)
            }
        }
    }

    /// Returns whether a document was removed.
    pub async fn delete_one(&self, id: &ObjectId) -> Result<bool> {
        match &self.handle {
            Handle::Embedded(db) => embedded::delete_one(db, self.name, id),
            Handle::Mongo(coll) => {
                let result = coll.delete_one(doc! { "_id": *id }).await?;
                Ok(result.deleted_count > 0)
            }
        }
    }
}

fn from_bson(mut raw: bson::Document) -> Result<Document> {
    let id = match raw.remove("_id") {
        Some(Bson::ObjectId(id)) => id,
        other => {
            return Err(AppError::CorruptDocument(format!(
                "expected ObjectId _id, found {other:?}"
            )))
        }
    };
    match Bson::Document(raw).into_relaxed_extjson() {
        Value::Object(fields) => Ok(Document { id, fields }),
        other => Err(AppError::CorruptDocument(format!(
            "document decoded to {other}"
        ))),
    }
}

/// Embedded backend: one redb table per collection, keyed by the hex id.
/// ObjectIds start with a timestamp, so key order is insertion order.
mod embedded {
    use super::*;

    fn table_def(name: &str) -> TableDefinition<'_, &'static str, &'static [u8]> {
        TableDefinition::new(name)
    }

    fn decode(key: &str, data: &[u8]) -> Result<Document> {
        let id = ObjectId::parse_str(key)
            .map_err(|err| AppError::CorruptDocument(format!("bad key {key}: {err}")))?;
        let fields: FieldMap = serde_json::from_slice(data)?;
        Ok(Document { id, fields })
    }

    fn scan(db: &RedbDatabase, name: &str) -> Result<Vec<Document>> {
        let read_txn = db.begin_read()?;
        let table = match read_txn.open_table(table_def(name)) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut docs = Vec::new();
        for entry in table.iter()? {
            let (key, data) = entry?;
            docs.push(decode(key.value(), data.value())?);
        }
        Ok(docs)
    }

    pub(super) fn find_all(db: &RedbDatabase, name: &str) -> Result<Vec<Document>> {
        scan(db, name)
    }

    pub(super) fn find_one(db: &RedbDatabase, name: &str, id: &ObjectId) -> Result<Option<Document>> {
        let key = id.to_hex();
        let read_txn = db.begin_read()?;
        let table = match read_txn.open_table(table_def(name)) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let found = match table.get(key.as_str())? {
            Some(data) => Some(decode(&key, data.value())?),
            None => None,
        };
        Ok(found)
    }

    pub(super) fn find_or_insert(
        db: &RedbDatabase,
        name: &str,
        field: &str,
        value: &Value,
        fields: FieldMap,
    ) -> Result<Document> {
        let write_txn = db.begin_write()?;
        let doc = {
            let mut table = write_txn.open_table(table_def(name))?;
            let mut existing = None;
            for entry in table.iter()? {
                let (key, data) = entry?;
                let doc = decode(key.value(), data.value())?;
                if doc.fields.get(field) == Some(value) {
                    existing = Some(doc);
                    break;
                }
            }

            match existing {
                Some(doc) => doc,
                None => {
                    let id = ObjectId::new();
                    let json = serde_json::to_vec(&fields)?;
                    table.insert(id.to_hex().as_str(), json.as_slice())?;
                    Document { id, fields }
                }
            }
        };
        write_txn.commit()?;

        Ok(doc)
    }

    pub(super) fn delete_at_most(
        db: &RedbDatabase,
        name: &str,
        field: &str,
        bound: i64,
    ) -> Result<u64> {
        let write_txn = db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(table_def(name))?;
            let mut stale = Vec::new();
            for entry in table.iter()? {
                let (key, data) = entry?;
                let fields: FieldMap = serde_json::from_slice(data.value())?;
                if fields
                    .get(field)
                    .and_then(Value::as_i64)
                    .is_some_and(|v| v <= bound)
                {
                    stale.push(key.value().to_string());
                }
            }
            for key in &stale {
                table.remove(key.as_str())?;
            }
            stale.len() as u64
        };
        write_txn.commit()?;

        Ok(removed)
    }

    pub(super) fn insert_one(db: &RedbDatabase, name: &str, fields: &FieldMap) -> Result<ObjectId> {
        let id = ObjectId::new();
        let key = id.to_hex();
        let json = serde_json::to_vec(fields)?;

        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(table_def(name))?;
            table.insert(key.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;

        Ok(id)
    }

    pub(super) fn update_one(
        db: &RedbDatabase,
        name: &str,
        id: &ObjectId,
        update: FieldMap,
    ) -> Result<bool> {
        let key = id.to_hex();

        let write_txn = db.begin_write()?;
        let matched = {
            let mut table = write_txn.open_table(table_def(name))?;
            let current: Option<FieldMap> = match table.get(key.as_str())? {
                Some(data) => Some(serde_json::from_slice(data.value())?),
                None => None,
            };

            match current {
                Some(mut fields) => {
                    fields.extend(update);
                    let json = serde_json::to_vec(&fields)?;
                    table.insert(key.as_str(), json.as_slice())?;
                    true
                }
                None => false,
            }
        };
        write_txn.commit()?;

        Ok(matched)
    }

    pub(super) fn delete_one(db: &RedbDatabase, name: &str, id: &ObjectId) -> Result<bool> {
        let key = id.to_hex();

        let write_txn = db.begin_write()?;
        let removed;
        {
            let mut table = write_txn.open_table(table_def(name))?;
            removed = table.remove(key.as_str())?.is_some();
        }
        write_txn.commit()?;

        Ok(removed)
    }
}
