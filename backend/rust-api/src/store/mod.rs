//! Document store gateway.
//!
//! Every collection is addressed by name and every document by a string id.
//! Backends return documents with their id under `_id` and with native
//! timestamp values already converted to RFC 3339 strings, so models can
//! deserialize them straight into `chrono::DateTime<Utc>`.

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use mongodb::bson::{self, Bson, Document};
use serde::{de::DeserializeOwned, Serialize};

use crate::utils::time::chrono_to_bson;

pub mod memory;
pub mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

pub const ID_FIELD: &str = "_id";
pub const CREATED_AT_FIELD: &str = "createdAt";
pub const UPDATED_AT_FIELD: &str = "updatedAt";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Document {collection}/{id} not found")]
    NotFound { collection: String, id: String },

    #[error("Document {collection}/{id} already exists")]
    AlreadyExists { collection: String, id: String },

    #[error("Failed to serialize document: {0}")]
    Serialization(#[from] bson::ser::Error),

    #[error("Failed to deserialize document: {0}")]
    Deserialization(#[from] bson::de::Error),

    #[error("Store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(collection: &str, id: &str) -> Self {
        StoreError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `field == value`
    Eq { field: String, value: Bson },
    /// Array field holds `value` as one of its elements
    ArrayContains { field: String, value: Bson },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Conjunction of filters with optional single-field ordering.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order_by: Option<(String, SortDirection)>,
    pub limit: Option<i64>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &str, value: impl Into<Bson>) -> Self {
        self.filters.push(Filter::Eq {
            field: field.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn array_contains(mut self, field: &str, value: impl Into<Bson>) -> Self {
        self.filters.push(Filter::ArrayContains {
            field: field.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, field: &str, direction: SortDirection) -> Self {
        self.order_by = Some((field.to_string(), direction));
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Partial update: fields to assign plus fields to delete outright.
#[derive(Debug, Clone, Default)]
pub struct Update {
    pub set: Document,
    pub unset: Vec<String>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: &str, value: impl Into<Bson>) -> Self {
        self.set.insert(field, value.into());
        self
    }

    /// Assigns any serde value (nested structs, vectors of records).
    pub fn set_serialized<T: Serialize + ?Sized>(mut self, field: &str, value: &T) -> StoreResult<Self> {
        self.set.insert(field, bson::to_bson(value)?);
        Ok(self)
    }

    pub fn unset(mut self, field: &str) -> Self {
        self.unset.push(field.to_string());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty()
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    fn backend_name(&self) -> &'static str;

    async fn ping(&self) -> StoreResult<()>;

    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>>;

    async fn query(&self, collection: &str, query: Query) -> StoreResult<Vec<Document>>;

    /// Inserts with a generated id and server timestamps, returning the id.
    async fn create(&self, collection: &str, data: Document) -> StoreResult<String>;

    async fn create_with_id(&self, collection: &str, id: &str, data: Document) -> StoreResult<()>;

    async fn update(&self, collection: &str, id: &str, update: Update) -> StoreResult<()>;

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()>;
}

pub type SharedStore = Arc<dyn DocumentStore>;

impl<'a> dyn DocumentStore + 'a {
    pub async fn get_as<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: &str,
    ) -> StoreResult<Option<T>> {
        match self.get(collection, id).await? {
            Some(doc) => Ok(Some(from_document(doc)?)),
            None => Ok(None),
        }
    }

    pub async fn query_as<T: DeserializeOwned>(
        &self,
        collection: &str,
        query: Query,
    ) -> StoreResult<Vec<T>> {
        self.query(collection, query)
            .await?
            .into_iter()
            .map(from_document)
            .collect()
    }

    pub async fn create_from<T: Serialize>(&self, collection: &str, value: &T) -> StoreResult<String> {
        self.create(collection, to_document(value)?).await
    }

    /// Deletes every document matching `query`, one at a time. Returns the count.
    pub async fn delete_matching(&self, collection: &str, query: Query) -> StoreResult<usize> {
        let ids: Vec<String> = self
            .query(collection, query)
            .await?
            .iter()
            .filter_map(|doc| doc.get_str(ID_FIELD).ok().map(str::to_string))
            .collect();
        for id in &ids {
            self.delete(collection, id).await?;
        }
        Ok(ids.len())
    }
}

/// Serializes a model for writing; the id lives outside the payload.
pub fn to_document<T: Serialize + ?Sized>(value: &T) -> StoreResult<Document> {
    let mut doc = bson::to_document(value)?;
    doc.remove(ID_FIELD);
    Ok(doc)
}

pub fn from_document<T: DeserializeOwned>(doc: Document) -> StoreResult<T> {
    Ok(bson::from_document(doc)?)
}

pub(crate) fn new_document_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub(crate) fn server_timestamp() -> Bson {
    Bson::DateTime(chrono_to_bson(Utc::now()))
}

/// Rewrites stored timestamps as RFC 3339 strings, recursively.
pub(crate) fn normalize_timestamps(doc: Document) -> Document {
    doc.into_iter()
        .map(|(key, value)| (key, normalize_value(value)))
        .collect()
}

fn normalize_value(value: Bson) -> Bson {
    match value {
        Bson::DateTime(dt) => {
            match DateTime::<Utc>::from_timestamp_millis(dt.timestamp_millis()) {
                Some(parsed) => Bson::String(parsed.to_rfc3339_opts(SecondsFormat::Millis, true)),
                None => Bson::DateTime(dt),
            }
        }
        Bson::Document(inner) => Bson::Document(normalize_timestamps(inner)),
        Bson::Array(items) => Bson::Array(items.into_iter().map(normalize_value).collect()),
        other => other,
    }
}

/// Ordering used by in-process sorting: missing < bool < number < string/date.
pub(crate) fn compare_bson(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    fn rank(value: Option<&Bson>) -> u8 {
        match value {
            None | Some(Bson::Null) => 0,
            Some(Bson::Boolean(_)) => 1,
            Some(Bson::Int32(_)) | Some(Bson::Int64(_)) | Some(Bson::Double(_)) => 2,
            Some(Bson::String(_)) | Some(Bson::DateTime(_)) => 3,
            Some(_) => 4,
        }
    }

    fn as_f64(value: &Bson) -> Option<f64> {
        match value {
            Bson::Int32(v) => Some(*v as f64),
            Bson::Int64(v) => Some(*v as f64),
            Bson::Double(v) => Some(*v),
            _ => None,
        }
    }

    fn as_text(value: &Bson) -> Option<String> {
        match value {
            Bson::String(s) => Some(s.clone()),
            Bson::DateTime(dt) => DateTime::<Utc>::from_timestamp_millis(dt.timestamp_millis())
                .map(|parsed| parsed.to_rfc3339_opts(SecondsFormat::Millis, true)),
            _ => None,
        }
    }

    match rank(a).cmp(&rank(b)) {
        Ordering::Equal => {}
        other => return other,
    }

    match (a, b) {
        (Some(Bson::Boolean(x)), Some(Bson::Boolean(y))) => x.cmp(y),
        (Some(x), Some(y)) => {
            if let (Some(x), Some(y)) = (as_f64(x), as_f64(y)) {
                return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
            }
            match (as_text(x), as_text(y)) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => Ordering::Equal,
            }
        }
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    #[test]
    fn normalize_converts_nested_datetimes() {
        let millis = 1_700_000_000_000;
        let raw = doc! {
            "createdAt": Bson::DateTime(bson::DateTime::from_millis(millis)),
            "history": [ { "completedAt": Bson::DateTime(bson::DateTime::from_millis(millis)) } ],
            "name": "Aula 1",
        };

        let normalized = normalize_timestamps(raw);
        assert_eq!(
            normalized.get_str("createdAt").unwrap(),
            "2023-11-14T22:13:20.000Z"
        );
        let history = normalized.get_array("history").unwrap();
        let entry = history[0].as_document().unwrap();
        assert_eq!(entry.get_str("completedAt").unwrap(), "2023-11-14T22:13:20.000Z");
        assert_eq!(normalized.get_str("name").unwrap(), "Aula 1");
    }

    #[test]
    fn compare_orders_numbers_across_widths() {
        let a = Bson::Int32(2);
        let b = Bson::Int64(10);
        let c = Bson::Double(2.5);
        assert_eq!(compare_bson(Some(&a), Some(&b)), Ordering::Less);
        assert_eq!(compare_bson(Some(&c), Some(&a)), Ordering::Greater);
        assert_eq!(compare_bson(None, Some(&a)), Ordering::Less);
    }

    #[test]
    fn update_builder_tracks_unset_fields() {
        let update = Update::new().set("isActive", true).unset("endDate");
        assert_eq!(update.set.get_bool("isActive").unwrap(), true);
        assert_eq!(update.unset, vec!["endDate".to_string()]);
        assert!(!update.is_empty());
    }
}
