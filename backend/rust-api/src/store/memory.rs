use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use mongodb::bson::{Bson, Document};
use tokio::sync::{Mutex, RwLock};

use super::{
    compare_bson, new_document_id, normalize_timestamps, server_timestamp, DocumentStore, Filter,
    Query, SortDirection, StoreError, StoreResult, Update, CREATED_AT_FIELD, ID_FIELD,
    UPDATED_AT_FIELD,
};

/// In-process store with the same semantics as [`super::MongoStore`].
///
/// Documents keep insertion order inside a collection. Writes to specific
/// documents can be made to fail, which lets tests exercise partial-failure
/// paths of multi-document operations.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
    failing_writes: Mutex<HashSet<(String, String)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every subsequent update/delete of `collection/id` returns a backend error.
    pub async fn fail_writes_to(&self, collection: &str, id: &str) {
        self.failing_writes
            .lock()
            .await
            .insert((collection.to_string(), id.to_string()));
    }

    pub async fn clear_write_failures(&self) {
        self.failing_writes.lock().await.clear();
    }

    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|docs| docs.len())
            .unwrap_or(0)
    }

    async fn check_writable(&self, collection: &str, id: &str) -> StoreResult<()> {
        let failing = self.failing_writes.lock().await;
        if failing.contains(&(collection.to_string(), id.to_string())) {
            return Err(StoreError::Backend(format!(
                "write rejected for {}/{}",
                collection, id
            )));
        }
        Ok(())
    }

    async fn insert(&self, collection: &str, id: String, mut data: Document) -> StoreResult<()> {
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();

        if docs.iter().any(|doc| doc_id(doc) == Some(id.as_str())) {
            return Err(StoreError::AlreadyExists {
                collection: collection.to_string(),
                id,
            });
        }

        let now = server_timestamp();
        data.insert(ID_FIELD, id);
        data.insert(CREATED_AT_FIELD, now.clone());
        data.insert(UPDATED_AT_FIELD, now);
        docs.push(data);
        Ok(())
    }
}

fn doc_id(doc: &Document) -> Option<&str> {
    doc.get_str(ID_FIELD).ok()
}

fn matches(doc: &Document, filter: &Filter) -> bool {
    match filter {
        Filter::Eq { field, value } => doc.get(field).map_or(false, |v| bson_eq(v, value)),
        Filter::ArrayContains { field, value } => match doc.get(field) {
            Some(Bson::Array(items)) => items.iter().any(|item| bson_eq(item, value)),
            _ => false,
        },
    }
}

/// Numeric values compare by value regardless of their stored width.
fn bson_eq(a: &Bson, b: &Bson) -> bool {
    let numeric = |v: &Bson| match v {
        Bson::Int32(n) => Some(*n as f64),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    };
    match (numeric(a), numeric(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|doc| doc_id(doc) == Some(id)))
            .cloned()
            .map(normalize_timestamps))
    }

    async fn query(&self, collection: &str, query: Query) -> StoreResult<Vec<Document>> {
        let collections = self.collections.read().await;
        let mut found: Vec<Document> = collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|doc| query.filters.iter().all(|f| matches(doc, f)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        drop(collections);

        if let Some((field, direction)) = &query.order_by {
            // Equal keys keep insertion order, newest first when descending
            if *direction == SortDirection::Descending {
                found.reverse();
            }
            found.sort_by(|a, b| {
                let ord = compare_bson(a.get(field), b.get(field));
                match direction {
                    SortDirection::Ascending => ord,
                    SortDirection::Descending => ord.reverse(),
                }
            });
        }

        if let Some(limit) = query.limit {
            found.truncate(limit.max(0) as usize);
        }

        tracing::debug!(collection, count = found.len(), "memory store query");
        Ok(found.into_iter().map(normalize_timestamps).collect())
    }

    async fn create(&self, collection: &str, data: Document) -> StoreResult<String> {
        let id = new_document_id();
        self.insert(collection, id.clone(), data).await?;
        Ok(id)
    }

    async fn create_with_id(&self, collection: &str, id: &str, data: Document) -> StoreResult<()> {
        self.insert(collection, id.to_string(), data).await
    }

    async fn update(&self, collection: &str, id: &str, update: Update) -> StoreResult<()> {
        self.check_writable(collection, id).await?;

        let mut collections = self.collections.write().await;
        let doc = collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|doc| doc_id(doc) == Some(id)))
            .ok_or_else(|| StoreError::not_found(collection, id))?;

        for (field, value) in update.set {
            if field != ID_FIELD {
                doc.insert(field, value);
            }
        }
        for field in &update.unset {
            doc.remove(field);
        }
        doc.insert(UPDATED_AT_FIELD, server_timestamp());
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        self.check_writable(collection, id).await?;

        let mut collections = self.collections.write().await;
        let docs = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::not_found(collection, id))?;
        let position = docs
            .iter()
            .position(|doc| doc_id(doc) == Some(id))
            .ok_or_else(|| StoreError::not_found(collection, id))?;
        docs.remove(position);
        Ok(())
    }
}
