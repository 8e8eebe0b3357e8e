use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::{Client, Database};

use super::{
    new_document_id, normalize_timestamps, server_timestamp, DocumentStore, Filter, Query,
    SortDirection, StoreError, StoreResult, Update, CREATED_AT_FIELD, ID_FIELD, UPDATED_AT_FIELD,
};
use crate::metrics::track_store_operation;

impl From<mongodb::error::Error> for StoreError {
    fn from(err: mongodb::error::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// MongoDB-backed store. Documents use string `_id`s so ids look the same
/// regardless of backend.
pub struct MongoStore {
    mongo: Database,
}

impl MongoStore {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    pub async fn connect(uri: &str, database: &str) -> anyhow::Result<Self> {
        let client = Client::with_uri_str(uri).await?;
        Ok(Self::new(client.database(database)))
    }

    fn collection(&self, name: &str) -> mongodb::Collection<Document> {
        self.mongo.collection::<Document>(name)
    }
}

fn build_filter(filters: Vec<Filter>) -> Document {
    let mut filter = Document::new();
    for f in filters {
        match f {
            Filter::Eq { field, value } => {
                filter.insert(field, value);
            }
            Filter::ArrayContains { field, value } => {
                filter.insert(field, doc! { "$elemMatch": { "$eq": value } });
            }
        }
    }
    filter
}

#[async_trait]
impl DocumentStore for MongoStore {
    fn backend_name(&self) -> &'static str {
        "mongodb"
    }

    async fn ping(&self) -> StoreResult<()> {
        self.mongo.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        track_store_operation("get", collection, async {
            let found = self.collection(collection).find_one(doc! { "_id": id }).await?;
            Ok::<_, StoreError>(found.map(normalize_timestamps))
        })
        .await
    }

    async fn query(&self, collection: &str, query: Query) -> StoreResult<Vec<Document>> {
        track_store_operation("query", collection, async {
            let coll = self.collection(collection);
            let mut find = coll.find(build_filter(query.filters));

            if let Some((field, direction)) = query.order_by {
                let mut sort = Document::new();
                sort.insert(
                    field,
                    match direction {
                        SortDirection::Ascending => 1,
                        SortDirection::Descending => -1,
                    },
                );
                find = find.sort(sort);
            }
            if let Some(limit) = query.limit {
                find = find.limit(limit);
            }

            let docs: Vec<Document> = find.await?.try_collect().await?;
            Ok::<_, StoreError>(docs.into_iter().map(normalize_timestamps).collect())
        })
        .await
    }

    async fn create(&self, collection: &str, data: Document) -> StoreResult<String> {
        let id = new_document_id();
        self.create_with_id(collection, &id, data).await?;
        Ok(id)
    }

    async fn create_with_id(&self, collection: &str, id: &str, mut data: Document) -> StoreResult<()> {
        track_store_operation("create", collection, async {
            let now = server_timestamp();
            data.insert(ID_FIELD, id);
            data.insert(CREATED_AT_FIELD, now.clone());
            data.insert(UPDATED_AT_FIELD, now);

            self.collection(collection)
                .insert_one(data)
                .await
                .map_err(|err| {
                    if err.to_string().contains("E11000") {
                        StoreError::AlreadyExists {
                            collection: collection.to_string(),
                            id: id.to_string(),
                        }
                    } else {
                        StoreError::from(err)
                    }
                })?;
            Ok(())
        })
        .await
    }

    async fn update(&self, collection: &str, id: &str, update: Update) -> StoreResult<()> {
        track_store_operation("update", collection, async {
            let mut set = update.set;
            set.remove(ID_FIELD);
            set.insert(UPDATED_AT_FIELD, server_timestamp());

            let mut update_doc = doc! { "$set": set };
            if !update.unset.is_empty() {
                let mut unset = Document::new();
                for field in update.unset {
                    unset.insert(field, "");
                }
                update_doc.insert("$unset", unset);
            }

            let result = self
                .collection(collection)
                .update_one(doc! { "_id": id }, update_doc)
                .await?;

            if result.matched_count == 0 {
                return Err(StoreError::not_found(collection, id));
            }
            Ok(())
        })
        .await
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        track_store_operation("delete", collection, async {
            let result = self
                .collection(collection)
                .delete_one(doc! { "_id": id })
                .await?;

            if result.deleted_count == 0 {
                return Err(StoreError::not_found(collection, id));
            }
            Ok(())
        })
        .await
    }
}
