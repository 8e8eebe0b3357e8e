use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;

use crate::config::{Config, StoreBackend};
use crate::store::{DocumentStore, MemoryStore, MongoStore, SharedStore};

pub mod classroom_service;
pub mod evaluation_service;
pub mod finalization_service;
pub mod program_service;
pub mod restart_service;
pub mod run_history_service;
pub mod user_service;
pub mod whatsapp_client;

use whatsapp_client::WhatsappClient;

pub struct AppState {
    pub config: Config,
    pub store: SharedStore,
    /// Present when a messaging provider is configured
    pub whatsapp: Option<WhatsappClient>,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self> {
        let store: SharedStore = match config.store_backend {
            StoreBackend::Mongo => {
                tracing::info!("Connecting to MongoDB database {}", config.mongo_database);
                let store = MongoStore::connect(&config.mongo_uri, &config.mongo_database)
                    .await
                    .context("Failed to connect to MongoDB")?;

                tokio::time::timeout(std::time::Duration::from_secs(5), store.ping())
                    .await
                    .map_err(|_| anyhow!("MongoDB ping timeout after 5s"))??;
                tracing::info!("MongoDB connection established successfully");
                Arc::new(store)
            }
            StoreBackend::Memory => {
                tracing::warn!("Using in-memory document store, data is not persisted");
                Arc::new(MemoryStore::new())
            }
        };

        Self::with_store(config, store)
    }

    pub fn with_store(config: Config, store: SharedStore) -> Result<Self> {
        let whatsapp = match &config.whatsapp {
            Some(settings) => {
                tracing::info!("WhatsApp provider configured at {}", settings.api_url);
                Some(WhatsappClient::from_settings(settings)?)
            }
            None => None,
        };

        Ok(Self {
            config,
            store,
            whatsapp,
        })
    }
}

/// Loads a document that must exist, with a "<label> not found" error otherwise.
pub(crate) async fn require<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: &str,
    id: &str,
    label: &str,
) -> Result<T> {
    store
        .get_as::<T>(collection, id)
        .await
        .with_context(|| format!("Failed to load {}", label))?
        .ok_or_else(|| anyhow!("{} not found", label))
}
