use serde::Deserialize;
use std::env;

/// Which document store backs the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Mongo,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhatsappSettings {
    pub api_url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    /// Session used for messages the service sends on its own
    pub session_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub store_backend: StoreBackend,
    pub mongo_uri: String,
    pub mongo_database: String,
    pub jwt_secret: String,
    pub bind_addr: String,
    /// Messaging is disabled when no provider URL is configured
    pub whatsapp: Option<WhatsappSettings>,
}

const DEV_JWT_SECRET: &str = "dev-secret-only-for-local-testing";

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Root .env first, then the crate-local one
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            dotenvy::dotenv().ok();
        }

        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // config/*.toml + ENV overrides (prefix APP__)
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", app_env)).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let store_backend = match settings
            .get_string("store.backend")
            .or_else(|_| env::var("APP_STORE"))
            .unwrap_or_else(|_| "mongo".to_string())
            .to_lowercase()
            .as_str()
        {
            "memory" => StoreBackend::Memory,
            "mongo" | "mongodb" => StoreBackend::Mongo,
            other => {
                return Err(config::ConfigError::Message(format!(
                    "Unknown store backend: {}",
                    other
                )))
            }
        };

        let mongo_uri = settings
            .get_string("database.mongo_uri")
            .or_else(|_| env::var("MONGO_URI"))
            .unwrap_or_else(|_| "mongodb://localhost:27017".to_string());

        let mongo_database = settings
            .get_string("database.mongo_database")
            .or_else(|_| env::var("MONGO_DATABASE"))
            .unwrap_or_else(|_| "classroom".to_string());

        let jwt_secret = match settings
            .get_string("auth.jwt_secret")
            .or_else(|_| env::var("JWT_SECRET"))
        {
            Ok(secret) => secret,
            Err(_) if app_env == "prod" => {
                return Err(config::ConfigError::Message(
                    "JWT_SECRET must be set in production".to_string(),
                ))
            }
            Err(_) => {
                tracing::warn!("Using default JWT_SECRET (dev mode only!)");
                DEV_JWT_SECRET.to_string()
            }
        };

        let bind_addr = settings
            .get_string("server.bind_addr")
            .or_else(|_| env::var("BIND_ADDR"))
            .unwrap_or_else(|_| "0.0.0.0:8081".to_string());

        let whatsapp = settings
            .get_string("whatsapp.api_url")
            .or_else(|_| env::var("WHATSAPP_API_URL"))
            .ok()
            .map(|api_url| WhatsappSettings {
                api_url,
                api_key: settings
                    .get_string("whatsapp.api_key")
                    .or_else(|_| env::var("WHATSAPP_API_KEY"))
                    .ok(),
                timeout_secs: settings
                    .get_int("whatsapp.timeout_secs")
                    .ok()
                    .map(|v| v as u64)
                    .or_else(|| {
                        env::var("WHATSAPP_TIMEOUT_SECS")
                            .ok()
                            .and_then(|v| v.parse().ok())
                    })
                    .unwrap_or(30),
                session_id: settings
                    .get_string("whatsapp.session_id")
                    .or_else(|_| env::var("WHATSAPP_SESSION_ID"))
                    .unwrap_or_else(|_| "classroom".to_string()),
            });

        Ok(Config {
            store_backend,
            mongo_uri,
            mongo_database,
            jwt_secret,
            bind_addr,
            whatsapp,
        })
    }

    /// Configuration for tests and local runs without a database
    pub fn in_memory(jwt_secret: &str) -> Self {
        Config {
            store_backend: StoreBackend::Memory,
            mongo_uri: String::new(),
            mongo_database: String::new(),
            jwt_secret: jwt_secret.to_string(),
            bind_addr: "127.0.0.1:0".to_string(),
            whatsapp: None,
        }
    }
}
