//! Centralized configuration for api-server.
//!
//! All environment variables are loaded and validated at startup to fail fast
//! on misconfiguration rather than at request time.

use axum::http::HeaderValue;
use domain::DocumentId;
use std::env;
use std::fmt;
use std::path::PathBuf;

/// Storage backend provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageProvider {
    /// In-memory storage (data lost on restart)
    Memory,
    /// SQLite file-based storage
    Sqlite,
    /// Hosted Firestore database
    Firestore,
}

impl StorageProvider {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Some(Self::Memory),
            "sqlite" => Some(Self::Sqlite),
            "firestore" => Some(Self::Firestore),
            _ => None,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub struct ConfigError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Configuration error for {}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Server configuration loaded from environment variables.
///
/// All fields are validated at construction time.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port (default: 3001)
    pub port: u16,
    /// CORS allow origin
    pub cors_allow_origin: HeaderValue,
    /// Storage provider
    pub storage_provider: StorageProvider,
    /// SQLite database path (when using sqlite storage)
    pub db_path: Option<PathBuf>,
    /// Firestore project (required when using firestore storage)
    pub firestore_project_id: Option<String>,
    /// Log format
    pub log_format: LogFormat,
    /// List written to when a client does not name one
    pub default_list_id: DocumentId,
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// Fails fast on invalid configuration.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| env::var(k).ok())
    }

    fn from_lookup<F: Fn(&str) -> Option<String>>(var: F) -> Result<Self, ConfigError> {
        // Port
        let port = match var("PORT") {
            Some(s) => s.parse().map_err(|_| ConfigError {
                field: "PORT",
                message: format!("'{}' is not a valid port", s),
            })?,
            None => 3001,
        };

        // CORS allow origin
        let cors_origin_str = var("CORS_ALLOW_ORIGIN").unwrap_or_else(|| "*".into());
        let cors_allow_origin = if cors_origin_str == "*" {
            HeaderValue::from_static("*")
        } else {
            HeaderValue::from_str(&cors_origin_str).map_err(|e| ConfigError {
                field: "CORS_ALLOW_ORIGIN",
                message: format!("Invalid header value '{}': {}", cors_origin_str, e),
            })?
        };

        // Storage provider
        let provider_str = var("STORAGE_PROVIDER").unwrap_or_else(|| "sqlite".into());
        let storage_provider =
            StorageProvider::parse(&provider_str).ok_or_else(|| ConfigError {
                field: "STORAGE_PROVIDER",
                message: format!(
                    "unknown provider '{}' (expected memory, sqlite or firestore)",
                    provider_str
                ),
            })?;

        let db_path = var("DB_PATH").map(PathBuf::from);

        let firestore_project_id = var("FIRESTORE_PROJECT_ID").filter(|s| !s.is_empty());
        if storage_provider == StorageProvider::Firestore && firestore_project_id.is_none() {
            return Err(ConfigError {
                field: "FIRESTORE_PROJECT_ID",
                message: "Required when STORAGE_PROVIDER=firestore".into(),
            });
        }

        // Log format
        let log_format = LogFormat::from_str(&var("LOG_FORMAT").unwrap_or_else(|| "pretty".into()));

        // Default list
        let default_list_raw = var("DEFAULT_LIST_ID").unwrap_or_else(|| "primeralista".into());
        let default_list_id = DocumentId::new(default_list_raw).map_err(|e| ConfigError {
            field: "DEFAULT_LIST_ID",
            message: e.to_string(),
        })?;

        Ok(Self {
            port,
            cors_allow_origin,
            storage_provider,
            db_path,
            firestore_project_id,
            log_format,
            default_list_id,
        })
    }

    /// Log warnings about configurations that lose data or fall back.
    pub fn warn_if_ephemeral(&self) {
        if self.storage_provider == StorageProvider::Memory {
            tracing::warn!(
                "STORAGE_PROVIDER=memory: shopping lists are kept in memory and lost on restart."
            );
        }
        if self.storage_provider == StorageProvider::Sqlite && !cfg!(feature = "sqlite") {
            tracing::warn!("STORAGE_PROVIDER=sqlite but the `sqlite` feature is disabled.");
        }
        if self.storage_provider == StorageProvider::Firestore && !cfg!(feature = "firestore") {
            tracing::warn!("STORAGE_PROVIDER=firestore but the `firestore` feature is disabled.");
        }
    }
}
