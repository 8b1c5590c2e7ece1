//! Configuration handling for the report runner
//!
//! Settings come from an optional `bookstore-reports.toml` file, then
//! environment variables (optionally loaded from a `.env` file), then
//! command-line flags.
//!
//! ## Environment Variables
//!
//! - `BOOKSTORE_URI` - Connection string of the document store
//! - `BOOKSTORE_DATABASE` - Database holding the collection
//! - `BOOKSTORE_COLLECTION` - Collection to report on

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ReportError, ReportResult};

/// Configuration file name
pub const CONFIG_FILE_NAME: &str = "bookstore-reports.toml";

/// Environment variable names
pub const ENV_URI: &str = "BOOKSTORE_URI";
pub const ENV_DATABASE: &str = "BOOKSTORE_DATABASE";
pub const ENV_COLLECTION: &str = "BOOKSTORE_COLLECTION";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Store connection string
    #[serde(default = "default_uri")]
    pub uri: String,
    /// Database name
    #[serde(default = "default_database")]
    pub database: String,
    /// Collection name
    #[serde(default = "default_collection")]
    pub collection: String,
}

fn default_uri() -> String {
    "mongodb://localhost:27017".to_string()
}

fn default_database() -> String {
    "plp_bookstore".to_string()
}

fn default_collection() -> String {
    "books".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            database: default_database(),
            collection: default_collection(),
        }
    }
}

impl Config {
    /// Load configuration.
    ///
    /// Reads `path` when given (it must exist), otherwise
    /// `bookstore-reports.toml` in `dir` if present, otherwise defaults. A
    /// `.env` file in `dir` is loaded first and environment overrides are
    /// applied last.
    pub fn load(dir: &Path, path: Option<&Path>) -> ReportResult<Self> {
        let env_path = dir.join(".env");
        if env_path.exists() {
            if let Err(e) = dotenvy::from_path(&env_path) {
                tracing::warn!("Ignoring unreadable {}: {}", env_path.display(), e);
            }
        }

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = dir.join(CONFIG_FILE_NAME);
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> ReportResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ReportError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| ReportError::Config(format!("{}: {}", path.display(), e)))?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        if let Ok(uri) = std::env::var(ENV_URI) {
            if !uri.is_empty() {
                self.uri = uri;
            }
        }

        if let Ok(database) = std::env::var(ENV_DATABASE) {
            if !database.is_empty() {
                self.database = database;
            }
        }

        if let Ok(collection) = std::env::var(ENV_COLLECTION) {
            if !collection.is_empty() {
                self.collection = collection;
            }
        }
    }

    pub fn validate(&self) -> ReportResult<()> {
        if self.uri.trim().is_empty() {
            return Err(ReportError::Config("uri must not be empty".to_string()));
        }
        if self.database.is_empty() || self.database.contains(['/', '\\', '.', ' ', '"', '$']) {
            return Err(ReportError::Config(format!(
                "invalid database name '{}'",
                self.database
            )));
        }
        if self.collection.is_empty() || self.collection.starts_with("system.") || self.collection.contains('$') {
            return Err(ReportError::Config(format!(
                "invalid collection name '{}'",
                self.collection
            )));
        }
        Ok(())
    }

    /// Save configuration to a directory
    pub fn save(&self, dir: &Path) -> ReportResult<()> {
        let config_path = dir.join(CONFIG_FILE_NAME);
        let content = toml::to_string_pretty(self)
            .map_err(|e| ReportError::Config(e.to_string()))?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }
}
