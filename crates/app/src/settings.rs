//! Handles settings for the application.
//!
//! Values come from an optional `splitledger` settings file (any format the
//! `config` crate understands) overridden by `SPLITLEDGER_*` environment
//! variables, e.g. `SPLITLEDGER_DATABASE=memory`.
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

const DEFAULT_SETTINGS_FILE: &str = "splitledger";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Database {
    Memory,
    Sqlite(String),
}

impl Database {
    /// `memory` selects an in-memory database; anything else is a sqlite
    /// file path.
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "memory" | ":memory:" => Self::Memory,
            path => Self::Sqlite(path.to_string()),
        }
    }

    pub fn url(&self) -> String {
        match self {
            Database::Memory => String::from("sqlite::memory:"),
            Database::Sqlite(path) => format!("sqlite:{path}?mode=rwc"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// `memory` or a sqlite file path.
    pub database: String,
    pub level: String,
    /// Refresh the simplified-debt cache on a background task.
    pub background_cache_refresh: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: "./splitledger.db".to_string(),
            level: "info".to_string(),
            background_cache_refresh: false,
        }
    }
}

impl Settings {
    pub fn new(path: Option<&str>) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name(path.unwrap_or(DEFAULT_SETTINGS_FILE)).required(path.is_some()))
            .add_source(Environment::with_prefix("SPLITLEDGER").try_parsing(true))
            .build()?;

        settings.try_deserialize()
    }

    pub fn database(&self) -> Database {
        Database::parse(&self.database)
    }
}
