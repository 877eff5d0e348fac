//! Connection configuration.
//!
//! The registry resolves configuration names to connection strings through a
//! [`ConnectionSource`]. Loading the configuration itself (files, environment, profiles) is
//! left to the application; [`ConnectionSettings`] covers the common case of a JSON list of
//! named databases.
//!
//! ```
//! use docmap_core::config::{ConnectionSettings, ConnectionSource};
//!
//! let settings = ConnectionSettings::from_json(
//!     r#"{ "databases": [ { "name": "main", "url": "localhost:27017/shop" } ] }"#,
//! ).unwrap();
//!
//! assert_eq!(
//!     settings.connection_string("main").as_deref(),
//!     Some("mongodb://localhost:27017/shop"),
//! );
//! ```

use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt::Debug};

use crate::error::DocumentStoreResult;

/// Scheme assumed for connection strings that do not name one.
pub const DEFAULT_SCHEME: &str = "mongodb://";

/// Resolves configuration names to connection strings.
pub trait ConnectionSource: Send + Sync + Debug {
    fn connection_string(&self, name: &str) -> Option<String>;

    /// Database used when a session is requested without one.
    fn default_database(&self, _name: &str) -> Option<String> {
        None
    }
}

impl ConnectionSource for HashMap<String, String> {
    fn connection_string(&self, name: &str) -> Option<String> {
        self.get(name).map(|url| normalize_connection_string(url))
    }
}

/// One named database connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
}

/// A list of named database connections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    #[serde(default)]
    pub databases: Vec<DatabaseSettings>,
}

impl ConnectionSettings {
    pub fn from_json(json: &str) -> DocumentStoreResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn get(&self, name: &str) -> Option<&DatabaseSettings> {
        self.databases.iter().find(|settings| settings.name == name)
    }
}

impl ConnectionSource for ConnectionSettings {
    fn connection_string(&self, name: &str) -> Option<String> {
        self.get(name).map(|settings| normalize_connection_string(&settings.url))
    }

    fn default_database(&self, name: &str) -> Option<String> {
        self.get(name).and_then(|settings| settings.database.clone())
    }
}

/// Trims the connection string and prefixes [`DEFAULT_SCHEME`] when no scheme is given.
pub fn normalize_connection_string(connection_string: &str) -> String {
    let trimmed = connection_string.trim();

    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("{DEFAULT_SCHEME}{trimmed}")
    }
}

/// Extracts the database name from the path of a connection string, if it has one.
pub fn database_from_connection_string(connection_string: &str) -> Option<String> {
    let rest = connection_string
        .split_once("://")
        .map_or(connection_string, |(_, rest)| rest);
    let (_, path) = rest.split_once('/')?;
    let database = path.split(['?', '/']).next().unwrap_or_default();

    (!database.is_empty()).then(|| database.to_string())
}
