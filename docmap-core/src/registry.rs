//! Process-wide memoization of client and session handles.
//!
//! A [`ConnectionRegistry`] keeps at most one client per normalized connection string and
//! at most one session per configuration and database name. Handles are published once
//! and never evicted.
//!
//! Construction happens outside the map lock. Two callers missing on the same key at the
//! same time both build a candidate; the first to take the write lock publishes its own,
//! and the other drops its candidate and returns the published handle. Contention costs a
//! redundant construction, never a second observable handle.
//!
//! # Example
//!
//! ```ignore
//! use docmap_core::{config::ConnectionSettings, registry::ConnectionRegistry};
//!
//! let settings = ConnectionSettings::from_json(&json)?;
//! let registry = ConnectionRegistry::new(MongoConnector::default(), settings);
//!
//! let session = registry.session("main", Some("shop")).await?;
//! let orders = session.collection::<Order>();
//! ```

use mea::rwlock::RwLock;
use std::{collections::HashMap, fmt, hash::Hash, sync::Arc};
use tracing::debug;

use crate::{
    backend::StoreConnector,
    codec::CodecRegistry,
    config::{ConnectionSource, database_from_connection_string, normalize_connection_string},
    error::{DocumentStoreError, DocumentStoreResult},
    sequence::SequentialIdAllocator,
    session::Session,
};

type SessionKey = (String, String);

/// Memoizes clients by connection string and sessions by configuration and database name.
pub struct ConnectionRegistry<C: StoreConnector> {
    connector: C,
    source: Arc<dyn ConnectionSource>,
    codecs: Arc<CodecRegistry>,
    allocator: SequentialIdAllocator,
    clients: RwLock<HashMap<String, Arc<C::Client>>>,
    sessions: RwLock<HashMap<SessionKey, Arc<Session<C::Backend>>>>,
}

impl<C: StoreConnector> ConnectionRegistry<C> {
    /// Creates a registry whose sessions use [`CodecRegistry::standard`].
    pub fn new(connector: C, source: impl ConnectionSource + 'static) -> Self {
        Self::builder(connector, source).build()
    }

    pub fn builder(connector: C, source: impl ConnectionSource + 'static) -> ConnectionRegistryBuilder<C> {
        ConnectionRegistryBuilder {
            connector,
            source: Arc::new(source),
            codecs: None,
            allocator: SequentialIdAllocator::default(),
        }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn codecs(&self) -> &Arc<CodecRegistry> {
        &self.codecs
    }

    /// Returns the client for `connection_string`, connecting on first use.
    ///
    /// Connection strings without a scheme are normalized first, so `host:27017` and
    /// `mongodb://host:27017` share a client.
    pub async fn client(&self, connection_string: &str) -> DocumentStoreResult<Arc<C::Client>> {
        let key = normalize_connection_string(connection_string);

        let cached = self.clients.read().await.get(&key).cloned();
        if let Some(client) = cached {
            return Ok(client);
        }

        let candidate = Arc::new(self.connector.connect(&key).await?);
        Ok(publish(&self.clients, key, candidate, "client").await)
    }

    /// Returns the session for a configuration name and database, opening it on first use.
    ///
    /// Without an explicit database the configuration's default database is used, then the
    /// database named in the connection string path.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Configuration`] if the configuration name is unknown
    /// or no database name can be determined.
    pub async fn session(
        &self,
        config: &str,
        database: Option<&str>,
    ) -> DocumentStoreResult<Arc<Session<C::Backend>>> {
        let connection_string = self
            .source
            .connection_string(config)
            .ok_or_else(|| DocumentStoreError::Configuration(format!("no connection is configured under {config}")))?;

        let database = match database {
            Some(database) => database.to_string(),
            None => self
                .source
                .default_database(config)
                .or_else(|| database_from_connection_string(&connection_string))
                .ok_or_else(|| {
                    DocumentStoreError::Configuration(format!("no database name given or configured for {config}"))
                })?,
        };
        let key = (config.to_string(), database);

        let cached = self.sessions.read().await.get(&key).cloned();
        if let Some(session) = cached {
            return Ok(session);
        }

        let client = self.client(&connection_string).await?;
        let backend = self.connector.open(&client, &key.1)?;
        let candidate = Arc::new(
            Session::new(backend, self.codecs.clone(), key.1.clone()).with_allocator(self.allocator),
        );

        Ok(publish(&self.sessions, key, candidate, "session").await)
    }

    /// Number of distinct clients published so far.
    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Number of distinct sessions published so far.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// Publishes `candidate` under `key` unless a handle is already there, and returns the
/// handle that ends up published.
async fn publish<K, V>(map: &RwLock<HashMap<K, Arc<V>>>, key: K, candidate: Arc<V>, kind: &'static str) -> Arc<V>
where
    K: Eq + Hash,
{
    let mut published = map.write().await;
    let winner = published.entry(key).or_insert_with(|| candidate.clone()).clone();

    if !Arc::ptr_eq(&winner, &candidate) {
        debug!(kind, "discarding candidate handle; another caller published first");
    }

    winner
}

impl<C: StoreConnector> fmt::Debug for ConnectionRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connector", &self.connector)
            .field("source", &self.source)
            .field("allocator", &self.allocator)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ConnectionRegistry`].
pub struct ConnectionRegistryBuilder<C: StoreConnector> {
    connector: C,
    source: Arc<dyn ConnectionSource>,
    codecs: Option<Arc<CodecRegistry>>,
    allocator: SequentialIdAllocator,
}

impl<C: StoreConnector> ConnectionRegistryBuilder<C> {
    /// Codecs shared by every session of the registry.
    pub fn codecs(mut self, codecs: CodecRegistry) -> Self {
        self.codecs = Some(Arc::new(codecs));
        self
    }

    /// Insert attempts allowed per sequential identifier allocation.
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.allocator = SequentialIdAllocator::new(max_attempts);
        self
    }

    pub fn build(self) -> ConnectionRegistry<C> {
        ConnectionRegistry {
            connector: self.connector,
            source: self.source,
            codecs: self.codecs.unwrap_or_else(|| Arc::new(CodecRegistry::standard())),
            allocator: self.allocator,
            clients: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
        }
    }
}

impl<C: StoreConnector> fmt::Debug for ConnectionRegistryBuilder<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistryBuilder")
            .field("connector", &self.connector)
            .field("allocator", &self.allocator)
            .finish_non_exhaustive()
    }
}
