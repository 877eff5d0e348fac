use async_trait::async_trait;
use bson::{Bson, Document};
use mea::rwlock::RwLock;
use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};
use tracing::trace;

use docmap_core::{
    backend::{StoreBackend, StoreBackendBuilder, StoreConnector},
    descriptor::ID_FIELD,
    error::{DocumentStoreError, DocumentStoreResult},
    query::Query,
};

use crate::evaluator::{Comparable, DocumentEvaluator};

type CollectionMap = HashMap<String, Vec<Document>>;
type DatabaseMap = HashMap<String, CollectionMap>;

/// Database name used by [`InMemoryStore::new`].
pub const DEFAULT_DATABASE: &str = "default";

/// In-process document server holding any number of databases.
///
/// Cloning a server shares its data. Stores opened on the same server and database name
/// see the same collections.
#[derive(Default, Clone, Debug)]
pub struct InMemoryServer {
    databases: Arc<RwLock<DatabaseMap>>,
}

impl InMemoryServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a store bound to `database`.
    pub fn database(&self, database: impl Into<String>) -> InMemoryStore {
        InMemoryStore {
            server: self.clone(),
            database: database.into(),
        }
    }

    /// Names of the databases holding at least one collection.
    pub async fn database_names(&self) -> Vec<String> {
        self.databases.read().await.keys().cloned().collect()
    }
}

/// In-memory implementation of [`StoreBackend`] for one database.
///
/// Documents keep their insertion order, and `_id` values are unique per collection, with
/// numeric identifiers compared by value. Intended for tests and local development.
///
/// # Example
///
/// ```ignore
/// use docmap_memory::InMemoryStore;
/// use docmap_core::backend::StoreBackend;
/// use bson::doc;
///
/// let store = InMemoryStore::new();
/// store.insert_document("users", doc! { "_id": 1, "name": "Alice" }).await?;
/// ```
#[derive(Clone, Debug)]
pub struct InMemoryStore {
    server: InMemoryServer,
    database: String,
}

impl InMemoryStore {
    /// Creates a store on a fresh private server.
    pub fn new() -> Self {
        InMemoryServer::new().database(DEFAULT_DATABASE)
    }

    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn server(&self) -> &InMemoryServer {
        &self.server
    }

    /// Names of the collections in this store's database.
    pub async fn collection_names(&self) -> Vec<String> {
        self.server
            .databases
            .read()
            .await
            .get(&self.database)
            .map(|collections| collections.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn document_id<'a>(document: &'a Document, collection: &str) -> DocumentStoreResult<&'a Bson> {
    document.get(ID_FIELD).ok_or_else(|| {
        DocumentStoreError::InvalidDocument(format!("document written to {collection} has no {ID_FIELD} field"))
    })
}

fn position_of(documents: &[Document], id: &Bson) -> Option<usize> {
    let id = Comparable::from(id);

    documents
        .iter()
        .position(|document| document.get(ID_FIELD).is_some_and(|stored| Comparable::from(stored) == id))
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn insert_document(&self, collection: &str, document: Document) -> DocumentStoreResult<()> {
        let id = document_id(&document, collection)?.clone();

        let mut databases = self.server.databases.write().await;
        let documents = databases
            .entry(self.database.clone())
            .or_default()
            .entry(collection.to_string())
            .or_default();

        if position_of(documents, &id).is_some() {
            return Err(DocumentStoreError::DocumentAlreadyExists(
                id.to_string(),
                collection.to_string(),
            ));
        }

        trace!(database = %self.database, collection, id = %id, "inserting document");
        documents.push(document);
        Ok(())
    }

    async fn replace_document(&self, collection: &str, document: Document, upsert: bool) -> DocumentStoreResult<bool> {
        let id = document_id(&document, collection)?.clone();

        let mut databases = self.server.databases.write().await;
        let documents = databases
            .entry(self.database.clone())
            .or_default()
            .entry(collection.to_string())
            .or_default();

        match position_of(documents, &id) {
            Some(position) => {
                documents[position] = document;
                Ok(true)
            }
            None if upsert => {
                documents.push(document);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_document(&self, collection: &str, id: &Bson) -> DocumentStoreResult<bool> {
        let mut databases = self.server.databases.write().await;
        let Some(documents) = databases
            .get_mut(&self.database)
            .and_then(|collections| collections.get_mut(collection))
        else {
            return Ok(false);
        };

        match position_of(documents, id) {
            Some(position) => {
                documents.remove(position);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_documents(&self, collection: &str, query: &Query) -> DocumentStoreResult<u64> {
        let mut databases = self.server.databases.write().await;
        let Some(documents) = databases
            .get_mut(&self.database)
            .and_then(|collections| collections.get_mut(collection))
        else {
            return Ok(0);
        };

        let evaluator = DocumentEvaluator::new(query);
        let before = documents.len();
        documents.retain(|document| !evaluator.matches(document));

        Ok((before - documents.len()) as u64)
    }

    async fn get_document(&self, collection: &str, id: &Bson) -> DocumentStoreResult<Option<Document>> {
        let databases = self.server.databases.read().await;

        Ok(databases
            .get(&self.database)
            .and_then(|collections| collections.get(collection))
            .and_then(|documents| position_of(documents, id).map(|position| documents[position].clone())))
    }

    async fn find_documents(&self, collection: &str, query: &Query) -> DocumentStoreResult<Vec<Document>> {
        let databases = self.server.databases.read().await;

        Ok(databases
            .get(&self.database)
            .and_then(|collections| collections.get(collection))
            .map(|documents| DocumentEvaluator::new(query).evaluate(documents))
            .unwrap_or_default())
    }

    async fn count_documents(&self, collection: &str, query: &Query) -> DocumentStoreResult<u64> {
        let databases = self.server.databases.read().await;

        let count = databases
            .get(&self.database)
            .and_then(|collections| collections.get(collection))
            .map(|documents| DocumentEvaluator::new(query).count(documents))
            .unwrap_or(0);

        Ok(count as u64)
    }

    async fn drop_collection(&self, collection: &str) -> DocumentStoreResult<()> {
        if let Some(collections) = self.server.databases.write().await.get_mut(&self.database) {
            collections.remove(collection);
        }
        Ok(())
    }
}

/// Builder for [`InMemoryStore`].
#[derive(Default, Debug)]
pub struct InMemoryStoreBuilder {
    server: Option<InMemoryServer>,
    database: Option<String>,
}

impl InMemoryStoreBuilder {
    /// Opens the store on an existing server instead of a fresh one.
    pub fn server(mut self, server: InMemoryServer) -> Self {
        self.server = Some(server);
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        Ok(self
            .server
            .unwrap_or_default()
            .database(self.database.unwrap_or_else(|| DEFAULT_DATABASE.to_string())))
    }
}

/// Connector creating one [`InMemoryServer`] per connection string.
///
/// Every call to `connect` builds a new server. The registry keeps only the one it
/// publishes, so stores opened through the registry on the same connection string share
/// data. [`connections`](Self::connections) reports how many servers were built in total,
/// including discarded race losers.
#[derive(Default, Debug)]
pub struct InMemoryConnector {
    connections: AtomicUsize,
}

impl InMemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times `connect` was called.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StoreConnector for InMemoryConnector {
    type Client = InMemoryServer;
    type Backend = InMemoryStore;

    async fn connect(&self, connection_string: &str) -> DocumentStoreResult<Self::Client> {
        self.connections.fetch_add(1, Ordering::SeqCst);
        trace!(connection_string, "creating in-memory server");
        Ok(InMemoryServer::new())
    }

    fn open(&self, client: &Arc<Self::Client>, database: &str) -> DocumentStoreResult<Self::Backend> {
        Ok(client.database(database))
    }
}
