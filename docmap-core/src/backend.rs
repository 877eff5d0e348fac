//! Storage backend abstraction.
//!
//! The [`StoreBackend`] trait is the async interface a session uses to move wire documents
//! in and out of one database. Implementations must be thread-safe and must enforce
//! uniqueness of the `_id` key within a collection, reporting violations as
//! [`DocumentStoreError::DocumentAlreadyExists`](crate::error::DocumentStoreError::DocumentAlreadyExists).
//! The sequential identifier allocator relies on that conflict to detect races.
//!
//! [`StoreConnector`] is the factory the connection registry uses to build client handles
//! from connection strings and database handles from clients.
//!
//! # Example
//!
//! ```ignore
//! use docmap_core::backend::StoreBackend;
//! use bson::doc;
//!
//! backend.insert_document("users", doc! { "_id": 1, "name": "Alice" }).await?;
//! let found = backend.get_document("users", &1.into()).await?;
//! ```

use async_trait::async_trait;
use bson::{Bson, Document};
use std::{fmt::Debug, sync::Arc};

use crate::{error::DocumentStoreResult, query::Query};

/// Abstract interface for one database of a document store.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Inserts a document that already carries its `_id`.
    ///
    /// # Errors
    ///
    /// Returns `DocumentAlreadyExists` if the collection already holds a document with the
    /// same `_id`.
    async fn insert_document(&self, collection: &str, document: Document) -> DocumentStoreResult<()>;

    /// Replaces the document with the same `_id`.
    ///
    /// With `upsert` the document is inserted when missing. Returns `true` if a document
    /// was replaced or inserted.
    async fn replace_document(&self, collection: &str, document: Document, upsert: bool) -> DocumentStoreResult<bool>;

    /// Deletes a document by `_id`, returning `true` if one was removed.
    async fn delete_document(&self, collection: &str, id: &Bson) -> DocumentStoreResult<bool>;

    /// Deletes every document matching the query filter and returns how many were removed.
    /// Sort, limit and offset are ignored.
    async fn delete_documents(&self, collection: &str, query: &Query) -> DocumentStoreResult<u64>;

    async fn get_document(&self, collection: &str, id: &Bson) -> DocumentStoreResult<Option<Document>>;

    async fn find_documents(&self, collection: &str, query: &Query) -> DocumentStoreResult<Vec<Document>>;

    /// Counts documents matching the query filter. Sort, limit and offset are ignored.
    async fn count_documents(&self, collection: &str, query: &Query) -> DocumentStoreResult<u64>;

    async fn drop_collection(&self, collection: &str) -> DocumentStoreResult<()>;

    async fn shutdown(self) -> DocumentStoreResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

#[async_trait]
impl<B> StoreBackend for Arc<B>
where
    B: StoreBackend,
{
    async fn insert_document(&self, collection: &str, document: Document) -> DocumentStoreResult<()> {
        (**self).insert_document(collection, document).await
    }

    async fn replace_document(&self, collection: &str, document: Document, upsert: bool) -> DocumentStoreResult<bool> {
        (**self).replace_document(collection, document, upsert).await
    }

    async fn delete_document(&self, collection: &str, id: &Bson) -> DocumentStoreResult<bool> {
        (**self).delete_document(collection, id).await
    }

    async fn delete_documents(&self, collection: &str, query: &Query) -> DocumentStoreResult<u64> {
        (**self).delete_documents(collection, query).await
    }

    async fn get_document(&self, collection: &str, id: &Bson) -> DocumentStoreResult<Option<Document>> {
        (**self).get_document(collection, id).await
    }

    async fn find_documents(&self, collection: &str, query: &Query) -> DocumentStoreResult<Vec<Document>> {
        (**self).find_documents(collection, query).await
    }

    async fn count_documents(&self, collection: &str, query: &Query) -> DocumentStoreResult<u64> {
        (**self).count_documents(collection, query).await
    }

    async fn drop_collection(&self, collection: &str) -> DocumentStoreResult<()> {
        (**self).drop_collection(collection).await
    }
}

/// Builder for creating backend instances.
#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> DocumentStoreResult<Self::Backend>;
}

/// Opens clients and databases for the connection registry.
///
/// `connect` may be called concurrently for the same connection string. Only one of the
/// resulting clients is kept; the others are dropped.
#[async_trait]
pub trait StoreConnector: Send + Sync + Debug {
    /// Client handle shared by every session on the same connection string.
    type Client: Send + Sync + Debug + 'static;
    /// Database handle used by a session.
    type Backend: StoreBackend + 'static;

    async fn connect(&self, connection_string: &str) -> DocumentStoreResult<Self::Client>;

    fn open(&self, client: &Arc<Self::Client>, database: &str) -> DocumentStoreResult<Self::Backend>;
}
