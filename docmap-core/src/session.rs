//! Sessions: one database of one client, plus the codecs used to talk to it.

use bson::Document;
use std::sync::Arc;

use crate::{
    backend::StoreBackend,
    codec::CodecRegistry,
    collection::TypedCollection,
    descriptor::Persistent,
    entity::Entity,
    error::DocumentStoreResult,
    sequence::SequentialIdAllocator,
};

/// A database handle bound to a codec registry.
///
/// Sessions are cheap to share: the [`ConnectionRegistry`](crate::registry::ConnectionRegistry)
/// hands out one `Arc<Session>` per configuration and database name. Nothing in a session
/// is mutated after construction.
#[derive(Debug)]
pub struct Session<B: StoreBackend> {
    backend: B,
    codecs: Arc<CodecRegistry>,
    allocator: SequentialIdAllocator,
    database: String,
}

impl<B: StoreBackend> Session<B> {
    pub fn new(backend: B, codecs: Arc<CodecRegistry>, database: impl Into<String>) -> Self {
        Self {
            backend,
            codecs,
            allocator: SequentialIdAllocator::default(),
            database: database.into(),
        }
    }

    /// Replaces the allocator used for sequential identifiers.
    pub fn with_allocator(mut self, allocator: SequentialIdAllocator) -> Self {
        self.allocator = allocator;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn codecs(&self) -> &Arc<CodecRegistry> {
        &self.codecs
    }

    pub fn allocator(&self) -> &SequentialIdAllocator {
        &self.allocator
    }

    /// Name of the database this session is bound to.
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Typed access to the collection of `E`.
    pub fn collection<E: Entity>(&self) -> TypedCollection<'_, B, E> {
        TypedCollection::new(self)
    }

    pub fn encode<T: Persistent>(&self, instance: &T) -> DocumentStoreResult<Document> {
        self.codecs.encode(instance)
    }

    pub fn decode<T: Persistent>(&self, document: Document) -> DocumentStoreResult<T> {
        self.codecs.decode(document)
    }

    pub async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.backend.drop_collection(name).await
    }

    pub async fn shutdown(self) -> DocumentStoreResult<()> {
        self.backend.shutdown().await
    }
}
