//! Main docmap crate providing a unified interface for typed document mapping.
//!
//! This crate is the primary entry point for users of the docmap framework.
//! It re-exports the core types, the derive macros and the storage backends.
//!
//! # Features
//!
//! - **Typed mapping** - Derive `Persistent` and get a document codec for the type
//! - **Codec registry** - Built-in codecs for scalars, temporal types and enums, with room for your own
//! - **Shared sessions** - A connection registry publishing one client and session per name
//! - **Sequential identifiers** - Optimistic integer identifier allocation with bounded retries
//!
//! The derives expand to paths under `docmap_core` unless told otherwise. Crates that only
//! depend on `docmap` point them here with `#[persistent(crate = docmap)]` and
//! `#[entity(crate = docmap)]`.
//!
//! # Quick Start
//!
//! ```ignore
//! use docmap::{prelude::*, memory::{InMemoryConnector}};
//! use std::collections::HashMap;
//!
//! #[derive(Debug, Default, Clone, Persistent, Entity)]
//! #[persistent(crate = docmap)]
//! #[entity(collection = "people", sequential, crate = docmap)]
//! pub struct Person {
//!     #[bson(id)]
//!     pub id: Option<i32>,
//!     pub name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> DocumentStoreResult<()> {
//!     let settings = HashMap::from([("main".to_string(), "localhost/app".to_string())]);
//!     let registry = ConnectionRegistry::new(InMemoryConnector::new(), settings);
//!     let session = registry.session("main", None).await?;
//!
//!     let mut person = Person { id: None, name: "Alice".into() };
//!     session.collection::<Person>().insert(&mut person).await?;
//!     assert_eq!(person.id, Some(1));
//!
//!     Ok(())
//! }
//! ```
//!
//! # Backends
//!
//! - [`memory`] - Fast in-memory storage for development and testing
//! - [`mongodb`] - Persistent MongoDB backend (requires `mongodb` feature)

pub mod prelude;

pub use docmap_core::{
    backend, codec, collection, config, descriptor, dispatch, entity, error, mapped_value, page, query, registry,
    sequence, session, value,
};
pub use docmap_macros::{Entity, Persistent};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use docmap_memory::{DEFAULT_DATABASE, InMemoryConnector, InMemoryServer, InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docmap_mongodb::{MongoConnector, MongoDbStore, MongoDbStoreBuilder};
}
