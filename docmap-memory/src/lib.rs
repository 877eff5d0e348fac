//! In-memory backend for docmap.
//!
//! - [`InMemoryStore`] implements [`StoreBackend`](docmap_core::backend::StoreBackend) for one
//!   database, enforcing unique `_id` values per collection.
//! - [`InMemoryServer`] holds the databases of one simulated deployment.
//! - [`InMemoryConnector`] lets a
//!   [`ConnectionRegistry`](docmap_core::registry::ConnectionRegistry) open in-memory
//!   sessions, which is how the registry and the sequential allocator are tested.

#[allow(unused_extern_crates)]
extern crate self as docmap_memory;

mod evaluator;
pub mod store;

pub use store::{DEFAULT_DATABASE, InMemoryConnector, InMemoryServer, InMemoryStore, InMemoryStoreBuilder};
