//! Convenient re-exports of commonly used types from docmap.
//!
//! Import this prelude module to quickly access the most frequently used types
//! and traits without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use docmap::prelude::*;
//! ```

pub use docmap_core::{
    backend::{StoreBackend, StoreBackendBuilder, StoreConnector},
    codec::{Codec, CodecRegistry, CodecRegistryBuilder, DocumentCodec, ValueCodec},
    collection::TypedCollection,
    config::{ConnectionSettings, ConnectionSource, DatabaseSettings},
    descriptor::{Persistent, TypeDescriptor, TypeDescriptorCache},
    dispatch::CodecDispatcher,
    entity::{Entity, IdPolicy},
    error::{DocumentStoreError, DocumentStoreResult},
    page::{Page, PaginationParams},
    query::{Query, QueryBuilder, Sort, SortDirection},
    registry::ConnectionRegistry,
    sequence::SequentialIdAllocator,
    session::Session,
    value::{Mapped, TypeKey},
};
pub use docmap_macros::{Entity, Persistent};
