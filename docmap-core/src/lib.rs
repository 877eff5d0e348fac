//! Typed object to BSON document mapping, shared connection sessions and sequential
//! identifiers.
//!
//! This crate is the core of the docmap project and provides:
//!
//! - **Value model** ([`value`]) - The [`Mapped`](value::Mapped) trait every persisted field implements
//! - **Type descriptors** ([`descriptor`]) - Per-type field tables and the cache memoizing them
//! - **Codecs** ([`codec`]) - The document codec, the codec registry and the built-in codecs
//! - **Dispatch** ([`dispatch`]) - Routing of persistent types to the document codec
//! - **Entities** ([`entity`]) - Collection names and identifier policies
//! - **Store backend abstraction** ([`backend`]) - Traits for storage backends and connectors
//! - **Sessions and collections** ([`session`], [`collection`]) - Typed CRUD over a backend
//! - **Sequential identifiers** ([`sequence`]) - Optimistic allocation of integer identifiers
//! - **Connection registry** ([`registry`], [`config`]) - Publish-once clients and sessions
//! - **Error handling** ([`error`]) - Error types and result types
//!
//! # Example
//!
//! ```ignore
//! use docmap_core::{codec::CodecRegistry, descriptor::Persistent};
//! use docmap_macros::Persistent;
//!
//! #[derive(Debug, Default, PartialEq, Persistent)]
//! pub struct Address {
//!     pub street: String,
//!     #[bson(rename = "zip")]
//!     pub postal_code: String,
//! }
//!
//! let codecs = CodecRegistry::standard();
//! let document = codecs.encode(&Address::default())?;
//! let decoded: Address = codecs.decode(document)?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmap_core;

pub use bson;

pub mod backend;
pub mod codec;
pub mod collection;
pub mod config;
pub mod descriptor;
pub mod dispatch;
pub mod entity;
pub mod error;
pub mod page;
pub mod query;
pub mod registry;
pub mod sequence;
pub mod session;
pub mod value;
