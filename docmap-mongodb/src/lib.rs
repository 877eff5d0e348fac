//! MongoDB backend implementation for docmap.
//!
//! This crate provides a MongoDB-based implementation of the `StoreBackend` trait and a
//! `StoreConnector` for the connection registry. Wire documents produced by the codecs are
//! written as they are; filters, sorting and projections are handed to the server.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! docmap = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Example
//!
//! ```ignore
//! use docmap::{mongodb::MongoConnector, registry::ConnectionRegistry};
//!
//! let registry = ConnectionRegistry::new(MongoConnector, settings);
//! let session = registry.session("main", Some("my_database")).await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmap_mongodb;

pub mod store;

pub use store::{MongoConnector, MongoDbStore, MongoDbStoreBuilder};
