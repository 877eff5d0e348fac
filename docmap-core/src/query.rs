//! Minimal query description understood by every backend.
//!
//! A [`Query`] is an equality filter document plus optional projection, single-field sort,
//! limit and offset. Richer query languages are left to the underlying driver.
//!
//! # Example
//!
//! ```
//! use docmap_core::query::{Query, SortDirection};
//! use bson::doc;
//!
//! let query = Query::builder()
//!     .filter(doc! { "team": "blue" })
//!     .sort("_id", SortDirection::Desc)
//!     .limit(1)
//!     .build();
//!
//! assert_eq!(query.limit, Some(1));
//! ```

use bson::{Bson, Document};

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Sort specification for a single field.
#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

/// A query against one collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    /// Every key must equal the given value in matching documents.
    pub filter: Document,
    /// Top-level fields to return. `None` returns whole documents.
    pub projection: Option<Vec<String>>,
    pub sort: Option<Sort>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> QueryBuilder {
        QueryBuilder::new()
    }

    /// Matches every document whose `field` equals `value`.
    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::builder().eq(field, value).build()
    }
}

/// Builder for [`Query`].
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the filter document.
    pub fn filter(mut self, filter: Document) -> Self {
        self.query.filter = filter;
        self
    }

    /// Adds one equality condition to the filter.
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.query.filter.insert(field.into(), value.into());
        self
    }

    pub fn project<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query.projection = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.query.sort = Some(Sort { field: field.into(), direction });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.query.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.query.offset = Some(offset);
        self
    }

    pub fn build(self) -> Query {
        self.query
    }
}
