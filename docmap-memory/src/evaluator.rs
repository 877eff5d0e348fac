//! Filter, sort and projection evaluation for in-memory documents.

use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};
use std::{cmp::Ordering, collections::HashMap};

use docmap_core::query::{Query, SortDirection};

/// Comparable representation of BSON values.
///
/// Numeric types are normalized to `f64`, so `Int32(1)`, `Int64(1)` and `Double(1.0)`
/// compare equal. Values of different kinds order by kind, following the server's
/// comparison order.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Number(f64),
    String(&'a str),
    Map(HashMap<&'a str, Comparable<'a>>),
    Array(Vec<Comparable<'a>>),
    ObjectId(ObjectId),
    Bool(bool),
    DateTime(DateTime),
    Other(&'a Bson),
}

impl Comparable<'_> {
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Number(_) => 1,
            Comparable::String(_) => 2,
            Comparable::Map(_) => 3,
            Comparable::Array(_) => 4,
            Comparable::Other(_) => 5,
            Comparable::ObjectId(_) => 6,
            Comparable::Bool(_) => 7,
            Comparable::DateTime(_) => 8,
        }
    }
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(f64::from(*value)),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::Array(items) => Comparable::Array(items.iter().map(Comparable::from).collect()),
            Bson::Document(document) => Comparable::Map(
                document
                    .iter()
                    .map(|(key, value)| (key.as_str(), Comparable::from(value)))
                    .collect(),
            ),
            other => Comparable::Other(other),
        }
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            (Comparable::Other(a), Comparable::Other(b)) => a == b,
            _ => false,
        }
    }
}

impl Comparable<'_> {
    /// Total order used for sorting.
    ///
    /// Numbers order by `f64::total_cmp`, so NaN sorts after every other number. Maps
    /// compare entry by entry in key order, arrays element by element, and the longer
    /// value wins a tie.
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Ordering::Equal,
            (Comparable::Bool(a), Comparable::Bool(b)) => a.cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.total_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.bytes().cmp(&b.bytes()),
            (Comparable::Array(a), Comparable::Array(b)) => a
                .iter()
                .zip(b)
                .map(|(left, right)| left.total_cmp(right))
                .find(|ordering| ordering.is_ne())
                .unwrap_or_else(|| a.len().cmp(&b.len())),
            (Comparable::Map(a), Comparable::Map(b)) => {
                let (a, b) = (sorted_entries(a), sorted_entries(b));
                a.iter()
                    .zip(&b)
                    .map(|((left_key, left), (right_key, right))| {
                        left_key.cmp(right_key).then_with(|| left.total_cmp(right))
                    })
                    .find(|ordering| ordering.is_ne())
                    .unwrap_or_else(|| a.len().cmp(&b.len()))
            }
            (Comparable::Other(a), Comparable::Other(b)) => (a.element_type() as u8)
                .cmp(&(b.element_type() as u8))
                .then_with(|| a.to_string().cmp(&b.to_string())),
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }
}

fn sorted_entries<'m, 'a>(map: &'m HashMap<&'a str, Comparable<'a>>) -> Vec<(&'a str, &'m Comparable<'a>)> {
    let mut entries: Vec<_> = map.iter().map(|(key, value)| (*key, value)).collect();
    entries.sort_unstable_by_key(|(key, _)| *key);
    entries
}

/// Resolves a dotted path such as `address.city` inside a document.
fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;

    for segment in segments {
        current = current.as_document()?.get(segment)?;
    }

    Some(current)
}

/// Evaluates a [`Query`] against in-memory documents.
pub(crate) struct DocumentEvaluator<'q> {
    query: &'q Query,
}

impl<'q> DocumentEvaluator<'q> {
    pub fn new(query: &'q Query) -> Self {
        Self { query }
    }

    /// Returns `true` if every filter key equals the document's value at that path.
    ///
    /// A null filter value also matches a missing field.
    pub fn matches(&self, document: &Document) -> bool {
        self.query.filter.iter().all(|(path, expected)| {
            match lookup(document, path) {
                Some(actual) => Comparable::from(actual) == Comparable::from(expected),
                None => matches!(expected, Bson::Null),
            }
        })
    }

    /// Filters, sorts, skips, limits and projects `documents`, in that order.
    pub fn evaluate<'d>(&self, documents: impl IntoIterator<Item = &'d Document>) -> Vec<Document> {
        let mut matched: Vec<&Document> = documents
            .into_iter()
            .filter(|document| self.matches(document))
            .collect();

        if let Some(sort) = &self.query.sort {
            matched.sort_by(|a, b| {
                let left = lookup(a, &sort.field).map_or(Comparable::Null, Comparable::from);
                let right = lookup(b, &sort.field).map_or(Comparable::Null, Comparable::from);

                match sort.direction {
                    SortDirection::Asc => left.total_cmp(&right),
                    SortDirection::Desc => right.total_cmp(&left),
                }
            });
        }

        matched
            .into_iter()
            .skip(self.query.offset.unwrap_or(0))
            .take(self.query.limit.unwrap_or(usize::MAX))
            .map(|document| self.project(document))
            .collect()
    }

    /// Counts matching documents, ignoring sort, offset and limit.
    pub fn count<'d>(&self, documents: impl IntoIterator<Item = &'d Document>) -> usize {
        documents
            .into_iter()
            .filter(|document| self.matches(document))
            .count()
    }

    fn project(&self, document: &Document) -> Document {
        match &self.query.projection {
            None => document.clone(),
            Some(fields) => document
                .iter()
                .filter(|(key, _)| fields.iter().any(|field| field == *key))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        }
    }
}
