//! Error types and result types for mapping and store operations.
//!
//! Every fallible operation in this crate returns [`DocumentStoreResult<T>`]. Only two
//! conditions are deliberately not errors: a document key with no matching field is
//! discarded on decode, and a `#[bson(skip)]` field never reaches the descriptor.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors raised while mapping objects or talking to a store.
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// Serialization/deserialization error when converting between formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during client construction or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// A connection name or connection string could not be resolved.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// A document with the given ID already exists in the collection.
    /// The first argument is the document ID, the second is the collection name.
    #[error("Document {0} already exists in collection {1}")]
    DocumentAlreadyExists(String, String),
    /// The requested document was not found in the collection.
    /// The first argument is the document ID, the second is the collection name.
    #[error("Document not found {0} in collection {1}")]
    DocumentNotFound(String, String),
    /// The document has an invalid structure.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// No codec is registered, provided by the dispatcher, or built in for a type.
    #[error("No codec found for type {0}")]
    CodecNotFound(String),
    /// The target type of a decode has no constructor.
    #[error("Cannot instantiate {0}: no constructor is registered for the type")]
    Instantiation(String),
    /// An identifier was requested from an instance that never had one assigned.
    #[error("Instance of {0} does not carry an identifier")]
    MissingIdentifier(String),
    /// A wire value does not have the shape the target type expects.
    #[error("Expected {expected}, found {found}")]
    UnexpectedType {
        /// The type being decoded.
        expected: String,
        /// The wire type that was found.
        found: String,
    },
    /// Decoding a single field failed.
    #[error("Failed to decode field `{field}` of {type_name}: {source}")]
    Field {
        /// The type owning the field.
        type_name: String,
        /// The wire name of the field.
        field: String,
        /// The underlying failure.
        #[source]
        source: Box<DocumentStoreError>,
    },
    /// Sequential identifier allocation kept conflicting until the retry budget ran out.
    #[error(
        "Sequential identifier allocation in collection {collection} failed after {attempts} attempts; last conflicting identifier was {last_id}"
    )]
    SequenceConflict {
        /// The collection being inserted into.
        collection: String,
        /// The identifier that conflicted on the final attempt.
        last_id: i32,
        /// How many inserts were attempted.
        attempts: u32,
    },
    /// An error occurred in the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl DocumentStoreError {
    /// Builds an [`DocumentStoreError::UnexpectedType`] from the expected type name and the
    /// wire value that was actually found.
    pub fn unexpected(expected: impl Into<String>, found: &bson::Bson) -> Self {
        DocumentStoreError::UnexpectedType {
            expected: expected.into(),
            found: format!("{:?}", found.element_type()),
        }
    }

    /// Returns `true` if this error reports a uniqueness conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, DocumentStoreError::DocumentAlreadyExists(..))
    }
}

/// A specialized `Result` type for mapping and store operations.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DocumentStoreError {
    fn from(err: SerdeJsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}
