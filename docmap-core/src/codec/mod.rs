//! Codecs translating between Rust values and BSON.
//!
//! A [`Codec`] handles exactly one runtime type. Most codecs are written against the typed
//! [`ValueCodec`] trait and erased through its blanket implementation.
//!
//! - [`DocumentCodec`] maps types carrying the persistence marker, field by field.
//! - [`CodecRegistry`] is the dispatch table consulted for every leaf value.
//! - [`datetime`], [`enum_value`] and [`serde`] hold the optional codecs a session can
//!   register ahead of the built-in scalar codecs.

use bson::Bson;
use std::{
    any::{Any, type_name},
    fmt,
};

use crate::{
    error::{DocumentStoreError, DocumentStoreResult},
    value::TypeKey,
};

pub mod datetime;
mod document;
pub mod enum_value;
mod registry;
pub(crate) mod scalar;
pub mod serde;

pub use document::DocumentCodec;
pub use registry::{CodecRegistry, CodecRegistryBuilder};

/// Type-erased encoder/decoder for one runtime type.
pub trait Codec: Send + Sync + fmt::Debug {
    /// The type this codec handles.
    fn encoder_type(&self) -> TypeKey;

    /// Encodes a value, which must be of the encoder type.
    fn encode(&self, value: &dyn Any, codecs: &CodecRegistry) -> DocumentStoreResult<Bson>;

    /// Decodes a wire value into a boxed value of the encoder type.
    fn decode(&self, value: Bson, codecs: &CodecRegistry) -> DocumentStoreResult<Box<dyn Any + Send>>;
}

/// Typed codec for a single value type.
///
/// Every `ValueCodec` is a [`Codec`] through a blanket implementation.
pub trait ValueCodec: Send + Sync + fmt::Debug + 'static {
    type Value: Send + 'static;

    fn encoder_type(&self) -> TypeKey {
        TypeKey::of::<Self::Value>()
    }

    fn encode_value(&self, value: &Self::Value, codecs: &CodecRegistry) -> DocumentStoreResult<Bson>;

    fn decode_value(&self, value: Bson, codecs: &CodecRegistry) -> DocumentStoreResult<Self::Value>;
}

impl<C: ValueCodec> Codec for C {
    fn encoder_type(&self) -> TypeKey {
        ValueCodec::encoder_type(self)
    }

    fn encode(&self, value: &dyn Any, codecs: &CodecRegistry) -> DocumentStoreResult<Bson> {
        match value.downcast_ref::<C::Value>() {
            Some(value) => self.encode_value(value, codecs),
            None => Err(DocumentStoreError::UnexpectedType {
                expected: type_name::<C::Value>().to_string(),
                found: "a value of a different runtime type".to_string(),
            }),
        }
    }

    fn decode(&self, value: Bson, codecs: &CodecRegistry) -> DocumentStoreResult<Box<dyn Any + Send>> {
        Ok(Box::new(self.decode_value(value, codecs)?))
    }
}
