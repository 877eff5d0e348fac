//! Structural view of mapped values.
//!
//! Every value that can appear in a persisted field implements [`Mapped`]. The trait
//! exposes two things the codec needs:
//!
//! - a borrowed [`Node`] describing the value's shape at runtime (null, sequence,
//!   string-keyed mapping, or an opaque leaf handed to a codec), used for encoding;
//! - a static `read` constructor used for decoding, where the target type is known.
//!
//! Leaves are identified by a [`TypeKey`], the runtime type identity used to look codecs
//! up in the [`CodecRegistry`](crate::codec::CodecRegistry). A key also records whether the
//! type carries the persistence marker, which is how the
//! [`CodecDispatcher`](crate::dispatch::CodecDispatcher) decides to hand it a
//! [`DocumentCodec`](crate::codec::DocumentCodec).

use bson::{Binary, Bson, Document, oid::ObjectId};
use std::{
    any::{Any, TypeId, type_name},
    collections::{BTreeMap, HashMap},
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use crate::{
    codec::{Codec, CodecRegistry, DocumentCodec},
    descriptor::Persistent,
    error::{DocumentStoreError, DocumentStoreResult},
};

/// Builds the codec for a type that carries the persistence marker.
pub type CodecFactory = fn() -> Arc<dyn Codec>;

/// Runtime identity of a mapped type.
///
/// Two keys are equal when they name the same Rust type.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
    persistent: Option<CodecFactory>,
}

impl TypeKey {
    /// Key for a plain type, served by explicit or built-in codecs.
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
            persistent: None,
        }
    }

    /// Key for a type carrying the persistence marker.
    pub fn persistent<T: Persistent>() -> Self {
        Self {
            persistent: Some(DocumentCodec::<T>::shared),
            ..Self::of::<T>()
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns `true` if the type opted into document mapping.
    pub fn is_persistent(&self) -> bool {
        self.persistent.is_some()
    }

    pub(crate) fn persistent_codec(&self) -> Option<Arc<dyn Codec>> {
        self.persistent.map(|factory| factory())
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeKey")
            .field("name", &self.name)
            .field("persistent", &self.is_persistent())
            .finish()
    }
}

/// Borrowed runtime shape of a mapped value.
pub enum Node<'a> {
    /// Absent value, written as BSON null.
    Null,
    /// Ordered sequence, written as a BSON array.
    Sequence(Vec<&'a dyn Mapped>),
    /// String-keyed mapping, written as a nested BSON document.
    Mapping(Vec<(&'a str, &'a dyn Mapped)>),
    /// Anything else; encoded by the codec registered for its runtime type.
    Value(&'a dyn Any),
}

/// A value that can be stored in a persisted field.
///
/// Implemented here for scalars, `Option`, `Vec` and string-keyed maps. Types deriving
/// `Persistent` get an implementation from the derive, and other leaf types can use
/// [`mapped_value!`](crate::mapped_value).
pub trait Mapped: Any + Send + Sync {
    /// Returns the structural view used by the encoder.
    fn node(&self) -> Node<'_>;

    /// Returns the runtime type used for codec lookup.
    fn runtime_type(&self) -> TypeKey;

    /// Returns the static type key of `Self`.
    fn type_key() -> TypeKey
    where
        Self: Sized;

    /// Returns the element type for sequence and mapping types.
    fn element_type() -> Option<TypeKey>
    where
        Self: Sized,
    {
        None
    }

    /// Decodes a wire value into `Self`.
    fn read(value: Bson, codecs: &CodecRegistry) -> DocumentStoreResult<Self>
    where
        Self: Sized;
}

/// Implements [`Mapped`] for leaf types whose encoding is delegated to a codec registered
/// for the exact type.
///
/// ```ignore
/// #[derive(Clone, Copy, PartialEq, Debug)]
/// enum Sex { Man, Woman }
///
/// docmap_core::mapped_value!(Sex);
/// ```
#[macro_export]
macro_rules! mapped_value {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::value::Mapped for $ty {
                fn node(&self) -> $crate::value::Node<'_> {
                    $crate::value::Node::Value(self)
                }

                fn runtime_type(&self) -> $crate::value::TypeKey {
                    $crate::value::TypeKey::of::<Self>()
                }

                fn type_key() -> $crate::value::TypeKey {
                    $crate::value::TypeKey::of::<Self>()
                }

                fn read(
                    value: $crate::bson::Bson,
                    codecs: &$crate::codec::CodecRegistry,
                ) -> $crate::error::DocumentStoreResult<Self> {
                    codecs.decode_as::<Self>(value)
                }
            }
        )+
    };
}

mapped_value!(
    bool,
    i32,
    i64,
    f64,
    String,
    ObjectId,
    Binary,
    bson::DateTime,
    bson::Uuid,
    Bson,
    Document,
    chrono::NaiveDateTime,
    chrono::NaiveDate,
    chrono::NaiveTime,
    chrono::DateTime<chrono::Utc>,
    chrono::Weekday,
);

impl<T: Mapped> Mapped for Option<T> {
    fn node(&self) -> Node<'_> {
        match self {
            Some(value) => value.node(),
            None => Node::Null,
        }
    }

    fn runtime_type(&self) -> TypeKey {
        match self {
            Some(value) => value.runtime_type(),
            None => T::type_key(),
        }
    }

    fn type_key() -> TypeKey {
        T::type_key()
    }

    fn element_type() -> Option<TypeKey> {
        T::element_type()
    }

    fn read(value: Bson, codecs: &CodecRegistry) -> DocumentStoreResult<Self> {
        match value {
            Bson::Null | Bson::Undefined => Ok(None),
            other => T::read(other, codecs).map(Some),
        }
    }
}

impl<T: Mapped> Mapped for Vec<T> {
    fn node(&self) -> Node<'_> {
        Node::Sequence(
            self.iter()
                .map(|item| item as &dyn Mapped)
                .collect(),
        )
    }

    fn runtime_type(&self) -> TypeKey {
        TypeKey::of::<Self>()
    }

    fn type_key() -> TypeKey {
        TypeKey::of::<Self>()
    }

    fn element_type() -> Option<TypeKey> {
        Some(T::type_key())
    }

    fn read(value: Bson, codecs: &CodecRegistry) -> DocumentStoreResult<Self> {
        match value {
            Bson::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(index, item)| {
                    T::read(item, codecs).map_err(|err| element_error::<Self>(index.to_string(), err))
                })
                .collect(),
            other => Err(DocumentStoreError::unexpected(type_name::<Self>(), &other)),
        }
    }
}

macro_rules! mapped_string_map {
    ($map:ident) => {
        impl<T: Mapped> Mapped for $map<String, T> {
            fn node(&self) -> Node<'_> {
                Node::Mapping(
                    self.iter()
                        .map(|(key, value)| (key.as_str(), value as &dyn Mapped))
                        .collect(),
                )
            }

            fn runtime_type(&self) -> TypeKey {
                TypeKey::of::<Self>()
            }

            fn type_key() -> TypeKey {
                TypeKey::of::<Self>()
            }

            fn element_type() -> Option<TypeKey> {
                Some(T::type_key())
            }

            fn read(value: Bson, codecs: &CodecRegistry) -> DocumentStoreResult<Self> {
                match value {
                    Bson::Document(document) => document
                        .into_iter()
                        .map(|(key, value)| match T::read(value, codecs) {
                            Ok(value) => Ok((key, value)),
                            Err(err) => Err(element_error::<Self>(key, err)),
                        })
                        .collect(),
                    other => Err(DocumentStoreError::unexpected(type_name::<Self>(), &other)),
                }
            }
        }
    };
}

mapped_string_map!(HashMap);
mapped_string_map!(BTreeMap);

fn element_error<C>(position: String, err: DocumentStoreError) -> DocumentStoreError {
    DocumentStoreError::Field {
        type_name: type_name::<C>().to_string(),
        field: position,
        source: Box::new(err),
    }
}
