//! Enumerations persisted as integer codes.
//!
//! Enums are leaves: give them a [`Mapped`] implementation with
//! [`mapped_value!`](crate::mapped_value), implement [`EnumValue`], and register an
//! [`EnumValueCodec`] on the codec registry. An enum that was never registered surfaces a
//! [`CodecNotFound`](crate::error::DocumentStoreError::CodecNotFound) error on first use.

use bson::Bson;
use std::{any::type_name, fmt, marker::PhantomData};

use super::{CodecRegistry, ValueCodec};
use crate::{
    error::{DocumentStoreError, DocumentStoreResult},
    value::Mapped,
};

/// An enumeration with a stable integer code per variant.
pub trait EnumValue: Mapped + Copy {
    fn value(&self) -> i32;

    fn from_value(value: i32) -> Option<Self>;
}

/// Codec storing an [`EnumValue`] as a 32-bit integer.
pub struct EnumValueCodec<E> {
    _marker: PhantomData<fn() -> E>,
}

impl<E: EnumValue> EnumValueCodec<E> {
    pub fn new() -> Self {
        Self { _marker: PhantomData }
    }
}

impl<E: EnumValue> Default for EnumValueCodec<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for EnumValueCodec<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EnumValueCodec<{}>", type_name::<E>())
    }
}

impl<E: EnumValue> ValueCodec for EnumValueCodec<E> {
    type Value = E;

    fn encode_value(&self, value: &E, _codecs: &CodecRegistry) -> DocumentStoreResult<Bson> {
        Ok(Bson::Int32(value.value()))
    }

    fn decode_value(&self, value: Bson, _codecs: &CodecRegistry) -> DocumentStoreResult<E> {
        let code = match value {
            Bson::Int32(code) => code,
            Bson::Int64(code) => i32::try_from(code)
                .map_err(|_| DocumentStoreError::InvalidDocument(format!("{code} is not a valid {}", type_name::<E>())))?,
            other => return Err(DocumentStoreError::unexpected(type_name::<E>(), &other)),
        };

        E::from_value(code)
            .ok_or_else(|| DocumentStoreError::InvalidDocument(format!("{code} is not a valid {}", type_name::<E>())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Sex {
        Man,
        Woman,
    }

    crate::mapped_value!(Sex);

    impl EnumValue for Sex {
        fn value(&self) -> i32 {
            match self {
                Sex::Man => 1,
                Sex::Woman => 2,
            }
        }

        fn from_value(value: i32) -> Option<Self> {
            match value {
                1 => Some(Sex::Man),
                2 => Some(Sex::Woman),
                _ => None,
            }
        }
    }

    #[test]
    fn registered_enum_round_trips() {
        let codecs = CodecRegistry::builder().codec(EnumValueCodec::<Sex>::new()).build();

        assert_eq!(codecs.encode_value(&Sex::Woman).unwrap(), Bson::Int32(2));
        assert_eq!(codecs.decode_as::<Sex>(Bson::Int32(1)).unwrap(), Sex::Man);
    }

    #[test]
    fn unknown_code_is_invalid() {
        let codecs = CodecRegistry::builder().codec(EnumValueCodec::<Sex>::new()).build();

        assert!(matches!(
            codecs.decode_as::<Sex>(Bson::Int32(9)),
            Err(DocumentStoreError::InvalidDocument(_))
        ));
    }

    #[test]
    fn unregistered_enum_has_no_codec() {
        let codecs = CodecRegistry::standard();

        assert!(matches!(
            codecs.encode_value(&Sex::Man),
            Err(DocumentStoreError::CodecNotFound(name)) if name.contains("Sex")
        ));
    }
}
