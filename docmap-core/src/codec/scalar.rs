//! Built-in codecs for scalar leaves, consulted after explicit and dispatched codecs.

use bson::{Binary, Bson, Document, oid::ObjectId, spec::BinarySubtype};
use std::{
    any::{TypeId, type_name},
    collections::HashMap,
    fmt,
    marker::PhantomData,
    sync::Arc,
};

use super::{Codec, CodecRegistry, ValueCodec};
use crate::error::{DocumentStoreError, DocumentStoreResult};

/// A leaf with a direct BSON representation.
pub(crate) trait Scalar: Sized + Send + Sync + 'static {
    fn to_bson(&self) -> Bson;

    fn from_bson(value: &Bson) -> Option<Self>;
}

pub(crate) struct ScalarCodec<T>(PhantomData<fn() -> T>);

impl<T> ScalarCodec<T> {
    pub(crate) fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> fmt::Debug for ScalarCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScalarCodec<{}>", type_name::<T>())
    }
}

impl<T: Scalar> ValueCodec for ScalarCodec<T> {
    type Value = T;

    fn encode_value(&self, value: &T, _codecs: &CodecRegistry) -> DocumentStoreResult<Bson> {
        Ok(value.to_bson())
    }

    fn decode_value(&self, value: Bson, _codecs: &CodecRegistry) -> DocumentStoreResult<T> {
        T::from_bson(&value).ok_or_else(|| DocumentStoreError::unexpected(type_name::<T>(), &value))
    }
}

impl Scalar for bool {
    fn to_bson(&self) -> Bson {
        Bson::Boolean(*self)
    }

    fn from_bson(value: &Bson) -> Option<Self> {
        value.as_bool()
    }
}

impl Scalar for i32 {
    fn to_bson(&self) -> Bson {
        Bson::Int32(*self)
    }

    fn from_bson(value: &Bson) -> Option<Self> {
        match value {
            Bson::Int32(value) => Some(*value),
            Bson::Int64(value) => i32::try_from(*value).ok(),
            _ => None,
        }
    }
}

impl Scalar for i64 {
    fn to_bson(&self) -> Bson {
        Bson::Int64(*self)
    }

    fn from_bson(value: &Bson) -> Option<Self> {
        match value {
            Bson::Int64(value) => Some(*value),
            Bson::Int32(value) => Some(i64::from(*value)),
            _ => None,
        }
    }
}

impl Scalar for f64 {
    fn to_bson(&self) -> Bson {
        Bson::Double(*self)
    }

    fn from_bson(value: &Bson) -> Option<Self> {
        match value {
            Bson::Double(value) => Some(*value),
            Bson::Int32(value) => Some(f64::from(*value)),
            Bson::Int64(value) => Some(*value as f64),
            _ => None,
        }
    }
}

impl Scalar for String {
    fn to_bson(&self) -> Bson {
        Bson::String(self.clone())
    }

    fn from_bson(value: &Bson) -> Option<Self> {
        match value {
            Bson::String(value) | Bson::Symbol(value) => Some(value.clone()),
            _ => None,
        }
    }
}

impl Scalar for ObjectId {
    fn to_bson(&self) -> Bson {
        Bson::ObjectId(*self)
    }

    fn from_bson(value: &Bson) -> Option<Self> {
        value.as_object_id()
    }
}

impl Scalar for Binary {
    fn to_bson(&self) -> Bson {
        Bson::Binary(self.clone())
    }

    fn from_bson(value: &Bson) -> Option<Self> {
        match value {
            Bson::Binary(binary) => Some(binary.clone()),
            _ => None,
        }
    }
}

impl Scalar for bson::DateTime {
    fn to_bson(&self) -> Bson {
        Bson::DateTime(*self)
    }

    fn from_bson(value: &Bson) -> Option<Self> {
        match value {
            Bson::DateTime(value) => Some(*value),
            Bson::Int64(millis) => Some(bson::DateTime::from_millis(*millis)),
            _ => None,
        }
    }
}

impl Scalar for bson::Uuid {
    fn to_bson(&self) -> Bson {
        Bson::Binary(Binary {
            subtype: BinarySubtype::Uuid,
            bytes: self.bytes().to_vec(),
        })
    }

    fn from_bson(value: &Bson) -> Option<Self> {
        match value {
            Bson::Binary(Binary { subtype: BinarySubtype::Uuid, bytes }) => <[u8; 16]>::try_from(bytes.as_slice())
                .ok()
                .map(bson::Uuid::from_bytes),
            _ => None,
        }
    }
}

impl Scalar for chrono::DateTime<chrono::Utc> {
    fn to_bson(&self) -> Bson {
        Bson::DateTime(bson::DateTime::from_chrono(*self))
    }

    fn from_bson(value: &Bson) -> Option<Self> {
        match value {
            Bson::DateTime(value) => Some(value.to_chrono()),
            Bson::Int64(millis) => chrono::DateTime::from_timestamp_millis(*millis),
            _ => None,
        }
    }
}

impl Scalar for Bson {
    fn to_bson(&self) -> Bson {
        self.clone()
    }

    fn from_bson(value: &Bson) -> Option<Self> {
        Some(value.clone())
    }
}

impl Scalar for Document {
    fn to_bson(&self) -> Bson {
        Bson::Document(self.clone())
    }

    fn from_bson(value: &Bson) -> Option<Self> {
        value.as_document().cloned()
    }
}

fn entry<T: Scalar>() -> (TypeId, Arc<dyn Codec>) {
    (TypeId::of::<T>(), Arc::new(ScalarCodec::<T>::new()))
}

/// The library codecs every registry falls back to.
pub(crate) fn default_codecs() -> HashMap<TypeId, Arc<dyn Codec>> {
    HashMap::from([
        entry::<bool>(),
        entry::<i32>(),
        entry::<i64>(),
        entry::<f64>(),
        entry::<String>(),
        entry::<ObjectId>(),
        entry::<Binary>(),
        entry::<bson::DateTime>(),
        entry::<bson::Uuid>(),
        entry::<chrono::DateTime<chrono::Utc>>(),
        entry::<Bson>(),
        entry::<Document>(),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_widen_and_narrow_within_range() {
        assert_eq!(i64::from_bson(&Bson::Int32(7)), Some(7));
        assert_eq!(i32::from_bson(&Bson::Int64(7)), Some(7));
        assert_eq!(i32::from_bson(&Bson::Int64(i64::MAX)), None);
        assert_eq!(f64::from_bson(&Bson::Int32(2)), Some(2.0));
    }

    #[test]
    fn uuid_uses_the_uuid_binary_subtype() {
        let uuid = bson::Uuid::new();
        let bson = uuid.to_bson();

        assert!(matches!(
            &bson,
            Bson::Binary(Binary { subtype: BinarySubtype::Uuid, .. })
        ));
        assert_eq!(bson::Uuid::from_bson(&bson), Some(uuid));
    }

    #[test]
    fn mismatched_wire_type_is_rejected() {
        assert_eq!(bool::from_bson(&Bson::String("true".into())), None);
        assert_eq!(String::from_bson(&Bson::Int32(1)), None);
    }
}
