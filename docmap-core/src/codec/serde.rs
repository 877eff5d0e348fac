//! Bridge for leaf types that already implement `serde`.

use ::serde::{Serialize, de::DeserializeOwned};
use bson::{Bson, de::deserialize_from_bson, ser::serialize_to_bson};
use std::{any::type_name, fmt, marker::PhantomData};

use super::{CodecRegistry, ValueCodec};
use crate::error::DocumentStoreResult;

/// Encodes `T` through its `Serialize`/`Deserialize` implementations.
///
/// Useful for value objects that are not worth a descriptor. The type still needs a
/// [`Mapped`](crate::value::Mapped) implementation, usually from
/// [`mapped_value!`](crate::mapped_value).
pub struct SerdeCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> SerdeCodec<T> {
    pub fn new() -> Self {
        Self { _marker: PhantomData }
    }
}

impl<T> Default for SerdeCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for SerdeCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SerdeCodec<{}>", type_name::<T>())
    }
}

impl<T> ValueCodec for SerdeCodec<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    type Value = T;

    fn encode_value(&self, value: &T, _codecs: &CodecRegistry) -> DocumentStoreResult<Bson> {
        Ok(serialize_to_bson(value)?)
    }

    fn decode_value(&self, value: Bson, _codecs: &CodecRegistry) -> DocumentStoreResult<T> {
        Ok(deserialize_from_bson(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::serde::Deserialize;
    use bson::doc;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Money {
        amount: i64,
        currency: String,
    }

    crate::mapped_value!(Money);

    #[test]
    fn serde_types_encode_as_documents() {
        let codecs = CodecRegistry::builder().serde::<Money>().build();
        let money = Money {
            amount: 1250,
            currency: "EUR".to_string(),
        };

        let encoded = codecs.encode_value(&money).unwrap();
        assert_eq!(encoded, Bson::Document(doc! { "amount": 1250i64, "currency": "EUR" }));
        assert_eq!(codecs.decode_as::<Money>(encoded).unwrap(), money);
    }
}
