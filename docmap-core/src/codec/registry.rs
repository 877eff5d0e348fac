use bson::{Bson, Document};
use parking_lot::RwLock;
use std::{
    any::{TypeId, type_name},
    collections::HashMap,
    fmt,
    sync::Arc,
};

use super::{
    Codec, DocumentCodec,
    datetime::{LocalDateCodec, LocalDateTimeCodec, LocalTimeCodec, WeekdayCodec},
    scalar::default_codecs,
    serde::SerdeCodec,
};
use crate::{
    descriptor::{Persistent, TypeDescriptorCache},
    dispatch::CodecDispatcher,
    error::{DocumentStoreError, DocumentStoreResult},
    value::{Mapped, Node, TypeKey},
};

/// Composite codec table.
///
/// Lookups consult, in order: codecs registered explicitly on the builder, the
/// [`CodecDispatcher`] (which serves persistent types), and the built-in scalar codecs.
/// The first hit is memoized per type.
pub struct CodecRegistry {
    codecs: HashMap<TypeId, Arc<dyn Codec>>,
    dispatcher: CodecDispatcher,
    defaults: HashMap<TypeId, Arc<dyn Codec>>,
    resolved: RwLock<HashMap<TypeId, Arc<dyn Codec>>>,
    descriptors: Arc<TypeDescriptorCache>,
}

impl CodecRegistry {
    pub fn builder() -> CodecRegistryBuilder {
        CodecRegistryBuilder::default()
    }

    /// The registry sessions use by default: the local date and time codecs and the
    /// weekday codec ahead of the dispatcher and the built-in codecs.
    pub fn standard() -> Self {
        Self::builder().with_local_datetime().build()
    }

    pub fn descriptors(&self) -> &Arc<TypeDescriptorCache> {
        &self.descriptors
    }

    /// Returns the codec for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::CodecNotFound`] if no source provides one.
    pub fn lookup(&self, key: &TypeKey) -> DocumentStoreResult<Arc<dyn Codec>> {
        if let Some(codec) = self.resolved.read().get(&key.id()) {
            return Ok(codec.clone());
        }

        let codec = self
            .codecs
            .get(&key.id())
            .cloned()
            .or_else(|| self.dispatcher.codec_for(key))
            .or_else(|| self.defaults.get(&key.id()).cloned())
            .ok_or_else(|| DocumentStoreError::CodecNotFound(key.name().to_string()))?;

        Ok(self.resolved.write().entry(key.id()).or_insert(codec).clone())
    }

    /// Encodes any mapped value, recursing through sequences and mappings and handing
    /// leaves to the codec registered for their runtime type.
    pub fn encode_value(&self, value: &dyn Mapped) -> DocumentStoreResult<Bson> {
        match value.node() {
            Node::Null => Ok(Bson::Null),
            Node::Sequence(items) => items
                .into_iter()
                .map(|item| self.encode_value(item))
                .collect::<DocumentStoreResult<Vec<_>>>()
                .map(Bson::Array),
            Node::Mapping(entries) => {
                let mut document = Document::new();
                for (key, item) in entries {
                    document.insert(key, self.encode_value(item)?);
                }
                Ok(Bson::Document(document))
            }
            Node::Value(leaf) => self.lookup(&value.runtime_type())?.encode(leaf, self),
        }
    }

    /// Decodes a leaf of type `T` with the codec registered for `T`.
    pub fn decode_as<T: Mapped>(&self, value: Bson) -> DocumentStoreResult<T> {
        let codec = self.lookup(&T::type_key())?;

        codec
            .decode(value, self)?
            .downcast::<T>()
            .map(|decoded| *decoded)
            .map_err(|_| DocumentStoreError::UnexpectedType {
                expected: type_name::<T>().to_string(),
                found: codec.encoder_type().name().to_string(),
            })
    }

    pub fn document_codec<T: Persistent>(&self) -> DocumentCodec<T> {
        DocumentCodec::new()
    }

    /// Encodes a persistent instance into a document.
    pub fn encode<T: Persistent>(&self, instance: &T) -> DocumentStoreResult<Document> {
        self.document_codec::<T>().encode(instance, self)
    }

    /// Decodes a document into a fresh instance of `T`.
    pub fn decode<T: Persistent>(&self, document: Document) -> DocumentStoreResult<T> {
        self.document_codec::<T>().decode(document, self)
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("codecs", &self.codecs.values().collect::<Vec<_>>())
            .field("resolved", &self.resolved.read().len())
            .field("descriptors", &self.descriptors)
            .finish()
    }
}

/// Builder for [`CodecRegistry`].
///
/// Codecs registered later replace earlier registrations for the same type.
#[derive(Default)]
pub struct CodecRegistryBuilder {
    codecs: HashMap<TypeId, Arc<dyn Codec>>,
    descriptors: Option<Arc<TypeDescriptorCache>>,
    without_defaults: bool,
}

impl CodecRegistryBuilder {
    /// Registers a codec ahead of the dispatcher and the built-in codecs.
    pub fn codec(self, codec: impl Codec + 'static) -> Self {
        self.shared_codec(Arc::new(codec))
    }

    pub fn shared_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codecs.insert(codec.encoder_type().id(), codec);
        self
    }

    /// Registers a [`SerdeCodec`] for `T`.
    pub fn serde<T>(self) -> Self
    where
        T: serde::Serialize + serde::de::DeserializeOwned + Send + Sync + 'static,
    {
        self.codec(SerdeCodec::<T>::new())
    }

    /// Registers the codecs for local date-times, dates, times and weekdays.
    pub fn with_local_datetime(self) -> Self {
        self.codec(LocalDateTimeCodec)
            .codec(LocalDateCodec)
            .codec(LocalTimeCodec)
            .codec(WeekdayCodec)
    }

    /// Drops the built-in scalar codecs, leaving only explicit and dispatched ones.
    pub fn without_defaults(mut self) -> Self {
        self.without_defaults = true;
        self
    }

    /// Shares a descriptor cache with other registries.
    pub fn descriptors(mut self, descriptors: Arc<TypeDescriptorCache>) -> Self {
        self.descriptors = Some(descriptors);
        self
    }

    pub fn build(self) -> CodecRegistry {
        CodecRegistry {
            codecs: self.codecs,
            dispatcher: CodecDispatcher,
            defaults: if self.without_defaults {
                HashMap::new()
            } else {
                default_codecs()
            },
            resolved: RwLock::new(HashMap::new()),
            descriptors: self.descriptors.unwrap_or_default(),
        }
    }
}

impl fmt::Debug for CodecRegistryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecRegistryBuilder")
            .field("codecs", &self.codecs.len())
            .field("without_defaults", &self.without_defaults)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{bson, oid::ObjectId};
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    #[test]
    fn encodes_nested_containers() {
        let codecs = CodecRegistry::standard();
        let mut map = BTreeMap::new();
        map.insert("x".to_string(), vec![Some(1i32), None]);

        let encoded = codecs.encode_value(&map).unwrap();
        assert_eq!(encoded, bson!({ "x": [1, null] }));
    }

    #[test]
    fn decodes_leaf_with_registered_codec() {
        let codecs = CodecRegistry::standard();
        let id = ObjectId::new();

        assert_eq!(codecs.decode_as::<ObjectId>(Bson::ObjectId(id)).unwrap(), id);
        assert_eq!(codecs.decode_as::<i64>(Bson::Int32(3)).unwrap(), 3);
    }

    #[test]
    fn missing_codec_is_reported() {
        let codecs = CodecRegistry::builder().build();
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();

        let err = codecs.encode_value(&date).unwrap_err();
        assert!(matches!(err, DocumentStoreError::CodecNotFound(name) if name.contains("NaiveDate")));
    }

    #[test]
    fn defaults_can_be_disabled() {
        let codecs = CodecRegistry::builder().without_defaults().build();

        assert!(matches!(
            codecs.lookup(&TypeKey::of::<String>()),
            Err(DocumentStoreError::CodecNotFound(_))
        ));
    }

    #[test]
    fn lookups_are_memoized() {
        let codecs = CodecRegistry::standard();

        let first = codecs.lookup(&TypeKey::of::<String>()).unwrap();
        let second = codecs.lookup(&TypeKey::of::<String>()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
