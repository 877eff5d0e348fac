use bson::{Bson, Document, oid::ObjectId};
use std::{any::type_name, fmt, marker::PhantomData, sync::Arc};
use tracing::trace;

use super::{Codec, CodecRegistry, ValueCodec};
use crate::{
    descriptor::{FieldDescriptor, Persistent},
    error::{DocumentStoreError, DocumentStoreResult},
    value::{Node, TypeKey},
};

/// Maps instances of a persistent type to BSON documents, field by field.
///
/// The codec itself is stateless. Field tables come from the
/// [`TypeDescriptorCache`](crate::descriptor::TypeDescriptorCache) of the registry passed
/// to each call, and every field value goes back through that registry, so nested
/// persistent types, sequences and mappings resolve at any depth.
pub struct DocumentCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T: Persistent> DocumentCodec<T> {
    pub fn new() -> Self {
        Self { _marker: PhantomData }
    }

    /// Factory stored in [`TypeKey::persistent`].
    pub(crate) fn shared() -> Arc<dyn Codec> {
        Arc::new(Self::new())
    }

    /// Encodes every described field of `instance` under its wire name.
    ///
    /// Absent optional values are written as BSON null.
    pub fn encode(&self, instance: &T, codecs: &CodecRegistry) -> DocumentStoreResult<Document> {
        let descriptor = codecs.descriptors().descriptor_for::<T>();

        let mut document = Document::new();
        for field in descriptor.fields() {
            let value = codecs
                .encode_value(field.get(instance))
                .map_err(|err| field_error::<T>(field.name(), err))?;
            document.insert(field.name(), value);
        }

        Ok(document)
    }

    /// Creates a fresh instance and fills it from `document`.
    ///
    /// Keys that match no described field are discarded. Fields missing from the document
    /// keep whatever the constructor put there.
    pub fn decode(&self, document: Document, codecs: &CodecRegistry) -> DocumentStoreResult<T> {
        let descriptor = codecs.descriptors().descriptor_for::<T>();
        let mut instance = descriptor.instantiate()?;

        for (key, value) in document {
            match descriptor.field(&key) {
                Some(field) => field
                    .set(&mut instance, value, codecs)
                    .map_err(|err| field_error::<T>(&key, err))?,
                None => trace!(
                    type_name = descriptor.type_name(),
                    field = %key,
                    "ignoring document key with no matching field"
                ),
            }
        }

        Ok(instance)
    }

    /// Assigns a freshly generated identifier if the instance has none.
    ///
    /// Returns `true` when an identifier was generated. Calling it again on the same
    /// instance leaves the identifier unchanged and returns `false`.
    pub fn ensure_identifier(&self, instance: &mut T, codecs: &CodecRegistry) -> DocumentStoreResult<bool> {
        let descriptor = codecs.descriptors().descriptor_for::<T>();
        let field = id_field(descriptor.id_field())?;

        if !matches!(field.get(instance).node(), Node::Null) {
            return Ok(false);
        }

        field.set(instance, Bson::ObjectId(ObjectId::new()), codecs)?;
        trace!(type_name = descriptor.type_name(), "generated identifier");
        Ok(true)
    }

    /// Returns the encoded identifier of `instance`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::MissingIdentifier`] if the type has no identifier field
    /// or the instance never had one assigned.
    pub fn resolve_identifier(&self, instance: &T, codecs: &CodecRegistry) -> DocumentStoreResult<Bson> {
        let descriptor = codecs.descriptors().descriptor_for::<T>();
        let field = id_field(descriptor.id_field())?;
        let value = field.get(instance);

        if matches!(value.node(), Node::Null) {
            return Err(DocumentStoreError::MissingIdentifier(type_name::<T>().to_string()));
        }

        codecs.encode_value(value)
    }

    /// Writes `id` into the identifier field, decoding it like any other field value.
    pub fn assign_identifier(&self, instance: &mut T, id: Bson, codecs: &CodecRegistry) -> DocumentStoreResult<()> {
        let descriptor = codecs.descriptors().descriptor_for::<T>();
        let field = id_field(descriptor.id_field())?;

        field
            .set(instance, id, codecs)
            .map_err(|err| field_error::<T>(field.name(), err))
    }
}

impl<T: Persistent> Default for DocumentCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for DocumentCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocumentCodec<{}>", type_name::<T>())
    }
}

impl<T: Persistent> ValueCodec for DocumentCodec<T> {
    type Value = T;

    fn encoder_type(&self) -> TypeKey {
        TypeKey::persistent::<T>()
    }

    fn encode_value(&self, value: &T, codecs: &CodecRegistry) -> DocumentStoreResult<Bson> {
        self.encode(value, codecs).map(Bson::Document)
    }

    fn decode_value(&self, value: Bson, codecs: &CodecRegistry) -> DocumentStoreResult<T> {
        match value {
            Bson::Document(document) => self.decode(document, codecs),
            other => Err(DocumentStoreError::unexpected(type_name::<T>(), &other)),
        }
    }
}

fn id_field<T>(field: Option<&FieldDescriptor<T>>) -> DocumentStoreResult<&FieldDescriptor<T>> {
    field.ok_or_else(|| DocumentStoreError::MissingIdentifier(type_name::<T>().to_string()))
}

fn field_error<T>(field: &str, err: DocumentStoreError) -> DocumentStoreError {
    DocumentStoreError::Field {
        type_name: type_name::<T>().to_string(),
        field: field.to_string(),
        source: Box::new(err),
    }
}
