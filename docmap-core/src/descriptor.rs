//! Per-type field descriptors and the cache that memoizes them.
//!
//! A [`TypeDescriptor`] is the table of persisted fields of one type: for every wire field
//! name it stores a getter, a setter, the declared value type and, for sequence or mapping
//! fields, the element type. Descriptors are normally generated by `#[derive(Persistent)]`,
//! which makes the existence of every accessor a compile-time fact. They can also be
//! assembled by hand with [`TypeDescriptor::builder`].
//!
//! [`TypeDescriptorCache`] builds each descriptor once and hands out the same shared
//! instance afterwards.

use bson::Bson;
use parking_lot::RwLock;
use std::{
    any::{Any, TypeId, type_name},
    collections::HashMap,
    fmt,
    sync::Arc,
};
use tracing::{trace, warn};

use crate::{
    codec::CodecRegistry,
    error::{DocumentStoreError, DocumentStoreResult},
    value::{Mapped, TypeKey},
};

/// Wire name of the identifier field.
pub const ID_FIELD: &str = "_id";

/// Reads a field out of an instance.
pub type Getter<T> = fn(&T) -> &dyn Mapped;

/// Decodes a wire value and writes it into an instance.
pub type Setter<T> = fn(&mut T, Bson, &CodecRegistry) -> DocumentStoreResult<()>;

/// The opt-in persistence marker.
///
/// Types implementing this trait are encoded and decoded by
/// [`DocumentCodec`](crate::codec::DocumentCodec). Derive it with
/// `#[derive(Persistent)]` from `docmap-macros`.
pub trait Persistent: Mapped + Sized {
    /// Builds the descriptor of this type. Called once per type by [`TypeDescriptorCache`].
    fn describe() -> TypeDescriptor<Self>;
}

/// One persisted field: accessors plus declared types.
pub struct FieldDescriptor<T> {
    name: &'static str,
    member: &'static str,
    value_type: TypeKey,
    element_type: Option<TypeKey>,
    get: Getter<T>,
    set: Setter<T>,
}

impl<T> FieldDescriptor<T> {
    /// Wire name of the field.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Name of the struct member backing the field.
    pub fn member(&self) -> &'static str {
        self.member
    }

    pub fn value_type(&self) -> TypeKey {
        self.value_type
    }

    /// Element type of a sequence or mapping field.
    pub fn element_type(&self) -> Option<TypeKey> {
        self.element_type
    }

    pub fn get<'a>(&self, instance: &'a T) -> &'a dyn Mapped {
        (self.get)(instance)
    }

    pub fn set(&self, instance: &mut T, value: Bson, codecs: &CodecRegistry) -> DocumentStoreResult<()> {
        (self.set)(instance, value, codecs)
    }
}

impl<T> fmt::Debug for FieldDescriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("member", &self.member)
            .field("value_type", &self.value_type)
            .field("element_type", &self.element_type)
            .finish()
    }
}

/// Ordered table of the persisted fields of `T`.
pub struct TypeDescriptor<T> {
    type_name: &'static str,
    fields: Vec<FieldDescriptor<T>>,
    index: HashMap<&'static str, usize>,
    id_field: Option<usize>,
    constructor: Option<fn() -> T>,
}

impl<T: 'static> TypeDescriptor<T> {
    pub fn builder() -> TypeDescriptorBuilder<T> {
        TypeDescriptorBuilder::new()
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[FieldDescriptor<T>] {
        &self.fields
    }

    /// Looks a field up by its wire name.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor<T>> {
        self.index.get(name).map(|position| &self.fields[*position])
    }

    /// Returns the identifier field, if the type declares one.
    pub fn id_field(&self) -> Option<&FieldDescriptor<T>> {
        self.id_field.map(|position| &self.fields[position])
    }

    /// Element type recorded for a sequence or mapping field.
    pub fn element_type(&self, name: &str) -> Option<TypeKey> {
        self.field(name).and_then(FieldDescriptor::element_type)
    }

    /// Wire names in declaration order.
    pub fn field_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|field| field.name)
    }

    /// Creates a fresh instance to decode into.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Instantiation`] if no constructor was registered.
    pub fn instantiate(&self) -> DocumentStoreResult<T> {
        self.constructor
            .map(|construct| construct())
            .ok_or_else(|| DocumentStoreError::Instantiation(self.type_name.to_string()))
    }
}

impl<T> fmt::Debug for TypeDescriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("type_name", &self.type_name)
            .field("fields", &self.fields)
            .field("has_constructor", &self.constructor.is_some())
            .finish()
    }
}

/// Builder for [`TypeDescriptor`], used by the derive and by hand-written registrations.
pub struct TypeDescriptorBuilder<T> {
    descriptor: TypeDescriptor<T>,
}

impl<T: 'static> TypeDescriptorBuilder<T> {
    pub fn new() -> Self {
        Self {
            descriptor: TypeDescriptor {
                type_name: type_name::<T>(),
                fields: Vec::new(),
                index: HashMap::new(),
                id_field: None,
                constructor: None,
            },
        }
    }

    /// Adds a persisted field whose declared type is `F`.
    ///
    /// A wire name that is already taken keeps its first registration.
    pub fn field<F: Mapped>(
        mut self,
        name: &'static str,
        member: &'static str,
        get: Getter<T>,
        set: Setter<T>,
    ) -> Self {
        self.push::<F>(name, member, get, set);
        self
    }

    /// Adds the identifier field, stored under [`ID_FIELD`].
    pub fn id<F: Mapped>(mut self, member: &'static str, get: Getter<T>, set: Setter<T>) -> Self {
        if let Some(position) = self.push::<F>(ID_FIELD, member, get, set) {
            self.descriptor.id_field = Some(position);
        }
        self
    }

    /// Registers the constructor used to create instances on decode.
    pub fn constructor(mut self, constructor: fn() -> T) -> Self {
        self.descriptor.constructor = Some(constructor);
        self
    }

    pub fn build(self) -> TypeDescriptor<T> {
        self.descriptor
    }

    fn push<F: Mapped>(
        &mut self,
        name: &'static str,
        member: &'static str,
        get: Getter<T>,
        set: Setter<T>,
    ) -> Option<usize> {
        if self.descriptor.index.contains_key(name) {
            warn!(
                type_name = self.descriptor.type_name,
                field = name,
                member,
                "duplicate wire field name; keeping the first registration"
            );
            return None;
        }

        let position = self.descriptor.fields.len();
        self.descriptor.fields.push(FieldDescriptor {
            name,
            member,
            value_type: F::type_key(),
            element_type: F::element_type(),
            get,
            set,
        });
        self.descriptor.index.insert(name, position);

        Some(position)
    }
}

impl<T: 'static> Default for TypeDescriptorBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Memoizes one [`TypeDescriptor`] per type.
///
/// Lookups of already built descriptors take a shared lock only. A miss builds the
/// descriptor inside the exclusive section, so concurrent first callers agree on a single
/// instance and every later lookup returns that same `Arc`.
#[derive(Default)]
pub struct TypeDescriptorCache {
    descriptors: RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl TypeDescriptorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the descriptor of `T`, building it on first use.
    pub fn descriptor_for<T: Persistent>(&self) -> Arc<TypeDescriptor<T>> {
        let key = TypeId::of::<T>();

        let cached = self.descriptors.read().get(&key).cloned();
        let erased = match cached {
            Some(descriptor) => descriptor,
            None => self
                .descriptors
                .write()
                .entry(key)
                .or_insert_with(|| {
                    trace!(type_name = type_name::<T>(), "building type descriptor");
                    Arc::new(T::describe()) as Arc<dyn Any + Send + Sync>
                })
                .clone(),
        };

        // Entries are keyed by `TypeId`, so the downcast only fails for a foreign entry.
        erased
            .downcast::<TypeDescriptor<T>>()
            .unwrap_or_else(|_| Arc::new(T::describe()))
    }

    /// Number of descriptors built so far.
    pub fn len(&self) -> usize {
        self.descriptors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for TypeDescriptorCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptorCache")
            .field("types", &self.len())
            .finish()
    }
}
