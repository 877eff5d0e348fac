//! Typed CRUD access to the collection of one entity type.
//!
//! A [`TypedCollection`] is borrowed from a [`Session`] and translates between entities and
//! wire documents with the session's codecs. Identifiers are settled before every write,
//! according to the entity's [`IdPolicy`]:
//!
//! - `Generated`: an ObjectId is assigned when the identifier field is empty.
//! - `Sequential`: the [`SequentialIdAllocator`](crate::sequence::SequentialIdAllocator)
//!   picks the next integer and performs the insert itself.
//! - `Assigned`: the caller must have set the identifier.
//!
//! # Example
//!
//! ```ignore
//! let people = session.collection::<Person>();
//!
//! let mut alice = Person { id: None, name: "Alice".into(), ..Default::default() };
//! let id = people.insert(&mut alice).await?;
//!
//! let found = people.get(id).await?;
//! let adults = people.find(&Query::eq("adult", true)).await?;
//! ```

use bson::Bson;
use std::marker::PhantomData;

use crate::{
    backend::StoreBackend,
    codec::DocumentCodec,
    descriptor::ID_FIELD,
    entity::{Entity, IdPolicy},
    error::{DocumentStoreError, DocumentStoreResult},
    page::{Page, PaginationParams},
    query::Query,
    session::Session,
};

/// Typed view of the collection storing `E`.
#[derive(Debug)]
pub struct TypedCollection<'a, B: StoreBackend, E: Entity> {
    session: &'a Session<B>,
    _marker: PhantomData<fn() -> E>,
}

impl<'a, B: StoreBackend, E: Entity> TypedCollection<'a, B, E> {
    pub(crate) fn new(session: &'a Session<B>) -> Self {
        Self { session, _marker: PhantomData }
    }

    pub fn name(&self) -> &'static str {
        E::collection_name()
    }

    fn codec(&self) -> DocumentCodec<E> {
        self.session.codecs().document_codec::<E>()
    }

    /// Inserts a new entity and returns its encoded identifier.
    ///
    /// The entity's identifier field is updated in place when one is generated or
    /// allocated.
    pub async fn insert(&self, entity: &mut E) -> DocumentStoreResult<Bson> {
        let codecs = self.session.codecs();
        let codec = self.codec();

        match E::id_policy() {
            IdPolicy::Sequential { seed } => {
                let id = self.session.allocator().allocate(self.session, entity, seed).await?;
                Ok(Bson::Int32(id))
            }
            policy => {
                if policy == IdPolicy::Generated {
                    codec.ensure_identifier(entity, codecs)?;
                }
                let id = codec.resolve_identifier(entity, codecs)?;
                let document = codec.encode(entity, codecs)?;

                self.session.backend().insert_document(self.name(), document).await?;
                Ok(id)
            }
        }
    }

    /// Inserts entities one after another, stopping at the first failure.
    pub async fn insert_many(&self, entities: &mut [E]) -> DocumentStoreResult<Vec<Bson>> {
        let mut ids = Vec::with_capacity(entities.len());
        for entity in entities.iter_mut() {
            ids.push(self.insert(entity).await?);
        }
        Ok(ids)
    }

    /// Inserts or replaces an entity.
    ///
    /// A sequential entity without an identifier goes through [`insert`](Self::insert) so
    /// it is allocated one.
    pub async fn save(&self, entity: &mut E) -> DocumentStoreResult<Bson> {
        let codecs = self.session.codecs();
        let codec = self.codec();

        match E::id_policy() {
            IdPolicy::Sequential { .. } if !self.has_identifier(entity)? => return self.insert(entity).await,
            IdPolicy::Generated => {
                codec.ensure_identifier(entity, codecs)?;
            }
            _ => {}
        }

        let id = codec.resolve_identifier(entity, codecs)?;
        let document = codec.encode(entity, codecs)?;
        self.session
            .backend()
            .replace_document(self.name(), document, true)
            .await?;

        Ok(id)
    }

    pub async fn get(&self, id: impl Into<Bson>) -> DocumentStoreResult<Option<E>> {
        self.session
            .backend()
            .get_document(self.name(), &id.into())
            .await?
            .map(|document| self.session.decode(document))
            .transpose()
    }

    /// Like [`get`](Self::get), but a missing document is a
    /// [`DocumentStoreError::DocumentNotFound`] error.
    pub async fn get_required(&self, id: impl Into<Bson>) -> DocumentStoreResult<E> {
        let id = id.into();

        match self.get(id.clone()).await? {
            Some(entity) => Ok(entity),
            None => Err(DocumentStoreError::DocumentNotFound(id.to_string(), self.name().to_string())),
        }
    }

    /// Deletes the stored document of `entity`, returning `true` if one was removed.
    pub async fn delete(&self, entity: &E) -> DocumentStoreResult<bool> {
        let id = self.codec().resolve_identifier(entity, self.session.codecs())?;
        self.delete_by_id(id).await
    }

    pub async fn delete_by_id(&self, id: impl Into<Bson>) -> DocumentStoreResult<bool> {
        self.session
            .backend()
            .delete_document(self.name(), &id.into())
            .await
    }

    /// Deletes every entity matching the query filter, returning how many were removed.
    pub async fn delete_by_query(&self, query: &Query) -> DocumentStoreResult<u64> {
        self.session
            .backend()
            .delete_documents(self.name(), query)
            .await
    }

    pub async fn find(&self, query: &Query) -> DocumentStoreResult<Vec<E>> {
        self.session
            .backend()
            .find_documents(self.name(), query)
            .await?
            .into_iter()
            .map(|document| self.session.decode(document))
            .collect()
    }

    pub async fn find_one(&self, query: &Query) -> DocumentStoreResult<Option<E>> {
        let query = Query {
            limit: Some(1),
            ..query.clone()
        };

        Ok(self.find(&query).await?.into_iter().next())
    }

    /// Returns only the identifiers of the matching documents.
    pub async fn find_ids(&self, query: &Query) -> DocumentStoreResult<Vec<Bson>> {
        let query = Query {
            projection: Some(vec![ID_FIELD.to_string()]),
            ..query.clone()
        };

        Ok(self
            .session
            .backend()
            .find_documents(self.name(), &query)
            .await?
            .into_iter()
            .filter_map(|mut document| document.remove(ID_FIELD))
            .collect())
    }

    pub async fn count(&self, query: &Query) -> DocumentStoreResult<u64> {
        self.session
            .backend()
            .count_documents(self.name(), query)
            .await
    }

    /// Returns `true` if at least one stored entity matches the query filter.
    pub async fn exists(&self, query: &Query) -> DocumentStoreResult<bool> {
        let first_match = Query {
            limit: Some(1),
            offset: None,
            sort: None,
            projection: Some(vec![ID_FIELD.to_string()]),
            ..query.clone()
        };

        Ok(!self
            .session
            .backend()
            .find_documents(self.name(), &first_match)
            .await?
            .is_empty())
    }

    /// Returns one page of the matching entities.
    ///
    /// The query's own limit and offset are replaced by those of `params`.
    pub async fn find_page(&self, query: &Query, params: PaginationParams) -> DocumentStoreResult<Page<E>> {
        let count = self.count(query).await?;
        let query = Query {
            offset: Some(params.offset()),
            limit: Some(params.per_page),
            ..query.clone()
        };
        let items = self.find(&query).await?;

        Ok(params.page_of(items, usize::try_from(count).unwrap_or(usize::MAX)))
    }

    /// Drops the whole collection.
    pub async fn drop(&self) -> DocumentStoreResult<()> {
        self.session.drop_collection(self.name()).await
    }

    fn has_identifier(&self, entity: &E) -> DocumentStoreResult<bool> {
        match self.codec().resolve_identifier(entity, self.session.codecs()) {
            Ok(_) => Ok(true),
            Err(DocumentStoreError::MissingIdentifier(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }
}
