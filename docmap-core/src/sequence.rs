//! Sequential identifiers under optimistic concurrency.
//!
//! Allocation reads the current maximum identifier of the collection, tries to insert the
//! entity with the next value and starts over when another writer got there first. Every
//! attempt recomputes the candidate from the store, since the maximum may have moved by
//! more than one. The loop is bounded: after [`DEFAULT_MAX_ATTEMPTS`] conflicting inserts
//! allocation fails with [`DocumentStoreError::SequenceConflict`].
//!
//! This protocol suits small administrative tables. Under sustained write contention it
//! fails closed rather than spinning.

use bson::Bson;
use tracing::warn;

use crate::{
    backend::StoreBackend,
    codec::DocumentCodec,
    descriptor::ID_FIELD,
    entity::Entity,
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Query, SortDirection},
    session::Session,
};

/// Number of insert attempts before allocation gives up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Progress of one allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationState {
    /// Reading the current maximum identifier.
    Probing { remaining: u32 },
    /// Writing the entity with `candidate` as its identifier.
    Inserting { candidate: i32, remaining: u32 },
    /// `conflicted` was taken by another writer.
    Retrying { conflicted: i32, remaining: u32 },
    Succeeded(i32),
    /// Every attempt conflicted; `conflicted` is the last candidate tried.
    Exhausted { conflicted: i32 },
}

/// Allocates 32-bit sequential identifiers and inserts the entity carrying them.
///
/// The allocator holds no state between calls. Everything it tracks lives in the
/// [`AllocationState`] of the running allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequentialIdAllocator {
    max_attempts: u32,
}

impl SequentialIdAllocator {
    /// Creates an allocator making at most `max_attempts` inserts, and at least one.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Assigns the next identifier of `E`'s collection to `entity` and inserts it.
    ///
    /// `seed` is used when the collection holds no document yet. On failure the entity's
    /// identifier is restored to the value it had before the call.
    ///
    /// # Errors
    ///
    /// - [`DocumentStoreError::SequenceConflict`] when every attempt conflicted.
    /// - [`DocumentStoreError::InvalidDocument`] when the stored maximum is not a 32-bit
    ///   integer, or is `i32::MAX`.
    /// - Any error raised by the backend or the codecs, immediately.
    pub async fn allocate<B, E>(&self, session: &Session<B>, entity: &mut E, seed: i32) -> DocumentStoreResult<i32>
    where
        B: StoreBackend,
        E: Entity,
    {
        let codecs = session.codecs();
        let codec = codecs.document_codec::<E>();

        let original = match codec.resolve_identifier(entity, codecs) {
            Ok(id) => id,
            Err(DocumentStoreError::MissingIdentifier(_)) => Bson::Null,
            Err(err) => return Err(err),
        };

        let allocated = self.run(session, &codec, entity, seed).await;
        if allocated.is_err() {
            codec.assign_identifier(entity, original, codecs)?;
        }

        allocated
    }

    async fn run<B, E>(
        &self,
        session: &Session<B>,
        codec: &DocumentCodec<E>,
        entity: &mut E,
        seed: i32,
    ) -> DocumentStoreResult<i32>
    where
        B: StoreBackend,
        E: Entity,
    {
        let collection = E::collection_name();
        let mut state = AllocationState::Probing {
            remaining: self.max_attempts,
        };

        loop {
            state = match state {
                AllocationState::Probing { remaining } => AllocationState::Inserting {
                    candidate: next_candidate(session, collection, seed).await?,
                    remaining,
                },
                AllocationState::Inserting { candidate, remaining } => {
                    match insert_candidate(session, codec, entity, candidate).await {
                        Ok(()) => AllocationState::Succeeded(candidate),
                        Err(err) if err.is_conflict() => {
                            let remaining = remaining - 1;
                            warn!(collection, id = candidate, remaining, "sequential identifier already exists");
                            AllocationState::Retrying {
                                conflicted: candidate,
                                remaining,
                            }
                        }
                        Err(err) => return Err(err),
                    }
                }
                AllocationState::Retrying { conflicted, remaining: 0 } => AllocationState::Exhausted { conflicted },
                AllocationState::Retrying { remaining, .. } => AllocationState::Probing { remaining },
                AllocationState::Succeeded(id) => return Ok(id),
                AllocationState::Exhausted { conflicted } => {
                    return Err(DocumentStoreError::SequenceConflict {
                        collection: collection.to_string(),
                        last_id: conflicted,
                        attempts: self.max_attempts,
                    });
                }
            };
        }
    }
}

impl Default for SequentialIdAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

async fn insert_candidate<B, E>(
    session: &Session<B>,
    codec: &DocumentCodec<E>,
    entity: &mut E,
    candidate: i32,
) -> DocumentStoreResult<()>
where
    B: StoreBackend,
    E: Entity,
{
    codec.assign_identifier(entity, Bson::Int32(candidate), session.codecs())?;
    let document = codec.encode(entity, session.codecs())?;

    session.backend().insert_document(E::collection_name(), document).await
}

/// Reads the highest stored identifier and returns the one after it, or `seed` for an
/// empty collection.
async fn next_candidate<B: StoreBackend>(session: &Session<B>, collection: &str, seed: i32) -> DocumentStoreResult<i32> {
    let query = Query::builder()
        .project([ID_FIELD])
        .sort(ID_FIELD, SortDirection::Desc)
        .limit(1)
        .build();

    let Some(latest) = session
        .backend()
        .find_documents(collection, &query)
        .await?
        .into_iter()
        .next()
    else {
        return Ok(seed);
    };

    let max = match latest.get(ID_FIELD) {
        Some(Bson::Int32(id)) => *id,
        Some(Bson::Int64(id)) => i32::try_from(*id).map_err(|_| {
            DocumentStoreError::InvalidDocument(format!(
                "identifier {id} in collection {collection} does not fit a 32-bit sequence"
            ))
        })?,
        other => {
            return Err(DocumentStoreError::InvalidDocument(format!(
                "collection {collection} holds a non-integer identifier {other:?}"
            )));
        }
    };

    max.checked_add(1).ok_or_else(|| {
        DocumentStoreError::InvalidDocument(format!("sequential identifiers of collection {collection} are exhausted"))
    })
}
