//! Top-level persistent types stored in their own collection.

use crate::descriptor::Persistent;

/// Seed used by sequential identifiers when none is declared.
pub const DEFAULT_SEED: i32 = 1;

/// How an entity obtains its identifier before it is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdPolicy {
    /// A fresh ObjectId is generated when the identifier is absent.
    #[default]
    Generated,
    /// The next integer is allocated with optimistic concurrency, starting at `seed`.
    Sequential { seed: i32 },
    /// The caller always supplies the identifier.
    Assigned,
}

impl IdPolicy {
    pub fn sequential() -> Self {
        IdPolicy::Sequential { seed: DEFAULT_SEED }
    }
}

/// A persistent type with its own collection.
///
/// Derive it with `#[derive(Entity)]` alongside `#[derive(Persistent)]`:
///
/// ```ignore
/// #[derive(Debug, Default, Persistent, Entity)]
/// #[entity(collection = "counters", sequential, seed = 100)]
/// struct Counter {
///     #[bson(id)]
///     id: Option<i32>,
///     label: String,
/// }
/// ```
pub trait Entity: Persistent {
    fn collection_name() -> &'static str;

    fn id_policy() -> IdPolicy {
        IdPolicy::Generated
    }
}
