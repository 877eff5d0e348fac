use async_trait::async_trait;
use bson::{Bson, Document, doc};
use docmap::{memory::InMemoryStore, prelude::*};
use std::{
    collections::BTreeSet,
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
};

#[derive(Debug, Default, Clone, PartialEq, Persistent, Entity)]
#[entity(collection = "tickets", sequential)]
struct Ticket {
    #[bson(id)]
    id: Option<i32>,
    title: String,
}

#[derive(Debug, Default, Clone, PartialEq, Persistent, Entity)]
#[entity(collection = "invoices", sequential, seed = 1000)]
struct Invoice {
    #[bson(id)]
    id: Option<i32>,
    amount: i64,
}

fn ticket(title: &str) -> Ticket {
    Ticket {
        id: None,
        title: title.to_string(),
    }
}

fn session() -> Session<InMemoryStore> {
    Session::new(InMemoryStore::new(), Arc::new(CodecRegistry::standard()), "default")
}

/// Backend where a rival writer claims the candidate identifier, and the one after it,
/// right before each of the first `rivals` inserts.
#[derive(Debug)]
struct Contended {
    inner: InMemoryStore,
    rivals: AtomicU32,
}

impl Contended {
    fn new(rivals: u32) -> Self {
        Self {
            inner: InMemoryStore::new(),
            rivals: AtomicU32::new(rivals),
        }
    }

    fn take_rival(&self) -> bool {
        self.rivals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl StoreBackend for Contended {
    async fn insert_document(&self, collection: &str, document: Document) -> DocumentStoreResult<()> {
        if self.take_rival() {
            let candidate = document.get_i32("_id").unwrap();
            self.inner
                .insert_document(collection, doc! { "_id": candidate, "rival": true })
                .await?;
            self.inner
                .insert_document(collection, doc! { "_id": candidate + 1, "rival": true })
                .await?;
        }
        self.inner.insert_document(collection, document).await
    }

    async fn replace_document(&self, collection: &str, document: Document, upsert: bool) -> DocumentStoreResult<bool> {
        self.inner.replace_document(collection, document, upsert).await
    }

    async fn delete_document(&self, collection: &str, id: &Bson) -> DocumentStoreResult<bool> {
        self.inner.delete_document(collection, id).await
    }

    async fn delete_documents(&self, collection: &str, query: &Query) -> DocumentStoreResult<u64> {
        self.inner.delete_documents(collection, query).await
    }

    async fn get_document(&self, collection: &str, id: &Bson) -> DocumentStoreResult<Option<Document>> {
        self.inner.get_document(collection, id).await
    }

    async fn find_documents(&self, collection: &str, query: &Query) -> DocumentStoreResult<Vec<Document>> {
        self.inner.find_documents(collection, query).await
    }

    async fn count_documents(&self, collection: &str, query: &Query) -> DocumentStoreResult<u64> {
        self.inner.count_documents(collection, query).await
    }

    async fn drop_collection(&self, collection: &str) -> DocumentStoreResult<()> {
        self.inner.drop_collection(collection).await
    }
}

#[tokio::test]
async fn allocates_from_the_seed_upwards() {
    let session = session();
    let tickets = session.collection::<Ticket>();

    let mut allocated = Vec::new();
    for title in ["first", "second", "third"] {
        let mut entity = ticket(title);
        tickets.insert(&mut entity).await.unwrap();
        allocated.push(entity.id.unwrap());
    }

    assert_eq!(allocated, vec![1, 2, 3]);
    assert_eq!(tickets.get(2).await.unwrap(), Some(Ticket { id: Some(2), title: "second".to_string() }));
}

#[tokio::test]
async fn declared_seed_starts_an_empty_collection() {
    let session = session();
    let invoices = session.collection::<Invoice>();

    let mut first = Invoice { id: None, amount: 10 };
    let mut second = Invoice { id: None, amount: 20 };

    assert_eq!(invoices.insert(&mut first).await.unwrap(), Bson::Int32(1000));
    assert_eq!(invoices.insert(&mut second).await.unwrap(), Bson::Int32(1001));
}

#[tokio::test]
async fn allocation_continues_after_the_stored_maximum() {
    let session = session();
    session
        .backend()
        .insert_document("tickets", doc! { "_id": 41i64, "title": "imported" })
        .await
        .unwrap();

    let mut entity = ticket("next");
    session.collection::<Ticket>().insert(&mut entity).await.unwrap();

    assert_eq!(entity.id, Some(42));
}

#[tokio::test]
async fn conflicts_recompute_the_candidate() {
    let session = Session::new(Contended::new(9), Arc::new(CodecRegistry::standard()), "default");
    let mut entity = ticket("contended");

    let id = session.allocator().allocate(&session, &mut entity, 1).await.unwrap();

    // Every lost attempt sees the rival's higher maximum, so candidates go 1, 3, ..., 19.
    assert_eq!(id, 19);
    assert_eq!(entity.id, Some(19));
    let stored = session.collection::<Ticket>().get(19).await.unwrap();
    assert_eq!(stored, Some(entity));
}

#[tokio::test]
async fn exhausted_budget_fails_without_writing() {
    let session = Session::new(Contended::new(10), Arc::new(CodecRegistry::standard()), "default");
    let tickets = session.collection::<Ticket>();
    let mut entity = ticket("never stored");

    let err = tickets.insert(&mut entity).await.unwrap_err();

    match err {
        DocumentStoreError::SequenceConflict {
            collection,
            last_id,
            attempts,
        } => {
            assert_eq!(collection, "tickets");
            assert_eq!(last_id, 19);
            assert_eq!(attempts, 10);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(entity.id, None);
    assert_eq!(tickets.count(&Query::eq("rival", Bson::Null)).await.unwrap(), 0);
    assert_eq!(tickets.count(&Query::new()).await.unwrap(), 20);
}

#[tokio::test]
async fn smaller_budgets_give_up_sooner() {
    let session = Session::new(Contended::new(3), Arc::new(CodecRegistry::standard()), "default")
        .with_allocator(SequentialIdAllocator::new(2));
    let mut entity = ticket("impatient");

    let err = session.collection::<Ticket>().insert(&mut entity).await.unwrap_err();

    assert!(matches!(
        err,
        DocumentStoreError::SequenceConflict { last_id: 3, attempts: 2, .. }
    ));
}

#[tokio::test]
async fn failed_allocation_restores_the_previous_identifier() {
    let session = Session::new(Contended::new(10), Arc::new(CodecRegistry::standard()), "default");
    let mut entity = Ticket {
        id: Some(7),
        title: "preset".to_string(),
    };

    assert!(session.allocator().allocate(&session, &mut entity, 1).await.is_err());
    assert_eq!(entity.id, Some(7));
}

#[tokio::test]
async fn non_integer_maximum_is_rejected() {
    let session = session();
    session
        .backend()
        .insert_document("tickets", doc! { "_id": "legacy", "title": "imported" })
        .await
        .unwrap();

    let err = session.collection::<Ticket>().insert(&mut ticket("next")).await.unwrap_err();

    assert!(matches!(err, DocumentStoreError::InvalidDocument(_)));
}

#[tokio::test]
async fn exhausted_range_is_rejected() {
    let session = session();
    session
        .backend()
        .insert_document("tickets", doc! { "_id": i32::MAX, "title": "last" })
        .await
        .unwrap();

    let err = session.collection::<Ticket>().insert(&mut ticket("overflow")).await.unwrap_err();

    assert!(matches!(err, DocumentStoreError::InvalidDocument(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_inserts_get_distinct_identifiers() {
    let session = Arc::new(session());

    let tasks: Vec<_> = (0..8)
        .map(|n| {
            let session = Arc::clone(&session);
            tokio::spawn(async move {
                let mut entity = ticket(&format!("task {n}"));
                session.collection::<Ticket>().insert(&mut entity).await.map(|_| entity.id)
            })
        })
        .collect();

    let mut ids = BTreeSet::new();
    for task in tasks {
        ids.insert(task.await.unwrap().unwrap().unwrap());
    }

    assert_eq!(ids, (1..=8).collect());
}

#[tokio::test]
async fn save_allocates_only_when_missing() {
    let session = session();
    let tickets = session.collection::<Ticket>();

    let mut entity = ticket("draft");
    assert_eq!(tickets.save(&mut entity).await.unwrap(), Bson::Int32(1));

    entity.title = "final".to_string();
    assert_eq!(tickets.save(&mut entity).await.unwrap(), Bson::Int32(1));

    assert_eq!(tickets.count(&Query::new()).await.unwrap(), 1);
    assert_eq!(tickets.get_required(1).await.unwrap().title, "final");
}
