use async_trait::async_trait;
use bson::{Bson, oid::ObjectId};
use docmap::{
    memory::{InMemoryConnector, InMemoryServer, InMemoryStore},
    prelude::*,
};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::Barrier;

#[derive(Debug, Default, Clone, PartialEq, Persistent, Entity)]
#[entity(collection = "members")]
struct Member {
    #[bson(id)]
    id: Option<ObjectId>,
    name: String,
    team: String,
    rank: i32,
}

#[derive(Debug, Default, Clone, PartialEq, Persistent, Entity)]
#[entity(collection = "country_codes", assigned)]
struct CountryCode {
    #[bson(id)]
    code: Option<String>,
    name: String,
}

fn member(name: &str, team: &str, rank: i32) -> Member {
    Member {
        id: None,
        name: name.to_string(),
        team: team.to_string(),
        rank,
    }
}

fn settings() -> HashMap<String, String> {
    HashMap::from([
        ("main".to_string(), "localhost:27017/app".to_string()),
        ("bare".to_string(), "localhost:27017".to_string()),
    ])
}

fn registry() -> ConnectionRegistry<InMemoryConnector> {
    ConnectionRegistry::new(InMemoryConnector::new(), settings())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_first_calls_share_one_session() {
    let registry = Arc::new(registry());

    let tasks: Vec<_> = (0..50)
        .map(|_| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.session("main", Some("db")).await })
        })
        .collect();

    let mut sessions = Vec::with_capacity(tasks.len());
    for task in tasks {
        sessions.push(task.await.unwrap().unwrap());
    }

    let first = &sessions[0];
    assert!(sessions.iter().all(|session| Arc::ptr_eq(first, session)));
    assert_eq!(registry.session_count().await, 1);
    assert_eq!(registry.client_count().await, 1);

    let later = registry.session("main", Some("db")).await.unwrap();
    assert!(Arc::ptr_eq(first, &later));
}

/// Holds every caller inside `connect` until `width` of them have arrived, so all of them
/// miss the published client.
#[derive(Debug)]
struct Lockstep {
    inner: InMemoryConnector,
    gate: Barrier,
}

impl Lockstep {
    fn new(width: usize) -> Self {
        Self {
            inner: InMemoryConnector::new(),
            gate: Barrier::new(width),
        }
    }
}

#[async_trait]
impl StoreConnector for Lockstep {
    type Client = InMemoryServer;
    type Backend = InMemoryStore;

    async fn connect(&self, connection_string: &str) -> DocumentStoreResult<InMemoryServer> {
        let client = self.inner.connect(connection_string).await?;
        self.gate.wait().await;
        Ok(client)
    }

    fn open(&self, client: &Arc<InMemoryServer>, database: &str) -> DocumentStoreResult<InMemoryStore> {
        self.inner.open(client, database)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_callers_discard_their_candidates() {
    let width = 6;
    let registry = Arc::new(ConnectionRegistry::new(Lockstep::new(width), settings()));

    let tasks: Vec<_> = (0..width)
        .map(|_| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.session("main", None).await })
        })
        .collect();

    let mut sessions = Vec::with_capacity(width);
    for task in tasks {
        sessions.push(task.await.unwrap().unwrap());
    }

    assert_eq!(registry.connector().inner.connections(), width);
    assert!(sessions.iter().all(|session| Arc::ptr_eq(&sessions[0], session)));
    assert_eq!(registry.client_count().await, 1);
    assert_eq!(registry.session_count().await, 1);

    let client = registry.client("mongodb://localhost:27017/app").await.unwrap();
    sessions[0].collection::<Member>().insert(&mut member("Ada", "red", 1)).await.unwrap();
    assert_eq!(client.database_names().await, vec!["app".to_string()]);
}

#[tokio::test]
async fn databases_of_one_connection_share_the_client() {
    let registry = registry();

    let left = registry.session("main", Some("left")).await.unwrap();
    let right = registry.session("main", Some("right")).await.unwrap();
    left.collection::<Member>().insert(&mut member("Ada", "red", 1)).await.unwrap();

    assert!(!Arc::ptr_eq(&left, &right));
    assert_eq!(registry.client_count().await, 1);
    assert_eq!(registry.session_count().await, 2);
    assert_eq!(registry.connector().connections(), 1);
    assert_eq!(right.collection::<Member>().count(&Query::new()).await.unwrap(), 0);

    let client = registry.client("mongodb://localhost:27017/app").await.unwrap();
    assert_eq!(client.database_names().await, vec!["left".to_string()]);
}

#[tokio::test]
async fn database_defaults_to_the_connection_string_path() {
    let registry = registry();

    let implicit = registry.session("main", None).await.unwrap();
    let explicit = registry.session("main", Some("app")).await.unwrap();

    assert_eq!(implicit.database(), "app");
    assert!(Arc::ptr_eq(&implicit, &explicit));
}

#[tokio::test]
async fn configured_database_wins_over_the_path() {
    let settings = ConnectionSettings::from_json(
        r#"{ "databases": [ { "name": "audit", "url": "localhost/ignored", "database": "events" } ] }"#,
    )
    .unwrap();
    let registry = ConnectionRegistry::new(InMemoryConnector::new(), settings);

    let session = registry.session("audit", None).await.unwrap();

    assert_eq!(session.database(), "events");
}

#[tokio::test]
async fn unresolvable_sessions_are_configuration_errors() {
    let registry = registry();

    assert!(matches!(
        registry.session("missing", Some("db")).await,
        Err(DocumentStoreError::Configuration(_))
    ));
    assert!(matches!(
        registry.session("bare", None).await,
        Err(DocumentStoreError::Configuration(_))
    ));
    assert_eq!(registry.session_count().await, 0);
    assert_eq!(registry.connector().connections(), 0);
}

#[tokio::test]
async fn builder_settings_reach_every_session() {
    let registry = ConnectionRegistry::builder(InMemoryConnector::new(), settings())
        .codecs(CodecRegistry::builder().without_defaults().build())
        .max_attempts(3)
        .build();

    let session = registry.session("main", None).await.unwrap();

    assert_eq!(session.allocator().max_attempts(), 3);
    assert!(Arc::ptr_eq(session.codecs(), registry.codecs()));
    assert!(matches!(
        session.encode(&member("Ada", "red", 1)),
        Err(DocumentStoreError::Field { .. })
    ));
}

#[tokio::test]
async fn crud_through_a_registry_session() {
    let registry = registry();
    let session = registry.session("main", None).await.unwrap();
    let members = session.collection::<Member>();

    let mut roster = vec![
        member("Ada", "red", 3),
        member("Grace", "blue", 1),
        member("Linus", "red", 2),
        member("Barbara", "red", 5),
        member("Ken", "blue", 4),
    ];
    let ids = members.insert_many(&mut roster).await.unwrap();
    assert_eq!(ids.len(), 5);
    assert!(roster.iter().all(|member| member.id.is_some()));

    let reds = Query::builder()
        .eq("team", "red")
        .sort("rank", SortDirection::Asc)
        .build();
    let names: Vec<_> = members
        .find(&reds)
        .await
        .unwrap()
        .into_iter()
        .map(|member| member.name)
        .collect();
    assert_eq!(names, vec!["Linus", "Ada", "Barbara"]);

    let top = members
        .find_one(&Query::builder().sort("rank", SortDirection::Desc).build())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(top.name, "Barbara");

    let blue_ids = members.find_ids(&Query::eq("team", "blue")).await.unwrap();
    assert_eq!(blue_ids.len(), 2);
    assert!(blue_ids.iter().all(|id| matches!(id, Bson::ObjectId(_))));

    let mut grace = members.get_required(ids[1].clone()).await.unwrap();
    grace.rank = 9;
    members.save(&mut grace).await.unwrap();
    assert_eq!(members.get(ids[1].clone()).await.unwrap().unwrap().rank, 9);

    assert!(members.delete(&grace).await.unwrap());
    assert!(!members.delete_by_id(ids[1].clone()).await.unwrap());
    assert!(matches!(
        members.get_required(ids[1].clone()).await,
        Err(DocumentStoreError::DocumentNotFound(..))
    ));
    assert_eq!(members.count(&Query::new()).await.unwrap(), 4);

    let blues = Query::eq("team", "blue");
    assert!(members.exists(&blues).await.unwrap());
    assert_eq!(members.delete_by_query(&blues).await.unwrap(), 1);
    assert!(!members.exists(&blues).await.unwrap());
    assert!(members.exists(&Query::new()).await.unwrap());
    assert_eq!(members.count(&Query::new()).await.unwrap(), 3);

    members.drop().await.unwrap();
    assert_eq!(members.count(&Query::new()).await.unwrap(), 0);
}

#[tokio::test]
async fn pages_report_neighbours() {
    let registry = registry();
    let session = registry.session("main", None).await.unwrap();
    let members = session.collection::<Member>();

    for rank in 1..=5 {
        members
            .insert(&mut member(&format!("m{rank}"), "red", rank))
            .await
            .unwrap();
    }
    let by_rank = Query::builder().sort("rank", SortDirection::Asc).build();

    let second = members.find_page(&by_rank, PaginationParams::new(2, 2)).await.unwrap();
    let ranks: Vec<_> = second.items.iter().map(|member| member.rank).collect();
    assert_eq!(ranks, vec![3, 4]);
    assert_eq!(second.count, 5);
    assert_eq!(second.previous_page, Some(1));
    assert_eq!(second.next_page, Some(3));

    let last = members.find_page(&by_rank, PaginationParams::new(3, 2)).await.unwrap();
    assert_eq!(last.items.len(), 1);
    assert_eq!(last.next_page, None);
}

#[tokio::test]
async fn assigned_identifiers_must_be_present_and_unique() {
    let registry = registry();
    let session = registry.session("main", None).await.unwrap();
    let codes = session.collection::<CountryCode>();

    let mut unnamed = CountryCode {
        code: None,
        name: "Nowhere".to_string(),
    };
    assert!(matches!(
        codes.insert(&mut unnamed).await,
        Err(DocumentStoreError::MissingIdentifier(_))
    ));
    assert_eq!(unnamed.code, None);

    let mut norway = CountryCode {
        code: Some("NO".to_string()),
        name: "Norway".to_string(),
    };
    assert_eq!(codes.insert(&mut norway).await.unwrap(), Bson::from("NO"));

    let err = codes.insert(&mut norway.clone()).await.unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(codes.get("NO").await.unwrap(), Some(norway));
}
