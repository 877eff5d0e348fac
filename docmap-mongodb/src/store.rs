use async_trait::async_trait;
use bson::{Bson, Document, doc};
use futures::TryStreamExt;
use mongodb::{
    Client, Collection as MongoCollection,
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::{ClientOptions, FindOptions},
};
use std::sync::Arc;
use tracing::{debug, trace};

use docmap_core::{
    backend::{StoreBackend, StoreBackendBuilder, StoreConnector},
    descriptor::ID_FIELD,
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Query, SortDirection},
};

/// Server error code reported for unique index violations.
const DUPLICATE_KEY: i32 = 11000;

fn backend_error(err: MongoError) -> DocumentStoreError {
    DocumentStoreError::Backend(err.to_string())
}

fn is_duplicate_key(err: &MongoError) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY
    )
}

fn id_filter(id: &Bson) -> Document {
    doc! { ID_FIELD: id.clone() }
}

fn document_id(document: &Document, collection: &str) -> DocumentStoreResult<Bson> {
    document.get(ID_FIELD).cloned().ok_or_else(|| {
        DocumentStoreError::InvalidDocument(format!("document written to {collection} has no {ID_FIELD} field"))
    })
}

/// Builds the server-side projection. `_id` is excluded unless listed, so results carry
/// exactly the requested keys.
fn projection_of(fields: &[String]) -> Document {
    let mut projection: Document = fields.iter().map(|field| (field.clone(), Bson::Int32(1))).collect();

    if !fields.iter().any(|field| field == ID_FIELD) {
        projection.insert(ID_FIELD, 0);
    }
    projection
}

/// Translates the paging, sort and projection parts of a query. Sizes beyond the
/// driver's integer range saturate.
fn find_options(query: &Query) -> FindOptions {
    let mut options = FindOptions::default();

    if let Some(limit) = query.limit {
        options.limit = Some(i64::try_from(limit).unwrap_or(i64::MAX));
    }
    if let Some(skip) = query.offset {
        options.skip = Some(u64::try_from(skip).unwrap_or(u64::MAX));
    }
    if let Some(sort) = &query.sort {
        options.sort = Some(doc! {
            sort.field.clone(): match sort.direction {
                SortDirection::Asc => 1,
                SortDirection::Desc => -1,
            }
        })
    }
    if let Some(fields) = &query.projection {
        options.projection = Some(projection_of(fields));
    }

    options
}

/// [`StoreBackend`] over one MongoDB database.
///
/// Uniqueness of `_id` is enforced by the server; duplicate-key write errors surface as
/// [`DocumentStoreError::DocumentAlreadyExists`].
#[derive(Debug, Clone)]
pub struct MongoDbStore {
    client: Client,
    database: String,
}

impl MongoDbStore {
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn, database)
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.client.database(&self.database).collection(collection_name)
    }

    async fn shutdown(self) -> DocumentStoreResult<()> {
        self.client.shutdown().await;

        Ok(())
    }
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    async fn insert_document(&self, collection: &str, document: Document) -> DocumentStoreResult<()> {
        let id = document_id(&document, collection)?;

        match self.get_collection(collection).insert_one(document).await {
            Ok(_) => Ok(()),
            Err(err) if is_duplicate_key(&err) => {
                debug!(database = %self.database, collection, id = %id, "duplicate key on insert");
                Err(DocumentStoreError::DocumentAlreadyExists(
                    id.to_string(),
                    collection.to_string(),
                ))
            }
            Err(err) => Err(backend_error(err)),
        }
    }

    async fn replace_document(&self, collection: &str, document: Document, upsert: bool) -> DocumentStoreResult<bool> {
        let id = document_id(&document, collection)?;

        let result = self
            .get_collection(collection)
            .replace_one(id_filter(&id), document)
            .upsert(upsert)
            .await
            .map_err(backend_error)?;

        Ok(result.matched_count > 0 || result.upserted_id.is_some())
    }

    async fn delete_document(&self, collection: &str, id: &Bson) -> DocumentStoreResult<bool> {
        let result = self
            .get_collection(collection)
            .delete_one(id_filter(id))
            .await
            .map_err(backend_error)?;

        Ok(result.deleted_count > 0)
    }

    async fn delete_documents(&self, collection: &str, query: &Query) -> DocumentStoreResult<u64> {
        let result = self
            .get_collection(collection)
            .delete_many(query.filter.clone())
            .await
            .map_err(backend_error)?;

        Ok(result.deleted_count)
    }

    async fn get_document(&self, collection: &str, id: &Bson) -> DocumentStoreResult<Option<Document>> {
        self.get_collection(collection)
            .find_one(id_filter(id))
            .await
            .map_err(backend_error)
    }

    async fn find_documents(&self, collection: &str, query: &Query) -> DocumentStoreResult<Vec<Document>> {
        let options = find_options(query);

        trace!(database = %self.database, collection, filter = %query.filter, "finding documents");

        self.get_collection(collection)
            .find(query.filter.clone())
            .with_options(options)
            .await
            .map_err(backend_error)?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(backend_error)
    }

    async fn count_documents(&self, collection: &str, query: &Query) -> DocumentStoreResult<u64> {
        self.get_collection(collection)
            .count_documents(query.filter.clone())
            .await
            .map_err(backend_error)
    }

    async fn drop_collection(&self, collection: &str) -> DocumentStoreResult<()> {
        self.get_collection(collection)
            .drop()
            .await
            .map_err(backend_error)
    }

    async fn shutdown(self) -> DocumentStoreResult<()> {
        self.shutdown().await
    }
}

pub struct MongoDbStoreBuilder {
    dsn: String,
    database: String,
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
        }
    }
}

async fn connect_client(dsn: &str) -> DocumentStoreResult<Client> {
    Client::with_options(
        ClientOptions::parse(dsn)
            .await
            .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?,
    )
    .map_err(|e| DocumentStoreError::Initialization(e.to_string()))
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        Ok(MongoDbStore::new(connect_client(&self.dsn).await?, self.database))
    }
}

/// Connector used by a [`ConnectionRegistry`](docmap_core::registry::ConnectionRegistry) to
/// open MongoDB clients.
///
/// Each client owns a connection pool, so the registry keeps one per connection string and
/// opens every database of that string on it.
#[derive(Debug, Default, Clone, Copy)]
pub struct MongoConnector;

#[async_trait]
impl StoreConnector for MongoConnector {
    type Client = Client;
    type Backend = MongoDbStore;

    async fn connect(&self, connection_string: &str) -> DocumentStoreResult<Self::Client> {
        connect_client(connection_string).await
    }

    fn open(&self, client: &Arc<Self::Client>, database: &str) -> DocumentStoreResult<Self::Backend> {
        Ok(MongoDbStore::new(Client::clone(client), database.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projection_hides_id_unless_requested() {
        assert_eq!(projection_of(&["name".to_string()]), doc! { "name": 1, "_id": 0 });
        assert_eq!(projection_of(&["_id".to_string()]), doc! { "_id": 1 });
    }

    #[test]
    fn writes_require_an_identifier() {
        let err = document_id(&doc! { "name": "x" }, "people").unwrap_err();

        assert!(matches!(err, DocumentStoreError::InvalidDocument(_)));
        assert_eq!(document_id(&doc! { "_id": 4 }, "people").unwrap(), Bson::Int32(4));
    }

    #[test]
    fn oversized_limits_saturate() {
        let query = Query::builder().limit(usize::MAX).offset(3).build();

        let options = find_options(&query);

        assert_eq!(options.limit, Some(i64::MAX));
        assert_eq!(options.skip, Some(3));
    }
}
