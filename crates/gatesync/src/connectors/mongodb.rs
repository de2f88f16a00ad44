//! MongoDB connector.
//!
//! Uses the official async driver. One type serves both ends of the
//! migration; [`Side`] only decides which connection error is raised.

use ::mongodb::options::{ClientOptions, FindOptions, InsertManyOptions};
use ::mongodb::{Client, Collection, Database};
use async_trait::async_trait;
use bson::doc;
use futures::TryStreamExt;
use tracing::{debug, info};

use crate::config::EndpointConfig;
use crate::connectors::{Document, DocumentSink, DocumentSource, Side};
use crate::error::{Error, Result};

const APP_NAME: &str = "gatesync";

/// Server-managed namespaces that cannot be written by clients.
const SYSTEM_PREFIX: &str = "system.";

/// MongoDB connector.
pub struct MongoConnector {
    endpoint: EndpointConfig,
    side: Side,
    client: Option<Client>,
    database: Option<Database>,
}

impl MongoConnector {
    /// Creates an unconnected connector for `endpoint`.
    pub fn new(endpoint: EndpointConfig, side: Side) -> Self {
        Self {
            endpoint,
            side,
            client: None,
            database: None,
        }
    }

    fn connection_error(&self, err: impl std::fmt::Display) -> Error {
        let message = format!("database '{}': {}", self.endpoint.database, err);
        match self.side {
            Side::Source => Error::SourceConnection(message),
            Side::Destination => Error::DestinationConnection(message),
        }
    }

    fn database(&self) -> Result<&Database> {
        self.database
            .as_ref()
            .ok_or_else(|| self.connection_error("not connected"))
    }

    fn collection(&self, name: &str) -> Result<Collection<Document>> {
        Ok(self.database()?.collection::<Document>(name))
    }

    async fn open(&mut self) -> Result<()> {
        let mut options = ClientOptions::parse(&self.endpoint.uri)
            .await
            .map_err(|e| self.connection_error(e))?;
        options.app_name = Some(APP_NAME.to_string());

        let client = Client::with_options(options).map_err(|e| self.connection_error(e))?;
        let database = client.database(&self.endpoint.database);

        // The driver connects lazily; ping so bad endpoints fail here.
        database
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| self.connection_error(e))?;

        info!(
            "Connected to {} database '{}'",
            self.side.as_str(),
            self.endpoint.database
        );

        self.client = Some(client);
        self.database = Some(database);
        Ok(())
    }

    async fn collection_names(&self) -> Result<Vec<String>> {
        let names = self
            .database()?
            .list_collection_names(None)
            .await
            .map_err(|e| Error::query(&self.endpoint.database, e))?;

        Ok(names
            .into_iter()
            .filter(|name| {
                let system = name.starts_with(SYSTEM_PREFIX);
                if system {
                    debug!("Skipping system collection '{}'", name);
                }
                !system
            })
            .collect())
    }

    fn shutdown(&mut self) {
        self.database = None;
        if self.client.take().is_some() {
            debug!("Closed {} connection", self.side.as_str());
        }
    }
}

#[async_trait]
impl DocumentSource for MongoConnector {
    fn source_type(&self) -> &'static str {
        "mongodb"
    }

    async fn connect(&mut self) -> Result<()> {
        self.open().await
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        self.collection_names().await
    }

    async fn count_documents(&self, collection: &str) -> Result<u64> {
        self.collection(collection)?
            .count_documents(doc! {}, None)
            .await
            .map_err(|e| Error::query(collection, e))
    }

    async fn fetch_page(
        &self,
        collection: &str,
        skip: u64,
        limit: usize,
    ) -> Result<Vec<Document>> {
        let limit = i64::try_from(limit)
            .map_err(|_| Error::Config(format!("page size {limit} is too large")))?;
        let options = FindOptions::builder().skip(skip).limit(limit).build();

        let cursor = self
            .collection(collection)?
            .find(doc! {}, options)
            .await
            .map_err(|e| Error::query(collection, e))?;

        cursor
            .try_collect()
            .await
            .map_err(|e| Error::query(collection, e))
    }

    async fn close(&mut self) -> Result<()> {
        self.shutdown();
        Ok(())
    }
}

#[async_trait]
impl DocumentSink for MongoConnector {
    fn sink_type(&self) -> &'static str {
        "mongodb"
    }

    async fn connect(&mut self) -> Result<()> {
        self.open().await
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        self.collection_names().await
    }

    async fn drop_collection(&self, collection: &str) -> Result<()> {
        self.collection(collection)?
            .drop(None)
            .await
            .map_err(|e| Error::query(collection, e))
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> Result<u64> {
        // The driver rejects empty batches.
        if documents.is_empty() {
            return Ok(0);
        }

        let options = InsertManyOptions::builder().ordered(false).build();
        let result = self
            .collection(collection)?
            .insert_many(documents, options)
            .await
            .map_err(|e| Error::insert(collection, e))?;

        Ok(result.inserted_ids.len() as u64)
    }

    async fn find_one(&self, collection: &str, filter: Document) -> Result<Option<Document>> {
        self.collection(collection)?
            .find_one(filter, None)
            .await
            .map_err(|e| Error::query(collection, e))
    }

    async fn insert_one(&self, collection: &str, document: Document) -> Result<()> {
        self.collection(collection)?
            .insert_one(document, None)
            .await
            .map(|_| ())
            .map_err(|e| Error::insert(collection, e))
    }

    async fn close(&mut self) -> Result<()> {
        self.shutdown();
        Ok(())
    }
}

#[cfg(test)]
#[path = "mongodb_tests.rs"]
mod tests;
