//! Database connectors.
//!
//! The migration core only talks to databases through [`DocumentSource`] and
//! [`DocumentSink`]. [`mongodb::MongoConnector`] implements both against a
//! live server; [`memory::MemoryDatabase`] implements both in process.

pub mod memory;
pub mod mongodb;

use async_trait::async_trait;

pub use bson::Document;

use crate::config::EndpointConfig;
use crate::error::Result;

/// Which end of the migration a connector serves.
///
/// Only used to pick the right connection error variant and log prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Database being read.
    Source,
    /// Database being written.
    Destination,
}

impl Side {
    /// Lowercase name for logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Destination => "destination",
        }
    }
}

/// Read access to the database being migrated.
///
/// Implement this trait to read from a new kind of document store.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Get the source type name.
    fn source_type(&self) -> &'static str;

    /// Connect to the source and verify it answers.
    async fn connect(&mut self) -> Result<()>;

    /// All collection names, in the order the database reports them.
    async fn list_collections(&self) -> Result<Vec<String>>;

    /// Number of documents in `collection`.
    async fn count_documents(&self, collection: &str) -> Result<u64>;

    /// Documents `[skip, skip + limit)` of `collection` in natural order.
    async fn fetch_page(&self, collection: &str, skip: u64, limit: usize)
        -> Result<Vec<Document>>;

    /// Close the connection and cleanup resources.
    async fn close(&mut self) -> Result<()>;
}

/// Write access to the database receiving the migration.
#[async_trait]
pub trait DocumentSink: Send + Sync {
    /// Get the sink type name.
    fn sink_type(&self) -> &'static str;

    /// Connect to the destination and verify it answers.
    async fn connect(&mut self) -> Result<()>;

    /// All collection names currently in the destination.
    async fn list_collections(&self) -> Result<Vec<String>>;

    /// Drops `collection`. Dropping a missing collection is not an error.
    async fn drop_collection(&self, collection: &str) -> Result<()>;

    /// Unordered bulk insert. Creates the collection if absent.
    ///
    /// Returns the number of inserted documents.
    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> Result<u64>;

    /// First document whose fields equal every field of `filter`.
    async fn find_one(&self, collection: &str, filter: Document) -> Result<Option<Document>>;

    /// Inserts a single document.
    async fn insert_one(&self, collection: &str, document: Document) -> Result<()>;

    /// Close the connection and cleanup resources.
    async fn close(&mut self) -> Result<()>;
}

/// Create a MongoDB source connector from an endpoint.
#[must_use]
pub fn create_source(endpoint: &EndpointConfig) -> Box<dyn DocumentSource> {
    Box::new(mongodb::MongoConnector::new(endpoint.clone(), Side::Source))
}

/// Create a MongoDB destination connector from an endpoint.
#[must_use]
pub fn create_sink(endpoint: &EndpointConfig) -> Box<dyn DocumentSink> {
    Box::new(mongodb::MongoConnector::new(
        endpoint.clone(),
        Side::Destination,
    ))
}
