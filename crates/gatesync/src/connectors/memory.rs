//! In-process document store.
//!
//! Implements both connector traits over a shared map of collections. Clones
//! share state, so a handle kept by the caller observes everything a pipeline
//! did through its own clone. An in-process fake for tests and for embedding
//! the pipeline without a server, with switches to inject failures and
//! latency.

use async_trait::async_trait;
use bson::Bson;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::connectors::{Document, DocumentSink, DocumentSource};
use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct State {
    collections: BTreeMap<String, Vec<Document>>,
    dropped: Vec<String>,
    refuse_connections: bool,
    failing_inserts: HashSet<String>,
    failing_queries: HashSet<String>,
    latency: Option<Duration>,
    writes: u64,
}

/// In-memory database shared between clones.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    state: Arc<Mutex<State>>,
}

impl MemoryDatabase {
    /// Creates an empty database.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds (or replaces) a collection. Builder style, for seeding.
    #[must_use]
    pub fn with_collection(self, name: &str, documents: Vec<Document>) -> Self {
        self.state()
            .collections
            .insert(name.to_string(), documents);
        self
    }

    /// Snapshot of a collection's documents.
    #[must_use]
    pub fn collection(&self, name: &str) -> Option<Vec<Document>> {
        self.state().collections.get(name).cloned()
    }

    /// Names of all collections, sorted.
    #[must_use]
    pub fn collection_names(&self) -> Vec<String> {
        self.state().collections.keys().cloned().collect()
    }

    /// Every drop request received, in order.
    #[must_use]
    pub fn dropped(&self) -> Vec<String> {
        self.state().dropped.clone()
    }

    /// Number of write calls (inserts and drops) received.
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.state().writes
    }

    /// Makes every subsequent `connect` fail.
    pub fn refuse_connections(&self) {
        self.state().refuse_connections = true;
    }

    /// Makes inserts into `collection` fail.
    pub fn fail_inserts_into(&self, collection: &str) {
        self.state().failing_inserts.insert(collection.to_string());
    }

    /// Makes counts and fetches on `collection` fail.
    pub fn fail_queries_on(&self, collection: &str) {
        self.state().failing_queries.insert(collection.to_string());
    }

    /// Delays every fetch and insert by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.state().latency = Some(latency);
    }

    async fn simulate_latency(&self) {
        let latency = self.state().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn check_query(&self, collection: &str) -> Result<()> {
        if self.state().failing_queries.contains(collection) {
            return Err(Error::query(collection, "injected query failure"));
        }
        Ok(())
    }
}

fn matches_filter(document: &Document, filter: &Document) -> bool {
    filter
        .iter()
        .all(|(key, value)| document.get(key) == Some(value))
}

#[async_trait]
impl DocumentSource for MemoryDatabase {
    fn source_type(&self) -> &'static str {
        "memory"
    }

    async fn connect(&mut self) -> Result<()> {
        if self.state().refuse_connections {
            return Err(Error::SourceConnection("connection refused".to_string()));
        }
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        Ok(self.collection_names())
    }

    async fn count_documents(&self, collection: &str) -> Result<u64> {
        self.check_query(collection)?;
        Ok(self
            .state()
            .collections
            .get(collection)
            .map_or(0, |docs| docs.len() as u64))
    }

    async fn fetch_page(
        &self,
        collection: &str,
        skip: u64,
        limit: usize,
    ) -> Result<Vec<Document>> {
        self.simulate_latency().await;
        self.check_query(collection)?;

        let state = self.state();
        let Some(docs) = state.collections.get(collection) else {
            return Ok(Vec::new());
        };
        let start = usize::try_from(skip).unwrap_or(usize::MAX).min(docs.len());
        let end = start.saturating_add(limit).min(docs.len());
        Ok(docs[start..end].to_vec())
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl DocumentSink for MemoryDatabase {
    fn sink_type(&self) -> &'static str {
        "memory"
    }

    async fn connect(&mut self) -> Result<()> {
        if self.state().refuse_connections {
            return Err(Error::DestinationConnection(
                "connection refused".to_string(),
            ));
        }
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        Ok(self.collection_names())
    }

    async fn drop_collection(&self, collection: &str) -> Result<()> {
        let mut state = self.state();
        state.writes += 1;
        state.dropped.push(collection.to_string());
        state.collections.remove(collection);
        Ok(())
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> Result<u64> {
        self.simulate_latency().await;

        let mut state = self.state();
        if state.failing_inserts.contains(collection) {
            return Err(Error::insert(collection, "injected insert failure"));
        }
        state.writes += 1;

        let target = state.collections.entry(collection.to_string()).or_default();
        let mut seen: HashSet<String> = target
            .iter()
            .filter_map(|doc| doc.get("_id").map(Bson::to_string))
            .collect();

        // Unordered semantics: keep going past duplicates, report afterwards.
        let mut inserted = 0;
        let mut duplicates = 0;
        for doc in documents {
            if let Some(id) = doc.get("_id").map(Bson::to_string) {
                if !seen.insert(id) {
                    duplicates += 1;
                    continue;
                }
            }
            target.push(doc);
            inserted += 1;
        }

        if duplicates > 0 {
            return Err(Error::insert(
                collection,
                format!("E11000 duplicate key error ({duplicates} documents)"),
            ));
        }
        Ok(inserted)
    }

    async fn find_one(&self, collection: &str, filter: Document) -> Result<Option<Document>> {
        self.check_query(collection)?;
        Ok(self.state().collections.get(collection).and_then(|docs| {
            docs.iter()
                .find(|doc| matches_filter(doc, &filter))
                .cloned()
        }))
    }

    async fn insert_one(&self, collection: &str, document: Document) -> Result<()> {
        self.insert_many(collection, vec![document]).await.map(|_| ())
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
