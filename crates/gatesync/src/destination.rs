//! Import phase: scratch pages into the destination database.

use futures::{stream, StreamExt, TryStreamExt};
use indicatif::ProgressBar;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

use crate::config::MigrationOptions;
use crate::connectors::DocumentSink;
use crate::error::{Error, Result};
use crate::scratch::{PageKey, ScratchStore};

/// What was inserted for one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionImport {
    /// Destination collection.
    pub collection: String,
    /// Page files replayed.
    pub pages: u64,
    /// Documents inserted.
    pub documents: u64,
}

/// Result of the import phase.
#[derive(Debug, Clone, Default)]
pub struct ImportSummary {
    /// Per-collection results, in completion order.
    pub collections: Vec<CollectionImport>,
}

impl ImportSummary {
    /// Total documents inserted.
    #[must_use]
    pub fn documents(&self) -> u64 {
        self.collections.iter().map(|c| c.documents).sum()
    }

    /// Total page files replayed.
    #[must_use]
    pub fn pages(&self) -> u64 {
        self.collections.iter().map(|c| c.pages).sum()
    }
}

/// Replays scratch pages into the destination database.
pub struct DestinationWriter {
    sink: Box<dyn DocumentSink>,
    scratch: ScratchStore,
    options: MigrationOptions,
}

impl DestinationWriter {
    /// Creates a writer reading from `scratch`.
    pub fn new(
        sink: Box<dyn DocumentSink>,
        scratch: ScratchStore,
        options: MigrationOptions,
    ) -> Self {
        Self {
            sink,
            scratch,
            options,
        }
    }

    /// Connects to the destination database.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DestinationConnection`] if the destination is
    /// unreachable.
    pub async fn connect(&mut self) -> Result<()> {
        self.sink.connect().await
    }

    /// Closes the destination connection.
    ///
    /// # Errors
    ///
    /// Propagates the connector's close error.
    pub async fn close(&mut self) -> Result<()> {
        self.sink.close().await
    }

    /// The destination connector, for follow-up work on the same connection.
    #[must_use]
    pub fn sink(&self) -> &dyn DocumentSink {
        self.sink.as_ref()
    }

    /// Drops every destination collection that is about to be imported.
    ///
    /// Collections outside `collections` are left alone, and blacklisted
    /// names are never dropped. Running it twice is the same as once.
    /// Returns the dropped names.
    ///
    /// # Errors
    ///
    /// Returns the first listing or drop error.
    pub async fn reset_collections(&self, collections: &[String]) -> Result<Vec<String>> {
        let incoming: HashSet<&str> = collections
            .iter()
            .map(String::as_str)
            .filter(|name| !self.options.is_blacklisted(name))
            .collect();

        let to_drop: Vec<String> = self
            .sink
            .list_collections()
            .await?
            .into_iter()
            .filter(|name| incoming.contains(name.as_str()))
            .collect();

        stream::iter(&to_drop)
            .map(|name| async move {
                self.sink.drop_collection(name).await?;
                info!("Dropped destination collection '{}'", name);
                Ok::<_, Error>(())
            })
            .buffer_unordered(self.options.workers.max(1))
            .try_collect::<Vec<()>>()
            .await?;

        Ok(to_drop)
    }

    /// Replays every page file in scratch.
    ///
    /// Pages of one collection go in ascending index order; collections run
    /// concurrently. `progress` gets its length set to the page count and
    /// advances once per page file. No rollback on failure.
    ///
    /// # Errors
    ///
    /// Returns the first read or insert error.
    pub async fn import_all(&self, progress: &ProgressBar) -> Result<ImportSummary> {
        let keys = self.scratch.list_page_files().await?;
        progress.set_length(keys.len() as u64);

        let mut by_collection: BTreeMap<String, Vec<PageKey>> = BTreeMap::new();
        for key in keys {
            by_collection
                .entry(key.collection.clone())
                .or_default()
                .push(key);
        }

        by_collection.retain(|collection, pages| {
            let blacklisted = self.options.is_blacklisted(collection);
            if blacklisted {
                warn!(
                    "Ignoring {} page files of blacklisted collection '{}'",
                    pages.len(),
                    collection
                );
                progress.inc(pages.len() as u64);
            }
            !blacklisted
        });

        let imported: Vec<CollectionImport> = stream::iter(by_collection)
            .map(|(collection, pages)| async move {
                self.import_collection(&collection, &pages, progress).await
            })
            .buffer_unordered(self.options.workers.max(1))
            .try_collect()
            .await?;

        Ok(ImportSummary {
            collections: imported,
        })
    }

    async fn import_collection(
        &self,
        collection: &str,
        pages: &[PageKey],
        progress: &ProgressBar,
    ) -> Result<CollectionImport> {
        let mut documents = 0;

        for key in pages {
            let batch = self.scratch.read_page(key).await?;
            if batch.is_empty() {
                debug!("Page {} of '{}' is empty", key.page, collection);
            } else {
                let count = batch.len();
                documents += self.sink.insert_many(collection, batch).await?;
                debug!(
                    "Inserted page {} of '{}' ({} documents)",
                    key.page, collection, count
                );
            }
            progress.inc(1);
        }

        info!("Imported '{}' ({} documents)", collection, documents);
        Ok(CollectionImport {
            collection: collection.to_string(),
            pages: pages.len() as u64,
            documents,
        })
    }
}
