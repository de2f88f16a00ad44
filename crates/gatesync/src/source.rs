//! Export phase: source collections to scratch pages.

use futures::{stream, StreamExt, TryStreamExt};
use indicatif::ProgressBar;
use tracing::{debug, info};

use crate::config::MigrationOptions;
use crate::connectors::DocumentSource;
use crate::error::{Error, Result};
use crate::scratch::ScratchStore;

/// What was written for one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionExport {
    /// Collection name.
    pub collection: String,
    /// Documents written across all pages.
    pub documents: u64,
    /// Page files written.
    pub pages: u32,
}

/// Result of the export phase.
#[derive(Debug, Clone, Default)]
pub struct ExportSummary {
    /// Per-collection results, in completion order.
    pub collections: Vec<CollectionExport>,
}

impl ExportSummary {
    /// Total documents exported.
    #[must_use]
    pub fn documents(&self) -> u64 {
        self.collections.iter().map(|c| c.documents).sum()
    }

    /// Total page files written.
    #[must_use]
    pub fn pages(&self) -> u64 {
        self.collections.iter().map(|c| u64::from(c.pages)).sum()
    }
}

/// Number of pages needed for `count` documents.
#[must_use]
pub fn page_count(count: u64, page_size: usize) -> u64 {
    count.div_ceil(page_size.max(1) as u64)
}

/// Reads collections out of the source database, page by page.
pub struct SourceReader {
    source: Box<dyn DocumentSource>,
    scratch: ScratchStore,
    options: MigrationOptions,
}

impl SourceReader {
    /// Creates a reader writing into `scratch`.
    pub fn new(
        source: Box<dyn DocumentSource>,
        scratch: ScratchStore,
        options: MigrationOptions,
    ) -> Self {
        Self {
            source,
            scratch,
            options,
        }
    }

    /// Connects to the source database.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SourceConnection`] if the source is unreachable.
    pub async fn connect(&mut self) -> Result<()> {
        self.source.connect().await
    }

    /// Closes the source connection.
    ///
    /// # Errors
    ///
    /// Propagates the connector's close error.
    pub async fn close(&mut self) -> Result<()> {
        self.source.close().await
    }

    /// Source collections minus the blacklist, in source order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Query`] if listing fails.
    pub async fn list_collections(&self) -> Result<Vec<String>> {
        let names = self.source.list_collections().await?;
        let (skipped, kept): (Vec<String>, Vec<String>) = names
            .into_iter()
            .partition(|name| self.options.is_blacklisted(name));

        if !skipped.is_empty() {
            info!("Skipping blacklisted collections: {}", skipped.join(", "));
        }
        Ok(kept)
    }

    /// Exports every collection concurrently.
    ///
    /// `progress` advances once per finished collection. The first failure
    /// aborts the phase; exports still in flight are dropped with it.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by any collection export.
    pub async fn export_all(
        &self,
        collections: &[String],
        progress: &ProgressBar,
    ) -> Result<ExportSummary> {
        let exported: Vec<CollectionExport> = stream::iter(
            collections
                .iter()
                .filter(|name| !self.options.is_blacklisted(name)),
        )
        .map(|name| async move {
            let export = self.export_collection(name).await?;
            progress.inc(1);
            Ok::<_, Error>(export)
        })
        .buffer_unordered(self.options.workers.max(1))
        .try_collect()
        .await?;

        Ok(ExportSummary {
            collections: exported,
        })
    }

    /// Writes one collection to scratch as pages `1..=ceil(count / page_size)`.
    ///
    /// An empty collection produces no page files.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Query`] on count/fetch failure or [`Error::Io`] on
    /// write failure.
    pub async fn export_collection(&self, collection: &str) -> Result<CollectionExport> {
        let page_size = self.options.page_size;
        let count = self.source.count_documents(collection).await?;
        let pages = u32::try_from(page_count(count, page_size))
            .map_err(|_| Error::query(collection, format!("{count} documents is too many pages")))?;

        debug!(
            "Exporting '{}': {} documents in {} pages",
            collection, count, pages
        );

        let mut documents = 0u64;
        let mut written = 0u32;
        for page in 1..=pages {
            let skip = page_size as u64 * u64::from(page - 1);
            let batch = self.source.fetch_page(collection, skip, page_size).await?;

            // Collection shrank since it was counted.
            if batch.is_empty() {
                debug!("'{}' ran out of documents at page {}", collection, page);
                break;
            }

            documents += self.scratch.write_page(collection, page, batch).await? as u64;
            written = page;
        }

        info!("Exported '{}' ({} documents)", collection, documents);
        Ok(CollectionExport {
            collection: collection.to_string(),
            documents,
            pages: written,
        })
    }
}
