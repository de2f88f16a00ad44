//! Migration pipeline orchestration.

use indicatif::{ProgressBar, ProgressStyle};
use std::fmt;
use std::future::Future;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::MigrationConfig;
use crate::connectors::{create_sink, create_source, DocumentSink, DocumentSource};
use crate::destination::{DestinationWriter, ImportSummary};
use crate::error::{Error, Result};
use crate::provision::{ProvisionOutcome, UserProvisioner};
use crate::scratch::ScratchStore;
use crate::source::{ExportSummary, SourceReader};

/// Pipeline steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Connect to the source database.
    ConnectSource,
    /// Connect to the destination database.
    ConnectDestination,
    /// Empty the scratch directory.
    ResetScratch,
    /// Discover source collections.
    ListCollections,
    /// Write source collections to scratch.
    Export,
    /// Drop colliding destination collections.
    ResetDestination,
    /// Replay scratch pages into the destination.
    Import,
    /// Create the requested admin user.
    ProvisionUser,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ConnectSource => "connect source",
            Self::ConnectDestination => "connect destination",
            Self::ResetScratch => "reset scratch directory",
            Self::ListCollections => "list collections",
            Self::Export => "export",
            Self::ResetDestination => "reset destination collections",
            Self::Import => "import",
            Self::ProvisionUser => "provision user",
        })
    }
}

/// A failed run: the phase that stopped it and its unmodified error.
#[derive(Debug, thiserror::Error)]
#[error("{phase} failed: {error}")]
pub struct MigrationFailure {
    /// Phase that failed.
    pub phase: Phase,
    /// Error raised by the phase.
    #[source]
    pub error: Error,
}

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct MigrationReport {
    /// Identifier used in the run's log lines.
    pub run_id: Uuid,
    /// Collections discovered at the source (blacklist removed).
    pub collections: Vec<String>,
    /// Destination collections that were dropped before import.
    pub dropped: Vec<String>,
    /// Export phase totals.
    pub export: ExportSummary,
    /// Import phase totals.
    pub import: ImportSummary,
    /// User provisioning result.
    pub user: ProvisionOutcome,
    /// Duration in seconds.
    pub duration_secs: f64,
}

impl MigrationReport {
    /// Calculate throughput (documents per second).
    #[must_use]
    pub fn throughput(&self) -> f64 {
        if self.duration_secs > 0.0 {
            self.import.documents() as f64 / self.duration_secs
        } else {
            0.0
        }
    }
}

/// Migration pipeline.
pub struct Pipeline {
    config: MigrationConfig,
    scratch: ScratchStore,
    reader: SourceReader,
    writer: DestinationWriter,
    cancel: CancellationToken,
}

impl Pipeline {
    /// Create a pipeline against the MongoDB endpoints in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid.
    pub fn new(config: MigrationConfig) -> Result<Self> {
        config.validate()?;
        let source = create_source(&config.source);
        let sink = create_sink(&config.destination);
        Ok(Self::with_connectors(config, source, sink))
    }

    /// Create a pipeline over explicit connectors.
    pub fn with_connectors(
        config: MigrationConfig,
        source: Box<dyn DocumentSource>,
        sink: Box<dyn DocumentSink>,
    ) -> Self {
        let scratch = ScratchStore::new(config.options.scratch_dir.clone());
        let reader = SourceReader::new(source, scratch.clone(), config.options.clone());
        let writer = DestinationWriter::new(sink, scratch.clone(), config.options.clone());

        Self {
            config,
            scratch,
            reader,
            writer,
            cancel: CancellationToken::new(),
        }
    }

    /// The configuration this pipeline runs with.
    #[must_use]
    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Token that aborts the run when cancelled.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the migration pipeline.
    ///
    /// Each phase runs only if the previous one succeeded. The scratch
    /// directory is removed only on success.
    ///
    /// # Errors
    ///
    /// Returns the failed phase with its error.
    #[allow(clippy::cognitive_complexity)] // Reason: the phases read best as one linear sequence
    pub async fn run(&mut self) -> std::result::Result<MigrationReport, MigrationFailure> {
        let start = Instant::now();
        let run_id = Uuid::new_v4();
        let token = self.cancel.clone();
        let show_progress = self.config.options.show_progress;

        info!(
            "Starting migration {}: '{}' -> '{}'",
            run_id, self.config.source.database, self.config.destination.database
        );

        guarded(&token, Phase::ConnectSource, self.reader.connect()).await?;
        guarded(&token, Phase::ConnectDestination, self.writer.connect()).await?;
        guarded(&token, Phase::ResetScratch, self.scratch.reset()).await?;

        let collections =
            guarded(&token, Phase::ListCollections, self.reader.list_collections()).await?;
        info!("Found {} collections to migrate", collections.len());

        let progress = create_progress_bar(
            collections.len() as u64,
            "Collections exported",
            show_progress,
        );
        let export = guarded(
            &token,
            Phase::Export,
            self.reader.export_all(&collections, &progress),
        )
        .await
        .inspect_err(|_| progress.abandon())?;
        progress.finish();
        info!(
            "Export complete: {} documents in {} pages",
            export.documents(),
            export.pages()
        );

        let dropped = guarded(
            &token,
            Phase::ResetDestination,
            self.writer.reset_collections(&collections),
        )
        .await?;

        let progress = create_progress_bar(0, "Page files imported", show_progress);
        let import = guarded(&token, Phase::Import, self.writer.import_all(&progress))
            .await
            .inspect_err(|_| progress.abandon())?;
        progress.finish();
        info!(
            "Import complete: {} documents from {} pages",
            import.documents(),
            import.pages()
        );

        let user = guarded(
            &token,
            Phase::ProvisionUser,
            UserProvisioner::new(self.writer.sink()).provision(self.config.user.as_ref()),
        )
        .await?;

        if let Err(e) = self.reader.close().await {
            warn!("Failed to close source connection: {}", e);
        }
        if let Err(e) = self.writer.close().await {
            warn!("Failed to close destination connection: {}", e);
        }
        self.scratch.teardown().await;

        let report = MigrationReport {
            run_id,
            collections,
            dropped,
            export,
            import,
            user,
            duration_secs: start.elapsed().as_secs_f64(),
        };

        info!(
            "Migration {} complete: {} documents in {:.2}s ({:.0} docs/sec)",
            run_id,
            report.import.documents(),
            report.duration_secs,
            report.throughput()
        );

        Ok(report)
    }
}

/// Runs one phase, racing it against cancellation.
///
/// The phase future is dropped on cancellation, which drops every unit it
/// fanned out.
async fn guarded<T>(
    token: &CancellationToken,
    phase: Phase,
    work: impl Future<Output = Result<T>>,
) -> std::result::Result<T, MigrationFailure> {
    let result = tokio::select! {
        biased;
        () = token.cancelled() => Err(Error::Cancelled),
        result = work => result,
    };

    result.map_err(|error| {
        error!("Phase '{}' failed: {}", phase, error);
        MigrationFailure { phase, error }
    })
}

fn create_progress_bar(total: u64, message: &'static str, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} {msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb.set_message(message);

    pb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_report_throughput() {
        let report = MigrationReport {
            run_id: Uuid::nil(),
            collections: vec![],
            dropped: vec![],
            export: ExportSummary::default(),
            import: ImportSummary {
                collections: vec![crate::destination::CollectionImport {
                    collection: "a".to_string(),
                    pages: 1,
                    documents: 1000,
                }],
            },
            user: ProvisionOutcome::None,
            duration_secs: 2.0,
        };

        assert!((report.throughput() - 500.0).abs() < 0.001);
    }

    #[test]
    fn test_failure_display_keeps_error_text() {
        let failure = MigrationFailure {
            phase: Phase::Import,
            error: Error::insert("accounts", "E11000 duplicate key error"),
        };
        let text = failure.to_string();

        assert!(text.starts_with("import failed"));
        assert!(text.contains("E11000 duplicate key error"));
    }

    #[tokio::test]
    async fn test_guarded_cancelled_before_start() {
        let token = CancellationToken::new();
        token.cancel();

        let failure = guarded(&token, Phase::Export, async { Ok::<_, Error>(1) })
            .await
            .unwrap_err();

        assert_eq!(failure.phase, Phase::Export);
        assert!(matches!(failure.error, Error::Cancelled));
    }
}
