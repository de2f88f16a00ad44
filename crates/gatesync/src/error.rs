//! Error types for `GateSync`.
//!
//! Every phase of a migration fails fast with one of these variants. Driver
//! and filesystem messages are embedded verbatim so the CLI can print the raw
//! detail under its error banner.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for `GateSync` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during a migration.
///
/// Error codes follow the pattern `GATE-XXX`.
#[derive(Error, Debug)]
pub enum Error {
    /// Cannot reach or authenticate against the source database (GATE-001).
    #[error("[GATE-001] Source connection error: {0}")]
    SourceConnection(String),

    /// Cannot reach or authenticate against the destination database (GATE-002).
    #[error("[GATE-002] Destination connection error: {0}")]
    DestinationConnection(String),

    /// Scratch directory unreadable or unwritable (GATE-003).
    #[error("[GATE-003] IO error at '{}': {source}", path.display())]
    Io {
        /// File or directory the operation touched.
        path: PathBuf,
        /// Underlying filesystem error.
        #[source]
        source: std::io::Error,
    },

    /// Listing, counting or fetching documents failed (GATE-004).
    #[error("[GATE-004] Query error on '{collection}': {message}")]
    Query {
        /// Collection the query ran against (empty for database-level calls).
        collection: String,
        /// Driver error text.
        message: String,
    },

    /// Bulk or single insert rejected by the destination (GATE-005).
    #[error("[GATE-005] Insert error on '{collection}': {message}")]
    Insert {
        /// Destination collection.
        collection: String,
        /// Driver error text.
        message: String,
    },

    /// Missing or invalid configuration (GATE-006).
    #[error("[GATE-006] Configuration error: {0}")]
    Config(String),

    /// A scratch page could not be decoded (GATE-007).
    #[error("[GATE-007] Corrupt page file '{}': {message}", path.display())]
    PageFormat {
        /// Page file path.
        path: PathBuf,
        /// Decoder error text.
        message: String,
    },

    /// The run was cancelled before the phase finished (GATE-008).
    #[error("[GATE-008] Migration cancelled")]
    Cancelled,
}

impl Error {
    /// Returns the error code (e.g., "GATE-001").
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::SourceConnection(_) => "GATE-001",
            Self::DestinationConnection(_) => "GATE-002",
            Self::Io { .. } => "GATE-003",
            Self::Query { .. } => "GATE-004",
            Self::Insert { .. } => "GATE-005",
            Self::Config(_) => "GATE-006",
            Self::PageFormat { .. } => "GATE-007",
            Self::Cancelled => "GATE-008",
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn query(collection: &str, err: impl std::fmt::Display) -> Self {
        Self::Query {
            collection: collection.to_string(),
            message: err.to_string(),
        }
    }

    pub(crate) fn insert(collection: &str, err: impl std::fmt::Display) -> Self {
        Self::Insert {
            collection: collection.to_string(),
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_unique() {
        let errors = vec![
            Error::SourceConnection("x".into()),
            Error::DestinationConnection("x".into()),
            Error::io("/tmp/x", std::io::Error::other("x")),
            Error::query("c", "x"),
            Error::insert("c", "x"),
            Error::Config("x".into()),
            Error::PageFormat {
                path: PathBuf::from("/tmp/x"),
                message: "x".into(),
            },
            Error::Cancelled,
        ];

        let mut codes: Vec<&str> = errors.iter().map(Error::code).collect();
        let total = codes.len();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), total, "Error codes must be unique");
        assert!(codes.iter().all(|c| c.starts_with("GATE-")));
    }

    #[test]
    fn test_error_display_keeps_driver_message() {
        let err = Error::insert("accounts", "E11000 duplicate key error");
        let display = err.to_string();

        assert!(display.contains("[GATE-005]"));
        assert!(display.contains("accounts"));
        assert!(display.contains("E11000 duplicate key error"));
    }

    #[test]
    fn test_io_error_display_includes_path() {
        let err = Error::io("/scratch/page", std::io::Error::other("denied"));
        assert!(err.to_string().contains("/scratch/page"));
        assert!(err.to_string().contains("denied"));
    }
}
