// Migration tool - pedantic lints relaxed for CLI ergonomics
#![allow(clippy::pedantic)]

//! # GateSync
//!
//! `gatesync` copies every collection of one MongoDB database into another,
//! staging the data as JSON page files in a local scratch directory, and can
//! optionally provision an admin user in the destination afterwards.
//!
//! ## Phases
//!
//! | Phase | What happens |
//! |-------|--------------|
//! | Connect | Source and destination clients are opened and pinged |
//! | Reset scratch | The scratch directory is emptied |
//! | Export | Each collection is read in pages of `page_size` documents |
//! | Reset destination | Colliding destination collections are dropped |
//! | Import | Page files are bulk-inserted, in page order per collection |
//! | Provision | The requested user is created unless the email exists |
//!
//! Blacklisted collections (`sessions` by default) are never exported,
//! dropped, or imported.
//!
//! ## Quick Start
//!
//! ```bash
//! gatesync --config migration.yaml
//!
//! # Or from the environment
//! GATESYNC_FROM_URI=mongodb://a:27017 GATESYNC_FROM_DB=app \
//! GATESYNC_TO_URI=mongodb://b:27017 GATESYNC_TO_DB=app gatesync
//! ```
//!
//! ## Configuration Example
//!
//! ```yaml
//! source:
//!   uri: mongodb://localhost:27017
//!   database: app
//!
//! destination:
//!   uri: mongodb://backup:27017
//!   database: app_copy
//!
//! options:
//!   page_size: 1000
//!   workers: 4
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod connectors;
pub mod destination;
pub mod error;
pub mod pipeline;
pub mod provision;
pub mod scratch;
pub mod source;
pub mod wizard;

pub use config::{EndpointConfig, MigrationConfig, MigrationOptions, Region, UserRequest};
pub use connectors::{Document, DocumentSink, DocumentSource};
pub use error::{Error, Result};
pub use pipeline::{MigrationFailure, MigrationReport, Phase, Pipeline};
pub use provision::ProvisionOutcome;
pub use scratch::{PageKey, ScratchStore};
