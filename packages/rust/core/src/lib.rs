//! Ingestion workflows for vocabsync.
//!
//! This crate ties together download, RDF parsing, SKOS repair, triple-store
//! upload, and the job ledger into the per-vocabulary pipeline ([`ingest`])
//! and the ledger-wide batch ([`run_batch`]). [`explicit_import`] merges
//! `owl:imports` targets when `pipeline.follow_imports` is set.

pub mod batch;
pub mod catalog;
pub mod diff;
pub mod imports;
pub mod pipeline;

pub use batch::{BatchOptions, BatchSummary, JobSummary, run_batch};
pub use catalog::CatalogEntry;
pub use diff::{GraphDiff, compare, diff_store, ledger_namespaces, write_reports};
pub use imports::{ImportReport, explicit_import};
pub use pipeline::{
    IngestContext, JobOutcome, JobStage, ProgressReporter, SilentProgress, TempSlot, ingest,
};
