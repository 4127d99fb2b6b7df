//! Shared types, error model, and configuration for vocabsync.
//!
//! This crate is the foundation depended on by all other vocabsync crates.
//! It provides:
//! - [`VocabError`], the library error type, and [`JobError`], the per-job
//!   failure taxonomy written to the ledger
//! - Ledger types ([`LedgerRow`], [`VocabularyJob`], [`SheetUpdate`], [`VocabFormat`])
//! - Configuration ([`AppConfig`] and its sections, config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DataConfig, DownloadConfig, LedgerConfig, LoggingConfig, PersistMode,
    PipelineConfig, SkosifyBackend, SkosifyConfig, StoreConfig, UploadMethod, config_dir,
    config_file_path, init_config, load_config, load_config_from, validate_config,
};
pub use error::{Result, VocabError};
pub use types::{
    INPUT_COLUMNS, JobError, LEDGER_HEADER, LedgerRow, ROW_WIDTH, SheetUpdate, VocabFormat,
    VocabularyJob, column,
};
