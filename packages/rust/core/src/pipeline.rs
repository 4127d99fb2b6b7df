//! Per-vocabulary ingestion: format → download → parse → namespace →
//! skosify → upload → record.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinError;
use tracing::{debug, info, instrument, warn};

use vocabsync_fetch::{FetchOptions, Fetcher};
use vocabsync_shared::{
    AppConfig, JobError, Result, SheetUpdate, VocabError, VocabFormat, VocabularyJob,
};
use vocabsync_skos::{
    Skosify, SkosifyOptions, SkosifyReport, backend_from_config, detect_namespace, parse_file,
    skosify_with_checkpoint,
};
use vocabsync_store::StoreClient;

use crate::batch::BatchSummary;
use crate::catalog::CatalogEntry;
use crate::imports::explicit_import;

/// File name of the repaired graph inside a temporary slot.
pub const SKOSIFIED_FILE: &str = "skosified.ttl";

// ---------------------------------------------------------------------------
// Stages and progress
// ---------------------------------------------------------------------------

/// Stages a job passes through, in order. A failed job stops at the last
/// stage it completed and is then recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    Start,
    MimeValidated,
    Downloaded,
    Parsed,
    NamespaceResolved,
    Skosified,
    Uploaded,
    Recorded,
}

impl JobStage {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Start => "starting",
            Self::MimeValidated => "format accepted",
            Self::Downloaded => "downloaded",
            Self::Parsed => "parsed",
            Self::NamespaceResolved => "namespace resolved",
            Self::Skosified => "skosified",
            Self::Uploaded => "uploaded",
            Self::Recorded => "recorded",
        }
    }
}

/// Progress callback for reporting ingestion status.
pub trait ProgressReporter: Send + Sync {
    /// Called before a ready job is handed to the pipeline.
    fn job_started(&self, job: &VocabularyJob, current: usize, total: usize);
    /// Called when a job completes a stage.
    fn stage(&self, job: &VocabularyJob, stage: JobStage);
    /// Called when a row's result is recorded.
    fn job_finished(&self, short_name: &str, update: &SheetUpdate);
    /// Called when the batch completes.
    fn done(&self, summary: &BatchSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn job_started(&self, _job: &VocabularyJob, _current: usize, _total: usize) {}
    fn stage(&self, _job: &VocabularyJob, _stage: JobStage) {}
    fn job_finished(&self, _short_name: &str, _update: &SheetUpdate) {}
    fn done(&self, _summary: &BatchSummary) {}
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Everything a job needs besides its own row. Shared by all jobs of a run.
pub struct IngestContext {
    fetcher: Fetcher,
    store: StoreClient,
    skosify: Arc<dyn Skosify>,
    default_language: Option<String>,
    sparql_endpoint: String,
    vocabulary_dir: PathBuf,
    temporary_dir: PathBuf,
    keep_temporary: bool,
    follow_imports: bool,
}

impl IngestContext {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            fetcher: Fetcher::new(FetchOptions::from(&config.download))?,
            store: StoreClient::new(&config.store)?,
            skosify: Arc::from(backend_from_config(&config.skosify)),
            default_language: config.pipeline.default_language.clone(),
            sparql_endpoint: config.store.sparql_endpoint(),
            vocabulary_dir: config.data.vocabulary_dir(),
            temporary_dir: config.data.temporary_dir(),
            keep_temporary: config.pipeline.keep_temporary,
            follow_imports: config.pipeline.follow_imports,
        })
    }

    /// Swap the repair backend.
    pub fn with_skosify(mut self, backend: Arc<dyn Skosify>) -> Self {
        self.skosify = backend;
        self
    }

    pub fn store(&self) -> &StoreClient {
        &self.store
    }
}

// ---------------------------------------------------------------------------
// Temporary slots
// ---------------------------------------------------------------------------

/// Per-job scratch directory `<temporary>/<position>-<short_name>/`.
///
/// Cleared when acquired so a previous run's files never leak into the
/// current job; removed on release unless kept for inspection.
#[derive(Debug)]
pub struct TempSlot {
    dir: PathBuf,
    keep: bool,
}

impl TempSlot {
    pub async fn acquire(
        root: &Path,
        position: usize,
        short_name: &str,
        keep: bool,
    ) -> Result<Self> {
        let dir = root.join(format!("{position}-{}", slot_name(short_name)));
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(VocabError::io(&dir, e)),
        }
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| VocabError::io(&dir, e))?;
        Ok(Self { dir, keep })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn download_path(&self, format: VocabFormat) -> PathBuf {
        self.dir.join(format!("download.{}", format.extension()))
    }

    pub fn skosified_path(&self) -> PathBuf {
        self.dir.join(SKOSIFIED_FILE)
    }

    pub async fn release(self) {
        if self.keep {
            debug!(path = %self.dir.display(), "keeping temporary slot");
            return;
        }
        if let Err(e) = tokio::fs::remove_dir_all(&self.dir).await {
            warn!(path = %self.dir.display(), error = %e, "failed to remove temporary slot");
        }
    }
}

fn slot_name(short_name: &str) -> String {
    let name: String = short_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if name.is_empty() { "job".into() } else { name }
}

// ---------------------------------------------------------------------------
// Ingestion
// ---------------------------------------------------------------------------

/// What one job produced.
#[derive(Debug, Default)]
pub struct JobOutcome {
    pub update: SheetUpdate,
    /// Last stage completed before the result was recorded.
    pub reached: Option<JobStage>,
    pub report: Option<SkosifyReport>,
    /// Archived Turtle under the vocabulary directory.
    pub archived: Option<PathBuf>,
}

impl JobOutcome {
    fn advance(&mut self, job: &VocabularyJob, progress: &dyn ProgressReporter, stage: JobStage) {
        debug!(stage = stage.label(), "stage complete");
        self.reached = Some(stage);
        progress.stage(job, stage);
    }
}

/// Run one job through every stage. Never fails: the first error is
/// written into the returned [`SheetUpdate`] together with whatever the
/// earlier stages produced.
#[instrument(skip_all, fields(position = job.position, short_name = %job.short_name))]
pub async fn ingest(
    ctx: &IngestContext,
    job: &VocabularyJob,
    progress: &dyn ProgressReporter,
) -> JobOutcome {
    let mut outcome = JobOutcome::default();
    outcome.advance(job, progress, JobStage::Start);
    info!(url = %job.source_url, file_type = %job.file_type, "ingesting vocabulary");

    let result = match VocabFormat::from_token(&job.file_type) {
        None => Err(JobError::InvalidMimeType {
            token: job.file_type.clone(),
        }),
        Some(format) => {
            outcome.advance(job, progress, JobStage::MimeValidated);
            match TempSlot::acquire(
                &ctx.temporary_dir,
                job.position,
                &job.short_name,
                ctx.keep_temporary,
            )
            .await
            {
                Ok(slot) => {
                    let result = run_stages(ctx, job, format, &slot, &mut outcome, progress).await;
                    slot.release().await;
                    result
                }
                Err(e) => Err(unknown_error(e)),
            }
        }
    };

    if let Err(error) = result {
        warn!(error_kind = %error.kind(), error = %error, "job failed");
        outcome.update.record_error(error);
    }

    match &outcome.update.error {
        None => info!(
            namespace = outcome.update.namespace.as_deref().unwrap_or(""),
            triple_count = outcome.update.triple_count.unwrap_or(0),
            "vocabulary ingested"
        ),
        Some(e) => debug!(error_kind = %e.kind(), "recording failed job"),
    }
    progress.stage(job, JobStage::Recorded);
    outcome
}

async fn run_stages(
    ctx: &IngestContext,
    job: &VocabularyJob,
    format: VocabFormat,
    slot: &TempSlot,
    outcome: &mut JobOutcome,
    progress: &dyn ProgressReporter,
) -> std::result::Result<(), JobError> {
    // --- Download ---
    let download = ctx
        .fetcher
        .download(&job.source_url)
        .await
        .map_err(download_error)?;
    let local = slot.download_path(format);
    tokio::fs::write(&local, &download.text)
        .await
        .map_err(|e| JobError::unknown(&e))?;
    debug!(path = %local.display(), bytes = download.bytes, "download persisted");
    outcome.advance(job, progress, JobStage::Downloaded);

    // --- Parse ---
    let base = job.source_url.clone();
    let mut graph = tokio::task::spawn_blocking(move || parse_file(&local, format, Some(&base)))
        .await
        .map_err(panic_error)?
        .map_err(|e| JobError::Parse {
            message: e.to_string(),
        })?;
    if ctx.follow_imports {
        explicit_import(&ctx.fetcher, &mut graph)
            .await
            .map_err(import_error)?;
    }
    info!(triples = graph.len(), %format, "vocabulary parsed");
    outcome.advance(job, progress, JobStage::Parsed);

    // --- Namespace ---
    let namespace = match &job.namespace {
        Some(declared) => declared.clone(),
        None => detect_namespace(&graph).map_err(|e| JobError::NoNamespaceDetected {
            message: e.to_string(),
        })?,
    };
    info!(%namespace, declared = job.namespace.is_some(), "namespace resolved");
    outcome.update.namespace = Some(namespace.clone());
    outcome.advance(job, progress, JobStage::NamespaceResolved);

    // --- Skosify ---
    let options = SkosifyOptions::new(job.title.clone(), namespace.clone())
        .with_default_language(ctx.default_language.clone());
    let backend = Arc::clone(&ctx.skosify);
    let checkpoint_path = slot.skosified_path();
    let checkpoint = tokio::task::spawn_blocking(move || {
        skosify_with_checkpoint(&*backend, graph, &options, &checkpoint_path)
    })
    .await
    .map_err(panic_error)?
    .map_err(unknown_error)?;

    match checkpoint.report {
        Ok(report) => {
            outcome.report = Some(report);
            outcome.advance(job, progress, JobStage::Skosified);
        }
        // The checkpoint still holds the partially repaired graph; it is
        // uploaded below.
        Err(e) => outcome.update.record_error(JobError::Skosify {
            message: e.to_string(),
        }),
    }

    outcome.archived = archive(&ctx.vocabulary_dir, &job.short_name, &checkpoint.turtle).await;

    // --- Upload ---
    let receipt = ctx
        .store
        .replace(
            &namespace,
            checkpoint.turtle.into_bytes(),
            VocabFormat::Turtle.mime_type(),
        )
        .await
        .map_err(upload_error)?;
    outcome.update.triple_count = Some(receipt.triple_count);
    outcome.advance(job, progress, JobStage::Uploaded);

    if outcome.update.error.is_none() {
        let entry = CatalogEntry {
            short_name: &job.short_name,
            title: &job.title,
            namespace: &namespace,
            sparql_endpoint: &ctx.sparql_endpoint,
        };
        outcome.update.catalog_entry = Some(entry.render());
    }
    Ok(())
}

/// Keep a copy of the uploaded Turtle. Failures are only logged.
async fn archive(dir: &Path, short_name: &str, turtle: &str) -> Option<PathBuf> {
    let path = dir.join(format!("{}.ttl", slot_name(short_name)));
    let written = match tokio::fs::create_dir_all(dir).await {
        Ok(()) => tokio::fs::write(&path, turtle).await,
        Err(e) => Err(e),
    };
    match written {
        Ok(()) => Some(path),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to archive vocabulary");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Error classification
// ---------------------------------------------------------------------------

fn download_error(error: VocabError) -> JobError {
    match error {
        VocabError::HttpStatus { status, body, .. } => JobError::Download {
            status: Some(status),
            message: if body.trim().is_empty() {
                format!("HTTP {status}")
            } else {
                body
            },
        },
        VocabError::Io { .. } => unknown_error(error),
        other => JobError::Download {
            status: None,
            message: other.to_string(),
        },
    }
}

fn import_error(error: VocabError) -> JobError {
    match error {
        VocabError::Parse { message } => JobError::Parse { message },
        other => download_error(other),
    }
}

fn upload_error(error: VocabError) -> JobError {
    match error {
        VocabError::HttpStatus { status, body, .. } => JobError::Upload {
            status: Some(status),
            message: if body.trim().is_empty() {
                format!("HTTP {status}")
            } else {
                body
            },
        },
        other => JobError::Upload {
            status: None,
            message: other.to_string(),
        },
    }
}

/// Filesystem faults keep the underlying error's type name.
fn unknown_error(error: VocabError) -> JobError {
    match error {
        VocabError::Io { source, .. } => JobError::unknown(&source),
        other => JobError::unknown(&other),
    }
}

/// Classify a task that did not complete.
pub fn panic_error(error: JoinError) -> JobError {
    if !error.is_panic() {
        return JobError::Unknown {
            type_name: "cancelled".into(),
            message: error.to_string(),
        };
    }
    let payload = error.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "job panicked".into());
    JobError::Unknown {
        type_name: "panic".into(),
        message,
    }
}
