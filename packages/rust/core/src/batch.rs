//! Batch runner: every ready ledger row through the ingestion pipeline.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use vocabsync_shared::{
    JobError, LedgerRow, PersistMode, PipelineConfig, Result, SheetUpdate, VocabularyJob, column,
};
use vocabsync_storage::{Ledger, RunStats};

use crate::pipeline::{IngestContext, JobOutcome, ProgressReporter, ingest, panic_error};

/// How a batch schedules jobs and persists results.
#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
    /// Jobs running at once; `1` keeps strict sequential order.
    pub workers: usize,
    pub persist: PersistMode,
}

impl From<&PipelineConfig> for BatchOptions {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            workers: config.workers.max(1),
            persist: config.persist,
        }
    }
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

/// Result of one processed row.
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub position: usize,
    pub short_name: String,
    pub update: SheetUpdate,
}

/// Result of a batch run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    /// Run id in the ledger history, absent when the run could not be recorded.
    pub run_id: Option<String>,
    pub stats: RunStats,
    pub jobs: Vec<JobSummary>,
    pub ledger_write_failures: usize,
    pub elapsed_ms: u128,
}

enum Planned {
    Skip,
    Invalid(JobError),
    Ready(VocabularyJob),
}

enum Pending {
    Done {
        index: usize,
        short_name: String,
        update: SheetUpdate,
    },
    Running {
        index: usize,
        short_name: String,
        handle: JoinHandle<JobOutcome>,
    },
}

impl Pending {
    async fn resolve(self) -> (usize, String, SheetUpdate) {
        match self {
            Self::Done {
                index,
                short_name,
                update,
            } => (index, short_name, update),
            Self::Running {
                index,
                short_name,
                handle,
            } => {
                let update = match handle.await {
                    Ok(outcome) => outcome.update,
                    Err(e) => {
                        error!(short_name = %short_name, error = %e, "job aborted");
                        SheetUpdate {
                            error: Some(panic_error(e)),
                            ..SheetUpdate::default()
                        }
                    }
                };
                (index, short_name, update)
            }
        }
    }
}

/// Writes results back as they are resolved, in ledger order.
struct Recorder<'a> {
    ledger: &'a Ledger,
    persist: PersistMode,
    progress: &'a dyn ProgressReporter,
    summary: BatchSummary,
    touched: HashSet<usize>,
}

impl Recorder<'_> {
    async fn record(&mut self, row: &mut LedgerRow, short_name: String, update: SheetUpdate) {
        row.apply(&update);
        if update.is_success() {
            self.summary.stats.succeeded += 1;
        } else {
            self.summary.stats.failed += 1;
        }
        self.progress.job_finished(&short_name, &update);

        if self.persist == PersistMode::PerJob {
            if let Err(e) = self.ledger.write_row(row).await {
                error!(severity = "critical", position = row.position, error = %e, "ledger write failed");
                self.summary.ledger_write_failures += 1;
            }
        }
        self.touched.insert(row.position);

        if let Some(run_id) = &self.summary.run_id {
            if let Err(e) = self
                .ledger
                .record_job_result(run_id, row.position, &short_name, &update)
                .await
            {
                error!(severity = "critical", position = row.position, error = %e, "job result not recorded");
                self.summary.ledger_write_failures += 1;
            }
        }

        self.summary.jobs.push(JobSummary {
            position: row.position,
            short_name,
            update,
        });
    }

    async fn drain(&mut self, queue: &mut VecDeque<Pending>, rows: &mut [LedgerRow]) {
        while let Some(pending) = queue.pop_front() {
            let (index, short_name, update) = pending.resolve().await;
            self.record(&mut rows[index], short_name, update).await;
        }
    }
}

fn spawn_job(
    ctx: Arc<IngestContext>,
    job: VocabularyJob,
    semaphore: Arc<Semaphore>,
    progress: Arc<dyn ProgressReporter>,
) -> JoinHandle<JobOutcome> {
    tokio::spawn(async move {
        // A closed semaphore only means no throttling.
        let _permit = semaphore.acquire_owned().await.ok();
        ingest(&ctx, &job, &*progress).await
    })
}

/// Process every ready row of the ledger.
///
/// 1. Load rows and open a run record
/// 2. Validate rows; rows not exactly the schema width are flagged `Missing Input`
/// 3. Ingest ready rows, one at a time or through a bounded pool
/// 4. Write each result back in ledger order and record it in the run history
///
/// Only loading the ledger can fail the batch. Individual jobs never do, and
/// ledger write failures are logged and counted.
#[instrument(skip_all, fields(workers = options.workers))]
pub async fn run_batch(
    ctx: Arc<IngestContext>,
    ledger: &Ledger,
    options: BatchOptions,
    progress: Arc<dyn ProgressReporter>,
) -> Result<BatchSummary> {
    let start = Instant::now();

    // --- Phase 1: Load ---
    let mut rows = ledger.load_rows().await?;
    let run_id = match ledger.insert_run().await {
        Ok(id) => Some(id),
        Err(e) => {
            error!(severity = "critical", error = %e, "could not open run record");
            None
        }
    };
    info!(rows = rows.len(), run_id = run_id.as_deref().unwrap_or(""), "batch started");

    // --- Phase 2: Plan ---
    let plan: Vec<Planned> = rows
        .iter()
        .map(|row| match VocabularyJob::from_row(row) {
            Err(e) => {
                warn!(position = row.position, found = row.cells.len(), "row has wrong column count");
                Planned::Invalid(e)
            }
            Ok(job) if job.ready => Planned::Ready(job),
            Ok(_) => Planned::Skip,
        })
        .collect();
    let total_ready = plan.iter().filter(|p| matches!(p, Planned::Ready(_))).count();

    let mut recorder = Recorder {
        ledger,
        persist: options.persist,
        progress: &*progress,
        summary: BatchSummary {
            run_id,
            stats: RunStats {
                total: rows.len(),
                ..RunStats::default()
            },
            ..BatchSummary::default()
        },
        touched: HashSet::new(),
    };

    // --- Phase 3: Ingest ---
    let sequential = options.workers <= 1;
    let semaphore = Arc::new(Semaphore::new(options.workers.max(1)));
    let mut queue = VecDeque::new();
    let mut started = 0;

    for (index, planned) in plan.into_iter().enumerate() {
        let short_name = rows[index].cell(column::SHORT_NAME).to_string();
        match planned {
            Planned::Skip => {
                recorder.summary.stats.skipped += 1;
                continue;
            }
            Planned::Invalid(error) => queue.push_back(Pending::Done {
                index,
                short_name,
                update: SheetUpdate {
                    error: Some(error),
                    ..SheetUpdate::default()
                },
            }),
            Planned::Ready(job) => {
                started += 1;
                progress.job_started(&job, started, total_ready);
                let handle = spawn_job(
                    Arc::clone(&ctx),
                    job,
                    Arc::clone(&semaphore),
                    Arc::clone(&progress),
                );
                queue.push_back(Pending::Running {
                    index,
                    short_name,
                    handle,
                });
            }
        }
        if sequential {
            recorder.drain(&mut queue, &mut rows).await;
        }
    }

    // --- Phase 4: Record ---
    recorder.drain(&mut queue, &mut rows).await;

    if options.persist == PersistMode::EndOfRun && !recorder.touched.is_empty() {
        let changed: Vec<LedgerRow> = rows
            .iter()
            .filter(|row| recorder.touched.contains(&row.position))
            .cloned()
            .collect();
        if let Err(e) = ledger.write_rows(&changed).await {
            error!(severity = "critical", rows = changed.len(), error = %e, "ledger write failed");
            recorder.summary.ledger_write_failures += changed.len();
        }
    }

    let mut summary = recorder.summary;
    if let Some(run_id) = &summary.run_id {
        if let Err(e) = ledger.finish_run(run_id, &summary.stats).await {
            error!(severity = "critical", error = %e, "could not close run record");
            summary.ledger_write_failures += 1;
        }
    }
    summary.elapsed_ms = start.elapsed().as_millis();

    info!(
        total = summary.stats.total,
        succeeded = summary.stats.succeeded,
        failed = summary.stats.failed,
        skipped = summary.stats.skipped,
        elapsed_ms = summary.elapsed_ms as u64,
        "batch finished"
    );
    progress.done(&summary);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::SilentProgress;
    use crate::pipeline::tests::{NT, mount_store, test_config, zipped};

    use uuid::Uuid;
    use vocabsync_shared::ROW_WIDTH;
    use vocabsync_skos::{Graph, Skosify, SkosifyOptions, SkosifyReport};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    async fn temp_ledger() -> Ledger {
        let tmp = std::env::temp_dir().join(format!("vs_test_{}.db", Uuid::now_v7()));
        Ledger::open(&tmp).await.expect("open test db")
    }

    fn raw_row(position: usize, cells: &[&str]) -> LedgerRow {
        LedgerRow::new(position, cells.iter().map(|c| c.to_string()).collect())
    }

    /// Input cells padded with empty output columns.
    fn row(position: usize, cells: &[&str]) -> LedgerRow {
        let mut row = raw_row(position, cells);
        row.cells.resize(ROW_WIDTH, String::new());
        row
    }

    async fn seeded(server: &MockServer) -> Ledger {
        let uri = server.uri();
        let ledger = temp_ledger().await;
        ledger
            .replace_rows(&[
                row(0, &["Example", &format!("{uri}/v.zip"), "nt", "ex", "", "y"]),
                row(1, &["Gone", &format!("{uri}/gone.ttl"), "ttl", "gone", "", "y"]),
                raw_row(
                    2,
                    &["Short", &format!("{uri}/short.nt"), "nt", "short", "", "y", "", "", "", ""],
                ),
                row(3, &["Later", &format!("{uri}/later.nt"), "nt", "later", "", "n"]),
            ])
            .await
            .unwrap();
        ledger
    }

    async fn mount_sources(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/v.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(zipped(NT)))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gone.ttl"))
            .respond_with(ResponseTemplate::new(404).set_body_string("gone"))
            .mount(server)
            .await;
        for untouched in ["/short.nt", "/later.nt"] {
            Mock::given(method("GET"))
                .and(path(untouched))
                .respond_with(ResponseTemplate::new(200).set_body_string(NT))
                .expect(0)
                .mount(server)
                .await;
        }
        mount_store(server, 12).await;
    }

    fn assert_rows(rows: &[LedgerRow]) {
        assert_eq!(rows[0].cell(column::GENERATED_NAMESPACE), "http://ex.org/v/");
        assert_eq!(rows[0].cell(column::TRIPLE_COUNT), "12");
        assert_eq!(rows[0].cell(column::ERROR_KIND), "");
        assert!(rows[0].cell(column::CATALOG_ENTRY).starts_with(":ex a skosmos:Vocabulary"));

        assert_eq!(rows[1].cell(column::ERROR_KIND), "DOWNLOAD ERROR (404)");
        assert_eq!(rows[1].cell(column::ERROR_MESSAGE), "gone");
        assert_eq!(rows[1].cell(column::GENERATED_NAMESPACE), "");

        assert_eq!(rows[2].cell(column::ERROR_KIND), "Missing Input");
        assert_eq!(rows[2].cell(column::TRIPLE_COUNT), "");

        assert_eq!(rows[3].cells.len(), ROW_WIDTH);
        assert_eq!(rows[3].cell(column::ERROR_KIND), "");
    }

    #[tokio::test]
    async fn sequential_batch_records_every_row() {
        let server = MockServer::start().await;
        mount_sources(&server).await;
        let ledger = seeded(&server).await;
        let ctx = Arc::new(IngestContext::from_config(&test_config(&server)).unwrap());

        let summary = run_batch(ctx, &ledger, BatchOptions::default(), Arc::new(SilentProgress))
            .await
            .unwrap();

        assert_eq!(
            summary.stats,
            RunStats {
                total: 4,
                succeeded: 1,
                failed: 2,
                skipped: 1
            }
        );
        assert_eq!(summary.ledger_write_failures, 0);
        let positions: Vec<usize> = summary.jobs.iter().map(|j| j.position).collect();
        assert_eq!(positions, vec![0, 1, 2]);

        assert_rows(&ledger.load_rows().await.unwrap());

        let run_id = summary.run_id.unwrap();
        let history = ledger.list_job_results(&run_id).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].triple_count, Some(12));
        assert_eq!(history[2].error_kind.as_deref(), Some("Missing Input"));
        assert_eq!(
            summary.jobs[2].update.error,
            Some(JobError::MissingInput {
                found: ROW_WIDTH - 1,
                expected: ROW_WIDTH
            })
        );
        let runs = ledger.list_runs(5).await.unwrap();
        assert_eq!(runs[0].stats.map(|s| s.succeeded), Some(1));
    }

    #[tokio::test]
    async fn pooled_batch_matches_sequential_results() {
        let server = MockServer::start().await;
        mount_sources(&server).await;
        let ledger = seeded(&server).await;
        let ctx = Arc::new(IngestContext::from_config(&test_config(&server)).unwrap());

        let options = BatchOptions {
            workers: 3,
            persist: PersistMode::EndOfRun,
        };
        let summary = run_batch(ctx, &ledger, options, Arc::new(SilentProgress))
            .await
            .unwrap();

        let positions: Vec<usize> = summary.jobs.iter().map(|j| j.position).collect();
        assert_eq!(positions, vec![0, 1, 2]);
        assert_eq!(summary.stats.succeeded, 1);
        assert_rows(&ledger.load_rows().await.unwrap());
    }

    #[tokio::test]
    async fn panicking_job_does_not_stop_the_run() {
        struct Exploding;
        impl Skosify for Exploding {
            fn name(&self) -> &'static str {
                "exploding"
            }
            fn skosify(&self, _graph: &mut Graph, _options: &SkosifyOptions) -> Result<SkosifyReport> {
                panic!("repair blew up");
            }
        }

        let server = MockServer::start().await;
        mount_sources(&server).await;
        let ledger = seeded(&server).await;
        let ctx = IngestContext::from_config(&test_config(&server))
            .unwrap()
            .with_skosify(Arc::new(Exploding));

        let summary = run_batch(
            Arc::new(ctx),
            &ledger,
            BatchOptions::default(),
            Arc::new(SilentProgress),
        )
        .await
        .unwrap();

        assert_eq!(summary.stats.failed, 3);
        let rows = ledger.load_rows().await.unwrap();
        assert_eq!(rows[0].cell(column::ERROR_KIND), "UNKNOWN ERROR");
        assert!(rows[0].cell(column::ERROR_MESSAGE).contains("repair blew up"));
        assert_eq!(rows[1].cell(column::ERROR_KIND), "DOWNLOAD ERROR (404)");
    }

    #[tokio::test]
    async fn pooled_panic_leaves_sibling_jobs_intact() {
        struct ExplodingFor(&'static str);
        impl Skosify for ExplodingFor {
            fn name(&self) -> &'static str {
                "exploding"
            }
            fn skosify(&self, _graph: &mut Graph, options: &SkosifyOptions) -> Result<SkosifyReport> {
                if options.label == self.0 {
                    panic!("repair blew up");
                }
                Ok(SkosifyReport::default())
            }
        }

        let server = MockServer::start().await;
        mount_sources(&server).await;
        let uri = server.uri();
        let ledger = temp_ledger().await;
        ledger
            .replace_rows(&[
                row(0, &["Example", &format!("{uri}/v.zip"), "nt", "ex", "", "y"]),
                row(1, &["Sibling", &format!("{uri}/v.zip"), "nt", "sib", "", "y"]),
                row(2, &["Gone", &format!("{uri}/gone.ttl"), "ttl", "gone", "", "y"]),
            ])
            .await
            .unwrap();
        let ctx = IngestContext::from_config(&test_config(&server))
            .unwrap()
            .with_skosify(Arc::new(ExplodingFor("Example")));
        let options = BatchOptions {
            workers: 3,
            persist: PersistMode::PerJob,
        };

        let summary = run_batch(Arc::new(ctx), &ledger, options, Arc::new(SilentProgress))
            .await
            .unwrap();

        let positions: Vec<usize> = summary.jobs.iter().map(|j| j.position).collect();
        assert_eq!(positions, vec![0, 1, 2]);
        assert_eq!(summary.stats.succeeded, 1);
        assert_eq!(summary.stats.failed, 2);
        assert_eq!(summary.ledger_write_failures, 0);

        let rows = ledger.load_rows().await.unwrap();
        assert_eq!(rows[0].cell(column::ERROR_KIND), "UNKNOWN ERROR");
        assert!(rows[0].cell(column::ERROR_MESSAGE).contains("repair blew up"));
        assert_eq!(rows[1].cell(column::ERROR_KIND), "");
        assert_eq!(rows[1].cell(column::TRIPLE_COUNT), "12");
        assert_eq!(rows[2].cell(column::ERROR_KIND), "DOWNLOAD ERROR (404)");
    }

    #[tokio::test]
    async fn readonly_ledger_failures_are_counted_not_fatal() {
        let server = MockServer::start().await;
        mount_sources(&server).await;
        let tmp = std::env::temp_dir().join(format!("vs_test_{}.db", Uuid::now_v7()));
        {
            let rw = Ledger::open(&tmp).await.unwrap();
            rw.replace_rows(&[raw_row(0, &["Short", "http://x", "nt", "s", ""])])
                .await
                .unwrap();
        }
        let ro = Ledger::open_readonly(&tmp).await.unwrap();
        let ctx = Arc::new(IngestContext::from_config(&test_config(&server)).unwrap());

        let summary = run_batch(ctx, &ro, BatchOptions::default(), Arc::new(SilentProgress))
            .await
            .unwrap();

        assert_eq!(summary.run_id, None);
        assert_eq!(summary.stats.failed, 1);
        assert_eq!(summary.ledger_write_failures, 1);
        assert_eq!(
            summary.jobs[0].update.error,
            Some(JobError::MissingInput {
                found: 5,
                expected: ROW_WIDTH
            })
        );
    }

    #[tokio::test]
    async fn readonly_ledger_end_of_run_write_counts_every_row() {
        let server = MockServer::start().await;
        mount_sources(&server).await;
        let uri = server.uri();
        let tmp = std::env::temp_dir().join(format!("vs_test_{}.db", Uuid::now_v7()));
        {
            let rw = Ledger::open(&tmp).await.unwrap();
            rw.replace_rows(&[
                row(0, &["Example", &format!("{uri}/v.zip"), "nt", "ex", "", "y"]),
                row(1, &["Gone", &format!("{uri}/gone.ttl"), "ttl", "gone", "", "y"]),
                row(2, &["Later", &format!("{uri}/later.nt"), "nt", "later", "", "n"]),
            ])
            .await
            .unwrap();
        }
        let ro = Ledger::open_readonly(&tmp).await.unwrap();
        let ctx = Arc::new(IngestContext::from_config(&test_config(&server)).unwrap());
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);
        let options = BatchOptions {
            workers: 2,
            persist: PersistMode::EndOfRun,
        };

        let summary = run_batch(ctx, &ro, options, Arc::new(SilentProgress))
            .await
            .unwrap();

        assert_eq!(summary.run_id, None);
        assert_eq!(summary.stats.succeeded, 1);
        assert_eq!(summary.stats.failed, 1);
        // One batched write covering both processed rows.
        assert_eq!(summary.ledger_write_failures, 2);
        let logged = logs.contents();
        assert!(logged.contains("ledger write failed"));
        assert!(logged.contains("severity=\"critical\""));
        assert!(logged.contains("rows=2"));

        let rows = ro.load_rows().await.unwrap();
        assert_eq!(rows[0].cell(column::TRIPLE_COUNT), "");
        assert_eq!(rows[1].cell(column::ERROR_KIND), "");
    }

    #[test]
    fn options_follow_pipeline_config() {
        let mut config = PipelineConfig::default();
        config.workers = 0;
        config.persist = PersistMode::EndOfRun;
        let options = BatchOptions::from(&config);
        assert_eq!(options.workers, 1);
        assert_eq!(options.persist, PersistMode::EndOfRun);
    }
}
