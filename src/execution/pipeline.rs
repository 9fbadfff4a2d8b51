//! Preprocessing pipeline.
//!
//! [`PreprocessingPipeline::submit`] schedules one job on the worker pool and
//! returns immediately. A job ensures the destination exists, decodes the
//! source, reuses the cached artifact when the chain is unchanged, and
//! otherwise runs the chain and persists its output. Results are settled
//! through a [`ResultSlot`] so the value visible for a target follows
//! submission order.

use crate::core::error::{CacheWarning, PipelineError, PrepResult};
use crate::core::tracker::{ChainRegistry, ChangeTracker};
use crate::core::transform::{ChainProvider, ChainSnapshot};
use crate::core::types::{ProcessingResult, ResultOrigin, Sequence, SourceImage, TargetId};
use crate::execution::cache::{ArtifactFormat, CacheStats, CacheStore};
use crate::execution::events::{JobHandle, JobOutcome, PipelineEvent};
use crate::execution::slot::ResultSlot;
use crossbeam::channel::{self, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Pipeline options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    /// Number of worker threads (0 = one per available core).
    pub worker_threads: usize,
    /// Format cache artifacts are written in.
    pub artifact_format: ArtifactFormat,
    /// Stop a job before its expensive steps once a later submission for
    /// the same target exists.
    pub cancel_superseded: bool,
    /// Send [`PipelineEvent::Superseded`] for jobs whose outcome was dropped.
    pub notify_superseded: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            artifact_format: ArtifactFormat::Png,
            cancel_superseded: false,
            notify_superseded: false,
        }
    }
}

impl PipelineOptions {
    /// Set the number of worker threads.
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    /// Set the artifact format.
    pub fn with_artifact_format(mut self, format: ArtifactFormat) -> Self {
        self.artifact_format = format;
        self
    }

    /// Enable or disable cooperative cancellation.
    pub fn with_cancel_superseded(mut self, cancel: bool) -> Self {
        self.cancel_superseded = cancel;
        self
    }

    /// Enable or disable superseded notifications.
    pub fn with_notify_superseded(mut self, notify: bool) -> Self {
        self.notify_superseded = notify;
        self
    }

    /// Parse options from a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> PrepResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read options from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> PrepResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

/// Everything a job needs, captured when it was submitted.
struct Job {
    target: TargetId,
    sequence: Sequence,
    source: PathBuf,
    destination: PathBuf,
    snapshot: ChainSnapshot,
    changed: bool,
}

/// Why a job stopped without producing a result.
enum Stop {
    Failed(PipelineError),
    Cancelled,
}

impl From<PipelineError> for Stop {
    fn from(error: PipelineError) -> Self {
        Stop::Failed(error)
    }
}

/// State shared between the pipeline and its workers.
struct Shared {
    store: CacheStore,
    slot: ResultSlot<ProcessingResult>,
    options: PipelineOptions,
    events: Sender<PipelineEvent>,
}

impl Shared {
    fn run(&self, job: Job) -> JobOutcome {
        let started = Instant::now();
        log::debug!(
            "job {}#{} started for {}",
            job.target,
            job.sequence,
            job.source.display()
        );

        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| self.process(&job, started))) {
            Ok(Ok((result, warnings))) => self.settle_result(&job, result, warnings),
            Ok(Err(Stop::Failed(error))) => self.settle_failure(&job, error),
            Ok(Err(Stop::Cancelled)) => {
                log::debug!("job {}#{} cancelled", job.target, job.sequence);
                JobOutcome::Cancelled
            }
            Err(payload) => {
                let error = PipelineError::WorkerPanicked {
                    path: job.source.clone(),
                    message: panic_message(&*payload),
                };
                self.settle_failure(&job, error)
            }
        };

        log::debug!(
            "job {}#{} {} after {:?}",
            job.target,
            job.sequence,
            outcome.label(),
            started.elapsed()
        );
        outcome
    }

    fn process(
        &self,
        job: &Job,
        started: Instant,
    ) -> Result<(ProcessingResult, Vec<CacheWarning>), Stop> {
        self.store
            .ensure_dir(&job.destination)
            .map_err(|e| PipelineError::Directory {
                path: job.destination.clone(),
                error: e.to_string(),
            })?;
        let cache_path = self.store.cache_path(&job.destination, &job.source);
        if self.store.is_source(&cache_path, &job.source) {
            return Err(PipelineError::ArtifactIsSource {
                path: job.source.clone(),
            }
            .into());
        }

        self.check_cancelled(job)?;
        let source_image = SourceImage::open(&job.source).map_err(|e| PipelineError::Decode {
            path: job.source.clone(),
            error: e.to_string(),
        })?;

        let mut warnings = Vec::new();
        if !job.changed {
            let dimensions = (source_image.width(), source_image.height());
            match self.store.load_matching(&cache_path, dimensions) {
                Ok(Some(binary_image)) => {
                    log::debug!("cache hit: {}", cache_path.display());
                    let result = ProcessingResult {
                        source_path: job.source.clone(),
                        source_image,
                        cache_path,
                        binary_image,
                        chain_version: job.snapshot.version,
                        origin: ResultOrigin::Cached,
                        duration: started.elapsed(),
                    };
                    return Ok((result, warnings));
                }
                Ok(None) => log::debug!("cache miss: {}", cache_path.display()),
                Err(warning) => {
                    log::warn!("{}; recomputing", warning);
                    warnings.push(warning);
                }
            }
        }

        self.check_cancelled(job)?;
        let binary_image =
            job.snapshot
                .chain
                .apply(&source_image)
                .map_err(|e| PipelineError::Transform {
                    path: job.source.clone(),
                    version: job.snapshot.version,
                    error: e.to_string(),
                })?;

        if let Err(warning) = self.store.store(&cache_path, &binary_image) {
            log::warn!("{}", warning);
            warnings.push(warning);
        }

        let result = ProcessingResult {
            source_path: job.source.clone(),
            source_image,
            cache_path,
            binary_image,
            chain_version: job.snapshot.version,
            origin: ResultOrigin::Fresh,
            duration: started.elapsed(),
        };
        Ok((result, warnings))
    }

    fn check_cancelled(&self, job: &Job) -> Result<(), Stop> {
        if self.options.cancel_superseded && self.slot.is_superseded(&job.target, job.sequence) {
            return Err(Stop::Cancelled);
        }
        Ok(())
    }

    fn settle_result(
        &self,
        job: &Job,
        result: ProcessingResult,
        warnings: Vec<CacheWarning>,
    ) -> JobOutcome {
        let result = Arc::new(result);
        if !self.slot.publish(&job.target, job.sequence, Arc::clone(&result)) {
            self.notify_superseded(job);
            return JobOutcome::Superseded { result };
        }

        log::info!(
            "{} -> {} ({}, {})",
            job.source.display(),
            result.cache_path.display(),
            result.origin,
            result.chain_version
        );
        self.send(PipelineEvent::Result {
            target: job.target.clone(),
            sequence: job.sequence,
            result: Arc::clone(&result),
            warnings: warnings.clone(),
        });
        JobOutcome::Published { result, warnings }
    }

    fn settle_failure(&self, job: &Job, error: PipelineError) -> JobOutcome {
        let reported = self.slot.settle(&job.target, job.sequence);
        if reported {
            log::error!("{}", error);
            self.send(PipelineEvent::Failure {
                target: job.target.clone(),
                sequence: job.sequence,
                source: job.source.clone(),
                error: error.clone(),
            });
        } else {
            log::debug!("superseded job {}#{} failed: {}", job.target, job.sequence, error);
            self.notify_superseded(job);
        }
        JobOutcome::Failed { error, reported }
    }

    fn notify_superseded(&self, job: &Job) {
        log::debug!("job {}#{} superseded", job.target, job.sequence);
        if self.options.notify_superseded {
            self.send(PipelineEvent::Superseded {
                target: job.target.clone(),
                sequence: job.sequence,
                source: job.source.clone(),
            });
        }
    }

    fn send(&self, event: PipelineEvent) {
        // The receiver lives as long as the pipeline; after that nobody listens.
        let _ = self.events.send(event);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Background preprocessing pipeline.
pub struct PreprocessingPipeline {
    pool: rayon::ThreadPool,
    shared: Arc<Shared>,
    chains: Arc<dyn ChainProvider>,
    tracker: Arc<dyn ChangeTracker>,
    events: Receiver<PipelineEvent>,
}

impl PreprocessingPipeline {
    /// Create a pipeline with its own worker pool.
    pub fn new(
        options: PipelineOptions,
        chains: Arc<dyn ChainProvider>,
        tracker: Arc<dyn ChangeTracker>,
    ) -> PrepResult<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.worker_threads)
            .thread_name(|i| format!("pageprep-worker-{}", i))
            .build()?;
        let (events_tx, events) = channel::unbounded();

        log::debug!(
            "pipeline started with {} workers, {} artifacts",
            pool.current_num_threads(),
            options.artifact_format
        );

        Ok(Self {
            pool,
            shared: Arc::new(Shared {
                store: CacheStore::new(options.artifact_format),
                slot: ResultSlot::new(),
                options,
                events: events_tx,
            }),
            chains,
            tracker,
            events,
        })
    }

    /// Create a pipeline whose chains and change tracking both come from
    /// `registry`.
    pub fn with_registry(options: PipelineOptions, registry: Arc<ChainRegistry>) -> PrepResult<Self> {
        let chains: Arc<dyn ChainProvider> = registry.clone();
        let tracker: Arc<dyn ChangeTracker> = registry;
        Self::new(options, chains, tracker)
    }

    /// Schedule preprocessing of `source` into `destination` for `target`.
    ///
    /// The chain configuration and the change decision are captured here,
    /// on the caller's thread, and used unchanged by the job.
    pub fn submit(
        &self,
        target: impl Into<TargetId>,
        source: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
    ) -> JobHandle {
        let target = target.into();
        let source = source.into();
        let snapshot = self.chains.snapshot(&source);
        let changed = self.tracker.has_changed(&source);
        let sequence = self.shared.slot.begin(&target);
        let (outcome_tx, outcome_rx) = channel::bounded(1);

        log::debug!(
            "submit {}#{}: {} (chain {}, changed: {})",
            target,
            sequence,
            source.display(),
            snapshot.version,
            changed
        );

        let job = Job {
            target: target.clone(),
            sequence,
            source: source.clone(),
            destination: destination.into(),
            snapshot,
            changed,
        };
        let shared = Arc::clone(&self.shared);
        self.pool.spawn(move || {
            let outcome = shared.run(job);
            let _ = outcome_tx.send(outcome);
        });

        JobHandle {
            target,
            sequence,
            source,
            outcome: outcome_rx,
        }
    }

    /// Result currently visible for `target`.
    pub fn current(&self, target: &TargetId) -> Option<Arc<ProcessingResult>> {
        self.shared.slot.current(target)
    }

    /// Receiver for controller notifications. Clones share one queue.
    pub fn events(&self) -> Receiver<PipelineEvent> {
        self.events.clone()
    }

    /// Artifact path a submission of `source` into `destination` uses.
    pub fn cache_path(&self, destination: &Path, source: &Path) -> PathBuf {
        self.shared.store.cache_path(destination, source)
    }

    /// Cache statistics since the pipeline started.
    pub fn cache_stats(&self) -> CacheStats {
        self.shared.store.stats()
    }

    /// Result slots of this pipeline.
    pub fn slot(&self) -> &ResultSlot<ProcessingResult> {
        &self.shared.slot
    }

    /// Options the pipeline was started with.
    pub fn options(&self) -> &PipelineOptions {
        &self.shared.options
    }

    /// Number of worker threads.
    pub fn worker_count(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl std::fmt::Debug for PreprocessingPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreprocessingPipeline")
            .field("workers", &self.pool.current_num_threads())
            .field("options", &self.shared.options)
            .finish()
    }
}
