//! Job outcomes, controller notifications and job handles.

use crate::core::error::{CacheWarning, PipelineError, PrepError, PrepResult};
use crate::core::types::{ProcessingResult, Sequence, TargetId};
use crossbeam::channel::{Receiver, RecvTimeoutError, TryRecvError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Notification delivered to the controller.
///
/// Events are queued on a channel the controller drains from whatever thread
/// owns its state, so consuming them needs no extra locking. Each job that is
/// not superseded produces exactly one `Result` or `Failure`.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// A job published a result into its target's slot.
    Result {
        target: TargetId,
        sequence: Sequence,
        result: Arc<ProcessingResult>,
        /// Non-fatal cache problems hit while producing `result`.
        warnings: Vec<CacheWarning>,
    },
    /// A job failed. The slot keeps its previous value.
    Failure {
        target: TargetId,
        sequence: Sequence,
        source: PathBuf,
        error: PipelineError,
    },
    /// A job finished after a later submission had already settled. Only
    /// sent when `notify_superseded` is enabled.
    Superseded {
        target: TargetId,
        sequence: Sequence,
        source: PathBuf,
    },
}

impl PipelineEvent {
    /// Target the event belongs to.
    pub fn target(&self) -> &TargetId {
        match self {
            PipelineEvent::Result { target, .. }
            | PipelineEvent::Failure { target, .. }
            | PipelineEvent::Superseded { target, .. } => target,
        }
    }

    /// Sequence of the job the event belongs to.
    pub fn sequence(&self) -> Sequence {
        match self {
            PipelineEvent::Result { sequence, .. }
            | PipelineEvent::Failure { sequence, .. }
            | PipelineEvent::Superseded { sequence, .. } => *sequence,
        }
    }
}

/// How a single job ended.
#[derive(Debug, Clone)]
pub enum JobOutcome {
    /// The result became the slot's current value.
    Published {
        result: Arc<ProcessingResult>,
        warnings: Vec<CacheWarning>,
    },
    /// The job completed but a later submission had already settled; its
    /// result was discarded.
    Superseded { result: Arc<ProcessingResult> },
    /// The job failed. `reported` is `false` if the failure was itself
    /// superseded and therefore not sent to the controller.
    Failed { error: PipelineError, reported: bool },
    /// The job noticed it had been superseded and stopped early.
    Cancelled,
}

impl JobOutcome {
    /// The job's result, whether or not it was published.
    pub fn result(&self) -> Option<&Arc<ProcessingResult>> {
        match self {
            JobOutcome::Published { result, .. } | JobOutcome::Superseded { result } => Some(result),
            _ => None,
        }
    }

    /// The job's error, if it failed.
    pub fn error(&self) -> Option<&PipelineError> {
        match self {
            JobOutcome::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Whether the result became visible in the slot.
    pub fn is_published(&self) -> bool {
        matches!(self, JobOutcome::Published { .. })
    }

    /// The published result, or the reason there is none.
    pub fn into_result(self) -> PrepResult<Arc<ProcessingResult>> {
        match self {
            JobOutcome::Published { result, .. } => Ok(result),
            JobOutcome::Failed { error, .. } => Err(error.into()),
            other => Err(PrepError::Other(format!("job {}", other.label()))),
        }
    }

    /// Short label for logs and CLI output.
    pub fn label(&self) -> &'static str {
        match self {
            JobOutcome::Published { .. } => "published",
            JobOutcome::Superseded { .. } => "superseded",
            JobOutcome::Failed { .. } => "failed",
            JobOutcome::Cancelled => "cancelled",
        }
    }
}

/// Handle to a submitted job.
#[derive(Debug)]
pub struct JobHandle {
    pub(crate) target: TargetId,
    pub(crate) sequence: Sequence,
    pub(crate) source: PathBuf,
    pub(crate) outcome: Receiver<JobOutcome>,
}

impl JobHandle {
    /// Target the job was submitted for.
    pub fn target(&self) -> &TargetId {
        &self.target
    }

    /// Submission sequence of the job within its target.
    pub fn sequence(&self) -> Sequence {
        self.sequence
    }

    /// Source image the job processes.
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Block until the job has finished.
    pub fn wait(self) -> JobOutcome {
        self.outcome
            .recv()
            .unwrap_or_else(|_| self.disconnected())
    }

    /// Block for at most `timeout`. Returns `None` if the job is still running.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<JobOutcome> {
        match self.outcome.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(self.disconnected()),
        }
    }

    /// The outcome if the job has already finished.
    pub fn try_outcome(&self) -> Option<JobOutcome> {
        match self.outcome.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(self.disconnected()),
        }
    }

    fn disconnected(&self) -> JobOutcome {
        JobOutcome::Failed {
            error: PipelineError::Disconnected {
                path: self.source.clone(),
            },
            reported: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel;

    fn handle(outcome: channel::Receiver<JobOutcome>) -> JobHandle {
        JobHandle {
            target: TargetId::from("page"),
            sequence: 3,
            source: PathBuf::from("pageA.tif"),
            outcome,
        }
    }

    #[test]
    fn test_wait_returns_sent_outcome() {
        let (tx, rx) = channel::bounded(1);
        let handle = handle(rx);
        assert!(handle.try_outcome().is_none());
        tx.send(JobOutcome::Cancelled).unwrap();
        assert!(matches!(handle.wait(), JobOutcome::Cancelled));
    }

    #[test]
    fn test_dropped_job_reports_disconnected() {
        let (tx, rx) = channel::bounded::<JobOutcome>(1);
        let handle = handle(rx);
        assert!(handle.wait_timeout(Duration::from_millis(1)).is_none());
        drop(tx);
        let outcome = handle.wait();
        assert!(matches!(
            outcome.error(),
            Some(PipelineError::Disconnected { .. })
        ));
        assert_eq!(outcome.label(), "failed");
    }

    #[test]
    fn test_into_result() {
        let failed = JobOutcome::Failed {
            error: PipelineError::Disconnected {
                path: PathBuf::from("a.png"),
            },
            reported: true,
        };
        assert!(matches!(failed.into_result(), Err(PrepError::Pipeline(_))));
        assert!(matches!(
            JobOutcome::Cancelled.into_result(),
            Err(PrepError::Other(message)) if message == "job cancelled"
        ));
    }

    #[test]
    fn test_event_accessors() {
        let event = PipelineEvent::Superseded {
            target: TargetId::from("page"),
            sequence: 7,
            source: PathBuf::from("a.png"),
        };
        assert_eq!(event.target().as_str(), "page");
        assert_eq!(event.sequence(), 7);
    }
}
