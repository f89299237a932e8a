/*!
 * Progress events emitted while a job runs.
 *
 * Events are delivered synchronously to an optional observer. The CLI uses
 * them to drive its progress bar; tests use them to interrupt runs at precise
 * points.
 */

use std::fmt;
use std::sync::Arc;

/// Observer callback for pipeline events
pub type EventCallback = Arc<dyn Fn(&PipelineEvent) + Send + Sync>;

/// Something noteworthy happened during a run
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// A job started (or resumed)
    JobStarted {
        job_id: String,
        total_windows: usize,
        resumed_windows: usize,
    },
    /// A top-level window started
    WindowStarted { index: usize, total_windows: usize, units: usize },
    /// Cache lookups for a window or sub-window finished
    CacheResolved { exact: usize, fuzzy: usize, pending: usize },
    /// A failed batch was halved
    WindowSplit {
        depth: usize,
        units: usize,
        reason: String,
    },
    /// A translated window failed the quality gate and is being redone
    QualityRerun { index: usize, high_issues: usize },
    /// A top-level window finished
    WindowFinished { index: usize, total_windows: usize },
    /// Progress was persisted
    CheckpointSaved { completed_windows: usize, total_windows: usize },
    /// Progress could not be persisted; the run continues
    CheckpointFailed { error: String },
    /// Every window finished
    JobFinished { job_id: String },
}

impl fmt::Display for PipelineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::JobStarted { job_id, total_windows, resumed_windows } => {
                if *resumed_windows > 0 {
                    write!(f, "Job {} resumed at window {}/{}", job_id, resumed_windows + 1, total_windows)
                } else {
                    write!(f, "Job {} started ({} windows)", job_id, total_windows)
                }
            }
            Self::WindowStarted { index, total_windows, units } => {
                write!(f, "Window {}/{} started ({} units)", index + 1, total_windows, units)
            }
            Self::CacheResolved { exact, fuzzy, pending } => {
                write!(f, "Cache: {} exact, {} fuzzy, {} to translate", exact, fuzzy, pending)
            }
            Self::WindowSplit { depth, units, reason } => {
                write!(f, "Splitting {} units at depth {}: {}", units, depth, reason)
            }
            Self::QualityRerun { index, high_issues } => {
                write!(f, "Window {} re-run after {} high severity issues", index + 1, high_issues)
            }
            Self::WindowFinished { index, total_windows } => {
                write!(f, "Window {}/{} finished", index + 1, total_windows)
            }
            Self::CheckpointSaved { completed_windows, total_windows } => {
                write!(f, "Checkpoint saved ({}/{})", completed_windows, total_windows)
            }
            Self::CheckpointFailed { error } => write!(f, "Checkpoint failed: {}", error),
            Self::JobFinished { job_id } => write!(f, "Job {} finished", job_id),
        }
    }
}
