/*!
 * Translation pipeline façade.
 *
 * `TranslationPipeline::execute` runs a whole job:
 * - derives (or accepts) the job identity
 * - resumes from a matching checkpoint, skipping completed windows
 * - translates the remaining windows in order through the batch scheduler
 * - checkpoints after every window and deletes the checkpoint on success
 *
 * Cancellation is checked before each window. A window that has started is
 * always finished and checkpointed first.
 */

use log::{info, warn};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::errors::TranslationError;
use crate::language_utils::LanguagePair;
use crate::providers::Provider;
use crate::session::{Checkpoint, CheckpointManager, JobIdentity, content_digest};

use super::batch::{BatchScheduler, RunStats};
use super::cache::TranslationCache;
use super::context::{ContextPropagator, DEFAULT_CONTEXT_SIZE};
use super::events::{EventCallback, PipelineEvent};
use super::prompts::PromptTemplate;
use super::quality::QualityGate;
use super::window::{TranslatedUnit, TranslationUnit, partition};

/// Default number of units per window
pub const DEFAULT_WINDOW_SIZE: usize = 20;

/// Default minimum similarity for a fuzzy cache hit
pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.95;

/// Default number of halvings before a window is abandoned
pub const DEFAULT_MAX_SPLIT_DEPTH: usize = 3;

/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Settings for one pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Source and target language
    pub language_pair: LanguagePair,
    /// Units per top-level window
    pub window_size: usize,
    /// Trailing output lines shown as passive context
    pub context_size: usize,
    /// Term translations rendered into the prompt
    pub glossary: BTreeMap<String, String>,
    /// System prompt template
    pub prompt_template: PromptTemplate,
    /// Minimum similarity for a fuzzy cache hit
    pub fuzzy_threshold: f64,
    /// Halvings allowed before a failing window aborts the run
    pub max_split_depth: usize,
    /// Upper bound on a single backend call
    pub request_timeout: Duration,
    /// Whether to lint each window and re-run it once on serious issues
    pub quality_gate: bool,
    /// Abort immediately instead of splitting when credentials are rejected
    pub abort_on_auth_failure: bool,
}

impl PipelineConfig {
    /// Defaults for the given language pair
    pub fn new(language_pair: LanguagePair) -> Self {
        Self {
            language_pair,
            window_size: DEFAULT_WINDOW_SIZE,
            context_size: DEFAULT_CONTEXT_SIZE,
            glossary: BTreeMap::new(),
            prompt_template: PromptTemplate::default(),
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
            max_split_depth: DEFAULT_MAX_SPLIT_DEPTH,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            quality_gate: true,
            abort_on_auth_failure: false,
        }
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), TranslationError> {
        if self.window_size == 0 {
            return Err(TranslationError::InvalidJob("window size must be at least 1".to_string()));
        }
        if !(self.fuzzy_threshold > 0.0 && self.fuzzy_threshold <= 1.0) {
            return Err(TranslationError::InvalidJob(format!(
                "fuzzy threshold must be in (0, 1], got {}",
                self.fuzzy_threshold
            )));
        }
        if self.prompt_template.as_str().trim().is_empty() {
            return Err(TranslationError::InvalidJob("prompt template is empty".to_string()));
        }
        if self.request_timeout.is_zero() {
            return Err(TranslationError::InvalidJob("request timeout must be positive".to_string()));
        }
        Ok(())
    }
}

/// Input of one pipeline run
#[derive(Debug, Clone, Default)]
pub struct TranslationJob {
    /// Units in output order
    pub units: Vec<TranslationUnit>,
    /// Caller chosen identity; derived from the content when absent
    pub job_id: Option<String>,
}

impl TranslationJob {
    /// Create a job with a derived identity
    pub fn new(units: Vec<TranslationUnit>) -> Self {
        Self { units, job_id: None }
    }

    /// Use an explicit job identity
    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }
}

/// Result of a completed run
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Identity the job ran under
    pub job_id: String,
    /// Translations in input order
    pub results: Vec<TranslatedUnit>,
    /// Run counters
    pub stats: RunStats,
}

/// Runs translation jobs end to end
pub struct TranslationPipeline {
    scheduler: BatchScheduler,
    checkpoints: Option<CheckpointManager>,
}

impl TranslationPipeline {
    /// Create a pipeline without checkpointing
    pub fn new(provider: Arc<dyn Provider>, cache: TranslationCache, config: PipelineConfig) -> Self {
        Self {
            scheduler: BatchScheduler::new(provider, cache, config),
            checkpoints: None,
        }
    }

    /// Persist progress through `manager`
    pub fn with_checkpoints(mut self, manager: CheckpointManager) -> Self {
        self.checkpoints = Some(manager);
        self
    }

    /// Deliver progress events to `observer`
    pub fn with_observer(mut self, observer: EventCallback) -> Self {
        self.scheduler = self.scheduler.with_observer(observer);
        self
    }

    /// Replace the quality gate
    pub fn with_quality_gate(mut self, gate: Arc<dyn QualityGate>) -> Self {
        self.scheduler = self.scheduler.with_quality_gate(gate);
        self
    }

    /// Active configuration
    pub fn config(&self) -> &PipelineConfig {
        self.scheduler.config()
    }

    /// Cache used by this pipeline
    pub fn cache(&self) -> &TranslationCache {
        self.scheduler.cache()
    }

    /// Translate a whole job
    pub async fn execute(
        &self,
        job: TranslationJob,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutput, TranslationError> {
        let config = self.scheduler.config();
        config.validate()?;
        validate_unique_ids(&job.units)?;

        let job_id = match &job.job_id {
            Some(id) => JobIdentity::parse(id).map_err(|e| TranslationError::InvalidJob(e.to_string()))?,
            None => JobIdentity::derive(&config.language_pair, config.window_size, &job.units),
        };

        let mut windows = partition(&job.units, config.window_size, config.context_size);
        let total_windows = windows.len();
        let mut stats = RunStats {
            windows_total: total_windows,
            ..RunStats::default()
        };

        if total_windows == 0 {
            return Ok(PipelineOutput {
                job_id: job_id.to_string(),
                results: Vec::new(),
                stats,
            });
        }

        let digest = content_digest(&config.language_pair, config.window_size, &job.units);
        let (mut results, start) = self.resume(&job_id, &digest, &job.units, total_windows);
        stats.windows_resumed = start;
        if start == 0 {
            self.save_checkpoint(&job_id, &digest, 0, total_windows, &results);
        }

        info!(
            "Job {}: {} units in {} windows ({} -> {}){}",
            job_id,
            job.units.len(),
            total_windows,
            config.language_pair.source,
            config.language_pair.target,
            if start > 0 { format!(", resuming at window {}", start + 1) } else { String::new() }
        );
        self.scheduler.emit(PipelineEvent::JobStarted {
            job_id: job_id.to_string(),
            total_windows,
            resumed_windows: start,
        });

        let mut context = ContextPropagator::seeded(config.context_size, &results);

        for window in windows.iter_mut().skip(start) {
            if cancel.is_cancelled() {
                warn!(
                    "Job {} cancelled after {} of {} windows",
                    job_id, window.index, total_windows
                );
                return Err(TranslationError::Cancelled {
                    completed_windows: window.index,
                    total_windows,
                });
            }

            window.context_lines = context.lines();
            let translated = self.scheduler.translate_window(window, &mut stats).await?;

            context.absorb(&translated);
            results.extend(translated);
            self.save_checkpoint(&job_id, &digest, window.index + 1, total_windows, &results);
        }

        if let Some(manager) = &self.checkpoints {
            if let Err(e) = manager.delete(&job_id) {
                warn!("Failed to delete checkpoint for job {}: {:#}", job_id, e);
            }
        }

        info!("Job {} finished: {}", job_id, stats);
        self.scheduler.emit(PipelineEvent::JobFinished {
            job_id: job_id.to_string(),
        });

        Ok(PipelineOutput {
            job_id: job_id.to_string(),
            results,
            stats,
        })
    }

    /// Load usable progress for `job_id`; anything unusable means a fresh start
    fn resume(
        &self,
        job_id: &JobIdentity,
        digest: &str,
        units: &[TranslationUnit],
        total_windows: usize,
    ) -> (Vec<TranslatedUnit>, usize) {
        let Some(manager) = &self.checkpoints else {
            return (Vec::new(), 0);
        };
        let config = self.scheduler.config();

        let checkpoint = match manager.load(job_id) {
            Ok(Some(checkpoint)) => checkpoint,
            Ok(None) => return (Vec::new(), 0),
            Err(e) => {
                warn!("Ignoring unreadable checkpoint for job {}: {:#}", job_id, e);
                return (Vec::new(), 0);
            }
        };

        if let Some(reason) = checkpoint.mismatch(job_id, total_windows, config.window_size, &config.language_pair, digest) {
            warn!("Ignoring checkpoint for job {}: {}", job_id, reason);
            return (Vec::new(), 0);
        }

        let covered = (checkpoint.completed_windows * config.window_size).min(units.len());
        let ids_match = checkpoint.accumulated_results.len() == covered
            && checkpoint
                .accumulated_results
                .iter()
                .zip(&units[..covered])
                .all(|(result, unit)| result.id == unit.id);
        if !ids_match {
            warn!(
                "Ignoring checkpoint for job {}: results do not cover the first {} units",
                job_id, covered
            );
            return (Vec::new(), 0);
        }

        (checkpoint.accumulated_results, checkpoint.completed_windows)
    }

    /// Persist progress; failures are reported but never abort the job
    fn save_checkpoint(
        &self,
        job_id: &JobIdentity,
        digest: &str,
        completed_windows: usize,
        total_windows: usize,
        results: &[TranslatedUnit],
    ) {
        let Some(manager) = &self.checkpoints else {
            return;
        };
        let config = self.scheduler.config();

        let checkpoint = Checkpoint::new(
            job_id,
            completed_windows,
            total_windows,
            results.to_vec(),
            &config.language_pair,
            config.window_size,
        )
        .with_content_digest(digest);

        match manager.save(job_id, &checkpoint) {
            Ok(()) => self.scheduler.emit(PipelineEvent::CheckpointSaved {
                completed_windows,
                total_windows,
            }),
            Err(e) => {
                warn!("Failed to save checkpoint for job {}: {:#}", job_id, e);
                self.scheduler.emit(PipelineEvent::CheckpointFailed {
                    error: format!("{:#}", e),
                });
            }
        }
    }
}

fn validate_unique_ids(units: &[TranslationUnit]) -> Result<(), TranslationError> {
    let mut seen = HashSet::with_capacity(units.len());
    for unit in units {
        if !seen.insert(unit.id) {
            return Err(TranslationError::InvalidJob(format!("duplicate unit id {}", unit.id)));
        }
    }
    Ok(())
}
