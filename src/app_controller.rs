/*!
 * Application controller used by the command line front-end.
 *
 * Wires configuration into a cache, a provider and a pipeline, reads job
 * files and writes their results.
 */

use anyhow::{Context, Result, anyhow};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::app_config::Config;
use crate::errors::TranslationError;
use crate::translation::cache::{CacheStats, TranslationCache};
use crate::translation::events::{EventCallback, PipelineEvent};
use crate::translation::pipeline::{PipelineOutput, TranslationJob, TranslationPipeline};
use crate::translation::window::{TranslatedUnit, TranslationUnit};

/// Outcome of a provider health check
#[derive(Debug, Clone)]
pub struct ProviderStatus {
    /// Whether the backend accepted the configured credentials
    pub key_valid: bool,
    /// Models the backend offers
    pub models: Vec<String>,
}

/// Main application controller for batch translation
pub struct Controller {
    // @field: App configuration
    config: Config,
}

impl Controller {
    /// Create a controller for a validated configuration
    pub fn with_config(config: Config) -> Result<Self> {
        config.validate().context("Configuration validation failed")?;
        Ok(Self { config })
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Open the configured cache
    pub fn open_cache(&self) -> Result<TranslationCache> {
        TranslationCache::open(self.config.storage.resolved_cache_path()?)
    }

    /// Translate the job stored in `input`, writing results to `output`
    /// (or next to the input when absent)
    pub async fn run(
        &self,
        input: &Path,
        output: Option<PathBuf>,
        job_id: Option<String>,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutput> {
        let units = read_units(input)?;
        let output = match output {
            Some(path) => path,
            None => default_output_path(input, &self.config.target_language),
        };

        let provider = self.config.translation.create_provider()?;
        let cache = self.open_cache()?;
        let checkpoints = self.config.storage.checkpoint_manager()?;

        info!(
            "subbatch: {} - {} ({} units from {:?})",
            self.config.translation.provider.display_name(),
            self.config.translation.get_model(),
            units.len(),
            input
        );

        let progress_bar = ProgressBar::new(0);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} windows ({percent}%) {msg} {eta}")
            .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%) {msg}"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        progress_bar.set_style(style.progress_chars("█▓▒░"));
        progress_bar.set_message("Translating");

        let pipeline = TranslationPipeline::new(provider, cache, self.config.pipeline_config()?)
            .with_checkpoints(checkpoints)
            .with_observer(progress_observer(progress_bar.clone()));

        let mut job = TranslationJob::new(units);
        if let Some(id) = job_id {
            job = job.with_job_id(id);
        }

        let result = pipeline.execute(job, cancel).await;
        progress_bar.finish_and_clear();

        let output_data = match result {
            Ok(output_data) => output_data,
            Err(TranslationError::Cancelled { completed_windows, total_windows }) => {
                warn!(
                    "Interrupted after {}/{} windows; run the same command again to resume",
                    completed_windows, total_windows
                );
                return Err(anyhow!(TranslationError::Cancelled { completed_windows, total_windows }));
            }
            Err(e) => return Err(anyhow::Error::new(e).context("Translation failed")),
        };

        write_results(&output, &output_data.results)?;
        info!("Success: {:?} ({})", output, output_data.stats);
        Ok(output_data)
    }

    /// Statistics of the configured cache
    pub async fn cache_stats(&self) -> Result<CacheStats> {
        self.open_cache()?.stats().await
    }

    /// Remove cache entries, optionally only those unused for `older_than_days`
    pub async fn purge_cache(&self, older_than_days: Option<u32>) -> Result<usize> {
        let cache = self.open_cache()?;
        match older_than_days {
            Some(days) => cache.purge_older_than(chrono::Duration::days(i64::from(days))).await,
            None => cache.purge().await,
        }
    }

    /// Ask the configured backend whether it is usable
    pub async fn check_provider(&self) -> Result<ProviderStatus> {
        let provider = self.config.translation.create_provider()?;
        let key_valid = provider
            .validate_key()
            .await
            .with_context(|| format!("Failed to reach {}", provider.name()))?;
        let models = if key_valid {
            provider.list_models().await.unwrap_or_else(|e| {
                warn!("Could not list models: {}", e);
                Vec::new()
            })
        } else {
            Vec::new()
        };
        Ok(ProviderStatus { key_valid, models })
    }
}

/// Drive a progress bar from pipeline events
fn progress_observer(progress_bar: ProgressBar) -> EventCallback {
    Arc::new(move |event: &PipelineEvent| match event {
        PipelineEvent::JobStarted { total_windows, resumed_windows, .. } => {
            progress_bar.set_length(*total_windows as u64);
            progress_bar.set_position(*resumed_windows as u64);
        }
        PipelineEvent::WindowFinished { .. } => {
            progress_bar.inc(1);
            progress_bar.set_message("Translating");
        }
        PipelineEvent::WindowSplit { .. } | PipelineEvent::QualityRerun { .. } => {
            progress_bar.set_message(event.to_string());
        }
        PipelineEvent::CheckpointFailed { .. } => {
            progress_bar.set_message("Checkpoint failed");
        }
        _ => {}
    })
}

/// Read a JSON array of `{id, text}` objects
pub fn read_units(path: &Path) -> Result<Vec<TranslationUnit>> {
    let file = File::open(path).with_context(|| format!("Failed to open input file: {:?}", path))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Input must be a JSON array of {{\"id\", \"text\"}} objects: {:?}", path))
}

/// Write a JSON array of `{id, translated_text}` objects
pub fn write_results(path: &Path, results: &[TranslatedUnit]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create output file: {:?}", path))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, results).context("Failed to serialize results")?;
    writer.flush().context("Failed to write results")?;
    Ok(())
}

/// `episode.json` becomes `episode.fr.json`
pub fn default_output_path(input: &Path, target_language: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{}.{}.json", stem, target_language))
}
