/*!
 * Batch scheduling with self-healing split-retry.
 *
 * For each window the scheduler:
 * 1. Resolves units from the cache (exact, then fuzzy)
 * 2. Sends the remaining units to the backend in one request
 * 3. Validates that the answer covers exactly the requested ids
 * 4. On any failure, halves the batch and recurses, up to `max_split_depth`
 * 5. Writes fresh translations back to the cache in one transaction
 *
 * A window that fails the quality gate is redone once with cache lookups
 * disabled for the whole re-run, split halves included. The re-run's output
 * overwrites the flagged cache rows.
 *
 * Halves run sequentially. The second half sees the tail of the first half's
 * output as its passive context, so context always comes from the immediate
 * predecessor.
 */

use log::{debug, error, info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::errors::{FailureKind, ProviderError, TranslationError};
use crate::providers::{BatchItem, Provider};

use super::cache::TranslationCache;
use super::context::tail_of;
use super::events::{EventCallback, PipelineEvent};
use super::pipeline::PipelineConfig;
use super::prompts::SystemPromptBuilder;
use super::quality::{LintChecker, QualityGate, Severity};
use super::window::{TranslatedUnit, TranslationUnit, Window};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Counters accumulated over a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    /// Top-level windows in the job
    pub windows_total: usize,
    /// Windows skipped because a checkpoint already covered them
    pub windows_resumed: usize,
    /// Units served by exact cache hits
    pub exact_hits: usize,
    /// Units served by fuzzy cache hits
    pub fuzzy_hits: usize,
    /// Backend attempts, successful or not
    pub backend_calls: usize,
    /// Times a failed batch was halved
    pub splits: usize,
    /// Windows redone after failing the quality gate
    pub quality_reruns: usize,
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "windows: {} ({} resumed), cache hits: {} exact / {} fuzzy, backend calls: {}, splits: {}, quality re-runs: {}",
            self.windows_total,
            self.windows_resumed,
            self.exact_hits,
            self.fuzzy_hits,
            self.backend_calls,
            self.splits,
            self.quality_reruns
        )
    }
}

/// Whether cache lookups may resolve units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lookup {
    Cache,
    Bypass,
}

/// A translated unit and where its translation came from
#[derive(Debug, Clone)]
struct Resolution {
    unit: TranslatedUnit,
    from_backend: bool,
}

/// Translates windows through a backend, the cache and the split-retry protocol
pub struct BatchScheduler {
    provider: Arc<dyn Provider>,
    cache: TranslationCache,
    config: PipelineConfig,
    prompts: SystemPromptBuilder,
    quality_gate: Option<Arc<dyn QualityGate>>,
    observer: Option<EventCallback>,
}

impl BatchScheduler {
    /// Create a scheduler; the lint gate is installed when `config.quality_gate` is set
    pub fn new(provider: Arc<dyn Provider>, cache: TranslationCache, config: PipelineConfig) -> Self {
        let prompts = SystemPromptBuilder::new(&config.prompt_template, &config.language_pair, &config.glossary);
        let quality_gate: Option<Arc<dyn QualityGate>> = if config.quality_gate {
            Some(Arc::new(LintChecker::new()))
        } else {
            None
        };

        Self {
            provider,
            cache,
            config,
            prompts,
            quality_gate,
            observer: None,
        }
    }

    /// Replace the quality gate
    pub fn with_quality_gate(mut self, gate: Arc<dyn QualityGate>) -> Self {
        self.quality_gate = Some(gate);
        self
    }

    /// Disable the quality gate
    pub fn without_quality_gate(mut self) -> Self {
        self.quality_gate = None;
        self
    }

    /// Deliver events to `observer`
    pub fn with_observer(mut self, observer: EventCallback) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Active configuration
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Cache shared with the scheduler
    pub fn cache(&self) -> &TranslationCache {
        &self.cache
    }

    pub(crate) fn emit(&self, event: PipelineEvent) {
        if let Some(observer) = &self.observer {
            observer(&event);
        }
    }

    /// Translate one top-level window, ids in input order
    pub async fn translate_window(
        &self,
        window: &Window,
        stats: &mut RunStats,
    ) -> Result<Vec<TranslatedUnit>, TranslationError> {
        info!(
            "Translating window {}/{} ({} units)",
            window.index + 1,
            window.total_windows,
            window.len()
        );
        self.emit(PipelineEvent::WindowStarted {
            index: window.index,
            total_windows: window.total_windows,
            units: window.len(),
        });

        let mut resolved = self
            .translate_units(window.units.clone(), window.context_lines.clone(), 0, Lookup::Cache, stats)
            .await?;

        if let Some(gate) = &self.quality_gate {
            if self.config.max_split_depth > 0 {
                self.apply_quality_gate(gate.as_ref(), window, &mut resolved, stats).await?;
            }
        }

        self.emit(PipelineEvent::WindowFinished {
            index: window.index,
            total_windows: window.total_windows,
        });

        Ok(resolved.into_iter().map(|r| r.unit).collect())
    }

    /// Re-run backend output once when the gate reports high-severity issues
    async fn apply_quality_gate(
        &self,
        gate: &dyn QualityGate,
        window: &Window,
        resolved: &mut [Resolution],
        stats: &mut RunStats,
    ) -> Result<(), TranslationError> {
        let translations: Vec<TranslatedUnit> = resolved.iter().map(|r| r.unit.clone()).collect();
        let report = gate.check(&window.units, &translations);
        if !report.has_high_severity() {
            return Ok(());
        }

        let redo: Vec<TranslationUnit> = window
            .units
            .iter()
            .zip(resolved.iter())
            .filter(|(_, r)| r.from_backend)
            .map(|(u, _)| u.clone())
            .collect();
        if redo.is_empty() {
            // Only cached output was flagged; nothing the backend can redo
            return Ok(());
        }

        let high_issues = report.count(Severity::High);
        warn!(
            "Window {} failed the quality gate ({} high severity issues), re-running {} units",
            window.index + 1,
            high_issues,
            redo.len()
        );
        for issue in report.issues.iter().filter(|i| i.severity == Severity::High) {
            debug!("Quality issue: {}", issue);
        }
        stats.quality_reruns += 1;
        self.emit(PipelineEvent::QualityRerun {
            index: window.index,
            high_issues,
        });

        let rerun = self
            .resolve_pending(redo, window.context_lines.clone(), 1, Lookup::Bypass, stats)
            .await?;
        let mut by_id: HashMap<u64, Resolution> = rerun.into_iter().map(|r| (r.unit.id, r)).collect();
        for slot in resolved.iter_mut() {
            if let Some(replacement) = by_id.remove(&slot.unit.id) {
                *slot = replacement;
            }
        }
        Ok(())
    }

    /// Resolve units from the cache, sending the rest to the backend
    fn translate_units<'a>(
        &'a self,
        units: Vec<TranslationUnit>,
        context: Vec<String>,
        depth: usize,
        lookup: Lookup,
        stats: &'a mut RunStats,
    ) -> BoxFuture<'a, Result<Vec<Resolution>, TranslationError>> {
        Box::pin(async move {
            let pair = &self.config.language_pair;
            let mut slots: Vec<Option<Resolution>> = vec![None; units.len()];
            let mut pending = Vec::new();
            let mut pending_positions = Vec::new();
            let (mut exact, mut fuzzy) = (0, 0);

            for (pos, unit) in units.iter().enumerate() {
                if unit.text.trim().is_empty() {
                    slots[pos] = Some(Resolution {
                        unit: TranslatedUnit::new(unit.id, unit.text.clone()),
                        from_backend: false,
                    });
                    continue;
                }

                if lookup == Lookup::Bypass {
                    pending.push(unit.clone());
                    pending_positions.push(pos);
                    continue;
                }

                let hit = self
                    .cache
                    .exact_lookup(&unit.text, pair)
                    .await
                    .map_err(TranslationError::cache)?;
                if let Some(translation) = hit {
                    exact += 1;
                    slots[pos] = Some(Resolution {
                        unit: TranslatedUnit::new(unit.id, translation),
                        from_backend: false,
                    });
                    continue;
                }

                let hit = self
                    .cache
                    .fuzzy_lookup(&unit.text, pair, self.config.fuzzy_threshold)
                    .await
                    .map_err(TranslationError::cache)?;
                if let Some(found) = hit {
                    fuzzy += 1;
                    slots[pos] = Some(Resolution {
                        unit: TranslatedUnit::new(unit.id, found.entry.translated_text),
                        from_backend: false,
                    });
                    continue;
                }

                pending.push(unit.clone());
                pending_positions.push(pos);
            }

            stats.exact_hits += exact;
            stats.fuzzy_hits += fuzzy;
            if exact + fuzzy > 0 {
                debug!(
                    "Cache resolved {} exact and {} fuzzy of {} units",
                    exact,
                    fuzzy,
                    units.len()
                );
            }
            self.emit(PipelineEvent::CacheResolved {
                exact,
                fuzzy,
                pending: pending.len(),
            });

            if !pending.is_empty() {
                let translated = self.resolve_pending(pending, context, depth, lookup, &mut *stats).await?;
                for (pos, resolution) in pending_positions.into_iter().zip(translated) {
                    slots[pos] = Some(resolution);
                }
            }

            let expected = units.len();
            let filled: Vec<Resolution> = slots.into_iter().flatten().collect();
            if filled.len() != expected {
                return Err(TranslationError::ResponseShape {
                    expected,
                    received: filled.len(),
                });
            }
            Ok(filled)
        })
    }

    /// Send units to the backend, splitting on failure
    fn resolve_pending<'a>(
        &'a self,
        pending: Vec<TranslationUnit>,
        context: Vec<String>,
        depth: usize,
        lookup: Lookup,
        stats: &'a mut RunStats,
    ) -> BoxFuture<'a, Result<Vec<Resolution>, TranslationError>> {
        Box::pin(async move {
            let failure = match self.call_backend(&pending, &context, depth, stats).await {
                Ok(translated) => {
                    let entries: Vec<(String, String)> = pending
                        .iter()
                        .zip(&translated)
                        .map(|(unit, t)| (unit.text.clone(), t.translated_text.clone()))
                        .collect();
                    self.cache
                        .save_batch(&self.config.language_pair, &entries)
                        .await
                        .map_err(TranslationError::cache)?;

                    return Ok(translated
                        .into_iter()
                        .map(|unit| Resolution { unit, from_backend: true })
                        .collect());
                }
                Err(failure) => failure,
            };

            if self.config.abort_on_auth_failure && is_auth_failure(&failure) {
                error!("Backend rejected the credentials, aborting: {}", failure);
                return Err(failure);
            }

            if pending.len() > 1 && depth < self.config.max_split_depth {
                warn!(
                    "Batch of {} units failed at depth {} ({}), splitting",
                    pending.len(),
                    depth,
                    failure
                );
                stats.splits += 1;
                self.emit(PipelineEvent::WindowSplit {
                    depth,
                    units: pending.len(),
                    reason: failure.to_string(),
                });

                let mut right = pending;
                let left: Vec<TranslationUnit> = right.drain(..right.len() / 2).collect();

                let mut resolved = self.translate_units(left, context, depth + 1, lookup, &mut *stats).await?;
                let left_output: Vec<TranslatedUnit> = resolved.iter().map(|r| r.unit.clone()).collect();
                let right_context = tail_of(&left_output, self.config.context_size);

                let right_resolved = self
                    .translate_units(right, right_context, depth + 1, lookup, &mut *stats)
                    .await?;
                resolved.extend(right_resolved);
                return Ok(resolved);
            }

            error!(
                "Batch of {} units still failing at depth {}: {}",
                pending.len(),
                depth,
                failure
            );
            Err(TranslationError::SplitDepthExceeded {
                depth,
                units: pending.len(),
                last_failure: failure.to_string(),
            })
        })
    }

    /// One backend attempt, bounded by the request timeout
    async fn call_backend(
        &self,
        pending: &[TranslationUnit],
        context: &[String],
        depth: usize,
        stats: &mut RunStats,
    ) -> Result<Vec<TranslatedUnit>, TranslationError> {
        let prompt = self.prompts.build(context);
        let items: Vec<BatchItem> = pending.iter().map(BatchItem::from).collect();

        stats.backend_calls += 1;
        debug!(
            "Sending {} units to {} (depth {}, {} context lines)",
            items.len(),
            self.provider.name(),
            depth,
            context.len()
        );
        debug!("System prompt:\n{}", prompt);

        let timeout = self.config.request_timeout;
        let response = match tokio::time::timeout(timeout, self.provider.send_batch(&items, &prompt)).await {
            Ok(result) => result?,
            Err(_) => return Err(ProviderError::Timeout(timeout).into()),
        };

        map_response(pending, response)
    }
}

fn is_auth_failure(error: &TranslationError) -> bool {
    matches!(error, TranslationError::Provider(e) if e.kind() == FailureKind::Auth)
}

/// Map a backend answer onto the requested units by id
///
/// The answer must hold exactly the requested ids, each once. Order is free.
fn map_response(
    pending: &[TranslationUnit],
    response: Vec<BatchItem>,
) -> Result<Vec<TranslatedUnit>, TranslationError> {
    let expected = pending.len();
    if response.len() != expected {
        return Err(TranslationError::ResponseShape {
            expected,
            received: response.len(),
        });
    }

    let mut by_id: HashMap<u64, String> = HashMap::with_capacity(expected);
    for item in response {
        if by_id.insert(item.id, item.text).is_some() {
            return Err(TranslationError::ResponseShape {
                expected,
                received: by_id.len(),
            });
        }
    }

    let matched = pending.iter().filter(|u| by_id.contains_key(&u.id)).count();
    if matched != expected {
        return Err(TranslationError::ResponseShape {
            expected,
            received: matched,
        });
    }

    Ok(pending
        .iter()
        .filter_map(|unit| by_id.remove(&unit.id).map(|text| TranslatedUnit::new(unit.id, text)))
        .collect())
}
