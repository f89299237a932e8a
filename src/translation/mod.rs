/*!
 * Windowed batch translation.
 *
 * This module contains the core of the translator. It is split into several
 * submodules:
 *
 * - `similarity`: normalized edit-distance similarity
 * - `cache`: persistent exact and fuzzy translation cache
 * - `window`: units and fixed-size windows
 * - `context`: trailing output carried between windows
 * - `prompts`: system prompt templates and passive context
 * - `quality`: post-translation lint gate
 * - `events`: progress events for observers
 * - `batch`: split-retry batch scheduler
 * - `pipeline`: job façade with checkpointing and cancellation
 */

// Submodules
pub mod batch;
pub mod cache;
pub mod context;
pub mod events;
pub mod pipeline;
pub mod prompts;
pub mod quality;
pub mod similarity;
pub mod window;

// Re-export main types for easier usage
pub use self::batch::{BatchScheduler, RunStats};
pub use self::cache::{CacheEntry, CacheStats, FuzzyMatch, TranslationCache};
pub use self::context::ContextPropagator;
pub use self::events::{EventCallback, PipelineEvent};
pub use self::pipeline::{PipelineConfig, PipelineOutput, TranslationJob, TranslationPipeline};
pub use self::prompts::PromptTemplate;
pub use self::quality::{LintChecker, QualityGate, QualityReport, Severity};
pub use self::window::{TranslatedUnit, TranslationUnit, Window};
