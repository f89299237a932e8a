/*!
 * # subbatch - resilient windowed subtitle translation
 *
 * A Rust library that translates long sequences of short text units
 * (subtitle lines) through unreliable LLM backends.
 *
 * ## Features
 *
 * - Fixed-size windows with trailing output carried over as passive context
 * - Persistent SQLite translation cache with exact and fuzzy lookup
 * - Self-healing split-retry: failing windows are halved up to a depth cap
 * - One-shot quality gate re-run for windows with serious lint issues
 * - Atomic JSON checkpoints, resumable after interruption or cancellation
 * - Backends: Ollama (local LLM), Anthropic API, and an in-process mock
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `app_controller`: wiring used by the command line front-end
 * - `translation`: windowing, cache, scheduler and pipeline:
 *   - `translation::cache`: exact and fuzzy translation cache
 *   - `translation::batch`: split-retry batch scheduler
 *   - `translation::pipeline`: job façade with checkpointing
 * - `session`: checkpoint persistence
 * - `database`: SQLite connection handling and schema
 * - `language_utils`: ISO language code utilities
 * - `providers`: backend clients
 * - `errors`: Custom error types for the application
 *
 * ## License
 *
 * This project is licensed under the MIT License
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod app_controller;
pub mod database;
pub mod errors;
pub mod language_utils;
pub mod providers;
pub mod session;
pub mod translation;

// Re-export main types for easier usage
pub use app_config::Config;
pub use errors::{AppError, FailureKind, ProviderError, TranslationError};
pub use language_utils::LanguagePair;
pub use providers::{BatchItem, Provider};
pub use session::{Checkpoint, CheckpointManager, JobIdentity};
pub use translation::{
    PipelineConfig, PipelineEvent, PipelineOutput, TranslatedUnit, TranslationCache, TranslationJob,
    TranslationPipeline, TranslationUnit,
};
