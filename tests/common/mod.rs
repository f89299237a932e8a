/*!
 * Common test utilities for the subbatch test suite
 */

use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use subbatch::language_utils::LanguagePair;
use subbatch::providers::mock::MockProvider;
use subbatch::translation::events::{EventCallback, PipelineEvent};
use subbatch::translation::pipeline::{PipelineConfig, TranslationPipeline};
use subbatch::translation::{TranslationCache, TranslationUnit};

/// Route library logs to the test harness; set RUST_LOG to see them
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// English to French, the pair most tests run under
pub fn en_fr() -> LanguagePair {
    LanguagePair::new("en", "fr").unwrap()
}

/// `count` units with ids 1..=count and sentence-sized texts
pub fn sample_units(count: u64) -> Vec<TranslationUnit> {
    (1..=count)
        .map(|i| TranslationUnit::new(i, format!("This is subtitle line number {}", i)))
        .collect()
}

/// Pipeline config with a small window
///
/// Sample lines differ only in their number, so fuzzy reuse is limited to
/// identical text.
pub fn pipeline_config(window_size: usize) -> PipelineConfig {
    let mut config = PipelineConfig::new(en_fr());
    config.window_size = window_size;
    config.fuzzy_threshold = 1.0;
    config
}

/// Pipeline over `provider` with a fresh in-memory cache
pub fn pipeline_with(provider: &MockProvider, config: PipelineConfig) -> TranslationPipeline {
    TranslationPipeline::new(
        Arc::new(provider.clone()),
        TranslationCache::new_in_memory().unwrap(),
        config,
    )
}

/// Observer that records every event it sees
pub fn event_recorder() -> (EventCallback, Arc<Mutex<Vec<PipelineEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let callback: EventCallback = Arc::new(move |event: &PipelineEvent| sink.lock().push(event.clone()));
    (callback, events)
}

/// Creates a test file with the given content in the specified directory
pub fn create_test_file(dir: &Path, filename: &str, content: &str) -> PathBuf {
    let file_path = dir.join(filename);
    std::fs::write(&file_path, content).unwrap();
    file_path
}

/// Same text with the first `edits` ASCII letters replaced
pub fn with_substitutions(text: &str, edits: usize) -> String {
    text.chars()
        .enumerate()
        .map(|(i, c)| if i < edits { if c == 'x' { 'y' } else { 'x' } } else { c })
        .collect()
}
