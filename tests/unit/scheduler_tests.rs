/*!
 * Split-retry behaviour seen through whole pipeline runs
 */

use tokio_util::sync::CancellationToken;

use subbatch::errors::TranslationError;
use subbatch::providers::mock::MockProvider;
use subbatch::translation::{PipelineEvent, TranslationJob};

use crate::common::{event_recorder, pipeline_config, pipeline_with, sample_units};

fn ids<T>(items: &[T], id: impl Fn(&T) -> u64) -> Vec<u64> {
    items.iter().map(id).collect()
}

#[tokio::test]
async fn test_execute_withOversizedWindows_shouldSplitAndPreserveOrder() {
    let provider = MockProvider::fail_above(4);
    let units = sample_units(40);
    let pipeline = pipeline_with(&provider, pipeline_config(16));

    let output = pipeline
        .execute(TranslationJob::new(units.clone()), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(ids(&output.results, |u| u.id), ids(&units, |u| u.id));
    assert!(output.stats.splits > 0);
    assert!(provider.request_sizes().iter().filter(|&&n| n <= 4).count() >= 10);
    for (result, unit) in output.results.iter().zip(&units) {
        assert_eq!(result.translated_text, MockProvider::translate_text(&unit.text));
    }
}

#[tokio::test]
async fn test_execute_withReorderingBackend_shouldKeepInputOrder() {
    let provider = MockProvider::reversed();
    let units = sample_units(7);
    let pipeline = pipeline_with(&provider, pipeline_config(3));

    let output = pipeline
        .execute(TranslationJob::new(units.clone()), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(ids(&output.results, |u| u.id), vec![1, 2, 3, 4, 5, 6, 7]);
    assert_eq!(output.stats.splits, 0);
    assert_eq!(provider.call_count(), 3);
}

#[tokio::test]
async fn test_execute_withDeadBackend_shouldAbortAfterDepthCap() {
    let provider = MockProvider::failing();
    let mut config = pipeline_config(8);
    config.max_split_depth = 2;
    let pipeline = pipeline_with(&provider, config);

    let result = pipeline
        .execute(TranslationJob::new(sample_units(8)), &CancellationToken::new())
        .await;

    match result {
        Err(TranslationError::SplitDepthExceeded { depth, units, .. }) => {
            assert_eq!(depth, 2);
            assert_eq!(units, 2);
        }
        other => panic!("expected SplitDepthExceeded, got {:?}", other),
    }
    assert_eq!(provider.request_sizes(), vec![8, 4, 2]);
}

#[tokio::test]
async fn test_execute_splits_shouldBeReportedAsEvents() {
    let provider = MockProvider::fail_above(2);
    let (observer, events) = event_recorder();
    let pipeline = pipeline_with(&provider, pipeline_config(4)).with_observer(observer);

    let output = pipeline
        .execute(TranslationJob::new(sample_units(4)), &CancellationToken::new())
        .await
        .unwrap();

    let splits: Vec<_> = events
        .lock()
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::WindowSplit { depth, units, .. } => Some((*depth, *units)),
            _ => None,
        })
        .collect();
    assert_eq!(splits, vec![(0, 4)]);
    assert_eq!(output.stats.splits, 1);
    assert_eq!(output.stats.backend_calls, 3);
}

#[tokio::test]
async fn test_execute_contextFromPreviousWindow_shouldReachPrompt() {
    let provider = MockProvider::working();
    let mut config = pipeline_config(2);
    config.context_size = 1;
    let pipeline = pipeline_with(&provider, config);

    pipeline
        .execute(TranslationJob::new(sample_units(4)), &CancellationToken::new())
        .await
        .unwrap();

    let prompts = provider.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(!prompts[0].contains("<<CONTEXT_ONLY>>"));
    assert!(prompts[1].contains("<<CONTEXT_ONLY>>"));
    assert!(prompts[1].contains(&MockProvider::translate_text("This is subtitle line number 2")));
    assert!(!prompts[1].contains(&MockProvider::translate_text("This is subtitle line number 1")));
}
