/*!
 * End-to-end pipeline runs: resume, cancellation, checkpoint failures and
 * cache reuse
 */

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use subbatch::errors::TranslationError;
use subbatch::providers::mock::MockProvider;
use subbatch::session::{CheckpointManager, JobIdentity};
use subbatch::translation::{PipelineEvent, TranslationCache, TranslationJob, TranslationPipeline};

use crate::common::{event_recorder, init_logging, pipeline_config, pipeline_with, sample_units};

#[tokio::test]
async fn test_execute_afterInterruptedRun_shouldResumeAndMatchUninterruptedOutput() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let units = sample_units(10);
    let job = TranslationJob::new(units.clone()).with_job_id("episode-01");

    // Three windows succeed, then the backend goes away
    let flaky = MockProvider::failing_after(3);
    let interrupted = pipeline_with(&flaky, pipeline_config(2)).with_checkpoints(CheckpointManager::new(dir.path()));
    let result = interrupted.execute(job.clone(), &CancellationToken::new()).await;
    assert!(matches!(result, Err(TranslationError::SplitDepthExceeded { .. })));

    let manager = CheckpointManager::new(dir.path());
    let saved = manager
        .load(&JobIdentity::parse("episode-01").unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(saved.completed_windows, 3);
    assert_eq!(saved.total_windows, 5);
    assert_eq!(saved.accumulated_results.len(), 6);

    let working = MockProvider::working();
    let (observer, events) = event_recorder();
    let resumed = pipeline_with(&working, pipeline_config(2))
        .with_checkpoints(CheckpointManager::new(dir.path()))
        .with_observer(observer);
    let output = resumed.execute(job, &CancellationToken::new()).await.unwrap();

    assert_eq!(working.call_count(), 2);
    assert_eq!(output.stats.windows_resumed, 3);
    assert!(events.lock().contains(&PipelineEvent::JobStarted {
        job_id: "episode-01".to_string(),
        total_windows: 5,
        resumed_windows: 3,
    }));
    assert!(!manager.path_for(&JobIdentity::parse("episode-01").unwrap()).exists());

    let reference = pipeline_with(&MockProvider::working(), pipeline_config(2))
        .execute(TranslationJob::new(units), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(output.results, reference.results);
}

#[tokio::test]
async fn test_execute_cancelledAfterSecondWindow_shouldCheckpointTwoWindows() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let units = sample_units(10);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let observer = Arc::new(move |event: &PipelineEvent| {
        if let PipelineEvent::WindowFinished { index: 1, .. } = event {
            trigger.cancel();
        }
    });

    let provider = MockProvider::working();
    let pipeline = pipeline_with(&provider, pipeline_config(2))
        .with_checkpoints(CheckpointManager::new(dir.path()))
        .with_observer(observer);
    let result = pipeline.execute(TranslationJob::new(units.clone()), &cancel).await;

    match result {
        Err(TranslationError::Cancelled { completed_windows, total_windows }) => {
            assert_eq!(completed_windows, 2);
            assert_eq!(total_windows, 5);
        }
        other => panic!("expected Cancelled, got {:?}", other),
    }
    assert_eq!(provider.call_count(), 2);

    let job_id = JobIdentity::derive(&pipeline.config().language_pair, 2, &units);
    let saved = CheckpointManager::new(dir.path()).load(&job_id).unwrap().unwrap();
    assert_eq!(saved.completed_windows, 2);

    let rerun_provider = MockProvider::working();
    let rerun = pipeline_with(&rerun_provider, pipeline_config(2)).with_checkpoints(CheckpointManager::new(dir.path()));
    let output = rerun
        .execute(TranslationJob::new(units.clone()), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(rerun_provider.call_count(), 3);
    assert_eq!(output.results.len(), units.len());
}

#[tokio::test]
async fn test_execute_withUnwritableCheckpointDir_shouldStillSucceed() {
    init_logging();
    let not_a_dir = tempfile::NamedTempFile::new().unwrap();
    let (observer, events) = event_recorder();
    let pipeline = pipeline_with(&MockProvider::working(), pipeline_config(3))
        .with_checkpoints(CheckpointManager::new(not_a_dir.path()))
        .with_observer(observer);

    let output = pipeline
        .execute(TranslationJob::new(sample_units(7)), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(output.results.len(), 7);
    let failures = events
        .lock()
        .iter()
        .filter(|e| matches!(e, PipelineEvent::CheckpointFailed { .. }))
        .count();
    assert_eq!(failures, 4);
}

#[tokio::test]
async fn test_execute_mismatchedCheckpoint_shouldBeIgnored() {
    let dir = tempfile::tempdir().unwrap();
    let units = sample_units(6);
    let job = TranslationJob::new(units.clone()).with_job_id("shared-id");

    // Leave a checkpoint behind for a differently windowed run
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let first = pipeline_with(&MockProvider::working(), pipeline_config(3))
        .with_checkpoints(CheckpointManager::new(dir.path()))
        .with_observer(Arc::new(move |event: &PipelineEvent| {
            if matches!(event, PipelineEvent::WindowFinished { index: 0, .. }) {
                trigger.cancel();
            }
        }));
    assert!(first.execute(job.clone(), &cancel).await.is_err());

    let provider = MockProvider::working();
    let second = pipeline_with(&provider, pipeline_config(2)).with_checkpoints(CheckpointManager::new(dir.path()));
    let output = second.execute(job, &CancellationToken::new()).await.unwrap();

    assert_eq!(output.stats.windows_resumed, 0);
    assert_eq!(provider.call_count(), 3);
}

#[tokio::test]
async fn test_execute_twiceOnSharedCache_shouldNotCallBackendAgain() {
    let dir = tempfile::tempdir().unwrap();
    let cache = TranslationCache::open(dir.path().join("cache.db")).unwrap();
    let units = sample_units(8);

    let first_provider = MockProvider::working();
    let first = TranslationPipeline::new(Arc::new(first_provider.clone()), cache.clone(), pipeline_config(4));
    let first_output = first
        .execute(TranslationJob::new(units.clone()), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(first_provider.call_count(), 2);

    let second_provider = MockProvider::working();
    let second = TranslationPipeline::new(Arc::new(second_provider.clone()), cache.clone(), pipeline_config(4));
    let second_output = second
        .execute(TranslationJob::new(units.clone()), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(second_provider.call_count(), 0);
    assert_eq!(second_output.results, first_output.results);
    assert_eq!(second_output.stats.exact_hits, 8);
    assert_eq!(second_output.stats.backend_calls, 0);

    cache.wait_for_usage_updates().await;
    let entry = cache
        .get_entry(&units[0].text, &pipeline_config(4).language_pair)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.use_count, 2);
}

#[tokio::test]
async fn test_execute_emptyJob_shouldReturnNothingWithoutCalls() {
    let provider = MockProvider::working();
    let output = pipeline_with(&provider, pipeline_config(4))
        .execute(TranslationJob::new(Vec::new()), &CancellationToken::new())
        .await
        .unwrap();

    assert!(output.results.is_empty());
    assert_eq!(output.stats.windows_total, 0);
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn test_execute_duplicateIds_shouldBeRejected() {
    let mut units = sample_units(3);
    units[2].id = 1;

    let result = pipeline_with(&MockProvider::working(), pipeline_config(4))
        .execute(TranslationJob::new(units), &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(TranslationError::InvalidJob(_))));
}

#[tokio::test]
async fn test_execute_editedTextUnderSameJobId_shouldStartOver() {
    let dir = tempfile::tempdir().unwrap();
    let mut units = sample_units(6);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let first = pipeline_with(&MockProvider::working(), pipeline_config(2))
        .with_checkpoints(CheckpointManager::new(dir.path()))
        .with_observer(Arc::new(move |event: &PipelineEvent| {
            if matches!(event, PipelineEvent::WindowFinished { index: 0, .. }) {
                trigger.cancel();
            }
        }));
    let job = TranslationJob::new(units.clone()).with_job_id("episode-02");
    assert!(first.execute(job, &cancel).await.is_err());

    units[0].text = "A completely rewritten first line".to_string();
    let provider = MockProvider::working();
    let second = pipeline_with(&provider, pipeline_config(2)).with_checkpoints(CheckpointManager::new(dir.path()));
    let output = second
        .execute(TranslationJob::new(units).with_job_id("episode-02"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(output.stats.windows_resumed, 0);
    assert_eq!(provider.call_count(), 3);
    assert_eq!(output.results[0].translated_text, "[TRANSLATED] A completely rewritten first line");
}

#[tokio::test]
async fn test_execute_cacheStoreLostMidRun_shouldAbortAndKeepCheckpoint() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let cache = TranslationCache::new_in_memory().unwrap();
    let provider = MockProvider::working();

    let store = cache.clone();
    let observer = Arc::new(move |event: &PipelineEvent| {
        if matches!(event, PipelineEvent::WindowFinished { index: 0, .. }) {
            store
                .database()
                .write(|conn| {
                    conn.execute_batch("DROP TABLE translation_cache")?;
                    Ok(())
                })
                .unwrap();
        }
    });
    let pipeline = TranslationPipeline::new(Arc::new(provider.clone()), cache, pipeline_config(2))
        .with_checkpoints(CheckpointManager::new(dir.path()))
        .with_observer(observer);

    let result = pipeline
        .execute(TranslationJob::new(sample_units(6)).with_job_id("broken-store"), &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(TranslationError::Cache(_))));
    assert_eq!(provider.call_count(), 1);
    let saved = CheckpointManager::new(dir.path())
        .load(&JobIdentity::parse("broken-store").unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(saved.completed_windows, 1);
    assert_eq!(saved.accumulated_results.len(), 2);
}
