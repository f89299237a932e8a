/*!
 * Tests for the persistent translation cache
 */

use subbatch::language_utils::LanguagePair;
use subbatch::translation::TranslationCache;
use subbatch::translation::similarity::similarity;

use crate::common::{en_fr, with_substitutions};

fn hundred_chars() -> String {
    "abcdefghij".repeat(10)
}

#[tokio::test]
async fn test_fuzzyLookup_atThresholdBoundary_shouldMatchOnlyAbove() {
    let cache = TranslationCache::new_in_memory().unwrap();
    let pair = en_fr();
    let stored = hundred_chars();
    cache.save(&stored, "TRADUIT", &pair).await.unwrap();

    let far = with_substitutions(&stored, 11);
    let near = with_substitutions(&stored, 9);
    assert!((similarity(&stored, &far) - 0.89).abs() < 1e-9);
    assert!((similarity(&stored, &near) - 0.91).abs() < 1e-9);

    assert!(cache.fuzzy_lookup(&far, &pair, 0.90).await.unwrap().is_none());

    let hit = cache.fuzzy_lookup(&near, &pair, 0.90).await.unwrap().unwrap();
    assert_eq!(hit.entry.translated_text, "TRADUIT");
    assert!(!hit.is_exact());
}

#[tokio::test]
async fn test_fuzzyLookup_acrossPairs_shouldNeverMatch() {
    let cache = TranslationCache::new_in_memory().unwrap();
    let en_de = LanguagePair::new("en", "de").unwrap();
    cache.save("Good morning", "Guten Morgen", &en_de).await.unwrap();

    assert!(cache.exact_lookup("Good morning", &en_fr()).await.unwrap().is_none());
    assert!(cache.fuzzy_lookup("Good morning!", &en_fr(), 0.5).await.unwrap().is_none());
    assert_eq!(
        cache.exact_lookup("Good morning", &en_de).await.unwrap().as_deref(),
        Some("Guten Morgen")
    );
}

#[tokio::test]
async fn test_stats_afterRereadingTenEntries_shouldReportHits() {
    let cache = TranslationCache::new_in_memory().unwrap();
    let pair = en_fr();
    for i in 0..10 {
        cache
            .save(&format!("Sentence {}", i), &format!("Phrase {}", i), &pair)
            .await
            .unwrap();
    }
    for i in 0..10 {
        assert!(cache.exact_lookup(&format!("Sentence {}", i), &pair).await.unwrap().is_some());
    }
    cache.wait_for_usage_updates().await;

    let stats = cache.stats().await.unwrap();
    assert_eq!(stats.total_entries, 10);
    assert!((stats.average_use_count - 2.0).abs() < 1e-9);
    assert!(stats.hit_rate > 0.0);
    assert!(stats.estimated_cost_saved > 0.0);
}

#[tokio::test]
async fn test_exactLookup_repeated_shouldIncrementUseCount() {
    let cache = TranslationCache::new_in_memory().unwrap();
    let pair = en_fr();
    cache.save("Hello", "Bonjour", &pair).await.unwrap();

    for _ in 0..3 {
        cache.exact_lookup("Hello", &pair).await.unwrap();
    }
    cache.wait_for_usage_updates().await;

    let entry = cache.get_entry("Hello", &pair).await.unwrap().unwrap();
    assert_eq!(entry.use_count, 4);
    assert!(entry.last_used >= entry.created_at);
}

#[tokio::test]
async fn test_open_fileBacked_shouldPersistAcrossHandles() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("cache.db");
    let pair = en_fr();

    {
        let cache = TranslationCache::open(&path).unwrap();
        cache.save("See you tomorrow", "À demain", &pair).await.unwrap();
    }

    let reopened = TranslationCache::open(&path).unwrap();
    assert_eq!(
        reopened.exact_lookup("See you tomorrow", &pair).await.unwrap().as_deref(),
        Some("À demain")
    );
    reopened.wait_for_usage_updates().await;

    let stats = reopened.stats().await.unwrap();
    assert_eq!(stats.total_entries, 1);
    assert!(stats.file_size_bytes > 0);
}

#[tokio::test]
async fn test_fuzzyLookup_candidateLimit_shouldStillFindRecentEntry() {
    let cache = TranslationCache::new_in_memory().unwrap().with_candidate_limit(1);
    let pair = en_fr();
    cache.save("Where is the station?", "Où est la gare ?", &pair).await.unwrap();

    let hit = cache.fuzzy_lookup("Where is the station", &pair, 0.9).await.unwrap().unwrap();
    assert_eq!(hit.entry.translated_text, "Où est la gare ?");
    assert!(hit.similarity >= 0.9);
}

#[tokio::test]
async fn test_twoHandlesOnOneFile_concurrentWritesAndLookups_shouldAllSucceed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.db");
    let handles = [TranslationCache::open(&path).unwrap(), TranslationCache::open(&path).unwrap()];
    let pair = en_fr();

    let mut tasks = Vec::new();
    for worker in 0..4usize {
        let cache = handles[worker % 2].clone();
        let pair = pair.clone();
        tasks.push(tokio::spawn(async move {
            for round in 0..5 {
                let text = format!("Worker {} says line {} of the shared episode", worker, round);
                let entries = vec![(text.clone(), format!("Traduction {}-{}", worker, round))];
                cache.save_batch(&pair, &entries).await?;
                cache.fuzzy_lookup(&text, &pair, 0.9).await?;
            }
            Ok::<(), anyhow::Error>(())
        }));
    }

    for task in tasks {
        task.await.unwrap().unwrap();
    }
    for cache in &handles {
        cache.wait_for_usage_updates().await;
    }

    assert_eq!(handles[0].len().await.unwrap(), 20);
    assert_eq!(handles[1].len().await.unwrap(), 20);
    let seen_by_other = handles[1]
        .exact_lookup("Worker 0 says line 4 of the shared episode", &pair)
        .await
        .unwrap();
    assert_eq!(seen_by_other.as_deref(), Some("Traduction 0-4"));
}
