/*!
 * Full app lifecycle: config file, controller, written output, cache upkeep
 */

use std::path::Path;
use tokio_util::sync::CancellationToken;

use subbatch::app_config::Config;
use subbatch::app_controller::{Controller, read_units};
use subbatch::errors::TranslationError;
use subbatch::translation::TranslatedUnit;

use crate::common::create_test_file;

const EPISODE: &str = r#"[
    {"id": 10, "text": "Winter is coming."},
    {"id": 20, "text": "The night is dark and full of terrors."},
    {"id": 30, "text": ""},
    {"id": 40, "text": "A Lannister always pays his debts."},
    {"id": 50, "text": "Hold the door!"}
]"#;

fn write_config(dir: &Path) -> std::path::PathBuf {
    let config = format!(
        r#"{{
            "source_language": "en",
            "target_language": "de",
            "translation": {{ "provider": "mock" }},
            "batch": {{ "window_size": 2, "context_size": 1 }},
            "storage": {{
                "cache_path": {:?},
                "checkpoint_dir": {:?}
            }}
        }}"#,
        dir.join("cache.db"),
        dir.join("checkpoints")
    );
    create_test_file(dir, "conf.json", &config)
}

#[tokio::test]
async fn test_controller_translateFile_shouldWriteOrderedOutput() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load(write_config(dir.path())).unwrap();
    let input = create_test_file(dir.path(), "episode.json", EPISODE);
    let controller = Controller::with_config(config).unwrap();

    let output = controller
        .run(&input, None, None, &CancellationToken::new())
        .await
        .unwrap();

    let written: Vec<TranslatedUnit> =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("episode.de.json")).unwrap()).unwrap();
    assert_eq!(written.iter().map(|u| u.id).collect::<Vec<_>>(), vec![10, 20, 30, 40, 50]);
    assert_eq!(written[0].translated_text, "[TRANSLATED] Winter is coming.");
    assert_eq!(written[2].translated_text, "");
    assert_eq!(output.stats.windows_total, 3);

    // Second pass is served by the cache
    let again = controller
        .run(&input, Some(dir.path().join("again.json")), None, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(again.stats.backend_calls, 0);
    assert_eq!(again.stats.exact_hits, 4);
    assert_eq!(again.results, output.results);

    let stats = controller.cache_stats().await.unwrap();
    assert_eq!(stats.total_entries, 4);

    assert_eq!(controller.purge_cache(Some(30)).await.unwrap(), 0);
    assert_eq!(controller.purge_cache(None).await.unwrap(), 4);
}

#[tokio::test]
async fn test_controller_cancelledRun_shouldLeaveCheckpointAndResume() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load(write_config(dir.path())).unwrap();
    let input = create_test_file(dir.path(), "episode.json", EPISODE);
    let output_path = dir.path().join("out.json");
    let controller = Controller::with_config(config.clone()).unwrap();

    let cancelled = CancellationToken::new();
    cancelled.cancel();
    let err = controller
        .run(&input, Some(output_path.clone()), Some("s01e01".to_string()), &cancelled)
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<TranslationError>(),
        Some(TranslationError::Cancelled { completed_windows: 0, total_windows: 3 })
    ));
    assert!(!output_path.exists());
    assert!(dir.path().join("checkpoints").join("s01e01.json").exists());

    controller
        .run(&input, Some(output_path.clone()), Some("s01e01".to_string()), &CancellationToken::new())
        .await
        .unwrap();
    assert!(!dir.path().join("checkpoints").join("s01e01.json").exists());

    let units = read_units(&input).unwrap();
    let written: Vec<TranslatedUnit> = serde_json::from_str(&std::fs::read_to_string(&output_path).unwrap()).unwrap();
    assert_eq!(written.len(), units.len());
}

#[test]
fn test_controller_invalidConfig_shouldBeRejected() {
    let mut config = Config::default();
    config.source_language = "not-a-language".to_string();
    assert!(Controller::with_config(config).is_err());
}
