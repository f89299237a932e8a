/*!
 * Tests for configuration files
 */

use std::time::Duration;

use subbatch::app_config::{Config, LogLevel, TranslationProvider};

use crate::common::create_test_file;

#[test]
fn test_load_fullFile_shouldMapEverySection() {
    let dir = tempfile::tempdir().unwrap();
    let path = create_test_file(
        dir.path(),
        "conf.json",
        r#"{
            "source_language": "eng",
            "target_language": "spa",
            "translation": {
                "provider": "anthropic",
                "available_providers": [
                    { "type": "anthropic", "model": "claude-3-5-haiku-latest", "api_key": "sk-test", "timeout_secs": 45 }
                ]
            },
            "batch": {
                "window_size": 12,
                "context_size": 5,
                "fuzzy_threshold": 0.9,
                "max_split_depth": 4,
                "quality_gate": false,
                "abort_on_auth_failure": true,
                "prompt_template": "Translate {source_language} to {target_language}. {glossary}",
                "glossary": { "Winterfell": "Invernalia" }
            },
            "storage": { "cache_path": "cache/subbatch.db" },
            "log_level": "debug"
        }"#,
    );

    let config = Config::load(&path).unwrap();
    config.validate().unwrap();

    assert_eq!(config.translation.provider, TranslationProvider::Anthropic);
    assert_eq!(config.translation.get_model(), "claude-3-5-haiku-latest");
    assert_eq!(config.translation.get_endpoint(), "https://api.anthropic.com");
    assert_eq!(config.log_level, LogLevel::Debug);

    let pipeline = config.pipeline_config().unwrap();
    assert_eq!(pipeline.language_pair.key(), "en:es");
    assert_eq!(pipeline.window_size, 12);
    assert_eq!(pipeline.context_size, 5);
    assert_eq!(pipeline.max_split_depth, 4);
    assert_eq!(pipeline.request_timeout, Duration::from_secs(45));
    assert!(!pipeline.quality_gate);
    assert!(pipeline.abort_on_auth_failure);
    assert!(pipeline.prompt_template.as_str().contains("{glossary}"));
}

#[test]
fn test_load_malformedFile_shouldFailWithPath() {
    let dir = tempfile::tempdir().unwrap();
    let path = create_test_file(dir.path(), "conf.json", "{ \"source_language\": ");

    let err = Config::load(&path).unwrap_err();
    assert!(format!("{:#}", err).contains("conf.json"));
}

#[test]
fn test_validate_emptyPromptTemplate_shouldFail() {
    let mut config = Config::default();
    config.batch.prompt_template = "   ".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_save_thenLoad_shouldKeepGlossary() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("conf.json");
    let mut config = Config::default();
    config.batch.glossary.insert("Hogwarts".to_string(), "Poudlard".to_string());

    config.save(&path).unwrap();
    let loaded = Config::load(&path).unwrap();

    assert_eq!(loaded.batch.glossary.get("Hogwarts").map(String::as_str), Some("Poudlard"));
}

#[tokio::test]
async fn test_createProvider_shouldHonourSelection() {
    let mut config = Config::default();
    config.translation.provider = TranslationProvider::Mock;
    assert_eq!(config.translation.create_provider().unwrap().name(), "mock");

    config.translation.provider = TranslationProvider::Ollama;
    assert_eq!(config.translation.create_provider().unwrap().name(), "ollama");
}
