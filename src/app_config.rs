use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::default::Default;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::database::DatabaseConnection;
use crate::language_utils::LanguagePair;
use crate::providers::Provider;
use crate::providers::anthropic::Anthropic;
use crate::providers::mock::MockProvider;
use crate::providers::ollama::Ollama;
use crate::session::CheckpointManager;
use crate::translation::pipeline::{
    DEFAULT_FUZZY_THRESHOLD, DEFAULT_MAX_SPLIT_DEPTH, DEFAULT_WINDOW_SIZE, PipelineConfig,
};
use crate::translation::context::DEFAULT_CONTEXT_SIZE;
use crate::translation::prompts::PromptTemplate;

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Source language code (ISO)
    pub source_language: String,

    /// Target language code (ISO)
    pub target_language: String,

    /// Translation backend config
    pub translation: TranslationConfig,

    /// Windowing and recovery settings
    #[serde(default)]
    pub batch: BatchConfig,

    /// Cache and checkpoint locations
    #[serde(default)]
    pub storage: StorageConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Translation provider type
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TranslationProvider {
    // @provider: Ollama
    #[default]
    Ollama,
    // @provider: Anthropic
    Anthropic,
    // @provider: Offline stand-in that echoes a marked copy of the input
    Mock,
}

impl TranslationProvider {
    // @returns: Capitalized provider name
    pub fn display_name(&self) -> &str {
        match self {
            Self::Ollama => "Ollama",
            Self::Anthropic => "Anthropic",
            Self::Mock => "Mock",
        }
    }

    // @returns: Lowercase provider identifier
    pub fn to_lowercase_string(&self) -> String {
        match self {
            Self::Ollama => "ollama".to_string(),
            Self::Anthropic => "anthropic".to_string(),
            Self::Mock => "mock".to_string(),
        }
    }
}

impl std::fmt::Display for TranslationProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_lowercase_string())
    }
}

impl std::str::FromStr for TranslationProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "anthropic" => Ok(Self::Anthropic),
            "mock" => Ok(Self::Mock),
            _ => Err(anyhow!("Invalid provider type: {}", s)),
        }
    }
}

/// Provider configuration wrapper
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProviderConfig {
    // @field: Provider type identifier
    #[serde(rename = "type")]
    pub provider_type: String,

    // @field: Model name
    #[serde(default = "String::new")]
    pub model: String,

    // @field: API key
    #[serde(default = "String::new")]
    pub api_key: String,

    // @field: Service URL
    #[serde(default = "String::new")]
    pub endpoint: String,

    // @field: Timeout seconds for a single batch request
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ProviderConfig {
    // @param provider_type: Provider enum
    // @returns: Provider config with defaults
    pub fn new(provider_type: TranslationProvider) -> Self {
        match provider_type {
            TranslationProvider::Ollama => Self {
                provider_type: "ollama".to_string(),
                model: default_ollama_model(),
                api_key: String::new(),
                endpoint: default_ollama_endpoint(),
                timeout_secs: default_timeout_secs(),
            },
            TranslationProvider::Anthropic => Self {
                provider_type: "anthropic".to_string(),
                model: default_anthropic_model(),
                api_key: String::new(),
                endpoint: default_anthropic_endpoint(),
                timeout_secs: default_anthropic_timeout_secs(),
            },
            TranslationProvider::Mock => Self {
                provider_type: "mock".to_string(),
                model: String::new(),
                api_key: String::new(),
                endpoint: String::new(),
                timeout_secs: default_timeout_secs(),
            },
        }
    }
}

/// Translation service configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranslationConfig {
    /// Translation provider to use
    #[serde(default)]
    pub provider: TranslationProvider,

    /// Available translation providers
    #[serde(default)]
    pub available_providers: Vec<ProviderConfig>,

    /// Temperature parameter for text generation (0.0 to 1.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

/// Windowing, caching and recovery settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BatchConfig {
    /// Units per window
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Previous output lines shown to the model as passive context
    #[serde(default = "default_context_size")]
    pub context_size: usize,

    /// Minimum similarity (0, 1] for reusing a cached translation
    #[serde(default = "default_fuzzy_threshold")]
    pub fuzzy_threshold: f64,

    /// How many times a failing window may be halved
    #[serde(default = "default_max_split_depth")]
    pub max_split_depth: usize,

    /// Lint each window and re-run it once on serious issues
    #[serde(default = "default_true")]
    pub quality_gate: bool,

    /// Stop at the first authentication failure instead of splitting
    #[serde(default)]
    pub abort_on_auth_failure: bool,

    /// System prompt template
    /// Placeholders: {source_language}, {target_language}, {glossary}
    #[serde(default = "default_prompt_template")]
    pub prompt_template: String,

    /// Fixed term translations
    #[serde(default)]
    pub glossary: BTreeMap<String, String>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            context_size: default_context_size(),
            fuzzy_threshold: default_fuzzy_threshold(),
            max_split_depth: default_max_split_depth(),
            quality_gate: true,
            abort_on_auth_failure: false,
            prompt_template: default_prompt_template(),
            glossary: BTreeMap::new(),
        }
    }
}

/// Where the cache database and checkpoints live
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct StorageConfig {
    /// Cache database file; defaults to the user data directory
    #[serde(default)]
    pub cache_path: Option<PathBuf>,

    /// Checkpoint directory; defaults to the user data directory
    #[serde(default)]
    pub checkpoint_dir: Option<PathBuf>,
}

impl StorageConfig {
    /// Resolved cache database path
    pub fn resolved_cache_path(&self) -> Result<PathBuf> {
        match &self.cache_path {
            Some(path) if !path.as_os_str().is_empty() => Ok(path.clone()),
            _ => DatabaseConnection::default_database_path(),
        }
    }

    /// Checkpoint manager for the configured directory
    pub fn checkpoint_manager(&self) -> Result<CheckpointManager> {
        match &self.checkpoint_dir {
            Some(dir) if !dir.as_os_str().is_empty() => Ok(CheckpointManager::new(dir)),
            _ => CheckpointManager::new_default(),
        }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Matching `log` filter
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            Self::Error => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Trace => log::LevelFilter::Trace,
        }
    }
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_anthropic_timeout_secs() -> u64 {
    60
}

fn default_temperature() -> f32 {
    0.3
}

fn default_true() -> bool {
    true
}

fn default_window_size() -> usize {
    DEFAULT_WINDOW_SIZE
}

fn default_context_size() -> usize {
    DEFAULT_CONTEXT_SIZE
}

fn default_fuzzy_threshold() -> f64 {
    DEFAULT_FUZZY_THRESHOLD
}

fn default_max_split_depth() -> usize {
    DEFAULT_MAX_SPLIT_DEPTH
}

fn default_prompt_template() -> String {
    PromptTemplate::DEFAULT.to_string()
}

fn default_ollama_endpoint() -> String {
    crate::providers::ollama::DEFAULT_ENDPOINT.to_string()
}

fn default_anthropic_endpoint() -> String {
    crate::providers::anthropic::DEFAULT_ENDPOINT.to_string()
}

fn default_ollama_model() -> String {
    "llama3.2:3b".to_string()
}

fn default_anthropic_model() -> String {
    "claude-3-haiku-20240307".to_string()
}

impl Config {
    /// Load a configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("Failed to open config file: {:?}", path))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Load a configuration file, writing the defaults there first if it is missing
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Self::load(path);
        }

        log::warn!("Config file not found at {:?}, creating default config.", path);
        let config = Self::default();
        config.save(path)?;
        Ok(config)
    }

    /// Write the configuration as pretty JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).context("Failed to serialize config to JSON")?;
        std::fs::write(path, json).with_context(|| format!("Failed to write config file: {:?}", path))
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        // Validate languages
        let _source_name = crate::language_utils::get_language_name(&self.source_language)?;
        let _target_name = crate::language_utils::get_language_name(&self.target_language)?;

        if self.batch.window_size == 0 {
            return Err(anyhow!("batch.window_size must be at least 1"));
        }
        if !(self.batch.fuzzy_threshold > 0.0 && self.batch.fuzzy_threshold <= 1.0) {
            return Err(anyhow!(
                "batch.fuzzy_threshold must be in (0, 1], got {}",
                self.batch.fuzzy_threshold
            ));
        }
        if self.batch.prompt_template.trim().is_empty() {
            return Err(anyhow!("batch.prompt_template must not be empty"));
        }

        if self.translation.provider == TranslationProvider::Anthropic && self.translation.get_api_key().is_empty() {
            return Err(anyhow!("Translation API key is required for Anthropic provider"));
        }

        Ok(())
    }

    /// Language pair the jobs run under
    pub fn language_pair(&self) -> Result<LanguagePair> {
        LanguagePair::new(&self.source_language, &self.target_language)
    }

    /// Pipeline settings derived from this configuration
    pub fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = PipelineConfig::new(self.language_pair()?);
        config.window_size = self.batch.window_size;
        config.context_size = self.batch.context_size;
        config.glossary = self.batch.glossary.clone();
        config.prompt_template = PromptTemplate::new(self.batch.prompt_template.clone());
        config.fuzzy_threshold = self.batch.fuzzy_threshold;
        config.max_split_depth = self.batch.max_split_depth;
        config.request_timeout = self.translation.get_timeout();
        config.quality_gate = self.batch.quality_gate;
        config.abort_on_auth_failure = self.batch.abort_on_auth_failure;
        Ok(config)
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            source_language: "en".to_string(),
            target_language: "fr".to_string(),
            translation: TranslationConfig::default(),
            batch: BatchConfig::default(),
            storage: StorageConfig::default(),
            log_level: LogLevel::default(),
        }
    }
}

impl TranslationConfig {
    /// Get the active provider configuration from the available_providers array
    pub fn get_active_provider_config(&self) -> Option<&ProviderConfig> {
        self.get_provider_config(&self.provider)
    }

    /// Get a specific provider configuration by type
    pub fn get_provider_config(&self, provider_type: &TranslationProvider) -> Option<&ProviderConfig> {
        let provider_str = provider_type.to_lowercase_string();
        self.available_providers.iter().find(|p| p.provider_type == provider_str)
    }

    /// Mutable access to the active provider configuration, created with defaults if absent
    pub fn active_provider_config_mut(&mut self) -> &mut ProviderConfig {
        let provider_str = self.provider.to_lowercase_string();
        let index = match self.available_providers.iter().position(|p| p.provider_type == provider_str) {
            Some(index) => index,
            None => {
                self.available_providers.push(ProviderConfig::new(self.provider.clone()));
                self.available_providers.len() - 1
            }
        };
        &mut self.available_providers[index]
    }

    /// Get the model for the active provider
    pub fn get_model(&self) -> String {
        if let Some(provider_config) = self.get_active_provider_config() {
            if !provider_config.model.is_empty() {
                return provider_config.model.clone();
            }
        }

        match self.provider {
            TranslationProvider::Ollama => default_ollama_model(),
            TranslationProvider::Anthropic => default_anthropic_model(),
            TranslationProvider::Mock => String::new(),
        }
    }

    /// Get the API key for the active provider
    pub fn get_api_key(&self) -> String {
        if let Some(provider_config) = self.get_active_provider_config() {
            if !provider_config.api_key.is_empty() {
                return provider_config.api_key.clone();
            }
        }

        // Ollama and the mock don't use API keys
        String::new()
    }

    /// Get the endpoint for the active provider
    pub fn get_endpoint(&self) -> String {
        if let Some(provider_config) = self.get_active_provider_config() {
            if !provider_config.endpoint.is_empty() {
                return provider_config.endpoint.clone();
            }
        }

        match self.provider {
            TranslationProvider::Ollama => default_ollama_endpoint(),
            TranslationProvider::Anthropic => default_anthropic_endpoint(),
            TranslationProvider::Mock => String::new(),
        }
    }

    /// Get the per-request timeout for the active provider
    pub fn get_timeout(&self) -> Duration {
        let secs = match self.get_active_provider_config() {
            Some(provider_config) if provider_config.timeout_secs > 0 => provider_config.timeout_secs,
            _ => match self.provider {
                TranslationProvider::Anthropic => default_anthropic_timeout_secs(),
                _ => default_timeout_secs(),
            },
        };
        Duration::from_secs(secs)
    }

    /// Build a client for the active provider
    pub fn create_provider(&self) -> Result<Arc<dyn Provider>> {
        let timeout = self.get_timeout();
        let provider: Arc<dyn Provider> = match self.provider {
            TranslationProvider::Ollama => Arc::new(
                Ollama::new(&self.get_endpoint(), self.get_model(), timeout)?.with_temperature(self.temperature),
            ),
            TranslationProvider::Anthropic => Arc::new(Anthropic::new(
                self.get_api_key(),
                &self.get_endpoint(),
                self.get_model(),
                timeout,
            )?),
            TranslationProvider::Mock => Arc::new(MockProvider::working()),
        };
        Ok(provider)
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            provider: TranslationProvider::default(),
            available_providers: vec![
                ProviderConfig::new(TranslationProvider::Ollama),
                ProviderConfig::new(TranslationProvider::Anthropic),
                ProviderConfig::new(TranslationProvider::Mock),
            ],
            temperature: default_temperature(),
        }
    }
}
