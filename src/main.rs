// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, error, info, warn};
use std::io::Write;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use subbatch::app_config::{Config, LogLevel, TranslationProvider};
use subbatch::app_controller::Controller;

/// CLI Wrapper for TranslationProvider to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliTranslationProvider {
    Ollama,
    Anthropic,
    Mock,
}

impl From<CliTranslationProvider> for TranslationProvider {
    fn from(cli_provider: CliTranslationProvider) -> Self {
        match cli_provider {
            CliTranslationProvider::Ollama => TranslationProvider::Ollama,
            CliTranslationProvider::Anthropic => TranslationProvider::Anthropic,
            CliTranslationProvider::Mock => TranslationProvider::Mock,
        }
    }
}

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => LogLevel::Error,
            CliLogLevel::Warn => LogLevel::Warn,
            CliLogLevel::Info => LogLevel::Info,
            CliLogLevel::Debug => LogLevel::Debug,
            CliLogLevel::Trace => LogLevel::Trace,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Translate a JSON file of {id, text} units
    Translate(TranslateArgs),

    /// Inspect or clear the translation cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Check that the configured provider is reachable and accepts the credentials
    Check {
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Generate shell completions for subbatch
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    /// Show cache statistics
    Stats,

    /// Delete cache entries
    Purge {
        /// Only delete entries unused for this many days
        #[arg(long)]
        older_than_days: Option<u32>,
    },
}

#[derive(Parser, Debug, Clone)]
struct CommonArgs {
    /// Configuration file path
    #[arg(short, long, default_value = "conf.json")]
    config_path: PathBuf,

    /// Translation provider to use
    #[arg(short, long, value_enum)]
    provider: Option<CliTranslationProvider>,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,
}

#[derive(Parser, Debug)]
struct TranslateArgs {
    /// JSON array of {"id", "text"} objects
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output file (defaults to <INPUT stem>.<target>.json)
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[command(flatten)]
    common: CommonArgs,

    /// Model name to use for translation
    #[arg(short, long)]
    model: Option<String>,

    /// Source language code (e.g., 'en', 'es', 'fr')
    #[arg(short, long)]
    source_language: Option<String>,

    /// Target language code (e.g., 'en', 'es', 'fr')
    #[arg(short, long)]
    target_language: Option<String>,

    /// Explicit job id; derived from the input when omitted
    #[arg(long)]
    job_id: Option<String>,
}

/// subbatch - resilient windowed subtitle translation
#[derive(Parser, Debug)]
#[command(name = "subbatch")]
#[command(version)]
#[command(about = "Windowed subtitle translation with caching, split-retry and resumable checkpoints")]
#[command(long_about = "subbatch translates sequences of subtitle lines through LLM backends.

EXAMPLES:
    subbatch translate episode.json                  # Translate using default config
    subbatch translate -s en -t es episode.json      # Translate from English to Spanish
    subbatch translate -p mock episode.json          # Dry run without a backend
    subbatch translate --job-id ep01 episode.json    # Resumable under a fixed id
    subbatch cache stats                             # Show cache statistics
    subbatch cache purge --older-than-days 30        # Drop stale cache entries
    subbatch check                                   # Validate provider credentials
    subbatch completions bash > subbatch.bash        # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. You can specify a different
    config file with --config-path. If the config file doesn't exist, a default one
    will be created automatically.

SUPPORTED PROVIDERS:
    ollama    - Local Ollama server (default: llama3.2:3b)
    anthropic - Anthropic Claude API (requires API key)
    mock      - Offline stand-in, marks every line as translated")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        log::set_boxed_logger(Box::new(CustomLogger::new(LevelFilter::Trace)))?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: ANSI color for log level
    fn color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "\x1B[1;31m",
            Level::Warn => "\x1B[1;33m",
            Level::Info => "\x1B[1;32m",
            Level::Debug => "\x1B[1;36m",
            Level::Trace => "\x1B[1;35m",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let _ = writeln!(
                std::io::stderr(),
                "{}{} {:<5} {}\x1B[0m",
                Self::color_for_level(record.level()),
                now,
                record.level(),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() {
    // Start at info; the configured level is applied once the config is loaded
    if let Err(e) = CustomLogger::init(LevelFilter::Info) {
        eprintln!("Failed to initialize logger: {}", e);
    }

    let cli = CommandLineOptions::parse();
    if let Err(e) = run(cli.command).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Completions { shell } => {
            let mut cmd = CommandLineOptions::command();
            generate(shell, &mut cmd, "subbatch", &mut std::io::stdout());
            Ok(())
        }
        Commands::Translate(args) => run_translate(args).await,
        Commands::Cache { action, common } => {
            let controller = Controller::with_config(load_config(&common)?)?;
            match action {
                CacheAction::Stats => {
                    let stats = controller.cache_stats().await?;
                    println!("{}", stats);
                }
                CacheAction::Purge { older_than_days } => {
                    let deleted = controller.purge_cache(older_than_days).await?;
                    info!("Deleted {} cache entries", deleted);
                }
            }
            Ok(())
        }
        Commands::Check { common } => {
            let controller = Controller::with_config(load_config(&common)?)?;
            let provider = controller.config().translation.provider.display_name().to_string();
            let status = controller.check_provider().await?;
            if !status.key_valid {
                anyhow::bail!("{} rejected the configured credentials", provider);
            }
            info!("{} is reachable", provider);
            for model in status.models {
                println!("{}", model);
            }
            Ok(())
        }
    }
}

async fn run_translate(args: TranslateArgs) -> Result<()> {
    let mut config = load_config(&args.common)?;

    if let Some(model) = args.model {
        config.translation.active_provider_config_mut().model = model;
    }
    if let Some(source_language) = args.source_language {
        config.source_language = source_language;
    }
    if let Some(target_language) = args.target_language {
        config.target_language = target_language;
    }

    let controller = Controller::with_config(config)?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing the current window");
            on_signal.cancel();
        }
    });

    controller.run(&args.input, args.output, args.job_id, &cancel).await?;
    Ok(())
}

/// Load (or create) the configuration and apply the shared overrides
fn load_config(common: &CommonArgs) -> Result<Config> {
    // Apply a command line level before loading so config warnings respect it
    if let Some(level) = &common.log_level {
        log::set_max_level(LogLevel::from(level.clone()).to_level_filter());
    }

    let mut config = Config::load_or_create(&common.config_path)
        .with_context(|| format!("Failed to load configuration from {:?}", common.config_path))?;

    if let Some(provider) = &common.provider {
        config.translation.provider = provider.clone().into();
    }
    match &common.log_level {
        Some(level) => config.log_level = level.clone().into(),
        None => log::set_max_level(config.log_level.to_level_filter()),
    }

    Ok(config)
}
