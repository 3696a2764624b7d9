//! Configuration loading and root folder resolution
//!
//! Resolution follows the same priority order everywhere:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing TOML file is never fatal: a warning is logged and defaults apply.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "GLOSSARY_ROOT_FOLDER";

/// Environment variable holding the OpenAI API key
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "glossary.db";

/// Config file name inside the root folder
pub const CONFIG_FILE: &str = "glossary.toml";

/// Top-level TOML configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TomlConfig {
    /// Root folder holding the database and working files
    #[serde(default)]
    pub root_folder: Option<String>,

    /// Address the HTTP server binds to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Port the HTTP server listens on
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub openai: OpenAiConfig,

    #[serde(default)]
    pub generation: GenerationConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            bind_address: default_bind_address(),
            port: default_port(),
            logging: LoggingConfig::default(),
            openai: OpenAiConfig::default(),
            generation: GenerationConfig::default(),
        }
    }
}

/// Logging section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Default level when RUST_LOG is not set (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Optional log file; stderr when absent
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_file: None,
        }
    }
}

/// OpenAI completion settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpenAiConfig {
    #[serde(default)]
    pub api_key: Option<String>,

    /// Base URL of an OpenAI-compatible API
    #[serde(default = "default_api_base")]
    pub api_base: String,

    #[serde(default = "default_primary_model")]
    pub primary_model: String,

    /// Model used for the final retry attempt
    #[serde(default = "default_fallback_model")]
    pub fallback_model: String,

    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,

    /// USD per 1000 prompt tokens, used for cost tracking
    #[serde(default)]
    pub prompt_cost_per_1k_tokens: f64,

    /// USD per 1000 completion tokens, used for cost tracking
    #[serde(default)]
    pub completion_cost_per_1k_tokens: f64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: default_api_base(),
            primary_model: default_primary_model(),
            fallback_model: default_fallback_model(),
            requests_per_second: default_requests_per_second(),
            prompt_cost_per_1k_tokens: 0.0,
            completion_cost_per_1k_tokens: 0.0,
        }
    }
}

/// AI content generation limits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationConfig {
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Cells per batch; `max_workers * 3` when unset
    #[serde(default)]
    pub batch_size: Option<usize>,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Fraction of failed cells (0.0 - 1.0) that stops a run
    #[serde(default = "default_max_error_rate")]
    pub max_error_rate: f64,

    /// Spending cap per run in USD
    #[serde(default)]
    pub cost_limit_usd: Option<f64>,

    #[serde(default = "default_max_concurrent_runs")]
    pub max_concurrent_runs: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            batch_size: None,
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            max_error_rate: default_max_error_rate(),
            cost_limit_usd: None,
            max_concurrent_runs: default_max_concurrent_runs(),
        }
    }
}

impl GenerationConfig {
    /// Effective batch size
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size
            .filter(|size| *size > 0)
            .unwrap_or(self.max_workers.max(1) * 3)
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5740
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_primary_model() -> String {
    "gpt-4.1-nano".to_string()
}

fn default_fallback_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_requests_per_second() -> u32 {
    10
}

fn default_max_workers() -> usize {
    25
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_secs() -> u64 {
    2
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_max_error_rate() -> f64 {
    0.20
}

fn default_max_concurrent_runs() -> usize {
    5
}

/// Load TOML configuration with graceful degradation
///
/// Missing file: warning + defaults. Unreadable or malformed file: `Error::Config`.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!(
            path = %path.display(),
            "Config file not found, using defaults"
        );
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;

    info!(path = %path.display(), "Loaded configuration");
    Ok(config)
}

/// Write TOML configuration atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Compiled defaults for the current platform
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub log_level: String,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
            log_level: default_log_level(),
        }
    }
}

/// OS-dependent default root folder
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("ai-glossary"))
        .unwrap_or_else(|| PathBuf::from("./ai-glossary-data"))
}

/// Resolves the root folder from CLI → ENV → TOML → compiled default
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
    toml_root: Option<String>,
}

impl RootFolderResolver {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            cli_arg: None,
            toml_root: None,
        }
    }

    /// Command-line override
    pub fn with_cli_arg(mut self, arg: Option<PathBuf>) -> Self {
        self.cli_arg = arg;
        self
    }

    /// `root_folder` from an already loaded TOML config
    pub fn with_toml(mut self, config: &TomlConfig) -> Self {
        self.toml_root = config.root_folder.clone();
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            info!(module = %self.module_name, "Root folder from command line");
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                info!(module = %self.module_name, "Root folder from {}", ROOT_FOLDER_ENV);
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.toml_root {
            if !path.trim().is_empty() {
                info!(module = %self.module_name, "Root folder from TOML config");
                return PathBuf::from(path);
            }
        }

        CompiledDefaults::for_current_platform().root_folder
    }
}

/// Creates the root folder and derives paths inside it
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    /// Create root folder directory if missing
    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            std::fs::create_dir_all(&self.root_folder)?;
            info!(path = %self.root_folder.display(), "Created root folder");
        }
        Ok(())
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE)
    }

    pub fn config_path(&self) -> PathBuf {
        self.root_folder.join(CONFIG_FILE)
    }
}

/// Pick the OpenAI API key from the candidate sources
///
/// **Priority:** Environment → Database → TOML. The first non-blank key wins.
pub fn select_api_key(
    env_key: Option<String>,
    db_key: Option<String>,
    toml_key: Option<String>,
) -> Option<(String, &'static str)> {
    let candidates = [
        (env_key, "environment"),
        (db_key, "database"),
        (toml_key, "TOML"),
    ];

    let valid: Vec<(String, &'static str)> = candidates
        .into_iter()
        .filter_map(|(key, source)| key.filter(|k| is_valid_key(k)).map(|k| (k, source)))
        .collect();

    if valid.len() > 1 {
        let sources: Vec<&str> = valid.iter().map(|(_, source)| *source).collect();
        warn!(
            "OpenAI API key found in multiple sources: {}. Using {}.",
            sources.join(", "),
            valid[0].1
        );
    }

    valid.into_iter().next()
}
