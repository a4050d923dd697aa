use anyhow::{Context, Result};
use confyg::{env, Confygery};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use verso_search::SearchConfig;

/// Environment variable consulted for the API key when none is configured.
pub const GROQ_API_KEY_ENV: &str = "GROQ_API_KEY";

/// Configuration for verso.
///
/// Configuration is loaded from multiple sources with the following priority:
/// 1. CLI arguments (highest priority)
/// 2. Environment variables (VERSO_* prefix)
/// 3. Config file (~/.config/verso/config.toml)
/// 4. Built-in defaults (lowest priority)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// CSV song lyric dataset used by `verso build`.
    ///
    /// Can be set via:
    /// - CLI: verso build --corpus /path/to/songdata.csv
    /// - ENV: VERSO_CORPUS_PATH
    /// - Config: corpus_path = "/path/to/songdata.csv"
    #[serde(default)]
    pub corpus_path: Option<PathBuf>,

    /// Path to the SQLite artifact store.
    ///
    /// Can be set via:
    /// - CLI: --db /path/to/db
    /// - ENV: VERSO_DATABASE_PATH
    /// - Config: database_path = "/path/to/db"
    /// - Default: ~/.local/share/verso/verso.db
    #[serde(default = "default_db_path")]
    pub database_path: PathBuf,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub conversation: ConversationConfig,
}

/// Text-generation service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Display name of the provider, used in logs and errors.
    pub provider: String,

    pub model_name: String,

    /// Falls back to the `GROQ_API_KEY` environment variable.
    pub api_key: Option<String>,

    /// Base URL of an OpenAI-compatible chat completions API.
    pub base_url: String,

    pub timeout_secs: u64,
    pub max_retries: usize,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "groq".to_string(),
            model_name: "qwen/qwen3-32b".to_string(),
            api_key: None,
            base_url: "https://api.groq.com/openai/v1".to_string(),
            timeout_secs: 30,
            max_retries: 3,
            temperature: 0.0,
        }
    }
}

impl LlmConfig {
    /// The configured API key, or the `GROQ_API_KEY` environment variable.
    /// Blank values count as missing.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(GROQ_API_KEY_ENV).ok())
            .filter(|key| !key.trim().is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Conversation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Number of past turns kept per session.
    pub history_turns: usize,

    /// Custom descriptor lexicon (TOML). The built-in lexicon is used when
    /// unset.
    pub lexicon_path: Option<PathBuf>,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            history_turns: 10,
            lexicon_path: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            corpus_path: None,
            database_path: default_db_path(),
            search: SearchConfig::default(),
            llm: LlmConfig::default(),
            conversation: ConversationConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Searches for config file at: ~/.config/verso/config.toml
    /// Reads environment variables with VERSO_ prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let config_path = config_file_path();

        let mut builder = Confygery::new()
            .context("Failed to create config builder")?;

        if config_path.exists() {
            let path_str = config_path.to_str()
                .ok_or_else(|| anyhow::anyhow!("Config path contains invalid UTF-8"))?;
            builder.add_file(path_str)
                .context("Failed to load config file")?;
        }

        let env_opts = env::Options::with_top_level("verso");
        builder.add_env(env_opts)
            .context("Failed to load environment variables")?;

        let config: Self = builder.build()
            .context("Failed to build configuration")?;

        Ok(config)
    }

    /// Load configuration with custom database path.
    ///
    /// This is used when the --db CLI flag is provided.
    pub fn load_with_db_path(db_path: PathBuf) -> Result<Self> {
        let mut config = Self::load()?;
        config.database_path = db_path;
        Ok(config)
    }
}

/// Returns: ~/.local/share/verso/verso.db (or platform equivalent)
fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("verso")
        .join("verso.db")
}

/// Get the config file path.
///
/// Returns:
/// - Linux: ~/.config/verso/config.toml
/// - macOS: ~/Library/Application Support/verso/config.toml
/// - Windows: %APPDATA%\verso\config.toml
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("verso")
        .join("config.toml")
}

/// Get the example config file content.
pub fn example_config() -> &'static str {
    r#"# Verso Configuration File
#
# Configuration is loaded from multiple sources with the following priority:
# 1. CLI arguments (highest priority)
# 2. Environment variables (VERSO_* prefix)
# 3. This config file
# 4. Built-in defaults (lowest priority)

# CSV song lyric dataset with artist, song, link and text columns
#
# Can also be set via:
# - CLI: verso build --corpus /path/to/songdata.csv
# - Environment: VERSO_CORPUS_PATH=/path/to/songdata.csv
#corpus_path = "/path/to/songdata.csv"

# Path to the SQLite artifact store
#
# Holds the built vocabulary, document vectors and song metadata
#
# Default: Platform-specific data directory
#database_path = "/path/to/custom/verso.db"

[search]
# Maximum number of vocabulary terms, chosen by corpus frequency
vocabulary_size = 5000

# "on_demand" scores candidates per query; "precomputed" fills the full
# pairwise similarity matrix at build time
index_strategy = "on_demand"

# Number of recommendations when none is requested
default_k = 5

# Reduce words to a common root ("dancing" and "dance" match)
stemming = true

# Words ignored in addition to the built-in English stop words
extra_stop_words = []

# Maximum number of similarity queries computed at once
workers = 4

[llm]
# Chat model used to phrase replies. Without an API key verso replies
# with plain templated text.
provider = "groq"
model_name = "qwen/qwen3-32b"

# Get a key at https://console.groq.com/keys
# Can also be set via GROQ_API_KEY
#api_key = "your-groq-api-key-here"

base_url = "https://api.groq.com/openai/v1"
timeout_secs = 30
max_retries = 3
temperature = 0.0

[conversation]
# Past turns remembered per chat session
history_turns = 10

# Custom mood/genre descriptor lexicon (TOML)
#lexicon_path = "/path/to/lexicon.toml"
"#
}

/// Create default config file if it doesn't exist.
///
/// Returns true if a new file was created, false if it already existed.
pub fn ensure_config_file() -> Result<bool> {
    let config_path = config_file_path();

    if config_path.exists() {
        return Ok(false);
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)
            .context("Failed to create config directory")?;
    }

    std::fs::write(&config_path, example_config())
        .context("Failed to write config file")?;

    Ok(true)
}
