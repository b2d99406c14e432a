// Configuration management for springscope

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name looked up in the project root
pub const CONFIG_FILE_NAME: &str = ".springscope.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub project: ProjectConfig,
    pub indexing: IndexingConfig,
    pub retrieval: RetrievalConfig,
    pub llm: LlmConfig,
    pub logging: LoggingConfig,
    /// Config file the values were read from, if any
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub name: String,
    pub root: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    /// File extensions (without the dot) eligible for parsing
    pub extensions: Vec<String>,
    /// Directory names pruned during scanning
    pub ignore_dirs: Vec<String>,
    /// Directory names marking test sources
    pub test_dirs: Vec<String>,
    /// Substrings marking test declarations
    pub test_name_markers: Vec<String>,
    /// Import prefixes treated as external framework namespaces
    pub external_prefixes: Vec<String>,
    /// Parse workers; 0 means available parallelism
    pub parallelism: usize,
    /// Where the index database and derived artifacts live, relative to the project root
    pub index_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_n: usize,
    pub embedding_dim: usize,
    pub summary_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    /// Never written to disk; comes from the environment
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    /// Also write log lines to this file
    pub file: Option<String>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: "unnamed-project".to_string(),
            root: ".".to_string(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["java".to_string()],
            ignore_dirs: [".git", ".svn", ".hg", "target", "build", "out", "node_modules", ".idea"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            test_dirs: vec!["test".to_string(), "tests".to_string()],
            test_name_markers: vec!["Test".to_string(), "Mock".to_string()],
            external_prefixes: [
                "java.",
                "javax.",
                "jakarta.",
                "org.springframework.",
                "org.slf4j.",
                "org.apache.",
                "org.junit.",
                "org.mockito.",
                "lombok.",
                "com.fasterxml.",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            parallelism: 0,
            index_dir: ".springscope".to_string(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_n: 5,
            embedding_dim: 384,
            summary_dir: "summary".to_string(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4-turbo".to_string(),
            temperature: 0.2,
            max_tokens: 2000,
            timeout_secs: 120,
            max_retries: 3,
            retry_delay_ms: 2000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Malformed config file {}", path.display()))?;
        Ok(config)
    }

    /// Load configuration for a project directory.
    ///
    /// A missing `.springscope.toml` yields defaults; a malformed one is an error.
    /// Environment overrides are applied and the result is validated.
    pub fn load<P: AsRef<Path>>(project_dir: P) -> anyhow::Result<Self> {
        let project_dir = project_dir.as_ref();
        let config_path = project_dir.join(CONFIG_FILE_NAME);

        let mut config = if config_path.exists() {
            let loaded = Self::from_file(&config_path)?;
            Self {
                source: Some(config_path),
                ..loaded
            }
        } else {
            Self::default()
        };

        if config.project.root == "." {
            config.project.root = project_dir.display().to_string();
        }

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment-style overrides from a lookup function
    pub fn apply_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("OPENAI_API_KEY").filter(|k| !k.trim().is_empty()) {
            self.llm.api_key = Some(key);
        }
        if let Some(url) = lookup("LLM_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Some(model) = lookup("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(value) = lookup("LLM_TEMPERATURE") {
            self.llm.temperature = value
                .parse()
                .with_context(|| format!("LLM_TEMPERATURE is not a number: {}", value))?;
        }
        if let Some(value) = lookup("LLM_MAX_TOKENS") {
            self.llm.max_tokens = value
                .parse()
                .with_context(|| format!("LLM_MAX_TOKENS is not an integer: {}", value))?;
        }
        if let Some(value) = lookup("LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = value
                .parse()
                .with_context(|| format!("LLM_TIMEOUT_SECS is not an integer: {}", value))?;
        }
        if let Some(value) = lookup("LLM_MAX_RETRIES") {
            self.llm.max_retries = value
                .parse()
                .with_context(|| format!("LLM_MAX_RETRIES is not an integer: {}", value))?;
        }
        if let Some(value) = lookup("LLM_RETRY_DELAY_MS") {
            self.llm.retry_delay_ms = value
                .parse()
                .with_context(|| format!("LLM_RETRY_DELAY_MS is not an integer: {}", value))?;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level.to_lowercase();
        }
        if let Some(file) = lookup("LOG_FILE").filter(|f| !f.trim().is_empty()) {
            self.logging.file = Some(file);
        }
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.project.name.is_empty() {
            return Err(anyhow::anyhow!("Project name cannot be empty"));
        }

        if self.indexing.extensions.is_empty() {
            return Err(anyhow::anyhow!("At least one source extension is required"));
        }
        if self.indexing.index_dir.trim().is_empty() {
            return Err(anyhow::anyhow!("Index directory cannot be empty"));
        }

        if self.retrieval.top_n == 0 {
            return Err(anyhow::anyhow!("Retrieval top_n must be greater than 0"));
        }
        if self.retrieval.embedding_dim < 16 {
            return Err(anyhow::anyhow!("Embedding dimension must be at least 16"));
        }

        if self.llm.base_url.trim().is_empty() {
            return Err(anyhow::anyhow!("LLM base URL cannot be empty"));
        }
        if self.llm.model.trim().is_empty() {
            return Err(anyhow::anyhow!("LLM model cannot be empty"));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(anyhow::anyhow!("LLM temperature must be within 0.0..=2.0"));
        }
        if self.llm.max_tokens == 0 {
            return Err(anyhow::anyhow!("LLM max tokens must be greater than 0"));
        }
        if self.llm.timeout_secs == 0 {
            return Err(anyhow::anyhow!("LLM timeout must be greater than 0"));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(anyhow::anyhow!("Invalid log level: {}", self.logging.level));
        }
        let valid_formats = ["compact", "pretty", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(anyhow::anyhow!("Invalid log format: {}", self.logging.format));
        }
        if let Some(file) = &self.logging.file {
            if Path::new(file).file_name().is_none() {
                return Err(anyhow::anyhow!("Log file must name a file: {}", file));
            }
        }

        Ok(())
    }

    /// Fails when no API credential is configured
    pub fn require_api_key(&self) -> anyhow::Result<&str> {
        self.llm
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("OPENAI_API_KEY is not set; the text generation service needs a credential"))
    }

    pub fn project_root(&self) -> PathBuf {
        PathBuf::from(&self.project.root)
    }

    pub fn index_dir(&self) -> PathBuf {
        self.project_root().join(&self.indexing.index_dir)
    }

    pub fn index_db_path(&self) -> PathBuf {
        self.index_dir().join("index.db")
    }

    pub fn worker_count(&self) -> usize {
        if self.indexing.parallelism > 0 {
            self.indexing.parallelism
        } else {
            std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.llm.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.llm.retry_delay_ms)
    }
}
