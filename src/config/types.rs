//! Typed configuration, loaded defaults → system TOML → local TOML → secrets
//! TOML → environment overrides, mirroring the teacher's `config::Config`
//! layering (`config/types.rs` in the reference implementation).

use super::SecretString;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub oauth: OAuthConfig,
    pub llm: LlmConfig,
    pub web_search: WebSearchConfig,
    pub push: PushConfig,
    pub pipeline: PipelineConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
            oauth: OAuthConfig::default(),
            llm: LlmConfig::default(),
            web_search: WebSearchConfig::default(),
            push: PushConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bearer token for service-to-service calls (e.g. the scheduler hitting
    /// its own cron endpoints). Session-cookie auth is handled separately.
    pub api_key: Option<SecretString>,
    /// Selects cookie `Secure` flag behavior; mirrors `NODE_ENV`.
    #[serde(default)]
    pub dev_mode: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            api_key: None,
            dev_mode: false,
        }
    }
}

fn default_db_path() -> PathBuf {
    brieflock_home().join("brieflock.db")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct OAuthConfig {
    pub google_client_id: Option<String>,
    pub google_client_secret: Option<SecretString>,
    pub microsoft_client_id: Option<String>,
    pub microsoft_client_secret: Option<SecretString>,
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-4.1-mini".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_key: Option<SecretString>,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_llm_timeout_secs() -> u64 {
    60
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

/// Optional — the researcher degrades to email-only facts when absent
/// (spec §9, "Web-search optional").
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WebSearchConfig {
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
}

/// Optional — absent push credentials mean the `LoggingPushSink` default is
/// used instead of a real transport (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PushConfig {
    pub service_key: Option<SecretString>,
}

fn default_email_batch() -> usize {
    25
}
fn default_doc_meta_batch() -> usize {
    50
}
fn default_extraction_batch() -> usize {
    20
}
fn default_doc_analysis_batch() -> usize {
    5
}
fn default_attendee_research_cap() -> usize {
    25
}

/// LLM-cost knobs (spec §9: "batch sizes are prompt-tuned, not physical").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    #[serde(default = "default_email_batch")]
    pub email_relevance_batch: usize,
    #[serde(default = "default_doc_meta_batch")]
    pub document_metadata_batch: usize,
    #[serde(default = "default_extraction_batch")]
    pub email_extraction_batch: usize,
    #[serde(default = "default_doc_analysis_batch")]
    pub document_analysis_batch: usize,
    #[serde(default = "default_attendee_research_cap")]
    pub attendee_research_concurrency_cap: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            email_relevance_batch: default_email_batch(),
            document_metadata_batch: default_doc_meta_batch(),
            email_extraction_batch: default_extraction_batch(),
            document_analysis_batch: default_doc_analysis_batch(),
            attendee_research_concurrency_cap: default_attendee_research_cap(),
        }
    }
}

/// `~/.brieflock/`
pub fn brieflock_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".brieflock")
}

fn config_path_candidates() -> Vec<PathBuf> {
    vec![
        PathBuf::from("/etc/brieflock/config.toml"),
        brieflock_home().join("config.toml"),
        brieflock_home().join("secrets.toml"),
    ]
}

impl Config {
    /// Four-stage layering: built-in defaults, then each candidate TOML file
    /// in order (later files overlay earlier ones), then environment
    /// overrides. Missing files are silently skipped — only a malformed file
    /// that exists is an error.
    pub fn load() -> anyhow::Result<Self> {
        let mut cfg = Config::default();
        for path in config_path_candidates() {
            if path.exists() {
                cfg.merge_from_file(&path)?;
            }
        }
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    pub fn load_from_path(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut cfg = Config::default();
        cfg.merge_from_file(path)?;
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    fn merge_from_file(&mut self, path: &std::path::Path) -> anyhow::Result<()> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading config file {}: {e}", path.display()))?;
        let parsed: Config = toml::from_str(&text)
            .map_err(|e| anyhow::anyhow!("parsing config file {}: {e}", path.display()))?;
        *self = parsed;
        Ok(())
    }

    /// Recognized environment variables (spec §6).
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("BRIEFLOCK_DB_PATH") {
            self.database.path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("BRIEFLOCK_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Ok(v) = std::env::var("GOOGLE_OAUTH_CLIENT_ID") {
            self.oauth.google_client_id = Some(v);
        }
        if let Ok(v) = std::env::var("GOOGLE_OAUTH_CLIENT_SECRET") {
            self.oauth.google_client_secret = Some(v.into());
        }
        if let Ok(v) = std::env::var("LLM_API_KEY") {
            self.llm.api_key = Some(v.into());
        }
        if let Ok(v) = std::env::var("LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("WEB_SEARCH_API_KEY") {
            self.web_search.api_key = Some(v.into());
        }
        if let Ok(v) = std::env::var("PUSH_SERVICE_KEY") {
            self.push.service_key = Some(v.into());
        }
        // NODE_ENV governs cookie `Secure` flag / pretty-vs-JSON logging.
        if let Ok(v) = std::env::var("NODE_ENV") {
            self.server.dev_mode = v != "production";
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        const LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
        if !LEVELS.contains(&self.logging.level.as_str()) {
            anyhow::bail!("invalid log level: {}", self.logging.level);
        }
        if let Some(parent) = self.database.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                tracing::warn!(path = %parent.display(), "database directory does not exist yet");
            }
        }
        Ok(())
    }

    pub fn has_llm_key(&self) -> bool {
        self.llm.api_key.as_ref().is_some_and(|s| !s.is_empty())
    }

    pub fn has_web_search(&self) -> bool {
        self.web_search.api_key.as_ref().is_some_and(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn invalid_log_level_rejected() {
        let mut cfg = Config::default();
        cfg.logging.level = "verbose".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn toml_round_trip() {
        let toml_src = r#"
            [server]
            port = 9090

            [llm]
            model = "gpt-4.1-mini"
        "#;
        let cfg: Config = toml::from_str(toml_src).unwrap();
        assert_eq!(cfg.server.port, 9090);
        assert_eq!(cfg.llm.model, "gpt-4.1-mini");
        // Unset sections still carry their field defaults.
        assert_eq!(cfg.pipeline.email_relevance_batch, 25);
    }

    #[test]
    fn env_override_llm_key() {
        unsafe {
            std::env::set_var("LLM_API_KEY", "sk-test-123");
        }
        let mut cfg = Config::default();
        cfg.apply_env_overrides();
        assert!(cfg.has_llm_key());
        unsafe {
            std::env::remove_var("LLM_API_KEY");
        }
    }

    #[test]
    fn no_web_search_key_by_default() {
        let cfg = Config::default();
        assert!(!cfg.has_web_search());
    }
}
