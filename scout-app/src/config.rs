//! Scout configuration loader: TOML file with serde defaults, environment
//! overrides for secrets.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Scout, a job-hunting assistant. You can \
search job boards for postings matched against the user's resume (a paid operation, charged \
per posting) and read back the report of previous matches. Be concise and concrete.\n\n\
What you know about this user:\n{user_details}";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ScoutConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub keys: KeysConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub job_search: JobSearchSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_model")]
    pub model: String,
    /// System preamble template; `{user_details}` is replaced with the
    /// user's grounding text each turn.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_max_tool_loops")]
    pub max_tool_loops: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            system_prompt: default_system_prompt(),
            max_tool_loops: default_max_tool_loops(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeysConfig {
    pub openai_api_key: Option<String>,
}

impl KeysConfig {
    /// Config value, overridden by `OPENAI_API_KEY` when set.
    pub fn api_key(&self) -> Option<String> {
        std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .or_else(|| self.openai_api_key.clone())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl StoreConfig {
    pub fn turns_db_path(&self) -> PathBuf {
        self.data_dir.join("turns.db")
    }

    pub fn memory_db_path(&self) -> PathBuf {
        self.data_dir.join("memory.db")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobSearchSection {
    #[serde(default = "default_unit_cost")]
    pub unit_cost: f64,
    #[serde(default = "default_match_threshold")]
    pub match_threshold: u32,
    #[serde(default = "default_resume_path")]
    pub resume_path: PathBuf,
    #[serde(default = "default_report_path")]
    pub report_path: PathBuf,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_postings")]
    pub max_postings: usize,
    /// Upper bound for one whole tool invocation, searches included.
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

impl Default for JobSearchSection {
    fn default() -> Self {
        Self {
            unit_cost: default_unit_cost(),
            match_threshold: default_match_threshold(),
            resume_path: default_resume_path(),
            report_path: default_report_path(),
            request_timeout_secs: default_request_timeout_secs(),
            max_postings: default_max_postings(),
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_max_tool_loops() -> usize {
    4
}

fn default_port() -> u16 {
    8090
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_unit_cost() -> f64 {
    2.0
}

fn default_match_threshold() -> u32 {
    50
}

fn default_resume_path() -> PathBuf {
    PathBuf::from("resume.txt")
}

fn default_report_path() -> PathBuf {
    PathBuf::from("good_jobs.txt")
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_postings() -> usize {
    25
}

fn default_tool_timeout_secs() -> u64 {
    300
}

impl ScoutConfig {
    pub fn default_config_path() -> PathBuf {
        PathBuf::from("scout.toml")
    }

    /// Load from `path` (or `scout.toml`); a missing file yields the
    /// built-in defaults so a fresh checkout runs without setup.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::default_config_path);
        if !path.exists() {
            tracing::info!(path = %path.display(), "no config file; using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let cfg: Self =
            toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_parses_to_defaults() {
        let cfg: ScoutConfig = toml::from_str("").expect("parse");
        assert_eq!(cfg.general.model, "gpt-4o-mini");
        assert_eq!(cfg.general.max_tool_loops, 4);
        assert_eq!(cfg.job_search.unit_cost, 2.0);
        assert_eq!(cfg.server.port, 8090);
        assert!(cfg.general.system_prompt.contains("{user_details}"));
    }

    #[test]
    fn sections_override_individually() {
        let cfg: ScoutConfig = toml::from_str(
            r#"
            [general]
            model = "gpt-4.1-mini"

            [job_search]
            unit_cost = 0.5
            match_threshold = 70
            "#,
        )
        .expect("parse");
        assert_eq!(cfg.general.model, "gpt-4.1-mini");
        assert_eq!(cfg.job_search.unit_cost, 0.5);
        assert_eq!(cfg.job_search.match_threshold, 70);
        // Untouched sections keep their defaults.
        assert_eq!(cfg.general.max_tool_loops, 4);
    }

    #[test]
    fn store_paths_derive_from_data_dir() {
        let cfg: ScoutConfig = toml::from_str("[store]\ndata_dir = \"/tmp/scout\"").expect("parse");
        assert_eq!(cfg.store.turns_db_path(), PathBuf::from("/tmp/scout/turns.db"));
        assert_eq!(cfg.store.memory_db_path(), PathBuf::from("/tmp/scout/memory.db"));
    }
}
