//! Layered configuration for the toolkit.
//!
//! Hardcoded defaults are merged with optional TOML override files.
//! Priority: project (.skillforge/config.toml) > user (~/.skillforge/config.toml) > built-in.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Authoring constraints applied to skill frontmatter and to generated
/// descriptions.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Constraints {
    #[serde(default = "default_max_name_len")]
    pub max_name_len: usize,
    #[serde(default = "default_max_description_len")]
    pub max_description_len: usize,
    /// Word-count target for rewritten descriptions
    #[serde(default = "default_word_target_min")]
    pub word_target_min: usize,
    #[serde(default = "default_word_target_max")]
    pub word_target_max: usize,
    /// How much of the skill body is quoted in the improvement prompt
    #[serde(default = "default_body_excerpt_chars")]
    pub body_excerpt_chars: usize,
    /// How many prior improvement rounds the prompt references
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    /// Character cap for each history entry quoted in the prompt
    #[serde(default = "default_history_preview_chars")]
    pub history_preview_chars: usize,
}

fn default_max_name_len() -> usize {
    64
}
fn default_max_description_len() -> usize {
    1024
}
fn default_word_target_min() -> usize {
    100
}
fn default_word_target_max() -> usize {
    200
}
fn default_body_excerpt_chars() -> usize {
    3000
}
fn default_history_window() -> usize {
    3
}
fn default_history_preview_chars() -> usize {
    200
}

impl Default for Constraints {
    fn default() -> Self {
        Self {
            max_name_len: default_max_name_len(),
            max_description_len: default_max_description_len(),
            word_target_min: default_word_target_min(),
            word_target_max: default_word_target_max(),
            body_excerpt_chars: default_body_excerpt_chars(),
            history_window: default_history_window(),
            history_preview_chars: default_history_preview_chars(),
        }
    }
}

/// Evaluation knobs; each has a CLI flag that takes precedence.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EvalDefaults {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_runs_per_query")]
    pub runs_per_query: usize,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,
    #[serde(default = "default_improve_timeout_secs")]
    pub improve_timeout_secs: u64,
}

fn default_workers() -> usize {
    6
}
fn default_runs_per_query() -> usize {
    3
}
fn default_threshold() -> f64 {
    0.5
}
fn default_run_timeout_secs() -> u64 {
    90
}
fn default_improve_timeout_secs() -> u64 {
    120
}

impl Default for EvalDefaults {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            runs_per_query: default_runs_per_query(),
            threshold: default_threshold(),
            run_timeout_secs: default_run_timeout_secs(),
            improve_timeout_secs: default_improve_timeout_secs(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Executable name of the external agent CLI
    pub agent_bin: String,
    /// Tool names whose invocations count as "the skill was loaded".
    /// The agent CLI has renamed these across releases, so they are
    /// configuration rather than a constant.
    pub trigger_tools: Vec<String>,
    pub constraints: Constraints,
    pub eval: EvalDefaults,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            agent_bin: "claude".to_string(),
            trigger_tools: vec!["Skill".to_string(), "SlashCommand".to_string()],
            constraints: Constraints::default(),
            eval: EvalDefaults::default(),
        }
    }
}

/// On-disk override file; every field is optional so a file only has to
/// name what it changes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    pub agent_bin: Option<String>,
    pub trigger_tools: Option<Vec<String>>,
    pub constraints: Option<Constraints>,
    pub eval: Option<EvalDefaults>,
}

impl Config {
    /// Load configuration starting from built-in defaults, then merging the
    /// user file and the project file in that order.
    pub fn load(project_root: &Path) -> Result<Self> {
        let mut config = Config::default();

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".skillforge").join("config.toml");
            if user_config.exists() {
                config.merge(ConfigFile::load_from(&user_config)?);
            }
        }

        let project_config = project_root.join(".skillforge").join("config.toml");
        if project_config.exists() {
            config.merge(ConfigFile::load_from(&project_config)?);
        }

        Ok(config)
    }

    /// Merge an override file into this config (the file takes priority).
    pub fn merge(&mut self, other: ConfigFile) {
        if let Some(bin) = other.agent_bin {
            self.agent_bin = bin;
        }
        if let Some(tools) = other.trigger_tools {
            self.trigger_tools = tools;
        }
        if let Some(constraints) = other.constraints {
            self.constraints = constraints;
        }
        if let Some(eval) = other.eval {
            self.eval = eval;
        }
    }
}

impl ConfigFile {
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let file: ConfigFile = toml::from_str(&content)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        Ok(file)
    }
}
