use std::env;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::agent::TerminationPolicy;
use crate::error::{LoopError, Result};
use crate::probe::DEFAULT_PROBE_ENDPOINT;

/// Environment variable naming the TOML file [`AppConfig::load`] reads.
pub const CONFIG_PATH_VAR: &str = "STAGE_LOOP_CONFIG";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Gemini,
    Openai,
    Stub,
}

impl std::str::FromStr for Provider {
    type Err = LoopError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(Provider::Gemini),
            "openai" => Ok(Provider::Openai),
            "stub" => Ok(Provider::Stub),
            other => Err(LoopError::Config(format!("unknown model provider `{other}`"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    #[serde(default)]
    pub provider: Provider,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    /// No timeout is applied when unset.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Scripted replies for the `stub` provider.
    #[serde(default)]
    pub stub_responses: Vec<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            model: default_model(),
            api_key: None,
            endpoint: None,
            timeout_secs: None,
            stub_responses: Vec::new(),
        }
    }
}

fn default_model() -> String {
    "gemini-1.5-flash".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    #[serde(default = "default_goal")]
    pub goal: String,
    #[serde(default = "default_max_steps")]
    pub max_steps: Option<usize>,
    #[serde(default = "default_stop_on_output")]
    pub stop_on_output: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            goal: default_goal(),
            max_steps: default_max_steps(),
            stop_on_output: default_stop_on_output(),
        }
    }
}

impl AgentConfig {
    /// `max_steps = 0` is treated as no limit.
    pub fn policy(&self) -> TerminationPolicy {
        TerminationPolicy {
            stop_on_output: self.stop_on_output,
            ..TerminationPolicy::unbounded()
        }
        .with_max_steps(self.max_steps.unwrap_or(0))
    }
}

fn default_goal() -> String {
    "Find current time and sum 5+7".into()
}

fn default_max_steps() -> Option<usize> {
    Some(16)
}

fn default_stop_on_output() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeConfig {
    #[serde(default = "default_probe_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            endpoint: default_probe_endpoint(),
            api_key: None,
        }
    }
}

fn default_probe_endpoint() -> String {
    DEFAULT_PROBE_ENDPOINT.into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_filter")]
    pub filter: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

fn default_log_filter() -> String {
    "info".into()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let cfg: Self = toml::from_str(&raw)
            .map_err(|err| LoopError::Config(format!("Failed to parse configuration: {err}")))?;
        Ok(cfg)
    }

    /// Read the file named by `STAGE_LOOP_CONFIG` if set, otherwise start
    /// from defaults, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut cfg = match env::var(CONFIG_PATH_VAR) {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        cfg.apply_overrides(|key| env::var(key).ok())?;
        Ok(cfg)
    }

    /// Apply `STAGE_LOOP_*` overrides using `lookup` to resolve variables.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(provider) = lookup("STAGE_LOOP_PROVIDER") {
            self.model.provider = provider.parse()?;
        }
        if let Some(model) = lookup("STAGE_LOOP_MODEL") {
            self.model.model = model;
        }
        if let Some(key) = lookup("STAGE_LOOP_API_KEY") {
            self.model.api_key = Some(key);
        } else if self.model.api_key.is_none() {
            let fallback = match self.model.provider {
                Provider::Gemini => lookup("GEMINI_API_KEY"),
                Provider::Openai => lookup("OPENAI_API_KEY"),
                Provider::Stub => None,
            };
            self.model.api_key = fallback;
        }
        if let Some(endpoint) = lookup("STAGE_LOOP_ENDPOINT") {
            self.model.endpoint = Some(endpoint);
        }
        if let Some(timeout) = lookup("STAGE_LOOP_TIMEOUT_SECS") {
            self.model.timeout_secs = Some(parse_var("STAGE_LOOP_TIMEOUT_SECS", &timeout)?);
        }
        if let Some(goal) = lookup("STAGE_LOOP_GOAL") {
            self.agent.goal = goal;
        }
        if let Some(max_steps) = lookup("STAGE_LOOP_MAX_STEPS") {
            self.agent.max_steps = match max_steps.trim() {
                "" | "none" | "unbounded" => None,
                raw => Some(parse_var("STAGE_LOOP_MAX_STEPS", raw)?),
            };
        }
        if let Some(stop) = lookup("STAGE_LOOP_STOP_ON_OUTPUT") {
            self.agent.stop_on_output = parse_var("STAGE_LOOP_STOP_ON_OUTPUT", &stop)?;
        }
        if let Some(endpoint) = lookup("STAGE_LOOP_PROBE_ENDPOINT") {
            self.probe.endpoint = endpoint;
        }
        if let Some(key) = lookup("STAGE_LOOP_PROBE_API_KEY").or_else(|| lookup("OPENAI_API_KEY")) {
            self.probe.api_key = Some(key);
        }
        if let Some(filter) = lookup("STAGE_LOOP_LOG") {
            self.logging.filter = filter;
        }
        if let Some(json) = lookup("STAGE_LOOP_LOG_JSON") {
            self.logging.json = parse_var("STAGE_LOOP_LOG_JSON", &json)?;
        }
        Ok(())
    }
}

fn parse_var<T>(name: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|err| LoopError::Config(format!("invalid value `{raw}` for {name}: {err}")))
}
