use anyhow::{Context, Result, anyhow};
use relay_core::{
    DEFAULT_BASE_URL, DEFAULT_MODELS, GenerationParams, ModelCandidate, RelaySettings, mask_secret,
};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_CONFIG: &str = include_str!("../../../config/default.toml");

const API_KEY_ENV: &str = "OPENROUTER_API_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub openrouter: OpenRouterConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}

#[derive(Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_models")]
    pub models: Vec<String>,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            models: default_models(),
        }
    }
}

impl std::fmt::Debug for OpenRouterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouterConfig")
            .field("api_key", &mask_secret(&self.api_key))
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("models", &self.models)
            .finish()
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_models() -> Vec<String> {
    DEFAULT_MODELS.iter().map(|m| m.to_string()).collect()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Inline system prompt; wins over `system_file`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Prompt file, relative paths resolve against the config directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_temperature() -> f64 {
    0.7
}
fn default_top_p() -> f64 {
    1.0
}
fn default_max_tokens() -> u32 {
    4096
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".relay")
}

impl RelayConfig {
    /// Load from `--config` or the default location.
    ///
    /// A missing default file falls back to built-in defaults; a missing
    /// explicit file is an error.
    pub fn load(custom_path: &Option<PathBuf>) -> Result<Self> {
        let path = custom_path
            .clone()
            .unwrap_or_else(|| config_dir().join("config.toml"));
        Self::load_from(&path, custom_path.is_some(), |name| std::env::var(name).ok())
    }

    fn load_from(
        path: &Path,
        explicit: bool,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let mut config = if path.exists() {
            Self::read_file(path, &lookup)?
        } else if explicit {
            return Err(anyhow!("Config file {} does not exist", path.display()));
        } else {
            debug!("No config at {}, using defaults", path.display());
            Self::default()
        };

        if config.openrouter.api_key.is_empty() {
            if let Some(key) = lookup(API_KEY_ENV).filter(|k| !k.is_empty()) {
                config.openrouter.api_key = key;
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path, lookup: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(metadata) = std::fs::metadata(path) {
                let mode = metadata.permissions().mode();
                if mode & 0o077 != 0 {
                    warn!(
                        "Config file {:?} is readable by other users ({:o}). \
                         It may contain secrets. Fix with: chmod 600 {:?}",
                        path,
                        mode & 0o777,
                        path
                    );
                }
            }
        }

        let content = std::fs::read_to_string(path).with_context(|| {
            format!(
                "Failed to read config at {}. Run `relay init` first.",
                path.display()
            )
        })?;

        let expanded = expand_env_vars(&content, lookup);

        let config: Self = toml::from_str(&expanded)
            .with_context(|| format!("Failed to parse config at {}", path.display()))?;

        if !config.openrouter.api_key.is_empty() && !content.contains("${") {
            warn!(
                "API key is hardcoded in config file. For security, use environment variables: api_key = \"${{{}}}\"",
                API_KEY_ENV
            );
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.openrouter.base_url)
            .with_context(|| format!("Invalid openrouter.base_url '{}'", self.openrouter.base_url))?;

        if self.openrouter.models.is_empty() {
            return Err(anyhow!("openrouter.models must list at least one model"));
        }
        if let Some(blank) = self.openrouter.models.iter().position(|m| m.trim().is_empty()) {
            return Err(anyhow!("openrouter.models[{}] is empty", blank));
        }
        if self.openrouter.timeout_secs == 0 {
            return Err(anyhow!("openrouter.timeout_secs must be greater than zero"));
        }

        self.bind_addr()?;

        for (name, value) in [
            ("temperature", self.defaults.temperature),
            ("top_p", self.defaults.top_p),
        ] {
            if !value.is_finite() {
                return Err(anyhow!("defaults.{} must be a finite number", name));
            }
        }

        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.server
            .bind
            .parse()
            .with_context(|| format!("Invalid server.bind '{}'", self.server.bind))
    }

    /// Resolve into the settings the relay runs with
    pub fn to_settings(&self, config_dir: &Path) -> Result<RelaySettings> {
        let system_prompt = match (&self.prompt.system, &self.prompt.system_file) {
            (Some(text), _) => text.clone(),
            (None, Some(file)) => {
                let path = config_dir.join(file);
                std::fs::read_to_string(&path).with_context(|| {
                    format!("Failed to read system prompt file {}", path.display())
                })?
            }
            (None, None) => relay_core::DEFAULT_SYSTEM_PROMPT.to_string(),
        };

        let number = |name: &str, value: f64| {
            Number::from_f64(value)
                .map(Value::Number)
                .ok_or_else(|| anyhow!("defaults.{} is not a number", name))
        };

        Ok(RelaySettings {
            api_key: Some(self.openrouter.api_key.clone()).filter(|k| !k.is_empty()),
            base_url: self.openrouter.base_url.clone(),
            attempt_timeout: Duration::from_secs(self.openrouter.timeout_secs),
            models: self
                .openrouter
                .models
                .iter()
                .map(|m| ModelCandidate::new(m.as_str()))
                .collect(),
            system_prompt,
            defaults: GenerationParams {
                temperature: number("temperature", self.defaults.temperature)?,
                top_p: number("top_p", self.defaults.top_p)?,
                max_tokens: Value::from(self.defaults.max_tokens),
            },
        })
    }

    /// Copy safe to print: the API key is masked
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.openrouter.api_key = mask_secret(&copy.openrouter.api_key);
        copy
    }
}

/// Allowlist of environment variable names that may be expanded in config files.
const ALLOWED_ENV_VARS: &[&str] = &[API_KEY_ENV, "HOME", "USER"];

/// Replace `${NAME}` references. Only allowlisted names are expanded, and
/// an unset variable expands to nothing; other references stay verbatim.
fn expand_env_vars(s: &str, lookup: &impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(open) = rest.find("${") {
        out.push_str(&rest[..open]);
        let reference = &rest[open..];
        let Some(close) = reference.find('}') else {
            out.push_str(reference);
            return out;
        };

        let name = &reference[2..close];
        if ALLOWED_ENV_VARS.contains(&name) {
            out.push_str(&lookup(name).unwrap_or_default());
        } else {
            warn!("Leaving ${{{}}} unexpanded in config: not an allowed variable", name);
            out.push_str(&reference[..=close]);
        }
        rest = &reference[close + 1..];
    }

    out.push_str(rest);
    out
}
