//! Configuration loading and provider factory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use studybuddy_core::traits::{GenerationProvider, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE};
use studybuddy_core::weak_topics::DEFAULT_MASTERY_THRESHOLD;

use crate::anthropic::AnthropicProvider;
use crate::mock::MockProvider;
use crate::ollama::{OllamaProvider, DEFAULT_BASE_URL as OLLAMA_BASE_URL};
use crate::openai::OpenAiProvider;

/// File name searched for in the working directory.
pub const CONFIG_FILE_NAME: &str = "studybuddy.toml";

/// Configuration for a single generation provider.
///
/// Note: Custom Debug impl masks API keys to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    OpenAI {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        org_id: Option<String>,
    },
    Anthropic {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
    },
    Ollama {
        #[serde(default = "default_ollama_url")]
        base_url: String,
    },
    Mock,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderConfig::OpenAI {
                api_key: _,
                base_url,
                org_id,
            } => f
                .debug_struct("OpenAI")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .field("org_id", org_id)
                .finish(),
            ProviderConfig::Anthropic {
                api_key: _,
                base_url,
            } => f
                .debug_struct("Anthropic")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .finish(),
            ProviderConfig::Ollama { base_url } => f
                .debug_struct("Ollama")
                .field("base_url", base_url)
                .finish(),
            ProviderConfig::Mock => f.write_str("Mock"),
        }
    }
}

fn default_ollama_url() -> String {
    OLLAMA_BASE_URL.to_string()
}

/// Top-level `studybuddy.toml` configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyBuddyConfig {
    /// Provider configurations keyed by name.
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    /// Provider used for generation.
    #[serde(default = "default_provider")]
    pub default_provider: String,
    /// Model requested from the provider; `None` uses the provider's default.
    #[serde(default)]
    pub default_model: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Topics scoring below this are weak.
    #[serde(default = "default_mastery_threshold")]
    pub mastery_threshold: f64,
    /// Deadline for one provider call; 0 disables it.
    #[serde(default = "default_generation_timeout")]
    pub generation_timeout_secs: u64,
    /// Address the HTTP server binds to.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Course catalog TOML, relative to the working directory.
    #[serde(default)]
    pub catalog: Option<PathBuf>,
    /// SQLite database URL, e.g. `sqlite://studybuddy.db`. Unset keeps all
    /// state in memory for the life of the process.
    #[serde(default)]
    pub database_url: Option<String>,
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}
fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}
fn default_mastery_threshold() -> f64 {
    DEFAULT_MASTERY_THRESHOLD
}
fn default_generation_timeout() -> u64 {
    60
}
fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

impl Default for StudyBuddyConfig {
    fn default() -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider(),
            default_model: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            mastery_threshold: default_mastery_threshold(),
            generation_timeout_secs: default_generation_timeout(),
            bind: default_bind(),
            catalog: None,
            database_url: None,
        }
    }
}

impl StudyBuddyConfig {
    /// Reject settings no provider call could honor.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.mastery_threshold) {
            anyhow::bail!(
                "mastery_threshold must be between 0.0 and 1.0, got {}",
                self.mastery_threshold
            );
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            anyhow::bail!(
                "temperature must be between 0.0 and 2.0, got {}",
                self.temperature
            );
        }
        if self.max_tokens == 0 {
            anyhow::bail!("max_tokens must be greater than zero");
        }
        if let Some(url) = &self.database_url {
            if !url.starts_with("sqlite:") {
                anyhow::bail!("database_url must be a sqlite: URL, got '{url}'");
            }
        }
        Ok(())
    }

    /// Instantiate the configured default provider.
    ///
    /// `mock` needs no `[providers.mock]` entry.
    pub fn default_generation_provider(&self) -> Result<Arc<dyn GenerationProvider>> {
        match self.providers.get(&self.default_provider) {
            Some(config) => create_provider(&self.default_provider, config),
            None if self.default_provider == "mock" => Ok(Arc::new(MockProvider::default())),
            None => anyhow::bail!(
                "provider '{}' is not configured. Add a [providers.{}] section to {}",
                self.default_provider,
                self.default_provider,
                CONFIG_FILE_NAME
            ),
        }
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
///
/// Unset variables resolve to the empty string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        result.push_str(&rest[..start]);
        let var_name = &rest[start + 2..start + len];
        result.push_str(&std::env::var(var_name).unwrap_or_default());
        rest = &rest[start + len + 1..];
    }
    result.push_str(rest);
    result
}

fn resolve_provider_config(config: &ProviderConfig) -> ProviderConfig {
    match config {
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
        } => ProviderConfig::OpenAI {
            api_key: resolve_env_vars(api_key),
            base_url: base_url.as_deref().map(resolve_env_vars),
            org_id: org_id.as_deref().map(resolve_env_vars),
        },
        ProviderConfig::Anthropic { api_key, base_url } => ProviderConfig::Anthropic {
            api_key: resolve_env_vars(api_key),
            base_url: base_url.as_deref().map(resolve_env_vars),
        },
        ProviderConfig::Ollama { base_url } => ProviderConfig::Ollama {
            base_url: resolve_env_vars(base_url),
        },
        ProviderConfig::Mock => ProviderConfig::Mock,
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `studybuddy.toml` in the current directory
/// 2. `~/.config/studybuddy/config.toml`
///
/// Environment variable overrides: `STUDYBUDDY_OPENAI_KEY`, `STUDYBUDDY_ANTHROPIC_KEY`,
/// `STUDYBUDDY_DATABASE_URL`.
pub fn load_config() -> Result<StudyBuddyConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<StudyBuddyConfig> {
    let config_path = match path {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => anyhow::bail!("config file not found: {}", p.display()),
        None => {
            let local = PathBuf::from(CONFIG_FILE_NAME);
            if local.exists() {
                Some(local)
            } else {
                dirs_path()
                    .map(|dir| dir.join("config.toml"))
                    .filter(|global| global.exists())
            }
        }
    };

    let mut config = match config_path {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading config");
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<StudyBuddyConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => StudyBuddyConfig::default(),
    };

    apply_env_overrides(&mut config);

    config.providers = config
        .providers
        .iter()
        .map(|(k, v)| (k.clone(), resolve_provider_config(v)))
        .collect();
    config.validate()?;

    Ok(config)
}

fn apply_env_overrides(config: &mut StudyBuddyConfig) {
    if let Ok(url) = std::env::var("STUDYBUDDY_DATABASE_URL") {
        config.database_url = Some(url);
    }

    if let Ok(key) = std::env::var("STUDYBUDDY_ANTHROPIC_KEY") {
        match config.providers.get_mut("anthropic") {
            Some(ProviderConfig::Anthropic { api_key, .. }) => *api_key = key,
            _ => {
                config.providers.insert(
                    "anthropic".into(),
                    ProviderConfig::Anthropic {
                        api_key: key,
                        base_url: None,
                    },
                );
            }
        }
    }

    if let Ok(key) = std::env::var("STUDYBUDDY_OPENAI_KEY") {
        match config.providers.get_mut("openai") {
            Some(ProviderConfig::OpenAI { api_key, .. }) => *api_key = key,
            _ => {
                config.providers.insert(
                    "openai".into(),
                    ProviderConfig::OpenAI {
                        api_key: key,
                        base_url: None,
                        org_id: None,
                    },
                );
            }
        }
    }
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("studybuddy"))
}

/// Create a provider instance from its configuration.
pub fn create_provider(name: &str, config: &ProviderConfig) -> Result<Arc<dyn GenerationProvider>> {
    let provider: Arc<dyn GenerationProvider> = match config {
        ProviderConfig::Anthropic { api_key, base_url } => {
            if api_key.is_empty() {
                anyhow::bail!("provider '{name}' has an empty api_key");
            }
            Arc::new(AnthropicProvider::new(api_key, base_url.clone()))
        }
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
        } => {
            if api_key.is_empty() {
                anyhow::bail!("provider '{name}' has an empty api_key");
            }
            Arc::new(OpenAiProvider::new(api_key, base_url.clone(), org_id.clone()))
        }
        ProviderConfig::Ollama { base_url } => Arc::new(OllamaProvider::new(base_url)),
        ProviderConfig::Mock => Arc::new(MockProvider::default()),
    };
    tracing::debug!(name, provider = provider.name(), "created provider");
    Ok(provider)
}
