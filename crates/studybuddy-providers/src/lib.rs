//! studybuddy-providers — Generation provider integrations.
//!
//! Implements the `GenerationProvider` trait for OpenAI, Anthropic and
//! Ollama, plus a deterministic mock, and loads the `studybuddy.toml`
//! configuration that selects between them.

pub mod anthropic;
pub mod config;
pub mod error;
mod http;
pub mod mock;
pub mod ollama;
pub mod openai;

pub use config::{
    create_provider, load_config, load_config_from, ProviderConfig, StudyBuddyConfig,
};
pub use error::ProviderError;
