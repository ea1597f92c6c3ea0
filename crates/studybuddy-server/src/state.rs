use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use studybuddy_core::model::Course;
use studybuddy_core::{Collaborators, ServiceConfig, StudyBuddyService};
use studybuddy_providers::StudyBuddyConfig;
use studybuddy_store::{MemoryStore, SqliteStore, TracingAuditSink};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<StudyBuddyService>,
}

impl AppState {
    pub fn new(service: StudyBuddyService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }

    /// Wire a deployment from loaded configuration.
    ///
    /// With `database_url` set, progress, sessions, content and the audit
    /// trail persist in SQLite; otherwise they live in memory.
    pub async fn from_config(config: &StudyBuddyConfig, courses: Vec<Course>) -> Result<Self> {
        let provider = config.default_generation_provider()?;

        let collaborators = match &config.database_url {
            Some(url) => {
                let store = Arc::new(
                    SqliteStore::connect(url, courses)
                        .await
                        .with_context(|| format!("failed to open database {url}"))?,
                );
                Collaborators {
                    courses: store.clone(),
                    progress: store.clone(),
                    sessions: store.clone(),
                    content: store.clone(),
                    provider,
                    audit: Arc::new(TracingAuditSink::new(store)),
                }
            }
            None => {
                tracing::warn!("no database_url configured; state will not survive a restart");
                let store = Arc::new(MemoryStore::with_courses(courses));
                Collaborators {
                    courses: store.clone(),
                    progress: store.clone(),
                    sessions: store.clone(),
                    content: store.clone(),
                    provider,
                    audit: Arc::new(TracingAuditSink::new(store)),
                }
            }
        };
        Ok(Self::new(StudyBuddyService::new(
            collaborators,
            service_config(config),
        )))
    }
}

/// Service settings derived from `studybuddy.toml`.
pub fn service_config(config: &StudyBuddyConfig) -> ServiceConfig {
    ServiceConfig {
        mastery_threshold: config.mastery_threshold,
        model: config.default_model.clone(),
        max_tokens: config.max_tokens,
        temperature: config.temperature,
        generation_timeout: (config.generation_timeout_secs > 0)
            .then(|| Duration::from_secs(config.generation_timeout_secs)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_timeout_disables_deadline() {
        let config = StudyBuddyConfig {
            generation_timeout_secs: 0,
            ..StudyBuddyConfig::default()
        };
        assert_eq!(service_config(&config).generation_timeout, None);
    }

    #[tokio::test]
    async fn settings_carry_over() {
        let config = StudyBuddyConfig {
            default_provider: "mock".into(),
            default_model: Some("gpt-4o".into()),
            mastery_threshold: 0.8,
            ..StudyBuddyConfig::default()
        };
        let service = service_config(&config);
        assert_eq!(service.mastery_threshold, 0.8);
        assert_eq!(service.model.as_deref(), Some("gpt-4o"));
        assert_eq!(service.generation_timeout, Some(Duration::from_secs(60)));

        let state = AppState::from_config(&config, vec![]).await.unwrap();
        assert_eq!(state.service.provider_name(), "mock");
    }

    #[tokio::test]
    async fn unreachable_database_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let config = StudyBuddyConfig {
            default_provider: "mock".into(),
            database_url: Some(format!(
                "sqlite://{}",
                dir.path().join("missing").join("studybuddy.db").display()
            )),
            ..StudyBuddyConfig::default()
        };
        let err = AppState::from_config(&config, vec![]).await.err().unwrap();
        assert!(format!("{err:#}").contains("failed to open database"));
    }
}
