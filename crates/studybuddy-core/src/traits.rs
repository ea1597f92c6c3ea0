//! Collaborator trait definitions.
//!
//! The core never talks to a database or an LLM directly. Generation goes
//! through [`GenerationProvider`] (implemented in `studybuddy-providers`),
//! and records flow through the store traits (implemented in
//! `studybuddy-store`, or by any transactional backend).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ProviderError, Result};
use crate::model::{
    AuditLogEntry, Course, CourseId, Feature, PracticeProblem, ProblemFilter, ProgressKey,
    StudentProgress, StudyGuide, StudySession, UserId,
};

// ---------------------------------------------------------------------------
// Generation provider
// ---------------------------------------------------------------------------

/// Trait for language-model backends that produce structured study content.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Human-readable provider name (e.g. "openai").
    fn name(&self) -> &str;

    /// Send one generation request. Never retried by the caller's core.
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> std::result::Result<GenerationReply, ProviderError>;

    /// List available models for this provider.
    fn available_models(&self) -> Vec<ModelInfo>;
}

/// Expected JSON shape of a reply, in JSON Schema form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplySchema {
    /// Short identifier, used by providers that require a schema name.
    pub name: String,
    /// The JSON Schema document.
    pub schema: serde_json::Value,
}

/// A fully built request for the generation provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Feature that issued the call, for auditing.
    pub feature: Feature,
    /// Instruction framing the assistant's role.
    pub system_prompt: String,
    /// The task itself.
    pub user_prompt: String,
    /// Shape the reply must honor.
    pub schema: ReplySchema,
    /// Model override; `None` uses the provider default.
    #[serde(default)]
    pub model: Option<String>,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
}

/// Default max tokens per generation call.
pub const DEFAULT_MAX_TOKENS: u32 = 1000;

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f64 = 0.7;

impl GenerationRequest {
    pub fn new(
        feature: Feature,
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
        schema: ReplySchema,
    ) -> Self {
        Self {
            feature,
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            schema,
            model: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    /// Apply model and sampling settings.
    pub fn with_sampling(mut self, model: Option<String>, max_tokens: u32, temperature: f64) -> Self {
        self.model = model;
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }
}

/// Raw reply from the generation provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationReply {
    /// The reply text; expected to be a JSON document.
    pub content: String,
    /// Model that actually produced the reply.
    pub model: String,
    /// Token usage.
    pub token_usage: TokenUsage,
    /// Latency in milliseconds.
    pub latency_ms: u64,
}

/// Token accounting for one generation call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Information about an available model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model identifier.
    pub id: String,
    /// Human-readable model name.
    pub name: String,
    /// Provider name.
    pub provider: String,
    /// Maximum context window size in tokens.
    pub max_context: u32,
}

// ---------------------------------------------------------------------------
// Stores
// ---------------------------------------------------------------------------

/// Read-modify-write step for a progress record; receives the current record, if any.
pub type ProgressUpdate = Box<dyn FnOnce(Option<StudentProgress>) -> StudentProgress + Send>;

/// Transition step for a session; may reject the transition.
pub type SessionUpdate = Box<dyn FnOnce(StudySession) -> Result<StudySession> + Send>;

/// Read-only course reference data.
#[async_trait]
pub trait CourseDirectory: Send + Sync {
    /// Fails with `NotFound` for an unknown id.
    async fn get_course(&self, id: &CourseId) -> Result<Course>;

    async fn list_courses(&self) -> Result<Vec<Course>>;
}

/// Per-(user, course, topic) progress records.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// All of one user's records for a course, in topic insertion order.
    async fn get_progress(&self, user_id: &UserId, course_id: &CourseId)
        -> Result<Vec<StudentProgress>>;

    /// Every learner's records for a course.
    async fn course_progress(&self, course_id: &CourseId) -> Result<Vec<StudentProgress>>;

    /// Insert or replace the record for `record.key()`.
    async fn upsert_progress(&self, record: StudentProgress) -> Result<StudentProgress>;

    /// Atomically read, transform and write the record for `key`.
    ///
    /// Implementations must serialize concurrent updates to the same key.
    async fn update_progress(&self, key: &ProgressKey, apply: ProgressUpdate)
        -> Result<StudentProgress>;
}

/// Study session records.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get_session(&self, id: Uuid) -> Result<Option<StudySession>>;

    async fn save_session(&self, session: StudySession) -> Result<StudySession>;

    /// Atomically apply a transition to a stored session.
    ///
    /// Fails with `NotFound` for an unknown id. When `apply` returns an error
    /// the stored session is left untouched.
    async fn update_session(&self, id: Uuid, apply: SessionUpdate) -> Result<StudySession>;
}

/// Generated and authored content.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn save_problems(&self, problems: Vec<PracticeProblem>) -> Result<Vec<PracticeProblem>>;

    async fn list_problems(
        &self,
        course_id: &CourseId,
        filter: &ProblemFilter,
    ) -> Result<Vec<PracticeProblem>>;

    async fn save_guide(&self, guide: StudyGuide) -> Result<StudyGuide>;

    async fn list_guides(&self, course_id: &CourseId) -> Result<Vec<StudyGuide>>;
}

/// Append-only record of provider calls.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: AuditLogEntry) -> anyhow::Result<()>;
}

// ---------------------------------------------------------------------------
// Reply extraction
// ---------------------------------------------------------------------------

/// Extract a JSON document from a possibly markdown-wrapped reply.
///
/// Handles:
/// - A raw JSON document (returned trimmed)
/// - A single ```json``` or generic ``` fenced block
/// - An unclosed fence from a truncated reply
pub fn extract_json_from_markdown(reply: &str) -> &str {
    let trimmed = reply.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return trimmed;
    }

    let Some(fence) = trimmed.find("```") else {
        return trimmed;
    };
    let after_fence = &trimmed[fence + 3..];
    // Skip the info string ("json", "JSON", or nothing) up to the newline.
    let body = match after_fence.find('\n') {
        Some(nl) => {
            let lang = after_fence[..nl].trim().to_lowercase();
            if lang.is_empty() || lang == "json" {
                &after_fence[nl + 1..]
            } else {
                return trimmed;
            }
        }
        None => return trimmed,
    };

    match body.find("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}
