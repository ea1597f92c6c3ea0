//! Mock provider for testing and offline demos.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use studybuddy_core::traits::{
    GenerationProvider, GenerationReply, GenerationRequest, ModelInfo, TokenUsage,
};

use crate::error::ProviderError;

const MOCK_MODEL: &str = "mock-model";

/// A deterministic generation provider.
///
/// Without configured responses it answers every request with a canned
/// reply matching the request's schema, so the full pipeline can run
/// without network access.
pub struct MockProvider {
    /// Map of prompt substring → reply content.
    responses: HashMap<String, String>,
    /// Reply used when no prompt matches; `None` means canned.
    default_response: Option<String>,
    failure: Option<ProviderError>,
    delay: Option<Duration>,
    call_count: AtomicU32,
    last_request: Mutex<Option<GenerationRequest>>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new(HashMap::new())
    }
}

impl MockProvider {
    /// Create a mock with prompt→reply mappings and canned fallbacks.
    pub fn new(responses: HashMap<String, String>) -> Self {
        Self {
            responses,
            default_response: None,
            failure: None,
            delay: None,
            call_count: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Create a mock that always returns the same reply content.
    pub fn with_fixed_response(response: &str) -> Self {
        Self {
            default_response: Some(response.to_string()),
            ..Self::default()
        }
    }

    /// Create a mock whose every call fails with `error`.
    pub fn failing(error: ProviderError) -> Self {
        Self {
            failure: Some(error),
            ..Self::default()
        }
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn last_request(&self) -> Option<GenerationRequest> {
        self.last_request
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn reply_for(&self, request: &GenerationRequest) -> String {
        if let Some((_, reply)) = self
            .responses
            .iter()
            .find(|(key, _)| request.user_prompt.contains(key.as_str()))
        {
            return reply.clone();
        }
        match &self.default_response {
            Some(reply) => reply.clone(),
            None => canned_reply(request),
        }
    }
}

/// Number of problems a prompt asks for ("Create N practice problems").
fn requested_count(prompt: &str) -> usize {
    prompt
        .split_once("Create ")
        .and_then(|(_, rest)| rest.split_whitespace().next())
        .and_then(|n| n.parse().ok())
        .unwrap_or(1)
}

/// Topics from a "Course topics: A, B" prompt line.
fn course_topics(prompt: &str) -> Vec<String> {
    let topics: Vec<String> = prompt
        .lines()
        .find_map(|line| line.strip_prefix("Course topics: "))
        .map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty() && *t != "any")
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    if topics.is_empty() {
        vec!["General".to_string()]
    } else {
        topics
    }
}

fn canned_reply(request: &GenerationRequest) -> String {
    let value = match request.schema.name.as_str() {
        "practice_problems" => {
            let problems: Vec<_> = (1..=requested_count(&request.user_prompt))
                .map(|i| {
                    json!({
                        "question_text": format!("Practice question {i}"),
                        "answer": format!("Answer {i}"),
                        "explanation": format!("Explanation for question {i}"),
                    })
                })
                .collect();
            json!({ "problems": problems })
        }
        "study_plan" => {
            let topics = course_topics(&request.user_prompt);
            let levels: Vec<_> = topics
                .iter()
                .map(|t| json!({ "topic": t, "level": "intermediate" }))
                .collect();
            json!({
                "topics": topics,
                "proficiency_levels": levels,
                "recommended_study_order": topics,
                "estimated_study_time": 30 * topics.len().max(1),
            })
        }
        "course_answer" => json!({
            "answer": "Generated offline.",
            "related_topics": [],
            "confidence_score": 0.5,
            "suggested_follow_up_questions": [],
        }),
        _ => json!({ "content": format!("# {}\n\nGenerated offline.", request.feature) }),
    };
    value.to_string()
}

#[async_trait]
impl GenerationProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationReply, ProviderError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        *self
            .last_request
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }

        let content = self.reply_for(request);
        let prompt_tokens = (request.user_prompt.len() / 4) as u32; // Rough estimate
        let completion_tokens = (content.len() / 4) as u32;

        Ok(GenerationReply {
            content,
            model: request
                .model
                .clone()
                .unwrap_or_else(|| MOCK_MODEL.to_string()),
            token_usage: TokenUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            },
            latency_ms: 1,
        })
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        vec![ModelInfo {
            id: MOCK_MODEL.into(),
            name: "Mock Model".into(),
            provider: "mock".into(),
            max_context: 100_000,
        }]
    }
}
