//! Error taxonomy for Study Buddy operations.
//!
//! `StudyBuddyError` is what every core operation returns. Generation
//! failures are split into `MalformedGenerationReply` (the provider answered
//! but the shape was wrong) and `Provider` (the provider could not answer) so
//! callers can choose a retry policy without string matching.

use thiserror::Error;

/// Errors that can occur when interacting with a generation provider.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// The API returned a 429 rate limit response.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Authentication failed (invalid API key).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The requested model was not found.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The API returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),
}

impl ProviderError {
    /// Returns `true` if this error is permanent and retrying is pointless.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ProviderError::AuthenticationFailed(_) | ProviderError::ModelNotFound(_)
        )
    }

    /// Returns the retry-after delay in milliseconds, if applicable.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            ProviderError::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }
}

/// Errors returned by Study Buddy core operations.
#[derive(Debug, Error)]
pub enum StudyBuddyError {
    /// A course, session or other addressed resource does not exist.
    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    /// The acting user does not own the resource or lacks the required role.
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// The requested lifecycle transition is not allowed from the current state.
    #[error("invalid state transition for {resource} {id}: {reason}")]
    InvalidStateTransition {
        resource: &'static str,
        id: String,
        reason: String,
    },

    /// The provider's reply did not match the expected schema.
    #[error("malformed generation reply: {0}")]
    MalformedGenerationReply(String),

    /// The generation provider was unreachable or returned an error.
    #[error("generation provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The generation call exceeded the configured deadline.
    #[error("generation timed out after {0}s")]
    GenerationTimeout(u64),

    /// The caller supplied malformed input.
    #[error("validation error: {0}")]
    Validation(String),

    /// A persistence collaborator failed.
    #[error("storage error: {0}")]
    Storage(String),
}

impl StudyBuddyError {
    pub fn not_found(resource: &'static str, id: impl Into<String>) -> Self {
        StudyBuddyError::NotFound {
            resource,
            id: id.into(),
        }
    }

    /// Stable machine-readable tag for this error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            StudyBuddyError::NotFound { .. } => "not_found",
            StudyBuddyError::NotAuthorized(_) => "not_authorized",
            StudyBuddyError::InvalidStateTransition { .. } => "invalid_state_transition",
            StudyBuddyError::MalformedGenerationReply(_) => "malformed_generation_reply",
            StudyBuddyError::Provider(_) => "provider_error",
            StudyBuddyError::GenerationTimeout(_) => "generation_timeout",
            StudyBuddyError::Validation(_) => "validation_error",
            StudyBuddyError::Storage(_) => "storage_error",
        }
    }

    /// Whether a caller may reasonably retry the same operation.
    ///
    /// Malformed replies are included: regenerating (possibly with a stricter
    /// prompt) can succeed where the previous reply did not.
    pub fn is_retryable(&self) -> bool {
        match self {
            StudyBuddyError::Provider(e) => !e.is_permanent(),
            StudyBuddyError::MalformedGenerationReply(_)
            | StudyBuddyError::GenerationTimeout(_) => true,
            _ => false,
        }
    }
}

pub type Result<T, E = StudyBuddyError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_classification() {
        assert!(ProviderError::AuthenticationFailed("bad key".into()).is_permanent());
        assert!(ProviderError::ModelNotFound("gpt-x".into()).is_permanent());
        assert!(!ProviderError::Timeout(30).is_permanent());
        assert_eq!(
            ProviderError::RateLimited {
                retry_after_ms: 5000
            }
            .retry_after_ms(),
            Some(5000)
        );
        assert_eq!(ProviderError::NetworkError("reset".into()).retry_after_ms(), None);
    }

    #[test]
    fn kinds_are_distinct_for_generation_failures() {
        let malformed = StudyBuddyError::MalformedGenerationReply("missing answer".into());
        let provider = StudyBuddyError::from(ProviderError::NetworkError("down".into()));
        assert_eq!(malformed.kind(), "malformed_generation_reply");
        assert_eq!(provider.kind(), "provider_error");
        assert!(malformed.is_retryable());
        assert!(provider.is_retryable());
    }

    #[test]
    fn permanent_provider_errors_are_not_retryable() {
        let err = StudyBuddyError::from(ProviderError::AuthenticationFailed("nope".into()));
        assert!(!err.is_retryable());
        assert!(!StudyBuddyError::not_found("course", "COMP999").is_retryable());
    }

    #[test]
    fn not_found_message() {
        let err = StudyBuddyError::not_found("session", "abc");
        assert_eq!(err.to_string(), "session not found: abc");
    }
}
