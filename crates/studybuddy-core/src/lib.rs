//! studybuddy-core — Proficiency tracking and AI study-content orchestration.
//!
//! This crate defines the data model, error taxonomy and collaborator traits
//! for the Study Buddy service, along with the logic that turns per-topic
//! progress into personalized generation requests and validates the replies.

pub mod error;
pub mod model;
pub mod proficiency;
pub mod request;
pub mod response;
pub mod service;
pub mod session;
pub mod traits;
pub mod weak_topics;

pub use error::{ProviderError, StudyBuddyError};
pub use service::{Collaborators, ServiceConfig, StudyBuddyService};
