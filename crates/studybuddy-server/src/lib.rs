//! studybuddy-server — HTTP surface for the Study Buddy service.
//!
//! A thin axum layer: handlers extract the acting user from gateway
//! headers, call into [`StudyBuddyService`](studybuddy_core::StudyBuddyService)
//! and map its typed errors onto HTTP statuses.

pub mod auth;
pub mod error;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::AppState;
