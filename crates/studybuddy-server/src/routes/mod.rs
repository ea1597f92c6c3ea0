pub mod courses;
pub mod guides;
pub mod health;
pub mod plans;
pub mod problems;
pub mod progress;
pub mod reports;
pub mod sessions;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Creates the main API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api", api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Routes under the /api prefix.
fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(health::routes())
        .nest("/study-buddy", study_buddy_routes())
}

fn study_buddy_routes() -> Router<AppState> {
    Router::new()
        .route("/courses", get(courses::list_courses))
        .route("/courses/:course_id/topics", get(courses::course_topics))
        .route(
            "/courses/:course_id/practice-problems",
            get(problems::list_problems).post(problems::create_problem),
        )
        .route(
            "/courses/:course_id/practice-problems/generate",
            post(problems::generate_problems),
        )
        .route(
            "/courses/:course_id/study-guide",
            post(guides::generate_study_guide),
        )
        .route("/courses/:course_id/study-guides", get(guides::list_guides))
        .route("/courses/:course_id/study-plan", post(plans::study_plan))
        .route("/courses/:course_id/chat", post(plans::ask_question))
        .route(
            "/courses/:course_id/instructor-report",
            get(reports::instructor_report),
        )
        .route("/study-sessions", post(sessions::start_session))
        .route(
            "/study-sessions/:session_id",
            get(sessions::get_session).put(sessions::end_session),
        )
        .route("/progress/:course_id", get(progress::get_progress))
        .route("/progress/:course_id/attempts", post(progress::record_attempt))
        .route("/progress/:course_id/weak-topics", get(progress::weak_topics))
}
