use axum::extract::{Path, State};
use axum::Json;

use studybuddy_core::model::{CourseId, InstructorReport};

use crate::auth::CurrentActor;
use crate::error::ApiResult;
use crate::state::AppState;

/// Teaching guide built from class-wide progress. Instructors and admins only.
pub async fn instructor_report(
    CurrentActor(actor): CurrentActor,
    State(state): State<AppState>,
    Path(course_id): Path<String>,
) -> ApiResult<Json<InstructorReport>> {
    let report = state
        .service
        .generate_instructor_report(&actor, &CourseId::new(course_id))
        .await?;
    Ok(Json(report))
}
