use axum::extract::{Path, State};
use axum::Json;

use studybuddy_core::model::{Course, CourseId};

use crate::auth::CurrentActor;
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn list_courses(
    _actor: CurrentActor,
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<Course>>> {
    Ok(Json(state.service.list_courses().await?))
}

pub async fn course_topics(
    _actor: CurrentActor,
    State(state): State<AppState>,
    Path(course_id): Path<String>,
) -> ApiResult<Json<Vec<String>>> {
    let topics = state
        .service
        .course_topics(&CourseId::new(course_id))
        .await?;
    Ok(Json(topics))
}
