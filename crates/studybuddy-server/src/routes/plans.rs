use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use studybuddy_core::model::{CourseAnswer, CourseId, StudyPlan};

use crate::auth::CurrentActor;
use crate::error::ApiResult;
use crate::state::AppState;

/// Study plan ordered by the caller's weakest topics.
pub async fn study_plan(
    CurrentActor(actor): CurrentActor,
    State(state): State<AppState>,
    Path(course_id): Path<String>,
) -> ApiResult<Json<StudyPlan>> {
    let plan = state
        .service
        .generate_study_plan(&actor, &CourseId::new(course_id))
        .await?;
    Ok(Json(plan))
}

#[derive(Debug, Deserialize)]
pub struct QuestionRequest {
    pub question: String,
}

pub async fn ask_question(
    CurrentActor(actor): CurrentActor,
    State(state): State<AppState>,
    Path(course_id): Path<String>,
    payload: Result<Json<QuestionRequest>, JsonRejection>,
) -> ApiResult<Json<CourseAnswer>> {
    let Json(request) = payload?;
    let answer = state
        .service
        .ask_question(&actor, &CourseId::new(course_id), &request.question)
        .await?;
    Ok(Json(answer))
}
