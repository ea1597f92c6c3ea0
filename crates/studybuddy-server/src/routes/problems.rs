use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;

use studybuddy_core::model::{CourseId, PracticeProblem, ProblemFilter};
use studybuddy_core::service::{NewPracticeProblem, ProblemRequest};

use crate::auth::CurrentActor;
use crate::error::ApiResult;
use crate::state::AppState;

/// Stored problems, filtered by `topic`, `difficulty` and `question_type`.
pub async fn list_problems(
    _actor: CurrentActor,
    State(state): State<AppState>,
    Path(course_id): Path<String>,
    filter: Result<Query<ProblemFilter>, QueryRejection>,
) -> ApiResult<Json<Vec<PracticeProblem>>> {
    let Query(filter) = filter?;
    let problems = state
        .service
        .list_problems(&CourseId::new(course_id), &filter)
        .await?;
    Ok(Json(problems))
}

/// Author a problem by hand. Instructors and admins only.
pub async fn create_problem(
    CurrentActor(actor): CurrentActor,
    State(state): State<AppState>,
    Path(course_id): Path<String>,
    payload: Result<Json<NewPracticeProblem>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<PracticeProblem>)> {
    let Json(problem) = payload?;
    let created = state
        .service
        .create_problem(&actor, &CourseId::new(course_id), problem)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn generate_problems(
    CurrentActor(actor): CurrentActor,
    State(state): State<AppState>,
    Path(course_id): Path<String>,
    payload: Result<Json<ProblemRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Vec<PracticeProblem>>)> {
    let Json(params) = payload?;
    let problems = state
        .service
        .generate_practice_problems(&actor, &CourseId::new(course_id), params)
        .await?;
    Ok((StatusCode::CREATED, Json(problems)))
}
