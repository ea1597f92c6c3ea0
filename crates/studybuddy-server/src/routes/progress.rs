use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use studybuddy_core::model::{CourseId, StudentProgress};

use crate::auth::CurrentActor;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AttemptRequest {
    pub topic: String,
    pub was_correct: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct WeakTopicsQuery {
    #[serde(default)]
    pub threshold: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct WeakTopicsResponse {
    pub course_id: CourseId,
    pub threshold: f64,
    pub weak_topics: Vec<String>,
}

/// The caller's per-topic records for a course.
pub async fn get_progress(
    CurrentActor(actor): CurrentActor,
    State(state): State<AppState>,
    Path(course_id): Path<String>,
) -> ApiResult<Json<Vec<StudentProgress>>> {
    let records = state
        .service
        .progress(&actor, &CourseId::new(course_id))
        .await?;
    Ok(Json(records))
}

pub async fn record_attempt(
    CurrentActor(actor): CurrentActor,
    State(state): State<AppState>,
    Path(course_id): Path<String>,
    payload: Result<Json<AttemptRequest>, JsonRejection>,
) -> ApiResult<Json<StudentProgress>> {
    let Json(attempt) = payload?;
    let record = state
        .service
        .record_attempt(
            &actor,
            &CourseId::new(course_id),
            &attempt.topic,
            attempt.was_correct,
        )
        .await?;
    Ok(Json(record))
}

pub async fn weak_topics(
    CurrentActor(actor): CurrentActor,
    State(state): State<AppState>,
    Path(course_id): Path<String>,
    query: Result<Query<WeakTopicsQuery>, QueryRejection>,
) -> ApiResult<Json<WeakTopicsResponse>> {
    let Query(query) = query?;
    let course_id = CourseId::new(course_id);
    let threshold = query
        .threshold
        .unwrap_or(state.service.config().mastery_threshold);
    let weak_topics = state
        .service
        .weak_topics(&actor, &course_id, Some(threshold))
        .await?;
    Ok(Json(WeakTopicsResponse {
        course_id,
        threshold,
        weak_topics,
    }))
}
