use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use studybuddy_core::model::{CourseId, StudySession};

use crate::auth::CurrentActor;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    pub course_id: String,
    #[serde(default)]
    pub topics: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct EndSessionRequest {
    pub score: f64,
    #[serde(default)]
    pub feedback: Option<String>,
}

pub async fn start_session(
    CurrentActor(actor): CurrentActor,
    State(state): State<AppState>,
    payload: Result<Json<StartSessionRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<StudySession>)> {
    let Json(request) = payload?;
    let session = state
        .service
        .start_session(&actor, &CourseId::new(request.course_id), request.topics)
        .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn get_session(
    CurrentActor(actor): CurrentActor,
    State(state): State<AppState>,
    session_id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<StudySession>> {
    let Path(session_id) = session_id?;
    Ok(Json(state.service.get_session(&actor, session_id).await?))
}

/// Close an open session with a score and optional feedback.
pub async fn end_session(
    CurrentActor(actor): CurrentActor,
    State(state): State<AppState>,
    session_id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<EndSessionRequest>, JsonRejection>,
) -> ApiResult<Json<StudySession>> {
    let Path(session_id) = session_id?;
    let Json(request) = payload?;
    let session = state
        .service
        .end_session(&actor, session_id, request.score, request.feedback)
        .await?;
    Ok(Json(session))
}
