use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use studybuddy_core::model::{CourseId, StudyGuide};

use crate::auth::CurrentActor;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct StudyGuideRequest {
    /// Topics to cover; empty means every course topic.
    #[serde(default)]
    pub topics: Vec<String>,
}

/// Generate a study guide personalized to the caller's weak topics.
///
/// The body is optional; an empty one covers every course topic.
pub async fn generate_study_guide(
    CurrentActor(actor): CurrentActor,
    State(state): State<AppState>,
    Path(course_id): Path<String>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<StudyGuide>)> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        StudyGuideRequest::default()
    } else {
        let Json(request) = Json::<StudyGuideRequest>::from_bytes(&body)?;
        request
    };
    let guide = state
        .service
        .generate_study_guide(&actor, &CourseId::new(course_id), request.topics)
        .await?;
    Ok((StatusCode::CREATED, Json(guide)))
}

pub async fn list_guides(
    _actor: CurrentActor,
    State(state): State<AppState>,
    Path(course_id): Path<String>,
) -> ApiResult<Json<Vec<StudyGuide>>> {
    let guides = state.service.list_guides(&CourseId::new(course_id)).await?;
    Ok(Json(guides))
}
