//! Acting-user extraction.
//!
//! Authentication happens upstream. The gateway forwards the authenticated
//! user in `x-user-id` and their course role in `x-user-role` (defaults to
//! `student`).

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use studybuddy_core::model::{Actor, Role};

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// The acting user for a request.
#[derive(Debug, Clone)]
pub struct CurrentActor(pub Actor);

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentActor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header(parts, USER_ID_HEADER)
            .ok_or_else(|| ApiError::Unauthenticated(format!("missing {USER_ID_HEADER} header")))?;
        let role = match header(parts, USER_ROLE_HEADER) {
            Some(raw) => raw.parse::<Role>().map_err(ApiError::BadRequest)?,
            None => Role::default(),
        };
        Ok(CurrentActor(Actor::new(user_id, role)))
    }
}
