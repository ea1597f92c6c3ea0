//! Study session state machine.
//!
//! ```text
//!   start ──► Open ──end──► Closed
//!                            │
//!                            └─end──► InvalidStateTransition
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::instrument;
use uuid::Uuid;

use crate::error::{Result, StudyBuddyError};
use crate::model::{CourseId, StudySession, UserId};
use crate::traits::{CourseDirectory, SessionStore};

/// Close an open session owned by `acting_user`.
pub fn close_session(
    mut session: StudySession,
    acting_user: &UserId,
    score: f64,
    feedback: Option<String>,
    now: DateTime<Utc>,
) -> Result<StudySession> {
    if &session.user_id != acting_user {
        return Err(StudyBuddyError::NotAuthorized(format!(
            "session {} belongs to another user",
            session.id
        )));
    }
    if session.is_closed() {
        return Err(StudyBuddyError::InvalidStateTransition {
            resource: "session",
            id: session.id.to_string(),
            reason: "session is already closed".into(),
        });
    }

    session.end_time = Some(now);
    session.score = Some(score);
    session.feedback = feedback;
    Ok(session)
}

fn validate_score(score: f64) -> Result<()> {
    if !score.is_finite() || !(0.0..=1.0).contains(&score) {
        return Err(StudyBuddyError::Validation(format!(
            "score must be between 0.0 and 1.0, got {score}"
        )));
    }
    Ok(())
}

/// Opens and closes study sessions.
pub struct StudySessionTracker {
    sessions: Arc<dyn SessionStore>,
    courses: Arc<dyn CourseDirectory>,
}

impl StudySessionTracker {
    pub fn new(sessions: Arc<dyn SessionStore>, courses: Arc<dyn CourseDirectory>) -> Self {
        Self { sessions, courses }
    }

    /// Open a session covering `topics`. Duplicate topics are dropped.
    #[instrument(skip(self, topics), fields(user = %user_id, course = %course_id))]
    pub async fn start(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
        topics: Vec<String>,
    ) -> Result<StudySession> {
        let course = self.courses.get_course(course_id).await?;

        let mut covered: Vec<String> = Vec::with_capacity(topics.len());
        for topic in topics {
            let topic = topic.trim().to_string();
            if topic.is_empty() || covered.contains(&topic) {
                continue;
            }
            if !course.topics.is_empty() && !course.has_topic(&topic) {
                return Err(StudyBuddyError::Validation(format!(
                    "topic '{topic}' is not part of course {course_id}"
                )));
            }
            covered.push(topic);
        }

        let session = StudySession {
            id: Uuid::new_v4(),
            user_id: user_id.clone(),
            course_id: course_id.clone(),
            start_time: Utc::now(),
            end_time: None,
            topics_covered: covered,
            score: None,
            feedback: None,
        };
        let session = self.sessions.save_session(session).await?;
        tracing::info!(session = %session.id, "study session started");
        Ok(session)
    }

    /// Close a session with a score in `[0.0, 1.0]` and optional feedback.
    ///
    /// Fails with `NotFound`, `NotAuthorized` or `InvalidStateTransition`;
    /// a rejected call leaves the stored session unchanged.
    #[instrument(skip(self, feedback), fields(acting = %acting_user))]
    pub async fn end(
        &self,
        session_id: Uuid,
        acting_user: &UserId,
        score: f64,
        feedback: Option<String>,
    ) -> Result<StudySession> {
        validate_score(score)?;
        let acting = acting_user.clone();
        let session = self
            .sessions
            .update_session(
                session_id,
                Box::new(move |session| close_session(session, &acting, score, feedback, Utc::now())),
            )
            .await?;
        tracing::info!(session = %session.id, score, "study session closed");
        Ok(session)
    }

    /// Fetch a session for its owner.
    pub async fn get(&self, session_id: Uuid, acting_user: &UserId) -> Result<StudySession> {
        let session = self
            .sessions
            .get_session(session_id)
            .await?
            .ok_or_else(|| StudyBuddyError::not_found("session", session_id.to_string()))?;
        if &session.user_id != acting_user {
            return Err(StudyBuddyError::NotAuthorized(format!(
                "session {session_id} belongs to another user"
            )));
        }
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_session() -> StudySession {
        StudySession {
            id: Uuid::new_v4(),
            user_id: "u1".into(),
            course_id: "COMP401".into(),
            start_time: Utc::now(),
            end_time: None,
            topics_covered: vec!["Arrays".into(), "Graphs".into()],
            score: None,
            feedback: None,
        }
    }

    #[test]
    fn owner_closes_open_session() {
        let closed = close_session(
            open_session(),
            &"u1".into(),
            0.9,
            Some("great".into()),
            Utc::now(),
        )
        .unwrap();
        assert!(closed.is_closed());
        assert_eq!(closed.score, Some(0.9));
        assert_eq!(closed.feedback.as_deref(), Some("great"));
        assert_eq!(closed.topics_covered, vec!["Arrays", "Graphs"]);
    }

    #[test]
    fn non_owner_is_rejected() {
        let err = close_session(open_session(), &"u2".into(), 0.5, None, Utc::now()).unwrap_err();
        assert!(matches!(err, StudyBuddyError::NotAuthorized(_)));
    }

    #[test]
    fn closing_twice_is_invalid() {
        let closed = close_session(open_session(), &"u1".into(), 0.9, None, Utc::now()).unwrap();
        let err = close_session(closed, &"u1".into(), 0.5, None, Utc::now()).unwrap_err();
        assert!(matches!(err, StudyBuddyError::InvalidStateTransition { .. }));
    }

    #[test]
    fn score_bounds() {
        assert!(validate_score(0.0).is_ok());
        assert!(validate_score(1.0).is_ok());
        assert!(validate_score(-0.1).is_err());
        assert!(validate_score(1.5).is_err());
        assert!(validate_score(f64::NAN).is_err());
    }
}
