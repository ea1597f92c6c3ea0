//! Per-topic proficiency tracking and course-wide aggregates.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::{Result, StudyBuddyError};
use crate::model::{CourseId, ProgressKey, StudentProgress, UserId};
use crate::traits::ProgressStore;

/// Proficiency for `correct` out of `attempted`; 0.0 before the first attempt.
pub fn proficiency_score(attempted: u32, correct: u32) -> f64 {
    if attempted == 0 {
        return 0.0;
    }
    correct as f64 / attempted as f64
}

/// Apply one attempt outcome to an existing (or fresh) record.
pub fn apply_attempt(
    existing: Option<StudentProgress>,
    key: &ProgressKey,
    was_correct: bool,
    now: DateTime<Utc>,
) -> StudentProgress {
    let mut record = existing.unwrap_or_else(|| StudentProgress::empty(key, now));
    record.problems_attempted += 1;
    if was_correct {
        record.problems_correct += 1;
    }
    record.proficiency_score =
        proficiency_score(record.problems_attempted, record.problems_correct);
    record.last_updated = now;
    record
}

/// Records attempt outcomes against a [`ProgressStore`].
pub struct ProficiencyTracker {
    store: Arc<dyn ProgressStore>,
}

impl ProficiencyTracker {
    pub fn new(store: Arc<dyn ProgressStore>) -> Self {
        Self { store }
    }

    /// Record one attempt for `(user_id, course_id, topic)` and return the updated record.
    #[instrument(skip(self), fields(user = %user_id, course = %course_id))]
    pub async fn record_attempt(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
        topic: &str,
        was_correct: bool,
    ) -> Result<StudentProgress> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(StudyBuddyError::Validation("topic must not be empty".into()));
        }

        let key = ProgressKey::new(user_id.clone(), course_id.clone(), topic);
        let update_key = key.clone();
        let record = self
            .store
            .update_progress(
                &key,
                Box::new(move |existing| {
                    apply_attempt(existing, &update_key, was_correct, Utc::now())
                }),
            )
            .await?;

        tracing::debug!(
            topic = %record.topic,
            attempted = record.problems_attempted,
            correct = record.problems_correct,
            score = record.proficiency_score,
            "recorded attempt"
        );
        Ok(record)
    }

    /// One user's records for a course.
    pub async fn progress(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
    ) -> Result<Vec<StudentProgress>> {
        self.store.get_progress(user_id, course_id).await
    }

    /// Every learner's records for a course.
    pub async fn course_progress(&self, course_id: &CourseId) -> Result<Vec<StudentProgress>> {
        self.store.course_progress(course_id).await
    }
}

/// Class-wide statistics for one topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicSummary {
    pub topic: String,
    /// Number of learners with a record for this topic.
    pub learners: usize,
    /// Mean of the learners' proficiency scores.
    pub mean_proficiency: f64,
    pub problems_attempted: u64,
    pub problems_correct: u64,
}

/// Aggregate records per topic, in order of first appearance.
pub fn topic_summaries(records: &[StudentProgress]) -> Vec<TopicSummary> {
    let mut order: Vec<&str> = Vec::new();
    let mut grouped: HashMap<&str, Vec<&StudentProgress>> = HashMap::new();
    for r in records {
        let entry = grouped.entry(r.topic.as_str()).or_default();
        if entry.is_empty() {
            order.push(r.topic.as_str());
        }
        entry.push(r);
    }

    order
        .into_iter()
        .map(|topic| {
            let group = &grouped[topic];
            let learners = group.len();
            let mean_proficiency =
                group.iter().map(|r| r.proficiency_score).sum::<f64>() / learners as f64;
            TopicSummary {
                topic: topic.to_string(),
                learners,
                mean_proficiency,
                problems_attempted: group.iter().map(|r| r.problems_attempted as u64).sum(),
                problems_correct: group.iter().map(|r| r.problems_correct as u64).sum(),
            }
        })
        .collect()
}
