//! Weak-topic selection.

use crate::model::StudentProgress;

/// Default mastery threshold; topics scoring below it are weak.
pub const DEFAULT_MASTERY_THRESHOLD: f64 = 0.7;

/// Topics whose proficiency is strictly below `threshold`, in input order.
///
/// An empty input yields an empty list: the caller has no personalization
/// data, which is not an error.
pub fn select_weak_topics(records: &[StudentProgress], threshold: f64) -> Vec<String> {
    records
        .iter()
        .filter(|r| r.proficiency_score < threshold)
        .map(|r| r.topic.clone())
        .collect()
}

/// Weak topics ordered weakest first. Ties keep input order.
pub fn weakest_first(records: &[StudentProgress], threshold: f64) -> Vec<String> {
    let mut weak: Vec<&StudentProgress> = records
        .iter()
        .filter(|r| r.proficiency_score < threshold)
        .collect();
    weak.sort_by(|a, b| a.proficiency_score.total_cmp(&b.proficiency_score));
    weak.into_iter().map(|r| r.topic.clone()).collect()
}
