//! Core data model types for Study Buddy.
//!
//! Records here are plain values: the core receives copies from the store
//! collaborators, computes, and hands back new copies.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Opaque course identifier (e.g. "COMP401").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CourseId(String);

impl CourseId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CourseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CourseId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Opaque user identifier asserted by the identity service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Actors
// ---------------------------------------------------------------------------

/// Role of the acting user within the course-management application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Student,
    Instructor,
    Admin,
}

impl Role {
    /// Instructors and admins may author problems and read instructor reports.
    pub fn is_staff(self) -> bool {
        matches!(self, Role::Instructor | Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Student => write!(f, "student"),
            Role::Instructor => write!(f, "instructor"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "instructor" | "ta" => Ok(Role::Instructor),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// The authenticated user performing an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: UserId::new(user_id),
            role,
        }
    }

    pub fn student(user_id: impl Into<String>) -> Self {
        Self::new(user_id, Role::Student)
    }
}

// ---------------------------------------------------------------------------
// Problem attributes
// ---------------------------------------------------------------------------

/// Difficulty of a practice problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Difficulty::Easy => write!(f, "easy"),
            Difficulty::Medium => write!(f, "medium"),
            Difficulty::Hard => write!(f, "hard"),
        }
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(format!("unknown difficulty: {other}")),
        }
    }
}

/// Kind of question a practice problem asks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    ShortAnswer,
    MultipleChoice,
    FreeResponse,
    Coding,
}

impl fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuestionKind::ShortAnswer => write!(f, "short_answer"),
            QuestionKind::MultipleChoice => write!(f, "multiple_choice"),
            QuestionKind::FreeResponse => write!(f, "free_response"),
            QuestionKind::Coding => write!(f, "coding"),
        }
    }
}

impl FromStr for QuestionKind {
    type Err = String;

    /// Accepts `multiple_choice`, `multiple-choice` and `Multiple Choice` alike.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "short_answer" => Ok(QuestionKind::ShortAnswer),
            "multiple_choice" => Ok(QuestionKind::MultipleChoice),
            "free_response" => Ok(QuestionKind::FreeResponse),
            "coding" | "code" => Ok(QuestionKind::Coding),
            _ => Err(format!("unknown question type: {}", s.trim())),
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A course and its ordered topic list. Read-only reference data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub topics: Vec<String>,
}

impl Course {
    pub fn has_topic(&self, topic: &str) -> bool {
        self.topics.iter().any(|t| t == topic)
    }
}

/// A single practice problem, generated or instructor-authored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PracticeProblem {
    pub id: Uuid,
    pub course_id: CourseId,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub question_type: Option<QuestionKind>,
    pub question_text: String,
    pub answer: String,
    pub explanation: String,
    pub created_at: DateTime<Utc>,
}

/// Filters for listing or generating practice problems.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProblemFilter {
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub question_type: Option<QuestionKind>,
}

impl ProblemFilter {
    pub fn matches(&self, problem: &PracticeProblem) -> bool {
        let topic_ok = self
            .topic
            .as_ref()
            .map_or(true, |t| problem.topic.as_deref() == Some(t.as_str()));
        let difficulty_ok = self
            .difficulty
            .map_or(true, |d| problem.difficulty == Some(d));
        let kind_ok = self
            .question_type
            .map_or(true, |k| problem.question_type == Some(k));
        topic_ok && difficulty_ok && kind_ok
    }
}

/// Lifecycle state of a study session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Open,
    Closed,
}

/// A bounded interval of study activity for one user and course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudySession {
    pub id: Uuid,
    pub user_id: UserId,
    pub course_id: CourseId,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub topics_covered: Vec<String>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub feedback: Option<String>,
}

impl StudySession {
    pub fn state(&self) -> SessionState {
        if self.end_time.is_some() {
            SessionState::Closed
        } else {
            SessionState::Open
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state() == SessionState::Closed
    }
}

/// Unique key of a progress record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProgressKey {
    pub user_id: UserId,
    pub course_id: CourseId,
    pub topic: String,
}

impl ProgressKey {
    pub fn new(user_id: UserId, course_id: CourseId, topic: impl Into<String>) -> Self {
        Self {
            user_id,
            course_id,
            topic: topic.into(),
        }
    }
}

/// Per-student, per-topic mastery record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentProgress {
    pub id: Uuid,
    pub user_id: UserId,
    pub course_id: CourseId,
    pub topic: String,
    /// `problems_correct / problems_attempted`, or 0.0 before the first attempt.
    pub proficiency_score: f64,
    pub problems_attempted: u32,
    pub problems_correct: u32,
    pub last_updated: DateTime<Utc>,
}

impl StudentProgress {
    /// A fresh record with no attempts.
    pub fn empty(key: &ProgressKey, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: key.user_id.clone(),
            course_id: key.course_id.clone(),
            topic: key.topic.clone(),
            proficiency_score: 0.0,
            problems_attempted: 0,
            problems_correct: 0,
            last_updated: now,
        }
    }

    pub fn key(&self) -> ProgressKey {
        ProgressKey::new(self.user_id.clone(), self.course_id.clone(), &self.topic)
    }
}

/// A generated, markdown-formatted study guide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyGuide {
    pub id: Uuid,
    pub course_id: CourseId,
    /// Topic label; several topic names are joined with ", ".
    pub topic: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A generated teaching guide for course staff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstructorReport {
    pub course_id: CourseId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Standing on a topic within a study plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProficiencyLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl ProficiencyLevel {
    /// Level for a recorded score: below half of `threshold` is beginner,
    /// below `threshold` intermediate, otherwise advanced.
    pub fn from_score(score: f64, threshold: f64) -> Self {
        if score < threshold / 2.0 {
            ProficiencyLevel::Beginner
        } else if score < threshold {
            ProficiencyLevel::Intermediate
        } else {
            ProficiencyLevel::Advanced
        }
    }
}

impl fmt::Display for ProficiencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProficiencyLevel::Beginner => write!(f, "beginner"),
            ProficiencyLevel::Intermediate => write!(f, "intermediate"),
            ProficiencyLevel::Advanced => write!(f, "advanced"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicProficiency {
    pub topic: String,
    pub level: ProficiencyLevel,
}

/// A generated, ordered study plan for one learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyPlan {
    pub course_id: CourseId,
    pub topics: Vec<String>,
    pub proficiency_levels: Vec<TopicProficiency>,
    /// Weakest topics first.
    pub recommended_study_order: Vec<String>,
    /// Minutes.
    pub estimated_study_time: u32,
    pub created_at: DateTime<Utc>,
}

/// Answer to a free-form course question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseAnswer {
    pub course_id: CourseId,
    pub question: String,
    pub answer: String,
    pub related_topics: Vec<String>,
    /// Self-reported confidence in [0, 1].
    pub confidence_score: f64,
    pub suggested_follow_up_questions: Vec<String>,
}

// ---------------------------------------------------------------------------
// Auditing
// ---------------------------------------------------------------------------

/// Which generation feature issued a provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    PracticeProblems,
    StudyGuide,
    InstructorReport,
    StudyPlan,
    CourseChat,
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Feature::PracticeProblems => write!(f, "practice_problems"),
            Feature::StudyGuide => write!(f, "study_guide"),
            Feature::InstructorReport => write!(f, "instructor_report"),
            Feature::StudyPlan => write!(f, "study_plan"),
            Feature::CourseChat => write!(f, "course_chat"),
        }
    }
}

impl FromStr for Feature {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "practice_problems" => Ok(Feature::PracticeProblems),
            "study_guide" => Ok(Feature::StudyGuide),
            "instructor_report" => Ok(Feature::InstructorReport),
            "study_plan" => Ok(Feature::StudyPlan),
            "course_chat" => Ok(Feature::CourseChat),
            other => Err(format!("unknown feature: {other}")),
        }
    }
}

/// One provider call, recorded for traceability. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub user_id: UserId,
    pub feature: Feature,
    pub prompt: String,
    pub response: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    pub fn new(
        user_id: UserId,
        feature: Feature,
        prompt: impl Into<String>,
        response: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            feature,
            prompt: prompt.into(),
            response,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difficulty_display_and_parse() {
        assert_eq!(Difficulty::Medium.to_string(), "medium");
        assert_eq!("Hard".parse::<Difficulty>().unwrap(), Difficulty::Hard);
        assert!("impossible".parse::<Difficulty>().is_err());
    }

    #[test]
    fn question_kind_accepts_loose_spellings() {
        assert_eq!(
            "Multiple Choice".parse::<QuestionKind>().unwrap(),
            QuestionKind::MultipleChoice
        );
        assert_eq!(
            "free-response".parse::<QuestionKind>().unwrap(),
            QuestionKind::FreeResponse
        );
        assert_eq!("code".parse::<QuestionKind>().unwrap(), QuestionKind::Coding);
        assert!("essay".parse::<QuestionKind>().is_err());
        assert_eq!(QuestionKind::ShortAnswer.to_string(), "short_answer");
    }

    #[test]
    fn role_parse_and_staff() {
        assert_eq!("TA".parse::<Role>().unwrap(), Role::Instructor);
        assert!(Role::Admin.is_staff());
        assert!(!Role::Student.is_staff());
        assert!("dean".parse::<Role>().is_err());
    }

    #[test]
    fn session_state_follows_end_time() {
        let mut session = StudySession {
            id: Uuid::new_v4(),
            user_id: "u1".into(),
            course_id: "COMP401".into(),
            start_time: Utc::now(),
            end_time: None,
            topics_covered: vec![],
            score: None,
            feedback: None,
        };
        assert_eq!(session.state(), SessionState::Open);
        session.end_time = Some(Utc::now());
        assert!(session.is_closed());
    }

    #[test]
    fn problem_filter_matching() {
        let problem = PracticeProblem {
            id: Uuid::new_v4(),
            course_id: "COMP401".into(),
            topic: Some("Graphs".into()),
            difficulty: Some(Difficulty::Hard),
            question_type: Some(QuestionKind::Coding),
            question_text: "q".into(),
            answer: "a".into(),
            explanation: "e".into(),
            created_at: Utc::now(),
        };
        assert!(ProblemFilter::default().matches(&problem));
        assert!(ProblemFilter {
            topic: Some("Graphs".into()),
            difficulty: Some(Difficulty::Hard),
            question_type: None,
        }
        .matches(&problem));
        assert!(!ProblemFilter {
            difficulty: Some(Difficulty::Easy),
            ..Default::default()
        }
        .matches(&problem));
    }

    #[test]
    fn ids_serialize_transparently() {
        let json = serde_json::to_string(&CourseId::new("COMP401")).unwrap();
        assert_eq!(json, "\"COMP401\"");
        let user: UserId = serde_json::from_str("\"u-7\"").unwrap();
        assert_eq!(user.as_str(), "u-7");
    }

    #[test]
    fn proficiency_levels_split_on_threshold() {
        assert_eq!(ProficiencyLevel::from_score(0.2, 0.7), ProficiencyLevel::Beginner);
        assert_eq!(ProficiencyLevel::from_score(0.5, 0.7), ProficiencyLevel::Intermediate);
        assert_eq!(ProficiencyLevel::from_score(0.7, 0.7), ProficiencyLevel::Advanced);
        let json = serde_json::to_string(&ProficiencyLevel::Intermediate).unwrap();
        assert_eq!(json, "\"intermediate\"");
    }

    #[test]
    fn features_parse_their_display_form() {
        for feature in [
            Feature::PracticeProblems,
            Feature::StudyGuide,
            Feature::InstructorReport,
            Feature::StudyPlan,
            Feature::CourseChat,
        ] {
            assert_eq!(feature.to_string().parse::<Feature>().unwrap(), feature);
        }
        assert!("quiz".parse::<Feature>().is_err());
    }
}
