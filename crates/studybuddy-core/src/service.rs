//! Study Buddy service orchestrator.
//!
//! Wires the proficiency tracker, weak-topic selector, request builder,
//! generation provider, response mapper and session tracker together. All
//! collaborators are injected; the service holds no global state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use crate::error::{Result, StudyBuddyError};
use crate::model::{
    Actor, AuditLogEntry, Course, CourseAnswer, CourseId, Difficulty, InstructorReport,
    PracticeProblem, ProblemFilter, QuestionKind, StudentProgress, StudyGuide, StudyPlan,
    StudySession,
};
use crate::proficiency::{topic_summaries, ProficiencyTracker};
use crate::request::{
    build_course_question_request, build_instructor_report_request, build_practice_problem_request,
    build_study_guide_request, build_study_plan_request, DEFAULT_PROBLEM_COUNT,
    MAX_QUESTION_CHARS,
};
use crate::response::{
    map_course_answer, map_instructor_report, map_practice_problems, map_study_guide,
    map_study_plan,
};
use crate::session::StudySessionTracker;
use crate::traits::{
    extract_json_from_markdown, AuditSink, ContentStore, CourseDirectory, GenerationProvider,
    GenerationReply, GenerationRequest, ProgressStore, SessionStore, DEFAULT_MAX_TOKENS,
    DEFAULT_TEMPERATURE,
};
use crate::weak_topics::{select_weak_topics, weakest_first, DEFAULT_MASTERY_THRESHOLD};

/// Upper bound on a single audit write.
const AUDIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for the service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Topics scoring below this are weak.
    pub mastery_threshold: f64,
    /// Model override passed to the provider.
    pub model: Option<String>,
    /// Max tokens for generation.
    pub max_tokens: u32,
    /// Temperature for generation.
    pub temperature: f64,
    /// Deadline for a single provider call; `None` waits indefinitely.
    pub generation_timeout: Option<Duration>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            mastery_threshold: DEFAULT_MASTERY_THRESHOLD,
            model: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            generation_timeout: Some(Duration::from_secs(60)),
        }
    }
}

/// Injected collaborators.
#[derive(Clone)]
pub struct Collaborators {
    pub courses: Arc<dyn CourseDirectory>,
    pub progress: Arc<dyn ProgressStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub content: Arc<dyn ContentStore>,
    pub provider: Arc<dyn GenerationProvider>,
    pub audit: Arc<dyn AuditSink>,
}

/// Parameters for a practice-problem generation call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProblemRequest {
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub question_type: Option<QuestionKind>,
    /// Requested count; clamped by the request builder. Defaults to 5.
    #[serde(default)]
    pub count: Option<i64>,
}

/// An instructor-authored practice problem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPracticeProblem {
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub question_type: Option<QuestionKind>,
    pub question_text: String,
    pub answer: String,
    #[serde(default)]
    pub explanation: String,
}

/// The Study Buddy service.
pub struct StudyBuddyService {
    courses: Arc<dyn CourseDirectory>,
    content: Arc<dyn ContentStore>,
    provider: Arc<dyn GenerationProvider>,
    audit: Arc<dyn AuditSink>,
    tracker: ProficiencyTracker,
    sessions: StudySessionTracker,
    config: ServiceConfig,
}

impl StudyBuddyService {
    pub fn new(collaborators: Collaborators, config: ServiceConfig) -> Self {
        let Collaborators {
            courses,
            progress,
            sessions,
            content,
            provider,
            audit,
        } = collaborators;
        Self {
            tracker: ProficiencyTracker::new(progress),
            sessions: StudySessionTracker::new(sessions, Arc::clone(&courses)),
            courses,
            content,
            provider,
            audit,
            config,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    // -----------------------------------------------------------------------
    // Courses
    // -----------------------------------------------------------------------

    pub async fn list_courses(&self) -> Result<Vec<Course>> {
        self.courses.list_courses().await
    }

    pub async fn course_topics(&self, course_id: &CourseId) -> Result<Vec<String>> {
        Ok(self.courses.get_course(course_id).await?.topics)
    }

    // -----------------------------------------------------------------------
    // Practice problems
    // -----------------------------------------------------------------------

    /// Generate, validate and persist practice problems.
    #[instrument(skip(self, actor, params), fields(user = %actor.user_id, course = %course_id))]
    pub async fn generate_practice_problems(
        &self,
        actor: &Actor,
        course_id: &CourseId,
        params: ProblemRequest,
    ) -> Result<Vec<PracticeProblem>> {
        let course = self.courses.get_course(course_id).await?;
        let topic = params.topic.as_deref().map(str::trim).filter(|t| !t.is_empty());
        if let Some(topic) = topic {
            ensure_course_topic(&course, topic)?;
        }
        let request = build_practice_problem_request(
            &course,
            topic,
            params.difficulty,
            params.question_type,
            params.count.unwrap_or(DEFAULT_PROBLEM_COUNT as i64),
        );

        let reply = self.generate(actor, request).await?;
        let problems = map_practice_problems(
            &reply,
            &course,
            topic,
            params.difficulty,
            params.question_type,
        )?;
        let saved = self.content.save_problems(problems).await?;
        tracing::info!(count = saved.len(), "generated practice problems");
        Ok(saved)
    }

    /// Stored problems for a course matching `filter`.
    pub async fn list_problems(
        &self,
        course_id: &CourseId,
        filter: &ProblemFilter,
    ) -> Result<Vec<PracticeProblem>> {
        self.courses.get_course(course_id).await?;
        self.content.list_problems(course_id, filter).await
    }

    /// Persist an instructor-authored problem. Staff only.
    pub async fn create_problem(
        &self,
        actor: &Actor,
        course_id: &CourseId,
        problem: NewPracticeProblem,
    ) -> Result<PracticeProblem> {
        if !actor.role.is_staff() {
            return Err(StudyBuddyError::NotAuthorized(
                "only instructors can author practice problems".into(),
            ));
        }
        self.courses.get_course(course_id).await?;
        if problem.question_text.trim().is_empty() || problem.answer.trim().is_empty() {
            return Err(StudyBuddyError::Validation(
                "question_text and answer are required".into(),
            ));
        }

        let record = PracticeProblem {
            id: Uuid::new_v4(),
            course_id: course_id.clone(),
            topic: problem.topic,
            difficulty: problem.difficulty,
            question_type: problem.question_type,
            question_text: problem.question_text,
            answer: problem.answer,
            explanation: problem.explanation,
            created_at: Utc::now(),
        };
        let mut saved = self.content.save_problems(vec![record]).await?;
        saved
            .pop()
            .ok_or_else(|| StudyBuddyError::Storage("problem was not persisted".into()))
    }

    // -----------------------------------------------------------------------
    // Study guides and reports
    // -----------------------------------------------------------------------

    /// Generate a guide emphasizing the caller's weak topics.
    ///
    /// An empty `topics` list covers every course topic.
    #[instrument(skip(self, actor, topics), fields(user = %actor.user_id, course = %course_id))]
    pub async fn generate_study_guide(
        &self,
        actor: &Actor,
        course_id: &CourseId,
        topics: Vec<String>,
    ) -> Result<StudyGuide> {
        let (course, records) = futures::try_join!(
            self.courses.get_course(course_id),
            self.tracker.progress(&actor.user_id, course_id),
        )?;

        let topics: Vec<String> = {
            let requested: Vec<String> = topics
                .into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
            if requested.is_empty() {
                course.topics.clone()
            } else {
                requested
            }
        };
        for topic in &topics {
            ensure_course_topic(&course, topic)?;
        }
        let weak = select_weak_topics(&records, self.config.mastery_threshold);
        tracing::debug!(weak = ?weak, "selected weak topics");

        let request = build_study_guide_request(&course, &topics, &weak);
        let reply = self.generate(actor, request).await?;
        let guide = map_study_guide(&reply, &course, &topics)?;
        self.content.save_guide(guide).await
    }

    pub async fn list_guides(&self, course_id: &CourseId) -> Result<Vec<StudyGuide>> {
        self.courses.get_course(course_id).await?;
        self.content.list_guides(course_id).await
    }

    /// Generate a teaching guide from class-wide progress. Staff only.
    #[instrument(skip(self, actor), fields(user = %actor.user_id, course = %course_id))]
    pub async fn generate_instructor_report(
        &self,
        actor: &Actor,
        course_id: &CourseId,
    ) -> Result<InstructorReport> {
        if !actor.role.is_staff() {
            return Err(StudyBuddyError::NotAuthorized(
                "instructor reports are limited to instructors and admins".into(),
            ));
        }
        let (course, records) = futures::try_join!(
            self.courses.get_course(course_id),
            self.tracker.course_progress(course_id),
        )?;
        let summaries = topic_summaries(&records);
        let request =
            build_instructor_report_request(&course, &summaries, self.config.mastery_threshold);
        let reply = self.generate(actor, request).await?;
        map_instructor_report(&reply, &course)
    }

    /// Generate a study plan ordered by the caller's recorded weaknesses.
    #[instrument(skip(self, actor), fields(user = %actor.user_id, course = %course_id))]
    pub async fn generate_study_plan(
        &self,
        actor: &Actor,
        course_id: &CourseId,
    ) -> Result<StudyPlan> {
        let (course, records) = futures::try_join!(
            self.courses.get_course(course_id),
            self.tracker.progress(&actor.user_id, course_id),
        )?;
        let threshold = self.config.mastery_threshold;
        let weak = weakest_first(&records, threshold);
        let request = build_study_plan_request(&course, &records, &weak, threshold);
        let reply = self.generate(actor, request).await?;
        map_study_plan(&reply, &course, &records, threshold)
    }

    /// Answer a free-form question about a course.
    #[instrument(skip(self, actor, question), fields(user = %actor.user_id, course = %course_id))]
    pub async fn ask_question(
        &self,
        actor: &Actor,
        course_id: &CourseId,
        question: &str,
    ) -> Result<CourseAnswer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(StudyBuddyError::Validation("question must not be empty".into()));
        }
        if question.chars().count() > MAX_QUESTION_CHARS {
            return Err(StudyBuddyError::Validation(format!(
                "question exceeds {MAX_QUESTION_CHARS} characters"
            )));
        }
        let (course, records) = futures::try_join!(
            self.courses.get_course(course_id),
            self.tracker.progress(&actor.user_id, course_id),
        )?;
        let weak = weakest_first(&records, self.config.mastery_threshold);
        let request = build_course_question_request(&course, question, &weak);
        let reply = self.generate(actor, request).await?;
        map_course_answer(&reply, &course, question)
    }

    // -----------------------------------------------------------------------
    // Progress
    // -----------------------------------------------------------------------

    /// Record an attempt outcome for one of the course's topics.
    pub async fn record_attempt(
        &self,
        actor: &Actor,
        course_id: &CourseId,
        topic: &str,
        was_correct: bool,
    ) -> Result<StudentProgress> {
        let course = self.courses.get_course(course_id).await?;
        let topic = topic.trim();
        ensure_course_topic(&course, topic)?;
        self.tracker
            .record_attempt(&actor.user_id, course_id, topic, was_correct)
            .await
    }

    pub async fn progress(&self, actor: &Actor, course_id: &CourseId) -> Result<Vec<StudentProgress>> {
        self.courses.get_course(course_id).await?;
        self.tracker.progress(&actor.user_id, course_id).await
    }

    /// The caller's weak topics; `threshold` defaults to the configured mastery threshold.
    pub async fn weak_topics(
        &self,
        actor: &Actor,
        course_id: &CourseId,
        threshold: Option<f64>,
    ) -> Result<Vec<String>> {
        let threshold = threshold.unwrap_or(self.config.mastery_threshold);
        if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
            return Err(StudyBuddyError::Validation(format!(
                "threshold must be between 0.0 and 1.0, got {threshold}"
            )));
        }
        let records = self.progress(actor, course_id).await?;
        Ok(select_weak_topics(&records, threshold))
    }

    // -----------------------------------------------------------------------
    // Sessions
    // -----------------------------------------------------------------------

    pub async fn start_session(
        &self,
        actor: &Actor,
        course_id: &CourseId,
        topics: Vec<String>,
    ) -> Result<StudySession> {
        self.sessions.start(&actor.user_id, course_id, topics).await
    }

    pub async fn end_session(
        &self,
        actor: &Actor,
        session_id: Uuid,
        score: f64,
        feedback: Option<String>,
    ) -> Result<StudySession> {
        self.sessions
            .end(session_id, &actor.user_id, score, feedback)
            .await
    }

    pub async fn get_session(&self, actor: &Actor, session_id: Uuid) -> Result<StudySession> {
        self.sessions.get(session_id, &actor.user_id).await
    }

    // -----------------------------------------------------------------------
    // Provider calls
    // -----------------------------------------------------------------------

    /// One provider call under the configured deadline, audited whatever the outcome.
    async fn generate(&self, actor: &Actor, request: GenerationRequest) -> Result<GenerationReply> {
        let request = request.with_sampling(
            self.config.model.clone(),
            self.config.max_tokens,
            self.config.temperature,
        );
        let start = Instant::now();

        let outcome = match self.config.generation_timeout {
            Some(limit) => match tokio::time::timeout(limit, self.provider.generate(&request)).await
            {
                Ok(result) => result.map_err(StudyBuddyError::from),
                Err(_) => Err(StudyBuddyError::GenerationTimeout(limit.as_secs())),
            },
            None => self
                .provider
                .generate(&request)
                .await
                .map_err(StudyBuddyError::from),
        };

        let payload = match &outcome {
            Ok(reply) => reply_payload(reply),
            Err(e) => serde_json::json!({ "error": e.to_string(), "kind": e.kind() }),
        };
        self.record_audit(actor, &request, payload).await;

        match &outcome {
            Ok(reply) => tracing::info!(
                provider = self.provider.name(),
                feature = %request.feature,
                model = %reply.model,
                latency_ms = start.elapsed().as_millis() as u64,
                total_tokens = reply.token_usage.total_tokens,
                "generation complete"
            ),
            Err(e) => tracing::warn!(
                provider = self.provider.name(),
                feature = %request.feature,
                "generation failed: {e}"
            ),
        }
        outcome
    }

    async fn record_audit(&self, actor: &Actor, request: &GenerationRequest, payload: serde_json::Value) {
        let entry = AuditLogEntry::new(
            actor.user_id.clone(),
            request.feature,
            request.user_prompt.clone(),
            payload,
        );
        match tokio::time::timeout(AUDIT_TIMEOUT, self.audit.record(entry)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(feature = %request.feature, "failed to record audit entry: {e:#}")
            }
            Err(_) => tracing::warn!(
                feature = %request.feature,
                timeout_secs = AUDIT_TIMEOUT.as_secs(),
                "audit sink timed out; entry dropped"
            ),
        }
    }
}

/// Courses without a topic list accept any topic.
fn ensure_course_topic(course: &Course, topic: &str) -> Result<()> {
    if course.topics.is_empty() || course.has_topic(topic) {
        Ok(())
    } else {
        Err(StudyBuddyError::Validation(format!(
            "topic '{topic}' is not part of course {}",
            course.id
        )))
    }
}

/// Structured form of a reply for the audit trail.
fn reply_payload(reply: &GenerationReply) -> serde_json::Value {
    serde_json::from_str(extract_json_from_markdown(&reply.content))
        .unwrap_or_else(|_| serde_json::json!({ "raw": reply.content }))
}
