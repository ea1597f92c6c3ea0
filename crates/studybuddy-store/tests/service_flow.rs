//! End-to-end service tests over the in-memory and SQLite stores with the
//! mock provider.
//!
//! These exercise the full generate → audit → map → persist pipeline, the
//! personalization path from recorded attempts to prompts, and the session
//! state machine.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use studybuddy_core::model::{
    Actor, AuditLogEntry, Course, CourseId, Difficulty, Feature, ProblemFilter, ProficiencyLevel,
    QuestionKind, Role,
};
use studybuddy_core::request::{MAX_PROBLEMS_PER_REQUEST, MAX_QUESTION_CHARS};
use studybuddy_core::service::{NewPracticeProblem, ProblemRequest};
use studybuddy_core::traits::{
    AuditSink, ContentStore, CourseDirectory, GenerationProvider, ProgressStore, SessionStore,
};
use studybuddy_core::{Collaborators, ProviderError, ServiceConfig, StudyBuddyError, StudyBuddyService};
use studybuddy_providers::mock::MockProvider;
use studybuddy_store::{MemoryStore, SqliteStore};

fn courses() -> Vec<Course> {
    vec![Course {
        id: CourseId::new("COMP401"),
        name: "Data Structures".into(),
        description: "Foundations of data organization.".into(),
        topics: vec!["Arrays".into(), "Graphs".into()],
    }]
}

fn comp401() -> CourseId {
    CourseId::new("COMP401")
}

fn service_with(
    provider: Arc<dyn GenerationProvider>,
    audit: Option<Arc<dyn AuditSink>>,
    config: ServiceConfig,
) -> (Arc<MemoryStore>, StudyBuddyService) {
    let store = Arc::new(MemoryStore::with_courses(courses()));
    let collaborators = Collaborators {
        courses: store.clone(),
        progress: store.clone(),
        sessions: store.clone(),
        content: store.clone(),
        provider,
        audit: audit.unwrap_or_else(|| store.clone() as Arc<dyn AuditSink>),
    };
    (store, StudyBuddyService::new(collaborators, config))
}

fn default_service(provider: Arc<MockProvider>) -> (Arc<MemoryStore>, StudyBuddyService) {
    service_with(provider, None, ServiceConfig::default())
}

fn service_over<S>(store: Arc<S>, provider: Arc<dyn GenerationProvider>) -> StudyBuddyService
where
    S: CourseDirectory + ProgressStore + SessionStore + ContentStore + AuditSink + 'static,
{
    StudyBuddyService::new(
        Collaborators {
            courses: store.clone(),
            progress: store.clone(),
            sessions: store.clone(),
            content: store.clone(),
            provider,
            audit: store,
        },
        ServiceConfig::default(),
    )
}

struct HangingAudit;

#[async_trait]
impl AuditSink for HangingAudit {
    async fn record(&self, _entry: AuditLogEntry) -> anyhow::Result<()> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

struct FailingAudit;

#[async_trait]
impl AuditSink for FailingAudit {
    async fn record(&self, _entry: AuditLogEntry) -> anyhow::Result<()> {
        anyhow::bail!("audit table unavailable")
    }
}

// --- Practice problems ---

#[tokio::test]
async fn generated_problems_are_persisted_and_audited() {
    let provider = Arc::new(MockProvider::default());
    let (store, service) = default_service(provider.clone());
    let student = Actor::student("u1");

    let params = ProblemRequest {
        topic: Some("Graphs".into()),
        difficulty: Some(Difficulty::Hard),
        question_type: None,
        count: Some(3),
    };
    let problems = service
        .generate_practice_problems(&student, &comp401(), params)
        .await
        .unwrap();
    assert_eq!(problems.len(), 3);
    assert!(problems.iter().all(|p| p.topic.as_deref() == Some("Graphs")));
    assert!(problems
        .iter()
        .all(|p| p.question_type == Some(QuestionKind::MultipleChoice)));

    let stored = service
        .list_problems(&comp401(), &ProblemFilter::default())
        .await
        .unwrap();
    assert_eq!(stored.len(), 3);

    let audit = store.audit_entries().await;
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].feature, Feature::PracticeProblems);
    assert!(audit[0].prompt.contains("Create 3 practice problems"));
    assert!(audit[0].response.get("problems").is_some());

    let request = provider.last_request().unwrap();
    assert_eq!(request.max_tokens, 1000);
    assert_eq!(request.temperature, 0.7);
}

#[tokio::test]
async fn problem_count_is_clamped() {
    let provider = Arc::new(MockProvider::default());
    let (_store, service) = default_service(provider);

    let params = ProblemRequest {
        count: Some(500),
        ..ProblemRequest::default()
    };
    let problems = service
        .generate_practice_problems(&Actor::student("u1"), &comp401(), params)
        .await
        .unwrap();
    assert_eq!(problems.len(), MAX_PROBLEMS_PER_REQUEST as usize);
}

#[tokio::test]
async fn unknown_course_fails_before_generation() {
    let provider = Arc::new(MockProvider::default());
    let (_store, service) = default_service(provider.clone());

    let err = service
        .generate_practice_problems(
            &Actor::student("u1"),
            &CourseId::new("COMP999"),
            ProblemRequest::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StudyBuddyError::NotFound { .. }));
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn malformed_reply_persists_nothing() {
    let provider = Arc::new(MockProvider::with_fixed_response("Sorry, I cannot help with that."));
    let (store, service) = default_service(provider);

    let err = service
        .generate_practice_problems(&Actor::student("u1"), &comp401(), ProblemRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, StudyBuddyError::MalformedGenerationReply(_)));
    assert!(!err.to_string().contains("Sorry"));

    let stored = service
        .list_problems(&comp401(), &ProblemFilter::default())
        .await
        .unwrap();
    assert!(stored.is_empty());
    // The call itself is still on the audit trail.
    assert_eq!(store.audit_entries().await.len(), 1);
}

#[tokio::test]
async fn provider_failure_is_typed_and_audited() {
    let provider = Arc::new(MockProvider::failing(ProviderError::RateLimited {
        retry_after_ms: 5000,
    }));
    let (store, service) = default_service(provider);

    let err = service
        .generate_study_guide(&Actor::student("u1"), &comp401(), vec![])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "provider_error");
    assert!(err.is_retryable());

    let audit = store.audit_entries().await;
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].response["kind"], "provider_error");
}

#[tokio::test(start_paused = true)]
async fn slow_provider_times_out() {
    let provider = Arc::new(
        MockProvider::with_fixed_response(r#"{"content": "late"}"#)
            .with_delay(Duration::from_secs(120)),
    );
    let config = ServiceConfig {
        generation_timeout: Some(Duration::from_secs(5)),
        ..ServiceConfig::default()
    };
    let (_store, service) = service_with(provider, None, config);

    let err = service
        .generate_study_guide(&Actor::student("u1"), &comp401(), vec![])
        .await
        .unwrap_err();
    assert!(matches!(err, StudyBuddyError::GenerationTimeout(5)));
    assert!(service.list_guides(&comp401()).await.unwrap().is_empty());
}

#[tokio::test]
async fn audit_failure_does_not_fail_generation() {
    let provider = Arc::new(MockProvider::default());
    let (_store, service) = service_with(
        provider,
        Some(Arc::new(FailingAudit)),
        ServiceConfig::default(),
    );

    let guide = service
        .generate_study_guide(&Actor::student("u1"), &comp401(), vec!["Graphs".into()])
        .await
        .unwrap();
    assert_eq!(guide.topic, "Graphs");
}

#[tokio::test(start_paused = true)]
async fn stalled_audit_sink_does_not_stall_generation() {
    let provider = Arc::new(MockProvider::default());
    let (_store, service) = service_with(
        provider,
        Some(Arc::new(HangingAudit)),
        ServiceConfig::default(),
    );

    let guide = service
        .generate_study_guide(&Actor::student("u1"), &comp401(), vec!["Graphs".into()])
        .await
        .unwrap();
    assert_eq!(guide.topic, "Graphs");
    assert_eq!(service.list_guides(&comp401()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn generation_rejects_topics_outside_the_course() {
    let provider = Arc::new(MockProvider::default());
    let (store, service) = default_service(provider.clone());
    let student = Actor::student("u1");

    let err = service
        .generate_practice_problems(
            &student,
            &comp401(),
            ProblemRequest {
                topic: Some("Astrology".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StudyBuddyError::Validation(_)));

    let err = service
        .generate_study_guide(&student, &comp401(), vec!["Graphs".into(), "Astrology".into()])
        .await
        .unwrap_err();
    assert!(matches!(err, StudyBuddyError::Validation(_)));

    assert_eq!(provider.call_count(), 0);
    assert!(store.audit_entries().await.is_empty());
}

#[tokio::test]
async fn instructors_author_problems() {
    let provider = Arc::new(MockProvider::default());
    let (_store, service) = default_service(provider);
    let problem = NewPracticeProblem {
        topic: Some("Arrays".into()),
        difficulty: Some(Difficulty::Easy),
        question_type: Some(QuestionKind::ShortAnswer),
        question_text: "What is the index of the first element?".into(),
        answer: "0".into(),
        explanation: "Arrays are zero-indexed.".into(),
    };

    let err = service
        .create_problem(&Actor::student("u1"), &comp401(), problem.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, StudyBuddyError::NotAuthorized(_)));

    let created = service
        .create_problem(&Actor::new("prof", Role::Instructor), &comp401(), problem)
        .await
        .unwrap();
    assert_eq!(created.answer, "0");

    let easy = service
        .list_problems(
            &comp401(),
            &ProblemFilter {
                difficulty: Some(Difficulty::Easy),
                ..ProblemFilter::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(easy.len(), 1);
}

// --- Personalization ---

#[tokio::test]
async fn study_guide_emphasizes_weak_topics() {
    let provider = Arc::new(MockProvider::default());
    let (_store, service) = default_service(provider.clone());
    let student = Actor::student("u1");

    for correct in [true, true, true] {
        service
            .record_attempt(&student, &comp401(), "Arrays", correct)
            .await
            .unwrap();
    }
    for correct in [true, false, false] {
        service
            .record_attempt(&student, &comp401(), "Graphs", correct)
            .await
            .unwrap();
    }

    assert_eq!(
        service.weak_topics(&student, &comp401(), None).await.unwrap(),
        vec!["Graphs".to_string()]
    );

    let guide = service
        .generate_study_guide(&student, &comp401(), vec![])
        .await
        .unwrap();
    assert_eq!(guide.topic, "Arrays, Graphs");

    let prompt = provider.last_request().unwrap().user_prompt;
    let focus = &prompt[prompt.find("Focus areas").unwrap()..];
    assert!(focus.contains("- Graphs"));
    assert!(!focus.contains("- Arrays"));

    assert_eq!(service.list_guides(&comp401()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn guide_without_progress_has_no_focus_areas() {
    let provider = Arc::new(MockProvider::default());
    let (_store, service) = default_service(provider.clone());

    service
        .generate_study_guide(&Actor::student("new"), &comp401(), vec![])
        .await
        .unwrap();
    let prompt = provider.last_request().unwrap().user_prompt;
    assert!(prompt.contains("None identified"));
}

#[tokio::test]
async fn attempts_are_validated() {
    let provider = Arc::new(MockProvider::default());
    let (_store, service) = default_service(provider);
    let student = Actor::student("u1");

    let err = service
        .record_attempt(&student, &comp401(), "Quantum Computing", true)
        .await
        .unwrap_err();
    assert!(matches!(err, StudyBuddyError::Validation(_)));

    let err = service
        .record_attempt(&student, &CourseId::new("COMP999"), "Arrays", true)
        .await
        .unwrap_err();
    assert!(matches!(err, StudyBuddyError::NotFound { .. }));

    let err = service
        .weak_topics(&student, &comp401(), Some(1.5))
        .await
        .unwrap_err();
    assert!(matches!(err, StudyBuddyError::Validation(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_attempts_are_not_lost() {
    let provider = Arc::new(MockProvider::default());
    let (_store, service) = default_service(provider);
    let service = Arc::new(service);
    let student = Actor::student("u1");

    let attempts: Vec<_> = (0..20)
        .map(|i| {
            let service = Arc::clone(&service);
            let student = student.clone();
            tokio::spawn(async move {
                service
                    .record_attempt(&student, &comp401(), "Graphs", i % 4 == 0)
                    .await
            })
        })
        .collect();
    for attempt in futures::future::join_all(attempts).await {
        attempt.unwrap().unwrap();
    }

    let progress = service.progress(&student, &comp401()).await.unwrap();
    assert_eq!(progress.len(), 1);
    assert_eq!(progress[0].problems_attempted, 20);
    assert_eq!(progress[0].problems_correct, 5);
    assert!((progress[0].proficiency_score - 0.25).abs() < 1e-9);
}

#[tokio::test]
async fn instructor_report_is_staff_only() {
    let mut responses = HashMap::new();
    responses.insert(
        "teaching guide".to_string(),
        r###"{"content": "## Instructor Guide\nSpend time on graphs."}"###.to_string(),
    );
    let provider = Arc::new(MockProvider::new(responses));
    let (_store, service) = default_service(provider.clone());

    for (user, correct) in [("u1", false), ("u2", false), ("u3", true)] {
        service
            .record_attempt(&Actor::student(user), &comp401(), "Graphs", correct)
            .await
            .unwrap();
    }

    let err = service
        .generate_instructor_report(&Actor::student("u1"), &comp401())
        .await
        .unwrap_err();
    assert!(matches!(err, StudyBuddyError::NotAuthorized(_)));
    assert_eq!(provider.call_count(), 0);

    let report = service
        .generate_instructor_report(&Actor::new("prof", Role::Instructor), &comp401())
        .await
        .unwrap();
    assert!(report.content.contains("Spend time on graphs."));

    let prompt = provider.last_request().unwrap().user_prompt;
    assert!(prompt.contains("Graphs: mean proficiency 0.33 across 3 student(s), 1/3 correct (below mastery)"));
}

// --- Sessions ---

#[tokio::test]
async fn session_lifecycle() {
    let provider = Arc::new(MockProvider::default());
    let (_store, service) = default_service(provider);
    let owner = Actor::student("u1");
    let other = Actor::student("u2");

    let session = service
        .start_session(&owner, &comp401(), vec!["Graphs".into(), "Graphs".into(), "Arrays".into()])
        .await
        .unwrap();
    assert!(!session.is_closed());
    assert_eq!(session.topics_covered, vec!["Graphs", "Arrays"]);

    let err = service.get_session(&other, session.id).await.unwrap_err();
    assert!(matches!(err, StudyBuddyError::NotAuthorized(_)));

    let err = service
        .end_session(&other, session.id, 0.5, None)
        .await
        .unwrap_err();
    assert!(matches!(err, StudyBuddyError::NotAuthorized(_)));

    let err = service
        .end_session(&owner, session.id, 1.2, None)
        .await
        .unwrap_err();
    assert!(matches!(err, StudyBuddyError::Validation(_)));

    let closed = service
        .end_session(&owner, session.id, 0.9, Some("Solid work".into()))
        .await
        .unwrap();
    assert!(closed.is_closed());
    assert_eq!(closed.score, Some(0.9));

    let err = service
        .end_session(&owner, session.id, 0.4, None)
        .await
        .unwrap_err();
    assert!(matches!(err, StudyBuddyError::InvalidStateTransition { .. }));

    let stored = service.get_session(&owner, session.id).await.unwrap();
    assert_eq!(stored.score, Some(0.9));
    assert_eq!(stored.feedback.as_deref(), Some("Solid work"));
}

#[tokio::test]
async fn session_for_unknown_topic_is_rejected() {
    let provider = Arc::new(MockProvider::default());
    let (_store, service) = default_service(provider);

    let err = service
        .start_session(&Actor::student("u1"), &comp401(), vec!["Compilers".into()])
        .await
        .unwrap_err();
    assert!(matches!(err, StudyBuddyError::Validation(_)));

    let err = service
        .end_session(&Actor::student("u1"), uuid::Uuid::new_v4(), 0.5, None)
        .await
        .unwrap_err();
    assert!(matches!(err, StudyBuddyError::NotFound { .. }));
}

/// Spawn `racers` concurrent closes of one session and check a single winner.
async fn race_to_close(service: Arc<StudyBuddyService>, racers: usize) {
    let owner = Actor::student("u1");
    let session = service
        .start_session(&owner, &comp401(), vec!["Graphs".into()])
        .await
        .unwrap();
    let session_id = session.id;

    let closes: Vec<_> = (0..racers)
        .map(|i| {
            let service = Arc::clone(&service);
            let owner = owner.clone();
            let score = i as f64 / racers as f64;
            tokio::spawn(async move { service.end_session(&owner, session_id, score, None).await })
        })
        .collect();

    let mut winners = Vec::new();
    let mut conflicts = 0;
    for close in futures::future::join_all(closes).await {
        match close.unwrap() {
            Ok(closed) => winners.push(closed),
            Err(StudyBuddyError::InvalidStateTransition { .. }) => conflicts += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(winners.len(), 1);
    assert_eq!(conflicts, racers - 1);

    let stored = service.get_session(&owner, session_id).await.unwrap();
    assert_eq!(stored.score, winners[0].score);
    assert_eq!(stored.end_time, winners[0].end_time);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_closes_have_one_winner() {
    let store = Arc::new(MemoryStore::with_courses(courses()));
    let service = service_over(store, Arc::new(MockProvider::default()));
    race_to_close(Arc::new(service), 16).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_closes_have_one_winner_in_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("sessions.db").display());
    let store = Arc::new(SqliteStore::connect(&url, courses()).await.unwrap());
    let service = service_over(store, Arc::new(MockProvider::default()));
    race_to_close(Arc::new(service), 16).await;
}

// --- Study plans and course chat ---

#[tokio::test]
async fn study_plan_orders_weakest_topics_first() {
    let provider = Arc::new(MockProvider::default());
    let store = Arc::new(SqliteStore::in_memory(courses()).await.unwrap());
    let service = service_over(store.clone(), provider.clone());
    let student = Actor::student("u1");

    for correct in [true, false, false] {
        service
            .record_attempt(&student, &comp401(), "Graphs", correct)
            .await
            .unwrap();
    }
    service
        .record_attempt(&student, &comp401(), "Arrays", false)
        .await
        .unwrap();

    let plan = service.generate_study_plan(&student, &comp401()).await.unwrap();
    assert_eq!(plan.recommended_study_order, vec!["Arrays", "Graphs"]);
    assert!(plan
        .proficiency_levels
        .iter()
        .all(|p| p.level == ProficiencyLevel::Beginner));

    let prompt = provider.last_request().unwrap().user_prompt;
    let focus = &prompt[prompt.find("Focus areas").unwrap()..];
    assert!(focus.find("- Arrays").unwrap() < focus.find("- Graphs").unwrap());

    let audit = store.audit_entries().await.unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].feature, Feature::StudyPlan);
}

#[tokio::test]
async fn questions_are_validated_before_generation() {
    let provider = Arc::new(MockProvider::default());
    let (store, service) = default_service(provider.clone());
    let student = Actor::student("u1");

    let err = service.ask_question(&student, &comp401(), "  ").await.unwrap_err();
    assert!(matches!(err, StudyBuddyError::Validation(_)));
    let long = "why? ".repeat(MAX_QUESTION_CHARS);
    let err = service.ask_question(&student, &comp401(), &long).await.unwrap_err();
    assert!(matches!(err, StudyBuddyError::Validation(_)));
    assert_eq!(provider.call_count(), 0);

    let answer = service
        .ask_question(&student, &comp401(), " How do I detect a cycle? ")
        .await
        .unwrap();
    assert_eq!(answer.question, "How do I detect a cycle?");
    assert!(provider
        .last_request()
        .unwrap()
        .user_prompt
        .contains("How do I detect a cycle?"));
    assert_eq!(store.audit_entries().await[0].feature, Feature::CourseChat);
}

