//! In-process store backend.
//!
//! Every record lives behind a `tokio::sync::RwLock`. Read-modify-write
//! operations hold the write lock for the whole transform, which serializes
//! concurrent updates to the same progress key or session.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use studybuddy_core::error::{Result, StudyBuddyError};
use studybuddy_core::model::{
    AuditLogEntry, Course, CourseId, PracticeProblem, ProblemFilter, ProgressKey,
    StudentProgress, StudyGuide, StudySession, UserId,
};
use studybuddy_core::traits::{
    AuditSink, ContentStore, CourseDirectory, ProgressStore, ProgressUpdate, SessionStore,
    SessionUpdate,
};

/// Drop later duplicates of a course id.
pub(crate) fn unique_courses(courses: Vec<Course>) -> Vec<Course> {
    let mut unique: Vec<Course> = Vec::with_capacity(courses.len());
    for course in courses {
        if unique.iter().any(|c| c.id == course.id) {
            tracing::warn!(course = %course.id, "ignoring duplicate course");
            continue;
        }
        unique.push(course);
    }
    unique
}

/// In-memory implementation of every store trait.
#[derive(Default)]
pub struct MemoryStore {
    courses: Vec<Course>,
    /// Insertion-ordered progress records.
    progress: RwLock<Vec<StudentProgress>>,
    sessions: RwLock<HashMap<Uuid, StudySession>>,
    problems: RwLock<Vec<PracticeProblem>>,
    guides: RwLock<Vec<StudyGuide>>,
    audit: RwLock<Vec<AuditLogEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store serving `courses`. Later duplicates of a course id are ignored.
    pub fn with_courses(courses: Vec<Course>) -> Self {
        Self {
            courses: unique_courses(courses),
            ..Self::default()
        }
    }

    /// Audit entries recorded so far, oldest first.
    pub async fn audit_entries(&self) -> Vec<AuditLogEntry> {
        self.audit.read().await.clone()
    }
}

#[async_trait]
impl CourseDirectory for MemoryStore {
    async fn get_course(&self, id: &CourseId) -> Result<Course> {
        self.courses
            .iter()
            .find(|c| &c.id == id)
            .cloned()
            .ok_or_else(|| StudyBuddyError::not_found("course", id.as_str()))
    }

    async fn list_courses(&self) -> Result<Vec<Course>> {
        Ok(self.courses.clone())
    }
}

#[async_trait]
impl ProgressStore for MemoryStore {
    async fn get_progress(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
    ) -> Result<Vec<StudentProgress>> {
        let records = self.progress.read().await;
        Ok(records
            .iter()
            .filter(|r| &r.user_id == user_id && &r.course_id == course_id)
            .cloned()
            .collect())
    }

    async fn course_progress(&self, course_id: &CourseId) -> Result<Vec<StudentProgress>> {
        let records = self.progress.read().await;
        Ok(records
            .iter()
            .filter(|r| &r.course_id == course_id)
            .cloned()
            .collect())
    }

    async fn upsert_progress(&self, record: StudentProgress) -> Result<StudentProgress> {
        let mut records = self.progress.write().await;
        let key = record.key();
        match records.iter_mut().find(|r| r.key() == key) {
            Some(existing) => *existing = record.clone(),
            None => records.push(record.clone()),
        }
        Ok(record)
    }

    async fn update_progress(
        &self,
        key: &ProgressKey,
        apply: ProgressUpdate,
    ) -> Result<StudentProgress> {
        let mut records = self.progress.write().await;
        let position = records.iter().position(|r| &r.key() == key);
        let current = position.map(|i| records[i].clone());

        let mut updated = apply(current);
        updated.user_id = key.user_id.clone();
        updated.course_id = key.course_id.clone();
        updated.topic = key.topic.clone();

        match position {
            Some(i) => records[i] = updated.clone(),
            None => records.push(updated.clone()),
        }
        Ok(updated)
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn get_session(&self, id: Uuid) -> Result<Option<StudySession>> {
        Ok(self.sessions.read().await.get(&id).cloned())
    }

    async fn save_session(&self, session: StudySession) -> Result<StudySession> {
        self.sessions
            .write()
            .await
            .insert(session.id, session.clone());
        Ok(session)
    }

    async fn update_session(&self, id: Uuid, apply: SessionUpdate) -> Result<StudySession> {
        let mut sessions = self.sessions.write().await;
        let current = sessions
            .get(&id)
            .cloned()
            .ok_or_else(|| StudyBuddyError::not_found("session", id.to_string()))?;

        let updated = apply(current)?;
        sessions.insert(id, updated.clone());
        Ok(updated)
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn save_problems(&self, problems: Vec<PracticeProblem>) -> Result<Vec<PracticeProblem>> {
        self.problems.write().await.extend(problems.iter().cloned());
        Ok(problems)
    }

    async fn list_problems(
        &self,
        course_id: &CourseId,
        filter: &ProblemFilter,
    ) -> Result<Vec<PracticeProblem>> {
        let problems = self.problems.read().await;
        Ok(problems
            .iter()
            .filter(|p| &p.course_id == course_id && filter.matches(p))
            .cloned()
            .collect())
    }

    async fn save_guide(&self, guide: StudyGuide) -> Result<StudyGuide> {
        self.guides.write().await.push(guide.clone());
        Ok(guide)
    }

    async fn list_guides(&self, course_id: &CourseId) -> Result<Vec<StudyGuide>> {
        let guides = self.guides.read().await;
        Ok(guides
            .iter()
            .filter(|g| &g.course_id == course_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AuditSink for MemoryStore {
    async fn record(&self, entry: AuditLogEntry) -> anyhow::Result<()> {
        self.audit.write().await.push(entry);
        Ok(())
    }
}
