//! SQLite store backend.
//!
//! Progress, sessions, generated content and the audit trail live in a
//! SQLite database reached through a `sqlx` pool. Course reference data
//! comes from the catalog and is held in memory.
//!
//! All writes go through one async write gate, so a read-modify-write
//! transaction never races another writer in this process. Closing a
//! session is additionally guarded in SQL (`end_time IS NULL`), which keeps
//! a second close from overwriting the first even across processes.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tokio::sync::Mutex;
use uuid::Uuid;

use studybuddy_core::error::{Result, StudyBuddyError};
use studybuddy_core::model::{
    AuditLogEntry, Course, CourseId, Difficulty, Feature, PracticeProblem, ProblemFilter,
    ProgressKey, QuestionKind, StudentProgress, StudyGuide, StudySession, UserId,
};
use studybuddy_core::traits::{
    AuditSink, ContentStore, CourseDirectory, ProgressStore, ProgressUpdate, SessionStore,
    SessionUpdate,
};

use crate::memory::unique_courses;

const SCHEMA: [&str; 5] = [
    r#"
    CREATE TABLE IF NOT EXISTS progress (
        id BLOB NOT NULL,
        user_id TEXT NOT NULL,
        course_id TEXT NOT NULL,
        topic TEXT NOT NULL,
        proficiency_score REAL NOT NULL,
        problems_attempted INTEGER NOT NULL,
        problems_correct INTEGER NOT NULL,
        last_updated TEXT NOT NULL,
        UNIQUE (user_id, course_id, topic)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sessions (
        id BLOB PRIMARY KEY,
        user_id TEXT NOT NULL,
        course_id TEXT NOT NULL,
        start_time TEXT NOT NULL,
        end_time TEXT,
        topics_covered TEXT NOT NULL,
        score REAL,
        feedback TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS problems (
        id BLOB PRIMARY KEY,
        course_id TEXT NOT NULL,
        topic TEXT,
        difficulty TEXT,
        question_type TEXT,
        question_text TEXT NOT NULL,
        answer TEXT NOT NULL,
        explanation TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS guides (
        id BLOB PRIMARY KEY,
        course_id TEXT NOT NULL,
        topic TEXT NOT NULL,
        content TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS audit_log (
        id BLOB PRIMARY KEY,
        user_id TEXT NOT NULL,
        feature TEXT NOT NULL,
        prompt TEXT NOT NULL,
        response TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
];

fn storage(err: sqlx::Error) -> StudyBuddyError {
    StudyBuddyError::Storage(err.to_string())
}

fn corrupt(what: &str, detail: impl std::fmt::Display) -> StudyBuddyError {
    StudyBuddyError::Storage(format!("stored {what} is invalid: {detail}"))
}

fn count(value: i64, what: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| corrupt(what, value))
}

fn parse_optional<T: FromStr<Err = String>>(value: Option<String>, what: &str) -> Result<Option<T>> {
    value
        .map(|v| v.parse::<T>().map_err(|e| corrupt(what, e)))
        .transpose()
}

#[derive(sqlx::FromRow)]
struct ProgressRow {
    id: Uuid,
    user_id: String,
    course_id: String,
    topic: String,
    proficiency_score: f64,
    problems_attempted: i64,
    problems_correct: i64,
    last_updated: DateTime<Utc>,
}

impl TryFrom<ProgressRow> for StudentProgress {
    type Error = StudyBuddyError;

    fn try_from(row: ProgressRow) -> Result<Self> {
        Ok(StudentProgress {
            id: row.id,
            user_id: UserId::new(row.user_id),
            course_id: CourseId::new(row.course_id),
            topic: row.topic,
            proficiency_score: row.proficiency_score,
            problems_attempted: count(row.problems_attempted, "problems_attempted")?,
            problems_correct: count(row.problems_correct, "problems_correct")?,
            last_updated: row.last_updated,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: Uuid,
    user_id: String,
    course_id: String,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    topics_covered: String,
    score: Option<f64>,
    feedback: Option<String>,
}

impl TryFrom<SessionRow> for StudySession {
    type Error = StudyBuddyError;

    fn try_from(row: SessionRow) -> Result<Self> {
        Ok(StudySession {
            id: row.id,
            user_id: UserId::new(row.user_id),
            course_id: CourseId::new(row.course_id),
            start_time: row.start_time,
            end_time: row.end_time,
            topics_covered: serde_json::from_str(&row.topics_covered)
                .map_err(|e| corrupt("topics_covered", e))?,
            score: row.score,
            feedback: row.feedback,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ProblemRow {
    id: Uuid,
    course_id: String,
    topic: Option<String>,
    difficulty: Option<String>,
    question_type: Option<String>,
    question_text: String,
    answer: String,
    explanation: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<ProblemRow> for PracticeProblem {
    type Error = StudyBuddyError;

    fn try_from(row: ProblemRow) -> Result<Self> {
        Ok(PracticeProblem {
            id: row.id,
            course_id: CourseId::new(row.course_id),
            topic: row.topic,
            difficulty: parse_optional::<Difficulty>(row.difficulty, "difficulty")?,
            question_type: parse_optional::<QuestionKind>(row.question_type, "question_type")?,
            question_text: row.question_text,
            answer: row.answer,
            explanation: row.explanation,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct GuideRow {
    id: Uuid,
    course_id: String,
    topic: String,
    content: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<GuideRow> for StudyGuide {
    fn from(row: GuideRow) -> Self {
        StudyGuide {
            id: row.id,
            course_id: CourseId::new(row.course_id),
            topic: row.topic,
            content: row.content,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct AuditRow {
    id: Uuid,
    user_id: String,
    feature: String,
    prompt: String,
    response: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<AuditRow> for AuditLogEntry {
    type Error = StudyBuddyError;

    fn try_from(row: AuditRow) -> Result<Self> {
        Ok(AuditLogEntry {
            id: row.id,
            user_id: UserId::new(row.user_id),
            feature: row.feature.parse::<Feature>().map_err(|e| corrupt("feature", e))?,
            prompt: row.prompt,
            response: serde_json::from_str(&row.response).map_err(|e| corrupt("response", e))?,
            created_at: row.created_at,
        })
    }
}

/// SQLite-backed implementation of every store trait.
pub struct SqliteStore {
    pool: SqlitePool,
    courses: Vec<Course>,
    write_gate: Mutex<()>,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `database_url`, e.g.
    /// `sqlite://studybuddy.db`, and apply the schema.
    pub async fn connect(database_url: &str, courses: Vec<Course>) -> Result<Self> {
        tracing::info!(url = database_url, "opening sqlite store");
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(storage)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(options)
            .await
            .map_err(storage)?;
        Self::with_pool(pool, courses).await
    }

    /// A private in-memory database. One connection is kept open for the
    /// life of the store, since an in-memory database dies with it.
    pub async fn in_memory(courses: Vec<Course>) -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(storage)?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(storage)?;
        Self::with_pool(pool, courses).await
    }

    async fn with_pool(pool: SqlitePool, courses: Vec<Course>) -> Result<Self> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .map_err(storage)?;
        }
        Ok(Self {
            pool,
            courses: unique_courses(courses),
            write_gate: Mutex::new(()),
        })
    }

    /// Audit entries recorded so far, oldest first.
    pub async fn audit_entries(&self) -> Result<Vec<AuditLogEntry>> {
        let rows = sqlx::query_as::<_, AuditRow>(
            "SELECT id, user_id, feature, prompt, response, created_at FROM audit_log ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        rows.into_iter().map(AuditLogEntry::try_from).collect()
    }

    /// Close the pool, flushing the write-ahead log.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

const PROGRESS_COLUMNS: &str = "id, user_id, course_id, topic, proficiency_score, \
problems_attempted, problems_correct, last_updated";

const UPSERT_PROGRESS: &str = r#"
    INSERT INTO progress (id, user_id, course_id, topic, proficiency_score,
                          problems_attempted, problems_correct, last_updated)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT (user_id, course_id, topic) DO UPDATE SET
        proficiency_score = excluded.proficiency_score,
        problems_attempted = excluded.problems_attempted,
        problems_correct = excluded.problems_correct,
        last_updated = excluded.last_updated
"#;

fn upsert_progress_query(
    record: &StudentProgress,
) -> sqlx::query::Query<'_, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'_>> {
    sqlx::query(UPSERT_PROGRESS)
        .bind(record.id)
        .bind(record.user_id.as_str())
        .bind(record.course_id.as_str())
        .bind(record.topic.as_str())
        .bind(record.proficiency_score)
        .bind(i64::from(record.problems_attempted))
        .bind(i64::from(record.problems_correct))
        .bind(record.last_updated)
}

#[async_trait]
impl CourseDirectory for SqliteStore {
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
impl ProgressStore for SqliteStore {
    async fn get_progress(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
    ) -> Result<Vec<StudentProgress>> {
        let rows = sqlx::query_as::<_, ProgressRow>(&format!(
            "SELECT {PROGRESS_COLUMNS} FROM progress \
             WHERE user_id = ? AND course_id = ? ORDER BY rowid"
        ))
        .bind(user_id.as_str())
        .bind(course_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        rows.into_iter().map(StudentProgress::try_from).collect()
    }

    async fn course_progress(&self, course_id: &CourseId) -> Result<Vec<StudentProgress>> {
        let rows = sqlx::query_as::<_, ProgressRow>(&format!(
            "SELECT {PROGRESS_COLUMNS} FROM progress WHERE course_id = ? ORDER BY rowid"
        ))
        .bind(course_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        rows.into_iter().map(StudentProgress::try_from).collect()
    }

    async fn upsert_progress(&self, record: StudentProgress) -> Result<StudentProgress> {
        let _gate = self.write_gate.lock().await;
        upsert_progress_query(&record)
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(record)
    }

    async fn update_progress(
        &self,
        key: &ProgressKey,
        apply: ProgressUpdate,
    ) -> Result<StudentProgress> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await.map_err(storage)?;

        let current = sqlx::query_as::<_, ProgressRow>(&format!(
            "SELECT {PROGRESS_COLUMNS} FROM progress \
             WHERE user_id = ? AND course_id = ? AND topic = ?"
        ))
        .bind(key.user_id.as_str())
        .bind(key.course_id.as_str())
        .bind(key.topic.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(storage)?
        .map(StudentProgress::try_from)
        .transpose()?;

        let mut updated = apply(current);
        updated.user_id = key.user_id.clone();
        updated.course_id = key.course_id.clone();
        updated.topic = key.topic.clone();

        upsert_progress_query(&updated)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        tx.commit().await.map_err(storage)?;
        Ok(updated)
    }
}

const SESSION_COLUMNS: &str =
    "id, user_id, course_id, start_time, end_time, topics_covered, score, feedback";

fn topics_json(session: &StudySession) -> Result<String> {
    serde_json::to_string(&session.topics_covered)
        .map_err(|e| StudyBuddyError::Storage(format!("failed to encode topics: {e}")))
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn get_session(&self, id: Uuid) -> Result<Option<StudySession>> {
        sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?
        .map(StudySession::try_from)
        .transpose()
    }

    async fn save_session(&self, session: StudySession) -> Result<StudySession> {
        let topics = topics_json(&session)?;
        let _gate = self.write_gate.lock().await;
        sqlx::query(
            r#"
            INSERT INTO sessions (id, user_id, course_id, start_time, end_time,
                                  topics_covered, score, feedback)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                end_time = excluded.end_time,
                topics_covered = excluded.topics_covered,
                score = excluded.score,
                feedback = excluded.feedback
            "#,
        )
        .bind(session.id)
        .bind(session.user_id.as_str())
        .bind(session.course_id.as_str())
        .bind(session.start_time)
        .bind(session.end_time)
        .bind(topics)
        .bind(session.score)
        .bind(session.feedback.as_deref())
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(session)
    }

    async fn update_session(&self, id: Uuid, apply: SessionUpdate) -> Result<StudySession> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await.map_err(storage)?;

        let current: StudySession = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(storage)?
        .ok_or_else(|| StudyBuddyError::not_found("session", id.to_string()))?
        .try_into()?;
        let was_open = !current.is_closed();

        let updated = apply(current)?;
        let topics = topics_json(&updated)?;

        let mut sql = String::from(
            "UPDATE sessions SET end_time = ?, topics_covered = ?, score = ?, feedback = ? \
             WHERE id = ?",
        );
        if was_open {
            sql.push_str(" AND end_time IS NULL");
        }
        let affected = sqlx::query(&sql)
            .bind(updated.end_time)
            .bind(topics)
            .bind(updated.score)
            .bind(updated.feedback.as_deref())
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(storage)?
            .rows_affected();
        if affected == 0 {
            return Err(StudyBuddyError::InvalidStateTransition {
                resource: "session",
                id: id.to_string(),
                reason: "session was closed concurrently".into(),
            });
        }

        tx.commit().await.map_err(storage)?;
        Ok(updated)
    }
}

#[async_trait]
impl ContentStore for SqliteStore {
    async fn save_problems(&self, problems: Vec<PracticeProblem>) -> Result<Vec<PracticeProblem>> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await.map_err(storage)?;
        for problem in &problems {
            sqlx::query(
                r#"
                INSERT INTO problems (id, course_id, topic, difficulty, question_type,
                                      question_text, answer, explanation, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(problem.id)
            .bind(problem.course_id.as_str())
            .bind(problem.topic.as_deref())
            .bind(problem.difficulty.map(|d| d.to_string()))
            .bind(problem.question_type.map(|k| k.to_string()))
            .bind(problem.question_text.as_str())
            .bind(problem.answer.as_str())
            .bind(problem.explanation.as_str())
            .bind(problem.created_at)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        }
        tx.commit().await.map_err(storage)?;
        Ok(problems)
    }

    async fn list_problems(
        &self,
        course_id: &CourseId,
        filter: &ProblemFilter,
    ) -> Result<Vec<PracticeProblem>> {
        let rows = sqlx::query_as::<_, ProblemRow>(
            r#"
            SELECT id, course_id, topic, difficulty, question_type,
                   question_text, answer, explanation, created_at
            FROM problems WHERE course_id = ? ORDER BY rowid
            "#,
        )
        .bind(course_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        let mut problems = Vec::with_capacity(rows.len());
        for row in rows {
            let problem = PracticeProblem::try_from(row)?;
            if filter.matches(&problem) {
                problems.push(problem);
            }
        }
        Ok(problems)
    }

    async fn save_guide(&self, guide: StudyGuide) -> Result<StudyGuide> {
        let _gate = self.write_gate.lock().await;
        sqlx::query(
            "INSERT INTO guides (id, course_id, topic, content, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(guide.id)
        .bind(guide.course_id.as_str())
        .bind(guide.topic.as_str())
        .bind(guide.content.as_str())
        .bind(guide.created_at)
        .bind(guide.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(guide)
    }

    async fn list_guides(&self, course_id: &CourseId) -> Result<Vec<StudyGuide>> {
        let rows = sqlx::query_as::<_, GuideRow>(
            "SELECT id, course_id, topic, content, created_at, updated_at \
             FROM guides WHERE course_id = ? ORDER BY rowid",
        )
        .bind(course_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        Ok(rows.into_iter().map(StudyGuide::from).collect())
    }
}

#[async_trait]
impl AuditSink for SqliteStore {
    async fn record(&self, entry: AuditLogEntry) -> anyhow::Result<()> {
        let response = serde_json::to_string(&entry.response)?;
        let _gate = self.write_gate.lock().await;
        sqlx::query(
            "INSERT INTO audit_log (id, user_id, feature, prompt, response, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.id)
        .bind(entry.user_id.as_str())
        .bind(entry.feature.to_string())
        .bind(entry.prompt.as_str())
        .bind(response)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
