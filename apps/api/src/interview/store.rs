use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::is_unique_violation;
use crate::errors::AppError;
use crate::models::interview::{Difficulty, InterviewQuestionRow, InterviewSessionRow};

#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: Uuid,
    pub resume_id: Option<Uuid>,
    pub job_position: String,
    pub difficulty: Difficulty,
    pub question_count: i32,
}

/// Which of the user's Running sessions a new session may replace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Supersede {
    /// Every Running session (forced restart).
    All,
    /// Only Running sessions untouched since the given instant.
    IdleSince(DateTime<Utc>),
}

#[derive(Debug, Clone)]
pub struct OpenedSession {
    pub session: InterviewSessionRow,
    /// Sessions moved to Canceled to make room for this one.
    pub superseded: Vec<Uuid>,
}

/// Session and question persistence.
///
/// Lookups taking a `user_id` are scoped to that user. At most one session
/// per user is Running; `open_session` reports a violation as `Conflict`.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Cancels superseded Running sessions and inserts a Running session,
    /// atomically.
    async fn open_session(
        &self,
        new: NewSession,
        supersede: Supersede,
    ) -> Result<OpenedSession, AppError>;

    async fn find_session(
        &self,
        user_id: Uuid,
        session_id: Uuid,
    ) -> Result<Option<InterviewSessionRow>, AppError>;

    /// Newest first.
    async fn list_sessions(&self, user_id: Uuid) -> Result<Vec<InterviewSessionRow>, AppError>;

    /// Ordered by sequence.
    async fn questions(&self, session_id: Uuid) -> Result<Vec<InterviewQuestionRow>, AppError>;

    /// Appends a question with the next sequence number (1 for the first).
    async fn append_question(
        &self,
        session_id: Uuid,
        question_text: &str,
    ) -> Result<InterviewQuestionRow, AppError>;

    async fn update_question_text(&self, question_id: Uuid, text: &str) -> Result<(), AppError>;

    /// Stores the answer and marks the session as recently active.
    ///
    /// Only an unanswered question whose text has been generated accepts an
    /// answer; the check and the write are one atomic step.
    async fn record_answer(
        &self,
        session_id: Uuid,
        question_id: Uuid,
        answer: &str,
    ) -> Result<(), AppError>;

    async fn record_feedback(&self, question_id: Uuid, feedback: &Value) -> Result<(), AppError>;

    async fn count_answered(&self, session_id: Uuid) -> Result<i64, AppError>;

    /// Running → Finished with the report attached. `None` if the session was
    /// no longer Running.
    async fn finish_session(
        &self,
        session_id: Uuid,
        report: &Value,
        duration_secs: i32,
    ) -> Result<Option<InterviewSessionRow>, AppError>;

    /// Running → Canceled. Returns whether a row changed.
    async fn cancel_session(&self, session_id: Uuid) -> Result<bool, AppError>;

    /// The user's Running session, if it was active at or after `active_since`.
    async fn find_running(
        &self,
        user_id: Uuid,
        active_since: DateTime<Utc>,
    ) -> Result<Option<InterviewSessionRow>, AppError>;

    /// Cancels every Running session idle since before `idle_before`.
    async fn cancel_idle_sessions(&self, idle_before: DateTime<Utc>) -> Result<u64, AppError>;

    /// Deletes the session and its questions. Returns whether it existed.
    async fn delete_session(&self, user_id: Uuid, session_id: Uuid) -> Result<bool, AppError>;
}

/// Why `question_id` cannot take an answer right now.
pub fn unanswerable(question_id: Uuid, question_text: &str, answer_text: Option<&str>) -> AppError {
    if answer_text.is_some() {
        AppError::Validation(format!("Question {question_id} has already been answered"))
    } else if question_text.trim().is_empty() {
        AppError::Validation(format!("Question {question_id} is still being generated"))
    } else {
        AppError::Internal(anyhow::anyhow!("Answer to question {question_id} was not stored"))
    }
}

pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn open_session(
        &self,
        new: NewSession,
        supersede: Supersede,
    ) -> Result<OpenedSession, AppError> {
        let mut tx = self.pool.begin().await?;

        let idle_before = match supersede {
            Supersede::All => None,
            Supersede::IdleSince(at) => Some(at),
        };
        let superseded: Vec<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE interview_sessions
            SET status = 'canceled', updated_at = now()
            WHERE user_id = $1
              AND status = 'running'
              AND ($2::timestamptz IS NULL OR updated_at < $2)
            RETURNING id
            "#,
        )
        .bind(new.user_id)
        .bind(idle_before)
        .fetch_all(&mut *tx)
        .await?;

        let inserted = sqlx::query_as::<_, InterviewSessionRow>(
            r#"
            INSERT INTO interview_sessions
                (id, user_id, resume_id, job_position, difficulty, question_count, status, started_at)
            VALUES ($1, $2, $3, $4, $5, $6, 'running', now())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.user_id)
        .bind(new.resume_id)
        .bind(&new.job_position)
        .bind(new.difficulty)
        .bind(new.question_count)
        .fetch_one(&mut *tx)
        .await;

        let session = match inserted {
            Ok(session) => session,
            Err(e) if is_unique_violation(&e) => {
                return Err(AppError::Conflict(
                    "An unfinished interview already exists".to_string(),
                ))
            }
            Err(e) => return Err(e.into()),
        };

        tx.commit().await?;
        Ok(OpenedSession {
            session,
            superseded,
        })
    }

    async fn find_session(
        &self,
        user_id: Uuid,
        session_id: Uuid,
    ) -> Result<Option<InterviewSessionRow>, AppError> {
        Ok(sqlx::query_as::<_, InterviewSessionRow>(
            "SELECT * FROM interview_sessions WHERE id = $1 AND user_id = $2",
        )
        .bind(session_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn list_sessions(&self, user_id: Uuid) -> Result<Vec<InterviewSessionRow>, AppError> {
        Ok(sqlx::query_as::<_, InterviewSessionRow>(
            "SELECT * FROM interview_sessions WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn questions(&self, session_id: Uuid) -> Result<Vec<InterviewQuestionRow>, AppError> {
        Ok(sqlx::query_as::<_, InterviewQuestionRow>(
            "SELECT * FROM interview_questions WHERE session_id = $1 ORDER BY sequence",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn append_question(
        &self,
        session_id: Uuid,
        question_text: &str,
    ) -> Result<InterviewQuestionRow, AppError> {
        let mut tx = self.pool.begin().await?;

        // Serializes sequence allocation per session.
        sqlx::query("SELECT id FROM interview_sessions WHERE id = $1 FOR UPDATE")
            .bind(session_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Interview {session_id} not found")))?;

        let question = sqlx::query_as::<_, InterviewQuestionRow>(
            r#"
            INSERT INTO interview_questions (id, session_id, sequence, question_text)
            SELECT $1, $2, COALESCE(MAX(sequence), 0) + 1, $3
            FROM interview_questions
            WHERE session_id = $2
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(session_id)
        .bind(question_text)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(question)
    }

    async fn update_question_text(&self, question_id: Uuid, text: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE interview_questions SET question_text = $2 WHERE id = $1")
            .bind(question_id)
            .bind(text)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_answer(
        &self,
        session_id: Uuid,
        question_id: Uuid,
        answer: &str,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE interview_questions
            SET answer_text = $3, answered_at = now()
            WHERE id = $2 AND session_id = $1
              AND answer_text IS NULL
              AND btrim(question_text) <> ''
            "#,
        )
        .bind(session_id)
        .bind(question_id)
        .bind(answer)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            let current: Option<(String, Option<String>)> = sqlx::query_as(
                "SELECT question_text, answer_text FROM interview_questions WHERE id = $2 AND session_id = $1",
            )
            .bind(session_id)
            .bind(question_id)
            .fetch_optional(&mut *tx)
            .await?;
            return Err(match current {
                None => AppError::NotFound(format!("Question {question_id} not found")),
                Some((question_text, answer_text)) => {
                    unanswerable(question_id, &question_text, answer_text.as_deref())
                }
            });
        }

        sqlx::query("UPDATE interview_sessions SET updated_at = now() WHERE id = $1")
            .bind(session_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn record_feedback(&self, question_id: Uuid, feedback: &Value) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE interview_questions SET ai_feedback = $2, evaluated_at = now() WHERE id = $1",
        )
        .bind(question_id)
        .bind(feedback)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count_answered(&self, session_id: Uuid) -> Result<i64, AppError> {
        Ok(sqlx::query_scalar(
            "SELECT COUNT(*) FROM interview_questions WHERE session_id = $1 AND answer_text IS NOT NULL",
        )
        .bind(session_id)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn finish_session(
        &self,
        session_id: Uuid,
        report: &Value,
        duration_secs: i32,
    ) -> Result<Option<InterviewSessionRow>, AppError> {
        Ok(sqlx::query_as::<_, InterviewSessionRow>(
            r#"
            UPDATE interview_sessions
            SET status = 'finished', report = $2, duration_secs = $3,
                finished_at = now(), updated_at = now()
            WHERE id = $1 AND status = 'running'
            RETURNING *
            "#,
        )
        .bind(session_id)
        .bind(report)
        .bind(duration_secs)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn cancel_session(&self, session_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE interview_sessions
            SET status = 'canceled', updated_at = now()
            WHERE id = $1 AND status = 'running'
            "#,
        )
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_running(
        &self,
        user_id: Uuid,
        active_since: DateTime<Utc>,
    ) -> Result<Option<InterviewSessionRow>, AppError> {
        Ok(sqlx::query_as::<_, InterviewSessionRow>(
            r#"
            SELECT * FROM interview_sessions
            WHERE user_id = $1 AND status = 'running' AND updated_at >= $2
            "#,
        )
        .bind(user_id)
        .bind(active_since)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn cancel_idle_sessions(&self, idle_before: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE interview_sessions
            SET status = 'canceled', updated_at = now()
            WHERE status = 'running' AND updated_at < $1
            "#,
        )
        .bind(idle_before)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_session(&self, user_id: Uuid, session_id: Uuid) -> Result<bool, AppError> {
        // Questions go with the session through ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM interview_sessions WHERE id = $1 AND user_id = $2")
            .bind(session_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
