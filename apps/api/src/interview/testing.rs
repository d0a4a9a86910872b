//! In-memory implementations of the interview seams for tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream;
use serde_json::Value;
use uuid::Uuid;

use crate::errors::AppError;
use crate::interview::ai::{InterviewAi, Turn};
use crate::interview::report::InterviewReport;
use crate::interview::store::{
    unanswerable, NewSession, OpenedSession, SessionStore, Supersede,
};
use crate::llm_client::{LlmError, TextStream};
use crate::models::interview::{
    Difficulty, InterviewQuestionRow, InterviewSessionRow, SessionStatus,
};
use crate::models::resume::ResumeRow;
use crate::resumes::store::{NewResume, ResumeStore};

#[derive(Default)]
struct Tables {
    sessions: Vec<InterviewSessionRow>,
    questions: Vec<InterviewQuestionRow>,
}

/// Mirrors the Postgres store, including the one-running-session rule.
#[derive(Default)]
pub struct MemorySessionStore {
    tables: Mutex<Tables>,
    text_updates: AtomicUsize,
    /// Makes `questions` yield first, like a database round trip, so
    /// concurrent callers interleave.
    pub yield_on_read: AtomicBool,
}

impl MemorySessionStore {
    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap()
    }

    pub fn question_text(&self, question_id: Uuid) -> String {
        self.tables()
            .questions
            .iter()
            .find(|q| q.id == question_id)
            .map(|q| q.question_text.clone())
            .unwrap_or_default()
    }

    pub fn text_update_count(&self) -> usize {
        self.text_updates.load(Ordering::SeqCst)
    }

    pub fn status_of(&self, session_id: Uuid) -> Option<SessionStatus> {
        self.tables()
            .sessions
            .iter()
            .find(|s| s.id == session_id)
            .map(|s| s.status)
    }

    /// Pretends the session has been idle since `at`.
    pub fn set_updated_at(&self, session_id: Uuid, at: DateTime<Utc>) {
        if let Some(s) = self.tables().sessions.iter_mut().find(|s| s.id == session_id) {
            s.updated_at = at;
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn open_session(
        &self,
        new: NewSession,
        supersede: Supersede,
    ) -> Result<OpenedSession, AppError> {
        let mut tables = self.tables();
        let now = Utc::now();

        let mut superseded = Vec::new();
        for s in tables.sessions.iter_mut().filter(|s| {
            s.user_id == new.user_id && s.status == SessionStatus::Running
        }) {
            let replaceable = match supersede {
                Supersede::All => true,
                Supersede::IdleSince(at) => s.updated_at < at,
            };
            if replaceable {
                s.status = SessionStatus::Canceled;
                s.updated_at = now;
                superseded.push(s.id);
            }
        }

        let still_running = tables
            .sessions
            .iter()
            .any(|s| s.user_id == new.user_id && s.status == SessionStatus::Running);
        if still_running {
            // Roll back.
            for s in tables.sessions.iter_mut().filter(|s| superseded.contains(&s.id)) {
                s.status = SessionStatus::Running;
            }
            return Err(AppError::Conflict(
                "An unfinished interview already exists".to_string(),
            ));
        }

        let session = InterviewSessionRow {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            resume_id: new.resume_id,
            job_position: new.job_position,
            difficulty: new.difficulty,
            question_count: new.question_count,
            status: SessionStatus::Running,
            duration_secs: None,
            started_at: Some(now),
            finished_at: None,
            report: None,
            created_at: now,
            updated_at: now,
        };
        tables.sessions.push(session.clone());
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
        Ok(self
            .tables()
            .sessions
            .iter()
            .find(|s| s.id == session_id && s.user_id == user_id)
            .cloned())
    }

    async fn list_sessions(&self, user_id: Uuid) -> Result<Vec<InterviewSessionRow>, AppError> {
        let mut sessions: Vec<_> = self
            .tables()
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        sessions.reverse();
        Ok(sessions)
    }

    async fn questions(&self, session_id: Uuid) -> Result<Vec<InterviewQuestionRow>, AppError> {
        if self.yield_on_read.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        let mut questions: Vec<_> = self
            .tables()
            .questions
            .iter()
            .filter(|q| q.session_id == session_id)
            .cloned()
            .collect();
        questions.sort_by_key(|q| q.sequence);
        Ok(questions)
    }

    async fn append_question(
        &self,
        session_id: Uuid,
        question_text: &str,
    ) -> Result<InterviewQuestionRow, AppError> {
        let mut tables = self.tables();
        if !tables.sessions.iter().any(|s| s.id == session_id) {
            return Err(AppError::NotFound(format!("Interview {session_id} not found")));
        }
        let sequence = tables
            .questions
            .iter()
            .filter(|q| q.session_id == session_id)
            .map(|q| q.sequence)
            .max()
            .unwrap_or(0)
            + 1;
        let question = InterviewQuestionRow {
            id: Uuid::new_v4(),
            session_id,
            sequence,
            question_text: question_text.to_string(),
            answer_text: None,
            ai_feedback: None,
            created_at: Utc::now(),
            answered_at: None,
            evaluated_at: None,
        };
        tables.questions.push(question.clone());
        Ok(question)
    }

    async fn update_question_text(&self, question_id: Uuid, text: &str) -> Result<(), AppError> {
        self.text_updates.fetch_add(1, Ordering::SeqCst);
        if let Some(q) = self.tables().questions.iter_mut().find(|q| q.id == question_id) {
            q.question_text = text.to_string();
        }
        Ok(())
    }

    async fn record_answer(
        &self,
        session_id: Uuid,
        question_id: Uuid,
        answer: &str,
    ) -> Result<(), AppError> {
        let mut tables = self.tables();
        let question = tables
            .questions
            .iter_mut()
            .find(|q| q.id == question_id && q.session_id == session_id)
            .ok_or_else(|| AppError::NotFound(format!("Question {question_id} not found")))?;
        if question.answer_text.is_some() || question.question_text.trim().is_empty() {
            return Err(unanswerable(
                question_id,
                &question.question_text,
                question.answer_text.as_deref(),
            ));
        }
        question.answer_text = Some(answer.to_string());
        question.answered_at = Some(Utc::now());
        if let Some(s) = tables.sessions.iter_mut().find(|s| s.id == session_id) {
            s.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn record_feedback(&self, question_id: Uuid, feedback: &Value) -> Result<(), AppError> {
        if let Some(q) = self.tables().questions.iter_mut().find(|q| q.id == question_id) {
            q.ai_feedback = Some(feedback.clone());
            q.evaluated_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn count_answered(&self, session_id: Uuid) -> Result<i64, AppError> {
        Ok(self
            .tables()
            .questions
            .iter()
            .filter(|q| q.session_id == session_id && q.answer_text.is_some())
            .count() as i64)
    }

    async fn finish_session(
        &self,
        session_id: Uuid,
        report: &Value,
        duration_secs: i32,
    ) -> Result<Option<InterviewSessionRow>, AppError> {
        let mut tables = self.tables();
        let Some(s) = tables
            .sessions
            .iter_mut()
            .find(|s| s.id == session_id && s.status == SessionStatus::Running)
        else {
            return Ok(None);
        };
        s.status = SessionStatus::Finished;
        s.report = Some(report.clone());
        s.duration_secs = Some(duration_secs);
        s.finished_at = Some(Utc::now());
        s.updated_at = Utc::now();
        Ok(Some(s.clone()))
    }

    async fn cancel_session(&self, session_id: Uuid) -> Result<bool, AppError> {
        let mut tables = self.tables();
        match tables
            .sessions
            .iter_mut()
            .find(|s| s.id == session_id && s.status == SessionStatus::Running)
        {
            Some(s) => {
                s.status = SessionStatus::Canceled;
                s.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_running(
        &self,
        user_id: Uuid,
        active_since: DateTime<Utc>,
    ) -> Result<Option<InterviewSessionRow>, AppError> {
        Ok(self
            .tables()
            .sessions
            .iter()
            .find(|s| {
                s.user_id == user_id
                    && s.status == SessionStatus::Running
                    && s.updated_at >= active_since
            })
            .cloned())
    }

    async fn cancel_idle_sessions(&self, idle_before: DateTime<Utc>) -> Result<u64, AppError> {
        let mut canceled = 0;
        for s in self
            .tables()
            .sessions
            .iter_mut()
            .filter(|s| s.status == SessionStatus::Running && s.updated_at < idle_before)
        {
            s.status = SessionStatus::Canceled;
            canceled += 1;
        }
        Ok(canceled)
    }

    async fn delete_session(&self, user_id: Uuid, session_id: Uuid) -> Result<bool, AppError> {
        let mut tables = self.tables();
        let before = tables.sessions.len();
        tables
            .sessions
            .retain(|s| !(s.id == session_id && s.user_id == user_id));
        let deleted = tables.sessions.len() < before;
        if deleted {
            tables.questions.retain(|q| q.session_id != session_id);
        }
        Ok(deleted)
    }
}

#[derive(Default)]
pub struct MemoryResumeStore {
    resumes: Mutex<Vec<ResumeRow>>,
}

#[async_trait]
impl ResumeStore for MemoryResumeStore {
    async fn find(&self, user_id: Uuid, resume_id: Uuid) -> Result<Option<ResumeRow>, AppError> {
        Ok(self
            .resumes
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == resume_id && r.user_id == user_id)
            .cloned())
    }

    async fn list(&self, user_id: Uuid) -> Result<Vec<ResumeRow>, AppError> {
        Ok(self
            .resumes
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn insert(&self, resume: NewResume) -> Result<ResumeRow, AppError> {
        let row = ResumeRow {
            id: Uuid::new_v4(),
            user_id: resume.user_id,
            title: resume.title,
            file_type: resume.file_type,
            file_size_kb: resume.file_size_kb,
            s3_key: resume.s3_key,
            status: resume.status,
            content_json: resume.content_json,
            parsed_content: resume.parsed_content,
            is_default: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        self.resumes.lock().unwrap().push(row.clone());
        Ok(row)
    }

    async fn delete(&self, user_id: Uuid, resume_id: Uuid) -> Result<Option<ResumeRow>, AppError> {
        let mut resumes = self.resumes.lock().unwrap();
        let index = resumes
            .iter()
            .position(|r| r.id == resume_id && r.user_id == user_id);
        Ok(index.map(|i| resumes.remove(i)))
    }
}

/// Scripted interviewer with call counters and failure switches.
pub struct FakeInterviewAi {
    pub next_question_chunks: Vec<String>,
    pub report: Value,
    pub fail_opening: AtomicBool,
    pub fail_feedback: AtomicBool,
    pub fail_stream: AtomicBool,
    pub fail_report: AtomicBool,
    pub opening_calls: AtomicUsize,
    pub report_calls: AtomicUsize,
    /// Resume text passed to the last opening-question call.
    pub last_resume_text: Mutex<Option<String>>,
    /// History passed to the last next-question call.
    pub last_history: Mutex<Vec<Turn>>,
}

impl Default for FakeInterviewAi {
    fn default() -> Self {
        Self {
            next_question_chunks: vec!["How do you ".into(), "design for failure?".into()],
            report: serde_json::json!({
                "overall_score": "78",
                "ability_scores": [
                    { "name": "Technical Knowledge", "score": "4.2" },
                    { "name": "Project Experience", "score": 3.5 },
                    { "name": "Logical Thinking", "score": 4 },
                    { "name": "Communication", "score": "9" },
                    { "name": "Motivation", "score": "n/a" }
                ],
                "overall_comment": "Solid fundamentals.",
                "improvement_suggestions": ["Quantify outcomes"],
                "star_analysis": [
                    { "question_sequence": 1, "is_behavioral_question": true, "conforms_to_star": "false", "star_feedback": "Result missing" }
                ]
            }),
            fail_opening: AtomicBool::new(false),
            fail_feedback: AtomicBool::new(false),
            fail_stream: AtomicBool::new(false),
            fail_report: AtomicBool::new(false),
            opening_calls: AtomicUsize::new(0),
            report_calls: AtomicUsize::new(0),
            last_resume_text: Mutex::new(None),
            last_history: Mutex::new(Vec::new()),
        }
    }
}

fn upstream_down() -> LlmError {
    LlmError::Api {
        status: 503,
        message: "upstream unavailable".into(),
    }
}

#[async_trait]
impl InterviewAi for FakeInterviewAi {
    async fn opening_question(
        &self,
        _user_id: Uuid,
        job_position: &str,
        _difficulty: Difficulty,
        resume_text: Option<&str>,
    ) -> Result<String, LlmError> {
        self.opening_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_resume_text.lock().unwrap() = resume_text.map(str::to_string);
        if self.fail_opening.load(Ordering::SeqCst) {
            return Err(upstream_down());
        }
        Ok(format!("Why do you want to be a {job_position}?"))
    }

    async fn answer_feedback(
        &self,
        _user_id: Uuid,
        _job_position: &str,
        _question: &str,
        answer: &str,
    ) -> Result<String, LlmError> {
        if self.fail_feedback.load(Ordering::SeqCst) {
            return Err(upstream_down());
        }
        Ok(format!("Good answer: {answer}"))
    }

    async fn next_question_stream(
        &self,
        _user_id: Uuid,
        _job_position: &str,
        _difficulty: Difficulty,
        history: &[Turn],
    ) -> Result<TextStream, LlmError> {
        *self.last_history.lock().unwrap() = history.to_vec();
        if self.fail_stream.load(Ordering::SeqCst) {
            return Err(upstream_down());
        }
        let chunks: Vec<Result<String, LlmError>> =
            self.next_question_chunks.iter().cloned().map(Ok).collect();
        Ok(Box::pin(stream::iter(chunks)))
    }

    async fn final_report(
        &self,
        _user_id: Uuid,
        _job_position: &str,
        _history: &[Turn],
    ) -> Result<InterviewReport, LlmError> {
        self.report_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_report.load(Ordering::SeqCst) {
            return Err(upstream_down());
        }
        Ok(serde_json::from_value(self.report.clone())?)
    }
}
