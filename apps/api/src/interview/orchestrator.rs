//! Interview state machine.
//!
//! Pending → Running → {Finished, Canceled}. Sessions are created Running
//! with their opening question; nothing leaves Finished or Canceled.
//!
//! AI failures while asking questions or giving feedback degrade to fixed
//! fallback text. The final report is the exception and breaks with that
//! fallback policy on purpose: an upstream failure is returned as a 502,
//! nothing is stored, and the session stays Running so `finish` can be
//! retried. A stored report is therefore always real model output.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::interview::ai::{InterviewAi, Turn};
use crate::interview::cache::UnfinishedSessionCache;
use crate::interview::store::{unanswerable, NewSession, SessionStore, Supersede};
use crate::interview::streaming::{spawn_question_generation, QuestionStream};
use crate::models::interview::{
    Difficulty, InterviewQuestionRow, InterviewSessionRow, SessionDetail, SessionStatus,
};
use crate::resumes::store::ResumeStore;
use crate::resumes::text::resume_plain_text;

pub const MAX_JOB_POSITION_CHARS: usize = 100;
pub const MAX_QUESTION_COUNT: i32 = 10;
pub const DEFAULT_QUESTION_COUNT: i32 = 5;

pub const FALLBACK_FEEDBACK: &str = "The AI ran into a problem while reviewing this answer.";
pub const FALLBACK_NEXT_QUESTION: &str =
    "What is the biggest technical challenge you have faced, and how did you handle it?";

fn fallback_opening(job_position: &str) -> String {
    format!(
        "Hello, and welcome to the {job_position} interview. Let's begin with a classic: \
         please give a brief introduction of yourself."
    )
}

#[derive(Debug, Clone)]
pub struct StartInterview {
    pub user_id: Uuid,
    pub job_position: String,
    pub resume_id: Option<Uuid>,
    pub question_count: i32,
    pub difficulty: Difficulty,
}

/// Result of answering a question.
#[derive(Debug)]
pub enum AnswerOutcome {
    /// The quota is reached; the client should call finish.
    Finished { feedback: String },
    /// The next question is being generated into `question`.
    NextQuestion {
        feedback: String,
        question: InterviewQuestionRow,
        stream: QuestionStream,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnfinishedStatus {
    pub has_unfinished: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_position: Option<String>,
}

#[derive(Clone)]
pub struct InterviewOrchestrator {
    store: Arc<dyn SessionStore>,
    cache: Arc<dyn UnfinishedSessionCache>,
    resumes: Arc<dyn ResumeStore>,
    ai: Arc<dyn InterviewAi>,
    ttl: Duration,
}

impl InterviewOrchestrator {
    pub fn new(
        store: Arc<dyn SessionStore>,
        cache: Arc<dyn UnfinishedSessionCache>,
        resumes: Arc<dyn ResumeStore>,
        ai: Arc<dyn InterviewAi>,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            cache,
            resumes,
            ai,
            ttl,
        }
    }

    pub async fn start(&self, req: StartInterview, force: bool) -> Result<SessionDetail, AppError> {
        let job_position = req.job_position.trim().to_string();
        if job_position.is_empty() {
            return Err(AppError::Validation("job_position is required".to_string()));
        }
        if job_position.chars().count() > MAX_JOB_POSITION_CHARS {
            return Err(AppError::Validation(format!(
                "job_position must be at most {MAX_JOB_POSITION_CHARS} characters"
            )));
        }
        if !(1..=MAX_QUESTION_COUNT).contains(&req.question_count) {
            return Err(AppError::Validation(format!(
                "question_count must be between 1 and {MAX_QUESTION_COUNT}"
            )));
        }

        let resume_text = match req.resume_id {
            Some(resume_id) => {
                let resume = self
                    .resumes
                    .find(req.user_id, resume_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("Resume {resume_id} not found")))?;
                Some(resume_plain_text(&resume))
            }
            None => None,
        };

        if !force {
            if let Some(existing) = self.cached_running(req.user_id).await? {
                return Err(AppError::Conflict(format!(
                    "An unfinished interview already exists ({})",
                    existing.id
                )));
            }
        }

        let supersede = if force {
            Supersede::All
        } else {
            Supersede::IdleSince(self.idle_cutoff())
        };
        let opened = self
            .store
            .open_session(
                NewSession {
                    user_id: req.user_id,
                    resume_id: req.resume_id,
                    job_position: job_position.clone(),
                    difficulty: req.difficulty,
                    question_count: req.question_count,
                },
                supersede,
            )
            .await?;
        let session = opened.session;
        if !opened.superseded.is_empty() {
            info!(
                user_id = %req.user_id,
                superseded = ?opened.superseded,
                "Canceled unfinished interviews"
            );
        }

        let opening = match self
            .ai
            .opening_question(req.user_id, &job_position, req.difficulty, resume_text.as_deref())
            .await
        {
            Ok(question) => question,
            Err(e) => {
                warn!(session_id = %session.id, "Opening question failed, using fallback: {e}");
                fallback_opening(&job_position)
            }
        };
        let first = self.store.append_question(session.id, &opening).await?;

        self.remember(req.user_id, session.id).await;
        info!(
            user_id = %req.user_id,
            session_id = %session.id,
            question_count = session.question_count,
            "Interview started"
        );

        Ok(SessionDetail {
            session,
            questions: vec![first],
        })
    }

    pub async fn submit_answer(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        question_id: Uuid,
        answer: &str,
    ) -> Result<AnswerOutcome, AppError> {
        let answer = answer.trim();
        if answer.is_empty() {
            return Err(AppError::Validation("answer_text cannot be empty".to_string()));
        }

        let session = self.require_session(user_id, session_id).await?;
        if session.status != SessionStatus::Running {
            return Err(AppError::Validation(
                "This interview is no longer in progress".to_string(),
            ));
        }

        let questions = self.store.questions(session_id).await?;
        let question = questions
            .iter()
            .find(|q| q.id == question_id)
            .ok_or_else(|| AppError::NotFound(format!("Question {question_id} not found")))?;
        if question.answer_text.is_some() || question.question_text.trim().is_empty() {
            return Err(unanswerable(
                question_id,
                &question.question_text,
                question.answer_text.as_deref(),
            ));
        }

        // The store re-checks atomically; a concurrent submission loses here.
        self.store.record_answer(session_id, question_id, answer).await?;
        self.remember(user_id, session_id).await;

        let feedback = match self
            .ai
            .answer_feedback(user_id, &session.job_position, &question.question_text, answer)
            .await
        {
            Ok(feedback) => feedback,
            Err(e) => {
                warn!(%session_id, %question_id, "Answer feedback failed, using fallback: {e}");
                FALLBACK_FEEDBACK.to_string()
            }
        };
        self.store
            .record_feedback(question_id, &json!({ "feedback": feedback }))
            .await?;

        let answered = self.store.count_answered(session_id).await?;
        if answered >= i64::from(session.question_count) {
            info!(%session_id, answered, "Question quota reached");
            return Ok(AnswerOutcome::Finished { feedback });
        }

        let history = answered_history(&self.store.questions(session_id).await?);
        let next = self.store.append_question(session_id, "").await?;
        let upstream = self
            .ai
            .next_question_stream(user_id, &session.job_position, session.difficulty, &history)
            .await;
        let stream =
            spawn_question_generation(self.store.clone(), next.id, upstream, FALLBACK_NEXT_QUESTION);

        Ok(AnswerOutcome::NextQuestion {
            feedback,
            question: next,
            stream,
        })
    }

    /// Produces the final report. Re-finishing returns the stored report
    /// without calling the AI again.
    pub async fn finish(&self, user_id: Uuid, session_id: Uuid) -> Result<Value, AppError> {
        let session = self.require_session(user_id, session_id).await?;
        if let Some(report) = session.report {
            self.forget_if(user_id, session_id).await;
            return Ok(report);
        }
        if session.status != SessionStatus::Running {
            return Err(AppError::Validation(
                "This interview is no longer in progress".to_string(),
            ));
        }

        let history = answered_history(&self.store.questions(session_id).await?);
        if history.is_empty() {
            return Err(AppError::Validation(
                "There are no answers to evaluate yet".to_string(),
            ));
        }

        let report = self
            .ai
            .final_report(user_id, &session.job_position, &history)
            .await?;
        let report = serde_json::to_value(&report)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Report serialization failed: {e}")))?;

        let started = session.started_at.unwrap_or(session.created_at);
        let duration_secs = i32::try_from((Utc::now() - started).num_seconds().max(0))
            .unwrap_or(i32::MAX);

        let report = match self
            .store
            .finish_session(session_id, &report, duration_secs)
            .await?
        {
            Some(finished) => finished.report.unwrap_or(report),
            // Lost a race with another finish or a cancel; trust the store.
            None => self
                .require_session(user_id, session_id)
                .await?
                .report
                .ok_or_else(|| {
                    AppError::Validation("This interview is no longer in progress".to_string())
                })?,
        };

        self.forget_if(user_id, session_id).await;
        info!(%user_id, %session_id, duration_secs, "Interview finished");
        Ok(report)
    }

    pub async fn check_unfinished(&self, user_id: Uuid) -> Result<UnfinishedStatus, AppError> {
        Ok(match self.unfinished(user_id).await? {
            Some(session) => UnfinishedStatus {
                has_unfinished: true,
                session_id: Some(session.id),
                job_position: Some(session.job_position),
            },
            None => UnfinishedStatus {
                has_unfinished: false,
                session_id: None,
                job_position: None,
            },
        })
    }

    /// Cancels the user's unfinished interview. Returns its id.
    pub async fn abandon_unfinished(&self, user_id: Uuid) -> Result<Uuid, AppError> {
        let session = self
            .unfinished(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("No unfinished interview found".to_string()))?;

        self.store.cancel_session(session.id).await?;
        self.forget_if(user_id, session.id).await;
        info!(%user_id, session_id = %session.id, "Interview abandoned");
        Ok(session.id)
    }

    pub async fn get(&self, user_id: Uuid, session_id: Uuid) -> Result<SessionDetail, AppError> {
        let session = self.require_session(user_id, session_id).await?;
        let questions = self.store.questions(session_id).await?;
        Ok(SessionDetail { session, questions })
    }

    pub async fn list(&self, user_id: Uuid) -> Result<Vec<SessionDetail>, AppError> {
        let sessions = self.store.list_sessions(user_id).await?;
        let mut details = Vec::with_capacity(sessions.len());
        for session in sessions {
            let questions = self.store.questions(session.id).await?;
            details.push(SessionDetail { session, questions });
        }
        Ok(details)
    }

    pub async fn delete(&self, user_id: Uuid, session_id: Uuid) -> Result<(), AppError> {
        if !self.store.delete_session(user_id, session_id).await? {
            return Err(AppError::NotFound(format!("Interview {session_id} not found")));
        }
        self.forget_if(user_id, session_id).await;
        info!(%user_id, %session_id, "Interview deleted");
        Ok(())
    }

    fn idle_cutoff(&self) -> chrono::DateTime<Utc> {
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::hours(2));
        Utc::now() - ttl
    }

    async fn require_session(
        &self,
        user_id: Uuid,
        session_id: Uuid,
    ) -> Result<InterviewSessionRow, AppError> {
        self.store
            .find_session(user_id, session_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Interview {session_id} not found")))
    }

    /// The Running session the cache points at. Stale entries are dropped.
    async fn cached_running(&self, user_id: Uuid) -> Result<Option<InterviewSessionRow>, AppError> {
        let cached = match self.cache.get(user_id).await {
            Ok(cached) => cached,
            Err(e) => {
                error!(%user_id, "Unfinished-interview cache read failed: {e}");
                None
            }
        };
        let Some(session_id) = cached else {
            return Ok(None);
        };

        match self.store.find_session(user_id, session_id).await? {
            Some(session) if session.status == SessionStatus::Running => Ok(Some(session)),
            _ => {
                self.forget_if(user_id, session_id).await;
                Ok(None)
            }
        }
    }

    /// Cache first, then the store's recently active Running session, which
    /// is put back into the cache.
    async fn unfinished(&self, user_id: Uuid) -> Result<Option<InterviewSessionRow>, AppError> {
        if let Some(session) = self.cached_running(user_id).await? {
            return Ok(Some(session));
        }
        let running = self.store.find_running(user_id, self.idle_cutoff()).await?;
        if let Some(session) = &running {
            self.remember(user_id, session.id).await;
        }
        Ok(running)
    }

    async fn remember(&self, user_id: Uuid, session_id: Uuid) {
        if let Err(e) = self.cache.set(user_id, session_id).await {
            error!(%user_id, %session_id, "Unfinished-interview cache write failed: {e}");
        }
    }

    async fn forget_if(&self, user_id: Uuid, session_id: Uuid) {
        if let Err(e) = self.cache.clear_if(user_id, session_id).await {
            error!(%user_id, %session_id, "Unfinished-interview cache clear failed: {e}");
        }
    }
}

/// Answered questions in sequence order.
fn answered_history(questions: &[InterviewQuestionRow]) -> Vec<Turn> {
    questions
        .iter()
        .filter_map(|q| {
            q.answer_text.as_ref().map(|answer| Turn {
                sequence: q.sequence,
                question: q.question_text.clone(),
                answer: answer.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::interview::cache::MemoryUnfinishedCache;
    use crate::interview::testing::{FakeInterviewAi, MemoryResumeStore, MemorySessionStore};
    use crate::models::resume::ResumeStatus;
    use crate::resumes::store::NewResume;

    const TTL: Duration = Duration::from_secs(7200);

    struct Harness {
        orchestrator: InterviewOrchestrator,
        store: Arc<MemorySessionStore>,
        cache: Arc<MemoryUnfinishedCache>,
        resumes: Arc<MemoryResumeStore>,
        ai: Arc<FakeInterviewAi>,
        user: Uuid,
    }

    fn harness_with(ai: FakeInterviewAi) -> Harness {
        let store = Arc::new(MemorySessionStore::default());
        let cache = Arc::new(MemoryUnfinishedCache::new(TTL));
        let resumes = Arc::new(MemoryResumeStore::default());
        let ai = Arc::new(ai);
        let orchestrator =
            InterviewOrchestrator::new(store.clone(), cache.clone(), resumes.clone(), ai.clone(), TTL);
        Harness {
            orchestrator,
            store,
            cache,
            resumes,
            ai,
            user: Uuid::new_v4(),
        }
    }

    fn harness() -> Harness {
        harness_with(FakeInterviewAi::default())
    }

    fn start_req(h: &Harness, question_count: i32) -> StartInterview {
        StartInterview {
            user_id: h.user,
            job_position: "Backend Engineer".into(),
            resume_id: None,
            question_count,
            difficulty: Difficulty::Medium,
        }
    }

    async fn answer(h: &Harness, session_id: Uuid, question_id: Uuid, text: &str) -> AnswerOutcome {
        h.orchestrator
            .submit_answer(h.user, session_id, question_id, text)
            .await
            .unwrap()
    }

    async fn next_question(outcome: AnswerOutcome) -> (String, InterviewQuestionRow, String) {
        match outcome {
            AnswerOutcome::NextQuestion {
                feedback,
                question,
                stream,
            } => {
                let text = stream.generation.await.unwrap();
                (feedback, question, text)
            }
            AnswerOutcome::Finished { .. } => panic!("expected a next question"),
        }
    }

    #[tokio::test]
    async fn test_full_interview_walkthrough() {
        let h = harness();
        let detail = h.orchestrator.start(start_req(&h, 2), false).await.unwrap();
        let session_id = detail.session.id;
        assert_eq!(detail.session.status, SessionStatus::Running);
        assert_eq!(detail.questions.len(), 1);
        assert_eq!(detail.questions[0].sequence, 1);

        let outcome = answer(&h, session_id, detail.questions[0].id, "I build APIs").await;
        let (feedback, q2, text) = next_question(outcome).await;
        assert_eq!(feedback, "Good answer: I build APIs");
        assert_eq!(q2.sequence, 2);
        assert_eq!(text, "How do you design for failure?");

        match answer(&h, session_id, q2.id, "Retries and timeouts").await {
            AnswerOutcome::Finished { feedback } => {
                assert_eq!(feedback, "Good answer: Retries and timeouts")
            }
            AnswerOutcome::NextQuestion { .. } => panic!("quota should be reached"),
        }

        let report = h.orchestrator.finish(h.user, session_id).await.unwrap();
        let score = report["overall_score"].as_i64().unwrap();
        assert!((0..=100).contains(&score));
        let abilities = report["ability_scores"].as_array().unwrap();
        assert_eq!(abilities.len(), 5);
        for ability in abilities {
            let s = ability["score"].as_f64().unwrap();
            assert!((0.0..=5.0).contains(&s));
        }

        assert_eq!(h.store.status_of(session_id), Some(SessionStatus::Finished));
        assert_eq!(h.cache.get(h.user).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_concurrent_answers_to_one_question_record_one() {
        let h = harness();
        let detail = h.orchestrator.start(start_req(&h, 3), false).await.unwrap();
        let session_id = detail.session.id;
        let q1 = detail.questions[0].id;
        h.store.yield_on_read.store(true, Ordering::SeqCst);

        let (first, second) = tokio::join!(
            h.orchestrator.submit_answer(h.user, session_id, q1, "first"),
            h.orchestrator.submit_answer(h.user, session_id, q1, "second"),
        );
        let (accepted, rejected) = match (first, second) {
            (Ok(accepted), Err(rejected)) | (Err(rejected), Ok(accepted)) => (accepted, rejected),
            _ => panic!("exactly one of the two answers should be accepted"),
        };
        assert!(matches!(rejected, AppError::Validation(_)));
        next_question(accepted).await;

        let questions = h.store.questions(session_id).await.unwrap();
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].answer_text.as_deref(), Some("first"));
        assert_eq!(questions[1].answer_text, None);
    }

    #[tokio::test]
    async fn test_answer_before_question_is_generated_is_rejected() {
        let h = harness();
        let detail = h.orchestrator.start(start_req(&h, 3), false).await.unwrap();
        let session_id = detail.session.id;

        let outcome = answer(&h, session_id, detail.questions[0].id, "I build APIs").await;
        let AnswerOutcome::NextQuestion { question, stream, .. } = outcome else {
            panic!("expected a next question");
        };
        assert_eq!(h.store.question_text(question.id), "");

        let err = h
            .orchestrator
            .submit_answer(h.user, session_id, question.id, "Too early")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(h.store.count_answered(session_id).await.unwrap(), 1);

        let text = stream.generation.await.unwrap();
        assert_eq!(h.store.question_text(question.id), text);
        answer(&h, session_id, question.id, "Retries and timeouts").await;
        assert_eq!(h.store.count_answered(session_id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_sequences_are_contiguous() {
        let h = harness();
        let detail = h.orchestrator.start(start_req(&h, 4), false).await.unwrap();
        let session_id = detail.session.id;

        let mut current = detail.questions[0].id;
        for i in 0..3 {
            let (_, next, _) = next_question(answer(&h, session_id, current, &format!("a{i}")).await).await;
            current = next.id;
        }

        let sequences: Vec<i32> = h
            .orchestrator
            .get(h.user, session_id)
            .await
            .unwrap()
            .questions
            .iter()
            .map(|q| q.sequence)
            .collect();
        assert_eq!(sequences, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_start_conflicts_unless_forced() {
        let h = harness();
        let first = h.orchestrator.start(start_req(&h, 3), false).await.unwrap();

        let err = h.orchestrator.start(start_req(&h, 3), false).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let second = h.orchestrator.start(start_req(&h, 3), true).await.unwrap();
        assert_ne!(first.session.id, second.session.id);
        assert_eq!(h.store.status_of(first.session.id), Some(SessionStatus::Canceled));
        assert_eq!(h.store.status_of(second.session.id), Some(SessionStatus::Running));
        assert_eq!(h.cache.get(h.user).await.unwrap(), Some(second.session.id));

        let all = h.orchestrator.list(h.user).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_lost_cache_entry_still_conflicts() {
        let h = harness();
        h.orchestrator.start(start_req(&h, 3), false).await.unwrap();
        h.cache.clear(h.user).await.unwrap();

        let err = h.orchestrator.start(start_req(&h, 3), false).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_idle_orphan_is_superseded_without_force() {
        let h = harness();
        let orphan = h.orchestrator.start(start_req(&h, 3), false).await.unwrap();
        h.cache.clear(h.user).await.unwrap();
        h.store
            .set_updated_at(orphan.session.id, Utc::now() - ChronoDuration::hours(3));

        let fresh = h.orchestrator.start(start_req(&h, 3), false).await.unwrap();
        assert_eq!(h.store.status_of(orphan.session.id), Some(SessionStatus::Canceled));
        assert_eq!(h.store.status_of(fresh.session.id), Some(SessionStatus::Running));
    }

    #[tokio::test]
    async fn test_start_validates_input() {
        let h = harness();

        let mut req = start_req(&h, 0);
        assert!(matches!(
            h.orchestrator.start(req.clone(), false).await,
            Err(AppError::Validation(_))
        ));

        req.question_count = 3;
        req.job_position = "  ".into();
        assert!(matches!(
            h.orchestrator.start(req.clone(), false).await,
            Err(AppError::Validation(_))
        ));

        req.job_position = "x".repeat(101);
        assert!(matches!(
            h.orchestrator.start(req, false).await,
            Err(AppError::Validation(_))
        ));
        assert_eq!(h.ai.opening_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_start_with_foreign_resume_is_not_found() {
        let h = harness();
        let resume = h
            .resumes
            .insert(NewResume {
                user_id: Uuid::new_v4(),
                title: "Someone else".into(),
                file_type: "txt".into(),
                file_size_kb: Some(1),
                s3_key: None,
                status: ResumeStatus::Parsed,
                content_json: None,
                parsed_content: "Secret".into(),
            })
            .await
            .unwrap();

        let mut req = start_req(&h, 3);
        req.resume_id = Some(resume.id);
        let err = h.orchestrator.start(req, false).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_start_passes_resume_text_to_ai() {
        let h = harness();
        let resume = h
            .resumes
            .insert(NewResume {
                user_id: h.user,
                title: "Mine".into(),
                file_type: "txt".into(),
                file_size_kb: Some(1),
                s3_key: None,
                status: ResumeStatus::Parsed,
                content_json: None,
                parsed_content: "Five years of Rust".into(),
            })
            .await
            .unwrap();

        let mut req = start_req(&h, 3);
        req.resume_id = Some(resume.id);
        let detail = h.orchestrator.start(req, false).await.unwrap();

        assert_eq!(detail.session.resume_id, Some(resume.id));
        assert_eq!(
            h.ai.last_resume_text.lock().unwrap().as_deref(),
            Some("Five years of Rust")
        );
    }

    #[tokio::test]
    async fn test_ai_failures_fall_back() {
        let ai = FakeInterviewAi::default();
        ai.fail_opening.store(true, Ordering::SeqCst);
        ai.fail_feedback.store(true, Ordering::SeqCst);
        ai.fail_stream.store(true, Ordering::SeqCst);
        let h = harness_with(ai);

        let detail = h.orchestrator.start(start_req(&h, 3), false).await.unwrap();
        assert!(detail.questions[0]
            .question_text
            .contains("Backend Engineer interview"));

        let outcome = answer(&h, detail.session.id, detail.questions[0].id, "Hi").await;
        let (feedback, _, text) = next_question(outcome).await;
        assert_eq!(feedback, FALLBACK_FEEDBACK);
        assert_eq!(text, FALLBACK_NEXT_QUESTION);
    }

    #[tokio::test]
    async fn test_submit_answer_rejections() {
        let h = harness();
        let detail = h.orchestrator.start(start_req(&h, 3), false).await.unwrap();
        let (session_id, q1) = (detail.session.id, detail.questions[0].id);

        let blank = h.orchestrator.submit_answer(h.user, session_id, q1, "   ").await;
        assert!(matches!(blank, Err(AppError::Validation(_))));

        let unknown = h
            .orchestrator
            .submit_answer(h.user, session_id, Uuid::new_v4(), "hello")
            .await;
        assert!(matches!(unknown, Err(AppError::NotFound(_))));

        let other_user = h
            .orchestrator
            .submit_answer(Uuid::new_v4(), session_id, q1, "hello")
            .await;
        assert!(matches!(other_user, Err(AppError::NotFound(_))));

        next_question(answer(&h, session_id, q1, "first").await).await;
        let again = h.orchestrator.submit_answer(h.user, session_id, q1, "again").await;
        assert!(matches!(again, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_submit_answer_on_closed_session_is_rejected() {
        let h = harness();
        let finished = h.orchestrator.start(start_req(&h, 1), false).await.unwrap();
        answer(&h, finished.session.id, finished.questions[0].id, "done").await;
        h.orchestrator.finish(h.user, finished.session.id).await.unwrap();

        let err = h
            .orchestrator
            .submit_answer(h.user, finished.session.id, finished.questions[0].id, "more")
            .await;
        assert!(matches!(err, Err(AppError::Validation(_))));

        let canceled = h.orchestrator.start(start_req(&h, 3), false).await.unwrap();
        h.orchestrator.abandon_unfinished(h.user).await.unwrap();
        let err = h
            .orchestrator
            .submit_answer(h.user, canceled.session.id, canceled.questions[0].id, "hi")
            .await;
        assert!(matches!(err, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_finish_is_idempotent() {
        let h = harness();
        let detail = h.orchestrator.start(start_req(&h, 1), false).await.unwrap();
        answer(&h, detail.session.id, detail.questions[0].id, "answer").await;

        let first = h.orchestrator.finish(h.user, detail.session.id).await.unwrap();
        let second = h.orchestrator.finish(h.user, detail.session.id).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(h.ai.report_calls.load(Ordering::SeqCst), 1);
        assert_eq!(first["overall_score"], 78);
    }

    #[tokio::test]
    async fn test_finish_without_answers_is_rejected() {
        let h = harness();
        let detail = h.orchestrator.start(start_req(&h, 3), false).await.unwrap();

        let err = h.orchestrator.finish(h.user, detail.session.id).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(h.ai.report_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_report_failure_keeps_session_running() {
        let h = harness();
        let detail = h.orchestrator.start(start_req(&h, 1), false).await.unwrap();
        let session_id = detail.session.id;
        answer(&h, session_id, detail.questions[0].id, "answer").await;

        h.ai.fail_report.store(true, Ordering::SeqCst);
        let err = h.orchestrator.finish(h.user, session_id).await.unwrap_err();
        assert!(matches!(err, AppError::Llm(_)));
        assert_eq!(h.store.status_of(session_id), Some(SessionStatus::Running));
        assert_eq!(h.cache.get(h.user).await.unwrap(), Some(session_id));

        h.ai.fail_report.store(false, Ordering::SeqCst);
        h.orchestrator.finish(h.user, session_id).await.unwrap();
        assert_eq!(h.store.status_of(session_id), Some(SessionStatus::Finished));
    }

    #[tokio::test]
    async fn test_finish_canceled_session_is_rejected() {
        let h = harness();
        let detail = h.orchestrator.start(start_req(&h, 3), false).await.unwrap();
        answer(&h, detail.session.id, detail.questions[0].id, "a").await;
        h.orchestrator.abandon_unfinished(h.user).await.unwrap();

        let err = h.orchestrator.finish(h.user, detail.session.id).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_check_and_abandon_unfinished() {
        let h = harness();
        assert!(!h.orchestrator.check_unfinished(h.user).await.unwrap().has_unfinished);

        let detail = h.orchestrator.start(start_req(&h, 3), false).await.unwrap();
        let status = h.orchestrator.check_unfinished(h.user).await.unwrap();
        assert_eq!(
            status,
            UnfinishedStatus {
                has_unfinished: true,
                session_id: Some(detail.session.id),
                job_position: Some("Backend Engineer".into()),
            }
        );

        let abandoned = h.orchestrator.abandon_unfinished(h.user).await.unwrap();
        assert_eq!(abandoned, detail.session.id);
        assert_eq!(h.store.status_of(abandoned), Some(SessionStatus::Canceled));
        assert!(!h.orchestrator.check_unfinished(h.user).await.unwrap().has_unfinished);

        let err = h.orchestrator.abandon_unfinished(h.user).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_check_recovers_lost_cache_entry() {
        let h = harness();
        let detail = h.orchestrator.start(start_req(&h, 3), false).await.unwrap();
        h.cache.clear(h.user).await.unwrap();

        let status = h.orchestrator.check_unfinished(h.user).await.unwrap();
        assert_eq!(status.session_id, Some(detail.session.id));
        assert_eq!(h.cache.get(h.user).await.unwrap(), Some(detail.session.id));
    }

    #[tokio::test]
    async fn test_stale_cache_entry_is_dropped() {
        let h = harness();
        let detail = h.orchestrator.start(start_req(&h, 3), false).await.unwrap();
        h.store.cancel_session(detail.session.id).await.unwrap();

        assert!(!h.orchestrator.check_unfinished(h.user).await.unwrap().has_unfinished);
        assert_eq!(h.cache.get(h.user).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_history_is_ordered_answered_turns() {
        let h = harness();
        let detail = h.orchestrator.start(start_req(&h, 3), false).await.unwrap();
        let session_id = detail.session.id;
        let (_, q2, _) = next_question(answer(&h, session_id, detail.questions[0].id, "one").await).await;
        next_question(answer(&h, session_id, q2.id, "two").await).await;

        let history = h.ai.last_history.lock().unwrap().clone();
        let answers: Vec<(i32, &str)> = history
            .iter()
            .map(|t| (t.sequence, t.answer.as_str()))
            .collect();
        assert_eq!(answers, vec![(1, "one"), (2, "two")]);
        assert_eq!(history[1].question, "How do you design for failure?");
    }

    #[tokio::test]
    async fn test_delete_clears_cache_and_questions() {
        let h = harness();
        let detail = h.orchestrator.start(start_req(&h, 3), false).await.unwrap();

        h.orchestrator.delete(h.user, detail.session.id).await.unwrap();
        assert_eq!(h.cache.get(h.user).await.unwrap(), None);
        assert!(matches!(
            h.orchestrator.get(h.user, detail.session.id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(h.store.questions(detail.session.id).await.unwrap().is_empty());

        let err = h.orchestrator.delete(h.user, detail.session.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
