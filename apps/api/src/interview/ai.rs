use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use crate::ai_gateway::AiGateway;
use crate::interview::prompts;
use crate::interview::report::InterviewReport;
use crate::llm_client::prompts::json_system;
use crate::llm_client::{ChatRequest, LlmError, TextStream};
use crate::models::interview::Difficulty;

/// One answered question, in interview order.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub sequence: i32,
    pub question: String,
    pub answer: String,
}

/// The interviewer. Implementations report upstream failures as `LlmError`;
/// the orchestrator decides whether to fall back.
#[async_trait]
pub trait InterviewAi: Send + Sync {
    async fn opening_question(
        &self,
        user_id: Uuid,
        job_position: &str,
        difficulty: Difficulty,
        resume_text: Option<&str>,
    ) -> Result<String, LlmError>;

    async fn answer_feedback(
        &self,
        user_id: Uuid,
        job_position: &str,
        question: &str,
        answer: &str,
    ) -> Result<String, LlmError>;

    async fn next_question_stream(
        &self,
        user_id: Uuid,
        job_position: &str,
        difficulty: Difficulty,
        history: &[Turn],
    ) -> Result<TextStream, LlmError>;

    async fn final_report(
        &self,
        user_id: Uuid,
        job_position: &str,
        history: &[Turn],
    ) -> Result<InterviewReport, LlmError>;
}

#[derive(Debug, Deserialize)]
struct OpeningQuestion {
    #[serde(default)]
    question: String,
}

/// `InterviewAi` backed by the AI gateway.
pub struct LlmInterviewAi {
    gateway: AiGateway,
}

impl LlmInterviewAi {
    pub fn new(gateway: AiGateway) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl InterviewAi for LlmInterviewAi {
    async fn opening_question(
        &self,
        user_id: Uuid,
        job_position: &str,
        difficulty: Difficulty,
        resume_text: Option<&str>,
    ) -> Result<String, LlmError> {
        let system = json_system(prompts::OPENING_SYSTEM);
        let user = prompts::opening_prompt(job_position, difficulty, resume_text);
        let opening: OpeningQuestion = self
            .gateway
            .complete_json(
                user_id,
                &ChatRequest {
                    system: &system,
                    user: &user,
                    max_tokens: 300,
                    temperature: 0.7,
                },
            )
            .await?;

        let question = opening.question.trim();
        if question.is_empty() {
            return Err(LlmError::EmptyContent);
        }
        Ok(question.to_string())
    }

    async fn answer_feedback(
        &self,
        user_id: Uuid,
        job_position: &str,
        question: &str,
        answer: &str,
    ) -> Result<String, LlmError> {
        let user = prompts::feedback_prompt(job_position, question, answer);
        self.gateway
            .complete(
                user_id,
                &ChatRequest {
                    system: prompts::FEEDBACK_SYSTEM,
                    user: &user,
                    max_tokens: 200,
                    temperature: 0.6,
                },
            )
            .await
    }

    async fn next_question_stream(
        &self,
        user_id: Uuid,
        job_position: &str,
        difficulty: Difficulty,
        history: &[Turn],
    ) -> Result<TextStream, LlmError> {
        let user = prompts::next_question_prompt(job_position, difficulty, history);
        self.gateway
            .stream(
                user_id,
                &ChatRequest {
                    system: prompts::NEXT_QUESTION_SYSTEM,
                    user: &user,
                    max_tokens: 500,
                    temperature: 0.8,
                },
            )
            .await
    }

    async fn final_report(
        &self,
        user_id: Uuid,
        job_position: &str,
        history: &[Turn],
    ) -> Result<InterviewReport, LlmError> {
        let system = json_system(prompts::REPORT_SYSTEM);
        let user = prompts::report_prompt(job_position, history);
        self.gateway
            .complete_json(
                user_id,
                &ChatRequest {
                    system: &system,
                    user: &user,
                    max_tokens: 3500,
                    temperature: 0.5,
                },
            )
            .await
    }
}
