use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::ai_gateway::AiGateway;
use crate::analysis::prompts;
use crate::interview::report::{
    lenient_overall_score, lenient_string, lenient_strings, lenient_vec, AbilityScore,
};
use crate::llm_client::prompts::json_system;
use crate::llm_client::{ChatRequest, LlmError};

/// Resume-vs-job-description report, coerced the same way as the
/// interview report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResumeAnalysis {
    #[serde(deserialize_with = "lenient_overall_score")]
    pub overall_score: i32,
    #[serde(deserialize_with = "lenient_vec")]
    pub ability_scores: Vec<AbilityScore>,
    pub keyword_analysis: JdKeywordAnalysis,
    #[serde(deserialize_with = "lenient_strings")]
    pub strengths_analysis: Vec<String>,
    #[serde(deserialize_with = "lenient_strings")]
    pub weaknesses_analysis: Vec<String>,
    #[serde(deserialize_with = "lenient_vec")]
    pub suggestions: Vec<Suggestion>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JdKeywordAnalysis {
    #[serde(deserialize_with = "lenient_strings")]
    pub jd_keywords: Vec<String>,
    #[serde(deserialize_with = "lenient_strings")]
    pub matched_keywords: Vec<String>,
    #[serde(deserialize_with = "lenient_strings")]
    pub missing_keywords: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Suggestion {
    #[serde(deserialize_with = "lenient_string")]
    pub module: String,
    #[serde(deserialize_with = "lenient_string")]
    pub suggestion: String,
}

#[derive(Debug, Deserialize)]
struct Polished {
    #[serde(default)]
    polished_html: String,
}

pub async fn analyze_resume(
    gateway: &AiGateway,
    user_id: Uuid,
    resume_text: &str,
    jd_text: &str,
) -> Result<ResumeAnalysis, LlmError> {
    let system = json_system(prompts::ANALYSIS_SYSTEM);
    let user = prompts::analysis_prompt(resume_text, jd_text);
    gateway
        .complete_json(
            user_id,
            &ChatRequest {
                system: &system,
                user: &user,
                max_tokens: 3072,
                temperature: 0.6,
            },
        )
        .await
}

/// Rewrites an HTML description. Any failure returns the original unchanged.
pub async fn polish_description(
    gateway: &AiGateway,
    user_id: Uuid,
    html: &str,
    job_position: Option<&str>,
) -> String {
    let system = json_system(prompts::POLISH_SYSTEM);
    let user = prompts::polish_prompt(html, job_position);
    let polished: Result<Polished, LlmError> = gateway
        .complete_json(
            user_id,
            &ChatRequest {
                system: &system,
                user: &user,
                max_tokens: 2048,
                temperature: 0.5,
            },
        )
        .await;

    match polished {
        Ok(p) if !p.polished_html.trim().is_empty() => p.polished_html,
        Ok(_) => {
            warn!(%user_id, "Polish returned no HTML, keeping the original");
            html.to_string()
        }
        Err(e) => {
            warn!(%user_id, "Polish failed, keeping the original: {e}");
            html.to_string()
        }
    }
}
