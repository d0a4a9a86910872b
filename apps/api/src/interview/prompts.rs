// Interview LLM prompt templates.
// All prompts for the interview module are defined here.

use crate::interview::ai::Turn;
use crate::models::interview::Difficulty;

pub const OPENING_SYSTEM: &str = "\
You are a senior technical interviewer at a top company, known for precise, \
probing and professional questions. Your task is to open an interview for a \
specific position.";

pub const FEEDBACK_SYSTEM: &str = "\
You are a professional interviewer. Give a short, constructive evaluation of \
the candidate's answer.";

pub const NEXT_QUESTION_SYSTEM: &str = "\
You are a professional AI interviewer. Based on the conversation so far, ask \
the next in-depth follow-up question. Return only the question itself.";

pub const REPORT_SYSTEM: &str = "\
You are a top career coach and interview analyst, expert in the STAR method, \
structured reasoning and keyword extraction. Produce a professional, \
data-driven, insightful report for a complete interview transcript.";

pub const OPENING_WITH_RESUME_PROMPT: &str = r#"I am applying for the '{job_position}' position ({difficulty} difficulty). Here is my resume:

--- RESUME START ---
{resume_text}
--- RESUME END ---

Read my resume carefully and ask one targeted opening question.
Return exactly this JSON: {"question": "(your question)"}"#;

pub const OPENING_WITHOUT_RESUME_PROMPT: &str = r#"I am applying for the '{job_position}' position ({difficulty} difficulty) and have not provided a resume.
Ask a general but warm opening question that invites me to briefly introduce myself.
Return exactly this JSON: {"question": "(your question)"}"#;

pub const FEEDBACK_PROMPT: &str = "\
I am interviewing for the '{job_position}' position.
Interviewer question: {question}
My answer: {answer}

Give a brief evaluation of my answer in about 50-100 words. Return only the evaluation itself.";

pub const NEXT_QUESTION_PROMPT: &str = "\
Here is the interview history for the '{job_position}' position ({difficulty} difficulty):
{history}
Now ask your next question.";

pub const REPORT_PROMPT: &str = r#"I have just finished a mock interview for the '{job_position}' position. The full transcript:

--- TRANSCRIPT START ---
{history}--- TRANSCRIPT END ---

Evaluate the interview and return your report strictly in the JSON format below.
All ability scores are 0-5 and may have one decimal place. Keep every text objective, professional and constructive.
{
  "overall_score": (an integer from 0 to 100),
  "ability_scores": [
    {"name": "Technical Knowledge", "score": (0-5)},
    {"name": "Project Experience", "score": (0-5)},
    {"name": "Logical Thinking", "score": (0-5)},
    {"name": "Communication", "score": (0-5)},
    {"name": "Motivation", "score": (0-5)}
  ],
  "overall_comment": "(an overall evaluation of about 100 words)",
  "strength_analysis": "(analysis of the highlights of this interview)",
  "weakness_analysis": "(analysis of the shortcomings of this interview)",
  "improvement_suggestions": ["(first concrete suggestion)", "(second concrete suggestion)"],
  "keyword_analysis": {
    "matched_keywords": ["(keywords from my answers that match the position)"],
    "missing_keywords": ["(core keywords I should have mentioned but did not)"],
    "analysis_comment": "(a short analysis of my keyword usage)"
  },
  "star_analysis": [
    {
      "question_sequence": (question number, e.g. 1),
      "is_behavioral_question": (true/false),
      "conforms_to_star": (true/false),
      "star_feedback": "(if not conforming, concrete points such as 'Situation unclear' or 'Result not quantified'; otherwise praise)"
    }
  ]
}"#;

pub fn opening_prompt(job_position: &str, difficulty: Difficulty, resume_text: Option<&str>) -> String {
    match resume_text.map(str::trim).filter(|t| !t.is_empty()) {
        Some(resume_text) => OPENING_WITH_RESUME_PROMPT
            .replace("{job_position}", job_position)
            .replace("{difficulty}", difficulty.as_str())
            .replace("{resume_text}", resume_text),
        None => OPENING_WITHOUT_RESUME_PROMPT
            .replace("{job_position}", job_position)
            .replace("{difficulty}", difficulty.as_str()),
    }
}

pub fn feedback_prompt(job_position: &str, question: &str, answer: &str) -> String {
    FEEDBACK_PROMPT
        .replace("{job_position}", job_position)
        .replace("{question}", question)
        .replace("{answer}", answer)
}

pub fn next_question_prompt(job_position: &str, difficulty: Difficulty, history: &[Turn]) -> String {
    let history: String = history
        .iter()
        .map(|t| format!("Interviewer: {}\nMe: {}\n\n", t.question, t.answer))
        .collect();
    NEXT_QUESTION_PROMPT
        .replace("{job_position}", job_position)
        .replace("{difficulty}", difficulty.as_str())
        .replace("{history}", &history)
}

pub fn report_prompt(job_position: &str, history: &[Turn]) -> String {
    let history: String = history
        .iter()
        .map(|t| {
            format!(
                "--- Question {} ---\nInterviewer: {}\nMe: {}\n\n",
                t.sequence, t.question, t.answer
            )
        })
        .collect();
    REPORT_PROMPT
        .replace("{job_position}", job_position)
        .replace("{history}", &history)
}
