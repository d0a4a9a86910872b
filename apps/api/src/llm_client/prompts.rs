// Shared prompt fragments.
// Each service that needs LLM calls defines its own prompts.rs alongside it.

/// Appended to the system prompt of every JSON-returning call. Models without
/// a native JSON mode rely on this alone.
pub const JSON_ONLY_INSTRUCTION: &str = "\
    You MUST respond with a single valid JSON object only. \
    Do NOT include any text outside the JSON object. \
    Do NOT include explanations or apologies.";

/// Joins a role-specific system prompt with the JSON-only instruction.
pub fn json_system(role: &str) -> String {
    format!("{role} {JSON_ONLY_INSTRUCTION}")
}
