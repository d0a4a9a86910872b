// Mock interviews: session lifecycle, per-answer feedback, streamed
// follow-up questions and the final report.

pub mod ai;
pub mod cache;
pub mod handlers;
pub mod orchestrator;
pub mod prompts;
pub mod report;
pub mod store;
pub mod streaming;
pub mod sweeper;

#[cfg(test)]
pub mod testing;

pub use orchestrator::InterviewOrchestrator;
