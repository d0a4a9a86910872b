// Resume analysis against a job description, and AI polishing of resume text.

pub mod handlers;
pub mod prompts;
pub mod service;
pub mod store;
