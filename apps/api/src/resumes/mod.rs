// Resume library: uploads, online resumes, and plain-text flattening for prompts.

pub mod extract;
pub mod handlers;
pub mod store;
pub mod text;
