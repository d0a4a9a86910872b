pub mod ai;
pub mod interview;
pub mod resume;
