use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "resume_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ResumeStatus {
    Pending,
    Parsed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ResumeRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub file_type: String,
    pub file_size_kb: Option<i32>,
    pub s3_key: Option<String>,
    pub status: ResumeStatus,
    /// Layout produced by the online resume editor.
    pub content_json: Option<Value>,
    /// Text extracted from an uploaded file.
    pub parsed_content: String,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ResumeAnalysisReportRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub resume_id: Uuid,
    pub jd_text: String,
    pub report_data: Value,
    pub overall_score: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
