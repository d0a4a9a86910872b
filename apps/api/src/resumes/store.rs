use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::resume::{ResumeRow, ResumeStatus};

/// Fields of a resume about to be inserted.
#[derive(Debug, Clone)]
pub struct NewResume {
    pub user_id: Uuid,
    pub title: String,
    pub file_type: String,
    pub file_size_kb: Option<i32>,
    pub s3_key: Option<String>,
    pub status: ResumeStatus,
    pub content_json: Option<Value>,
    pub parsed_content: String,
}

/// Resume persistence. Every lookup is scoped to the owning user.
#[async_trait]
pub trait ResumeStore: Send + Sync {
    async fn find(&self, user_id: Uuid, resume_id: Uuid) -> Result<Option<ResumeRow>, AppError>;
    async fn list(&self, user_id: Uuid) -> Result<Vec<ResumeRow>, AppError>;
    async fn insert(&self, resume: NewResume) -> Result<ResumeRow, AppError>;
    async fn delete(&self, user_id: Uuid, resume_id: Uuid) -> Result<Option<ResumeRow>, AppError>;
}

pub struct PgResumeStore {
    pool: PgPool,
}

impl PgResumeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResumeStore for PgResumeStore {
    async fn find(&self, user_id: Uuid, resume_id: Uuid) -> Result<Option<ResumeRow>, AppError> {
        Ok(
            sqlx::query_as::<_, ResumeRow>("SELECT * FROM resumes WHERE id = $1 AND user_id = $2")
                .bind(resume_id)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn list(&self, user_id: Uuid) -> Result<Vec<ResumeRow>, AppError> {
        Ok(sqlx::query_as::<_, ResumeRow>(
            "SELECT * FROM resumes WHERE user_id = $1 ORDER BY updated_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn insert(&self, resume: NewResume) -> Result<ResumeRow, AppError> {
        Ok(sqlx::query_as::<_, ResumeRow>(
            r#"
            INSERT INTO resumes
                (id, user_id, title, file_type, file_size_kb, s3_key, status, content_json, parsed_content)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8::json, $9)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(resume.user_id)
        .bind(&resume.title)
        .bind(&resume.file_type)
        .bind(resume.file_size_kb)
        .bind(&resume.s3_key)
        .bind(resume.status)
        // Sent as text so the key order survives.
        .bind(resume.content_json.as_ref().map(Value::to_string))
        .bind(&resume.parsed_content)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn delete(&self, user_id: Uuid, resume_id: Uuid) -> Result<Option<ResumeRow>, AppError> {
        Ok(sqlx::query_as::<_, ResumeRow>(
            "DELETE FROM resumes WHERE id = $1 AND user_id = $2 RETURNING *",
        )
        .bind(resume_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?)
    }
}
