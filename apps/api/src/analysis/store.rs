use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::resume::ResumeAnalysisReportRow;

pub async fn insert_report(
    pool: &PgPool,
    user_id: Uuid,
    resume_id: Uuid,
    jd_text: &str,
    report_data: &Value,
    overall_score: i32,
) -> Result<ResumeAnalysisReportRow, sqlx::Error> {
    sqlx::query_as::<_, ResumeAnalysisReportRow>(
        r#"
        INSERT INTO resume_analysis_reports
            (id, user_id, resume_id, jd_text, report_data, overall_score)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(resume_id)
    .bind(jd_text)
    .bind(report_data)
    .bind(overall_score)
    .fetch_one(pool)
    .await
}

/// Newest first.
pub async fn list_reports(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Vec<ResumeAnalysisReportRow>, sqlx::Error> {
    sqlx::query_as::<_, ResumeAnalysisReportRow>(
        "SELECT * FROM resume_analysis_reports WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

pub async fn find_report(
    pool: &PgPool,
    user_id: Uuid,
    report_id: Uuid,
) -> Result<Option<ResumeAnalysisReportRow>, sqlx::Error> {
    sqlx::query_as::<_, ResumeAnalysisReportRow>(
        "SELECT * FROM resume_analysis_reports WHERE id = $1 AND user_id = $2",
    )
    .bind(report_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
}
