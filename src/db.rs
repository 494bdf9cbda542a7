use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

use crate::interval;
use crate::models::{Document, DocumentRecord};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let documents = vec![
        (
            "7b0f3c52-1d7e-4c1a-9f0e-5b8f2c6d9a11",
            "Krebs cycle summary",
            "Biology",
            "2026-01-20T09:12:00Z",
            None,
            0,
        ),
        (
            "c2e4a8d1-6f3b-4e27-8a59-0d1b7e3f4c22",
            "Derivatives cheat sheet",
            "Calculus",
            "2026-01-12T14:40:00.512300",
            Some("2026-01-25T08:05:00.000000"),
            2,
        ),
        (
            "e9d6b4f7-2a8c-41b5-93d0-6c7a1f5e8b33",
            "Treaty of Westphalia",
            "History",
            "2026-01-02T19:30:00Z",
            Some("2026-01-28T21:15:00Z"),
            4,
        ),
    ];

    for (id, title, subject, created_at, last_review_date, review_count) in documents {
        sqlx::query(
            r#"
            INSERT INTO review_queue.documents
            (id, title, subject, created_at, last_review_date, review_count)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(title)
        .bind(subject)
        .bind(created_at)
        .bind(last_review_date)
        .bind(review_count)
        .execute(pool)
        .await?;
    }

    Ok(())
}

fn record_from_row(row: &PgRow) -> DocumentRecord {
    DocumentRecord {
        id: row.get("id"),
        title: row.get("title"),
        subject: row.get("subject"),
        created_at: row.get("created_at"),
        last_review_date: row.get("last_review_date"),
        review_count: i64::from(row.get::<i32, _>("review_count")),
    }
}

fn list_query(by_subject: bool) -> String {
    let mut query = String::from(
        "SELECT id, title, subject, created_at, last_review_date, review_count \
         FROM review_queue.documents",
    );

    if by_subject {
        query.push_str(" WHERE subject = $1");
    }
    // created_at is free-form text, so it cannot give a time order
    query.push_str(" ORDER BY id");
    query
}

pub async fn fetch_documents(
    pool: &PgPool,
    subject: Option<&str>,
) -> anyhow::Result<Vec<DocumentRecord>> {
    let query = list_query(subject.is_some());
    let mut rows = sqlx::query(&query);

    if let Some(value) = subject {
        rows = rows.bind(value);
    }

    let records = rows.fetch_all(pool).await?;
    Ok(records.iter().map(record_from_row).collect())
}

/// Stores a completed review of document `id` at `now` and returns the updated document.
///
/// The row is locked for the read-modify-write, so concurrent reviews of the
/// same document each count. A review time earlier than the document's
/// creation or its previous review is rejected.
pub async fn record_review(
    pool: &PgPool,
    id: &str,
    now: DateTime<Utc>,
) -> anyhow::Result<Document> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query(
        "SELECT id, title, subject, created_at, last_review_date, review_count \
         FROM review_queue.documents WHERE id = $1 FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .with_context(|| format!("document {id} not found"))?;

    let document = Document::try_from(&record_from_row(&row))?;
    let reviewed = document.reviewed_at(now)?;
    let next_review_at = interval::next_due_at(&reviewed).map(|due| due.to_rfc3339());
    let review_count = i32::try_from(reviewed.review_count).context("review count overflow")?;

    sqlx::query(
        r#"
        UPDATE review_queue.documents
        SET last_review_date = $2, review_count = $3, next_review_at = $4
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(now.to_rfc3339())
    .bind(review_count)
    .bind(next_review_at)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    info!(document_id = %id, review_count, "recorded review");
    Ok(reviewed)
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        id: Option<String>,
        title: String,
        subject: Option<String>,
        created_at: String,
        last_review_date: Option<String>,
        review_count: Option<i32>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut upserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let id = row
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let result = sqlx::query(
            r#"
            INSERT INTO review_queue.documents
            (id, title, subject, created_at, last_review_date, review_count)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE
            SET title = EXCLUDED.title,
                subject = EXCLUDED.subject,
                created_at = EXCLUDED.created_at,
                last_review_date = EXCLUDED.last_review_date,
                review_count = EXCLUDED.review_count
            "#,
        )
        .bind(&id)
        .bind(&row.title)
        .bind(&row.subject)
        .bind(&row.created_at)
        .bind(&row.last_review_date)
        .bind(row.review_count.unwrap_or(0))
        .execute(pool)
        .await?;

        upserted += result.rows_affected() as usize;
    }

    info!(path = %csv_path.display(), upserted, "imported documents");
    Ok(upserted)
}
