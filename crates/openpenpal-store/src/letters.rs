//! Postgres adapters for the `openpenpal-letters` storage ports.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use openpenpal_letters::{BarcodeRepository, LetterError, LetterRepository, ScanRecordRepository, TaskStore};
use openpenpal_types::{Barcode, CourierId, Letter, LetterId, OpCode, ScanRecord, Task, TaskId, UserId};
use sqlx::{PgPool, Row};

use crate::codec;

fn storage_err(e: sqlx::Error) -> LetterError {
    LetterError::Storage(e.to_string())
}

fn op_code_or_storage_err(raw: &str) -> Result<OpCode, LetterError> {
    OpCode::parse(raw).map_err(|e| LetterError::Storage(e.to_string()))
}

pub struct PgLetterRepository {
    pool: PgPool,
}

impl PgLetterRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_letter(row: &sqlx::postgres::PgRow) -> Result<Letter, LetterError> {
        let recipient_op_code: Option<String> = row.try_get("recipient_op_code").map_err(storage_err)?;
        Ok(Letter {
            id: LetterId(row.try_get("id").map_err(storage_err)?),
            author_id: UserId(row.try_get("author_id").map_err(storage_err)?),
            title: row.try_get("title").map_err(storage_err)?,
            content: row.try_get("content").map_err(storage_err)?,
            visibility: codec::letter_visibility_from_db(&row.try_get::<String, _>("visibility").map_err(storage_err)?)
                .ok_or_else(|| LetterError::Storage("unknown letter visibility".to_string()))?,
            status: codec::letter_status_from_db(&row.try_get::<String, _>("status").map_err(storage_err)?)
                .ok_or_else(|| LetterError::Storage("unknown letter status".to_string()))?,
            scheduled_at: row.try_get("scheduled_at").map_err(storage_err)?,
            recipient_op_code: recipient_op_code.map(|s| op_code_or_storage_err(&s)).transpose()?,
            style: row.try_get("style").map_err(storage_err)?,
            reply_to: row
                .try_get::<Option<uuid::Uuid>, _>("reply_to")
                .map_err(storage_err)?
                .map(LetterId),
            created_at: row.try_get("created_at").map_err(storage_err)?,
            updated_at: row.try_get("updated_at").map_err(storage_err)?,
        })
    }
}

#[async_trait]
impl LetterRepository for PgLetterRepository {
    async fn get(&self, id: LetterId) -> Result<Letter, LetterError> {
        let row = sqlx::query("SELECT * FROM letters WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?
            .ok_or(LetterError::LetterNotFound)?;
        Self::row_to_letter(&row)
    }

    async fn save(&self, letter: &Letter) -> Result<(), LetterError> {
        sqlx::query(
            r#"
            INSERT INTO letters (
                id, author_id, title, content, visibility, status, scheduled_at,
                recipient_op_code, style, reply_to, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (id) DO UPDATE SET
                title = excluded.title,
                content = excluded.content,
                visibility = excluded.visibility,
                status = excluded.status,
                scheduled_at = excluded.scheduled_at,
                recipient_op_code = excluded.recipient_op_code,
                style = excluded.style,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(letter.id.0)
        .bind(letter.author_id.0)
        .bind(&letter.title)
        .bind(&letter.content)
        .bind(codec::letter_visibility_to_db(letter.visibility))
        .bind(codec::letter_status_to_db(letter.status))
        .bind(letter.scheduled_at)
        .bind(letter.recipient_op_code.map(|op| op.as_str().to_string()))
        .bind(&letter.style)
        .bind(letter.reply_to.map(|id| id.0))
        .bind(letter.created_at)
        .bind(letter.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn due_for_promotion(&self, now: DateTime<Utc>) -> Result<Vec<Letter>, LetterError> {
        let rows = sqlx::query(
            "SELECT * FROM letters WHERE status = 'draft' AND scheduled_at IS NOT NULL AND scheduled_at <= $1",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        rows.iter().map(Self::row_to_letter).collect()
    }
}

impl PgLetterRepository {
    /// Drafts abandoned before `cutoff` and never scheduled for future
    /// release, for the daily expiration sweep.
    pub async fn stale_drafts(&self, cutoff: DateTime<Utc>) -> Result<Vec<Letter>, LetterError> {
        let rows = sqlx::query(
            "SELECT * FROM letters WHERE status = 'draft' AND scheduled_at IS NULL AND created_at < $1",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        rows.iter().map(Self::row_to_letter).collect()
    }
}

pub struct PgBarcodeRepository {
    pool: PgPool,
}

impl PgBarcodeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_barcode(row: &sqlx::postgres::PgRow) -> Result<Barcode, LetterError> {
        let recipient_op_code: Option<String> = row.try_get("recipient_op_code").map_err(storage_err)?;
        Ok(Barcode {
            code: row.try_get("code").map_err(storage_err)?,
            batch_id: row.try_get("batch_id").map_err(storage_err)?,
            letter_id: row
                .try_get::<Option<uuid::Uuid>, _>("letter_id")
                .map_err(storage_err)?
                .map(LetterId),
            status: codec::barcode_status_from_db(&row.try_get::<String, _>("status").map_err(storage_err)?)
                .ok_or_else(|| LetterError::Storage("unknown barcode status".to_string()))?,
            recipient_op_code: recipient_op_code.map(|s| op_code_or_storage_err(&s)).transpose()?,
        })
    }
}

#[async_trait]
impl BarcodeRepository for PgBarcodeRepository {
    async fn get(&self, code: &str) -> Result<Barcode, LetterError> {
        let row = sqlx::query("SELECT * FROM barcodes WHERE code = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?
            .ok_or(LetterError::BarcodeNotFound)?;
        Self::row_to_barcode(&row)
    }

    async fn save(&self, barcode: &Barcode) -> Result<(), LetterError> {
        sqlx::query(
            r#"
            INSERT INTO barcodes (code, batch_id, letter_id, status, recipient_op_code)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (code) DO UPDATE SET
                letter_id = excluded.letter_id,
                status = excluded.status,
                recipient_op_code = excluded.recipient_op_code
            "#,
        )
        .bind(&barcode.code)
        .bind(barcode.batch_id)
        .bind(barcode.letter_id.map(|id| id.0))
        .bind(codec::barcode_status_to_db(barcode.status))
        .bind(barcode.recipient_op_code.map(|op| op.as_str().to_string()))
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }
}

pub struct PgTaskStore {
    pool: PgPool,
}

impl PgTaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_task(row: &sqlx::postgres::PgRow) -> Result<Task, LetterError> {
        Ok(Task {
            id: TaskId(row.try_get("id").map_err(storage_err)?),
            letter_id: LetterId(row.try_get("letter_id").map_err(storage_err)?),
            pickup_op_code: op_code_or_storage_err(&row.try_get::<String, _>("pickup_op_code").map_err(storage_err)?)?,
            delivery_op_code: op_code_or_storage_err(&row.try_get::<String, _>("delivery_op_code").map_err(storage_err)?)?,
            assigned_courier_id: row
                .try_get::<Option<uuid::Uuid>, _>("assigned_courier_id")
                .map_err(storage_err)?
                .map(CourierId),
            status: codec::task_status_from_db(&row.try_get::<String, _>("status").map_err(storage_err)?)
                .ok_or_else(|| LetterError::Storage("unknown task status".to_string()))?,
            priority: codec::task_priority_from_db(&row.try_get::<String, _>("priority").map_err(storage_err)?)
                .ok_or_else(|| LetterError::Storage("unknown task priority".to_string()))?,
            reward_points: row.try_get("reward_points").map_err(storage_err)?,
            created_at: row.try_get("created_at").map_err(storage_err)?,
            accepted_at: row.try_get("accepted_at").map_err(storage_err)?,
            completed_at: row.try_get("completed_at").map_err(storage_err)?,
        })
    }
}

#[async_trait]
impl TaskStore for PgTaskStore {
    async fn get(&self, id: TaskId) -> Result<Task, LetterError> {
        let row = sqlx::query("SELECT * FROM tasks WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?
            .ok_or(LetterError::TaskNotFound)?;
        Self::row_to_task(&row)
    }

    async fn save(&self, task: &Task) -> Result<(), LetterError> {
        sqlx::query(
            r#"
            UPDATE tasks SET status = $2, accepted_at = $3, completed_at = $4
            WHERE id = $1
            "#,
        )
        .bind(task.id.0)
        .bind(codec::task_status_to_db(task.status))
        .bind(task.accepted_at)
        .bind(task.completed_at)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }
}

pub struct PgScanRecordRepository {
    pool: PgPool,
}

impl PgScanRecordRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScanRecordRepository for PgScanRecordRepository {
    async fn append(&self, record: ScanRecord) -> Result<(), LetterError> {
        sqlx::query(
            r#"
            INSERT INTO scan_records (
                id, task_id, courier_id, letter_id, action, location, lat, lng,
                barcode_code, operator_op_code, recipient_op_code, scanner_level,
                validation_result, "timestamp"
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(record.id.0)
        .bind(record.task_id.map(|id| id.0))
        .bind(record.courier_id.0)
        .bind(record.letter_id.map(|id| id.0))
        .bind(codec::scan_action_to_db(record.action))
        .bind(&record.location)
        .bind(record.lat)
        .bind(record.lng)
        .bind(&record.barcode_code)
        .bind(record.operator_op_code.as_str())
        .bind(record.recipient_op_code.as_str())
        .bind(record.scanner_level.value() as i16)
        .bind(codec::scan_validation_result_to_db(record.validation_result))
        .bind(record.timestamp)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }
}
