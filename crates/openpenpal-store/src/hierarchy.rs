//! Postgres adapters for the `openpenpal-hierarchy` storage ports.

use async_trait::async_trait;
use openpenpal_hierarchy::{CourierRepository, HierarchyError, OpCodeDirectory, TaskRepository};
use openpenpal_types::{
    AssignmentHistoryRecord, Courier, CourierId, CourierLevel, Task, TaskId, TaskStatus, UserId,
};
use sqlx::{PgPool, Row};

use crate::codec;

pub struct PgCourierRepository {
    pool: PgPool,
}

impl PgCourierRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_courier(row: &sqlx::postgres::PgRow) -> Result<Courier, HierarchyError> {
        let level: i16 = row.try_get("level").map_err(storage_err)?;
        let status: String = row.try_get("status").map_err(storage_err)?;
        Ok(Courier {
            id: CourierId(row.try_get("id").map_err(storage_err)?),
            user_id: UserId(row.try_get("user_id").map_err(storage_err)?),
            level: CourierLevel::new(level as u8).map_err(|e| HierarchyError::Storage(e.to_string()))?,
            zone_type: codec::zone_type_from_db(row.try_get::<String, _>("zone_type").map_err(storage_err)?.as_str())
                .ok_or_else(|| HierarchyError::Storage("unknown zone_type".to_string()))?,
            zone_code: row.try_get("zone_code").map_err(storage_err)?,
            managed_op_code_prefix: row.try_get("managed_op_code_prefix").map_err(storage_err)?,
            parent_id: row
                .try_get::<Option<uuid::Uuid>, _>("parent_id")
                .map_err(storage_err)?
                .map(CourierId),
            status: codec::courier_status_from_db(&status)
                .ok_or_else(|| HierarchyError::Storage("unknown courier status".to_string()))?,
            rating: row.try_get("rating").map_err(storage_err)?,
            points: row.try_get("points").map_err(storage_err)?,
            created_by_id: UserId(row.try_get("created_by_id").map_err(storage_err)?),
            bio: row.try_get("bio").map_err(storage_err)?,
        })
    }
}

fn storage_err(e: sqlx::Error) -> HierarchyError {
    HierarchyError::Storage(e.to_string())
}

#[async_trait]
impl CourierRepository for PgCourierRepository {
    async fn get(&self, id: CourierId) -> Result<Courier, HierarchyError> {
        let row = sqlx::query("SELECT * FROM couriers WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?
            .ok_or(HierarchyError::CourierNotFound)?;
        Self::row_to_courier(&row)
    }

    async fn get_by_user(&self, user_id: UserId) -> Result<Courier, HierarchyError> {
        let row = sqlx::query("SELECT * FROM couriers WHERE user_id = $1")
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?
            .ok_or(HierarchyError::CourierNotFound)?;
        Self::row_to_courier(&row)
    }

    async fn children_of(&self, parent_id: CourierId) -> Result<Vec<Courier>, HierarchyError> {
        let rows = sqlx::query("SELECT * FROM couriers WHERE parent_id = $1")
            .bind(parent_id.0)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        rows.iter().map(Self::row_to_courier).collect()
    }

    async fn candidates_for_prefix(&self, op_code_prefix: &str) -> Result<Vec<Courier>, HierarchyError> {
        let rows = sqlx::query(
            "SELECT * FROM couriers WHERE status = 'approved' AND $1 LIKE managed_op_code_prefix || '%'",
        )
        .bind(op_code_prefix)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        rows.iter().map(Self::row_to_courier).collect()
    }

    async fn active_task_count(&self, courier_id: CourierId) -> Result<u32, HierarchyError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tasks WHERE assigned_courier_id = $1 AND status IN ('ACCEPTED', 'COLLECTED', 'IN_TRANSIT')",
        )
        .bind(courier_id.0)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(count as u32)
    }

    async fn save(&self, courier: &Courier) -> Result<(), HierarchyError> {
        sqlx::query(
            r#"
            INSERT INTO couriers (
                id, user_id, level, zone_type, zone_code, managed_op_code_prefix,
                parent_id, status, rating, points, created_by_id, bio
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (id) DO UPDATE SET
                level = excluded.level,
                zone_type = excluded.zone_type,
                zone_code = excluded.zone_code,
                managed_op_code_prefix = excluded.managed_op_code_prefix,
                parent_id = excluded.parent_id,
                status = excluded.status,
                rating = excluded.rating,
                points = excluded.points,
                bio = excluded.bio
            "#,
        )
        .bind(courier.id.0)
        .bind(courier.user_id.0)
        .bind(courier.level.value() as i16)
        .bind(codec::zone_type_to_db(courier.zone_type))
        .bind(&courier.zone_code)
        .bind(&courier.managed_op_code_prefix)
        .bind(courier.parent_id.map(|id| id.0))
        .bind(codec::courier_status_to_db(courier.status))
        .bind(courier.rating)
        .bind(courier.points)
        .bind(courier.created_by_id.0)
        .bind(&courier.bio)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }
}

pub struct PgTaskRepository {
    pool: PgPool,
}

impl PgTaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_task(row: &sqlx::postgres::PgRow) -> Result<Task, HierarchyError> {
        Ok(Task {
            id: TaskId(row.try_get("id").map_err(storage_err)?),
            letter_id: openpenpal_types::LetterId(row.try_get("letter_id").map_err(storage_err)?),
            pickup_op_code: openpenpal_types::OpCode::parse(&row.try_get::<String, _>("pickup_op_code").map_err(storage_err)?)
                .map_err(|e| HierarchyError::Storage(e.to_string()))?,
            delivery_op_code: openpenpal_types::OpCode::parse(&row.try_get::<String, _>("delivery_op_code").map_err(storage_err)?)
                .map_err(|e| HierarchyError::Storage(e.to_string()))?,
            assigned_courier_id: row
                .try_get::<Option<uuid::Uuid>, _>("assigned_courier_id")
                .map_err(storage_err)?
                .map(CourierId),
            status: codec::task_status_from_db(&row.try_get::<String, _>("status").map_err(storage_err)?)
                .ok_or_else(|| HierarchyError::Storage("unknown task status".to_string()))?,
            priority: codec::task_priority_from_db(&row.try_get::<String, _>("priority").map_err(storage_err)?)
                .ok_or_else(|| HierarchyError::Storage("unknown task priority".to_string()))?,
            reward_points: row.try_get("reward_points").map_err(storage_err)?,
            created_at: row.try_get("created_at").map_err(storage_err)?,
            accepted_at: row.try_get("accepted_at").map_err(storage_err)?,
            completed_at: row.try_get("completed_at").map_err(storage_err)?,
        })
    }
}

#[async_trait]
impl TaskRepository for PgTaskRepository {
    async fn get(&self, id: TaskId) -> Result<Task, HierarchyError> {
        let row = sqlx::query("SELECT * FROM tasks WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?
            .ok_or(HierarchyError::TaskNotFound)?;
        Self::row_to_task(&row)
    }

    async fn list_by_status(&self, status: TaskStatus) -> Result<Vec<Task>, HierarchyError> {
        let rows = sqlx::query("SELECT * FROM tasks WHERE status = $1")
            .bind(codec::task_status_to_db(status))
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        rows.iter().map(Self::row_to_task).collect()
    }

    async fn save(&self, task: &Task) -> Result<(), HierarchyError> {
        sqlx::query(
            r#"
            INSERT INTO tasks (
                id, letter_id, pickup_op_code, delivery_op_code, assigned_courier_id,
                status, priority, reward_points, created_at, accepted_at, completed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE SET
                assigned_courier_id = excluded.assigned_courier_id,
                status = excluded.status,
                priority = excluded.priority,
                accepted_at = excluded.accepted_at,
                completed_at = excluded.completed_at
            "#,
        )
        .bind(task.id.0)
        .bind(task.letter_id.0)
        .bind(task.pickup_op_code.as_str())
        .bind(task.delivery_op_code.as_str())
        .bind(task.assigned_courier_id.map(|id| id.0))
        .bind(codec::task_status_to_db(task.status))
        .bind(codec::task_priority_to_db(task.priority))
        .bind(task.reward_points)
        .bind(task.created_at)
        .bind(task.accepted_at)
        .bind(task.completed_at)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn record_assignment(&self, record: AssignmentHistoryRecord) -> Result<(), HierarchyError> {
        sqlx::query(
            r#"
            INSERT INTO assignment_history (
                id, task_id, assigned_courier_id, assigned_by_id, assignment_type,
                previous_courier_id, reassignment_reason, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(record.id.0)
        .bind(record.task_id.0)
        .bind(record.assigned_courier_id.0)
        .bind(record.assigned_by_id.0)
        .bind(codec::assignment_type_to_db(record.assignment_type))
        .bind(record.previous_courier_id.map(|id| id.0))
        .bind(&record.reassignment_reason)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }
}

pub struct PgOpCodeDirectory {
    pool: PgPool,
}

impl PgOpCodeDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OpCodeDirectory for PgOpCodeDirectory {
    async fn coordinates_of(&self, op_code_prefix: &str) -> Result<Option<(f64, f64)>, HierarchyError> {
        let row = sqlx::query("SELECT lat, lng FROM op_code_zones WHERE prefix = $1")
            .bind(op_code_prefix)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(row.map(|r| (r.get("lat"), r.get("lng"))))
    }
}

impl PgOpCodeDirectory {
    /// Whether a prefix (or full code) is present in the directory at all,
    /// for the `/opcode/validate` existence check.
    pub async fn exists(&self, op_code_prefix: &str) -> Result<bool, HierarchyError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM op_code_zones WHERE prefix = $1")
            .bind(op_code_prefix)
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(count > 0)
    }
}

impl PgCourierRepository {
    /// Every approved courier, for the periodic leaderboard refresh. Not
    /// part of the `CourierRepository` port since the assignment engine
    /// never needs an unscoped listing.
    pub async fn list_approved(&self) -> Result<Vec<Courier>, HierarchyError> {
        let rows = sqlx::query("SELECT * FROM couriers WHERE status = 'approved'")
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        rows.iter().map(Self::row_to_courier).collect()
    }
}

impl PgTaskRepository {
    fn row_to_history(row: &sqlx::postgres::PgRow) -> Result<AssignmentHistoryRecord, HierarchyError> {
        let assignment_type: String = row.try_get("assignment_type").map_err(storage_err)?;
        Ok(AssignmentHistoryRecord {
            id: openpenpal_types::AssignmentHistoryId(row.try_get("id").map_err(storage_err)?),
            task_id: TaskId(row.try_get("task_id").map_err(storage_err)?),
            assigned_courier_id: CourierId(row.try_get("assigned_courier_id").map_err(storage_err)?),
            assigned_by_id: UserId(row.try_get("assigned_by_id").map_err(storage_err)?),
            assignment_type: codec::assignment_type_from_db(&assignment_type)
                .ok_or_else(|| HierarchyError::Storage("unknown assignment type".to_string()))?,
            previous_courier_id: row
                .try_get::<Option<uuid::Uuid>, _>("previous_courier_id")
                .map_err(storage_err)?
                .map(CourierId),
            reassignment_reason: row.try_get("reassignment_reason").map_err(storage_err)?,
            created_at: row.try_get("created_at").map_err(storage_err)?,
        })
    }

    /// Unassigned tasks whose letter is already released, for the
    /// pending-assignments surface.
    pub async fn list_available_routable(
        &self,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<Task>, HierarchyError> {
        let rows = sqlx::query(
            "SELECT t.* FROM tasks t JOIN letters l ON l.id = t.letter_id \
             WHERE t.status = 'AVAILABLE' AND (l.scheduled_at IS NULL OR l.scheduled_at <= $1)",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        rows.iter().map(Self::row_to_task).collect()
    }

    /// Tasks accepted before `cutoff` that never progressed past ACCEPTED,
    /// for the hourly timeout check.
    pub async fn stale_accepted(
        &self,
        cutoff: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<Task>, HierarchyError> {
        let rows = sqlx::query("SELECT * FROM tasks WHERE status = 'ACCEPTED' AND accepted_at < $1")
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        rows.iter().map(Self::row_to_task).collect()
    }

    /// A page of assignment history, newest first, optionally filtered to
    /// one courier's attributions.
    pub async fn assignment_history_page(
        &self,
        courier_id: Option<CourierId>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AssignmentHistoryRecord>, HierarchyError> {
        let rows = match courier_id {
            Some(courier_id) => {
                sqlx::query(
                    "SELECT * FROM assignment_history WHERE assigned_courier_id = $1 \
                     ORDER BY created_at DESC LIMIT $2 OFFSET $3",
                )
                .bind(courier_id.0)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query("SELECT * FROM assignment_history ORDER BY created_at DESC LIMIT $1 OFFSET $2")
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(storage_err)?;
        rows.iter().map(Self::row_to_history).collect()
    }
}
