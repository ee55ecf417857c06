//! Task assignment engine: direct assignment, auto-hierarchy matching,
//! cascading escalation, reassignment, and batch assignment.

use chrono::Utc;
use openpenpal_errors::BatchOutcome;
use openpenpal_types::{AssignmentHistoryRecord, AssignmentType, Courier, CourierId, Task, TaskId, TaskStatus, UserId};
use tracing::{info, warn};

use crate::error::HierarchyError;
use crate::permission::{can_manage_op_code, manages_courier};
use crate::repository::{CourierRepository, OpCodeDirectory, TaskRepository};
use crate::scoring::score_courier;

pub struct AssignmentEngine<'a> {
    couriers: &'a dyn CourierRepository,
    tasks: &'a dyn TaskRepository,
    directory: &'a dyn OpCodeDirectory,
}

impl<'a> AssignmentEngine<'a> {
    pub fn new(
        couriers: &'a dyn CourierRepository,
        tasks: &'a dyn TaskRepository,
        directory: &'a dyn OpCodeDirectory,
    ) -> Self {
        Self { couriers, tasks, directory }
    }

    /// A named courier is handed a task by someone with hierarchy
    /// authority over them, or the courier self-accepts a task in their
    /// own managed scope.
    pub async fn assign_direct(
        &self,
        task_id: TaskId,
        courier_id: CourierId,
        assigned_by: UserId,
    ) -> Result<Task, HierarchyError> {
        let mut task = self.tasks.get(task_id).await?;
        let courier = self.couriers.get(courier_id).await?;

        if !courier.can_accept_tasks() {
            return Err(HierarchyError::NoEligibleCourier);
        }
        if !can_manage_op_code(&courier, &task.delivery_op_code) {
            return Err(HierarchyError::OpCodeOutOfScope);
        }

        task.assigned_courier_id = Some(courier_id);
        task.status = TaskStatus::Accepted;
        task.accepted_at = Some(Utc::now());
        self.tasks.save(&task).await?;

        self.tasks
            .record_assignment(AssignmentHistoryRecord {
                id: openpenpal_types::AssignmentHistoryId::new(),
                task_id,
                assigned_courier_id: courier_id,
                assigned_by_id: assigned_by,
                assignment_type: AssignmentType::Direct,
                previous_courier_id: None,
                reassignment_reason: None,
                created_at: Utc::now(),
            })
            .await?;

        Ok(task)
    }

    /// Finds every eligible candidate whose managed prefix contains the
    /// delivery OP Code, score them, and assign the highest scorer.
    pub async fn assign_auto_hierarchy(&self, task_id: TaskId, assigned_by: UserId) -> Result<Task, HierarchyError> {
        let task = self.tasks.get(task_id).await?;
        let best = self.best_candidate(&task).await?;
        self.commit_assignment(task, best, assigned_by, AssignmentType::AutoHierarchy, None)
            .await
    }

    /// Widens the search prefix level by level (point, area, school,
    /// city) until a candidate is found, per the cascade escalation policy.
    pub async fn assign_cascade(&self, task_id: TaskId, assigned_by: UserId) -> Result<Task, HierarchyError> {
        let task = self.tasks.get(task_id).await?;
        let delivery = task.delivery_op_code.as_str();

        for prefix_len in [6usize, 4, 2] {
            let prefix = &delivery[0..prefix_len];
            let candidates = self.couriers.candidates_for_prefix(prefix).await?;
            if let Some(best) = self.score_candidates(&candidates, &task).await? {
                return self
                    .commit_assignment(task, best, assigned_by, AssignmentType::Cascade, None)
                    .await;
            }
        }

        Err(HierarchyError::NoEligibleCourier)
    }

    /// Reassignment is only legal from ACCEPTED or COLLECTED, and
    /// requires a non-empty reason for the audit trail.
    pub async fn reassign(
        &self,
        task_id: TaskId,
        new_courier_id: CourierId,
        assigned_by: UserId,
        reason: String,
    ) -> Result<Task, HierarchyError> {
        if reason.trim().is_empty() {
            return Err(HierarchyError::MissingReassignmentReason);
        }

        let mut task = self.tasks.get(task_id).await?;
        if !matches!(task.status, TaskStatus::Accepted | TaskStatus::Collected) {
            return Err(HierarchyError::TaskNotReassignable);
        }

        let new_courier = self.couriers.get(new_courier_id).await?;
        if !new_courier.can_accept_tasks() || !can_manage_op_code(&new_courier, &task.delivery_op_code) {
            return Err(HierarchyError::NoEligibleCourier);
        }

        let previous_courier_id = task.assigned_courier_id;
        task.assigned_courier_id = Some(new_courier_id);
        task.status = TaskStatus::Accepted;
        self.tasks.save(&task).await?;

        self.tasks
            .record_assignment(AssignmentHistoryRecord {
                id: openpenpal_types::AssignmentHistoryId::new(),
                task_id,
                assigned_courier_id: new_courier_id,
                assigned_by_id: assigned_by,
                assignment_type: AssignmentType::Reassignment,
                previous_courier_id,
                reassignment_reason: Some(reason),
                created_at: Utc::now(),
            })
            .await?;

        Ok(task)
    }

    /// Each task is assigned independently; one failure never aborts the rest.
    pub async fn assign_batch(
        &self,
        task_ids: Vec<TaskId>,
        assigned_by: UserId,
    ) -> Vec<BatchOutcome<Task>> {
        let mut outcomes = Vec::with_capacity(task_ids.len());
        for task_id in task_ids {
            let id_str = task_id.to_string();
            match self.assign_auto_hierarchy(task_id, assigned_by).await {
                Ok(task) => outcomes.push(BatchOutcome::success(id_str, task)),
                Err(err) => outcomes.push(BatchOutcome::failure(id_str, &err.into())),
            }
        }
        outcomes
    }

    /// Whether `actor` may act as `assigned_by` for a target courier, i.e.
    /// hierarchy authority over the courier or identity with it.
    pub fn authorizes(&self, actor: &Courier, target: &Courier) -> bool {
        manages_courier(actor, target)
    }

    async fn best_candidate(&self, task: &Task) -> Result<Courier, HierarchyError> {
        let prefix = task.delivery_op_code.as_str();
        let candidates = self.couriers.candidates_for_prefix(prefix).await?;
        let winner = self.score_candidates(&candidates, task).await?;
        if winner.is_none() {
            warn!(task_id = %task.id, "no eligible courier among {} candidates", candidates.len());
        }
        winner.ok_or(HierarchyError::NoEligibleCourier)
    }

    async fn score_candidates(&self, candidates: &[Courier], task: &Task) -> Result<Option<Courier>, HierarchyError> {
        let mut best: Option<(Courier, f64)> = None;
        for candidate in candidates {
            if !candidate.can_accept_tasks() {
                continue;
            }
            let active = self.couriers.active_task_count(candidate.id).await?;
            let breakdown = score_courier(candidate, task, active, self.directory).await?;
            let replace = match &best {
                Some((_, score)) => breakdown.total > *score,
                None => true,
            };
            if replace {
                best = Some((candidate.clone(), breakdown.total));
            }
        }
        Ok(best.map(|(courier, _)| courier))
    }

    async fn commit_assignment(
        &self,
        mut task: Task,
        courier: Courier,
        assigned_by: UserId,
        assignment_type: AssignmentType,
        reason: Option<String>,
    ) -> Result<Task, HierarchyError> {
        task.assigned_courier_id = Some(courier.id);
        task.status = TaskStatus::Accepted;
        task.accepted_at = Some(Utc::now());
        self.tasks.save(&task).await?;

        self.tasks
            .record_assignment(AssignmentHistoryRecord {
                id: openpenpal_types::AssignmentHistoryId::new(),
                task_id: task.id,
                assigned_courier_id: courier.id,
                assigned_by_id: assigned_by,
                assignment_type,
                previous_courier_id: None,
                reassignment_reason: reason,
                created_at: Utc::now(),
            })
            .await?;

        info!(task_id = %task.id, courier_id = %courier.id, ?assignment_type, "task assigned");
        Ok(task)
    }
}
