//! Courier roster management: subordinate creation one level below
//! the creator, approval, and transfer to a new parent. The courier tree
//! stays acyclic because creation always points `parent_id` at an existing
//! higher-level courier, and transfers re-check that invariant plus an
//! explicit ancestor walk.

use openpenpal_types::{Courier, CourierId, CourierStatus, UserId};
use tracing::info;

use crate::error::HierarchyError;
use crate::permission::{can_create_subordinate_at, manages_courier};
use crate::repository::CourierRepository;

/// What a new subordinate looks like before the roster fills in the
/// hierarchy fields (level, parent, creator).
pub struct SubordinateApplication {
    pub user_id: UserId,
    pub zone_code: String,
    pub managed_op_code_prefix: String,
    pub bio: Option<String>,
}

pub struct CourierRoster<'a> {
    couriers: &'a dyn CourierRepository,
}

impl<'a> CourierRoster<'a> {
    pub fn new(couriers: &'a dyn CourierRepository) -> Self {
        Self { couriers }
    }

    /// Creates a subordinate one level below `creator`, in `pending` status
    /// until approved. The subordinate's prefix must sit inside the
    /// creator's scope and have the length its level dictates.
    pub async fn create_subordinate(
        &self,
        creator: &Courier,
        application: SubordinateApplication,
    ) -> Result<Courier, HierarchyError> {
        if creator.status != CourierStatus::Approved {
            return Err(HierarchyError::IneligibleCreator);
        }
        let subordinate_level = creator.level.one_below().ok_or(HierarchyError::IneligibleCreator)?;
        if !can_create_subordinate_at(creator.level, subordinate_level) {
            return Err(HierarchyError::IneligibleCreator);
        }

        let prefix = &application.managed_op_code_prefix;
        if prefix.len() != subordinate_level.prefix_len() {
            return Err(HierarchyError::OpCodeOutOfScope);
        }
        if !prefix.starts_with(&creator.managed_op_code_prefix) {
            return Err(HierarchyError::OpCodeOutOfScope);
        }

        let subordinate = Courier {
            id: CourierId::new(),
            user_id: application.user_id,
            level: subordinate_level,
            zone_type: subordinate_level.zone_type(),
            zone_code: application.zone_code,
            managed_op_code_prefix: application.managed_op_code_prefix,
            parent_id: Some(creator.id),
            status: CourierStatus::Pending,
            rating: 5.0,
            points: 0,
            created_by_id: creator.user_id,
            bio: application.bio,
        };
        self.couriers.save(&subordinate).await?;
        info!(courier_id = %subordinate.id, parent_id = %creator.id, level = subordinate.level.value(), "subordinate created");
        Ok(subordinate)
    }

    /// Moves a pending application to `approved`. Only a courier with
    /// hierarchy authority over the subordinate may approve it.
    pub async fn approve(&self, actor: &Courier, courier_id: CourierId) -> Result<Courier, HierarchyError> {
        let mut subordinate = self.couriers.get(courier_id).await?;
        if !manages_courier(actor, &subordinate) {
            return Err(HierarchyError::UnauthorizedHierarchy);
        }
        subordinate.status = CourierStatus::Approved;
        self.couriers.save(&subordinate).await?;
        Ok(subordinate)
    }

    /// Re-parents `subordinate_id` under `new_parent_id`. The new parent
    /// must sit at the same level as the old one (exactly one above the
    /// subordinate), the actor must have authority over both subtrees, and
    /// the move must not create a cycle.
    pub async fn transfer_subordinate(
        &self,
        actor: &Courier,
        subordinate_id: CourierId,
        new_parent_id: CourierId,
    ) -> Result<Courier, HierarchyError> {
        let mut subordinate = self.couriers.get(subordinate_id).await?;
        let new_parent = self.couriers.get(new_parent_id).await?;

        if new_parent.level.one_below() != Some(subordinate.level) {
            return Err(HierarchyError::UnauthorizedHierarchy);
        }
        if !manages_courier(actor, &subordinate) || !manages_courier(actor, &new_parent) {
            return Err(HierarchyError::UnauthorizedHierarchy);
        }
        // Non-strict containment: an L4 parent and its L3 subordinate share
        // a 2-char prefix.
        if !subordinate
            .managed_op_code_prefix
            .starts_with(&new_parent.managed_op_code_prefix)
        {
            return Err(HierarchyError::OpCodeOutOfScope);
        }

        self.ensure_no_cycle(subordinate_id, &new_parent).await?;

        subordinate.parent_id = Some(new_parent.id);
        self.couriers.save(&subordinate).await?;
        info!(courier_id = %subordinate.id, new_parent_id = %new_parent.id, "subordinate transferred");
        Ok(subordinate)
    }

    /// Walks the new parent's ancestor chain; if it passes through the
    /// courier being re-parented, the transfer would close a loop.
    async fn ensure_no_cycle(&self, subordinate_id: CourierId, new_parent: &Courier) -> Result<(), HierarchyError> {
        let mut cursor = Some(new_parent.clone());
        // The tree is at most four levels deep; the bound guards against
        // corrupted parent pointers rather than legitimate depth.
        let mut hops = 0;
        while let Some(courier) = cursor {
            if courier.id == subordinate_id {
                return Err(HierarchyError::WouldCreateCycle);
            }
            hops += 1;
            if hops > 8 {
                return Err(HierarchyError::WouldCreateCycle);
            }
            cursor = match courier.parent_id {
                Some(parent_id) => Some(self.couriers.get(parent_id).await?),
                None => None,
            };
        }
        Ok(())
    }
}
