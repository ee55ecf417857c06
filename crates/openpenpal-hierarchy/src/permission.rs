//! Zone tree and prefix-containment permission checks.

use openpenpal_types::{Courier, CourierLevel, OpCode, OpCodePrefix};

/// Whether `actor` may manage a courier/task/letter scoped to `target`.
///
/// A courier may act on any resource whose OP Code falls under its
/// `managed_op_code_prefix`. L1 couriers manage a single point
/// (no subordinates), so this also gates task self-acceptance.
pub fn can_manage_op_code(actor: &Courier, target: &OpCode) -> bool {
    let prefix = OpCodePrefix::new(&actor.managed_op_code_prefix);
    prefix.permits(target)
}

/// Whether `actor` has hierarchy authority over `subject` (for reassignment,
/// subordinate creation, or viewing another courier's task queue). The
/// strictly-higher level check carries the subordination; containment is
/// non-strict because a city (L4) and its schools (L3) share a 2-char
/// prefix.
pub fn manages_courier(actor: &Courier, subject: &Courier) -> bool {
    if actor.id == subject.id {
        return true;
    }
    actor.level.value() > subject.level.value()
        && subject.managed_op_code_prefix.starts_with(&actor.managed_op_code_prefix)
}

/// Creating a subordinate requires an approved courier at level >= 2,
/// and the subordinate's level must be exactly one below the creator's.
pub fn can_create_subordinate_at(creator_level: CourierLevel, subordinate_level: CourierLevel) -> bool {
    creator_level.value() >= 2 && creator_level.one_below() == Some(subordinate_level)
}

#[cfg(test)]
mod tests {
    use super::*;
    use openpenpal_types::{CourierId, CourierStatus, UserId};

    fn courier(level: u8, prefix: &str) -> Courier {
        let level = CourierLevel::new(level).unwrap();
        Courier {
            id: CourierId::new(),
            user_id: UserId::new(),
            level,
            zone_type: level.zone_type(),
            zone_code: prefix.to_string(),
            managed_op_code_prefix: prefix.to_string(),
            parent_id: None,
            status: CourierStatus::Approved,
            rating: 4.5,
            points: 0,
            created_by_id: UserId::new(),
            bio: None,
        }
    }

    #[test]
    fn building_courier_manages_only_its_own_point() {
        let c = courier(1, "PK5F3D");
        let target = OpCode::parse("PK5F3D").unwrap();
        assert!(can_manage_op_code(&c, &target));
        let other = OpCode::parse("PK5F3E").unwrap();
        assert!(!can_manage_op_code(&c, &other));
    }

    #[test]
    fn area_courier_manages_whole_area() {
        let c = courier(2, "PK5F");
        assert!(can_manage_op_code(&c, &OpCode::parse("PK5F99").unwrap()));
        assert!(!can_manage_op_code(&c, &OpCode::parse("PK6F99").unwrap()));
    }

    #[test]
    fn manages_courier_requires_strictly_higher_level_and_containment() {
        let school = courier(3, "PK");
        let area = courier(2, "PK5F");
        assert!(manages_courier(&school, &area));
        assert!(!manages_courier(&area, &school));
    }

    #[test]
    fn city_courier_manages_school_sharing_its_prefix() {
        // L4 and L3 both carry a 2-char prefix; the level gap alone makes
        // the city the manager.
        let city = courier(4, "PK");
        let school = courier(3, "PK");
        assert!(manages_courier(&city, &school));
        assert!(!manages_courier(&school, &city));
        let other_school = courier(3, "QH");
        assert!(!manages_courier(&city, &other_school));
    }

    #[test]
    fn subordinate_creation_requires_exactly_one_level_below() {
        assert!(can_create_subordinate_at(
            CourierLevel::new(3).unwrap(),
            CourierLevel::new(2).unwrap()
        ));
        assert!(!can_create_subordinate_at(
            CourierLevel::new(3).unwrap(),
            CourierLevel::new(1).unwrap()
        ));
        assert!(!can_create_subordinate_at(
            CourierLevel::new(1).unwrap(),
            CourierLevel::new(1).unwrap()
        ));
    }
}
