//! Courier scoring formula for auto-hierarchy and cascade assignment.
//!
//! Three of the terms are underspecified upstream; the resolutions are
//! recorded in `DESIGN.md`:
//!   - `zoneMatchScore` buckets into exact / parent-zone / same-area / none.
//!   - distance comes from `OpCodeDirectory`, resolved at the courier's own
//!     managed prefix and the task's delivery OP Code.
//!   - `experienceScore` is a saturating function of `Courier.bio` length.

use openpenpal_types::{Courier, OpCode, Task};

use crate::error::HierarchyError;
use crate::permission::can_manage_op_code;
use crate::repository::OpCodeDirectory;

const HIERARCHY_BONUS_BUILDING: f64 = 40.0;
const HIERARCHY_BONUS_AREA: f64 = 30.0;
const HIERARCHY_BONUS_SCHOOL: f64 = 20.0;
const HIERARCHY_BONUS_CITY: f64 = 10.0;

const ZONE_MATCH_EXACT: f64 = 50.0;
const ZONE_MATCH_PARENT: f64 = 30.0;
const ZONE_MATCH_SAME_AREA: f64 = 20.0;
const ZONE_MATCH_NONE: f64 = 0.0;

const EARTH_RADIUS_KM: f64 = 6371.0;

fn hierarchy_bonus(courier: &Courier) -> f64 {
    match courier.zone_type {
        openpenpal_types::ZoneType::Building => HIERARCHY_BONUS_BUILDING,
        openpenpal_types::ZoneType::Area => HIERARCHY_BONUS_AREA,
        openpenpal_types::ZoneType::School => HIERARCHY_BONUS_SCHOOL,
        openpenpal_types::ZoneType::City => HIERARCHY_BONUS_CITY,
    }
}

fn zone_match_score(courier: &Courier, delivery_op_code: &OpCode) -> f64 {
    let is_building_level = courier.managed_op_code_prefix.len() == 6;
    let contains_target = can_manage_op_code(courier, delivery_op_code);

    if is_building_level && contains_target {
        return ZONE_MATCH_EXACT;
    }
    if contains_target {
        return ZONE_MATCH_PARENT;
    }
    let courier_op_code = OpCode::parse(&pad_to_op_code(&courier.managed_op_code_prefix));
    if let Ok(courier_code) = courier_op_code {
        if courier_code.same_area(delivery_op_code) {
            return ZONE_MATCH_SAME_AREA;
        }
    }
    ZONE_MATCH_NONE
}

/// The zone tree stores prefixes shorter than 6 characters; pad with zeros
/// so the shared `OpCode::same_area` comparison can run on it.
fn pad_to_op_code(prefix: &str) -> String {
    let mut padded = prefix.to_string();
    while padded.len() < 6 {
        padded.push('0');
    }
    padded
}

fn haversine_km(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lat1, lon1) = (a.0.to_radians(), a.1.to_radians());
    let (lat2, lon2) = (b.0.to_radians(), b.1.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// Bio length in characters, one point per 50 chars, capped at 20.
fn experience_score(courier: &Courier) -> f64 {
    let len = courier.bio.as_deref().map(str::len).unwrap_or(0) as f64;
    (len / 50.0).min(20.0)
}

pub struct ScoreBreakdown {
    pub rating_term: f64,
    pub hierarchy_bonus: f64,
    pub zone_match: f64,
    pub distance_term: f64,
    pub load_term: f64,
    pub experience: f64,
    pub points_term: f64,
    pub total: f64,
}

pub async fn score_courier(
    courier: &Courier,
    task: &Task,
    active_task_count: u32,
    directory: &dyn OpCodeDirectory,
) -> Result<ScoreBreakdown, HierarchyError> {
    let rating_term = 20.0 * courier.rating;
    let hierarchy_bonus = hierarchy_bonus(courier);
    let zone_match = zone_match_score(courier, &task.delivery_op_code);

    let distance_term = match (
        directory.coordinates_of(&courier.managed_op_code_prefix).await?,
        directory
            .coordinates_of(task.delivery_op_code.prefix(courier.managed_op_code_prefix.len()))
            .await?,
    ) {
        (Some(from), Some(to)) => {
            let distance = haversine_km(from, to);
            50.0 / (1.0 + distance * distance)
        }
        _ => 0.0,
    };

    let load_term = 30.0 / (1.0 + 0.5 * active_task_count as f64);
    let experience = experience_score(courier);
    let points_term = (0.01 * courier.points as f64).min(15.0);

    let total = rating_term + hierarchy_bonus + zone_match + distance_term + load_term + experience + points_term;

    Ok(ScoreBreakdown {
        rating_term,
        hierarchy_bonus,
        zone_match,
        distance_term,
        load_term,
        experience,
        points_term,
        total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use openpenpal_types::{CourierId, CourierLevel, CourierStatus, LetterId, TaskId, TaskPriority, TaskStatus, UserId};

    struct NullDirectory;

    #[async_trait]
    impl OpCodeDirectory for NullDirectory {
        async fn coordinates_of(&self, _prefix: &str) -> Result<Option<(f64, f64)>, HierarchyError> {
            Ok(None)
        }
    }

    struct FixedDirectory(std::collections::HashMap<String, (f64, f64)>);

    #[async_trait]
    impl OpCodeDirectory for FixedDirectory {
        async fn coordinates_of(&self, prefix: &str) -> Result<Option<(f64, f64)>, HierarchyError> {
            Ok(self.0.get(prefix).copied())
        }
    }

    fn courier(level: u8, prefix: &str, rating: f64, points: i64, bio: Option<&str>) -> Courier {
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
            rating,
            points,
            created_by_id: UserId::new(),
            bio: bio.map(String::from),
        }
    }

    fn task(delivery: &str) -> Task {
        Task {
            id: TaskId::new(),
            letter_id: LetterId::new(),
            pickup_op_code: OpCode::parse("AA0000").unwrap(),
            delivery_op_code: OpCode::parse(delivery).unwrap(),
            assigned_courier_id: None,
            status: TaskStatus::Available,
            priority: TaskPriority::Normal,
            reward_points: 10,
            created_at: chrono::Utc::now(),
            accepted_at: None,
            completed_at: None,
        }
    }

    #[tokio::test]
    async fn exact_zone_match_outscores_parent_zone() {
        let t = task("PK5F3D");
        let exact = courier(1, "PK5F3D", 4.0, 0, None);
        let parent = courier(2, "PK5F", 4.0, 0, None);
        let exact_score = score_courier(&exact, &t, 0, &NullDirectory).await.unwrap();
        let parent_score = score_courier(&parent, &t, 0, &NullDirectory).await.unwrap();
        assert_eq!(exact_score.zone_match, ZONE_MATCH_EXACT);
        assert_eq!(parent_score.zone_match, ZONE_MATCH_PARENT);
        assert!(exact_score.zone_match > parent_score.zone_match);
    }

    #[tokio::test]
    async fn unrelated_zone_scores_zero_match() {
        let t = task("PK5F3D");
        let unrelated = courier(1, "QH1234", 4.0, 0, None);
        let score = score_courier(&unrelated, &t, 0, &NullDirectory).await.unwrap();
        assert_eq!(score.zone_match, ZONE_MATCH_NONE);
    }

    #[tokio::test]
    async fn heavier_active_load_lowers_score() {
        let t = task("PK5F3D");
        let c = courier(1, "PK5F3D", 4.0, 0, None);
        let idle = score_courier(&c, &t, 0, &NullDirectory).await.unwrap();
        let busy = score_courier(&c, &t, 10, &NullDirectory).await.unwrap();
        assert!(idle.load_term > busy.load_term);
    }

    #[tokio::test]
    async fn points_term_is_capped_at_fifteen() {
        let t = task("PK5F3D");
        let c = courier(1, "PK5F3D", 4.0, 100_000, None);
        let score = score_courier(&c, &t, 0, &NullDirectory).await.unwrap();
        assert_eq!(score.points_term, 15.0);
    }

    #[tokio::test]
    async fn closer_zone_scores_higher_distance_term() {
        let t = task("PK5F3D");
        let near = courier(1, "PK5F3D", 4.0, 0, None);
        let far = courier(1, "ZZ9999", 4.0, 0, None);
        let mut coords = std::collections::HashMap::new();
        coords.insert("PK5F3D".to_string(), (31.23, 121.47));
        coords.insert("ZZ9999".to_string(), (40.71, -74.00));
        let directory = FixedDirectory(coords);
        let near_score = score_courier(&near, &t, 0, &directory).await.unwrap();
        let far_score = score_courier(&far, &t, 0, &directory).await.unwrap();
        assert!(near_score.distance_term > far_score.distance_term);
    }

    #[test]
    fn experience_score_saturates() {
        let short = courier(1, "PK5F3D", 4.0, 0, Some("new here"));
        let long_bio = "a".repeat(2000);
        let long = courier(1, "PK5F3D", 4.0, 0, Some(&long_bio));
        assert!(experience_score(&short) < experience_score(&long));
        assert_eq!(experience_score(&long), 20.0);
    }
}
