//! Courier rankings by school, zone, or national scope. Rows are
//! materialized by a periodic refresh, never computed synchronously inside
//! a request handler.

use chrono::{DateTime, Utc};
use openpenpal_types::{Courier, CourierId, CourierStatus};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum LeaderboardScope {
    /// All couriers of one school (2-char OP Code prefix).
    School { code: String },
    /// All couriers whose managed prefix falls under an arbitrary zone prefix.
    Zone { prefix: String },
    National,
}

impl LeaderboardScope {
    fn includes(&self, courier: &Courier) -> bool {
        match self {
            LeaderboardScope::School { code } => courier.managed_op_code_prefix.starts_with(code.as_str()),
            LeaderboardScope::Zone { prefix } => courier.managed_op_code_prefix.starts_with(prefix.as_str()),
            LeaderboardScope::National => true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub courier_id: CourierId,
    pub points: i64,
    pub rating: f64,
    pub zone_code: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Leaderboard {
    pub scope: LeaderboardScope,
    pub refreshed_at: DateTime<Utc>,
    pub entries: Vec<LeaderboardEntry>,
}

/// Ranks approved couriers in `scope` by points, then rating, then courier
/// id for a deterministic total order.
pub fn build(scope: LeaderboardScope, couriers: &[Courier], now: DateTime<Utc>) -> Leaderboard {
    let mut ranked: Vec<&Courier> = couriers
        .iter()
        .filter(|c| c.status == CourierStatus::Approved && scope.includes(c))
        .collect();
    ranked.sort_by(|a, b| {
        b.points
            .cmp(&a.points)
            .then_with(|| b.rating.partial_cmp(&a.rating).unwrap_or(std::cmp::Ordering::Equal))
            .then_with(|| a.id.cmp(&b.id))
    });

    let entries = ranked
        .into_iter()
        .enumerate()
        .map(|(index, courier)| LeaderboardEntry {
            rank: index as u32 + 1,
            courier_id: courier.id,
            points: courier.points,
            rating: courier.rating,
            zone_code: courier.zone_code.clone(),
        })
        .collect();

    Leaderboard {
        scope,
        refreshed_at: now,
        entries,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openpenpal_types::{CourierLevel, UserId};

    fn courier(prefix: &str, points: i64, rating: f64, status: CourierStatus) -> Courier {
        Courier {
            id: CourierId::new(),
            user_id: UserId::new(),
            level: CourierLevel::L1,
            zone_type: CourierLevel::L1.zone_type(),
            zone_code: prefix.to_string(),
            managed_op_code_prefix: prefix.to_string(),
            parent_id: None,
            status,
            rating,
            points,
            created_by_id: UserId::new(),
            bio: None,
        }
    }

    #[test]
    fn ranks_by_points_then_rating() {
        let couriers = vec![
            courier("PK5F3D", 100, 4.0, CourierStatus::Approved),
            courier("PK5F3E", 300, 3.5, CourierStatus::Approved),
            courier("PK5F3F", 100, 4.8, CourierStatus::Approved),
        ];
        let board = build(LeaderboardScope::National, &couriers, Utc::now());
        assert_eq!(board.entries.len(), 3);
        assert_eq!(board.entries[0].points, 300);
        assert_eq!(board.entries[1].rating, 4.8);
        assert_eq!(board.entries[2].rating, 4.0);
        assert_eq!(board.entries[0].rank, 1);
    }

    #[test]
    fn school_scope_excludes_other_schools() {
        let couriers = vec![
            courier("PK5F3D", 100, 4.0, CourierStatus::Approved),
            courier("QH2A1B", 500, 5.0, CourierStatus::Approved),
        ];
        let board = build(LeaderboardScope::School { code: "PK".to_string() }, &couriers, Utc::now());
        assert_eq!(board.entries.len(), 1);
        assert_eq!(board.entries[0].points, 100);
    }

    #[test]
    fn unapproved_couriers_are_not_ranked() {
        let couriers = vec![
            courier("PK5F3D", 900, 5.0, CourierStatus::Pending),
            courier("PK5F3E", 100, 4.0, CourierStatus::Approved),
        ];
        let board = build(LeaderboardScope::National, &couriers, Utc::now());
        assert_eq!(board.entries.len(), 1);
        assert_eq!(board.entries[0].points, 100);
    }

    #[test]
    fn equal_couriers_rank_deterministically_by_id() {
        let a = courier("PK5F3D", 100, 4.0, CourierStatus::Approved);
        let b = courier("PK5F3E", 100, 4.0, CourierStatus::Approved);
        let expected_first = a.id.min(b.id);
        let board = build(LeaderboardScope::National, &[a, b], Utc::now());
        assert_eq!(board.entries[0].courier_id, expected_first);
    }
}
