//! Courier zone tree, permission checks, scoring, and the task assignment
//! engine. Storage is a port: this crate only depends on
//! `CourierRepository`/`TaskRepository`/`OpCodeDirectory`, never on a
//! concrete database driver.

pub mod engine;
pub mod error;
pub mod leaderboard;
pub mod permission;
pub mod repository;
pub mod roster;
pub mod scoring;

pub use engine::AssignmentEngine;
pub use error::HierarchyError;
pub use leaderboard::{Leaderboard, LeaderboardEntry, LeaderboardScope};
pub use permission::{can_create_subordinate_at, can_manage_op_code, manages_courier};
pub use repository::{CourierRepository, OpCodeDirectory, TaskRepository};
pub use roster::{CourierRoster, SubordinateApplication};
pub use scoring::{score_courier, ScoreBreakdown};
