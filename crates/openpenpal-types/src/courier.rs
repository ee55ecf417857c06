//! Courier level/zone vocabulary shared between the hierarchy, letters, and
//! gateway crates.

use serde::{Deserialize, Serialize};

/// Courier hierarchy level. `1` manages a single building, `4` manages a city.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct CourierLevel(u8);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("courier level must be 1..=4, got {0}")]
pub struct InvalidCourierLevel(pub u8);

impl CourierLevel {
    pub const L1: CourierLevel = CourierLevel(1);
    pub const L2: CourierLevel = CourierLevel(2);
    pub const L3: CourierLevel = CourierLevel(3);
    pub const L4: CourierLevel = CourierLevel(4);

    pub fn new(level: u8) -> Result<Self, InvalidCourierLevel> {
        if (1..=4).contains(&level) {
            Ok(Self(level))
        } else {
            Err(InvalidCourierLevel(level))
        }
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    pub fn zone_type(&self) -> ZoneType {
        match self.0 {
            1 => ZoneType::Building,
            2 => ZoneType::Area,
            3 => ZoneType::School,
            4 => ZoneType::City,
            _ => unreachable!("CourierLevel is validated at construction"),
        }
    }

    /// Length of `managed_op_code_prefix` for a courier at this level.
    /// L1 manages a full point (6), L2 an area (4), L3 and L4 a school (2).
    pub fn prefix_len(&self) -> usize {
        match self.0 {
            1 => 6,
            2 => 4,
            3 | 4 => 2,
            _ => unreachable!(),
        }
    }

    pub fn one_below(&self) -> Option<CourierLevel> {
        CourierLevel::new(self.0.checked_sub(1)?).ok()
    }

    pub fn one_above(&self) -> Option<CourierLevel> {
        CourierLevel::new(self.0 + 1).ok()
    }
}

impl TryFrom<u8> for CourierLevel {
    type Error = InvalidCourierLevel;
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CourierLevel> for u8 {
    fn from(value: CourierLevel) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneType {
    Building,
    Area,
    School,
    City,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CourierStatus {
    Pending,
    Approved,
    Suspended,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentType {
    Direct,
    Cascade,
    AutoHierarchy,
    Reassignment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    User,
    CourierL1,
    CourierL2,
    CourierL3,
    CourierL4,
    SchoolAdmin,
    PlatformAdmin,
    SuperAdmin,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_type_matches_level() {
        assert_eq!(CourierLevel::L1.zone_type(), ZoneType::Building);
        assert_eq!(CourierLevel::L2.zone_type(), ZoneType::Area);
        assert_eq!(CourierLevel::L3.zone_type(), ZoneType::School);
        assert_eq!(CourierLevel::L4.zone_type(), ZoneType::City);
    }

    #[test]
    fn prefix_len_matches_spec_table() {
        assert_eq!(CourierLevel::L1.prefix_len(), 6);
        assert_eq!(CourierLevel::L2.prefix_len(), 4);
        assert_eq!(CourierLevel::L3.prefix_len(), 2);
        assert_eq!(CourierLevel::L4.prefix_len(), 2);
    }

    #[test]
    fn rejects_out_of_range_level() {
        assert!(CourierLevel::new(0).is_err());
        assert!(CourierLevel::new(5).is_err());
    }
}
