//! The six-character postal address used throughout the platform.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

static OP_CODE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z0-9]{6}$").expect("OP Code pattern is a valid regex"));

/// Errors raised while parsing or validating an OP Code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OpCodeError {
    #[error("OP Code must be exactly 6 uppercase alphanumeric characters, got {0:?}")]
    BadFormat(String),
}

/// A validated six-character postal address: `[school:2][area:2][point:2]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OpCode([u8; 6]);

impl OpCode {
    pub fn parse(raw: &str) -> Result<Self, OpCodeError> {
        if !OP_CODE_PATTERN.is_match(raw) {
            return Err(OpCodeError::BadFormat(raw.to_string()));
        }
        let mut bytes = [0u8; 6];
        bytes.copy_from_slice(raw.as_bytes());
        Ok(Self(bytes))
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).expect("OpCode bytes are always ASCII")
    }

    pub fn school(&self) -> &str {
        &self.as_str()[0..2]
    }

    pub fn area(&self) -> &str {
        &self.as_str()[2..4]
    }

    pub fn point(&self) -> &str {
        &self.as_str()[4..6]
    }

    /// True when `self` shares the same first 4 characters (school+area) as `other`.
    pub fn same_area(&self, other: &OpCode) -> bool {
        self.as_str()[0..4] == other.as_str()[0..4]
    }

    /// True when `self` shares the same first 2 characters (school) as `other`.
    pub fn same_school(&self, other: &OpCode) -> bool {
        self.school() == other.school()
    }

    /// A prefix of length `len` (0, 2, 4, or 6) of this code.
    pub fn prefix(&self, len: usize) -> &str {
        &self.as_str()[0..len]
    }

    /// Masks the point (last 2 chars) for `partial` privacy display.
    pub fn mask_point(&self) -> String {
        format!("{}**", &self.as_str()[0..4])
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for OpCode {
    type Error = OpCodeError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<OpCode> for String {
    fn from(value: OpCode) -> Self {
        value.as_str().to_string()
    }
}

/// A prefix-based scope, e.g. what a courier is permitted to act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpCodePrefix<'a>(&'a str);

impl<'a> OpCodePrefix<'a> {
    pub fn new(prefix: &'a str) -> Self {
        Self(prefix)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `permission(prefix, op) ⇔ op.startsWith(prefix)`.
    pub fn permits(&self, target: &OpCode) -> bool {
        if self.0.len() > 6 {
            return false;
        }
        target.prefix(self.0.len()) == self.0
    }

    /// Whether `other` (another prefix string) is strictly contained within
    /// this one, i.e. `other` starts with `self` and is longer than it.
    pub fn permits_prefix(&self, other: &str) -> bool {
        other.len() > self.0.len() && other.starts_with(self.0)
    }
}

/// Privacy level governing how an OP Code is displayed to non-owners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpCodePrivacy {
    Public,
    Partial,
    Private,
}

impl OpCode {
    /// Renders the code according to a privacy level and viewer permission.
    pub fn display_for(&self, privacy: OpCodePrivacy, viewer_is_owner: bool) -> Option<String> {
        match privacy {
            OpCodePrivacy::Public => Some(self.as_str().to_string()),
            OpCodePrivacy::Partial => Some(self.mask_point()),
            OpCodePrivacy::Private => {
                if viewer_is_owner {
                    Some(self.as_str().to_string())
                } else {
                    None
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_six_char_uppercase_alnum() {
        assert!(OpCode::parse("PK5F3D").is_ok());
        assert!(OpCode::parse("ABCD12").is_ok());
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(OpCode::parse("PK5F3").is_err());
        assert!(OpCode::parse("PK5F3DA").is_err());
    }

    #[test]
    fn rejects_lowercase() {
        assert!(OpCode::parse("pk5f3d").is_err());
    }

    #[test]
    fn prefix_predicate_matches_spec_semantics() {
        let op = OpCode::parse("PK5F3D").unwrap();
        assert!(OpCodePrefix::new("PK").permits(&op));
        assert!(OpCodePrefix::new("PK5F").permits(&op));
        assert!(OpCodePrefix::new("PK5F3D").permits(&op));
        assert!(!OpCodePrefix::new("QH").permits(&op));
    }

    #[test]
    fn partial_privacy_masks_point() {
        let op = OpCode::parse("PK5F3D").unwrap();
        assert_eq!(op.mask_point(), "PK5F**");
    }

    #[test]
    fn prefix_containment_of_another_prefix_is_strict() {
        let school = OpCodePrefix::new("PK");
        assert!(school.permits_prefix("PK5F"));
        assert!(school.permits_prefix("PK5F3D"));
        // An equal prefix is not strictly contained.
        assert!(!school.permits_prefix("PK"));
        assert!(!school.permits_prefix("QH2A"));
    }

    proptest::proptest! {
        #[test]
        fn prefix_permits_iff_starts_with(school in "[A-Z0-9]{2}", area in "[A-Z0-9]{2}", point in "[A-Z0-9]{2}") {
            let raw = format!("{school}{area}{point}");
            let op = OpCode::parse(&raw).unwrap();
            for len in [0usize, 2, 4, 6] {
                let prefix = &raw[0..len];
                proptest::prop_assert!(OpCodePrefix::new(prefix).permits(&op));
            }
        }
    }
}
