//! # Risk Levels
//!
//! Blast-radius classification for commands and jobs.
//!
//! Parsing is total: anything that is not a known level name maps to
//! [`RiskLevel::R0Read`]. Surfaces that must not accept a read level (config
//! push) reject it explicitly after parsing.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Ordered risk classification: read < change < dangerous change
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum RiskLevel {
    /// Read-only, no device state change
    #[default]
    R0Read,
    /// Configuration change
    R2Change,
    /// Change that can take a device or service down
    R3Dangerous,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 3] = [RiskLevel::R0Read, RiskLevel::R2Change, RiskLevel::R3Dangerous];

    /// Wire name (`R0_READ`, `R2_CHANGE`, `R3_DANGEROUS`)
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::R0Read => "R0_READ",
            RiskLevel::R2Change => "R2_CHANGE",
            RiskLevel::R3Dangerous => "R3_DANGEROUS",
        }
    }

    /// Parse a level name; absent or unrecognised input is `R0_READ`
    pub fn parse(input: Option<&str>) -> Self {
        let Some(raw) = input else {
            return RiskLevel::R0Read;
        };
        let raw = raw.trim();
        RiskLevel::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(raw))
            .unwrap_or(RiskLevel::R0Read)
    }

    /// Everything above `R0_READ` writes to the device
    pub fn is_write_risk(&self) -> bool {
        *self > RiskLevel::R0Read
    }

    /// `R2_CHANGE` and above need approval
    pub fn is_change_risk(&self) -> bool {
        *self >= RiskLevel::R2Change
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for RiskLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RiskLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(RiskLevel::parse(raw.as_deref()))
    }
}
