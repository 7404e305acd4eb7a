//! Storage positions and their structured codes.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::{PalletId, PositionId};

/// Highest shelf level in the racking.
pub const MAX_LEVEL: u8 = 7;

static CODE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Z]+)-(\d{1,4})-(\d{1,2})$").expect("position code pattern is valid")
});

/// Returned when a string is not a `PREFIX-NUMBER-LEVEL` position code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed position code: {0:?}")]
pub struct InvalidPositionCode(pub String);

/// A parsed position code such as `PD-097-03`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PositionCode {
    pub prefix: String,
    pub number: u32,
    pub level: u8,
}

impl PositionCode {
    pub fn new(prefix: impl Into<String>, number: u32, level: u8) -> Self {
        Self {
            prefix: prefix.into(),
            number,
            level,
        }
    }

    pub fn parse(code: &str) -> Result<Self, InvalidPositionCode> {
        let caps = CODE_PATTERN
            .captures(code.trim())
            .ok_or_else(|| InvalidPositionCode(code.to_string()))?;

        let number = caps[2]
            .parse()
            .map_err(|_| InvalidPositionCode(code.to_string()))?;
        let level: u8 = caps[3]
            .parse()
            .map_err(|_| InvalidPositionCode(code.to_string()))?;
        if level == 0 {
            return Err(InvalidPositionCode(code.to_string()));
        }

        Ok(Self {
            prefix: caps[1].to_string(),
            number,
            level,
        })
    }
}

impl FromStr for PositionCode {
    type Err = InvalidPositionCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PositionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:03}-{:02}", self.prefix, self.number, self.level)
    }
}

impl Ord for PositionCode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.prefix
            .cmp(&other.prefix)
            .then(self.number.cmp(&other.number))
            .then(self.level.cmp(&other.level))
    }
}

impl PartialOrd for PositionCode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Occupancy status of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    Available,
    Occupied,
    Blocked,
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionStatus::Available => write!(f, "available"),
            PositionStatus::Occupied => write!(f, "occupied"),
            PositionStatus::Blocked => write!(f, "blocked"),
        }
    }
}

/// An addressable storage slot.
///
/// `status == Occupied` holds exactly when `pallet_id` is set. The pallet
/// back-reference is a lookup aid; the pallet's own `position_ids` are
/// authoritative for where it sits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub code: String,
    /// Physical aisle the slot belongs to. Contiguity is only meaningful within one aisle.
    pub aisle: String,
    pub number: u32,
    pub level: u8,
    pub status: PositionStatus,
    #[serde(default)]
    pub pallet_id: Option<PalletId>,
    pub capacity_kg: f64,
    #[serde(default)]
    pub preferred_destination: Option<String>,
    #[serde(default)]
    pub occupied_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub released_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Position {
    /// Build an available position from its code. The aisle defaults to the code prefix.
    /// Levels above [`MAX_LEVEL`] are rejected.
    pub fn from_code(code: &str, capacity_kg: f64) -> Result<Self, InvalidPositionCode> {
        let parsed = PositionCode::parse(code)?;
        if parsed.level > MAX_LEVEL {
            return Err(InvalidPositionCode(code.to_string()));
        }
        Ok(Self {
            id: PositionId::generate(),
            code: parsed.to_string(),
            aisle: parsed.prefix.clone(),
            number: parsed.number,
            level: parsed.level,
            status: PositionStatus::Available,
            pallet_id: None,
            capacity_kg,
            preferred_destination: None,
            occupied_at: None,
            released_at: None,
            notes: None,
        })
    }

    pub fn is_available(&self) -> bool {
        self.status == PositionStatus::Available
    }

    /// Parsed code, if well formed.
    pub fn parsed_code(&self) -> Option<PositionCode> {
        PositionCode::parse(&self.code).ok()
    }
}
