//! Destination-affinity zoning.
//!
//! Maps destination abbreviations to canonical names and decides whether a
//! position lies in the preferential zone of a destination. Pure and
//! stateless once built.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use slotting_types::PositionCode;

/// A run of positions reserved for one destination, from
/// `prefix-start_number-start_level` to `prefix-end_number-end_level`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneRange {
    pub prefix: String,
    pub start_number: u32,
    pub start_level: u8,
    pub end_number: u32,
    pub end_level: u8,
    pub destination: String,
}

impl ZoneRange {
    pub fn new(
        prefix: impl Into<String>,
        (start_number, start_level): (u32, u8),
        (end_number, end_level): (u32, u8),
        destination: impl Into<String>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            start_number,
            start_level,
            end_number,
            end_level,
            destination: destination.into(),
        }
    }

    /// Whether `code` falls inside the range.
    ///
    /// Inside the range and on the start number every level up to the higher
    /// of the two bound levels qualifies. On the end number the end level caps
    /// the shelf.
    pub fn contains(&self, code: &PositionCode) -> bool {
        if code.prefix != self.prefix
            || code.number < self.start_number
            || code.number > self.end_number
        {
            return false;
        }

        let top = self.start_level.max(self.end_level);
        let cap = if code.number == self.start_number {
            top
        } else if code.number == self.end_number {
            self.end_level
        } else {
            top
        };

        (1..=cap).contains(&code.level)
    }
}

/// Abbreviation lookup plus the ordered range table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneTable {
    /// Abbreviation to canonical destination name.
    pub destinations: BTreeMap<String, String>,

    /// Preferential ranges, checked in order.
    pub ranges: Vec<ZoneRange>,
}

impl Default for ZoneTable {
    fn default() -> Self {
        let destinations = [
            ("RP", "RIBEIRAO PRETO - SP"),
            ("RIBEIRAO", "RIBEIRAO PRETO - SP"),
            ("SJRP", "SAO JOSE DO RIO PRETO - SP"),
            ("RIO PRETO", "SAO JOSE DO RIO PRETO - SP"),
            ("CPS", "CAMPINAS - SP"),
            ("BAU", "BAURU - SP"),
            ("UDI", "UBERLANDIA - MG"),
            ("GYN", "GOIANIA - GO"),
        ]
        .into_iter()
        .map(|(abbr, name)| (abbr.to_string(), name.to_string()))
        .collect();

        let ranges = vec![
            ZoneRange::new("PD", (1, 1), (40, 7), "CAMPINAS - SP"),
            ZoneRange::new("PD", (97, 1), (132, 7), "RIBEIRAO PRETO - SP"),
            ZoneRange::new("PD", (133, 1), (160, 5), "SAO JOSE DO RIO PRETO - SP"),
            ZoneRange::new("PA", (1, 1), (30, 7), "BAURU - SP"),
            ZoneRange::new("PA", (31, 1), (60, 4), "UBERLANDIA - MG"),
            ZoneRange::new("PB", (1, 1), (45, 7), "GOIANIA - GO"),
        ];

        Self {
            destinations,
            ranges,
        }
    }
}

/// Resolves destinations and preferential positions.
#[derive(Debug, Clone, Default)]
pub struct ZoneResolver {
    table: ZoneTable,
}

impl ZoneResolver {
    pub fn new(table: ZoneTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &ZoneTable {
        &self.table
    }

    /// Canonical name for an abbreviation.
    ///
    /// Lookup is exact. A string that already is a canonical name resolves to itself.
    pub fn resolve_destination(&self, abbreviation: &str) -> Option<&str> {
        if let Some(name) = self.table.destinations.get(abbreviation) {
            return Some(name.as_str());
        }
        self.table
            .destinations
            .values()
            .chain(self.table.ranges.iter().map(|r| &r.destination))
            .find(|name| name.as_str() == abbreviation)
            .map(String::as_str)
    }

    /// Whether `position_code` lies in a range reserved for `destination`.
    ///
    /// Malformed codes are never preferential.
    pub fn is_preferential(&self, position_code: &str, destination: &str) -> bool {
        let Ok(code) = PositionCode::parse(position_code) else {
            return false;
        };
        self.is_preferential_code(&code, destination)
    }

    pub fn is_preferential_code(&self, code: &PositionCode, destination: &str) -> bool {
        self.table
            .ranges
            .iter()
            .any(|range| range.destination == destination && range.contains(code))
    }

    /// Destination of the first range containing the position, if any.
    pub fn preferred_destination(&self, position_code: &str) -> Option<&str> {
        let code = PositionCode::parse(position_code).ok()?;
        self.table
            .ranges
            .iter()
            .find(|range| range.contains(&code))
            .map(|range| range.destination.as_str())
    }
}
