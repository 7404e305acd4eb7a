//! Placement suggestions for pallets.
//!
//! Candidates are the available positions in the destination's preferential
//! zones. Levels with no preferential candidate are backfilled with
//! non-preferential positions from the same aisles; other aisles are never
//! borrowed from. Multi-slot pallets get windows of consecutive positions
//! sharing one aisle and level.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use slotting_types::{Pallet, Position, MAX_LEVEL};
use tracing::{debug, instrument};

use crate::config::SlottingConfig;
use crate::error::Result;
use crate::repository::Repository;
use crate::zone::ZoneResolver;

/// One ranked placement: a single position, or a contiguous window for
/// multi-slot pallets (positions in ascending number order).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacementSuggestion {
    pub positions: Vec<Position>,
    pub score: u32,
    pub preferential: bool,
}

impl PlacementSuggestion {
    /// Code of the first position of the placement.
    pub fn code(&self) -> &str {
        self.positions.first().map(|p| p.code.as_str()).unwrap_or("")
    }

    pub fn codes(&self) -> Vec<&str> {
        self.positions.iter().map(|p| p.code.as_str()).collect()
    }
}

/// A position considered for placement.
#[derive(Debug, Clone)]
struct Candidate {
    position: Position,
    preferential: bool,
}

/// Ranks available positions for a pallet.
#[derive(Clone)]
pub struct SlottingEngine {
    repository: Repository,
    resolver: ZoneResolver,
    config: SlottingConfig,
}

impl SlottingEngine {
    pub fn new(repository: Repository, resolver: ZoneResolver, config: SlottingConfig) -> Self {
        Self {
            repository,
            resolver,
            config,
        }
    }

    pub fn resolver(&self) -> &ZoneResolver {
        &self.resolver
    }

    /// Ranked placements for a pallet. Empty when the pallet has no
    /// resolvable destination or no candidate positions exist.
    ///
    /// Single-slot results are returned in full unless `limit` is given;
    /// multi-slot results are capped at `limit` or the configured default.
    #[instrument(skip(self, pallet), fields(pallet_id = %pallet.id))]
    pub async fn suggest(&self, pallet: &Pallet, limit: Option<usize>) -> Result<Vec<PlacementSuggestion>> {
        let Some(destination) = self.resolve_pallet_destination(pallet).await? else {
            debug!("No destination for pallet, nothing to suggest");
            return Ok(Vec::new());
        };

        let positions = self.repository.available_positions().await?;
        let weight = pallet
            .estimated_weight_kg
            .unwrap_or(self.config.default_pallet_weight_kg);
        let slots = pallet.slots_required() as usize;

        let suggestions = if slots > 1 {
            let limit = limit.unwrap_or(self.config.default_limit);
            self.rank_contiguous(&positions, &destination, weight, slots, limit)
        } else {
            let mut ranked = self.rank_single(&positions, &destination, weight);
            if let Some(limit) = limit {
                ranked.truncate(limit);
            }
            ranked
        };

        debug!(%destination, slots, count = suggestions.len(), "Ranked placements");
        Ok(suggestions)
    }

    /// Canonical destination for a pallet: from its cargo's client code,
    /// then the cargo's destination, then the destination and client cached
    /// on its notes.
    pub async fn resolve_pallet_destination(&self, pallet: &Pallet) -> Result<Option<String>> {
        if let Some(cargo_id) = pallet.cargo_id {
            if let Some(cargo) = self.repository.get_cargo(cargo_id).await? {
                let resolved = self
                    .resolver
                    .resolve_destination(&cargo.destination_client)
                    .or_else(|| self.resolver.resolve_destination(&cargo.destination));
                if let Some(destination) = resolved {
                    return Ok(Some(destination.to_string()));
                }
            }
        }

        let Some(notes) = self.repository.pallet_notes(pallet.id).await? else {
            return Ok(None);
        };
        let resolved = [notes.destination.as_deref(), notes.destination_client.as_deref()]
            .into_iter()
            .flatten()
            .find_map(|value| self.resolver.resolve_destination(value));
        Ok(resolved.map(str::to_string))
    }

    /// Score one position for a destination and pallet weight.
    pub fn score(&self, position: &Position, preferential: bool, pallet_weight_kg: f64) -> u32 {
        let weights = &self.config.weights;
        let mut score = 0;
        if preferential {
            score += weights.preferential;
        }
        if position.level <= weights.low_level_max {
            score += weights.low_level;
        } else {
            score += weights.upper_level;
        }
        if position.capacity_kg >= pallet_weight_kg {
            score += weights.capacity;
        }
        if position.is_available() {
            score += weights.available;
        }
        score
    }

    /// Every candidate as a single-position placement, best first.
    pub fn rank_single(
        &self,
        positions: &[Position],
        destination: &str,
        pallet_weight_kg: f64,
    ) -> Vec<PlacementSuggestion> {
        let mut ranked: Vec<PlacementSuggestion> = self
            .candidates(positions, destination)
            .into_iter()
            .map(|c| PlacementSuggestion {
                score: self.score(&c.position, c.preferential, pallet_weight_kg),
                preferential: c.preferential,
                positions: vec![c.position],
            })
            .collect();

        ranked.sort_by(compare_suggestions);
        ranked
    }

    /// Windows of exactly `slots` consecutive positions sharing an aisle and
    /// level, best first, at most `limit`.
    pub fn rank_contiguous(
        &self,
        positions: &[Position],
        destination: &str,
        pallet_weight_kg: f64,
        slots: usize,
        limit: usize,
    ) -> Vec<PlacementSuggestion> {
        if slots == 0 {
            return Vec::new();
        }

        let mut groups: BTreeMap<(String, u8), Vec<Candidate>> = BTreeMap::new();
        for candidate in self.candidates(positions, destination) {
            groups
                .entry((candidate.position.aisle.clone(), candidate.position.level))
                .or_default()
                .push(candidate);
        }

        let mut windows = Vec::new();
        for group in groups.values_mut() {
            group.sort_by_key(|c| c.position.number);
            for window in group.windows(slots) {
                let consecutive = window
                    .windows(2)
                    .all(|pair| pair[1].position.number == pair[0].position.number + 1);
                if !consecutive {
                    continue;
                }
                let first = &window[0];
                windows.push(PlacementSuggestion {
                    score: self.score(&first.position, first.preferential, pallet_weight_kg)
                        + self.config.weights.contiguity,
                    preferential: first.preferential,
                    positions: window.iter().map(|c| c.position.clone()).collect(),
                });
            }
        }

        windows.sort_by(compare_suggestions);
        windows.truncate(limit);
        windows
    }

    /// Preferential positions plus same-aisle backfill for levels that have
    /// no preferential position. Empty when nothing is preferential.
    fn candidates(&self, positions: &[Position], destination: &str) -> Vec<Candidate> {
        let (preferential, others): (Vec<&Position>, Vec<&Position>) = positions
            .iter()
            .filter(|p| p.is_available())
            .partition(|p| self.resolver.is_preferential(&p.code, destination));

        let aisles: BTreeSet<&str> = preferential.iter().map(|p| p.aisle.as_str()).collect();
        let covered: BTreeSet<u8> = preferential.iter().map(|p| p.level).collect();

        let backfill = others.into_iter().filter(|p| {
            (1..=MAX_LEVEL).contains(&p.level)
                && !covered.contains(&p.level)
                && aisles.contains(p.aisle.as_str())
        });

        preferential
            .into_iter()
            .map(|p| Candidate {
                position: p.clone(),
                preferential: true,
            })
            .chain(backfill.map(|p| Candidate {
                position: p.clone(),
                preferential: false,
            }))
            .collect()
    }
}

/// Score descending, then natural position-code order.
fn compare_suggestions(a: &PlacementSuggestion, b: &PlacementSuggestion) -> Ordering {
    b.score.cmp(&a.score).then_with(|| {
        match (a.positions.first(), b.positions.first()) {
            (Some(x), Some(y)) => match (x.parsed_code(), y.parsed_code()) {
                (Some(cx), Some(cy)) => cx.cmp(&cy),
                _ => x.code.cmp(&y.code),
            },
            _ => Ordering::Equal,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zone::ZoneResolver;
    use slotting_resilience::{CircuitBreaker, CircuitBreakerConfig, ResilientGateway, RetryPolicy};
    use slotting_store::InMemoryGateway;
    use slotting_types::PositionStatus;
    use std::sync::Arc;

    const RP: &str = "RIBEIRAO PRETO - SP";

    fn engine() -> SlottingEngine {
        let store = Arc::new(InMemoryGateway::new());
        let breaker = Arc::new(CircuitBreaker::new("store", CircuitBreakerConfig::default()));
        let repo = Repository::new(ResilientGateway::new(store, breaker, RetryPolicy::no_retry()));
        SlottingEngine::new(repo, ZoneResolver::default(), SlottingConfig::default())
    }

    fn position(code: &str) -> Position {
        Position::from_code(code, 1000.0).unwrap()
    }

    fn positions(codes: &[&str]) -> Vec<Position> {
        codes.iter().map(|c| position(c)).collect()
    }

    #[test]
    fn test_score() {
        let engine = engine();
        let low = position("PD-100-01");
        let high = position("PD-100-05");

        assert_eq!(engine.score(&low, true, 800.0), 50 + 25 + 15 + 10);
        assert_eq!(engine.score(&high, true, 800.0), 50 + 10 + 15 + 10);
        assert_eq!(engine.score(&low, false, 1200.0), 25 + 10);
    }

    #[test]
    fn test_single_prefers_zone_and_low_levels() {
        let engine = engine();
        let all = positions(&["PD-100-05", "PD-100-01", "PD-050-01", "PD-101-02"]);

        let ranked = engine.rank_single(&all, RP, 800.0);
        let codes: Vec<&str> = ranked.iter().map(|s| s.code()).collect();

        // PD-050 is outside the zone and its level is already covered.
        assert_eq!(codes, vec!["PD-100-01", "PD-101-02", "PD-100-05"]);
        assert!(ranked.iter().all(|s| s.preferential));
    }

    #[test]
    fn test_backfill_only_from_preferential_aisles() {
        let engine = engine();
        // Preferential candidates only at level 1 in aisle PD.
        let all = positions(&["PD-100-01", "PD-050-03", "PA-010-03", "PB-001-02"]);

        let ranked = engine.rank_single(&all, RP, 800.0);
        let codes: Vec<&str> = ranked.iter().map(|s| s.code()).collect();

        assert_eq!(codes, vec!["PD-100-01", "PD-050-03"]);
        assert!(ranked[0].preferential);
        assert!(!ranked[1].preferential);
    }

    #[test]
    fn test_no_preferential_candidates_means_no_suggestions() {
        let engine = engine();
        let all = positions(&["PD-050-01", "PA-010-03"]);
        assert!(engine.rank_single(&all, RP, 800.0).is_empty());
    }

    #[test]
    fn test_unavailable_positions_are_skipped() {
        let engine = engine();
        let mut all = positions(&["PD-100-01", "PD-100-02"]);
        all[0].status = PositionStatus::Blocked;

        let ranked = engine.rank_single(&all, RP, 800.0);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].code(), "PD-100-02");
    }

    #[test]
    fn test_contiguous_windows_of_exactly_k() {
        let engine = engine();
        let all = positions(&[
            "PD-100-01",
            "PD-101-01",
            "PD-102-01",
            "PD-103-01",
            "PD-105-01",
            "PD-106-01",
            "PD-100-02",
            "PD-101-02",
        ]);

        let windows = engine.rank_contiguous(&all, RP, 800.0, 3, 10);

        assert_eq!(windows.len(), 2);
        for window in &windows {
            assert_eq!(window.positions.len(), 3);
            let level = window.positions[0].level;
            let aisle = &window.positions[0].aisle;
            for pair in window.positions.windows(2) {
                assert_eq!(pair[1].number, pair[0].number + 1);
                assert_eq!(pair[1].level, level);
                assert_eq!(&pair[1].aisle, aisle);
            }
            assert_eq!(window.score, 50 + 25 + 15 + 10 + 30);
        }
        assert_eq!(windows[0].codes(), vec!["PD-100-01", "PD-101-01", "PD-102-01"]);
        assert_eq!(windows[1].codes(), vec!["PD-101-01", "PD-102-01", "PD-103-01"]);
    }

    #[test]
    fn test_contiguous_respects_limit() {
        let engine = engine();
        let codes: Vec<String> = (100..=120).map(|n| format!("PD-{n:03}-01")).collect();
        let all: Vec<Position> = codes.iter().map(|c| position(c)).collect();

        let windows = engine.rank_contiguous(&all, RP, 800.0, 2, 10);
        assert_eq!(windows.len(), 10);
        assert!(engine.rank_contiguous(&all, RP, 800.0, 2, 0).is_empty());
    }

    #[tokio::test]
    async fn test_pallet_without_destination_gets_nothing() {
        let engine = engine();
        let pallet = Pallet::new("PLT-000001", None);
        assert!(engine.suggest(&pallet, None).await.unwrap().is_empty());
    }
}
