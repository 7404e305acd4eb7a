//! Cargo and pallet aggregates derived from the per-pallet note lists.
//!
//! Every pallet under a cargo reports the cargo's aggregate counters, not its
//! own subset. The recompute is a plain sequence of reads and writes with no
//! locking: a mutation interleaved with it can leave a transiently stale
//! total that the next pass corrects. Running a pass twice is harmless.

use std::collections::HashSet;

use serde::Serialize;
use serde_json::json;
use slotting_types::{CargoId, NoteSummary, Pallet, PalletNotes};
use tracing::{debug, instrument, warn};

use crate::error::{EngineError, Result};
use crate::repository::Repository;

/// Outcome of one recompute pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsolidationReport {
    pub cargo_id: CargoId,
    pub pallet_count: u32,
    pub total_volumes: u32,
    pub total_notes: u32,
    /// Pallets whose counters were overwritten with the cargo totals
    pub pallets_updated: usize,
    /// Pallets whose counters could not be written
    pub propagation_failures: usize,
}

/// Merge note lists in pallet order, keeping the first occurrence of each
/// invoice number.
pub fn merge_notes<'a, I>(records: I) -> Vec<NoteSummary>
where
    I: IntoIterator<Item = (&'a Pallet, &'a PalletNotes)>,
{
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for (pallet, notes) in records {
        for item in &notes.items {
            if seen.insert(item.invoice_number.clone()) {
                merged.push(NoteSummary {
                    invoice_number: item.invoice_number.clone(),
                    supplier: item.supplier.clone(),
                    destination: item.destination.clone(),
                    volumes: item.volumes,
                    pallet_code: pallet.code.clone(),
                });
            }
        }
    }
    merged
}

/// Recomputes cargo aggregates and mirrors them onto member pallets.
#[derive(Clone)]
pub struct ConsolidationEngine {
    repository: Repository,
}

impl ConsolidationEngine {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Rebuild the cargo's cached note-summary list.
    #[instrument(skip(self))]
    pub async fn update_cargo_notes(&self, cargo_id: CargoId) -> Result<Vec<NoteSummary>> {
        self.require_cargo(cargo_id).await?;
        let (_, merged) = self.merged(cargo_id).await?;

        let notes = serde_json::to_value(&merged)?;
        self.repository
            .patch_cargo(cargo_id, json!({ "notes": notes }))
            .await?;
        debug!(notes = merged.len(), "Cargo note list rebuilt");
        Ok(merged)
    }

    /// Recompute cargo totals from the merged note list, persist them, then
    /// overwrite every linked pallet's counters with the same totals.
    ///
    /// A pallet write that fails is logged and counted; the pass still
    /// succeeds once the cargo totals are stored.
    #[instrument(skip(self))]
    pub async fn recompute_cargo(&self, cargo_id: CargoId) -> Result<ConsolidationReport> {
        self.require_cargo(cargo_id).await?;
        let (pallets, merged) = self.merged(cargo_id).await?;

        let total_volumes = merged
            .iter()
            .try_fold(0u32, |total, n| total.checked_add(n.volumes))
            .ok_or_else(|| {
                EngineError::Validation(format!("volume total of cargo {cargo_id} overflows"))
            })?;
        let total_notes = merged.len() as u32;
        let pallet_count = pallets.len() as u32;

        self.repository
            .patch_cargo(
                cargo_id,
                json!({
                    "pallet_count": pallet_count,
                    "total_volumes": total_volumes,
                    "total_notes": total_notes,
                }),
            )
            .await?;

        let mut report = ConsolidationReport {
            cargo_id,
            pallet_count,
            total_volumes,
            total_notes,
            pallets_updated: 0,
            propagation_failures: 0,
        };

        for pallet in &pallets {
            let patch = json!({ "volume_count": total_volumes, "note_count": total_notes });
            match self.repository.patch_pallet(pallet.id, patch).await {
                Ok(()) => report.pallets_updated += 1,
                Err(e) => {
                    warn!(pallet_id = %pallet.id, error = %e, "Failed to propagate cargo totals to pallet");
                    report.propagation_failures += 1;
                }
            }
        }

        debug!(
            pallet_count,
            total_volumes,
            total_notes,
            failures = report.propagation_failures,
            "Cargo recomputed"
        );
        Ok(report)
    }

    /// Note list first, then counters.
    pub async fn reconcile(&self, cargo_id: CargoId) -> Result<ConsolidationReport> {
        self.update_cargo_notes(cargo_id).await?;
        self.recompute_cargo(cargo_id).await
    }

    /// Bring a pallet's counters up to date: through its cargo when it has
    /// one, from its own notes otherwise.
    pub async fn consolidate_pallet(&self, pallet: &Pallet) -> Result<()> {
        if let Some(cargo_id) = pallet.cargo_id {
            self.reconcile(cargo_id).await?;
            return Ok(());
        }

        let notes = self.repository.pallet_notes(pallet.id).await?;
        let (volumes, count) = notes
            .map(|n| (n.total_volumes, n.distinct_notes()))
            .unwrap_or((0, 0));
        self.repository
            .patch_pallet(pallet.id, json!({ "volume_count": volumes, "note_count": count }))
            .await
    }

    async fn require_cargo(&self, cargo_id: CargoId) -> Result<()> {
        match self.repository.get_cargo(cargo_id).await? {
            Some(_) => Ok(()),
            None => Err(EngineError::CargoNotFound(cargo_id)),
        }
    }

    async fn merged(&self, cargo_id: CargoId) -> Result<(Vec<Pallet>, Vec<NoteSummary>)> {
        let pallets = self.repository.pallets_for_cargo(cargo_id).await?;

        let merged = {
            let mut records = Vec::with_capacity(pallets.len());
            for pallet in &pallets {
                if let Some(notes) = self.repository.pallet_notes(pallet.id).await? {
                    records.push((pallet, notes));
                }
            }
            merge_notes(records.iter().map(|(p, n)| (*p, n)))
        };
        Ok((pallets, merged))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use slotting_types::InvoiceNote;

    fn note(invoice: &str, volumes: u32) -> InvoiceNote {
        InvoiceNote {
            invoice_number: invoice.to_string(),
            barcode: format!("3524{invoice}"),
            supplier: "ACME".to_string(),
            destination_client: "RP".to_string(),
            destination: "RIBEIRAO PRETO - SP".to_string(),
            volumes,
        }
    }

    fn notes_for(pallet: &Pallet, notes: &[InvoiceNote]) -> PalletNotes {
        let mut record = PalletNotes::new(pallet.id);
        for n in notes {
            record.upsert(n, Utc::now());
        }
        record
    }

    #[test]
    fn test_merge_first_occurrence_wins() {
        let a = Pallet::new("PLT-000001", None);
        let b = Pallet::new("PLT-000002", None);
        let notes_a = notes_for(&a, &[note("1", 5), note("2", 3)]);
        let notes_b = notes_for(&b, &[note("2", 9), note("3", 1)]);

        let merged = merge_notes([(&a, &notes_a), (&b, &notes_b)]);

        let invoices: Vec<&str> = merged.iter().map(|n| n.invoice_number.as_str()).collect();
        assert_eq!(invoices, vec!["1", "2", "3"]);
        assert_eq!(merged[1].volumes, 3);
        assert_eq!(merged[1].pallet_code, "PLT-000001");
        assert_eq!(merged.iter().map(|n| n.volumes).sum::<u32>(), 9);
    }

    #[test]
    fn test_merge_empty() {
        let merged = merge_notes(std::iter::empty::<(&Pallet, &PalletNotes)>());
        assert!(merged.is_empty());
    }
}
