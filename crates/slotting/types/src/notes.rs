//! Invoice notes and the per-pallet record of attached notes.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{PalletId, PalletNotesId};

/// An invoice note as scanned by receiving. Read-only from the slotting side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceNote {
    pub invoice_number: String,
    /// Full scanned barcode.
    pub barcode: String,
    pub supplier: String,
    pub destination_client: String,
    pub destination: String,
    pub volumes: u32,
}

/// A note attached to a pallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteItem {
    pub invoice_number: String,
    pub barcode: String,
    pub supplier: String,
    pub destination_client: String,
    pub destination: String,
    pub volumes: u32,
    pub associated_at: DateTime<Utc>,
}

impl NoteItem {
    pub fn from_invoice(note: &InvoiceNote, associated_at: DateTime<Utc>) -> Self {
        Self {
            invoice_number: note.invoice_number.clone(),
            barcode: note.barcode.clone(),
            supplier: note.supplier.clone(),
            destination_client: note.destination_client.clone(),
            destination: note.destination.clone(),
            volumes: note.volumes,
            associated_at,
        }
    }
}

/// The notes attached to one pallet.
///
/// An invoice number appears at most once in `items`; re-attaching it
/// replaces the existing entry in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PalletNotes {
    pub id: PalletNotesId,
    pub pallet_id: PalletId,
    #[serde(default)]
    pub items: Vec<NoteItem>,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub destination_client: Option<String>,
    pub total_volumes: u32,
    pub updated_at: DateTime<Utc>,
}

impl PalletNotes {
    pub fn new(pallet_id: PalletId) -> Self {
        Self {
            id: PalletNotesId::generate(),
            pallet_id,
            items: Vec::new(),
            destination: None,
            destination_client: None,
            total_volumes: 0,
            updated_at: Utc::now(),
        }
    }

    /// Attach a note, replacing any entry with the same invoice number.
    ///
    /// Returns `true` when the invoice was not yet on the pallet.
    pub fn upsert(&mut self, note: &InvoiceNote, now: DateTime<Utc>) -> bool {
        let item = NoteItem::from_invoice(note, now);
        let inserted = match self
            .items
            .iter_mut()
            .find(|existing| existing.invoice_number == note.invoice_number)
        {
            Some(existing) => {
                *existing = item;
                false
            }
            None => {
                self.items.push(item);
                true
            }
        };

        if self.destination.is_none() && !note.destination.is_empty() {
            self.destination = Some(note.destination.clone());
        }
        if self.destination_client.is_none() && !note.destination_client.is_empty() {
            self.destination_client = Some(note.destination_client.clone());
        }
        self.touch(now);
        inserted
    }

    /// Detach a note by invoice number. Returns `true` if it was present.
    pub fn remove(&mut self, invoice_number: &str, now: DateTime<Utc>) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item.invoice_number != invoice_number);
        let removed = self.items.len() != before;
        if removed {
            if self.items.is_empty() {
                self.destination = None;
                self.destination_client = None;
            }
            self.touch(now);
        }
        removed
    }

    /// Count of distinct invoice numbers on this pallet.
    pub fn distinct_notes(&self) -> u32 {
        self.items
            .iter()
            .map(|item| item.invoice_number.as_str())
            .collect::<HashSet<_>>()
            .len() as u32
    }

    /// Sum of item volumes, or `None` when it does not fit in a `u32`.
    pub fn checked_volumes(&self) -> Option<u32> {
        self.items
            .iter()
            .try_fold(0u32, |total, item| total.checked_add(item.volumes))
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.total_volumes = self.checked_volumes().unwrap_or(u32::MAX);
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(invoice: &str, volumes: u32) -> InvoiceNote {
        InvoiceNote {
            invoice_number: invoice.to_string(),
            barcode: format!("3524{invoice}0001"),
            supplier: "ACME".to_string(),
            destination_client: "RP".to_string(),
            destination: "RIBEIRAO PRETO - SP".to_string(),
            volumes,
        }
    }

    #[test]
    fn test_upsert_same_invoice_replaces_entry() {
        let mut record = PalletNotes::new(PalletId::generate());
        let now = Utc::now();

        assert!(record.upsert(&note("003274130", 5), now));
        assert!(!record.upsert(&note("003274130", 7), now));

        assert_eq!(record.items.len(), 1);
        assert_eq!(record.items[0].volumes, 7);
        assert_eq!(record.total_volumes, 7);
        assert_eq!(record.distinct_notes(), 1);
    }

    #[test]
    fn test_upsert_caches_destination() {
        let mut record = PalletNotes::new(PalletId::generate());
        record.upsert(&note("1", 2), Utc::now());
        assert_eq!(record.destination.as_deref(), Some("RIBEIRAO PRETO - SP"));
        assert_eq!(record.destination_client.as_deref(), Some("RP"));
    }

    #[test]
    fn test_remove() {
        let mut record = PalletNotes::new(PalletId::generate());
        let now = Utc::now();
        record.upsert(&note("1", 2), now);
        record.upsert(&note("2", 3), now);

        assert!(record.remove("1", now));
        assert!(!record.remove("1", now));
        assert_eq!(record.total_volumes, 3);

        assert!(record.remove("2", now));
        assert_eq!(record.total_volumes, 0);
        assert!(record.destination.is_none());
    }

    #[test]
    fn test_volume_overflow_is_detected() {
        let mut record = PalletNotes::new(PalletId::generate());
        let now = Utc::now();
        record.upsert(&note("1", u32::MAX), now);
        assert_eq!(record.checked_volumes(), Some(u32::MAX));

        record.upsert(&note("2", 1), now);
        assert_eq!(record.checked_volumes(), None);
        assert_eq!(record.total_volumes, u32::MAX);
    }
}
