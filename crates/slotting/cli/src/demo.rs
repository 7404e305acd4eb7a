//! In-memory end-to-end run.

use std::sync::Arc;

use anyhow::{bail, Context};
use serde_json::{json, Value};
use slotting_engine::{EngineConfig, FinalizeRequest, WarehouseService};
use slotting_store::InMemoryGateway;
use slotting_types::InvoiceNote;
use tracing::info;

const DESTINATION: &str = "RIBEIRAO PRETO - SP";

/// Rack layout seeded for the demo: aisle prefix, numbers, levels.
const LAYOUT: &[(&str, std::ops::RangeInclusive<u32>, std::ops::RangeInclusive<u8>)] = &[
    ("PD", 90..=110, 1..=3),
    ("PA", 1..=5, 1..=2),
];

pub async fn run(config: &EngineConfig, volumes: u32, slots: u32) -> anyhow::Result<Value> {
    let store = Arc::new(
        InMemoryGateway::new()
            .with_sequence(config.codes.cargo_sequence.clone(), 0)
            .with_sequence(config.codes.pallet_sequence.clone(), 0),
    );
    let service = WarehouseService::new(store, config);

    let mut seeded = 0;
    for (prefix, numbers, levels) in LAYOUT {
        for number in numbers.clone() {
            for level in levels.clone() {
                let code = format!("{prefix}-{number:03}-{level:02}");
                service.register_position(&code, 1000.0).await?;
                seeded += 1;
            }
        }
    }
    info!(positions = seeded, "Warehouse seeded");

    let cargo = service.create_or_reuse_cargo("RP", DESTINATION).await?;
    let pallet = service.create_pallet(Some(cargo.id), None).await?;

    let note = InvoiceNote {
        invoice_number: "003274130".to_string(),
        barcode: "35240003274130550010000001".to_string(),
        supplier: "DISTRIBUIDORA CENTRAL".to_string(),
        destination_client: "RP".to_string(),
        destination: DESTINATION.to_string(),
        volumes,
    };
    service.add_notes_to_pallet(pallet.id, &[note]).await?;

    service
        .finalize_pallet(
            pallet.id,
            FinalizeRequest {
                slot_count: slots.max(1),
                ..FinalizeRequest::default()
            },
        )
        .await?;

    let suggestions = service.suggest_positions(pallet.id, Some(5)).await?;
    let Some(best) = suggestions.first() else {
        bail!("no placement available for {}", pallet.code);
    };
    let ids: Vec<_> = best.positions.iter().map(|p| p.id).collect();
    let pallet = service.address_pallet(pallet.id, ids).await?;

    let cargo = service
        .get_cargo(cargo.id)
        .await?
        .context("cargo disappeared during the demo")?;
    let movements = service.movements_for_pallet(pallet.id).await?;

    Ok(json!({
        "cargo": cargo,
        "pallet": pallet,
        "suggestions": suggestions
            .iter()
            .map(|s| json!({ "positions": s.codes(), "score": s.score, "preferential": s.preferential }))
            .collect::<Vec<_>>(),
        "movements": movements,
    }))
}
