//! Property tests: after any sequence of note additions and removals and one
//! recompute pass, cargo totals equal the distinct invoices across its pallets.

mod common;

use std::collections::{BTreeMap, BTreeSet};

use common::{note, service, store, RIBEIRAO};
use proptest::prelude::*;

const PALLETS: usize = 3;

#[derive(Debug, Clone)]
enum NoteOp {
    Add { pallet: usize, invoice: u32 },
    Remove { pallet: usize, invoice: u32 },
}

/// Volumes are a function of the invoice so that duplicates agree.
fn volumes(invoice: u32) -> u32 {
    invoice % 7 + 1
}

fn invoice_number(invoice: u32) -> String {
    format!("{:09}", 3_274_100 + invoice)
}

fn arb_op() -> impl Strategy<Value = NoteOp> {
    prop_oneof![
        3 => (0..PALLETS, 0u32..8).prop_map(|(pallet, invoice)| NoteOp::Add { pallet, invoice }),
        1 => (0..PALLETS, 0u32..8).prop_map(|(pallet, invoice)| NoteOp::Remove { pallet, invoice }),
    ]
}

fn arb_ops() -> impl Strategy<Value = Vec<NoteOp>> {
    prop::collection::vec(arb_op(), 0..24)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn cargo_totals_match_distinct_invoices(ops in arb_ops()) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let store = store();
            let service = service(&store);
            let cargo = service.create_or_reuse_cargo("RP", RIBEIRAO).await.unwrap();

            let mut pallets = Vec::new();
            for _ in 0..PALLETS {
                pallets.push(service.create_pallet(Some(cargo.id), None).await.unwrap());
            }

            let mut model: BTreeMap<usize, BTreeSet<u32>> = BTreeMap::new();
            for op in &ops {
                match *op {
                    NoteOp::Add { pallet, invoice } => {
                        let n = note(&invoice_number(invoice), volumes(invoice));
                        service.add_notes_to_pallet(pallets[pallet].id, &[n]).await.unwrap();
                        model.entry(pallet).or_default().insert(invoice);
                    }
                    NoteOp::Remove { pallet, invoice } => {
                        let removed = service
                            .remove_note_from_pallet(pallets[pallet].id, &invoice_number(invoice))
                            .await
                            .unwrap();
                        let expected = model.entry(pallet).or_default().remove(&invoice);
                        assert_eq!(removed, expected);
                    }
                }
            }

            let report = service.recompute_cargo(cargo.id).await.unwrap();

            let distinct: BTreeSet<u32> = model.values().flatten().copied().collect();
            let expected_volumes: u32 = distinct.iter().map(|i| volumes(*i)).sum();

            let cargo = service.get_cargo(cargo.id).await.unwrap().unwrap();
            assert_eq!(cargo.total_volumes, expected_volumes);
            assert_eq!(cargo.total_notes, distinct.len() as u32);
            assert_eq!(cargo.pallet_count, PALLETS as u32);
            assert_eq!(cargo.notes.len(), distinct.len());
            assert_eq!(report.total_volumes, expected_volumes);

            for pallet in &pallets {
                let pallet = service.get_pallet(pallet.id).await.unwrap().unwrap();
                assert_eq!(pallet.volume_count, expected_volumes);
                assert_eq!(pallet.note_count, distinct.len() as u32);
            }
        });
    }
}
