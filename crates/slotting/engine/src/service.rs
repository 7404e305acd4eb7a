//! Warehouse operations exposed to the receiving, packing and inventory
//! modules.
//!
//! Every store call goes through one [`ResilientGateway`] whose breaker may be
//! shared with other services. Occupancy is check-then-act: a position is
//! re-read and verified available right before it is written occupied, but
//! two callers racing for the same position are not serialized. The last
//! write wins.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use slotting_resilience::{CircuitBreaker, ResilientGateway};
use slotting_store::Gateway;
use slotting_types::{
    Cargo, CargoId, CargoStatus, InvoiceNote, Movement, MovementId, MovementKind, Pallet, PalletId,
    PalletNotes, PalletStatus, Position, PositionId, PositionStatus,
};
use tracing::{debug, info, instrument, warn};

use crate::codes::{CodeGenerator, PalletSplit};
use crate::config::EngineConfig;
use crate::consolidation::{ConsolidationEngine, ConsolidationReport};
use crate::error::{EngineError, Result};
use crate::repository::Repository;
use crate::slotting::{PlacementSuggestion, SlottingEngine};
use crate::zone::ZoneResolver;

static LAST_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Microseconds since the epoch, bumped so that values handed out by this
/// process are strictly increasing.
fn next_sequence() -> u64 {
    let now = Utc::now().timestamp_micros().max(0) as u64;
    let previous = LAST_SEQUENCE
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(now.max(last + 1))
        })
        .unwrap_or_else(|last| last);
    now.max(previous + 1)
}

/// Where to address a pallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Addressing {
    Single(PositionId),
    /// Contiguous positions for a multi-slot pallet
    Multiple(Vec<PositionId>),
}

impl Addressing {
    fn into_ids(self) -> Vec<PositionId> {
        match self {
            Addressing::Single(id) => vec![id],
            Addressing::Multiple(ids) => ids,
        }
    }
}

impl From<PositionId> for Addressing {
    fn from(id: PositionId) -> Self {
        Addressing::Single(id)
    }
}

impl From<Vec<PositionId>> for Addressing {
    fn from(ids: Vec<PositionId>) -> Self {
        Addressing::Multiple(ids)
    }
}

/// Pallet finalization details.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FinalizeRequest {
    /// Positions the pallet will occupy
    pub slot_count: u32,
    pub cage_count: Option<u32>,
    pub box_count: Option<u32>,
    pub estimated_weight_kg: Option<f64>,
}

/// Everything known about the pallet holding an invoice.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceLookup {
    pub pallet: Pallet,
    pub position: Option<Position>,
    pub cargo: Option<Cargo>,
    pub notes: PalletNotes,
}

/// Facade over code generation, slotting and consolidation.
#[derive(Clone)]
pub struct WarehouseService {
    repository: Repository,
    codes: CodeGenerator,
    slotting: SlottingEngine,
    consolidation: ConsolidationEngine,
    actor: String,
}

impl WarehouseService {
    /// Build a service with its own circuit breaker.
    pub fn new(store: Arc<dyn Gateway>, config: &EngineConfig) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(
            "store",
            config.resilience.breaker_config(),
        ));
        Self::with_breaker(store, breaker, config)
    }

    /// Build a service around a breaker shared with other callers.
    pub fn with_breaker(
        store: Arc<dyn Gateway>,
        breaker: Arc<CircuitBreaker>,
        config: &EngineConfig,
    ) -> Self {
        let mut gateway = ResilientGateway::new(store, breaker, config.resilience.retry_policy());
        if let Some(limit) = config.resilience.call_timeout() {
            gateway = gateway.with_call_timeout(limit);
        }

        let repository = Repository::new(gateway);
        let resolver = config
            .zones
            .clone()
            .map(ZoneResolver::new)
            .unwrap_or_default();

        Self {
            codes: CodeGenerator::new(repository.clone(), config.codes.clone()),
            slotting: SlottingEngine::new(repository.clone(), resolver, config.slotting.clone()),
            consolidation: ConsolidationEngine::new(repository.clone()),
            repository,
            actor: config.actor.clone(),
        }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        self.repository.gateway().breaker()
    }

    pub fn resolver(&self) -> &ZoneResolver {
        self.slotting.resolver()
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    // Cargo operations

    /// Reuse the open cargo for a client/destination pair that carries no
    /// batch tag, or create one.
    pub async fn create_or_reuse_cargo(&self, destination_client: &str, destination: &str) -> Result<Cargo> {
        self.create_or_reuse_cargo_in_batch(destination_client, destination, None)
            .await
    }

    /// Reuse the open cargo for a client/destination pair within a batch, or create one.
    #[instrument(skip(self))]
    pub async fn create_or_reuse_cargo_in_batch(
        &self,
        destination_client: &str,
        destination: &str,
        batch: Option<&str>,
    ) -> Result<Cargo> {
        let client = destination_client.trim();
        let destination = destination.trim();
        if client.is_empty() || destination.is_empty() {
            return Err(EngineError::Validation(
                "a cargo needs a destination client and a destination".to_string(),
            ));
        }

        if let Some(existing) = self
            .repository
            .find_open_cargo(client, destination, batch)
            .await?
        {
            debug!(cargo_id = %existing.id, code = %existing.code, "Reusing open cargo");
            return Ok(existing);
        }

        let code = self.codes.next_cargo_code().await;
        let cargo = Cargo::new(code, client, destination, batch.map(str::to_string));
        let cargo = self.repository.save_cargo(&cargo).await?;

        info!(cargo_id = %cargo.id, code = %cargo.code, "Cargo created");
        Ok(cargo)
    }

    pub async fn get_cargo(&self, cargo_id: CargoId) -> Result<Option<Cargo>> {
        self.repository.get_cargo(cargo_id).await
    }

    /// Rebuild a cargo's note list and counters.
    pub async fn recompute_cargo(&self, cargo_id: CargoId) -> Result<ConsolidationReport> {
        self.consolidation.reconcile(cargo_id).await
    }

    // Pallet operations

    /// Create an empty pallet, optionally linked to a cargo and tagged as
    /// one of several pallets a load is split into.
    #[instrument(skip(self))]
    pub async fn create_pallet(
        &self,
        cargo_id: Option<CargoId>,
        split: Option<PalletSplit>,
    ) -> Result<Pallet> {
        if let Some(cargo_id) = cargo_id {
            let cargo = self.require_cargo(cargo_id).await?;
            if cargo.status == CargoStatus::Released {
                return Err(EngineError::Validation(format!(
                    "cargo {} is already released",
                    cargo.code
                )));
            }
        }

        let code = self.codes.next_pallet_code(split).await;
        let pallet = self.repository.save_pallet(&Pallet::new(code, cargo_id)).await?;
        info!(pallet_id = %pallet.id, code = %pallet.code, "Pallet created");

        if let Some(cargo_id) = cargo_id {
            self.consolidate(&pallet).await;
            self.update_cargo_lifecycle(cargo_id).await;
        }
        Ok(pallet)
    }

    pub async fn get_pallet(&self, pallet_id: PalletId) -> Result<Option<Pallet>> {
        self.repository.get_pallet(pallet_id).await
    }

    pub async fn pallet_notes(&self, pallet_id: PalletId) -> Result<Option<PalletNotes>> {
        self.repository.pallet_notes(pallet_id).await
    }

    /// Attach invoice notes to a pallet. Re-adding an invoice number replaces
    /// its entry.
    #[instrument(skip(self, notes), fields(count = notes.len()))]
    pub async fn add_notes_to_pallet(
        &self,
        pallet_id: PalletId,
        notes: &[InvoiceNote],
    ) -> Result<PalletNotes> {
        if let Some(note) = notes.iter().find(|n| n.invoice_number.trim().is_empty()) {
            return Err(EngineError::Validation(format!(
                "note with barcode {:?} has no invoice number",
                note.barcode
            )));
        }

        let pallet = self.require_pallet(pallet_id).await?;
        if pallet.status == PalletStatus::Released {
            return Err(EngineError::Validation(format!(
                "pallet {} is released",
                pallet.code
            )));
        }

        let mut record = self
            .repository
            .pallet_notes(pallet_id)
            .await?
            .unwrap_or_else(|| PalletNotes::new(pallet_id));

        let now = Utc::now();
        let mut inserted = 0;
        for note in notes {
            if record.upsert(note, now) {
                inserted += 1;
            }
        }
        if record.checked_volumes().is_none() {
            return Err(EngineError::Validation(format!(
                "volume total of pallet {} overflows",
                pallet.code
            )));
        }
        let record = self.repository.save_pallet_notes(&record).await?;

        debug!(inserted, total = record.items.len(), "Notes attached");
        self.consolidate(&pallet).await;
        Ok(record)
    }

    /// Detach an invoice from a pallet. Returns false when it was not attached.
    #[instrument(skip(self))]
    pub async fn remove_note_from_pallet(&self, pallet_id: PalletId, invoice_number: &str) -> Result<bool> {
        let pallet = self.require_pallet(pallet_id).await?;
        let Some(mut record) = self.repository.pallet_notes(pallet_id).await? else {
            return Ok(false);
        };

        if !record.remove(invoice_number, Utc::now()) {
            return Ok(false);
        }
        self.repository.save_pallet_notes(&record).await?;

        debug!(remaining = record.items.len(), "Note detached");
        self.consolidate(&pallet).await;
        Ok(true)
    }

    /// Record slot, cage and box counts and mark the pallet finalized.
    #[instrument(skip(self))]
    pub async fn finalize_pallet(&self, pallet_id: PalletId, request: FinalizeRequest) -> Result<Pallet> {
        if request.slot_count == 0 {
            return Err(EngineError::Validation(
                "a pallet needs at least one slot".to_string(),
            ));
        }
        if let Some(weight) = request.estimated_weight_kg {
            if !weight.is_finite() || weight < 0.0 {
                return Err(EngineError::Validation(format!(
                    "invalid estimated weight {weight}"
                )));
            }
        }

        let pallet = self.require_pallet(pallet_id).await?;
        match pallet.status {
            PalletStatus::Released => {
                return Err(EngineError::Validation(format!(
                    "pallet {} is released",
                    pallet.code
                )))
            }
            _ if pallet.is_addressed() && pallet.position_ids.len() as u32 != request.slot_count => {
                return Err(EngineError::PositionCountMismatch {
                    pallet_id,
                    required: request.slot_count,
                    provided: pallet.position_ids.len() as u32,
                })
            }
            _ => {}
        }

        let status = match pallet.status {
            PalletStatus::Assembling => PalletStatus::Finalized,
            other => other,
        };
        self.repository
            .patch_pallet(
                pallet_id,
                json!({
                    "required_positions": request.slot_count,
                    "cage_count": request.cage_count.or(pallet.cage_count),
                    "box_count": request.box_count.or(pallet.box_count),
                    "estimated_weight_kg": request.estimated_weight_kg.or(pallet.estimated_weight_kg),
                    "status": status,
                    "finalized_at": Utc::now(),
                }),
            )
            .await?;

        info!(code = %pallet.code, slots = request.slot_count, "Pallet finalized");
        self.consolidate(&pallet).await;
        self.require_pallet(pallet_id).await
    }

    // Placement

    /// Ranked placements for a pallet; empty for an unknown pallet.
    #[instrument(skip(self))]
    pub async fn suggest_positions(
        &self,
        pallet_id: PalletId,
        limit: Option<usize>,
    ) -> Result<Vec<PlacementSuggestion>> {
        match self.repository.get_pallet(pallet_id).await? {
            Some(pallet) => self.slotting.suggest(&pallet, limit).await,
            None => Ok(Vec::new()),
        }
    }

    /// Store a pallet in one position, or in contiguous positions for a
    /// multi-slot pallet.
    #[instrument(skip(self, target))]
    pub async fn address_pallet(
        &self,
        pallet_id: PalletId,
        target: impl Into<Addressing> + Send,
    ) -> Result<Pallet> {
        let mut pallet = self.require_pallet(pallet_id).await?;
        if pallet.status == PalletStatus::Released {
            return Err(EngineError::Validation(format!(
                "pallet {} is released",
                pallet.code
            )));
        }
        if pallet.is_addressed() {
            return Err(EngineError::AlreadyAddressed(pallet_id));
        }

        let ids = target.into().into_ids();
        let required = pallet.slots_required();
        if ids.iter().collect::<HashSet<_>>().len() != ids.len() {
            return Err(EngineError::Validation(
                "the same position was given twice".to_string(),
            ));
        }
        if ids.len() as u32 != required {
            return Err(EngineError::PositionCountMismatch {
                pallet_id,
                required,
                provided: ids.len() as u32,
            });
        }

        let mut positions = Vec::with_capacity(ids.len());
        for id in &ids {
            let position = self.require_position(*id).await?;
            ensure_available(&position)?;
            positions.push(position);
        }
        ensure_contiguous(&positions)?;

        let now = Utc::now();
        let mut occupied = Vec::with_capacity(ids.len());
        for id in &ids {
            if let Err(e) = self.occupy(*id, pallet_id, now).await {
                self.rollback(&occupied, now).await;
                return Err(e);
            }
            occupied.push(*id);
        }

        let patch = json!({
            "position_id": ids[0],
            "position_ids": ids,
            "status": PalletStatus::Stored,
            "stored_at": now,
        });
        if let Err(e) = self.repository.patch_pallet(pallet_id, patch).await {
            self.rollback(&occupied, now).await;
            return Err(e);
        }

        pallet.position_id = Some(ids[0]);
        pallet.position_ids = ids.clone();
        pallet.status = PalletStatus::Stored;
        pallet.stored_at = Some(now);

        for id in &ids {
            self.record_movement(pallet_id, MovementKind::Addressing, None, Some(*id), now)
                .await;
        }

        let codes: Vec<&str> = positions.iter().map(|p| p.code.as_str()).collect();
        info!(code = %pallet.code, positions = ?codes, "Pallet addressed");

        self.consolidate(&pallet).await;
        if let Some(cargo_id) = pallet.cargo_id {
            self.update_cargo_lifecycle(cargo_id).await;
        }
        Ok(pallet)
    }

    /// Move a single-slot pallet to another available position.
    #[instrument(skip(self))]
    pub async fn transfer_pallet(&self, pallet_id: PalletId, new_position_id: PositionId) -> Result<Pallet> {
        let mut pallet = self.require_pallet(pallet_id).await?;
        if pallet.status == PalletStatus::Released || !pallet.is_addressed() {
            return Err(EngineError::Validation(format!(
                "pallet {} is not stored",
                pallet.code
            )));
        }
        if pallet.position_ids.len() > 1 {
            return Err(EngineError::Validation(format!(
                "pallet {} spans {} positions; release and address it again",
                pallet.code,
                pallet.position_ids.len()
            )));
        }

        let current = pallet.position_ids.first().copied().or(pallet.position_id);
        if current == Some(new_position_id) {
            return Err(EngineError::Validation(format!(
                "pallet {} is already in that position",
                pallet.code
            )));
        }

        let target = self.require_position(new_position_id).await?;
        ensure_available(&target)?;

        let now = Utc::now();
        self.occupy(new_position_id, pallet_id, now).await?;

        let patch = json!({ "position_id": new_position_id, "position_ids": [new_position_id] });
        if let Err(e) = self.repository.patch_pallet(pallet_id, patch).await {
            self.rollback(&[new_position_id], now).await;
            return Err(e);
        }

        if let Some(old) = current {
            if let Err(e) = self.vacate(old, pallet_id, now).await {
                warn!(position_id = %old, error = %e, "Failed to free previous position");
            }
        }
        self.record_movement(pallet_id, MovementKind::Transfer, current, Some(new_position_id), now)
            .await;

        info!(code = %pallet.code, to = %target.code, "Pallet transferred");
        pallet.position_id = Some(new_position_id);
        pallet.position_ids = vec![new_position_id];
        Ok(pallet)
    }

    /// Free every position a pallet occupies and mark it released.
    #[instrument(skip(self))]
    pub async fn release_pallet(&self, pallet_id: PalletId) -> Result<Pallet> {
        let mut pallet = self.require_pallet(pallet_id).await?;
        if pallet.status == PalletStatus::Released {
            return Err(EngineError::Validation(format!(
                "pallet {} is already released",
                pallet.code
            )));
        }
        if !pallet.is_addressed() {
            return Err(EngineError::Validation(format!(
                "pallet {} is not stored",
                pallet.code
            )));
        }

        let mut held = pallet.position_ids.clone();
        if held.is_empty() {
            held.extend(pallet.position_id);
        }

        let now = Utc::now();
        let mut freed = Vec::with_capacity(held.len());
        for id in &held {
            match self.vacate(*id, pallet_id, now).await {
                Ok(true) => freed.push(*id),
                Ok(false) => {}
                Err(e) => {
                    self.reoccupy(&freed, pallet_id, pallet.stored_at.unwrap_or(now)).await;
                    return Err(e);
                }
            }
        }

        let patch = json!({
            "status": PalletStatus::Released,
            "released_at": now,
            "position_id": Value::Null,
            "position_ids": [],
        });
        if let Err(e) = self.repository.patch_pallet(pallet_id, patch).await {
            self.reoccupy(&freed, pallet_id, pallet.stored_at.unwrap_or(now)).await;
            return Err(e);
        }

        for id in &held {
            self.record_movement(pallet_id, MovementKind::Release, Some(*id), None, now)
                .await;
        }

        info!(code = %pallet.code, "Pallet released");
        pallet.status = PalletStatus::Released;
        pallet.released_at = Some(now);
        pallet.position_id = None;
        pallet.position_ids.clear();

        if let Some(cargo_id) = pallet.cargo_id {
            self.update_cargo_lifecycle(cargo_id).await;
        }
        Ok(pallet)
    }

    /// Movement log of a pallet, oldest first.
    pub async fn movements_for_pallet(&self, pallet_id: PalletId) -> Result<Vec<Movement>> {
        self.repository.movements_for_pallet(pallet_id).await
    }

    /// Pallet, position, cargo and notes for the pallet holding an invoice.
    #[instrument(skip(self))]
    pub async fn find_by_invoice_number(&self, invoice_number: &str) -> Result<Option<InvoiceLookup>> {
        let Some(notes) = self.repository.find_notes_by_invoice(invoice_number).await? else {
            return Ok(None);
        };
        let Some(pallet) = self.repository.get_pallet(notes.pallet_id).await? else {
            warn!(pallet_id = %notes.pallet_id, "Notes reference a missing pallet");
            return Ok(None);
        };

        let position = match pallet.position_ids.first().copied().or(pallet.position_id) {
            Some(id) => self.repository.get_position(id).await?,
            None => None,
        };
        let cargo = match pallet.cargo_id {
            Some(id) => self.repository.get_cargo(id).await?,
            None => None,
        };

        Ok(Some(InvoiceLookup {
            pallet,
            position,
            cargo,
            notes,
        }))
    }

    // Position operations

    /// Register a new available position. Its preferred destination is
    /// taken from the zone table.
    #[instrument(skip(self))]
    pub async fn register_position(&self, code: &str, capacity_kg: f64) -> Result<Position> {
        if !capacity_kg.is_finite() || capacity_kg <= 0.0 {
            return Err(EngineError::Validation(format!(
                "invalid capacity {capacity_kg} for {code}"
            )));
        }

        let mut position = Position::from_code(code, capacity_kg)?;
        if self
            .repository
            .find_position_by_code(&position.code)
            .await?
            .is_some()
        {
            return Err(EngineError::Validation(format!(
                "position {} already exists",
                position.code
            )));
        }

        position.preferred_destination = self
            .resolver()
            .preferred_destination(&position.code)
            .map(str::to_string);
        self.repository.save_position(&position).await
    }

    pub async fn get_position(&self, position_id: PositionId) -> Result<Option<Position>> {
        self.repository.get_position(position_id).await
    }

    /// Take an empty position out of service.
    #[instrument(skip(self))]
    pub async fn block_position(&self, position_id: PositionId, reason: Option<&str>) -> Result<Position> {
        let position = self.require_position(position_id).await?;
        if position.status == PositionStatus::Occupied {
            return Err(EngineError::PositionUnavailable {
                code: position.code,
                status: position.status,
            });
        }

        self.repository
            .patch_position(
                position_id,
                json!({
                    "status": PositionStatus::Blocked,
                    "notes": reason.map(str::to_string).or(position.notes),
                }),
            )
            .await?;
        info!(code = %position.code, "Position blocked");
        self.require_position(position_id).await
    }

    /// Return a blocked position to service. Other positions are left as they are.
    #[instrument(skip(self))]
    pub async fn unblock_position(&self, position_id: PositionId) -> Result<Position> {
        let position = self.require_position(position_id).await?;
        if position.status != PositionStatus::Blocked {
            return Ok(position);
        }

        self.repository
            .patch_position(position_id, json!({ "status": PositionStatus::Available }))
            .await?;
        info!(code = %position.code, "Position unblocked");
        self.require_position(position_id).await
    }

    // Helpers

    async fn require_cargo(&self, cargo_id: CargoId) -> Result<Cargo> {
        self.repository
            .get_cargo(cargo_id)
            .await?
            .ok_or(EngineError::CargoNotFound(cargo_id))
    }

    async fn require_pallet(&self, pallet_id: PalletId) -> Result<Pallet> {
        self.repository
            .get_pallet(pallet_id)
            .await?
            .ok_or(EngineError::PalletNotFound(pallet_id))
    }

    async fn require_position(&self, position_id: PositionId) -> Result<Position> {
        self.repository
            .get_position(position_id)
            .await?
            .ok_or(EngineError::PositionNotFound(position_id))
    }

    /// Re-read the position and mark it occupied if still available.
    async fn occupy(&self, position_id: PositionId, pallet_id: PalletId, now: DateTime<Utc>) -> Result<()> {
        let position = self.require_position(position_id).await?;
        ensure_available(&position)?;

        self.repository
            .patch_position(
                position_id,
                json!({
                    "status": PositionStatus::Occupied,
                    "pallet_id": pallet_id,
                    "occupied_at": now,
                }),
            )
            .await
    }

    /// Free a position held by the pallet. A position now held by another
    /// pallet is left alone. Returns whether the position was freed.
    async fn vacate(&self, position_id: PositionId, pallet_id: PalletId, now: DateTime<Utc>) -> Result<bool> {
        let Some(position) = self.repository.get_position(position_id).await? else {
            warn!(%position_id, "Position vanished while freeing it");
            return Ok(false);
        };
        if position.pallet_id != Some(pallet_id) {
            warn!(code = %position.code, "Position is held by another pallet, leaving it");
            return Ok(false);
        }

        self.repository
            .patch_position(
                position_id,
                json!({
                    "status": PositionStatus::Available,
                    "pallet_id": Value::Null,
                    "released_at": now,
                }),
            )
            .await?;
        Ok(true)
    }

    /// Give freed positions back to the pallet after a failed release.
    async fn reoccupy(&self, positions: &[PositionId], pallet_id: PalletId, since: DateTime<Utc>) {
        for id in positions {
            let patch = json!({
                "status": PositionStatus::Occupied,
                "pallet_id": pallet_id,
                "occupied_at": since,
            });
            if let Err(e) = self.repository.patch_position(*id, patch).await {
                warn!(position_id = %id, error = %e, "Failed to restore position after failed release");
            }
        }
    }

    async fn rollback(&self, positions: &[PositionId], now: DateTime<Utc>) {
        for id in positions {
            let patch = json!({
                "status": PositionStatus::Available,
                "pallet_id": Value::Null,
                "released_at": now,
            });
            if let Err(e) = self.repository.patch_position(*id, patch).await {
                warn!(position_id = %id, error = %e, "Failed to roll back position");
            }
        }
    }

    async fn record_movement(
        &self,
        pallet_id: PalletId,
        kind: MovementKind,
        from: Option<PositionId>,
        to: Option<PositionId>,
        at: DateTime<Utc>,
    ) {
        let movement = Movement {
            id: MovementId::generate(),
            pallet_id,
            kind,
            from_position_id: from,
            to_position_id: to,
            actor: self.actor.clone(),
            sequence: next_sequence(),
            created_at: at,
        };
        if let Err(e) = self.repository.append_movement(&movement).await {
            warn!(%pallet_id, ?kind, error = %e, "Failed to record movement");
        }
    }

    /// Failures leave totals stale until the next pass.
    async fn consolidate(&self, pallet: &Pallet) {
        if let Err(e) = self.consolidation.consolidate_pallet(pallet).await {
            warn!(pallet_id = %pallet.id, error = %e, "Consolidation failed, totals are stale");
        }
    }

    /// Open until every pallet is stored, stored until every pallet is released.
    async fn update_cargo_lifecycle(&self, cargo_id: CargoId) {
        if let Err(e) = self.sync_cargo_status(cargo_id).await {
            warn!(%cargo_id, error = %e, "Failed to update cargo status");
        }
    }

    async fn sync_cargo_status(&self, cargo_id: CargoId) -> Result<()> {
        let Some(cargo) = self.repository.get_cargo(cargo_id).await? else {
            return Ok(());
        };
        let pallets = self.repository.pallets_for_cargo(cargo_id).await?;
        if pallets.is_empty() {
            return Ok(());
        }

        let target = if pallets.iter().all(|p| p.status == PalletStatus::Released) {
            CargoStatus::Released
        } else if pallets
            .iter()
            .all(|p| matches!(p.status, PalletStatus::Stored | PalletStatus::Released))
        {
            CargoStatus::Stored
        } else {
            CargoStatus::Open
        };
        if target == cargo.status {
            return Ok(());
        }

        let now = Utc::now();
        let patch = match target {
            CargoStatus::Released => json!({ "status": target, "released_at": now }),
            CargoStatus::Stored => json!({ "status": target, "stored_at": now }),
            CargoStatus::Open => json!({ "status": target }),
        };
        self.repository.patch_cargo(cargo_id, patch).await?;
        info!(code = %cargo.code, from = %cargo.status, to = %target, "Cargo status changed");
        Ok(())
    }
}

fn ensure_available(position: &Position) -> Result<()> {
    if position.is_available() {
        Ok(())
    } else {
        Err(EngineError::PositionUnavailable {
            code: position.code.clone(),
            status: position.status,
        })
    }
}

/// Positions must share an aisle and level and have consecutive numbers.
fn ensure_contiguous(positions: &[Position]) -> Result<()> {
    let Some(first) = positions.first() else {
        return Ok(());
    };
    if positions
        .iter()
        .any(|p| p.aisle != first.aisle || p.level != first.level)
    {
        return Err(EngineError::Validation(
            "positions must share one aisle and level".to_string(),
        ));
    }

    let mut numbers: Vec<u32> = positions.iter().map(|p| p.number).collect();
    numbers.sort_unstable();
    if numbers.windows(2).any(|pair| pair[1] != pair[0] + 1) {
        return Err(EngineError::Validation(
            "positions must be consecutive".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn positions(codes: &[&str]) -> Vec<Position> {
        codes
            .iter()
            .map(|c| Position::from_code(c, 1000.0).unwrap())
            .collect()
    }

    #[test]
    fn test_contiguity() {
        assert!(ensure_contiguous(&positions(&["PD-101-02", "PD-100-02", "PD-102-02"])).is_ok());
        assert!(ensure_contiguous(&positions(&["PD-100-02", "PD-102-02"])).is_err());
        assert!(ensure_contiguous(&positions(&["PD-100-02", "PD-101-03"])).is_err());
        assert!(ensure_contiguous(&positions(&["PD-100-02", "PA-101-02"])).is_err());
        assert!(ensure_contiguous(&positions(&["PD-100-02"])).is_ok());
    }

    #[test]
    fn test_sequence_strictly_increases() {
        let mut last = next_sequence();
        for _ in 0..1000 {
            let next = next_sequence();
            assert!(next > last);
            last = next;
        }
    }

    #[test]
    fn test_addressing_conversions() {
        let id = PositionId::generate();
        assert_eq!(Addressing::from(id).into_ids(), vec![id]);
        assert_eq!(Addressing::from(vec![id, id]).into_ids().len(), 2);
    }
}
