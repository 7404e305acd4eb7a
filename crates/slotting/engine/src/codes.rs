//! Human-readable cargo and pallet codes.
//!
//! Codes come from a remote atomic sequence. When the sequence call fails,
//! the generator scans the most recent existing codes and continues from the
//! highest one; when that also fails it falls back to the low-order digits
//! of the current time. Neither fallback is safe under concurrent creation:
//! two callers may produce the same code.

use chrono::Utc;
use regex::Regex;
use serde_json::Value;
use slotting_store::Collection;
use tracing::{debug, warn};

use crate::config::CodeConfig;
use crate::error::{EngineError, Result};
use crate::repository::Repository;

/// Position of one physical pallet within a load split across several.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PalletSplit {
    /// 1-based index of this pallet
    pub sequence: u32,
    /// Number of pallets the load is split into
    pub total: u32,
}

impl PalletSplit {
    pub fn new(sequence: u32, total: u32) -> Result<Self> {
        if total == 0 || sequence == 0 || sequence > total {
            return Err(EngineError::Validation(format!(
                "invalid pallet split {sequence} of {total}"
            )));
        }
        Ok(Self { sequence, total })
    }

    fn suffix(&self) -> Option<String> {
        (self.total > 1).then(|| format!("_{}-of-{}", self.sequence, self.total))
    }
}

/// Produces cargo and pallet codes.
#[derive(Clone)]
pub struct CodeGenerator {
    repository: Repository,
    config: CodeConfig,
}

impl CodeGenerator {
    pub fn new(repository: Repository, config: CodeConfig) -> Self {
        Self { repository, config }
    }

    pub async fn next_cargo_code(&self) -> String {
        self.next_code(
            Collection::Cargos,
            &self.config.cargo_prefix,
            &self.config.cargo_sequence,
        )
        .await
    }

    /// Next pallet code, suffixed `_k-of-n` when the load is split.
    pub async fn next_pallet_code(&self, split: Option<PalletSplit>) -> String {
        let base = self
            .next_code(
                Collection::Pallets,
                &self.config.pallet_prefix,
                &self.config.pallet_sequence,
            )
            .await;

        match split.and_then(|s| s.suffix()) {
            Some(suffix) => format!("{base}{suffix}"),
            None => base,
        }
    }

    async fn next_code(&self, collection: Collection, prefix: &str, sequence: &str) -> String {
        match self.repository.gateway().call_sequence(sequence).await {
            Ok(value) => {
                if let Some(code) = self.from_sequence_value(prefix, &value) {
                    debug!(%code, sequence, "Code from sequence");
                    return code;
                }
                warn!(sequence, %value, "Sequence returned an unusable value, scanning existing codes");
            }
            Err(e) => {
                warn!(sequence, error = %e, "Sequence call failed, scanning existing codes");
            }
        }

        match self
            .repository
            .recent_codes(collection, self.config.fallback_scan)
            .await
        {
            Ok(codes) => {
                let next = highest_number(prefix, &codes).map_or(1, |n| n + 1);
                self.format(prefix, next)
            }
            Err(e) => {
                warn!(%collection, error = %e, "Code scan failed, deriving code from clock");
                self.from_clock(prefix)
            }
        }
    }

    fn from_sequence_value(&self, prefix: &str, value: &Value) -> Option<String> {
        match value {
            Value::Number(n) => n.as_u64().map(|n| self.format(prefix, n)),
            Value::String(s) if !s.trim().is_empty() => match s.trim().parse::<u64>() {
                Ok(n) => Some(self.format(prefix, n)),
                Err(_) => Some(s.trim().to_string()),
            },
            _ => None,
        }
    }

    fn from_clock(&self, prefix: &str) -> String {
        let width = self.config.width.clamp(1, 18) as u32;
        let modulus = 10u64.pow(width);
        let millis = Utc::now().timestamp_millis().unsigned_abs();
        self.format(prefix, millis % modulus)
    }

    fn format(&self, prefix: &str, number: u64) -> String {
        format!("{prefix}-{number:0width$}", width = self.config.width)
    }
}

/// Highest numeric component among codes of the form `PREFIX-<digits>`.
fn highest_number(prefix: &str, codes: &[String]) -> Option<u64> {
    let pattern = Regex::new(&format!(r"^{}-(\d+)", regex::escape(prefix))).ok()?;
    codes
        .iter()
        .filter_map(|code| pattern.captures(code))
        .filter_map(|caps| caps[1].parse::<u64>().ok())
        .max()
}
