//! Strongly-typed identifiers for slotting records
//!
//! All IDs are UUID-based newtypes. They serialize as the bare UUID string so
//! they can be used directly as filter values against the store.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, ":{}"), self.0)
            }
        }

        impl From<$name> for serde_json::Value {
            fn from(id: $name) -> Self {
                serde_json::Value::String(id.0.to_string())
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a cargo
    CargoId,
    "cargo"
);

uuid_id!(
    /// Unique identifier for a pallet
    PalletId,
    "pallet"
);

uuid_id!(
    /// Unique identifier for a storage position
    PositionId,
    "position"
);

uuid_id!(
    /// Unique identifier for a pallet-notes record
    PalletNotesId,
    "notes"
);

uuid_id!(
    /// Unique identifier for a movement log entry
    MovementId,
    "movement"
);
