use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Normalized attribution waiting for the "add to list" flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributionPrefill {
    /// Canonical display name.
    pub name: String,
    /// Target phrase the attribution came with.
    pub target_phrase: String,
    /// Ticket that wrote the value.
    pub ticket_id: Uuid,
    /// Write time.
    pub written_at: DateTime<Utc>,
}

/// Single shared cell for the latest attribution. Last write wins.
#[derive(Debug, Clone, Default)]
pub struct AttributionSlot {
    cell: Arc<RwLock<Option<AttributionPrefill>>>,
}

impl AttributionSlot {
    /// Creates an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites the slot, returning the replaced value.
    pub fn publish(&self, prefill: AttributionPrefill) -> Option<AttributionPrefill> {
        self.cell.write().replace(prefill)
    }

    /// Current value without consuming it.
    #[must_use]
    pub fn peek(&self) -> Option<AttributionPrefill> {
        self.cell.read().clone()
    }

    /// Consumes the current value.
    pub fn take(&self) -> Option<AttributionPrefill> {
        self.cell.write().take()
    }
}
