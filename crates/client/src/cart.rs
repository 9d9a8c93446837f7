//! In-memory cart store.
//!
//! The cart is session-scoped: it lives for one browsing session, is never
//! persisted, and is not shared across contexts. All operations are pure
//! in-memory state transformations and cannot fail.
//!
//! Lines merge by [`ItemIdentity`] - the product name plus the chosen option
//! name. Two additions of the same product with different options stay
//! distinct lines; two additions with the same name and option merge by
//! accumulating quantity only. The first line's other fields (price
//! included) are kept as-is on merge.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use sijang_core::{CurrencyCode, Price};

use crate::events::{EventBus, StoreEvent};

/// The merge key for cart lines.
///
/// Deliberately a typed pair rather than a concatenated string, so a product
/// named `"A/B"` with option `"C"` can never collide with product `"A"`
/// option `"B/C"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemIdentity {
    /// Product display name.
    pub product: String,
    /// Chosen option name (e.g., "기본" for the default option).
    pub option: String,
}

impl ItemIdentity {
    /// Create an identity from product and option names.
    #[must_use]
    pub fn new(product: impl Into<String>, option: impl Into<String>) -> Self {
        Self {
            product: product.into(),
            option: option.into(),
        }
    }
}

impl std::fmt::Display for ItemIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.product, self.option)
    }
}

/// One line of the cart.
#[derive(Debug, Clone, PartialEq)]
pub struct CartLine {
    /// Merge key.
    pub identity: ItemIdentity,
    /// Always at least 1; an update that would go below 1 removes the line.
    pub quantity: u32,
    /// Price per unit. Not re-read when lines merge.
    pub unit_price: Price,
}

impl CartLine {
    /// Create a line with a quantity floor of 1.
    #[must_use]
    pub fn new(identity: ItemIdentity, quantity: u32, unit_price: Price) -> Self {
        Self {
            identity,
            quantity: quantity.max(1),
            unit_price,
        }
    }

    /// Line total: `quantity * unit_price`.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.unit_price.times(self.quantity)
    }
}

/// The authoritative list of items the user intends to purchase.
///
/// Cheaply cloneable; clones share the same line list.
#[derive(Clone)]
pub struct CartStore {
    lines: Arc<RwLock<Vec<CartLine>>>,
    events: EventBus,
}

impl CartStore {
    /// Create an empty cart publishing to `events`.
    #[must_use]
    pub fn new(events: EventBus) -> Self {
        Self {
            lines: Arc::new(RwLock::new(Vec::new())),
            events,
        }
    }

    /// Add a candidate line.
    ///
    /// If a line with the same identity exists, its quantity is incremented
    /// by the candidate's quantity and every other field of the existing
    /// line is kept. Otherwise the candidate is appended.
    pub fn add(&self, candidate: CartLine) {
        {
            let mut lines = self.lines.write().unwrap_or_else(|e| e.into_inner());
            match lines.iter_mut().find(|l| l.identity == candidate.identity) {
                Some(existing) => {
                    existing.quantity = existing.quantity.saturating_add(candidate.quantity);
                }
                None => lines.push(candidate),
            }
        }
        self.events.publish(StoreEvent::CartChanged);
    }

    /// Set (not add) a line's quantity.
    ///
    /// A quantity below 1 removes the line instead. No-op when no line
    /// matches the identity.
    pub fn set_quantity(&self, identity: &ItemIdentity, quantity: i64) {
        if quantity < 1 {
            self.remove(identity);
            return;
        }
        let changed = {
            let mut lines = self.lines.write().unwrap_or_else(|e| e.into_inner());
            match lines.iter_mut().find(|l| &l.identity == identity) {
                Some(line) => {
                    line.quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
                    true
                }
                None => false,
            }
        };
        if changed {
            self.events.publish(StoreEvent::CartChanged);
        }
    }

    /// Remove the matching line. No-op when absent.
    pub fn remove(&self, identity: &ItemIdentity) {
        let changed = {
            let mut lines = self.lines.write().unwrap_or_else(|e| e.into_inner());
            let before = lines.len();
            lines.retain(|l| &l.identity != identity);
            lines.len() != before
        };
        if changed {
            self.events.publish(StoreEvent::CartChanged);
        }
    }

    /// Drop every line.
    pub fn clear(&self) {
        let changed = {
            let mut lines = self.lines.write().unwrap_or_else(|e| e.into_inner());
            let had_lines = !lines.is_empty();
            lines.clear();
            had_lines
        };
        if changed {
            self.events.publish(StoreEvent::CartChanged);
        }
    }

    /// Total item count across all lines; drives the cart badge.
    #[must_use]
    pub fn total_quantity(&self) -> u64 {
        let lines = self.lines.read().unwrap_or_else(|e| e.into_inner());
        lines.iter().map(|l| u64::from(l.quantity)).sum()
    }

    /// Sum of `quantity * unit_price` over all lines; drives the checkout
    /// summary.
    #[must_use]
    pub fn total_price(&self) -> Price {
        let lines = self.lines.read().unwrap_or_else(|e| e.into_inner());
        lines
            .iter()
            .fold(Price::zero(CurrencyCode::KRW), |acc, l| {
                acc.plus(&l.line_total())
            })
    }

    /// Snapshot of the current lines, in insertion order.
    #[must_use]
    pub fn lines(&self) -> Vec<CartLine> {
        let lines = self.lines.read().unwrap_or_else(|e| e.into_inner());
        lines.clone()
    }

    /// Number of distinct lines.
    #[must_use]
    pub fn len(&self) -> usize {
        let lines = self.lines.read().unwrap_or_else(|e| e.into_inner());
        lines.len()
    }

    /// True when the cart holds no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
