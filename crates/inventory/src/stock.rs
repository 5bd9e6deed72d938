use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use wms_core::{AggregateRoot, DomainError, DomainResult, LocationId, ProductId};

/// One product at one location; the unit of stock accounting.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StockKey {
    pub product_id: ProductId,
    pub location_id: LocationId,
}

impl StockKey {
    pub fn new(product_id: ProductId, location_id: LocationId) -> Self {
        Self {
            product_id,
            location_id,
        }
    }
}

impl core::fmt::Display for StockKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}@{}", self.product_id, self.location_id)
    }
}

/// On-hand change produced by a stock movement.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Movement {
    /// Signed change applied to on-hand.
    pub quantity: i64,
    pub before: i64,
    pub after: i64,
}

/// Stock balance for one [`StockKey`].
///
/// Invariant: `0 <= reserved <= on_hand`, hence `available >= 0`.
/// Rows are created lazily on first movement and never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockBalance {
    key: StockKey,
    on_hand: i64,
    reserved: i64,
    version: u64,
    updated_at: DateTime<Utc>,
}

impl StockBalance {
    /// Empty, not-yet-persisted balance.
    pub fn empty(key: StockKey, now: DateTime<Utc>) -> Self {
        Self {
            key,
            on_hand: 0,
            reserved: 0,
            version: 0,
            updated_at: now,
        }
    }

    /// Rebuild a balance from storage, rejecting rows that break the invariant.
    pub fn restore(
        key: StockKey,
        on_hand: i64,
        reserved: i64,
        version: u64,
        updated_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if reserved < 0 || on_hand < reserved {
            return Err(DomainError::invariant(format!(
                "stored balance for {key} is inconsistent (on_hand {on_hand}, reserved {reserved})"
            )));
        }
        Ok(Self {
            key,
            on_hand,
            reserved,
            version,
            updated_at,
        })
    }

    pub fn key(&self) -> StockKey {
        self.key
    }

    pub fn on_hand(&self) -> i64 {
        self.on_hand
    }

    pub fn reserved(&self) -> i64 {
        self.reserved
    }

    pub fn available(&self) -> i64 {
        self.on_hand - self.reserved
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Called by storage after a successful save.
    pub fn set_persisted_version(&mut self, version: u64) {
        self.version = version;
    }

    /// Add received stock to on-hand.
    pub fn increase(&mut self, quantity: i64, now: DateTime<Utc>) -> DomainResult<Movement> {
        ensure_positive(quantity, "increase")?;
        self.move_on_hand(quantity, now)
    }

    /// Allocate available stock to an order; on-hand is unchanged.
    pub fn reserve(&mut self, quantity: i64, now: DateTime<Utc>) -> DomainResult<()> {
        ensure_positive(quantity, "reserve")?;
        if self.available() < quantity {
            return Err(DomainError::InsufficientStock {
                requested: quantity,
                available: self.available(),
            });
        }
        self.reserved = checked(self.reserved.checked_add(quantity), "reserved")?;
        self.updated_at = now;
        Ok(())
    }

    /// Ship reserved stock: decrements both reserved and on-hand.
    pub fn commit(&mut self, quantity: i64, now: DateTime<Utc>) -> DomainResult<Movement> {
        ensure_positive(quantity, "commit")?;
        self.ensure_reserved(quantity)?;
        let movement = self.move_on_hand(-quantity, now)?;
        self.reserved -= quantity;
        Ok(movement)
    }

    /// Return reserved stock to available without touching on-hand.
    pub fn release(&mut self, quantity: i64, now: DateTime<Utc>) -> DomainResult<()> {
        ensure_positive(quantity, "release")?;
        self.ensure_reserved(quantity)?;
        self.reserved -= quantity;
        self.updated_at = now;
        Ok(())
    }

    /// Manual correction of on-hand. A decrease may only consume available stock.
    pub fn adjust(&mut self, delta: i64, now: DateTime<Utc>) -> DomainResult<Movement> {
        if delta == 0 {
            return Err(DomainError::insufficient_data("adjustment delta cannot be zero"));
        }
        if delta < 0 && delta.unsigned_abs() > self.available().unsigned_abs() {
            return Err(DomainError::InsufficientStock {
                requested: delta.saturating_neg(),
                available: self.available(),
            });
        }
        self.move_on_hand(delta, now)
    }

    fn ensure_reserved(&self, quantity: i64) -> DomainResult<()> {
        if self.reserved < quantity {
            return Err(DomainError::InsufficientReservation {
                requested: quantity,
                reserved: self.reserved,
            });
        }
        Ok(())
    }

    fn move_on_hand(&mut self, quantity: i64, now: DateTime<Utc>) -> DomainResult<Movement> {
        let before = self.on_hand;
        self.on_hand = checked(before.checked_add(quantity), "on-hand")?;
        self.updated_at = now;
        Ok(Movement {
            quantity,
            before,
            after: self.on_hand,
        })
    }
}

impl AggregateRoot for StockBalance {
    type Id = StockKey;

    fn id(&self) -> &Self::Id {
        &self.key
    }

    fn version(&self) -> u64 {
        self.version
    }
}

fn ensure_positive(quantity: i64, op: &str) -> DomainResult<()> {
    if quantity <= 0 {
        return Err(DomainError::insufficient_data(format!(
            "{op} quantity must be positive (got {quantity})"
        )));
    }
    Ok(())
}

fn checked(value: Option<i64>, what: &str) -> DomainResult<i64> {
    value.ok_or_else(|| DomainError::validation(format!("{what} quantity out of range")))
}
