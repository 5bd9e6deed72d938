use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use wms_core::{DomainError, DomainResult, EntryId};

use crate::stock::{Movement, StockKey};

/// Kind of stock movement recorded in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MovementKind {
    Inbound,
    Outbound,
    Adjustment,
}

impl MovementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MovementKind::Inbound => "Inbound",
            MovementKind::Outbound => "Outbound",
            MovementKind::Adjustment => "Adjustment",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "Inbound" => Ok(MovementKind::Inbound),
            "Outbound" => Ok(MovementKind::Outbound),
            "Adjustment" => Ok(MovementKind::Adjustment),
            other => Err(DomainError::validation(format!("unknown movement kind '{other}'"))),
        }
    }
}

/// Document that caused a movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    /// Inbound/outbound id; `None` for manual adjustments.
    pub id: Option<Uuid>,
    /// Document number, or the reason text of an adjustment.
    pub number: String,
}

impl DocumentRef {
    pub fn document(id: impl Into<Uuid>, number: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            number: number.into(),
        }
    }

    pub fn adjustment(reason: impl Into<String>) -> Self {
        Self {
            id: None,
            number: reason.into(),
        }
    }
}

/// Immutable record of one on-hand movement.
///
/// Invariant: `balance_after == balance_before + quantity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub kind: MovementKind,
    pub key: StockKey,
    /// Signed on-hand change (negative for shipments and decreases).
    pub quantity: i64,
    pub balance_before: i64,
    pub balance_after: i64,
    pub reference: DocumentRef,
    pub created_at: DateTime<Utc>,
    pub actor: String,
}

impl LedgerEntry {
    pub fn record(
        kind: MovementKind,
        key: StockKey,
        movement: Movement,
        reference: DocumentRef,
        actor: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EntryId::new(),
            kind,
            key,
            quantity: movement.quantity,
            balance_before: movement.before,
            balance_after: movement.after,
            reference,
            created_at,
            actor: actor.into(),
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.balance_before.checked_add(self.quantity) == Some(self.balance_after)
    }
}

/// Check a time-ordered history for one stock key.
///
/// Each entry must be arithmetically consistent and start where the previous
/// one ended.
pub fn verify_chain(entries: &[LedgerEntry]) -> DomainResult<()> {
    for (idx, entry) in entries.iter().enumerate() {
        if !entry.is_consistent() {
            return Err(DomainError::invariant(format!(
                "ledger entry {idx} is inconsistent ({} + {} != {})",
                entry.balance_before, entry.quantity, entry.balance_after
            )));
        }
        if let Some(prev) = idx.checked_sub(1).map(|i| &entries[i]) {
            if prev.key != entry.key {
                return Err(DomainError::invariant(format!(
                    "ledger entry {idx} belongs to a different stock key"
                )));
            }
            if prev.balance_after != entry.balance_before {
                return Err(DomainError::invariant(format!(
                    "ledger chain broken at entry {idx} (previous after {}, before {})",
                    prev.balance_after, entry.balance_before
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stock::StockBalance;
    use proptest::prelude::*;
    use wms_core::{LocationId, ProductId};

    fn test_key() -> StockKey {
        StockKey::new(ProductId::new(), LocationId::new())
    }

    #[test]
    fn shipment_entry_records_negative_quantity() {
        let key = test_key();
        let mut b = StockBalance::empty(key, Utc::now());
        b.increase(100, Utc::now()).unwrap();
        b.reserve(10, Utc::now()).unwrap();
        let m = b.commit(10, Utc::now()).unwrap();

        let entry = LedgerEntry::record(
            MovementKind::Outbound,
            key,
            m,
            DocumentRef::document(uuid::Uuid::now_v7(), "OUT-20240101-0001"),
            "picker",
            Utc::now(),
        );
        assert_eq!(entry.quantity, -10);
        assert_eq!(entry.balance_before, 100);
        assert_eq!(entry.balance_after, 90);
        assert!(entry.is_consistent());
    }

    #[test]
    fn broken_chain_is_detected() {
        let key = test_key();
        let first = LedgerEntry::record(
            MovementKind::Inbound,
            key,
            Movement { quantity: 5, before: 0, after: 5 },
            DocumentRef::adjustment("count"),
            "a",
            Utc::now(),
        );
        let gap = LedgerEntry::record(
            MovementKind::Inbound,
            key,
            Movement { quantity: 5, before: 7, after: 12 },
            DocumentRef::adjustment("count"),
            "a",
            Utc::now(),
        );
        assert!(verify_chain(&[first.clone()]).is_ok());
        assert!(matches!(
            verify_chain(&[first, gap]),
            Err(DomainError::InvariantViolation(_))
        ));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Increase(i64),
        Reserve(i64),
        Commit(i64),
        Release(i64),
        Adjust(i64),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1i64..500).prop_map(Op::Increase),
            (1i64..200).prop_map(Op::Reserve),
            (1i64..200).prop_map(Op::Commit),
            (1i64..200).prop_map(Op::Release),
            (-100i64..100).prop_map(Op::Adjust),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: any sequence of operations (failed ones included) keeps
        /// `on_hand >= reserved >= 0`, and the movements form an unbroken chain.
        #[test]
        fn balance_invariant_and_chain_hold(ops in prop::collection::vec(op(), 1..60)) {
            let key = test_key();
            let mut balance = StockBalance::empty(key, Utc::now());
            let mut entries: Vec<LedgerEntry> = Vec::new();

            for op in ops {
                let before = balance.clone();
                let result = match op {
                    Op::Increase(q) => balance.increase(q, Utc::now()).map(|m| Some((MovementKind::Inbound, m))),
                    Op::Reserve(q) => balance.reserve(q, Utc::now()).map(|_| None),
                    Op::Commit(q) => balance.commit(q, Utc::now()).map(|m| Some((MovementKind::Outbound, m))),
                    Op::Release(q) => balance.release(q, Utc::now()).map(|_| None),
                    Op::Adjust(d) => balance.adjust(d, Utc::now()).map(|m| Some((MovementKind::Adjustment, m))),
                };

                match result {
                    Ok(Some((kind, m))) => entries.push(LedgerEntry::record(
                        kind,
                        key,
                        m,
                        DocumentRef::adjustment("prop"),
                        "prop",
                        Utc::now(),
                    )),
                    Ok(None) => {}
                    Err(_) => {
                        prop_assert_eq!(balance.on_hand(), before.on_hand());
                        prop_assert_eq!(balance.reserved(), before.reserved());
                    }
                }

                prop_assert!(balance.reserved() >= 0);
                prop_assert!(balance.on_hand() >= balance.reserved());
                prop_assert!(balance.available() >= 0);
            }

            prop_assert!(verify_chain(&entries).is_ok());
            let last_after = entries.last().map(|e| e.balance_after).unwrap_or(0);
            prop_assert_eq!(last_after, balance.on_hand());
        }
    }
}
