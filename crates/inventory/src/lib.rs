//! Stock ledger domain module.
//!
//! Per product+location balances and the append-only movement ledger,
//! implemented purely as deterministic domain logic (no IO, no HTTP, no storage).

pub mod ledger;
pub mod stock;

pub use ledger::{DocumentRef, LedgerEntry, MovementKind, verify_chain};
pub use stock::{Movement, StockBalance, StockKey};
