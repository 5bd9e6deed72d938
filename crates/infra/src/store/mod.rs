//! Unit-of-work storage boundary.
//!
//! A flow opens one transaction handle, loads and saves aggregates through the
//! repository traits, and commits or rolls back as a whole. Backends:
//! in-memory (dev/tests) and Postgres.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::{InMemoryTx, InMemoryWarehouseStore};
pub use postgres::{PostgresTx, PostgresWarehouseStore};
pub use r#trait::{
    DeliveryRepository, InboundRepository, OutboundRepository, PaymentRepository,
    StockRepository, StoreError, UnitOfWork, WarehouseStore,
};
