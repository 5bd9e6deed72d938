//! Infrastructure layer: storage, directory collaborator, ledger operations,
//! warehouse flows and webhook processors.

pub mod directory;
pub mod flows;
pub mod ledger;
pub mod store;
pub mod webhooks;

mod integration_tests;

pub use directory::{Directory, DirectorySeed, InMemoryDirectory, PostgresDirectory};
pub use flows::payments::PaymentAction;
pub use flows::{FlowError, FlowResult, Warehouse};
pub use store::{InMemoryWarehouseStore, PostgresWarehouseStore, StoreError, WarehouseStore};
pub use webhooks::{DeliveryWebhook, PaymentWebhook};
