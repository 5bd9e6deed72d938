//! Inbound receiving domain module.
//!
//! Inbound documents announce expected goods per product+location; receiving
//! records the actual and damaged quantities and yields the good stock to add
//! to the ledger. Pure domain logic (no IO, no HTTP, no storage).

pub mod document;

pub use document::{
    InboundDocument, InboundLine, InboundStatus, LineReceipt, NewInbound, NewInboundLine,
    ReceiveInbound, ReceivedGoods,
};
