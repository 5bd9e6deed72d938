//! Outbound fulfillment domain module.
//!
//! Outbound documents go through picking (stock reserved), optional packing and
//! shipping (stock committed). The document plans each stock effect; the
//! caller applies it to the ledger in the same unit of work.

pub mod document;

pub use document::{
    Allocation, LinePick, NewOutbound, NewOutboundLine, OutboundDocument, OutboundLine,
    OutboundStatus,
};
