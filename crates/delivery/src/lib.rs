//! Delivery tracking domain module.
//!
//! Deliveries follow their outbound document once it leaves the warehouse and
//! are advanced by delivery-partner notifications, validated against an
//! explicit transition table.

pub mod delivery;

pub use delivery::{
    Delivery, DeliveryDetails, DeliveryEvent, DeliveryEventKind, DeliveryStatus, NewDelivery,
};
