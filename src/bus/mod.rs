//! Event bus: NATS client wrapper plus the cross-component event contracts.

pub mod client;
pub mod events;

pub use client::BusClient;
