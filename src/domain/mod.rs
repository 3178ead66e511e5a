//! Domain types and the ports the core talks through.

pub mod payment;
pub mod ports;
