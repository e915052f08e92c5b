//! Domain layer: the payment aggregate, its state machine, and the ports the
//! application layer talks through.

pub mod events;
pub mod payment;
pub mod ports;
pub mod webhook;
