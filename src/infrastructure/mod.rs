//! Adapters behind the domain ports: the resilient processor gateway, webhook
//! signature checks, an in-process processor simulation and in-memory storage.

pub mod breaker;
pub mod in_memory;
pub mod resilient;
pub mod signature;
pub mod simulated;
