//! Application layer containing the payment orchestration.
//!
//! `PaymentSaga` drives the processor and the payment state machine,
//! `PaymentService` is the entry point for callers, and `WebhookReconciler`
//! applies processor notifications. Service and reconciler share `PaymentLocks`
//! so their updates to the same payment never interleave.

pub mod locks;
pub mod reconciliation;
pub mod saga;
pub mod service;
