use super::events::PaymentEvent;
use super::payment::{Payment, PaymentId};
use super::webhook::ProcessorEvent;
use crate::error::Result;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Persistence contract for payments.
///
/// Implementations hand out independently owned values: mutating a returned
/// `Payment` never affects stored state until it is passed to `update`.
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Fails with `AlreadyExists` if the id is taken.
    async fn create(&self, payment: &Payment) -> Result<()>;
    async fn get(&self, id: &PaymentId) -> Result<Payment>;
    /// Fails with `NotFound` if the payment was never created.
    async fn update(&self, payment: &Payment) -> Result<()>;
    async fn get_by_external_id(&self, external_id: &str) -> Result<Payment>;
}

/// Remote call kinds, used to derive idempotency keys and label failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayOperation {
    Authorize,
    Capture,
    Cancel,
    Refund,
}

impl GatewayOperation {
    fn prefix(&self) -> &'static str {
        match self {
            Self::Authorize => "auth",
            Self::Capture => "capture",
            Self::Cancel => "cancel",
            Self::Refund => "refund",
        }
    }

    /// Deterministic per payment and operation, so a retried call is deduplicated
    /// by the processor instead of placing a second hold.
    pub fn idempotency_key(&self, payment_id: &PaymentId) -> String {
        format!("{}-{}", self.prefix(), payment_id)
    }
}

impl fmt::Display for GatewayOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Authorize => "authorize",
            Self::Capture => "capture",
            Self::Cancel => "cancel",
            Self::Refund => "refund",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizeRequest {
    pub idempotency_key: String,
    pub amount: i64,
    pub currency: String,
    pub email: String,
    pub use_test_method: bool,
    pub test_method_token: String,
}

/// A manual-capture hold placed by the processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
    pub external_id: String,
    pub client_secret: String,
}

/// The processor as seen by the saga.
///
/// Every remote call races the caller's cancellation token; timeouts, cancellation
/// and breaker fast-fail all surface as `GatewayTimeout`, processor rejections as
/// `GatewayDeclined`.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn authorize_manual(
        &self,
        cancel: &CancellationToken,
        request: AuthorizeRequest,
    ) -> Result<Authorization>;
    async fn capture(&self, cancel: &CancellationToken, external_id: &str) -> Result<()>;
    async fn cancel(&self, cancel: &CancellationToken, external_id: &str) -> Result<()>;
    /// Only used as a compensating action.
    async fn refund(&self, cancel: &CancellationToken, external_id: &str) -> Result<()>;
    /// Fails closed when no signing secret is configured.
    fn verify_webhook_signature(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<ProcessorEvent>;
}

/// Raw remote processor API without timeouts or circuit breaking.
#[async_trait]
pub trait ProcessorApi: Send + Sync + 'static {
    async fn authorize_manual(&self, request: AuthorizeRequest) -> Result<Authorization>;
    async fn capture(&self, external_id: &str) -> Result<()>;
    async fn cancel(&self, external_id: &str) -> Result<()>;
    async fn refund(&self, external_id: &str) -> Result<()>;
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: PaymentEvent) -> Result<()>;
}

pub type PaymentRepositoryArc = Arc<dyn PaymentRepository>;
pub type PaymentGatewayArc = Arc<dyn PaymentGateway>;
pub type EventPublisherArc = Arc<dyn EventPublisher>;
