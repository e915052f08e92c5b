use super::locks::PaymentLocks;
use super::saga::PaymentSaga;
use crate::config::ServiceDeadlines;
use crate::domain::payment::{Email, Money, Payment, PaymentId};
use crate::domain::ports::PaymentRepositoryArc;
use crate::error::{PaymentError, Result};
use log::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePayment {
    pub amount: i64,
    pub currency: String,
    pub email: String,
}

/// A child of the caller's token that is also cancelled once `after` elapses.
struct Deadline {
    token: CancellationToken,
    timer: JoinHandle<()>,
}

impl Deadline {
    fn arm(parent: &CancellationToken, after: Duration) -> Self {
        let token = parent.child_token();
        let expiring = token.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            expiring.cancel();
        });
        Self { token, timer }
    }
}

impl Drop for Deadline {
    fn drop(&mut self) {
        self.timer.abort();
    }
}

/// Entry points used by the surrounding request layer.
///
/// Each call arms an outer deadline, waits for the payment's per-id lock within it,
/// runs the saga, and returns the resulting payment.
pub struct PaymentService {
    repository: PaymentRepositoryArc,
    saga: Arc<PaymentSaga>,
    locks: Arc<PaymentLocks>,
    deadlines: ServiceDeadlines,
}

impl PaymentService {
    pub fn new(
        repository: PaymentRepositoryArc,
        saga: Arc<PaymentSaga>,
        locks: Arc<PaymentLocks>,
        deadlines: ServiceDeadlines,
    ) -> Self {
        Self {
            repository,
            saga,
            locks,
            deadlines,
        }
    }

    /// Validates the input and stores a new `created` payment.
    pub async fn create(&self, input: CreatePayment) -> Result<Payment> {
        let money = Money::new(input.amount, &input.currency)?;
        let email = Email::parse(&input.email)?;
        let payment = Payment::new(PaymentId::generate(), money, email);
        self.repository.create(&payment).await?;
        debug!("Created payment {}", payment.id());
        Ok(payment)
    }

    pub async fn authorize(&self, cancel: &CancellationToken, id: &PaymentId) -> Result<Payment> {
        let deadline = Deadline::arm(cancel, self.deadlines.authorize);
        let _guard = self.lock(&deadline, "authorize", id).await?;
        let mut payment = self.repository.get(id).await?;
        self.saga.authorize(&deadline.token, &mut payment).await?;
        Ok(payment)
    }

    pub async fn create_and_authorize(
        &self,
        cancel: &CancellationToken,
        input: CreatePayment,
    ) -> Result<Payment> {
        let payment = self.create(input).await?;
        self.authorize(cancel, payment.id()).await
    }

    pub async fn capture(&self, cancel: &CancellationToken, id: &PaymentId) -> Result<Payment> {
        let deadline = Deadline::arm(cancel, self.deadlines.capture);
        let _guard = self.lock(&deadline, "capture", id).await?;
        let mut payment = self.repository.get(id).await?;
        self.saga.capture(&deadline.token, &mut payment).await?;
        Ok(payment)
    }

    pub async fn cancel(&self, cancel: &CancellationToken, id: &PaymentId) -> Result<Payment> {
        let deadline = Deadline::arm(cancel, self.deadlines.cancel);
        let _guard = self.lock(&deadline, "cancel", id).await?;
        let mut payment = self.repository.get(id).await?;
        self.saga.cancel(&deadline.token, &mut payment).await?;
        Ok(payment)
    }

    pub async fn get(&self, id: &PaymentId) -> Result<Payment> {
        self.repository.get(id).await
    }

    pub fn saga(&self) -> &PaymentSaga {
        &self.saga
    }

    /// Waits for the payment's lock unless the deadline fires first.
    async fn lock(
        &self,
        deadline: &Deadline,
        operation: &str,
        id: &PaymentId,
    ) -> Result<OwnedMutexGuard<()>> {
        tokio::select! {
            biased;
            _ = deadline.token.cancelled() => Err(PaymentError::GatewayTimeout(format!(
                "{operation} cancelled while waiting for payment {id}"
            ))),
            guard = self.locks.lock(id) => Ok(guard),
        }
    }
}
