use crate::config::SagaConfig;
use crate::domain::events::{PaymentEvent, PaymentEventKind};
use crate::domain::payment::{Payment, PaymentStatus};
use crate::domain::ports::{
    AuthorizeRequest, EventPublisherArc, GatewayOperation, PaymentGatewayArc, PaymentRepositoryArc,
};
use crate::error::{PaymentError, Result};
use log::*;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Sequences processor calls against the payment state machine.
///
/// Every path that reaches the processor ends with the payment persisted, either in
/// its new state or as `failed`/`canceled`. On the failure branches persistence is
/// best-effort so the original error is what the caller sees; on success a
/// persistence error is returned because the transition would otherwise be lost.
pub struct PaymentSaga {
    repository: PaymentRepositoryArc,
    gateway: PaymentGatewayArc,
    publisher: EventPublisherArc,
    config: SagaConfig,
    compensations: TaskTracker,
}

impl PaymentSaga {
    pub fn new(
        repository: PaymentRepositoryArc,
        gateway: PaymentGatewayArc,
        publisher: EventPublisherArc,
        config: SagaConfig,
    ) -> Self {
        Self {
            repository,
            gateway,
            publisher,
            config,
            compensations: TaskTracker::new(),
        }
    }

    /// Places a manual-capture hold for a `created` or `failed` payment.
    pub async fn authorize(&self, cancel: &CancellationToken, payment: &mut Payment) -> Result<()> {
        let status = payment.status();
        if !matches!(status, PaymentStatus::Created | PaymentStatus::Failed) {
            return Err(PaymentError::InvalidState {
                operation: "authorize",
                status,
            });
        }

        if payment.amount() >= self.config.risk_ceiling {
            warn!(
                "🚨️ Payment {} for {} {} rejected by the risk ceiling",
                payment.id(),
                payment.amount(),
                payment.currency()
            );
            let err = PaymentError::RiskRejected {
                amount: payment.amount(),
                ceiling: self.config.risk_ceiling,
            };
            return self.fail(payment, err).await;
        }

        let request = AuthorizeRequest {
            idempotency_key: GatewayOperation::Authorize.idempotency_key(payment.id()),
            amount: payment.amount(),
            currency: payment.currency().to_string(),
            email: payment.email().as_str().to_string(),
            use_test_method: self.config.use_test_payment_method,
            test_method_token: self.config.test_payment_method.clone(),
        };
        let authorization = match self.gateway.authorize_manual(cancel, request).await {
            Ok(authorization) => authorization,
            Err(e) => return self.fail(payment, e).await,
        };

        payment.authorize(authorization.external_id, authorization.client_secret)?;
        self.repository.update(payment).await?;
        info!("Payment {} authorized", payment.id());
        self.publish(PaymentEventKind::Authorized, payment).await;
        Ok(())
    }

    /// Captures an authorized hold.
    ///
    /// After the processor accepts the capture the saga waits `settlement_wait`
    /// before recording it. If the caller cancels during that wait, or while the
    /// capture call itself is in flight, the capture is compensated with a refund on
    /// a detached task and the payment ends `failed`.
    pub async fn capture(&self, cancel: &CancellationToken, payment: &mut Payment) -> Result<()> {
        let status = payment.status();
        let external_id = match (status, payment.external_id()) {
            (PaymentStatus::Authorized, Some(external_id)) => external_id.to_string(),
            _ => {
                return Err(PaymentError::InvalidState {
                    operation: "capture",
                    status,
                });
            }
        };

        if cancel.is_cancelled() {
            let err = PaymentError::GatewayTimeout("capture cancelled before dispatch".to_string());
            return self.fail(payment, err).await;
        }
        if let Err(e) = self.gateway.capture(cancel, &external_id).await {
            // An abandoned call may still land at the processor.
            if cancel.is_cancelled() {
                warn!(
                    "Capture of payment {} abandoned in flight. Refunding {external_id}.",
                    payment.id()
                );
                self.spawn_refund(external_id);
            }
            return self.fail(payment, e).await;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(
                    "Capture of payment {} cancelled during settlement. Refunding {external_id}.",
                    payment.id()
                );
                self.spawn_refund(external_id);
                return self.fail(payment, PaymentError::Cancelled).await;
            }
            _ = tokio::time::sleep(self.config.settlement_wait) => {}
        }

        payment.capture()?;
        self.repository.update(payment).await?;
        info!("Payment {} captured", payment.id());
        self.publish(PaymentEventKind::Captured, payment).await;
        Ok(())
    }

    /// Cancels a `created` or `authorized` payment.
    ///
    /// A processor-side cancel failure is logged and does not block the local
    /// transition.
    pub async fn cancel(&self, cancel: &CancellationToken, payment: &mut Payment) -> Result<()> {
        let status = payment.status();
        if !matches!(status, PaymentStatus::Created | PaymentStatus::Authorized) {
            return Err(PaymentError::InvalidState {
                operation: "cancel",
                status,
            });
        }

        if let Some(external_id) = payment.external_id()
            && let Err(e) = self.gateway.cancel(cancel, external_id).await
        {
            warn!(
                "Processor cancel for payment {} failed, cancelling locally anyway: {e}",
                payment.id()
            );
        }

        payment.cancel()?;
        self.repository.update(payment).await?;
        info!("Payment {} canceled", payment.id());
        self.publish(PaymentEventKind::Canceled, payment).await;
        Ok(())
    }

    /// Waits until every compensating refund started so far has finished.
    pub async fn wait_for_compensations(&self) {
        self.compensations.close();
        self.compensations.wait().await;
        self.compensations.reopen();
    }

    /// Runs the refund with its own token so it outlives the cancellation that
    /// triggered it.
    fn spawn_refund(&self, external_id: String) {
        let gateway = Arc::clone(&self.gateway);
        self.compensations.spawn(async move {
            match gateway.refund(&CancellationToken::new(), &external_id).await {
                Ok(()) => info!("Compensating refund for {external_id} succeeded"),
                Err(e) => error!("Compensating refund for {external_id} failed: {e}"),
            }
        });
    }

    async fn fail<T>(&self, payment: &mut Payment, err: PaymentError) -> Result<T> {
        payment.fail();
        if let Err(persist_err) = self.repository.update(payment).await {
            warn!(
                "Could not persist failed payment {}: {persist_err}",
                payment.id()
            );
        }
        let event = PaymentEvent::from_payment(PaymentEventKind::Failed, payment)
            .with_meta("reason", err.to_string());
        self.publish_event(event).await;
        Err(err)
    }

    async fn publish(&self, kind: PaymentEventKind, payment: &Payment) {
        self.publish_event(PaymentEvent::from_payment(kind, payment))
            .await;
    }

    async fn publish_event(&self, event: PaymentEvent) {
        let payment_id = event.payment_id.clone();
        if let Err(e) = self.publisher.publish(event).await {
            warn!("Could not publish event for payment {payment_id}: {e}");
        }
    }
}
