use super::locks::PaymentLocks;
use crate::domain::payment::{Payment, PaymentStatus};
use crate::domain::ports::{PaymentGatewayArc, PaymentRepositoryArc};
use crate::domain::webhook::{IntentObject, NotificationKind};
use crate::error::{PaymentError, Result};
use log::*;
use std::sync::Arc;

type Transition = fn(&mut Payment, &IntentObject) -> Result<()>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// The transition was applied and persisted.
    Applied(PaymentStatus),
    /// Acknowledged without changing anything.
    Ignored(String),
}

/// Applies processor notifications to local payments.
///
/// Deliveries are at-least-once and may arrive out of order, so unknown intents
/// and transitions the payment can no longer make are acknowledged and dropped.
/// Only signature and storage failures are reported as errors.
pub struct WebhookReconciler {
    gateway: PaymentGatewayArc,
    repository: PaymentRepositoryArc,
    locks: Arc<PaymentLocks>,
}

impl WebhookReconciler {
    pub fn new(
        gateway: PaymentGatewayArc,
        repository: PaymentRepositoryArc,
        locks: Arc<PaymentLocks>,
    ) -> Self {
        Self {
            gateway,
            repository,
            locks,
        }
    }

    pub async fn handle_event(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<WebhookOutcome> {
        let event = self
            .gateway
            .verify_webhook_signature(payload, signature_header)?;
        let transition: Transition = match event.kind() {
            NotificationKind::RequiresCapture => |payment, intent| {
                // Events without a secret keep the one stored at authorization.
                let secret = intent
                    .client_secret
                    .clone()
                    .or_else(|| payment.client_secret().map(str::to_string))
                    .unwrap_or_default();
                payment.authorize(intent.id.clone(), secret)
            },
            NotificationKind::Succeeded => |payment, _| payment.capture(),
            NotificationKind::Canceled => |payment, _| payment.cancel(),
            NotificationKind::Unrecognized => {
                debug!("Ignoring webhook {} of type {}", event.id, event.event_type);
                return Ok(WebhookOutcome::Ignored(format!(
                    "unhandled event type {}",
                    event.event_type
                )));
            }
        };

        let intent = event.intent();
        let id = match self.repository.get_by_external_id(&intent.id).await {
            Ok(payment) => payment.id().clone(),
            Err(PaymentError::NotFound(_)) => {
                info!("Webhook {} references unknown intent {}", event.id, intent.id);
                return Ok(WebhookOutcome::Ignored(format!("unknown intent {}", intent.id)));
            }
            Err(e) => return Err(e),
        };

        let _guard = self.locks.lock(&id).await;
        // Re-read under the lock; a saga step may have finished in between.
        let mut payment = self.repository.get(&id).await?;
        if let Err(e) = transition(&mut payment, intent) {
            debug!("Dropping webhook {} for payment {id}: {e}", event.id);
            return Ok(WebhookOutcome::Ignored(e.to_string()));
        }

        self.repository.update(&payment).await?;
        info!(
            "Webhook {} moved payment {id} to {}",
            event.id,
            payment.status()
        );
        Ok(WebhookOutcome::Applied(payment.status()))
    }
}
