use crate::domain::ports::{AuthorizeRequest, Authorization, ProcessorApi};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use log::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentStatus {
    RequiresCapture,
    Succeeded,
    Canceled,
    Refunded,
}

#[derive(Debug, Clone)]
pub struct SimulatedIntent {
    pub id: String,
    pub client_secret: String,
    pub amount: i64,
    pub currency: String,
    pub status: IntentStatus,
}

#[derive(Default)]
struct Ledger {
    intents: HashMap<String, SimulatedIntent>,
    by_idempotency_key: HashMap<String, String>,
}

/// Number of remote calls received, per operation.
#[derive(Debug, Default)]
pub struct CallCounts {
    pub authorize: AtomicU32,
    pub capture: AtomicU32,
    pub cancel: AtomicU32,
    pub refund: AtomicU32,
}

/// An in-process stand-in for the remote processor.
///
/// Holds are deduplicated by idempotency key, so replaying an authorization returns
/// the original intent. Amounts above `decline_over` are declined.
#[derive(Default)]
pub struct SimulatedProcessor {
    ledger: Mutex<Ledger>,
    decline_over: Option<i64>,
    latency: Duration,
    calls: CallCounts,
}

impl SimulatedProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_decline_over(mut self, limit: Option<i64>) -> Self {
        self.decline_over = limit;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> &CallCounts {
        &self.calls
    }

    pub fn intent(&self, id: &str) -> Option<SimulatedIntent> {
        self.lock().intents.get(id).cloned()
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn transition(&self, id: &str, from: &[IntentStatus], to: IntentStatus) -> Result<()> {
        let mut ledger = self.lock();
        let intent = ledger
            .intents
            .get_mut(id)
            .ok_or_else(|| PaymentError::GatewayDeclined(format!("no such intent: {id}")))?;
        if !from.contains(&intent.status) {
            return Err(PaymentError::GatewayDeclined(format!(
                "intent {id} is {:?}, cannot move to {to:?}",
                intent.status
            )));
        }
        intent.status = to;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ProcessorApi for SimulatedProcessor {
    async fn authorize_manual(&self, request: AuthorizeRequest) -> Result<Authorization> {
        self.calls.authorize.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        let mut ledger = self.lock();
        if let Some(existing) = ledger
            .by_idempotency_key
            .get(&request.idempotency_key)
            .and_then(|id| ledger.intents.get(id))
        {
            debug!("Replayed authorization for key {}", request.idempotency_key);
            return Ok(Authorization {
                external_id: existing.id.clone(),
                client_secret: existing.client_secret.clone(),
            });
        }
        if let Some(limit) = self.decline_over
            && request.amount > limit
        {
            return Err(PaymentError::GatewayDeclined(format!(
                "card_declined: {} {} exceeds the card limit",
                request.amount, request.currency
            )));
        }

        let id = format!("pi_sim_{}", Uuid::now_v7().simple());
        let intent = SimulatedIntent {
            id: id.clone(),
            client_secret: format!("{id}_secret_{}", Uuid::new_v4().simple()),
            amount: request.amount,
            currency: request.currency,
            status: IntentStatus::RequiresCapture,
        };
        let authorization = Authorization {
            external_id: intent.id.clone(),
            client_secret: intent.client_secret.clone(),
        };
        ledger
            .by_idempotency_key
            .insert(request.idempotency_key, id.clone());
        ledger.intents.insert(id, intent);
        Ok(authorization)
    }

    async fn capture(&self, external_id: &str) -> Result<()> {
        self.calls.capture.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        self.transition(
            external_id,
            &[IntentStatus::RequiresCapture],
            IntentStatus::Succeeded,
        )
    }

    async fn cancel(&self, external_id: &str) -> Result<()> {
        self.calls.cancel.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        self.transition(
            external_id,
            &[IntentStatus::RequiresCapture],
            IntentStatus::Canceled,
        )
    }

    async fn refund(&self, external_id: &str) -> Result<()> {
        self.calls.refund.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        self.transition(
            external_id,
            &[IntentStatus::Succeeded, IntentStatus::RequiresCapture],
            IntentStatus::Refunded,
        )
    }
}
