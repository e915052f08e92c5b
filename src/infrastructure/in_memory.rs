use crate::domain::events::PaymentEvent;
use crate::domain::payment::{Payment, PaymentId};
use crate::domain::ports::{EventPublisher, PaymentRepository};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use log::*;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

#[derive(Default)]
struct Tables {
    by_id: HashMap<PaymentId, Payment>,
    by_external_id: HashMap<String, PaymentId>,
}

impl Tables {
    fn index(&mut self, payment: &Payment) {
        if let Some(external_id) = payment.external_id() {
            self.by_external_id
                .insert(external_id.to_string(), payment.id().clone());
        }
    }
}

/// A thread-safe in-memory payment repository.
///
/// Keeps a primary index by payment id and a secondary index by processor
/// authorization id. Reads return clones, so callers only change stored state
/// through `update`.
#[derive(Default, Clone)]
pub struct InMemoryPaymentRepository {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryPaymentRepository {
    /// Creates a new, empty in-memory payment repository.
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<Payment> {
        let tables = self.tables.read().await;
        let mut payments: Vec<Payment> = tables.by_id.values().cloned().collect();
        payments.sort_by(|a, b| a.id().cmp(b.id()));
        payments
    }
}

#[async_trait]
impl PaymentRepository for InMemoryPaymentRepository {
    async fn create(&self, payment: &Payment) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.by_id.contains_key(payment.id()) {
            return Err(PaymentError::AlreadyExists(format!("payment {}", payment.id())));
        }
        tables.index(payment);
        tables.by_id.insert(payment.id().clone(), payment.clone());
        Ok(())
    }

    async fn get(&self, id: &PaymentId) -> Result<Payment> {
        let tables = self.tables.read().await;
        tables
            .by_id
            .get(id)
            .cloned()
            .ok_or_else(|| PaymentError::NotFound(format!("payment {id}")))
    }

    async fn update(&self, payment: &Payment) -> Result<()> {
        let mut tables = self.tables.write().await;
        let Some(stored) = tables.by_id.get_mut(payment.id()) else {
            return Err(PaymentError::NotFound(format!("payment {}", payment.id())));
        };
        *stored = payment.clone();
        tables.index(payment);
        Ok(())
    }

    async fn get_by_external_id(&self, external_id: &str) -> Result<Payment> {
        let tables = self.tables.read().await;
        tables
            .by_external_id
            .get(external_id)
            .and_then(|id| tables.by_id.get(id))
            .cloned()
            .ok_or_else(|| PaymentError::NotFound(format!("external id {external_id}")))
    }
}

/// Publishes domain events to the log.
#[derive(Default, Clone)]
pub struct LogEventPublisher;

#[async_trait]
impl EventPublisher for LogEventPublisher {
    async fn publish(&self, event: PaymentEvent) -> Result<()> {
        info!("📣️ {} for payment {} {:?}", event.kind, event.payment_id, event.meta);
        Ok(())
    }
}

/// Keeps every published event, in publication order.
#[derive(Default, Clone)]
pub struct InMemoryEventPublisher {
    events: Arc<Mutex<Vec<PaymentEvent>>>,
}

impl InMemoryEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<PaymentEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventPublisher {
    async fn publish(&self, event: PaymentEvent) -> Result<()> {
        self.events.lock().await.push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::PaymentEventKind;
    use crate::domain::payment::{Email, Money, PaymentStatus};

    fn payment() -> Payment {
        Payment::new(
            PaymentId::generate(),
            Money::new(5500, "brl").unwrap(),
            Email::parse("a@b.com").unwrap(),
        )
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let repo = InMemoryPaymentRepository::new();
        let p = payment();
        repo.create(&p).await.unwrap();
        assert_eq!(repo.get(p.id()).await.unwrap(), p);
        assert!(matches!(
            repo.get(&PaymentId::generate()).await,
            Err(PaymentError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_create_is_rejected() {
        let repo = InMemoryPaymentRepository::new();
        let p = payment();
        repo.create(&p).await.unwrap();
        assert!(matches!(
            repo.create(&p).await,
            Err(PaymentError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_returned_values_are_independent_copies() {
        let repo = InMemoryPaymentRepository::new();
        let p = payment();
        repo.create(&p).await.unwrap();

        let mut loaded = repo.get(p.id()).await.unwrap();
        loaded.cancel().unwrap();
        assert_eq!(
            repo.get(p.id()).await.unwrap().status(),
            PaymentStatus::Created
        );

        repo.update(&loaded).await.unwrap();
        assert_eq!(
            repo.get(p.id()).await.unwrap().status(),
            PaymentStatus::Canceled
        );
    }

    #[tokio::test]
    async fn test_update_unknown_payment_fails() {
        let repo = InMemoryPaymentRepository::new();
        assert!(matches!(
            repo.update(&payment()).await,
            Err(PaymentError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_secondary_index_follows_authorization() {
        let repo = InMemoryPaymentRepository::new();
        let mut p = payment();
        repo.create(&p).await.unwrap();
        assert!(repo.get_by_external_id("pi_1").await.is_err());

        p.authorize("pi_1".into(), "secret".into()).unwrap();
        repo.update(&p).await.unwrap();
        let found = repo.get_by_external_id("pi_1").await.unwrap();
        assert_eq!(found.id(), p.id());
        assert_eq!(found.status(), PaymentStatus::Authorized);
    }

    #[tokio::test]
    async fn test_in_memory_publisher_records_events() {
        let publisher = InMemoryEventPublisher::new();
        let p = payment();
        publisher
            .publish(PaymentEvent::from_payment(PaymentEventKind::Failed, &p))
            .await
            .unwrap();
        let events = publisher.events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payment_id, *p.id());
        assert_eq!(events[0].meta["status"], "created");
    }
}
