#![allow(dead_code)]

use async_trait::async_trait;
use payment_saga::application::locks::PaymentLocks;
use payment_saga::application::reconciliation::WebhookReconciler;
use payment_saga::application::saga::PaymentSaga;
use payment_saga::application::service::{CreatePayment, PaymentService};
use payment_saga::config::{SagaConfig, Secret, ServiceDeadlines};
use payment_saga::domain::payment::{Payment, PaymentId};
use payment_saga::domain::ports::{
    AuthorizeRequest, Authorization, EventPublisherArc, GatewayOperation, PaymentGateway,
    PaymentGatewayArc, PaymentRepository, PaymentRepositoryArc,
};
use payment_saga::domain::webhook::ProcessorEvent;
use payment_saga::error::{PaymentError, Result};
use payment_saga::infrastructure::in_memory::{InMemoryEventPublisher, InMemoryPaymentRepository};
use payment_saga::infrastructure::signature::WebhookVerifier;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";

/// How the stub processor answers.
#[derive(Debug, Clone, Default)]
pub struct Behaviour {
    pub decline_authorize: bool,
    pub fail_capture: bool,
    pub fail_cancel: bool,
}

/// A gateway stub that records every call it receives.
pub struct RecordingGateway {
    behaviour: Behaviour,
    verifier: WebhookVerifier,
    calls: Mutex<Vec<(GatewayOperation, String)>>,
}

impl RecordingGateway {
    pub fn new(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            verifier: verifier(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// `(operation, idempotency key or external id)` in call order.
    pub fn calls(&self) -> Vec<(GatewayOperation, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, operation: GatewayOperation) -> usize {
        self.calls().iter().filter(|(op, _)| *op == operation).count()
    }

    fn record(&self, operation: GatewayOperation, subject: &str) {
        self.calls
            .lock()
            .unwrap()
            .push((operation, subject.to_string()));
    }
}

#[async_trait]
impl PaymentGateway for RecordingGateway {
    async fn authorize_manual(
        &self,
        _cancel: &CancellationToken,
        request: AuthorizeRequest,
    ) -> Result<Authorization> {
        self.record(GatewayOperation::Authorize, &request.idempotency_key);
        if self.behaviour.decline_authorize {
            return Err(PaymentError::GatewayDeclined("card_declined".into()));
        }
        Ok(Authorization {
            external_id: format!("pi_{}", request.idempotency_key),
            client_secret: format!("pi_{}_secret", request.idempotency_key),
        })
    }

    async fn capture(&self, _cancel: &CancellationToken, external_id: &str) -> Result<()> {
        self.record(GatewayOperation::Capture, external_id);
        if self.behaviour.fail_capture {
            return Err(PaymentError::GatewayTimeout("capture: deadline exceeded".into()));
        }
        Ok(())
    }

    async fn cancel(&self, _cancel: &CancellationToken, external_id: &str) -> Result<()> {
        self.record(GatewayOperation::Cancel, external_id);
        if self.behaviour.fail_cancel {
            return Err(PaymentError::GatewayDeclined("intent already captured".into()));
        }
        Ok(())
    }

    async fn refund(&self, _cancel: &CancellationToken, external_id: &str) -> Result<()> {
        self.record(GatewayOperation::Refund, external_id);
        Ok(())
    }

    fn verify_webhook_signature(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<ProcessorEvent> {
        self.verifier.verify(payload, signature_header)
    }
}

pub fn verifier() -> WebhookVerifier {
    WebhookVerifier::new(
        Some(Secret::new(WEBHOOK_SECRET.to_string())),
        Duration::from_secs(300),
    )
}

/// Everything a test needs, wired the way the binary wires it.
pub struct Harness {
    pub repository: InMemoryPaymentRepository,
    pub publisher: InMemoryEventPublisher,
    pub gateway: Arc<RecordingGateway>,
    pub saga: Arc<PaymentSaga>,
    pub service: Arc<PaymentService>,
    pub reconciler: WebhookReconciler,
}

pub fn harness(behaviour: Behaviour) -> Harness {
    harness_with(behaviour, saga_config(), ServiceDeadlines::default())
}

pub fn harness_with(
    behaviour: Behaviour,
    config: SagaConfig,
    deadlines: ServiceDeadlines,
) -> Harness {
    let repository = InMemoryPaymentRepository::new();
    let publisher = InMemoryEventPublisher::new();
    let gateway = Arc::new(RecordingGateway::new(behaviour));

    let repository_port: PaymentRepositoryArc = Arc::new(repository.clone());
    let gateway_port: PaymentGatewayArc = gateway.clone();
    let publisher_port: EventPublisherArc = Arc::new(publisher.clone());

    let saga = Arc::new(PaymentSaga::new(
        Arc::clone(&repository_port),
        Arc::clone(&gateway_port),
        publisher_port,
        config,
    ));
    let locks = Arc::new(PaymentLocks::new());
    let service = Arc::new(PaymentService::new(
        Arc::clone(&repository_port),
        Arc::clone(&saga),
        Arc::clone(&locks),
        deadlines,
    ));
    let reconciler = WebhookReconciler::new(gateway_port, repository_port, locks);

    Harness {
        repository,
        publisher,
        gateway,
        saga,
        service,
        reconciler,
    }
}

pub fn saga_config() -> SagaConfig {
    SagaConfig {
        settlement_wait: Duration::from_millis(5),
        ..SagaConfig::default()
    }
}

pub fn order(amount: i64, currency: &str, email: &str) -> CreatePayment {
    CreatePayment {
        amount,
        currency: currency.to_string(),
        email: email.to_string(),
    }
}

/// Serializes and signs a notification the way the processor delivers it.
pub fn signed(event: &ProcessorEvent) -> (Vec<u8>, String) {
    let payload = serde_json::to_vec(event).unwrap();
    let header = verifier()
        .sign(&payload, chrono::Utc::now().timestamp())
        .unwrap();
    (payload, header)
}

/// Delegates to the in-memory repository but fails every `update` once `broken` is set.
#[derive(Default)]
pub struct FailingRepository {
    inner: InMemoryPaymentRepository,
    broken: AtomicBool,
}

impl FailingRepository {
    pub fn break_updates(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl PaymentRepository for FailingRepository {
    async fn create(&self, payment: &Payment) -> Result<()> {
        self.inner.create(payment).await
    }

    async fn get(&self, id: &PaymentId) -> Result<Payment> {
        self.inner.get(id).await
    }

    async fn update(&self, payment: &Payment) -> Result<()> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(PaymentError::internal("disk full"));
        }
        self.inner.update(payment).await
    }

    async fn get_by_external_id(&self, external_id: &str) -> Result<Payment> {
        self.inner.get_by_external_id(external_id).await
    }
}
