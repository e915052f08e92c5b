//! Saga runs against the real gateway stack: breaker, per-call timeout and
//! cancellation wrapped around the simulated processor.

use payment_saga::application::saga::PaymentSaga;
use payment_saga::config::{BreakerConfig, GatewayConfig, SagaConfig};
use payment_saga::domain::payment::{Email, Money, Payment, PaymentId, PaymentStatus};
use payment_saga::domain::ports::{PaymentGatewayArc, PaymentRepository};
use payment_saga::error::ErrorKind;
use payment_saga::infrastructure::breaker::{CircuitBreaker, CircuitState};
use payment_saga::infrastructure::in_memory::{InMemoryEventPublisher, InMemoryPaymentRepository};
use payment_saga::infrastructure::resilient::ResilientGateway;
use payment_saga::infrastructure::simulated::{IntentStatus, SimulatedProcessor};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct Stack {
    processor: Arc<SimulatedProcessor>,
    breaker: Arc<CircuitBreaker>,
    repository: InMemoryPaymentRepository,
    saga: PaymentSaga,
}

fn stack(processor: SimulatedProcessor, breaker: BreakerConfig, request_timeout: Duration) -> Stack {
    let processor = Arc::new(processor);
    let breaker = Arc::new(CircuitBreaker::new("processor", breaker));
    let config = GatewayConfig {
        request_timeout,
        ..GatewayConfig::default()
    };
    let gateway: PaymentGatewayArc = Arc::new(ResilientGateway::new(
        Arc::clone(&processor),
        Arc::clone(&breaker),
        &config,
    ));
    let repository = InMemoryPaymentRepository::new();
    let saga = PaymentSaga::new(
        Arc::new(repository.clone()),
        gateway,
        Arc::new(InMemoryEventPublisher::new()),
        SagaConfig {
            settlement_wait: Duration::from_millis(50),
            ..SagaConfig::default()
        },
    );
    Stack {
        processor,
        breaker,
        repository,
        saga,
    }
}

async fn created(stack: &Stack, amount: i64) -> Payment {
    let payment = Payment::new(
        PaymentId::generate(),
        Money::new(amount, "usd").unwrap(),
        Email::parse("a@b.com").unwrap(),
    );
    stack.repository.create(&payment).await.unwrap();
    payment
}

async fn authorized(stack: &Stack) -> Payment {
    let mut payment = created(stack, 5500).await;
    stack
        .saga
        .authorize(&CancellationToken::new(), &mut payment)
        .await
        .unwrap();
    payment
}

fn intent_status(stack: &Stack, payment: &Payment) -> IntentStatus {
    stack
        .processor
        .intent(payment.external_id().unwrap())
        .unwrap()
        .status
}

#[tokio::test(start_paused = true)]
async fn test_capture_with_cancelled_token_never_reaches_processor() {
    let s = stack(SimulatedProcessor::new(), BreakerConfig::default(), Duration::from_secs(15));
    let mut payment = authorized(&s).await;
    let token = CancellationToken::new();
    token.cancel();

    let err = s.saga.capture(&token, &mut payment).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::GatewayTimeout);
    s.saga.wait_for_compensations().await;

    assert_eq!(payment.status(), PaymentStatus::Failed);
    assert_eq!(s.processor.calls().capture.load(Ordering::SeqCst), 0);
    assert_eq!(s.processor.calls().refund.load(Ordering::SeqCst), 0);
    assert_eq!(intent_status(&s, &payment), IntentStatus::RequiresCapture);
}

#[tokio::test(start_paused = true)]
async fn test_capture_abandoned_in_flight_is_refunded() {
    let processor = SimulatedProcessor::new().with_latency(Duration::from_secs(1));
    let s = stack(processor, BreakerConfig::default(), Duration::from_secs(15));
    let mut payment = authorized(&s).await;

    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let err = s.saga.capture(&token, &mut payment).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::GatewayTimeout);
    assert_eq!(payment.status(), PaymentStatus::Failed);

    s.saga.wait_for_compensations().await;
    assert_eq!(s.processor.calls().capture.load(Ordering::SeqCst), 1);
    assert_eq!(s.processor.calls().refund.load(Ordering::SeqCst), 1);
    // The detached capture landed first; the refund reversed it.
    assert_eq!(intent_status(&s, &payment), IntentStatus::Refunded);
    let stored = s.repository.get(payment.id()).await.unwrap();
    assert_eq!(stored.status(), PaymentStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_open_breaker_fails_payment_without_remote_call() {
    let breaker = BreakerConfig {
        min_requests: 1,
        failure_ratio: 0.5,
        ..BreakerConfig::default()
    };
    let processor = SimulatedProcessor::new().with_decline_over(Some(1000));
    let s = stack(processor, breaker, Duration::from_secs(15));

    let mut declined = created(&s, 5000).await;
    let err = s
        .saga
        .authorize(&CancellationToken::new(), &mut declined)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::GatewayDeclined);
    assert_eq!(s.breaker.state(), CircuitState::Open);

    let mut payment = created(&s, 500).await;
    let err = s
        .saga
        .authorize(&CancellationToken::new(), &mut payment)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::GatewayTimeout);
    assert_eq!(s.processor.calls().authorize.load(Ordering::SeqCst), 1);
    let stored = s.repository.get(payment.id()).await.unwrap();
    assert_eq!(stored.status(), PaymentStatus::Failed);
    assert_eq!(stored.external_id(), None);
}

#[tokio::test(start_paused = true)]
async fn test_slow_processor_times_out_and_fails_payment() {
    let processor = SimulatedProcessor::new().with_latency(Duration::from_secs(5));
    let s = stack(processor, BreakerConfig::default(), Duration::from_secs(1));

    let mut payment = created(&s, 500).await;
    let err = s
        .saga
        .authorize(&CancellationToken::new(), &mut payment)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::GatewayTimeout);
    let stored = s.repository.get(payment.id()).await.unwrap();
    assert_eq!(stored.status(), PaymentStatus::Failed);
    assert_eq!(s.breaker.counts().total_failures, 1);
}
