use super::breaker::CircuitBreaker;
use super::signature::WebhookVerifier;
use crate::config::GatewayConfig;
use crate::domain::ports::{
    AuthorizeRequest, Authorization, GatewayOperation, PaymentGateway, ProcessorApi,
};
use crate::domain::webhook::ProcessorEvent;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use log::*;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// The gateway boundary used by the saga.
///
/// Each remote call is admitted by the shared circuit breaker, runs on its own task
/// bounded by the per-call timeout, and races the caller's cancellation token. The
/// call's outcome is fed back to the breaker when the task finishes, even when the
/// caller stopped waiting for it.
pub struct ResilientGateway<P: ProcessorApi> {
    api: Arc<P>,
    breaker: Arc<CircuitBreaker>,
    verifier: WebhookVerifier,
    request_timeout: Duration,
}

impl<P: ProcessorApi> ResilientGateway<P> {
    pub fn new(api: Arc<P>, breaker: Arc<CircuitBreaker>, config: &GatewayConfig) -> Self {
        Self {
            api,
            breaker,
            verifier: WebhookVerifier::new(
                config.webhook_secret.clone(),
                config.signature_tolerance,
            ),
            request_timeout: config.request_timeout,
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    async fn execute<T, F>(
        &self,
        cancel: &CancellationToken,
        operation: GatewayOperation,
        call: F,
    ) -> Result<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T>> + Send + 'static,
    {
        if cancel.is_cancelled() {
            return Err(PaymentError::GatewayTimeout(format!(
                "{operation} cancelled before dispatch"
            )));
        }
        let ticket = self.breaker.admit().map_err(|rejection| {
            debug!("{operation} short-circuited by '{}': {rejection}", self.breaker.name());
            PaymentError::GatewayTimeout(format!("{operation}: {rejection}"))
        })?;

        let breaker = Arc::clone(&self.breaker);
        let timeout = self.request_timeout;
        let task = tokio::spawn(async move {
            let outcome = match tokio::time::timeout(timeout, call).await {
                Ok(outcome) => outcome,
                Err(_) => Err(PaymentError::GatewayTimeout(format!(
                    "{operation} timed out after {timeout:?}"
                ))),
            };
            breaker.record(ticket, outcome.is_ok());
            outcome
        });

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PaymentError::GatewayTimeout(format!(
                "{operation} cancelled by caller"
            ))),
            joined = task => joined.map_err(|e| PaymentError::InternalError(Box::new(e)))?,
        };
        if let Err(e) = &outcome {
            warn!("Gateway {operation} failed: {e}");
        }
        outcome
    }
}

#[async_trait]
impl<P: ProcessorApi> PaymentGateway for ResilientGateway<P> {
    async fn authorize_manual(
        &self,
        cancel: &CancellationToken,
        request: AuthorizeRequest,
    ) -> Result<Authorization> {
        let api = Arc::clone(&self.api);
        self.execute(cancel, GatewayOperation::Authorize, async move {
            api.authorize_manual(request).await
        })
        .await
    }

    async fn capture(&self, cancel: &CancellationToken, external_id: &str) -> Result<()> {
        let api = Arc::clone(&self.api);
        let external_id = external_id.to_string();
        self.execute(cancel, GatewayOperation::Capture, async move {
            api.capture(&external_id).await
        })
        .await
    }

    async fn cancel(&self, cancel: &CancellationToken, external_id: &str) -> Result<()> {
        let api = Arc::clone(&self.api);
        let external_id = external_id.to_string();
        self.execute(cancel, GatewayOperation::Cancel, async move {
            api.cancel(&external_id).await
        })
        .await
    }

    async fn refund(&self, cancel: &CancellationToken, external_id: &str) -> Result<()> {
        let api = Arc::clone(&self.api);
        let external_id = external_id.to_string();
        self.execute(cancel, GatewayOperation::Refund, async move {
            api.refund(&external_id).await
        })
        .await
    }

    fn verify_webhook_signature(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<ProcessorEvent> {
        self.verifier.verify(payload, signature_header)
    }
}
