//! Drives the service and the webhook reconciler from script commands.

use crate::application::reconciliation::{WebhookOutcome, WebhookReconciler};
use crate::application::service::{CreatePayment, PaymentService};
use crate::domain::payment::{Payment, PaymentId};
use crate::domain::webhook::{IntentObject, NotificationKind, ProcessorEvent};
use crate::error::{PaymentError, Result};
use crate::infrastructure::signature::WebhookVerifier;
use crate::interfaces::csv::command_reader::{Command, CommandType};
use crate::interfaces::csv::payment_writer::PaymentRecord;
use chrono::Utc;
use log::*;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct ScriptRunner {
    service: Arc<PaymentService>,
    reconciler: Arc<WebhookReconciler>,
    signer: WebhookVerifier,
    cancel: CancellationToken,
    ids: HashMap<String, PaymentId>,
    order: Vec<String>,
    delivered: u64,
}

impl ScriptRunner {
    /// `signer` must hold the same secret the reconciler's gateway verifies with.
    pub fn new(
        service: Arc<PaymentService>,
        reconciler: Arc<WebhookReconciler>,
        signer: WebhookVerifier,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            service,
            reconciler,
            signer,
            cancel,
            ids: HashMap::new(),
            order: Vec::new(),
            delivered: 0,
        }
    }

    pub async fn apply(&mut self, command: Command) -> Result<()> {
        match command.op {
            CommandType::Authorize => self.authorize(command).await,
            CommandType::Capture => {
                let id = self.resolve(&command.reference)?;
                self.service.capture(&self.cancel, &id).await.map(drop)
            }
            CommandType::Cancel => {
                let id = self.resolve(&command.reference)?;
                self.service.cancel(&self.cancel, &id).await.map(drop)
            }
            CommandType::RequiresCapture => {
                self.deliver(&command.reference, NotificationKind::RequiresCapture)
                    .await
            }
            CommandType::Succeeded => {
                self.deliver(&command.reference, NotificationKind::Succeeded)
                    .await
            }
            CommandType::Canceled => {
                self.deliver(&command.reference, NotificationKind::Canceled)
                    .await
            }
        }
    }

    /// Current state of every scripted payment, in the order they were first authorized.
    pub async fn records(&self) -> Result<Vec<PaymentRecord>> {
        let mut records = Vec::with_capacity(self.order.len());
        for reference in &self.order {
            let payment = self.service.get(&self.resolve(reference)?).await?;
            records.push(PaymentRecord::new(reference, &payment));
        }
        Ok(records)
    }

    async fn authorize(&mut self, command: Command) -> Result<()> {
        if self.ids.contains_key(&command.reference) {
            return Err(PaymentError::AlreadyExists(command.reference));
        }
        let input = CreatePayment {
            amount: command.amount.ok_or_else(|| missing("amount", &command))?,
            currency: command.currency.clone().ok_or_else(|| missing("currency", &command))?,
            email: command.email.clone().ok_or_else(|| missing("email", &command))?,
        };
        let payment = self.service.create(input).await?;
        let id = payment.id().clone();
        self.ids.insert(command.reference.clone(), id.clone());
        self.order.push(command.reference);
        self.service.authorize(&self.cancel, &id).await.map(drop)
    }

    async fn deliver(&mut self, reference: &str, kind: NotificationKind) -> Result<()> {
        let id = self.resolve(reference)?;
        let payment = self.service.get(&id).await?;
        let intent = intent_of(&payment)?;

        self.delivered += 1;
        let event = ProcessorEvent::new(format!("evt_script_{}", self.delivered), kind, intent);
        let payload = serde_json::to_vec(&event)?;
        let header = self.signer.sign(&payload, Utc::now().timestamp())?;

        match self.reconciler.handle_event(&payload, &header).await? {
            WebhookOutcome::Applied(status) => {
                debug!("Notification for {reference} applied, payment is now {status}")
            }
            WebhookOutcome::Ignored(reason) => {
                info!("Notification for {reference} ignored: {reason}")
            }
        }
        Ok(())
    }

    fn resolve(&self, reference: &str) -> Result<PaymentId> {
        self.ids
            .get(reference)
            .cloned()
            .ok_or_else(|| PaymentError::NotFound(format!("script reference {reference}")))
    }
}

fn intent_of(payment: &Payment) -> Result<IntentObject> {
    let id = payment.external_id().ok_or_else(|| {
        PaymentError::ValidationError(format!(
            "payment {} has no processor intent to notify about",
            payment.id()
        ))
    })?;
    Ok(IntentObject {
        id: id.to_string(),
        client_secret: payment.client_secret().map(str::to_string),
    })
}

fn missing(field: &str, command: &Command) -> PaymentError {
    PaymentError::ValidationError(format!(
        "authorize {} is missing {field}",
        command.reference
    ))
}
