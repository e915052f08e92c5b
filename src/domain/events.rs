use super::payment::{Payment, PaymentId};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
pub enum PaymentEventKind {
    #[serde(rename = "payment.authorized")]
    Authorized,
    #[serde(rename = "payment.captured")]
    Captured,
    #[serde(rename = "payment.failed")]
    Failed,
    #[serde(rename = "payment.canceled")]
    Canceled,
}

impl fmt::Display for PaymentEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Authorized => "payment.authorized",
            Self::Captured => "payment.captured",
            Self::Failed => "payment.failed",
            Self::Canceled => "payment.canceled",
        })
    }
}

/// Emitted after a saga transition has been persisted.
#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct PaymentEvent {
    pub kind: PaymentEventKind,
    pub payment_id: PaymentId,
    pub meta: BTreeMap<String, String>,
}

impl PaymentEvent {
    pub fn from_payment(kind: PaymentEventKind, payment: &Payment) -> Self {
        let mut meta = BTreeMap::new();
        meta.insert("status".to_string(), payment.status().to_string());
        meta.insert("amount".to_string(), payment.amount().to_string());
        meta.insert("currency".to_string(), payment.currency().to_string());
        if let Some(external_id) = payment.external_id() {
            meta.insert("external_id".to_string(), external_id.to_string());
        }
        Self {
            kind,
            payment_id: payment.id().clone(),
            meta,
        }
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<String>) -> Self {
        self.meta.insert(key.to_string(), value.into());
        self
    }
}
