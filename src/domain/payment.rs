use crate::error::{PaymentError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identity of a payment.
///
/// Backed by a UUIDv7: a millisecond timestamp prefix followed by random bits, so ids
/// sort by creation time and cannot be guessed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(Uuid);

impl PaymentId {
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for PaymentId {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| PaymentError::ValidationError(format!("invalid payment id '{s}': {e}")))
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Created,
    Authorized,
    Captured,
    Canceled,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Authorized => "authorized",
            Self::Captured => "captured",
            Self::Canceled => "canceled",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An amount in minor units (cents) and a lowercase ISO currency code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    amount: i64,
    currency: String,
}

impl Money {
    pub fn new(amount: i64, currency: &str) -> Result<Self> {
        if amount <= 0 {
            return Err(PaymentError::ValidationError(
                "amount must be > 0".to_string(),
            ));
        }
        let currency = currency.trim().to_lowercase();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(PaymentError::ValidationError(
                "currency must be a 3-letter code".to_string(),
            ));
        }
        Ok(Self { amount, currency })
    }

    pub fn amount(&self) -> i64 {
        self.amount
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }
}

/// A normalized (lower-cased) contact email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Email(String);

impl Email {
    pub fn parse(raw: &str) -> Result<Self> {
        let normalized = raw.trim().to_lowercase();
        if normalized.len() < 3 || !normalized.contains('@') {
            return Err(PaymentError::ValidationError("invalid email".to_string()));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The payment aggregate.
///
/// Status only changes through the transition methods below; each one checks the
/// current status and returns [`PaymentError::InvalidState`] instead of silently
/// doing nothing. `fail` is the exception: it is legal from any status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    id: PaymentId,
    amount: i64,
    currency: String,
    email: Email,
    status: PaymentStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    external_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    client_secret: Option<String>,
}

impl Payment {
    pub fn new(id: PaymentId, money: Money, email: Email) -> Self {
        let now = Utc::now();
        Self {
            id,
            amount: money.amount,
            currency: money.currency,
            email,
            status: PaymentStatus::Created,
            created_at: now,
            updated_at: now,
            external_id: None,
            client_secret: None,
        }
    }

    pub fn id(&self) -> &PaymentId {
        &self.id
    }

    pub fn amount(&self) -> i64 {
        self.amount
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn email(&self) -> &Email {
        &self.email
    }

    pub fn status(&self) -> PaymentStatus {
        self.status
    }

    /// Processor-assigned authorization id, present once authorized.
    pub fn external_id(&self) -> Option<&str> {
        self.external_id.as_deref()
    }

    pub fn client_secret(&self) -> Option<&str> {
        self.client_secret.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Records a processor hold. Failed payments may be authorized again.
    pub fn authorize(&mut self, external_id: String, client_secret: String) -> Result<()> {
        self.require("authorize", &[PaymentStatus::Created, PaymentStatus::Failed])?;
        self.external_id = Some(external_id);
        self.client_secret = Some(client_secret);
        self.transition(PaymentStatus::Authorized);
        Ok(())
    }

    pub fn capture(&mut self) -> Result<()> {
        self.require("capture", &[PaymentStatus::Authorized])?;
        self.transition(PaymentStatus::Captured);
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<()> {
        self.require("cancel", &[PaymentStatus::Created, PaymentStatus::Authorized])?;
        self.transition(PaymentStatus::Canceled);
        Ok(())
    }

    pub fn fail(&mut self) {
        self.transition(PaymentStatus::Failed);
    }

    pub fn refund(&mut self) -> Result<()> {
        self.require("refund", &[PaymentStatus::Captured])?;
        self.transition(PaymentStatus::Refunded);
        Ok(())
    }

    fn require(&self, operation: &'static str, allowed: &[PaymentStatus]) -> Result<()> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(PaymentError::InvalidState {
                operation,
                status: self.status,
            })
        }
    }

    fn transition(&mut self, status: PaymentStatus) {
        self.status = status;
        // Wall clock can step backwards; updated_at must not.
        self.updated_at = Utc::now().max(self.updated_at);
    }
}
