use crate::domain::payment::PaymentStatus;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PaymentError>;

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Invalid state for {operation}: payment is {status}")]
    InvalidState {
        operation: &'static str,
        status: PaymentStatus,
    },
    #[error("Risk rejection: amount {amount} is at or above the ceiling of {ceiling}")]
    RiskRejected { amount: i64, ceiling: i64 },
    #[error("Gateway declined: {0}")]
    GatewayDeclined(String),
    #[error("Gateway timeout: {0}")]
    GatewayTimeout(String),
    #[error("Operation cancelled after remote capture; refund issued")]
    Cancelled,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Already exists: {0}")]
    AlreadyExists(String),
    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Internal error: {0}")]
    InternalError(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Coarse classification the calling layer maps onto its own response codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    InvalidState,
    RiskRejected,
    GatewayDeclined,
    GatewayTimeout,
    NotFound,
    Conflict,
    InvalidSignature,
    Internal,
}

impl PaymentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ValidationError(_) => ErrorKind::Validation,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::RiskRejected { .. } => ErrorKind::RiskRejected,
            Self::GatewayDeclined(_) => ErrorKind::GatewayDeclined,
            Self::GatewayTimeout(_) | Self::Cancelled => ErrorKind::GatewayTimeout,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::AlreadyExists(_) => ErrorKind::Conflict,
            Self::InvalidSignature(_) => ErrorKind::InvalidSignature,
            Self::CsvError(_) | Self::IoError(_) | Self::InternalError(_) => ErrorKind::Internal,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError(Box::new(std::io::Error::other(message.into())))
    }
}

impl From<serde_json::Error> for PaymentError {
    fn from(e: serde_json::Error) -> Self {
        Self::InternalError(Box::new(e))
    }
}
