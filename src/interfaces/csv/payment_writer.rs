use crate::domain::payment::{Payment, PaymentStatus};
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

/// Final state of one scripted payment.
#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct PaymentRecord {
    #[serde(rename = "ref")]
    pub reference: String,
    pub id: String,
    pub status: PaymentStatus,
    pub amount: i64,
    pub currency: String,
    pub email: String,
    pub external_id: String,
}

impl PaymentRecord {
    pub fn new(reference: &str, payment: &Payment) -> Self {
        Self {
            reference: reference.to_string(),
            id: payment.id().to_string(),
            status: payment.status(),
            amount: payment.amount(),
            currency: payment.currency().to_string(),
            email: payment.email().as_str().to_string(),
            external_id: payment.external_id().unwrap_or_default().to_string(),
        }
    }
}

pub struct PaymentWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> PaymentWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_payments(&mut self, records: impl IntoIterator<Item = PaymentRecord>) -> Result<()> {
        for record in records {
            self.writer.serialize(record)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
