use crate::error::{PaymentError, Result};
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize, PartialEq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    Authorize,
    Capture,
    Cancel,
    /// Processor notifications, delivered through the signed webhook path.
    RequiresCapture,
    Succeeded,
    Canceled,
}

/// One row of a payment script. `reference` is a label local to the script.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct Command {
    pub op: CommandType,
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Reads script commands from a CSV source with header `op, ref, amount, currency, email`.
///
/// Whitespace is trimmed and short rows are accepted, so `capture, p1` is a valid line.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    /// Creates a new `CommandReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily reads and deserializes commands.
    pub fn commands(self) -> impl Iterator<Item = Result<Command>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(PaymentError::from))
    }
}
