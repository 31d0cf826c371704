use crate::error::{AtmError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fmt;
use std::io::Read;

#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum ScriptOp {
    Register,
    Login,
    Balance,
    Withdraw,
    Operations,
    Unblock,
    Check,
}

impl ScriptOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Login => "login",
            Self::Balance => "balance",
            Self::Withdraw => "withdraw",
            Self::Operations => "operations",
            Self::Unblock => "unblock",
            Self::Check => "check",
        }
    }
}

impl fmt::Display for ScriptOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of an ATM script. Columns an operation does not use stay empty.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct CommandRow {
    pub op: ScriptOp,
    pub card: String,
    #[serde(default)]
    pub pin: Option<String>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub document: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub expiry: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
}

/// Reads ATM commands from a CSV source.
///
/// Whitespace is trimmed and short rows are accepted, so a `login` line only
/// needs its first three columns.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes one command per record.
    pub fn commands(self) -> impl Iterator<Item = Result<CommandRow>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(AtmError::from))
    }
}
