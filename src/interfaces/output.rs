use crate::domain::card::mask_card_number;
use crate::error::AtmError;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;

/// Transport-safe rendering of an [`AtmError`].
///
/// Card numbers are masked. Internal failures lose every detail.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available: Option<Decimal>,
}

impl From<&AtmError> for ErrorBody {
    fn from(error: &AtmError) -> Self {
        let mut body = Self {
            code: error.code(),
            message: error.to_string(),
            remaining_attempts: None,
            card: None,
            requested: None,
            available: None,
        };
        match error {
            AtmError::InvalidPin { remaining_attempts } => {
                body.remaining_attempts = Some(*remaining_attempts);
            }
            AtmError::CardBlocked { card_number } => {
                let masked = mask_card_number(card_number);
                body.message = format!("Card {masked} is blocked");
                body.card = Some(masked);
            }
            AtmError::InsufficientFunds {
                requested,
                available,
            } => {
                body.requested = Some(*requested);
                body.available = Some(*available);
            }
            AtmError::Internal(_) => body.message = "Internal error".to_string(),
            _ => {}
        }
        body
    }
}

/// One line of script output: either `ok` or `error` is present.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputLine {
    pub op: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ok: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl OutputLine {
    pub fn ok(op: &'static str, value: Value) -> Self {
        Self {
            op,
            ok: Some(value),
            error: None,
        }
    }

    pub fn error(op: &'static str, error: &AtmError) -> Self {
        Self {
            op,
            ok: None,
            error: Some(ErrorBody::from(error)),
        }
    }
}
