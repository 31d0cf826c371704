use rust_decimal::Decimal;
use thiserror::Error;

/// Every failure an ATM operation can surface.
///
/// Domain kinds carry their structured payload so a transport can map them to
/// status codes without parsing messages. Anything unexpected (storage outage,
/// corrupt record) collapses into [`AtmError::Internal`].
#[derive(Error, Debug)]
pub enum AtmError {
    #[error("Caller is not allowed to operate this card")]
    Unauthorized,
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Invalid PIN, {remaining_attempts} attempts remaining")]
    InvalidPin { remaining_attempts: u32 },
    #[error("Card {card_number} is blocked")]
    CardBlocked { card_number: String },
    #[error("Card is not active")]
    CardInactive,
    #[error("Account is not active")]
    AccountInactive,
    #[error("Amount must be greater than zero")]
    InvalidAmount,
    #[error("Insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds {
        requested: Decimal,
        available: Decimal,
    },
    #[error("Card is not blocked")]
    NotBlocked,
    #[error("Expiry date must be in the future")]
    InvalidExpiry,
    #[error("Card not found")]
    CardNotFound,
    #[error("Document number does not match the card holder")]
    DocumentMismatch,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Concurrent update on {entity}, retries exhausted")]
    VersionConflict { entity: &'static str },
    #[error("Internal error: {0}")]
    Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl AtmError {
    /// Stable machine-readable code for the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::Validation(_) => "validation_error",
            Self::InvalidPin { .. } => "invalid_pin",
            Self::CardBlocked { .. } => "card_blocked",
            Self::CardInactive => "card_inactive",
            Self::AccountInactive => "account_inactive",
            Self::InvalidAmount => "invalid_amount",
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::NotBlocked => "card_not_blocked",
            Self::InvalidExpiry => "invalid_expiry",
            Self::CardNotFound => "card_not_found",
            Self::DocumentMismatch => "document_mismatch",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::VersionConflict { .. } => "version_conflict",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Only optimistic-concurrency failures are worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(Box::new(std::io::Error::other(message.into())))
    }
}

impl From<std::io::Error> for AtmError {
    fn from(e: std::io::Error) -> Self {
        Self::Internal(Box::new(e))
    }
}

impl From<csv::Error> for AtmError {
    fn from(e: csv::Error) -> Self {
        Self::Internal(Box::new(e))
    }
}

impl From<serde_json::Error> for AtmError {
    fn from(e: serde_json::Error) -> Self {
        Self::Internal(Box::new(e))
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for AtmError {
    fn from(e: rocksdb::Error) -> Self {
        Self::Internal(Box::new(e))
    }
}

pub type Result<T> = std::result::Result<T, AtmError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_error_codes_are_distinct_per_kind() {
        let blocked = AtmError::CardBlocked {
            card_number: "****-****-****-0101".to_string(),
        };
        let funds = AtmError::InsufficientFunds {
            requested: dec!(100),
            available: dec!(50),
        };
        assert_eq!(blocked.code(), "card_blocked");
        assert_eq!(funds.code(), "insufficient_funds");
        assert_eq!(
            funds.to_string(),
            "Insufficient funds: requested 100, available 50"
        );
    }

    #[test]
    fn test_only_version_conflict_is_transient() {
        assert!(AtmError::VersionConflict { entity: "card" }.is_transient());
        assert!(!AtmError::Unauthorized.is_transient());
        assert!(!AtmError::internal("disk full").is_transient());
    }

    #[test]
    fn test_io_error_becomes_internal() {
        let err: AtmError = std::io::Error::other("boom").into();
        assert_eq!(err.code(), "internal_error");
    }
}
