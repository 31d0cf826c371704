use crate::error::{AtmError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Withdrawal,
    BalanceInquiry,
}

impl TransactionType {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Withdrawal => "Withdrawal",
            Self::BalanceInquiry => "Balance inquiry",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Completed,
    Failed,
}

/// An immutable ledger entry.
///
/// Built only through the named constructors below; there is no way to change
/// a transaction after it exists.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Transaction {
    id: Uuid,
    account_id: Uuid,
    card_id: Option<Uuid>,
    r#type: TransactionType,
    amount: Decimal,
    description: String,
    status: TransactionStatus,
    created_at: DateTime<Utc>,
    balance_after: Option<Decimal>,
}

impl Transaction {
    #[allow(clippy::too_many_arguments)]
    fn new(
        account_id: Uuid,
        card_id: Option<Uuid>,
        r#type: TransactionType,
        amount: Decimal,
        description: &str,
        status: TransactionStatus,
        balance_after: Option<Decimal>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let description = crate::domain::user::required(description, "description")?;
        if r#type == TransactionType::Withdrawal && amount <= Decimal::ZERO {
            return Err(AtmError::Validation(
                "withdrawals must carry a positive amount".to_string(),
            ));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            account_id,
            card_id,
            r#type,
            amount,
            description,
            status,
            created_at: now,
            balance_after,
        })
    }

    pub fn withdrawal_completed(
        account_id: Uuid,
        card_id: Uuid,
        amount: Decimal,
        balance_after: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        Self::new(
            account_id,
            Some(card_id),
            TransactionType::Withdrawal,
            amount,
            "ATM withdrawal - confirmed",
            TransactionStatus::Completed,
            Some(balance_after),
            now,
        )
    }

    /// A rejected withdrawal; `balance_after` is the untouched balance.
    pub fn withdrawal_failed(
        account_id: Uuid,
        card_id: Uuid,
        amount: Decimal,
        balance_after: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        Self::new(
            account_id,
            Some(card_id),
            TransactionType::Withdrawal,
            amount,
            "ATM withdrawal - rejected: insufficient funds",
            TransactionStatus::Failed,
            Some(balance_after),
            now,
        )
    }

    pub fn balance_inquiry(
        account_id: Uuid,
        card_id: Uuid,
        current_balance: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        Self::new(
            account_id,
            Some(card_id),
            TransactionType::BalanceInquiry,
            Decimal::ZERO,
            "Balance inquiry",
            TransactionStatus::Completed,
            Some(current_balance),
            now,
        )
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn account_id(&self) -> Uuid {
        self.account_id
    }

    pub fn card_id(&self) -> Option<Uuid> {
        self.card_id
    }

    pub fn r#type(&self) -> TransactionType {
        self.r#type
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn balance_after(&self) -> Option<Decimal> {
        self.balance_after
    }

    pub fn is_completed_withdrawal(&self) -> bool {
        self.r#type == TransactionType::Withdrawal && self.status == TransactionStatus::Completed
    }
}
