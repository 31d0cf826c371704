//! Result shapes of the ATM use cases, ready for any transport to serialize.

use crate::domain::card::CardStatus;
use crate::domain::transaction::{Transaction, TransactionStatus, TransactionType};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
    pub holder_name: String,
    pub account_number: String,
    pub masked_card_number: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceResponse {
    pub holder_name: String,
    pub account_number: String,
    pub current_balance: Decimal,
    pub last_withdrawal_date: Option<DateTime<Utc>>,
    pub inquired_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WithdrawResponse {
    pub transaction_id: Uuid,
    pub withdrawn_amount: Decimal,
    pub previous_balance: Decimal,
    pub new_balance: Decimal,
    pub account_number: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionView {
    pub id: Uuid,
    pub r#type: TransactionType,
    pub type_label: &'static str,
    pub amount: Decimal,
    pub description: String,
    pub date: DateTime<Utc>,
    pub balance_after: Option<Decimal>,
    pub status: TransactionStatus,
}

impl From<&Transaction> for TransactionView {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: tx.id(),
            r#type: tx.r#type(),
            type_label: tx.r#type().label(),
            amount: tx.amount(),
            description: tx.description().to_string(),
            date: tx.created_at(),
            balance_after: tx.balance_after(),
            status: tx.status(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub current_page: u32,
    pub page_size: u32,
    pub total_records: usize,
    pub total_pages: u32,
    pub has_next: bool,
    pub has_previous: bool,
}

impl Pagination {
    /// Derives page metadata; `page_size` must be at least 1.
    pub fn new(current_page: u32, page_size: u32, total_records: usize) -> Self {
        let size = page_size.max(1) as usize;
        let total_pages = total_records.div_ceil(size) as u32;
        Self {
            current_page,
            page_size,
            total_records,
            total_pages,
            has_next: current_page < total_pages,
            has_previous: current_page > 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountSummary {
    pub account_number: String,
    pub holder_name: String,
    pub current_balance: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationsResponse {
    pub items: Vec<TransactionView>,
    pub pagination: Pagination,
    pub account_summary: AccountSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnblockResponse {
    pub masked_card_number: String,
    pub holder_name: String,
    pub status: CardStatus,
    pub unblocked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub account_number: String,
    pub masked_card_number: String,
    pub first_name: String,
    pub last_name: String,
    pub initial_balance: Decimal,
    pub expiry_date: DateTime<Utc>,
    pub registered_at: DateTime<Utc>,
}
