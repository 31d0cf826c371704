use crate::domain::ports::TransactionStoreRef;
use crate::domain::transaction::Transaction;
use crate::error::{AtmError, Result};
use uuid::Uuid;

/// One page of an account's history plus the account's total entry count.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryPage {
    pub items: Vec<Transaction>,
    pub total_count: usize,
}

/// Append-only, queryable ledger of everything that touched an account,
/// rejected withdrawals included.
#[derive(Clone)]
pub struct TransactionRecorder {
    store: TransactionStoreRef,
}

impl TransactionRecorder {
    pub fn new(store: TransactionStoreRef) -> Self {
        Self { store }
    }

    pub async fn append(&self, tx: Transaction) -> Result<()> {
        tracing::debug!(
            account_id = %tx.account_id(),
            tx_type = ?tx.r#type(),
            status = ?tx.status(),
            "recording transaction"
        );
        self.store.append(tx).await
    }

    /// Newest entries first. Pages are 1-based.
    pub async fn page_by_account(
        &self,
        account_id: Uuid,
        page_number: u32,
        page_size: u32,
    ) -> Result<HistoryPage> {
        if page_number < 1 {
            return Err(AtmError::Validation(
                "page number must be at least 1".to_string(),
            ));
        }
        if page_size < 1 {
            return Err(AtmError::Validation(
                "page size must be at least 1".to_string(),
            ));
        }

        let skip = (page_number as usize - 1) * page_size as usize;
        let (items, total_count) = self
            .store
            .page_by_account(account_id, skip, page_size as usize)
            .await?;
        Ok(HistoryPage { items, total_count })
    }

    /// Most recent completed withdrawal, if any.
    pub async fn last_withdrawal(&self, account_id: Uuid) -> Result<Option<Transaction>> {
        self.store.last_withdrawal(account_id).await
    }
}
