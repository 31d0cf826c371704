use crate::domain::account::Account;
use crate::domain::card::Card;
use crate::domain::ports::{AccountStore, CardStore, TransactionStore, UnitOfWork, UserStore};
use crate::domain::transaction::Transaction;
use crate::domain::user::User;
use crate::error::{AtmError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct State {
    users: HashMap<Uuid, User>,
    documents: HashMap<String, Uuid>,
    accounts: HashMap<Uuid, Account>,
    account_numbers: HashMap<String, Uuid>,
    cards: HashMap<Uuid, Card>,
    card_numbers: HashMap<String, Uuid>,
    /// Append order.
    transactions: Vec<Transaction>,
}

impl State {
    fn check_new_user(&self, user: &User) -> Result<()> {
        if self.documents.contains_key(user.document_number()) {
            return Err(AtmError::Conflict(
                "a user with this document number already exists".to_string(),
            ));
        }
        Ok(())
    }

    fn check_new_account(&self, account: &Account) -> Result<()> {
        if self.account_numbers.contains_key(account.account_number()) {
            return Err(AtmError::Conflict(
                "an account with this number already exists".to_string(),
            ));
        }
        Ok(())
    }

    fn check_new_card(&self, card: &Card) -> Result<()> {
        if self.card_numbers.contains_key(card.card_number()) {
            return Err(AtmError::Conflict(
                "a card with this number already exists".to_string(),
            ));
        }
        Ok(())
    }

    fn insert_user(&mut self, user: User) {
        self.documents
            .insert(user.document_number().to_string(), user.id());
        self.users.insert(user.id(), user);
    }

    fn insert_account(&mut self, account: Account) {
        self.account_numbers
            .insert(account.account_number().to_string(), account.id());
        self.accounts.insert(account.id(), account);
    }

    fn insert_card(&mut self, card: Card) {
        self.card_numbers
            .insert(card.card_number().to_string(), card.id());
        self.cards.insert(card.id(), card);
    }

    fn check_account_version(&self, account: &Account) -> Result<()> {
        let stored = self
            .accounts
            .get(&account.id())
            .ok_or(AtmError::NotFound("account"))?;
        if stored.version() != account.version() {
            return Err(AtmError::VersionConflict { entity: "account" });
        }
        Ok(())
    }
}

/// A thread-safe in-memory store implementing every persistence port.
///
/// All collections sit behind one `Arc<RwLock<..>>`, so a withdrawal commit
/// (account write plus ledger append) happens under a single write guard.
/// Ideal for testing or single-node deployments where persistence is not required.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn add(&self, user: User) -> Result<()> {
        let mut state = self.state.write().await;
        state.check_new_user(&user)?;
        state.insert_user(user);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<User>> {
        let state = self.state.read().await;
        Ok(state.users.get(&id).cloned())
    }

    async fn get_by_document(&self, document_number: &str) -> Result<Option<User>> {
        let state = self.state.read().await;
        Ok(state
            .documents
            .get(document_number)
            .and_then(|id| state.users.get(id))
            .cloned())
    }

    async fn exists_by_document(&self, document_number: &str) -> Result<bool> {
        let state = self.state.read().await;
        Ok(state.documents.contains_key(document_number))
    }
}

#[async_trait]
impl AccountStore for InMemoryStore {
    async fn add(&self, account: Account) -> Result<()> {
        let mut state = self.state.write().await;
        state.check_new_account(&account)?;
        state.insert_account(account);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Account>> {
        let state = self.state.read().await;
        Ok(state.accounts.get(&id).cloned())
    }

    async fn get_by_number(&self, account_number: &str) -> Result<Option<Account>> {
        let state = self.state.read().await;
        Ok(state
            .account_numbers
            .get(account_number)
            .and_then(|id| state.accounts.get(id))
            .cloned())
    }

    async fn exists_by_number(&self, account_number: &str) -> Result<bool> {
        let state = self.state.read().await;
        Ok(state.account_numbers.contains_key(account_number))
    }

    async fn update(&self, account: &Account) -> Result<Account> {
        let mut state = self.state.write().await;
        state.check_account_version(account)?;
        let mut stored = account.clone();
        stored.advance_version();
        state.accounts.insert(stored.id(), stored.clone());
        Ok(stored)
    }
}

#[async_trait]
impl CardStore for InMemoryStore {
    async fn add(&self, card: Card) -> Result<()> {
        let mut state = self.state.write().await;
        state.check_new_card(&card)?;
        state.insert_card(card);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Card>> {
        let state = self.state.read().await;
        Ok(state.cards.get(&id).cloned())
    }

    async fn get_by_number(&self, card_number: &str) -> Result<Option<Card>> {
        let state = self.state.read().await;
        Ok(state
            .card_numbers
            .get(card_number)
            .and_then(|id| state.cards.get(id))
            .cloned())
    }

    async fn exists_by_number(&self, card_number: &str) -> Result<bool> {
        let state = self.state.read().await;
        Ok(state.card_numbers.contains_key(card_number))
    }

    async fn update(&self, card: &Card) -> Result<Card> {
        let mut state = self.state.write().await;
        let stored = state
            .cards
            .get(&card.id())
            .ok_or(AtmError::NotFound("card"))?;
        if stored.version() != card.version() {
            return Err(AtmError::VersionConflict { entity: "card" });
        }
        let mut stored = card.clone();
        stored.advance_version();
        state.cards.insert(stored.id(), stored.clone());
        Ok(stored)
    }
}

#[async_trait]
impl TransactionStore for InMemoryStore {
    async fn append(&self, tx: Transaction) -> Result<()> {
        let mut state = self.state.write().await;
        state.transactions.push(tx);
        Ok(())
    }

    async fn page_by_account(
        &self,
        account_id: Uuid,
        skip: usize,
        limit: usize,
    ) -> Result<(Vec<Transaction>, usize)> {
        let state = self.state.read().await;
        // Newest appended first, then a stable sort keeps that order among equal timestamps.
        let mut history: Vec<&Transaction> = state
            .transactions
            .iter()
            .rev()
            .filter(|tx| tx.account_id() == account_id)
            .collect();
        history.sort_by(|a, b| b.created_at().cmp(&a.created_at()));

        let total = history.len();
        let page = history.into_iter().skip(skip).take(limit).cloned().collect();
        Ok((page, total))
    }

    async fn last_withdrawal(&self, account_id: Uuid) -> Result<Option<Transaction>> {
        let state = self.state.read().await;
        Ok(state
            .transactions
            .iter()
            .filter(|tx| tx.account_id() == account_id && tx.is_completed_withdrawal())
            .max_by_key(|tx| tx.created_at())
            .cloned())
    }
}

#[async_trait]
impl UnitOfWork for InMemoryStore {
    async fn commit_withdrawal(&self, account: &Account, tx: Transaction) -> Result<Account> {
        let mut state = self.state.write().await;
        state.check_account_version(account)?;
        let mut stored = account.clone();
        stored.advance_version();
        state.accounts.insert(stored.id(), stored.clone());
        state.transactions.push(tx);
        Ok(stored)
    }

    async fn commit_registration(&self, user: User, account: Account, card: Card) -> Result<()> {
        let mut state = self.state.write().await;
        state.check_new_user(&user)?;
        state.check_new_account(&account)?;
        state.check_new_card(&card)?;
        state.insert_user(user);
        state.insert_account(account);
        state.insert_card(card);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::Balance;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    fn account() -> Account {
        Account::new("1234567890", Uuid::new_v4(), dec!(100), Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn test_in_memory_account_store() {
        let store = InMemoryStore::new();
        let account = account();

        AccountStore::add(&store, account.clone()).await.unwrap();
        let retrieved = AccountStore::get(&store, account.id()).await.unwrap().unwrap();
        assert_eq!(retrieved, account);

        let by_number = AccountStore::get_by_number(&store, "1234567890").await.unwrap();
        assert_eq!(by_number, Some(account));
        assert!(AccountStore::exists_by_number(&store, "1234567890").await.unwrap());

        assert!(AccountStore::get(&store, Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_account_number_conflicts() {
        let store = InMemoryStore::new();
        AccountStore::add(&store, account()).await.unwrap();
        let result = AccountStore::add(&store, account()).await;
        assert!(matches!(result, Err(AtmError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_stale_account_update_is_rejected() {
        let store = InMemoryStore::new();
        let account = account();
        AccountStore::add(&store, account.clone()).await.unwrap();

        let first = AccountStore::update(&store, &account).await.unwrap();
        assert_eq!(first.version(), 1);

        // Second writer still holds version 0.
        let result = AccountStore::update(&store, &account).await;
        assert!(matches!(
            result,
            Err(AtmError::VersionConflict { entity: "account" })
        ));
    }

    #[tokio::test]
    async fn test_commit_withdrawal_writes_account_and_transaction() {
        let store = InMemoryStore::new();
        let mut account = account();
        AccountStore::add(&store, account.clone()).await.unwrap();

        account.debit(dec!(40).try_into().unwrap(), Utc::now());
        let tx = Transaction::withdrawal_completed(
            account.id(),
            Uuid::new_v4(),
            dec!(40),
            dec!(60),
            Utc::now(),
        )
        .unwrap();
        store.commit_withdrawal(&account, tx.clone()).await.unwrap();

        let stored = AccountStore::get(&store, account.id()).await.unwrap().unwrap();
        assert_eq!(stored.balance(), Balance::new(dec!(60)));
        assert_eq!(store.last_withdrawal(account.id()).await.unwrap(), Some(tx));

        // A stale commit writes neither half.
        let stale = Transaction::withdrawal_completed(
            account.id(),
            Uuid::new_v4(),
            dec!(10),
            dec!(50),
            Utc::now(),
        )
        .unwrap();
        assert!(store.commit_withdrawal(&account, stale).await.is_err());
        let (_, total) = store.page_by_account(account.id(), 0, 10).await.unwrap();
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn test_page_by_account_is_newest_first() {
        let store = InMemoryStore::new();
        let account_id = Uuid::new_v4();
        let start = Utc::now();
        for minutes in 0..5 {
            let tx = Transaction::balance_inquiry(
                account_id,
                Uuid::new_v4(),
                dec!(10),
                start + Duration::minutes(minutes),
            )
            .unwrap();
            store.append(tx).await.unwrap();
        }
        store
            .append(
                Transaction::balance_inquiry(Uuid::new_v4(), Uuid::new_v4(), dec!(1), start)
                    .unwrap(),
            )
            .await
            .unwrap();

        let (page, total) = store.page_by_account(account_id, 2, 2).await.unwrap();
        assert_eq!(total, 5);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].created_at(), start + Duration::minutes(2));
        assert_eq!(page[1].created_at(), start + Duration::minutes(1));
    }

    #[tokio::test]
    async fn test_last_withdrawal_ignores_failed_attempts() {
        let store = InMemoryStore::new();
        let account_id = Uuid::new_v4();
        let card_id = Uuid::new_v4();
        let now = Utc::now();

        let completed =
            Transaction::withdrawal_completed(account_id, card_id, dec!(10), dec!(90), now)
                .unwrap();
        let failed = Transaction::withdrawal_failed(
            account_id,
            card_id,
            dec!(500),
            dec!(90),
            now + Duration::minutes(1),
        )
        .unwrap();
        store.append(completed.clone()).await.unwrap();
        store.append(failed).await.unwrap();

        assert_eq!(store.last_withdrawal(account_id).await.unwrap(), Some(completed));
        assert!(store.last_withdrawal(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_commit_registration_is_all_or_nothing() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        AccountStore::add(&store, account()).await.unwrap();

        let user = User::new("Ada", "Lovelace", "12345678", now).unwrap();
        let clashing = Account::new("1234567890", user.id(), dec!(50), now).unwrap();
        let card = Card::new("4001234567890101", "hash", user.id(), clashing.id(), now).unwrap();
        let result = store
            .commit_registration(user.clone(), clashing, card.clone())
            .await;
        assert!(matches!(result, Err(AtmError::Conflict(_))));
        assert!(!store.exists_by_document("12345678").await.unwrap());
        assert!(!CardStore::exists_by_number(&store, "4001234567890101").await.unwrap());

        let fresh = Account::new("1234567891", user.id(), dec!(50), now).unwrap();
        store.commit_registration(user, fresh, card).await.unwrap();
        assert!(store.exists_by_document("12345678").await.unwrap());
        assert!(AccountStore::exists_by_number(&store, "1234567891").await.unwrap());
        assert!(CardStore::exists_by_number(&store, "4001234567890101").await.unwrap());
    }
}
