use super::account::Account;
use super::card::Card;
use super::transaction::Transaction;
use super::user::User;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Versioned aggregates: `update` succeeds only when the stored version equals
/// the version carried by the argument, otherwise it fails with
/// `AtmError::VersionConflict`. `add` fails with `AtmError::Conflict` on a
/// duplicate unique key.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn add(&self, account: Account) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<Account>>;
    async fn get_by_number(&self, account_number: &str) -> Result<Option<Account>>;
    async fn exists_by_number(&self, account_number: &str) -> Result<bool>;
    /// Returns the account as stored, with its new version.
    async fn update(&self, account: &Account) -> Result<Account>;
}

#[async_trait]
pub trait CardStore: Send + Sync {
    async fn add(&self, card: Card) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<Card>>;
    async fn get_by_number(&self, card_number: &str) -> Result<Option<Card>>;
    async fn exists_by_number(&self, card_number: &str) -> Result<bool>;
    async fn update(&self, card: &Card) -> Result<Card>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn add(&self, user: User) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<User>>;
    async fn get_by_document(&self, document_number: &str) -> Result<Option<User>>;
    async fn exists_by_document(&self, document_number: &str) -> Result<bool>;
}

/// Append-only transaction history.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn append(&self, tx: Transaction) -> Result<()>;
    /// Newest first. Returns the page and the total count for the account.
    async fn page_by_account(
        &self,
        account_id: Uuid,
        skip: usize,
        limit: usize,
    ) -> Result<(Vec<Transaction>, usize)>;
    async fn last_withdrawal(&self, account_id: Uuid) -> Result<Option<Transaction>>;
}

/// Multi-entity writes that land as one unit: either all are durable or none is.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    /// Writes a debited account and its ledger entry.
    async fn commit_withdrawal(&self, account: &Account, tx: Transaction) -> Result<Account>;
    /// Inserts a new customer's user, account and card. Fails with
    /// `AtmError::Conflict` if any of their unique keys is taken.
    async fn commit_registration(&self, user: User, account: Account, card: Card) -> Result<()>;
}

pub trait PinHasher: Send + Sync {
    fn hash_pin(&self, pin: &str) -> Result<String>;
    fn verify_pin(&self, pin: &str, hashed_pin: &str) -> bool;
}

/// The authenticated party behind a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    pub user_id: Uuid,
    pub card_number: String,
    pub account_number: String,
}

pub trait TokenIssuer: Send + Sync {
    fn generate_token(&self, user_id: Uuid, card_number: &str, account_number: &str)
    -> Result<String>;
    fn expiration_seconds(&self) -> u64;
    fn verify(&self, token: &str) -> Result<CallerIdentity>;
}

pub trait OwnershipChecker: Send + Sync {
    fn owns_card(&self, caller: &CallerIdentity, card_number: &str) -> bool;
}

pub type AccountStoreRef = Arc<dyn AccountStore>;
pub type CardStoreRef = Arc<dyn CardStore>;
pub type UserStoreRef = Arc<dyn UserStore>;
pub type TransactionStoreRef = Arc<dyn TransactionStore>;
pub type UnitOfWorkRef = Arc<dyn UnitOfWork>;
pub type PinHasherRef = Arc<dyn PinHasher>;
pub type TokenIssuerRef = Arc<dyn TokenIssuer>;
pub type OwnershipCheckerRef = Arc<dyn OwnershipChecker>;

/// All persistence ports, usually backed by a single store value.
#[derive(Clone)]
pub struct Stores {
    pub users: UserStoreRef,
    pub accounts: AccountStoreRef,
    pub cards: CardStoreRef,
    pub transactions: TransactionStoreRef,
    pub unit_of_work: UnitOfWorkRef,
}

impl Stores {
    pub fn from_backend<S>(store: S) -> Self
    where
        S: UserStore + AccountStore + CardStore + TransactionStore + UnitOfWork + Clone + 'static,
    {
        Self {
            users: Arc::new(store.clone()),
            accounts: Arc::new(store.clone()),
            cards: Arc::new(store.clone()),
            transactions: Arc::new(store.clone()),
            unit_of_work: Arc::new(store),
        }
    }
}
