use crate::domain::account::Account;
use crate::domain::card::Card;
use crate::domain::ports::{AccountStore, CardStore, TransactionStore, UnitOfWork, UserStore};
use crate::domain::transaction::Transaction;
use crate::domain::user::User;
use crate::error::{AtmError, Result};
use async_trait::async_trait;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Column Family for card holders, keyed by user id.
pub const CF_USERS: &str = "users";
/// Column Family for account states, keyed by account id.
pub const CF_ACCOUNTS: &str = "accounts";
/// Column Family for cards, keyed by card id.
pub const CF_CARDS: &str = "cards";
/// Column Family for the ledger, keyed by account id + timestamp + append sequence.
pub const CF_TRANSACTIONS: &str = "transactions";
/// Column Family mapping unique business keys to entity ids.
pub const CF_INDEX: &str = "index";

const DOCUMENT_PREFIX: &str = "doc:";
const ACCOUNT_NUMBER_PREFIX: &str = "acct:";
const CARD_NUMBER_PREFIX: &str = "card:";
const LAST_WITHDRAWAL_PREFIX: &str = "lastwd:";
const TX_SEQUENCE_KEY: &[u8] = b"meta:tx_seq";

const USER_CONFLICT: &str = "a user with this document number already exists";
const ACCOUNT_CONFLICT: &str = "an account with this number already exists";
const CARD_CONFLICT: &str = "a card with this number already exists";

/// A persistent store implementation using RocksDB.
///
/// Every entity kind lives in its own Column Family, values are JSON. Writes
/// that check a version or a unique key go through `write_lock` and a single
/// `WriteBatch`, so a withdrawal commit lands atomically or not at all.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
    next_sequence: Arc<AtomicU64>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that all required column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = [CF_USERS, CF_ACCOUNTS, CF_CARDS, CF_TRANSACTIONS, CF_INDEX]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;
        let index = db
            .cf_handle(CF_INDEX)
            .ok_or_else(|| AtmError::internal("index column family not found"))?;
        let next_sequence = match db.get_cf(index, TX_SEQUENCE_KEY)? {
            Some(bytes) => decode_u64(&bytes)?,
            None => 0,
        };

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
            next_sequence: Arc::new(AtomicU64::new(next_sequence)),
        })
    }

    fn cf(&self, name: &'static str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| AtmError::internal(format!("{name} column family not found")))
    }

    fn get_json<T: DeserializeOwned>(&self, cf: &'static str, key: &[u8]) -> Result<Option<T>> {
        match self.db.get_cf(self.cf(cf)?, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn index_lookup(&self, prefix: &str, key: &str) -> Result<Option<Uuid>> {
        let index_key = format!("{prefix}{key}");
        match self.db.get_cf(self.cf(CF_INDEX)?, index_key.as_bytes())? {
            Some(bytes) => Uuid::from_slice(&bytes)
                .map(Some)
                .map_err(|e| AtmError::internal(format!("corrupt index entry: {e}"))),
            None => Ok(None),
        }
    }

    /// Callers must hold `write_lock` between this check and the write.
    fn ensure_unique(&self, prefix: &str, unique_key: &str, conflict: &str) -> Result<()> {
        if self.index_lookup(prefix, unique_key)?.is_some() {
            return Err(AtmError::Conflict(conflict.to_string()));
        }
        Ok(())
    }

    fn put_unique<T: Serialize>(
        &self,
        batch: &mut WriteBatch,
        cf: &'static str,
        id: Uuid,
        value: &T,
        prefix: &str,
        unique_key: &str,
    ) -> Result<()> {
        batch.put_cf(self.cf(cf)?, id.as_bytes(), serde_json::to_vec(value)?);
        batch.put_cf(
            self.cf(CF_INDEX)?,
            format!("{prefix}{unique_key}").as_bytes(),
            id.as_bytes(),
        );
        Ok(())
    }

    /// Inserts a new entity together with its unique-key index entry.
    async fn insert_unique<T: Serialize>(
        &self,
        cf: &'static str,
        id: Uuid,
        value: &T,
        prefix: &str,
        unique_key: &str,
        conflict: &str,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.ensure_unique(prefix, unique_key, conflict)?;
        let mut batch = WriteBatch::default();
        self.put_unique(&mut batch, cf, id, value, prefix, unique_key)?;
        self.db.write(batch)?;
        Ok(())
    }

    fn stored_account_version(&self, id: Uuid) -> Result<u64> {
        self.get_json::<Account>(CF_ACCOUNTS, id.as_bytes())?
            .map(|stored| stored.version())
            .ok_or(AtmError::NotFound("account"))
    }

    /// Entries of one account sort by timestamp, then by append order.
    fn transaction_key(tx: &Transaction, sequence: u64) -> Vec<u8> {
        // Flipping the sign bit makes big-endian bytes sort like the signed timestamp.
        let micros = (tx.created_at().timestamp_micros() as u64) ^ (1 << 63);
        let mut key = Vec::with_capacity(32);
        key.extend_from_slice(tx.account_id().as_bytes());
        key.extend_from_slice(&micros.to_be_bytes());
        key.extend_from_slice(&sequence.to_be_bytes());
        key
    }

    fn last_withdrawal_key(account_id: Uuid) -> Vec<u8> {
        format!("{LAST_WITHDRAWAL_PREFIX}{account_id}").into_bytes()
    }

    /// Adds a ledger entry to `batch`. Callers must hold `write_lock` until
    /// the batch is written.
    fn put_transaction(&self, batch: &mut WriteBatch, tx: &Transaction) -> Result<()> {
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        let key = Self::transaction_key(tx, sequence);
        let index = self.cf(CF_INDEX)?;
        batch.put_cf(self.cf(CF_TRANSACTIONS)?, &key, serde_json::to_vec(tx)?);
        batch.put_cf(index, TX_SEQUENCE_KEY, (sequence + 1).to_be_bytes());

        if tx.is_completed_withdrawal() {
            let pointer = Self::last_withdrawal_key(tx.account_id());
            let newer = match self.db.get_cf(index, &pointer)? {
                Some(current) => key.as_slice() > current.as_slice(),
                None => true,
            };
            if newer {
                batch.put_cf(index, &pointer, &key);
            }
        }
        Ok(())
    }

    /// Walks an account's ledger keys newest first and decodes only the
    /// entries inside `skip..skip + limit`.
    fn account_page(
        &self,
        account_id: Uuid,
        skip: usize,
        limit: usize,
    ) -> Result<(Vec<Transaction>, usize)> {
        let prefix = account_id.as_bytes().to_vec();
        let mut upper = prefix.clone();
        upper.extend_from_slice(&[0xFF; 16]);

        let mut page = Vec::new();
        let mut total = 0;
        let iter = self.db.iterator_cf(
            self.cf(CF_TRANSACTIONS)?,
            IteratorMode::From(upper.as_slice(), Direction::Reverse),
        );
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            if total >= skip && page.len() < limit {
                page.push(serde_json::from_slice(&value)?);
            }
            total += 1;
        }
        Ok((page, total))
    }
}

fn decode_u64(bytes: &[u8]) -> Result<u64> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| AtmError::internal("corrupt transaction sequence"))?;
    Ok(u64::from_be_bytes(raw))
}

#[async_trait]
impl UserStore for RocksDBStore {
    async fn add(&self, user: User) -> Result<()> {
        self.insert_unique(
            CF_USERS,
            user.id(),
            &user,
            DOCUMENT_PREFIX,
            user.document_number(),
            USER_CONFLICT,
        )
        .await
    }

    async fn get(&self, id: Uuid) -> Result<Option<User>> {
        self.get_json(CF_USERS, id.as_bytes())
    }

    async fn get_by_document(&self, document_number: &str) -> Result<Option<User>> {
        match self.index_lookup(DOCUMENT_PREFIX, document_number)? {
            Some(id) => self.get_json(CF_USERS, id.as_bytes()),
            None => Ok(None),
        }
    }

    async fn exists_by_document(&self, document_number: &str) -> Result<bool> {
        Ok(self.index_lookup(DOCUMENT_PREFIX, document_number)?.is_some())
    }
}

#[async_trait]
impl AccountStore for RocksDBStore {
    async fn add(&self, account: Account) -> Result<()> {
        self.insert_unique(
            CF_ACCOUNTS,
            account.id(),
            &account,
            ACCOUNT_NUMBER_PREFIX,
            account.account_number(),
            ACCOUNT_CONFLICT,
        )
        .await
    }

    async fn get(&self, id: Uuid) -> Result<Option<Account>> {
        self.get_json(CF_ACCOUNTS, id.as_bytes())
    }

    async fn get_by_number(&self, account_number: &str) -> Result<Option<Account>> {
        match self.index_lookup(ACCOUNT_NUMBER_PREFIX, account_number)? {
            Some(id) => self.get_json(CF_ACCOUNTS, id.as_bytes()),
            None => Ok(None),
        }
    }

    async fn exists_by_number(&self, account_number: &str) -> Result<bool> {
        Ok(self
            .index_lookup(ACCOUNT_NUMBER_PREFIX, account_number)?
            .is_some())
    }

    async fn update(&self, account: &Account) -> Result<Account> {
        let _guard = self.write_lock.lock().await;
        if self.stored_account_version(account.id())? != account.version() {
            return Err(AtmError::VersionConflict { entity: "account" });
        }
        let mut stored = account.clone();
        stored.advance_version();
        self.db.put_cf(
            self.cf(CF_ACCOUNTS)?,
            stored.id().as_bytes(),
            serde_json::to_vec(&stored)?,
        )?;
        Ok(stored)
    }
}

#[async_trait]
impl CardStore for RocksDBStore {
    async fn add(&self, card: Card) -> Result<()> {
        self.insert_unique(
            CF_CARDS,
            card.id(),
            &card,
            CARD_NUMBER_PREFIX,
            card.card_number(),
            CARD_CONFLICT,
        )
        .await
    }

    async fn get(&self, id: Uuid) -> Result<Option<Card>> {
        self.get_json(CF_CARDS, id.as_bytes())
    }

    async fn get_by_number(&self, card_number: &str) -> Result<Option<Card>> {
        match self.index_lookup(CARD_NUMBER_PREFIX, card_number)? {
            Some(id) => self.get_json(CF_CARDS, id.as_bytes()),
            None => Ok(None),
        }
    }

    async fn exists_by_number(&self, card_number: &str) -> Result<bool> {
        Ok(self.index_lookup(CARD_NUMBER_PREFIX, card_number)?.is_some())
    }

    async fn update(&self, card: &Card) -> Result<Card> {
        let _guard = self.write_lock.lock().await;
        let stored_version = self
            .get_json::<Card>(CF_CARDS, card.id().as_bytes())?
            .map(|stored| stored.version())
            .ok_or(AtmError::NotFound("card"))?;
        if stored_version != card.version() {
            return Err(AtmError::VersionConflict { entity: "card" });
        }
        let mut stored = card.clone();
        stored.advance_version();
        self.db.put_cf(
            self.cf(CF_CARDS)?,
            stored.id().as_bytes(),
            serde_json::to_vec(&stored)?,
        )?;
        Ok(stored)
    }
}

#[async_trait]
impl TransactionStore for RocksDBStore {
    async fn append(&self, tx: Transaction) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut batch = WriteBatch::default();
        self.put_transaction(&mut batch, &tx)?;
        self.db.write(batch)?;
        Ok(())
    }

    async fn page_by_account(
        &self,
        account_id: Uuid,
        skip: usize,
        limit: usize,
    ) -> Result<(Vec<Transaction>, usize)> {
        self.account_page(account_id, skip, limit)
    }

    async fn last_withdrawal(&self, account_id: Uuid) -> Result<Option<Transaction>> {
        let pointer = Self::last_withdrawal_key(account_id);
        match self.db.get_cf(self.cf(CF_INDEX)?, pointer)? {
            Some(key) => self.get_json(CF_TRANSACTIONS, &key),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl UnitOfWork for RocksDBStore {
    async fn commit_withdrawal(&self, account: &Account, tx: Transaction) -> Result<Account> {
        let _guard = self.write_lock.lock().await;
        if self.stored_account_version(account.id())? != account.version() {
            return Err(AtmError::VersionConflict { entity: "account" });
        }
        let mut stored = account.clone();
        stored.advance_version();

        let mut batch = WriteBatch::default();
        batch.put_cf(
            self.cf(CF_ACCOUNTS)?,
            stored.id().as_bytes(),
            serde_json::to_vec(&stored)?,
        );
        self.put_transaction(&mut batch, &tx)?;
        self.db.write(batch)?;
        Ok(stored)
    }

    async fn commit_registration(&self, user: User, account: Account, card: Card) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.ensure_unique(DOCUMENT_PREFIX, user.document_number(), USER_CONFLICT)?;
        self.ensure_unique(
            ACCOUNT_NUMBER_PREFIX,
            account.account_number(),
            ACCOUNT_CONFLICT,
        )?;
        self.ensure_unique(CARD_NUMBER_PREFIX, card.card_number(), CARD_CONFLICT)?;

        let mut batch = WriteBatch::default();
        self.put_unique(
            &mut batch,
            CF_USERS,
            user.id(),
            &user,
            DOCUMENT_PREFIX,
            user.document_number(),
        )?;
        self.put_unique(
            &mut batch,
            CF_ACCOUNTS,
            account.id(),
            &account,
            ACCOUNT_NUMBER_PREFIX,
            account.account_number(),
        )?;
        self.put_unique(
            &mut batch,
            CF_CARDS,
            card.id(),
            &card,
            CARD_NUMBER_PREFIX,
            card.card_number(),
        )?;
        self.db.write(batch)?;
        Ok(())
    }
}
