use crate::application::dto::{
    AccountSummary, BalanceResponse, LoginResponse, OperationsResponse, Pagination,
    TransactionView, UnblockResponse, WithdrawResponse,
};
use crate::application::recorder::TransactionRecorder;
use crate::domain::account::Account;
use crate::domain::authenticator::CardAuthenticator;
use crate::domain::card::{Card, CardStatus, mask_card_number};
use crate::domain::clock::ClockRef;
use crate::domain::ledger::AccountLedger;
use crate::domain::ports::{
    CallerIdentity, OwnershipCheckerRef, PinHasherRef, Stores, TokenIssuerRef,
};
use crate::domain::transaction::Transaction;
use crate::domain::user::User;
use crate::error::{AtmError, Result};
use rust_decimal::Decimal;
use std::future::Future;
use tracing::{debug, info, warn};

/// Default number of re-runs after a version conflict.
pub const DEFAULT_CONFLICT_RETRIES: u32 = 3;

/// External collaborators the orchestrator calls into.
#[derive(Clone)]
pub struct Collaborators {
    pub hasher: PinHasherRef,
    pub tokens: TokenIssuerRef,
    pub ownership: OwnershipCheckerRef,
    pub clock: ClockRef,
}

/// Runs the ATM use cases against one card/account pair per call.
///
/// Card and account writes are versioned. When a write loses a race the whole
/// read-decide-write sequence runs again, at most `conflict_retries` more
/// times, before `AtmError::VersionConflict` is surfaced.
pub struct AtmTransactionOrchestrator {
    stores: Stores,
    recorder: TransactionRecorder,
    authenticator: CardAuthenticator,
    ledger: AccountLedger,
    collaborators: Collaborators,
    conflict_retries: u32,
}

impl AtmTransactionOrchestrator {
    pub fn new(stores: Stores, collaborators: Collaborators) -> Self {
        Self {
            recorder: TransactionRecorder::new(stores.transactions.clone()),
            authenticator: CardAuthenticator::new(collaborators.clock.clone()),
            ledger: AccountLedger::new(collaborators.clock.clone()),
            stores,
            collaborators,
            conflict_retries: DEFAULT_CONFLICT_RETRIES,
        }
    }

    pub fn with_conflict_retries(mut self, retries: u32) -> Self {
        self.conflict_retries = retries;
        self
    }

    pub fn recorder(&self) -> &TransactionRecorder {
        &self.recorder
    }

    /// Checks the PIN and opens a session.
    ///
    /// An unknown card answers like a wrong PIN with no attempts left. The
    /// card's attempt counter and status are persisted before any PIN error
    /// is returned.
    pub async fn login(&self, card_number: &str, pin: &str) -> Result<LoginResponse> {
        self.with_retry("login", || self.try_login(card_number, pin))
            .await
    }

    async fn try_login(&self, card_number: &str, pin: &str) -> Result<LoginResponse> {
        let masked = mask_card_number(card_number);
        let Some(mut card) = self.stores.cards.get_by_number(card_number).await? else {
            warn!(card = %masked, "login attempt for unknown card");
            return Err(AtmError::InvalidPin {
                remaining_attempts: 0,
            });
        };

        let pin_matches = self
            .collaborators
            .hasher
            .verify_pin(pin, card.hashed_pin());
        let before = card.clone();
        let outcome = self.authenticator.validate_pin(&mut card, pin_matches);
        if card != before {
            card = self.stores.cards.update(&card).await?;
        }

        if let Err(e) = outcome {
            match &e {
                AtmError::InvalidPin { remaining_attempts } => {
                    warn!(card = %masked, remaining_attempts, "wrong PIN")
                }
                AtmError::CardBlocked { .. } => warn!(card = %masked, "card blocked"),
                _ => warn!(card = %masked, error = %e, "login rejected"),
            }
            return Err(e);
        }

        let account = self.account_of(&card).await?;
        let user = self.holder_of(&card).await?;
        let token = self.collaborators.tokens.generate_token(
            card.user_id(),
            card.card_number(),
            account.account_number(),
        )?;

        info!(card = %masked, "login succeeded");
        Ok(LoginResponse {
            token,
            token_type: "Bearer",
            expires_in: self.collaborators.tokens.expiration_seconds(),
            holder_name: user.full_name(),
            account_number: account.account_number().to_string(),
            masked_card_number: masked,
        })
    }

    /// Reports the balance and records the inquiry. Never changes the balance.
    pub async fn get_balance(
        &self,
        card_number: &str,
        caller: &CallerIdentity,
    ) -> Result<BalanceResponse> {
        let card = self.authorized_active_card(card_number, caller).await?;
        let account = self.account_of(&card).await?;
        let user = self.holder_of(&card).await?;
        let now = self.collaborators.clock.now();

        let last_withdrawal = self.recorder.last_withdrawal(account.id()).await?;
        let balance = account.balance().value();
        self.recorder
            .append(Transaction::balance_inquiry(
                account.id(),
                card.id(),
                balance,
                now,
            )?)
            .await?;

        Ok(BalanceResponse {
            holder_name: user.full_name(),
            account_number: account.account_number().to_string(),
            current_balance: balance,
            last_withdrawal_date: last_withdrawal.map(|tx| tx.created_at()),
            inquired_at: now,
        })
    }

    /// Debits the linked account.
    ///
    /// A rejection for insufficient funds is recorded as a failed withdrawal
    /// against the untouched balance and then returned to the caller.
    pub async fn withdraw(
        &self,
        card_number: &str,
        amount: Decimal,
        caller: &CallerIdentity,
    ) -> Result<WithdrawResponse> {
        self.with_retry("withdraw", || self.try_withdraw(card_number, amount, caller))
            .await
    }

    async fn try_withdraw(
        &self,
        card_number: &str,
        amount: Decimal,
        caller: &CallerIdentity,
    ) -> Result<WithdrawResponse> {
        let card = self.authorized_active_card(card_number, caller).await?;
        let mut account = self.account_of(&card).await?;
        let previous_balance = account.balance().value();
        let now = self.collaborators.clock.now();

        match self.ledger.withdraw(&mut account, amount) {
            Ok(new_balance) => {
                let tx = Transaction::withdrawal_completed(
                    account.id(),
                    card.id(),
                    amount,
                    new_balance.value(),
                    now,
                )?;
                let transaction_id = tx.id();
                let account = self
                    .stores
                    .unit_of_work
                    .commit_withdrawal(&account, tx)
                    .await?;

                info!(
                    card = %card.masked_number(),
                    %amount,
                    new_balance = %new_balance,
                    "withdrawal completed"
                );
                Ok(WithdrawResponse {
                    transaction_id,
                    withdrawn_amount: amount,
                    previous_balance,
                    new_balance: new_balance.value(),
                    account_number: account.account_number().to_string(),
                    timestamp: now,
                })
            }
            Err(e @ AtmError::InsufficientFunds { .. }) => {
                self.recorder
                    .append(Transaction::withdrawal_failed(
                        account.id(),
                        card.id(),
                        amount,
                        previous_balance,
                        now,
                    )?)
                    .await?;
                warn!(
                    card = %card.masked_number(),
                    %amount,
                    available = %previous_balance,
                    "withdrawal rejected: insufficient funds"
                );
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// One page of the card's account history, newest first.
    pub async fn get_operations(
        &self,
        card_number: &str,
        page_number: u32,
        page_size: u32,
        caller: &CallerIdentity,
    ) -> Result<OperationsResponse> {
        let card = self.authorized_active_card(card_number, caller).await?;
        let account = self.account_of(&card).await?;
        let user = self.holder_of(&card).await?;

        let page = self
            .recorder
            .page_by_account(account.id(), page_number, page_size)
            .await?;

        Ok(OperationsResponse {
            items: page.items.iter().map(TransactionView::from).collect(),
            pagination: Pagination::new(page_number, page_size, page.total_count),
            account_summary: AccountSummary {
                account_number: account.account_number().to_string(),
                holder_name: user.full_name(),
                current_balance: account.balance().value(),
            },
        })
    }

    /// Out-of-band recovery of a blocked card, gated by the holder's document
    /// number instead of a session.
    pub async fn unblock(
        &self,
        card_number: &str,
        document_number: &str,
        new_pin: &str,
    ) -> Result<UnblockResponse> {
        self.with_retry("unblock", || {
            self.try_unblock(card_number, document_number, new_pin)
        })
        .await
    }

    async fn try_unblock(
        &self,
        card_number: &str,
        document_number: &str,
        new_pin: &str,
    ) -> Result<UnblockResponse> {
        let mut card = self
            .stores
            .cards
            .get_by_number(card_number)
            .await?
            .ok_or(AtmError::CardNotFound)?;
        let user = self.holder_of(&card).await?;

        if user.document_number() != document_number.trim() {
            warn!(card = %card.masked_number(), "unblock with mismatching document");
            return Err(AtmError::DocumentMismatch);
        }
        if card.status() != CardStatus::Blocked {
            return Err(AtmError::NotBlocked);
        }

        let hashed_pin = self.collaborators.hasher.hash_pin(new_pin)?;
        self.authenticator.unblock(&mut card, &hashed_pin)?;
        let card = self.stores.cards.update(&card).await?;

        info!(card = %card.masked_number(), "card unblocked");
        Ok(UnblockResponse {
            masked_card_number: card.masked_number(),
            holder_name: user.full_name(),
            status: card.status(),
            unblocked_at: self.collaborators.clock.now(),
        })
    }

    /// Whether the card exists and can be used right now. No side effects.
    pub async fn is_card_usable(&self, card_number: &str) -> Result<bool> {
        let now = self.collaborators.clock.now();
        Ok(self
            .stores
            .cards
            .get_by_number(card_number)
            .await?
            .is_some_and(|card| card.is_active(now)))
    }

    async fn authorized_active_card(
        &self,
        card_number: &str,
        caller: &CallerIdentity,
    ) -> Result<Card> {
        if !self.collaborators.ownership.owns_card(caller, card_number) {
            warn!(
                card = %mask_card_number(card_number),
                user_id = %caller.user_id,
                "caller does not own card"
            );
            return Err(AtmError::Unauthorized);
        }

        let now = self.collaborators.clock.now();
        match self.stores.cards.get_by_number(card_number).await? {
            Some(card) if card.is_active(now) => Ok(card),
            _ => Err(AtmError::CardInactive),
        }
    }

    async fn account_of(&self, card: &Card) -> Result<Account> {
        self.stores
            .accounts
            .get(card.account_id())
            .await?
            .ok_or(AtmError::NotFound("account"))
    }

    async fn holder_of(&self, card: &Card) -> Result<User> {
        self.stores
            .users
            .get(card.user_id())
            .await?
            .ok_or(AtmError::NotFound("user"))
    }

    async fn with_retry<T, F, Fut>(&self, operation: &'static str, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retries = 0;
        loop {
            match attempt().await {
                Err(e) if e.is_transient() && retries < self.conflict_retries => {
                    retries += 1;
                    debug!(operation, retries, "version conflict, retrying");
                }
                Err(e) if e.is_transient() => {
                    warn!(operation, retries, "version conflict, giving up");
                    return Err(e);
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::Balance;
    use crate::domain::clock::{Clock, FixedClock};
    use crate::domain::ports::{
        AccountStore, CardStore, PinHasher, TokenIssuer, UnitOfWork, UserStore,
    };
    use crate::domain::transaction::{TransactionStatus, TransactionType};
    use crate::infrastructure::in_memory::InMemoryStore;
    use crate::infrastructure::security::{JwtTokenIssuer, SessionOwnership};
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use uuid::Uuid;

    const CARD: &str = "4001234567890101";
    const DOCUMENT: &str = "12345678";

    /// Stores the PIN in clear; enough to drive the orchestrator in tests.
    struct PlainHasher;

    impl PinHasher for PlainHasher {
        fn hash_pin(&self, pin: &str) -> Result<String> {
            Ok(format!("plain:{pin}"))
        }

        fn verify_pin(&self, pin: &str, hashed_pin: &str) -> bool {
            hashed_pin == format!("plain:{pin}")
        }
    }

    struct Fixture {
        atm: AtmTransactionOrchestrator,
        store: InMemoryStore,
        clock: FixedClock,
        tokens: Arc<JwtTokenIssuer>,
        account_id: Uuid,
    }

    async fn fixture_with(
        stores: Option<Stores>,
        store: InMemoryStore,
        balance: Decimal,
    ) -> Fixture {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap());
        let user = User::new("Ada", "Lovelace", DOCUMENT, clock.now()).unwrap();
        let account = Account::new("1234567890", user.id(), balance, clock.now()).unwrap();
        let card = Card::new(CARD, "plain:1234", user.id(), account.id(), clock.now()).unwrap();
        let account_id = account.id();

        UserStore::add(&store, user).await.unwrap();
        AccountStore::add(&store, account).await.unwrap();
        CardStore::add(&store, card).await.unwrap();

        let tokens = Arc::new(JwtTokenIssuer::new(
            "test-secret",
            900,
            Arc::new(clock.clone()),
        ));
        let collaborators = Collaborators {
            hasher: Arc::new(PlainHasher),
            tokens: tokens.clone(),
            ownership: Arc::new(SessionOwnership),
            clock: Arc::new(clock.clone()),
        };
        let stores = stores.unwrap_or_else(|| Stores::from_backend(store.clone()));
        Fixture {
            atm: AtmTransactionOrchestrator::new(stores, collaborators),
            store,
            clock,
            tokens,
            account_id,
        }
    }

    async fn fixture(balance: Decimal) -> Fixture {
        fixture_with(None, InMemoryStore::new(), balance).await
    }

    fn owner() -> CallerIdentity {
        CallerIdentity {
            user_id: Uuid::new_v4(),
            card_number: CARD.to_string(),
            account_number: "1234567890".to_string(),
        }
    }

    async fn history(f: &Fixture) -> Vec<Transaction> {
        f.atm
            .recorder()
            .page_by_account(f.account_id, 1, 100)
            .await
            .unwrap()
            .items
    }

    async fn stored_balance(f: &Fixture) -> Balance {
        AccountStore::get(&f.store, f.account_id)
            .await
            .unwrap()
            .unwrap()
            .balance()
    }

    async fn stored_card(f: &Fixture) -> Card {
        CardStore::get_by_number(&f.store, CARD).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_login_success_issues_bound_token() {
        let f = fixture(dec!(1000)).await;
        let response = f.atm.login(CARD, "1234").await.unwrap();

        assert_eq!(response.masked_card_number, "****-****-****-0101");
        assert_eq!(response.holder_name, "Ada Lovelace");
        assert_eq!(response.account_number, "1234567890");
        assert_eq!(response.expires_in, 900);

        let caller = f.tokens.verify(&response.token).unwrap();
        assert_eq!(caller.card_number, CARD);
        assert_eq!(caller.account_number, "1234567890");
    }

    #[tokio::test]
    async fn test_login_unknown_card_looks_like_exhausted_pin() {
        let f = fixture(dec!(1000)).await;
        let result = f.atm.login("4001234567899999", "1234").await;
        assert!(matches!(
            result,
            Err(AtmError::InvalidPin {
                remaining_attempts: 0
            })
        ));
    }

    #[tokio::test]
    async fn test_failed_logins_are_persisted_and_block_card() {
        let f = fixture(dec!(1000)).await;
        for expected in [3, 2, 1] {
            let result = f.atm.login(CARD, "0000").await;
            assert!(matches!(
                result,
                Err(AtmError::InvalidPin { remaining_attempts }) if remaining_attempts == expected
            ));
        }
        assert_eq!(stored_card(&f).await.failed_attempts(), 3);

        let result = f.atm.login(CARD, "0000").await;
        assert!(matches!(result, Err(AtmError::CardBlocked { .. })));
        let card = stored_card(&f).await;
        assert_eq!(card.status(), CardStatus::Blocked);

        // The right PIN no longer helps.
        let result = f.atm.login(CARD, "1234").await;
        assert!(matches!(result, Err(AtmError::CardBlocked { .. })));
    }

    #[tokio::test]
    async fn test_successful_login_resets_attempts() {
        let f = fixture(dec!(1000)).await;
        let _ = f.atm.login(CARD, "0000").await;
        let _ = f.atm.login(CARD, "0000").await;
        f.atm.login(CARD, "1234").await.unwrap();
        assert_eq!(stored_card(&f).await.failed_attempts(), 0);
    }

    #[tokio::test]
    async fn test_login_expired_card_is_inactive() {
        let f = fixture(dec!(1000)).await;
        f.clock.advance(Duration::days(365 * 4));
        assert!(matches!(
            f.atm.login(CARD, "1234").await,
            Err(AtmError::CardInactive)
        ));
        assert!(!f.atm.is_card_usable(CARD).await.unwrap());
    }

    #[tokio::test]
    async fn test_withdraw_success() {
        let f = fixture(dec!(1000)).await;
        let response = f.atm.withdraw(CARD, dec!(100), &owner()).await.unwrap();

        assert_eq!(response.previous_balance, dec!(1000));
        assert_eq!(response.new_balance, dec!(900));
        assert_eq!(response.withdrawn_amount, dec!(100));
        assert_eq!(stored_balance(&f).await, Balance::new(dec!(900)));

        let history = history(&f).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id(), response.transaction_id);
        assert_eq!(history[0].status(), TransactionStatus::Completed);
        assert_eq!(history[0].balance_after(), Some(dec!(900)));
    }

    #[tokio::test]
    async fn test_withdraw_insufficient_funds_records_failure() {
        let f = fixture(dec!(50)).await;
        let result = f.atm.withdraw(CARD, dec!(100), &owner()).await;

        assert!(matches!(
            result,
            Err(AtmError::InsufficientFunds { requested, available })
                if requested == dec!(100) && available == dec!(50)
        ));
        assert_eq!(stored_balance(&f).await, Balance::new(dec!(50)));

        let history = history(&f).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].r#type(), TransactionType::Withdrawal);
        assert_eq!(history[0].status(), TransactionStatus::Failed);
        assert_eq!(history[0].balance_after(), Some(dec!(50)));
    }

    #[tokio::test]
    async fn test_withdraw_requires_ownership() {
        let f = fixture(dec!(1000)).await;
        let stranger = CallerIdentity {
            card_number: "4001234567890202".to_string(),
            ..owner()
        };

        let result = f.atm.withdraw(CARD, dec!(100), &stranger).await;
        assert!(matches!(result, Err(AtmError::Unauthorized)));
        assert_eq!(stored_balance(&f).await, Balance::new(dec!(1000)));
        assert!(history(&f).await.is_empty());
    }

    #[tokio::test]
    async fn test_withdraw_invalid_amount_records_nothing() {
        let f = fixture(dec!(1000)).await;
        let result = f.atm.withdraw(CARD, dec!(0), &owner()).await;
        assert!(matches!(result, Err(AtmError::InvalidAmount)));
        assert!(history(&f).await.is_empty());
    }

    #[tokio::test]
    async fn test_get_balance_records_inquiry_without_touching_balance() {
        let f = fixture(dec!(1000)).await;
        f.atm.withdraw(CARD, dec!(100), &owner()).await.unwrap();

        let first = f.atm.get_balance(CARD, &owner()).await.unwrap();
        let second = f.atm.get_balance(CARD, &owner()).await.unwrap();
        assert_eq!(first.current_balance, dec!(900));
        assert_eq!(second.current_balance, dec!(900));
        assert_eq!(first.holder_name, "Ada Lovelace");
        assert_eq!(first.last_withdrawal_date, Some(f.clock.now()));

        let history = history(&f).await;
        let inquiries: Vec<_> = history
            .iter()
            .filter(|tx| tx.r#type() == TransactionType::BalanceInquiry)
            .collect();
        assert_eq!(inquiries.len(), 2);
        assert!(inquiries.iter().all(|tx| tx.amount() == Decimal::ZERO
            && tx.balance_after() == Some(dec!(900))
            && tx.status() == TransactionStatus::Completed));
    }

    #[tokio::test]
    async fn test_get_balance_on_expired_card_is_inactive() {
        let f = fixture(dec!(1000)).await;
        f.clock.advance(Duration::days(365 * 4));
        assert!(matches!(
            f.atm.get_balance(CARD, &owner()).await,
            Err(AtmError::CardInactive)
        ));
    }

    #[tokio::test]
    async fn test_get_operations_single_page() {
        let f = fixture(dec!(1000)).await;
        f.atm.get_balance(CARD, &owner()).await.unwrap();
        f.clock.advance(Duration::seconds(1));
        f.atm.withdraw(CARD, dec!(100), &owner()).await.unwrap();

        let ops = f.atm.get_operations(CARD, 1, 10, &owner()).await.unwrap();
        assert_eq!(ops.items.len(), 2);
        assert_eq!(ops.items[0].r#type, TransactionType::Withdrawal);
        assert_eq!(ops.items[0].type_label, "Withdrawal");
        assert_eq!(ops.pagination.total_pages, 1);
        assert!(!ops.pagination.has_next);
        assert!(!ops.pagination.has_previous);
        assert_eq!(ops.account_summary.current_balance, dec!(900));
    }

    #[tokio::test]
    async fn test_unblock_flow() {
        let f = fixture(dec!(1000)).await;
        for _ in 0..4 {
            let _ = f.atm.login(CARD, "0000").await;
        }

        assert!(matches!(
            f.atm.unblock(CARD, "87654321", "5678").await,
            Err(AtmError::DocumentMismatch)
        ));

        let response = f.atm.unblock(CARD, DOCUMENT, "5678").await.unwrap();
        assert_eq!(response.status, CardStatus::Active);
        assert_eq!(response.masked_card_number, "****-****-****-0101");

        let card = stored_card(&f).await;
        assert_eq!(card.failed_attempts(), 0);
        assert_eq!(card.hashed_pin(), "plain:5678");

        assert!(f.atm.login(CARD, "5678").await.is_ok());
        assert!(matches!(
            f.atm.unblock(CARD, DOCUMENT, "9999").await,
            Err(AtmError::NotBlocked)
        ));
        assert!(matches!(
            f.atm.unblock("4001234567899999", DOCUMENT, "9999").await,
            Err(AtmError::CardNotFound)
        ));
    }

    /// Lets a competing writer sneak in before the first `conflicts` commits.
    struct RacingUnitOfWork {
        inner: InMemoryStore,
        conflicts: AtomicU32,
    }

    #[async_trait]
    impl UnitOfWork for RacingUnitOfWork {
        async fn commit_withdrawal(&self, account: &Account, tx: Transaction) -> Result<Account> {
            if self.conflicts.load(Ordering::SeqCst) > 0 {
                self.conflicts.fetch_sub(1, Ordering::SeqCst);
                let mut competitor = AccountStore::get(&self.inner, account.id())
                    .await?
                    .ok_or(AtmError::NotFound("account"))?;
                AccountLedger::new(Arc::new(crate::domain::clock::SystemClock))
                    .withdraw(&mut competitor, dec!(10))?;
                AccountStore::update(&self.inner, &competitor).await?;
            }
            self.inner.commit_withdrawal(account, tx).await
        }

        async fn commit_registration(
            &self,
            user: User,
            account: Account,
            card: Card,
        ) -> Result<()> {
            self.inner.commit_registration(user, account, card).await
        }
    }

    async fn racing_fixture(conflicts: u32) -> Fixture {
        let store = InMemoryStore::new();
        let mut stores = Stores::from_backend(store.clone());
        stores.unit_of_work = Arc::new(RacingUnitOfWork {
            inner: store.clone(),
            conflicts: AtomicU32::new(conflicts),
        });
        fixture_with(Some(stores), store, dec!(1000)).await
    }

    #[tokio::test]
    async fn test_withdraw_retries_after_version_conflict() {
        let f = racing_fixture(2).await;
        let response = f.atm.withdraw(CARD, dec!(100), &owner()).await.unwrap();

        // Two competing debits of 10 landed first; no update was lost.
        assert_eq!(response.previous_balance, dec!(980));
        assert_eq!(response.new_balance, dec!(880));
        assert_eq!(stored_balance(&f).await, Balance::new(dec!(880)));
        assert_eq!(history(&f).await.len(), 1);
    }

    #[tokio::test]
    async fn test_withdraw_surfaces_conflict_when_retries_exhausted() {
        let f = racing_fixture(10).await;
        let result = f.atm.withdraw(CARD, dec!(100), &owner()).await;

        assert!(matches!(
            result,
            Err(AtmError::VersionConflict { entity: "account" })
        ));
        assert!(history(&f).await.is_empty());
    }

    /// Lets a competing wrong-PIN attempt land before each of the first
    /// `conflicts` card writes.
    struct RacingCardStore {
        inner: InMemoryStore,
        conflicts: AtomicU32,
        authenticator: CardAuthenticator,
    }

    #[async_trait]
    impl CardStore for RacingCardStore {
        async fn add(&self, card: Card) -> Result<()> {
            CardStore::add(&self.inner, card).await
        }

        async fn get(&self, id: Uuid) -> Result<Option<Card>> {
            CardStore::get(&self.inner, id).await
        }

        async fn get_by_number(&self, card_number: &str) -> Result<Option<Card>> {
            CardStore::get_by_number(&self.inner, card_number).await
        }

        async fn exists_by_number(&self, card_number: &str) -> Result<bool> {
            CardStore::exists_by_number(&self.inner, card_number).await
        }

        async fn update(&self, card: &Card) -> Result<Card> {
            if self.conflicts.load(Ordering::SeqCst) > 0 {
                self.conflicts.fetch_sub(1, Ordering::SeqCst);
                let mut competitor = CardStore::get(&self.inner, card.id())
                    .await?
                    .ok_or(AtmError::NotFound("card"))?;
                let _ = self.authenticator.validate_pin(&mut competitor, false);
                CardStore::update(&self.inner, &competitor).await?;
            }
            CardStore::update(&self.inner, card).await
        }
    }

    async fn racing_card_fixture(conflicts: u32) -> Fixture {
        let store = InMemoryStore::new();
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap());
        let mut stores = Stores::from_backend(store.clone());
        stores.cards = Arc::new(RacingCardStore {
            inner: store.clone(),
            conflicts: AtomicU32::new(conflicts),
            authenticator: CardAuthenticator::new(Arc::new(clock)),
        });
        fixture_with(Some(stores), store, dec!(1000)).await
    }

    #[tokio::test]
    async fn test_login_retry_keeps_competing_failed_attempts() {
        let f = racing_card_fixture(2).await;
        let result = f.atm.login(CARD, "0000").await;

        // Two competing wrong PINs landed first; ours is the third.
        assert!(matches!(
            result,
            Err(AtmError::InvalidPin {
                remaining_attempts: 1
            })
        ));
        assert_eq!(stored_card(&f).await.failed_attempts(), 3);
    }

    #[tokio::test]
    async fn test_login_surfaces_card_conflict_when_retries_exhausted() {
        let f = racing_card_fixture(4).await;
        let result = f.atm.login(CARD, "0000").await;

        assert!(matches!(
            result,
            Err(AtmError::VersionConflict { entity: "card" })
        ));
        // Only the competitor's attempts were written.
        assert_eq!(stored_card(&f).await.status(), CardStatus::Blocked);
    }

    #[tokio::test]
    async fn test_unblock_retries_after_card_conflict() {
        let f = racing_card_fixture(1).await;
        let authenticator = CardAuthenticator::new(Arc::new(f.clock.clone()));
        let mut card = stored_card(&f).await;
        for _ in 0..4 {
            let _ = authenticator.validate_pin(&mut card, false);
            card = CardStore::update(&f.store, &card).await.unwrap();
        }
        assert_eq!(card.status(), CardStatus::Blocked);

        let response = f.atm.unblock(CARD, DOCUMENT, "5678").await.unwrap();
        assert_eq!(response.status, CardStatus::Active);

        let card = stored_card(&f).await;
        assert_eq!(card.status(), CardStatus::Active);
        assert_eq!(card.failed_attempts(), 0);
        f.atm.login(CARD, "5678").await.unwrap();
    }
}
