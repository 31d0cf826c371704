use crate::error::Result;
use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Consecutive wrong PINs that lock a card.
pub const MAX_FAILED_ATTEMPTS: u32 = 4;

/// Cards are issued valid for this many months.
const DEFAULT_VALIDITY_MONTHS: u32 = 36;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum CardStatus {
    Active,
    Blocked,
    Disabled,
    Expired,
}

/// A debit card linked to one account.
///
/// Status and failed-attempt count change only through
/// [`crate::domain::authenticator::CardAuthenticator`].
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Card {
    id: Uuid,
    card_number: String,
    hashed_pin: String,
    user_id: Uuid,
    account_id: Uuid,
    status: CardStatus,
    failed_attempts: u32,
    created_at: DateTime<Utc>,
    expiry_date: DateTime<Utc>,
    version: u64,
}

impl Card {
    pub fn new(
        card_number: &str,
        hashed_pin: &str,
        user_id: Uuid,
        account_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let card_number = crate::domain::user::required(card_number, "card number")?;
        let hashed_pin = crate::domain::user::required(hashed_pin, "PIN")?;
        let expiry_date = now
            .checked_add_months(Months::new(DEFAULT_VALIDITY_MONTHS))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Ok(Self {
            id: Uuid::new_v4(),
            card_number,
            hashed_pin,
            user_id,
            account_id,
            status: CardStatus::Active,
            failed_attempts: 0,
            created_at: now,
            expiry_date,
            version: 0,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn card_number(&self) -> &str {
        &self.card_number
    }

    pub fn masked_number(&self) -> String {
        mask_card_number(&self.card_number)
    }

    pub fn hashed_pin(&self) -> &str {
        &self.hashed_pin
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn account_id(&self) -> Uuid {
        self.account_id
    }

    pub fn status(&self) -> CardStatus {
        self.status
    }

    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn expiry_date(&self) -> DateTime<Utc> {
        self.expiry_date
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Active status and not yet expired at `now`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.status == CardStatus::Active && self.expiry_date > now
    }

    /// Administrative switch-off. Not reversible through this crate.
    pub(crate) fn disable(&mut self) {
        self.status = CardStatus::Disabled;
    }

    pub(crate) fn reset_attempts(&mut self) {
        self.failed_attempts = 0;
    }

    /// Returns the new count.
    pub(crate) fn register_failed_attempt(&mut self) -> u32 {
        self.failed_attempts = (self.failed_attempts + 1).min(MAX_FAILED_ATTEMPTS);
        self.failed_attempts
    }

    pub(crate) fn block(&mut self) {
        self.status = CardStatus::Blocked;
    }

    pub(crate) fn reactivate_with_pin(&mut self, hashed_pin: String) {
        self.status = CardStatus::Active;
        self.hashed_pin = hashed_pin;
        self.failed_attempts = 0;
    }

    pub(crate) fn set_expiry(&mut self, expiry_date: DateTime<Utc>) {
        self.expiry_date = expiry_date;
    }

    pub(crate) fn advance_version(&mut self) {
        self.version += 1;
    }
}

/// Hides everything but the last four digits.
pub fn mask_card_number(card_number: &str) -> String {
    let digits: Vec<char> = card_number.chars().collect();
    if digits.len() < 4 {
        return "****".to_string();
    }
    let last4: String = digits[digits.len() - 4..].iter().collect();
    format!("****-****-****-{last4}")
}
