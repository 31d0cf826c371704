use crate::error::{AtmError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Sub, SubAssign};
use uuid::Uuid;

/// Represents a monetary balance.
///
/// This is a wrapper around `rust_decimal::Decimal` so balances and requested
/// amounts cannot be mixed up in signatures.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Balance(Decimal);

/// Represents a strictly positive monetary amount for withdrawals.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(AtmError::InvalidAmount)
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = AtmError;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Amount> for Balance {
    fn from(amount: Amount) -> Self {
        Self(amount.0)
    }
}

impl Balance {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Sub for Balance {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl SubAssign for Balance {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

/// A bank account owned by exactly one user.
///
/// The balance is only ever lowered through [`crate::domain::ledger::AccountLedger`],
/// which refuses any debit that would take it below zero.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Account {
    id: Uuid,
    account_number: String,
    user_id: Uuid,
    balance: Balance,
    created_at: DateTime<Utc>,
    last_withdrawal_at: Option<DateTime<Utc>>,
    active: bool,
    /// Optimistic-concurrency version, bumped by the store on every write.
    version: u64,
}

impl Account {
    pub fn new(
        account_number: &str,
        user_id: Uuid,
        initial_balance: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let account_number = crate::domain::user::required(account_number, "account number")?;
        if initial_balance < Decimal::ZERO {
            return Err(AtmError::Validation(
                "initial balance cannot be negative".to_string(),
            ));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            account_number,
            user_id,
            balance: Balance::new(initial_balance),
            created_at: now,
            last_withdrawal_at: None,
            active: true,
            version: 0,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn account_number(&self) -> &str {
        &self.account_number
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn balance(&self) -> Balance {
        self.balance
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_withdrawal_at(&self) -> Option<DateTime<Utc>> {
        self.last_withdrawal_at
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn deactivate(&mut self) {
        self.active = false;
    }

    /// Lowers the balance. Callers must have checked funds first.
    pub(crate) fn debit(&mut self, amount: Amount, now: DateTime<Utc>) {
        self.balance -= amount.into();
        self.last_withdrawal_at = Some(now);
    }

    pub(crate) fn advance_version(&mut self) {
        self.version += 1;
    }
}
