//! Input shapes of the ATM use cases and their boundary checks.
//!
//! Every `validate` runs before the request reaches a service and only ever
//! fails with [`AtmError::Validation`].

use crate::error::{AtmError, Result};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

pub const MIN_WITHDRAWAL: Decimal = dec!(1000);
pub const MAX_WITHDRAWAL: Decimal = dec!(10000000);
pub const WITHDRAWAL_STEP: Decimal = dec!(10);
pub const MIN_INITIAL_BALANCE: Decimal = dec!(1000000);
pub const MAX_PAGE_SIZE: u32 = 10;

fn invalid(message: impl Into<String>) -> AtmError {
    AtmError::Validation(message.into())
}

pub fn validate_card_number(card_number: &str) -> Result<()> {
    if card_number.is_empty() {
        return Err(invalid("card number is required"));
    }
    if !(16..=19).contains(&card_number.len()) || !card_number.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(invalid("card number must have 16 to 19 digits"));
    }
    Ok(())
}

pub fn validate_pin(pin: &str) -> Result<()> {
    if !(3..=4).contains(&pin.len()) || !pin.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid("PIN must have 3 or 4 digits"));
    }
    Ok(())
}

pub fn validate_document_number(document_number: &str) -> Result<()> {
    if !(8..=20).contains(&document_number.len())
        || !document_number.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return Err(invalid("document number must have 8 to 20 letters or digits"));
    }
    Ok(())
}

fn validate_name(name: &str, field: &str) -> Result<()> {
    let length = name.trim().chars().count();
    if !(2..=50).contains(&length) || !name.chars().all(|c| c.is_alphabetic() || c == ' ') {
        return Err(invalid(format!("{field} must have 2 to 50 letters")));
    }
    Ok(())
}

/// Parses an `MM/yyyy` expiry into the last second of that month, UTC.
pub fn parse_expiry(expiry: &str) -> Result<DateTime<Utc>> {
    let malformed = || invalid("expiry must use the MM/yyyy format");
    let (month, year) = expiry.trim().split_once('/').ok_or_else(malformed)?;
    if month.len() != 2 || year.len() != 4 {
        return Err(malformed());
    }
    let month: u32 = month.parse().map_err(|_| malformed())?;
    let year: i32 = year.parse().map_err(|_| malformed())?;

    if !(1..=12).contains(&month) {
        return Err(malformed());
    }
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .ok_or_else(malformed)?;
    let last_day = first_of_next.pred_opt().ok_or_else(malformed)?;
    let end_of_month = last_day.and_hms_opt(23, 59, 59).ok_or_else(malformed)?;
    Ok(Utc.from_utc_datetime(&end_of_month))
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoginRequest {
    pub card_number: String,
    pub pin: String,
}

impl LoginRequest {
    pub fn validate(&self) -> Result<()> {
        validate_card_number(&self.card_number)?;
        validate_pin(&self.pin)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WithdrawRequest {
    pub card_number: String,
    pub amount: Decimal,
}

impl WithdrawRequest {
    pub fn validate(&self) -> Result<()> {
        validate_card_number(&self.card_number)?;
        if self.amount < MIN_WITHDRAWAL || self.amount > MAX_WITHDRAWAL {
            return Err(invalid(format!(
                "amount must be between {MIN_WITHDRAWAL} and {MAX_WITHDRAWAL}"
            )));
        }
        if !(self.amount % WITHDRAWAL_STEP).is_zero() {
            return Err(invalid(format!("amount must be a multiple of {WITHDRAWAL_STEP}")));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperationsRequest {
    pub card_number: String,
    pub page: u32,
    pub page_size: u32,
}

impl OperationsRequest {
    pub fn validate(&self) -> Result<()> {
        validate_card_number(&self.card_number)?;
        if self.page < 1 {
            return Err(invalid("page must be at least 1"));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(invalid(format!("page size must be between 1 and {MAX_PAGE_SIZE}")));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnblockRequest {
    pub card_number: String,
    pub document_number: String,
    pub new_pin: String,
    pub confirm_pin: String,
}

impl UnblockRequest {
    pub fn validate(&self) -> Result<()> {
        validate_card_number(&self.card_number)?;
        validate_document_number(&self.document_number)?;
        validate_pin(&self.new_pin)?;
        if self.new_pin != self.confirm_pin {
            return Err(invalid("PIN confirmation does not match"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegisterRequest {
    pub first_name: String,
    pub last_name: String,
    pub document_number: String,
    pub card_number: String,
    pub pin: String,
    pub initial_balance: Decimal,
    /// `MM/yyyy`.
    pub expiry: String,
}

impl RegisterRequest {
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.first_name, "first name")?;
        validate_name(&self.last_name, "last name")?;
        validate_document_number(&self.document_number)?;
        validate_card_number(&self.card_number)?;
        validate_pin(&self.pin)?;
        if self.initial_balance < MIN_INITIAL_BALANCE {
            return Err(invalid(format!(
                "initial balance must be at least {MIN_INITIAL_BALANCE}"
            )));
        }
        parse_expiry(&self.expiry).map(|_| ())
    }
}
