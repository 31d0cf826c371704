use crate::domain::account::{Account, Amount, Balance};
use crate::domain::clock::ClockRef;
use crate::error::{AtmError, Result};
use rust_decimal::Decimal;

/// Balance arithmetic with a hard non-negativity rule.
///
/// Every rejection leaves the account exactly as it was, so the caller can
/// still record the failed attempt against the untouched balance.
#[derive(Clone)]
pub struct AccountLedger {
    clock: ClockRef,
}

impl AccountLedger {
    pub fn new(clock: ClockRef) -> Self {
        Self { clock }
    }

    /// Debits `amount` and returns the new balance.
    pub fn withdraw(&self, account: &mut Account, amount: Decimal) -> Result<Balance> {
        if !account.is_active() {
            return Err(AtmError::AccountInactive);
        }

        let amount = Amount::new(amount)?;
        let available = account.balance();
        if available < Balance::from(amount) {
            return Err(AtmError::InsufficientFunds {
                requested: amount.value(),
                available: available.value(),
            });
        }

        account.debit(amount, self.clock.now());
        Ok(account.balance())
    }
}
