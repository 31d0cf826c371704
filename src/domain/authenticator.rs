use crate::domain::card::{Card, CardStatus, MAX_FAILED_ATTEMPTS};
use crate::domain::clock::ClockRef;
use crate::error::{AtmError, Result};
use chrono::{DateTime, Utc};

/// Owns the PIN lockout state machine of a card.
///
/// ```text
/// Active --wrong PIN, count < 4--> Active
/// Active --wrong PIN, count = 4--> Blocked
/// Blocked --unblock(new PIN)-----> Active
/// ```
///
/// The authenticator only mutates the card in memory; persisting the result
/// (on success *and* on failure) is the caller's job.
#[derive(Clone)]
pub struct CardAuthenticator {
    clock: ClockRef,
}

impl CardAuthenticator {
    pub fn new(clock: ClockRef) -> Self {
        Self { clock }
    }

    /// Applies one PIN check outcome to the card.
    ///
    /// A blocked card stays blocked whatever the PIN. The fourth consecutive
    /// wrong PIN blocks the card and reports `CardBlocked` right away.
    pub fn validate_pin(&self, card: &mut Card, pin_matches: bool) -> Result<()> {
        if card.status() == CardStatus::Blocked {
            return Err(AtmError::CardBlocked {
                card_number: card.card_number().to_string(),
            });
        }

        if !card.is_active(self.clock.now()) {
            return Err(AtmError::CardInactive);
        }

        if pin_matches {
            card.reset_attempts();
            return Ok(());
        }

        let attempts = card.register_failed_attempt();
        if attempts >= MAX_FAILED_ATTEMPTS {
            card.block();
            return Err(AtmError::CardBlocked {
                card_number: card.card_number().to_string(),
            });
        }

        Err(AtmError::InvalidPin {
            remaining_attempts: MAX_FAILED_ATTEMPTS - attempts,
        })
    }

    /// Re-activates a blocked card under a freshly hashed PIN.
    pub fn unblock(&self, card: &mut Card, new_hashed_pin: &str) -> Result<()> {
        if card.status() != CardStatus::Blocked {
            return Err(AtmError::NotBlocked);
        }
        let hashed_pin = crate::domain::user::required(new_hashed_pin, "PIN")?;
        card.reactivate_with_pin(hashed_pin);
        Ok(())
    }

    pub fn set_custom_expiry(&self, card: &mut Card, expiry_date: DateTime<Utc>) -> Result<()> {
        if expiry_date <= self.clock.now() {
            return Err(AtmError::InvalidExpiry);
        }
        card.set_expiry(expiry_date);
        Ok(())
    }
}
