use crate::application::dto::RegisterResponse;
use crate::application::requests::{RegisterRequest, parse_expiry};
use crate::domain::account::Account;
use crate::domain::authenticator::CardAuthenticator;
use crate::domain::card::Card;
use crate::domain::clock::ClockRef;
use crate::domain::ports::{PinHasherRef, Stores};
use crate::domain::user::User;
use crate::error::{AtmError, Result};
use rand::Rng;
use tracing::info;

const ACCOUNT_NUMBER_ATTEMPTS: usize = 100;

/// Onboards a customer: user, account and card in one call.
pub struct RegistrationService {
    stores: Stores,
    hasher: PinHasherRef,
    authenticator: CardAuthenticator,
    clock: ClockRef,
}

impl RegistrationService {
    pub fn new(stores: Stores, hasher: PinHasherRef, clock: ClockRef) -> Self {
        Self {
            stores,
            hasher,
            authenticator: CardAuthenticator::new(clock.clone()),
            clock,
        }
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<RegisterResponse> {
        if self
            .stores
            .users
            .exists_by_document(request.document_number.trim())
            .await?
        {
            return Err(AtmError::Conflict(
                "a user with this document number already exists".to_string(),
            ));
        }
        if self.stores.cards.exists_by_number(&request.card_number).await? {
            return Err(AtmError::Conflict(
                "a card with this number already exists".to_string(),
            ));
        }

        let now = self.clock.now();
        let expiry_date = parse_expiry(&request.expiry)?;

        let user = User::new(
            &request.first_name,
            &request.last_name,
            &request.document_number,
            now,
        )?;
        let account_number = self.unused_account_number().await?;
        let account = Account::new(&account_number, user.id(), request.initial_balance, now)?;
        let hashed_pin = self.hasher.hash_pin(&request.pin)?;
        let mut card = Card::new(
            &request.card_number,
            &hashed_pin,
            user.id(),
            account.id(),
            now,
        )?;
        self.authenticator.set_custom_expiry(&mut card, expiry_date)?;

        let response = RegisterResponse {
            user_id: user.id(),
            account_number,
            masked_card_number: card.masked_number(),
            first_name: user.first_name().to_string(),
            last_name: user.last_name().to_string(),
            initial_balance: account.balance().value(),
            expiry_date: card.expiry_date(),
            registered_at: now,
        };

        self.stores
            .unit_of_work
            .commit_registration(user, account, card)
            .await?;

        info!(
            card = %response.masked_card_number,
            account_number = %response.account_number,
            "customer registered"
        );
        Ok(response)
    }

    async fn unused_account_number(&self) -> Result<String> {
        for _ in 0..ACCOUNT_NUMBER_ATTEMPTS {
            let candidate = rand::thread_rng()
                .gen_range(1_000_000_000u64..=9_999_999_999)
                .to_string();
            if !self.stores.accounts.exists_by_number(&candidate).await? {
                return Ok(candidate);
            }
        }
        Err(AtmError::internal("could not allocate an unused account number"))
    }
}
