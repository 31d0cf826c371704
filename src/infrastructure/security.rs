use crate::domain::clock::ClockRef;
use crate::domain::ports::{CallerIdentity, OwnershipChecker, PinHasher, TokenIssuer};
use crate::error::{AtmError, Result};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Hashes PINs with Argon2id and a random per-PIN salt.
#[derive(Default, Clone)]
pub struct Argon2PinHasher {
    argon2: Argon2<'static>,
}

impl Argon2PinHasher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PinHasher for Argon2PinHasher {
    fn hash_pin(&self, pin: &str) -> Result<String> {
        if pin.trim().is_empty() {
            return Err(AtmError::Validation("PIN cannot be empty".to_string()));
        }
        let salt_bytes: [u8; 16] = rand::random();
        let salt = SaltString::encode_b64(&salt_bytes)
            .map_err(|e| AtmError::internal(format!("salt encoding failed: {e}")))?;
        let hash = self
            .argon2
            .hash_password(pin.as_bytes(), &salt)
            .map_err(|e| AtmError::internal(format!("PIN hashing failed: {e}")))?;
        Ok(hash.to_string())
    }

    fn verify_pin(&self, pin: &str, hashed_pin: &str) -> bool {
        if pin.trim().is_empty() || hashed_pin.trim().is_empty() {
            return false;
        }
        match PasswordHash::new(hashed_pin) {
            Ok(parsed) => self.argon2.verify_password(pin.as_bytes(), &parsed).is_ok(),
            Err(_) => false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    card_number: String,
    account_number: String,
    iat: i64,
    exp: i64,
}

/// Issues HS256 session tokens bound to a user, card and account.
///
/// Issue time and expiry both follow the injected clock.
#[derive(Clone)]
pub struct JwtTokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl_seconds: u64,
    clock: ClockRef,
}

impl JwtTokenIssuer {
    pub fn new(secret: &str, ttl_seconds: u64, clock: ClockRef) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl_seconds,
            clock,
        }
    }
}

impl TokenIssuer for JwtTokenIssuer {
    fn generate_token(
        &self,
        user_id: Uuid,
        card_number: &str,
        account_number: &str,
    ) -> Result<String> {
        let now = self.clock.now().timestamp();
        let ttl = i64::try_from(self.ttl_seconds)
            .map_err(|_| AtmError::internal("token lifetime out of range"))?;
        let claims = Claims {
            sub: user_id.to_string(),
            card_number: card_number.to_string(),
            account_number: account_number.to_string(),
            iat: now,
            exp: now.saturating_add(ttl),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AtmError::internal(format!("token signing failed: {e}")))
    }

    fn expiration_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    fn verify(&self, token: &str) -> Result<CallerIdentity> {
        // Expiry is checked against the injected clock below.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            tracing::warn!(error = %e, "session token rejected");
            AtmError::Unauthorized
        })?;
        if data.claims.exp <= self.clock.now().timestamp() {
            tracing::warn!("session token expired");
            return Err(AtmError::Unauthorized);
        }
        let user_id = Uuid::parse_str(&data.claims.sub).map_err(|_| AtmError::Unauthorized)?;
        Ok(CallerIdentity {
            user_id,
            card_number: data.claims.card_number,
            account_number: data.claims.account_number,
        })
    }
}

/// A caller owns exactly the card its session was opened with.
#[derive(Debug, Default, Clone, Copy)]
pub struct SessionOwnership;

impl OwnershipChecker for SessionOwnership {
    fn owns_card(&self, caller: &CallerIdentity, card_number: &str) -> bool {
        !card_number.is_empty() && caller.card_number == card_number
    }
}
