#![allow(dead_code)]

use atm_core::application::orchestrator::{AtmTransactionOrchestrator, Collaborators};
use atm_core::application::registration::RegistrationService;
use atm_core::application::requests::RegisterRequest;
use atm_core::domain::clock::FixedClock;
use atm_core::domain::ports::{CallerIdentity, Stores, TokenIssuer, TokenIssuerRef};
use atm_core::infrastructure::in_memory::InMemoryStore;
use atm_core::infrastructure::security::{Argon2PinHasher, JwtTokenIssuer, SessionOwnership};
use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

pub const SCRIPT_HEADER: &str =
    "op,card,pin,amount,document,first_name,last_name,expiry,page,page_size";

pub struct Harness {
    pub atm: AtmTransactionOrchestrator,
    pub registration: RegistrationService,
    pub stores: Stores,
    pub clock: FixedClock,
    pub tokens: TokenIssuerRef,
}

impl Harness {
    pub fn new() -> Self {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap());
        let stores = Stores::from_backend(InMemoryStore::new());
        let tokens: TokenIssuerRef = Arc::new(JwtTokenIssuer::new(
            "integration-secret",
            900,
            Arc::new(clock.clone()),
        ));
        let collaborators = Collaborators {
            hasher: Arc::new(Argon2PinHasher::new()),
            tokens: tokens.clone(),
            ownership: Arc::new(SessionOwnership),
            clock: Arc::new(clock.clone()),
        };
        let registration = RegistrationService::new(
            stores.clone(),
            collaborators.hasher.clone(),
            collaborators.clock.clone(),
        );
        Self {
            atm: AtmTransactionOrchestrator::new(stores.clone(), collaborators),
            registration,
            stores,
            clock,
            tokens,
        }
    }

    /// Registers a customer holding `card_number` with PIN 1234.
    pub async fn customer(&self, card_number: &str, document: &str, balance: Decimal) {
        self.registration
            .register(&RegisterRequest {
                first_name: "Ada".to_string(),
                last_name: "Lovelace".to_string(),
                document_number: document.to_string(),
                card_number: card_number.to_string(),
                pin: "1234".to_string(),
                initial_balance: balance,
                expiry: "12/2030".to_string(),
            })
            .await
            .unwrap();
    }

    /// Opens a session the way a terminal would.
    pub async fn session(&self, card_number: &str, pin: &str) -> CallerIdentity {
        let login = self.atm.login(card_number, pin).await.unwrap();
        self.tokens.verify(&login.token).unwrap()
    }

    /// Drives the card to the lockout through wrong PINs.
    pub async fn fail_logins(&self, card_number: &str, times: usize) {
        for _ in 0..times {
            assert!(self.atm.login(card_number, "0000").await.is_err());
        }
    }
}

/// Writes an ATM script with the standard header.
pub fn write_script(rows: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{SCRIPT_HEADER}").unwrap();
    for row in rows {
        writeln!(file, "{row}").unwrap();
    }
    file
}

/// Parses one JSON object per stdout line.
pub fn json_lines(stdout: &[u8]) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}
