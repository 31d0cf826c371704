use crate::application::orchestrator::AtmTransactionOrchestrator;
use crate::application::registration::RegistrationService;
use crate::application::requests::{
    LoginRequest, OperationsRequest, RegisterRequest, UnblockRequest, WithdrawRequest,
    validate_card_number,
};
use crate::domain::ports::{CallerIdentity, TokenIssuerRef};
use crate::error::{AtmError, Result};
use crate::interfaces::csv::command_reader::{CommandRow, ScriptOp};
use crate::interfaces::output::OutputLine;
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::HashMap;

const DEFAULT_PAGE_SIZE: u32 = 10;

fn field(value: Option<String>, name: &str) -> Result<String> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AtmError::Validation(format!("{name} is required")))
}

fn to_value<T: Serialize>(response: T) -> Result<Value> {
    Ok(serde_json::to_value(response)?)
}

/// Plays an ATM script against the services, one command at a time.
///
/// A successful `login` keeps its token for that card; later commands on the
/// same card present it and are checked against it.
pub struct ScriptRunner {
    atm: AtmTransactionOrchestrator,
    registration: RegistrationService,
    tokens: TokenIssuerRef,
    sessions: HashMap<String, String>,
}

impl ScriptRunner {
    pub fn new(
        atm: AtmTransactionOrchestrator,
        registration: RegistrationService,
        tokens: TokenIssuerRef,
    ) -> Self {
        Self {
            atm,
            registration,
            tokens,
            sessions: HashMap::new(),
        }
    }

    pub async fn execute(&mut self, row: CommandRow) -> OutputLine {
        let op = row.op.as_str();
        match self.dispatch(row).await {
            Ok(value) => OutputLine::ok(op, value),
            Err(e) => OutputLine::error(op, &e),
        }
    }

    async fn dispatch(&mut self, row: CommandRow) -> Result<Value> {
        match row.op {
            ScriptOp::Register => {
                let request = RegisterRequest {
                    first_name: field(row.first_name, "first_name")?,
                    last_name: field(row.last_name, "last_name")?,
                    document_number: field(row.document, "document")?,
                    card_number: row.card,
                    pin: field(row.pin, "pin")?,
                    initial_balance: row
                        .amount
                        .ok_or_else(|| AtmError::Validation("amount is required".to_string()))?,
                    expiry: field(row.expiry, "expiry")?,
                };
                request.validate()?;
                to_value(self.registration.register(&request).await?)
            }
            ScriptOp::Login => {
                let request = LoginRequest {
                    card_number: row.card,
                    pin: field(row.pin, "pin")?,
                };
                request.validate()?;
                let response = self.atm.login(&request.card_number, &request.pin).await?;
                self.sessions
                    .insert(request.card_number, response.token.clone());
                to_value(response)
            }
            ScriptOp::Balance => {
                validate_card_number(&row.card)?;
                let caller = self.caller(&row.card)?;
                to_value(self.atm.get_balance(&row.card, &caller).await?)
            }
            ScriptOp::Withdraw => {
                let request = WithdrawRequest {
                    card_number: row.card,
                    amount: row
                        .amount
                        .ok_or_else(|| AtmError::Validation("amount is required".to_string()))?,
                };
                request.validate()?;
                let caller = self.caller(&request.card_number)?;
                to_value(
                    self.atm
                        .withdraw(&request.card_number, request.amount, &caller)
                        .await?,
                )
            }
            ScriptOp::Operations => {
                let request = OperationsRequest {
                    card_number: row.card,
                    page: row.page.unwrap_or(1),
                    page_size: row.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
                };
                request.validate()?;
                let caller = self.caller(&request.card_number)?;
                to_value(
                    self.atm
                        .get_operations(
                            &request.card_number,
                            request.page,
                            request.page_size,
                            &caller,
                        )
                        .await?,
                )
            }
            ScriptOp::Unblock => {
                let new_pin = field(row.pin, "pin")?;
                let request = UnblockRequest {
                    card_number: row.card,
                    document_number: field(row.document, "document")?,
                    confirm_pin: new_pin.clone(),
                    new_pin,
                };
                request.validate()?;
                let response = self
                    .atm
                    .unblock(
                        &request.card_number,
                        &request.document_number,
                        &request.new_pin,
                    )
                    .await?;
                self.sessions.remove(&request.card_number);
                to_value(response)
            }
            ScriptOp::Check => {
                validate_card_number(&row.card)?;
                let usable = self.atm.is_card_usable(&row.card).await?;
                Ok(json!({ "usable": usable }))
            }
        }
    }

    fn caller(&self, card_number: &str) -> Result<CallerIdentity> {
        let token = self
            .sessions
            .get(card_number)
            .ok_or(AtmError::Unauthorized)?;
        self.tokens.verify(token)
    }
}
