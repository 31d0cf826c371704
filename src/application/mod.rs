//! Use-case services composed from domain rules and ports.
//!
//! [`orchestrator::AtmTransactionOrchestrator`] is the entry point for card
//! holders; [`registration::RegistrationService`] onboards them.

pub mod dto;
pub mod orchestrator;
pub mod recorder;
pub mod registration;
pub mod requests;
