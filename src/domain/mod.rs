//! Entities, value objects and the ports the application layer talks to.

pub mod account;
pub mod authenticator;
pub mod card;
pub mod clock;
pub mod ledger;
pub mod ports;
pub mod transaction;
pub mod user;
