//! Script-driven front end: CSV commands in, JSON lines out.

pub mod csv;
pub mod output;
pub mod script;
