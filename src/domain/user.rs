use crate::error::{AtmError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A card holder. Immutable once registered.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct User {
    id: Uuid,
    first_name: String,
    last_name: String,
    document_number: String,
    active: bool,
    created_at: DateTime<Utc>,
}

impl User {
    pub fn new(
        first_name: &str,
        last_name: &str,
        document_number: &str,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let first_name = required(first_name, "first name")?;
        let last_name = required(last_name, "last name")?;
        let document_number = required(document_number, "document number")?;

        Ok(Self {
            id: Uuid::new_v4(),
            first_name,
            last_name,
            document_number,
            active: true,
            created_at: now,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn first_name(&self) -> &str {
        &self.first_name
    }

    pub fn last_name(&self) -> &str {
        &self.last_name
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn document_number(&self) -> &str {
        &self.document_number
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

pub(crate) fn required(value: &str, field: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AtmError::Validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}
