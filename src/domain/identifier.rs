//! Customer identifiers
//!
//! Staff identify a customer either by scanning the customer's QR code
//! (which carries the customer id) or by typing an email or phone number.

use std::fmt;
use uuid::Uuid;

use super::DomainError;

/// A parsed customer identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CustomerIdentifier {
    Id(Uuid),
    Email(String),
    Phone(String),
}

impl CustomerIdentifier {
    /// Parse a raw identifier.
    ///
    /// UUIDs are customer ids, anything with an `@` is an email (compared
    /// case-insensitively), everything else is a phone number with spaces
    /// and dashes removed.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(DomainError::validation("customer identifier is required"));
        }

        if let Ok(id) = Uuid::parse_str(raw) {
            return Ok(Self::Id(id));
        }

        if raw.contains('@') {
            return Ok(Self::Email(normalize_email(raw)));
        }

        let phone = normalize_phone(raw);
        if phone.is_empty() {
            return Err(DomainError::validation("customer identifier is required"));
        }
        Ok(Self::Phone(phone))
    }
}

impl fmt::Display for CustomerIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{}", id),
            Self::Email(email) => write!(f, "{}", email),
            Self::Phone(phone) => write!(f, "{}", phone),
        }
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn normalize_phone(phone: &str) -> String {
    phone
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '.'))
        .collect()
}
