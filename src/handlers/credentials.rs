//! Credentials
//!
//! API key secrets and store-owner password hashes. Only hashes are stored;
//! an API key secret is handed out once, when it is issued.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHasher, SaltString};
use argon2::Argon2;
use chrono::{DateTime, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::{ApiKeyRecord, Role};

/// Prefix of every issued API key secret
const API_KEY_PREFIX: &str = "slk_";

/// Random bytes in an API key secret
const API_KEY_BYTES: usize = 32;

/// Minimum store owner password length
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// SHA-256 hex digest of an API key secret, as stored in `api_keys.key_hash`
pub fn hash_api_key(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

/// A freshly issued API key: the secret for the caller, the record for storage
#[derive(Debug, Clone)]
pub struct IssuedApiKey {
    pub secret: String,
    pub record: ApiKeyRecord,
}

impl IssuedApiKey {
    /// Generate a random secret bound to a role and optional store/customer
    pub fn generate(
        name: impl Into<String>,
        role: Role,
        store_id: Option<Uuid>,
        customer_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut bytes = [0u8; API_KEY_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        let secret = format!("{}{}", API_KEY_PREFIX, hex::encode(bytes));

        Self::from_secret(secret, name, role, store_id, customer_id, now)
    }

    /// Wrap a known secret, e.g. the configured admin key
    pub fn from_secret(
        secret: String,
        name: impl Into<String>,
        role: Role,
        store_id: Option<Uuid>,
        customer_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Self {
        let record = ApiKeyRecord {
            id: Uuid::new_v4(),
            name: name.into(),
            key_hash: hash_api_key(&secret),
            role,
            store_id,
            customer_id,
            is_active: true,
            created_at: now,
        };

        Self { secret, record }
    }
}

/// Hash a store owner password with Argon2id and a random salt (PHC string)
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}
