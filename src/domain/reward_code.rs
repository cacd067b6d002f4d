//! Reward codes
//!
//! Codes are shown to the customer as text and as a QR code, and typed in by
//! staff when scanning fails, so the alphabet leaves out look-alike
//! characters (0/O, 1/I/L).

use rand::Rng;

const ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Shortest code length accepted from configuration
pub const MIN_CODE_LENGTH: usize = 8;

/// Default code length (31^10, about 2^49 codes)
pub const DEFAULT_CODE_LENGTH: usize = 10;

/// Generates random reward codes
#[derive(Debug, Clone, Copy)]
pub struct RewardCodeGenerator {
    length: usize,
}

impl RewardCodeGenerator {
    pub fn new(length: usize) -> Self {
        Self {
            length: length.max(MIN_CODE_LENGTH),
        }
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// Draw a fresh code from the thread-local CSPRNG
    pub fn generate(&self) -> String {
        let mut rng = rand::thread_rng();
        (0..self.length)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect()
    }
}

impl Default for RewardCodeGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_CODE_LENGTH)
    }
}

/// Normalize a code as entered by staff
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}
