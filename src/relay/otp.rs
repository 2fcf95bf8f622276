//! One-time code store.
//!
//! Codes live in process memory keyed by lower-cased email, so they are lost
//! on restart and are only valid on the instance that issued them. Expiry is
//! the caller's job; a code stays valid until it is used or replaced.

use rand::Rng;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

pub const OTP_DIGITS: usize = 6;

#[derive(Debug, Default)]
pub struct OtpStore {
    codes: Mutex<HashMap<String, String>>,
}

fn key(email: &str) -> String { email.trim().to_lowercase() }

impl OtpStore {
    pub fn new() -> Self { Self::default() }

    /// Issues a fresh code for `email`, replacing any earlier one.
    pub fn issue(&self, email: &str) -> String {
        let code = format!("{:0width$}", rand::thread_rng().gen_range(0..1_000_000u32), width = OTP_DIGITS);
        self.codes.lock().unwrap_or_else(PoisonError::into_inner).insert(key(email), code.clone());
        code
    }

    /// A matching code is consumed; a wrong one leaves the stored code in place.
    pub fn verify(&self, email: &str, code: &str) -> bool {
        let mut codes = self.codes.lock().unwrap_or_else(PoisonError::into_inner);
        let k = key(email);
        if codes.get(&k).is_some_and(|c| c == code.trim()) {
            codes.remove(&k);
            return true;
        }
        false
    }

    pub fn revoke(&self, email: &str) {
        self.codes.lock().unwrap_or_else(PoisonError::into_inner).remove(&key(email));
    }
}
