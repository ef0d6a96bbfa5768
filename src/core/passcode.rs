use crate::common::clock::Clock;
use crate::common::error::Result;
use crate::storage::{AttendancePasscode, AttendanceStore};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

/// 36-symbol alphabet; at 6 characters the code space is ~2.2e9, which
/// keeps collision odds negligible over a 60-second validity window.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Retries on the astronomically unlikely code collision at issue time.
const MAX_ISSUE_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone)]
pub struct IssuedPasscode {
    pub code: String,
    pub valid_for_seconds: u64,
}

/// Issues short-lived single-use passcodes and consumes them atomically.
pub struct PasscodeService {
    store: Arc<dyn AttendanceStore>,
    clock: Arc<dyn Clock>,
    validity: Duration,
    code_length: usize,
}

impl PasscodeService {
    pub fn new(
        store: Arc<dyn AttendanceStore>,
        clock: Arc<dyn Clock>,
        validity: Duration,
        code_length: usize,
    ) -> Self {
        Self {
            store,
            clock,
            validity,
            code_length,
        }
    }

    /// Issue a fresh passcode bound to `auth_uid`, stored keyed by the code
    /// itself so redemption is a direct lookup.
    pub fn issue(&self, auth_uid: &str) -> Result<IssuedPasscode> {
        let now = self.clock.now();
        let expires_at = now + chrono::Duration::from_std(self.validity).unwrap_or_default();

        let mut attempt = 0;
        loop {
            let code = generate_code(self.code_length);
            let passcode = AttendancePasscode {
                code: code.clone(),
                student_auth_uid: auth_uid.to_string(),
                issued_at: now,
                expires_at,
                used: false,
                used_at: None,
            };
            match self.store.insert_passcode(&passcode) {
                Ok(()) => {
                    tracing::info!("Issued passcode for {} (expires {})", auth_uid, expires_at);
                    return Ok(IssuedPasscode {
                        code,
                        valid_for_seconds: self.validity.as_secs(),
                    });
                }
                Err(e) if e.is_retryable() && attempt < MAX_ISSUE_ATTEMPTS => {
                    attempt += 1;
                    tracing::warn!("Passcode collision, regenerating (attempt {})", attempt);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Look up and consume a passcode. The used flag flips before any
    /// downstream lookup runs: two racing redemptions of the same code get
    /// exactly one success, at the cost of burning the code if a later
    /// step fails.
    pub fn consume(&self, code: &str) -> Result<AttendancePasscode> {
        self.store.consume_passcode(code, self.clock.now())
    }
}

fn generate_code(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}
