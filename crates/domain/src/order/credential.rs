//! Pickup credential issued when an order becomes ready.

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

/// Number of random bytes in a pickup token (hex encoded to twice as many chars).
pub const TOKEN_BYTES: usize = 32;

/// A single-use, time-limited token proving physical presence at handoff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickupCredential {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl PickupCredential {
    /// Issues a fresh credential from the OS random source, valid for `ttl`.
    pub fn issue(now: DateTime<Utc>, ttl: Duration) -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self {
            token: hex::encode(bytes),
            expires_at: now + ttl,
        }
    }

    /// The credential is valid up to and including `expires_at`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    pub fn matches(&self, token: &str) -> bool {
        self.token == token
    }
}
