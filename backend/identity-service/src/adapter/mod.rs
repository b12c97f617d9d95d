//! Identity storage boundary
//!
//! The callback pipeline talks to durable identity storage exclusively
//! through [`IdentityAdapter`]. Any store conforms if it honors two
//! guarantees:
//!
//! - `find_or_create_account` behaves as if atomic: concurrent
//!   first-time sign-ins for the same provider identity resolve to one
//!   account with one subject
//! - verification tokens are consumed with an atomic read-and-invalidate,
//!   so a token can never be redeemed twice
//!
//! Storage failures surface as [`IdentityError::AdapterUnavailable`] and
//! are fatal for the request in progress.

mod memory;
mod postgres;

pub use memory::MemoryAdapter;
pub use postgres::PgIdentityAdapter;

use crate::error::Result;
use crate::models::{Account, ProviderIdentity};
use async_trait::async_trait;
use rand::{distributions::Alphanumeric, Rng};
use sha2::{Digest, Sha256};

/// Verification token length (before hashing)
const VERIFICATION_TOKEN_LENGTH: usize = 32;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityAdapter: Send + Sync {
    /// Look up the durable account for a provider identity without
    /// writing anything. The authorization gate consults this view
    /// before any account is created or updated.
    async fn find_account(&self, identity: &ProviderIdentity) -> Result<Option<Account>>;

    /// Resolve the durable account for a provider identity, creating it
    /// on first sign-in. Idempotent: the same identity always yields the
    /// same subject.
    async fn find_or_create_account(&self, identity: &ProviderIdentity) -> Result<Account>;

    /// Issue a single-use verification token for a sign-in identifier
    /// (the email address for magic-link sign-in). Returns the raw
    /// token; the store keeps only a digest.
    async fn issue_verification_token(&self, identifier: &str) -> Result<String>;

    /// Consume a verification token, returning the identifier it was
    /// issued for. Consumption invalidates the token even when the call
    /// then fails with `VerificationTokenExpired`.
    async fn consume_verification_token(&self, token: &str) -> Result<String>;
}

/// Generate a secure random verification token
fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(VERIFICATION_TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// Hash a verification token using SHA-256
fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}
