//! In-memory identity adapter
//!
//! A conforming store with no external dependencies, used in tests and
//! local development. The single mutex gives the same atomicity the
//! Postgres adapter gets from its uniqueness constraint and
//! `DELETE ... RETURNING`.

use super::{generate_token, hash_token, IdentityAdapter};
use crate::error::{IdentityError, Result};
use crate::models::{Account, Provider, ProviderIdentity};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Debug)]
struct StoredToken {
    identifier: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct State {
    accounts: HashMap<(Provider, String), Account>,
    verification_tokens: HashMap<String, StoredToken>,
}

#[derive(Debug)]
pub struct MemoryAdapter {
    state: Mutex<State>,
    verification_token_ttl: Duration,
}

impl MemoryAdapter {
    pub fn new(verification_token_ttl_secs: u64) -> Self {
        Self {
            state: Mutex::new(State::default()),
            verification_token_ttl: Duration::seconds(verification_token_ttl_secs as i64),
        }
    }

    /// Grant roles to an account out-of-band, as the backing store's
    /// administration would.
    pub fn grant_roles(&self, identity: &ProviderIdentity, roles: &[&str]) {
        let mut state = self.state.lock().expect("adapter state poisoned");
        if let Some(account) = state
            .accounts
            .get_mut(&(identity.provider, identity.provider_account_id.clone()))
        {
            account.roles = roles.iter().map(|r| r.to_string()).collect();
            account.updated_at = Utc::now();
        }
    }
}

impl Default for MemoryAdapter {
    fn default() -> Self {
        Self::new(24 * 60 * 60)
    }
}

#[async_trait]
impl IdentityAdapter for MemoryAdapter {
    async fn find_account(&self, identity: &ProviderIdentity) -> Result<Option<Account>> {
        let state = self.state.lock().expect("adapter state poisoned");
        Ok(state
            .accounts
            .get(&(identity.provider, identity.provider_account_id.clone()))
            .cloned())
    }

    async fn find_or_create_account(&self, identity: &ProviderIdentity) -> Result<Account> {
        let mut state = self.state.lock().expect("adapter state poisoned");
        let key = (identity.provider, identity.provider_account_id.clone());

        let account = state
            .accounts
            .entry(key)
            .and_modify(|account| {
                if account.email.is_none() {
                    account.email = identity.email.clone();
                }
                if account.username.is_none() {
                    account.username = identity.name.clone();
                }
                account.updated_at = Utc::now();
            })
            .or_insert_with(|| {
                let now = Utc::now();
                Account {
                    id: Uuid::new_v4(),
                    subject: identity.subject().to_string(),
                    email: identity.email.clone(),
                    username: identity.name.clone(),
                    roles: Vec::new(),
                    created_at: now,
                    updated_at: now,
                }
            });

        Ok(account.clone())
    }

    async fn issue_verification_token(&self, identifier: &str) -> Result<String> {
        let raw_token = generate_token();
        let mut state = self.state.lock().expect("adapter state poisoned");

        state.verification_tokens.insert(
            hash_token(&raw_token),
            StoredToken {
                identifier: identifier.to_string(),
                expires_at: Utc::now() + self.verification_token_ttl,
            },
        );

        Ok(raw_token)
    }

    async fn consume_verification_token(&self, token: &str) -> Result<String> {
        let mut state = self.state.lock().expect("adapter state poisoned");

        // Removal before the expiry check keeps the token single-use on
        // every path.
        match state.verification_tokens.remove(&hash_token(token)) {
            Some(stored) if stored.expires_at < Utc::now() => {
                Err(IdentityError::VerificationTokenExpired)
            }
            Some(stored) => Ok(stored.identifier),
            None => Err(IdentityError::VerificationTokenNotFound),
        }
    }
}
