//! Postgres-backed identity adapter
//!
//! Idempotency of `find_or_create_account` rests on a uniqueness
//! constraint over `(provider, provider_account_id)`; concurrent
//! first-time sign-ins land on the same row via `ON CONFLICT`.
//! Verification tokens are stored as SHA-256 digests and consumed with
//! a single `DELETE ... RETURNING`, which is the atomic
//! read-and-invalidate.
//!
//! Expected schema:
//!
//! ```sql
//! CREATE TABLE accounts (
//!     id UUID PRIMARY KEY,
//!     subject TEXT NOT NULL,
//!     provider TEXT NOT NULL,
//!     provider_account_id TEXT NOT NULL,
//!     email TEXT,
//!     username TEXT,
//!     roles TEXT[] NOT NULL DEFAULT '{}',
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     UNIQUE (provider, provider_account_id)
//! );
//!
//! CREATE TABLE verification_tokens (
//!     token_hash TEXT PRIMARY KEY,
//!     identifier TEXT NOT NULL,
//!     expires_at TIMESTAMPTZ NOT NULL
//! );
//! ```

use super::{generate_token, hash_token, IdentityAdapter};
use crate::config::DatabaseSettings;
use crate::error::{IdentityError, Result};
use crate::models::{Account, ProviderIdentity};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::future::Future;
use std::time::Duration as StdDuration;
use tracing::info;
use uuid::Uuid;

pub struct PgIdentityAdapter {
    pool: PgPool,
    operation_timeout: StdDuration,
    verification_token_ttl: Duration,
}

impl PgIdentityAdapter {
    pub fn new(pool: PgPool, operation_timeout_secs: u64, verification_token_ttl_secs: u64) -> Self {
        Self {
            pool,
            operation_timeout: StdDuration::from_secs(operation_timeout_secs),
            verification_token_ttl: Duration::seconds(verification_token_ttl_secs as i64),
        }
    }

    /// Connect a pool from settings and wrap it.
    pub async fn connect(
        settings: &DatabaseSettings,
        verification_token_ttl_secs: u64,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(StdDuration::from_secs(settings.operation_timeout))
            .connect(&settings.url)
            .await?;

        Ok(Self::new(
            pool,
            settings.operation_timeout,
            verification_token_ttl_secs,
        ))
    }

    /// Every store operation is bounded; a timeout is an infrastructure
    /// failure, never "not signed in".
    async fn bounded<T>(&self, fut: impl Future<Output = Result<T>> + Send) -> Result<T> {
        match tokio::time::timeout(self.operation_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(IdentityError::AdapterUnavailable(
                "identity store operation timed out".to_string(),
            )),
        }
    }
}

#[async_trait]
impl IdentityAdapter for PgIdentityAdapter {
    async fn find_account(&self, identity: &ProviderIdentity) -> Result<Option<Account>> {
        self.bounded(async {
            let account = sqlx::query_as::<_, Account>(
                r#"
                SELECT id, subject, email, username, roles, created_at, updated_at
                FROM accounts
                WHERE provider = $1 AND provider_account_id = $2
                "#,
            )
            .bind(identity.provider.as_str())
            .bind(&identity.provider_account_id)
            .fetch_optional(&self.pool)
            .await?;

            Ok(account)
        })
        .await
    }

    async fn find_or_create_account(&self, identity: &ProviderIdentity) -> Result<Account> {
        let id = Uuid::new_v4();
        let subject = identity.subject().to_string();

        self.bounded(async {
            // The conflict target makes concurrent first sign-ins
            // converge on one row. A fresher provider profile may update
            // contact fields; roles stay store-owned.
            let account = sqlx::query_as::<_, Account>(
                r#"
                INSERT INTO accounts (id, subject, provider, provider_account_id, email, username)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (provider, provider_account_id) DO UPDATE
                SET email = COALESCE(EXCLUDED.email, accounts.email),
                    username = COALESCE(EXCLUDED.username, accounts.username),
                    updated_at = NOW()
                RETURNING id, subject, email, username, roles, created_at, updated_at
                "#,
            )
            .bind(id)
            .bind(&subject)
            .bind(identity.provider.as_str())
            .bind(&identity.provider_account_id)
            .bind(&identity.email)
            .bind(&identity.name)
            .fetch_one(&self.pool)
            .await?;

            Ok(account)
        })
        .await
    }

    async fn issue_verification_token(&self, identifier: &str) -> Result<String> {
        let raw_token = generate_token();
        let token_hash = hash_token(&raw_token);
        let expires_at = Utc::now() + self.verification_token_ttl;

        self.bounded(async {
            sqlx::query(
                r#"
                INSERT INTO verification_tokens (token_hash, identifier, expires_at)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(&token_hash)
            .bind(identifier)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;

            info!(identifier = %mask_identifier(identifier), "verification token issued");
            Ok(())
        })
        .await?;

        Ok(raw_token)
    }

    async fn consume_verification_token(&self, token: &str) -> Result<String> {
        let token_hash = hash_token(token);

        self.bounded(async {
            // DELETE ... RETURNING is the atomic read-and-invalidate: of
            // two concurrent consumers exactly one sees the row.
            let row = sqlx::query_as::<_, (String, DateTime<Utc>)>(
                r#"
                DELETE FROM verification_tokens
                WHERE token_hash = $1
                RETURNING identifier, expires_at
                "#,
            )
            .bind(&token_hash)
            .fetch_optional(&self.pool)
            .await?;

            match row {
                Some((identifier, expires_at)) => {
                    if expires_at < Utc::now() {
                        // Already invalidated by the DELETE; the token
                        // stays single-use even on this failure path.
                        return Err(IdentityError::VerificationTokenExpired);
                    }
                    Ok(identifier)
                }
                None => Err(IdentityError::VerificationTokenNotFound),
            }
        })
        .await
    }
}

/// Mask an identifier (usually an email address) before logging
fn mask_identifier(identifier: &str) -> String {
    match identifier.split_once('@') {
        Some((local, domain)) => {
            let visible = local.chars().next().map(String::from).unwrap_or_default();
            format!("{visible}***@{domain}")
        }
        None => "***".to_string(),
    }
}
