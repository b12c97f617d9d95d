//! Sign-in callback pipeline
//!
//! Three stages, in fixed order:
//!
//! 1. **Authorization gate** (`sign_in`) — the sole place to deny a
//!    sign-in. Default policy: allow.
//! 2. **Claim merge** (`jwt`) — runs once at sign-in; on later requests
//!    it is a pass-through over the decoded token. Precedence is
//!    existing token claim, then account record, then provider profile,
//!    first non-empty value wins, so a stale provider profile never
//!    clobbers established claims.
//! 3. **Session projection** (`session`) — the only output that crosses
//!    to the presentation layer. Never includes the raw token or the
//!    signing secret.
//!
//! Gate rejection and token-verification failure are user-facing
//! "not signed in" outcomes. Adapter failures propagate as
//! infrastructure errors.

use crate::adapter::IdentityAdapter;
use crate::error::{IdentityError, Result};
use crate::models::{Account, ProviderIdentity, Session, SessionClaims};
use crate::token::TokenCodec;
use std::sync::Arc;
use tracing::{info, warn};

/// Provider data available only at sign-in time. Absent on ordinary
/// requests, where the merge stage passes the decoded claims through.
pub struct SignInData {
    pub identity: ProviderIdentity,
    pub account: Account,
}

/// Policy hooks evaluated during sign-in and session materialization.
///
/// The default implementations reproduce the stock behavior; an
/// application overrides individual stages (a domain allow-list in
/// `sign_in`, an extra claim in `jwt`) without touching token logic.
pub trait SignInCallbacks: Send + Sync {
    /// Authorization gate. `account` is the store's existing record for
    /// the identity, if any; nothing has been written at this point, and
    /// returning `false` aborts the pipeline before anything is.
    fn sign_in(&self, _identity: &ProviderIdentity, _account: Option<&Account>) -> bool {
        true
    }

    /// Claim merge. `sign_in_data` is `Some` exactly once per sign-in
    /// attempt and `None` on every later request.
    fn jwt(&self, claims: SessionClaims, sign_in_data: Option<&SignInData>) -> SessionClaims {
        match sign_in_data {
            Some(data) => merge_claims(claims, &data.account, &data.identity),
            None => claims,
        }
    }

    /// Session projection into the externally visible shape.
    fn session(&self, claims: &SessionClaims) -> Session {
        project_session(claims)
    }
}

/// Stock callbacks used when the application installs no overrides.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCallbacks;

impl SignInCallbacks for DefaultCallbacks {}

/// Merge account and provider data into the claim set, token-first.
///
/// Idempotent: merging into an already fully populated claim set
/// changes nothing.
pub fn merge_claims(
    mut claims: SessionClaims,
    account: &Account,
    identity: &ProviderIdentity,
) -> SessionClaims {
    if claims.sub.is_empty() {
        claims.sub = account.subject.clone();
    }
    if claims.sub.is_empty() {
        if let Some(email) = &identity.email {
            claims.sub = email.clone();
        }
    }
    if claims.roles.is_empty() {
        claims.roles = account.roles.clone();
    }
    if claims.username.is_none() {
        claims.username = account.username.clone().or_else(|| identity.name.clone());
    }
    claims
}

fn project_session(claims: &SessionClaims) -> Session {
    Session {
        subject: claims.sub.clone(),
        roles: claims.roles.clone(),
        username: claims.username.clone(),
        expires_at: claims.expires_at(),
    }
}

/// A completed sign-in: the signed token that round-trips with the
/// client, and the session projection handed to the presentation layer.
#[derive(Debug, Clone)]
pub struct SignInOutcome {
    pub token: String,
    pub session: Session,
}

/// Orchestrates the pipeline: once per sign-in attempt, once per
/// request for session materialization. Owns the stage order; the
/// callbacks own the policy.
pub struct AuthPipeline<C = DefaultCallbacks> {
    codec: TokenCodec,
    adapter: Arc<dyn IdentityAdapter>,
    callbacks: C,
}

impl AuthPipeline<DefaultCallbacks> {
    pub fn new(codec: TokenCodec, adapter: Arc<dyn IdentityAdapter>) -> Self {
        Self::with_callbacks(codec, adapter, DefaultCallbacks)
    }
}

impl<C: SignInCallbacks> AuthPipeline<C> {
    pub fn with_callbacks(codec: TokenCodec, adapter: Arc<dyn IdentityAdapter>, callbacks: C) -> Self {
        Self {
            codec,
            adapter,
            callbacks,
        }
    }

    /// Complete a sign-in attempt for a resolved provider identity.
    ///
    /// `existing_token` is the client's current token, if any; an
    /// invalid one is treated as absent, so claims established in a
    /// still-valid session survive re-authentication.
    pub async fn sign_in(
        &self,
        identity: ProviderIdentity,
        existing_token: Option<&str>,
    ) -> Result<SignInOutcome> {
        // The gate sees the store's current view through a read-only
        // lookup; a denied identity leaves no record behind.
        let existing_account = self.adapter.find_account(&identity).await?;

        if !self.callbacks.sign_in(&identity, existing_account.as_ref()) {
            warn!(
                provider = identity.provider.as_str(),
                "sign-in denied by authorization gate"
            );
            return Err(IdentityError::SignInDenied);
        }

        let account = self.adapter.find_or_create_account(&identity).await?;

        let existing = match self.codec.decode(existing_token) {
            Ok(claims) => claims,
            Err(err) if err.is_no_session() => None,
            Err(err) => return Err(err),
        };
        let claims = existing.unwrap_or_default();

        let data = SignInData { identity, account };
        let claims = self.callbacks.jwt(claims, Some(&data));

        let token = self.codec.encode(&claims)?;
        // Decode our own token so the projection sees the canonical
        // claim set, stamped expiry included.
        let claims = self
            .codec
            .decode(Some(&token))?
            .ok_or(IdentityError::TokenInvalid)?;
        let session = self.callbacks.session(&claims);

        info!(
            provider = data.identity.provider.as_str(),
            subject = %claims.sub,
            "sign-in completed"
        );

        Ok(SignInOutcome { token, session })
    }

    /// Begin passwordless sign-in: issue a single-use verification
    /// token for `email`. Delivering it is the mailer's job.
    pub async fn start_email_sign_in(&self, email: &str) -> Result<String> {
        self.adapter.issue_verification_token(email).await
    }

    /// Complete passwordless sign-in by redeeming a verification token.
    pub async fn complete_email_sign_in(
        &self,
        verification_token: &str,
        existing_token: Option<&str>,
    ) -> Result<SignInOutcome> {
        let identifier = self
            .adapter
            .consume_verification_token(verification_token)
            .await?;

        self.sign_in(ProviderIdentity::from_email(identifier), existing_token)
            .await
    }

    /// Materialize the session for a request carrying `token`.
    ///
    /// `None` is the anonymous case: absent, expired, and tampered
    /// tokens are indistinguishable to the caller.
    pub fn session(&self, token: Option<&str>) -> Option<Session> {
        let claims = self.codec.decode(token).ok().flatten()?;
        let claims = self.callbacks.jwt(claims, None);
        Some(self.callbacks.session(&claims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{MemoryAdapter, MockIdentityAdapter};
    use crate::models::Provider;
    use chrono::Utc;

    const SECRET: &str = "pipeline-test-secret";

    fn codec() -> TokenCodec {
        TokenCodec::new(SECRET, 30 * 24 * 60 * 60)
    }

    fn github_identity() -> ProviderIdentity {
        ProviderIdentity {
            provider: Provider::GitHub,
            provider_account_id: "gh-1".to_string(),
            email: Some("anna@example.com".to_string()),
            name: Some("anna".to_string()),
        }
    }

    fn account(subject: &str) -> Account {
        let now = Utc::now();
        Account {
            id: uuid::Uuid::new_v4(),
            subject: subject.to_string(),
            email: Some("anna@example.com".to_string()),
            username: Some("anna-from-store".to_string()),
            roles: vec!["drinker".to_string()],
            created_at: now,
            updated_at: now,
        }
    }

    struct DenyAll;
    impl SignInCallbacks for DenyAll {
        fn sign_in(&self, _identity: &ProviderIdentity, _account: Option<&Account>) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn sign_in_issues_token_and_session() {
        let pipeline = AuthPipeline::new(codec(), Arc::new(MemoryAdapter::default()));

        let outcome = pipeline.sign_in(github_identity(), None).await.unwrap();

        assert_eq!(outcome.session.subject, "anna@example.com");
        assert_eq!(outcome.session.username.as_deref(), Some("anna"));
        assert!(outcome.session.expires_at > Utc::now());
        // Compact JWS: header.claims.signature
        assert_eq!(outcome.token.split('.').count(), 3);
    }

    #[tokio::test]
    async fn denied_sign_in_issues_nothing() {
        let mut adapter = MockIdentityAdapter::new();
        adapter.expect_find_account().returning(|_| Ok(None));
        // No find_or_create_account expectation: a denial must not
        // reach any write.
        let pipeline = AuthPipeline::with_callbacks(codec(), Arc::new(adapter), DenyAll);

        let result = pipeline.sign_in(github_identity(), None).await;

        assert!(matches!(result, Err(IdentityError::SignInDenied)));
        assert!(result.unwrap_err().is_no_session());
    }

    #[tokio::test]
    async fn denied_sign_in_leaves_no_account() {
        let adapter = Arc::new(MemoryAdapter::default());
        let denying = AuthPipeline::with_callbacks(codec(), adapter.clone(), DenyAll);

        let mut denied_profile = github_identity();
        denied_profile.name = Some("name-from-denied-attempt".to_string());
        assert!(matches!(
            denying.sign_in(denied_profile, None).await,
            Err(IdentityError::SignInDenied)
        ));

        // The store holds no trace of the denied identity.
        assert_eq!(adapter.find_account(&github_identity()).await.unwrap(), None);

        // The first successful sign-in owns the account's profile
        // fields; nothing from the denied attempt shadows them.
        let allowing = AuthPipeline::new(codec(), adapter.clone());
        let outcome = allowing.sign_in(github_identity(), None).await.unwrap();
        assert_eq!(outcome.session.username.as_deref(), Some("anna"));
    }

    #[tokio::test]
    async fn adapter_failure_is_not_a_sign_in_denial() {
        let mut adapter = MockIdentityAdapter::new();
        adapter.expect_find_account().returning(|_| Ok(None));
        adapter.expect_find_or_create_account().returning(|_| {
            Err(IdentityError::AdapterUnavailable("connection refused".to_string()))
        });
        let pipeline = AuthPipeline::new(codec(), Arc::new(adapter));

        let err = pipeline.sign_in(github_identity(), None).await.unwrap_err();

        assert!(matches!(err, IdentityError::AdapterUnavailable(_)));
        assert!(!err.is_no_session());
    }

    #[tokio::test]
    async fn merge_prefers_existing_token_claims() {
        let mut adapter = MockIdentityAdapter::new();
        adapter.expect_find_account().returning(|_| Ok(None));
        adapter
            .expect_find_or_create_account()
            .returning(|_| Ok(account("store-subject")));
        let pipeline = AuthPipeline::new(codec(), Arc::new(adapter));

        let existing = codec()
            .encode(&SessionClaims {
                sub: "established-subject".to_string(),
                roles: vec!["admin".to_string()],
                username: Some("established".to_string()),
                exp: 0,
            })
            .unwrap();

        let outcome = pipeline
            .sign_in(github_identity(), Some(&existing))
            .await
            .unwrap();

        assert_eq!(outcome.session.subject, "established-subject");
        assert_eq!(outcome.session.roles, vec!["admin"]);
        assert_eq!(outcome.session.username.as_deref(), Some("established"));
    }

    #[tokio::test]
    async fn merge_backfills_from_account_before_profile() {
        let mut adapter = MockIdentityAdapter::new();
        adapter.expect_find_account().returning(|_| Ok(None));
        adapter
            .expect_find_or_create_account()
            .returning(|_| Ok(account("store-subject")));
        let pipeline = AuthPipeline::new(codec(), Arc::new(adapter));

        let outcome = pipeline.sign_in(github_identity(), None).await.unwrap();

        // No token claims existed, so the account record wins over the
        // provider profile ("anna").
        assert_eq!(outcome.session.subject, "store-subject");
        assert_eq!(outcome.session.roles, vec!["drinker"]);
        assert_eq!(outcome.session.username.as_deref(), Some("anna-from-store"));
    }

    #[test]
    fn merge_is_idempotent_on_full_claim_sets() {
        let full = SessionClaims {
            sub: "subject".to_string(),
            roles: vec!["drinker".to_string()],
            username: Some("anna".to_string()),
            exp: 42,
        };

        let merged = merge_claims(full.clone(), &account("other"), &github_identity());
        assert_eq!(merged, full);

        let merged_again = merge_claims(merged.clone(), &account("other"), &github_identity());
        assert_eq!(merged_again, merged);
    }

    #[tokio::test]
    async fn invalid_existing_token_is_treated_as_absent() {
        let pipeline = AuthPipeline::new(codec(), Arc::new(MemoryAdapter::default()));

        let outcome = pipeline
            .sign_in(github_identity(), Some("tampered.token.here"))
            .await
            .unwrap();

        assert_eq!(outcome.session.subject, "anna@example.com");
    }

    #[tokio::test]
    async fn session_materialization_round_trip() {
        let pipeline = AuthPipeline::new(codec(), Arc::new(MemoryAdapter::default()));
        let outcome = pipeline.sign_in(github_identity(), None).await.unwrap();

        let session = pipeline.session(Some(&outcome.token)).unwrap();
        assert_eq!(session, outcome.session);
    }

    #[test]
    fn absent_and_invalid_tokens_materialize_no_session() {
        let adapter: Arc<dyn IdentityAdapter> = Arc::new(MemoryAdapter::default());
        let pipeline = AuthPipeline::new(codec(), adapter);

        assert!(pipeline.session(None).is_none());
        assert!(pipeline.session(Some("")).is_none());
        assert!(pipeline.session(Some("bad.token.signature")).is_none());
    }

    #[tokio::test]
    async fn email_sign_in_round_trip() {
        let pipeline = AuthPipeline::new(codec(), Arc::new(MemoryAdapter::default()));

        let verification = pipeline
            .start_email_sign_in("anna@example.com")
            .await
            .unwrap();

        let outcome = pipeline
            .complete_email_sign_in(&verification, None)
            .await
            .unwrap();
        assert_eq!(outcome.session.subject, "anna@example.com");

        // The link is spent; clicking it again asks for a new one.
        assert!(matches!(
            pipeline.complete_email_sign_in(&verification, None).await,
            Err(IdentityError::VerificationTokenNotFound)
        ));
    }

    #[tokio::test]
    async fn roles_granted_by_store_reach_the_session() {
        let adapter = Arc::new(MemoryAdapter::default());
        let pipeline = AuthPipeline::new(codec(), adapter.clone());

        // First sign-in creates the account; grant roles afterwards.
        pipeline.sign_in(github_identity(), None).await.unwrap();
        adapter.grant_roles(&github_identity(), &["drinker", "admin"]);

        let outcome = pipeline.sign_in(github_identity(), None).await.unwrap();
        assert_eq!(outcome.session.roles, vec!["drinker", "admin"]);
    }
}
