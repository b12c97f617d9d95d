use thiserror::Error;

pub type Result<T> = std::result::Result<T, IdentityError>;

#[derive(Debug, Error)]
pub enum IdentityError {
    /// Bad signature, foreign header algorithm, or expired token.
    /// Callers must treat this exactly like an absent token.
    #[error("Invalid token")]
    TokenInvalid,

    /// The sign-in authorization gate refused the identity.
    #[error("Sign-in denied")]
    SignInDenied,

    /// The identity store could not be reached or failed mid-operation.
    /// Fatal for the current request; never downgraded to "not signed in",
    /// otherwise an outage would look like a mass logout.
    #[error("Identity store unavailable: {0}")]
    AdapterUnavailable(String),

    #[error("Verification token expired")]
    VerificationTokenExpired,

    #[error("Verification token not found")]
    VerificationTokenNotFound,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl IdentityError {
    /// Failures that resolve to an anonymous session rather than a
    /// server error. The UI only ever sees "authenticated" or "not".
    pub fn is_no_session(&self) -> bool {
        matches!(
            self,
            IdentityError::TokenInvalid | IdentityError::SignInDenied
        )
    }
}

// Conversions from external error types
impl From<sqlx::Error> for IdentityError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Identity store error: {}", err);
        IdentityError::AdapterUnavailable(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for IdentityError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        tracing::debug!("Token verification failed: {}", err);
        IdentityError::TokenInvalid
    }
}
