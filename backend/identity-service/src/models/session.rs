use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Claim set carried inside a session token.
///
/// `exp` is always present on the wire but never trusted from the
/// caller: the codec discards whatever is here and recomputes it at
/// encode time from the configured lifetime.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Stable user identifier. Empty only before a sign-in has completed.
    #[serde(default)]
    pub sub: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Expiry as a Unix timestamp, recomputed on every encode
    #[serde(default)]
    pub exp: i64,
}

impl SessionClaims {
    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// The subset of a decoded claim set exposed to the presentation layer.
///
/// Derived on each successful decode, never persisted on its own, and
/// never carries the raw token or the signing secret.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub subject: String,
    pub roles: Vec<String>,
    pub username: Option<String>,
    pub expires_at: DateTime<Utc>,
}
