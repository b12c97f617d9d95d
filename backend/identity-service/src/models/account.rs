use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Sign-in providers supported by the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Passwordless magic-link sign-in
    Email,
    Google,
    Facebook,
    Twitter,
    GitHub,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Email => "email",
            Provider::Google => "google",
            Provider::Facebook => "facebook",
            Provider::Twitter => "twitter",
            Provider::GitHub => "github",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "email" => Some(Provider::Email),
            "google" => Some(Provider::Google),
            "facebook" => Some(Provider::Facebook),
            "twitter" => Some(Provider::Twitter),
            "github" => Some(Provider::GitHub),
            _ => None,
        }
    }
}

/// Raw profile data returned by an external sign-in method: an OAuth
/// profile, or the claim backing a verified email link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderIdentity {
    pub provider: Provider,
    /// Stable identifier at the provider (`sub` for OAuth providers,
    /// the address itself for email sign-in).
    pub provider_account_id: String,
    pub email: Option<String>,
    /// Display name reported by the provider
    pub name: Option<String>,
}

impl ProviderIdentity {
    /// Identity for a verified email claim
    pub fn from_email(address: impl Into<String>) -> Self {
        let address = address.into();
        Self {
            provider: Provider::Email,
            provider_account_id: address.clone(),
            email: Some(address),
            name: None,
        }
    }

    /// The stable subject this identity resolves to when the store has
    /// no opinion: the email address when present, otherwise the
    /// provider-scoped account id.
    pub fn subject(&self) -> &str {
        self.email
            .as_deref()
            .unwrap_or(&self.provider_account_id)
    }
}

/// Durable identity record held by the adapter's backing store.
///
/// Created on first successful sign-in for a new identity, updated when
/// a provider profile supplies newer data, never deleted by this layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Account {
    pub id: Uuid,
    /// Stable subject carried in session tokens. Never empty.
    pub subject: String,
    pub email: Option<String>,
    pub username: Option<String>,
    /// Roles granted by the backing store, not by providers
    pub roles: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
