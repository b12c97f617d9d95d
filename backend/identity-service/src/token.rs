/// Session token codec
///
/// Signs the application claim set into a compact JWS string (three
/// dot-separated base64url segments) and verifies it back.
///
/// ## Security
///
/// - **HS512 only**: the algorithm is pinned at both ends; a token whose
///   header names any other algorithm fails verification, so it cannot
///   be downgraded from the outside
/// - **Expiry is server-owned**: `exp` is recomputed on every encode
///   from the configured lifetime, a client can never extend its own
///   session by replaying a claim
/// - **Invalid means anonymous**: every verification failure collapses
///   into [`IdentityError::TokenInvalid`], which callers treat exactly
///   like an absent token
use crate::error::Result;
use crate::models::SessionClaims;
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

/// Pinned signing algorithm. Verification never accepts anything else.
const TOKEN_ALGORITHM: Algorithm = Algorithm::HS512;

/// Signs and verifies session tokens with a symmetric secret.
///
/// Construct once at startup from [`crate::config::JwtSettings`]; the
/// codec itself is immutable and freely shareable across requests.
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    max_age_secs: u64,
}

impl TokenCodec {
    pub fn new(secret: &str, max_age_secs: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            max_age_secs,
        }
    }

    /// Sign `claims` into a token valid for the configured lifetime.
    ///
    /// Any expiry supplied by the caller is discarded before signing.
    pub fn encode(&self, claims: &SessionClaims) -> Result<String> {
        let mut claims = claims.clone();
        claims.exp = Utc::now().timestamp() + self.max_age_secs as i64;

        let token = encode(&Header::new(TOKEN_ALGORITHM), &claims, &self.encoding_key)?;
        Ok(token)
    }

    /// Verify `token` and return its claim set.
    ///
    /// An absent or empty token is the ordinary anonymous case and
    /// decodes to `Ok(None)`. Bad signature, foreign algorithm, and
    /// expired tokens all map to [`IdentityError::TokenInvalid`].
    pub fn decode(&self, token: Option<&str>) -> Result<Option<SessionClaims>> {
        let token = match token {
            Some(t) if !t.is_empty() => t,
            _ => return Ok(None),
        };

        let validation = Validation::new(TOKEN_ALGORITHM);
        let data = decode::<SessionClaims>(token, &self.decoding_key, &validation)?;
        Ok(Some(data.claims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IdentityError;

    const SECRET: &str = "test-signing-secret";
    const MAX_AGE: u64 = 30 * 24 * 60 * 60;

    fn codec() -> TokenCodec {
        TokenCodec::new(SECRET, MAX_AGE)
    }

    fn claims() -> SessionClaims {
        SessionClaims {
            sub: "anna@example.com".to_string(),
            roles: vec!["drinker".to_string()],
            username: Some("anna".to_string()),
            exp: 0,
        }
    }

    #[test]
    fn round_trip_preserves_claims_and_stamps_expiry() {
        let before = Utc::now().timestamp();
        let token = codec().encode(&claims()).unwrap();
        let decoded = codec().decode(Some(&token)).unwrap().unwrap();
        let after = Utc::now().timestamp();

        assert_eq!(decoded.sub, "anna@example.com");
        assert_eq!(decoded.roles, vec!["drinker"]);
        assert_eq!(decoded.username.as_deref(), Some("anna"));
        assert!(decoded.exp >= before + MAX_AGE as i64);
        assert!(decoded.exp <= after + MAX_AGE as i64);
    }

    #[test]
    fn caller_supplied_expiry_is_discarded() {
        let mut stale = claims();
        stale.exp = Utc::now().timestamp() + 10 * 365 * 24 * 60 * 60;

        let token = codec().encode(&stale).unwrap();
        let decoded = codec().decode(Some(&token)).unwrap().unwrap();

        assert!(decoded.exp <= Utc::now().timestamp() + MAX_AGE as i64 + 1);
    }

    #[test]
    fn absent_or_empty_token_is_the_anonymous_case() {
        assert_eq!(codec().decode(None).unwrap(), None);
        assert_eq!(codec().decode(Some("")).unwrap(), None);
    }

    #[test]
    fn wrong_secret_is_invalid() {
        let token = codec().encode(&claims()).unwrap();
        let other = TokenCodec::new("other-secret", MAX_AGE);

        assert!(matches!(
            other.decode(Some(&token)),
            Err(IdentityError::TokenInvalid)
        ));
    }

    #[test]
    fn foreign_header_algorithm_is_invalid() {
        // Signed with the same secret but HS256 in the header; the
        // pinned-algorithm check must reject it before anything else.
        let mut claims = claims();
        claims.exp = Utc::now().timestamp() + 60;
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        assert!(matches!(
            codec().decode(Some(&token)),
            Err(IdentityError::TokenInvalid)
        ));
    }

    #[test]
    fn expired_token_is_invalid() {
        let mut expired = claims();
        expired.exp = Utc::now().timestamp() - 3600;
        let token = encode(
            &Header::new(TOKEN_ALGORITHM),
            &expired,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        assert!(matches!(
            codec().decode(Some(&token)),
            Err(IdentityError::TokenInvalid)
        ));
    }

    #[test]
    fn garbage_token_is_invalid() {
        assert!(matches!(
            codec().decode(Some("not.a.token")),
            Err(IdentityError::TokenInvalid)
        ));
    }
}
