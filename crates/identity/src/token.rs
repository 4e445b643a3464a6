//! Session/token authority.
//!
//! Tokens are HS256-signed JWTs. An access token lives one hour and a
//! refresh token 24 hours by default. Tokens never change once issued;
//! logging out writes `blacklist:<token>` into the revocation cache with a
//! TTL equal to the token's remaining lifetime.

use std::time::Duration;

use chrono::Utc;
use common::Role;
use doc_store::{CacheError, ExpiringCache};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

const REVOCATION_PREFIX: &str = "blacklist:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::Access => write!(f, "access"),
            TokenKind::Refresh => write!(f, "refresh"),
        }
    }
}

/// Signed token contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
    /// Random id making every issued token distinct.
    pub jti: String,
    pub kind: TokenKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token signature is invalid")]
    InvalidSignature,

    #[error("token has expired")]
    Expired,

    #[error("token is malformed: {0}")]
    Malformed(String),

    #[error("token has been revoked")]
    Revoked,

    #[error("expected a {expected} token, got a {found} token")]
    WrongKind { expected: TokenKind, found: TokenKind },

    #[error("token signing failed: {0}")]
    Signing(String),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl TokenError {
    /// True for failures of the revocation cache rather than of the token.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, TokenError::Cache(_) | TokenError::Signing(_))
    }
}

/// Token lifetimes and policy.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub secret: String,
    pub access_ttl: chrono::Duration,
    pub refresh_ttl: chrono::Duration,
    /// Reject revoked refresh tokens on refresh. Off by default: a logout
    /// revokes the access token it was given, and the paired refresh token
    /// keeps working until it expires.
    pub check_refresh_revocation: bool,
}

impl TokenConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            access_ttl: chrono::Duration::hours(1),
            refresh_ttl: chrono::Duration::hours(24),
            check_refresh_revocation: false,
        }
    }

    pub fn with_access_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.access_ttl = ttl;
        self
    }

    pub fn with_refresh_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.refresh_ttl = ttl;
        self
    }

    pub fn with_refresh_revocation(mut self, check: bool) -> Self {
        self.check_refresh_revocation = check;
        self
    }
}

/// Issues, verifies, revokes, and refreshes tokens.
#[derive(Clone)]
pub struct TokenAuthority<C> {
    config: TokenConfig,
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    cache: C,
}

impl<C: ExpiringCache> TokenAuthority<C> {
    pub fn new(config: TokenConfig, cache: C) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iat", "sub"]);

        Self {
            encoding: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            config,
            cache,
        }
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Issues a fresh access/refresh pair for `subject`.
    pub fn issue_pair(&self, subject: &str, role: Role) -> Result<TokenPair, TokenError> {
        let access_token = self.issue(subject, role, TokenKind::Access, self.config.access_ttl)?;
        let refresh_token =
            self.issue(subject, role, TokenKind::Refresh, self.config.refresh_ttl)?;

        metrics::counter!("tokens_issued_total").increment(2);

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: self.config.access_ttl.num_seconds(),
        })
    }

    fn issue(
        &self,
        subject: &str,
        role: Role,
        kind: TokenKind,
        ttl: chrono::Duration,
    ) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = Claims {
            sub: subject.to_string(),
            role,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
            kind,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Checks signature and expiry. Does not consult the revocation cache.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                _ => TokenError::Malformed(e.to_string()),
            })
    }

    /// Revokes `token` for the rest of its lifetime.
    ///
    /// The token must verify. A token with no lifetime left needs no marker.
    #[tracing::instrument(skip_all, fields(token_prefix = token_prefix(token)))]
    pub async fn revoke(&self, token: &str) -> Result<(), TokenError> {
        let claims = self.verify(token)?;
        let remaining = claims.exp - Utc::now().timestamp();
        if remaining <= 0 {
            return Ok(());
        }

        self.cache
            .set_with_ttl(
                &revocation_key(token),
                "1",
                Duration::from_secs(remaining as u64),
            )
            .await?;

        metrics::counter!("tokens_revoked_total").increment(1);
        tracing::info!(kind = %claims.kind, remaining_secs = remaining, "token revoked");
        Ok(())
    }

    pub async fn is_revoked(&self, token: &str) -> Result<bool, TokenError> {
        Ok(self.cache.exists(&revocation_key(token)).await?)
    }

    /// Validates an access token for identity resolution: not revoked,
    /// signature and expiry valid, and of the access kind.
    pub async fn authenticate(&self, token: &str) -> Result<Claims, TokenError> {
        if self.is_revoked(token).await? {
            return Err(TokenError::Revoked);
        }
        let claims = self.verify(token)?;
        if claims.kind != TokenKind::Access {
            return Err(TokenError::WrongKind {
                expected: TokenKind::Access,
                found: claims.kind,
            });
        }
        Ok(claims)
    }

    /// Mints a new pair from a refresh token, keeping subject and role.
    #[tracing::instrument(skip_all, fields(token_prefix = token_prefix(refresh_token)))]
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, TokenError> {
        let claims = self.verify(refresh_token)?;
        if claims.kind != TokenKind::Refresh {
            return Err(TokenError::WrongKind {
                expected: TokenKind::Refresh,
                found: claims.kind,
            });
        }
        if self.config.check_refresh_revocation && self.is_revoked(refresh_token).await? {
            return Err(TokenError::Revoked);
        }
        self.issue_pair(&claims.sub, claims.role)
    }
}

pub fn revocation_key(token: &str) -> String {
    format!("{REVOCATION_PREFIX}{token}")
}

/// First characters of a token, safe to log.
pub fn token_prefix(token: &str) -> &str {
    match token.char_indices().nth(8) {
        Some((end, _)) => &token[..end],
        None => token,
    }
}

#[cfg(test)]
mod tests {
    use doc_store::InMemoryExpiringCache;

    use super::*;

    const SECRET: &str = "test-secret";

    fn authority() -> TokenAuthority<InMemoryExpiringCache> {
        TokenAuthority::new(TokenConfig::new(SECRET), InMemoryExpiringCache::new())
    }

    #[test]
    fn issued_pair_verifies_with_expected_claims() {
        let tokens = authority();
        let pair = tokens.issue_pair("user-1", Role::Admin).unwrap();
        assert_eq!(pair.expires_in, 3600);

        let access = tokens.verify(&pair.access_token).unwrap();
        assert_eq!(access.sub, "user-1");
        assert_eq!(access.role, Role::Admin);
        assert_eq!(access.kind, TokenKind::Access);
        assert_eq!(access.exp - access.iat, 3600);

        let refresh = tokens.verify(&pair.refresh_token).unwrap();
        assert_eq!(refresh.kind, TokenKind::Refresh);
        assert_eq!(refresh.exp - refresh.iat, 86400);
    }

    #[test]
    fn pairs_issued_together_are_distinct() {
        let tokens = authority();
        let a = tokens.issue_pair("user-1", Role::Customer).unwrap();
        let b = tokens.issue_pair("user-1", Role::Customer).unwrap();
        assert_ne!(a.access_token, b.access_token);
        assert_ne!(a.refresh_token, b.refresh_token);
    }

    #[test]
    fn token_from_another_secret_has_invalid_signature() {
        let other = TokenAuthority::new(TokenConfig::new("other"), InMemoryExpiringCache::new());
        let pair = other.issue_pair("user-1", Role::Admin).unwrap();
        assert!(matches!(
            authority().verify(&pair.access_token),
            Err(TokenError::InvalidSignature)
        ));
    }

    #[test]
    fn spliced_signature_is_rejected() {
        let tokens = authority();
        let a = tokens.issue_pair("user-1", Role::Customer).unwrap().access_token;
        let b = tokens.issue_pair("user-2", Role::Admin).unwrap().access_token;
        let (a_head, _) = a.rsplit_once('.').unwrap();
        let (_, b_sig) = b.rsplit_once('.').unwrap();
        let forged = format!("{a_head}.{b_sig}");
        assert!(matches!(tokens.verify(&forged), Err(TokenError::InvalidSignature)));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(authority().verify("not-a-token"), Err(TokenError::Malformed(_))));
        assert!(matches!(authority().verify(""), Err(TokenError::Malformed(_))));
    }

    #[test]
    fn expired_token_is_rejected() {
        let tokens = TokenAuthority::new(
            TokenConfig::new(SECRET).with_access_ttl(chrono::Duration::seconds(-10)),
            InMemoryExpiringCache::new(),
        );
        let pair = tokens.issue_pair("user-1", Role::Customer).unwrap();
        assert!(matches!(tokens.verify(&pair.access_token), Err(TokenError::Expired)));
        assert!(tokens.verify(&pair.refresh_token).is_ok());
    }

    #[tokio::test]
    async fn revoke_writes_marker_for_remaining_lifetime() {
        let tokens = authority();
        let pair = tokens.issue_pair("user-1", Role::Customer).unwrap();

        tokens.revoke(&pair.access_token).await.unwrap();

        let ttl = tokens
            .cache()
            .ttl(&revocation_key(&pair.access_token))
            .await
            .unwrap();
        assert!(ttl <= Duration::from_secs(3600));
        assert!(ttl >= Duration::from_secs(3590));
        assert_eq!(
            tokens.cache().get(&revocation_key(&pair.access_token)).await.as_deref(),
            Some("1")
        );
        assert!(tokens.is_revoked(&pair.access_token).await.unwrap());
        assert!(!tokens.is_revoked(&pair.refresh_token).await.unwrap());
    }

    #[tokio::test]
    async fn revoked_token_still_verifies_but_does_not_authenticate() {
        let tokens = authority();
        let pair = tokens.issue_pair("user-1", Role::Customer).unwrap();
        tokens.revoke(&pair.access_token).await.unwrap();

        assert!(tokens.verify(&pair.access_token).is_ok());
        assert!(matches!(
            tokens.authenticate(&pair.access_token).await,
            Err(TokenError::Revoked)
        ));
    }

    #[tokio::test]
    async fn revoking_an_invalid_token_writes_nothing() {
        let tokens = authority();
        assert!(tokens.revoke("garbage").await.is_err());
        assert!(tokens.cache().is_empty().await);
    }

    #[tokio::test]
    async fn revoke_surfaces_cache_failures() {
        let tokens = authority();
        let pair = tokens.issue_pair("user-1", Role::Customer).unwrap();
        tokens.cache().set_unavailable(true);

        let err = tokens.revoke(&pair.access_token).await.unwrap_err();
        assert!(matches!(err, TokenError::Cache(_)));
        assert!(err.is_infrastructure());
    }

    #[tokio::test]
    async fn authenticate_requires_access_kind() {
        let tokens = authority();
        let pair = tokens.issue_pair("user-1", Role::Customer).unwrap();
        assert!(tokens.authenticate(&pair.access_token).await.is_ok());
        assert!(matches!(
            tokens.authenticate(&pair.refresh_token).await,
            Err(TokenError::WrongKind { expected: TokenKind::Access, .. })
        ));
    }

    #[tokio::test]
    async fn refresh_keeps_subject_and_role() {
        let tokens = authority();
        let pair = tokens.issue_pair("user-9", Role::Admin).unwrap();

        let next = tokens.refresh(&pair.refresh_token).await.unwrap();
        let claims = tokens.verify(&next.access_token).unwrap();
        assert_eq!(claims.sub, "user-9");
        assert_eq!(claims.role, Role::Admin);
        assert_ne!(next.refresh_token, pair.refresh_token);
    }

    #[tokio::test]
    async fn refresh_rejects_access_tokens() {
        let tokens = authority();
        let pair = tokens.issue_pair("user-1", Role::Customer).unwrap();
        assert!(matches!(
            tokens.refresh(&pair.access_token).await,
            Err(TokenError::WrongKind { expected: TokenKind::Refresh, .. })
        ));
    }

    #[tokio::test]
    async fn refresh_ignores_revocation_by_default() {
        let tokens = authority();
        let pair = tokens.issue_pair("user-1", Role::Customer).unwrap();
        tokens.revoke(&pair.refresh_token).await.unwrap();

        assert!(tokens.refresh(&pair.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn refresh_honours_revocation_when_enabled() {
        let tokens = TokenAuthority::new(
            TokenConfig::new(SECRET).with_refresh_revocation(true),
            InMemoryExpiringCache::new(),
        );
        let pair = tokens.issue_pair("user-1", Role::Customer).unwrap();
        tokens.revoke(&pair.refresh_token).await.unwrap();

        assert!(matches!(
            tokens.refresh(&pair.refresh_token).await,
            Err(TokenError::Revoked)
        ));
    }

    #[tokio::test]
    async fn expired_refresh_token_cannot_refresh() {
        let tokens = TokenAuthority::new(
            TokenConfig::new(SECRET).with_refresh_ttl(chrono::Duration::seconds(-1)),
            InMemoryExpiringCache::new(),
        );
        let pair = tokens.issue_pair("user-1", Role::Customer).unwrap();
        assert!(matches!(tokens.refresh(&pair.refresh_token).await, Err(TokenError::Expired)));
    }

    #[test]
    fn prefix_is_short_and_safe() {
        assert_eq!(token_prefix("abcdefghijkl"), "abcdefgh");
        assert_eq!(token_prefix("abc"), "abc");
        assert_eq!(token_prefix("ab\u{e9}defghijkl"), "ab\u{e9}defgh");
        assert_eq!(token_prefix(&"\u{e9}".repeat(10)), "\u{e9}".repeat(8));
    }
}
