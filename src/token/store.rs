//! Refresh tokens kept in the credential cache.
//!
//! Entries are keyed by token role and username, so a new login replaces the
//! previous refresh token of the same user.

use std::sync::Arc;

use subtle::ConstantTimeEq;

use super::{Claims, ClaimsCodec, Token, TokenRole};
use crate::cache::CredentialCache;
use crate::clock::Clock;
use crate::error::{Error, Result};

const KEY_PREFIX: &str = "jwt";

/// Cache key of a token: `jwt.<role>.<username>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key from the token claims, optionally replacing the role.
    pub fn derive(claims: &Claims, override_subject: Option<&str>) -> Self {
        let subject = override_subject.unwrap_or(&claims.sub);
        Self(format!("{KEY_PREFIX}.{subject}.{}", claims.aud))
    }

    /// Key a token of `role` for `username` would be stored under.
    pub fn for_user(role: TokenRole, username: &str) -> Self {
        Self(format!("{KEY_PREFIX}.{}.{username}", role.as_str()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Persist, check and revoke refresh tokens.
pub struct RefreshTokenStore {
    cache: Arc<dyn CredentialCache>,
    codec: Arc<ClaimsCodec>,
    clock: Arc<dyn Clock>,
}

impl RefreshTokenStore {
    /// Create a new [`RefreshTokenStore`].
    pub fn new(
        cache: Arc<dyn CredentialCache>,
        codec: Arc<ClaimsCodec>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cache,
            codec,
            clock,
        }
    }

    /// Store `token` for the rest of its lifetime, replacing the entry of
    /// the same role and user.
    pub async fn persist(&self, token: &Token) -> Result<CacheKey> {
        let now = self.clock.now();
        if token.claims.is_expired(now) {
            return Err(Error::ExpiredToken {
                expired_at: token.claims.exp,
            });
        }

        let key = CacheKey::derive(&token.claims, None);
        self.cache
            .set_with_ttl(key.as_str(), token.as_str(), token.claims.remaining(now))
            .await?;

        tracing::debug!(%key, jti = %token.claims.jti, "refresh token stored");
        Ok(key)
    }

    /// Whether `candidate` is exactly the live token stored under `key`.
    pub async fn validate(&self, candidate: &str, key: &CacheKey) -> Result<bool> {
        let Some(stored) = self.cache.get(key.as_str()).await? else {
            return Ok(false);
        };

        if !bool::from(stored.as_bytes().ct_eq(candidate.as_bytes())) {
            return Ok(false);
        }

        // The cache TTL may outlive the token under clock skew.
        match self.codec.decode(&stored) {
            Ok(claims) => Ok(!claims.is_expired(self.clock.now())),
            Err(err) => {
                tracing::warn!(%key, error = %err, "unreadable token in cache");
                Ok(false)
            },
        }
    }

    /// Delete the entry under `key`, returning whether one existed.
    pub async fn revoke(&self, key: &CacheKey) -> Result<bool> {
        let existed = self.cache.delete(key.as_str()).await?;
        if existed {
            metrics::counter!("refresh_tokens_revoked_total").increment(1);
            tracing::debug!(%key, "refresh token revoked");
        }
        Ok(existed)
    }
}
