//! Mint access and refresh tokens.

use std::sync::Arc;

use uuid::Uuid;

use super::{Claims, ClaimsCodec, Token, TokenRole};
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::identity::Identity;

/// Build claim sets and sign them in one step.
pub struct TokenIssuer {
    codec: Arc<ClaimsCodec>,
    clock: Arc<dyn Clock>,
}

impl TokenIssuer {
    /// Create a new [`TokenIssuer`].
    pub fn new(codec: Arc<ClaimsCodec>, clock: Arc<dyn Clock>) -> Self {
        Self { codec, clock }
    }

    /// Issue a token of `role` for `identity`, valid for `ttl` seconds.
    pub fn create(
        &self,
        identity: &Identity,
        role: TokenRole,
        ttl: u64,
        issuer: &str,
    ) -> Result<Token> {
        if ttl == 0 {
            return Err(Error::Config {
                details: format!("{role} lifetime must be positive"),
            });
        }

        let now = self.clock.now();
        let claims = Claims {
            iss: issuer.to_owned(),
            sub: role.as_str().to_owned(),
            aud: identity.username.clone(),
            jti: Uuid::new_v4().to_string(),
            iat: now,
            nbf: now,
            exp: now.saturating_add(ttl),
        };
        let wire = self.codec.encode(&claims)?;

        metrics::counter!("tokens_issued_total", "role" => role.as_str())
            .increment(1);
        tracing::debug!(
            user = %identity.username,
            %role,
            jti = %claims.jti,
            exp = claims.exp,
            "token issued"
        );

        Ok(Token { claims, wire })
    }
}
