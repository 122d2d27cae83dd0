//! Manage json web tokens.

pub mod authenticator;
pub mod codec;
pub mod issuer;
pub mod session;
pub mod store;

use serde::{Deserialize, Serialize};

pub use authenticator::TokenAuthenticator;
pub use codec::ClaimsCodec;
pub use issuer::TokenIssuer;
pub use session::{SessionManager, TokenPair};
pub use store::{CacheKey, RefreshTokenStore};

/// Semantic role of a token, carried in its `sub` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenRole {
    Access,
    Refresh,
}

impl TokenRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenRole::Access => "accessToken",
            TokenRole::Refresh => "refreshToken",
        }
    }
}

impl std::fmt::Display for TokenRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pieces of information asserted on a JWT.
///
/// Times are seconds since the Unix epoch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Identifies the organization that issued the JWT.
    pub iss: String,
    /// Token role, `accessToken` or `refreshToken`.
    pub sub: String,
    /// Username the JWT authorizes. Empty when absent.
    #[serde(default)]
    pub aud: String,
    /// Unique identifier of this issuance.
    pub jti: String,
    /// Identifies the time at which the JWT was issued.
    pub iat: u64,
    /// Time before which the JWT must not be accepted.
    pub nbf: u64,
    /// Identifies the expiration time on or after which the JWT must not be
    /// accepted for processing.
    pub exp: u64,
}

impl Claims {
    /// Parsed `sub` claim, if it names a known role.
    pub fn role(&self) -> Option<TokenRole> {
        match self.sub.as_str() {
            "accessToken" => Some(TokenRole::Access),
            "refreshToken" => Some(TokenRole::Refresh),
            _ => None,
        }
    }

    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.exp
    }

    /// Seconds left before expiry, zero once expired.
    pub fn remaining(&self, now: u64) -> u64 {
        self.exp.saturating_sub(now)
    }
}

/// A signed token: its claims and the exact string that was signed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub claims: Claims,
    pub wire: String,
}

impl Token {
    pub fn as_str(&self) -> &str {
        &self.wire
    }
}
