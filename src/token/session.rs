//! Login, refresh and logout flows built on the token core.

use std::sync::Arc;

use serde::Serialize;

use super::{
    CacheKey, RefreshTokenStore, Token, TokenAuthenticator, TokenIssuer,
    TokenRole,
};
use crate::config::Token as TokenConfig;
use crate::error::{Error, Result};
use crate::identity::Identity;

pub const TOKEN_TYPE: &str = "Bearer";

/// Credentials handed to a client after login or refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

/// Session lifecycle over an issuer, a refresh token store and an
/// authenticator.
pub struct SessionManager {
    issuer: Arc<TokenIssuer>,
    store: Arc<RefreshTokenStore>,
    authenticator: Arc<TokenAuthenticator>,
    config: TokenConfig,
}

impl SessionManager {
    /// Create a new [`SessionManager`].
    pub fn new(
        issuer: Arc<TokenIssuer>,
        store: Arc<RefreshTokenStore>,
        authenticator: Arc<TokenAuthenticator>,
        config: TokenConfig,
    ) -> Self {
        Self {
            issuer,
            store,
            authenticator,
            config,
        }
    }

    /// Open a session for an already authenticated user.
    ///
    /// Any refresh token previously issued to the user stops working.
    pub async fn login(&self, identity: &Identity) -> Result<TokenPair> {
        let access = self.issue(identity, TokenRole::Access)?;
        let refresh = self.issue(identity, TokenRole::Refresh)?;
        self.store.persist(&refresh).await?;

        tracing::info!(user = %identity.username, "session opened");

        Ok(self.pair(access.wire, refresh.wire))
    }

    /// Exchange a refresh token for a new access token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let claims = self.authenticator.verify_refresh(refresh_token)?;
        let key = CacheKey::derive(&claims, None);

        if !self.store.validate(refresh_token, &key).await? {
            tracing::warn!(
                %key,
                jti = %claims.jti,
                "refresh token is not the active one"
            );
            return Err(Error::RevokedToken);
        }

        let identity = self.authenticator.resolve(&claims).await?;
        let access = self.issue(&identity, TokenRole::Access)?;

        let refresh_token = if self.config.rotate_refresh_tokens {
            let rotated = self.issue(&identity, TokenRole::Refresh)?;
            self.store.persist(&rotated).await?;
            rotated.wire
        } else {
            refresh_token.to_owned()
        };

        Ok(self.pair(access.wire, refresh_token))
    }

    /// Close the session of `username`, returning whether one was open.
    pub async fn logout(&self, username: &str) -> Result<bool> {
        let key = CacheKey::for_user(TokenRole::Refresh, username);
        self.store.revoke(&key).await
    }

    /// Revoke the session a presented refresh token belongs to.
    ///
    /// Nothing is revoked unless `refresh_token` is the active one.
    pub async fn revoke(&self, refresh_token: &str) -> Result<bool> {
        let claims = self.authenticator.verify_refresh(refresh_token)?;
        let key = CacheKey::derive(&claims, None);

        if self.store.validate(refresh_token, &key).await? {
            self.store.revoke(&key).await
        } else {
            Ok(false)
        }
    }

    fn issue(&self, identity: &Identity, role: TokenRole) -> Result<Token> {
        let ttl = match role {
            TokenRole::Access => self.config.access_token_ttl,
            TokenRole::Refresh => self.config.refresh_token_ttl,
        };
        self.issuer.create(identity, role, ttl, &self.config.issuer)
    }

    fn pair(&self, access_token: String, refresh_token: String) -> TokenPair {
        TokenPair {
            access_token,
            refresh_token,
            token_type: TOKEN_TYPE.to_owned(),
            expires_in: self.config.access_token_ttl,
        }
    }
}
