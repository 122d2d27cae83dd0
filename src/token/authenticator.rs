//! Check inbound credentials.

use std::sync::Arc;

use axum::http::{HeaderMap, header};

use super::{Claims, ClaimsCodec, TokenRole};
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::identity::{Identity, IdentityLookup};

const BEARER: &str = "Bearer";

/// Turn a bearer credential into the identity it authorizes.
///
/// Holds no per-request state.
pub struct TokenAuthenticator {
    codec: Arc<ClaimsCodec>,
    clock: Arc<dyn Clock>,
    identities: Arc<dyn IdentityLookup>,
}

impl TokenAuthenticator {
    /// Create a new [`TokenAuthenticator`].
    pub fn new(
        codec: Arc<ClaimsCodec>,
        clock: Arc<dyn Clock>,
        identities: Arc<dyn IdentityLookup>,
    ) -> Self {
        Self {
            codec,
            clock,
            identities,
        }
    }

    /// Extract the credential of an `Authorization: Bearer` header.
    pub fn bearer(headers: &HeaderMap) -> Option<&str> {
        let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
        let (scheme, token) = value.split_once(' ')?;

        let token = token.trim();
        (scheme.eq_ignore_ascii_case(BEARER) && !token.is_empty())
            .then_some(token)
    }

    /// Authenticate a request from its headers.
    ///
    /// `Ok(None)` means the request carries no bearer credential and another
    /// mechanism may handle it.
    pub async fn authenticate(
        &self,
        headers: &HeaderMap,
    ) -> Result<Option<Identity>> {
        match Self::bearer(headers) {
            Some(token) => self.authenticate_token(token).await.map(Some),
            None => Ok(None),
        }
    }

    /// Authenticate an access token.
    pub async fn authenticate_token(&self, token: &str) -> Result<Identity> {
        let claims = self.check(token, TokenRole::Access)?;
        self.resolve(&claims).await
    }

    /// Check a refresh token's signature, role and expiry.
    ///
    /// Whether it is still the cached one is up to the caller.
    pub fn verify_refresh(&self, token: &str) -> Result<Claims> {
        self.check(token, TokenRole::Refresh)
    }

    /// Load the user a token was issued to.
    pub async fn resolve(&self, claims: &Claims) -> Result<Identity> {
        match self.identities.find_by_username(&claims.aud).await? {
            Some(identity) => Ok(identity),
            None => Err(reject(Error::UserNotFound(claims.aud.clone()))),
        }
    }

    fn check(&self, token: &str, role: TokenRole) -> Result<Claims> {
        let claims = self.codec.decode_verified(token).map_err(reject)?;

        if claims.aud.is_empty() {
            return Err(reject(Error::InvalidToken("missing audience")));
        }
        if claims.role() != Some(role) {
            return Err(reject(Error::InvalidToken("unexpected token role")));
        }
        if claims.is_expired(self.clock.now()) {
            return Err(reject(Error::ExpiredToken {
                expired_at: claims.exp,
            }));
        }

        tracing::debug!(user = %claims.aud, %role, jti = %claims.jti, "token accepted");
        Ok(claims)
    }
}

fn reject(err: Error) -> Error {
    if err.is_auth_failure() {
        metrics::counter!("token_rejections_total", "reason" => err.reason())
            .increment(1);
        tracing::warn!(reason = err.reason(), error = %err, "token rejected");
    }
    err
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;
    use crate::clock::FixedClock;
    use crate::identity::{MemoryDirectory, UnavailableDirectory};
    use crate::token::TokenIssuer;
    use crate::token::codec::tests::{codec, sign};

    const ISSUER: &str = "https://assess.test/";

    struct Fixture {
        clock: Arc<FixedClock>,
        directory: Arc<MemoryDirectory>,
        issuer: TokenIssuer,
        authenticator: TokenAuthenticator,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(FixedClock::new(0));
        let codec = Arc::new(codec());
        let directory =
            Arc::new(MemoryDirectory::new([Identity::new("alice")]));

        Fixture {
            issuer: TokenIssuer::new(codec.clone(), clock.clone()),
            authenticator: TokenAuthenticator::new(
                codec,
                clock.clone(),
                directory.clone(),
            ),
            clock,
            directory,
        }
    }

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(value).unwrap(),
        );
        headers
    }

    #[test]
    fn test_bearer_extraction() {
        assert_eq!(
            TokenAuthenticator::bearer(&headers("Bearer abc.def.ghi")),
            Some("abc.def.ghi")
        );
        assert_eq!(
            TokenAuthenticator::bearer(&headers("bearer abc")),
            Some("abc")
        );
        assert_eq!(TokenAuthenticator::bearer(&headers("Basic dXNlcg==")), None);
        assert_eq!(TokenAuthenticator::bearer(&headers("Bearer ")), None);
        assert_eq!(TokenAuthenticator::bearer(&headers("abc.def.ghi")), None);
        assert_eq!(TokenAuthenticator::bearer(&HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn test_not_applicable() {
        let fixture = fixture();
        assert_eq!(
            fixture
                .authenticator
                .authenticate(&headers("Basic dXNlcg=="))
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_expiry_window() {
        let fixture = fixture();
        let token = fixture
            .issuer
            .create(&Identity::new("alice"), TokenRole::Access, 3600, ISSUER)
            .unwrap();
        assert_eq!(token.claims.exp, 3600);
        let headers = headers(&format!("Bearer {}", token.as_str()));

        fixture.clock.set(3599);
        let identity = fixture.authenticator.authenticate(&headers).await;
        assert_eq!(identity.unwrap().unwrap().username, "alice");

        fixture.clock.set(3600);
        assert!(matches!(
            fixture.authenticator.authenticate(&headers).await,
            Err(Error::ExpiredToken { expired_at: 3600 })
        ));
    }

    #[tokio::test]
    async fn test_refresh_token_is_not_an_access_token() {
        let fixture = fixture();
        let token = fixture
            .issuer
            .create(&Identity::new("alice"), TokenRole::Refresh, 60, ISSUER)
            .unwrap();

        assert!(matches!(
            fixture.authenticator.authenticate_token(token.as_str()).await,
            Err(Error::InvalidToken(_))
        ));
        assert!(fixture.authenticator.verify_refresh(token.as_str()).is_ok());
    }

    #[tokio::test]
    async fn test_forged_token() {
        let fixture = fixture();
        let token = fixture
            .issuer
            .create(&Identity::new("alice"), TokenRole::Access, 60, ISSUER)
            .unwrap();
        let mut forged = token.wire.clone();
        forged.pop();
        forged.push(if token.wire.ends_with('A') { 'B' } else { 'A' });

        let err = fixture
            .authenticator
            .authenticate_token(&forged)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::SignatureInvalid | Error::MalformedToken(_)
        ));
        assert!(matches!(
            fixture.authenticator.authenticate_token("garbage").await,
            Err(Error::MalformedToken(_))
        ));
    }

    #[tokio::test]
    async fn test_deleted_user() {
        let fixture = fixture();
        let token = fixture
            .issuer
            .create(&Identity::new("alice"), TokenRole::Access, 60, ISSUER)
            .unwrap();
        fixture.directory.remove("alice");

        assert!(matches!(
            fixture.authenticator.authenticate_token(token.as_str()).await,
            Err(Error::UserNotFound(user)) if user == "alice"
        ));
    }

    #[tokio::test]
    async fn test_directory_failure_propagates() {
        let clock = Arc::new(FixedClock::new(0));
        let codec = Arc::new(codec());
        let issuer = TokenIssuer::new(codec.clone(), clock.clone());
        let authenticator =
            TokenAuthenticator::new(codec, clock, Arc::new(UnavailableDirectory));
        let token = issuer
            .create(&Identity::new("alice"), TokenRole::Access, 60, ISSUER)
            .unwrap();

        assert!(matches!(
            authenticator.authenticate_token(token.as_str()).await,
            Err(Error::Identity(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_audience_claim() {
        let fixture = fixture();
        let token = sign(&serde_json::json!({
            "iss": ISSUER,
            "sub": "accessToken",
            "jti": "no-aud",
            "iat": 0,
            "nbf": 0,
            "exp": 60,
        }));

        assert!(matches!(
            fixture.authenticator.authenticate_token(&token).await,
            Err(Error::InvalidToken("missing audience"))
        ));
    }

    #[tokio::test]
    async fn test_empty_audience() {
        let fixture = fixture();
        let token = fixture
            .issuer
            .create(&Identity::new(""), TokenRole::Access, 60, ISSUER)
            .unwrap();

        assert!(matches!(
            fixture.authenticator.authenticate_token(token.as_str()).await,
            Err(Error::InvalidToken("missing audience"))
        ));
    }
}
