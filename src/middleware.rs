//! Middlewares for routes.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::error::{Error, Result};
use crate::identity::Identity;
use crate::token::TokenAuthenticator;

/// Require a valid access token.
///
/// The resolved [`Identity`] is inserted into request extensions.
pub async fn auth(
    State(authenticator): State<Arc<TokenAuthenticator>>,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    match authenticator.authenticate(req.headers()).await? {
        Some(identity) => {
            req.extensions_mut().insert::<Identity>(identity);
            Ok(next.run(req).await)
        },
        None => Err(Error::InvalidToken("missing bearer credential")),
    }
}

/// Like [`auth`], but requests without a bearer credential pass through
/// anonymously. A bad credential is still rejected.
pub async fn identify(
    State(authenticator): State<Arc<TokenAuthenticator>>,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    if let Some(identity) = authenticator.authenticate(req.headers()).await? {
        req.extensions_mut().insert::<Identity>(identity);
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{StatusCode, header};
    use axum::routing::get;
    use axum::{Extension, Router, middleware};
    use http_body_util::BodyExt;
    use tower::util::ServiceExt;

    use super::*;
    use crate::clock::FixedClock;
    use crate::identity::{MemoryDirectory, UnavailableDirectory};
    use crate::token::codec::tests::codec;
    use crate::token::{TokenIssuer, TokenRole};

    const ISSUER: &str = "https://assess.test/";

    struct Fixture {
        clock: Arc<FixedClock>,
        issuer: TokenIssuer,
        app: Router,
    }

    async fn me(Extension(identity): Extension<Identity>) -> String {
        identity.username
    }

    async fn whoami(identity: Option<Extension<Identity>>) -> String {
        identity
            .map(|Extension(identity)| identity.username)
            .unwrap_or_else(|| "anonymous".into())
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(FixedClock::new(0));
        let codec = Arc::new(codec());
        let authenticator = Arc::new(TokenAuthenticator::new(
            codec.clone(),
            clock.clone(),
            Arc::new(MemoryDirectory::new([Identity::new("alice")])),
        ));

        let app = Router::new()
            .route(
                "/me",
                get(me).route_layer(middleware::from_fn_with_state(
                    authenticator.clone(),
                    auth,
                )),
            )
            .route(
                "/whoami",
                get(whoami).route_layer(middleware::from_fn_with_state(
                    authenticator,
                    identify,
                )),
            );

        Fixture {
            issuer: TokenIssuer::new(codec, clock.clone()),
            clock,
            app,
        }
    }

    async fn call(
        app: Router,
        path: &str,
        authorization: Option<String>,
    ) -> (StatusCode, String) {
        let mut request = Request::builder().uri(path);
        if let Some(value) = authorization {
            request = request.header(header::AUTHORIZATION, value);
        }

        let response = app
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn bearer(fixture: &Fixture, role: TokenRole, ttl: u64) -> Option<String> {
        let token = fixture
            .issuer
            .create(&Identity::new("alice"), role, ttl, ISSUER)
            .unwrap();
        Some(format!("Bearer {}", token.as_str()))
    }

    #[tokio::test]
    async fn test_auth() {
        let fixture = fixture();
        let token = bearer(&fixture, TokenRole::Access, 60);

        let (status, body) = call(fixture.app.clone(), "/me", token).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "alice");
    }

    #[tokio::test]
    async fn test_auth_without_credential() {
        let fixture = fixture();

        let (status, body) = call(fixture.app.clone(), "/me", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("Invalid token."));
    }

    #[tokio::test]
    async fn test_auth_rejections() {
        let fixture = fixture();
        let refresh = bearer(&fixture, TokenRole::Refresh, 60);
        let expired = bearer(&fixture, TokenRole::Access, 60);
        fixture.clock.set(60);

        let (status, _) = call(fixture.app.clone(), "/me", refresh).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = call(fixture.app.clone(), "/me", expired).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("Expired token."));

        let garbage = Some("Bearer not.a.jwt".to_owned());
        let (status, _) = call(fixture.app.clone(), "/me", garbage).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_directory_failure_is_internal() {
        let fixture = fixture();
        let token = bearer(&fixture, TokenRole::Access, 60);
        let authenticator = Arc::new(TokenAuthenticator::new(
            Arc::new(codec()),
            fixture.clock.clone(),
            Arc::new(UnavailableDirectory),
        ));
        let app = Router::new().route(
            "/me",
            get(me).route_layer(middleware::from_fn_with_state(
                authenticator,
                auth,
            )),
        );

        let (status, body) = call(app, "/me", token).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body.contains("Invalid token."));
    }

    #[tokio::test]
    async fn test_identify() {
        let fixture = fixture();
        let token = bearer(&fixture, TokenRole::Access, 60);

        let (status, body) = call(fixture.app.clone(), "/whoami", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "anonymous");

        let (status, body) = call(fixture.app.clone(), "/whoami", token).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "alice");

        let garbage = Some("Bearer not.a.jwt".to_owned());
        let (status, _) = call(fixture.app.clone(), "/whoami", garbage).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
