//! Credential lifecycle and signed tool launches for an assessment platform.
//!
//! Access and refresh tokens are RS256 JSON Web Tokens; refresh tokens are
//! kept in a [`cache::CredentialCache`] so that each user holds a single
//! active session. Launches toward external tools are signed with
//! HMAC-SHA1 request signatures.
#![forbid(unsafe_code)]

pub mod cache;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod launch;
pub mod middleware;
pub mod token;

use std::sync::Arc;

use axum::extract::FromRef;

use crate::cache::CredentialCache;
use crate::clock::{Clock, SystemClock};
use crate::config::Configuration;
use crate::crypto::KeyPair;
use crate::error::Result;
use crate::identity::IdentityLookup;
use crate::launch::LaunchRequestBuilder;
use crate::token::{
    ClaimsCodec, RefreshTokenStore, SessionManager, TokenAuthenticator,
    TokenIssuer,
};

/// State sharing between routes.
#[derive(Clone)]
pub struct Authority {
    pub config: Arc<Configuration>,
    pub clock: Arc<dyn Clock>,
    pub codec: Arc<ClaimsCodec>,
    pub issuer: Arc<TokenIssuer>,
    pub store: Arc<RefreshTokenStore>,
    pub authenticator: Arc<TokenAuthenticator>,
    pub sessions: Arc<SessionManager>,
    pub launcher: Arc<LaunchRequestBuilder>,
}

impl Authority {
    /// Wire every component from `config`, reading the signing key from
    /// disk.
    pub fn new(
        config: Arc<Configuration>,
        cache: Arc<dyn CredentialCache>,
        identities: Arc<dyn IdentityLookup>,
    ) -> Result<Self> {
        Self::with_clock(config, cache, identities, Arc::new(SystemClock))
    }

    /// Same as [`Authority::new`] with a custom time source.
    pub fn with_clock(
        config: Arc<Configuration>,
        cache: Arc<dyn CredentialCache>,
        identities: Arc<dyn IdentityLookup>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.check()?;

        let passphrase = config.passphrase();
        let keys = KeyPair::from_file(
            &config.token.private_key_path,
            passphrase.as_deref(),
        )?;

        let mut codec = ClaimsCodec::new(&keys);
        if let Some(key_id) = &config.token.key_id {
            codec = codec.with_key_id(key_id);
        }
        let codec = Arc::new(codec);

        let issuer = Arc::new(TokenIssuer::new(codec.clone(), clock.clone()));
        let store = Arc::new(RefreshTokenStore::new(
            cache,
            codec.clone(),
            clock.clone(),
        ));
        let authenticator = Arc::new(TokenAuthenticator::new(
            codec.clone(),
            clock.clone(),
            identities,
        ));
        let sessions = Arc::new(SessionManager::new(
            issuer.clone(),
            store.clone(),
            authenticator.clone(),
            config.token.clone(),
        ));
        let launcher = Arc::new(LaunchRequestBuilder::new(
            clock.clone(),
            config.launch.clone(),
        ));

        tracing::info!(
            key = %config.token.private_key_path.display(),
            tools = config.launch.tools.len(),
            "authority initialized"
        );

        Ok(Self {
            config,
            clock,
            codec,
            issuer,
            store,
            authenticator,
            sessions,
            launcher,
        })
    }
}

impl FromRef<Authority> for Arc<TokenAuthenticator> {
    fn from_ref(state: &Authority) -> Self {
        Arc::clone(&state.authenticator)
    }
}

impl FromRef<Authority> for Arc<Configuration> {
    fn from_ref(state: &Authority) -> Self {
        Arc::clone(&state.config)
    }
}
