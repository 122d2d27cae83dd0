//! Signed wire representation of [`Claims`].

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
};

use super::Claims;
use crate::crypto::KeyPair;
use crate::error::{Error, Result};

/// Encode and decode compact JWTs signed with RS256.
///
/// Expiry is not checked here; callers compare `exp` against their own clock.
pub struct ClaimsCodec {
    algorithm: Algorithm,
    key_id: Option<String>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl ClaimsCodec {
    /// Create a new [`ClaimsCodec`].
    pub fn new(keys: &KeyPair) -> Self {
        Self {
            algorithm: Algorithm::RS256,
            key_id: None,
            encoding_key: EncodingKey::from_rsa_der(keys.private_der()),
            decoding_key: DecodingKey::from_rsa_der(keys.public_der()),
        }
    }

    /// Set `kid` header on every JWT.
    pub fn with_key_id(mut self, key_id: impl Into<String>) -> Self {
        self.key_id = Some(key_id.into());
        self
    }

    /// Sign `claims` into a compact JWT.
    pub fn encode(&self, claims: &Claims) -> Result<String> {
        let mut header = Header::new(self.algorithm);
        header.kid = self.key_id.clone();

        encode(&header, claims, &self.encoding_key)
            .map_err(|err| Error::Config {
                details: format!("cannot sign token: {err}"),
            })
    }

    /// Parse claims **without** checking the signature.
    pub fn decode(&self, token: &str) -> Result<Claims> {
        let mut validation = self.validation();
        validation.insecure_disable_signature_validation();

        let key = DecodingKey::from_secret(&[]);
        decode::<Claims>(token, &key, &validation)
            .map(|data| data.claims)
            .map_err(classify)
    }

    /// Parse claims after checking the signature against the public key.
    pub fn decode_verified(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding_key, &self.validation())
            .map(|data| data.claims)
            .map_err(classify)
    }

    /// Whether `token` carries a valid signature.
    pub fn verify(&self, token: &str) -> bool {
        self.decode_verified(token).is_ok()
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();
        validation.leeway = 0;
        validation
    }
}

fn classify(err: jsonwebtoken::errors::Error) -> Error {
    match err.kind() {
        ErrorKind::InvalidSignature
        | ErrorKind::InvalidAlgorithm
        | ErrorKind::Crypto(_) => Error::SignatureInvalid,
        _ => Error::MalformedToken(err.to_string()),
    }
}
