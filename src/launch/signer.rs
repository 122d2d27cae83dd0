//! HMAC-SHA1 request signatures for tool launches.

use std::collections::BTreeMap;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use sha1::{Digest, Sha1};
use subtle::ConstantTimeEq;
use url::Url;

use super::encoding::{canonicalize, percent_encode};
use crate::error::{Error, Result};

pub const OAUTH_VERSION: &str = "1.0";
pub const SIGNATURE_PARAMETER: &str = "oauth_signature";

/// Signature methods this signer implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureMethod {
    HmacSha1,
}

impl SignatureMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureMethod::HmacSha1 => "HMAC-SHA1",
        }
    }
}

impl FromStr for SignatureMethod {
    type Err = Error;

    fn from_str(method: &str) -> Result<Self> {
        match method {
            "HMAC-SHA1" => Ok(SignatureMethod::HmacSha1),
            other => Err(Error::UnsupportedSignatureMethod(other.to_owned())),
        }
    }
}

/// Base64 SHA-1 digest of a request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyHash(String);

impl BodyHash {
    pub fn of(body: impl AsRef<[u8]>) -> Self {
        Self(BASE64.encode(Sha1::digest(body.as_ref())))
    }

    /// Hash of a request without body.
    pub fn empty() -> Self {
        Self::of(b"")
    }

    /// Wrap a digest computed elsewhere.
    pub fn precomputed(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Protocol fields of one outbound signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningContext {
    pub body_hash: BodyHash,
    pub consumer_key: String,
    pub nonce: String,
    pub signature_method: String,
    pub timestamp: u64,
    pub version: String,
}

impl SigningContext {
    /// Create a context for the HMAC-SHA1 method.
    pub fn new(
        consumer_key: impl Into<String>,
        body_hash: BodyHash,
        nonce: impl Into<String>,
        timestamp: u64,
    ) -> Self {
        Self {
            body_hash,
            consumer_key: consumer_key.into(),
            nonce: nonce.into(),
            signature_method: SignatureMethod::HmacSha1.as_str().to_owned(),
            timestamp,
            version: OAUTH_VERSION.to_owned(),
        }
    }

    /// Request another signature method.
    pub fn with_signature_method(mut self, method: impl Into<String>) -> Self {
        self.signature_method = method.into();
        self
    }

    /// The six `oauth_*` parameters.
    pub fn parameters(&self) -> [(&'static str, String); 6] {
        [
            ("oauth_body_hash", self.body_hash.as_str().to_owned()),
            ("oauth_consumer_key", self.consumer_key.clone()),
            ("oauth_nonce", self.nonce.clone()),
            ("oauth_signature_method", self.signature_method.clone()),
            ("oauth_timestamp", self.timestamp.to_string()),
            ("oauth_version", self.version.clone()),
        ]
    }
}

/// Compute and check request signatures.
pub struct RequestSigner;

impl RequestSigner {
    /// Sign a request made of `context` and `parameters`.
    ///
    /// Context fields take precedence over parameters of the same name.
    pub fn sign(
        context: &SigningContext,
        method: &str,
        url: &str,
        parameters: &BTreeMap<String, String>,
        consumer_secret: &str,
    ) -> Result<String> {
        let signature_method: SignatureMethod =
            context.signature_method.parse()?;

        let mut signed = parameters.clone();
        signed.remove(SIGNATURE_PARAMETER);
        signed.extend(
            context
                .parameters()
                .into_iter()
                .map(|(name, value)| (name.to_owned(), value)),
        );

        Self::signature(signature_method, method, url, signed, consumer_secret)
    }

    /// Check the `oauth_signature` of a received parameter set.
    pub fn verify(
        method: &str,
        url: &str,
        parameters: &BTreeMap<String, String>,
        consumer_secret: &str,
    ) -> Result<bool> {
        let Some(presented) = parameters.get(SIGNATURE_PARAMETER) else {
            return Ok(false);
        };
        let Some(signature_method) = parameters.get("oauth_signature_method")
        else {
            return Ok(false);
        };
        let signature_method: SignatureMethod = signature_method.parse()?;

        let mut signed = parameters.clone();
        signed.remove(SIGNATURE_PARAMETER);

        let expected = Self::signature(
            signature_method,
            method,
            url,
            signed,
            consumer_secret,
        )?;

        Ok(expected.as_bytes().ct_eq(presented.as_bytes()).into())
    }

    /// Signature base string of a request.
    ///
    /// Query pairs of `url` join the parameters, repeated names included;
    /// the query and fragment are left out of the base string URI. A query
    /// name already present in `parameters` is rejected.
    pub fn base_string(
        method: &str,
        url: &str,
        parameters: BTreeMap<String, String>,
    ) -> Result<String> {
        let mut url = Url::parse(url)?;
        let query: Vec<(String, String)> =
            url.query_pairs().into_owned().collect();
        if let Some((name, _)) =
            query.iter().find(|(name, _)| parameters.contains_key(name))
        {
            return Err(Error::ConflictingParameter(name.clone()));
        }
        url.set_query(None);
        url.set_fragment(None);

        Ok(format!(
            "{}&{}&{}",
            method.to_ascii_uppercase(),
            percent_encode(url.as_str()),
            percent_encode(&canonicalize(parameters.into_iter().chain(query))),
        ))
    }

    fn signature(
        signature_method: SignatureMethod,
        method: &str,
        url: &str,
        parameters: BTreeMap<String, String>,
        consumer_secret: &str,
    ) -> Result<String> {
        let base_string = Self::base_string(method, url, parameters)?;
        let key = format!("{}&", percent_encode(consumer_secret));

        let digest = match signature_method {
            SignatureMethod::HmacSha1 => {
                let mut mac = Hmac::<Sha1>::new_from_slice(key.as_bytes())
                    .map_err(|err| Error::Config {
                        details: format!("HMAC key rejected: {err}"),
                    })?;
                mac.update(base_string.as_bytes());
                mac.finalize().into_bytes()
            },
        };

        Ok(BASE64.encode(digest))
    }
}
