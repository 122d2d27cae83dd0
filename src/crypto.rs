//! Asymmetric key material used to sign tokens.

use std::path::Path;

use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey, EncodeRsaPublicKey};
use rsa::pkcs8::DecodePrivateKey;
use rsa::{RsaPrivateKey, RsaPublicKey};
use zeroize::Zeroizing;

/// Error related to private keys.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error(transparent)]
    Pkcs1(#[from] rsa::pkcs1::Error),
    #[error(transparent)]
    Pkcs8(#[from] rsa::pkcs8::Error),
    #[error("cannot read key file: {0}")]
    Io(#[from] std::io::Error),
    #[error("encrypted private key requires a passphrase")]
    MissingPassphrase,
    #[error("unknown private key format")]
    UnknownFormat,
}

/// RSA key pair in the DER encoding the JWT backend expects.
pub struct KeyPair {
    private_der: Zeroizing<Vec<u8>>,
    public_der: Vec<u8>,
}

impl KeyPair {
    /// Parse a PEM private key.
    ///
    /// PKCS#1, PKCS#8 and passphrase-protected PKCS#8 are accepted.
    pub fn from_pem(
        pem: &str,
        passphrase: Option<&str>,
    ) -> Result<Self, KeyError> {
        let key = if pem.contains("BEGIN RSA PRIVATE KEY") {
            // PKCS#1 only ever holds RSA.
            RsaPrivateKey::from_pkcs1_pem(pem)?
        } else if pem.contains("BEGIN ENCRYPTED PRIVATE KEY") {
            let passphrase = passphrase.ok_or(KeyError::MissingPassphrase)?;
            RsaPrivateKey::from_pkcs8_encrypted_pem(pem, passphrase)?
        } else if pem.contains("BEGIN PRIVATE KEY") {
            RsaPrivateKey::from_pkcs8_pem(pem)?
        } else {
            return Err(KeyError::UnknownFormat);
        };

        Self::from_private_key(&key)
    }

    /// Read then parse a PEM private key file.
    pub fn from_file(
        path: impl AsRef<Path>,
        passphrase: Option<&str>,
    ) -> Result<Self, KeyError> {
        let pem = std::fs::read_to_string(path)?;
        Self::from_pem(&pem, passphrase)
    }

    fn from_private_key(key: &RsaPrivateKey) -> Result<Self, KeyError> {
        let private_der = key.to_pkcs1_der()?;
        let public_der = RsaPublicKey::from(key).to_pkcs1_der()?;

        Ok(Self {
            private_der: Zeroizing::new(private_der.as_bytes().to_vec()),
            public_der: public_der.as_bytes().to_vec(),
        })
    }

    /// PKCS#1 DER of the private key.
    pub fn private_der(&self) -> &[u8] {
        &self.private_der
    }

    /// PKCS#1 DER of the public key.
    pub fn public_der(&self) -> &[u8] {
        &self.public_der
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("private_der", &"<redacted>")
            .field("public_der_len", &self.public_der.len())
            .finish()
    }
}
