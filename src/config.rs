//! Configuration manager.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use url::Url;
use validator::Validate;

use crate::error::{Error, Result};

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const PASSPHRASE_ENV: &str = "SIGNING_KEY_PASSPHRASE";
const DEFAULT_ACCESS_TOKEN_TTL: u64 = 60 * 15; // 15 minutes.
const DEFAULT_REFRESH_TOKEN_TTL: u64 = 60 * 60 * 24 * 14; // 14 days.

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(skip)]
    path: PathBuf,
    /// Related to JsonWebToken configuration.
    #[serde(default, skip_serializing)]
    pub token: Token,
    /// Related to outbound tool launches.
    #[serde(default)]
    pub launch: Launch,
}

/// Json Web Token configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Token {
    /// Written to the `iss` claim.
    pub issuer: String,
    /// Access token lifetime, in seconds.
    pub access_token_ttl: u64,
    /// Refresh token lifetime, in seconds.
    pub refresh_token_ttl: u64,
    /// PEM file holding the RSA private key.
    pub private_key_path: PathBuf,
    /// Passphrase of an encrypted private key.
    pub passphrase: Option<String>,
    /// Written to the `kid` header.
    pub key_id: Option<String>,
    /// Issue a new refresh token on every refresh.
    pub rotate_refresh_tokens: bool,
}

impl Default for Token {
    fn default() -> Self {
        Self {
            issuer: String::default(),
            access_token_ttl: DEFAULT_ACCESS_TOKEN_TTL,
            refresh_token_ttl: DEFAULT_REFRESH_TOKEN_TTL,
            private_key_path: PathBuf::from("private.pem"),
            passphrase: None,
            key_id: None,
            rotate_refresh_tokens: false,
        }
    }
}

/// Consumer identity and registered tool providers.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Launch {
    pub product_family_code: Option<String>,
    pub instance_guid: Option<String>,
    pub instance_name: Option<String>,
    pub tools: Vec<ToolConfig>,
}

/// Tool provider reached through signed launches.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize, Validate)]
pub struct ToolConfig {
    pub name: String,
    #[validate(url)]
    pub launch_url: String,
    /// OAuth consumer key.
    #[validate(length(min = 1))]
    pub key: String,
    /// OAuth consumer secret.
    #[validate(length(min = 1))]
    #[serde(skip_serializing)]
    pub secret: String,
    /// `iframe`, `window` or `frame`.
    pub document_target: Option<String>,
    /// Sent as `custom_<name>` parameters.
    #[serde(default)]
    pub custom: BTreeMap<String, String>,
}

impl Configuration {
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    /// Find a registered tool by name.
    pub fn tool(&self, name: &str) -> Option<&ToolConfig> {
        self.launch.tools.iter().find(|tool| tool.name == name)
    }

    /// Passphrase of the signing key, the environment taking precedence.
    pub fn passphrase(&self) -> Option<String> {
        std::env::var(PASSPHRASE_ENV)
            .ok()
            .or_else(|| self.token.passphrase.clone())
    }

    /// Reject values the token and launch cores cannot work with.
    pub fn check(&self) -> Result<()> {
        if self.token.access_token_ttl == 0 || self.token.refresh_token_ttl == 0
        {
            return Err(Error::Config {
                details: "token lifetimes must be positive".into(),
            });
        }

        for tool in &self.launch.tools {
            tool.validate()?;
        }

        Ok(())
    }

    /// Normalizes a URL string by ensuring it starts with a valid scheme
    /// (`http` or `https`).
    fn normalize_url(
        &self,
        url: &str,
    ) -> std::result::Result<String, url::ParseError> {
        let url_with_scheme =
            if url.starts_with("http://") || url.starts_with("https://") {
                url.to_string()
            } else {
                format!("https://{url}")
            };

        let parsed_url = Url::parse(&url_with_scheme)?;
        Ok(parsed_url.to_string())
    }

    /// Reads the `config.yaml` file from the specified path or the default
    /// location.
    pub fn read(self) -> Result<Arc<Self>> {
        let file_path = if self.path.is_file() {
            &self.path
        } else {
            &Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
        };

        match File::open(file_path) {
            Ok(file) => {
                let mut config: Configuration =
                    match serde_yaml::from_reader(file) {
                        Ok(config) => config,
                        Err(err) => {
                            return Ok(Arc::new(self.error(err)));
                        },
                    };
                config.path = file_path.clone();

                if !config.token.issuer.is_empty() {
                    config.token.issuer =
                        self.normalize_url(&config.token.issuer).map_err(
                            |err| Error::Config {
                                details: format!("`token.issuer`: {err}"),
                            },
                        )?;
                }

                config.check()?;
                Ok(Arc::new(config))
            },
            Err(err) => Ok(Arc::new(self.error(err))),
        }
    }

    /// Return a default configuration as fallback.
    fn error(&self, err: impl std::error::Error) -> Self {
        tracing::error!(error = %err, "`config.yaml` file not found");
        Self {
            path: self.path.clone(),
            ..Default::default()
        }
    }
}
