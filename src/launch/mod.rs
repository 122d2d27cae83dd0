//! Signed launch requests toward third-party tool providers.

pub mod encoding;
pub mod signer;

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::distributions::{Alphanumeric, DistString};
use rand::rngs::OsRng;
use url::Url;
use validator::Validate;

use crate::clock::Clock;
use crate::config::{Launch as LaunchConfig, ToolConfig};
use crate::error::Result;
use crate::identity::Identity;
pub use encoding::{canonicalize, percent_encode};
pub use signer::{
    BodyHash, RequestSigner, SIGNATURE_PARAMETER, SignatureMethod,
    SigningContext,
};

const NONCE_LENGTH: usize = 32;
const MESSAGE_TYPE: &str = "basic-lti-launch-request";
const LTI_VERSION: &str = "LTI-1p0";
const LAUNCH_METHOD: &str = "POST";
const DEFAULT_DOCUMENT_TARGET: &str = "iframe";

/// Resource being launched and the course it belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetResource {
    pub resource_link_id: String,
    pub title: String,
    pub description: Option<String>,
    pub context_id: String,
    pub context_title: String,
    pub context_label: Option<String>,
    /// Where the tool sends the user back once done.
    pub return_url: Option<String>,
}

/// Launch ready to be posted to the tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedLaunchRequest {
    pub url: String,
    pub parameters: BTreeMap<String, String>,
}

impl SignedLaunchRequest {
    pub fn signature(&self) -> Option<&str> {
        self.parameters.get(SIGNATURE_PARAMETER).map(String::as_str)
    }

    /// Launch URL carrying every parameter in its query string.
    pub fn to_query_url(&self) -> Result<String> {
        let mut url = Url::parse(&self.url)?;
        url.query_pairs_mut().extend_pairs(&self.parameters);
        Ok(url.into())
    }
}

/// Assemble and sign launch parameters.
pub struct LaunchRequestBuilder {
    clock: Arc<dyn Clock>,
    consumer: LaunchConfig,
    body_hash: BodyHash,
}

impl LaunchRequestBuilder {
    /// Create a new [`LaunchRequestBuilder`] announcing `consumer`.
    pub fn new(clock: Arc<dyn Clock>, consumer: LaunchConfig) -> Self {
        Self {
            clock,
            consumer,
            body_hash: BodyHash::empty(),
        }
    }

    /// Sign launches with a body hash computed by the caller.
    pub fn with_body_hash(mut self, body_hash: BodyHash) -> Self {
        self.body_hash = body_hash;
        self
    }

    /// Build the signed launch of `resource` on `tool` for `identity`.
    pub fn build(
        &self,
        identity: &Identity,
        resource: &TargetResource,
        tool: &ToolConfig,
    ) -> Result<SignedLaunchRequest> {
        tool.validate()?;

        let nonce = Alphanumeric.sample_string(&mut OsRng, NONCE_LENGTH);
        let context = SigningContext::new(
            &tool.key,
            self.body_hash.clone(),
            nonce,
            self.clock.now(),
        );

        let mut parameters = self.parameters(identity, resource, tool);
        let signature = RequestSigner::sign(
            &context,
            LAUNCH_METHOD,
            &tool.launch_url,
            &parameters,
            &tool.secret,
        )?;

        parameters.extend(
            context
                .parameters()
                .into_iter()
                .map(|(name, value)| (name.to_owned(), value)),
        );
        parameters.insert(SIGNATURE_PARAMETER.to_owned(), signature);

        metrics::counter!("launch_requests_signed_total").increment(1);
        tracing::debug!(
            tool = %tool.name,
            user = %identity.username,
            resource = %resource.resource_link_id,
            "launch request signed"
        );

        Ok(SignedLaunchRequest {
            url: tool.launch_url.clone(),
            parameters,
        })
    }

    fn parameters(
        &self,
        identity: &Identity,
        resource: &TargetResource,
        tool: &ToolConfig,
    ) -> BTreeMap<String, String> {
        let roles = identity
            .roles
            .iter()
            .map(|role| role.lti_name())
            .collect::<Vec<_>>()
            .join(",");

        let mut parameters = BTreeMap::from([
            ("lti_message_type", MESSAGE_TYPE.to_owned()),
            ("lti_version", LTI_VERSION.to_owned()),
            ("resource_link_id", resource.resource_link_id.clone()),
            ("resource_link_title", resource.title.clone()),
            ("context_id", resource.context_id.clone()),
            ("context_title", resource.context_title.clone()),
            ("user_id", identity.username.clone()),
            ("roles", roles),
            (
                "launch_presentation_document_target",
                tool.document_target
                    .clone()
                    .unwrap_or_else(|| DEFAULT_DOCUMENT_TARGET.to_owned()),
            ),
        ]);

        let optional = [
            ("resource_link_description", &resource.description),
            ("context_label", &resource.context_label),
            ("launch_presentation_return_url", &resource.return_url),
            ("lis_person_name_full", &identity.full_name),
            ("lis_person_contact_email_primary", &identity.email),
            (
                "tool_consumer_info_product_family_code",
                &self.consumer.product_family_code,
            ),
            ("tool_consumer_instance_guid", &self.consumer.instance_guid),
            ("tool_consumer_instance_name", &self.consumer.instance_name),
        ];
        for (name, value) in optional {
            if let Some(value) = value {
                parameters.insert(name, value.clone());
            }
        }

        let mut parameters: BTreeMap<String, String> = parameters
            .into_iter()
            .map(|(name, value)| (name.to_owned(), value))
            .collect();
        for (name, value) in &tool.custom {
            parameters.insert(custom_parameter_name(name), value.clone());
        }

        parameters
    }
}

/// `custom_` followed by `name` lower-cased, non-alphanumerics as `_`.
fn custom_parameter_name(name: &str) -> String {
    let name: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("custom_{name}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::error::Error;
    use crate::identity::Role;

    fn tool() -> ToolConfig {
        ToolConfig {
            name: "proctoring".into(),
            launch_url: "https://tool.test/lti".into(),
            key: "consumer".into(),
            secret: "s3cret".into(),
            document_target: None,
            custom: BTreeMap::from([("Exam Mode".into(), "strict".into())]),
        }
    }

    fn resource() -> TargetResource {
        TargetResource {
            resource_link_id: "quiz-42".into(),
            title: "Midterm".into(),
            context_id: "course-7".into(),
            context_title: "Algebra".into(),
            return_url: Some("https://assess.test/return".into()),
            ..Default::default()
        }
    }

    fn builder() -> LaunchRequestBuilder {
        LaunchRequestBuilder::new(
            Arc::new(FixedClock::new(1_700_000_000)),
            LaunchConfig {
                product_family_code: Some("assess".into()),
                instance_guid: Some("assess.test".into()),
                ..Default::default()
            },
        )
    }

    fn identity() -> Identity {
        Identity::new("alice")
            .with_role(Role::Learner)
            .with_role(Role::Instructor)
            .with_full_name("Alice Liddell")
            .with_email("alice@assess.test")
    }

    #[test]
    fn test_parameters() {
        let launch = builder().build(&identity(), &resource(), &tool()).unwrap();
        let p = &launch.parameters;

        assert_eq!(launch.url, "https://tool.test/lti");
        assert_eq!(p["lti_message_type"], "basic-lti-launch-request");
        assert_eq!(p["lti_version"], "LTI-1p0");
        assert_eq!(p["resource_link_id"], "quiz-42");
        assert_eq!(p["context_id"], "course-7");
        assert_eq!(p["user_id"], "alice");
        assert_eq!(p["roles"], "Learner,Instructor");
        assert_eq!(p["lis_person_name_full"], "Alice Liddell");
        assert_eq!(p["launch_presentation_document_target"], "iframe");
        assert_eq!(p["launch_presentation_return_url"], "https://assess.test/return");
        assert_eq!(p["tool_consumer_instance_guid"], "assess.test");
        assert_eq!(p["custom_exam_mode"], "strict");
        assert_eq!(p["lis_person_contact_email_primary"], "alice@assess.test");
        assert!(!p.contains_key("context_label"));

        assert_eq!(p["oauth_consumer_key"], "consumer");
        assert_eq!(p["oauth_signature_method"], "HMAC-SHA1");
        assert_eq!(p["oauth_timestamp"], "1700000000");
        assert_eq!(p["oauth_version"], "1.0");
        assert_eq!(p["oauth_body_hash"], BodyHash::empty().as_str());
        assert_eq!(p["oauth_nonce"].len(), NONCE_LENGTH);
        assert!(launch.signature().is_some());
    }

    #[test]
    fn test_signature_verifies() {
        let launch = builder().build(&identity(), &resource(), &tool()).unwrap();

        assert!(
            RequestSigner::verify("POST", &launch.url, &launch.parameters, "s3cret")
                .unwrap()
        );
        assert!(
            !RequestSigner::verify("POST", &launch.url, &launch.parameters, "guess")
                .unwrap()
        );
    }

    #[test]
    fn test_fresh_nonce_per_launch() {
        let builder = builder();
        let first = builder.build(&identity(), &resource(), &tool()).unwrap();
        let second = builder.build(&identity(), &resource(), &tool()).unwrap();

        assert_ne!(first.parameters["oauth_nonce"], second.parameters["oauth_nonce"]);
        assert_ne!(first.signature(), second.signature());
    }

    #[test]
    fn test_invalid_tool() {
        let mut tool = tool();
        tool.secret.clear();

        assert!(matches!(
            builder().build(&identity(), &resource(), &tool),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_launch_url_with_query() {
        let mut tool = tool();
        tool.launch_url = "https://tool.test/lti?course=7&course=8".into();
        let launch = builder().build(&identity(), &resource(), &tool).unwrap();

        assert!(!launch.parameters.contains_key("course"));
        assert!(
            RequestSigner::verify("POST", &launch.url, &launch.parameters, "s3cret")
                .unwrap()
        );

        tool.launch_url = "https://tool.test/lti?oauth_nonce=fixed".into();
        assert!(matches!(
            builder().build(&identity(), &resource(), &tool),
            Err(Error::ConflictingParameter(name)) if name == "oauth_nonce"
        ));

        tool.launch_url = "https://tool.test/lti?user_id=mallory".into();
        assert!(matches!(
            builder().build(&identity(), &resource(), &tool),
            Err(Error::ConflictingParameter(name)) if name == "user_id"
        ));
    }

    #[test]
    fn test_body_hash() {
        let hash = BodyHash::of(b"<xml/>");
        let launch = builder()
            .with_body_hash(hash.clone())
            .build(&identity(), &resource(), &tool())
            .unwrap();

        assert_eq!(launch.parameters["oauth_body_hash"], hash.as_str());
    }

    #[test]
    fn test_query_url() {
        let launch = builder().build(&identity(), &resource(), &tool()).unwrap();
        let url = Url::parse(&launch.to_query_url().unwrap()).unwrap();

        let pairs: BTreeMap<String, String> =
            url.query_pairs().into_owned().collect();
        assert_eq!(pairs, launch.parameters);
    }

    #[test]
    fn test_custom_parameter_name() {
        assert_eq!(custom_parameter_name("Exam Mode"), "custom_exam_mode");
        assert_eq!(custom_parameter_name("review-url"), "custom_review_url");
        assert_eq!(custom_parameter_name("id"), "custom_id");
    }
}
