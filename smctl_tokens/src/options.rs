use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{ClientId, ClientSecret, ClientSecretRef};

/// The default bound on each outbound HTTP call
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings for talking to an OAuth2 identity provider
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Options {
    /// The client ID presented to the identity provider
    pub client_id: ClientId,

    /// The client secret; absent for public clients using the password grant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<ClientSecret>,

    /// The issuer base URL used for OpenID discovery
    pub issuer_url: Url,

    /// The discovered or configured authorization endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_endpoint: Option<Url>,

    /// The discovered or configured token endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<Url>,

    /// Accept invalid TLS certificates
    #[serde(default)]
    pub skip_ssl_validation: bool,

    /// Bound on each outbound HTTP call
    #[serde(default = "default_timeout", with = "duration_secs")]
    pub timeout: Duration,
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

impl Options {
    /// Constructs options for a client against the given issuer
    pub fn new(client_id: ClientId, issuer_url: Url) -> Self {
        Self {
            client_id,
            client_secret: None,
            issuer_url,
            authorization_endpoint: None,
            token_endpoint: None,
            skip_ssl_validation: false,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sets the client secret
    pub fn with_client_secret(mut self, client_secret: ClientSecret) -> Self {
        self.client_secret = Some(client_secret);
        self
    }

    /// Gets the client secret, ignoring a configured but empty one
    pub fn client_secret(&self) -> Option<&ClientSecretRef> {
        self.client_secret
            .as_deref()
            .filter(|s| !s.as_str().is_empty())
    }

    /// Whether both a client ID and a client secret are configured
    pub fn has_client_credentials(&self) -> bool {
        !self.client_id.as_str().is_empty() && self.client_secret().is_some()
    }

    /// Whether both OAuth endpoints are known without discovery
    pub fn has_endpoints(&self) -> bool {
        self.authorization_endpoint.is_some() && self.token_endpoint.is_some()
    }

    /// Builds an HTTP client honoring the TLS and timeout settings
    pub fn http_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .user_agent(concat!("smctl/", env!("CARGO_PKG_VERSION")))
            .danger_accept_invalid_certs(self.skip_ssl_validation)
            .timeout(self.timeout)
            .build()
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
