//! OpenID provider configuration discovery

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{DiscoveryError, Error};

/// The subset of an OpenID provider configuration document that is needed
/// to perform token exchanges
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct OpenIdConfiguration {
    /// The issuer identifier, as reported by the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    /// The authorization endpoint
    pub authorization_endpoint: Url,
    /// The token endpoint
    pub token_endpoint: Url,
}

/// Computes the location of the well-known configuration document for an issuer
pub fn well_known_url(issuer: &Url) -> Result<Url, DiscoveryError> {
    let mut url = issuer.clone();
    url.path_segments_mut()
        .map_err(|_| DiscoveryError::InvalidIssuer(issuer.clone()))?
        .pop_if_empty()
        .extend([".well-known", "openid-configuration"]);
    Ok(url)
}

/// Fetches the OpenID configuration published by `issuer`
///
/// A single request is made; failures are not retried.
#[tracing::instrument(err, skip(client), fields(issuer = %issuer))]
pub async fn fetch_openid_configuration(
    client: &Client,
    issuer: &Url,
) -> Result<OpenIdConfiguration, Error> {
    let url = well_known_url(issuer)?;

    tracing::trace!(%url, "requesting openid configuration");

    let response = client.get(url).send().await?;

    let status = response.status();
    tracing::debug!(
        response.status = status.as_u16(),
        "received openid configuration response"
    );

    if status != StatusCode::OK {
        return Err(DiscoveryError::Status(status).into());
    }

    let body = response.bytes().await?;
    let config: OpenIdConfiguration =
        serde_json::from_slice(&body).map_err(DiscoveryError::Malformed)?;

    tracing::info!(
        token_endpoint = %config.token_endpoint,
        authorization_endpoint = %config.authorization_endpoint,
        "discovered openid configuration"
    );

    Ok(config)
}
