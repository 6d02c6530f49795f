//! Token exchanges against an OAuth2 token endpoint

use smctl_clock::Clock;
use url::Url;

use crate::{ClientIdRef, Error, ProviderError, Token};

pub mod dto;

/// A set of credentials that can be exchanged for a token
pub trait CredentialsSource: serde::Serialize {
    /// The client ID of the client making the request
    fn client_id(&self) -> &ClientIdRef;
    /// The grant type or flow to be performed
    fn grant_type() -> &'static str;
}

/// An OAuth2 token endpoint
#[derive(Debug, Clone)]
pub struct TokenEndpoint {
    client: reqwest::Client,
    token_url: Url,
}

impl TokenEndpoint {
    /// Constructs a token endpoint reachable through `client`
    pub fn new(client: reqwest::Client, token_url: Url) -> Self {
        Self { client, token_url }
    }

    /// Exchanges `credentials` for a new token
    ///
    /// The credentials are sent as URL-encoded form data. Expiry is computed
    /// from `expires_in` relative to `clock`.
    #[tracing::instrument(
        err,
        skip(self, credentials, clock),
        fields(
            token_url = %self.token_url,
            credentials.grant_type = R::grant_type(),
            credentials.client_id = %credentials.client_id(),
        ),
    )]
    pub async fn request_token<R, C>(&self, credentials: &R, clock: &C) -> Result<Token, Error>
    where
        R: CredentialsSource + Sync,
        C: Clock + Sync,
    {
        tracing::trace!("requesting token from authority");

        let resp = self
            .client
            .post(self.token_url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .form(credentials)
            .send()
            .await?;

        let status = resp.status();
        tracing::debug!(
            response.status = status.as_u16(),
            "received token response from issuing authority"
        );

        if !status.is_success() {
            let body = resp.text().await?;
            return Err(Error::AuthenticationFailed(
                ProviderError::from_response_body(status, body),
            ));
        }

        let body = resp.bytes().await?;
        let resp: dto::TokenResponse = serde_json::from_slice(&body)?;

        let issued = clock.now();
        let expiry = resp.expires_in.map(|lifetime| issued + lifetime);
        let token_type = resp
            .token_type
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "bearer".to_owned());

        tracing::info!(
            has_refresh_token = resp.refresh_token.is_some(),
            lifetime = resp.expires_in.map(|l| l.0),
            expiry = expiry.map(|e| e.0),
            "received new tokens"
        );

        Ok(Token::new(
            resp.access_token,
            token_type,
            resp.refresh_token,
            expiry,
            resp.scope,
        ))
    }
}
