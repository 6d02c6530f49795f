//! Errors raised while obtaining or renewing tokens

use std::fmt;

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

/// An error while attempting to obtain a valid token
#[derive(Debug, Error)]
pub enum Error {
    /// The identity provider's OpenID configuration could not be obtained
    #[error("Error occurred while fetching openid configuration: {0}")]
    DiscoveryFailed(#[from] DiscoveryError),

    /// The identity provider rejected the presented credentials
    #[error("authentication failed: {0}")]
    AuthenticationFailed(ProviderError),

    /// No automatic path to a valid token exists; the user must log in again
    #[error("{reason}, please log in again using `smctl login`")]
    ReauthenticationRequired {
        /// Why the token could not be renewed
        reason: ReauthenticationReason,
        /// The rejected exchange, if one was attempted
        #[source]
        source: Option<Box<Error>>,
    },

    /// The request never received a response from the remote end
    #[error("error sending request to {}", .0.url().map_or("remote server", |u| u.as_str()))]
    Transport(#[from] reqwest::Error),

    /// The authority answered successfully but the token body could not be read
    #[error("error deserializing token body from authority")]
    TokenBody(#[from] serde_json::Error),

    /// The password grant was requested without a user or password
    #[error("username and password are required to log in")]
    MissingUserCredentials,

    /// The client credentials grant was handed a user or password
    #[error("username and password cannot be used with the client credentials flow")]
    UnexpectedUserCredentials,
}

impl Error {
    pub(crate) fn reauthenticate(reason: ReauthenticationReason) -> Self {
        Self::ReauthenticationRequired {
            reason,
            source: None,
        }
    }

    pub(crate) fn reauthenticate_after(reason: ReauthenticationReason, source: Error) -> Self {
        Self::ReauthenticationRequired {
            reason,
            source: Some(Box::new(source)),
        }
    }

    /// Whether the only way forward is an explicit `smctl login`
    pub fn requires_reauthentication(&self) -> bool {
        matches!(self, Self::ReauthenticationRequired { .. })
    }
}

/// Why a held token could not be silently renewed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReauthenticationReason {
    /// No token has been obtained yet
    NotLoggedIn,
    /// The token expired and no refresh token or client credentials are available
    TokenExpired,
    /// The token expired and there are no client credentials to refresh it with
    NoRefreshCredentials,
    /// The authority refused to renew the token
    RenewalRejected,
    /// No token endpoint is known to send a renewal to
    UnknownTokenEndpoint,
}

impl fmt::Display for ReauthenticationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotLoggedIn => "no access token is available",
            Self::TokenExpired => "access token has expired and cannot be renewed",
            Self::NoRefreshCredentials => {
                "access token has expired and no client credentials are configured to refresh it"
            }
            Self::RenewalRejected => "access token could not be refreshed",
            Self::UnknownTokenEndpoint => "access token cannot be renewed without a token endpoint",
        })
    }
}

/// The OpenID configuration document could not be used
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The well-known document was not served successfully
    #[error("unexpected status code {0}")]
    Status(StatusCode),
    /// The well-known document is not valid JSON or misses required endpoints
    #[error("malformed openid configuration document")]
    Malformed(#[source] serde_json::Error),
    /// The issuer URL cannot have a well-known path appended to it
    #[error("issuer URL `{0}` cannot be used as a base URL")]
    InvalidIssuer(url::Url),
}

/// A non-success answer from the identity provider's token endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    /// The HTTP status of the response
    pub status: StatusCode,
    /// The RFC 6749 error code, when the body carried one
    pub error: Option<String>,
    /// The human readable description of the error
    pub error_description: Option<String>,
    /// The raw response body, when it was not an RFC 6749 error document
    pub body: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl ProviderError {
    pub(crate) fn from_response_body(status: StatusCode, body: String) -> Self {
        match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(resp) => Self {
                status,
                error: Some(resp.error),
                error_description: resp.error_description,
                body: None,
            },
            Err(_) => Self {
                status,
                error: None,
                error_description: None,
                body: Some(body).filter(|b| !b.trim().is_empty()),
            },
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.error, &self.error_description, &self.body) {
            (Some(error), Some(description), _) => write!(f, "{}: {}", error, description)?,
            (Some(error), None, _) => f.write_str(error)?,
            (None, _, Some(body)) => f.write_str(body)?,
            (None, _, None) => f.write_str("no error details provided")?,
        }
        write!(f, " (status {})", self.status.as_u16())
    }
}
