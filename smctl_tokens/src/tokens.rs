use serde::{Deserialize, Serialize};
use smctl_clock::{Clock, DurationSecs, System, UnixTime};

use super::{AccessToken, AccessTokenRef, RefreshToken, RefreshTokenRef};

/// How long before its recorded expiry a token is already treated as expired
///
/// A request dispatched with a token that dies in flight fails the same way
/// an expired token would.
pub const EXPIRY_LEEWAY: DurationSecs = DurationSecs(10);

/// A bearer credential issued by the identity provider
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    access_token: AccessToken,
    token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<RefreshToken>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expiry: Option<UnixTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
}

/// A token's lifecycle status
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenStatus {
    /// The token can be sent with requests
    Valid,
    /// The token is no longer valid
    Expired,
}

impl Token {
    /// Constructs a token from its parts
    ///
    /// A `None` expiry means the authority did not report a lifetime and
    /// the token never expires locally.
    pub fn new(
        access_token: AccessToken,
        token_type: impl Into<String>,
        refresh_token: Option<RefreshToken>,
        expiry: Option<UnixTime>,
        scope: Option<String>,
    ) -> Self {
        Self {
            access_token,
            token_type: token_type.into(),
            refresh_token: refresh_token.filter(|rt| !rt.as_str().is_empty()),
            expiry,
            scope,
        }
    }

    /// Gets the current access token
    #[inline]
    pub fn access_token(&self) -> &AccessTokenRef {
        &self.access_token
    }

    /// Gets the token type, usually `bearer`
    #[inline]
    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    /// Gets the refresh token, if the authority issued one
    #[inline]
    pub fn refresh_token(&self) -> Option<&RefreshTokenRef> {
        self.refresh_token
            .as_deref()
            .filter(|rt| !rt.as_str().is_empty())
    }

    /// Gets the time that the token will expire
    #[inline]
    pub fn expiry(&self) -> Option<UnixTime> {
        self.expiry
    }

    /// Gets the scopes granted to the token
    #[inline]
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// Whether a refresh token exchange is possible for this token
    #[inline]
    pub fn can_refresh(&self) -> bool {
        self.refresh_token().is_some()
    }

    /// Keeps `previous` as the refresh token if this token was issued without one
    ///
    /// Authorities that do not rotate refresh tokens omit them from refresh
    /// responses.
    pub(crate) fn inherit_refresh_token(mut self, previous: Option<&RefreshTokenRef>) -> Self {
        if self.refresh_token().is_none() {
            self.refresh_token = previous.map(ToOwned::to_owned);
        }
        self
    }

    /// Gets the token's current lifetime status
    #[inline]
    pub fn token_status(&self) -> TokenStatus {
        self.token_status_with_clock(&System)
    }

    /// Gets the token's lifetime status based on the current time
    /// as reported by the provided clock
    #[inline]
    pub fn token_status_with_clock<C: Clock>(&self, clock: &C) -> TokenStatus {
        self.token_status_at(clock.now())
    }

    /// Gets the token's lifetime status as of the provided time
    pub fn token_status_at(&self, time: UnixTime) -> TokenStatus {
        match self.expiry {
            Some(expiry) if time + EXPIRY_LEEWAY >= expiry => TokenStatus::Expired,
            _ => TokenStatus::Valid,
        }
    }

    /// Whether the token is expired as of the provided time
    #[inline]
    pub fn is_expired_at(&self, time: UnixTime) -> bool {
        self.token_status_at(time) == TokenStatus::Expired
    }

    /// Gets a duration for how much longer the token would be valid as of the
    /// provided time
    ///
    /// Returns `None` for tokens without an expiry.
    pub fn until_expired_at(&self, time: UnixTime) -> Option<DurationSecs> {
        self.expiry.map(|expiry| expiry - time)
    }
}
