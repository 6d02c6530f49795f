//! Deciding how to obtain a currently valid token

use smctl_clock::{Clock, System, UnixTime};

use crate::{
    oauth2::{dto, TokenEndpoint},
    Error, Options, ReauthenticationReason, RefreshToken, Token,
};

/// Hands out a non-expired token, renewing the held one when possible
///
/// The refresher never prompts: when no silent path to a valid token exists
/// it fails with [`Error::ReauthenticationRequired`].
///
/// | held token                         | client credentials | outcome                      |
/// |------------------------------------|--------------------|------------------------------|
/// | not expired                        | any                | reused, no network call      |
/// | expired, has refresh token         | yes                | refresh token exchange       |
/// | expired, has refresh token         | no                 | reauthentication required    |
/// | none, or expired without refresh   | yes                | client credentials exchange  |
/// | none, or expired without refresh   | no                 | reauthentication required    |
#[derive(Debug)]
pub struct TokenRefresher<C = System> {
    client: reqwest::Client,
    options: Options,
    token: Option<Token>,
    renewed: bool,
    clock: C,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    Reuse,
    Refresh(RefreshToken),
    ClientCredentials,
    Reauthenticate(ReauthenticationReason),
}

impl TokenRefresher<System> {
    /// Constructs a refresher holding the previously persisted `token`, if any
    pub fn new(client: reqwest::Client, options: Options, token: Option<Token>) -> Self {
        Self {
            client,
            options,
            token,
            renewed: false,
            clock: System,
        }
    }
}

impl<C> TokenRefresher<C> {
    /// Sets a custom clock to be used
    ///
    /// Useful for testing purposes
    pub fn with_clock<D>(self, clock: D) -> TokenRefresher<D> {
        TokenRefresher {
            client: self.client,
            options: self.options,
            token: self.token,
            renewed: self.renewed,
            clock,
        }
    }

    /// The token currently held, which may be expired
    pub fn current(&self) -> Option<&Token> {
        self.token.as_ref()
    }

    /// Whether an exchange has replaced the token the refresher started with
    pub fn was_renewed(&self) -> bool {
        self.renewed
    }

    /// The options used for exchanges
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// The clock expiry is judged against
    pub fn clock(&self) -> &C {
        &self.clock
    }

    fn next_step(&self, now: UnixTime) -> Step {
        let has_client_credentials = self.options.has_client_credentials();

        match &self.token {
            Some(token) if !token.is_expired_at(now) => Step::Reuse,
            Some(token) => match token.refresh_token() {
                Some(rt) if has_client_credentials => Step::Refresh(rt.to_owned()),
                Some(_) => Step::Reauthenticate(ReauthenticationReason::NoRefreshCredentials),
                None if has_client_credentials => Step::ClientCredentials,
                None => Step::Reauthenticate(ReauthenticationReason::TokenExpired),
            },
            None if has_client_credentials => Step::ClientCredentials,
            None => Step::Reauthenticate(ReauthenticationReason::NotLoggedIn),
        }
    }

    fn token_endpoint(&self) -> Result<TokenEndpoint, Error> {
        match &self.options.token_endpoint {
            Some(url) => Ok(TokenEndpoint::new(self.client.clone(), url.clone())),
            None => Err(Error::reauthenticate(
                ReauthenticationReason::UnknownTokenEndpoint,
            )),
        }
    }

    fn replace(&mut self, token: Token) -> Token {
        self.renewed = true;
        self.token = Some(token.clone());
        token
    }
}

impl<C: Clock + Send + Sync> TokenRefresher<C> {
    /// Returns a token that is valid now
    ///
    /// At most one exchange with the authority is performed per call. A
    /// rejected or unreadable exchange yields
    /// [`Error::ReauthenticationRequired`]; transport failures are returned
    /// unchanged.
    pub async fn token(&mut self) -> Result<Token, Error> {
        let step = self.next_step(self.clock.now());

        match step {
            Step::Reuse => {
                tracing::trace!("reusing held access token");
                self.token
                    .clone()
                    .ok_or_else(|| Error::reauthenticate(ReauthenticationReason::NotLoggedIn))
            }
            Step::Refresh(refresh_token) => {
                let endpoint = self.token_endpoint()?;
                let credentials = dto::RefreshTokenCredentials {
                    client_id: &self.options.client_id,
                    client_secret: self.options.client_secret(),
                    refresh_token: &refresh_token,
                };

                tracing::debug!("access token expired, refreshing");
                match endpoint.request_token(&credentials, &self.clock).await {
                    Ok(token) => {
                        let token = token.inherit_refresh_token(Some(&*refresh_token));
                        Ok(self.replace(token))
                    }
                    Err(error @ (Error::AuthenticationFailed(_) | Error::TokenBody(_))) => {
                        tracing::warn!(%error, "authority refused to refresh the access token");
                        Err(Error::reauthenticate_after(
                            ReauthenticationReason::RenewalRejected,
                            error,
                        ))
                    }
                    Err(error) => Err(error),
                }
            }
            Step::ClientCredentials => {
                let endpoint = self.token_endpoint()?;
                let Some(client_secret) = self.options.client_secret() else {
                    return Err(Error::reauthenticate(ReauthenticationReason::TokenExpired));
                };
                let credentials = dto::ClientCredentials {
                    client_id: &self.options.client_id,
                    client_secret,
                };

                tracing::debug!("no renewable access token, using client credentials");
                match endpoint.request_token(&credentials, &self.clock).await {
                    Ok(token) => Ok(self.replace(token)),
                    Err(error @ (Error::AuthenticationFailed(_) | Error::TokenBody(_))) => {
                        tracing::warn!(%error, "authority refused the client credentials");
                        Err(Error::reauthenticate_after(
                            ReauthenticationReason::RenewalRejected,
                            error,
                        ))
                    }
                    Err(error) => Err(error),
                }
            }
            Step::Reauthenticate(reason) => {
                tracing::debug!(%reason, "no silent path to a valid access token");
                Err(Error::reauthenticate(reason))
            }
        }
    }
}
