//! Strategies for obtaining an initial token

use async_trait::async_trait;
use smctl_clock::System;

use crate::{
    oauth2::{dto, TokenEndpoint},
    oidc, ClientId, ClientSecret, Error, Options, PasswordRef, Token, UsernameRef,
};

/// Exchanges credentials for an initial token
#[async_trait]
pub trait AuthenticationStrategy: Send + Sync {
    /// Authenticates against the identity provider
    ///
    /// Strategies that authenticate the client itself reject a non-empty
    /// `user` or `password`.
    async fn authenticate(&self, user: &UsernameRef, password: &PasswordRef)
        -> Result<Token, Error>;
}

/// Authenticates an end user with the resource owner password grant
#[derive(Debug, Clone)]
pub struct PasswordStrategy {
    endpoint: TokenEndpoint,
    client_id: ClientId,
    client_secret: Option<ClientSecret>,
}

impl PasswordStrategy {
    /// Constructs a password grant strategy posting to `endpoint`
    pub fn new(
        endpoint: TokenEndpoint,
        client_id: ClientId,
        client_secret: Option<ClientSecret>,
    ) -> Self {
        Self {
            endpoint,
            client_id,
            client_secret,
        }
    }
}

#[async_trait]
impl AuthenticationStrategy for PasswordStrategy {
    async fn authenticate(
        &self,
        user: &UsernameRef,
        password: &PasswordRef,
    ) -> Result<Token, Error> {
        if user.as_str().is_empty() || password.as_str().is_empty() {
            return Err(Error::MissingUserCredentials);
        }

        let credentials = dto::PasswordCredentials {
            client_id: &self.client_id,
            client_secret: self
                .client_secret
                .as_deref()
                .filter(|s| !s.as_str().is_empty()),
            username: user,
            password,
        };

        let token = self.endpoint.request_token(&credentials, &System).await?;
        tracing::info!(user = %user, "authenticated with password grant");
        Ok(token)
    }
}

/// Authenticates the client itself with the client credentials grant
#[derive(Debug, Clone)]
pub struct ClientCredentialsStrategy {
    endpoint: TokenEndpoint,
    client_id: ClientId,
    client_secret: ClientSecret,
}

impl ClientCredentialsStrategy {
    /// Constructs a client credentials strategy posting to `endpoint`
    pub fn new(endpoint: TokenEndpoint, client_id: ClientId, client_secret: ClientSecret) -> Self {
        Self {
            endpoint,
            client_id,
            client_secret,
        }
    }

    /// Obtains a token for the client; no end user is involved
    pub async fn authenticate_client(&self) -> Result<Token, Error> {
        let credentials = dto::ClientCredentials {
            client_id: &self.client_id,
            client_secret: &self.client_secret,
        };

        let token = self.endpoint.request_token(&credentials, &System).await?;
        tracing::info!(client_id = %self.client_id, "authenticated with client credentials");
        Ok(token)
    }
}

#[async_trait]
impl AuthenticationStrategy for ClientCredentialsStrategy {
    async fn authenticate(
        &self,
        user: &UsernameRef,
        password: &PasswordRef,
    ) -> Result<Token, Error> {
        if !user.as_str().is_empty() || !password.as_str().is_empty() {
            return Err(Error::UnexpectedUserCredentials);
        }

        self.authenticate_client().await
    }
}

/// The grant an [`OpenIdStrategy`] performs
#[derive(Debug, Clone)]
pub enum AuthenticationFlow {
    /// Resource owner password grant
    Password(PasswordStrategy),
    /// Client credentials grant
    ClientCredentials(ClientCredentialsStrategy),
}

/// An authentication strategy against an OpenID provider
///
/// Construction resolves the provider's endpoints, so a successfully built
/// strategy can always reach a token endpoint.
#[derive(Debug, Clone)]
pub struct OpenIdStrategy {
    options: Options,
    flow: AuthenticationFlow,
}

impl OpenIdStrategy {
    /// Builds a strategy from `options`, discovering endpoints if necessary
    ///
    /// The client credentials grant is selected when both a client ID and
    /// secret are configured; otherwise the password grant is used.
    pub async fn new(options: Options) -> Result<Self, Error> {
        let client = options.http_client()?;
        Self::with_http_client(client, options).await
    }

    /// Builds a strategy that talks to the provider through `client`
    pub async fn with_http_client(
        client: reqwest::Client,
        mut options: Options,
    ) -> Result<Self, Error> {
        let token_url = match &options.token_endpoint {
            Some(token_url) if options.has_endpoints() => token_url.clone(),
            _ => {
                let discovered =
                    oidc::fetch_openid_configuration(&client, &options.issuer_url).await?;
                options.authorization_endpoint = Some(discovered.authorization_endpoint);
                options.token_endpoint = Some(discovered.token_endpoint.clone());
                discovered.token_endpoint
            }
        };

        let endpoint = TokenEndpoint::new(client, token_url);

        let flow = match options.client_secret() {
            Some(secret) if options.has_client_credentials() => {
                AuthenticationFlow::ClientCredentials(ClientCredentialsStrategy::new(
                    endpoint,
                    options.client_id.clone(),
                    secret.to_owned(),
                ))
            }
            secret => AuthenticationFlow::Password(PasswordStrategy::new(
                endpoint,
                options.client_id.clone(),
                secret.map(ToOwned::to_owned),
            )),
        };

        Ok(Self { options, flow })
    }

    /// The options with any discovered endpoints filled in
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Consumes the strategy, returning the resolved options
    pub fn into_options(self) -> Options {
        self.options
    }

    /// The selected grant
    pub fn flow(&self) -> &AuthenticationFlow {
        &self.flow
    }
}

#[async_trait]
impl AuthenticationStrategy for OpenIdStrategy {
    async fn authenticate(
        &self,
        user: &UsernameRef,
        password: &PasswordRef,
    ) -> Result<Token, Error> {
        match &self.flow {
            AuthenticationFlow::Password(s) => s.authenticate(user, password).await,
            AuthenticationFlow::ClientCredentials(s) => s.authenticate(user, password).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use url::Url;
    use wiremock::{
        matchers::{body_string_contains, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;
    use crate::{DiscoveryError, Password, Username};

    async fn mount_discovery(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "authorization_endpoint": format!("{}/oauth/authorize", server.uri()),
                "token_endpoint": format!("{}/oauth/token", server.uri()),
            })))
            .expect(1)
            .mount(server)
            .await;
    }

    fn options(server: &MockServer) -> Options {
        Options::new(
            ClientId::from_static("smctl"),
            Url::parse(&server.uri()).unwrap(),
        )
    }

    mod when_discovery_succeeds {
        use super::*;

        #[tokio::test]
        async fn endpoints_are_filled_into_options() {
            let server = MockServer::start().await;
            mount_discovery(&server).await;

            let strategy = OpenIdStrategy::new(options(&server)).await.unwrap();

            assert_eq!(
                strategy.options().token_endpoint.as_ref().map(Url::as_str),
                Some(format!("{}/oauth/token", server.uri()).as_str())
            );
            assert_eq!(
                strategy.options().authorization_endpoint.as_ref().map(Url::as_str),
                Some(format!("{}/oauth/authorize", server.uri()).as_str())
            );
            assert!(matches!(strategy.flow(), AuthenticationFlow::Password(_)));
        }

        #[tokio::test]
        async fn valid_password_login_returns_issued_access_token() {
            let server = MockServer::start().await;
            mount_discovery(&server).await;
            Mock::given(method("POST"))
                .and(path("/oauth/token"))
                .and(body_string_contains("grant_type=password"))
                .and(body_string_contains("username=admin"))
                .and(body_string_contains("password=admin"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "access_token": "eyJhbGciOiJSUzI1NiJ9.access",
                    "token_type": "bearer",
                    "refresh_token": "refresh",
                    "expires_in": 43199,
                })))
                .expect(1)
                .mount(&server)
                .await;

            let strategy = OpenIdStrategy::new(options(&server)).await.unwrap();
            let token = strategy
                .authenticate(
                    &Username::from_static("admin"),
                    &Password::from_static("admin"),
                )
                .await
                .unwrap();

            assert_eq!(token.access_token().as_str(), "eyJhbGciOiJSUzI1NiJ9.access");
        }

        #[tokio::test]
        async fn rejected_password_login_embeds_provider_error() {
            let server = MockServer::start().await;
            mount_discovery(&server).await;
            Mock::given(method("POST"))
                .and(path("/oauth/token"))
                .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                    "error": "unauthorized",
                    "error_description": "Bad credentials",
                })))
                .expect(1)
                .mount(&server)
                .await;

            let strategy = OpenIdStrategy::new(options(&server)).await.unwrap();
            let err = strategy
                .authenticate(
                    &Username::from_static("admin"),
                    &Password::from_static("wrong"),
                )
                .await
                .unwrap_err();

            assert!(matches!(err, Error::AuthenticationFailed(_)));
            assert!(err.to_string().contains("Bad credentials"));
        }

        #[tokio::test]
        async fn empty_password_is_rejected_without_network_call() {
            let server = MockServer::start().await;
            mount_discovery(&server).await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(500))
                .expect(0)
                .mount(&server)
                .await;

            let strategy = OpenIdStrategy::new(options(&server)).await.unwrap();
            let err = strategy
                .authenticate(&Username::from_static("admin"), &Password::from_static(""))
                .await
                .unwrap_err();

            assert!(matches!(err, Error::MissingUserCredentials));
        }
    }

    mod when_client_credentials_are_configured {
        use super::*;

        fn client_options(server: &MockServer) -> Options {
            options(server).with_client_secret(ClientSecret::from_static("s3cr3t"))
        }

        #[tokio::test]
        async fn client_credentials_grant_is_selected() {
            let server = MockServer::start().await;
            mount_discovery(&server).await;
            Mock::given(method("POST"))
                .and(path("/oauth/token"))
                .and(body_string_contains("grant_type=client_credentials"))
                .and(body_string_contains("client_id=smctl"))
                .and(body_string_contains("client_secret=s3cr3t"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "access_token": "client-token",
                    "token_type": "bearer",
                    "expires_in": 600,
                })))
                .expect(1)
                .mount(&server)
                .await;

            let strategy = OpenIdStrategy::new(client_options(&server))
                .await
                .unwrap();
            assert!(matches!(
                strategy.flow(),
                AuthenticationFlow::ClientCredentials(_)
            ));

            let token = strategy
                .authenticate(&Username::from_static(""), &Password::from_static(""))
                .await
                .unwrap();
            assert_eq!(token.access_token().as_str(), "client-token");
        }

        #[tokio::test]
        async fn user_credentials_are_refused() {
            let server = MockServer::start().await;
            mount_discovery(&server).await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(500))
                .expect(0)
                .mount(&server)
                .await;

            let strategy = OpenIdStrategy::new(client_options(&server))
                .await
                .unwrap();
            let err = strategy
                .authenticate(
                    &Username::from_static("admin"),
                    &Password::from_static("admin"),
                )
                .await
                .unwrap_err();

            assert!(matches!(err, Error::UnexpectedUserCredentials));
        }
    }

    mod when_endpoints_are_preconfigured {
        use super::*;

        #[tokio::test]
        async fn discovery_is_skipped() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(500))
                .expect(0)
                .mount(&server)
                .await;

            let mut opts = options(&server);
            opts.authorization_endpoint =
                Some(Url::parse(&format!("{}/oauth/authorize", server.uri())).unwrap());
            opts.token_endpoint =
                Some(Url::parse(&format!("{}/oauth/token", server.uri())).unwrap());

            let strategy = OpenIdStrategy::new(opts.clone()).await.unwrap();
            assert_eq!(strategy.options(), &opts);
        }
    }

    mod when_discovery_fails {
        use super::*;

        #[tokio::test]
        async fn construction_fails_with_discovery_error() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/.well-known/openid-configuration"))
                .respond_with(ResponseTemplate::new(404))
                .expect(1)
                .mount(&server)
                .await;

            let err = OpenIdStrategy::new(options(&server)).await.unwrap_err();

            assert!(matches!(
                err,
                Error::DiscoveryFailed(DiscoveryError::Status(_))
            ));
            assert!(err
                .to_string()
                .contains("Error occurred while fetching openid configuration"));
        }
    }
}
