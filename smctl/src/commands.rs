use std::{io::Write, sync::Arc, time::Duration};

use color_eyre::eyre::{bail, eyre, Result, WrapErr};
use reqwest::header::CONTENT_TYPE;
use reqwest_middleware::ClientBuilder;
use smctl_clock::Clock;
use smctl_reqwest::{requires_reauthentication, AccessTokenMiddleware, ExactHostMatch};
use smctl_tokens::{
    config::ConfigStore, AuthenticationFlow, AuthenticationStrategy, OpenIdStrategy, Options,
    Password, TokenRefresher, TokenStatus, Username,
};
use tokio::sync::Mutex;

use crate::{
    cli::{CurlArgs, LoginArgs},
    service,
};

pub async fn login<S, W>(args: LoginArgs, store: &mut S, out: &mut W) -> Result<()>
where
    S: ConfigStore,
    W: Write,
{
    let mut config = store
        .load()
        .await
        .wrap_err("unable to load client configuration")?;

    let timeout = Duration::from_secs(args.timeout);

    let issuer_url = match args.issuer_url {
        Some(issuer_url) => issuer_url,
        None => {
            let client = service::http_client(args.skip_ssl_validation, timeout)?;
            service::fetch_info(&client, &args.url)
                .await?
                .token_issuer_url
        }
    };
    tracing::debug!(%issuer_url, "resolved token issuer");

    let mut options = Options::new(args.client_id, issuer_url);
    options.client_secret = args.client_secret;
    options.skip_ssl_validation = args.skip_ssl_validation;
    options.timeout = timeout;

    let strategy = OpenIdStrategy::new(options).await?;

    let uses_password = matches!(strategy.flow(), AuthenticationFlow::Password(_));
    let (user, password) = if uses_password {
        let user = match args.user {
            Some(user) => user,
            None => Username::new(
                dialoguer::Input::<String>::new()
                    .with_prompt("User")
                    .interact_text()?,
            ),
        };
        let password = match args.password {
            Some(password) => password,
            None => Password::new(
                dialoguer::Password::new()
                    .with_prompt("Password")
                    .interact()?,
            ),
        };
        (user, password)
    } else {
        (
            args.user.unwrap_or_else(|| Username::new(String::new())),
            args.password.unwrap_or_else(|| Password::new(String::new())),
        )
    };

    let token = strategy
        .authenticate(&user, &password)
        .await
        .wrap_err("login failed")?;

    config.url = Some(args.url);
    config.user = uses_password.then_some(user);
    config.auth = Some(strategy.into_options());
    config.token = Some(token);

    store
        .save(&config)
        .await
        .wrap_err("unable to save client configuration")?;

    writeln!(out, "Logged in successfully.")?;
    Ok(())
}

pub async fn logout<S, W>(store: &mut S, out: &mut W) -> Result<()>
where
    S: ConfigStore,
    W: Write,
{
    let mut config = store
        .load()
        .await
        .wrap_err("unable to load client configuration")?;

    config.clear_token();
    store
        .save(&config)
        .await
        .wrap_err("unable to save client configuration")?;

    writeln!(out, "Logged out successfully.")?;
    Ok(())
}

pub async fn info<S, W, C>(store: &mut S, out: &mut W, clock: &C) -> Result<()>
where
    S: ConfigStore,
    W: Write,
    C: Clock,
{
    let config = store
        .load()
        .await
        .wrap_err("unable to load client configuration")?;

    let Some(url) = &config.url else {
        writeln!(out, "No service manager target set. Use `smctl login` to log in.")?;
        return Ok(());
    };

    writeln!(out, "Service Manager URL: {url}")?;
    match &config.user {
        Some(user) => writeln!(out, "Logged in as: {user}")?,
        None if config.token.is_some() => writeln!(out, "Logged in as: client")?,
        None => {}
    }

    let status = match &config.token {
        None => "not logged in".to_owned(),
        Some(token) => match (token.token_status_with_clock(clock), token.expiry()) {
            (TokenStatus::Expired, _) if token.can_refresh() => "expired, renewable".to_owned(),
            (TokenStatus::Expired, _) => "expired".to_owned(),
            (TokenStatus::Valid, Some(expiry)) => format!("valid until {expiry}"),
            (TokenStatus::Valid, None) => "valid".to_owned(),
        },
    };
    writeln!(out, "Token: {status}")?;

    Ok(())
}

pub async fn curl<S, W>(args: CurlArgs, store: &mut S, out: &mut W) -> Result<()>
where
    S: ConfigStore,
    W: Write,
{
    let mut config = store
        .load()
        .await
        .wrap_err("unable to load client configuration")?;

    let (Some(base), Some(options)) = (config.url.clone(), config.auth.clone()) else {
        bail!("No service manager target set. Use `smctl login` to log in.");
    };

    let target = service::api_url(&base, &args.path)?;
    let host = base
        .host_str()
        .ok_or_else(|| eyre!("service manager URL {base} has no host"))?
        .to_owned();

    let client = options
        .http_client()
        .wrap_err("unable to construct HTTP client")?;
    let refresher = Arc::new(Mutex::new(TokenRefresher::new(
        client.clone(),
        options,
        config.token.clone(),
    )));

    let middleware =
        AccessTokenMiddleware::new(refresher.clone()).with_predicate(ExactHostMatch::new(host));
    let client = ClientBuilder::new(client).with(middleware).build();

    let mut request = client.request(args.method, target);
    if let Some(data) = args.data {
        request = request.header(CONTENT_TYPE, "application/json").body(data);
    }

    let result = request.send().await;

    let renewed = {
        let refresher = refresher.lock().await;
        refresher.was_renewed().then(|| refresher.current().cloned())
    };
    if let Some(token) = renewed {
        config.token = token;
        store
            .save(&config)
            .await
            .wrap_err("unable to save renewed token")?;
    }

    let response = match result {
        Ok(response) => response,
        Err(err) if requires_reauthentication(&err) => bail!("{err}"),
        Err(err) => return Err(err).wrap_err("request to service manager failed"),
    };

    let status = response.status();
    let body = response
        .text()
        .await
        .wrap_err("unable to read service manager response")?;
    writeln!(out, "{body}")?;

    if !status.is_success() {
        bail!("service manager responded with {status}");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use smctl_clock::{TestClock, UnixTime};
    use smctl_tokens::{
        config::{ClientConfig, InMemoryConfigStore},
        AccessToken, ClientId, RefreshToken, Token,
    };
    use url::Url;
    use wiremock::{
        matchers::{body_string_contains, header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;

    fn output(buffer: Vec<u8>) -> String {
        String::from_utf8(buffer).unwrap()
    }

    fn token(access: &'static str, expiry: u64) -> Token {
        Token::new(
            AccessToken::from_static(access),
            "bearer",
            Some(RefreshToken::from_static("refresh-1")),
            Some(UnixTime(expiry)),
            None,
        )
    }

    async fn mount_identity_provider(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/v1/info"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token_issuer_url": server.uri(),
            })))
            .mount(server)
            .await;

        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "issuer": server.uri(),
                "authorization_endpoint": format!("{}/oauth/authorize", server.uri()),
                "token_endpoint": format!("{}/oauth/token", server.uri()),
            })))
            .mount(server)
            .await;
    }

    fn login_args(server: &MockServer) -> LoginArgs {
        LoginArgs {
            url: Url::parse(&server.uri()).unwrap(),
            user: Some(Username::from_static("admin")),
            password: Some(Password::from_static("admin")),
            client_id: ClientId::from_static("smctl"),
            client_secret: None,
            issuer_url: None,
            skip_ssl_validation: false,
            timeout: 5,
        }
    }

    mod when_logging_in {
        use super::*;

        #[tokio::test]
        async fn saves_target_user_endpoints_and_token() {
            let server = MockServer::start().await;
            mount_identity_provider(&server).await;
            Mock::given(method("POST"))
                .and(path("/oauth/token"))
                .and(body_string_contains("grant_type=password"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "access_token": "access-1",
                    "token_type": "bearer",
                    "refresh_token": "refresh-1",
                    "expires_in": 3600,
                })))
                .expect(1)
                .mount(&server)
                .await;

            let mut store = InMemoryConfigStore::new();
            let mut out = Vec::new();
            login(login_args(&server), &mut store, &mut out)
                .await
                .unwrap();

            let config = store.load().await.unwrap();
            assert_eq!(config.user, Some(Username::from_static("admin")));
            assert_eq!(config.url, Some(Url::parse(&server.uri()).unwrap()));
            let auth = config.auth.unwrap();
            assert_eq!(
                auth.token_endpoint.unwrap().as_str(),
                format!("{}/oauth/token", server.uri())
            );
            assert_eq!(config.token.unwrap().access_token().as_str(), "access-1");
            assert_eq!(output(out), "Logged in successfully.\n");
        }

        #[tokio::test]
        async fn does_not_save_when_the_provider_rejects_the_user() {
            let server = MockServer::start().await;
            mount_identity_provider(&server).await;
            Mock::given(method("POST"))
                .and(path("/oauth/token"))
                .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                    "error": "unauthorized",
                    "error_description": "Bad credentials",
                })))
                .mount(&server)
                .await;

            let mut store = InMemoryConfigStore::new();
            let mut out = Vec::new();
            let err = login(login_args(&server), &mut store, &mut out)
                .await
                .unwrap_err();

            assert!(format!("{err:?}").contains("Bad credentials"));
            assert_eq!(store.saves(), 0);
        }

        #[tokio::test]
        async fn client_credentials_login_remembers_no_user() {
            let server = MockServer::start().await;
            mount_identity_provider(&server).await;
            Mock::given(method("POST"))
                .and(path("/oauth/token"))
                .and(body_string_contains("grant_type=client_credentials"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "access_token": "client-token",
                    "expires_in": 3600,
                })))
                .expect(1)
                .mount(&server)
                .await;

            let mut args = login_args(&server);
            args.user = None;
            args.password = None;
            args.client_secret = Some(smctl_tokens::ClientSecret::from_static("s3cr3t"));

            let mut store = InMemoryConfigStore::new();
            login(args, &mut store, &mut Vec::new()).await.unwrap();

            let config = store.load().await.unwrap();
            assert_eq!(config.user, None);
            assert_eq!(config.token.unwrap().access_token().as_str(), "client-token");
        }
    }

    mod when_logging_out {
        use super::*;

        #[tokio::test]
        async fn forgets_the_token_but_keeps_the_target() {
            let url = Url::parse("https://sm.example.com").unwrap();
            let mut store = InMemoryConfigStore::with_config(ClientConfig {
                url: Some(url.clone()),
                token: Some(token("access-1", 1_000)),
                ..ClientConfig::default()
            });

            let mut out = Vec::new();
            logout(&mut store, &mut out).await.unwrap();

            let config = store.load().await.unwrap();
            assert_eq!(config.token, None);
            assert_eq!(config.url, Some(url));
            assert_eq!(output(out), "Logged out successfully.\n");
        }
    }

    mod when_showing_info {
        use super::*;

        fn logged_in() -> InMemoryConfigStore {
            InMemoryConfigStore::with_config(ClientConfig {
                url: Some(Url::parse("https://sm.example.com").unwrap()),
                user: Some(Username::from_static("admin")),
                token: Some(token("access-1", 1_000)),
                ..ClientConfig::default()
            })
        }

        #[tokio::test]
        async fn reports_a_valid_token() {
            let mut out = Vec::new();
            info(&mut logged_in(), &mut out, &TestClock::new(UnixTime(500)))
                .await
                .unwrap();

            assert_eq!(
                output(out),
                "Service Manager URL: https://sm.example.com/\n\
                 Logged in as: admin\n\
                 Token: valid until 1000\n"
            );
        }

        #[tokio::test]
        async fn reports_an_expired_token() {
            let mut out = Vec::new();
            info(&mut logged_in(), &mut out, &TestClock::new(UnixTime(995)))
                .await
                .unwrap();

            assert!(output(out).ends_with("Token: expired, renewable\n"));
        }

        #[tokio::test]
        async fn points_to_login_without_a_target() {
            let mut out = Vec::new();
            info(
                &mut InMemoryConfigStore::new(),
                &mut out,
                &TestClock::new(UnixTime(0)),
            )
            .await
            .unwrap();

            assert!(output(out).contains("smctl login"));
        }
    }

    mod when_sending_requests {
        use super::*;

        fn logged_in_to(server: &MockServer, token: Token) -> InMemoryConfigStore {
            let uri = Url::parse(&server.uri()).unwrap();
            let mut options = Options::new(ClientId::from_static("smctl"), uri.clone());
            options.authorization_endpoint = Some(uri.join("/oauth/authorize").unwrap());
            options.token_endpoint = Some(uri.join("/oauth/token").unwrap());
            options.client_secret = Some(smctl_tokens::ClientSecret::from_static("s3cr3t"));

            InMemoryConfigStore::with_config(ClientConfig {
                url: Some(uri),
                user: Some(Username::from_static("admin")),
                auth: Some(options),
                token: Some(token),
            })
        }

        fn curl_args(path: &str) -> CurlArgs {
            CurlArgs {
                path: path.to_owned(),
                method: reqwest::Method::GET,
                data: None,
            }
        }

        #[tokio::test]
        async fn attaches_the_held_token_without_saving() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/v1/service_brokers"))
                .and(header("authorization", "Bearer access-1"))
                .respond_with(ResponseTemplate::new(200).set_body_string("{\"items\":[]}"))
                .expect(1)
                .mount(&server)
                .await;

            let mut store = logged_in_to(&server, token("access-1", u64::MAX / 2));
            let mut out = Vec::new();
            curl(curl_args("/v1/service_brokers"), &mut store, &mut out)
                .await
                .unwrap();

            assert_eq!(output(out), "{\"items\":[]}\n");
            assert_eq!(store.saves(), 0);
        }

        #[tokio::test]
        async fn persists_a_refreshed_token() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/oauth/token"))
                .and(body_string_contains("grant_type=refresh_token"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "access_token": "access-2",
                    "expires_in": 3600,
                })))
                .expect(1)
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/v1/platforms"))
                .and(header("authorization", "Bearer access-2"))
                .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
                .expect(1)
                .mount(&server)
                .await;

            let mut store = logged_in_to(&server, token("access-1", 1));
            curl(curl_args("/v1/platforms"), &mut store, &mut Vec::new())
                .await
                .unwrap();

            let saved = store.load().await.unwrap().token.unwrap();
            assert_eq!(saved.access_token().as_str(), "access-2");
            assert_eq!(saved.refresh_token().unwrap().as_str(), "refresh-1");
            assert_eq!(store.saves(), 1);
        }

        #[tokio::test]
        async fn asks_to_log_in_again_when_renewal_is_impossible() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(200))
                .expect(0)
                .mount(&server)
                .await;

            let expired = Token::new(
                AccessToken::from_static("access-1"),
                "bearer",
                None,
                Some(UnixTime(1)),
                None,
            );
            let mut config = logged_in_to(&server, expired).load().await.unwrap();
            config.auth.as_mut().unwrap().client_secret = None;
            let mut store = InMemoryConfigStore::with_config(config);

            let err = curl(curl_args("/v1/platforms"), &mut store, &mut Vec::new())
                .await
                .unwrap_err();

            assert!(err.to_string().contains("smctl login"));
            assert_eq!(store.saves(), 0);
        }
    }
}
