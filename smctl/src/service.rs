//! Plumbing for talking to the service manager itself

use std::time::Duration;

use color_eyre::eyre::{eyre, Result, WrapErr};
use serde::Deserialize;
use url::Url;

/// The subset of the service manager's `/v1/info` document the CLI uses
#[derive(Debug, Deserialize)]
pub struct Info {
    pub token_issuer_url: Url,
}

/// Builds the client used before any identity provider settings exist
pub fn http_client(skip_ssl_validation: bool, timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("smctl/", env!("CARGO_PKG_VERSION")))
        .danger_accept_invalid_certs(skip_ssl_validation)
        .timeout(timeout)
        .build()
        .wrap_err("unable to construct HTTP client")
}

/// Resolves `path` against the service manager base URL
///
/// The base URL's own path is kept, so a service manager mounted below the
/// root keeps working. A query string in `path` is carried over.
pub fn api_url(base: &Url, path: &str) -> Result<Url> {
    let (path, query) = match path.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (path, None),
    };

    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| eyre!("{base} cannot be used as a service manager URL"))?
        .pop_if_empty()
        .extend(path.split('/').filter(|s| !s.is_empty()));
    url.set_query(query);

    Ok(url)
}

/// Asks the service manager which identity provider issues its tokens
#[tracing::instrument(skip(client), fields(url = %base))]
pub async fn fetch_info(client: &reqwest::Client, base: &Url) -> Result<Info> {
    let url = api_url(base, "/v1/info")?;

    let response = client
        .get(url.clone())
        .send()
        .await
        .wrap_err_with(|| format!("unable to reach service manager at {url}"))?;

    let status = response.status();
    tracing::debug!(%status, "received service manager info");
    if !status.is_success() {
        return Err(eyre!("service manager at {url} responded with {status}"));
    }

    response
        .json()
        .await
        .wrap_err("service manager info is malformed")
}
