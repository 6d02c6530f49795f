//! Session and token management for the service manager CLI
//!
//! A CLI invocation runs exactly one command. Before that command talks to
//! the service manager it needs a bearer token that is valid *now*. This
//! crate decides how to get one:
//!
//! * [`OpenIdStrategy`] performs the initial login. It discovers the
//!   identity provider's endpoints from the issuer's
//!   `/.well-known/openid-configuration` document and then uses either the
//!   resource owner password grant or, when a client secret is configured,
//!   the client credentials grant.
//! * [`TokenRefresher`] takes the token persisted by a previous invocation
//!   and either reuses it, refreshes it, obtains a new one with client
//!   credentials, or reports that the user has to log in again.
//! * [`ConfigStore`][config::ConfigStore] persists the target, the
//!   identity provider settings and the token between invocations.
//!
//! ```no_run
//! use smctl_tokens::{
//!     config::{ConfigStore, FileConfigStore},
//!     ClientId, Options, TokenRefresher,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut store = FileConfigStore::new("config.json".into());
//! let mut config = store.load().await?;
//!
//! let options = config.auth.clone().unwrap_or_else(|| {
//!     Options::new(
//!         ClientId::from_static("smctl"),
//!         "https://uaa.example.com".parse().unwrap(),
//!     )
//! });
//!
//! let mut refresher = TokenRefresher::new(options.http_client()?, options, config.token.take());
//!
//! match refresher.token().await {
//!     Ok(token) => tracing::info!(expiry = ?token.expiry(), "obtained access token"),
//!     Err(error) if error.requires_reauthentication() => eprintln!("{}", error),
//!     Err(error) => return Err(error.into()),
//! }
//!
//! if refresher.was_renewed() {
//!     config.token = refresher.current().cloned();
//!     store.save(&config).await?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! * `file` (default): provides [`FileConfigStore`][config::FileConfigStore],
//!   which persists the configuration as a JSON file.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

mod braids;
pub mod config;
mod error;
pub mod oauth2;
pub mod oidc;
mod options;
mod refresher;
mod strategy;
mod tokens;

pub use braids::*;
pub use error::{DiscoveryError, Error, ProviderError, ReauthenticationReason};
pub use options::{Options, DEFAULT_TIMEOUT};
pub use refresher::TokenRefresher;
pub use strategy::{
    AuthenticationFlow, AuthenticationStrategy, ClientCredentialsStrategy, OpenIdStrategy,
    PasswordStrategy,
};
pub use tokens::{Token, TokenStatus, EXPIRY_LEEWAY};
