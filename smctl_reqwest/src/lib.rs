//! Middleware to automatically attach a valid bearer token to outgoing requests
//!
//! When using [`ClientWithMiddleware`](reqwest_middleware::ClientWithMiddleware),
//! include the [`AccessTokenMiddleware`] in the middleware stack. Before each
//! request is dispatched the middleware asks the shared
//! [`TokenRefresher`] for a token that is valid now, renewing it if
//! needed. If no valid token can be obtained the request is not sent and the
//! refresher's error is returned instead.
//!
//! If a request already has specified an `Authorization` header value by
//! the time that the middleware executes, the existing value will be left
//! in place, allowing overrides to be specified as required.
//!
//! ```
//! use std::sync::Arc;
//!
//! use smctl_reqwest::AccessTokenMiddleware;
//! use smctl_tokens::{ClientId, Options, TokenRefresher};
//! use reqwest::Client;
//! use reqwest_middleware::ClientBuilder;
//! use tokio::sync::Mutex;
//!
//! let options = Options::new(
//!     ClientId::from_static("smctl"),
//!     "https://uaa.example.com".parse().unwrap(),
//! );
//! let refresher = Arc::new(Mutex::new(TokenRefresher::new(Client::new(), options, None)));
//!
//! let client = ClientBuilder::new(Client::default())
//!     .with(AccessTokenMiddleware::new(refresher))
//!     .build();
//! ```
//!
//! The middleware can also be configured to add an authorization token
//! only conditionally, so that a token issued for the service manager is
//! never sent to any other host.
//!
//! ```
//! # use std::sync::Arc;
//! # use smctl_tokens::{ClientId, Options, TokenRefresher};
//! # use tokio::sync::Mutex;
//! use smctl_reqwest::{AccessTokenMiddleware, ExactHostMatch};
//! # let options = Options::new(
//! #     ClientId::from_static("smctl"),
//! #     "https://uaa.example.com".parse().unwrap(),
//! # );
//! # let client = reqwest::Client::new();
//! # let refresher = Arc::new(Mutex::new(TokenRefresher::new(client, options, None)));
//!
//! AccessTokenMiddleware::new(refresher)
//!     .with_predicate(ExactHostMatch::new("sm.example.com"));
//! ```

#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    missing_copy_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

use std::{fmt, sync::Arc};

use bytes::{BufMut, BytesMut};
use predicates::{prelude::*, reflection};
use reqwest::{header, Request, Response};
use reqwest_middleware::{Middleware, Next, Result};
use smctl_clock::{Clock, System};
use smctl_tokens::{Token, TokenRefresher};
use tokio::sync::Mutex;

/// A token refresher shared between the middleware and its owner
///
/// The owner keeps a handle so that a renewed token can be persisted once
/// the command has finished.
pub type SharedRefresher<C = System> = Arc<Mutex<TokenRefresher<C>>>;

/// A middleware that injects an access token into outgoing requests
#[derive(Debug)]
pub struct AccessTokenMiddleware<P = AllRequests, C = System> {
    refresher: SharedRefresher<C>,
    predicate: P,
}

impl<P: Clone, C> Clone for AccessTokenMiddleware<P, C> {
    fn clone(&self) -> Self {
        Self {
            refresher: Arc::clone(&self.refresher),
            predicate: self.predicate.clone(),
        }
    }
}

impl<C> AccessTokenMiddleware<AllRequests, C> {
    /// Construct a new middleware from a shared token refresher
    ///
    /// By default, this middleware will attach a token to every request.
    /// To change this behavior, provide a custom predicate with
    /// [`with_predicate()`][Self::with_predicate()].
    pub fn new(refresher: SharedRefresher<C>) -> Self {
        Self {
            refresher,
            predicate: AllRequests,
        }
    }

    /// Replaces the default predicate with a custom predicate
    pub fn with_predicate<P>(self, predicate: P) -> AccessTokenMiddleware<P, C> {
        AccessTokenMiddleware {
            refresher: self.refresher,
            predicate,
        }
    }
}

impl<P, C: Clock + Send + Sync> AccessTokenMiddleware<P, C> {
    async fn get_token_from_source(&self) -> Result<header::HeaderValue> {
        let mut refresher = self.refresher.lock().await;
        let token = refresher
            .token()
            .await
            .map_err(|err| reqwest_middleware::Error::Middleware(err.into()))?;

        if tracing::enabled!(tracing::Level::TRACE) {
            let now = refresher.clock().now();

            tracing::trace!(
                token.status = ?token.token_status_at(now),
                token.expiry = token.expiry().map(|e| e.0),
                token.until_expired = token.until_expired_at(now).map(|d| d.0),
                "obtained access token"
            );
        }
        drop(refresher);

        bearer_header_value(&token)
    }
}

fn bearer_header_value(token: &Token) -> Result<header::HeaderValue> {
    let access_token = token.access_token().as_str();
    let mut header_value = BytesMut::with_capacity(access_token.len() + 7);
    header_value.put_slice(b"Bearer ");
    header_value.put_slice(access_token.as_bytes());
    let mut value = header::HeaderValue::from_maybe_shared(header_value.freeze())
        .map_err(|err| reqwest_middleware::Error::Middleware(err.into()))?;
    value.set_sensitive(true);
    Ok(value)
}

#[async_trait::async_trait]
impl<P, C> Middleware for AccessTokenMiddleware<P, C>
where
    P: Predicate<Request> + Send + Sync + 'static,
    C: Clock + Send + Sync + 'static,
{
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut http::Extensions,
        next: Next<'_>,
    ) -> Result<Response> {
        if self.predicate.eval(&req) && !req.headers().contains_key(header::AUTHORIZATION) {
            let value = self.get_token_from_source().await?;
            req.headers_mut().insert(header::AUTHORIZATION, value);
        }

        next.run(req, extensions).await
    }
}

/// Whether a failed request needs the user to log in again
///
/// This is the case when the middleware could not obtain a token without
/// user interaction.
pub fn requires_reauthentication(error: &reqwest_middleware::Error) -> bool {
    match error {
        reqwest_middleware::Error::Middleware(inner) => inner
            .downcast_ref::<smctl_tokens::Error>()
            .map_or(false, smctl_tokens::Error::requires_reauthentication),
        _ => false,
    }
}

/// Attach an access token to every request
#[derive(Clone, Copy, Debug)]
pub struct AllRequests;

impl Predicate<Request> for AllRequests {
    #[inline]
    fn eval(&self, _: &Request) -> bool {
        true
    }
}

impl reflection::PredicateReflection for AllRequests {}
impl fmt::Display for AllRequests {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any request")
    }
}

/// Only attach an access token if the request is being sent to the exact host specified
#[derive(Clone, Debug)]
pub struct ExactHostMatch {
    host: String,
}

impl ExactHostMatch {
    /// Construct a new predicate from a host string
    pub fn new<S>(host: S) -> Self
    where
        S: ToString,
    {
        Self {
            host: host.to_string(),
        }
    }
}

impl Predicate<Request> for ExactHostMatch {
    #[inline]
    fn eval(&self, req: &Request) -> bool {
        req.url().host_str() == Some(&self.host)
    }

    fn find_case(&self, expected: bool, req: &Request) -> Option<reflection::Case> {
        let result = self.eval(req);
        if result != expected {
            Some(
                reflection::Case::new(Some(self), result).add_product(reflection::Product::new(
                    "host",
                    req.url()
                        .host_str()
                        .unwrap_or("<value not valid utf-8>")
                        .to_owned(),
                )),
            )
        } else {
            None
        }
    }
}

impl reflection::PredicateReflection for ExactHostMatch {}
impl fmt::Display for ExactHostMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("host == ")?;
        f.write_str(&self.host)
    }
}
