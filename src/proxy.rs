// src/proxy.rs

//! Glue between an HTTP transport and a [`NegotiationScheme`].
//!
//! The transport owns connections and retries; this module only reads
//! `Proxy-Authenticate` challenges and writes `Proxy-Authorization` values.

use std::fmt;

use http::header::{PROXY_AUTHENTICATE, PROXY_AUTHORIZATION};
use http::HeaderMap;

use crate::auth::{NegotiationScheme, ServiceName, SCHEME_NAME};
use crate::{error, Result};

/// The authenticating forward proxy outbound calls go through.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ProxyTarget {
    host: String,
    port: u16,
}

impl ProxyTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse a proxy URL such as `http://proxy.corp.com:3128`.
    ///
    /// # Errors
    ///
    /// Fails if the URL does not parse, has no host, or has no port and no
    /// known default port for its scheme.
    pub fn from_url(url: &str) -> Result<Self> {
        let url = url::Url::parse(url).map_err(error::config)?;

        let host = url
            .host_str()
            .ok_or_else(|| error::config("proxy URL has no host"))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| error::config("proxy URL has no port"))?;

        Ok(Self::new(host, port))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The service tokens are produced for: `HTTP@<host>`.
    pub fn service_name(&self) -> ServiceName {
        ServiceName::http(self.host.clone())
    }
}

impl fmt::Display for ProxyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Find the `Negotiate` challenge among `Proxy-Authenticate` headers.
///
/// Returns `Some("")` for a bare `Negotiate`, `Some(token)` for
/// `Negotiate <token>`, and `None` when the proxy offered no Negotiate
/// challenge at all.
pub fn parse_proxy_authenticate(headers: &HeaderMap) -> Option<String> {
    for value in headers.get_all(PROXY_AUTHENTICATE) {
        let value_str = match value.to_str() {
            Ok(value_str) => value_str,
            Err(_) => continue,
        };

        // Several challenges may share one header line.
        for challenge in value_str.split(',') {
            let trimmed = challenge.trim();
            let mut parts = trimmed.splitn(2, char::is_whitespace);

            if let Some(scheme) = parts.next() {
                if scheme.eq_ignore_ascii_case(SCHEME_NAME) {
                    let token = parts.next().unwrap_or("").trim();
                    return Some(token.to_string());
                }
            }
        }
    }

    None
}

/// Answer a proxy's challenge on the request about to be retried.
///
/// Feeds the `Negotiate` challenge found in `response` to `scheme` and
/// inserts the resulting `Proxy-Authorization` header into `request`.
/// Returns `Ok(false)` without touching the scheme when the proxy offered
/// no Negotiate challenge.
///
/// # Errors
///
/// Any error from [`NegotiationScheme::produce_authorization_value`].
pub fn authorize(
    scheme: &mut NegotiationScheme,
    response: &HeaderMap,
    request: &mut HeaderMap,
) -> Result<bool> {
    let challenge = match parse_proxy_authenticate(response) {
        Some(challenge) => challenge,
        None => return Ok(false),
    };

    scheme.on_challenge(&challenge);
    let value = scheme.produce_authorization_value()?;
    request.insert(PROXY_AUTHORIZATION, value);

    Ok(true)
}
