#![deny(missing_debug_implementations)]

//! # negotiate-proxy
//!
//! SPNEGO/Kerberos authentication for outbound HTTP calls that go through
//! an authenticating forward proxy.
//!
//! The HTTP client stays in charge of connections: for every proxy
//! authentication attempt it asks a [`SchemeFactory`] for a fresh
//! [`NegotiationScheme`], feeds it the proxy's `Negotiate` challenge and
//! sends the produced value back in `Proxy-Authorization`.
//!
//! ```no_run
//! # type Backend = std::sync::Arc<dyn negotiate_proxy::KerberosBackend>;
//! # fn run(backend: Backend) -> negotiate_proxy::Result<()> {
//! use std::sync::Arc;
//! use negotiate_proxy::{CredentialManager, Identity, ProxyTarget, SchemeFactory};
//!
//! let identity = Identity::builder("svc-doi@CORP.COM")
//!     .keytab("/etc/security/svc-doi.keytab")
//!     .krb5_conf("/etc/krb5.conf")
//!     .build()?;
//! let manager = Arc::new(CredentialManager::new(identity, backend));
//! let factory = SchemeFactory::new(manager);
//!
//! let proxy = ProxyTarget::from_url("http://proxy.corp.com:3128")?;
//! let mut scheme = factory.create(&proxy);
//! scheme.on_challenge("Negotiate");
//! let header = scheme.produce_authorization_value()?;
//! # let _ = header;
//! # Ok(())
//! # }
//! ```
//!
//! Login and token generation block on the authentication service; keep
//! them off latency-sensitive paths.

pub use self::auth::{
    do_as, krb5_conf, ControlFlag, CredentialCache, CredentialManager, CredentialSource,
    CredentialSummary, Identity, IdentityBuilder, KerberosBackend, KrbError, KrbErrorKind,
    LoginConfigurator, LoginEntry, LoginRegistry, Mechanism, NameType, NegotiationScheme,
    NegotiationState, SchemeFactory, SecurityContext, ServiceName, Subject, Ticket,
    SCHEME_NAME,
};
pub use self::error::{Error, Result};
pub use self::proxy::{authorize, parse_proxy_authenticate, ProxyTarget};

mod auth;
mod error;
mod proxy;
