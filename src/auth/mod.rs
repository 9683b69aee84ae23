// src/auth/mod.rs

//! Kerberos/SPNEGO "Negotiate" authentication against forward proxies.
//!
//! A [`CredentialManager`] owns one [`Identity`] and its ticket cache and is
//! shared by every connection; a [`SchemeFactory`] hands each proxy
//! authentication attempt its own [`NegotiationScheme`]. Talking to the
//! actual authentication service is left to a [`KerberosBackend`].

mod backend;
mod context;
mod credentials;
mod identity;
pub mod krb5_conf;
mod login;
mod negotiate;
mod subject;

pub use self::backend::{KerberosBackend, KrbError, KrbErrorKind};
pub use self::context::{Mechanism, NameType, SecurityContext, ServiceName};
pub use self::credentials::CredentialManager;
pub use self::identity::{Identity, IdentityBuilder};
pub use self::login::{ControlFlag, CredentialSource, LoginConfigurator, LoginEntry, LoginRegistry};
pub use self::negotiate::{NegotiationScheme, NegotiationState, SchemeFactory, SCHEME_NAME};
pub use self::subject::{do_as, CredentialCache, CredentialSummary, Subject, Ticket};
