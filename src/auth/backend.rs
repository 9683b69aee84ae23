// src/auth/backend.rs

//! Seam to the external Kerberos authentication service.
//!
//! The binary Kerberos and GSS formats stay behind this trait: tickets and
//! tokens are opaque buffers as far as this crate is concerned. A backend
//! may talk to a KDC directly, wrap a system GSS library, or be a scripted
//! double in tests.

use std::error::Error as StdError;
use std::fmt;

use super::context::{Mechanism, ServiceName};
use super::login::LoginEntry;
use super::subject::Ticket;

/// The external Kerberos authentication service.
///
/// Calls are blocking and may perform network round-trips.
pub trait KerberosBackend: Send + Sync {
    /// Obtain the initial ticket for the principal described by `entry`.
    ///
    /// The credential material to use is given by
    /// [`LoginEntry::source`](super::LoginEntry::source).
    fn authenticate(&self, entry: &LoginEntry) -> Result<Ticket, KrbError>;

    /// Obtain a service ticket for `service` using the initial ticket.
    fn request_service_ticket(
        &self,
        initial: &Ticket,
        service: &ServiceName,
    ) -> Result<Ticket, KrbError>;

    /// Produce the next output token for `mechanism` from a service ticket
    /// and the peer's input token (empty on the first round).
    fn build_token(
        &self,
        mechanism: Mechanism,
        service_ticket: &Ticket,
        input: &[u8],
    ) -> Result<Vec<u8>, KrbError>;
}

/// Failure class reported by the authentication service.
///
/// These mirror the GSS major status codes that matter to callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KrbErrorKind {
    DefectiveCredential,
    CredentialsExpired,
    NoCredential,
    BadName,
    BadMechanism,
    DefectiveToken,
    PrincipalUnknown,
    PreauthFailed,
    ServiceUnavailable,
    Failure,
}

impl KrbErrorKind {
    /// Whether the failure is caused by the credential itself being
    /// defective, expired or absent.
    pub fn is_credential_related(self) -> bool {
        matches!(
            self,
            KrbErrorKind::DefectiveCredential
                | KrbErrorKind::CredentialsExpired
                | KrbErrorKind::NoCredential
        )
    }

    fn as_str(self) -> &'static str {
        match self {
            KrbErrorKind::DefectiveCredential => "defective credential",
            KrbErrorKind::CredentialsExpired => "credentials expired",
            KrbErrorKind::NoCredential => "no credential",
            KrbErrorKind::BadName => "bad name",
            KrbErrorKind::BadMechanism => "bad mechanism",
            KrbErrorKind::DefectiveToken => "defective token",
            KrbErrorKind::PrincipalUnknown => "principal unknown",
            KrbErrorKind::PreauthFailed => "pre-authentication failed",
            KrbErrorKind::ServiceUnavailable => "service unavailable",
            KrbErrorKind::Failure => "failure",
        }
    }
}

/// An error reported by a [`KerberosBackend`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KrbError {
    kind: KrbErrorKind,
    message: String,
}

impl KrbError {
    pub fn new(kind: KrbErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> KrbErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for KrbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            f.write_str(self.kind.as_str())
        } else {
            write!(f, "{}: {}", self.kind.as_str(), self.message)
        }
    }
}

impl StdError for KrbError {}
