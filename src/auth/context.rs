// src/auth/context.rs

//! Per-call security context used to produce one negotiation token.

use std::fmt;

use super::backend::{KerberosBackend, KrbError, KrbErrorKind};
use super::subject::{self, Ticket};

/// How a [`ServiceName`] is to be interpreted by the authentication service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NameType {
    /// `service@host`, resolved to `service/host@REALM` by the service.
    HostBasedService,
    /// A fully qualified principal name.
    Principal,
}

/// Name of the target service a token is produced for.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ServiceName {
    service: String,
    host: String,
    name_type: NameType,
}

impl ServiceName {
    /// A host-based service name such as `HTTP@proxy.example.com`.
    pub fn host_based(service: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            host: host.into(),
            name_type: NameType::HostBasedService,
        }
    }

    /// The `HTTP` service on `host`, as used for proxy authentication.
    pub fn http(host: impl Into<String>) -> Self {
        Self::host_based("HTTP", host)
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn name_type(&self) -> NameType {
        self.name_type
    }

    /// Render the Kerberos principal for this service in `realm`.
    ///
    /// ```
    /// # use negotiate_proxy::ServiceName;
    /// let name = ServiceName::http("proxy.example.com");
    /// assert_eq!(name.principal("CORP.COM"), "HTTP/proxy.example.com@CORP.COM");
    /// ```
    pub fn principal(&self, realm: &str) -> String {
        format!("{}/{}@{}", self.service, self.host, realm)
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.service, self.host)
    }
}

/// Mechanism a security context negotiates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Mechanism {
    /// SPNEGO pseudo-mechanism, negotiating Kerberos underneath.
    #[default]
    Spnego,
    /// Raw Kerberos v5.
    Kerberos,
}

impl Mechanism {
    /// Dotted object identifier of the mechanism.
    pub fn oid(self) -> &'static str {
        match self {
            Mechanism::Spnego => "1.3.6.1.5.5.2",
            Mechanism::Kerberos => "1.2.840.113554.1.2.2",
        }
    }
}

/// One step of context establishment against a target service.
///
/// Created fresh for every negotiation call and consumed by [`step`].
///
/// [`step`]: SecurityContext::step
#[derive(Clone, Debug)]
pub struct SecurityContext {
    service: ServiceName,
    mechanism: Mechanism,
}

impl SecurityContext {
    pub fn new(service: ServiceName, mechanism: Mechanism) -> Self {
        Self { service, mechanism }
    }

    pub fn service(&self) -> &ServiceName {
        &self.service
    }

    pub fn mechanism(&self) -> Mechanism {
        self.mechanism
    }

    /// Produce the next output token.
    ///
    /// Must run inside an impersonation scope (see [`do_as`]): the initial
    /// ticket is read from the current subject's cache and a newly obtained
    /// service ticket is stored there.
    ///
    /// # Errors
    ///
    /// `NoCredential` when no subject is active or it holds no initial
    /// ticket, `CredentialsExpired` when that ticket has expired, and any
    /// error raised by the backend.
    ///
    /// [`do_as`]: super::do_as
    pub(crate) fn step(
        self,
        backend: &dyn KerberosBackend,
        input: &[u8],
    ) -> Result<Vec<u8>, KrbError> {
        let ticket = self.service_ticket(backend)?;

        let token = backend.build_token(self.mechanism, &ticket, input)?;
        if token.is_empty() {
            return Err(KrbError::new(
                KrbErrorKind::DefectiveToken,
                format!("empty token produced for {}", self.service),
            ));
        }

        Ok(token)
    }

    fn service_ticket(&self, backend: &dyn KerberosBackend) -> Result<Ticket, KrbError> {
        let (initial, cached) = subject::with_current_cache(|cache| {
            (
                cache.initial().cloned(),
                cache.current_service_ticket(&self.service).cloned(),
            )
        })?;

        let initial = initial
            .ok_or_else(|| KrbError::new(KrbErrorKind::NoCredential, "no initial ticket"))?;
        if initial.is_expired() {
            return Err(KrbError::new(
                KrbErrorKind::CredentialsExpired,
                format!("initial ticket for {} has expired", initial.client()),
            ));
        }

        if let Some(ticket) = cached.filter(|t| !t.is_expired()) {
            log::trace!("reusing cached service ticket for {}", self.service);
            return Ok(ticket);
        }

        // Obtained outside the cache lock: the exchange may block.
        let ticket = backend.request_service_ticket(&initial, &self.service)?;
        log::debug!("obtained service ticket for {}", self.service);

        subject::with_current_cache(|cache| {
            cache.insert_service_ticket(self.service.clone(), ticket.clone())
        })?;

        Ok(ticket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_name_display() {
        let name = ServiceName::http("proxy.example.com");
        assert_eq!(name.to_string(), "HTTP@proxy.example.com");
        assert_eq!(name.name_type(), NameType::HostBasedService);
        assert_eq!(name.service(), "HTTP");
        assert_eq!(name.host(), "proxy.example.com");
    }

    #[test]
    fn test_mechanism_oids() {
        assert_eq!(Mechanism::default(), Mechanism::Spnego);
        assert_eq!(Mechanism::Spnego.oid(), "1.3.6.1.5.5.2");
        assert_eq!(Mechanism::Kerberos.oid(), "1.2.840.113554.1.2.2");
    }
}
