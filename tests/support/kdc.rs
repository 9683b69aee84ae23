// tests/support/kdc.rs

//! In-process stand-in for the Kerberos authentication service.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, SystemTime};

use negotiate_proxy::{
    CredentialSource, KerberosBackend, KrbError, KrbErrorKind, LoginEntry, Mechanism,
    ServiceName, Subject, Ticket,
};

pub const REALM: &str = "EXAMPLE.COM";

#[derive(Default)]
pub struct MockKdc {
    logins: AtomicUsize,
    service_requests: AtomicUsize,
    tokens: AtomicUsize,
    sources: Mutex<Vec<CredentialSource>>,
    // Principal impersonated on the calling thread at each TGS request.
    impersonated: Mutex<Vec<Option<String>>>,
    login_error: Mutex<Option<KrbErrorKind>>,
    token_error: Mutex<Option<KrbErrorKind>>,
    // Service tickets issued so far rejected by `build_token`.
    revoked_up_to: AtomicUsize,
    login_delay: Option<Duration>,
}

impl MockKdc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_login_delay(delay: Duration) -> Self {
        Self {
            login_delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn reject_logins(&self, kind: KrbErrorKind) {
        *self.login_error.lock().unwrap() = Some(kind);
    }

    pub fn fail_tokens(&self, kind: KrbErrorKind) {
        *self.token_error.lock().unwrap() = Some(kind);
    }

    /// Reject every service ticket issued so far as a defective credential.
    pub fn revoke_service_tickets(&self) {
        self.revoked_up_to
            .store(self.service_request_count(), Ordering::SeqCst);
    }

    pub fn login_count(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    pub fn service_request_count(&self) -> usize {
        self.service_requests.load(Ordering::SeqCst)
    }

    pub fn token_count(&self) -> usize {
        self.tokens.load(Ordering::SeqCst)
    }

    pub fn sources(&self) -> Vec<CredentialSource> {
        self.sources.lock().unwrap().clone()
    }

    pub fn impersonated(&self) -> Vec<Option<String>> {
        self.impersonated.lock().unwrap().clone()
    }
}

impl KerberosBackend for MockKdc {
    fn authenticate(&self, entry: &LoginEntry) -> Result<Ticket, KrbError> {
        if let Some(delay) = self.login_delay {
            thread::sleep(delay);
        }
        if let Some(kind) = *self.login_error.lock().unwrap() {
            return Err(KrbError::new(kind, entry.principal()));
        }

        self.logins.fetch_add(1, Ordering::SeqCst);
        self.sources.lock().unwrap().push(entry.source());

        Ok(Ticket::new(
            format!("{}@{}", entry.principal(), REALM),
            format!("krbtgt/{}@{}", REALM, REALM),
            SystemTime::now() + Duration::from_secs(10 * 3600),
            b"tgt".to_vec(),
        ))
    }

    fn request_service_ticket(
        &self,
        initial: &Ticket,
        service: &ServiceName,
    ) -> Result<Ticket, KrbError> {
        let serial = self.service_requests.fetch_add(1, Ordering::SeqCst) + 1;
        self.impersonated
            .lock()
            .unwrap()
            .push(Subject::current().map(|s| s.principal().to_string()));

        Ok(Ticket::new(
            initial.client(),
            service.principal(REALM),
            SystemTime::now() + Duration::from_secs(3600),
            format!("{}#{}", service.principal(REALM), serial).into_bytes(),
        ))
    }

    fn build_token(
        &self,
        mechanism: Mechanism,
        service_ticket: &Ticket,
        input: &[u8],
    ) -> Result<Vec<u8>, KrbError> {
        if let Some(kind) = *self.token_error.lock().unwrap() {
            return Err(KrbError::new(kind, "scripted failure"));
        }
        if serial(service_ticket) <= self.revoked_up_to.load(Ordering::SeqCst) {
            return Err(KrbError::new(
                KrbErrorKind::DefectiveCredential,
                format!("revoked ticket for {}", service_ticket.server()),
            ));
        }

        self.tokens.fetch_add(1, Ordering::SeqCst);

        let mut token = mechanism.oid().as_bytes().to_vec();
        token.push(b':');
        token.extend_from_slice(service_ticket.data());
        token.extend_from_slice(input);
        Ok(token)
    }
}

fn serial(ticket: &Ticket) -> usize {
    std::str::from_utf8(ticket.data())
        .ok()
        .and_then(|data| data.rsplit('#').next())
        .and_then(|serial| serial.parse().ok())
        .unwrap_or(0)
}
