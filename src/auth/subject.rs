// src/auth/subject.rs

//! Authenticated subjects, their credential caches, and the scoped
//! impersonation under which caches may be mutated.

use std::cell::RefCell;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use super::backend::{KrbError, KrbErrorKind};
use super::context::ServiceName;

thread_local! {
    static CURRENT: RefCell<Vec<Arc<Subject>>> = RefCell::new(Vec::new());
}

/// An opaque Kerberos ticket together with the metadata this crate needs.
#[derive(Clone, PartialEq, Eq)]
pub struct Ticket {
    client: String,
    server: String,
    expires_at: SystemTime,
    data: Vec<u8>,
}

impl Ticket {
    pub fn new(
        client: impl Into<String>,
        server: impl Into<String>,
        expires_at: SystemTime,
        data: Vec<u8>,
    ) -> Self {
        Self {
            client: client.into(),
            server: server.into(),
            expires_at,
            data,
        }
    }

    pub fn client(&self) -> &str {
        &self.client
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn expires_at(&self) -> SystemTime {
        self.expires_at
    }

    /// Raw ticket bytes, opaque to this crate.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        self.expires_at <= now
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(SystemTime::now())
    }
}

// Ticket bytes stay out of logs.
impl std::fmt::Debug for Ticket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ticket")
            .field("client", &self.client)
            .field("server", &self.server)
            .field("expires_at", &self.expires_at)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Tickets held by one subject: the initial ticket plus the service
/// tickets obtained with it.
///
/// The set of service tickets only grows. A service ticket that expired, or
/// was obtained with an initial ticket that has since been replaced, is
/// replaced in place when the same service is negotiated again.
#[derive(Debug, Default)]
pub struct CredentialCache {
    initial: Option<Ticket>,
    // Bumped every time the initial ticket is replaced.
    generation: u64,
    service_tickets: HashMap<ServiceName, CachedTicket>,
}

#[derive(Debug)]
struct CachedTicket {
    ticket: Ticket,
    generation: u64,
}

impl CredentialCache {
    pub fn initial(&self) -> Option<&Ticket> {
        self.initial.as_ref()
    }

    pub fn service_ticket(&self, service: &ServiceName) -> Option<&Ticket> {
        self.service_tickets.get(service).map(|cached| &cached.ticket)
    }

    /// The service ticket for `service` if it was obtained with the current
    /// initial ticket. Expiry is not checked.
    pub(crate) fn current_service_ticket(&self, service: &ServiceName) -> Option<&Ticket> {
        self.service_tickets
            .get(service)
            .filter(|cached| cached.generation == self.generation)
            .map(|cached| &cached.ticket)
    }

    pub fn service_ticket_count(&self) -> usize {
        self.service_tickets.len()
    }

    /// Replace the initial ticket. Service tickets stay cached but are no
    /// longer current.
    pub(crate) fn set_initial(&mut self, ticket: Ticket) -> Option<Ticket> {
        self.generation += 1;
        self.initial.replace(ticket)
    }

    /// Store a service ticket, returning true if `service` was not cached yet.
    pub(crate) fn insert_service_ticket(&mut self, service: ServiceName, ticket: Ticket) -> bool {
        let cached = CachedTicket {
            ticket,
            generation: self.generation,
        };
        self.service_tickets.insert(service, cached).is_none()
    }

    pub(crate) fn summaries(&self) -> Vec<CredentialSummary> {
        let initial = self.initial.iter().map(|t| CredentialSummary::of(t, true));
        let services = self
            .service_tickets
            .values()
            .map(|cached| CredentialSummary::of(&cached.ticket, false));
        initial.chain(services).collect()
    }
}

/// Read-only view of a cached ticket, for diagnostics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CredentialSummary {
    pub client: String,
    pub server: String,
    pub expires_at: SystemTime,
    pub initial: bool,
}

impl CredentialSummary {
    fn of(ticket: &Ticket, initial: bool) -> Self {
        Self {
            client: ticket.client.clone(),
            server: ticket.server.clone(),
            expires_at: ticket.expires_at,
            initial,
        }
    }
}

/// An authenticated identity and its credential cache.
#[derive(Debug)]
pub struct Subject {
    principal: String,
    cache: Mutex<CredentialCache>,
}

impl Subject {
    pub(crate) fn new(principal: impl Into<String>, initial: Ticket) -> Self {
        let mut cache = CredentialCache::default();
        cache.set_initial(initial);
        Self {
            principal: principal.into(),
            cache: Mutex::new(cache),
        }
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }

    /// The innermost subject being impersonated on this thread.
    pub fn current() -> Option<Arc<Subject>> {
        CURRENT.with(|stack| stack.borrow().last().cloned())
    }

    /// Enter an impersonation scope that lasts until the guard is dropped.
    ///
    /// Guards must be dropped in reverse order of entry; [`do_as`] is the
    /// public way in.
    pub(crate) fn enter(self: &Arc<Self>) -> SubjectGuard {
        let depth = CURRENT.with(|stack| {
            let mut stack = stack.borrow_mut();
            stack.push(Arc::clone(self));
            stack.len() - 1
        });
        SubjectGuard {
            depth,
            _not_send: PhantomData,
        }
    }

    pub(crate) fn lock_cache(&self) -> MutexGuard<'_, CredentialCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Restores the previously impersonated subject when dropped.
#[must_use = "the impersonation scope ends when the guard is dropped"]
#[derive(Debug)]
pub(crate) struct SubjectGuard {
    depth: usize,
    // The scope is bound to the thread that entered it.
    _not_send: PhantomData<*const ()>,
}

impl Drop for SubjectGuard {
    fn drop(&mut self) {
        CURRENT.with(|stack| {
            let mut stack = stack.borrow_mut();
            debug_assert_eq!(
                stack.len(),
                self.depth + 1,
                "impersonation scopes left out of order"
            );
            stack.truncate(self.depth);
        });
    }
}

/// Run `f` while impersonating `subject`.
///
/// The previous subject (if any) is restored on every exit path, including
/// unwinding out of `f`.
pub fn do_as<R>(subject: &Arc<Subject>, f: impl FnOnce() -> R) -> R {
    let _guard = subject.enter();
    f()
}

/// Access the credential cache of the subject currently impersonated.
///
/// This is the only way the cache is mutated, which keeps new tickets out
/// of any cache but the one belonging to the identity in scope.
pub(crate) fn with_current_cache<R>(
    f: impl FnOnce(&mut CredentialCache) -> R,
) -> Result<R, KrbError> {
    let subject = Subject::current().ok_or_else(|| {
        KrbError::new(KrbErrorKind::NoCredential, "no subject in scope")
    })?;
    let mut cache = subject.lock_cache();
    Ok(f(&mut cache))
}
