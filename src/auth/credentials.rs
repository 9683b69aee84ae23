// src/auth/credentials.rs

//! Owns an identity, logs it in once, and produces negotiation tokens
//! while impersonating it.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::thread;
use std::time::Duration;

use super::backend::{KerberosBackend, KrbError};
use super::context::{SecurityContext, ServiceName};
use super::identity::Identity;
use super::krb5_conf;
use super::login::{LoginConfigurator, LoginEntry};
use super::subject::{self, CredentialSummary, Subject, Ticket};
use crate::error::{self, Error, TimedOut};
use crate::Result;

const DEFAULT_MAX_TIMED_WORKERS: usize = 8;

/// Credentials of one identity, shared by every negotiation made on its
/// behalf.
///
/// The identity is logged in at most once, on first use; concurrent first
/// callers wait for that single login instead of repeating it. Tickets
/// obtained while negotiating are stored in the identity's own cache.
pub struct CredentialManager {
    identity: Identity,
    entry: Arc<LoginEntry>,
    backend: Arc<dyn KerberosBackend>,
    subject: Mutex<Option<Arc<Subject>>>,
    logging_in: AtomicBool,
    logins: AtomicUsize,
    timed_workers: AtomicUsize,
    max_timed_workers: usize,
}

impl CredentialManager {
    /// Create a manager for `identity`.
    ///
    /// Installs the identity's Kerberos configuration file for the whole
    /// process and publishes its login entry in the global
    /// [`LoginRegistry`](super::LoginRegistry).
    pub fn new(identity: Identity, backend: Arc<dyn KerberosBackend>) -> Self {
        let entry = LoginConfigurator::from_identity(&identity).initialize();
        Self::from_parts(identity, entry, backend)
    }

    /// Create a manager that logs in with an explicit login entry.
    ///
    /// # Errors
    ///
    /// Returns a config error if `entry` is for a different principal than
    /// `identity`.
    pub fn with_login_entry(
        identity: Identity,
        entry: Arc<LoginEntry>,
        backend: Arc<dyn KerberosBackend>,
    ) -> Result<Self> {
        if entry.principal() != identity.principal() {
            return Err(error::config(format!(
                "login entry for '{}' cannot log in identity '{}'",
                entry.principal(),
                identity.principal()
            )));
        }
        Ok(Self::from_parts(identity, entry, backend))
    }

    fn from_parts(
        identity: Identity,
        entry: Arc<LoginEntry>,
        backend: Arc<dyn KerberosBackend>,
    ) -> Self {
        krb5_conf::install(identity.krb5_conf());

        Self {
            identity,
            entry,
            backend,
            subject: Mutex::new(None),
            logging_in: AtomicBool::new(false),
            logins: AtomicUsize::new(0),
            timed_workers: AtomicUsize::new(0),
            max_timed_workers: DEFAULT_MAX_TIMED_WORKERS,
        }
    }

    /// Cap on worker threads running [`negotiate_timeout`] exchanges at
    /// once, 8 by default. Workers that timed out count until the
    /// authentication service answers them.
    ///
    /// [`negotiate_timeout`]: Self::negotiate_timeout
    pub fn max_timed_workers(mut self, max: usize) -> Self {
        self.max_timed_workers = max;
        self
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn login_entry(&self) -> &LoginEntry {
        &self.entry
    }

    /// Log the identity in, unless that already happened.
    ///
    /// # Errors
    ///
    /// Returns a login error if the authentication service rejects the
    /// identity or no usable credential material exists.
    pub fn login(&self) -> Result<()> {
        self.logged_in_subject().map(|_| ())
    }

    /// Authenticate again and replace the initial ticket.
    ///
    /// This is the recovery path after an invalid credential error. Cached
    /// service tickets stay in the cache, but the next negotiation with each
    /// service obtains a new one with the new initial ticket.
    ///
    /// # Errors
    ///
    /// Returns a login error if authentication fails; the previous
    /// credentials stay in place in that case.
    pub fn refresh(&self) -> Result<()> {
        let ticket = self.authenticate()?;
        let mut slot = self.lock_slot();

        match *slot {
            Some(ref subject) => {
                subject.lock_cache().set_initial(ticket);
            }
            None => {
                *slot = Some(Arc::new(Subject::new(self.identity.principal(), ticket)));
            }
        }
        Ok(())
    }

    pub fn is_logged_in(&self) -> bool {
        self.lock_slot().is_some()
    }

    /// Number of successful authentications performed so far.
    pub fn login_count(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    /// The logged-in subject, if login has happened.
    pub fn subject(&self) -> Option<Arc<Subject>> {
        self.lock_slot().clone()
    }

    /// Produce the next output token for `context`.
    ///
    /// Logs in first if needed, then generates the token while
    /// impersonating the identity, so a newly obtained service ticket lands
    /// in this manager's cache.
    ///
    /// # Errors
    ///
    /// - login errors from the implicit [`login`](Self::login)
    /// - invalid credential when the credential is defective, expired or
    ///   absent
    /// - negotiation failure for any other protocol error
    pub fn negotiate(&self, context: SecurityContext, input: &[u8]) -> Result<Vec<u8>> {
        let subject = self.logged_in_subject()?;
        let service = context.service().clone();

        let result = subject::do_as(&subject, || context.step(&*self.backend, input));

        // The impersonation scope has ended here, on success and failure alike.
        result.map_err(|err| classify(&service, err))
    }

    /// Like [`negotiate`](Self::negotiate), but gives up after `timeout`.
    ///
    /// The exchange runs on a worker thread. When it does not finish in
    /// time the error is an invalid credential if the initial ticket is
    /// absent or expired (or the login is still running), and a negotiation
    /// failure otherwise; either way [`Error::is_timeout`] is true.
    ///
    /// At most [`max_timed_workers`](Self::max_timed_workers) workers run at
    /// once; a worker that timed out keeps its place until the
    /// authentication service answers it.
    ///
    /// # Errors
    ///
    /// Same as [`negotiate`](Self::negotiate), plus the timeout above, plus
    /// a negotiation failure when every worker is busy.
    pub fn negotiate_timeout(
        self: &Arc<Self>,
        context: SecurityContext,
        input: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>> {
        let worker = self.reserve_worker()?;
        let (tx, rx) = mpsc::sync_channel(1);
        let input = input.to_vec();

        thread::Builder::new()
            .name("negotiate".into())
            .spawn(move || {
                let result = worker.manager.negotiate(context, &input);
                // The receiver may have given up already.
                let _ = tx.send(result);
            })
            .map_err(error::negotiation)?;

        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(self.timed_out()),
            Err(RecvTimeoutError::Disconnected) => Err(error::negotiation(
                "negotiation worker exited without a result",
            )),
        }
    }

    /// Summaries of every cached ticket, for diagnostics only.
    pub fn cached_credentials(&self) -> Vec<CredentialSummary> {
        match self.subject() {
            Some(subject) => subject.lock_cache().summaries(),
            None => Vec::new(),
        }
    }

    pub fn service_ticket_count(&self) -> usize {
        self.subject()
            .map_or(0, |subject| subject.lock_cache().service_ticket_count())
    }

    /// Worker threads currently running timed negotiations.
    pub fn timed_workers(&self) -> usize {
        self.timed_workers.load(Ordering::SeqCst)
    }

    fn logged_in_subject(&self) -> Result<Arc<Subject>> {
        let mut slot = self.lock_slot();

        if let Some(ref subject) = *slot {
            return Ok(Arc::clone(subject));
        }

        self.logging_in.store(true, Ordering::SeqCst);
        let result = self.authenticate();
        self.logging_in.store(false, Ordering::SeqCst);

        let subject = Arc::new(Subject::new(self.identity.principal(), result?));
        *slot = Some(Arc::clone(&subject));
        Ok(subject)
    }

    fn authenticate(&self) -> Result<Ticket> {
        if self.entry.refresh_krb5_config() {
            krb5_conf::install(self.identity.krb5_conf());
        }

        log::debug!(
            "logging in as {} using {:?}",
            self.entry.principal(),
            self.entry.source()
        );

        match self.backend.authenticate(&self.entry) {
            Ok(ticket) => {
                self.logins.fetch_add(1, Ordering::SeqCst);
                log::debug!("logged in as {}", self.entry.principal());
                Ok(ticket)
            }
            Err(err) => {
                log::warn!("login as {} failed: {}", self.entry.principal(), err);
                Err(error::login(err))
            }
        }
    }

    fn reserve_worker(self: &Arc<Self>) -> Result<TimedWorker> {
        let max = self.max_timed_workers;
        self.timed_workers
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < max).then_some(n + 1)
            })
            .map_err(|busy| {
                log::warn!("all {} timed negotiation workers are busy", busy);
                error::negotiation(format!("all {} negotiation workers are busy", busy))
            })?;

        Ok(TimedWorker {
            manager: Arc::clone(self),
        })
    }

    fn timed_out(&self) -> Error {
        let stale = loop {
            // A running login means there is no material yet.
            if self.logging_in.load(Ordering::SeqCst) {
                break true;
            }
            match self.subject.try_lock() {
                Ok(slot) => break is_stale(&slot),
                Err(TryLockError::Poisoned(poisoned)) => break is_stale(&poisoned.into_inner()),
                // Other holders only keep the slot briefly.
                Err(TryLockError::WouldBlock) => thread::sleep(Duration::from_millis(1)),
            }
        };

        if stale {
            error::invalid_credential(error::negotiation(TimedOut))
        } else {
            error::negotiation(TimedOut)
        }
    }

    fn lock_slot(&self) -> MutexGuard<'_, Option<Arc<Subject>>> {
        self.subject.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Keeps a place in the timed worker cap until dropped.
struct TimedWorker {
    manager: Arc<CredentialManager>,
}

impl Drop for TimedWorker {
    fn drop(&mut self) {
        self.manager.timed_workers.fetch_sub(1, Ordering::SeqCst);
    }
}

fn is_stale(slot: &Option<Arc<Subject>>) -> bool {
    match slot {
        Some(subject) => subject
            .lock_cache()
            .initial()
            .map_or(true, Ticket::is_expired),
        None => true,
    }
}

fn classify(service: &ServiceName, err: KrbError) -> Error {
    if err.kind().is_credential_related() {
        log::debug!("credential rejected while negotiating {}: {}", service, err);
        error::invalid_credential(err)
    } else {
        log::debug!("negotiation with {} failed: {}", service, err);
        error::negotiation(err)
    }
}

impl fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialManager")
            .field("identity", &self.identity)
            .field("logins", &self.login_count())
            .field("timed_workers", &self.timed_workers())
            .finish()
    }
}
