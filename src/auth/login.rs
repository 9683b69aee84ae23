// src/auth/login.rs

//! Login configuration for Kerberos identities.
//!
//! A [`LoginConfigurator`] collects login options and freezes them into a
//! single required [`LoginEntry`]. The entry is handed to the
//! authentication service explicitly on every login. Installed entries
//! are also published in a [`LoginRegistry`] keyed by principal, so
//! several identities can coexist in one process.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use super::identity::Identity;

/// Credential material a login uses, in priority order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CredentialSource {
    /// Non-interactive login with the keys in a keytab.
    Keytab(PathBuf),
    /// Reuse tickets from an existing ticket cache.
    TicketCache(PathBuf),
    /// Whatever the authentication service finds by default, possibly by
    /// prompting unless prompting is disabled.
    Default,
}

/// How a login module's outcome counts toward the overall login.
///
/// Only `Required` is produced: the single module must succeed and there
/// is no fallback chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlFlag {
    Required,
}

/// A frozen, single-module login configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoginEntry {
    principal: String,
    keytab: Option<PathBuf>,
    ticket_cache: Option<PathBuf>,
    do_not_prompt: bool,
    debug: bool,
    refresh_krb5_config: bool,
    flag: ControlFlag,
}

impl LoginEntry {
    pub fn principal(&self) -> &str {
        &self.principal
    }

    pub fn control_flag(&self) -> ControlFlag {
        self.flag
    }

    pub fn do_not_prompt(&self) -> bool {
        self.do_not_prompt
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn refresh_krb5_config(&self) -> bool {
        self.refresh_krb5_config
    }

    /// The credential material to log in with: keytab, then ticket cache,
    /// then the service default.
    pub fn source(&self) -> CredentialSource {
        if let Some(ref keytab) = self.keytab {
            CredentialSource::Keytab(keytab.clone())
        } else if let Some(ref cache) = self.ticket_cache {
            CredentialSource::TicketCache(cache.clone())
        } else {
            CredentialSource::Default
        }
    }

    /// The option map of this entry, in the `key=value` vocabulary Kerberos
    /// login modules use.
    pub fn options(&self) -> BTreeMap<&'static str, String> {
        let mut options = BTreeMap::new();

        options.insert("principal", self.principal.clone());
        options.insert("useKeyTab", self.keytab.is_some().to_string());
        if let Some(ref keytab) = self.keytab {
            options.insert("keyTab", keytab.display().to_string());
        }
        options.insert("useTicketCache", self.ticket_cache.is_some().to_string());
        if let Some(ref cache) = self.ticket_cache {
            options.insert("ticketCache", cache.display().to_string());
        }
        options.insert("doNotPrompt", self.do_not_prompt.to_string());
        options.insert("debug", self.debug.to_string());
        options.insert("refreshKrb5Config", self.refresh_krb5_config.to_string());

        options
    }
}

/// Collects login options for one principal.
#[must_use]
#[derive(Clone, Debug)]
pub struct LoginConfigurator {
    principal: String,
    keytab: Option<PathBuf>,
    ticket_cache: Option<PathBuf>,
    do_not_prompt: bool,
    debug: bool,
    refresh_krb5_config: bool,
}

impl LoginConfigurator {
    pub fn new(principal: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            keytab: None,
            ticket_cache: None,
            do_not_prompt: false,
            debug: false,
            refresh_krb5_config: false,
        }
    }

    /// Derive the options for `identity`.
    ///
    /// Prompting is disabled whenever durable credential material is
    /// configured.
    pub fn from_identity(identity: &Identity) -> Self {
        let mut configurator = Self::new(identity.principal());
        if let Some(keytab) = identity.keytab() {
            configurator = configurator.use_keytab(keytab);
        }
        if let Some(cache) = identity.ticket_cache() {
            configurator = configurator.use_ticket_cache(cache);
        }
        let durable = identity.keytab().is_some() || identity.ticket_cache().is_some();
        configurator.do_not_prompt(durable)
    }

    pub fn use_keytab(mut self, path: impl AsRef<Path>) -> Self {
        self.keytab = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn use_ticket_cache(mut self, path: impl AsRef<Path>) -> Self {
        self.ticket_cache = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn do_not_prompt(mut self, enabled: bool) -> Self {
        self.do_not_prompt = enabled;
        self
    }

    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    /// Re-install the Kerberos configuration file before each login.
    pub fn refresh_krb5_config(mut self, enabled: bool) -> Self {
        self.refresh_krb5_config = enabled;
        self
    }

    /// Freeze the options without publishing them anywhere.
    pub fn freeze(self) -> LoginEntry {
        LoginEntry {
            principal: self.principal,
            keytab: self.keytab,
            ticket_cache: self.ticket_cache,
            do_not_prompt: self.do_not_prompt,
            debug: self.debug,
            refresh_krb5_config: self.refresh_krb5_config,
            flag: ControlFlag::Required,
        }
    }

    /// Freeze the options and install the entry in the process-wide
    /// registry, replacing any earlier entry for the same principal.
    pub fn initialize(self) -> Arc<LoginEntry> {
        self.initialize_in(LoginRegistry::global())
    }

    /// Like [`initialize`](Self::initialize), but into a caller-owned
    /// registry.
    pub fn initialize_in(self, registry: &LoginRegistry) -> Arc<LoginEntry> {
        let entry = Arc::new(self.freeze());
        registry.install(Arc::clone(&entry));
        entry
    }
}

/// Installed login entries, keyed by principal.
#[derive(Debug, Default)]
pub struct LoginRegistry {
    entries: RwLock<HashMap<String, Arc<LoginEntry>>>,
}

impl LoginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry shared by the whole process.
    pub fn global() -> &'static LoginRegistry {
        static GLOBAL: OnceLock<LoginRegistry> = OnceLock::new();
        GLOBAL.get_or_init(LoginRegistry::new)
    }

    /// Install `entry`, returning the entry it replaced.
    pub fn install(&self, entry: Arc<LoginEntry>) -> Option<Arc<LoginEntry>> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let previous = entries.insert(entry.principal.clone(), entry);
        if previous.is_some() {
            log::debug!("replaced login configuration for an existing principal");
        }
        previous
    }

    pub fn entry(&self, principal: &str) -> Option<Arc<LoginEntry>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(principal)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
