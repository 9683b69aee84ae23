// src/auth/identity.rs

use std::path::{Path, PathBuf};

use crate::{error, Result};

const DEFAULT_KRB5_CONF: &str = "/etc/krb5.conf";

/// The identity a [`CredentialManager`](crate::CredentialManager) logs in as.
///
/// Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    principal: String,
    keytab: Option<PathBuf>,
    ticket_cache: Option<PathBuf>,
    krb5_conf: PathBuf,
}

impl Identity {
    /// Start building an identity for `principal`.
    pub fn builder(principal: impl Into<String>) -> IdentityBuilder {
        IdentityBuilder {
            principal: principal.into(),
            keytab: None,
            ticket_cache: None,
            krb5_conf: PathBuf::from(DEFAULT_KRB5_CONF),
        }
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }

    pub fn keytab(&self) -> Option<&Path> {
        self.keytab.as_deref()
    }

    pub fn ticket_cache(&self) -> Option<&Path> {
        self.ticket_cache.as_deref()
    }

    pub fn krb5_conf(&self) -> &Path {
        &self.krb5_conf
    }
}

/// Builder for [`Identity`].
#[must_use]
#[derive(Debug)]
pub struct IdentityBuilder {
    principal: String,
    keytab: Option<PathBuf>,
    ticket_cache: Option<PathBuf>,
    krb5_conf: PathBuf,
}

impl IdentityBuilder {
    /// Log in non-interactively with the keys in this keytab.
    pub fn keytab(mut self, path: impl Into<PathBuf>) -> Self {
        self.keytab = Some(path.into());
        self
    }

    /// Log in from a previously populated ticket cache.
    pub fn ticket_cache(mut self, path: impl Into<PathBuf>) -> Self {
        self.ticket_cache = Some(path.into());
        self
    }

    /// Kerberos configuration file, `/etc/krb5.conf` by default.
    pub fn krb5_conf(mut self, path: impl Into<PathBuf>) -> Self {
        self.krb5_conf = path.into();
        self
    }

    /// Build the identity.
    ///
    /// # Errors
    ///
    /// Fails if the principal is empty or contains whitespace.
    pub fn build(self) -> Result<Identity> {
        let principal = self.principal.trim();
        if principal.is_empty() {
            return Err(error::config("principal must not be empty"));
        }
        if principal.chars().any(char::is_whitespace) {
            return Err(error::config(format!(
                "principal '{}' must not contain whitespace",
                principal
            )));
        }

        Ok(Identity {
            principal: principal.to_string(),
            keytab: self.keytab,
            ticket_cache: self.ticket_cache,
            krb5_conf: self.krb5_conf,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let identity = Identity::builder("alice").build().unwrap();
        assert_eq!(identity.principal(), "alice");
        assert!(identity.keytab().is_none());
        assert!(identity.ticket_cache().is_none());
        assert_eq!(identity.krb5_conf(), Path::new("/etc/krb5.conf"));
    }

    #[test]
    fn test_builder_paths() {
        let identity = Identity::builder("alice@CORP.COM")
            .keytab("/k.keytab")
            .ticket_cache("/tmp/krb5cc_1000")
            .krb5_conf("/opt/krb5.conf")
            .build()
            .unwrap();

        assert_eq!(identity.keytab(), Some(Path::new("/k.keytab")));
        assert_eq!(identity.ticket_cache(), Some(Path::new("/tmp/krb5cc_1000")));
        assert_eq!(identity.krb5_conf(), Path::new("/opt/krb5.conf"));
    }

    #[test]
    fn test_builder_rejects_bad_principal() {
        assert!(Identity::builder("").build().unwrap_err().is_config());
        assert!(Identity::builder("  ").build().unwrap_err().is_config());
        assert!(Identity::builder("al ice").build().unwrap_err().is_config());
    }
}
