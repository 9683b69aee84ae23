// tests/support/mod.rs

#![allow(dead_code)]

pub mod kdc;

use std::sync::Arc;

use negotiate_proxy::{CredentialManager, Identity, KerberosBackend};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// The keytab identity most tests log in as.
pub fn alice() -> Identity {
    Identity::builder("alice")
        .keytab("/k.keytab")
        .krb5_conf("/etc/krb5.conf")
        .build()
        .unwrap()
}

pub fn manager(kdc: &Arc<kdc::MockKdc>) -> Arc<CredentialManager> {
    init_logging();
    let backend: Arc<dyn KerberosBackend> = kdc.clone();
    Arc::new(CredentialManager::new(alice(), backend))
}
