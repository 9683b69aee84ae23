// src/auth/krb5_conf.rs

//! Process-wide Kerberos configuration file location.
//!
//! Kerberos libraries read their configuration path from the process
//! environment, so there is exactly one active path per process. The most
//! recent [`install`] wins, for every Kerberos consumer in the process.

use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

/// Environment variable consulted by Kerberos libraries.
pub const KRB5_CONFIG_ENV: &str = "KRB5_CONFIG";

static ACTIVE: Slot = Slot::new(export);

/// Install `path` as the process-wide Kerberos configuration file.
///
/// Returns the previously installed path, if any. Replacing a different
/// path is logged, since it silently changes the realm configuration of
/// every other identity in the process.
pub fn install(path: &Path) -> Option<PathBuf> {
    ACTIVE.install(path)
}

/// The currently installed Kerberos configuration file.
pub fn active() -> Option<PathBuf> {
    ACTIVE.active()
}

fn export(path: &Path) {
    std::env::set_var(KRB5_CONFIG_ENV, path);
}

struct Slot {
    path: RwLock<Option<PathBuf>>,
    export: fn(&Path),
}

impl Slot {
    const fn new(export: fn(&Path)) -> Self {
        Self {
            path: RwLock::new(None),
            export,
        }
    }

    fn install(&self, path: &Path) -> Option<PathBuf> {
        let mut active = self.path.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(previous) = active.as_deref() {
            if previous != path {
                log::warn!(
                    "replacing Kerberos configuration {} with {}",
                    previous.display(),
                    path.display()
                );
            }
        }

        (self.export)(path);
        active.replace(path.to_path_buf())
    }

    fn active(&self) -> Option<PathBuf> {
        self.path
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
