// src/error.rs

use std::error::Error as StdError;
use std::fmt;

/// A `Result` alias where the `Err` case is `negotiate_proxy::Error`.
pub type Result<T> = std::result::Result<T, Error>;

pub(crate) type BoxError = Box<dyn StdError + Send + Sync>;

/// The errors that may occur while authenticating to a proxy.
///
/// Use the `is_*` predicates to decide how to react: a login failure needs
/// reconfiguration, an invalid credential may recover after
/// [`CredentialManager::refresh`](crate::CredentialManager::refresh), and a
/// negotiation failure usually only affects the current attempt.
pub struct Error {
    inner: Box<Inner>,
}

struct Inner {
    kind: Kind,
    source: Option<BoxError>,
}

impl Error {
    pub(crate) fn new<E>(kind: Kind, source: Option<E>) -> Error
    where
        E: Into<BoxError>,
    {
        Error {
            inner: Box::new(Inner {
                kind,
                source: source.map(Into::into),
            }),
        }
    }

    /// Returns true if the initial credential could not be obtained.
    pub fn is_login(&self) -> bool {
        matches!(self.inner.kind, Kind::Login)
    }

    /// Returns true if the credential was defective, expired or absent
    /// at negotiation time.
    pub fn is_invalid_credential(&self) -> bool {
        matches!(self.inner.kind, Kind::InvalidCredential)
    }

    /// Returns true if the token exchange failed for another reason.
    pub fn is_negotiation(&self) -> bool {
        matches!(self.inner.kind, Kind::Negotiation)
    }

    /// Returns true if the scheme was driven out of order, either before a
    /// challenge arrived or after it already failed.
    pub fn is_sequence(&self) -> bool {
        matches!(self.inner.kind, Kind::Sequence)
    }

    /// Returns true if the error came from invalid configuration.
    pub fn is_config(&self) -> bool {
        matches!(self.inner.kind, Kind::Config)
    }

    /// Returns true if the error is related to a timeout.
    pub fn is_timeout(&self) -> bool {
        let mut source = self.source();

        while let Some(err) = source {
            if err.is::<TimedOut>() {
                return true;
            }
            source = err.source();
        }

        false
    }

    #[cfg(test)]
    pub(crate) fn kind(&self) -> &Kind {
        &self.inner.kind
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut builder = f.debug_struct("negotiate_proxy::Error");

        builder.field("kind", &self.inner.kind);

        if let Some(ref source) = self.inner.source {
            builder.field("source", source);
        }

        builder.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.inner.kind {
            Kind::Login => f.write_str("login failed")?,
            Kind::InvalidCredential => f.write_str("invalid credential")?,
            Kind::Negotiation => f.write_str("negotiation failed")?,
            Kind::Sequence => f.write_str("authentication sequence error")?,
            Kind::Config => f.write_str("configuration error")?,
        }

        if let Some(ref e) = self.inner.source {
            write!(f, ": {}", e)?;
        }

        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.source.as_ref().map(|e| &**e as _)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Kind {
    Login,
    InvalidCredential,
    Negotiation,
    Sequence,
    Config,
}

// constructors

pub(crate) fn login<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Login, Some(e))
}

pub(crate) fn invalid_credential<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::InvalidCredential, Some(e))
}

pub(crate) fn negotiation<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Negotiation, Some(e))
}

pub(crate) fn sequence<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Sequence, Some(e))
}

pub(crate) fn config<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Config, Some(e))
}

// markers

#[derive(Debug)]
pub(crate) struct TimedOut;

impl fmt::Display for TimedOut {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("operation timed out")
    }
}

impl StdError for TimedOut {}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn test_source_chain() {
        let root = Error::new(Kind::Negotiation, None::<Error>);
        assert!(root.source().is_none());

        let link = super::login(root);
        assert!(link.source().is_some());
        assert_send::<Error>();
        assert_sync::<Error>();
    }

    #[test]
    fn mem_size_of() {
        use std::mem::size_of;
        assert_eq!(size_of::<Error>(), size_of::<usize>());
    }

    #[test]
    fn is_timeout() {
        let err = super::negotiation(TimedOut);
        assert!(err.is_timeout());
        assert!(err.is_negotiation());

        let nested = super::invalid_credential(super::negotiation(TimedOut));
        assert!(nested.is_timeout());
    }

    #[test]
    fn display_includes_source() {
        let err = super::sequence("authentication not initiated");
        assert_eq!(
            err.to_string(),
            "authentication sequence error: authentication not initiated"
        );
        assert_eq!(err.kind(), &Kind::Sequence);
    }
}
