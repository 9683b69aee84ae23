// src/auth/negotiate.rs

//! HTTP "Negotiate" proxy authentication scheme.
//!
//! Implements the client side of the RFC 4559 exchange for one
//! authentication attempt: a proxy answers with a `Negotiate` challenge,
//! the scheme produces a `Negotiate <base64 token>` header value for the
//! retried request. Token generation is delegated to the shared
//! [`CredentialManager`].

use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use http::HeaderValue;

use super::context::{Mechanism, SecurityContext, ServiceName};
use super::credentials::CredentialManager;
use crate::error;
use crate::proxy::ProxyTarget;
use crate::Result;

/// Authentication scheme name, as it appears in challenge and
/// authorization headers.
pub const SCHEME_NAME: &str = "Negotiate";

/// Where a [`NegotiationScheme`] is in its exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NegotiationState {
    Uninitiated,
    ChallengeReceived,
    TokenGenerated,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum State {
    Uninitiated,
    ChallengeReceived { input: Vec<u8> },
    TokenGenerated { value: HeaderValue },
    Failed,
}

#[derive(Debug)]
enum Event {
    Challenge(Vec<u8>),
    Generated(HeaderValue),
    GenerationFailed,
}

/// Every (state, event) pair is listed; terminal states only leave
/// through an unexpected challenge, which fails the attempt.
fn transition(state: State, event: Event) -> State {
    match (state, event) {
        (State::Uninitiated, Event::Challenge(input)) => State::ChallengeReceived { input },
        (State::ChallengeReceived { .. }, Event::Challenge(_)) => State::Failed,
        (State::TokenGenerated { .. }, Event::Challenge(_)) => State::Failed,
        (State::Failed, Event::Challenge(_)) => State::Failed,

        (State::ChallengeReceived { .. }, Event::Generated(value)) => {
            State::TokenGenerated { value }
        }
        (State::ChallengeReceived { .. }, Event::GenerationFailed) => State::Failed,

        // Generation only starts from ChallengeReceived.
        (State::Uninitiated, Event::Generated(_) | Event::GenerationFailed) => State::Uninitiated,
        (state @ State::TokenGenerated { .. }, Event::Generated(_) | Event::GenerationFailed) => {
            state
        }
        (State::Failed, Event::Generated(_) | Event::GenerationFailed) => State::Failed,
    }
}

impl State {
    fn public(&self) -> NegotiationState {
        match self {
            State::Uninitiated => NegotiationState::Uninitiated,
            State::ChallengeReceived { .. } => NegotiationState::ChallengeReceived,
            State::TokenGenerated { .. } => NegotiationState::TokenGenerated,
            State::Failed => NegotiationState::Failed,
        }
    }
}

/// One proxy authentication attempt.
///
/// A scheme is bound to the connection whose challenge it consumed and is
/// not reused: once it generated a token or failed, a further challenge
/// fails it for good. Get a fresh one from [`SchemeFactory::create`] for
/// every attempt.
#[derive(Debug)]
pub struct NegotiationScheme {
    manager: Arc<CredentialManager>,
    service: ServiceName,
    mechanism: Mechanism,
    timeout: Option<Duration>,
    state: State,
}

impl NegotiationScheme {
    pub fn new(
        manager: Arc<CredentialManager>,
        service: ServiceName,
        mechanism: Mechanism,
    ) -> Self {
        Self {
            manager,
            service,
            mechanism,
            timeout: None,
            state: State::Uninitiated,
        }
    }

    pub fn scheme_name(&self) -> &'static str {
        SCHEME_NAME
    }

    pub fn service(&self) -> &ServiceName {
        &self.service
    }

    pub fn state(&self) -> NegotiationState {
        self.state.public()
    }

    /// True once a token was generated or the attempt failed.
    pub fn is_complete(&self) -> bool {
        matches!(self.state, State::TokenGenerated { .. } | State::Failed)
    }

    /// Feed a `Negotiate` challenge from the proxy.
    ///
    /// `raw` may be the full header value (`Negotiate <base64>`), just the
    /// token, or empty. Its presence is what counts: a token that does not
    /// decode is treated as an empty input token. A challenge that arrives
    /// when the scheme is not waiting for one fails the attempt; the error
    /// surfaces from the next [`produce_authorization_value`] call.
    ///
    /// [`produce_authorization_value`]: Self::produce_authorization_value
    pub fn on_challenge(&mut self, raw: &str) {
        if self.state != State::Uninitiated {
            log::debug!(
                "unexpected {} challenge from {} in state {:?}",
                SCHEME_NAME,
                self.service,
                self.state()
            );
        }
        self.advance(Event::Challenge(challenge_token(raw)));
    }

    /// The `Proxy-Authorization` value to send on the retried request.
    ///
    /// The first call after a challenge negotiates a token; later calls
    /// return that same value.
    ///
    /// # Errors
    ///
    /// - sequence error if no challenge was received yet (the state is left
    ///   unchanged) or the attempt has failed
    /// - login error if the identity cannot log in
    /// - invalid credential or negotiation failure from the token exchange;
    ///   these and login errors leave the scheme failed
    pub fn produce_authorization_value(&mut self) -> Result<HeaderValue> {
        let input = match self.state {
            State::Uninitiated => {
                return Err(error::sequence("authentication not initiated"));
            }
            State::Failed => {
                return Err(error::sequence("authentication has failed"));
            }
            State::TokenGenerated { ref value } => return Ok(value.clone()),
            State::ChallengeReceived { ref input } => input.clone(),
        };

        let context = SecurityContext::new(self.service.clone(), self.mechanism);
        let token = match self.timeout {
            Some(timeout) => self.manager.negotiate_timeout(context, &input, timeout),
            None => self.manager.negotiate(context, &input),
        };

        match token.and_then(|token| authorization_value(&token)) {
            Ok(value) => {
                self.advance(Event::Generated(value.clone()));
                Ok(value)
            }
            Err(err) => {
                self.advance(Event::GenerationFailed);
                Err(err)
            }
        }
    }

    fn advance(&mut self, event: Event) {
        let from = self.state();
        let state = std::mem::replace(&mut self.state, State::Failed);
        self.state = transition(state, event);
        log::trace!(
            "{} scheme for {}: {:?} -> {:?}",
            SCHEME_NAME,
            self.service,
            from,
            self.state()
        );
    }
}

/// Mints a fresh [`NegotiationScheme`] per authentication attempt.
///
/// Holds no per-attempt state, so one factory can be shared by every
/// connection that goes through the proxy.
#[derive(Clone, Debug)]
pub struct SchemeFactory {
    manager: Arc<CredentialManager>,
    mechanism: Mechanism,
    timeout: Option<Duration>,
}

impl SchemeFactory {
    pub fn new(manager: Arc<CredentialManager>) -> Self {
        Self {
            manager,
            mechanism: Mechanism::default(),
            timeout: None,
        }
    }

    /// Mechanism to negotiate, SPNEGO by default.
    pub fn mechanism(mut self, mechanism: Mechanism) -> Self {
        self.mechanism = mechanism;
        self
    }

    /// Bound each token exchange by `timeout`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn manager(&self) -> &Arc<CredentialManager> {
        &self.manager
    }

    /// A new scheme for authenticating to `proxy` as `HTTP@<host>`.
    pub fn create(&self, proxy: &ProxyTarget) -> NegotiationScheme {
        self.create_for(proxy.service_name())
    }

    /// A new scheme for an explicit target service.
    pub fn create_for(&self, service: ServiceName) -> NegotiationScheme {
        let mut scheme = NegotiationScheme::new(Arc::clone(&self.manager), service, self.mechanism);
        scheme.timeout = self.timeout;
        scheme
    }
}

/// Extract the input token from a challenge.
fn challenge_token(raw: &str) -> Vec<u8> {
    let mut token = raw.trim();

    if let Some(prefix) = token.get(..SCHEME_NAME.len()) {
        let rest = &token[SCHEME_NAME.len()..];
        if prefix.eq_ignore_ascii_case(SCHEME_NAME)
            && (rest.is_empty() || rest.starts_with(char::is_whitespace))
        {
            token = rest.trim();
        }
    }

    if token.is_empty() {
        return Vec::new();
    }

    match base64::engine::general_purpose::STANDARD.decode(token) {
        Ok(decoded) => decoded,
        Err(err) => {
            log::debug!("ignoring undecodable {} challenge token: {}", SCHEME_NAME, err);
            Vec::new()
        }
    }
}

fn authorization_value(token: &[u8]) -> Result<HeaderValue> {
    let encoded = base64::engine::general_purpose::STANDARD.encode(token);
    HeaderValue::from_str(&format!("{} {}", SCHEME_NAME, encoded))
        .map_err(|_| error::negotiation("Invalid authorization header"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::backend::{KerberosBackend, KrbError, KrbErrorKind};
    use crate::auth::identity::Identity;
    use crate::auth::login::LoginEntry;
    use crate::auth::subject::Ticket;
    use std::time::SystemTime;

    struct EchoKdc {
        token_error: Option<KrbErrorKind>,
    }

    impl KerberosBackend for EchoKdc {
        fn authenticate(&self, entry: &LoginEntry) -> std::result::Result<Ticket, KrbError> {
            Ok(Ticket::new(
                entry.principal(),
                "krbtgt/CORP@CORP",
                SystemTime::now() + Duration::from_secs(3600),
                Vec::new(),
            ))
        }

        fn request_service_ticket(
            &self,
            initial: &Ticket,
            service: &ServiceName,
        ) -> std::result::Result<Ticket, KrbError> {
            Ok(Ticket::new(
                initial.client(),
                service.to_string(),
                SystemTime::now() + Duration::from_secs(600),
                service.to_string().into_bytes(),
            ))
        }

        fn build_token(
            &self,
            _mechanism: Mechanism,
            service_ticket: &Ticket,
            input: &[u8],
        ) -> std::result::Result<Vec<u8>, KrbError> {
            if let Some(kind) = self.token_error {
                return Err(KrbError::new(kind, "scripted"));
            }
            let mut token = service_ticket.data().to_vec();
            token.extend_from_slice(input);
            Ok(token)
        }
    }

    fn scheme(token_error: Option<KrbErrorKind>) -> NegotiationScheme {
        let identity = Identity::builder("alice").build().unwrap();
        let manager = CredentialManager::new(identity, Arc::new(EchoKdc { token_error }));
        SchemeFactory::new(Arc::new(manager)).create(&ProxyTarget::new("proxy.example.com", 3128))
    }

    fn value(s: &'static str) -> HeaderValue {
        HeaderValue::from_static(s)
    }

    #[test]
    fn test_transition_table() {
        let received = || State::ChallengeReceived { input: Vec::new() };
        let generated = || State::TokenGenerated { value: value("Negotiate AA==") };

        assert_eq!(
            transition(State::Uninitiated, Event::Challenge(vec![1])),
            State::ChallengeReceived { input: vec![1] }
        );
        assert_eq!(transition(received(), Event::Challenge(Vec::new())), State::Failed);
        assert_eq!(transition(generated(), Event::Challenge(Vec::new())), State::Failed);
        assert_eq!(transition(State::Failed, Event::Challenge(Vec::new())), State::Failed);

        assert_eq!(transition(received(), Event::Generated(value("Negotiate AA=="))), generated());
        assert_eq!(transition(received(), Event::GenerationFailed), State::Failed);

        assert_eq!(transition(State::Uninitiated, Event::GenerationFailed), State::Uninitiated);
        assert_eq!(transition(generated(), Event::GenerationFailed), generated());
        assert_eq!(
            transition(generated(), Event::Generated(value("Negotiate AQ=="))),
            generated()
        );
        assert_eq!(
            transition(State::Failed, Event::Generated(value("Negotiate AA=="))),
            State::Failed
        );
    }

    #[test]
    fn test_challenge_token_parsing() {
        assert_eq!(challenge_token(""), Vec::<u8>::new());
        assert_eq!(challenge_token("Negotiate"), Vec::<u8>::new());
        assert_eq!(challenge_token("negotiate  AQID "), vec![1, 2, 3]);
        assert_eq!(challenge_token("AQID"), vec![1, 2, 3]);
        assert_eq!(challenge_token("Negotiate not*base64"), Vec::<u8>::new());
        assert_eq!(challenge_token("NegotiateAQID"), Vec::<u8>::new());
    }

    #[test]
    fn test_is_complete_per_state() {
        let mut scheme = scheme(None);
        assert!(!scheme.is_complete());

        scheme.on_challenge("Negotiate");
        assert_eq!(scheme.state(), NegotiationState::ChallengeReceived);
        assert!(!scheme.is_complete());

        scheme.produce_authorization_value().unwrap();
        assert_eq!(scheme.state(), NegotiationState::TokenGenerated);
        assert!(scheme.is_complete());

        scheme.on_challenge("Negotiate");
        assert_eq!(scheme.state(), NegotiationState::Failed);
        assert!(scheme.is_complete());
    }

    #[test]
    fn test_produce_before_challenge() {
        let mut scheme = scheme(None);

        let err = scheme.produce_authorization_value().unwrap_err();
        assert!(err.is_sequence());
        assert!(err.to_string().contains("not initiated"));
        assert_eq!(scheme.state(), NegotiationState::Uninitiated);
    }

    #[test]
    fn test_produce_after_failure() {
        let mut scheme = scheme(None);
        scheme.on_challenge("");
        scheme.on_challenge("");

        let err = scheme.produce_authorization_value().unwrap_err();
        assert!(err.is_sequence());
        assert!(err.to_string().contains("authentication has failed"));
    }

    #[test]
    fn test_value_is_stable() {
        let mut scheme = scheme(None);
        scheme.on_challenge("Negotiate AQID");

        let first = scheme.produce_authorization_value().unwrap();
        let second = scheme.produce_authorization_value().unwrap();
        assert_eq!(first, second);

        let text = first.to_str().unwrap();
        let token = text.strip_prefix("Negotiate ").unwrap();
        let decoded = base64::engine::general_purpose::STANDARD.decode(token).unwrap();
        assert!(decoded.starts_with(b"HTTP@proxy.example.com"));
        assert!(decoded.ends_with(&[1, 2, 3]));
    }

    #[test]
    fn test_credential_error_fails_scheme() {
        let mut scheme = scheme(Some(KrbErrorKind::CredentialsExpired));
        scheme.on_challenge("Negotiate");

        let err = scheme.produce_authorization_value().unwrap_err();
        assert!(err.is_invalid_credential());
        assert_eq!(scheme.state(), NegotiationState::Failed);
    }

    #[test]
    fn test_protocol_error_fails_scheme() {
        let mut scheme = scheme(Some(KrbErrorKind::BadMechanism));
        scheme.on_challenge("Negotiate");

        let err = scheme.produce_authorization_value().unwrap_err();
        assert!(err.is_negotiation());
        assert_eq!(scheme.state(), NegotiationState::Failed);
    }

    #[test]
    fn test_factory_mints_fresh_schemes() {
        let identity = Identity::builder("alice").build().unwrap();
        let backend = Arc::new(EchoKdc { token_error: None });
        let manager = Arc::new(CredentialManager::new(identity, backend));
        let factory = SchemeFactory::new(manager).mechanism(Mechanism::Kerberos);
        let proxy = ProxyTarget::new("proxy.example.com", 3128);

        let mut first = factory.create(&proxy);
        first.on_challenge("Negotiate");
        first.produce_authorization_value().unwrap();

        let second = factory.create(&proxy);
        assert_eq!(second.state(), NegotiationState::Uninitiated);
        assert_eq!(second.service().to_string(), "HTTP@proxy.example.com");
        assert_eq!(second.scheme_name(), "Negotiate");
        assert_eq!(factory.manager().login_count(), 1);
    }
}
