use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::IdentityConfig;
use crate::error::IdentityError;

/// An externally authenticated identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub uid: String,
    pub email: String,
    pub display_name: Option<String>,
}

/// The external identity provider. Must publish on `watch` for every
/// session transition: sign-in, sign-out and token refresh.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn current_session(&self) -> Result<Option<Session>, IdentityError>;

    fn watch(&self) -> watch::Receiver<Option<Session>>;

    async fn sign_in(&self) -> Result<Session, IdentityError>;

    async fn sign_out(&self) -> Result<(), IdentityError>;
}

/// Provider for a single, pre-configured profile. Sign-in succeeds only when
/// the origin the client runs on is one of the authorized domains.
pub struct StaticIdentityProvider {
    profile: Session,
    origin: String,
    authorized_domains: Vec<String>,
    tx: watch::Sender<Option<Session>>,
}

impl StaticIdentityProvider {
    pub fn new(profile: Session) -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            profile,
            origin: "localhost".into(),
            authorized_domains: vec!["localhost".into()],
            tx,
        }
    }

    pub fn from_config(cfg: &IdentityConfig) -> Self {
        Self::new(Session {
            uid: cfg.uid.clone(),
            email: cfg.email.clone(),
            display_name: cfg.display_name.clone(),
        })
        .with_origin(cfg.origin.clone(), cfg.authorized_domains.clone())
    }

    pub fn with_origin(mut self, origin: impl Into<String>, authorized_domains: Vec<String>) -> Self {
        self.origin = origin.into();
        self.authorized_domains = authorized_domains;
        self
    }

    /// Start out signed in, as after a page reload with a persisted session.
    pub fn signed_in(self) -> Self {
        self.tx.send_replace(Some(self.profile.clone()));
        self
    }

    /// Re-announce the current session, as a token refresh does.
    pub fn refresh(&self) {
        self.tx.send_modify(|_| {});
    }

    fn origin_authorized(&self) -> bool {
        self.authorized_domains
            .iter()
            .any(|d| d.eq_ignore_ascii_case(&self.origin))
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn current_session(&self) -> Result<Option<Session>, IdentityError> {
        Ok(self.tx.borrow().clone())
    }

    fn watch(&self) -> watch::Receiver<Option<Session>> {
        self.tx.subscribe()
    }

    async fn sign_in(&self) -> Result<Session, IdentityError> {
        if !self.origin_authorized() {
            warn!("Sign-in attempted from unauthorized origin {}", self.origin);
            return Err(IdentityError::UnauthorizedDomain(self.origin.clone()));
        }
        info!("{} signed in", self.profile.email);
        self.tx.send_replace(Some(self.profile.clone()));
        Ok(self.profile.clone())
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        self.tx.send_replace(None);
        Ok(())
    }
}
