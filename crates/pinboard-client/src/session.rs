//! Maps the externally authenticated identity onto a local account.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use pinboard_types::api::NewAccount;
use pinboard_types::models::{Account, Role};

use crate::error::{IdentityError, RemoteResult};
use crate::identity::Session;
use crate::notice::NoticeKind;
use crate::remote::RemoteStore;
use crate::store::Store;

/// Display name given to accounts whose provider profile has none.
const DEFAULT_DISPLAY_NAME: &str = "New user";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Unauthenticated,
    Authenticating,
    /// Signed in externally; the local account is being looked up or created.
    AuthenticatedUnprovisioned { email: String },
    Authenticated(Account),
}

impl SessionState {
    pub fn account(&self) -> Option<&Account> {
        match self {
            Self::Authenticated(account) => Some(account),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}

/// Decides which authenticated emails may use the application.
#[async_trait]
pub trait AccessPolicy: Send + Sync {
    async fn admits(&self, email: &str, remote: &dyn RemoteStore) -> RemoteResult<bool>;
}

/// Everyone with a valid identity gets in.
pub struct OpenAccess;

#[async_trait]
impl AccessPolicy for OpenAccess {
    async fn admits(&self, _email: &str, _remote: &dyn RemoteStore) -> RemoteResult<bool> {
        Ok(true)
    }
}

/// Only emails on the invite list, plus the administrator.
pub struct InviteOnly {
    admin_email: Option<String>,
}

impl InviteOnly {
    pub fn new(admin_email: Option<String>) -> Self {
        Self { admin_email }
    }
}

#[async_trait]
impl AccessPolicy for InviteOnly {
    async fn admits(&self, email: &str, remote: &dyn RemoteStore) -> RemoteResult<bool> {
        if self
            .admin_email
            .as_deref()
            .is_some_and(|admin| admin.eq_ignore_ascii_case(email))
        {
            return Ok(true);
        }
        Ok(remote.find_invite(email).await?.is_some())
    }
}

impl Store {
    /// Sign in through the identity provider and resolve the local account.
    pub async fn login_with_google(&self) -> Result<SessionState, IdentityError> {
        let Some(provider) = self.inner.identity.clone() else {
            self.report_unconfigured();
            self.set_session(SessionState::Unauthenticated).await;
            return Err(IdentityError::Unconfigured);
        };

        self.set_session(SessionState::Authenticating).await;
        let session = match provider.sign_in().await {
            Ok(session) => session,
            Err(e) => {
                warn!("Sign-in failed: {}", e);
                self.notify(match &e {
                    IdentityError::Unconfigured => NoticeKind::IdentityUnconfigured,
                    IdentityError::UnauthorizedDomain(domain) => NoticeKind::UnauthorizedDomain {
                        domain: domain.clone(),
                    },
                    IdentityError::Provider(_) => NoticeKind::LoginFailed,
                });
                self.set_session(SessionState::Unauthenticated).await;
                return Err(e);
            }
        };

        let state = self.resolve_session(Some(session)).await;
        if state.is_authenticated() {
            self.notify(NoticeKind::LoginSucceeded);
        }
        Ok(state)
    }

    pub async fn logout(&self) {
        let _guard = self.inner.resolve_lock.lock().await;
        if let Some(provider) = &self.inner.identity {
            if let Err(e) = provider.sign_out().await {
                warn!("Identity provider sign-out failed: {}", e);
            }
        }
        self.set_session(SessionState::Unauthenticated).await;
        self.notify(NoticeKind::LoggedOut);
    }

    /// Resolve whatever session the provider holds right now. Reading it
    /// under the resolve lock means a notification that arrives late can't
    /// resurrect a session that has since ended.
    pub(crate) async fn resolve_current_session(&self) -> SessionState {
        let Some(provider) = self.inner.identity.clone() else {
            self.report_unconfigured();
            self.set_session(SessionState::Unauthenticated).await;
            return SessionState::Unauthenticated;
        };

        let _guard = self.inner.resolve_lock.lock().await;
        match provider.current_session().await {
            Ok(session) => self.resolve_locked(session).await,
            Err(e) => {
                warn!("Identity provider unavailable: {}", e);
                self.report_unconfigured();
                self.set_session(SessionState::Unauthenticated).await;
                SessionState::Unauthenticated
            }
        }
    }

    /// Bring the session state in line with an external session: no session
    /// signs out locally, otherwise the matching account is found or
    /// provisioned.
    pub async fn resolve_session(&self, session: Option<Session>) -> SessionState {
        let _guard = self.inner.resolve_lock.lock().await;
        self.resolve_locked(session).await
    }

    async fn resolve_locked(&self, session: Option<Session>) -> SessionState {
        let Some(session) = session else {
            self.set_session(SessionState::Unauthenticated).await;
            return SessionState::Unauthenticated;
        };

        let email = session.email.trim().to_string();
        // Re-resolving a known session keeps the account visible meanwhile
        let known = self
            .inner
            .session
            .read()
            .await
            .account()
            .is_some_and(|a| a.email.eq_ignore_ascii_case(&email));
        if !known {
            self.set_session(SessionState::AuthenticatedUnprovisioned { email: email.clone() })
                .await;
        }

        let state = match self.provision(&session, &email).await {
            Ok(Some(account)) => {
                debug!("Session resolved to account {}", account.id);
                self.inner.mirror.write().await.upsert_account(account.clone());
                SessionState::Authenticated(account)
            }
            Ok(None) => {
                info!("Access denied for {}", email);
                if let Some(provider) = &self.inner.identity {
                    if let Err(e) = provider.sign_out().await {
                        warn!("Could not sign out refused identity: {}", e);
                    }
                }
                self.notify(NoticeKind::AccessDenied { email });
                SessionState::Unauthenticated
            }
            Err(e) => {
                warn!("Failed to resolve account for {}: {}", email, e);
                self.notify(NoticeKind::SessionFailed);
                SessionState::Unauthenticated
            }
        };

        self.set_session(state.clone()).await;
        state
    }

    /// Find the account for `email`, creating it on first sign-in. `None`
    /// when the access policy refuses the email.
    async fn provision(&self, session: &Session, email: &str) -> RemoteResult<Option<Account>> {
        let remote = self.inner.remote.as_ref();
        if !self.inner.access.admits(email, remote).await? {
            return Ok(None);
        }

        let is_admin_email = self.inner.config.is_admin_email(email);

        if let Some(mut account) = remote.find_account_by_email(email).await? {
            if is_admin_email && account.role != Role::Admin {
                remote.set_account_role(account.id, Role::Admin).await?;
                account.role = Role::Admin;
                info!("Promoted {} to admin", email);
            }
            return Ok(Some(account));
        }

        let new_account = NewAccount {
            uid: session.uid.clone(),
            name: session
                .display_name
                .clone()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string()),
            email: email.to_string(),
            avatar: String::new(),
            hint: String::new(),
            role: if is_admin_email { Role::Admin } else { Role::User },
        };

        let account = match remote.insert_account(new_account).await {
            Ok(account) => account,
            // Provisioned concurrently by another client
            Err(e) if e.is_conflict() => match remote.find_account_by_email(email).await? {
                Some(account) => account,
                None => return Err(e),
            },
            Err(e) => return Err(e),
        };
        info!("Provisioned account {} for {}", account.id, email);
        Ok(Some(account))
    }
}
