/// Integration tests for session resolution: provisioning, administrator
/// promotion, access policies and provider failures.

mod common;

use std::sync::Arc;

use pinboard_client::{
    AccessMode, IdentityError, IdentityProvider, NoticeKind, RemoteStore, Session, SessionState,
    StaticIdentityProvider, Store, StoreConfig,
};
use pinboard_types::api::NewAccount;
use pinboard_types::models::Role;

use common::{FlakyRemote, eventually, quiet_config};

const ADMIN: &str = "admin@example.com";

fn admin_config() -> StoreConfig {
    StoreConfig {
        admin_email: Some(ADMIN.into()),
        ..quiet_config()
    }
}

fn profile(email: &str, name: Option<&str>) -> Session {
    Session {
        uid: format!("uid-{}", email),
        email: email.into(),
        display_name: name.map(Into::into),
    }
}

fn store_with(remote: &Arc<FlakyRemote>, provider: Arc<StaticIdentityProvider>, config: StoreConfig) -> Store {
    Store::builder(remote.clone()).identity(provider).config(config).build()
}

#[tokio::test]
async fn admin_email_is_provisioned_as_admin() {
    let remote = FlakyRemote::new();
    let store = Store::builder(remote.clone()).config(admin_config()).build();

    let state = store.resolve_session(Some(profile(ADMIN, Some("Admin")))).await;

    let SessionState::Authenticated(account) = state else {
        panic!("expected an authenticated session, got {:?}", state);
    };
    assert_eq!(account.role, Role::Admin);
    assert_eq!(account.points, 0);
    assert_eq!(account.email, ADMIN);
    assert!(store.is_admin().await);
    assert_eq!(remote.inner.list_accounts().await.unwrap().len(), 1);
}

#[tokio::test]
async fn existing_admin_email_is_promoted_without_duplicate() {
    let remote = FlakyRemote::new();
    let existing = remote
        .inner
        .insert_account(NewAccount {
            uid: "uid-admin".into(),
            name: "Admin".into(),
            email: ADMIN.into(),
            avatar: String::new(),
            hint: String::new(),
            role: Role::User,
        })
        .await
        .unwrap();
    let store = Store::builder(remote.clone()).config(admin_config()).build();
    store.load_all().await;

    let state = store.resolve_session(Some(profile("Admin@Example.com", None))).await;

    let account = state.account().unwrap();
    assert_eq!(account.id, existing.id);
    assert_eq!(account.role, Role::Admin);

    let remote_accounts = remote.inner.list_accounts().await.unwrap();
    assert_eq!(remote_accounts.len(), 1);
    assert_eq!(remote_accounts[0].role, Role::Admin);
    assert_eq!(store.accounts().await[0].role, Role::Admin);

    // Resolving again changes nothing
    store.resolve_session(Some(profile(ADMIN, None))).await;
    assert_eq!(remote.inner.list_accounts().await.unwrap().len(), 1);
}

#[tokio::test]
async fn new_users_get_a_plain_account() {
    let remote = FlakyRemote::new();
    let store = Store::builder(remote.clone()).config(admin_config()).build();

    let named = store.resolve_session(Some(profile("ana@example.com", Some("Ana")))).await;
    let named = named.account().unwrap();
    assert_eq!(named.role, Role::User);
    assert_eq!(named.name, "Ana");
    assert_eq!(named.avatar, "");
    assert_eq!(named.hint, "");

    let anonymous = store.resolve_session(Some(profile("bruno@example.com", None))).await;
    assert_eq!(anonymous.account().unwrap().name, "New user");
    assert_eq!(store.accounts().await.len(), 2);
}

#[tokio::test]
async fn missing_provider_is_reported_once() {
    let remote = FlakyRemote::new();
    let store = Store::builder(remote.clone()).config(quiet_config()).build();
    let mut notices = store.notices();

    store.start().await;
    assert_eq!(store.session_state().await, SessionState::Unauthenticated);
    assert_eq!(store.login_with_google().await.unwrap_err(), IdentityError::Unconfigured);

    assert_eq!(notices.try_recv().unwrap().kind, NoticeKind::IdentityUnconfigured);
    assert!(notices.try_recv().is_err());
    store.shutdown();
}

#[tokio::test]
async fn unauthorized_domain_is_surfaced() {
    let remote = FlakyRemote::new();
    let provider = Arc::new(
        StaticIdentityProvider::new(profile("ana@example.com", Some("Ana")))
            .with_origin("preview.example.net", vec!["localhost".into()]),
    );
    let store = store_with(&remote, provider, quiet_config());
    let mut notices = store.notices();

    let err = store.login_with_google().await.unwrap_err();

    assert_eq!(err, IdentityError::UnauthorizedDomain("preview.example.net".into()));
    assert_eq!(store.session_state().await, SessionState::Unauthenticated);
    assert_eq!(
        notices.try_recv().unwrap().kind,
        NoticeKind::UnauthorizedDomain {
            domain: "preview.example.net".into()
        }
    );
    assert!(remote.inner.list_accounts().await.unwrap().is_empty());
}

#[tokio::test]
async fn invite_only_refuses_strangers() {
    let remote = FlakyRemote::new();
    let provider = Arc::new(StaticIdentityProvider::new(profile("ana@example.com", Some("Ana"))));
    let config = StoreConfig {
        access: AccessMode::InviteOnly,
        ..admin_config()
    };
    let store = store_with(&remote, provider.clone(), config);
    let mut notices = store.notices();

    let state = store.login_with_google().await.unwrap();
    assert_eq!(state, SessionState::Unauthenticated);
    assert_eq!(
        notices.try_recv().unwrap().kind,
        NoticeKind::AccessDenied {
            email: "ana@example.com".into()
        }
    );
    assert_eq!(provider.current_session().await.unwrap(), None);
    assert!(remote.inner.list_accounts().await.unwrap().is_empty());

    assert!(store.add_invite("ana@example.com").await.is_confirmed());
    let state = store.login_with_google().await.unwrap();
    assert!(state.is_authenticated());
    assert_eq!(store.invites().await.unwrap().len(), 1);

    // Revoking the invite keeps the account but bars the next sign-in
    store.logout().await;
    assert!(store.remove_invite("ana@example.com").await.is_confirmed());
    assert!(store.remove_invite("ana@example.com").await.is_confirmed());
    assert!(store.invites().await.unwrap().is_empty());
    assert_eq!(store.login_with_google().await.unwrap(), SessionState::Unauthenticated);
    assert_eq!(remote.inner.list_accounts().await.unwrap().len(), 1);
}

#[tokio::test]
async fn login_and_logout_round_trip() {
    let remote = FlakyRemote::new();
    let provider = Arc::new(StaticIdentityProvider::new(profile("ana@example.com", Some("Ana"))));
    let store = store_with(&remote, provider.clone(), quiet_config());
    store.start().await;
    assert_eq!(store.session_state().await, SessionState::Unauthenticated);

    let state = store.login_with_google().await.unwrap();
    assert_eq!(state.account().unwrap().email, "ana@example.com");
    assert_eq!(store.current_account().await.unwrap().name, "Ana");

    let mut notices = store.notices();
    store.logout().await;
    assert_eq!(store.session_state().await, SessionState::Unauthenticated);
    assert!(store.current_account().await.is_none());
    assert_eq!(notices.try_recv().unwrap().kind, NoticeKind::LoggedOut);
    assert_eq!(provider.current_session().await.unwrap(), None);

    // One account regardless of how often the session was resolved
    eventually("watcher to settle", || {
        let store = store.clone();
        async move { store.session_state().await == SessionState::Unauthenticated }
    })
    .await;
    assert_eq!(remote.inner.list_accounts().await.unwrap().len(), 1);
    store.shutdown();
}

#[tokio::test]
async fn external_sign_in_is_followed() {
    let remote = FlakyRemote::new();
    let provider = Arc::new(StaticIdentityProvider::new(profile("ana@example.com", Some("Ana"))));
    let store = store_with(&remote, provider.clone(), quiet_config());
    store.start().await;

    // Sign-in completed outside the store, e.g. in another tab
    provider.sign_in().await.unwrap();

    eventually("session to resolve", || {
        let store = store.clone();
        async move { store.session_state().await.is_authenticated() }
    })
    .await;
    assert_eq!(store.current_account().await.unwrap().email, "ana@example.com");
    store.shutdown();
}

#[tokio::test]
async fn persisted_session_resolves_on_start() {
    let remote = FlakyRemote::new();
    let provider = Arc::new(StaticIdentityProvider::new(profile(ADMIN, Some("Admin"))).signed_in());
    let store = store_with(&remote, provider, admin_config());

    store.start().await;

    let account = store.current_account().await.unwrap();
    assert!(account.is_admin());
    assert!(store.accounts().await.iter().any(|a| a.id == account.id));
    store.shutdown();
}

#[tokio::test]
async fn remote_failure_settles_unauthenticated() {
    let remote = FlakyRemote::new();
    remote.fail("find_account_by_email");
    let store = Store::builder(remote.clone()).config(quiet_config()).build();
    let mut notices = store.notices();

    let state = store.resolve_session(Some(profile("ana@example.com", None))).await;

    assert_eq!(state, SessionState::Unauthenticated);
    assert_eq!(notices.try_recv().unwrap().kind, NoticeKind::SessionFailed);
}
