//! Shared fixtures: an in-process remote with switchable failures.

#![allow(dead_code)]

use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use uuid::Uuid;

use pinboard_client::remote::ChangeHandler;
use pinboard_client::{
    EmbeddedRemote, RemoteError, RemoteResult, RemoteStore, Store, StoreConfig, Subscription,
};
use pinboard_types::api::{AvatarSelection, NewAccount, NewAvatar, NewPin};
use pinboard_types::events::Table;
use pinboard_types::models::{Account, Avatar, Invite, Pin, Role};

/// Wraps an [`EmbeddedRemote`]; any operation can be made to fail, and pin
/// inserts can be held until the test releases them.
pub struct FlakyRemote {
    pub inner: EmbeddedRemote,
    failing: Mutex<HashSet<&'static str>>,
    hold_inserts: AtomicBool,
    insert_entered: Notify,
    insert_release: Notify,
    handlers: Mutex<Vec<ChangeHandler>>,
}

impl FlakyRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: EmbeddedRemote::in_memory().unwrap(),
            failing: Mutex::new(HashSet::new()),
            hold_inserts: AtomicBool::new(false),
            insert_entered: Notify::new(),
            insert_release: Notify::new(),
            handlers: Mutex::new(Vec::new()),
        })
    }

    pub fn fail(&self, op: &'static str) {
        self.failing.lock().unwrap().insert(op);
    }

    pub fn heal(&self, op: &'static str) {
        self.failing.lock().unwrap().remove(op);
    }

    /// Act as if the remote ended every change channel opened so far.
    pub fn close_channels(&self) {
        for handler in self.handlers.lock().unwrap().drain(..) {
            handler.closed();
        }
    }

    /// Park every `insert_pin` after it has been issued.
    pub fn hold_pin_inserts(&self) {
        self.hold_inserts.store(true, Ordering::SeqCst);
    }

    pub async fn pin_insert_issued(&self) {
        self.insert_entered.notified().await;
    }

    pub fn release_pin_insert(&self) {
        self.insert_release.notify_one();
    }

    fn check(&self, op: &'static str) -> RemoteResult<()> {
        if self.failing.lock().unwrap().contains(op) {
            Err(RemoteError::Transport(format!("injected failure in {}", op)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemoteStore for FlakyRemote {
    async fn list_accounts(&self) -> RemoteResult<Vec<Account>> {
        self.check("list_accounts")?;
        self.inner.list_accounts().await
    }

    async fn find_account_by_email(&self, email: &str) -> RemoteResult<Option<Account>> {
        self.check("find_account_by_email")?;
        self.inner.find_account_by_email(email).await
    }

    async fn insert_account(&self, account: NewAccount) -> RemoteResult<Account> {
        self.check("insert_account")?;
        self.inner.insert_account(account).await
    }

    async fn set_account_role(&self, id: Uuid, role: Role) -> RemoteResult<()> {
        self.check("set_account_role")?;
        self.inner.set_account_role(id, role).await
    }

    async fn set_account_avatar(&self, id: Uuid, selection: AvatarSelection) -> RemoteResult<()> {
        self.check("set_account_avatar")?;
        self.inner.set_account_avatar(id, selection).await
    }

    async fn delete_pins_for_account(&self, id: Uuid) -> RemoteResult<usize> {
        self.check("delete_pins_for_account")?;
        self.inner.delete_pins_for_account(id).await
    }

    async fn delete_account(&self, id: Uuid) -> RemoteResult<()> {
        self.check("delete_account")?;
        self.inner.delete_account(id).await
    }

    async fn list_pins(&self) -> RemoteResult<Vec<Pin>> {
        self.check("list_pins")?;
        self.inner.list_pins().await
    }

    async fn insert_pin(&self, pin: NewPin) -> RemoteResult<Pin> {
        if self.hold_inserts.load(Ordering::SeqCst) {
            self.insert_entered.notify_one();
            self.insert_release.notified().await;
        }
        self.check("insert_pin")?;
        self.inner.insert_pin(pin).await
    }

    async fn delete_pin(&self, id: Uuid) -> RemoteResult<()> {
        self.check("delete_pin")?;
        self.inner.delete_pin(id).await
    }

    async fn add_pin_reaction(&self, id: Uuid) -> RemoteResult<u32> {
        self.check("add_pin_reaction")?;
        self.inner.add_pin_reaction(id).await
    }

    async fn list_avatars(&self) -> RemoteResult<Vec<Avatar>> {
        self.check("list_avatars")?;
        self.inner.list_avatars().await
    }

    async fn insert_avatar(&self, avatar: NewAvatar) -> RemoteResult<Avatar> {
        self.check("insert_avatar")?;
        self.inner.insert_avatar(avatar).await
    }

    async fn update_avatar(&self, avatar: Avatar) -> RemoteResult<Avatar> {
        self.check("update_avatar")?;
        self.inner.update_avatar(avatar).await
    }

    async fn delete_avatar(&self, id: Uuid) -> RemoteResult<()> {
        self.check("delete_avatar")?;
        self.inner.delete_avatar(id).await
    }

    async fn list_invites(&self) -> RemoteResult<Vec<Invite>> {
        self.check("list_invites")?;
        self.inner.list_invites().await
    }

    async fn find_invite(&self, email: &str) -> RemoteResult<Option<Invite>> {
        self.check("find_invite")?;
        self.inner.find_invite(email).await
    }

    async fn insert_invite(&self, email: &str) -> RemoteResult<Invite> {
        self.check("insert_invite")?;
        self.inner.insert_invite(email).await
    }

    async fn delete_invite(&self, email: &str) -> RemoteResult<()> {
        self.check("delete_invite")?;
        self.inner.delete_invite(email).await
    }

    async fn subscribe(&self, table: Table, handler: ChangeHandler) -> RemoteResult<Subscription> {
        self.check("subscribe")?;
        self.handlers.lock().unwrap().push(handler.clone());
        self.inner.subscribe(table, handler).await
    }
}

/// Store config without the timed fallback re-fetch, so tests see only the
/// writes they make.
pub fn quiet_config() -> StoreConfig {
    StoreConfig {
        fallback_refresh: None,
        ..StoreConfig::default()
    }
}

pub fn store_over(remote: &Arc<FlakyRemote>) -> Store {
    Store::builder(remote.clone()).config(quiet_config()).build()
}

pub async fn seed_account(remote: &FlakyRemote, name: &str) -> Account {
    remote
        .inner
        .insert_account(NewAccount {
            uid: format!("uid-{}", name.to_lowercase()),
            name: name.into(),
            email: format!("{}@example.com", name.to_lowercase()),
            avatar: String::new(),
            hint: String::new(),
            role: Role::User,
        })
        .await
        .unwrap()
}

pub async fn seed_pin(remote: &FlakyRemote, giver: &Account, receiver: &Account, reason: &str) -> Pin {
    remote
        .inner
        .insert_pin(NewPin {
            giver_id: giver.id,
            receiver_id: receiver.id,
            reason: reason.into(),
        })
        .await
        .unwrap()
}

/// Poll `check` until it holds, failing the test after five seconds.
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if check().await {
            return;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
