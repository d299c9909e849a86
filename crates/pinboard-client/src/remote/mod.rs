//! The remote data store the mirror reflects.

pub mod embedded;
pub mod http;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use uuid::Uuid;

use pinboard_types::api::{AvatarSelection, NewAccount, NewAvatar, NewPin};
use pinboard_types::events::{Table, TableChange};
use pinboard_types::models::{Account, Avatar, Invite, Pin, Role};

use crate::error::RemoteResult;

pub use embedded::EmbeddedRemote;
pub use http::HttpRemote;

/// Callbacks for one subscribed table. Neither may block.
#[derive(Clone)]
pub struct ChangeHandler {
    on_change: Arc<dyn Fn(TableChange) + Send + Sync>,
    on_close: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl ChangeHandler {
    pub fn new(on_change: impl Fn(TableChange) + Send + Sync + 'static) -> Self {
        Self {
            on_change: Arc::new(on_change),
            on_close: None,
        }
    }

    /// Runs once if the channel ends on its own. An unsubscribe does not
    /// fire it.
    pub fn on_close(mut self, on_close: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_close = Some(Arc::new(on_close));
        self
    }

    pub fn changed(&self, change: TableChange) {
        (self.on_change)(change);
    }

    pub fn closed(&self) {
        if let Some(on_close) = &self.on_close {
            on_close();
        }
    }
}

/// Row reads, writes and change subscriptions over the four remote tables.
///
/// `insert_pin` and `delete_pin` carry the receiver's point adjustment with
/// them; implementations must apply both sides atomically.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    // -- Accounts --
    async fn list_accounts(&self) -> RemoteResult<Vec<Account>>;
    async fn find_account_by_email(&self, email: &str) -> RemoteResult<Option<Account>>;
    async fn insert_account(&self, account: NewAccount) -> RemoteResult<Account>;
    async fn set_account_role(&self, id: Uuid, role: Role) -> RemoteResult<()>;
    async fn set_account_avatar(&self, id: Uuid, selection: AvatarSelection) -> RemoteResult<()>;
    async fn delete_pins_for_account(&self, id: Uuid) -> RemoteResult<usize>;
    async fn delete_account(&self, id: Uuid) -> RemoteResult<()>;

    // -- Pins --
    async fn list_pins(&self) -> RemoteResult<Vec<Pin>>;
    async fn insert_pin(&self, pin: NewPin) -> RemoteResult<Pin>;
    async fn delete_pin(&self, id: Uuid) -> RemoteResult<()>;
    async fn add_pin_reaction(&self, id: Uuid) -> RemoteResult<u32>;

    // -- Avatars --
    async fn list_avatars(&self) -> RemoteResult<Vec<Avatar>>;
    async fn insert_avatar(&self, avatar: NewAvatar) -> RemoteResult<Avatar>;
    async fn update_avatar(&self, avatar: Avatar) -> RemoteResult<Avatar>;
    async fn delete_avatar(&self, id: Uuid) -> RemoteResult<()>;

    // -- Invites --
    async fn list_invites(&self) -> RemoteResult<Vec<Invite>>;
    async fn find_invite(&self, email: &str) -> RemoteResult<Option<Invite>>;
    async fn insert_invite(&self, email: &str) -> RemoteResult<Invite>;
    async fn delete_invite(&self, email: &str) -> RemoteResult<()>;

    /// Open a push channel for one table. The channel stays open until the
    /// returned handle is dropped or unsubscribed, or the remote ends it, in
    /// which case `handler.closed()` runs.
    async fn subscribe(&self, table: Table, handler: ChangeHandler) -> RemoteResult<Subscription>;
}

/// Handle to an open change subscription. Dropping it closes the channel.
pub struct Subscription {
    table: Table,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(table: Table, task: JoinHandle<()>) -> Self {
        Self {
            table,
            task: Some(task),
        }
    }

    pub fn table(&self) -> Table {
        self.table
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("table", &self.table)
            .field("active", &self.is_active())
            .finish()
    }
}
