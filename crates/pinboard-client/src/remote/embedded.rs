//! In-process remote backed directly by a pinboard database and dispatcher.
//! Behaves like the HTTP API: same validation, same change notifications.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use pinboard_db::{Database, is_constraint_violation};
use pinboard_gateway::Dispatcher;
use pinboard_types::api::{AvatarSelection, NewAccount, NewAvatar, NewPin, clean_invite_email};
use pinboard_types::events::{ChangeKind, Table, TableChange};
use pinboard_types::models::{Account, Avatar, Invite, Pin, Role};

use super::{ChangeHandler, RemoteStore, Subscription};
use crate::error::{RemoteError, RemoteResult};

#[derive(Clone)]
pub struct EmbeddedRemote {
    db: Arc<Database>,
    dispatcher: Dispatcher,
}

impl EmbeddedRemote {
    pub fn new(db: Arc<Database>, dispatcher: Dispatcher) -> Self {
        Self { db, dispatcher }
    }

    pub fn in_memory() -> anyhow::Result<Self> {
        Ok(Self::new(Arc::new(Database::open_in_memory()?), Dispatcher::new()))
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    async fn run<F, T>(&self, f: F) -> RemoteResult<T>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| RemoteError::Backend(e.to_string()))?
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    RemoteError::Rejected { status: 409 }
                } else {
                    RemoteError::Backend(e.to_string())
                }
            })
    }

    fn publish(&self, table: Table, kind: ChangeKind, row_id: impl ToString) {
        self.dispatcher.publish(TableChange::new(table, kind, row_id));
    }

    fn publish_table(&self, table: Table, kind: ChangeKind) {
        self.dispatcher.publish(TableChange::whole_table(table, kind));
    }
}

fn found(changed: bool, what: impl Into<String>) -> RemoteResult<()> {
    if changed {
        Ok(())
    } else {
        Err(RemoteError::NotFound(what.into()))
    }
}

#[async_trait]
impl RemoteStore for EmbeddedRemote {
    async fn list_accounts(&self) -> RemoteResult<Vec<Account>> {
        let rows = self.run(|db| db.list_accounts()).await?;
        Ok(rows.into_iter().map(|r| r.into_account()).collect())
    }

    async fn find_account_by_email(&self, email: &str) -> RemoteResult<Option<Account>> {
        let email = email.to_string();
        let row = self.run(move |db| db.find_account_by_email(&email)).await?;
        Ok(row.map(|r| r.into_account()))
    }

    async fn insert_account(&self, account: NewAccount) -> RemoteResult<Account> {
        if !account.is_valid() {
            return Err(RemoteError::Rejected { status: 400 });
        }
        let id = Uuid::new_v4();
        let row = self
            .run(move |db| db.insert_account(&id.to_string(), &account))
            .await?;
        self.publish(Table::Accounts, ChangeKind::Insert, id);
        Ok(row.into_account())
    }

    async fn set_account_role(&self, id: Uuid, role: Role) -> RemoteResult<()> {
        let changed = self
            .run(move |db| db.set_account_role(&id.to_string(), role))
            .await?;
        found(changed, format!("account {}", id))?;
        self.publish(Table::Accounts, ChangeKind::Update, id);
        Ok(())
    }

    async fn set_account_avatar(&self, id: Uuid, selection: AvatarSelection) -> RemoteResult<()> {
        let changed = self
            .run(move |db| db.set_account_avatar(&id.to_string(), &selection.avatar, &selection.hint))
            .await?;
        found(changed, format!("account {}", id))?;
        self.publish(Table::Accounts, ChangeKind::Update, id);
        Ok(())
    }

    async fn delete_pins_for_account(&self, id: Uuid) -> RemoteResult<usize> {
        let deleted = self
            .run(move |db| db.delete_pins_for_account(&id.to_string()))
            .await?;
        if deleted > 0 {
            self.publish_table(Table::Pins, ChangeKind::Delete);
            self.publish_table(Table::Accounts, ChangeKind::Update);
        }
        Ok(deleted)
    }

    async fn delete_account(&self, id: Uuid) -> RemoteResult<()> {
        let deleted = self.run(move |db| db.delete_account(&id.to_string())).await?;
        found(deleted, format!("account {}", id))?;
        self.publish(Table::Accounts, ChangeKind::Delete, id);
        Ok(())
    }

    async fn list_pins(&self) -> RemoteResult<Vec<Pin>> {
        let rows = self.run(|db| db.list_pins()).await?;
        Ok(rows.into_iter().map(|r| r.into_pin()).collect())
    }

    async fn insert_pin(&self, pin: NewPin) -> RemoteResult<Pin> {
        let reason = pin.clean_reason().ok_or(RemoteError::Rejected { status: 400 })?;
        let id = Uuid::new_v4();
        let row = self
            .run(move |db| {
                db.award_pin(
                    &id.to_string(),
                    &pin.giver_id.to_string(),
                    &pin.receiver_id.to_string(),
                    &reason,
                )
            })
            .await?
            .ok_or_else(|| {
                warn!("Pin referenced unknown account(s)");
                RemoteError::Rejected { status: 422 }
            })?;
        let pin = row.into_pin();
        self.publish(Table::Pins, ChangeKind::Insert, id);
        self.publish(Table::Accounts, ChangeKind::Update, pin.receiver.id);
        Ok(pin)
    }

    async fn delete_pin(&self, id: Uuid) -> RemoteResult<()> {
        let found_pin = self.run(move |db| db.revoke_pin(&id.to_string())).await?;
        found(found_pin, format!("pin {}", id))?;
        self.publish(Table::Pins, ChangeKind::Delete, id);
        self.publish_table(Table::Accounts, ChangeKind::Update);
        Ok(())
    }

    async fn add_pin_reaction(&self, id: Uuid) -> RemoteResult<u32> {
        let tally = self
            .run(move |db| db.add_pin_reaction(&id.to_string()))
            .await?
            .ok_or_else(|| RemoteError::NotFound(format!("pin {}", id)))?;
        self.publish(Table::Pins, ChangeKind::Update, id);
        Ok(u32::try_from(tally).unwrap_or(u32::MAX))
    }

    async fn list_avatars(&self) -> RemoteResult<Vec<Avatar>> {
        let rows = self.run(|db| db.list_avatars()).await?;
        Ok(rows.into_iter().map(|r| r.into_avatar()).collect())
    }

    async fn insert_avatar(&self, avatar: NewAvatar) -> RemoteResult<Avatar> {
        if !avatar.is_valid() {
            return Err(RemoteError::Rejected { status: 400 });
        }
        let id = Uuid::new_v4();
        let row = self
            .run(move |db| db.insert_avatar(&id.to_string(), &avatar))
            .await?;
        self.publish(Table::Avatars, ChangeKind::Insert, id);
        Ok(row.into_avatar())
    }

    async fn update_avatar(&self, avatar: Avatar) -> RemoteResult<Avatar> {
        if !avatar.is_valid() {
            return Err(RemoteError::Rejected { status: 400 });
        }
        let id = avatar.id;
        let stored = avatar.clone();
        let changed = self.run(move |db| db.update_avatar(&stored)).await?;
        found(changed, format!("avatar {}", id))?;
        self.publish(Table::Avatars, ChangeKind::Update, id);
        Ok(avatar)
    }

    async fn delete_avatar(&self, id: Uuid) -> RemoteResult<()> {
        let deleted = self.run(move |db| db.delete_avatar(&id.to_string())).await?;
        found(deleted, format!("avatar {}", id))?;
        self.publish(Table::Avatars, ChangeKind::Delete, id);
        Ok(())
    }

    async fn list_invites(&self) -> RemoteResult<Vec<Invite>> {
        let rows = self.run(|db| db.list_invites()).await?;
        Ok(rows.into_iter().map(|r| r.into_invite()).collect())
    }

    async fn find_invite(&self, email: &str) -> RemoteResult<Option<Invite>> {
        let email = email.to_string();
        let row = self.run(move |db| db.get_invite(&email)).await?;
        Ok(row.map(|r| r.into_invite()))
    }

    async fn insert_invite(&self, email: &str) -> RemoteResult<Invite> {
        let email = clean_invite_email(email).ok_or(RemoteError::Rejected { status: 400 })?;
        let key = email.clone();
        let row = self.run(move |db| db.insert_invite(&key)).await?;
        self.publish(Table::Invites, ChangeKind::Insert, email);
        Ok(row.into_invite())
    }

    async fn delete_invite(&self, email: &str) -> RemoteResult<()> {
        let key = email.to_string();
        let deleted = self.run(move |db| db.delete_invite(&key)).await?;
        found(deleted, format!("invite {}", email))?;
        self.publish(Table::Invites, ChangeKind::Delete, email);
        Ok(())
    }

    async fn subscribe(&self, table: Table, handler: ChangeHandler) -> RemoteResult<Subscription> {
        let mut rx = self.dispatcher.subscribe();
        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(change) if change.table == table => handler.changed(change),
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        debug!("{} subscriber lagged by {} changes", table, n);
                        handler.changed(TableChange::whole_table(table, ChangeKind::Update));
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            handler.closed();
        });
        Ok(Subscription::new(table, task))
    }
}
