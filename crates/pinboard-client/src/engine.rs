//! Writes against the remote, reflected locally ahead of confirmation where
//! latency matters and after it where correctness does.

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use pinboard_types::api::{AvatarSelection, NewAvatar, NewPin};
use pinboard_types::models::{Avatar, Invite, Pin};

use crate::error::{RemoteError, RemoteResult};
use crate::mirror::Collection;
use crate::notice::NoticeKind;
use crate::store::Store;

/// Terminal state of a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    /// The remote accepted the write.
    Confirmed,
    /// The remote refused an optimistic write; local state was restored.
    RolledBack,
    /// Referenced rows aren't known locally; nothing was attempted.
    Skipped,
    /// A non-optimistic write failed; local state was never touched, or was
    /// left as is after a partial cascade.
    Failed,
    /// Refused locally before any write.
    Refused,
}

impl MutationOutcome {
    pub fn is_confirmed(&self) -> bool {
        *self == Self::Confirmed
    }
}

const PIN_REFRESH: &[Collection] = &[Collection::Pins, Collection::Accounts];

impl Store {
    // -- Pins --

    pub async fn give_pin(&self, giver_id: Uuid, receiver_id: Uuid, reason: impl Into<String>) -> MutationOutcome {
        let reason = reason.into().trim().to_string();

        let (temp_id, receiver_name, applied) = {
            let mut mirror = self.inner.mirror.write().await;
            let (Some(giver), Some(receiver)) = (mirror.account(giver_id).cloned(), mirror.account(receiver_id).cloned())
            else {
                debug!("give_pin skipped: unknown giver or receiver");
                return MutationOutcome::Skipped;
            };

            let temp = Pin {
                id: Uuid::new_v4(),
                giver,
                receiver,
                reason: reason.clone(),
                created_at: Utc::now(),
                reactions: None,
            };
            let temp_id = temp.id;
            let receiver_name = temp.receiver.name.clone();

            let mut applied = mirror.begin();
            mirror.prepend_transient_pin(&mut applied, temp);
            mirror.adjust_points(&mut applied, receiver_id, 1);
            (temp_id, receiver_name, applied)
        };

        let request = NewPin {
            giver_id,
            receiver_id,
            reason,
        };
        match self.inner.remote.insert_pin(request).await {
            Ok(pin) => {
                info!("{} received a pin", pin.receiver.name);
                self.inner.mirror.write().await.confirm_pin(temp_id, pin);
                self.notify(NoticeKind::PinGiven { receiver: receiver_name });
                self.schedule_fallback_refresh(PIN_REFRESH);
                MutationOutcome::Confirmed
            }
            Err(e) => {
                warn!("Pin insert failed, rolling back: {}", e);
                self.inner.mirror.write().await.rollback(applied);
                self.notify(NoticeKind::PinFailed);
                MutationOutcome::RolledBack
            }
        }
    }

    /// Moderation: delete a pin and take its point back.
    pub async fn invalidate_pin(&self, pin_id: Uuid) -> MutationOutcome {
        let applied = {
            let mut mirror = self.inner.mirror.write().await;
            // A transient pin has no remote row yet
            if mirror.is_transient(pin_id) {
                return MutationOutcome::Skipped;
            }
            let mut applied = mirror.begin();
            let Some(pin) = mirror.remove_pin(&mut applied, pin_id) else {
                return MutationOutcome::Skipped;
            };
            mirror.adjust_points(&mut applied, pin.receiver.id, -1);
            applied
        };

        match self.inner.remote.delete_pin(pin_id).await {
            // Already gone remotely: someone else invalidated it first
            Ok(()) | Err(RemoteError::NotFound(_)) => {
                self.notify(NoticeKind::PinInvalidated);
                self.schedule_fallback_refresh(PIN_REFRESH);
                MutationOutcome::Confirmed
            }
            Err(e) => {
                warn!("Pin delete failed, rolling back: {}", e);
                self.inner.mirror.write().await.rollback(applied);
                self.notify(NoticeKind::InvalidateFailed);
                MutationOutcome::RolledBack
            }
        }
    }

    pub async fn react_to_pin(&self, pin_id: Uuid) -> MutationOutcome {
        let applied = {
            let mut mirror = self.inner.mirror.write().await;
            if mirror.is_transient(pin_id) {
                return MutationOutcome::Skipped;
            }
            let mut applied = mirror.begin();
            if !mirror.add_reaction(&mut applied, pin_id) {
                return MutationOutcome::Skipped;
            }
            applied
        };

        match self.inner.remote.add_pin_reaction(pin_id).await {
            Ok(tally) => {
                self.inner.mirror.write().await.set_reactions(pin_id, tally);
                MutationOutcome::Confirmed
            }
            Err(e) => {
                warn!("Reaction failed, rolling back: {}", e);
                self.inner.mirror.write().await.rollback(applied);
                self.notify(NoticeKind::ReactionFailed);
                MutationOutcome::RolledBack
            }
        }
    }

    // -- Accounts --

    /// Remove an account together with every pin it gave or received. The
    /// local removal is not undone if the remote cascade fails part way.
    pub async fn remove_account(&self, account_id: Uuid) -> MutationOutcome {
        if self.current_account().await.is_some_and(|a| a.id == account_id) {
            debug!("Refusing to remove the signed-in account");
            return MutationOutcome::Refused;
        }

        {
            let mut mirror = self.inner.mirror.write().await;
            if mirror.account(account_id).is_none() {
                return MutationOutcome::Skipped;
            }
            let pins = mirror.remove_account_cascade(account_id);
            debug!("Removed account {} and {} pins locally", account_id, pins);
        }

        let result = self.delete_account_cascade(account_id).await;

        match result {
            Ok(()) => {
                self.notify(NoticeKind::AccountRemoved);
                MutationOutcome::Confirmed
            }
            Err(e) => {
                warn!("Account removal for {} failed part way: {}", account_id, e);
                self.notify(NoticeKind::AccountRemovalFailed);
                MutationOutcome::Failed
            }
        }
    }

    /// Dependent pins first: the account row can't go while pins reference it.
    async fn delete_account_cascade(&self, account_id: Uuid) -> RemoteResult<()> {
        let remote = &self.inner.remote;
        let pins = remote.delete_pins_for_account(account_id).await?;
        debug!("Deleted {} remote pins for account {}", pins, account_id);
        match remote.delete_account(account_id).await {
            Err(e) if !e.is_not_found() => Err(e),
            _ => Ok(()),
        }
    }

    // -- Avatar catalog --

    pub async fn add_avatar(&self, avatar: NewAvatar) -> MutationOutcome {
        match self.inner.remote.insert_avatar(avatar).await {
            Ok(stored) => {
                self.inner.mirror.write().await.upsert_avatar(stored);
                self.notify(NoticeKind::AvatarAdded);
                MutationOutcome::Confirmed
            }
            Err(e) => {
                warn!("Avatar insert failed: {}", e);
                self.notify(NoticeKind::AvatarFailed);
                MutationOutcome::Failed
            }
        }
    }

    pub async fn update_avatar(&self, avatar: Avatar) -> MutationOutcome {
        match self.inner.remote.update_avatar(avatar).await {
            Ok(stored) => {
                self.inner.mirror.write().await.upsert_avatar(stored);
                self.notify(NoticeKind::AvatarUpdated);
                MutationOutcome::Confirmed
            }
            Err(e) => {
                warn!("Avatar update failed: {}", e);
                self.notify(NoticeKind::AvatarFailed);
                MutationOutcome::Failed
            }
        }
    }

    /// Not optimistic: the local entry goes only once the remote confirms.
    pub async fn remove_avatar(&self, avatar_id: Uuid) -> MutationOutcome {
        match self.inner.remote.delete_avatar(avatar_id).await {
            Err(e) if !e.is_not_found() => {
                warn!("Avatar delete failed: {}", e);
                self.notify(NoticeKind::AvatarFailed);
                MutationOutcome::Failed
            }
            _ => {
                self.inner.mirror.write().await.remove_avatar(avatar_id);
                self.notify(NoticeKind::AvatarRemoved);
                MutationOutcome::Confirmed
            }
        }
    }

    /// Select a catalog avatar for the signed-in account. Needs the item to
    /// be free or the balance to cover its price; nothing is deducted.
    pub async fn equip_avatar(&self, avatar_id: Uuid) -> MutationOutcome {
        let Some(account) = self.current_account().await else {
            return MutationOutcome::Skipped;
        };

        let (avatar, applied) = {
            let mut mirror = self.inner.mirror.write().await;
            let Some(avatar) = mirror.avatar(avatar_id).cloned() else {
                return MutationOutcome::Skipped;
            };
            if !avatar.is_free() && account.points < avatar.price {
                drop(mirror);
                self.notify(NoticeKind::InsufficientPoints {
                    missing: avatar.price - account.points,
                });
                return MutationOutcome::Refused;
            }
            let mut applied = mirror.begin();
            if !mirror.set_account_avatar(&mut applied, account.id, &avatar.image, &avatar.hint) {
                return MutationOutcome::Skipped;
            }
            (avatar, applied)
        };

        let selection = AvatarSelection {
            avatar: avatar.image.clone(),
            hint: avatar.hint.clone(),
        };
        match self.inner.remote.set_account_avatar(account.id, selection).await {
            Ok(()) => {
                self.notify(NoticeKind::AvatarEquipped { name: avatar.name });
                MutationOutcome::Confirmed
            }
            Err(e) => {
                warn!("Equipping avatar failed, rolling back: {}", e);
                self.inner.mirror.write().await.rollback(applied);
                self.notify(NoticeKind::EquipFailed);
                MutationOutcome::RolledBack
            }
        }
    }

    // -- Invites --

    pub async fn invites(&self) -> RemoteResult<Vec<Invite>> {
        self.inner.remote.list_invites().await
    }

    pub async fn add_invite(&self, email: &str) -> MutationOutcome {
        let email = email.trim();
        match self.inner.remote.insert_invite(email).await {
            Ok(invite) => {
                self.notify(NoticeKind::InviteAdded { email: invite.email });
                MutationOutcome::Confirmed
            }
            Err(e) => {
                warn!("Invite for {} failed: {}", email, e);
                self.notify(NoticeKind::InviteFailed);
                MutationOutcome::Failed
            }
        }
    }

    pub async fn remove_invite(&self, email: &str) -> MutationOutcome {
        match self.inner.remote.delete_invite(email.trim()).await {
            Err(e) if !e.is_not_found() => {
                warn!("Removing invite for {} failed: {}", email, e);
                self.notify(NoticeKind::InviteFailed);
                MutationOutcome::Failed
            }
            _ => {
                self.notify(NoticeKind::InviteRemoved);
                MutationOutcome::Confirmed
            }
        }
    }
}
