//! Local copy of the remote collections and the reversible edits applied to
//! it ahead of remote confirmation.

use std::collections::HashSet;

use uuid::Uuid;

use pinboard_types::events::Table;
use pinboard_types::models::{Account, Avatar, Pin};

/// A remote collection the mirror keeps locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Accounts,
    Pins,
    Avatars,
}

impl Collection {
    pub const ALL: [Collection; 3] = [Collection::Accounts, Collection::Pins, Collection::Avatars];

    pub fn as_str(&self) -> &'static str {
        self.table().as_str()
    }

    pub fn table(&self) -> Table {
        match self {
            Self::Accounts => Table::Accounts,
            Self::Pins => Table::Pins,
            Self::Avatars => Table::Avatars,
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            Self::Accounts => 0,
            Self::Pins => 1,
            Self::Avatars => 2,
        }
    }
}

/// The mirrored collections as consumers see them. Pins are newest first,
/// avatars cheapest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Collections {
    pub accounts: Vec<Account>,
    pub pins: Vec<Pin>,
    pub avatars: Vec<Avatar>,
}

/// Undo step for one local edit.
#[derive(Debug, Clone)]
pub(crate) enum Inverse {
    RemovePin(Uuid),
    RestorePin { pin: Pin, index: usize },
    AdjustPoints { account_id: Uuid, delta: i64 },
    RestoreReactions { pin_id: Uuid, reactions: Option<u32> },
    RestoreAccountAvatar { account_id: Uuid, avatar: String, hint: String },
}

/// Inverses of an optimistic mutation, stamped with the generations they
/// were captured against.
#[derive(Debug)]
pub(crate) struct Applied {
    accounts_gen: u64,
    pins_gen: u64,
    inverses: Vec<Inverse>,
}

#[derive(Debug, Default)]
pub(crate) struct Mirror {
    collections: Collections,
    // Bumped by every wholesale replacement
    accounts_gen: u64,
    pins_gen: u64,
    /// Pins shown locally but not yet confirmed by the remote.
    transient: HashSet<Uuid>,
}

impl Mirror {
    pub fn collections(&self) -> &Collections {
        &self.collections
    }

    pub fn account(&self, id: Uuid) -> Option<&Account> {
        self.collections.accounts.iter().find(|a| a.id == id)
    }

    pub fn pin(&self, id: Uuid) -> Option<&Pin> {
        self.collections.pins.iter().find(|p| p.id == id)
    }

    pub fn avatar(&self, id: Uuid) -> Option<&Avatar> {
        self.collections.avatars.iter().find(|a| a.id == id)
    }

    pub fn is_transient(&self, pin_id: Uuid) -> bool {
        self.transient.contains(&pin_id)
    }

    // -- Wholesale replacement --

    pub fn replace_accounts(&mut self, accounts: Vec<Account>) {
        self.collections.accounts = accounts;
        self.accounts_gen += 1;
    }

    /// Also drops any transient pins: the snapshot is authoritative.
    pub fn replace_pins(&mut self, pins: Vec<Pin>) {
        self.collections.pins = pins;
        self.transient.clear();
        self.pins_gen += 1;
    }

    pub fn replace_avatars(&mut self, avatars: Vec<Avatar>) {
        self.collections.avatars = avatars;
    }

    // -- Reversible edits --

    pub fn begin(&self) -> Applied {
        Applied {
            accounts_gen: self.accounts_gen,
            pins_gen: self.pins_gen,
            inverses: Vec::new(),
        }
    }

    pub fn prepend_transient_pin(&mut self, applied: &mut Applied, pin: Pin) {
        applied.inverses.push(Inverse::RemovePin(pin.id));
        self.transient.insert(pin.id);
        self.collections.pins.insert(0, pin);
    }

    pub fn remove_pin(&mut self, applied: &mut Applied, id: Uuid) -> Option<Pin> {
        let index = self.collections.pins.iter().position(|p| p.id == id)?;
        let pin = self.collections.pins.remove(index);
        applied.inverses.push(Inverse::RestorePin {
            pin: pin.clone(),
            index,
        });
        Some(pin)
    }

    /// Returns false when the account isn't mirrored.
    pub fn adjust_points(&mut self, applied: &mut Applied, account_id: Uuid, delta: i64) -> bool {
        if !self.add_points(account_id, delta) {
            return false;
        }
        applied.inverses.push(Inverse::AdjustPoints {
            account_id,
            delta: -delta,
        });
        true
    }

    pub fn add_reaction(&mut self, applied: &mut Applied, pin_id: Uuid) -> bool {
        let Some(pin) = self.collections.pins.iter_mut().find(|p| p.id == pin_id) else {
            return false;
        };
        applied.inverses.push(Inverse::RestoreReactions {
            pin_id,
            reactions: pin.reactions,
        });
        pin.reactions = Some(pin.reactions.unwrap_or(0).saturating_add(1));
        true
    }

    pub fn set_account_avatar(&mut self, applied: &mut Applied, account_id: Uuid, avatar: &str, hint: &str) -> bool {
        let Some(account) = self.collections.accounts.iter_mut().find(|a| a.id == account_id) else {
            return false;
        };
        applied.inverses.push(Inverse::RestoreAccountAvatar {
            account_id,
            avatar: std::mem::replace(&mut account.avatar, avatar.to_string()),
            hint: std::mem::replace(&mut account.hint, hint.to_string()),
        });
        true
    }

    /// Undo a failed mutation, newest edit first. Steps captured against a
    /// collection that has since been replaced wholesale are skipped: the
    /// snapshot already reflects the remote without the failed write.
    pub fn rollback(&mut self, applied: Applied) {
        let accounts_current = applied.accounts_gen == self.accounts_gen;
        let pins_current = applied.pins_gen == self.pins_gen;

        for inverse in applied.inverses.into_iter().rev() {
            match inverse {
                Inverse::RemovePin(id) => {
                    self.collections.pins.retain(|p| p.id != id);
                    self.transient.remove(&id);
                }
                Inverse::RestorePin { pin, index } => {
                    if pins_current && self.pin(pin.id).is_none() {
                        let index = index.min(self.collections.pins.len());
                        self.collections.pins.insert(index, pin);
                    }
                }
                Inverse::AdjustPoints { account_id, delta } => {
                    if accounts_current {
                        self.add_points(account_id, delta);
                    }
                }
                Inverse::RestoreReactions { pin_id, reactions } => {
                    if !pins_current {
                        continue;
                    }
                    if let Some(pin) = self.collections.pins.iter_mut().find(|p| p.id == pin_id) {
                        pin.reactions = reactions;
                    }
                }
                Inverse::RestoreAccountAvatar {
                    account_id,
                    avatar,
                    hint,
                } => {
                    if !accounts_current {
                        continue;
                    }
                    if let Some(account) = self.collections.accounts.iter_mut().find(|a| a.id == account_id) {
                        account.avatar = avatar;
                        account.hint = hint;
                    }
                }
            }
        }
    }

    // -- Confirmed writes --

    /// Swap a transient pin for the stored one. A no-op once a snapshot has
    /// replaced the transient record.
    pub fn confirm_pin(&mut self, temp_id: Uuid, pin: Pin) {
        if !self.transient.remove(&temp_id) {
            return;
        }
        let Some(index) = self.collections.pins.iter().position(|p| p.id == temp_id) else {
            return;
        };
        if self.pin(pin.id).is_some() {
            self.collections.pins.remove(index);
        } else {
            self.collections.pins[index] = pin;
        }
    }

    pub fn set_reactions(&mut self, pin_id: Uuid, reactions: u32) {
        if let Some(pin) = self.collections.pins.iter_mut().find(|p| p.id == pin_id) {
            pin.reactions = Some(reactions);
        }
    }

    /// Remove an account and every pin it gave or received. Each surviving
    /// receiver loses the point a removed pin gave them.
    pub fn remove_account_cascade(&mut self, account_id: Uuid) -> usize {
        self.collections.accounts.retain(|a| a.id != account_id);
        let (removed, kept): (Vec<Pin>, Vec<Pin>) = std::mem::take(&mut self.collections.pins)
            .into_iter()
            .partition(|p| p.involves(account_id));
        self.collections.pins = kept;
        for pin in &removed {
            self.transient.remove(&pin.id);
            if pin.receiver.id != account_id {
                self.add_points(pin.receiver.id, -1);
            }
        }
        removed.len()
    }

    pub fn upsert_account(&mut self, account: Account) {
        match self.collections.accounts.iter_mut().find(|a| a.id == account.id) {
            Some(existing) => *existing = account,
            None => self.collections.accounts.push(account),
        }
    }

    pub fn upsert_avatar(&mut self, avatar: Avatar) {
        match self.collections.avatars.iter_mut().find(|a| a.id == avatar.id) {
            Some(existing) => *existing = avatar,
            None => self.collections.avatars.push(avatar),
        }
        self.collections
            .avatars
            .sort_by(|a, b| a.price.cmp(&b.price).then_with(|| a.name.cmp(&b.name)));
    }

    pub fn remove_avatar(&mut self, id: Uuid) {
        self.collections.avatars.retain(|a| a.id != id);
    }

    fn add_points(&mut self, account_id: Uuid, delta: i64) -> bool {
        match self.collections.accounts.iter_mut().find(|a| a.id == account_id) {
            Some(account) => {
                account.points += delta;
                true
            }
            None => false,
        }
    }
}
