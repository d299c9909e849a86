/// Integration tests for the mutation engine over an in-process remote:
/// optimistic pin writes and their rollback, the account cascade, the avatar
/// catalog and the avatar store.

mod common;

use pinboard_client::{Collection, MutationOutcome, NoticeKind, RemoteStore, Session};
use pinboard_types::api::NewAvatar;
use uuid::Uuid;

use common::{FlakyRemote, seed_account, seed_pin, store_over};

#[tokio::test]
async fn pin_moves_one_point_and_invalidation_takes_it_back() {
    let remote = FlakyRemote::new();
    let ana = seed_account(&remote, "Ana").await;
    let bruno = seed_account(&remote, "Bruno").await;
    let store = store_over(&remote);
    store.load_all().await;
    assert_eq!(store.account(ana.id).await.unwrap().points, 0);

    let outcome = store.give_pin(bruno.id, ana.id, "late to standup").await;
    assert_eq!(outcome, MutationOutcome::Confirmed);

    assert_eq!(store.account(ana.id).await.unwrap().points, 1);
    let pins = store.pins().await;
    assert_eq!(pins.len(), 1);
    assert_eq!(pins[0].giver.id, bruno.id);
    assert_eq!(pins[0].receiver.id, ana.id);
    assert_eq!(pins[0].reason, "late to standup");

    // The remote agrees once re-fetched
    store.load_all().await;
    assert_eq!(store.account(ana.id).await.unwrap().points, 1);
    let pin_id = store.pins().await[0].id;
    assert_eq!(pin_id, pins[0].id);

    assert_eq!(store.invalidate_pin(pin_id).await, MutationOutcome::Confirmed);
    assert_eq!(store.account(ana.id).await.unwrap().points, 0);
    assert!(store.pins().await.is_empty());

    store.load_all().await;
    assert_eq!(store.account(ana.id).await.unwrap().points, 0);
    assert!(store.pins().await.is_empty());
}

#[tokio::test]
async fn balance_tracks_received_pins() {
    let remote = FlakyRemote::new();
    let ana = seed_account(&remote, "Ana").await;
    let bruno = seed_account(&remote, "Bruno").await;
    let carla = seed_account(&remote, "Carla").await;
    let store = store_over(&remote);
    store.load_all().await;

    for reason in ["helped with deploy", "reviewed my PR", "brought coffee"] {
        assert!(store.give_pin(bruno.id, ana.id, reason).await.is_confirmed());
    }
    assert!(store.give_pin(carla.id, ana.id, "fixed the build").await.is_confirmed());
    assert!(store.give_pin(ana.id, bruno.id, "pairing").await.is_confirmed());

    let coffee = store
        .pins()
        .await
        .into_iter()
        .find(|p| p.reason == "brought coffee")
        .unwrap();
    assert!(store.invalidate_pin(coffee.id).await.is_confirmed());

    for _ in 0..2 {
        let received = store.pins().await.iter().filter(|p| p.receiver.id == ana.id).count();
        assert_eq!(store.account(ana.id).await.unwrap().points, received as i64);
        assert_eq!(received, 3);
        // Same again from the remote's point of view
        store.load_all().await;
    }
}

#[tokio::test]
async fn failed_insert_leaves_everything_as_it_was() {
    let remote = FlakyRemote::new();
    let ana = seed_account(&remote, "Ana").await;
    let bruno = seed_account(&remote, "Bruno").await;
    seed_pin(&remote, &bruno, &ana, "earlier").await;
    let store = store_over(&remote);
    store.load_all().await;
    let before = store.snapshot().await;
    let mut notices = store.notices();

    remote.fail("insert_pin");
    let outcome = store.give_pin(bruno.id, ana.id, "late to standup").await;

    assert_eq!(outcome, MutationOutcome::RolledBack);
    assert_eq!(store.snapshot().await, before);
    assert_eq!(notices.try_recv().unwrap().kind, NoticeKind::PinFailed);
    assert_eq!(remote.inner.list_pins().await.unwrap().len(), 1);
}

#[tokio::test]
async fn failed_delete_restores_pin_in_place() {
    let remote = FlakyRemote::new();
    let ana = seed_account(&remote, "Ana").await;
    let bruno = seed_account(&remote, "Bruno").await;
    for reason in ["first", "second", "third"] {
        seed_pin(&remote, &bruno, &ana, reason).await;
    }
    let store = store_over(&remote);
    store.load_all().await;
    let before = store.snapshot().await;
    let middle = before.pins[1].id;

    remote.fail("delete_pin");
    assert_eq!(store.invalidate_pin(middle).await, MutationOutcome::RolledBack);
    assert_eq!(store.snapshot().await, before);
    assert_eq!(store.account(ana.id).await.unwrap().points, 3);
}

#[tokio::test]
async fn unknown_accounts_are_skipped_silently() {
    let remote = FlakyRemote::new();
    let ana = seed_account(&remote, "Ana").await;
    let store = store_over(&remote);
    store.load_all().await;
    let mut notices = store.notices();

    let outcome = store.give_pin(Uuid::new_v4(), ana.id, "ghost").await;

    assert_eq!(outcome, MutationOutcome::Skipped);
    assert!(store.pins().await.is_empty());
    assert!(remote.inner.list_pins().await.unwrap().is_empty());
    assert!(notices.try_recv().is_err());
    assert_eq!(store.invalidate_pin(Uuid::new_v4()).await, MutationOutcome::Skipped);
}

#[tokio::test]
async fn snapshot_during_failed_insert_is_not_adjusted_twice() {
    let remote = FlakyRemote::new();
    let ana = seed_account(&remote, "Ana").await;
    let bruno = seed_account(&remote, "Bruno").await;
    let store = store_over(&remote);
    store.load_all().await;

    remote.hold_pin_inserts();
    let pending = tokio::spawn({
        let store = store.clone();
        async move { store.give_pin(bruno.id, ana.id, "late to standup").await }
    });

    remote.pin_insert_issued().await;
    assert_eq!(store.account(ana.id).await.unwrap().points, 1);

    // A push-triggered re-fetch lands before the insert resolves
    store.load_snapshot(Collection::Accounts).await.unwrap();
    assert_eq!(store.account(ana.id).await.unwrap().points, 0);

    remote.fail("insert_pin");
    remote.release_pin_insert();
    assert_eq!(pending.await.unwrap(), MutationOutcome::RolledBack);

    assert_eq!(store.account(ana.id).await.unwrap().points, 0);
    assert!(store.pins().await.is_empty());
}

#[tokio::test]
async fn removing_an_account_removes_its_pins() {
    let remote = FlakyRemote::new();
    let ana = seed_account(&remote, "Ana").await;
    let bruno = seed_account(&remote, "Bruno").await;
    let carla = seed_account(&remote, "Carla").await;
    seed_pin(&remote, &carla, &ana, "gave one").await;
    seed_pin(&remote, &carla, &bruno, "gave two").await;
    seed_pin(&remote, &ana, &carla, "received one").await;
    seed_pin(&remote, &ana, &bruno, "unrelated").await;
    let store = store_over(&remote);
    store.load_all().await;
    assert_eq!(store.pins().await.len(), 4);
    assert_eq!(store.account(ana.id).await.unwrap().points, 1);
    assert_eq!(store.account(bruno.id).await.unwrap().points, 2);

    assert_eq!(store.remove_account(carla.id).await, MutationOutcome::Confirmed);

    let pins = store.pins().await;
    assert_eq!(pins.len(), 1);
    assert_eq!(pins[0].reason, "unrelated");
    assert!(store.account(carla.id).await.is_none());
    // Points from Carla's pins go with them
    assert_eq!(store.account(ana.id).await.unwrap().points, 0);
    assert_eq!(store.account(bruno.id).await.unwrap().points, 1);

    store.load_all().await;
    assert_eq!(store.pins().await.len(), 1);
    assert!(store.account(carla.id).await.is_none());
    assert_eq!(store.account(ana.id).await.unwrap().points, 0);
    assert_eq!(store.account(bruno.id).await.unwrap().points, 1);
}

#[tokio::test]
async fn partial_cascade_is_not_rolled_back() {
    let remote = FlakyRemote::new();
    let ana = seed_account(&remote, "Ana").await;
    let carla = seed_account(&remote, "Carla").await;
    seed_pin(&remote, &carla, &ana, "thanks").await;
    let store = store_over(&remote);
    store.load_all().await;
    let mut notices = store.notices();

    remote.fail("delete_account");
    assert_eq!(store.remove_account(carla.id).await, MutationOutcome::Failed);
    assert_eq!(notices.try_recv().unwrap().kind, NoticeKind::AccountRemovalFailed);

    // Local removal stands until the next re-fetch brings the row back
    assert!(store.account(carla.id).await.is_none());
    store.load_all().await;
    assert!(store.account(carla.id).await.is_some());
    assert!(store.pins().await.is_empty());
    assert_eq!(store.account(ana.id).await.unwrap().points, 0);
}

#[tokio::test]
async fn reloading_without_changes_is_idempotent() {
    let remote = FlakyRemote::new();
    let ana = seed_account(&remote, "Ana").await;
    let bruno = seed_account(&remote, "Bruno").await;
    seed_pin(&remote, &bruno, &ana, "one").await;
    seed_pin(&remote, &ana, &bruno, "two").await;
    remote
        .inner
        .insert_avatar(NewAvatar {
            name: "Robot".into(),
            image: "/avatars/robot.png".into(),
            price: 3,
            hint: String::new(),
        })
        .await
        .unwrap();
    let store = store_over(&remote);

    store.load_all().await;
    let first = store.snapshot().await;
    store.load_all().await;
    assert_eq!(store.snapshot().await, first);
}

#[tokio::test]
async fn failed_snapshot_keeps_the_stale_copy() {
    let remote = FlakyRemote::new();
    let ana = seed_account(&remote, "Ana").await;
    let bruno = seed_account(&remote, "Bruno").await;
    seed_pin(&remote, &bruno, &ana, "one").await;
    let store = store_over(&remote);
    store.load_all().await;
    let before = store.snapshot().await;
    let mut notices = store.notices();

    remote.fail("list_pins");
    seed_pin(&remote, &bruno, &ana, "two").await;
    assert!(store.load_snapshot(Collection::Pins).await.is_err());

    assert_eq!(store.snapshot().await.pins, before.pins);
    assert_eq!(
        notices.try_recv().unwrap().kind,
        NoticeKind::SnapshotFailed { collection: "pins" }
    );
}

#[tokio::test]
async fn reactions_are_optimistic() {
    let remote = FlakyRemote::new();
    let ana = seed_account(&remote, "Ana").await;
    let bruno = seed_account(&remote, "Bruno").await;
    let pin = seed_pin(&remote, &bruno, &ana, "great demo").await;
    let store = store_over(&remote);
    store.load_all().await;

    assert_eq!(store.react_to_pin(pin.id).await, MutationOutcome::Confirmed);
    assert_eq!(store.pins().await[0].reactions, Some(1));

    remote.fail("add_pin_reaction");
    assert_eq!(store.react_to_pin(pin.id).await, MutationOutcome::RolledBack);
    assert_eq!(store.pins().await[0].reactions, Some(1));
}

#[tokio::test]
async fn avatar_catalog_changes_follow_the_remote() {
    let remote = FlakyRemote::new();
    let store = store_over(&remote);
    store.load_all().await;

    let outcome = store
        .add_avatar(NewAvatar {
            name: "Wizard".into(),
            image: "/avatars/wizard.png".into(),
            price: 10,
            hint: "Casts spells".into(),
        })
        .await;
    assert_eq!(outcome, MutationOutcome::Confirmed);
    let mut wizard = store.avatars().await.pop().unwrap();
    assert_eq!(wizard.name, "Wizard");

    wizard.price = 15;
    assert_eq!(store.update_avatar(wizard.clone()).await, MutationOutcome::Confirmed);
    assert_eq!(store.avatars().await[0].price, 15);

    let rejected = store
        .add_avatar(NewAvatar {
            name: "Broken".into(),
            image: "/avatars/broken.png".into(),
            price: -1,
            hint: String::new(),
        })
        .await;
    assert_eq!(rejected, MutationOutcome::Failed);
    assert_eq!(store.avatars().await.len(), 1);

    // Removal waits for the remote
    remote.fail("delete_avatar");
    assert_eq!(store.remove_avatar(wizard.id).await, MutationOutcome::Failed);
    assert_eq!(store.avatars().await.len(), 1);

    remote.heal("delete_avatar");
    assert_eq!(store.remove_avatar(wizard.id).await, MutationOutcome::Confirmed);
    assert!(store.avatars().await.is_empty());
    assert!(remote.inner.list_avatars().await.unwrap().is_empty());
}

#[tokio::test]
async fn equipping_needs_enough_points_and_spends_none() {
    let remote = FlakyRemote::new();
    let ana = seed_account(&remote, "Ana").await;
    let bruno = seed_account(&remote, "Bruno").await;
    seed_pin(&remote, &bruno, &ana, "one").await;
    seed_pin(&remote, &bruno, &ana, "two").await;
    let cheap = remote
        .inner
        .insert_avatar(NewAvatar {
            name: "Cat".into(),
            image: "/avatars/cat.png".into(),
            price: 2,
            hint: "Meow".into(),
        })
        .await
        .unwrap();
    let pricey = remote
        .inner
        .insert_avatar(NewAvatar {
            name: "Dragon".into(),
            image: "/avatars/dragon.png".into(),
            price: 5,
            hint: String::new(),
        })
        .await
        .unwrap();

    let store = store_over(&remote);
    store.load_all().await;
    store
        .resolve_session(Some(Session {
            uid: ana.uid.clone(),
            email: ana.email.clone(),
            display_name: Some(ana.name.clone()),
        }))
        .await;
    let mut notices = store.notices();

    assert_eq!(store.equip_avatar(pricey.id).await, MutationOutcome::Refused);
    assert_eq!(
        notices.try_recv().unwrap().kind,
        NoticeKind::InsufficientPoints { missing: 3 }
    );
    assert_eq!(store.current_account().await.unwrap().avatar, "");

    assert_eq!(store.equip_avatar(cheap.id).await, MutationOutcome::Confirmed);
    let current = store.current_account().await.unwrap();
    assert_eq!(current.avatar, "/avatars/cat.png");
    assert_eq!(current.hint, "Meow");
    assert_eq!(current.points, 2);

    let stored = remote.inner.find_account_by_email(&ana.email).await.unwrap().unwrap();
    assert_eq!(stored.avatar, "/avatars/cat.png");
    assert_eq!(stored.points, 2);

    remote.fail("set_account_avatar");
    assert_eq!(store.equip_avatar(pricey.id).await, MutationOutcome::Refused);
    let free = remote
        .inner
        .insert_avatar(NewAvatar {
            name: "Default".into(),
            image: "/avatars/default.png".into(),
            price: 0,
            hint: String::new(),
        })
        .await
        .unwrap();
    store.load_snapshot(Collection::Avatars).await.unwrap();
    assert_eq!(store.equip_avatar(free.id).await, MutationOutcome::RolledBack);
    assert_eq!(store.current_account().await.unwrap().avatar, "/avatars/cat.png");
}

#[tokio::test]
async fn leaderboard_ranks_by_points_then_name() {
    let remote = FlakyRemote::new();
    let ana = seed_account(&remote, "Ana").await;
    let bruno = seed_account(&remote, "Bruno").await;
    let carla = seed_account(&remote, "Carla").await;
    seed_pin(&remote, &bruno, &carla, "one").await;
    seed_pin(&remote, &carla, &bruno, "two").await;
    let store = store_over(&remote);
    store.load_all().await;

    store.give_pin(bruno.id, ana.id, "three").await;
    store.give_pin(carla.id, ana.id, "four").await;

    let names: Vec<String> = store.leaderboard().await.into_iter().map(|a| a.name).collect();
    assert_eq!(names, vec!["Ana", "Bruno", "Carla"]);
}

#[tokio::test]
async fn signed_in_account_cannot_be_removed() {
    let remote = FlakyRemote::new();
    let ana = seed_account(&remote, "Ana").await;
    let bruno = seed_account(&remote, "Bruno").await;
    seed_pin(&remote, &bruno, &ana, "kept").await;
    let store = store_over(&remote);
    store.load_all().await;
    store
        .resolve_session(Some(Session {
            uid: ana.uid.clone(),
            email: ana.email.clone(),
            display_name: Some(ana.name.clone()),
        }))
        .await;

    assert_eq!(store.remove_account(ana.id).await, MutationOutcome::Refused);
    assert!(store.account(ana.id).await.is_some());
    assert_eq!(store.pins().await.len(), 1);
    assert_eq!(remote.inner.list_accounts().await.unwrap().len(), 2);
}
