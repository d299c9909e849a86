use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use pinboard_types::events::{ChangeKind, RealtimeCommand, RealtimeEvent, Table, TableChange};

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

type Subscriptions = Arc<std::sync::RwLock<HashSet<Table>>>;

/// Serve one realtime connection: relay table changes for the tables the
/// client subscribed to (all of them until it says otherwise).
pub async fn handle_connection(socket: WebSocket, dispatcher: Dispatcher) {
    let (mut sender, mut receiver) = socket.split();

    let subscriptions: Subscriptions = Arc::new(std::sync::RwLock::new(Table::ALL.into_iter().collect()));

    // Subscribe before announcing Ready so nothing published after Ready is missed
    let mut broadcast_rx = dispatcher.subscribe();

    if send_event(&mut sender, &RealtimeEvent::Ready { tables: Table::ALL.to_vec() })
        .await
        .is_err()
    {
        return;
    }

    info!("Realtime client connected ({} subscribers)", dispatcher.subscriber_count());

    let send_subscriptions = subscriptions.clone();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward changes -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let Some(changes) = changes_to_relay(result, &send_subscriptions) else {
                        break;
                    };

                    let mut failed = false;
                    for change in changes {
                        if send_event(&mut sender, &RealtimeEvent::Change(change)).await.is_err() {
                            failed = true;
                            break;
                        }
                    }
                    if failed {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let recv_subscriptions = subscriptions.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<RealtimeCommand>(&text) {
                    Ok(cmd) => handle_command(cmd, &recv_subscriptions),
                    Err(e) => {
                        let raw: String = text.chars().take(200).collect();
                        warn!("Bad realtime command: {} -- raw: {}", e, raw);
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!("Realtime client disconnected");
}

fn handle_command(cmd: RealtimeCommand, subscriptions: &Subscriptions) {
    match cmd {
        RealtimeCommand::Subscribe { tables } => {
            debug!("Realtime client subscribing to {:?}", tables);
            match subscriptions.write() {
                Ok(mut subs) => *subs = tables.into_iter().collect(),
                Err(e) => warn!("Subscription lock poisoned: {}", e),
            }
        }
    }
}

/// What one broadcast receive turns into on the wire. A lagged receiver has
/// lost an unknown set of changes, so every subscribed table gets a
/// whole-table update instead. `None` once the dispatcher is gone.
fn changes_to_relay(
    result: Result<TableChange, RecvError>,
    subscriptions: &Subscriptions,
) -> Option<Vec<TableChange>> {
    match result {
        Ok(change) if is_subscribed(subscriptions, &change) => Some(vec![change]),
        Ok(_) => Some(Vec::new()),
        Err(RecvError::Lagged(n)) => {
            warn!("Realtime receiver lagged by {} changes, resyncing subscribed tables", n);
            let subs = subscriptions.read().map(|subs| subs.clone()).unwrap_or_default();
            Some(
                Table::ALL
                    .into_iter()
                    .filter(|t| subs.contains(t))
                    .map(|t| TableChange::whole_table(t, ChangeKind::Update))
                    .collect(),
            )
        }
        Err(RecvError::Closed) => None,
    }
}

fn is_subscribed(subscriptions: &Subscriptions, change: &TableChange) -> bool {
    subscriptions
        .read()
        .map(|subs| subs.contains(&change.table))
        .unwrap_or(false)
}

async fn send_event(
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    event: &RealtimeEvent,
) -> Result<(), ()> {
    let text = serde_json::to_string(event).map_err(|e| warn!("Failed to encode realtime event: {}", e))?;
    sender.send(Message::Text(text.into())).await.map_err(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscribed(tables: &[Table]) -> Subscriptions {
        Arc::new(std::sync::RwLock::new(tables.iter().copied().collect()))
    }

    #[tokio::test]
    async fn test_lagged_receiver_resyncs_subscribed_tables() {
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe();
        let subs = subscribed(&[Table::Pins, Table::Accounts]);

        // Overflow the buffer so the oldest changes are gone
        for i in 0..1100 {
            dispatcher.publish(TableChange::new(Table::Avatars, ChangeKind::Insert, i));
        }

        let changes = changes_to_relay(rx.recv().await, &subs).unwrap();
        assert_eq!(
            changes,
            vec![
                TableChange::whole_table(Table::Accounts, ChangeKind::Update),
                TableChange::whole_table(Table::Pins, ChangeKind::Update),
            ]
        );
    }

    #[tokio::test]
    async fn test_unsubscribed_changes_are_filtered() {
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe();
        let subs = subscribed(&[Table::Pins]);

        dispatcher.publish(TableChange::new(Table::Avatars, ChangeKind::Insert, "a1"));
        dispatcher.publish(TableChange::new(Table::Pins, ChangeKind::Delete, "p1"));

        assert!(changes_to_relay(rx.recv().await, &subs).unwrap().is_empty());
        let relayed = changes_to_relay(rx.recv().await, &subs).unwrap();
        assert_eq!(relayed, vec![TableChange::new(Table::Pins, ChangeKind::Delete, "p1")]);
    }

    #[test]
    fn test_closed_dispatcher_ends_relay() {
        assert!(changes_to_relay(Err(RecvError::Closed), &subscribed(&[Table::Pins])).is_none());
    }
}
