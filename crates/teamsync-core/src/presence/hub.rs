//! Leader-side connection table.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │  PresenceHub (cloneable handle)                                │
//! │  └── tx: mpsc::Sender<HubCommand>                              │
//! │                                                                │
//! │  hub task (sole owner of the table)                            │
//! │  └── connections: member_id -> (conn_id, mpsc::Sender<Event>)  │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each socket handler registers and gets back an [`HubConnection`] whose
//! receiver it drains into the socket. Dropping a sender from the table
//! (replacement, unregister, close_all) closes that receiver, which ends the
//! socket's writer loop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::presence::events::Event;

/// Commands queued to the hub task
const COMMAND_CAPACITY: usize = 256;
/// Outbound events buffered per connection before new ones are dropped
pub const CONNECTION_QUEUE_CAPACITY: usize = 64;

pub type ConnId = u64;

enum HubCommand {
    Register {
        member_id: String,
        conn_id: ConnId,
        sender: mpsc::Sender<Event>,
    },
    Unregister {
        member_id: String,
        conn_id: ConnId,
        reply: oneshot::Sender<bool>,
    },
    Broadcast(Event),
    SendTo {
        member_id: String,
        event: Event,
        reply: oneshot::Sender<bool>,
    },
    Connected {
        reply: oneshot::Sender<Vec<String>>,
    },
    CloseAll,
}

/// A registered connection's end of the table
pub struct HubConnection {
    pub conn_id: ConnId,
    pub receiver: mpsc::Receiver<Event>,
}

#[derive(Clone)]
pub struct PresenceHub {
    tx: mpsc::Sender<HubCommand>,
    next_conn_id: Arc<AtomicU64>,
}

impl PresenceHub {
    /// Spawn the hub task. It stops when the last handle is dropped.
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
        tokio::spawn(run_hub(rx));
        Self {
            tx,
            next_conn_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Register a connection for `member_id`, replacing (and closing) any
    /// older connection of the same member.
    pub async fn register(&self, member_id: &str) -> HubConnection {
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(CONNECTION_QUEUE_CAPACITY);
        self.send(HubCommand::Register {
            member_id: member_id.to_string(),
            conn_id,
            sender,
        })
        .await;
        HubConnection { conn_id, receiver }
    }

    /// Remove `member_id` if its current connection is `conn_id`.
    ///
    /// Returns false when a newer connection already replaced this one, in
    /// which case the member is still online.
    pub async fn unregister(&self, member_id: &str, conn_id: ConnId) -> bool {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Unregister {
            member_id: member_id.to_string(),
            conn_id,
            reply,
        })
        .await;
        rx.await.unwrap_or(false)
    }

    pub async fn broadcast(&self, event: Event) {
        self.send(HubCommand::Broadcast(event)).await;
    }

    /// Returns false if the member is not connected or its queue is full.
    pub async fn send_to(&self, member_id: &str, event: Event) -> bool {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::SendTo {
            member_id: member_id.to_string(),
            event,
            reply,
        })
        .await;
        rx.await.unwrap_or(false)
    }

    /// Ids of connected members, sorted.
    pub async fn connected_members(&self) -> Vec<String> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Connected { reply }).await;
        rx.await.unwrap_or_default()
    }

    /// Drop every connection.
    pub async fn close_all(&self) {
        self.send(HubCommand::CloseAll).await;
    }

    async fn send(&self, cmd: HubCommand) {
        if self.tx.send(cmd).await.is_err() {
            warn!("Presence hub task is gone");
        }
    }
}

async fn run_hub(mut rx: mpsc::Receiver<HubCommand>) {
    let mut connections: HashMap<String, (ConnId, mpsc::Sender<Event>)> = HashMap::new();
    debug!("Presence hub started");

    while let Some(cmd) = rx.recv().await {
        match cmd {
            HubCommand::Register {
                member_id,
                conn_id,
                sender,
            } => {
                if let Some((old, _)) = connections.insert(member_id.clone(), (conn_id, sender)) {
                    info!(%member_id, old_conn = old, new_conn = conn_id, "Replaced presence connection");
                }
            }
            HubCommand::Unregister {
                member_id,
                conn_id,
                reply,
            } => {
                let removed = match connections.get(&member_id) {
                    Some((current, _)) if *current == conn_id => {
                        connections.remove(&member_id);
                        true
                    }
                    _ => false,
                };
                let _ = reply.send(removed);
            }
            HubCommand::Broadcast(event) => {
                for (member_id, (_, sender)) in &connections {
                    deliver(member_id, sender, event.clone());
                }
            }
            HubCommand::SendTo {
                member_id,
                event,
                reply,
            } => {
                let sent = connections
                    .get(&member_id)
                    .map(|(_, sender)| deliver(&member_id, sender, event))
                    .unwrap_or(false);
                let _ = reply.send(sent);
            }
            HubCommand::Connected { reply } => {
                let mut ids: Vec<String> = connections.keys().cloned().collect();
                ids.sort();
                let _ = reply.send(ids);
            }
            HubCommand::CloseAll => {
                info!(count = connections.len(), "Closing all presence connections");
                connections.clear();
            }
        }
    }

    debug!("Presence hub stopped");
}

fn deliver(member_id: &str, sender: &mpsc::Sender<Event>, event: Event) -> bool {
    match sender.try_send(event) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(event)) => {
            warn!(%member_id, event_type = %event.event_type, "Presence queue full, dropping event");
            false
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}
