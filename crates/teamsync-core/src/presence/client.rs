//! Member-side presence channel.
//!
//! ```text
//! ┌──────────────┐  connect ws://{leader}/team/{id}/ws   ┌──────────────┐
//! │PresenceClient│ ───────────────────────────────────► │ leader hub   │
//! │              │  auth{member_id, member_name, ep}     │              │
//! │              │ ◄─────────────── auth_result ──────── │              │
//! │              │ ◄──────────── events (FIFO) ───────── │              │
//! │   EventSink  │                                       │              │
//! └──────────────┘                                       └──────────────┘
//!        │ closed / heartbeat timeout
//!        └──► sleep(backoff) ──► reconnect, backoff doubles up to the max
//! ```
//!
//! The loop runs until its [`CancellationToken`] fires or the sink asks it to
//! stop (the team was dissolved).

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{TeamError, TeamResult};
use crate::presence::events::{AuthPayload, AuthResultPayload, Event, EventType};
use crate::types::ws_url;

/// Receives everything the leader pushes to this member.
pub trait EventSink: Send + Sync {
    /// The channel authenticated.
    fn connected(&self) {}

    /// The channel dropped; a reconnect will follow unless stopped.
    fn disconnected(&self) {}

    /// Apply one event. `Break` stops the client for good.
    fn handle(&self, event: Event) -> ControlFlow<()>;
}

#[derive(Debug, Clone)]
pub struct PresenceSettings {
    pub leader_endpoint: String,
    pub team_id: String,
    pub auth: AuthPayload,
    pub heartbeat_interval: Duration,
    pub heartbeat_timeout: Duration,
    pub reconnect_min: Duration,
    pub reconnect_max: Duration,
}

impl PresenceSettings {
    pub fn new(config: &Config, leader_endpoint: &str, team_id: &str, auth: AuthPayload) -> Self {
        Self {
            leader_endpoint: leader_endpoint.to_string(),
            team_id: team_id.to_string(),
            auth,
            heartbeat_interval: config.heartbeat_interval,
            heartbeat_timeout: config.heartbeat_timeout,
            reconnect_min: config.reconnect_min,
            reconnect_max: config.reconnect_max,
        }
    }
}

/// How a single connection attempt ended
enum Session {
    /// Authenticated, then lost the connection
    Dropped,
    /// Cancelled or told to stop
    Stop,
}

/// Handle to the background connection loop
pub struct PresenceClient {
    team_id: String,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PresenceClient {
    pub fn spawn(settings: PresenceSettings, sink: Arc<dyn EventSink>) -> Self {
        let cancel = CancellationToken::new();
        let team_id = settings.team_id.clone();
        let task = tokio::spawn(run(settings, sink, cancel.clone()));
        Self {
            team_id,
            cancel,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn team_id(&self) -> &str {
        &self.team_id
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }

    /// Stop the loop and wait for it to exit.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
        debug!(team_id = %self.team_id, "Presence client stopped");
    }
}

impl Drop for PresenceClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run(settings: PresenceSettings, sink: Arc<dyn EventSink>, cancel: CancellationToken) {
    let mut backoff = settings.reconnect_min;
    loop {
        if cancel.is_cancelled() {
            break;
        }

        match connect_once(&settings, sink.as_ref(), &cancel).await {
            Ok(Session::Stop) => break,
            Ok(Session::Dropped) => {
                backoff = settings.reconnect_min;
                sink.disconnected();
            }
            Err(e) => {
                debug!(team_id = %settings.team_id, error = %e, "Presence connect failed");
                sink.disconnected();
            }
        }

        debug!(delay_ms = backoff.as_millis() as u64, "Reconnecting presence channel");
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(backoff) => {}
        }
        backoff = (backoff * 2).min(settings.reconnect_max);
    }
    info!(team_id = %settings.team_id, "Presence loop exited");
}

async fn connect_once(
    settings: &PresenceSettings,
    sink: &dyn EventSink,
    cancel: &CancellationToken,
) -> TeamResult<Session> {
    let url = ws_url(
        &settings.leader_endpoint,
        &format!("/team/{}/ws", settings.team_id),
    );
    let (ws, _response) = tokio::select! {
        _ = cancel.cancelled() => return Ok(Session::Stop),
        r = connect_async(url.as_str()) => r.map_err(|e| {
            TeamError::LeaderUnavailable(format!("{}: {}", settings.leader_endpoint, e))
        })?,
    };
    let (mut write, mut read) = ws.split();

    let auth = Event::new(EventType::Auth, &settings.team_id, &settings.auth)?;
    write
        .send(Message::Text(auth.to_text()?.into()))
        .await
        .map_err(|e| TeamError::LeaderUnavailable(e.to_string()))?;

    // First answer must be the auth result
    let reply = tokio::time::timeout(settings.heartbeat_timeout, read.next())
        .await
        .map_err(|_| TeamError::LeaderUnavailable("timed out waiting for auth result".into()))?;
    let result: AuthResultPayload = match reply {
        Some(Ok(Message::Text(text))) => {
            let event = Event::from_text(text.as_str())?;
            if event.event_type != EventType::AuthResult {
                return Err(TeamError::validation(format!(
                    "expected auth_result, got {}",
                    event.event_type
                )));
            }
            event.parse_payload()?
        }
        Some(Ok(other)) => {
            return Err(TeamError::validation(format!("unexpected frame during auth: {:?}", other)))
        }
        Some(Err(e)) => return Err(TeamError::LeaderUnavailable(e.to_string())),
        None => return Err(TeamError::LeaderUnavailable("closed during auth".into())),
    };
    if !result.success {
        warn!(
            team_id = %settings.team_id,
            error = ?result.error,
            "Presence authentication rejected"
        );
        return Err(TeamError::NotTeamMember(
            result.error.unwrap_or_else(|| settings.auth.member_id.clone()),
        ));
    }

    info!(team_id = %settings.team_id, leader = %settings.leader_endpoint, "Presence channel connected");
    sink.connected();

    let mut ping = tokio::time::interval(settings.heartbeat_interval);
    ping.tick().await;
    let mut deadline = Instant::now() + settings.heartbeat_timeout;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                return Ok(Session::Stop);
            }
            _ = tokio::time::sleep_until(deadline) => {
                warn!(team_id = %settings.team_id, "Presence heartbeat timeout");
                return Ok(Session::Dropped);
            }
            _ = ping.tick() => {
                let frame = Event::bare(EventType::Ping, &settings.team_id).to_text()?;
                if write.send(Message::Text(frame.into())).await.is_err() {
                    return Ok(Session::Dropped);
                }
            }
            next = read.next() => {
                let msg = match next {
                    None | Some(Err(_)) | Some(Ok(Message::Close(_))) => {
                        info!(team_id = %settings.team_id, "Presence channel closed");
                        return Ok(Session::Dropped);
                    }
                    Some(Ok(msg)) => msg,
                };
                deadline = Instant::now() + settings.heartbeat_timeout;

                let Message::Text(text) = msg else {
                    continue;
                };
                let event = match Event::from_text(text.as_str()) {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(error = %e, "Ignoring malformed presence frame");
                        continue;
                    }
                };
                match event.event_type {
                    EventType::Ping => {
                        let pong = Event::bare(EventType::Pong, &settings.team_id).to_text()?;
                        if write.send(Message::Text(pong.into())).await.is_err() {
                            return Ok(Session::Dropped);
                        }
                    }
                    EventType::Pong => {}
                    _ => {
                        if sink.handle(event).is_break() {
                            let _ = write.send(Message::Close(None)).await;
                            return Ok(Session::Stop);
                        }
                    }
                }
            }
        }
    }
}
