//! Leader-side handling of one member's presence channel.
//!
//! ```text
//!  wait auth (10 s) ──► check membership ──► auth_result ──► member_online
//!                                                   (plus who else is online)
//!                                                              │
//!        ┌─────────────────────────────────────────────────────┘
//!        ▼
//!  select! {
//!      hub queue   ──► write frame
//!      ping timer  ──► write ping
//!      silence     ──► disconnect
//!      inbound     ──► apply + broadcast, then read the next frame
//!  }
//!        │
//!        ▼
//!  unregister ──► (still current?) member_offline
//! ```
//!
//! Inbound frames are handled one at a time: a frame is fully applied and
//! broadcast before the next is read, giving per-connection FIFO.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::collab::{CodeSnippet, CollaborationService, SessionComment, SharedSession};
use crate::error::{TeamError, TeamResult};
use crate::presence::events::{AuthPayload, AuthResultPayload, Event, EventType, MemberEventPayload};
use crate::presence::hub::PresenceHub;
use crate::team::model::{MemberWorkStatus, TeamMember};
use crate::team::registry::TeamRegistry;

/// How long a new connection has to send its auth frame
pub const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

/// What the socket handler needs from the node
#[derive(Clone)]
pub struct PresenceContext {
    pub registry: TeamRegistry,
    pub hub: PresenceHub,
    pub collab: CollaborationService,
    pub heartbeat_interval: Duration,
    pub heartbeat_timeout: Duration,
}

type WsSender = SplitSink<WebSocket, Message>;

/// Run a presence channel until it closes.
pub async fn serve_socket(mut socket: WebSocket, team_id: String, ctx: PresenceContext) {
    let member = match authenticate(&mut socket, &team_id, &ctx).await {
        Ok(member) => member,
        Err(e) => {
            warn!(%team_id, error = %e, "Presence authentication failed");
            let reply = AuthResultPayload {
                success: false,
                error: Some(e.to_string()),
            };
            if let Ok(event) = Event::new(EventType::AuthResult, &team_id, &reply) {
                let _ = send_event(&mut socket, &event).await;
            }
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    let mut conn = ctx.hub.register(&member.id).await;
    if let Err(e) = ctx.registry.set_member_online(&member.id, true) {
        warn!(member_id = %member.id, error = %e, "Failed to mark member online");
    }

    let ok = AuthResultPayload {
        success: true,
        error: None,
    };
    match Event::new(EventType::AuthResult, &team_id, &ok) {
        Ok(event) => {
            if send_event(&mut socket, &event).await.is_err() {
                close_connection(&team_id, &member, conn.conn_id, &ctx).await;
                return;
            }
        }
        Err(e) => warn!(error = %e, "Failed to build auth result"),
    }

    info!(%team_id, member_id = %member.id, member = %member.name, "Member connected");
    broadcast(&ctx.hub, EventType::MemberOnline, &team_id, &MemberEventPayload::of(&member)).await;
    catch_up_online(&team_id, &member, &ctx).await;

    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut ping = tokio::time::interval(ctx.heartbeat_interval);
    ping.tick().await;
    let mut deadline = Instant::now() + ctx.heartbeat_timeout;

    loop {
        tokio::select! {
            outbound = conn.receiver.recv() => {
                let Some(event) = outbound else {
                    debug!(member_id = %member.id, "Connection replaced or closed by hub");
                    break;
                };
                if write_event(&mut ws_tx, &event).await.is_err() {
                    break;
                }
            }
            _ = ping.tick() => {
                if write_event(&mut ws_tx, &Event::bare(EventType::Ping, &team_id)).await.is_err() {
                    break;
                }
            }
            _ = tokio::time::sleep_until(deadline) => {
                warn!(member_id = %member.id, "Presence heartbeat timeout");
                break;
            }
            inbound = ws_rx.next() => {
                let text = match inbound {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {
                        deadline = Instant::now() + ctx.heartbeat_timeout;
                        continue;
                    }
                };
                deadline = Instant::now() + ctx.heartbeat_timeout;

                let event = match Event::from_text(text.as_str()) {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(member_id = %member.id, error = %e, "Malformed presence frame");
                        continue;
                    }
                };
                if event.event_type == EventType::Ping {
                    if write_event(&mut ws_tx, &Event::bare(EventType::Pong, &team_id)).await.is_err() {
                        break;
                    }
                    continue;
                }
                if let Err(e) = handle_inbound(&team_id, &member, event, &ctx).await {
                    warn!(member_id = %member.id, error = %e, "Rejected presence frame");
                }
            }
        }
    }

    let _ = ws_tx.close().await;
    close_connection(&team_id, &member, conn.conn_id, &ctx).await;
}

async fn authenticate(
    socket: &mut WebSocket,
    team_id: &str,
    ctx: &PresenceContext,
) -> TeamResult<TeamMember> {
    let frame = tokio::time::timeout(AUTH_TIMEOUT, socket.recv())
        .await
        .map_err(|_| TeamError::validation("authentication timed out"))?;
    let text = match frame {
        Some(Ok(Message::Text(text))) => text,
        _ => return Err(TeamError::validation("expected auth frame")),
    };
    let event = Event::from_text(text.as_str())?;
    if event.event_type != EventType::Auth {
        return Err(TeamError::validation(format!(
            "expected auth, got {}",
            event.event_type
        )));
    }
    let auth: AuthPayload = event.parse_payload()?;

    let team = ctx.registry.get(team_id)?;
    if !team.is_leader {
        return Err(TeamError::NotTeamLeader(team_id.to_string()));
    }
    ctx.registry
        .member(&auth.member_id)
        .ok_or(TeamError::NotTeamMember(auth.member_id))
}

/// Apply one member frame through the leader strategy. The authenticated
/// member is stamped over whatever sender the frame claims.
async fn handle_inbound(
    team_id: &str,
    member: &TeamMember,
    event: Event,
    ctx: &PresenceContext,
) -> TeamResult<()> {
    if !event.event_type.accepted_from_member() {
        return Err(TeamError::validation(format!(
            "{} is not accepted from members",
            event.event_type
        )));
    }
    let leader = ctx.collab.leader(team_id)?;

    match event.event_type {
        EventType::MemberStatusChanged => {
            let mut status: MemberWorkStatus = event.parse_payload()?;
            status.member_id = member.id.clone();
            status.member_name = member.name.clone();
            leader.update_work_status(status).await
        }
        EventType::CodeShared => {
            let mut snippet: CodeSnippet = event.parse_payload()?;
            snippet.sender_id = member.id.clone();
            snippet.sender_name = member.name.clone();
            leader.share_code(snippet).await.map(|_| ())
        }
        EventType::SessionShared => {
            let mut session: SharedSession = event.parse_payload()?;
            session.sharer_id = member.id.clone();
            session.sharer_name = member.name.clone();
            leader.share_session(session).await.map(|_| ())
        }
        EventType::CommentAdded => {
            let mut comment: SessionComment = event.parse_payload()?;
            comment.author_id = member.id.clone();
            comment.author_name = member.name.clone();
            leader.add_comment(comment).await.map(|_| ())
        }
        _ => Ok(()),
    }
}

/// Tell a newly connected member who else is online right now.
async fn catch_up_online(team_id: &str, member: &TeamMember, ctx: &PresenceContext) {
    for peer_id in ctx.hub.connected_members().await {
        if peer_id == member.id {
            continue;
        }
        let Some(peer) = ctx.registry.member(&peer_id) else {
            continue;
        };
        match Event::new(EventType::MemberOnline, team_id, &MemberEventPayload::of(&peer)) {
            Ok(event) => {
                if !ctx.hub.send_to(&member.id, event).await {
                    debug!(member_id = %member.id, "Could not queue online catch-up");
                    return;
                }
            }
            Err(e) => warn!(error = %e, "Failed to build presence event"),
        }
    }
}

async fn close_connection(team_id: &str, member: &TeamMember, conn_id: u64, ctx: &PresenceContext) {
    if !ctx.hub.unregister(&member.id, conn_id).await {
        // A newer connection of the same member took over
        return;
    }
    match ctx.registry.set_member_online(&member.id, false) {
        Ok(true) => {
            info!(%team_id, member_id = %member.id, "Member went offline");
            broadcast(&ctx.hub, EventType::MemberOffline, team_id, &MemberEventPayload::of(member)).await;
        }
        Ok(false) => {}
        Err(e) => debug!(member_id = %member.id, error = %e, "Could not mark member offline"),
    }
}

async fn broadcast(hub: &PresenceHub, event_type: EventType, team_id: &str, payload: &MemberEventPayload) {
    match Event::new(event_type, team_id, payload) {
        Ok(event) => hub.broadcast(event).await,
        Err(e) => warn!(%event_type, error = %e, "Failed to build presence event"),
    }
}

async fn send_event(socket: &mut WebSocket, event: &Event) -> TeamResult<()> {
    socket
        .send(Message::Text(event.to_text()?.into()))
        .await
        .map_err(|e| TeamError::PeerUnavailable(e.to_string()))
}

async fn write_event(ws_tx: &mut WsSender, event: &Event) -> TeamResult<()> {
    ws_tx
        .send(Message::Text(event.to_text()?.into()))
        .await
        .map_err(|e| TeamError::PeerUnavailable(e.to_string()))
}
