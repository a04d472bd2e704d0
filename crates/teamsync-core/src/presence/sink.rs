//! Applies leader events to a member's local mirror.

use std::ops::ControlFlow;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::collab::CollaborationService;
use crate::error::TeamResult;
use crate::presence::client::EventSink;
use crate::presence::events::{Event, EventType, MemberEventPayload};
use crate::skill::sync::SkillSyncService;
use crate::team::model::MemberWorkStatus;
use crate::team::registry::TeamRegistry;

/// Capacity of the local event fan-out
pub const LOCAL_EVENT_CAPACITY: usize = 256;

pub struct MirrorSink {
    team_id: String,
    registry: TeamRegistry,
    skills: Arc<SkillSyncService>,
    collab: CollaborationService,
    events: broadcast::Sender<Event>,
}

impl MirrorSink {
    pub fn new(
        team_id: &str,
        registry: TeamRegistry,
        skills: Arc<SkillSyncService>,
        collab: CollaborationService,
        events: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            team_id: team_id.to_string(),
            registry,
            skills,
            collab,
            events,
        }
    }

    fn apply(&self, event: &Event) -> TeamResult<()> {
        match event.event_type {
            EventType::MemberJoined => {
                let payload: MemberEventPayload = event.parse_payload()?;
                if let Some(member) = payload.member {
                    self.registry.upsert_member(member)?;
                }
            }
            EventType::MemberLeft => {
                let payload: MemberEventPayload = event.parse_payload()?;
                self.registry.remove_member(&payload.member_id)?;
            }
            EventType::MemberOnline | EventType::MemberOffline => {
                let payload: MemberEventPayload = event.parse_payload()?;
                let online = event.event_type == EventType::MemberOnline;
                self.registry.set_member_online(&payload.member_id, online)?;
            }
            EventType::MemberStatusChanged => {
                let status: MemberWorkStatus = event.parse_payload()?;
                self.registry.set_work_status(status)?;
            }
            EventType::SkillPublished | EventType::SkillUpdated | EventType::SkillDeleted => {
                self.skills.apply_skill_event(event)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn dissolve(&self) {
        info!(team_id = %self.team_id, "Team dissolved by leader");
        self.collab.clear();
        if let Err(e) = self.skills.clear_team(&self.team_id) {
            warn!(error = %e, "Failed to clear skill state of dissolved team");
        }
        if let Err(e) = self.registry.clear(&self.team_id) {
            warn!(error = %e, "Failed to clear dissolved team");
        }
    }
}

impl EventSink for MirrorSink {
    fn connected(&self) {
        if let Err(e) = self.registry.set_leader_online(true) {
            debug!(error = %e, "Could not mark leader online");
        }
    }

    fn disconnected(&self) {
        if let Err(e) = self.registry.set_leader_online(false) {
            debug!(error = %e, "Could not mark leader offline");
        }
    }

    fn handle(&self, event: Event) -> ControlFlow<()> {
        if event.team_id != self.team_id {
            warn!(expected = %self.team_id, got = %event.team_id, "Event for another team");
            return ControlFlow::Continue(());
        }

        if event.event_type == EventType::TeamDissolved {
            self.dissolve();
            let _ = self.events.send(event);
            return ControlFlow::Break(());
        }

        if let Err(e) = self.apply(&event) {
            warn!(event_type = %event.event_type, error = %e, "Failed to apply presence event");
        }
        // No local subscribers is fine
        let _ = self.events.send(event);
        ControlFlow::Continue(())
    }
}
