//! Team lifecycle: create, join, leave, dissolve, and the leader-side
//! membership handlers.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │  TeamService                                                         │
//! │  ├── registry: TeamRegistry        (the one team record)             │
//! │  ├── collab: CollaborationService  (strategy picked per role)        │
//! │  ├── skills: SkillSyncService      (index cache, published copies)   │
//! │  ├── leader role                                                     │
//! │  │   ├── hub: PresenceHub          (member channels)                 │
//! │  │   └── advertiser: TeamAdvertiser (mDNS)                           │
//! │  └── member role                                                     │
//! │      └── presence: PresenceClient → MirrorSink                       │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The role is fixed when the team record is installed (create, join or
//! restore) and is never re-evaluated per call.

use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::collab::store::remove_team_files;
use crate::collab::{CollaborationService, LeaderCollab, MemberCollab};
use crate::config::Config;
use crate::error::{TeamError, TeamResult};
use crate::identity::{Identity, IdentityStore};
use crate::network::{NetworkManager, TeamAdvertiser};
use crate::presence::client::{PresenceClient, PresenceSettings};
use crate::presence::events::{AuthPayload, Event, EventType, MemberEventPayload};
use crate::presence::hub::PresenceHub;
use crate::presence::sink::{MirrorSink, LOCAL_EVENT_CAPACITY};
use crate::skill::sync::SkillSyncService;
use crate::storage::Storage;
use crate::team::client::MembershipClient;
use crate::team::model::{
    CreateTeamRequest, JoinRequest, JoinResponse, LeaveRequest, Team, TeamInfo, TeamMember,
};
use crate::team::registry::{TeamRegistry, UpsertOutcome};
use crate::types::{new_id, normalize_endpoint, now};

/// Everything `TeamService` needs from the rest of the node
#[derive(Clone)]
pub struct TeamServiceDeps {
    pub config: Config,
    pub storage: Storage,
    pub identity: IdentityStore,
    pub registry: TeamRegistry,
    pub hub: PresenceHub,
    pub client: MembershipClient,
    pub network: NetworkManager,
    pub collab: CollaborationService,
    pub skills: Arc<SkillSyncService>,
}

pub struct TeamService {
    config: Config,
    storage: Storage,
    identity: IdentityStore,
    registry: TeamRegistry,
    hub: PresenceHub,
    client: MembershipClient,
    network: NetworkManager,
    collab: CollaborationService,
    skills: Arc<SkillSyncService>,
    events: broadcast::Sender<Event>,
    presence: Mutex<Option<PresenceClient>>,
    advertiser: Mutex<Option<TeamAdvertiser>>,
}

impl TeamService {
    pub fn new(deps: TeamServiceDeps) -> Self {
        let (events, _) = broadcast::channel(LOCAL_EVENT_CAPACITY);
        Self {
            config: deps.config,
            storage: deps.storage,
            identity: deps.identity,
            registry: deps.registry,
            hub: deps.hub,
            client: deps.client,
            network: deps.network,
            collab: deps.collab,
            skills: deps.skills,
            events,
            presence: Mutex::new(None),
            advertiser: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &TeamRegistry {
        &self.registry
    }

    /// Events received from the leader, for local consumers.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub fn list_teams(&self) -> Vec<Team> {
        self.registry.list_teams()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Local Operations
    // ═══════════════════════════════════════════════════════════════════════

    /// Create a team led by this node.
    pub async fn create_team(&self, request: CreateTeamRequest) -> TeamResult<Team> {
        let identity = self.identity.get()?;
        let name = request.name.trim();
        if name.is_empty() {
            return Err(TeamError::validation("team name is required"));
        }
        if let Some(existing) = self.registry.current() {
            return Err(TeamError::TeamAlreadyExists(existing.id));
        }

        if request.interface.is_some() || request.ip.is_some() {
            self.network.set_config(request.interface, request.ip)?;
        }
        let endpoint = self.network.endpoint()?;

        let ts = now();
        let team = Team {
            id: new_id(),
            name: name.to_string(),
            leader_id: identity.id.clone(),
            leader_name: identity.name.clone(),
            leader_endpoint: endpoint.clone(),
            is_leader: true,
            leader_online: true,
            member_count: 1,
            created_at: ts,
            joined_at: ts,
        };
        let leader = TeamMember::new(&identity.id, &identity.name, &endpoint, true);
        self.registry.install_leader_team(team.clone(), leader)?;

        self.become_leader(&team).await?;
        info!(team_id = %team.id, name = %team.name, %endpoint, "Team created");
        self.registry.get(&team.id)
    }

    /// Join the team led at `leader_endpoint`.
    ///
    /// Joining the team already held succeeds again and refreshes this
    /// node's endpoint on the leader.
    pub async fn join_team(&self, leader_endpoint: &str) -> TeamResult<Team> {
        let identity = self.identity.get()?;
        let leader_endpoint = normalize_endpoint(leader_endpoint);
        if leader_endpoint.is_empty() {
            return Err(TeamError::validation("leader endpoint is required"));
        }

        let info = self.client.fetch_team_info(&leader_endpoint).await?;
        let team_id = info.team.id.clone();

        let held = self.registry.current();
        if let Some(current) = &held {
            if current.id != team_id {
                return Err(TeamError::AlreadyInTeam(current.id.clone()));
            }
            if current.is_leader {
                return Ok(current.clone());
            }
        }

        let my_endpoint = self.network.endpoint_towards(&leader_endpoint)?;
        let request = JoinRequest {
            member_id: identity.id.clone(),
            member_name: identity.name.clone(),
            endpoint: my_endpoint.clone(),
        };
        let response = self.client.join(&leader_endpoint, &team_id, &request).await?;

        let mut team = response.team;
        team.leader_endpoint = leader_endpoint.clone();
        self.registry.install_member_team(team.clone(), response.members)?;
        if let Some(index) = &response.skill_index {
            self.skills.cache_index(index)?;
        }

        let already_connected = self
            .presence
            .lock()
            .await
            .as_ref()
            .is_some_and(|p| p.team_id() == team_id && p.is_running());
        if held.is_some() && already_connected {
            debug!(%team_id, "Re-joined team, presence channel already up");
        } else {
            self.become_member(&team, &identity, &my_endpoint).await;
        }

        info!(%team_id, leader = %leader_endpoint, rejoin = held.is_some(), "Joined team");
        self.registry.get(&team_id)
    }

    /// Leave a team as a member. The leader is told on a best-effort basis.
    pub async fn leave_team(&self, team_id: &str) -> TeamResult<()> {
        let team = self.registry.get(team_id)?;
        if team.is_leader {
            return Err(TeamError::LeaderCannotLeave);
        }
        let identity = self.identity.get()?;

        if let Err(e) = self
            .client
            .leave(&team.leader_endpoint, team_id, &identity.id)
            .await
        {
            warn!(%team_id, error = %e, "Could not notify leader of leave");
        }

        self.stop_presence().await;
        self.collab.clear();
        self.skills.clear_team(team_id)?;
        self.registry.clear(team_id)?;
        info!(%team_id, "Left team");
        Ok(())
    }

    /// Dissolve a team this node leads.
    pub async fn dissolve_team(&self, team_id: &str) -> TeamResult<()> {
        let team = self.registry.get(team_id)?;
        if !team.is_leader {
            return Err(TeamError::NotTeamLeader(team_id.to_string()));
        }

        self.hub.broadcast(Event::bare(EventType::TeamDissolved, team_id)).await;
        self.hub.close_all().await;
        self.stop_advertiser().await;

        self.collab.clear();
        self.skills.clear_team(team_id)?;
        remove_team_files(&self.storage, team_id)?;
        self.registry.clear(team_id)?;
        info!(%team_id, "Team dissolved");
        Ok(())
    }

    /// Member list; members ask the leader and refresh their mirror.
    pub async fn get_team_members(&self, team_id: &str) -> TeamResult<Vec<TeamMember>> {
        let team = self.registry.get(team_id)?;
        if team.is_leader {
            return Ok(self.registry.members());
        }
        let members = self.client.members(&team.leader_endpoint, team_id).await?;
        self.registry.replace_members(members.clone())?;
        Ok(members)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Leader Handlers
    // ═══════════════════════════════════════════════════════════════════════

    /// `GET /team/info`: only a leader advertises its team.
    pub fn team_info(&self, team_id: Option<&str>) -> TeamResult<TeamInfo> {
        let team = match team_id {
            Some(id) => self.registry.get(id)?,
            None => self
                .registry
                .current()
                .ok_or_else(|| TeamError::TeamNotFound("no active team".into()))?,
        };
        if !team.is_leader {
            return Err(TeamError::NotTeamLeader(team.id));
        }
        Ok(TeamInfo {
            team,
            members: self.registry.members(),
        })
    }

    pub async fn handle_join_request(&self, team_id: &str, request: JoinRequest) -> TeamResult<JoinResponse> {
        let member_id = request.member_id.trim();
        let member_name = request.member_name.trim();
        let endpoint = normalize_endpoint(&request.endpoint);
        if member_id.is_empty() || member_name.is_empty() || endpoint.is_empty() {
            return Err(TeamError::validation(
                "member_id, member_name and endpoint are required",
            ));
        }

        let team = self.registry.get(team_id)?;
        if !team.is_leader {
            return Err(TeamError::NotTeamLeader(team_id.to_string()));
        }

        let member = TeamMember::new(member_id, member_name, &endpoint, false);
        match self.registry.upsert_member(member.clone())? {
            UpsertOutcome::Added => {
                info!(%team_id, %member_id, member = %member_name, %endpoint, "Member joined");
                self.broadcast_member(EventType::MemberJoined, team_id, &member).await;
                self.readvertise(team_id).await;
            }
            UpsertOutcome::Refreshed => {
                debug!(%team_id, %member_id, %endpoint, "Member re-joined");
            }
        }

        Ok(JoinResponse {
            team: self.registry.get(team_id)?,
            members: self.registry.members(),
            skill_index: Some(self.skills.local_index(team_id)?),
        })
    }

    pub async fn handle_leave_request(&self, team_id: &str, request: LeaveRequest) -> TeamResult<()> {
        let team = self.registry.get(team_id)?;
        if !team.is_leader {
            return Err(TeamError::NotTeamLeader(team_id.to_string()));
        }
        if request.member_id == team.leader_id {
            return Err(TeamError::LeaderCannotLeave);
        }
        let member = self
            .registry
            .member(&request.member_id)
            .ok_or_else(|| TeamError::NotTeamMember(request.member_id.clone()))?;

        self.registry.remove_member(&member.id)?;
        info!(%team_id, member_id = %member.id, "Member left");
        self.broadcast_member(EventType::MemberLeft, team_id, &member).await;
        self.readvertise(team_id).await;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Lifecycle
    // ═══════════════════════════════════════════════════════════════════════

    /// Bring the persisted role back up after a restart.
    pub async fn restore(&self) -> TeamResult<()> {
        let Some(team) = self.registry.current() else {
            return Ok(());
        };

        if team.is_leader {
            // Everyone reconnects; until then nobody but us is online
            for member in self.registry.members().into_iter().filter(|m| !m.is_leader) {
                self.registry.set_member_online(&member.id, false)?;
            }
            self.become_leader(&team).await?;
        } else {
            let identity = self.identity.get()?;
            self.registry.set_leader_online(false)?;
            let endpoint = match self.registry.member(&identity.id) {
                Some(me) => me.endpoint,
                None => self.network.endpoint_towards(&team.leader_endpoint)?,
            };
            self.become_member(&team, &identity, &endpoint).await;
        }
        info!(team_id = %team.id, is_leader = team.is_leader, "Team restored");
        Ok(())
    }

    /// Stop background tasks.
    pub async fn shutdown(&self) {
        self.stop_presence().await;
        self.stop_advertiser().await;
        self.hub.close_all().await;
    }

    async fn become_leader(&self, team: &Team) -> TeamResult<()> {
        let leader = LeaderCollab::load(
            &team.id,
            self.storage.clone(),
            self.registry.clone(),
            self.hub.clone(),
        )?;
        self.collab.select(Arc::new(leader));

        if !self.config.discovery {
            return Ok(());
        }
        // Discovery is advisory; a host without multicast still leads the team
        match TeamAdvertiser::start(team) {
            Ok(advertiser) => {
                if let Some(old) = self.advertiser.lock().await.replace(advertiser) {
                    old.stop();
                }
            }
            Err(e) => warn!(team_id = %team.id, error = %e, "mDNS advertiser unavailable"),
        }
        Ok(())
    }

    async fn become_member(&self, team: &Team, identity: &Identity, my_endpoint: &str) {
        self.collab.select(Arc::new(MemberCollab::new(
            &team.id,
            self.registry.clone(),
            self.client.clone(),
        )));

        let settings = PresenceSettings::new(
            &self.config,
            &team.leader_endpoint,
            &team.id,
            AuthPayload {
                member_id: identity.id.clone(),
                member_name: identity.name.clone(),
                endpoint: my_endpoint.to_string(),
            },
        );
        let sink = MirrorSink::new(
            &team.id,
            self.registry.clone(),
            self.skills.clone(),
            self.collab.clone(),
            self.events.clone(),
        );
        let client = PresenceClient::spawn(settings, Arc::new(sink));
        if let Some(old) = self.presence.lock().await.replace(client) {
            old.stop().await;
        }
    }

    async fn stop_presence(&self) {
        let client = self.presence.lock().await.take();
        if let Some(client) = client {
            client.stop().await;
        }
    }

    async fn stop_advertiser(&self) {
        if let Some(advertiser) = self.advertiser.lock().await.take() {
            advertiser.stop();
        }
    }

    /// Push the current member count into the mDNS record.
    async fn readvertise(&self, team_id: &str) {
        let advertiser = self.advertiser.lock().await;
        let Some(advertiser) = advertiser.as_ref() else {
            return;
        };
        let updated = self
            .registry
            .get(team_id)
            .and_then(|team| advertiser.update(&team));
        if let Err(e) = updated {
            warn!(%team_id, error = %e, "Failed to update mDNS record");
        }
    }

    async fn broadcast_member(&self, event_type: EventType, team_id: &str, member: &TeamMember) {
        match Event::new(event_type, team_id, &MemberEventPayload::of(member)) {
            Ok(event) => self.hub.broadcast(event).await,
            Err(e) => warn!(%event_type, error = %e, "Failed to build member event"),
        }
    }
}
