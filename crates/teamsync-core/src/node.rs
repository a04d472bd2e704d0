//! A running teamsync node: every service wired together behind one router.

use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::info;

use crate::collab::{CollaborationService, FileDailySummaryStore};
use crate::config::Config;
use crate::error::TeamResult;
use crate::identity::IdentityStore;
use crate::network::NetworkManager;
use crate::presence::{Event, PresenceContext, PresenceHub};
use crate::report::{FileWeeklyStatsProvider, WeeklyReportDeps, WeeklyReportService};
use crate::server::{self, AppState};
use crate::skill::{SkillSyncDeps, SkillSyncService};
use crate::storage::Storage;
use crate::team::{MembershipClient, TeamRegistry, TeamService, TeamServiceDeps};

/// Directory (under the data dir) holding this node's own daily summaries
pub const DAILY_SUMMARIES_DIR: &str = "daily-summaries";
/// Directory (under the data dir) holding this node's recorded activity,
/// one `{date}.json` per day
pub const ACTIVITY_DIR: &str = "activity";

#[derive(Clone)]
pub struct TeamNode {
    state: AppState,
    storage: Storage,
    registry: TeamRegistry,
}

impl TeamNode {
    /// Build every service from `config` and bring back persisted state.
    pub async fn new(config: Config) -> TeamResult<Self> {
        info!(data_dir = ?config.data_dir, "Initializing TeamNode");
        let storage = Storage::new(&config.data_dir)?;
        let identity = IdentityStore::load(storage.clone())?;
        let registry = TeamRegistry::load(storage.clone())?;
        let network = NetworkManager::load(storage.clone(), config.port)?;
        let hub = PresenceHub::spawn();
        let client = MembershipClient::new(&config);

        let summaries = Arc::new(FileDailySummaryStore::new(
            config.data_dir.join(DAILY_SUMMARIES_DIR),
        ));
        let collab = CollaborationService::new(identity.clone(), summaries.clone());
        let reports = Arc::new(WeeklyReportService::new(WeeklyReportDeps {
            storage: storage.clone(),
            identity: identity.clone(),
            registry: registry.clone(),
            collab: collab.clone(),
            client: client.clone(),
            provider: Arc::new(FileWeeklyStatsProvider::new(
                config.data_dir.join(ACTIVITY_DIR),
                summaries,
            )),
        }));
        let skills = Arc::new(SkillSyncService::new(SkillSyncDeps {
            storage: storage.clone(),
            identity: identity.clone(),
            registry: registry.clone(),
            hub: hub.clone(),
            client: client.clone(),
            network: network.clone(),
            skills_dir: config.skills_dir.clone(),
        })?);
        let teams = Arc::new(TeamService::new(TeamServiceDeps {
            config: config.clone(),
            storage: storage.clone(),
            identity: identity.clone(),
            registry: registry.clone(),
            hub: hub.clone(),
            client,
            network: network.clone(),
            collab: collab.clone(),
            skills: skills.clone(),
        }));

        let presence = PresenceContext {
            registry: registry.clone(),
            hub,
            collab: collab.clone(),
            heartbeat_interval: config.heartbeat_interval,
            heartbeat_timeout: config.heartbeat_timeout,
        };

        skills.restore()?;
        teams.restore().await?;

        Ok(Self {
            state: AppState {
                config: Arc::new(config),
                identity,
                network,
                teams,
                collab,
                skills,
                presence,
                reports,
            },
            storage,
            registry,
        })
    }

    pub fn data_dir(&self) -> &Path {
        self.storage.root()
    }

    pub fn config(&self) -> &Config {
        &self.state.config
    }

    pub fn identity(&self) -> &IdentityStore {
        &self.state.identity
    }

    pub fn registry(&self) -> &TeamRegistry {
        &self.registry
    }

    pub fn network(&self) -> &NetworkManager {
        &self.state.network
    }

    pub fn teams(&self) -> &Arc<TeamService> {
        &self.state.teams
    }

    pub fn collab(&self) -> &CollaborationService {
        &self.state.collab
    }

    pub fn skills(&self) -> &Arc<SkillSyncService> {
        &self.state.skills
    }

    pub fn reports(&self) -> &Arc<WeeklyReportService> {
        &self.state.reports
    }

    /// Events pushed by the leader to this node.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.state.teams.subscribe()
    }

    pub fn router(&self) -> Router {
        server::router(self.state.clone())
    }

    /// Bind the HTTP listener. The bound port becomes the advertised one.
    pub async fn bind(&self, addr: &str) -> TeamResult<TcpListener> {
        let listener = TcpListener::bind(addr).await?;
        let local: SocketAddr = listener.local_addr()?;
        self.state.network.set_port(local.port());
        info!(%local, "HTTP listener bound");
        Ok(listener)
    }

    /// Serve until `shutdown` resolves, then stop background tasks.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> TeamResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        info!(%addr, "Teamsync node serving");

        // Presence sockets hold their connections open; close them first so
        // the graceful drain can finish
        let node = self.clone();
        let stop = async move {
            shutdown.await;
            info!("Shutdown requested");
            node.shutdown().await;
        };
        axum::serve(listener, self.router())
            .with_graceful_shutdown(stop)
            .await?;
        info!("Teamsync node stopped");
        Ok(())
    }

    /// Stop the presence client, the mDNS advertiser and hub connections.
    pub async fn shutdown(&self) {
        self.state.teams.shutdown().await;
    }
}
