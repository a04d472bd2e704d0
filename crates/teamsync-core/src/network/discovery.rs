//! LAN team discovery over mDNS.
//!
//! A leader registers one `_teamsync._tcp.local.` service for its team.
//! The TXT record carries everything a joiner needs before calling the
//! leader: `team_id`, `name`, `leader_name`, `endpoint`, `member_count` and
//! `version`. Discovery is advisory: it never changes local state.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{TeamError, TeamResult};
use crate::team::model::Team;

/// Service type every teamsync leader registers
pub const SERVICE_TYPE: &str = "_teamsync._tcp.local.";

const TXT_TEAM_ID: &str = "team_id";
const TXT_NAME: &str = "name";
const TXT_LEADER_NAME: &str = "leader_name";
const TXT_ENDPOINT: &str = "endpoint";
const TXT_MEMBER_COUNT: &str = "member_count";
const TXT_VERSION: &str = "version";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredTeam {
    pub team_id: String,
    pub name: String,
    pub leader_name: String,
    /// `host:port` to join through
    pub endpoint: String,
    pub member_count: usize,
    pub version: String,
}

impl DiscoveredTeam {
    /// Read a resolved service. Services without a team id are not ours.
    fn from_service(info: &ServiceInfo) -> Option<Self> {
        let text = |key: &str| {
            info.get_property_val_str(key)
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };
        let team_id = text(TXT_TEAM_ID)?;
        let endpoint = text(TXT_ENDPOINT).map(String::from).or_else(|| {
            info.get_addresses()
                .iter()
                .find(|ip| ip.is_ipv4())
                .map(|ip| format!("{}:{}", ip, info.get_port()))
        })?;

        Some(Self {
            team_id: team_id.to_string(),
            name: text(TXT_NAME).unwrap_or(team_id).to_string(),
            leader_name: text(TXT_LEADER_NAME).unwrap_or_default().to_string(),
            endpoint,
            member_count: text(TXT_MEMBER_COUNT)
                .and_then(|c| c.parse().ok())
                .unwrap_or(0),
            version: text(TXT_VERSION).unwrap_or_default().to_string(),
        })
    }
}

fn discovery_error(e: mdns_sd::Error) -> TeamError {
    TeamError::Discovery(e.to_string())
}

/// The mDNS record for `team`, announced at its leader endpoint.
fn service_info(team: &Team) -> TeamResult<ServiceInfo> {
    let addr: SocketAddr = team.leader_endpoint.parse().map_err(|_| {
        TeamError::validation(format!("leader endpoint {:?} is not ip:port", team.leader_endpoint))
    })?;
    let ip = addr.ip().to_string();
    let host = format!("teamsync-{}.local.", team.id.to_lowercase());

    let properties: HashMap<String, String> = [
        (TXT_TEAM_ID, team.id.clone()),
        (TXT_NAME, team.name.clone()),
        (TXT_LEADER_NAME, team.leader_name.clone()),
        (TXT_ENDPOINT, team.leader_endpoint.clone()),
        (TXT_MEMBER_COUNT, team.member_count.to_string()),
        (TXT_VERSION, env!("CARGO_PKG_VERSION").to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    ServiceInfo::new(SERVICE_TYPE, &team.id, &host, ip.as_str(), addr.port(), properties)
        .map_err(discovery_error)
}

struct Advertised {
    daemon: ServiceDaemon,
    fullname: String,
}

/// Announces the team this node leads until stopped or dropped.
pub struct TeamAdvertiser {
    inner: Mutex<Option<Advertised>>,
}

impl TeamAdvertiser {
    pub fn start(team: &Team) -> TeamResult<Self> {
        let info = service_info(team)?;
        let fullname = info.get_fullname().to_string();
        let daemon = ServiceDaemon::new().map_err(discovery_error)?;
        daemon.register(info).map_err(discovery_error)?;
        info!(team_id = %team.id, endpoint = %team.leader_endpoint, "mDNS advertiser started");

        Ok(Self {
            inner: Mutex::new(Some(Advertised { daemon, fullname })),
        })
    }

    /// Re-announce `team`, replacing the whole TXT record.
    pub fn update(&self, team: &Team) -> TeamResult<()> {
        let inner = self.inner.lock();
        let Some(advertised) = inner.as_ref() else {
            return Ok(());
        };
        let info = service_info(team)?;
        if info.get_fullname() != advertised.fullname {
            return Err(TeamError::validation(format!(
                "advertiser is bound to {}, not team {}",
                advertised.fullname, team.id
            )));
        }
        advertised.daemon.register(info).map_err(discovery_error)?;
        debug!(team_id = %team.id, member_count = team.member_count, "mDNS record updated");
        Ok(())
    }

    pub fn stop(&self) {
        let Some(advertised) = self.inner.lock().take() else {
            return;
        };
        if let Err(e) = advertised.daemon.unregister(&advertised.fullname) {
            debug!(error = %e, "mDNS unregister failed");
        }
        if let Err(e) = advertised.daemon.shutdown() {
            debug!(error = %e, "mDNS daemon shutdown failed");
        }
        info!(fullname = %advertised.fullname, "mDNS advertiser stopped");
    }
}

impl Drop for TeamAdvertiser {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Browse the LAN for `timeout` and collect the teams that answered,
/// deduplicated by team id.
pub async fn discover(timeout: Duration) -> TeamResult<Vec<DiscoveredTeam>> {
    tokio::task::spawn_blocking(move || browse(timeout))
        .await
        .map_err(|e| TeamError::Discovery(e.to_string()))?
}

fn browse(timeout: Duration) -> TeamResult<Vec<DiscoveredTeam>> {
    let daemon = ServiceDaemon::new().map_err(discovery_error)?;
    let receiver = daemon.browse(SERVICE_TYPE).map_err(discovery_error)?;

    let mut found: HashMap<String, DiscoveredTeam> = HashMap::new();
    let deadline = Instant::now() + timeout;
    while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
        match receiver.recv_timeout(remaining) {
            Ok(ServiceEvent::ServiceResolved(info)) => match DiscoveredTeam::from_service(&info) {
                Some(team) => {
                    debug!(team_id = %team.team_id, endpoint = %team.endpoint, "Discovered team");
                    found.entry(team.team_id.clone()).or_insert(team);
                }
                None => debug!(fullname = %info.get_fullname(), "Ignoring service without a team record"),
            },
            Ok(_) => {}
            // Deadline reached or the daemon went away
            Err(_) => break,
        }
    }

    if let Err(e) = daemon.stop_browse(SERVICE_TYPE) {
        debug!(error = %e, "mDNS stop_browse failed");
    }
    if let Err(e) = daemon.shutdown() {
        debug!(error = %e, "mDNS daemon shutdown failed");
    }

    let mut teams: Vec<_> = found.into_values().collect();
    teams.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(teams)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::team::registry::sample_team;

    fn leader_team() -> Team {
        let mut team = sample_team("01JTEAM", true);
        team.name = "Core".into();
        team.member_count = 3;
        team
    }

    #[test]
    fn test_record_describes_team() {
        let info = service_info(&leader_team()).unwrap();
        assert_eq!(info.get_type(), SERVICE_TYPE);
        assert_eq!(info.get_port(), 19960);
        assert_eq!(info.get_property_val_str("endpoint"), Some("127.0.0.1:19960"));

        let team = DiscoveredTeam::from_service(&info).unwrap();
        assert_eq!(
            team,
            DiscoveredTeam {
                team_id: "01JTEAM".into(),
                name: "Core".into(),
                leader_name: "Leader".into(),
                endpoint: "127.0.0.1:19960".into(),
                member_count: 3,
                version: env!("CARGO_PKG_VERSION").into(),
            }
        );
    }

    #[test]
    fn test_foreign_services_are_skipped() {
        let bare = ServiceInfo::new(
            SERVICE_TYPE,
            "printer",
            "printer.local.",
            "192.168.1.9",
            631,
            HashMap::<String, String>::new(),
        )
        .unwrap();
        assert!(DiscoveredTeam::from_service(&bare).is_none());
    }

    #[test]
    fn test_endpoint_falls_back_to_address() {
        let properties: HashMap<String, String> = [("team_id", "t9"), ("member_count", "many")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let info = ServiceInfo::new(SERVICE_TYPE, "t9", "t9.local.", "192.168.1.20", 19960, properties)
            .unwrap();

        let team = DiscoveredTeam::from_service(&info).unwrap();
        assert_eq!(team.endpoint, "192.168.1.20:19960");
        assert_eq!(team.name, "t9");
        assert_eq!(team.member_count, 0);
    }

    #[test]
    fn test_endpoint_must_be_ip_and_port() {
        let mut team = leader_team();
        team.leader_endpoint = "leader.lan".into();
        assert!(matches!(service_info(&team), Err(TeamError::Validation(_))));
    }

    #[tokio::test]
    #[ignore = "needs multicast on the host network"]
    async fn test_advertised_team_is_discovered() {
        let mut team = leader_team();
        let advertiser = TeamAdvertiser::start(&team).unwrap();
        team.member_count = 4;
        advertiser.update(&team).unwrap();

        let teams = discover(Duration::from_secs(3)).await.unwrap();
        let found = teams.iter().find(|t| t.team_id == team.id).unwrap();
        assert_eq!(found.member_count, 4);

        advertiser.stop();
    }
}
