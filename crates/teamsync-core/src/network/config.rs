//! Interface enumeration and advertised-address selection.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{TeamError, TeamResult};
use crate::storage::{Storage, NETWORK_CONFIG_FILE};
use crate::types::{now, Timestamp};

/// Name prefixes of adapters that are usually not reachable from the LAN
const VIRTUAL_PREFIXES: &[&str] = &[
    "vmnet", "vboxnet", "veth", "docker", "br-", "virbr", "lxc", "lxd", "flannel", "cni",
    "calico", "weave", "tun", "tap", "utun", "awdl", "llw", "bridge", "parallels", "zt",
    "tailscale",
];

/// Persisted address preference
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_interface: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkInterface {
    pub name: String,
    /// IPv4 addresses as strings
    pub addresses: Vec<String>,
    pub is_up: bool,
    pub is_loopback: bool,
    pub is_virtual: bool,
}

/// How other members can reach this node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberEndpoint {
    pub primary_ip: String,
    pub all_ips: Vec<String>,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_if: Option<String>,
}

impl MemberEndpoint {
    pub fn address(&self) -> String {
        format!("{}:{}", self.primary_ip, self.port)
    }
}

pub fn is_virtual_interface(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    VIRTUAL_PREFIXES.iter().any(|p| lower.starts_with(p))
}

fn is_lan_address(ip: &Ipv4Addr) -> bool {
    !ip.is_loopback() && !ip.is_link_local() && !ip.is_unspecified() && ip.is_private()
}

/// Pick the address to advertise from `interfaces` given a preference.
///
/// Order: preferred IP, preferred interface, first private address on a
/// physical interface, loopback.
pub fn select_advertise_ip(
    interfaces: &[NetworkInterface],
    config: &NetworkConfig,
) -> TeamResult<Ipv4Addr> {
    let up = || interfaces.iter().filter(|i| i.is_up);
    let parse = |s: &String| s.parse::<Ipv4Addr>().ok();

    if let Some(ip) = &config.preferred_ip {
        if let Some(found) = up().flat_map(|i| i.addresses.iter()).find(|a| *a == ip) {
            if let Some(ip) = parse(found) {
                return Ok(ip);
            }
        }
    }

    if let Some(name) = &config.preferred_interface {
        if let Some(ip) = up()
            .filter(|i| &i.name == name)
            .flat_map(|i| i.addresses.iter())
            .find_map(parse)
        {
            return Ok(ip);
        }
    }

    if let Some(ip) = up()
        .filter(|i| !i.is_loopback && !i.is_virtual)
        .flat_map(|i| i.addresses.iter())
        .filter_map(parse)
        .find(is_lan_address)
    {
        return Ok(ip);
    }

    up()
        .filter(|i| i.is_loopback)
        .flat_map(|i| i.addresses.iter())
        .find_map(parse)
        .ok_or(TeamError::NoValidInterface)
}

/// First local address in the same /24 as `target`, if any.
pub fn matching_local_ip(interfaces: &[NetworkInterface], target: Ipv4Addr) -> Option<Ipv4Addr> {
    let t = target.octets();
    interfaces
        .iter()
        .filter(|i| i.is_up)
        .flat_map(|i| i.addresses.iter())
        .filter_map(|a| a.parse::<Ipv4Addr>().ok())
        .find(|ip| {
            let o = ip.octets();
            o[0] == t[0] && o[1] == t[1] && o[2] == t[2]
        })
}

/// Network preferences plus the port this node serves on
#[derive(Clone)]
pub struct NetworkManager {
    storage: Storage,
    config: Arc<RwLock<NetworkConfig>>,
    port: Arc<AtomicU16>,
}

impl NetworkManager {
    pub fn load(storage: Storage, port: u16) -> TeamResult<Self> {
        let config = storage.read_json(NETWORK_CONFIG_FILE)?.unwrap_or_default();
        Ok(Self {
            storage,
            config: Arc::new(RwLock::new(config)),
            port: Arc::new(AtomicU16::new(port)),
        })
    }

    pub fn port(&self) -> u16 {
        self.port.load(Ordering::Relaxed)
    }

    /// Update the advertised port once the listener is bound.
    pub fn set_port(&self, port: u16) {
        self.port.store(port, Ordering::Relaxed);
    }

    /// IPv4 interfaces, physical first, then by name.
    pub fn interfaces(&self) -> TeamResult<Vec<NetworkInterface>> {
        let addrs = if_addrs::get_if_addrs()?;
        let mut result: Vec<NetworkInterface> = Vec::new();

        for iface in addrs {
            let IpAddr::V4(ip) = iface.ip() else {
                continue;
            };
            if ip.is_link_local() {
                continue;
            }
            match result.iter_mut().find(|i| i.name == iface.name) {
                Some(existing) => existing.addresses.push(ip.to_string()),
                None => result.push(NetworkInterface {
                    is_virtual: is_virtual_interface(&iface.name),
                    is_loopback: iface.is_loopback(),
                    name: iface.name,
                    addresses: vec![ip.to_string()],
                    is_up: true,
                }),
            }
        }

        result.sort_by(|a, b| {
            (a.is_loopback, a.is_virtual, &a.name).cmp(&(b.is_loopback, b.is_virtual, &b.name))
        });
        Ok(result)
    }

    pub fn config(&self) -> NetworkConfig {
        self.config.read().clone()
    }

    /// Persist a preference. Unknown interfaces or addresses are rejected.
    pub fn set_config(
        &self,
        preferred_interface: Option<String>,
        preferred_ip: Option<String>,
    ) -> TeamResult<NetworkConfig> {
        let preferred_interface = preferred_interface.filter(|s| !s.trim().is_empty());
        let preferred_ip = preferred_ip.filter(|s| !s.trim().is_empty());

        if preferred_interface.is_some() || preferred_ip.is_some() {
            let interfaces = self.interfaces()?;
            if let Some(name) = &preferred_interface {
                if !interfaces.iter().any(|i| &i.name == name) {
                    return Err(TeamError::validation(format!("unknown interface: {}", name)));
                }
            }
            if let Some(ip) = &preferred_ip {
                if !interfaces.iter().any(|i| i.addresses.contains(ip)) {
                    return Err(TeamError::validation(format!(
                        "address {} is not assigned to any interface",
                        ip
                    )));
                }
            }
        }

        let config = NetworkConfig {
            preferred_interface,
            preferred_ip,
            last_updated: Some(now()),
        };
        self.storage.write_json(NETWORK_CONFIG_FILE, &config)?;
        *self.config.write() = config.clone();
        info!(
            preferred_interface = ?config.preferred_interface,
            preferred_ip = ?config.preferred_ip,
            "Network preference updated"
        );
        Ok(config)
    }

    pub fn has_preference(&self) -> bool {
        let config = self.config.read();
        config.preferred_interface.is_some() || config.preferred_ip.is_some()
    }

    pub fn advertise_ip(&self) -> TeamResult<Ipv4Addr> {
        let ip = select_advertise_ip(&self.interfaces()?, &self.config())?;
        debug!(%ip, "Selected advertise address");
        Ok(ip)
    }

    /// `ip:port` other nodes should use to reach this one.
    pub fn endpoint(&self) -> TeamResult<String> {
        Ok(format!("{}:{}", self.advertise_ip()?, self.port()))
    }

    /// Endpoint to advertise to a leader at `leader_endpoint`.
    ///
    /// Without an explicit preference, an address on the leader's subnet is
    /// preferred so the leader can route back to us.
    pub fn endpoint_towards(&self, leader_endpoint: &str) -> TeamResult<String> {
        if !self.has_preference() {
            let host = leader_endpoint.rsplit_once(':').map(|(h, _)| h).unwrap_or(leader_endpoint);
            if let Ok(target) = host.parse::<Ipv4Addr>() {
                if let Some(ip) = matching_local_ip(&self.interfaces()?, target) {
                    return Ok(format!("{}:{}", ip, self.port()));
                }
            }
        }
        self.endpoint()
    }

    pub fn member_endpoint(&self) -> TeamResult<MemberEndpoint> {
        let interfaces = self.interfaces()?;
        let config = self.config();
        let primary = select_advertise_ip(&interfaces, &config)?;
        let all_ips = interfaces
            .iter()
            .filter(|i| !i.is_loopback)
            .flat_map(|i| i.addresses.iter().cloned())
            .collect();
        Ok(MemberEndpoint {
            primary_ip: primary.to_string(),
            all_ips,
            port: self.port(),
            preferred_if: config.preferred_interface,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn iface(name: &str, addrs: &[&str], loopback: bool) -> NetworkInterface {
        NetworkInterface {
            name: name.to_string(),
            addresses: addrs.iter().map(|s| s.to_string()).collect(),
            is_up: true,
            is_loopback: loopback,
            is_virtual: is_virtual_interface(name),
        }
    }

    fn sample() -> Vec<NetworkInterface> {
        vec![
            iface("lo", &["127.0.0.1"], true),
            iface("docker0", &["172.17.0.1"], false),
            iface("eth0", &["192.168.1.20"], false),
            iface("wlan0", &["10.0.0.5"], false),
        ]
    }

    #[test]
    fn test_virtual_detection() {
        assert!(is_virtual_interface("docker0"));
        assert!(is_virtual_interface("vEthernet"));
        assert!(is_virtual_interface("utun3"));
        assert!(!is_virtual_interface("eth0"));
        assert!(!is_virtual_interface("en0"));
    }

    #[test]
    fn test_auto_select_skips_virtual_and_loopback() {
        let ip = select_advertise_ip(&sample(), &NetworkConfig::default()).unwrap();
        assert_eq!(ip, Ipv4Addr::new(192, 168, 1, 20));
    }

    #[test]
    fn test_preferences_win() {
        let config = NetworkConfig {
            preferred_ip: Some("10.0.0.5".into()),
            ..Default::default()
        };
        assert_eq!(
            select_advertise_ip(&sample(), &config).unwrap(),
            Ipv4Addr::new(10, 0, 0, 5)
        );

        let config = NetworkConfig {
            preferred_interface: Some("docker0".into()),
            ..Default::default()
        };
        assert_eq!(
            select_advertise_ip(&sample(), &config).unwrap(),
            Ipv4Addr::new(172, 17, 0, 1)
        );
    }

    #[test]
    fn test_stale_preference_falls_back() {
        let config = NetworkConfig {
            preferred_ip: Some("192.168.99.99".into()),
            ..Default::default()
        };
        assert_eq!(
            select_advertise_ip(&sample(), &config).unwrap(),
            Ipv4Addr::new(192, 168, 1, 20)
        );
    }

    #[test]
    fn test_loopback_last_resort() {
        let only_lo = vec![iface("lo", &["127.0.0.1"], true)];
        assert_eq!(
            select_advertise_ip(&only_lo, &NetworkConfig::default()).unwrap(),
            Ipv4Addr::LOCALHOST
        );
        assert!(matches!(
            select_advertise_ip(&[], &NetworkConfig::default()),
            Err(TeamError::NoValidInterface)
        ));
    }

    #[test]
    fn test_matching_local_ip() {
        assert_eq!(
            matching_local_ip(&sample(), Ipv4Addr::new(10, 0, 0, 77)),
            Some(Ipv4Addr::new(10, 0, 0, 5))
        );
        assert_eq!(
            matching_local_ip(&sample(), Ipv4Addr::LOCALHOST),
            Some(Ipv4Addr::LOCALHOST)
        );
        assert_eq!(matching_local_ip(&sample(), Ipv4Addr::new(8, 8, 8, 8)), None);
    }

    #[test]
    fn test_set_config_validates_and_persists() {
        let temp = TempDir::new().unwrap();
        let storage = Storage::new(temp.path()).unwrap();
        let manager = NetworkManager::load(storage.clone(), 19960).unwrap();

        assert!(matches!(
            manager.set_config(Some("no-such-if0".into()), None),
            Err(TeamError::Validation(_))
        ));

        manager.set_config(None, Some("127.0.0.1".into())).unwrap();
        assert_eq!(manager.endpoint().unwrap(), "127.0.0.1:19960");

        let reloaded = NetworkManager::load(storage, 1).unwrap();
        assert_eq!(reloaded.config().preferred_ip.as_deref(), Some("127.0.0.1"));
    }
}
