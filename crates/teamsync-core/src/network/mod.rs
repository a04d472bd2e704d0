//! Network preferences and mDNS team discovery.

pub mod config;
pub mod discovery;

pub use config::{MemberEndpoint, NetworkConfig, NetworkInterface, NetworkManager};
pub use discovery::{discover, DiscoveredTeam, TeamAdvertiser};
