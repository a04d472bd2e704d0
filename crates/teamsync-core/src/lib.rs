//! Teamsync Core Library
//!
//! LAN team coordination and skill synchronization for desktop nodes.
//!
//! ## Overview
//!
//! One node creates a team and becomes its fixed leader. Other nodes on the
//! same network join it by endpoint (or find it through mDNS discovery). The
//! leader holds the authoritative member list, the shared sessions, the
//! daily summaries, the project config and the team skill index; members
//! forward their writes to it and mirror its state through a WebSocket
//! presence channel. The leader also collects each member's weekly git and
//! session activity into a team report.
//!
//! Skills are directories with a `SKILL.md`. A publisher keeps a copy and
//! serves it to peers; the leader only indexes it. Members download the
//! archive straight from the author, verify its SHA-256 checksum and install
//! it into the local skills directory.
//!
//! ## Quick Start
//!
//! ```ignore
//! use teamsync_core::{Config, TeamNode};
//! use teamsync_core::team::CreateTeamRequest;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let node = TeamNode::new(Config::from_env()?).await?;
//!     node.identity().ensure("Ada")?;
//!
//!     let listener = node.bind("0.0.0.0:19960").await?;
//!     let team = node
//!         .teams()
//!         .create_team(CreateTeamRequest {
//!             name: "Core".into(),
//!             interface: None,
//!             ip: None,
//!         })
//!         .await?;
//!     println!("team {} at {}", team.name, team.leader_endpoint);
//!
//!     node.serve(listener, async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//!     Ok(())
//! }
//! ```

pub mod collab;
pub mod config;
pub mod error;
pub mod identity;
pub mod logging;
pub mod network;
pub mod node;
pub mod presence;
pub mod report;
pub mod server;
pub mod skill;
pub mod storage;
pub mod team;
pub mod types;

// Re-exports
pub use collab::{Collaboration, CollaborationService};
pub use config::{Config, ConfigError};
pub use error::{ErrorKind, TeamError, TeamResult};
pub use identity::{Identity, IdentityStore};
pub use logging::LoggingBuilder;
pub use network::{DiscoveredTeam, NetworkManager};
pub use node::TeamNode;
pub use presence::{Event, EventType};
pub use report::WeeklyReportService;
pub use skill::SkillSyncService;
pub use storage::Storage;
pub use team::{Team, TeamMember, TeamRegistry, TeamService};
