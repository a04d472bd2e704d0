//! Team membership: the local record, the leader protocol and the
//! lifecycle service on top of both.

pub mod client;
pub mod model;
pub mod registry;
pub mod service;

pub use client::MembershipClient;
pub use model::{
    CreateTeamRequest, JoinRequest, JoinResponse, JoinTeamRequest, LeaveRequest, MemberWorkStatus,
    Team, TeamInfo, TeamMember,
};
pub use registry::{TeamRecord, TeamRegistry, UpsertOutcome};
pub use service::{TeamService, TeamServiceDeps};
