//! Error types for Teamsync
//!
//! Every error carries an [`ErrorKind`] so callers (and the HTTP layer) can
//! tell "peer down" apart from "peer rejected" without string matching.

use thiserror::Error;

/// Coarse classification of a [`TeamError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or malformed input, reported synchronously
    Validation,
    /// Operation not permitted for this node's role
    Forbidden,
    /// Referenced team, member, skill or session does not exist
    NotFound,
    /// Duplicate team / membership or skill install collision
    Conflict,
    /// Leader or peer could not be reached
    Unavailable,
    /// Downloaded content failed verification
    Integrity,
    /// Error returned verbatim by a remote node
    Remote,
    /// Local I/O, serialization or other internal failure
    Internal,
}

impl ErrorKind {
    /// Stable lowercase name used in JSON error bodies.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::Integrity => "integrity",
            ErrorKind::Remote => "remote",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Why an install target directory is already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    /// Tracked under a different plugin id; never overridable
    OtherPlugin,
    /// Directory exists but is not tracked; overridable with force
    ManualInstall,
}

/// Main error type for Teamsync operations
#[derive(Error, Debug)]
pub enum TeamError {
    /// Invalid or missing request data
    #[error("Validation error: {0}")]
    Validation(String),

    /// No local identity has been configured yet
    #[error("Identity not set, create an identity first")]
    IdentityRequired,

    /// Skill directory has no SKILL.md
    #[error("SKILL.md not found in {0}")]
    SkillManifestMissing(String),

    /// Publish metadata is incomplete or invalid
    #[error("Invalid skill metadata: {0}")]
    InvalidMetadata(String),

    /// Operation reserved for the team leader
    #[error("Not the leader of team {0}")]
    NotTeamLeader(String),

    /// Leaders dissolve, they do not leave
    #[error("Leader cannot leave team, use dissolve instead")]
    LeaderCannotLeave,

    /// Team is not held by this node
    #[error("Team not found: {0}")]
    TeamNotFound(String),

    /// Member is not part of the team
    #[error("Not a team member: {0}")]
    NotTeamMember(String),

    /// Skill is unknown to this node
    #[error("Skill not found: {0}")]
    SkillNotFound(String),

    /// Shared session is unknown to the leader
    #[error("Shared session not found: {0}")]
    SessionNotFound(String),

    /// Project id is not in the team project config
    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    /// Neither the member nor the stats cache has data for the request
    #[error("No activity stats available: {0}")]
    StatsNotFound(String),

    /// This node already leads or belongs to a team
    #[error("Team already exists: {0}")]
    TeamAlreadyExists(String),

    /// This node already belongs to a different team
    #[error("Already a member of team {0}")]
    AlreadyInTeam(String),

    /// Install directory collision
    #[error("{message}")]
    SkillConflict {
        skill_name: String,
        plugin_id: String,
        conflict_type: ConflictType,
        message: String,
    },

    /// Team leader could not be reached
    #[error("Team leader is unavailable: {0}")]
    LeaderUnavailable(String),

    /// A non-leader peer could not be reached
    #[error("Peer is unavailable: {0}")]
    PeerUnavailable(String),

    /// No usable network interface to advertise
    #[error("No valid network interface found")]
    NoValidInterface,

    /// The mDNS daemon could not be started or queried
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// Downloaded archive does not match the advertised checksum
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// Error response relayed unchanged from a remote node
    #[error("Remote returned {status}: {body}")]
    Remote { status: u16, body: String },

    /// Error during serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Persistent state could not be read or written
    #[error("Storage error: {0}")]
    Storage(String),

    /// Outbound HTTP failure that is not a connectivity problem
    #[error("HTTP error: {0}")]
    Http(String),

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TeamError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TeamError::Validation(_)
            | TeamError::IdentityRequired
            | TeamError::SkillManifestMissing(_)
            | TeamError::InvalidMetadata(_) => ErrorKind::Validation,
            TeamError::NotTeamLeader(_) | TeamError::LeaderCannotLeave => ErrorKind::Forbidden,
            TeamError::TeamNotFound(_)
            | TeamError::NotTeamMember(_)
            | TeamError::SkillNotFound(_)
            | TeamError::SessionNotFound(_)
            | TeamError::ProjectNotFound(_)
            | TeamError::StatsNotFound(_) => ErrorKind::NotFound,
            TeamError::TeamAlreadyExists(_)
            | TeamError::AlreadyInTeam(_)
            | TeamError::SkillConflict { .. } => ErrorKind::Conflict,
            TeamError::LeaderUnavailable(_)
            | TeamError::PeerUnavailable(_)
            | TeamError::NoValidInterface
            | TeamError::Discovery(_) => ErrorKind::Unavailable,
            TeamError::ChecksumMismatch { .. } => ErrorKind::Integrity,
            TeamError::Remote { .. } => ErrorKind::Remote,
            TeamError::Serialization(_)
            | TeamError::Storage(_)
            | TeamError::Http(_)
            | TeamError::Io(_) => ErrorKind::Internal,
        }
    }

    /// HTTP status code used when this error crosses the HTTP surface.
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::Validation => 400,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Integrity => 422,
            ErrorKind::Unavailable => 503,
            ErrorKind::Internal => 500,
            ErrorKind::Remote => match self {
                TeamError::Remote { status, .. } => *status,
                _ => 500,
            },
        }
    }

    /// True when the error means a peer or leader could not be reached.
    pub fn is_unavailable(&self) -> bool {
        self.kind() == ErrorKind::Unavailable
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        TeamError::Validation(msg.into())
    }
}

impl From<serde_json::Error> for TeamError {
    fn from(e: serde_json::Error) -> Self {
        TeamError::Serialization(e.to_string())
    }
}

/// Result type alias using TeamError
pub type TeamResult<T> = Result<T, TeamError>;
