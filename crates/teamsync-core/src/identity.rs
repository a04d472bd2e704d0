//! Local participant identity.
//!
//! Each node has exactly one identity: an immutable id generated on first
//! creation and a mutable display name. The identity is stamped on every
//! outbound protocol message (join, leave, presence auth and forwarded
//! collaboration payloads) so the leader can attribute them.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{TeamError, TeamResult};
use crate::storage::{Storage, IDENTITY_FILE};
use crate::types::{new_id, now, Timestamp};

/// This node's identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// Member id, never changes once created
    pub id: String,
    /// Display name shown to other members
    pub name: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Identity {
    fn new(name: &str) -> Self {
        let ts = now();
        Self {
            id: new_id(),
            name: name.to_string(),
            created_at: ts,
            updated_at: ts,
        }
    }
}

fn clean_name(name: &str) -> TeamResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(TeamError::validation("identity name is required"));
    }
    Ok(name.to_string())
}

/// Persisted identity, cached in memory
#[derive(Clone)]
pub struct IdentityStore {
    storage: Storage,
    current: Arc<RwLock<Option<Identity>>>,
}

impl IdentityStore {
    /// Load the identity file, if any.
    pub fn load(storage: Storage) -> TeamResult<Self> {
        let current: Option<Identity> = storage.read_json(IDENTITY_FILE)?;
        if let Some(identity) = &current {
            info!(member_id = %identity.id, name = %identity.name, "Loaded existing identity");
        }
        Ok(Self {
            storage,
            current: Arc::new(RwLock::new(current)),
        })
    }

    /// Current identity.
    ///
    /// # Errors
    ///
    /// Returns `TeamError::IdentityRequired` if none has been created.
    pub fn get(&self) -> TeamResult<Identity> {
        self.current.read().clone().ok_or(TeamError::IdentityRequired)
    }

    /// Whether an identity exists.
    pub fn is_set(&self) -> bool {
        self.current.read().is_some()
    }

    /// Create a fresh identity, replacing any existing one.
    pub fn create(&self, name: &str) -> TeamResult<Identity> {
        let name = clean_name(name)?;
        let identity = Identity::new(&name);
        self.storage.write_json(IDENTITY_FILE, &identity)?;
        *self.current.write() = Some(identity.clone());
        info!(member_id = %identity.id, name = %identity.name, "Created identity");
        Ok(identity)
    }

    /// Rename the identity, keeping its id.
    pub fn update(&self, name: &str) -> TeamResult<Identity> {
        let name = clean_name(name)?;
        let mut identity = self.get()?;
        identity.name = name;
        identity.updated_at = now();
        self.storage.write_json(IDENTITY_FILE, &identity)?;
        *self.current.write() = Some(identity.clone());
        Ok(identity)
    }

    /// Return the existing identity or create one with `name`.
    pub fn ensure(&self, name: &str) -> TeamResult<Identity> {
        match self.get() {
            Ok(identity) => Ok(identity),
            Err(TeamError::IdentityRequired) => self.create(name),
            Err(e) => Err(e),
        }
    }
}
