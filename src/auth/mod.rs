use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
    config::ApiKeyConfig,
    domain::Gym,
    error::{AppError, Result},
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    GymOwner,
    Member,
}

/// Things a caller may be allowed to do. Handlers ask for a capability,
/// never for a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    RequestSubscription,
    ManageSubscriptions,
    ViewSettlements,
    ManageSettlements,
    ViewAuditLog,
    ManageJobs,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleSet {
    roles: Vec<Role>,
}

impl RoleSet {
    pub fn new(roles: impl IntoIterator<Item = Role>) -> Self {
        let mut set = Self::default();
        for role in roles {
            if !set.roles.contains(&role) {
                set.roles.push(role);
            }
        }
        set
    }

    pub fn contains(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    pub fn allows(&self, capability: Capability) -> bool {
        use Capability::*;
        if self.contains(Role::Admin) {
            return true;
        }
        match capability {
            RequestSubscription => self.contains(Role::Member) || self.contains(Role::GymOwner),
            ManageSubscriptions | ViewSettlements => self.contains(Role::GymOwner),
            ManageSettlements | ViewAuditLog | ManageJobs => false,
        }
    }
}

/// Authenticated caller, inserted into request extensions by the auth middleware.
#[derive(Debug, Clone)]
pub struct Principal {
    pub actor_id: Uuid,
    pub roles: RoleSet,
}

impl Principal {
    pub fn require(&self, capability: Capability) -> Result<()> {
        if self.roles.allows(capability) {
            Ok(())
        } else {
            tracing::debug!(actor_id = %self.actor_id, ?capability, "Capability denied");
            Err(AppError::Forbidden)
        }
    }

    pub fn is_admin(&self) -> bool {
        self.roles.contains(Role::Admin)
    }

    /// Like `require`, but a gym owner only holds the capability for gyms
    /// they own. Admins hold it everywhere.
    pub fn require_gym(&self, capability: Capability, gym: &Gym) -> Result<()> {
        self.require(capability)?;
        if self.is_admin() || gym.owner_id == self.actor_id {
            Ok(())
        } else {
            tracing::debug!(actor_id = %self.actor_id, gym_id = %gym.id, ?capability, "Gym not owned by caller");
            Err(AppError::Forbidden)
        }
    }
}

/// Bearer API keys from configuration, looked up by the SHA-256 of the token.
#[derive(Debug, Clone, Default)]
pub struct ApiKeyStore {
    keys: HashMap<String, Principal>,
}

impl ApiKeyStore {
    pub fn from_config(keys: &[ApiKeyConfig]) -> Self {
        let keys = keys
            .iter()
            .map(|key| {
                (
                    key.key_sha256.trim().to_lowercase(),
                    Principal {
                        actor_id: key.actor_id,
                        roles: RoleSet::new(key.roles.iter().copied()),
                    },
                )
            })
            .collect();
        Self { keys }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn authenticate(&self, token: &str) -> Option<Principal> {
        self.keys.get(&hash_api_key(token)).cloned()
    }
}

/// Hex SHA-256 of a raw API key, the form stored in `auth.api_keys`.
pub fn hash_api_key(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Fresh random API key for operators to hand out.
pub fn generate_api_key() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
