//! Authorization gateway and an in-process grant table.
//!
//! The store asks the gateway before every operation. A denial is fatal to
//! the operation and no state is mutated.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::RwLock;

use async_trait::async_trait;
use chanstore_core::OrgId;

use crate::error::AuthorizationError;

/// The caller on whose behalf an operation runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Actor {
    pub id: String,
    /// The tenant the actor's session is bound to.
    pub org_id: OrgId,
}

impl Actor {
    pub fn new(id: impl Into<String>, org_id: OrgId) -> Self {
        Self {
            id: id.into(),
            org_id,
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.org_id)
    }
}

/// Capabilities the gateway can grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Read,
    Create,
    Update,
    Delete,
    ManageVersions,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::Read,
        Action::Create,
        Action::Update,
        Action::Delete,
        Action::ManageVersions,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::ManageVersions => "manage versions of",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kinds of resource an action applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    Channel,
    ChannelVersion,
}

impl ResourceType {
    pub const ALL: [ResourceType; 2] = [ResourceType::Channel, ResourceType::ChannelVersion];
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceType::Channel => f.write_str("channel"),
            ResourceType::ChannelVersion => f.write_str("channel version"),
        }
    }
}

/// A single authorization question.
#[derive(Debug, Clone)]
pub struct AccessRequest<'a> {
    pub actor: &'a Actor,
    pub org_id: &'a OrgId,
    pub action: Action,
    pub resource_type: ResourceType,
    /// Name of the operation asking, for audit trails.
    pub context: &'a str,
    pub resource_id: Option<String>,
    pub resource_name: Option<String>,
}

impl<'a> AccessRequest<'a> {
    /// A request scoped to the actor's own organization.
    pub fn new(
        actor: &'a Actor,
        action: Action,
        resource_type: ResourceType,
        context: &'a str,
    ) -> Self {
        Self {
            actor,
            org_id: &actor.org_id,
            action,
            resource_type,
            context,
            resource_id: None,
            resource_name: None,
        }
    }

    pub fn resource_id(mut self, id: impl Into<String>) -> Self {
        self.resource_id = Some(id.into());
        self
    }

    pub fn resource_name(mut self, name: impl Into<String>) -> Self {
        self.resource_name = Some(name.into());
        self
    }

    /// Build the denial for this request.
    pub fn deny(&self) -> AuthorizationError {
        let resource = match (&self.resource_name, &self.resource_id) {
            (Some(name), _) => format!("{:?}", name),
            (None, Some(id)) => id.clone(),
            (None, None) => format!("in {}", self.org_id),
        };
        AuthorizationError {
            actor: self.actor.id.clone(),
            action: self.action,
            resource_type: self.resource_type,
            resource,
        }
    }
}

/// Decides whether an actor may perform an action.
#[async_trait]
pub trait AuthorizationGateway: Send + Sync {
    /// Returns `Ok(())` to allow, or the denial.
    async fn check(&self, request: &AccessRequest<'_>) -> Result<(), AuthorizationError>;
}

/// What a grant covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GrantScope {
    /// Every resource of the type within the organization.
    Org,
    /// One resource, by id.
    Resource(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Grant {
    action: Action,
    resource_type: ResourceType,
    scope: GrantScope,
}

/// In-memory authorization gateway backed by explicit grants.
///
/// Requests for an organization other than the actor's own are always
/// denied.
#[derive(Debug, Default)]
pub struct GrantTable {
    grants: RwLock<HashMap<(String, OrgId), HashSet<Grant>>>,
}

impl GrantTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant one capability.
    pub fn grant(&self, actor: &Actor, action: Action, resource_type: ResourceType, scope: GrantScope) {
        if let Ok(mut grants) = self.grants.write() {
            grants
                .entry((actor.id.clone(), actor.org_id.clone()))
                .or_default()
                .insert(Grant {
                    action,
                    resource_type,
                    scope,
                });
        }
    }

    /// Grant every action on every resource type in the actor's organization.
    pub fn grant_all(&self, actor: &Actor) {
        for action in Action::ALL {
            for resource_type in ResourceType::ALL {
                self.grant(actor, action, resource_type, GrantScope::Org);
            }
        }
    }

    /// Revoke one capability. Returns whether it was held.
    pub fn revoke(
        &self,
        actor: &Actor,
        action: Action,
        resource_type: ResourceType,
        scope: GrantScope,
    ) -> bool {
        let Ok(mut grants) = self.grants.write() else {
            return false;
        };
        grants
            .get_mut(&(actor.id.clone(), actor.org_id.clone()))
            .map(|held| {
                held.remove(&Grant {
                    action,
                    resource_type,
                    scope,
                })
            })
            .unwrap_or(false)
    }

    fn allows(&self, request: &AccessRequest<'_>) -> bool {
        if request.actor.org_id != *request.org_id {
            return false;
        }
        let Ok(grants) = self.grants.read() else {
            return false;
        };
        let Some(held) = grants.get(&(request.actor.id.clone(), request.org_id.clone())) else {
            return false;
        };

        held.iter().any(|g| {
            g.action == request.action
                && g.resource_type == request.resource_type
                && match &g.scope {
                    GrantScope::Org => true,
                    GrantScope::Resource(id) => request.resource_id.as_deref() == Some(id),
                }
        })
    }
}

#[async_trait]
impl AuthorizationGateway for GrantTable {
    async fn check(&self, request: &AccessRequest<'_>) -> Result<(), AuthorizationError> {
        if self.allows(request) {
            Ok(())
        } else {
            tracing::debug!(
                actor = %request.actor,
                action = %request.action,
                resource_type = %request.resource_type,
                context = request.context,
                "authorization denied"
            );
            Err(request.deny())
        }
    }
}
