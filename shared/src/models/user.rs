//! Actor, role and capability models

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{WorkflowError, WorkflowResult};

/// Role an authenticated user acts under
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Branch staff who request and receive stock
    Staff,
    Admin,
    Finance,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Staff => "staff",
            Role::Admin => "admin",
            Role::Finance => "finance",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "staff" => Some(Role::Staff),
            "admin" => Some(Role::Admin),
            "finance" => Some(Role::Finance),
            _ => None,
        }
    }
}

/// Operation-level capability checked at every workflow boundary
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    RequestStock,
    ReviewOrder,
    ReceiveStock,
    VerifyFinance,
    ApproveOrder,
    CancelOrder,
    AdjustStock,
    ViewOrders,
}

impl Capability {
    pub fn allowed_roles(&self) -> &'static [Role] {
        match self {
            Capability::RequestStock => &[Role::Staff, Role::Admin],
            Capability::ReviewOrder => &[Role::Admin],
            Capability::ReceiveStock => &[Role::Staff, Role::Admin],
            Capability::VerifyFinance => &[Role::Finance, Role::Admin],
            Capability::ApproveOrder => &[Role::Admin],
            Capability::CancelOrder => &[Role::Staff, Role::Admin],
            Capability::AdjustStock => &[Role::Admin],
            Capability::ViewOrders => &[Role::Staff, Role::Admin, Role::Finance],
        }
    }
}

/// The user performing an operation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: Uuid, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn can(&self, capability: Capability) -> bool {
        capability.allowed_roles().contains(&self.role)
    }

    /// Fail with an authorization error unless the role grants `capability`
    pub fn require(&self, capability: Capability) -> WorkflowResult<()> {
        if self.can(capability) {
            Ok(())
        } else {
            Err(WorkflowError::Authorization(format!(
                "role {} lacks capability {:?}",
                self.role.as_str(),
                capability
            )))
        }
    }
}
