//! The acting party of an operation

use std::fmt;

use serde::{Deserialize, Serialize};

use super::UserId;

/// Capability level of an actor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Ordinary buyer or seller
    Member,
    /// Marketplace operator with override rights
    Admin,
    /// Automated integration (payment capture, carrier confirmation)
    System,
}

/// Who is performing an operation. Passed explicitly into every call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn member(id: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            role: Role::Member,
        }
    }

    pub fn admin(id: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            role: Role::Admin,
        }
    }

    pub fn system(id: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            role: Role::System,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }

    /// Whether this actor is the member with the given id
    pub fn is_member(&self, user_id: &str) -> bool {
        self.role == Role::Member && self.id == user_id
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.role {
            Role::Member => write!(f, "{}", self.id),
            Role::Admin => write!(f, "admin:{}", self.id),
            Role::System => write!(f, "system:{}", self.id),
        }
    }
}
