use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Principal roles, ordered from most to least privileged.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Gestor,
    Operador,
    Cliente,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Gestor => "gestor",
            Self::Operador => "operador",
            Self::Cliente => "cliente",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Self::Admin),
            "gestor" => Some(Self::Gestor),
            "operador" => Some(Self::Operador),
            "cliente" => Some(Self::Cliente),
            _ => None,
        }
    }

    pub fn can_manage_system(&self) -> bool {
        matches!(self, Self::Admin)
    }

    pub fn can_view_reports(&self) -> bool {
        matches!(self, Self::Admin | Self::Gestor | Self::Cliente)
    }

    pub fn can_create_incidents(&self) -> bool {
        matches!(self, Self::Admin | Self::Gestor | Self::Operador)
    }

    pub fn can_resolve_requests(&self) -> bool {
        matches!(self, Self::Admin | Self::Gestor)
    }

    /// Escalation is strictly one tier up, except operators whose requests
    /// may be resolved by either tier above them.
    pub fn can_approve(&self, requester: Role) -> bool {
        match self {
            Self::Admin => matches!(requester, Self::Gestor | Self::Operador),
            Self::Gestor => requester == Self::Operador,
            Self::Operador | Self::Cliente => false,
        }
    }

    pub fn eligible_approvers(requester: Role) -> &'static [Role] {
        match requester {
            Self::Gestor => &[Self::Admin],
            Self::Operador => &[Self::Gestor, Self::Admin],
            Self::Admin | Self::Cliente => &[],
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only view of the acting session identity. The core never mutates
/// principals; the surrounding session layer owns them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub name: String,
    pub role: Role,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("no active session")]
    NoSession,
    #[error("unknown role `{0}` in session")]
    UnknownRole(String),
}

pub trait IdentityResolver: Send + Sync {
    fn current(&self) -> Result<Principal, IdentityError>;
}

/// Resolver backed by a fixed principal, used by the server runtime once a
/// session has been established and by tests.
#[derive(Clone, Debug)]
pub struct StaticIdentityResolver {
    principal: Principal,
}

impl StaticIdentityResolver {
    pub fn new(principal: Principal) -> Self {
        Self { principal }
    }
}

impl IdentityResolver for StaticIdentityResolver {
    fn current(&self) -> Result<Principal, IdentityError> {
        Ok(self.principal.clone())
    }
}
