//! Authentication and authorization.
//!
//! JWT bearer tokens carry a subject identity and a single role. All
//! role checks go through [`authorize`]; handlers never compare roles
//! inline.

mod jwt;
mod middleware;

pub use jwt::{Claims, JwtValidator};
pub use middleware::{auth_middleware, AuthState};

use serde::{Deserialize, Serialize};

use crate::infra::ServiceError;

/// Platform roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Claimant: submits trips, reads own records.
    EvOwner,
    /// Carbon verification agency: adjudicates, revokes.
    Cva,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::EvOwner => "ev_owner",
            Role::Cva => "cva",
            Role::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ev_owner" => Some(Role::EvOwner),
            "cva" => Some(Role::Cva),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// Identity attached to an authenticated request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Subject identity from the token (`sub` claim).
    pub user_id: String,
    pub role: Role,
}

impl AuthContext {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    /// Whether listings must be scoped down to the caller's own rows.
    pub fn is_owner_scoped(&self) -> bool {
        self.role == Role::EvOwner
    }
}

/// The single authorization policy check.
///
/// Admin passes every check. Everyone else must hold one of the
/// required roles.
pub fn authorize(ctx: &AuthContext, required: &[Role]) -> Result<(), ServiceError> {
    if ctx.role == Role::Admin || required.contains(&ctx.role) {
        return Ok(());
    }
    Err(ServiceError::Forbidden(format!(
        "role {} may not perform this operation",
        ctx.role.as_str()
    )))
}
