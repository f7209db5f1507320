//! Caller context for tenant scoping.
//!
//! The organization id, user id, and role come from an already
//! authenticated request context upstream of this crate. The core trusts
//! this context and never re-derives identity from request payloads;
//! retrieval filters are always scoped with [`CallerContext::organization_id`].

/// Caller role, as asserted by the upstream auth layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Member,
    Admin,
}

/// Server-verified caller identity.
#[derive(Debug, Clone)]
pub struct CallerContext {
    /// Organization the caller is authenticated against.
    pub organization_id: String,
    /// Authenticated user, when the caller is a user rather than a system.
    pub user_id: Option<String>,
    /// Caller role.
    pub role: Role,
}

impl CallerContext {
    pub fn new(organization_id: impl Into<String>) -> Self {
        Self {
            organization_id: organization_id.into(),
            user_id: None,
            role: Role::Member,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }
}
