//! Caller identity and the role resolution capability.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::{Deadline, Status};

/// Role attached to a user account and carried in its tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Customer,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Who is calling, as established by the identity service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: String,
    pub role: Role,
}

/// Resolves a bearer token into a [`Principal`].
///
/// Implementations either verify the token in-process or ask the identity
/// service over the network. Transport failures must surface as
/// `UNAVAILABLE` or `DEADLINE_EXCEEDED` so callers can tell them apart from
/// a rejected token.
#[async_trait]
pub trait RoleResolver: Send + Sync {
    async fn resolve(&self, bearer: &str, deadline: Deadline) -> Result<Principal, Status>;
}

#[async_trait]
impl<T: RoleResolver + ?Sized> RoleResolver for Arc<T> {
    async fn resolve(&self, bearer: &str, deadline: Deadline) -> Result<Principal, Status> {
        (**self).resolve(bearer, deadline).await
    }
}

/// Resolver backed by a fixed token table, for tests and local tooling.
#[derive(Debug, Clone, Default)]
pub struct StaticRoleResolver {
    principals: Arc<HashMap<String, Principal>>,
    failure: Arc<RwLock<Option<Status>>>,
    calls: Arc<AtomicUsize>,
}

impl StaticRoleResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps `token` to a principal with the given id and role.
    pub fn with_token(mut self, token: &str, user_id: &str, role: Role) -> Self {
        Arc::make_mut(&mut self.principals).insert(
            token.to_string(),
            Principal {
                user_id: user_id.to_string(),
                role,
            },
        );
        self
    }

    /// Makes every subsequent resolution fail with `status`, or succeed
    /// again when `None`.
    pub async fn set_failure(&self, status: Option<Status>) {
        *self.failure.write().await = status;
    }

    /// Number of resolutions attempted so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RoleResolver for StaticRoleResolver {
    async fn resolve(&self, bearer: &str, deadline: Deadline) -> Result<Principal, Status> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if deadline.is_expired() {
            return Err(Status::deadline_exceeded("deadline exceeded"));
        }
        if let Some(status) = self.failure.read().await.clone() {
            return Err(status);
        }
        self.principals
            .get(bearer_token(bearer))
            .cloned()
            .ok_or_else(|| Status::unauthenticated("invalid token"))
    }
}

/// Strips an optional `Bearer ` scheme and surrounding whitespace.
pub fn bearer_token(header: &str) -> &str {
    let trimmed = header.trim();
    if trimmed.eq_ignore_ascii_case("bearer") {
        return "";
    }
    match trimmed.split_once(' ') {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
        _ => trimmed,
    }
}
