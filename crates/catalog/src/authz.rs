//! Role-based guard for privileged catalog operations.

use common::{Deadline, Principal, Role, RoleResolver, Status, bearer_token};

/// Admits callers whose resolved role is in an allowed set.
///
/// Every call resolves the bearer afresh; nothing is cached, so a revoked
/// token stops working on the next request.
#[derive(Clone)]
pub struct AuthorizationDelegate<R> {
    resolver: R,
    allowed: Vec<Role>,
}

impl<R: RoleResolver> AuthorizationDelegate<R> {
    pub fn new(resolver: R, allowed: impl IntoIterator<Item = Role>) -> Self {
        Self {
            resolver,
            allowed: allowed.into_iter().collect(),
        }
    }

    pub fn admin_only(resolver: R) -> Self {
        Self::new(resolver, [Role::Admin])
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    /// Resolves `bearer` and checks the role.
    ///
    /// Transport failures (`UNAVAILABLE`, `DEADLINE_EXCEEDED`) pass through
    /// so the caller can retry; every other resolver failure is a denial.
    #[tracing::instrument(skip_all)]
    pub async fn authorize(
        &self,
        bearer: Option<&str>,
        deadline: Deadline,
    ) -> Result<Principal, Status> {
        let token = bearer.map(bearer_token).unwrap_or_default();
        if token.is_empty() {
            return Err(Status::unauthenticated("no token provided"));
        }

        let principal = match self.resolver.resolve(token, deadline).await {
            Ok(principal) => principal,
            Err(status) if status.code.is_transient() => {
                tracing::warn!(code = %status.code.as_str(), "role resolution unavailable");
                return Err(status);
            }
            Err(status) => {
                tracing::debug!(code = %status.code.as_str(), "role resolution rejected");
                return Err(Status::permission_denied("invalid token"));
            }
        };

        if principal.user_id.is_empty() {
            return Err(Status::permission_denied("invalid token"));
        }
        if !self.allowed.contains(&principal.role) {
            metrics::counter!("authorization_denied_total").increment(1);
            return Err(Status::permission_denied(
                "only admin can perform this action",
            ));
        }

        Ok(principal)
    }
}
