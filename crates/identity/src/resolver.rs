use async_trait::async_trait;
use common::{Deadline, Principal, RoleResolver, Status};
use doc_store::ExpiringCache;

use crate::{TokenAuthority, TokenError};

/// Resolves bearer tokens in-process against a [`TokenAuthority`].
///
/// Used when identity runs in the same process as its callers; otherwise
/// callers go through the HTTP resolver, which reads the role from the
/// stored user. This resolver takes the role from the signed claims, so a
/// role change (such as a bootstrap promotion to admin) applies to tokens
/// issued after it. Tokens issued before keep their role until they expire
/// or are revoked.
#[derive(Clone)]
pub struct LocalRoleResolver<C> {
    tokens: TokenAuthority<C>,
}

impl<C: ExpiringCache> LocalRoleResolver<C> {
    pub fn new(tokens: TokenAuthority<C>) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl<C: ExpiringCache> RoleResolver for LocalRoleResolver<C> {
    async fn resolve(&self, bearer: &str, deadline: Deadline) -> Result<Principal, Status> {
        let token = common::bearer_token(bearer);
        if token.is_empty() {
            return Err(Status::unauthenticated("no token provided"));
        }

        let claims = deadline
            .run(async { Ok::<_, Status>(self.tokens.authenticate(token).await) })
            .await?
            .map_err(|e| match e {
                TokenError::Cache(cache) => cache.into(),
                TokenError::Revoked => Status::unauthenticated("token has been revoked"),
                e if e.is_infrastructure() => Status::internal("internal error"),
                _ => Status::unauthenticated("invalid token"),
            })?;

        Ok(Principal {
            user_id: claims.sub,
            role: claims.role,
        })
    }
}
