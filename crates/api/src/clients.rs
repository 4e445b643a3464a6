//! Capabilities one service uses to reach another.
//!
//! When services share a process they call each other directly; otherwise
//! the HTTP clients here go over the network and turn transport failures into
//! `UNAVAILABLE` or `DEADLINE_EXCEEDED`.

use std::sync::Arc;

use async_trait::async_trait;
use common::{
    Deadline, OrderLine, Principal, RoleResolver, Status, TIMEOUT_HEADER, bearer_token,
};
use fulfillment::InventoryMutator;
use identity::UserProfile;
use reqwest::{RequestBuilder, Response, Url};
use serde_json::json;

use crate::error::{BootError, code_for_http};
use crate::Catalog;

/// Applies stock changes against an in-process catalog.
#[derive(Clone)]
pub struct LocalInventory {
    catalog: Arc<Catalog>,
}

impl LocalInventory {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl InventoryMutator for LocalInventory {
    async fn change_stock(
        &self,
        product_id: &str,
        delta: i64,
        origin: &OrderLine,
        deadline: Deadline,
    ) -> Result<(), Status> {
        deadline
            .run(async {
                self.catalog
                    .change_stock(product_id, delta, Some(origin))
                    .await
                    .map_err(Status::from)
            })
            .await
            .map(|_| ())
    }
}

/// Resolves callers by asking a remote identity service for `/identity/me`.
///
/// The role is the one stored on the user record, which can be newer than
/// the role in the token's claims that the in-process resolver trusts.
#[derive(Clone)]
pub struct RemoteRoleResolver {
    http: reqwest::Client,
    me_url: Url,
}

impl RemoteRoleResolver {
    pub fn new(http: reqwest::Client, identity_url: &str) -> Result<Self, BootError> {
        Ok(Self {
            http,
            me_url: endpoint(identity_url, &["identity", "me"])?,
        })
    }
}

#[async_trait]
impl RoleResolver for RemoteRoleResolver {
    #[tracing::instrument(skip_all)]
    async fn resolve(&self, bearer: &str, deadline: Deadline) -> Result<Principal, Status> {
        let token = bearer_token(bearer);
        if token.is_empty() {
            return Err(Status::unauthenticated("no token provided"));
        }

        let request = self.http.get(self.me_url.clone()).bearer_auth(token);
        let profile: UserProfile = decode(send(request, deadline).await?).await?;
        Ok(Principal {
            user_id: profile.id,
            role: profile.role,
        })
    }
}

/// Changes stock through a remote catalog's `/catalog/products/{id}/stock`.
#[derive(Clone)]
pub struct RemoteInventoryClient {
    http: reqwest::Client,
    base: Url,
}

impl RemoteInventoryClient {
    pub fn new(http: reqwest::Client, catalog_url: &str) -> Result<Self, BootError> {
        Ok(Self {
            http,
            base: endpoint(catalog_url, &[])?,
        })
    }

    fn stock_url(&self, product_id: &str) -> Result<Url, Status> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| Status::internal("catalog url cannot be a base"))?
            .pop_if_empty()
            .extend(["catalog", "products", product_id, "stock"]);
        Ok(url)
    }
}

#[async_trait]
impl InventoryMutator for RemoteInventoryClient {
    #[tracing::instrument(skip(self, deadline))]
    async fn change_stock(
        &self,
        product_id: &str,
        delta: i64,
        origin: &OrderLine,
        deadline: Deadline,
    ) -> Result<(), Status> {
        let request = self.http.post(self.stock_url(product_id)?).json(&json!({
            "delta": delta,
            "order_id": origin.order_id,
            "line": origin.line,
        }));
        send(request, deadline).await.map(|_| ())
    }
}

fn endpoint(base: &str, segments: &[&str]) -> Result<Url, BootError> {
    let invalid = |reason: String| BootError::Upstream {
        url: base.to_string(),
        reason,
    };
    let mut url = Url::parse(base).map_err(|e| invalid(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| invalid("cannot be a base".to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Sends `request` within what is left of `deadline` and forwards the
/// remaining budget downstream. Error responses are decoded back into the
/// [`Status`] the peer returned.
async fn send(request: RequestBuilder, deadline: Deadline) -> Result<Response, Status> {
    let request = match deadline.remaining() {
        None => request,
        Some(left) if left.is_zero() => {
            return Err(Status::deadline_exceeded("deadline exceeded"));
        }
        Some(left) => request
            .timeout(left)
            .header(TIMEOUT_HEADER, left.as_millis().to_string()),
    };

    let response = request.send().await.map_err(transport_error)?;
    let http = response.status();
    if http.is_success() {
        return Ok(response);
    }

    metrics::counter!("upstream_errors_total", "status" => http.as_u16().to_string())
        .increment(1);
    Err(response
        .json::<Status>()
        .await
        .unwrap_or_else(|_| Status::new(code_for_http(http), format!("upstream returned {http}"))))
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, Status> {
    response.json::<T>().await.map_err(|e| {
        tracing::warn!(error = %e, "undecodable upstream response");
        Status::internal("undecodable upstream response")
    })
}

fn transport_error(e: reqwest::Error) -> Status {
    if e.is_timeout() {
        tracing::warn!(error = %e, "upstream call timed out");
        Status::deadline_exceeded("deadline exceeded")
    } else {
        tracing::warn!(error = %e, "upstream unreachable");
        Status::unavailable("upstream service unavailable")
    }
}
