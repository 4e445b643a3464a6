//! Order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Extension, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use catalog::AuthorizationDelegate;
use common::Deadline;
use fulfillment::{NewOrder, Order, RetryReport};
use serde::Deserialize;

use super::{authorization, json_body, ndjson, query};
use crate::error::ApiError;
use crate::{Fulfillment, Resolver};

/// Shared state for order routes.
#[derive(Clone)]
pub struct OrdersState {
    pub coordinator: Arc<Fulfillment>,
    /// Guards operational endpoints.
    pub admin: AuthorizationDelegate<Resolver>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListOrdersQuery {
    pub user_id: Option<String>,
}

/// POST /orders
pub async fn create(
    State(state): State<OrdersState>,
    payload: Result<Json<NewOrder>, JsonRejection>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let order = json_body(payload)?;
    let order = state.coordinator.create_order(order).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /orders/{id}
pub async fn get(
    State(state): State<OrdersState>,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    Ok(Json(state.coordinator.get_order(&id).await?))
}

/// GET /orders?user_id=: NDJSON stream in creation order.
pub async fn list(
    State(state): State<OrdersState>,
    params: Result<Query<ListOrdersQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let params = query(params)?;
    let orders = state
        .coordinator
        .list_orders(params.user_id.as_deref())
        .await?;
    Ok(ndjson(orders))
}

/// POST /orders/{id}/cancel
pub async fn cancel(
    State(state): State<OrdersState>,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    Ok(Json(state.coordinator.cancel_order(&id).await?))
}

/// POST /orders/{id}/approve
pub async fn approve(
    State(state): State<OrdersState>,
    Extension(deadline): Extension<Deadline>,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    Ok(Json(state.coordinator.approve_order(&id, deadline).await?))
}

/// POST /orders/adjustments/retry (admin): drains the stock adjustment outbox.
pub async fn retry(
    State(state): State<OrdersState>,
    Extension(deadline): Extension<Deadline>,
    headers: HeaderMap,
) -> Result<Json<RetryReport>, ApiError> {
    let principal = state
        .admin
        .authorize(authorization(&headers), deadline)
        .await?;
    tracing::info!(user_id = %principal.user_id, "manual outbox drain");
    Ok(Json(
        state.coordinator.retry_pending_adjustments(deadline).await?,
    ))
}
