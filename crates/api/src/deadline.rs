//! Per-request deadline assignment.

use std::time::Duration;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use common::{Deadline, TIMEOUT_HEADER};

/// Attaches a [`Deadline`] to every request. The budget is `default`, or an
/// inbound `x-request-timeout-ms` header when that is shorter.
pub async fn assign(
    State(default): State<Duration>,
    mut request: Request,
    next: Next,
) -> Response {
    let deadline = request_deadline(request.headers(), default);
    request.extensions_mut().insert(deadline);
    next.run(request).await
}

fn request_deadline(headers: &HeaderMap, default: Duration) -> Deadline {
    let deadline = Deadline::after(default);
    match inbound_budget(headers) {
        Some(budget) => deadline.min(budget),
        None => deadline,
    }
}

fn inbound_budget(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(TIMEOUT_HEADER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_millis)
}
