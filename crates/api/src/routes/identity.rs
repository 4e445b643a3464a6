//! Account and session endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use identity::{LoginResponse, MessageResponse, RegisterRequest, RegisterResponse, TokenPair, UserProfile};
use serde::Deserialize;

use super::{authorization, json_body};
use crate::Identity;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// POST /identity/register
pub async fn register(
    State(identity): State<Arc<Identity>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let request = json_body(payload)?;
    let response = identity.register(request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /identity/login
pub async fn login(
    State(identity): State<Arc<Identity>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiError> {
    let request = json_body(payload)?;
    Ok(Json(identity.login(&request.email, &request.password).await?))
}

/// POST /identity/activate
pub async fn activate(
    State(identity): State<Arc<Identity>>,
    payload: Result<Json<TokenRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let request = json_body(payload)?;
    Ok(Json(identity.activate(&request.token).await?))
}

/// POST /identity/forgot-password
pub async fn forgot_password(
    State(identity): State<Arc<Identity>>,
    payload: Result<Json<ForgotPasswordRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let request = json_body(payload)?;
    Ok(Json(identity.forgot_password(&request.email).await?))
}

/// POST /identity/reset-password
pub async fn reset_password(
    State(identity): State<Arc<Identity>>,
    payload: Result<Json<ResetPasswordRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let request = json_body(payload)?;
    Ok(Json(
        identity
            .reset_password(&request.token, &request.new_password)
            .await?,
    ))
}

/// POST /identity/refresh
pub async fn refresh(
    State(identity): State<Arc<Identity>>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Json<TokenPair>, ApiError> {
    let request = json_body(payload)?;
    Ok(Json(identity.refresh_token(&request.refresh_token).await?))
}

/// POST /identity/logout: revokes the bearer token in `Authorization`.
pub async fn logout(
    State(identity): State<Arc<Identity>>,
    headers: HeaderMap,
) -> Result<Json<MessageResponse>, ApiError> {
    let token = authorization(&headers).unwrap_or_default();
    Ok(Json(identity.logout(token).await?))
}

/// GET /identity/me
pub async fn me(
    State(identity): State<Arc<Identity>>,
    headers: HeaderMap,
) -> Result<Json<UserProfile>, ApiError> {
    let token = authorization(&headers).unwrap_or_default();
    Ok(Json(identity.get_me(token).await?))
}
