//! 网关 token 端点
//!
//! `POST /auth/realms/{realm}/protocol/openid-connect/token`
//!
//! OAuth2 client-credentials 授权：网关用创建时铸发的
//! clientId/clientSecret 换取事件通道的访问 token。
//! 错误体沿用 OAuth2 规范字段（`{"error": "..."}`）。

use crate::AppState;
use ams_auth::AuthError;
use api_contract::{TokenRequest, TokenResponse};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Form, Json,
};
use tracing::warn;

#[derive(serde::Deserialize)]
pub struct TokenPath {
    realm: String,
}

pub async fn token_grant(
    State(state): State<AppState>,
    Path(path): Path<TokenPath>,
    Form(req): Form<TokenRequest>,
) -> Response {
    if req.grant_type != "client_credentials" {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "unsupported_grant_type" })),
        )
            .into_response();
    }
    match state
        .auth
        .client_credentials_grant(&path.realm, &req.client_id, &req.client_secret)
        .await
    {
        Ok(issued) => (
            StatusCode::OK,
            Json(TokenResponse {
                access_token: issued.token,
                token_type: "Bearer".to_string(),
                expires_in: issued.expires_in,
            }),
        )
            .into_response(),
        Err(AuthError::InvalidCredentials) => (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "invalid_client" })),
        )
            .into_response(),
        Err(AuthError::GatewayDisabled) => (
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({ "error": "access_denied" })),
        )
            .into_response(),
        Err(err) => {
            warn!(error = %err, "token grant failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "server_error" })),
            )
                .into_response()
        }
    }
}
