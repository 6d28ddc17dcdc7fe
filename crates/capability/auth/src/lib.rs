//! 认证能力：网关 client-credentials 授权与 JWT 生成校验。

mod jwt;

use ams_storage::AssetStore;
use domain::asset::{CLIENT_ID_ATTRIBUTE, CLIENT_SECRET_ATTRIBUTE, DISABLED_ATTRIBUTE};
use domain::{AssetQuery, RealmContext};
use std::sync::Arc;
use subtle::ConstantTimeEq;

pub use jwt::JwtManager;

/// 认证相关错误。
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("gateway disabled")]
    GatewayDisabled,
    #[error("token expired")]
    TokenExpired,
    #[error("token invalid")]
    TokenInvalid,
    #[error("internal error: {0}")]
    Internal(String),
}

/// 签发的 token。
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_in: u64,
}

/// 网关 token 携带的身份。
#[derive(Debug, Clone)]
pub struct GatewayIdentity {
    pub gateway_id: String,
    pub realm: String,
    pub client_id: String,
}

/// 网关凭证（创建网关资产时铸发）。
#[derive(Debug, Clone)]
pub struct GatewayCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// 为指定网关资产铸发凭证。
pub fn issue_credentials(gateway_id: &str) -> GatewayCredentials {
    GatewayCredentials {
        client_id: format!("gateway-{}", gateway_id.to_lowercase()),
        client_secret: uuid::Uuid::new_v4().to_string(),
    }
}

/// 网关认证服务（基于 AssetStore + JWT）。
pub struct GatewayAuthService {
    asset_store: Arc<dyn AssetStore>,
    jwt: JwtManager,
}

impl GatewayAuthService {
    /// 创建认证服务实例。
    pub fn new(asset_store: Arc<dyn AssetStore>, jwt: JwtManager) -> Self {
        Self { asset_store, jwt }
    }

    /// OAuth2 client-credentials 授权：校验网关凭证并签发 token。
    pub async fn client_credentials_grant(
        &self,
        realm: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<IssuedToken, AuthError> {
        let ctx = RealmContext::service(realm);
        let query = AssetQuery {
            recursive: true,
            ..AssetQuery::default()
        };
        let assets = self
            .asset_store
            .query_assets(&ctx, &query)
            .await
            .map_err(|err| AuthError::Internal(err.to_string()))?;
        let gateway = assets
            .into_iter()
            .filter(|asset| asset.is_gateway())
            .find(|asset| asset.attribute_str(CLIENT_ID_ATTRIBUTE) == Some(client_id))
            .ok_or(AuthError::InvalidCredentials)?;

        let stored_secret = gateway
            .attribute_str(CLIENT_SECRET_ATTRIBUTE)
            .ok_or(AuthError::InvalidCredentials)?;
        if !secrets_match(stored_secret, client_secret) {
            return Err(AuthError::InvalidCredentials);
        }
        if gateway.attribute_bool(DISABLED_ATTRIBUTE) {
            return Err(AuthError::GatewayDisabled);
        }
        self.jwt.issue_gateway(realm, &gateway.id, client_id)
    }

    /// 校验管理端 access token 并提取 RealmContext。
    pub fn verify_access_token(&self, token: &str) -> Result<RealmContext, AuthError> {
        self.jwt.decode_access(token)
    }

    /// 校验网关 token 并提取网关身份。
    pub fn verify_gateway_token(&self, token: &str) -> Result<GatewayIdentity, AuthError> {
        self.jwt.decode_gateway(token)
    }
}

/// 常数时间比较两个密钥。
fn secrets_match(stored: &str, presented: &str) -> bool {
    let stored = stored.as_bytes();
    let presented = presented.as_bytes();
    if stored.len() != presented.len() {
        return false;
    }
    bool::from(stored.ct_eq(presented))
}
