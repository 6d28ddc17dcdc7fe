use crate::{AuthError, GatewayIdentity, IssuedToken};
use domain::RealmContext;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

// 区分管理端与网关的 token 类型。
const ACCESS_TOKEN_TYPE: &str = "access";
const GATEWAY_TOKEN_TYPE: &str = "gateway";

#[derive(Debug, Serialize, Deserialize)]
/// JWT 内部 claims。
struct Claims {
    sub: String,
    realm: String,
    #[serde(default)]
    roles: Vec<String>,
    #[serde(default)]
    permissions: Vec<String>,
    exp: usize,
    token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    gateway_id: Option<String>,
}

/// JWT 生成与校验。
pub struct JwtManager {
    secret: Vec<u8>,
    access_ttl_seconds: u64,
}

impl JwtManager {
    /// 创建 JWT 管理器。
    pub fn new(secret: String, access_ttl_seconds: u64) -> Self {
        Self {
            secret: secret.into_bytes(),
            access_ttl_seconds,
        }
    }

    /// 基于 RealmContext 签发管理端 access token。
    pub fn issue_access(&self, ctx: &RealmContext) -> Result<IssuedToken, AuthError> {
        let token = self.encode(
            &ctx.user_id,
            &ctx.realm,
            ctx.roles.clone(),
            ctx.permissions.clone(),
            ACCESS_TOKEN_TYPE,
            None,
        )?;
        Ok(IssuedToken {
            token,
            expires_in: self.access_ttl_seconds,
        })
    }

    /// 为网关签发 token（client-credentials 授权成功后）。
    pub fn issue_gateway(
        &self,
        realm: &str,
        gateway_id: &str,
        client_id: &str,
    ) -> Result<IssuedToken, AuthError> {
        let token = self.encode(
            client_id,
            realm,
            Vec::new(),
            Vec::new(),
            GATEWAY_TOKEN_TYPE,
            Some(gateway_id.to_string()),
        )?;
        Ok(IssuedToken {
            token,
            expires_in: self.access_ttl_seconds,
        })
    }

    /// 解析管理端 access token。
    pub fn decode_access(&self, token: &str) -> Result<RealmContext, AuthError> {
        let claims = self.decode_claims(token)?;
        if claims.token_type != ACCESS_TOKEN_TYPE {
            return Err(AuthError::TokenInvalid);
        }
        Ok(RealmContext::new(
            claims.realm,
            claims.sub,
            claims.roles,
            claims.permissions,
        ))
    }

    /// 解析网关 token。
    pub fn decode_gateway(&self, token: &str) -> Result<GatewayIdentity, AuthError> {
        let claims = self.decode_claims(token)?;
        if claims.token_type != GATEWAY_TOKEN_TYPE {
            return Err(AuthError::TokenInvalid);
        }
        let gateway_id = claims.gateway_id.ok_or(AuthError::TokenInvalid)?;
        Ok(GatewayIdentity {
            gateway_id,
            realm: claims.realm,
            client_id: claims.sub,
        })
    }

    /// 内部编码逻辑。
    fn encode(
        &self,
        sub: &str,
        realm: &str,
        roles: Vec<String>,
        permissions: Vec<String>,
        token_type: &str,
        gateway_id: Option<String>,
    ) -> Result<String, AuthError> {
        let exp = (now_epoch_seconds() + self.access_ttl_seconds) as usize;
        let claims = Claims {
            sub: sub.to_string(),
            realm: realm.to_string(),
            roles,
            permissions,
            exp,
            token_type: token_type.to_string(),
            gateway_id,
        };
        jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(&self.secret),
        )
        .map_err(|err| AuthError::Internal(err.to_string()))
    }

    fn decode_claims(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        let decoded = jsonwebtoken::decode::<Claims>(
            token,
            &DecodingKey::from_secret(&self.secret),
            &validation,
        )
        .map_err(map_jwt_error)?;
        Ok(decoded.claims)
    }
}

/// 当前时间戳（秒）。
fn now_epoch_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// 将 jwt 库错误映射为业务错误。
fn map_jwt_error(err: jsonwebtoken::errors::Error) -> AuthError {
    match err.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        _ => AuthError::TokenInvalid,
    }
}
