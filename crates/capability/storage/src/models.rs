//! 存储层数据模型

/// 网关互联配置记录。
///
/// 以本地租域为键，每个租域至多一条配置。
#[derive(Debug, Clone)]
pub struct GatewayConnectionRecord {
    pub local_realm: String,
    pub host: String,
    pub port: u16,
    pub realm: String,
    pub client_id: String,
    pub client_secret: String,
    pub secure: bool,
    pub disabled: bool,
}
