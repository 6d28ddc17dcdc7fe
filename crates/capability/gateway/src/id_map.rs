//! 网关本地资产 ID 与镜像 ID 的双向映射
//!
//! 正向映射是 `sha256(网关 ID || 本地 ID)` 截断后的 22 字符 base64url，
//! 对管理端生命周期内的相同输入恒定；不可逆，反向查询依赖镜像创建时
//! 登记的逆向表。

use crate::error::GatewayError;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// 计算本地资产在指定网关下的镜像 ID。
pub fn map_asset_id(gateway_id: &str, local_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(gateway_id.as_bytes());
    hasher.update(local_id.as_bytes());
    let digest = hasher.finalize();
    // 128 位足以让跨网关碰撞在统计上不可能
    URL_SAFE_NO_PAD.encode(&digest[..16])
}

/// 单个网关的镜像 ID 逆向表。
#[derive(Debug, Default)]
pub struct IdMap {
    gateway_id: String,
    to_local: HashMap<String, String>,
}

impl IdMap {
    pub fn new(gateway_id: impl Into<String>) -> Self {
        Self {
            gateway_id: gateway_id.into(),
            to_local: HashMap::new(),
        }
    }

    /// 计算本地 ID 的镜像 ID（纯函数，不登记）。
    pub fn mirrored(&self, local_id: &str) -> String {
        map_asset_id(&self.gateway_id, local_id)
    }

    /// 登记本地 ID 并返回镜像 ID。
    ///
    /// 同一镜像 ID 已登记给不同本地 ID 时报告 `DuplicateMapping`，
    /// 该资产视为不可同步。
    pub fn record(&mut self, local_id: &str) -> Result<String, GatewayError> {
        let mirrored = self.mirrored(local_id);
        match self.to_local.get(&mirrored) {
            Some(existing) if existing != local_id => {
                return Err(GatewayError::DuplicateMapping(local_id.to_string()));
            }
            _ => {
                self.to_local
                    .insert(mirrored.clone(), local_id.to_string());
            }
        }
        Ok(mirrored)
    }

    /// 逆向查询：镜像 ID 对应的本地 ID。
    pub fn local_for(&self, mirrored_id: &str) -> Option<&str> {
        self.to_local.get(mirrored_id).map(String::as_str)
    }

    /// 移除镜像 ID 的登记。
    pub fn remove_mirrored(&mut self, mirrored_id: &str) {
        self.to_local.remove(mirrored_id);
    }

    /// 清空逆向表（网关删除时）。
    pub fn clear(&mut self) {
        self.to_local.clear();
    }

    pub fn len(&self) -> usize {
        self.to_local.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_local.is_empty()
    }
}
