//! 资产查询对象（读取请求使用）。

use serde::{Deserialize, Serialize};

/// 查询裁剪选项。
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetSelect {
    #[serde(default)]
    pub exclude_attributes: bool,
    #[serde(default)]
    pub exclude_path: bool,
    #[serde(default)]
    pub exclude_parent_info: bool,
}

/// 资产查询对象。
///
/// - `recursive` 为真时，从 `parents`（缺省为租域根）向下展开整棵子树
/// - `ids` 非空时按 ID 精确选取
/// - `realm` 缺省时由执行上下文决定
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetQuery {
    #[serde(default)]
    pub recursive: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<String>,
    #[serde(default)]
    pub select: AssetSelect,
    #[serde(default, rename = "tenant", skip_serializing_if = "Option::is_none")]
    pub realm: Option<String>,
}

impl AssetQuery {
    /// 清单查询：整棵树，只要 ID 与版本骨架。
    pub fn index() -> Self {
        Self {
            recursive: true,
            select: AssetSelect {
                exclude_attributes: true,
                exclude_path: true,
                exclude_parent_info: true,
            },
            ..Self::default()
        }
    }

    /// 批量查询：按 ID 取完整资产（不含路径与父信息）。
    pub fn by_ids(ids: Vec<String>) -> Self {
        Self {
            ids,
            select: AssetSelect {
                exclude_attributes: false,
                exclude_path: true,
                exclude_parent_info: true,
            },
            ..Self::default()
        }
    }
}
