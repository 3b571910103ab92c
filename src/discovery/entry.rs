//! Consul 服务实例描述
//!
//! 对应 `/v1/health/service/<name>` 返回数组中的一项，只保留解析端点所需的字段和常用元数据

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::Result;

/// 健康服务条目
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceEntry {
    pub node: Node,
    pub service: AgentService,
    #[serde(default)]
    pub checks: Vec<HealthCheck>,
}

/// 节点信息
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct Node {
    #[serde(rename = "ID")]
    pub id: String,
    pub node: String,
    pub address: String,
    pub datacenter: String,
}

/// 服务注册信息
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct AgentService {
    #[serde(rename = "ID")]
    pub id: String,
    pub service: String,
    pub address: String,
    pub port: u16,
    #[serde(deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub meta: HashMap<String, String>,
}

/// 健康检查结果
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct HealthCheck {
    #[serde(rename = "CheckID")]
    pub check_id: String,
    pub name: String,
    pub status: String,
}

impl ServiceEntry {
    /// 解析为 `address:port`
    ///
    /// 服务地址非空时优先使用，否则回退到节点地址
    pub fn endpoint(&self) -> String {
        let address = if self.service.address.is_empty() {
            &self.node.address
        } else {
            &self.service.address
        };
        format!("{}:{}", address, self.service.port)
    }
}

/// 校验负载形状并转换为端点列表
///
/// 保持投递顺序，不排序不去重
pub fn endpoints_from_payload(payload: &serde_json::Value) -> Result<Vec<String>> {
    let entries = Vec::<ServiceEntry>::deserialize(payload)?;
    Ok(entries.iter().map(ServiceEntry::endpoint).collect())
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
