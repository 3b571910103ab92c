//! watch 参数解析
//!
//! 参数以 `HashMap<String, serde_json::Value>` 形式给出（与 Consul watch 计划的参数表一致），
//! 解析时拒绝未知键和错误类型，保证构造出的订阅一定可以转换为合法的查询 URL。

use serde_json::Value;
use std::collections::HashMap;

use crate::config::InstancerConfig;
use crate::error::{InstancerError, Result};

const KNOWN_KEYS: &[&str] = &[
    "type",
    "service",
    "tag",
    "passingonly",
    "stale",
    "datacenter",
    "token",
];

/// 服务 watch 参数
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchParams {
    pub service: String,
    pub tags: Vec<String>,
    pub passing_only: bool,
    pub allow_stale: bool,
    pub datacenter: Option<String>,
    pub token: Option<String>,
}

impl WatchParams {
    /// 解析参数表
    pub fn parse(params: &HashMap<String, Value>) -> Result<Self> {
        let service_hint = params
            .get("service")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let invalid = |reason: String| InstancerError::invalid_plan(service_hint.clone(), reason);

        if let Some(key) = params.keys().find(|k| !KNOWN_KEYS.contains(&k.as_str())) {
            return Err(invalid(format!("invalid parameters: {}", key)));
        }

        match params.get("type") {
            Some(Value::String(t)) if t == "service" => {}
            Some(Value::String(t)) => {
                return Err(invalid(format!("unsupported watch type: {}", t)));
            }
            Some(_) => return Err(invalid("watch type must be a string".to_string())),
            None => return Err(invalid("watch type must be specified".to_string())),
        }

        let service = match params.get("service") {
            Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
            Some(Value::String(_)) | None => {
                return Err(invalid("service must be specified".to_string()));
            }
            Some(_) => return Err(invalid("service must be a string".to_string())),
        };
        check_path_safe("service", &service).map_err(&invalid)?;

        let tags = match params.get("tag") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::String(tag)) => vec![tag.clone()],
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| invalid("tag must be a string or list of strings".to_string()))
                })
                .collect::<Result<Vec<_>>>()?,
            Some(_) => return Err(invalid("tag must be a string or list of strings".to_string())),
        };
        for tag in &tags {
            if tag.is_empty() {
                return Err(invalid("tag must not be empty".to_string()));
            }
            check_path_safe("tag", tag).map_err(&invalid)?;
        }

        let passing_only = bool_param(params, "passingonly").map_err(&invalid)?;
        let allow_stale = bool_param(params, "stale").map_err(&invalid)?;
        let datacenter = string_param(params, "datacenter").map_err(&invalid)?;
        let token = string_param(params, "token").map_err(&invalid)?;

        Ok(Self {
            service,
            tags,
            passing_only,
            allow_stale,
            datacenter,
            token,
        })
    }

    /// 从实例跟踪器配置构建参数表并解析
    pub fn from_config(config: &InstancerConfig) -> Result<Self> {
        let mut params = HashMap::new();
        params.insert("type".to_string(), Value::from("service"));
        params.insert("service".to_string(), Value::from(config.service.clone()));
        params.insert("passingonly".to_string(), Value::from(config.passing_only));
        params.insert("stale".to_string(), Value::from(config.allow_stale));
        if let Some(tag) = config.tag.as_ref().filter(|t| !t.is_empty()) {
            params.insert("tag".to_string(), Value::from(tag.clone()));
        }
        Self::parse(&params)
    }
}

fn bool_param(params: &HashMap<String, Value>, key: &str) -> std::result::Result<bool, String> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(format!("{} must be a boolean", key)),
    }
}

fn string_param(
    params: &HashMap<String, Value>,
    key: &str,
) -> std::result::Result<Option<String>, String> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => {
            check_path_safe(key, s)?;
            Ok(Some(s.clone()))
        }
        Some(_) => Err(format!("{} must be a string", key)),
    }
}

fn check_path_safe(key: &str, value: &str) -> std::result::Result<(), String> {
    if value
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || matches!(c, '/' | '?' | '#' | '&'))
    {
        return Err(format!("{} contains characters not allowed in a query: {:?}", key, value));
    }
    Ok(())
}
