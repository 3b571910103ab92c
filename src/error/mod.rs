//! Flare Instancer 错误处理模块
//!
//! 区分三类错误：
//! - 配置错误（无法构建 watch 计划），调用方可修正参数后重试；
//! - 生命周期错误（实例跟踪器已关闭或订阅已终止）；
//! - 注册中心通信错误（HTTP、状态码、响应解码），由订阅内部的重试策略处理。

use thiserror::Error;

/// 统一结果类型
pub type Result<T> = std::result::Result<T, InstancerError>;

/// 实例跟踪器错误类型
#[derive(Error, Debug)]
pub enum InstancerError {
    /// 服务标识无法转换为有效的 watch 计划
    #[error("error creating watch plan for service {service}: {reason}")]
    InvalidWatchPlan { service: String, reason: String },

    /// 已调用 close，实例跟踪器不可再使用
    #[error("instancer is closed/stopped")]
    Closed,

    /// 订阅在未请求停止的情况下结束，缓存的实例不再可信
    #[error("watch for service {service} terminated, cached instances are no longer current")]
    Terminated { service: String },

    /// 当前线程没有可用的 tokio 运行时
    #[error("runtime error: {0}")]
    Runtime(String),

    /// HTTP 传输错误
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// 注册中心返回了非成功状态码
    #[error("registry responded with status {status}: {body}")]
    Status { status: u16, body: String },

    /// 响应体无法解码
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// 配置文件错误
    #[error("config error: {0}")]
    Config(String),

    /// IO 错误
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 订阅被注册中心拒绝或主动失败
    #[error("watch failed: {0}")]
    Watch(String),
}

impl InstancerError {
    /// 创建 watch 计划错误
    pub fn invalid_plan(service: impl Into<String>, reason: impl Into<String>) -> Self {
        InstancerError::InvalidWatchPlan {
            service: service.into(),
            reason: reason.into(),
        }
    }

    /// 是否为订阅可以重试的错误
    ///
    /// 注册中心返回的任何错误状态（包括 403）都可重试，只受连续失败次数上限约束；
    /// 请求本身无法构建时不重试。
    pub fn is_transient(&self) -> bool {
        match self {
            InstancerError::Http(e) => !e.is_builder(),
            InstancerError::Status { .. } => true,
            InstancerError::Decode(_) | InstancerError::Watch(_) => true,
            _ => false,
        }
    }
}

impl From<toml::de::Error> for InstancerError {
    fn from(err: toml::de::Error) -> Self {
        InstancerError::Config(err.to_string())
    }
}
