//! 日志初始化
//!
//! 库本身只通过 `tracing` 宏输出事件，是否安装订阅者由应用决定

use tracing_subscriber::EnvFilter;

use crate::config::{LogConfig, LogFormat};
use crate::error::{InstancerError, Result};

/// 安装全局 fmt 订阅者
///
/// `RUST_LOG` 存在时优先于配置中的过滤指令；重复安装返回错误而不是 panic
pub fn init(config: &LogConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .map_err(|e| InstancerError::Config(format!("invalid log filter: {}", e)))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    let installed = match config.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    installed.map_err(|e| InstancerError::Config(format!("failed to install subscriber: {}", e)))
}
