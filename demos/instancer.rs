//! Instancer 示例
//!
//! 跟踪 Consul 中的一个服务并周期性打印选中的实例：
//!
//! ```bash
//! CONSUL_HTTP_ADDR=127.0.0.1:8500 cargo run --example instancer -- web
//! # 或使用配置文件
//! cargo run --example instancer -- --config instancer.toml
//! ```

use flare_instancer::{
    Config, ConsulClient, ConsulConfig, InstanceListener, Instancer, InstancerConfig, logging,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

struct PrintListener;

impl InstanceListener for PrintListener {
    fn on_change(&self, instances: &[String]) {
        info!(?instances, "instances changed");
    }
}

fn load_config() -> anyhow::Result<Config> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut config = match args.as_slice() {
        [flag, path] if flag == "--config" => Config::load_from_file(path)?,
        [service] => Config {
            consul: ConsulConfig::default(),
            instancer: InstancerConfig::new(service.as_str()).with_passing_only(true),
            log: Default::default(),
        },
        _ => anyhow::bail!("usage: instancer <service> | instancer --config <path>"),
    };
    config.consul = config.consul.apply_env();
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;
    logging::init(&config.log)?;

    let client = ConsulClient::new(config.consul.clone())?;
    let instancer_config = config
        .instancer
        .clone()
        .with_logger(tracing::info_span!("consul.instancer", service = %config.instancer.service));
    let instancer = Instancer::new(Arc::new(client), instancer_config)?;
    instancer.register_listener(Arc::new(PrintListener))?;

    let mut ticker = tokio::time::interval(Duration::from_secs(5));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                info!(instance = ?instancer.instance()?, instances = ?instancer.instances()?, "current selection");
            }
        }
    }

    instancer.close();
    info!("bye");
    Ok(())
}
