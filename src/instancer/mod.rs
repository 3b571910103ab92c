//! 服务实例跟踪器
//!
//! `Instancer` 订阅注册中心中某个服务的实例变化，在本地维护最新的端点列表，
//! 提供线程安全的轮询选择，并在每次变化时按注册顺序通知监听器。
//!
//! 订阅在未请求停止的情况下结束时，默认直接终止进程。可通过 `TerminationPolicy::MarkTerminated` 改为把状态标记为
//! `FeedStatus::Terminated`，此后所有读取都返回 `InstancerError::Terminated`。

pub mod listener;
pub mod selector;

use parking_lot::RwLock;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinError;
use tracing::{Instrument, Span, debug, error, info, info_span};

use crate::config::{InstancerConfig, TerminationPolicy};
use crate::discovery::{RegistryFeed, Subscription, WatchEvent, WatchParams, endpoints_from_payload};
use crate::error::{InstancerError, Result};
use crate::health::FeedStatus;

pub use listener::InstanceListener;
pub use selector::Selector;

use listener::ListenerSet;

/// 由同一把读写锁保护的实例列表、监听器和生命周期状态
struct State {
    instances: Vec<String>,
    listeners: ListenerSet,
    status: FeedStatus,
}

struct Shared {
    service: String,
    span: Span,
    policy: TerminationPolicy,
    state: RwLock<State>,
    selector: Selector,
}

/// 基于注册中心订阅的客户端负载均衡器
///
/// 创建后立即在 tokio 运行时上开始订阅。`close` 或 drop 后订阅停止，实例跟踪器不可再使用。
pub struct Instancer {
    shared: Arc<Shared>,
    subscription: Arc<dyn Subscription>,
}

impl Instancer {
    /// 创建并启动实例跟踪器
    ///
    /// # Panics
    /// 服务名为空时 panic（API 误用）。
    ///
    /// # Errors
    /// 服务标识无法构建为有效的订阅时返回 `InstancerError::InvalidWatchPlan`；
    /// 不在 tokio 运行时中调用时返回 `InstancerError::Runtime`。
    pub fn new(feed: Arc<dyn RegistryFeed>, config: InstancerConfig) -> Result<Self> {
        assert!(
            !config.service.trim().is_empty(),
            "a consul service must be specified to load balance/monitor, illegal use of api"
        );

        let runtime = Handle::try_current().map_err(|e| InstancerError::Runtime(e.to_string()))?;
        let span = config
            .logger
            .clone()
            .unwrap_or_else(|| info_span!("instancer", service = %config.service));

        let params = WatchParams::from_config(&config)?;
        let subscription = feed.subscribe(&params)?;

        let shared = Arc::new(Shared {
            service: config.service.clone(),
            span,
            policy: config.on_termination,
            state: RwLock::new(State {
                instances: Vec::new(),
                listeners: ListenerSet::default(),
                status: FeedStatus::Starting,
            }),
            selector: Selector::new(),
        });

        {
            let _enter = shared.span.enter();
            info!(
                service = %config.service,
                tag = ?config.tag,
                passing_only = config.passing_only,
                allow_stale = config.allow_stale,
                "Instancer is starting..."
            );
        }

        spawn_watch(&runtime, shared.clone(), subscription.clone());

        Ok(Self {
            shared,
            subscription,
        })
    }

    /// 轮询返回一个实例，没有实例时返回 `Ok(None)`
    pub fn instance(&self) -> Result<Option<String>> {
        let state = self.shared.state.read();
        self.shared.ensure_usable(&state)?;
        Ok(self.shared.selector.select(&state.instances).cloned())
    }

    /// 返回当前实例列表的副本
    pub fn instances(&self) -> Result<Vec<String>> {
        let state = self.shared.state.read();
        self.shared.ensure_usable(&state)?;
        Ok(state.instances.clone())
    }

    /// 注册监听器，并立即以当前实例列表（可能为空）通知一次
    ///
    /// 不去重：同一监听器注册多次会被调用多次。
    pub fn register_listener(&self, listener: Arc<dyn InstanceListener>) -> Result<()> {
        let _enter = self.shared.span.enter();
        let mut state = self.shared.state.write();
        self.shared.ensure_usable(&state)?;

        state.listeners.push(listener.clone());
        debug!(
            service = %self.shared.service,
            listeners = state.listeners.len(),
            "Registered InstanceListener"
        );

        let snapshot = state.instances.clone();
        listener::notify(listener.as_ref(), &snapshot, &self.shared.service);
        Ok(())
    }

    /// 停止订阅并清空实例和监听器，可重复调用
    pub fn close(&self) {
        self.subscription.stop();

        let _enter = self.shared.span.enter();
        let mut state = self.shared.state.write();
        if state.status == FeedStatus::Closed {
            return;
        }
        state.instances = Vec::new();
        state.listeners.clear();
        state.status = FeedStatus::Closed;
        info!(service = %self.shared.service, "Instancer closed");
    }

    pub fn service(&self) -> &str {
        &self.shared.service
    }

    pub fn health(&self) -> FeedStatus {
        self.shared.state.read().status
    }

    pub fn is_closed(&self) -> bool {
        self.health() == FeedStatus::Closed
    }

    pub fn listener_count(&self) -> usize {
        self.shared.state.read().listeners.len()
    }
}

impl Drop for Instancer {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Instancer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instancer")
            .field("service", &self.shared.service)
            .field("status", &self.health())
            .finish()
    }
}

impl Shared {
    fn ensure_usable(&self, state: &State) -> Result<()> {
        match state.status {
            FeedStatus::Closed => Err(InstancerError::Closed),
            FeedStatus::Terminated => Err(InstancerError::Terminated {
                service: self.service.clone(),
            }),
            FeedStatus::Starting | FeedStatus::Serving => Ok(()),
        }
    }

    /// 订阅回调：实例列表的唯一写入方
    fn handle_change(&self, event: WatchEvent) {
        let service = self.service.as_str();
        info!(service, index = event.index, "Handler invoked, refreshing instances");

        let instances = match endpoints_from_payload(&event.payload) {
            Ok(instances) => instances,
            Err(err) => {
                error!(
                    service,
                    index = event.index,
                    error = %err,
                    "handler received unexpected payload, expected a list of service entries"
                );
                return;
            }
        };

        let mut state = self.state.write();
        if !state.status.is_live() {
            debug!(service, status = ?state.status, "Ignoring change for stopped instancer");
            return;
        }

        state.instances = instances;
        state.status = FeedStatus::Serving;
        info!(service, instances = ?state.instances, "Instances refreshed");

        if !state.listeners.is_empty() {
            let snapshot = state.instances.clone();
            debug!(service, "Notifying all registered listeners");
            let delivered = state.listeners.notify_all(&snapshot, service);
            debug!(
                service,
                delivered,
                listeners = state.listeners.len(),
                "All registered listeners have been notified"
            );
        }
    }

    /// 订阅任务在未请求停止的情况下结束
    fn handle_termination(&self, outcome: std::result::Result<Result<()>, JoinError>) {
        let reason = match outcome {
            Ok(Ok(())) => "watch exited without a stop request".to_string(),
            Ok(Err(err)) => err.to_string(),
            Err(err) => format!("watch task failed: {}", err),
        };
        error!(
            service = %self.service,
            error = %reason,
            "plan encountered an error while executing"
        );

        {
            let mut state = self.state.write();
            if state.status == FeedStatus::Closed {
                return;
            }
            state.status = FeedStatus::Terminated;
        }

        match self.policy {
            TerminationPolicy::Abort => {
                error!(
                    service = %self.service,
                    "plan stopped running, aborting rather than serving stale instances"
                );
                std::process::abort();
            }
            TerminationPolicy::MarkTerminated => {
                error!(
                    service = %self.service,
                    "plan stopped running, instancer marked as terminated"
                );
            }
        }
    }
}

/// 在独立任务上运行订阅，并由监督任务处理其结束
fn spawn_watch(runtime: &Handle, shared: Arc<Shared>, subscription: Arc<dyn Subscription>) {
    let span = shared.span.clone();
    let watch_shared = shared.clone();
    let watch_subscription = subscription.clone();

    let watch = runtime.spawn(
        async move {
            let handler = move |event: WatchEvent| watch_shared.handle_change(event);
            watch_subscription.run(&handler).await
        }
        .instrument(span.clone()),
    );

    runtime.spawn(
        async move {
            let outcome = watch.await;
            let closed = shared.state.read().status == FeedStatus::Closed;
            if subscription.is_stopped() || closed {
                debug!(service = %shared.service, "Watch stopped");
                return;
            }
            shared.handle_termination(outcome);
        }
        .instrument(span),
    );
}
