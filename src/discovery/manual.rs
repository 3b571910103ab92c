//! 手动驱动的注册中心订阅
//!
//! 由调用方直接推送实例视图，适用于静态拓扑、嵌入式场景和测试。
//! `publish` 会等待所有运行中的订阅处理完本次变更后才返回。

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::discovery::{ChangeHandler, RegistryFeed, Subscription, WatchEvent, WatchParams};
use crate::error::{InstancerError, Result};

enum FeedMessage {
    Event(WatchEvent, oneshot::Sender<()>),
    Fail(String),
    Finish,
}

struct Subscriber {
    tx: mpsc::UnboundedSender<FeedMessage>,
    cancel: CancellationToken,
}

#[derive(Default)]
struct FeedState {
    subscribers: Vec<Subscriber>,
    reject_next: Option<String>,
}

/// 手动订阅源
#[derive(Clone, Default)]
pub struct ManualFeed {
    state: Arc<Mutex<FeedState>>,
    index: Arc<AtomicU64>,
}

impl ManualFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// 向所有未停止的订阅投递一次变更，返回投递到的订阅数量
    ///
    /// 尚未开始运行的订阅会在运行后处理该变更
    pub async fn publish(&self, payload: serde_json::Value) -> usize {
        let index = self.index.fetch_add(1, Ordering::SeqCst) + 1;
        let acks: Vec<oneshot::Receiver<()>> = {
            let mut state = self.state.lock();
            state.subscribers.retain(|s| !s.cancel.is_cancelled() && !s.tx.is_closed());
            state
                .subscribers
                .iter()
                .filter_map(|s| {
                    let (ack_tx, ack_rx) = oneshot::channel();
                    let event = WatchEvent {
                        index,
                        payload: payload.clone(),
                    };
                    s.tx.send(FeedMessage::Event(event, ack_tx)).ok().map(|_| ack_rx)
                })
                .collect()
        };

        let mut delivered = 0;
        for ack in acks {
            if ack.await.is_ok() {
                delivered += 1;
            }
        }
        debug!(index, delivered, "Manual feed published");
        delivered
    }

    /// 让所有运行中的订阅以错误结束
    pub fn fail(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.broadcast(|| FeedMessage::Fail(reason.clone()));
    }

    /// 让所有运行中的订阅在未请求停止的情况下正常结束
    pub fn finish(&self) {
        self.broadcast(|| FeedMessage::Finish);
    }

    /// 使下一次 `subscribe` 失败
    pub fn reject_next(&self, reason: impl Into<String>) {
        self.state.lock().reject_next = Some(reason.into());
    }

    /// 未停止的订阅数量
    pub fn subscription_count(&self) -> usize {
        let state = self.state.lock();
        state
            .subscribers
            .iter()
            .filter(|s| !s.cancel.is_cancelled() && !s.tx.is_closed())
            .count()
    }

    fn broadcast(&self, message: impl Fn() -> FeedMessage) {
        let mut state = self.state.lock();
        for subscriber in &state.subscribers {
            let _ = subscriber.tx.send(message());
        }
        state.subscribers.clear();
    }
}

impl RegistryFeed for ManualFeed {
    fn subscribe(&self, params: &WatchParams) -> Result<Arc<dyn Subscription>> {
        let mut state = self.state.lock();
        if let Some(reason) = state.reject_next.take() {
            return Err(InstancerError::invalid_plan(params.service.clone(), reason));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        state.subscribers.push(Subscriber {
            tx,
            cancel: cancel.clone(),
        });

        Ok(Arc::new(ManualSubscription {
            rx: Mutex::new(Some(rx)),
            cancel,
        }))
    }
}

/// 手动订阅
pub struct ManualSubscription {
    rx: Mutex<Option<mpsc::UnboundedReceiver<FeedMessage>>>,
    cancel: CancellationToken,
}

#[async_trait]
impl Subscription for ManualSubscription {
    async fn run(&self, on_change: ChangeHandler<'_>) -> Result<()> {
        let mut rx = self
            .rx
            .lock()
            .take()
            .ok_or_else(|| InstancerError::Watch("subscription is already running".to_string()))?;

        loop {
            let message = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(()),
                message = rx.recv() => message,
            };

            match message {
                Some(FeedMessage::Event(event, ack)) => {
                    on_change(event);
                    let _ = ack.send(());
                }
                Some(FeedMessage::Fail(reason)) => return Err(InstancerError::Watch(reason)),
                Some(FeedMessage::Finish) | None => return Ok(()),
            }
        }
    }

    fn stop(&self) {
        self.cancel.cancel();
    }

    fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
