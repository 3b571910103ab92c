//! 实例变更监听器

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tracing::error;

/// 实例变更监听器
///
/// 注册到 `Instancer` 后，每次实例列表变化都会以最新列表调用 `on_change`，
/// 注册时也会立即以当前列表调用一次。调用发生在实例跟踪器的写锁内，
/// 实现中不能回调同一个 `Instancer`。
pub trait InstanceListener: Send + Sync {
    fn on_change(&self, instances: &[String]);
}

impl<F> InstanceListener for F
where
    F: Fn(&[String]) + Send + Sync,
{
    fn on_change(&self, instances: &[String]) {
        self(instances)
    }
}

/// 按注册顺序保存的监听器集合，不去重
#[derive(Default)]
pub(crate) struct ListenerSet {
    listeners: Vec<Arc<dyn InstanceListener>>,
}

impl ListenerSet {
    pub(crate) fn push(&mut self, listener: Arc<dyn InstanceListener>) {
        self.listeners.push(listener);
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.listeners.clear();
    }

    /// 依次通知所有监听器，返回成功处理的数量
    pub(crate) fn notify_all(&self, instances: &[String], service: &str) -> usize {
        let mut delivered = 0;
        for listener in &self.listeners {
            if notify(listener.as_ref(), instances, service) {
                delivered += 1;
            }
        }
        delivered
    }
}

/// 调用单个监听器，捕获其 panic 以免影响后续监听器和订阅任务
pub(crate) fn notify(listener: &dyn InstanceListener, instances: &[String], service: &str) -> bool {
    match catch_unwind(AssertUnwindSafe(|| listener.on_change(instances))) {
        Ok(()) => true,
        Err(panic) => {
            error!(
                service,
                panic = panic_message(panic.as_ref()),
                "InstanceListener panicked while handling change"
            );
            false
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic"
    }
}
