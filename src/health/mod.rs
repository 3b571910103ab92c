//! 订阅健康状态

/// 注册中心订阅的健康状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FeedStatus {
    /// 订阅已启动，尚未收到第一次变更
    #[default]
    Starting,
    /// 至少收到过一次变更，实例列表保持最新
    Serving,
    /// 订阅意外结束，实例列表可能已过期
    Terminated,
    /// 已调用 close
    Closed,
}

impl FeedStatus {
    /// 当前实例列表是否可以作为最新数据使用
    pub fn is_live(self) -> bool {
        matches!(self, FeedStatus::Starting | FeedStatus::Serving)
    }
}
