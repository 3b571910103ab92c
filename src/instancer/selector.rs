//! 轮询选择器

use std::sync::atomic::{AtomicU64, Ordering};

/// 轮询（Round Robin）选择器
///
/// 游标与实例列表相互独立：列表被替换时游标不重置，下标对新长度取模。
/// 列表稳定期间连续的选择会依次访问每个实例；跨列表替换时只保证返回某个近期列表中的实例。
#[derive(Debug, Default)]
pub struct Selector {
    cursor: AtomicU64,
}

impl Selector {
    pub fn new() -> Self {
        Self::default()
    }

    /// 选择一个实例，列表为空时返回 `None` 且不移动游标
    pub fn select<'a, T>(&self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed);
        items.get((index % items.len() as u64) as usize)
    }

    /// 已完成的选择次数
    pub fn cursor(&self) -> u64 {
        self.cursor.load(Ordering::Relaxed)
    }
}
