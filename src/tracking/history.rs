//! 定长环形缓冲区
//!
//! 所有检测器的历史窗口都用它：满时 push 淘汰最旧样本，O(1)。
//! `recent(0)` 是最新样本，`recent(1)` 是上一个，以此类推。

use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, item: T) {
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    /// 按新旧顺序取样本，0 为最新
    pub fn recent(&self, age: usize) -> Option<&T> {
        let len = self.items.len();
        if age >= len {
            return None;
        }
        self.items.get(len - 1 - age)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 从旧到新遍历
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// 相邻样本对 (旧, 新)，从旧到新
    pub fn pairs(&self) -> impl Iterator<Item = (&T, &T)> {
        self.items.iter().zip(self.items.iter().skip(1))
    }
}

/// 取排序后第 `floor(len * fraction)` 个值（越界时取最大值）
///
/// 与逐帧阈值计算约定一致：不做插值。
pub fn percentile(values: &mut [f64], fraction: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let index = ((values.len() as f64 * fraction) as usize).min(values.len() - 1);
    Some(values[index])
}
