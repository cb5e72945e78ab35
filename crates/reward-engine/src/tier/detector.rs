//! 里程碑检测器
//!
//! 使用半开区间 `old < t <= new` 判定跨越，而不是等值判定：
//! 单次通知可能代表批量增量（补数、校正），计数可能直接越过阈值而从不等于它。

use super::calculator::{MILESTONES, Milestone};

/// 返回 (old_count, new_count] 区间内的全部里程碑，按阈值升序
///
/// new_count <= old_count 时返回空
pub fn detect_crossings(old_count: i64, new_count: i64) -> Vec<Milestone> {
    if new_count <= old_count {
        return Vec::new();
    }

    MILESTONES
        .iter()
        .copied()
        .filter(|m| old_count < m.threshold && m.threshold <= new_count)
        .collect()
}
