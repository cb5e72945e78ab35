//! 等级计算与里程碑检测
//!
//! 纯函数模块，无状态、无副作用：
//!
//! - `calculator`: 证书数 -> 等级 / 下一里程碑 / 进度
//! - `detector`: 旧计数与新计数之间跨越的里程碑（半开区间判定）

mod calculator;
mod detector;

pub use calculator::{
    MILESTONES, Milestone, bonus_points_for, milestone_for, next_threshold, progress_percent,
    tier_for,
};
pub use detector::detect_crossings;
