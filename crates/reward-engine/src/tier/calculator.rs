//! 等级计算器

use crate::models::Tier;

/// 里程碑定义
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Milestone {
    /// 累计证书数阈值
    pub threshold: i64,
    /// 达成后的等级
    pub tier: Tier,
    /// 一次性奖励积分
    pub bonus_points: i64,
}

/// 固定的里程碑表，按阈值升序
pub const MILESTONES: [Milestone; 5] = [
    Milestone {
        threshold: 10,
        tier: Tier::Bronze,
        bonus_points: 100,
    },
    Milestone {
        threshold: 50,
        tier: Tier::Silver,
        bonus_points: 500,
    },
    Milestone {
        threshold: 100,
        tier: Tier::Gold,
        bonus_points: 1000,
    },
    Milestone {
        threshold: 250,
        tier: Tier::Platinum,
        bonus_points: 2500,
    },
    Milestone {
        threshold: 500,
        tier: Tier::Diamond,
        bonus_points: 5000,
    },
];

/// 不超过 count 的最高阈值对应的等级，低于首个阈值时为 NONE
pub fn tier_for(count: i64) -> Tier {
    MILESTONES
        .iter()
        .rev()
        .find(|m| m.threshold <= count)
        .map(|m| m.tier)
        .unwrap_or(Tier::None)
}

/// 严格大于 count 的最小阈值
pub fn next_threshold(count: i64) -> Option<i64> {
    MILESTONES
        .iter()
        .map(|m| m.threshold)
        .find(|&threshold| threshold > count)
}

/// floor(100 * count / next_threshold)，无下一阈值时为 100
pub fn progress_percent(count: i64) -> u8 {
    match next_threshold(count) {
        Some(next) => {
            let percent = (count.max(0) * 100) / next;
            percent.clamp(0, 100) as u8
        }
        None => 100,
    }
}

pub fn milestone_for(threshold: i64) -> Option<Milestone> {
    MILESTONES.iter().copied().find(|m| m.threshold == threshold)
}

/// 阈值对应的奖励积分，非里程碑阈值为 0
pub fn bonus_points_for(threshold: i64) -> i64 {
    milestone_for(threshold)
        .map(|m| m.bonus_points)
        .unwrap_or(0)
}
