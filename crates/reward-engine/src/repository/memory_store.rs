//! 内存账本存储
//!
//! 与 PostgreSQL 实现保持相同的唯一约束与排序语义，仅用于测试与本地演示。
//! 工作单元持有整个状态的互斥锁，写入通过撤销日志实现 drop 时回滚。

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::traits::{InsertOutcome, LedgerStore, LedgerTransaction};
use crate::error::{Result, RewardError};
use crate::models::{
    BadgeFilter, BadgeRecord, InstitutionLedger, MilestoneRecord, NewBadge, NewMilestone,
    NewRewardTransaction, PendingMint, RewardTransaction, Tier,
};

#[derive(Default)]
struct MemoryState {
    institutions: BTreeMap<i64, InstitutionLedger>,
    wallet_index: HashMap<String, i64>,
    milestones: BTreeMap<i64, MilestoneRecord>,
    milestone_index: HashMap<(i64, i64), i64>,
    badges: BTreeMap<i64, BadgeRecord>,
    badge_index: HashMap<(i64, Tier), i64>,
    token_index: HashSet<i64>,
    transactions: BTreeMap<i64, RewardTransaction>,
    /// 全局自增序列，与数据库序列一样回滚时不回退
    last_id: i64,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn institution_by_wallet(&self, wallet_address: &str) -> Option<&InstitutionLedger> {
        self.wallet_index
            .get(wallet_address)
            .and_then(|id| self.institutions.get(id))
    }

    fn revert(&mut self, op: Undo) {
        match op {
            Undo::InstitutionCreated { id, wallet_address } => {
                self.institutions.remove(&id);
                self.wallet_index.remove(&wallet_address);
            }
            Undo::InstitutionUpdated(previous) => {
                self.institutions.insert(previous.id, previous);
            }
            Undo::TransactionAppended(id) => {
                self.transactions.remove(&id);
            }
            Undo::MilestoneInserted { id, key } => {
                self.milestones.remove(&id);
                self.milestone_index.remove(&key);
            }
            Undo::MilestoneLinked(id) => {
                if let Some(milestone) = self.milestones.get_mut(&id) {
                    milestone.badge_id = None;
                }
            }
            Undo::BadgeInserted { id, key, token_id } => {
                self.badges.remove(&id);
                self.badge_index.remove(&key);
                self.token_index.remove(&token_id);
            }
        }
    }
}

/// 撤销日志条目
enum Undo {
    InstitutionCreated { id: i64, wallet_address: String },
    InstitutionUpdated(InstitutionLedger),
    TransactionAppended(i64),
    MilestoneInserted { id: i64, key: (i64, i64) },
    MilestoneLinked(i64),
    BadgeInserted {
        id: i64,
        key: (i64, Tier),
        token_id: i64,
    },
}

/// 内存账本存储
///
/// 仅用于测试与本地演示。整个存储共用一把异步锁，工作单元在提交或回滚前
/// 一直持有它，不同机构的写入也会串行执行；生产环境使用 [`PgLedgerStore`]。
///
/// 工作单元存活期间不要在同一任务里调用本存储的读方法，否则会等待自己持有的锁。
///
/// [`PgLedgerStore`]: super::PgLedgerStore
#[derive(Clone, Default)]
pub struct InMemoryLedgerStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>> {
        let guard = self.state.clone().lock_owned().await;
        Ok(Box::new(MemoryTransaction {
            state: guard,
            undo: Vec::new(),
            committed: false,
        }))
    }

    async fn find_institution(&self, wallet_address: &str) -> Result<Option<InstitutionLedger>> {
        let state = self.state.lock().await;
        Ok(state.institution_by_wallet(wallet_address).cloned())
    }

    async fn leaderboard(&self, limit: i64) -> Result<Vec<InstitutionLedger>> {
        let state = self.state.lock().await;
        let mut institutions: Vec<InstitutionLedger> =
            state.institutions.values().cloned().collect();
        institutions.sort_by(|a, b| {
            b.total_certificates_issued
                .cmp(&a.total_certificates_issued)
                .then(a.id.cmp(&b.id))
        });
        institutions.truncate(limit.max(0) as usize);
        Ok(institutions)
    }

    async fn find_badge(&self, institution_id: i64, tier: Tier) -> Result<Option<BadgeRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .badge_index
            .get(&(institution_id, tier))
            .and_then(|id| state.badges.get(id))
            .cloned())
    }

    async fn list_badges(&self, filter: &BadgeFilter) -> Result<Vec<BadgeRecord>> {
        let state = self.state.lock().await;

        let institution_id = match &filter.wallet_address {
            Some(wallet) => match state.wallet_index.get(wallet) {
                Some(id) => Some(*id),
                None => return Ok(Vec::new()),
            },
            None => None,
        };

        let mut badges: Vec<BadgeRecord> = state
            .badges
            .values()
            .filter(|b| institution_id.is_none_or(|id| b.institution_id == id))
            .filter(|b| filter.tier.is_none_or(|tier| b.tier == tier))
            .cloned()
            .collect();
        badges.sort_by(|a, b| b.minted_at.cmp(&a.minted_at).then(b.id.cmp(&a.id)));
        Ok(badges)
    }

    async fn list_milestones(&self, institution_id: i64) -> Result<Vec<MilestoneRecord>> {
        let state = self.state.lock().await;
        let mut milestones: Vec<MilestoneRecord> = state
            .milestones
            .values()
            .filter(|m| m.institution_id == institution_id)
            .cloned()
            .collect();
        milestones.sort_by(|a, b| b.achieved_at.cmp(&a.achieved_at).then(b.id.cmp(&a.id)));
        Ok(milestones)
    }

    async fn list_unlinked_milestones(&self, limit: i64) -> Result<Vec<PendingMint>> {
        let state = self.state.lock().await;
        let mut unlinked: Vec<&MilestoneRecord> = state
            .milestones
            .values()
            .filter(|m| m.badge_id.is_none())
            .collect();
        unlinked.sort_by(|a, b| a.achieved_at.cmp(&b.achieved_at).then(a.id.cmp(&b.id)));

        let pending = unlinked
            .into_iter()
            .filter_map(|m| {
                state.institutions.get(&m.institution_id).map(|inst| PendingMint {
                    milestone_id: m.id,
                    institution_id: inst.id,
                    wallet_address: inst.wallet_address.clone(),
                    institution_name: inst.institution_name.clone(),
                    threshold: m.threshold,
                    tier: m.tier_achieved,
                    certificate_count: m.certificate_count,
                })
            })
            .take(limit.max(0) as usize)
            .collect();
        Ok(pending)
    }

    async fn list_transactions(
        &self,
        institution_id: i64,
        limit: i64,
    ) -> Result<Vec<RewardTransaction>> {
        let state = self.state.lock().await;
        let mut transactions: Vec<RewardTransaction> = state
            .transactions
            .values()
            .filter(|t| t.institution_id == institution_id)
            .cloned()
            .collect();
        transactions.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        transactions.truncate(limit.max(0) as usize);
        Ok(transactions)
    }
}

/// 内存工作单元
pub struct MemoryTransaction {
    state: OwnedMutexGuard<MemoryState>,
    undo: Vec<Undo>,
    committed: bool,
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let undo = std::mem::take(&mut self.undo);
        for op in undo.into_iter().rev() {
            self.state.revert(op);
        }
    }
}

#[async_trait]
impl LedgerTransaction for MemoryTransaction {
    async fn lock_or_create_institution(
        &mut self,
        wallet_address: &str,
        institution_name: &str,
    ) -> Result<(InstitutionLedger, bool)> {
        if let Some(existing) = self.state.institution_by_wallet(wallet_address) {
            return Ok((existing.clone(), false));
        }

        let now = Utc::now();
        let id = self.state.next_id();
        let ledger = InstitutionLedger {
            id,
            wallet_address: wallet_address.to_string(),
            institution_name: institution_name.to_string(),
            total_certificates_issued: 0,
            reward_points: 0,
            current_tier: Tier::None,
            badges_earned: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        self.state.institutions.insert(id, ledger.clone());
        self.state
            .wallet_index
            .insert(wallet_address.to_string(), id);
        self.undo.push(Undo::InstitutionCreated {
            id,
            wallet_address: wallet_address.to_string(),
        });

        Ok((ledger, true))
    }

    async fn lock_institution(
        &mut self,
        wallet_address: &str,
    ) -> Result<Option<InstitutionLedger>> {
        Ok(self.state.institution_by_wallet(wallet_address).cloned())
    }

    async fn update_institution(&mut self, ledger: &InstitutionLedger) -> Result<()> {
        let previous = self
            .state
            .institutions
            .insert(ledger.id, ledger.clone())
            .ok_or_else(|| RewardError::Internal(format!("机构账本不存在: id={}", ledger.id)))?;
        self.undo.push(Undo::InstitutionUpdated(previous));
        Ok(())
    }

    async fn append_transaction(
        &mut self,
        transaction: &NewRewardTransaction,
    ) -> Result<RewardTransaction> {
        let id = self.state.next_id();
        let record = RewardTransaction {
            id,
            institution_id: transaction.institution_id,
            transaction_type: transaction.transaction_type,
            points_delta: transaction.points_delta,
            description: transaction.description.clone(),
            external_reference: transaction.external_reference.clone(),
            metadata: transaction.metadata.clone(),
            created_at: Utc::now(),
        };
        self.state.transactions.insert(id, record.clone());
        self.undo.push(Undo::TransactionAppended(id));
        Ok(record)
    }

    async fn insert_milestone(
        &mut self,
        milestone: &NewMilestone,
    ) -> Result<InsertOutcome<MilestoneRecord>> {
        let key = (milestone.institution_id, milestone.threshold);
        if self.state.milestone_index.contains_key(&key) {
            return Ok(InsertOutcome::Duplicate);
        }

        let id = self.state.next_id();
        let record = MilestoneRecord {
            id,
            institution_id: milestone.institution_id,
            threshold: milestone.threshold,
            tier_achieved: milestone.tier_achieved,
            certificate_count: milestone.certificate_count,
            badge_id: None,
            achieved_at: Utc::now(),
        };
        self.state.milestones.insert(id, record.clone());
        self.state.milestone_index.insert(key, id);
        self.undo.push(Undo::MilestoneInserted { id, key });
        Ok(InsertOutcome::Inserted(record))
    }

    async fn insert_badge(&mut self, badge: &NewBadge) -> Result<InsertOutcome<BadgeRecord>> {
        let key = (badge.institution_id, badge.tier);
        if self.state.badge_index.contains_key(&key) {
            return Ok(InsertOutcome::Duplicate);
        }
        if self.state.token_index.contains(&badge.token_id) {
            return Err(RewardError::LedgerUnavailable(format!(
                "唯一约束冲突: token_id={}",
                badge.token_id
            )));
        }

        let id = self.state.next_id();
        let record = BadgeRecord {
            id,
            institution_id: badge.institution_id,
            token_id: badge.token_id,
            tier: badge.tier,
            certificate_count_at_mint: badge.certificate_count_at_mint,
            transaction_reference: badge.transaction_reference.clone(),
            block_reference: badge.block_reference,
            metadata_uri: badge.metadata_uri.clone(),
            metadata: badge.metadata.clone(),
            minted_at: Utc::now(),
        };
        self.state.badges.insert(id, record.clone());
        self.state.badge_index.insert(key, id);
        self.state.token_index.insert(badge.token_id);
        self.undo.push(Undo::BadgeInserted {
            id,
            key,
            token_id: badge.token_id,
        });
        Ok(InsertOutcome::Inserted(record))
    }

    async fn link_milestone_badge(&mut self, milestone_id: i64, badge_id: i64) -> Result<bool> {
        match self.state.milestones.get_mut(&milestone_id) {
            Some(milestone) if milestone.badge_id.is_none() => {
                milestone.badge_id = Some(badge_id);
                self.undo.push(Undo::MilestoneLinked(milestone_id));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        self.committed = true;
        self.undo.clear();
        Ok(())
    }
}
