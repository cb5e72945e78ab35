//! PostgreSQL 账本存储
//!
//! 工作单元包装一个 sqlx 事务，机构行通过 `SELECT ... FOR UPDATE` 加锁，
//! 唯一约束冲突通过 `ON CONFLICT DO NOTHING RETURNING` 转换为 `Duplicate`。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;

use super::traits::{InsertOutcome, LedgerStore, LedgerTransaction};
use crate::error::{Result, RewardError};
use crate::models::{
    BadgeFilter, BadgeMetadata, BadgeRecord, BadgeSummary, InstitutionLedger, MilestoneRecord,
    NewBadge, NewMilestone, NewRewardTransaction, PendingMint, RewardTransaction, Tier,
    TransactionMetadata, TransactionType,
};

/// 编译期嵌入的迁移脚本
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const INSTITUTION_COLUMNS: &str = "id, wallet_address, institution_name, total_certificates_issued, \
     reward_points, current_tier, badges_earned, created_at, updated_at";

const BADGE_COLUMNS: &str = "id, institution_id, token_id, tier, certificate_count_at_mint, \
     transaction_reference, block_reference, metadata_uri, metadata, minted_at";

const MILESTONE_COLUMNS: &str =
    "id, institution_id, threshold, tier_achieved, certificate_count, badge_id, achieved_at";

const TRANSACTION_COLUMNS: &str = "id, institution_id, transaction_type, points_delta, description, \
     external_reference, metadata, created_at";

// ==================== 行映射 ====================

#[derive(sqlx::FromRow)]
struct InstitutionRow {
    id: i64,
    wallet_address: String,
    institution_name: String,
    total_certificates_issued: i64,
    reward_points: i64,
    current_tier: Tier,
    badges_earned: Json<Vec<BadgeSummary>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<InstitutionRow> for InstitutionLedger {
    fn from(row: InstitutionRow) -> Self {
        Self {
            id: row.id,
            wallet_address: row.wallet_address,
            institution_name: row.institution_name,
            total_certificates_issued: row.total_certificates_issued,
            reward_points: row.reward_points,
            current_tier: row.current_tier,
            badges_earned: row.badges_earned.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct BadgeRow {
    id: i64,
    institution_id: i64,
    token_id: i64,
    tier: Tier,
    certificate_count_at_mint: i64,
    transaction_reference: String,
    block_reference: Option<i64>,
    metadata_uri: String,
    metadata: Json<BadgeMetadata>,
    minted_at: DateTime<Utc>,
}

impl From<BadgeRow> for BadgeRecord {
    fn from(row: BadgeRow) -> Self {
        Self {
            id: row.id,
            institution_id: row.institution_id,
            token_id: row.token_id,
            tier: row.tier,
            certificate_count_at_mint: row.certificate_count_at_mint,
            transaction_reference: row.transaction_reference,
            block_reference: row.block_reference,
            metadata_uri: row.metadata_uri,
            metadata: row.metadata.0,
            minted_at: row.minted_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct MilestoneRow {
    id: i64,
    institution_id: i64,
    threshold: i64,
    tier_achieved: Tier,
    certificate_count: i64,
    badge_id: Option<i64>,
    achieved_at: DateTime<Utc>,
}

impl From<MilestoneRow> for MilestoneRecord {
    fn from(row: MilestoneRow) -> Self {
        Self {
            id: row.id,
            institution_id: row.institution_id,
            threshold: row.threshold,
            tier_achieved: row.tier_achieved,
            certificate_count: row.certificate_count,
            badge_id: row.badge_id,
            achieved_at: row.achieved_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PendingMintRow {
    milestone_id: i64,
    institution_id: i64,
    wallet_address: String,
    institution_name: String,
    threshold: i64,
    tier: Tier,
    certificate_count: i64,
}

impl From<PendingMintRow> for PendingMint {
    fn from(row: PendingMintRow) -> Self {
        Self {
            milestone_id: row.milestone_id,
            institution_id: row.institution_id,
            wallet_address: row.wallet_address,
            institution_name: row.institution_name,
            threshold: row.threshold,
            tier: row.tier,
            certificate_count: row.certificate_count,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TransactionRow {
    id: i64,
    institution_id: i64,
    transaction_type: TransactionType,
    points_delta: i64,
    description: String,
    external_reference: Option<String>,
    metadata: Json<TransactionMetadata>,
    created_at: DateTime<Utc>,
}

impl From<TransactionRow> for RewardTransaction {
    fn from(row: TransactionRow) -> Self {
        Self {
            id: row.id,
            institution_id: row.institution_id,
            transaction_type: row.transaction_type,
            points_delta: row.points_delta,
            description: row.description,
            external_reference: row.external_reference,
            metadata: row.metadata.0,
            created_at: row.created_at,
        }
    }
}

// ==================== 存储 ====================

/// PostgreSQL 账本存储
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgLedgerTransaction { tx }))
    }

    async fn find_institution(&self, wallet_address: &str) -> Result<Option<InstitutionLedger>> {
        let row = sqlx::query_as::<_, InstitutionRow>(&format!(
            "SELECT {INSTITUTION_COLUMNS} FROM institution_ledgers WHERE wallet_address = $1"
        ))
        .bind(wallet_address)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn leaderboard(&self, limit: i64) -> Result<Vec<InstitutionLedger>> {
        let rows = sqlx::query_as::<_, InstitutionRow>(&format!(
            r#"
            SELECT {INSTITUTION_COLUMNS}
            FROM institution_ledgers
            ORDER BY total_certificates_issued DESC, id ASC
            LIMIT $1
            "#
        ))
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn find_badge(&self, institution_id: i64, tier: Tier) -> Result<Option<BadgeRecord>> {
        let row = sqlx::query_as::<_, BadgeRow>(&format!(
            "SELECT {BADGE_COLUMNS} FROM badge_records WHERE institution_id = $1 AND tier = $2"
        ))
        .bind(institution_id)
        .bind(tier)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn list_badges(&self, filter: &BadgeFilter) -> Result<Vec<BadgeRecord>> {
        let rows = sqlx::query_as::<_, BadgeRow>(
            r#"
            SELECT b.id, b.institution_id, b.token_id, b.tier, b.certificate_count_at_mint,
                   b.transaction_reference, b.block_reference, b.metadata_uri, b.metadata,
                   b.minted_at
            FROM badge_records b
            JOIN institution_ledgers i ON i.id = b.institution_id
            WHERE ($1::varchar IS NULL OR i.wallet_address = $1)
              AND ($2::varchar IS NULL OR b.tier = $2)
            ORDER BY b.minted_at DESC, b.id DESC
            "#,
        )
        .bind(filter.wallet_address.as_deref())
        .bind(filter.tier)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_milestones(&self, institution_id: i64) -> Result<Vec<MilestoneRecord>> {
        let rows = sqlx::query_as::<_, MilestoneRow>(&format!(
            r#"
            SELECT {MILESTONE_COLUMNS}
            FROM milestone_records
            WHERE institution_id = $1
            ORDER BY achieved_at DESC, id DESC
            "#
        ))
        .bind(institution_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_unlinked_milestones(&self, limit: i64) -> Result<Vec<PendingMint>> {
        let rows = sqlx::query_as::<_, PendingMintRow>(
            r#"
            SELECT m.id AS milestone_id, i.id AS institution_id, i.wallet_address,
                   i.institution_name, m.threshold, m.tier_achieved AS tier, m.certificate_count
            FROM milestone_records m
            JOIN institution_ledgers i ON i.id = m.institution_id
            WHERE m.badge_id IS NULL
            ORDER BY m.achieved_at ASC, m.id ASC
            LIMIT $1
            "#,
        )
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_transactions(
        &self,
        institution_id: i64,
        limit: i64,
    ) -> Result<Vec<RewardTransaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS}
            FROM reward_transactions
            WHERE institution_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#
        ))
        .bind(institution_id)
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

// ==================== 工作单元 ====================

/// PostgreSQL 工作单元
///
/// sqlx 事务未提交即被 drop 时自动回滚
pub struct PgLedgerTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTransaction for PgLedgerTransaction {
    async fn lock_or_create_institution(
        &mut self,
        wallet_address: &str,
        institution_name: &str,
    ) -> Result<(InstitutionLedger, bool)> {
        // 已存在的机构直接加锁，不消耗序列值
        if let Some(existing) = self.lock_institution(wallet_address).await? {
            return Ok((existing, false));
        }

        let inserted = sqlx::query_as::<_, InstitutionRow>(&format!(
            r#"
            INSERT INTO institution_ledgers (wallet_address, institution_name)
            VALUES ($1, $2)
            ON CONFLICT (wallet_address) DO NOTHING
            RETURNING {INSTITUTION_COLUMNS}
            "#
        ))
        .bind(wallet_address)
        .bind(institution_name)
        .fetch_optional(&mut *self.tx)
        .await?;

        if let Some(row) = inserted {
            debug!(wallet = %wallet_address, "Institution ledger created");
            return Ok((row.into(), true));
        }

        // 并发创建：另一个事务先插入，等待其提交后加锁
        let existing = self
            .lock_institution(wallet_address)
            .await?
            .ok_or_else(|| {
                RewardError::Internal(format!("机构账本插入冲突后未找到: {}", wallet_address))
            })?;
        Ok((existing, false))
    }

    async fn lock_institution(
        &mut self,
        wallet_address: &str,
    ) -> Result<Option<InstitutionLedger>> {
        let row = sqlx::query_as::<_, InstitutionRow>(&format!(
            "SELECT {INSTITUTION_COLUMNS} FROM institution_ledgers WHERE wallet_address = $1 FOR UPDATE"
        ))
        .bind(wallet_address)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn update_institution(&mut self, ledger: &InstitutionLedger) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE institution_ledgers
            SET total_certificates_issued = $2, reward_points = $3, current_tier = $4,
                badges_earned = $5, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(ledger.id)
        .bind(ledger.total_certificates_issued)
        .bind(ledger.reward_points)
        .bind(ledger.current_tier)
        .bind(Json(&ledger.badges_earned))
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RewardError::Internal(format!(
                "机构账本不存在: id={}",
                ledger.id
            )));
        }
        Ok(())
    }

    async fn append_transaction(
        &mut self,
        transaction: &NewRewardTransaction,
    ) -> Result<RewardTransaction> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            INSERT INTO reward_transactions
                (institution_id, transaction_type, points_delta, description,
                 external_reference, metadata)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {TRANSACTION_COLUMNS}
            "#
        ))
        .bind(transaction.institution_id)
        .bind(transaction.transaction_type)
        .bind(transaction.points_delta)
        .bind(&transaction.description)
        .bind(transaction.external_reference.as_deref())
        .bind(Json(&transaction.metadata))
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(row.into())
    }

    async fn insert_milestone(
        &mut self,
        milestone: &NewMilestone,
    ) -> Result<InsertOutcome<MilestoneRecord>> {
        let row = sqlx::query_as::<_, MilestoneRow>(&format!(
            r#"
            INSERT INTO milestone_records
                (institution_id, threshold, tier_achieved, certificate_count)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (institution_id, threshold) DO NOTHING
            RETURNING {MILESTONE_COLUMNS}
            "#
        ))
        .bind(milestone.institution_id)
        .bind(milestone.threshold)
        .bind(milestone.tier_achieved)
        .bind(milestone.certificate_count)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(match row {
            Some(row) => InsertOutcome::Inserted(row.into()),
            None => InsertOutcome::Duplicate,
        })
    }

    async fn insert_badge(&mut self, badge: &NewBadge) -> Result<InsertOutcome<BadgeRecord>> {
        // 仅吸收 (institution_id, tier) 冲突，token_id 冲突属于数据异常，照常报错
        let row = sqlx::query_as::<_, BadgeRow>(&format!(
            r#"
            INSERT INTO badge_records
                (institution_id, token_id, tier, certificate_count_at_mint,
                 transaction_reference, block_reference, metadata_uri, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT ON CONSTRAINT uq_badge_records_institution_tier DO NOTHING
            RETURNING {BADGE_COLUMNS}
            "#
        ))
        .bind(badge.institution_id)
        .bind(badge.token_id)
        .bind(badge.tier)
        .bind(badge.certificate_count_at_mint)
        .bind(&badge.transaction_reference)
        .bind(badge.block_reference)
        .bind(&badge.metadata_uri)
        .bind(Json(&badge.metadata))
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(match row {
            Some(row) => InsertOutcome::Inserted(row.into()),
            None => InsertOutcome::Duplicate,
        })
    }

    async fn link_milestone_badge(&mut self, milestone_id: i64, badge_id: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE milestone_records SET badge_id = $2 WHERE id = $1 AND badge_id IS NULL",
        )
        .bind(milestone_id)
        .bind(badge_id)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let this = *self;
        this.tx.commit().await?;
        Ok(())
    }
}
