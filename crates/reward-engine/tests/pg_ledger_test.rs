//! PostgreSQL 账本存储集成测试
//!
//! 验证唯一约束、工作单元回滚与流水只追加约束在真实数据库上的行为。
//!
//! 运行方式：
//! ```bash
//! DATABASE_URL=postgres://... \
//!   cargo test --test pg_ledger_test -- --ignored
//! ```

use std::sync::Arc;

use futures::future::join_all;
use reward_engine::{
    BadgeMetadata, InsertOutcome, LedgerStore, MIGRATOR, NewBadge, NewMilestone, PgLedgerStore,
    RewardService, Tier,
};
use reward_shared::config::RewardConfig;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::{Mutex, MutexGuard};

/// 本文件的测试会检查序列值，串行执行避免相互干扰
static SERIAL: Mutex<()> = Mutex::const_new(());

// ==================== 辅助函数 ====================

fn database_url() -> String {
    std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for integration tests")
}

async fn setup() -> (MutexGuard<'static, ()>, PgPool, PgLedgerStore) {
    let serial = SERIAL.lock().await;
    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(&database_url())
        .await
        .expect("Failed to connect to database");
    MIGRATOR.run(&pool).await.expect("Failed to run migrations");
    let store = PgLedgerStore::new(pool.clone());
    (serial, pool, store)
}

/// 每个测试使用独立钱包，避免相互干扰
fn unique_wallet(prefix: &str) -> String {
    let nanos = chrono::Utc::now()
        .timestamp_nanos_opt()
        .expect("timestamp in range");
    format!("0x{}{:x}", prefix, nanos)
}

// ==================== 测试用例 ====================

#[tokio::test]
#[ignore = "需要 PostgreSQL 数据库连接"]
async fn test_pg_issuance_reaches_bronze() {
    let (_serial, _pool, store) = setup().await;
    let wallet = unique_wallet("bronze");
    let service = RewardService::new(Arc::new(store.clone()), &RewardConfig::default());

    let mut ledger = None;
    for i in 0..10 {
        ledger = Some(
            service
                .record_issuance(&wallet, "PG University", &format!("cert-{}", i))
                .await
                .unwrap(),
        );
    }
    let ledger = ledger.unwrap();

    assert_eq!(ledger.total_certificates_issued, 10);
    assert_eq!(ledger.reward_points, 200);
    assert_eq!(ledger.current_tier, Tier::Bronze);

    let milestones = store.list_milestones(ledger.id).await.unwrap();
    assert_eq!(milestones.len(), 1);
    assert_eq!(milestones[0].threshold, 10);

    let transactions = store.list_transactions(ledger.id, 100).await.unwrap();
    assert_eq!(transactions.len(), 11);
    let sum: i64 = transactions.iter().map(|t| t.points_delta).sum();
    assert_eq!(sum, ledger.reward_points);
}

#[tokio::test]
#[ignore = "需要 PostgreSQL 数据库连接"]
async fn test_pg_concurrent_issuance_serializes_on_row_lock() {
    let (_serial, _pool, store) = setup().await;
    let wallet = unique_wallet("race");
    let store = Arc::new(store);

    // 两个服务实例不共享进程内锁，只依赖行锁
    let service_a = Arc::new(RewardService::new(store.clone(), &RewardConfig::default()));
    let service_b = Arc::new(RewardService::new(store.clone(), &RewardConfig::default()));

    let mut handles = Vec::new();
    for i in 0..20 {
        let service = if i % 2 == 0 {
            service_a.clone()
        } else {
            service_b.clone()
        };
        let wallet = wallet.clone();
        handles.push(tokio::spawn(async move {
            service
                .record_issuance(&wallet, "Race University", &format!("cert-{}", i))
                .await
        }));
    }
    for result in join_all(handles).await {
        result.unwrap().unwrap();
    }

    let ledger = store.find_institution(&wallet).await.unwrap().unwrap();
    assert_eq!(ledger.total_certificates_issued, 20);
    assert_eq!(ledger.reward_points, 20 * 10 + 100);
    assert_eq!(store.list_milestones(ledger.id).await.unwrap().len(), 1);
}

#[tokio::test]
#[ignore = "需要 PostgreSQL 数据库连接"]
async fn test_pg_unique_constraints_report_duplicates() {
    let (_serial, _pool, store) = setup().await;
    let wallet = unique_wallet("dup");

    let mut tx = store.begin().await.unwrap();
    let (ledger, created) = tx
        .lock_or_create_institution(&wallet, "Dup College")
        .await
        .unwrap();
    assert!(created);

    let milestone = NewMilestone {
        institution_id: ledger.id,
        threshold: 10,
        tier_achieved: Tier::Bronze,
        certificate_count: 10,
    };
    let first = tx.insert_milestone(&milestone).await.unwrap();
    assert!(matches!(first, InsertOutcome::Inserted(_)));
    let second = tx.insert_milestone(&milestone).await.unwrap();
    assert!(second.is_duplicate());

    let token_id = chrono::Utc::now().timestamp_micros();
    let badge = NewBadge {
        institution_id: ledger.id,
        token_id,
        tier: Tier::Bronze,
        certificate_count_at_mint: 10,
        transaction_reference: "0xabc".to_string(),
        block_reference: Some(1),
        metadata_uri: format!("https://ceversys.com/nft-metadata/{}/bronze.json", wallet),
        metadata: BadgeMetadata {
            institution_name: "Dup College".to_string(),
            tier: Tier::Bronze,
            certificate_count: 10,
            token_id,
            extra: Default::default(),
        },
    };
    let inserted = tx.insert_badge(&badge).await.unwrap().inserted().unwrap();
    let again = NewBadge {
        token_id: token_id + 1,
        ..badge.clone()
    };
    assert!(tx.insert_badge(&again).await.unwrap().is_duplicate());

    let milestone_id = first.inserted().unwrap().id;
    assert!(tx.link_milestone_badge(milestone_id, inserted.id).await.unwrap());
    assert!(!tx.link_milestone_badge(milestone_id, inserted.id).await.unwrap());
    tx.commit().await.unwrap();

    let found = store.find_badge(ledger.id, Tier::Bronze).await.unwrap().unwrap();
    assert_eq!(found.token_id, token_id);
    assert_eq!(found.metadata.institution_name, "Dup College");
}

#[tokio::test]
#[ignore = "需要 PostgreSQL 数据库连接"]
async fn test_pg_dropped_transaction_rolls_back() {
    let (_serial, _pool, store) = setup().await;
    let wallet = unique_wallet("rollback");

    {
        let mut tx = store.begin().await.unwrap();
        tx.lock_or_create_institution(&wallet, "Rollback College")
            .await
            .unwrap();
        // 未提交即 drop
    }

    assert!(store.find_institution(&wallet).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "需要 PostgreSQL 数据库连接"]
async fn test_pg_transactions_are_append_only() {
    let (_serial, pool, store) = setup().await;
    let wallet = unique_wallet("append");
    let service = RewardService::new(Arc::new(store.clone()), &RewardConfig::default());

    let ledger = service
        .record_issuance(&wallet, "Append College", "cert-1")
        .await
        .unwrap();

    let update = sqlx::query("UPDATE reward_transactions SET points_delta = 0 WHERE institution_id = $1")
        .bind(ledger.id)
        .execute(&pool)
        .await;
    assert!(update.is_err());

    let delete = sqlx::query("DELETE FROM reward_transactions WHERE institution_id = $1")
        .bind(ledger.id)
        .execute(&pool)
        .await;
    assert!(delete.is_err());

    assert_eq!(store.list_transactions(ledger.id, 10).await.unwrap().len(), 1);
}

#[tokio::test]
#[ignore = "需要 PostgreSQL 数据库连接"]
async fn test_pg_existing_institution_does_not_consume_ids() {
    let (_serial, pool, store) = setup().await;
    let wallet = unique_wallet("seq");
    let service = RewardService::new(Arc::new(store.clone()), &RewardConfig::default());

    service.register_wallet(&wallet, "Sequence College").await.unwrap();
    let before: i64 = sqlx::query_scalar("SELECT last_value FROM institution_ledgers_id_seq")
        .fetch_one(&pool)
        .await
        .unwrap();

    for i in 0..5 {
        service
            .record_issuance(&wallet, "Sequence College", &format!("cert-{}", i))
            .await
            .unwrap();
    }
    let again = service.register_wallet(&wallet, "Other Name").await.unwrap();
    assert!(!again.created);

    let after: i64 = sqlx::query_scalar("SELECT last_value FROM institution_ledgers_id_seq")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(after, before);
}
