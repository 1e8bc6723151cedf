//! PostgreSQL implementation of SubscriptionRepository.
//!
//! Batches run in one transaction. Updates compare-and-set on `version`; the
//! partial unique indexes `subscriptions_one_current` and
//! `subscriptions_one_pending` enforce the per-owner uniqueness rules.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::foundation::{DomainError, ErrorCode, Money, OwnerId, SubscriptionId, Timestamp};
use crate::domain::subscription::{QuotaUsage, Subscription, SubscriptionKey};
use crate::ports::{SubscriptionRepository, SubscriptionWrite};

const SELECT_COLUMNS: &str = r#"
    SELECT id, owner_id, account_kind, tier, status, current_period_start,
           current_period_end, price_minor, has_founder_discount, is_featured,
           monthly_quota, quota_used, cancelled_at, payment_reference_id,
           next_period_payment_reference, superseded_by, version, created_at, updated_at
    FROM subscriptions
"#;

/// PostgreSQL implementation of the SubscriptionRepository port.
#[derive(Clone)]
pub struct PostgresSubscriptionRepository {
    pool: PgPool,
}

impl PostgresSubscriptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database row representation of a subscription.
#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    owner_id: String,
    account_kind: String,
    tier: String,
    status: String,
    current_period_start: DateTime<Utc>,
    current_period_end: DateTime<Utc>,
    price_minor: i64,
    has_founder_discount: bool,
    is_featured: bool,
    monthly_quota: i64,
    quota_used: i64,
    cancelled_at: Option<DateTime<Utc>>,
    payment_reference_id: Option<String>,
    next_period_payment_reference: Option<String>,
    superseded_by: Option<Uuid>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn corrupt(field: &str, detail: impl std::fmt::Display) -> DomainError {
    DomainError::database(format!("Invalid {} value: {}", field, detail)).with_detail("field", field)
}

fn to_u32(field: &str, value: i64) -> Result<u32, DomainError> {
    u32::try_from(value).map_err(|_| corrupt(field, value))
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = DomainError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        Ok(Subscription {
            id: SubscriptionId::from_uuid(row.id),
            owner_id: OwnerId::new(row.owner_id).map_err(|e| corrupt("owner_id", e))?,
            account_kind: row.account_kind.parse().map_err(|e| corrupt("account_kind", e))?,
            tier: row.tier.parse().map_err(|e| corrupt("tier", e))?,
            status: row.status.parse().map_err(|e| corrupt("status", e))?,
            current_period_start: Timestamp::from_datetime(row.current_period_start),
            current_period_end: Timestamp::from_datetime(row.current_period_end),
            price: Money::try_new(row.price_minor).map_err(|e| corrupt("price_minor", e))?,
            has_founder_discount: row.has_founder_discount,
            is_featured: row.is_featured,
            quota: QuotaUsage {
                monthly_quota: to_u32("monthly_quota", row.monthly_quota)?,
                quota_used: to_u32("quota_used", row.quota_used)?,
            },
            cancelled_at: row.cancelled_at.map(Timestamp::from_datetime),
            payment_reference_id: row.payment_reference_id,
            next_period_payment_reference: row.next_period_payment_reference,
            superseded_by: row.superseded_by.map(SubscriptionId::from_uuid),
            version: u64::try_from(row.version).map_err(|_| corrupt("version", row.version))?,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

fn map_write_error(e: sqlx::Error, id: &SubscriptionId) -> DomainError {
    if let sqlx::Error::Database(db_err) = &e {
        if let Some(constraint) = db_err.constraint() {
            if constraint.starts_with("subscriptions_one_") || constraint == "subscriptions_pkey" {
                return DomainError::new(
                    ErrorCode::SubscriptionExists,
                    format!("Subscription {} conflicts with a live record", id),
                )
                .with_detail("constraint", constraint);
            }
        }
    }
    DomainError::database(format!("Failed to write subscription {}: {}", id, e))
}

fn version_param(version: u64) -> Result<i64, DomainError> {
    i64::try_from(version).map_err(|_| corrupt("version", version))
}

async fn insert_row(
    tx: &mut Transaction<'_, Postgres>,
    sub: &Subscription,
) -> Result<(), DomainError> {
    sqlx::query(
        r#"
        INSERT INTO subscriptions (
            id, owner_id, account_kind, tier, status, current_period_start,
            current_period_end, price_minor, has_founder_discount, is_featured,
            monthly_quota, quota_used, cancelled_at, payment_reference_id,
            next_period_payment_reference, superseded_by, version, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, 1, $17, $18)
        "#,
    )
    .bind(sub.id.as_uuid())
    .bind(sub.owner_id.as_str())
    .bind(sub.account_kind.as_str())
    .bind(sub.tier.as_str())
    .bind(sub.status.as_str())
    .bind(sub.current_period_start.as_datetime())
    .bind(sub.current_period_end.as_datetime())
    .bind(sub.price.minor_units())
    .bind(sub.has_founder_discount)
    .bind(sub.is_featured)
    .bind(i64::from(sub.quota.monthly_quota))
    .bind(i64::from(sub.quota.quota_used))
    .bind(sub.cancelled_at.as_ref().map(|t| *t.as_datetime()))
    .bind(&sub.payment_reference_id)
    .bind(&sub.next_period_payment_reference)
    .bind(sub.superseded_by.map(|id| *id.as_uuid()))
    .bind(sub.created_at.as_datetime())
    .bind(sub.updated_at.as_datetime())
    .execute(&mut **tx)
    .await
    .map_err(|e| map_write_error(e, &sub.id))?;

    Ok(())
}

async fn update_row(
    tx: &mut Transaction<'_, Postgres>,
    sub: &Subscription,
) -> Result<(), DomainError> {
    let result = sqlx::query(
        r#"
        UPDATE subscriptions SET
            tier = $3,
            status = $4,
            current_period_start = $5,
            current_period_end = $6,
            price_minor = $7,
            has_founder_discount = $8,
            is_featured = $9,
            monthly_quota = $10,
            quota_used = $11,
            cancelled_at = $12,
            payment_reference_id = $13,
            next_period_payment_reference = $14,
            superseded_by = $15,
            updated_at = $16,
            version = version + 1
        WHERE id = $1 AND version = $2
        "#,
    )
    .bind(sub.id.as_uuid())
    .bind(version_param(sub.version)?)
    .bind(sub.tier.as_str())
    .bind(sub.status.as_str())
    .bind(sub.current_period_start.as_datetime())
    .bind(sub.current_period_end.as_datetime())
    .bind(sub.price.minor_units())
    .bind(sub.has_founder_discount)
    .bind(sub.is_featured)
    .bind(i64::from(sub.quota.monthly_quota))
    .bind(i64::from(sub.quota.quota_used))
    .bind(sub.cancelled_at.as_ref().map(|t| *t.as_datetime()))
    .bind(&sub.payment_reference_id)
    .bind(&sub.next_period_payment_reference)
    .bind(sub.superseded_by.map(|id| *id.as_uuid()))
    .bind(sub.updated_at.as_datetime())
    .execute(&mut **tx)
    .await
    .map_err(|e| map_write_error(e, &sub.id))?;

    if result.rows_affected() == 1 {
        return Ok(());
    }

    let exists: Option<i64> = sqlx::query_scalar("SELECT version FROM subscriptions WHERE id = $1")
        .bind(sub.id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| DomainError::database(format!("Failed to read version: {}", e)))?;

    Err(match exists {
        Some(stored) => DomainError::new(
            ErrorCode::ConcurrentModification,
            format!("Subscription {} was modified concurrently", sub.id),
        )
        .with_detail("expected_version", sub.version.to_string())
        .with_detail("stored_version", stored.to_string()),
        None => DomainError::new(
            ErrorCode::SubscriptionNotFound,
            format!("Subscription {} not found", sub.id),
        ),
    })
}

impl PostgresSubscriptionRepository {
    async fn fetch_one(&self, sql: String, key: &SubscriptionKey) -> Result<Option<Subscription>, DomainError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&sql)
            .bind(key.owner_id.as_str())
            .bind(key.account_kind.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::database(format!("Failed to fetch subscription: {}", e)))?;
        row.map(Subscription::try_from).transpose()
    }
}

#[async_trait]
impl SubscriptionRepository for PostgresSubscriptionRepository {
    async fn apply(&self, writes: Vec<SubscriptionWrite>) -> Result<Vec<Subscription>, DomainError> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            DomainError::database(format!("Failed to begin transaction: {}", e))
        })?;

        let mut committed = Vec::with_capacity(writes.len());
        for write in writes {
            match write {
                SubscriptionWrite::Insert(mut sub) => {
                    insert_row(&mut tx, &sub).await?;
                    sub.version = 1;
                    committed.push(sub);
                }
                SubscriptionWrite::Update(mut sub) => {
                    update_row(&mut tx, &sub).await?;
                    sub.version += 1;
                    committed.push(sub);
                }
            }
        }

        tx.commit().await.map_err(|e| {
            DomainError::database(format!("Failed to commit transaction: {}", e))
        })?;

        Ok(committed)
    }

    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!("{} WHERE id = $1", SELECT_COLUMNS))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::database(format!("Failed to fetch subscription: {}", e)))?;
        row.map(Subscription::try_from).transpose()
    }

    async fn find_current(&self, key: &SubscriptionKey) -> Result<Option<Subscription>, DomainError> {
        self.fetch_one(
            format!(
                "{} WHERE owner_id = $1 AND account_kind = $2 AND status IN ('active', 'cancelling')",
                SELECT_COLUMNS
            ),
            key,
        )
        .await
    }

    async fn find_pending(&self, key: &SubscriptionKey) -> Result<Option<Subscription>, DomainError> {
        self.fetch_one(
            format!(
                "{} WHERE owner_id = $1 AND account_kind = $2 AND status = 'pending_payment'",
                SELECT_COLUMNS
            ),
            key,
        )
        .await
    }

    async fn find_due_for_rollover(
        &self,
        now: Timestamp,
        limit: usize,
    ) -> Result<Vec<Subscription>, DomainError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<SubscriptionRow> = sqlx::query_as(&format!(
            "{} WHERE status IN ('active', 'cancelling') AND current_period_end <= $1 \
             ORDER BY current_period_end ASC LIMIT $2",
            SELECT_COLUMNS
        ))
        .bind(now.as_datetime())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to fetch due subscriptions: {}", e)))?;

        rows.into_iter().map(Subscription::try_from).collect()
    }

    async fn history(&self, key: &SubscriptionKey) -> Result<Vec<Subscription>, DomainError> {
        let rows: Vec<SubscriptionRow> = sqlx::query_as(&format!(
            "{} WHERE owner_id = $1 AND account_kind = $2 ORDER BY created_at ASC, id ASC",
            SELECT_COLUMNS
        ))
        .bind(key.owner_id.as_str())
        .bind(key.account_kind.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to fetch history: {}", e)))?;

        rows.into_iter().map(Subscription::try_from).collect()
    }
}
