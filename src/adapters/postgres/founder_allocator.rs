//! PostgreSQL founder allocator.
//!
//! `founder_counters` holds one row per account kind. A grant is a capped
//! `UPDATE ... RETURNING` (the row lock serializes concurrent grants) followed by
//! a `founder_grants` insert in the same transaction.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::foundation::{DomainError, OwnerId};
use crate::domain::subscription::{AccountKind, FounderGrant, FounderSnapshot};
use crate::ports::FounderAllocator;

#[derive(Clone)]
pub struct PostgresFounderAllocator {
    pool: PgPool,
}

impl PostgresFounderAllocator {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates missing counter rows. Existing limits are left as they are.
    pub async fn initialize(&self, professional_limit: u32, business_limit: u32) -> Result<(), DomainError> {
        for (kind, limit) in [
            (AccountKind::Professional, professional_limit),
            (AccountKind::Business, business_limit),
        ] {
            sqlx::query(
                r#"
                INSERT INTO founder_counters (account_kind, grant_limit, granted_count)
                VALUES ($1, $2, 0)
                ON CONFLICT (account_kind) DO NOTHING
                "#,
            )
            .bind(kind.as_str())
            .bind(limit_param(limit)?)
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::database(format!("Failed to seed founder counter: {}", e)))?;
        }
        Ok(())
    }
}

fn limit_param(limit: u32) -> Result<i32, DomainError> {
    i32::try_from(limit).map_err(|_| DomainError::validation("founder_limit", "limit exceeds i32"))
}

fn to_u32(value: i32) -> Result<u32, DomainError> {
    u32::try_from(value).map_err(|_| DomainError::database(format!("Invalid founder count: {}", value)))
}

#[async_trait]
impl FounderAllocator for PostgresFounderAllocator {
    async fn try_grant_founder_status(
        &self,
        account_kind: AccountKind,
        owner_id: &OwnerId,
    ) -> Result<FounderGrant, DomainError> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            DomainError::database(format!("Failed to begin transaction: {}", e))
        })?;

        let held: Option<i32> = sqlx::query_scalar(
            "SELECT ordinal FROM founder_grants WHERE account_kind = $1 AND owner_id = $2",
        )
        .bind(account_kind.as_str())
        .bind(owner_id.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| DomainError::database(format!("Failed to read founder grant: {}", e)))?;

        if held.is_some() {
            return Ok(FounderGrant::AlreadyHeld);
        }

        let ordinal: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE founder_counters
            SET granted_count = granted_count + 1
            WHERE account_kind = $1 AND granted_count < grant_limit
            RETURNING granted_count
            "#,
        )
        .bind(account_kind.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| DomainError::database(format!("Failed to increment founder counter: {}", e)))?;

        let Some(ordinal) = ordinal else {
            return Ok(FounderGrant::Exhausted);
        };

        let inserted = sqlx::query(
            r#"
            INSERT INTO founder_grants (account_kind, owner_id, ordinal)
            VALUES ($1, $2, $3)
            ON CONFLICT (account_kind, owner_id) DO NOTHING
            "#,
        )
        .bind(account_kind.as_str())
        .bind(owner_id.as_str())
        .bind(ordinal)
        .execute(&mut *tx)
        .await
        .map_err(|e| DomainError::database(format!("Failed to record founder grant: {}", e)))?;

        if inserted.rows_affected() == 0 {
            // Lost a race against a concurrent grant for the same owner; the
            // dropped transaction rolls the increment back.
            return Ok(FounderGrant::AlreadyHeld);
        }

        tx.commit().await.map_err(|e| {
            DomainError::database(format!("Failed to commit founder grant: {}", e))
        })?;

        tracing::info!(
            account_kind = %account_kind,
            owner_id = %owner_id,
            ordinal,
            "Founder status granted"
        );

        Ok(FounderGrant::Granted {
            ordinal: to_u32(ordinal)?,
        })
    }

    async fn is_founder(&self, account_kind: AccountKind, owner_id: &OwnerId) -> Result<bool, DomainError> {
        let held: Option<i32> = sqlx::query_scalar(
            "SELECT ordinal FROM founder_grants WHERE account_kind = $1 AND owner_id = $2",
        )
        .bind(account_kind.as_str())
        .bind(owner_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to read founder grant: {}", e)))?;
        Ok(held.is_some())
    }

    async fn snapshot(&self, account_kind: AccountKind) -> Result<FounderSnapshot, DomainError> {
        let row: Option<(i32, i32)> = sqlx::query_as(
            "SELECT grant_limit, granted_count FROM founder_counters WHERE account_kind = $1",
        )
        .bind(account_kind.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to read founder counter: {}", e)))?;

        let (limit, count) = row.ok_or_else(|| {
            DomainError::database(format!("No founder counter for {}", account_kind))
        })?;

        Ok(FounderSnapshot {
            account_kind,
            limit: to_u32(limit)?,
            count: to_u32(count)?,
        })
    }
}
