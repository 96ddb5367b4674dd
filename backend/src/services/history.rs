//! Purchase order trail persistence
//!
//! Trail writes run in a savepoint inside the caller's transaction. A failed
//! write is rolled back to the savepoint and logged; the workflow mutation it
//! accompanies still commits.

use chrono::{DateTime, Utc};
use sqlx::{Connection, FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use shared::{HistoryAction, HistoryEntry};

#[derive(Clone)]
pub struct HistoryService {
    db: PgPool,
}

#[derive(Debug, FromRow)]
struct HistoryRow {
    id: Uuid,
    purchase_order_id: Uuid,
    item_id: Option<Uuid>,
    action: String,
    actor_id: Uuid,
    detail: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<HistoryRow> for HistoryEntry {
    type Error = AppError;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        let action = HistoryAction::from_str(&row.action)
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("unknown trail action {}", row.action)))?;
        Ok(HistoryEntry {
            id: row.id,
            purchase_order_id: row.purchase_order_id,
            item_id: row.item_id,
            action,
            actor_id: row.actor_id,
            detail: row.detail,
            created_at: row.created_at,
        })
    }
}

impl HistoryService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Append entries; failures are logged, never returned
    pub async fn append(conn: &mut PgConnection, entries: &[HistoryEntry]) {
        let Some(first) = entries.first() else {
            return;
        };
        if let Err(e) = Self::try_append(conn, entries).await {
            tracing::error!(
                purchase_order_id = %first.purchase_order_id,
                entries = entries.len(),
                error = %e,
                "Failed to append purchase order trail"
            );
        }
    }

    async fn try_append(conn: &mut PgConnection, entries: &[HistoryEntry]) -> Result<(), sqlx::Error> {
        let mut savepoint = conn.begin().await?;
        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO purchase_order_history
                    (id, purchase_order_id, item_id, action, actor_id, detail, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(entry.id)
            .bind(entry.purchase_order_id)
            .bind(entry.item_id)
            .bind(entry.action.as_str())
            .bind(entry.actor_id)
            .bind(&entry.detail)
            .bind(entry.created_at)
            .execute(&mut *savepoint)
            .await?;
        }
        savepoint.commit().await
    }

    /// Drop the trail rows of a hard-deleted item
    pub async fn delete_for_item(conn: &mut PgConnection, item_id: Uuid) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM purchase_order_history WHERE item_id = $1")
            .bind(item_id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    /// Full trail of an order, oldest first
    pub async fn list(&self, purchase_order_id: Uuid) -> AppResult<Vec<HistoryEntry>> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT id, purchase_order_id, item_id, action, actor_id, detail, created_at
            FROM purchase_order_history
            WHERE purchase_order_id = $1
            ORDER BY seq
            "#,
        )
        .bind(purchase_order_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(HistoryEntry::try_from).collect()
    }
}
