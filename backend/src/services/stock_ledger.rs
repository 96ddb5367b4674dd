//! Stock ledger service
//!
//! The only writer of `stock_movements` and `stock_levels`. Every append
//! locks the pair's cache row, writes the movement with both snapshots and
//! moves the cache, all inside the caller's transaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgPool};
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::services::catalog::CatalogService;
use shared::{
    apply_movement, quantity_as_of, replay_quantity, verify_chain, Actor, Capability, ChainBreak,
    MovementKind, MovementSource, NewMovement, QuantityAsOf, StockLevel, StockMovement,
    WorkflowError,
};

const MOVEMENT_COLUMNS: &str = "id, seq AS sequence, product_id, branch_id, sale_id, \
     purchase_order_id, kind, magnitude, previous_quantity, new_quantity, movement_date, \
     reason, created_by, is_active";

#[derive(Clone)]
pub struct StockLedgerService {
    db: PgPool,
}

/// Input for a manual movement (sales, returns, write-offs, corrections)
#[derive(Debug, Deserialize, Validate)]
pub struct RecordMovementInput {
    pub product_id: Uuid,
    pub branch_id: Uuid,
    pub kind: MovementKind,
    pub magnitude: i64,
    pub sale_id: Option<Uuid>,
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

/// Result of walking one pair's history
#[derive(Debug, Clone, Serialize)]
pub struct ChainReport {
    pub product_id: Uuid,
    pub branch_id: Uuid,
    pub movements_checked: usize,
    pub chain_break: Option<ChainBreak>,
    pub replayed_quantity: i64,
    pub cached_quantity: i64,
    pub cache_consistent: bool,
}

#[derive(Debug, FromRow)]
struct MovementRow {
    id: Uuid,
    sequence: i64,
    product_id: Uuid,
    branch_id: Uuid,
    sale_id: Option<Uuid>,
    purchase_order_id: Option<Uuid>,
    kind: String,
    magnitude: i64,
    previous_quantity: i64,
    new_quantity: i64,
    movement_date: DateTime<Utc>,
    reason: Option<String>,
    created_by: Uuid,
    is_active: bool,
}

impl TryFrom<MovementRow> for StockMovement {
    type Error = AppError;

    fn try_from(row: MovementRow) -> Result<Self, Self::Error> {
        let kind = MovementKind::from_str(&row.kind)
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("unknown movement kind {}", row.kind)))?;
        let source = MovementSource::from_columns(row.sale_id, row.purchase_order_id)?;
        Ok(StockMovement {
            id: row.id,
            sequence: row.sequence,
            product_id: row.product_id,
            branch_id: row.branch_id,
            source,
            kind,
            magnitude: row.magnitude,
            previous_quantity: row.previous_quantity,
            new_quantity: row.new_quantity,
            movement_date: row.movement_date,
            reason: row.reason,
            created_by: row.created_by,
            is_active: row.is_active,
        })
    }
}

#[derive(Debug, FromRow)]
struct LevelRow {
    product_id: Uuid,
    branch_id: Uuid,
    quantity: i64,
    updated_at: DateTime<Utc>,
}

impl From<LevelRow> for StockLevel {
    fn from(row: LevelRow) -> Self {
        StockLevel {
            product_id: row.product_id,
            branch_id: row.branch_id,
            quantity: row.quantity,
            updated_at: row.updated_at,
        }
    }
}

impl StockLedgerService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Append one movement inside the caller's transaction
    pub async fn append(
        conn: &mut PgConnection,
        movement: &NewMovement,
        actor_id: Uuid,
    ) -> AppResult<StockMovement> {
        movement.kind.validate_magnitude(movement.magnitude)?;

        // Materialize the cache row so it can be locked
        sqlx::query(
            r#"
            INSERT INTO stock_levels (product_id, branch_id, quantity)
            VALUES ($1, $2, 0)
            ON CONFLICT (product_id, branch_id) DO NOTHING
            "#,
        )
        .bind(movement.product_id)
        .bind(movement.branch_id)
        .execute(&mut *conn)
        .await?;

        let previous = sqlx::query_scalar::<_, i64>(
            "SELECT quantity FROM stock_levels WHERE product_id = $1 AND branch_id = $2 FOR UPDATE",
        )
        .bind(movement.product_id)
        .bind(movement.branch_id)
        .fetch_one(&mut *conn)
        .await?;

        let new_quantity = apply_movement(previous, movement.kind, movement.magnitude)?;

        // clock_timestamp() is taken after the lock, so movement dates follow lock order
        let row = sqlx::query_as::<_, MovementRow>(&format!(
            r#"
            INSERT INTO stock_movements (
                id, product_id, branch_id, sale_id, purchase_order_id, kind, magnitude,
                previous_quantity, new_quantity, movement_date, reason, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, clock_timestamp(), $10, $11)
            RETURNING {}
            "#,
            MOVEMENT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(movement.product_id)
        .bind(movement.branch_id)
        .bind(movement.source.and_then(|s| s.sale_id()))
        .bind(movement.source.and_then(|s| s.purchase_order_id()))
        .bind(movement.kind.as_str())
        .bind(movement.magnitude)
        .bind(previous)
        .bind(new_quantity)
        .bind(&movement.reason)
        .bind(actor_id)
        .fetch_one(&mut *conn)
        .await?;

        sqlx::query(
            r#"
            UPDATE stock_levels SET quantity = $3, updated_at = NOW()
            WHERE product_id = $1 AND branch_id = $2
            "#,
        )
        .bind(movement.product_id)
        .bind(movement.branch_id)
        .bind(new_quantity)
        .execute(&mut *conn)
        .await?;

        tracing::debug!(
            product_id = %movement.product_id,
            branch_id = %movement.branch_id,
            kind = %movement.kind,
            previous,
            new_quantity,
            "Stock movement appended"
        );

        row.try_into()
    }

    /// Record a manual movement; purchases are only booked by approvals
    #[instrument(skip(self, actor, input), fields(actor = %actor.user_id))]
    pub async fn record_movement(
        &self,
        actor: &Actor,
        input: RecordMovementInput,
    ) -> AppResult<StockMovement> {
        actor.require(Capability::AdjustStock)?;
        input.validate()?;

        if input.kind == MovementKind::Purchase {
            return Err(WorkflowError::validation(
                "kind",
                "purchase movements are booked by purchase order approval",
            )
            .into());
        }

        let mut tx = self.db.begin().await?;
        CatalogService::ensure_stock_pair(&mut tx, input.product_id, input.branch_id).await?;

        let movement = NewMovement {
            product_id: input.product_id,
            branch_id: input.branch_id,
            kind: input.kind,
            magnitude: input.magnitude,
            source: input.sale_id.map(MovementSource::Sale),
            reason: input.reason,
        };
        let recorded = Self::append(&mut tx, &movement, actor.user_id).await?;

        tx.commit().await?;

        tracing::info!(
            movement_id = %recorded.id,
            kind = %recorded.kind,
            new_quantity = recorded.new_quantity,
            "Manual stock movement recorded"
        );

        Ok(recorded)
    }

    /// Cached quantity; zero when the pair has never moved
    pub async fn current_quantity(&self, product_id: Uuid, branch_id: Uuid) -> AppResult<StockLevel> {
        let row = sqlx::query_as::<_, LevelRow>(
            r#"
            SELECT product_id, branch_id, quantity, updated_at
            FROM stock_levels
            WHERE product_id = $1 AND branch_id = $2
            "#,
        )
        .bind(product_id)
        .bind(branch_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(StockLevel::from).unwrap_or_else(|| StockLevel {
            product_id,
            branch_id,
            quantity: 0,
            updated_at: Utc::now(),
        }))
    }

    /// Point-in-time quantity by replay, cross-checked against the snapshot
    #[instrument(skip(self))]
    pub async fn quantity_as_of(
        &self,
        product_id: Uuid,
        branch_id: Uuid,
        as_of: DateTime<Utc>,
    ) -> AppResult<QuantityAsOf> {
        let movements = self
            .list_movements(product_id, branch_id, None, Some(as_of))
            .await?;
        let answer = quantity_as_of(&movements, as_of);

        if !answer.consistent {
            tracing::warn!(
                %product_id,
                %branch_id,
                %as_of,
                replayed = answer.quantity,
                snapshot = answer.snapshot_quantity,
                "Stock snapshot disagrees with ledger replay; using replay"
            );
        }

        Ok(answer)
    }

    /// Movements of one pair in ledger order, optionally bounded by date
    pub async fn list_movements(
        &self,
        product_id: Uuid,
        branch_id: Uuid,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<StockMovement>> {
        let rows = sqlx::query_as::<_, MovementRow>(&format!(
            r#"
            SELECT {}
            FROM stock_movements
            WHERE product_id = $1 AND branch_id = $2
              AND ($3::timestamptz IS NULL OR movement_date >= $3)
              AND ($4::timestamptz IS NULL OR movement_date <= $4)
            ORDER BY movement_date, seq
            "#,
            MOVEMENT_COLUMNS
        ))
        .bind(product_id)
        .bind(branch_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(StockMovement::try_from).collect()
    }

    /// Walk the full history and compare it with the cache
    #[instrument(skip(self))]
    pub async fn verify_chain(&self, product_id: Uuid, branch_id: Uuid) -> AppResult<ChainReport> {
        let movements = self
            .list_movements(product_id, branch_id, None, None)
            .await?;
        let level = self.current_quantity(product_id, branch_id).await?;

        let chain_break = verify_chain(&movements).err();
        let replayed_quantity = movements
            .iter()
            .map(|m| m.movement_date)
            .max()
            .map(|latest| replay_quantity(&movements, latest))
            .unwrap_or(0);

        if let Some(link) = &chain_break {
            tracing::warn!(%product_id, %branch_id, ?link, "Stock ledger chain is broken");
        }
        if replayed_quantity != level.quantity {
            tracing::warn!(
                %product_id,
                %branch_id,
                replayed_quantity,
                cached = level.quantity,
                "Stock cache disagrees with ledger replay"
            );
        }

        Ok(ChainReport {
            product_id,
            branch_id,
            movements_checked: movements.len(),
            chain_break,
            replayed_quantity,
            cached_quantity: level.quantity,
            cache_consistent: replayed_quantity == level.quantity,
        })
    }
}
