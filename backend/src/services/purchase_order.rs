//! Purchase order service
//!
//! Loads an order aggregate under a row lock, hands it to the workflow,
//! then persists the result together with its trail entries and stock
//! receipts in the same transaction.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgPool};
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::models::{
    Actor, Capability, FinanceReview, MovementKind, MovementSource, NewMovement, PurchaseOrder,
    PurchaseOrderItem, PurchaseOrderStatus,
};
use crate::services::{catalog::CatalogService, history::HistoryService, stock_ledger::StockLedgerService};
use shared::{
    CreatePurchaseOrderInput, HistoryEntry, PaginatedResponse, Pagination, PriceLine,
    PurchaseOrderAggregate, QuantityLine, Transition, VerifyLine, WorkflowError, WorkflowResult,
};

const ORDER_COLUMNS: &str = "id, branch_id, created_by, status, is_active, created_at, updated_at";

const ITEM_COLUMNS: &str = "id, purchase_order_id, product_id, quantity_requested, \
     quantity_accepted, quantity_registered, finance_review, buying_price, selling_price, \
     verified_by, verified_at, approved_by, approved_at, is_active, created_at, updated_at";

#[derive(Clone)]
pub struct PurchaseOrderService {
    db: PgPool,
    markup_percent: Decimal,
}

/// Filters for listing orders
#[derive(Debug, Default, Deserialize)]
pub struct ListOrdersFilter {
    pub branch_id: Option<Uuid>,
    pub status: Option<PurchaseOrderStatus>,
    #[serde(default)]
    pub include_inactive: bool,
}

/// Header row returned by list queries
#[derive(Debug, Clone, Serialize)]
pub struct PurchaseOrderSummary {
    #[serde(flatten)]
    pub order: PurchaseOrder,
    pub item_count: i64,
}

#[derive(Debug, FromRow)]
struct OrderRow {
    id: Uuid,
    branch_id: Uuid,
    created_by: Uuid,
    status: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for PurchaseOrder {
    type Error = AppError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let status = PurchaseOrderStatus::from_str(&row.status)
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("unknown order status {}", row.status)))?;
        Ok(PurchaseOrder {
            id: row.id,
            branch_id: row.branch_id,
            created_by: row.created_by,
            status,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct SummaryRow {
    #[sqlx(flatten)]
    order: OrderRow,
    item_count: i64,
}

#[derive(Debug, FromRow)]
struct ItemRow {
    id: Uuid,
    purchase_order_id: Uuid,
    product_id: Uuid,
    quantity_requested: i64,
    quantity_accepted: Option<i64>,
    quantity_registered: Option<i64>,
    finance_review: String,
    buying_price: Option<Decimal>,
    selling_price: Option<Decimal>,
    verified_by: Option<Uuid>,
    verified_at: Option<DateTime<Utc>>,
    approved_by: Option<Uuid>,
    approved_at: Option<DateTime<Utc>>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ItemRow> for PurchaseOrderItem {
    type Error = AppError;

    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        let finance_review = FinanceReview::from_str(&row.finance_review).ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("unknown finance review {}", row.finance_review))
        })?;
        Ok(PurchaseOrderItem {
            id: row.id,
            purchase_order_id: row.purchase_order_id,
            product_id: row.product_id,
            quantity_requested: row.quantity_requested,
            quantity_accepted: row.quantity_accepted,
            quantity_registered: row.quantity_registered,
            finance_review,
            buying_price: row.buying_price,
            selling_price: row.selling_price,
            verified_by: row.verified_by,
            verified_at: row.verified_at,
            approved_by: row.approved_by,
            approved_at: row.approved_at,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl PurchaseOrderService {
    pub fn new(db: PgPool, markup_percent: Decimal) -> Self {
        Self { db, markup_percent }
    }

    // ========================================================================
    // Submission
    // ========================================================================

    #[instrument(skip(self, actor, input), fields(actor = %actor.user_id, branch_id = %input.branch_id))]
    pub async fn create(
        &self,
        actor: &Actor,
        input: CreatePurchaseOrderInput,
    ) -> AppResult<PurchaseOrderAggregate> {
        actor.require(Capability::RequestStock)?;
        input.validate()?;

        let mut tx = self.db.begin().await?;

        let product_ids: Vec<Uuid> = input.items.iter().map(|l| l.product_id).collect();
        let references =
            CatalogService::active_references(&mut tx, input.branch_id, &product_ids).await?;
        let (aggregate, transition) = PurchaseOrderAggregate::create(actor, &input, &references)?;

        sqlx::query(
            r#"
            INSERT INTO purchase_orders (id, branch_id, created_by, status, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(aggregate.order.id)
        .bind(aggregate.order.branch_id)
        .bind(aggregate.order.created_by)
        .bind(aggregate.order.status.as_str())
        .bind(aggregate.order.is_active)
        .bind(aggregate.order.created_at)
        .bind(aggregate.order.updated_at)
        .execute(&mut *tx)
        .await?;

        for item in &aggregate.items {
            insert_item(&mut tx, item).await?;
        }

        HistoryService::append(&mut tx, &transition.history).await;
        tx.commit().await?;

        tracing::info!(
            purchase_order_id = %aggregate.order.id,
            items = aggregate.items.len(),
            "Purchase order created"
        );

        Ok(aggregate)
    }

    // ========================================================================
    // Workflow stages
    // ========================================================================

    pub async fn accept_quantities(
        &self,
        actor: &Actor,
        order_id: Uuid,
        lines: Vec<QuantityLine>,
    ) -> AppResult<PurchaseOrderAggregate> {
        self.transition(actor, order_id, Capability::ReviewOrder, "accept_quantities", |po| {
            po.accept_quantities(actor, &lines)
        })
        .await
    }

    pub async fn register_received(
        &self,
        actor: &Actor,
        order_id: Uuid,
        lines: Vec<QuantityLine>,
    ) -> AppResult<PurchaseOrderAggregate> {
        self.transition(actor, order_id, Capability::ReceiveStock, "register_received", |po| {
            po.register_received(actor, &lines)
        })
        .await
    }

    pub async fn verify_finance(
        &self,
        actor: &Actor,
        order_id: Uuid,
        lines: Vec<VerifyLine>,
    ) -> AppResult<PurchaseOrderAggregate> {
        let markup = self.markup_percent;
        self.transition(actor, order_id, Capability::VerifyFinance, "verify_finance", |po| {
            po.verify_finance(actor, &lines, markup)
        })
        .await
    }

    pub async fn approve_final(
        &self,
        actor: &Actor,
        order_id: Uuid,
        item_ids: Option<Vec<Uuid>>,
    ) -> AppResult<PurchaseOrderAggregate> {
        self.transition(actor, order_id, Capability::ApproveOrder, "approve_final", |po| {
            po.approve_final(actor, item_ids.as_deref())
        })
        .await
    }

    pub async fn reject(
        &self,
        actor: &Actor,
        order_id: Uuid,
        item_ids: Option<Vec<Uuid>>,
    ) -> AppResult<PurchaseOrderAggregate> {
        self.transition(actor, order_id, Capability::ReviewOrder, "reject", |po| {
            po.reject(actor, item_ids.as_deref())
        })
        .await
    }

    pub async fn cancel(&self, actor: &Actor, order_id: Uuid) -> AppResult<PurchaseOrderAggregate> {
        self.transition(actor, order_id, Capability::CancelOrder, "cancel", |po| {
            po.cancel(actor)
        })
        .await
    }

    // ========================================================================
    // Edits
    // ========================================================================

    pub async fn edit_requested_quantities(
        &self,
        actor: &Actor,
        order_id: Uuid,
        lines: Vec<QuantityLine>,
    ) -> AppResult<PurchaseOrderAggregate> {
        self.transition(actor, order_id, Capability::RequestStock, "edit_requested", |po| {
            po.edit_requested_quantities(actor, &lines)
        })
        .await
    }

    pub async fn edit_accepted_quantities(
        &self,
        actor: &Actor,
        order_id: Uuid,
        lines: Vec<QuantityLine>,
    ) -> AppResult<PurchaseOrderAggregate> {
        self.transition(actor, order_id, Capability::ReviewOrder, "edit_accepted", |po| {
            po.edit_accepted_quantities(actor, &lines)
        })
        .await
    }

    pub async fn edit_registered_quantities(
        &self,
        actor: &Actor,
        order_id: Uuid,
        lines: Vec<QuantityLine>,
    ) -> AppResult<PurchaseOrderAggregate> {
        self.transition(actor, order_id, Capability::ReceiveStock, "edit_registered", |po| {
            po.edit_registered_quantities(actor, &lines)
        })
        .await
    }

    pub async fn edit_prices(
        &self,
        actor: &Actor,
        order_id: Uuid,
        lines: Vec<PriceLine>,
    ) -> AppResult<PurchaseOrderAggregate> {
        let markup = self.markup_percent;
        self.transition(actor, order_id, Capability::VerifyFinance, "edit_prices", |po| {
            po.edit_prices(actor, &lines, markup)
        })
        .await
    }

    pub async fn remove_item(
        &self,
        actor: &Actor,
        order_id: Uuid,
        item_id: Uuid,
    ) -> AppResult<PurchaseOrderAggregate> {
        self.transition(actor, order_id, Capability::RequestStock, "remove_item", |po| {
            po.remove_item(actor, item_id)
        })
        .await
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Order with its items; inactive (cancelled) orders only on request
    pub async fn get_order(
        &self,
        actor: &Actor,
        order_id: Uuid,
        include_inactive: bool,
    ) -> AppResult<PurchaseOrderAggregate> {
        actor.require(Capability::ViewOrders)?;

        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM purchase_orders WHERE id = $1 AND (is_active OR $2)",
            ORDER_COLUMNS
        ))
        .bind(order_id)
        .bind(include_inactive)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| order_not_found(order_id))?;

        let mut conn = self.db.acquire().await?;
        let items = load_items(&mut conn, order_id, include_inactive).await?;

        Ok(PurchaseOrderAggregate {
            order: row.try_into()?,
            items,
        })
    }

    pub async fn list_orders(
        &self,
        actor: &Actor,
        filter: ListOrdersFilter,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<PurchaseOrderSummary>> {
        actor.require(Capability::ViewOrders)?;
        let status = filter.status.map(|s| s.as_str());

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM purchase_orders
            WHERE ($1::uuid IS NULL OR branch_id = $1)
              AND ($2::text IS NULL OR status = $2)
              AND (is_active OR $3)
            "#,
        )
        .bind(filter.branch_id)
        .bind(status)
        .bind(filter.include_inactive)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, SummaryRow>(
            r#"
            SELECT po.id, po.branch_id, po.created_by, po.status, po.is_active,
                   po.created_at, po.updated_at,
                   (SELECT COUNT(*) FROM purchase_order_items i
                    WHERE i.purchase_order_id = po.id AND i.is_active) AS item_count
            FROM purchase_orders po
            WHERE ($1::uuid IS NULL OR po.branch_id = $1)
              AND ($2::text IS NULL OR po.status = $2)
              AND (po.is_active OR $3)
            ORDER BY po.created_at DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(filter.branch_id)
        .bind(status)
        .bind(filter.include_inactive)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let data = rows
            .into_iter()
            .map(|row| {
                Ok(PurchaseOrderSummary {
                    order: row.order.try_into()?,
                    item_count: row.item_count,
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        Ok(PaginatedResponse::new(data, &pagination, total.max(0) as u64))
    }

    pub async fn history(&self, actor: &Actor, order_id: Uuid) -> AppResult<Vec<HistoryEntry>> {
        actor.require(Capability::ViewOrders)?;

        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM purchase_orders WHERE id = $1)",
        )
        .bind(order_id)
        .fetch_one(&self.db)
        .await?;
        if !exists {
            return Err(order_not_found(order_id));
        }

        HistoryService::new(self.db.clone()).list(order_id).await
    }

    // ========================================================================
    // Transaction plumbing
    // ========================================================================

    /// Run one workflow operation atomically.
    ///
    /// Lock order: the order row first, then stock cache rows in ascending
    /// (product, branch) order.
    #[instrument(skip(self, actor, operation), fields(actor = %actor.user_id))]
    async fn transition<F>(
        &self,
        actor: &Actor,
        order_id: Uuid,
        capability: Capability,
        operation_name: &'static str,
        operation: F,
    ) -> AppResult<PurchaseOrderAggregate>
    where
        F: FnOnce(&mut PurchaseOrderAggregate) -> WorkflowResult<Transition>,
    {
        actor.require(capability)?;

        let mut tx = self.db.begin().await?;
        let mut aggregate = load_for_update(&mut tx, order_id).await?;
        let from = aggregate.status();

        let transition = operation(&mut aggregate)?;

        let mut receipts = transition.receipts.clone();
        receipts.sort_by_key(|r| (r.product_id, r.branch_id));
        for receipt in &receipts {
            CatalogService::set_prices(
                &mut tx,
                receipt.product_id,
                receipt.buying_price,
                receipt.selling_price,
            )
            .await?;
            let movement = NewMovement {
                product_id: receipt.product_id,
                branch_id: receipt.branch_id,
                kind: MovementKind::Purchase,
                magnitude: receipt.quantity,
                source: Some(MovementSource::PurchaseOrder(order_id)),
                reason: Some(format!("purchase order item {} approved", receipt.item_id)),
            };
            StockLedgerService::append(&mut tx, &movement, actor.user_id).await?;
        }

        if let Some(item_id) = transition.removed_item_id {
            HistoryService::delete_for_item(&mut tx, item_id).await?;
            sqlx::query("DELETE FROM purchase_order_items WHERE id = $1")
                .bind(item_id)
                .execute(&mut *tx)
                .await?;
        }
        save(&mut tx, &aggregate).await?;

        HistoryService::append(&mut tx, &transition.history).await;
        tx.commit().await?;

        tracing::info!(
            purchase_order_id = %order_id,
            operation = operation_name,
            from = %from.as_str(),
            to = %aggregate.status().as_str(),
            receipts = receipts.len(),
            "Purchase order updated"
        );

        Ok(aggregate)
    }
}

fn order_not_found(order_id: Uuid) -> AppError {
    WorkflowError::NotFound(format!("Purchase order {}", order_id)).into()
}

async fn load_for_update(
    conn: &mut PgConnection,
    order_id: Uuid,
) -> AppResult<PurchaseOrderAggregate> {
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {} FROM purchase_orders WHERE id = $1 FOR UPDATE",
        ORDER_COLUMNS
    ))
    .bind(order_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| order_not_found(order_id))?;

    // Terminal orders load too, so the workflow refuses them with a state error
    let items = load_items(conn, order_id, true).await?;
    Ok(PurchaseOrderAggregate {
        order: row.try_into()?,
        items,
    })
}

async fn load_items(
    conn: &mut PgConnection,
    order_id: Uuid,
    include_inactive: bool,
) -> AppResult<Vec<PurchaseOrderItem>> {
    let rows = sqlx::query_as::<_, ItemRow>(&format!(
        r#"
        SELECT {} FROM purchase_order_items
        WHERE purchase_order_id = $1 AND (is_active OR $2)
        ORDER BY created_at, id
        "#,
        ITEM_COLUMNS
    ))
    .bind(order_id)
    .bind(include_inactive)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(PurchaseOrderItem::try_from).collect()
}

async fn insert_item(conn: &mut PgConnection, item: &PurchaseOrderItem) -> AppResult<()> {
    sqlx::query(&format!(
        r#"
        INSERT INTO purchase_order_items ({})
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
        "#,
        ITEM_COLUMNS
    ))
    .bind(item.id)
    .bind(item.purchase_order_id)
    .bind(item.product_id)
    .bind(item.quantity_requested)
    .bind(item.quantity_accepted)
    .bind(item.quantity_registered)
    .bind(item.finance_review.as_str())
    .bind(item.buying_price)
    .bind(item.selling_price)
    .bind(item.verified_by)
    .bind(item.verified_at)
    .bind(item.approved_by)
    .bind(item.approved_at)
    .bind(item.is_active)
    .bind(item.created_at)
    .bind(item.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Write back the header and every item of the aggregate
async fn save(conn: &mut PgConnection, aggregate: &PurchaseOrderAggregate) -> AppResult<()> {
    sqlx::query(
        "UPDATE purchase_orders SET status = $2, is_active = $3, updated_at = $4 WHERE id = $1",
    )
    .bind(aggregate.order.id)
    .bind(aggregate.order.status.as_str())
    .bind(aggregate.order.is_active)
    .bind(aggregate.order.updated_at)
    .execute(&mut *conn)
    .await?;

    for item in &aggregate.items {
        sqlx::query(
            r#"
            UPDATE purchase_order_items SET
                quantity_requested = $2, quantity_accepted = $3, quantity_registered = $4,
                finance_review = $5, buying_price = $6, selling_price = $7,
                verified_by = $8, verified_at = $9, approved_by = $10, approved_at = $11,
                is_active = $12, updated_at = $13
            WHERE id = $1
            "#,
        )
        .bind(item.id)
        .bind(item.quantity_requested)
        .bind(item.quantity_accepted)
        .bind(item.quantity_registered)
        .bind(item.finance_review.as_str())
        .bind(item.buying_price)
        .bind(item.selling_price)
        .bind(item.verified_by)
        .bind(item.verified_at)
        .bind(item.approved_by)
        .bind(item.approved_at)
        .bind(item.is_active)
        .bind(item.updated_at)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}
