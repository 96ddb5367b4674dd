//! Product and branch lookups used by purchasing and the ledger
//!
//! Catalog CRUD lives elsewhere; this service only answers whether a
//! reference is usable and writes approved prices back to the product master.

use std::collections::HashSet;

use rust_decimal::Decimal;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::error::AppResult;
use shared::{ActiveReferences, WorkflowError};

pub struct CatalogService;

impl CatalogService {
    pub async fn branch_is_active(conn: &mut PgConnection, branch_id: Uuid) -> AppResult<bool> {
        let active = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM branches WHERE id = $1 AND is_active)",
        )
        .bind(branch_id)
        .fetch_one(&mut *conn)
        .await?;
        Ok(active)
    }

    pub async fn product_is_active(conn: &mut PgConnection, product_id: Uuid) -> AppResult<bool> {
        let active = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM products WHERE id = $1 AND is_active)",
        )
        .bind(product_id)
        .fetch_one(&mut *conn)
        .await?;
        Ok(active)
    }

    /// Which of the given references exist and are active
    pub async fn active_references(
        conn: &mut PgConnection,
        branch_id: Uuid,
        product_ids: &[Uuid],
    ) -> AppResult<ActiveReferences> {
        let branch_active = Self::branch_is_active(conn, branch_id).await?;
        let active_products: HashSet<Uuid> = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM products WHERE id = ANY($1) AND is_active",
        )
        .bind(product_ids)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .collect();

        Ok(ActiveReferences {
            branch_active,
            active_products,
        })
    }

    /// Both sides of a stock pair must be usable
    pub async fn ensure_stock_pair(
        conn: &mut PgConnection,
        product_id: Uuid,
        branch_id: Uuid,
    ) -> AppResult<()> {
        if !Self::product_is_active(conn, product_id).await? {
            return Err(WorkflowError::validation(
                "product_id",
                format!("product {} does not exist or is inactive", product_id),
            )
            .into());
        }
        if !Self::branch_is_active(conn, branch_id).await? {
            return Err(WorkflowError::validation(
                "branch_id",
                format!("branch {} does not exist or is inactive", branch_id),
            )
            .into());
        }
        Ok(())
    }

    /// Push an approved price pair to the product master
    pub async fn set_prices(
        conn: &mut PgConnection,
        product_id: Uuid,
        buying_price: Decimal,
        selling_price: Decimal,
    ) -> AppResult<()> {
        let updated = sqlx::query(
            "UPDATE products SET buying_price = $2, selling_price = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(product_id)
        .bind(buying_price)
        .bind(selling_price)
        .execute(&mut *conn)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(WorkflowError::NotFound(format!("Product {}", product_id)).into());
        }
        Ok(())
    }
}
