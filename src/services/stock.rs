//! Stock ledger helpers. Free functions generic over [`ConnectionTrait`] so
//! the order workflow can run them inside its transaction.
//!
//! Decrement is a single guarded UPDATE; the row filter enforces sufficiency
//! at the database, so two concurrent orders racing over the last units are
//! serialized by the row lock and the loser fails its whole transaction.
//! Negative stock is never persisted.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

use crate::entities::product;
use crate::errors::ServiceError;

/// Guarded decrement: `SET stock_quantity = stock_quantity - qty WHERE id
/// AND tenant_id AND stock_quantity >= qty`. Zero affected rows means the
/// guard lost the race (or the product vanished) and the caller's
/// transaction must abort.
pub async fn decrement<C: ConnectionTrait>(
    conn: &C,
    tenant_id: Uuid,
    product_id: Uuid,
    quantity: i32,
) -> Result<(), ServiceError> {
    let result = product::Entity::update_many()
        .col_expr(
            product::Column::StockQuantity,
            Expr::col(product::Column::StockQuantity).sub(quantity),
        )
        .col_expr(product::Column::UpdatedAt, Expr::value(Some(Utc::now())))
        .filter(product::Column::Id.eq(product_id))
        .filter(product::Column::TenantId.eq(tenant_id))
        .filter(product::Column::StockQuantity.gte(quantity))
        .exec(conn)
        .await
        .map_err(ServiceError::DatabaseError)?;

    if result.rows_affected == 0 {
        return Err(ServiceError::InsufficientStock(format!(
            "Product {} does not have {} units available",
            product_id, quantity
        )));
    }

    Ok(())
}

/// Unconditional compensation used by cancellation and deletion.
pub async fn increment<C: ConnectionTrait>(
    conn: &C,
    tenant_id: Uuid,
    product_id: Uuid,
    quantity: i32,
) -> Result<(), ServiceError> {
    let result = product::Entity::update_many()
        .col_expr(
            product::Column::StockQuantity,
            Expr::col(product::Column::StockQuantity).add(quantity),
        )
        .col_expr(product::Column::UpdatedAt, Expr::value(Some(Utc::now())))
        .filter(product::Column::Id.eq(product_id))
        .filter(product::Column::TenantId.eq(tenant_id))
        .exec(conn)
        .await
        .map_err(ServiceError::DatabaseError)?;

    if result.rows_affected == 0 {
        return Err(ServiceError::NotFound(format!(
            "Product {} not found",
            product_id
        )));
    }

    Ok(())
}
