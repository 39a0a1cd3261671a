use crate::{
    config::AppConfig,
    db::DbPool,
    entities::order::{self, OrderStatus},
    entities::{daily_sales_summary, order_item, product},
    errors::ServiceError,
    events::{Event, EventSender},
    metrics,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

const TOP_PRODUCTS_LIMIT: usize = 5;

/// Where a daily sales figure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum SummarySource {
    PreGenerated,
    OnDemand,
}

/// One day of sales for a tenant
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DailySalesReport {
    pub date: NaiveDate,
    pub total_orders: i64,
    pub total_sales: Decimal,
    pub average_order_value: Decimal,
    pub source: SummarySource,
}

/// One aggregated row of the top-products report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TopProductRow {
    pub id: Uuid,
    pub name: String,
    pub sku: String,
    pub total_quantity: i64,
    pub total_revenue: Decimal,
    pub average_price: Decimal,
}

/// Resolved, validated report date range (inclusive day bounds)
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ReportWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Whole days between start and end
    pub days: i64,
}

/// Outcome of a top-products request: short ranges are computed inline,
/// longer ones are handed to the report worker for email delivery.
#[derive(Debug)]
pub enum TopProductsOutcome {
    Immediate {
        window: ReportWindow,
        top_products: Vec<TopProductRow>,
    },
    Deferred {
        window: ReportWindow,
        email: String,
        threshold_days: i64,
    },
}

/// One product in the low-stock report
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LowStockProductRow {
    pub id: Uuid,
    pub name: String,
    pub sku: String,
    pub stock_quantity: i32,
    pub low_stock_threshold: i32,
    pub price: Decimal,
    /// Strictly below the threshold, a reorder is due
    pub needs_restocking: bool,
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn next_day_start(date: NaiveDate) -> DateTime<Utc> {
    day_start(date + chrono::Duration::days(1))
}

/// Fills in defaults relative to `today` and rejects inverted ranges.
fn resolve_window_from(
    today: NaiveDate,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    default_range_days: i64,
) -> Result<ReportWindow, ServiceError> {
    let end = end.unwrap_or(today);
    let start = start.unwrap_or_else(|| today - chrono::Duration::days(default_range_days));

    if start > end {
        return Err(ServiceError::ValidationError(
            "start_date must be before or equal to end_date".to_string(),
        ));
    }

    Ok(ReportWindow {
        start,
        end,
        days: (end - start).num_days(),
    })
}

/// Quantity descending, then product id ascending so equal quantities come
/// out in a stable order; truncated to the report size.
fn rank_top_products(mut rows: Vec<TopProductRow>) -> Vec<TopProductRow> {
    rows.sort_by(|a, b| {
        b.total_quantity
            .cmp(&a.total_quantity)
            .then(a.id.cmp(&b.id))
    });
    rows.truncate(TOP_PRODUCTS_LIMIT);
    rows
}

/// Service for sales aggregation and product reporting
#[derive(Clone)]
pub struct ReportService {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
    immediate_threshold_days: i64,
    default_range_days: i64,
}

impl ReportService {
    /// Creates a new report service instance
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender, config: &AppConfig) -> Self {
        Self {
            db_pool,
            event_sender,
            immediate_threshold_days: config.report_immediate_threshold_days,
            default_range_days: config.report_default_range_days,
        }
    }

    /// Daily sales for one tenant-date pair. Prefers the precomputed summary
    /// row; falls back to aggregating paid orders on demand. The fallback
    /// never writes a summary row.
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn daily_sales(
        &self,
        tenant_id: Uuid,
        date: Option<NaiveDate>,
    ) -> Result<DailySalesReport, ServiceError> {
        let today = Utc::now().date_naive();
        let date = date.unwrap_or_else(|| today - chrono::Duration::days(1));
        if date > today {
            return Err(ServiceError::ValidationError(
                "date cannot be in the future".to_string(),
            ));
        }

        let db = &*self.db_pool;
        let summary = daily_sales_summary::Entity::find()
            .filter(daily_sales_summary::Column::TenantId.eq(tenant_id))
            .filter(daily_sales_summary::Column::Date.eq(date))
            .one(db)
            .await
            .map_err(|e| {
                error!(error = %e, date = %date, "Failed to look up daily sales summary");
                ServiceError::DatabaseError(e)
            })?;

        if let Some(row) = summary {
            info!(date = %date, "Serving pre-generated daily sales summary");
            return Ok(DailySalesReport {
                date: row.date,
                total_orders: i64::from(row.total_orders),
                total_sales: row.total_sales,
                average_order_value: row.average_order_value,
                source: SummarySource::PreGenerated,
            });
        }

        let (total_orders, total_sales, average_order_value) =
            self.aggregate_day(tenant_id, date).await?;
        info!(date = %date, total_orders = total_orders, "Computed daily sales on demand");

        Ok(DailySalesReport {
            date,
            total_orders,
            total_sales,
            average_order_value,
            source: SummarySource::OnDemand,
        })
    }

    /// Recomputes and upserts the summary row for one tenant-date pair.
    /// Idempotent: rerunning for the same pair overwrites the same row.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, date = %date))]
    pub async fn generate_daily_summary(
        &self,
        tenant_id: Uuid,
        date: NaiveDate,
    ) -> Result<DailySalesReport, ServiceError> {
        let db = &*self.db_pool;
        let (total_orders, total_sales, average_order_value) =
            self.aggregate_day(tenant_id, date).await?;

        let existing = daily_sales_summary::Entity::find()
            .filter(daily_sales_summary::Column::TenantId.eq(tenant_id))
            .filter(daily_sales_summary::Column::Date.eq(date))
            .one(db)
            .await
            .map_err(|e| {
                error!(error = %e, date = %date, "Failed to look up daily sales summary for upsert");
                ServiceError::DatabaseError(e)
            })?;

        let total_orders_i32 = i32::try_from(total_orders).unwrap_or(i32::MAX);
        match existing {
            Some(row) => {
                let mut active_model: daily_sales_summary::ActiveModel = row.into();
                active_model.total_orders = Set(total_orders_i32);
                active_model.total_sales = Set(total_sales);
                active_model.average_order_value = Set(average_order_value);
                active_model.update(db).await.map_err(|e| {
                    error!(error = %e, date = %date, "Failed to update daily sales summary");
                    ServiceError::DatabaseError(e)
                })?;
            }
            None => {
                daily_sales_summary::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    tenant_id: Set(tenant_id),
                    date: Set(date),
                    total_orders: Set(total_orders_i32),
                    total_sales: Set(total_sales),
                    average_order_value: Set(average_order_value),
                    ..Default::default()
                }
                .insert(db)
                .await
                .map_err(|e| {
                    error!(error = %e, date = %date, "Failed to insert daily sales summary");
                    ServiceError::DatabaseError(e)
                })?;
            }
        }

        metrics::SUMMARIES_GENERATED.inc();
        info!(date = %date, total_orders = total_orders, "Daily sales summary generated");

        if let Err(e) = self
            .event_sender
            .send(Event::DailySummaryGenerated { tenant_id, date })
            .await
        {
            warn!(error = %e, date = %date, "Failed to send daily summary event");
        }

        Ok(DailySalesReport {
            date,
            total_orders,
            total_sales,
            average_order_value,
            source: SummarySource::PreGenerated,
        })
    }

    /// Resolves and validates the requested range, applying the configured
    /// defaults when dates are absent.
    pub fn resolve_window(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<ReportWindow, ServiceError> {
        resolve_window_from(Utc::now().date_naive(), start, end, self.default_range_days)
    }

    /// Top products by quantity sold from paid orders in the range. Ranges
    /// at most `immediate_threshold_days` long are computed inline; longer
    /// ranges are deferred to the report worker for email delivery.
    #[instrument(skip(self, requester_email), fields(tenant_id = %tenant_id))]
    pub async fn top_products(
        &self,
        tenant_id: Uuid,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        requester_email: &str,
    ) -> Result<TopProductsOutcome, ServiceError> {
        let window = self.resolve_window(start, end)?;

        if window.days <= self.immediate_threshold_days {
            let top_products = self
                .top_product_rows(tenant_id, window.start, window.end)
                .await?;
            metrics::REPORTS_IMMEDIATE.inc();
            info!(
                start = %window.start,
                end = %window.end,
                rows = top_products.len(),
                "Top products computed immediately"
            );
            return Ok(TopProductsOutcome::Immediate {
                window,
                top_products,
            });
        }

        info!(
            start = %window.start,
            end = %window.end,
            days = window.days,
            "Top products range exceeds immediate threshold; deferring to worker"
        );
        Ok(TopProductsOutcome::Deferred {
            window,
            email: requester_email.to_string(),
            threshold_days: self.immediate_threshold_days,
        })
    }

    /// The aggregation shared by the immediate path and the report worker:
    /// order lines of paid orders in the window, grouped by product, summed
    /// quantity and revenue, averaged unit price, top 5 by quantity.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, start = %start, end = %end))]
    pub async fn top_product_rows(
        &self,
        tenant_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<TopProductRow>, ServiceError> {
        let db = &*self.db_pool;

        let paid_orders = order::Entity::find()
            .filter(order::Column::TenantId.eq(tenant_id))
            .filter(order::Column::Status.eq(OrderStatus::Paid))
            .filter(order::Column::CreatedAt.gte(day_start(start)))
            .filter(order::Column::CreatedAt.lt(next_day_start(end)))
            .all(db)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to fetch paid orders for top products");
                ServiceError::DatabaseError(e)
            })?;

        if paid_orders.is_empty() {
            return Ok(Vec::new());
        }

        let order_ids: Vec<Uuid> = paid_orders.iter().map(|o| o.id).collect();
        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.is_in(order_ids))
            .all(db)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to fetch order lines for top products");
                ServiceError::DatabaseError(e)
            })?;

        if items.is_empty() {
            return Ok(Vec::new());
        }

        let product_ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
        let products: HashMap<Uuid, product::Model> = product::Entity::find()
            .filter(product::Column::Id.is_in(product_ids))
            .filter(product::Column::TenantId.eq(tenant_id))
            .all(db)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to fetch products for top products");
                ServiceError::DatabaseError(e)
            })?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        struct Accumulator {
            name: String,
            sku: String,
            total_quantity: i64,
            total_revenue: Decimal,
            unit_price_sum: Decimal,
            line_count: i64,
        }

        let mut by_product: HashMap<Uuid, Accumulator> = HashMap::new();
        for item in &items {
            let Some(product) = products.get(&item.product_id) else {
                continue;
            };
            let entry = by_product
                .entry(item.product_id)
                .or_insert_with(|| Accumulator {
                    name: product.name.clone(),
                    sku: product.sku.clone(),
                    total_quantity: 0,
                    total_revenue: Decimal::ZERO,
                    unit_price_sum: Decimal::ZERO,
                    line_count: 0,
                });
            entry.total_quantity += i64::from(item.quantity);
            entry.total_revenue += item.total_price;
            entry.unit_price_sum += item.unit_price;
            entry.line_count += 1;
        }

        let rows = by_product
            .into_iter()
            .map(|(id, acc)| TopProductRow {
                id,
                name: acc.name,
                sku: acc.sku,
                total_quantity: acc.total_quantity,
                total_revenue: acc.total_revenue,
                average_price: (acc.unit_price_sum / Decimal::from(acc.line_count)).round_dp(2),
            })
            .collect();

        Ok(rank_top_products(rows))
    }

    /// Active products whose stock sits at or below their threshold,
    /// ordered by stock ascending
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn low_stock(&self, tenant_id: Uuid) -> Result<Vec<LowStockProductRow>, ServiceError> {
        let db = &*self.db_pool;

        let products = product::Entity::find()
            .filter(product::Column::TenantId.eq(tenant_id))
            .filter(product::Column::IsActive.eq(true))
            .filter(product::Column::DeletedAt.is_null())
            .filter(
                sea_orm::sea_query::Expr::col(product::Column::StockQuantity)
                    .lte(sea_orm::sea_query::Expr::col(product::Column::LowStockThreshold)),
            )
            .order_by_asc(product::Column::StockQuantity)
            .all(db)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to fetch low stock products");
                ServiceError::DatabaseError(e)
            })?;

        Ok(products
            .into_iter()
            .map(|p| LowStockProductRow {
                id: p.id,
                name: p.name.clone(),
                sku: p.sku.clone(),
                stock_quantity: p.stock_quantity,
                low_stock_threshold: p.low_stock_threshold,
                price: p.price,
                needs_restocking: p.needs_restocking(),
            })
            .collect())
    }

    /// Count, sum and average of paid orders created on the given day.
    /// Absent aggregates default to zero.
    async fn aggregate_day(
        &self,
        tenant_id: Uuid,
        date: NaiveDate,
    ) -> Result<(i64, Decimal, Decimal), ServiceError> {
        let db = &*self.db_pool;

        let orders = order::Entity::find()
            .filter(order::Column::TenantId.eq(tenant_id))
            .filter(order::Column::Status.eq(OrderStatus::Paid))
            .filter(order::Column::CreatedAt.gte(day_start(date)))
            .filter(order::Column::CreatedAt.lt(next_day_start(date)))
            .all(db)
            .await
            .map_err(|e| {
                error!(error = %e, date = %date, "Failed to aggregate paid orders");
                ServiceError::DatabaseError(e)
            })?;

        let total_orders = orders.len() as i64;
        let total_sales: Decimal = orders.iter().map(|o| o.total_amount).sum();
        let average_order_value = if total_orders > 0 {
            (total_sales / Decimal::from(total_orders)).round_dp(2)
        } else {
            Decimal::ZERO
        };

        Ok((total_orders, total_sales, average_order_value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn row(id_byte: u8, quantity: i64) -> TopProductRow {
        TopProductRow {
            id: Uuid::from_bytes([id_byte; 16]),
            name: format!("Product {}", id_byte),
            sku: format!("SKU-{}", id_byte),
            total_quantity: quantity,
            total_revenue: dec!(100.00),
            average_price: dec!(10.00),
        }
    }

    #[test]
    fn ranking_sorts_by_quantity_descending() {
        let ranked = rank_top_products(vec![row(1, 3), row(2, 9), row(3, 6)]);
        let quantities: Vec<i64> = ranked.iter().map(|r| r.total_quantity).collect();
        assert_eq!(quantities, vec![9, 6, 3]);
    }

    #[test]
    fn ranking_breaks_ties_by_product_id() {
        let ranked = rank_top_products(vec![row(9, 5), row(1, 5), row(4, 5)]);
        let ids: Vec<Uuid> = ranked.iter().map(|r| r.id).collect();
        assert_eq!(
            ids,
            vec![
                Uuid::from_bytes([1; 16]),
                Uuid::from_bytes([4; 16]),
                Uuid::from_bytes([9; 16])
            ]
        );
    }

    #[test]
    fn ranking_keeps_only_the_top_five() {
        let rows = (1..=8).map(|n| row(n, i64::from(n))).collect();
        let ranked = rank_top_products(rows);
        assert_eq!(ranked.len(), 5);
        assert_eq!(ranked[0].total_quantity, 8);
        assert_eq!(ranked[4].total_quantity, 4);
    }

    #[test]
    fn window_defaults_to_the_configured_range_ending_today() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();
        let window = resolve_window_from(today, None, None, 30).unwrap();
        assert_eq!(window.end, today);
        assert_eq!(window.start, NaiveDate::from_ymd_opt(2025, 5, 31).unwrap());
        assert_eq!(window.days, 30);
    }

    #[test]
    fn window_rejects_inverted_ranges() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();
        let result = resolve_window_from(
            today,
            Some(NaiveDate::from_ymd_opt(2025, 6, 10).unwrap()),
            Some(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()),
            30,
        );
        assert_matches!(result, Err(ServiceError::ValidationError(_)));
    }

    #[test]
    fn window_counts_whole_days_between_bounds() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();
        let window = resolve_window_from(
            today,
            Some(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()),
            Some(NaiveDate::from_ymd_opt(2025, 6, 8).unwrap()),
            30,
        )
        .unwrap();
        assert_eq!(window.days, 7);
    }

    #[test]
    fn summary_source_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_string(&SummarySource::PreGenerated).unwrap(),
            "\"pre-generated\""
        );
        assert_eq!(
            serde_json::to_string(&SummarySource::OnDemand).unwrap(),
            "\"on-demand\""
        );
    }

    #[test]
    fn day_bounds_are_utc_midnights() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        assert_eq!(day_start(date).to_rfc3339(), "2025-06-01T00:00:00+00:00");
        assert_eq!(
            next_day_start(date).to_rfc3339(),
            "2025-06-02T00:00:00+00:00"
        );
    }
}
