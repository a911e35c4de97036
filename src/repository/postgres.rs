use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Transaction};
use std::collections::HashMap;

use crate::domain::order::{
    BuyerId, CancelledBy, HeaderPatch, NewOrderRecord, Order, OrderId, Predicate, SellerId, StampMode,
};
use crate::domain::pricing::{BuyerSellerRelation, ItemId, NewPriceSlot, PriceId, PriceSlot};
use crate::ledger::{LineItemBatch, OrderAdditional, OrderItem, OrderRows, PendingBatch, Revision};

use super::filter::{OrderFilter, OrderSort, Page, PartyScope};
use super::{
    AppendOutcome, LineItemRepository, OrderRepository, PriceRepository, RelationRepository,
    SlotReplacement, TransitionOutcome,
};

// ============================================================================
// PostgreSQL Store
// ============================================================================
//
// Every write that depends on a previous read runs in one transaction:
// - the order row is locked with SELECT ... FOR UPDATE
// - header updates repeat the guard in their WHERE clause
// - batches compare against the order_revisions marker before inserting
//
// ============================================================================

const SCHEMA: &str = include_str!("schema.sql");

const ORDER_COLUMNS: &str = "id, buyer_id, seller_id, address, is_cod, is_paid, notes, \
     delivery_fee, read, created, accepted, assigned, pickedup, delivered, cancelled, cancelled_by";

const PRICE_COLUMNS: &str = "id, seller_id, item_id, unit, ratio, price_normal, price_bronze, \
     price_silver, price_gold, active";

#[derive(Debug, FromRow)]
struct OrderRow {
    id: i64,
    buyer_id: i64,
    seller_id: i64,
    address: Option<String>,
    is_cod: bool,
    is_paid: bool,
    notes: Option<String>,
    delivery_fee: i64,
    read: bool,
    created: DateTime<Utc>,
    accepted: Option<DateTime<Utc>>,
    assigned: Option<DateTime<Utc>>,
    pickedup: Option<DateTime<Utc>>,
    delivered: Option<DateTime<Utc>>,
    cancelled: Option<DateTime<Utc>>,
    cancelled_by: Option<String>,
}

impl TryFrom<OrderRow> for Order {
    type Error = anyhow::Error;

    fn try_from(row: OrderRow) -> Result<Self> {
        let cancelled_by = row
            .cancelled_by
            .as_deref()
            .map(str::parse::<CancelledBy>)
            .transpose()
            .map_err(|e: String| anyhow::anyhow!(e))
            .with_context(|| format!("order {} has a malformed cancelled_by", row.id))?;

        Ok(Order {
            id: OrderId(row.id),
            buyer_id: BuyerId(row.buyer_id),
            seller_id: SellerId(row.seller_id),
            address: row.address,
            is_cod: row.is_cod,
            is_paid: row.is_paid,
            notes: row.notes,
            delivery_fee: row.delivery_fee,
            read: row.read,
            created: row.created,
            accepted: row.accepted,
            assigned: row.assigned,
            pickedup: row.pickedup,
            delivered: row.delivered,
            cancelled: row.cancelled,
            cancelled_by,
        })
    }
}

#[derive(Debug, FromRow)]
struct ItemRow {
    order_id: i64,
    item_id: i64,
    unit: String,
    quantity: i64,
    price: i64,
    price_id: i64,
    revision: i64,
}

#[derive(Debug, FromRow)]
struct AdditionalRow {
    order_id: i64,
    name: String,
    unit: String,
    quantity: i64,
    price: i64,
    revision: i64,
}

#[derive(Debug, FromRow)]
struct PriceRow {
    id: i64,
    seller_id: i64,
    item_id: i64,
    unit: String,
    ratio: i32,
    price_normal: i64,
    price_bronze: i64,
    price_silver: i64,
    price_gold: i64,
    active: bool,
}

impl From<PriceRow> for PriceSlot {
    fn from(row: PriceRow) -> Self {
        PriceSlot {
            id: PriceId(row.id),
            seller_id: SellerId(row.seller_id),
            item_id: ItemId(row.item_id),
            unit: row.unit,
            ratio: row.ratio,
            prices: [row.price_normal, row.price_bronze, row.price_silver, row.price_gold],
            active: row.active,
        }
    }
}

#[derive(Debug, FromRow)]
struct RelationRow {
    buyer_id: i64,
    seller_id: i64,
    tier: String,
    active: bool,
    notes: Option<String>,
}

impl TryFrom<RelationRow> for BuyerSellerRelation {
    type Error = anyhow::Error;

    fn try_from(row: RelationRow) -> Result<Self> {
        Ok(BuyerSellerRelation {
            buyer_id: BuyerId(row.buyer_id),
            seller_id: SellerId(row.seller_id),
            tier: row.tier.parse().map_err(|e: String| anyhow::anyhow!(e))?,
            active: row.active,
            notes: row.notes,
        })
    }
}

// ============================================================================
// Query Builders
// ============================================================================

fn push_predicates(builder: &mut QueryBuilder<'_, Postgres>, predicates: &[Predicate]) {
    for predicate in predicates {
        builder.push(" AND ");
        builder.push(predicate.field.column());
        builder.push(if predicate.is_set { " IS NOT NULL" } else { " IS NULL" });
    }
}

fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &OrderFilter) {
    builder.push(" WHERE TRUE");

    match filter.party {
        PartyScope::All => {}
        PartyScope::Buyer(buyer) => {
            builder.push(" AND buyer_id = ").push_bind(buyer.0);
        }
        PartyScope::Seller(seller) => {
            builder.push(" AND seller_id = ").push_bind(seller.0);
        }
    }

    push_predicates(builder, &filter.predicates);

    if let Some(window) = filter.window {
        builder.push(" AND created > ").push_bind(window.start);
        builder.push(" AND created < ").push_bind(window.end);
    }
    if filter.exclude_sentinel {
        builder.push(" AND buyer_id <> -1 AND seller_id <> -1");
    }
    if filter.unread_only {
        builder.push(" AND NOT read");
    }
}

fn order_by(sort: OrderSort) -> &'static str {
    match sort {
        OrderSort::IdDesc => " ORDER BY id DESC",
        OrderSort::CreatedDesc => " ORDER BY created DESC, id DESC",
    }
}

/// Guarded header update. Matches zero rows when the guard no longer holds.
fn update_statement<'a>(
    id: OrderId,
    guard: &[Predicate],
    patch: &HeaderPatch,
) -> QueryBuilder<'a, Postgres> {
    let mut builder = QueryBuilder::new("UPDATE orders SET id = id");

    for stamp in &patch.stamps {
        let column = stamp.field.column();
        builder.push(", ").push(column).push(" = ");
        match stamp.mode {
            StampMode::Set => {
                builder.push_bind(stamp.at);
            }
            StampMode::IfUnset => {
                builder.push("COALESCE(").push(column).push(", ");
                builder.push_bind(stamp.at).push(")");
            }
        }
    }
    if let Some(cancelled_by) = patch.cancelled_by {
        builder.push(", cancelled_by = ").push_bind(cancelled_by.as_str());
    }
    if let Some(notes) = &patch.notes {
        builder.push(", notes = ").push_bind(notes.clone());
    }

    builder.push(" WHERE id = ").push_bind(id.0);
    push_predicates(&mut builder, guard);
    builder.push(" RETURNING ").push(ORDER_COLUMNS);
    builder
}

// ============================================================================
// Store
// ============================================================================

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool. Errors stay `sqlx::Error` so startup can tell transient
    /// failures apart.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self::new(pool))
    }

    /// Create tables and indexes if they don't exist.
    pub async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .with_context(|| format!("schema statement failed: {}", statement))?;
        }

        tracing::info!("Database schema ready");
        Ok(())
    }

    async fn locked_revision(
        tx: &mut Transaction<'_, Postgres>,
        order_id: OrderId,
    ) -> Result<Option<Revision>> {
        let revision: Option<i64> =
            sqlx::query_scalar("SELECT revision FROM order_revisions WHERE order_id = $1 FOR UPDATE")
                .bind(order_id.0)
                .fetch_optional(&mut **tx)
                .await?;

        Ok(revision.map(Revision))
    }

    async fn write_batch(
        tx: &mut Transaction<'_, Postgres>,
        order_id: OrderId,
        batch: &LineItemBatch,
    ) -> Result<()> {
        if !batch.items.is_empty() {
            let mut builder = QueryBuilder::<Postgres>::new(
                "INSERT INTO order_items (order_id, item_id, unit, quantity, price, price_id, revision) ",
            );
            builder.push_values(&batch.items, |mut row, item| {
                row.push_bind(order_id.0)
                    .push_bind(item.item_id.0)
                    .push_bind(item.unit.clone())
                    .push_bind(item.quantity)
                    .push_bind(item.price)
                    .push_bind(item.price_id.0)
                    .push_bind(item.revision.0);
            });
            builder.build().execute(&mut **tx).await?;
        }

        if !batch.additionals.is_empty() {
            let mut builder = QueryBuilder::<Postgres>::new(
                "INSERT INTO additionals (order_id, name, unit, quantity, price, revision) ",
            );
            builder.push_values(&batch.additionals, |mut row, add| {
                row.push_bind(order_id.0)
                    .push_bind(add.name.clone())
                    .push_bind(add.unit.clone())
                    .push_bind(add.quantity)
                    .push_bind(add.price)
                    .push_bind(add.revision.0);
            });
            builder.build().execute(&mut **tx).await?;
        }

        sqlx::query(
            "INSERT INTO order_revisions (order_id, revision) VALUES ($1, $2)
             ON CONFLICT (order_id) DO UPDATE
             SET revision = GREATEST(order_revisions.revision, EXCLUDED.revision)",
        )
        .bind(order_id.0)
        .bind(batch.revision.0)
        .execute(&mut **tx)
        .await?;

        tracing::debug!(
            order_id = %order_id,
            revision = %batch.revision,
            items = batch.items.len(),
            additionals = batch.additionals.len(),
            "Wrote line-item batch"
        );

        Ok(())
    }
}

#[async_trait]
impl OrderRepository for PgStore {
    async fn insert(&self, record: NewOrderRecord, batch: &LineItemBatch) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "INSERT INTO orders (buyer_id, seller_id, address, is_cod, delivery_fee, notes, created)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {}",
            ORDER_COLUMNS
        );
        let row: OrderRow = sqlx::query_as(&sql)
            .bind(record.buyer_id.0)
            .bind(record.seller_id.0)
            .bind(record.address)
            .bind(record.is_cod)
            .bind(record.delivery_fee)
            .bind(record.notes)
            .bind(record.created)
            .fetch_one(&mut *tx)
            .await
            .context("failed to insert order")?;

        let order = Order::try_from(row)?;
        Self::write_batch(&mut tx, order.id, batch).await?;
        tx.commit().await?;

        Ok(order)
    }

    async fn find(&self, id: OrderId) -> Result<Option<Order>> {
        let sql = format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS);
        let row: Option<OrderRow> = sqlx::query_as(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Order::try_from).transpose()
    }

    async fn transition(
        &self,
        id: OrderId,
        guard: &[Predicate],
        patch: &HeaderPatch,
        batch: Option<&PendingBatch>,
    ) -> Result<TransitionOutcome> {
        let mut tx = self.pool.begin().await?;

        let sql = format!("SELECT {} FROM orders WHERE id = $1 FOR UPDATE", ORDER_COLUMNS);
        let locked: Option<OrderRow> = sqlx::query_as(&sql)
            .bind(id.0)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Ok(TransitionOutcome::NotFound);
        }

        if let Some(pending) = batch {
            let latest = Self::locked_revision(&mut tx, id).await?;
            if latest != pending.expected {
                return Ok(TransitionOutcome::RevisionConflict);
            }
        }

        let mut update = update_statement(id, guard, patch);
        let updated: Option<OrderRow> = update
            .build_query_as()
            .fetch_optional(&mut *tx)
            .await
            .context("guarded order update failed")?;

        let Some(row) = updated else {
            return Ok(TransitionOutcome::GuardRejected);
        };
        let order = Order::try_from(row)?;

        if let Some(pending) = batch {
            Self::write_batch(&mut tx, id, &pending.batch).await?;
        }

        tx.commit().await?;
        Ok(TransitionOutcome::Applied(order))
    }

    async fn mark_read(&self, id: OrderId) -> Result<bool> {
        let result = sqlx::query("UPDATE orders SET read = TRUE WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, filter: &OrderFilter, page: Page) -> Result<(u64, Vec<Order>)> {
        let total = self.count(filter).await?;

        let mut builder = QueryBuilder::<Postgres>::new("SELECT ");
        builder.push(ORDER_COLUMNS).push(" FROM orders");
        push_filter(&mut builder, filter);
        builder.push(order_by(filter.sort));
        let (limit, offset) = page.sql_bounds();
        if let Some(limit) = limit {
            builder.push(" LIMIT ").push_bind(limit);
        }
        builder.push(" OFFSET ").push_bind(offset);

        let rows: Vec<OrderRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        let orders = rows
            .into_iter()
            .map(Order::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok((total, orders))
    }

    async fn count(&self, filter: &OrderFilter) -> Result<u64> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM orders");
        push_filter(&mut builder, filter);

        let count: i64 = builder.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(count.max(0) as u64)
    }
}

#[async_trait]
impl LineItemRepository for PgStore {
    async fn latest_revision(&self, order_id: OrderId) -> Result<Option<Revision>> {
        let revision: Option<i64> =
            sqlx::query_scalar("SELECT revision FROM order_revisions WHERE order_id = $1")
                .bind(order_id.0)
                .fetch_optional(&self.pool)
                .await?;

        Ok(revision.map(Revision))
    }

    async fn rows(&self, order_ids: &[OrderId]) -> Result<HashMap<OrderId, OrderRows>> {
        let ids: Vec<i64> = order_ids.iter().map(|id| id.0).collect();
        let mut rows: HashMap<OrderId, OrderRows> =
            order_ids.iter().map(|id| (*id, OrderRows::default())).collect();
        if ids.is_empty() {
            return Ok(rows);
        }

        let items: Vec<ItemRow> = sqlx::query_as(
            "SELECT order_id, item_id, unit, quantity, price, price_id, revision
             FROM order_items WHERE order_id = ANY($1) ORDER BY order_id, revision, id",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let additionals: Vec<AdditionalRow> = sqlx::query_as(
            "SELECT order_id, name, unit, quantity, price, revision
             FROM additionals WHERE order_id = ANY($1) ORDER BY order_id, revision, id",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        for item in items {
            rows.entry(OrderId(item.order_id)).or_default().items.push(OrderItem {
                item_id: ItemId(item.item_id),
                unit: item.unit,
                quantity: item.quantity,
                price: item.price,
                price_id: PriceId(item.price_id),
                revision: Revision(item.revision),
            });
        }
        for add in additionals {
            rows.entry(OrderId(add.order_id))
                .or_default()
                .additionals
                .push(OrderAdditional {
                    name: add.name,
                    unit: add.unit,
                    quantity: add.quantity,
                    price: add.price,
                    revision: Revision(add.revision),
                });
        }

        Ok(rows)
    }

    async fn append(&self, order_id: OrderId, pending: &PendingBatch) -> Result<AppendOutcome> {
        let mut tx = self.pool.begin().await?;

        if Self::locked_revision(&mut tx, order_id).await? != pending.expected {
            return Ok(AppendOutcome::RevisionConflict);
        }

        Self::write_batch(&mut tx, order_id, &pending.batch).await?;
        tx.commit().await?;

        Ok(AppendOutcome::Appended)
    }
}

#[async_trait]
impl PriceRepository for PgStore {
    async fn find_many(&self, ids: &[PriceId]) -> Result<Vec<PriceSlot>> {
        let ids: Vec<i64> = ids.iter().map(|id| id.0).collect();
        let sql = format!("SELECT {} FROM item_prices WHERE id = ANY($1)", PRICE_COLUMNS);
        let rows: Vec<PriceRow> = sqlx::query_as(&sql).bind(&ids).fetch_all(&self.pool).await?;

        Ok(rows.into_iter().map(PriceSlot::from).collect())
    }

    async fn replace_active(
        &self,
        seller: SellerId,
        item: ItemId,
        slot: Option<NewPriceSlot>,
    ) -> Result<SlotReplacement> {
        let mut tx = self.pool.begin().await?;

        let deactivated: Vec<i64> = sqlx::query_scalar(
            "UPDATE item_prices SET active = FALSE
             WHERE seller_id = $1 AND item_id = $2 AND active
             RETURNING id",
        )
        .bind(seller.0)
        .bind(item.0)
        .fetch_all(&mut *tx)
        .await?;

        let inserted = match slot {
            Some(slot) => {
                let sql = format!(
                    "INSERT INTO item_prices
                        (seller_id, item_id, unit, ratio, price_normal, price_bronze, price_silver, price_gold, active)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, TRUE)
                     RETURNING {}",
                    PRICE_COLUMNS
                );
                let row: PriceRow = sqlx::query_as(&sql)
                    .bind(slot.seller_id.0)
                    .bind(slot.item_id.0)
                    .bind(slot.unit)
                    .bind(slot.ratio)
                    .bind(slot.prices[0])
                    .bind(slot.prices[1])
                    .bind(slot.prices[2])
                    .bind(slot.prices[3])
                    .fetch_one(&mut *tx)
                    .await?;
                Some(PriceSlot::from(row))
            }
            None => None,
        };

        tx.commit().await?;

        Ok(SlotReplacement {
            deactivated: deactivated.into_iter().map(PriceId).collect(),
            inserted,
        })
    }
}

#[async_trait]
impl RelationRepository for PgStore {
    async fn find(&self, buyer: BuyerId, seller: SellerId) -> Result<Option<BuyerSellerRelation>> {
        let row: Option<RelationRow> = sqlx::query_as(
            "SELECT buyer_id, seller_id, tier, active, notes
             FROM buyer_relations WHERE buyer_id = $1 AND seller_id = $2",
        )
        .bind(buyer.0)
        .bind(seller.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(BuyerSellerRelation::try_from).transpose()
    }

    async fn save(&self, relation: &BuyerSellerRelation) -> Result<()> {
        sqlx::query(
            "INSERT INTO buyer_relations (buyer_id, seller_id, tier, active, notes)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (buyer_id, seller_id) DO UPDATE
             SET tier = EXCLUDED.tier, active = EXCLUDED.active, notes = EXCLUDED.notes",
        )
        .bind(relation.buyer_id.0)
        .bind(relation.seller_id.0)
        .bind(relation.tier.as_str())
        .bind(relation.active)
        .bind(relation.notes.clone())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{DerivedStatus, Stamp, TimestampField};
    use crate::repository::TimeWindow;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_update_repeats_guard_in_where_clause() {
        let guard = [
            Predicate::set(TimestampField::Accepted),
            Predicate::unset(TimestampField::Cancelled),
        ];
        let patch = HeaderPatch {
            stamps: vec![
                Stamp::if_unset(TimestampField::Assigned, at()),
                Stamp::set(TimestampField::Delivered, at()),
            ],
            ..HeaderPatch::default()
        };

        let builder = update_statement(OrderId(5), &guard, &patch);
        assert_eq!(
            builder.sql(),
            format!(
                "UPDATE orders SET id = id, assigned = COALESCE(assigned, $1), delivered = $2 \
                 WHERE id = $3 AND accepted IS NOT NULL AND cancelled IS NULL RETURNING {}",
                ORDER_COLUMNS
            )
        );
    }

    #[test]
    fn test_update_binds_cancellation_fields() {
        let patch = HeaderPatch {
            stamps: vec![Stamp::set(TimestampField::Cancelled, at())],
            cancelled_by: Some(CancelledBy::Buyer),
            notes: Some("changed my mind".to_string()),
        };

        let builder = update_statement(OrderId(1), &[], &patch);
        assert!(builder
            .sql()
            .starts_with("UPDATE orders SET id = id, cancelled = $1, cancelled_by = $2, notes = $3 WHERE id = $4"));
    }

    #[test]
    fn test_filter_clause_for_seller_status_window() {
        let filter = OrderFilter::for_party(PartyScope::Seller(SellerId(3)))
            .with_status(DerivedStatus::Delivered)
            .within(TimeWindow::new(at(), at()))
            .excluding_sentinel();

        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM orders");
        push_filter(&mut builder, &filter);

        assert_eq!(
            builder.sql(),
            "SELECT COUNT(*) FROM orders WHERE TRUE AND seller_id = $1 \
             AND delivered IS NOT NULL AND cancelled IS NULL \
             AND created > $2 AND created < $3 AND buyer_id <> -1 AND seller_id <> -1"
        );
    }

    #[test]
    fn test_schema_declares_every_table() {
        for table in [
            "orders",
            "order_revisions",
            "order_items",
            "additionals",
            "item_prices",
            "buyer_relations",
        ] {
            assert!(
                SCHEMA.contains(&format!("CREATE TABLE IF NOT EXISTS {} (", table)),
                "missing table {}",
                table
            );
        }
    }
}
