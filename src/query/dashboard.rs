use serde::Serialize;
use std::collections::HashMap;

use crate::directory::ImageVariants;
use crate::domain::order::{Order, OrderError, OrderId, Predicate, TimestampField};
use crate::domain::pricing::{ItemId, Money};
use crate::repository::{OrderFilter, OrderSort, Page, PartyScope, TimeWindow};

use super::listing::OrderQueries;

// ============================================================================
// Dashboard - Status Counters & Latest Order Summary
// ============================================================================
//
// Both roll-ups share one base filter: the party scope, `created` strictly
// inside the window, and no order whose buyer or seller is the -1 sentinel.
// Counters use the status at query time. Sums saturate at the Money bounds.
//
// ============================================================================

const POPULAR_ITEMS: usize = 5;

const CREATED: &[Predicate] = &[
    Predicate::unset(TimestampField::Accepted),
    Predicate::unset(TimestampField::Cancelled),
];
const ACCEPTED: &[Predicate] = &[
    Predicate::set(TimestampField::Accepted),
    Predicate::unset(TimestampField::Cancelled),
    Predicate::unset(TimestampField::Delivered),
];
const DELIVERED: &[Predicate] = &[Predicate::set(TimestampField::Delivered)];
const CANCELLED: &[Predicate] = &[Predicate::set(TimestampField::Cancelled)];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub created: u64,
    pub accepted: u64,
    pub delivered: u64,
    pub cancelled: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderTotal {
    #[serde(flatten)]
    pub order: Order,
    /// Σ quantity x price over the current items.
    pub total_price: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopularItem {
    pub item_id: ItemId,
    pub unit: String,
    pub total_price: Money,
    pub total_quantity: i64,
    /// Empty when the catalog has no entry.
    pub name: String,
    #[serde(flatten)]
    pub images: Option<ImageVariants>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LatestOrderSummary {
    /// Newest first.
    pub orders: Vec<OrderTotal>,
    pub popular_items: Vec<PopularItem>,
    pub revenue: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardReport {
    #[serde(flatten)]
    pub counts: StatusCounts,
    pub latest: Vec<OrderTotal>,
    pub popular_items: Vec<PopularItem>,
    pub revenue: Money,
    /// Orders in the window, every status included.
    pub all_orders: u64,
}

fn base_filter(party: PartyScope, window: TimeWindow) -> OrderFilter {
    OrderFilter::for_party(party).within(window).excluding_sentinel()
}

impl OrderQueries {
    pub async fn count_by_status(&self, party: PartyScope, window: TimeWindow) -> Result<StatusCounts, OrderError> {
        self.metrics.record_query("count_by_status");

        Ok(StatusCounts {
            created: self.count_in(party, window, CREATED).await?,
            accepted: self.count_in(party, window, ACCEPTED).await?,
            delivered: self.count_in(party, window, DELIVERED).await?,
            cancelled: self.count_in(party, window, CANCELLED).await?,
        })
    }

    async fn count_in(
        &self,
        party: PartyScope,
        window: TimeWindow,
        predicates: &[Predicate],
    ) -> Result<u64, OrderError> {
        let filter = base_filter(party, window).with_predicates(predicates);
        Ok(self.orders.count(&filter).await?)
    }

    /// Non-cancelled orders of the window with their totals, the revenue they
    /// add up to and the best-selling (item, unit) pairs among them.
    pub async fn latest_order_summary(
        &self,
        party: PartyScope,
        window: TimeWindow,
    ) -> Result<LatestOrderSummary, OrderError> {
        self.metrics.record_query("latest_order_summary");

        let filter = base_filter(party, window)
            .with_predicates(&[Predicate::unset(TimestampField::Cancelled)])
            .sorted(OrderSort::CreatedDesc);
        let (_, orders) = self.orders.list(&filter, Page::unbounded()).await?;

        let ids: Vec<OrderId> = orders.iter().map(|order| order.id).collect();
        let mut contents = self.assembler.current_contents(&ids).await?;

        let mut revenue: Money = 0;
        let mut totals = Vec::with_capacity(orders.len());
        let mut groups: Vec<PopularItem> = Vec::new();
        let mut positions: HashMap<(ItemId, String), usize> = HashMap::new();

        for order in orders {
            let current = contents.remove(&order.id).unwrap_or_default();
            let total_price = current.items_total();
            revenue = revenue.saturating_add(total_price);

            for item in current.items {
                let key = (item.item_id, item.unit.clone());
                let position = *positions.entry(key).or_insert_with(|| {
                    groups.push(PopularItem {
                        item_id: item.item_id,
                        unit: item.unit.clone(),
                        total_price: 0,
                        total_quantity: 0,
                        name: String::new(),
                        images: None,
                    });
                    groups.len() - 1
                });
                let group = &mut groups[position];
                group.total_price = group.total_price.saturating_add(item.total());
                group.total_quantity = group.total_quantity.saturating_add(item.quantity);
            }

            totals.push(OrderTotal { order, total_price });
        }

        // stable: ties keep first-seen order
        groups.sort_by(|a, b| b.total_price.cmp(&a.total_price));
        groups.truncate(POPULAR_ITEMS);

        let item_ids: Vec<ItemId> = groups.iter().map(|group| group.item_id).collect();
        let catalog = self.assembler.catalog_items(&item_ids).await?;
        for group in &mut groups {
            if let Some(entry) = catalog.get(&group.item_id) {
                group.name = entry.name.clone();
                group.images = entry.images.clone();
            }
        }

        tracing::debug!(
            party = ?party,
            orders = totals.len(),
            revenue,
            "Computed latest order summary"
        );

        Ok(LatestOrderSummary {
            orders: totals,
            popular_items: groups,
            revenue,
        })
    }

    /// Counters and latest summary for one party and window.
    pub async fn dashboard(&self, party: PartyScope, window: TimeWindow) -> Result<DashboardReport, OrderError> {
        let counts = self.count_by_status(party, window).await?;
        let summary = self.latest_order_summary(party, window).await?;
        let all_orders = self.count_in(party, window, &[]).await?;

        Ok(DashboardReport {
            counts,
            latest: summary.orders,
            popular_items: summary.popular_items,
            revenue: summary.revenue,
            all_orders,
        })
    }
}
