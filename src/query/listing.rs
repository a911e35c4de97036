use serde::Serialize;
use std::sync::Arc;

use crate::domain::order::{Actor, DerivedStatus, OrderError, OrderId, SellerId};
use crate::metrics::Metrics;
use crate::repository::{OrderFilter, OrderRepository, Page, PartyScope};

use super::detail::{DetailedOrder, OrderAssembler};

// ============================================================================
// Order Queries - Listing, Detail, Unread Counters
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderPage {
    /// Matching orders before pagination.
    pub count: u64,
    pub orders: Vec<DetailedOrder>,
}

#[derive(Clone)]
pub struct OrderQueries {
    pub(super) orders: Arc<dyn OrderRepository>,
    pub(super) assembler: OrderAssembler,
    pub(super) metrics: Arc<Metrics>,
}

impl OrderQueries {
    pub fn new(orders: Arc<dyn OrderRepository>, assembler: OrderAssembler, metrics: Arc<Metrics>) -> Self {
        Self {
            orders,
            assembler,
            metrics,
        }
    }

    /// Orders of `party`, newest id first, optionally narrowed to one status.
    pub async fn list(
        &self,
        party: PartyScope,
        status: Option<DerivedStatus>,
        page: Page,
    ) -> Result<OrderPage, OrderError> {
        self.metrics.record_query("list");

        let mut filter = OrderFilter::for_party(party);
        if let Some(status) = status {
            filter = filter.with_status(status);
        }

        let (count, orders) = self.orders.list(&filter, page).await?;
        let orders = self.assembler.assemble(orders).await?;

        tracing::debug!(
            party = ?party,
            status = status.map(|s| s.as_str()).unwrap_or("any"),
            count,
            returned = orders.len(),
            "Listed orders"
        );

        Ok(OrderPage { count, orders })
    }

    /// One order as seen by `actor`. Orders of other parties are reported as
    /// missing. A seller opening the order marks it read.
    pub async fn detail(&self, actor: Actor, order_id: OrderId) -> Result<DetailedOrder, OrderError> {
        self.metrics.record_query("detail");

        let mut order = self
            .orders
            .find(order_id)
            .await?
            .filter(|order| order.belongs_to(&actor))
            .ok_or(OrderError::OrderNotFound(order_id))?;

        if matches!(actor, Actor::Seller(_)) && !order.read {
            if !self.orders.mark_read(order_id).await? {
                return Err(OrderError::OrderNotFound(order_id));
            }
            order.read = true;
            tracing::debug!(order_id = %order_id, "Marked order read");
        }

        self.assembler.with_contents(order).await
    }

    pub async fn count_unread(&self, seller: SellerId) -> Result<u64, OrderError> {
        self.metrics.record_query("count_unread");

        let filter = OrderFilter::for_party(PartyScope::Seller(seller)).unread();
        Ok(self.orders.count(&filter).await?)
    }
}
