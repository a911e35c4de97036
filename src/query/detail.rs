use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::directory::{CatalogDirectory, CatalogItem, PartyDirectory, PartyProfile};
use crate::domain::order::{BuyerId, DerivedStatus, Order, OrderError, OrderId, SellerId};
use crate::domain::pricing::{ItemId, Money};
use crate::ledger::{OrderContents, VersionHistory};
use crate::repository::LineItemRepository;

// ============================================================================
// Detailed Order - Header + Contents + Parties
// ============================================================================

/// Response shape for one order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailedOrder {
    pub details: Order,
    pub status: DerivedStatus,
    pub buyer: Option<PartyProfile>,
    pub seller: Option<PartyProfile>,
    /// Rows of the highest revision.
    pub current: OrderContents,
    /// Sum of quantity x price over the current items.
    pub items_total: Money,
    /// Every revision, keyed by revision.
    pub version: VersionHistory,
    /// Catalog metadata for the items referenced by any revision.
    pub catalog: Vec<CatalogItem>,
}

/// Builds `DetailedOrder`s with one row fetch and one catalog fetch per call.
#[derive(Clone)]
pub struct OrderAssembler {
    rows: Arc<dyn LineItemRepository>,
    parties: Arc<dyn PartyDirectory>,
    catalog: Arc<dyn CatalogDirectory>,
    cdn_prefix: String,
}

impl OrderAssembler {
    pub fn new(
        rows: Arc<dyn LineItemRepository>,
        parties: Arc<dyn PartyDirectory>,
        catalog: Arc<dyn CatalogDirectory>,
        cdn_prefix: impl Into<String>,
    ) -> Self {
        Self {
            rows,
            parties,
            catalog,
            cdn_prefix: cdn_prefix.into(),
        }
    }

    pub async fn with_contents(&self, order: Order) -> Result<DetailedOrder, OrderError> {
        let id = order.id;
        self.assemble(vec![order])
            .await?
            .pop()
            .ok_or(OrderError::OrderNotFound(id))
    }

    /// Attach contents, parties and catalog data, keeping the input order.
    pub async fn assemble(&self, orders: Vec<Order>) -> Result<Vec<DetailedOrder>, OrderError> {
        if orders.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<_> = orders.iter().map(|order| order.id).collect();
        let mut rows = self.rows.rows(&ids).await?;

        let item_ids: Vec<ItemId> = rows
            .values()
            .flat_map(|rows| rows.items.iter().map(|item| item.item_id))
            .collect();
        let catalog = self.catalog_items(&item_ids).await?;

        let mut buyers: HashMap<BuyerId, Option<PartyProfile>> = HashMap::new();
        let mut sellers: HashMap<SellerId, Option<PartyProfile>> = HashMap::new();

        let mut detailed = Vec::with_capacity(orders.len());
        for order in orders {
            if !buyers.contains_key(&order.buyer_id) {
                let profile = self.parties.buyer(order.buyer_id).await?;
                buyers.insert(order.buyer_id, profile);
            }
            if !sellers.contains_key(&order.seller_id) {
                let profile = self.parties.seller(order.seller_id).await?;
                sellers.insert(order.seller_id, profile);
            }

            let order_rows = rows.remove(&order.id).unwrap_or_default();
            let current = order_rows.current_contents();
            let version = order_rows.version_history();

            let referenced: BTreeSet<ItemId> = order_rows.items.iter().map(|item| item.item_id).collect();
            let order_catalog = referenced
                .iter()
                .filter_map(|id| catalog.get(id).cloned())
                .collect();

            detailed.push(DetailedOrder {
                status: order.status(),
                buyer: buyers.get(&order.buyer_id).cloned().flatten(),
                seller: sellers.get(&order.seller_id).cloned().flatten(),
                items_total: current.items_total(),
                current,
                version,
                catalog: order_catalog,
                details: order,
            });
        }

        Ok(detailed)
    }

    /// Current contents of each order; orders without rows get empty contents.
    pub async fn current_contents(
        &self,
        order_ids: &[OrderId],
    ) -> Result<HashMap<OrderId, OrderContents>, OrderError> {
        let rows = self.rows.rows(order_ids).await?;
        Ok(order_ids
            .iter()
            .map(|id| {
                let contents = rows.get(id).map(|rows| rows.current_contents()).unwrap_or_default();
                (*id, contents)
            })
            .collect())
    }

    /// Catalog entries for `item_ids` with CDN image variants. Unknown ids
    /// are absent from the map.
    pub async fn catalog_items(&self, item_ids: &[ItemId]) -> Result<HashMap<ItemId, CatalogItem>, OrderError> {
        let unique: BTreeSet<ItemId> = item_ids.iter().copied().collect();
        if unique.is_empty() {
            return Ok(HashMap::new());
        }

        let unique: Vec<ItemId> = unique.into_iter().collect();
        Ok(self
            .catalog
            .items(&unique)
            .await?
            .into_iter()
            .map(|entry| (entry.item_id, entry.with_variants(&self.cdn_prefix)))
            .collect())
    }
}
