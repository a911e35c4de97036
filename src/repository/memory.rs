use anyhow::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use crate::domain::order::{BuyerId, HeaderPatch, NewOrderRecord, Order, OrderId, Predicate, SellerId};
use crate::domain::pricing::{BuyerSellerRelation, ItemId, NewPriceSlot, PriceId, PriceSlot};
use crate::ledger::{LineItemBatch, OrderAdditional, OrderItem, OrderRows, PendingBatch, Revision};

use super::filter::{OrderFilter, OrderSort, Page};
use super::{
    AppendOutcome, LineItemRepository, OrderRepository, PriceRepository, RelationRepository,
    SlotReplacement, TransitionOutcome,
};

// ============================================================================
// In-Memory Store
// ============================================================================
//
// Implements every repository over one lock, so a transition's guard check,
// header patch and batch append are a single critical section.
//
// ============================================================================

#[derive(Default)]
struct State {
    last_order_id: i64,
    orders: BTreeMap<OrderId, Order>,
    items: HashMap<OrderId, Vec<OrderItem>>,
    additionals: HashMap<OrderId, Vec<OrderAdditional>>,
    revisions: HashMap<OrderId, Revision>,

    last_price_id: i64,
    prices: BTreeMap<PriceId, PriceSlot>,
    relations: HashMap<(BuyerId, SellerId), BuyerSellerRelation>,
}

impl State {
    fn latest_revision(&self, order_id: OrderId) -> Option<Revision> {
        self.revisions.get(&order_id).copied()
    }

    fn append(&mut self, order_id: OrderId, batch: &LineItemBatch) {
        self.items
            .entry(order_id)
            .or_default()
            .extend(batch.items.iter().cloned());
        self.additionals
            .entry(order_id)
            .or_default()
            .extend(batch.additionals.iter().cloned());

        let marker = self.revisions.entry(order_id).or_insert(batch.revision);
        if batch.revision > *marker {
            *marker = batch.revision;
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn insert(&self, record: NewOrderRecord, batch: &LineItemBatch) -> Result<Order> {
        let mut state = self.state.write().await;

        state.last_order_id += 1;
        let order = record.into_order(OrderId(state.last_order_id));
        state.orders.insert(order.id, order.clone());
        state.append(order.id, batch);

        Ok(order)
    }

    async fn find(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn transition(
        &self,
        id: OrderId,
        guard: &[Predicate],
        patch: &HeaderPatch,
        batch: Option<&PendingBatch>,
    ) -> Result<TransitionOutcome> {
        let mut state = self.state.write().await;

        let Some(current) = state.orders.get(&id) else {
            return Ok(TransitionOutcome::NotFound);
        };

        if !current.satisfies(guard) {
            return Ok(TransitionOutcome::GuardRejected);
        }

        if let Some(pending) = batch {
            if state.latest_revision(id) != pending.expected {
                return Ok(TransitionOutcome::RevisionConflict);
            }
        }

        let mut updated = current.clone();
        patch.apply(&mut updated);
        state.orders.insert(id, updated.clone());

        if let Some(pending) = batch {
            state.append(id, &pending.batch);
        }

        Ok(TransitionOutcome::Applied(updated))
    }

    async fn mark_read(&self, id: OrderId) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.orders.get_mut(&id) {
            Some(order) => {
                order.read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list(&self, filter: &OrderFilter, page: Page) -> Result<(u64, Vec<Order>)> {
        let state = self.state.read().await;

        let mut matching: Vec<&Order> = state
            .orders
            .values()
            .filter(|order| filter.matches(order))
            .collect();

        match filter.sort {
            OrderSort::IdDesc => matching.sort_by(|a, b| b.id.cmp(&a.id)),
            OrderSort::CreatedDesc => {
                matching.sort_by(|a, b| b.created.cmp(&a.created).then(b.id.cmp(&a.id)))
            }
        }

        let total = matching.len() as u64;
        let (offset, limit) = page.slice_bounds();
        let orders = matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();

        Ok((total, orders))
    }

    async fn count(&self, filter: &OrderFilter) -> Result<u64> {
        let state = self.state.read().await;
        Ok(state.orders.values().filter(|order| filter.matches(order)).count() as u64)
    }
}

#[async_trait]
impl LineItemRepository for MemoryStore {
    async fn latest_revision(&self, order_id: OrderId) -> Result<Option<Revision>> {
        Ok(self.state.read().await.latest_revision(order_id))
    }

    async fn rows(&self, order_ids: &[OrderId]) -> Result<HashMap<OrderId, OrderRows>> {
        let state = self.state.read().await;

        Ok(order_ids
            .iter()
            .map(|id| {
                let rows = OrderRows {
                    items: state.items.get(id).cloned().unwrap_or_default(),
                    additionals: state.additionals.get(id).cloned().unwrap_or_default(),
                };
                (*id, rows)
            })
            .collect())
    }

    async fn append(&self, order_id: OrderId, pending: &PendingBatch) -> Result<AppendOutcome> {
        let mut state = self.state.write().await;

        if state.latest_revision(order_id) != pending.expected {
            return Ok(AppendOutcome::RevisionConflict);
        }

        state.append(order_id, &pending.batch);
        Ok(AppendOutcome::Appended)
    }
}

#[async_trait]
impl PriceRepository for MemoryStore {
    async fn find_many(&self, ids: &[PriceId]) -> Result<Vec<PriceSlot>> {
        let state = self.state.read().await;
        Ok(ids.iter().filter_map(|id| state.prices.get(id).cloned()).collect())
    }

    async fn replace_active(
        &self,
        seller: SellerId,
        item: ItemId,
        slot: Option<NewPriceSlot>,
    ) -> Result<SlotReplacement> {
        let mut state = self.state.write().await;
        let mut replacement = SlotReplacement::default();

        for existing in state.prices.values_mut() {
            if existing.active && existing.seller_id == seller && existing.item_id == item {
                existing.active = false;
                replacement.deactivated.push(existing.id);
            }
        }

        if let Some(new_slot) = slot {
            state.last_price_id += 1;
            let stored = PriceSlot {
                id: PriceId(state.last_price_id),
                seller_id: new_slot.seller_id,
                item_id: new_slot.item_id,
                unit: new_slot.unit,
                ratio: new_slot.ratio,
                prices: new_slot.prices,
                active: true,
            };
            state.prices.insert(stored.id, stored.clone());
            replacement.inserted = Some(stored);
        }

        Ok(replacement)
    }
}

#[async_trait]
impl RelationRepository for MemoryStore {
    async fn find(&self, buyer: BuyerId, seller: SellerId) -> Result<Option<BuyerSellerRelation>> {
        Ok(self.state.read().await.relations.get(&(buyer, seller)).cloned())
    }

    async fn save(&self, relation: &BuyerSellerRelation) -> Result<()> {
        self.state
            .write()
            .await
            .relations
            .insert((relation.buyer_id, relation.seller_id), relation.clone());
        Ok(())
    }
}
