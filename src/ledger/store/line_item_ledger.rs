use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::order::{BuyerId, Order, OrderError, OrderId, RawAdditional, RequestedLine, SellerId};
use crate::domain::pricing::{pick_price, Money, PriceId, PriceSlot, Tier, TierResolver};
use crate::repository::{AppendOutcome, LineItemRepository, PriceRepository};

use crate::ledger::{
    LineItemBatch, OrderAdditional, OrderContents, OrderItem, PendingBatch, Revision, VersionHistory,
};

// ============================================================================
// Line-Item Ledger - Staging & Appending Revision Batches
// ============================================================================
//
// Responsibilities:
// 1. Resolve requested lines against the seller's active price slots
// 2. Validate and drop malformed additionals
// 3. Allocate the next revision and stage the batch against it
// 4. Read current contents and version history
//
// Nothing is written while staging, so an unresolvable price fails the
// request before any row exists.
//
// ============================================================================

/// A staged batch plus what was left out of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedBatch {
    pub pending: PendingBatch,
    pub dropped_lines: usize,
    pub dropped_additionals: usize,
}

#[derive(Clone)]
pub struct LineItemLedger {
    prices: Arc<dyn PriceRepository>,
    rows: Arc<dyn LineItemRepository>,
    tiers: TierResolver,
}

impl LineItemLedger {
    pub fn new(
        prices: Arc<dyn PriceRepository>,
        rows: Arc<dyn LineItemRepository>,
        tiers: TierResolver,
    ) -> Self {
        Self { prices, rows, tiers }
    }

    /// Build order items for `lines` at `tier`.
    ///
    /// Lines with quantity <= 0 are dropped. Each surviving price id must name
    /// an active slot of `seller`. Line totals and their sum must fit in
    /// [`Money`], otherwise the request is `InvalidInput`.
    pub async fn stage_items(
        &self,
        seller: SellerId,
        tier: Tier,
        lines: &[RequestedLine],
        revision: Revision,
    ) -> Result<(Vec<OrderItem>, usize), OrderError> {
        let valid: Vec<&RequestedLine> = lines.iter().filter(|line| line.quantity > 0).collect();
        let dropped = lines.len() - valid.len();

        let mut ids: Vec<PriceId> = valid.iter().map(|line| line.price_id).collect();
        ids.sort_unstable();
        ids.dedup();

        let slots: HashMap<PriceId, PriceSlot> = self
            .prices
            .find_many(&ids)
            .await?
            .into_iter()
            .filter(|slot| slot.active && slot.seller_id == seller)
            .map(|slot| (slot.id, slot))
            .collect();

        let mut items = Vec::with_capacity(valid.len());
        let mut total: Money = 0;
        for line in valid {
            let slot = slots
                .get(&line.price_id)
                .ok_or(OrderError::PriceNotFound(line.price_id))?;

            let item = OrderItem {
                item_id: slot.item_id,
                unit: slot.unit.clone(),
                quantity: line.quantity,
                price: pick_price(&slot.prices, tier),
                price_id: slot.id,
                revision,
            };
            total = item
                .checked_total()
                .and_then(|line_total| total.checked_add(line_total))
                .ok_or_else(|| {
                    OrderError::InvalidInput(format!(
                        "quantity {} of price {} overflows the order total",
                        line.quantity, line.price_id
                    ))
                })?;
            items.push(item);
        }

        Ok((items, dropped))
    }

    /// Keep the well-formed additionals. Returns the kept rows and how many
    /// were dropped.
    pub fn stage_additionals(
        raw: &[RawAdditional],
        revision: Revision,
    ) -> (Vec<OrderAdditional>, usize) {
        let kept: Vec<OrderAdditional> = raw
            .iter()
            .filter_map(|entry| OrderAdditional::from_raw(entry, revision))
            .collect();
        let dropped = raw.len() - kept.len();
        (kept, dropped)
    }

    /// Stage one batch holding both items and additionals, priced at the
    /// tier the buyer holds right now. `additionals: None` stages none.
    pub async fn prepare(
        &self,
        order: &Order,
        lines: &[RequestedLine],
        additionals: Option<&[RawAdditional]>,
        now: DateTime<Utc>,
    ) -> Result<PreparedBatch, OrderError> {
        let expected = self.rows.latest_revision(order.id).await?;
        let revision = Revision::next(expected, now);
        let tier = self.tiers.resolve(order.buyer_id, order.seller_id).await?;

        let (batch, dropped_lines, dropped_additionals) = self
            .stage(order.seller_id, tier, lines, additionals.unwrap_or_default(), revision)
            .await?;

        Ok(PreparedBatch {
            pending: PendingBatch { expected, batch },
            dropped_lines,
            dropped_additionals,
        })
    }

    /// Stage the creation batch of an order that is not stored yet.
    pub async fn prepare_initial(
        &self,
        buyer: BuyerId,
        seller: SellerId,
        created: DateTime<Utc>,
        lines: &[RequestedLine],
        additionals: Option<&[RawAdditional]>,
    ) -> Result<PreparedBatch, OrderError> {
        let revision = Revision::at(created);
        let tier = self.tiers.resolve(buyer, seller).await?;

        let (batch, dropped_lines, dropped_additionals) = self
            .stage(seller, tier, lines, additionals.unwrap_or_default(), revision)
            .await?;

        Ok(PreparedBatch {
            pending: PendingBatch {
                expected: None,
                batch,
            },
            dropped_lines,
            dropped_additionals,
        })
    }

    async fn stage(
        &self,
        seller: SellerId,
        tier: Tier,
        lines: &[RequestedLine],
        additionals: &[RawAdditional],
        revision: Revision,
    ) -> Result<(LineItemBatch, usize, usize), OrderError> {
        let (items, dropped_lines) = self.stage_items(seller, tier, lines, revision).await?;
        let (additionals, dropped_additionals) = Self::stage_additionals(additionals, revision);

        Ok((
            LineItemBatch {
                revision,
                items,
                additionals,
            },
            dropped_lines,
            dropped_additionals,
        ))
    }

    /// Append an items-only batch.
    pub async fn append_items(
        &self,
        order: &Order,
        tier: Tier,
        lines: &[RequestedLine],
        now: DateTime<Utc>,
    ) -> Result<LineItemBatch, OrderError> {
        let expected = self.rows.latest_revision(order.id).await?;
        let revision = Revision::next(expected, now);
        let (items, _) = self.stage_items(order.seller_id, tier, lines, revision).await?;

        self.commit(
            order.id,
            PendingBatch {
                expected,
                batch: LineItemBatch {
                    revision,
                    items,
                    additionals: Vec::new(),
                },
            },
        )
        .await
    }

    /// Append an additionals-only batch. Malformed entries are dropped; an
    /// empty result is still a batch.
    pub async fn append_additionals(
        &self,
        order_id: OrderId,
        raw: &[RawAdditional],
        now: DateTime<Utc>,
    ) -> Result<LineItemBatch, OrderError> {
        let expected = self.rows.latest_revision(order_id).await?;
        let revision = Revision::next(expected, now);
        let (additionals, _) = Self::stage_additionals(raw, revision);

        self.commit(
            order_id,
            PendingBatch {
                expected,
                batch: LineItemBatch {
                    revision,
                    items: Vec::new(),
                    additionals,
                },
            },
        )
        .await
    }

    async fn commit(&self, order_id: OrderId, pending: PendingBatch) -> Result<LineItemBatch, OrderError> {
        match self.rows.append(order_id, &pending).await? {
            AppendOutcome::Appended => {
                tracing::debug!(
                    order_id = %order_id,
                    revision = %pending.batch.revision,
                    rows = pending.batch.row_count(),
                    "Appended line-item batch"
                );
                Ok(pending.batch)
            }
            AppendOutcome::RevisionConflict => Err(OrderError::Conflict(order_id)),
        }
    }

    pub async fn current_contents(&self, order_id: OrderId) -> Result<OrderContents, OrderError> {
        let mut rows = self.rows.rows(&[order_id]).await?;
        Ok(rows
            .remove(&order_id)
            .map(|rows| rows.current_contents())
            .unwrap_or_default())
    }

    pub async fn version_history(&self, order_id: OrderId) -> Result<VersionHistory, OrderError> {
        let mut rows = self.rows.rows(&[order_id]).await?;
        Ok(rows
            .remove(&order_id)
            .map(|rows| rows.version_history())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::NewOrderRecord;
    use crate::domain::pricing::{BuyerSellerRelation, ItemId, NewPriceSlot};
    use crate::repository::{MemoryStore, OrderRepository, PriceRepository, RelationRepository};
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    struct Fixture {
        store: Arc<MemoryStore>,
        ledger: LineItemLedger,
        order: Order,
        price_a: PriceId,
        price_b: PriceId,
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 1, 10, 0, 0).unwrap()
    }

    async fn slot(store: &MemoryStore, seller: i64, item: i64, prices: [i64; 4]) -> PriceId {
        store
            .replace_active(
                SellerId(seller),
                ItemId(item),
                Some(NewPriceSlot {
                    seller_id: SellerId(seller),
                    item_id: ItemId(item),
                    unit: "box".to_string(),
                    ratio: 1,
                    prices,
                }),
            )
            .await
            .unwrap()
            .inserted
            .unwrap()
            .id
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let price_a = slot(&store, 2, 100, [1_000, 950, 900, 850]).await;
        let price_b = slot(&store, 2, 200, [500, 0, 0, 0]).await;

        let order = store
            .insert(
                NewOrderRecord {
                    buyer_id: BuyerId(1),
                    seller_id: SellerId(2),
                    address: None,
                    is_cod: true,
                    delivery_fee: 0,
                    notes: None,
                    created: t0(),
                },
                &LineItemBatch::empty(Revision::at(t0())),
            )
            .await
            .unwrap();

        let ledger = LineItemLedger::new(store.clone(), store.clone(), TierResolver::new(store.clone()));
        Fixture {
            store,
            ledger,
            order,
            price_a,
            price_b,
        }
    }

    fn raw(value: serde_json::Value) -> RawAdditional {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_append_items_drops_non_positive_quantities() {
        let f = fixture().await;
        let lines = [
            RequestedLine { price_id: f.price_a, quantity: 2 },
            RequestedLine { price_id: f.price_b, quantity: 0 },
            RequestedLine { price_id: f.price_b, quantity: -3 },
        ];

        let batch = f.ledger.append_items(&f.order, Tier::Normal, &lines, t0()).await.unwrap();
        assert_eq!(batch.items.len(), 1);
        assert_eq!(batch.items[0].item_id, ItemId(100));
        assert_eq!(batch.items[0].price, 1_000);
    }

    #[tokio::test]
    async fn test_items_priced_at_tier_with_base_fallback() {
        let f = fixture().await;
        let lines = [
            RequestedLine { price_id: f.price_a, quantity: 1 },
            RequestedLine { price_id: f.price_b, quantity: 1 },
        ];

        let (items, dropped) = f
            .ledger
            .stage_items(f.order.seller_id, Tier::Gold, &lines, Revision(1))
            .await
            .unwrap();
        assert_eq!(dropped, 0);
        assert_eq!(items[0].price, 850);
        assert_eq!(items[1].price, 500);
    }

    #[tokio::test]
    async fn test_unknown_or_foreign_price_fails_without_writing() {
        let f = fixture().await;
        let foreign = slot(&f.store, 3, 100, [10, 10, 10, 10]).await;
        let before = f.store.latest_revision(f.order.id).await.unwrap();

        for price_id in [PriceId(999), foreign] {
            let err = f
                .ledger
                .append_items(&f.order, Tier::Normal, &[RequestedLine { price_id, quantity: 1 }], t0())
                .await
                .unwrap_err();
            assert!(matches!(err, OrderError::PriceNotFound(id) if id == price_id));
        }

        assert_eq!(f.store.latest_revision(f.order.id).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_inactive_slot_does_not_resolve() {
        let f = fixture().await;
        let replacement = slot(&f.store, 2, 100, [1_100, 1_100, 1_100, 1_100]).await;
        assert_ne!(replacement, f.price_a);

        let err = f
            .ledger
            .append_items(&f.order, Tier::Normal, &[RequestedLine { price_id: f.price_a, quantity: 1 }], t0())
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::PriceNotFound(_)));
    }

    #[tokio::test]
    async fn test_append_additionals_keeps_only_valid_entries() {
        let f = fixture().await;
        let batch = f
            .ledger
            .append_additionals(
                f.order.id,
                &[
                    raw(json!({"name": "delivery", "unit": "trip", "quantity": 1, "price": 20000})),
                    raw(json!({"name": "", "unit": "trip", "quantity": 1, "price": 20000})),
                ],
                t0(),
            )
            .await
            .unwrap();

        assert_eq!(batch.additionals.len(), 1);
        let current = f.ledger.current_contents(f.order.id).await.unwrap();
        assert_eq!(current.additionals.len(), 1);
        assert_eq!(current.additionals[0].name, "delivery");
    }

    #[tokio::test]
    async fn test_empty_additionals_is_not_an_error() {
        let f = fixture().await;
        let batch = f.ledger.append_additionals(f.order.id, &[], t0()).await.unwrap();
        assert_eq!(batch.row_count(), 0);
    }

    #[tokio::test]
    async fn test_revisions_increase_within_same_instant() {
        let f = fixture().await;
        let line = [RequestedLine { price_id: f.price_a, quantity: 1 }];

        let first = f.ledger.append_items(&f.order, Tier::Normal, &line, t0()).await.unwrap();
        let second = f.ledger.append_items(&f.order, Tier::Normal, &line, t0()).await.unwrap();
        assert!(second.revision > first.revision);

        let history = f.ledger.version_history(f.order.id).await.unwrap();
        assert_eq!(history.len(), 2);
        let current = f.ledger.current_contents(f.order.id).await.unwrap();
        assert_eq!(current.revision, Some(second.revision));
    }

    #[tokio::test]
    async fn test_prepare_resolves_tier_and_stages_one_revision() {
        let f = fixture().await;
        f.store
            .save(&BuyerSellerRelation {
                buyer_id: BuyerId(1),
                seller_id: SellerId(2),
                tier: Tier::Bronze,
                active: true,
                notes: None,
            })
            .await
            .unwrap();

        let additionals = [
            raw(json!({"name": "ice", "unit": "bag", "quantity": 2, "price": 3000})),
            raw(json!({"name": "ice", "unit": "bag", "quantity": "x", "price": 3000})),
        ];
        let prepared = f
            .ledger
            .prepare(
                &f.order,
                &[
                    RequestedLine { price_id: f.price_a, quantity: 3 },
                    RequestedLine { price_id: f.price_b, quantity: 0 },
                ],
                Some(&additionals[..]),
                t0() + Duration::seconds(1),
            )
            .await
            .unwrap();

        assert_eq!(prepared.pending.expected, Some(Revision::at(t0())));
        assert_eq!(prepared.dropped_lines, 1);
        assert_eq!(prepared.dropped_additionals, 1);

        let batch = &prepared.pending.batch;
        assert_eq!(batch.items[0].price, 950);
        assert!(batch.items.iter().all(|item| item.revision == batch.revision));
        assert!(batch.additionals.iter().all(|add| add.revision == batch.revision));
    }

    #[tokio::test]
    async fn test_largest_quantity_that_fits_is_accepted() {
        let f = fixture().await;
        let quantity = Money::MAX / 1_000;
        let line = [RequestedLine { price_id: f.price_a, quantity }];

        let (items, _) = f
            .ledger
            .stage_items(f.order.seller_id, Tier::Normal, &line, Revision(1))
            .await
            .unwrap();
        assert_eq!(items[0].checked_total(), Some(quantity * 1_000));
    }

    #[tokio::test]
    async fn test_quantity_overflowing_line_total_is_invalid_input() {
        let f = fixture().await;
        let before = f.store.latest_revision(f.order.id).await.unwrap();
        let line = [RequestedLine { price_id: f.price_a, quantity: Money::MAX / 1_000 + 1 }];

        let err = f
            .ledger
            .append_items(&f.order, Tier::Normal, &line, t0())
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::InvalidInput(_)));
        assert_eq!(f.store.latest_revision(f.order.id).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_lines_overflowing_batch_total_are_invalid_input() {
        let f = fixture().await;
        let half = Money::MAX / 1_000 / 2 + 1;
        let lines = [
            RequestedLine { price_id: f.price_a, quantity: half },
            RequestedLine { price_id: f.price_a, quantity: half },
        ];

        let err = f
            .ledger
            .stage_items(f.order.seller_id, Tier::Normal, &lines, Revision(1))
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::InvalidInput(_)));
    }
}
