use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;

use crate::domain::order::{HeaderPatch, NewOrderRecord, Order, OrderId, Predicate, SellerId, BuyerId};
use crate::domain::pricing::{BuyerSellerRelation, ItemId, NewPriceSlot, PriceId, PriceSlot};
use crate::ledger::{LineItemBatch, OrderRows, PendingBatch, Revision};

// ============================================================================
// Repositories - One Interface per Aggregate
// ============================================================================
//
// Storage seams shared as `Arc<dyn ...>`:
// - OrderRepository     headers + guarded transitions
// - LineItemRepository  append-only item/additional batches
// - PriceRepository     seller price slots
// - RelationRepository  buyer/seller tiers
//
// Implementations: `MemoryStore` (tests, demo) and `PgStore` (PostgreSQL).
//
// ============================================================================

pub mod filter;
pub mod memory;
pub mod postgres;

pub use filter::{OrderFilter, OrderSort, Page, PartyScope, TimeWindow};
pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Result of a guarded header update.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    /// Guard held; carries the updated header.
    Applied(Order),
    /// The timestamps no longer satisfy the guard.
    GuardRejected,
    /// Another batch landed after the caller read the latest revision.
    RevisionConflict,
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    RevisionConflict,
}

/// Outcome of replacing the active price slot of one (seller, item).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SlotReplacement {
    pub deactivated: Vec<PriceId>,
    pub inserted: Option<PriceSlot>,
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Store a new header together with its initial batch.
    async fn insert(&self, record: NewOrderRecord, batch: &LineItemBatch) -> Result<Order>;

    async fn find(&self, id: OrderId) -> Result<Option<Order>>;

    /// Apply `patch` and, when given, append `batch` in one atomic step, but
    /// only if `guard` still holds and the batch's expected revision is
    /// still the latest.
    async fn transition(
        &self,
        id: OrderId,
        guard: &[Predicate],
        patch: &HeaderPatch,
        batch: Option<&PendingBatch>,
    ) -> Result<TransitionOutcome>;

    /// Returns whether the order existed.
    async fn mark_read(&self, id: OrderId) -> Result<bool>;

    /// Total matching count plus the requested page.
    async fn list(&self, filter: &OrderFilter, page: Page) -> Result<(u64, Vec<Order>)>;

    async fn count(&self, filter: &OrderFilter) -> Result<u64>;
}

#[async_trait]
pub trait LineItemRepository: Send + Sync {
    /// Highest revision marker written for the order.
    async fn latest_revision(&self, order_id: OrderId) -> Result<Option<Revision>>;

    /// All rows of the given orders. Orders without rows map to empty rows.
    async fn rows(&self, order_ids: &[OrderId]) -> Result<HashMap<OrderId, OrderRows>>;

    async fn append(&self, order_id: OrderId, pending: &PendingBatch) -> Result<AppendOutcome>;
}

#[async_trait]
pub trait PriceRepository: Send + Sync {
    async fn find_many(&self, ids: &[PriceId]) -> Result<Vec<PriceSlot>>;

    /// Deactivate every active slot of (seller, item) and insert `slot` as
    /// the new active one, atomically.
    async fn replace_active(
        &self,
        seller: SellerId,
        item: ItemId,
        slot: Option<NewPriceSlot>,
    ) -> Result<SlotReplacement>;
}

#[async_trait]
pub trait RelationRepository: Send + Sync {
    async fn find(&self, buyer: BuyerId, seller: SellerId) -> Result<Option<BuyerSellerRelation>>;

    /// Insert or overwrite the (buyer, seller) relation.
    async fn save(&self, relation: &BuyerSellerRelation) -> Result<()>;
}
