use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::order::{
    Actor, BuyerId, DerivedStatus, Order, Predicate, SellerId, ALL_PARTIES,
};

// ============================================================================
// Order Filters
// ============================================================================

/// Whose orders a query sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartyScope {
    All,
    Buyer(BuyerId),
    Seller(SellerId),
}

impl PartyScope {
    /// Dashboard scope for a seller id, where `-1` means every seller.
    pub fn seller_or_all(seller: i64) -> Self {
        if seller == ALL_PARTIES {
            PartyScope::All
        } else {
            PartyScope::Seller(SellerId(seller))
        }
    }

    /// Dashboard scope for a buyer id, where `-1` means every buyer.
    pub fn buyer_or_all(buyer: i64) -> Self {
        if buyer == ALL_PARTIES {
            PartyScope::All
        } else {
            PartyScope::Buyer(BuyerId(buyer))
        }
    }

    pub fn includes(&self, order: &Order) -> bool {
        match self {
            PartyScope::All => true,
            PartyScope::Buyer(buyer) => order.buyer_id == *buyer,
            PartyScope::Seller(seller) => order.seller_id == *seller,
        }
    }
}

impl From<Actor> for PartyScope {
    fn from(actor: Actor) -> Self {
        match actor {
            Actor::Buyer(buyer) => PartyScope::Buyer(buyer),
            Actor::Seller(seller) => PartyScope::Seller(seller),
        }
    }
}

/// Open interval on `created`; both bounds are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at > self.start && at < self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderSort {
    #[default]
    IdDesc,
    CreatedDesc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Page {
    pub limit: Option<u64>,
    #[serde(default)]
    pub offset: u64,
}

impl Page {
    pub fn new(limit: u64, offset: u64) -> Self {
        Self {
            limit: Some(limit),
            offset,
        }
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    /// LIMIT and OFFSET as SQL bigints, clamped to `i64::MAX`.
    pub fn sql_bounds(&self) -> (Option<i64>, i64) {
        let clamp = |n: u64| i64::try_from(n).unwrap_or(i64::MAX);
        (self.limit.map(clamp), clamp(self.offset))
    }

    /// Offset and limit as in-memory counts, clamped to `usize::MAX`.
    pub fn slice_bounds(&self) -> (usize, usize) {
        let clamp = |n: u64| usize::try_from(n).unwrap_or(usize::MAX);
        (clamp(self.offset), self.limit.map(clamp).unwrap_or(usize::MAX))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderFilter {
    pub party: PartyScope,
    pub predicates: Vec<Predicate>,
    pub window: Option<TimeWindow>,
    /// Skip orders whose buyer or seller is the `-1` sentinel.
    pub exclude_sentinel: bool,
    pub unread_only: bool,
    pub sort: OrderSort,
}

impl OrderFilter {
    pub fn for_party(party: PartyScope) -> Self {
        Self {
            party,
            predicates: Vec::new(),
            window: None,
            exclude_sentinel: false,
            unread_only: false,
            sort: OrderSort::IdDesc,
        }
    }

    pub fn with_status(self, status: DerivedStatus) -> Self {
        self.with_predicates(status.predicates())
    }

    pub fn with_predicates(mut self, predicates: &[Predicate]) -> Self {
        self.predicates.extend_from_slice(predicates);
        self
    }

    pub fn within(mut self, window: TimeWindow) -> Self {
        self.window = Some(window);
        self
    }

    pub fn excluding_sentinel(mut self) -> Self {
        self.exclude_sentinel = true;
        self
    }

    pub fn unread(mut self) -> Self {
        self.unread_only = true;
        self
    }

    pub fn sorted(mut self, sort: OrderSort) -> Self {
        self.sort = sort;
        self
    }

    /// In-process evaluation; SQL stores translate the same fields to WHERE
    /// clauses.
    pub fn matches(&self, order: &Order) -> bool {
        if !self.party.includes(order) || !order.satisfies(&self.predicates) {
            return false;
        }
        if let Some(window) = &self.window {
            if !window.contains(order.created) {
                return false;
            }
        }
        if self.exclude_sentinel
            && (order.buyer_id.0 == ALL_PARTIES || order.seller_id.0 == ALL_PARTIES)
        {
            return false;
        }
        !(self.unread_only && order.read)
    }
}
