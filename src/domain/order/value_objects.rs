use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Order Value Objects
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuyerId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SellerId(pub i64);

/// Party id meaning "every party" in dashboard scopes. Orders carrying it as
/// buyer or seller are excluded from roll-ups.
pub const ALL_PARTIES: i64 = -1;

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for BuyerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for SellerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who is acting on an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", content = "id", rename_all = "lowercase")]
pub enum Actor {
    Buyer(BuyerId),
    Seller(SellerId),
}

impl Actor {
    pub fn role(&self) -> &'static str {
        match self {
            Actor::Buyer(_) => "buyer",
            Actor::Seller(_) => "seller",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CancelledBy {
    Buyer,
    Seller,
}

impl CancelledBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancelledBy::Buyer => "buyer",
            CancelledBy::Seller => "seller",
        }
    }
}

impl std::str::FromStr for CancelledBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buyer" => Ok(CancelledBy::Buyer),
            "seller" => Ok(CancelledBy::Seller),
            other => Err(format!("unknown cancelling party: {}", other)),
        }
    }
}

// ============================================================================
// Status Timestamps & Predicates
// ============================================================================

/// The nullable instants that encode an order's progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampField {
    Created,
    Accepted,
    Assigned,
    PickedUp,
    Delivered,
    Cancelled,
}

impl TimestampField {
    /// Column name in the orders table.
    pub fn column(&self) -> &'static str {
        match self {
            TimestampField::Created => "created",
            TimestampField::Accepted => "accepted",
            TimestampField::Assigned => "assigned",
            TimestampField::PickedUp => "pickedup",
            TimestampField::Delivered => "delivered",
            TimestampField::Cancelled => "cancelled",
        }
    }
}

/// Null / not-null test on one timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Predicate {
    pub field: TimestampField,
    pub is_set: bool,
}

impl Predicate {
    pub const fn set(field: TimestampField) -> Self {
        Self { field, is_set: true }
    }

    pub const fn unset(field: TimestampField) -> Self {
        Self { field, is_set: false }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.is_set { "set" } else { "unset" };
        write!(f, "{} {}", self.field.column(), state)
    }
}

use self::TimestampField::{Accepted, Assigned, Cancelled, Delivered, PickedUp};

const CREATED_PREDICATES: &[Predicate] = &[Predicate::unset(Accepted), Predicate::unset(Cancelled)];
const ACCEPTED_PREDICATES: &[Predicate] = &[
    Predicate::set(Accepted),
    Predicate::unset(Assigned),
    Predicate::unset(PickedUp),
    Predicate::unset(Delivered),
    Predicate::unset(Cancelled),
];
const ASSIGNED_PREDICATES: &[Predicate] = &[
    Predicate::set(Assigned),
    Predicate::unset(PickedUp),
    Predicate::unset(Delivered),
    Predicate::unset(Cancelled),
];
const PICKEDUP_PREDICATES: &[Predicate] = &[
    Predicate::set(PickedUp),
    Predicate::unset(Delivered),
    Predicate::unset(Cancelled),
];
const DELIVERED_PREDICATES: &[Predicate] = &[Predicate::set(Delivered), Predicate::unset(Cancelled)];
const CANCELLED_PREDICATES: &[Predicate] = &[Predicate::set(Cancelled)];

/// Status computed from the timestamps. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DerivedStatus {
    Created,
    Accepted,
    Assigned,
    PickedUp,
    Delivered,
    Cancelled,
}

impl DerivedStatus {
    pub const ALL: [DerivedStatus; 6] = [
        DerivedStatus::Created,
        DerivedStatus::Accepted,
        DerivedStatus::Assigned,
        DerivedStatus::PickedUp,
        DerivedStatus::Delivered,
        DerivedStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DerivedStatus::Created => "created",
            DerivedStatus::Accepted => "accepted",
            DerivedStatus::Assigned => "assigned",
            DerivedStatus::PickedUp => "pickedup",
            DerivedStatus::Delivered => "delivered",
            DerivedStatus::Cancelled => "cancelled",
        }
    }

    /// Conjunction selecting exactly the orders that derive to this status.
    pub fn predicates(&self) -> &'static [Predicate] {
        match self {
            DerivedStatus::Created => CREATED_PREDICATES,
            DerivedStatus::Accepted => ACCEPTED_PREDICATES,
            DerivedStatus::Assigned => ASSIGNED_PREDICATES,
            DerivedStatus::PickedUp => PICKEDUP_PREDICATES,
            DerivedStatus::Delivered => DELIVERED_PREDICATES,
            DerivedStatus::Cancelled => CANCELLED_PREDICATES,
        }
    }
}

impl fmt::Display for DerivedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DerivedStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DerivedStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown order status: {}", s))
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
