use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::pricing::Money;

use super::commands::OrderCommand;
use super::errors::OrderError;
use super::value_objects::{
    Actor, BuyerId, CancelledBy, DerivedStatus, OrderId, Predicate, SellerId, TimestampField,
};

// ============================================================================
// Order Aggregate - Domain Logic
// ============================================================================
//
// The header is the only mutable part of an order. Progress is encoded as
// nullable instants; the status is derived from them on every read.
//
// Transitions are decided here as pure values (guard + patch) so storage can
// re-check the same guard inside its conditional write.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    // Identity
    pub id: OrderId,
    pub buyer_id: BuyerId,
    pub seller_id: SellerId,

    pub address: Option<String>,
    pub is_cod: bool,
    pub is_paid: bool,
    pub notes: Option<String>,
    pub delivery_fee: Money,
    /// Seller has opened the order detail.
    pub read: bool,

    // Progress
    pub created: DateTime<Utc>,
    pub accepted: Option<DateTime<Utc>>,
    pub assigned: Option<DateTime<Utc>>,
    pub pickedup: Option<DateTime<Utc>>,
    pub delivered: Option<DateTime<Utc>>,
    pub cancelled: Option<DateTime<Utc>>,
    pub cancelled_by: Option<CancelledBy>,
}

/// Header fields of an order that has not been stored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrderRecord {
    pub buyer_id: BuyerId,
    pub seller_id: SellerId,
    pub address: Option<String>,
    pub is_cod: bool,
    pub delivery_fee: Money,
    pub notes: Option<String>,
    pub created: DateTime<Utc>,
}

impl NewOrderRecord {
    pub fn into_order(self, id: OrderId) -> Order {
        Order {
            id,
            buyer_id: self.buyer_id,
            seller_id: self.seller_id,
            address: self.address,
            is_cod: self.is_cod,
            is_paid: false,
            notes: self.notes,
            delivery_fee: self.delivery_fee,
            read: false,
            created: self.created,
            accepted: None,
            assigned: None,
            pickedup: None,
            delivered: None,
            cancelled: None,
            cancelled_by: None,
        }
    }
}

impl Order {
    pub fn timestamp(&self, field: TimestampField) -> Option<DateTime<Utc>> {
        match field {
            TimestampField::Created => Some(self.created),
            TimestampField::Accepted => self.accepted,
            TimestampField::Assigned => self.assigned,
            TimestampField::PickedUp => self.pickedup,
            TimestampField::Delivered => self.delivered,
            TimestampField::Cancelled => self.cancelled,
        }
    }

    /// `created` is immutable and has no slot here.
    fn timestamp_mut(&mut self, field: TimestampField) -> Option<&mut Option<DateTime<Utc>>> {
        match field {
            TimestampField::Created => None,
            TimestampField::Accepted => Some(&mut self.accepted),
            TimestampField::Assigned => Some(&mut self.assigned),
            TimestampField::PickedUp => Some(&mut self.pickedup),
            TimestampField::Delivered => Some(&mut self.delivered),
            TimestampField::Cancelled => Some(&mut self.cancelled),
        }
    }

    pub fn status(&self) -> DerivedStatus {
        if self.cancelled.is_some() {
            DerivedStatus::Cancelled
        } else if self.delivered.is_some() {
            DerivedStatus::Delivered
        } else if self.pickedup.is_some() {
            DerivedStatus::PickedUp
        } else if self.assigned.is_some() {
            DerivedStatus::Assigned
        } else if self.accepted.is_some() {
            DerivedStatus::Accepted
        } else {
            DerivedStatus::Created
        }
    }

    pub fn satisfies(&self, predicates: &[Predicate]) -> bool {
        predicates
            .iter()
            .all(|predicate| self.timestamp(predicate.field).is_some() == predicate.is_set)
    }

    pub fn belongs_to(&self, actor: &Actor) -> bool {
        match actor {
            Actor::Buyer(buyer) => self.buyer_id == *buyer,
            Actor::Seller(seller) => self.seller_id == *seller,
        }
    }

    /// Decide the guarded header change for `command`.
    ///
    /// Fails with `InvalidTransition` when the actor's role may not issue the
    /// command or the current timestamps do not satisfy the guard.
    pub fn decide(
        &self,
        actor: &Actor,
        command: &OrderCommand,
        now: DateTime<Utc>,
    ) -> Result<Transition, OrderError> {
        use TimestampField::*;

        let operation = command.operation();
        let seller_only = || -> Result<(), OrderError> {
            match actor {
                Actor::Seller(_) => Ok(()),
                Actor::Buyer(_) => Err(self.rejected(operation)),
            }
        };

        let transition = match command {
            OrderCommand::Accept { notes, .. } => {
                seller_only()?;
                Transition {
                    guard: vec![Predicate::unset(Accepted), Predicate::unset(Cancelled)],
                    patch: HeaderPatch {
                        stamps: vec![Stamp::set(Accepted, now)],
                        notes: notes.clone(),
                        ..HeaderPatch::default()
                    },
                    rewrites_contents: true,
                }
            }
            OrderCommand::Draft { .. } => {
                seller_only()?;
                Transition {
                    guard: vec![
                        Predicate::unset(Assigned),
                        Predicate::unset(Cancelled),
                        Predicate::unset(Delivered),
                    ],
                    patch: HeaderPatch::default(),
                    rewrites_contents: true,
                }
            }
            OrderCommand::Assign => {
                seller_only()?;
                Transition {
                    guard: vec![
                        Predicate::set(Accepted),
                        Predicate::unset(Cancelled),
                        Predicate::unset(Assigned),
                    ],
                    patch: HeaderPatch {
                        stamps: vec![Stamp::set(Assigned, now)],
                        ..HeaderPatch::default()
                    },
                    rewrites_contents: false,
                }
            }
            OrderCommand::Deliver => {
                let stamps = match actor {
                    Actor::Seller(_) => vec![
                        Stamp::if_unset(Assigned, now),
                        Stamp::set(PickedUp, now),
                        Stamp::set(Delivered, now),
                    ],
                    Actor::Buyer(_) => vec![Stamp::set(Delivered, now)],
                };
                Transition {
                    guard: vec![
                        Predicate::set(Accepted),
                        Predicate::unset(Cancelled),
                        Predicate::unset(Delivered),
                    ],
                    patch: HeaderPatch {
                        stamps,
                        ..HeaderPatch::default()
                    },
                    rewrites_contents: false,
                }
            }
            OrderCommand::Cancel { notes } => {
                let cancelled_by = match actor {
                    Actor::Seller(_) => CancelledBy::Seller,
                    Actor::Buyer(_) => CancelledBy::Buyer,
                };
                Transition {
                    guard: vec![Predicate::unset(Delivered), Predicate::unset(Cancelled)],
                    patch: HeaderPatch {
                        stamps: vec![Stamp::set(Cancelled, now)],
                        cancelled_by: Some(cancelled_by),
                        notes: notes.clone(),
                    },
                    rewrites_contents: false,
                }
            }
        };

        if !self.satisfies(&transition.guard) {
            return Err(self.rejected(operation));
        }

        Ok(transition)
    }

    fn rejected(&self, operation: &'static str) -> OrderError {
        OrderError::InvalidTransition {
            operation,
            status: self.status(),
        }
    }
}

// ============================================================================
// Transitions
// ============================================================================

/// Outcome of a successful decision: the guard that must still hold at write
/// time and the header change to apply.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub guard: Vec<Predicate>,
    pub patch: HeaderPatch,
    /// A new line-item batch accompanies the header change.
    pub rewrites_contents: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StampMode {
    Set,
    /// Keep an existing instant.
    IfUnset,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stamp {
    pub field: TimestampField,
    pub at: DateTime<Utc>,
    pub mode: StampMode,
}

impl Stamp {
    pub fn set(field: TimestampField, at: DateTime<Utc>) -> Self {
        Self {
            field,
            at,
            mode: StampMode::Set,
        }
    }

    pub fn if_unset(field: TimestampField, at: DateTime<Utc>) -> Self {
        Self {
            field,
            at,
            mode: StampMode::IfUnset,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeaderPatch {
    pub stamps: Vec<Stamp>,
    pub cancelled_by: Option<CancelledBy>,
    /// Replaces the notes when present.
    pub notes: Option<String>,
}

impl HeaderPatch {
    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty() && self.cancelled_by.is_none() && self.notes.is_none()
    }

    pub fn apply(&self, order: &mut Order) {
        for stamp in &self.stamps {
            if let Some(slot) = order.timestamp_mut(stamp.field) {
                match stamp.mode {
                    StampMode::Set => *slot = Some(stamp.at),
                    StampMode::IfUnset => {
                        slot.get_or_insert(stamp.at);
                    }
                }
            }
        }

        if let Some(cancelled_by) = self.cancelled_by {
            order.cancelled_by = Some(cancelled_by);
        }

        if let Some(notes) = &self.notes {
            order.notes = Some(notes.clone());
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
    }

    fn fresh_order() -> Order {
        NewOrderRecord {
            buyer_id: BuyerId(10),
            seller_id: SellerId(20),
            address: Some("Jl. Merdeka 1".to_string()),
            is_cod: true,
            delivery_fee: 0,
            notes: None,
            created: t0(),
        }
        .into_order(OrderId(1))
    }

    fn seller() -> Actor {
        Actor::Seller(SellerId(20))
    }

    fn buyer() -> Actor {
        Actor::Buyer(BuyerId(10))
    }

    fn accept_command() -> OrderCommand {
        OrderCommand::Accept {
            lines: vec![],
            additionals: None,
            notes: Some("ok".to_string()),
        }
    }

    fn run(order: &mut Order, actor: Actor, command: OrderCommand, at: DateTime<Utc>) -> Result<(), OrderError> {
        let transition = order.decide(&actor, &command, at)?;
        transition.patch.apply(order);
        Ok(())
    }

    /// Orders covering every reachable combination of timestamps.
    fn sample_orders() -> Vec<Order> {
        let mut samples = Vec::new();
        let base = fresh_order();
        samples.push(base.clone());

        let mut accepted = base.clone();
        accepted.accepted = Some(t0());
        samples.push(accepted.clone());

        let mut assigned = accepted.clone();
        assigned.assigned = Some(t0());
        samples.push(assigned.clone());

        let mut picked = assigned.clone();
        picked.pickedup = Some(t0());
        samples.push(picked.clone());

        let mut delivered = picked.clone();
        delivered.delivered = Some(t0());
        samples.push(delivered);

        let mut buyer_delivered = accepted.clone();
        buyer_delivered.delivered = Some(t0());
        samples.push(buyer_delivered);

        for source in [base, accepted, assigned, picked] {
            let mut cancelled = source.clone();
            cancelled.cancelled = Some(t0());
            samples.push(cancelled);
        }

        samples
    }

    #[test]
    fn test_fresh_order_is_created() {
        let order = fresh_order();
        assert_eq!(order.status(), DerivedStatus::Created);
        assert!(!order.is_paid);
        assert!(!order.read);
    }

    #[test]
    fn test_status_predicates_are_mutually_exclusive() {
        for order in sample_orders() {
            let matching: Vec<_> = DerivedStatus::ALL
                .iter()
                .filter(|status| order.satisfies(status.predicates()))
                .collect();
            assert_eq!(matching, vec![&order.status()], "order {:?}", order);
        }
    }

    #[test]
    fn test_cancelled_overrides_everything() {
        let mut order = fresh_order();
        order.accepted = Some(t0());
        order.assigned = Some(t0());
        order.cancelled = Some(t0());
        assert_eq!(order.status(), DerivedStatus::Cancelled);
    }

    #[test]
    fn test_accept_stamps_and_sets_notes() {
        let mut order = fresh_order();
        let at = t0() + Duration::minutes(5);
        run(&mut order, seller(), accept_command(), at).unwrap();

        assert_eq!(order.accepted, Some(at));
        assert_eq!(order.notes.as_deref(), Some("ok"));
        assert_eq!(order.status(), DerivedStatus::Accepted);
    }

    #[test]
    fn test_accept_twice_is_rejected() {
        let mut order = fresh_order();
        run(&mut order, seller(), accept_command(), t0()).unwrap();

        let err = order.decide(&seller(), &accept_command(), t0()).unwrap_err();
        assert!(matches!(
            err,
            OrderError::InvalidTransition {
                operation: "accept",
                status: DerivedStatus::Accepted
            }
        ));
    }

    #[test]
    fn test_buyer_cannot_issue_seller_commands() {
        let order = fresh_order();
        for command in [
            accept_command(),
            OrderCommand::Draft {
                lines: vec![],
                additionals: None,
            },
            OrderCommand::Assign,
        ] {
            let err = order.decide(&buyer(), &command, t0()).unwrap_err();
            assert!(matches!(err, OrderError::InvalidTransition { .. }));
        }
    }

    #[test]
    fn test_accept_on_cancelled_order_fails() {
        let mut order = fresh_order();
        run(&mut order, buyer(), OrderCommand::Cancel { notes: None }, t0()).unwrap();

        let err = order.decide(&seller(), &accept_command(), t0()).unwrap_err();
        assert!(matches!(
            err,
            OrderError::InvalidTransition {
                status: DerivedStatus::Cancelled,
                ..
            }
        ));
    }

    #[test]
    fn test_assign_requires_acceptance() {
        let mut order = fresh_order();
        assert!(order.decide(&seller(), &OrderCommand::Assign, t0()).is_err());

        run(&mut order, seller(), accept_command(), t0()).unwrap();
        run(&mut order, seller(), OrderCommand::Assign, t0()).unwrap();
        assert_eq!(order.status(), DerivedStatus::Assigned);

        // already assigned
        assert!(order.decide(&seller(), &OrderCommand::Assign, t0()).is_err());
    }

    #[test]
    fn test_draft_closed_after_assignment() {
        let draft = OrderCommand::Draft {
            lines: vec![],
            additionals: None,
        };
        let mut order = fresh_order();
        let transition = order.decide(&seller(), &draft, t0()).unwrap();
        assert!(transition.rewrites_contents);
        assert!(transition.patch.is_empty());

        run(&mut order, seller(), accept_command(), t0()).unwrap();
        assert!(order.decide(&seller(), &draft, t0()).is_ok());

        run(&mut order, seller(), OrderCommand::Assign, t0()).unwrap();
        assert!(order.decide(&seller(), &draft, t0()).is_err());
    }

    #[test]
    fn test_draft_rejected_after_buyer_delivery() {
        let mut order = fresh_order();
        run(&mut order, seller(), accept_command(), t0()).unwrap();
        run(&mut order, buyer(), OrderCommand::Deliver, t0()).unwrap();

        let draft = OrderCommand::Draft {
            lines: vec![],
            additionals: None,
        };
        assert!(order.decide(&seller(), &draft, t0()).is_err());
    }

    #[test]
    fn test_seller_delivery_stamps_all_and_keeps_assignment() {
        let assigned_at = t0() + Duration::minutes(1);
        let delivered_at = t0() + Duration::minutes(30);

        let mut order = fresh_order();
        run(&mut order, seller(), accept_command(), t0()).unwrap();
        run(&mut order, seller(), OrderCommand::Assign, assigned_at).unwrap();
        run(&mut order, seller(), OrderCommand::Deliver, delivered_at).unwrap();

        assert_eq!(order.assigned, Some(assigned_at));
        assert_eq!(order.pickedup, Some(delivered_at));
        assert_eq!(order.delivered, Some(delivered_at));
        assert_eq!(order.status(), DerivedStatus::Delivered);
    }

    #[test]
    fn test_seller_delivery_without_assignment_sets_all_three() {
        let mut order = fresh_order();
        run(&mut order, seller(), accept_command(), t0()).unwrap();
        run(&mut order, seller(), OrderCommand::Deliver, t0()).unwrap();

        assert_eq!(order.assigned, Some(t0()));
        assert_eq!(order.pickedup, Some(t0()));
        assert_eq!(order.delivered, Some(t0()));
    }

    #[test]
    fn test_buyer_delivery_only_stamps_delivered() {
        let mut order = fresh_order();
        run(&mut order, seller(), accept_command(), t0()).unwrap();
        run(&mut order, buyer(), OrderCommand::Deliver, t0()).unwrap();

        assert!(order.assigned.is_none());
        assert!(order.pickedup.is_none());
        assert_eq!(order.status(), DerivedStatus::Delivered);
    }

    #[test]
    fn test_delivery_requires_acceptance() {
        let order = fresh_order();
        assert!(order.decide(&buyer(), &OrderCommand::Deliver, t0()).is_err());
        assert!(order.decide(&seller(), &OrderCommand::Deliver, t0()).is_err());
    }

    #[test]
    fn test_cancel_records_party_and_notes() {
        let mut order = fresh_order();
        run(
            &mut order,
            seller(),
            OrderCommand::Cancel {
                notes: Some("out of stock".to_string()),
            },
            t0(),
        )
        .unwrap();

        assert_eq!(order.cancelled_by, Some(CancelledBy::Seller));
        assert_eq!(order.notes.as_deref(), Some("out of stock"));
        assert_eq!(order.status(), DerivedStatus::Cancelled);
    }

    #[test]
    fn test_cancel_is_terminal_and_blocked_after_delivery() {
        let mut cancelled = fresh_order();
        run(&mut cancelled, buyer(), OrderCommand::Cancel { notes: None }, t0()).unwrap();
        assert!(cancelled
            .decide(&buyer(), &OrderCommand::Cancel { notes: None }, t0())
            .is_err());

        let mut delivered = fresh_order();
        run(&mut delivered, seller(), accept_command(), t0()).unwrap();
        run(&mut delivered, buyer(), OrderCommand::Deliver, t0()).unwrap();
        assert!(delivered
            .decide(&seller(), &OrderCommand::Cancel { notes: None }, t0())
            .is_err());
    }

    #[test]
    fn test_patch_never_touches_created() {
        let mut order = fresh_order();
        let patch = HeaderPatch {
            stamps: vec![Stamp::set(TimestampField::Created, t0() + Duration::days(1))],
            ..HeaderPatch::default()
        };
        patch.apply(&mut order);
        assert_eq!(order.created, t0());
    }

    #[test]
    fn test_belongs_to_party() {
        let order = fresh_order();
        assert!(order.belongs_to(&seller()));
        assert!(order.belongs_to(&buyer()));
        assert!(!order.belongs_to(&Actor::Seller(SellerId(99))));
        assert!(!order.belongs_to(&Actor::Buyer(BuyerId(99))));
    }
}
