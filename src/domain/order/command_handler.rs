use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::clock::Clock;
use crate::ledger::{LineItemLedger, PreparedBatch};
use crate::metrics::Metrics;
use crate::query::{DetailedOrder, OrderAssembler};
use crate::repository::{OrderRepository, TransitionOutcome};

use super::aggregate::NewOrderRecord;
use super::commands::{NewOrder, OrderCommand};
use super::errors::OrderError;
use super::value_objects::{Actor, OrderId};

// ============================================================================
// Order Lifecycle Controller
// ============================================================================
//
// Orchestrates: Command → Aggregate decision → conditional write → read back
//
// The aggregate decides the guard and header patch; storage re-checks the
// guard while writing. Any batch is staged before the write so an unknown
// price fails the request with nothing stored.
//
// ============================================================================

#[derive(Clone)]
pub struct OrderLifecycle {
    orders: Arc<dyn OrderRepository>,
    ledger: LineItemLedger,
    assembler: OrderAssembler,
    clock: Arc<dyn Clock>,
    metrics: Arc<Metrics>,
}

impl OrderLifecycle {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        ledger: LineItemLedger,
        assembler: OrderAssembler,
        clock: Arc<dyn Clock>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            orders,
            ledger,
            assembler,
            clock,
            metrics,
        }
    }

    /// Place a new order with its initial batch priced at the buyer's tier.
    pub async fn create(&self, request: NewOrder, correlation_id: Uuid) -> Result<DetailedOrder, OrderError> {
        let span = tracing::info_span!(
            "order.create",
            %correlation_id,
            buyer_id = %request.buyer_id,
            seller_id = %request.seller_id
        );
        let started = Instant::now();

        let result = self.create_inner(request).instrument(span).await;
        self.record("create", &result, started);
        result
    }

    async fn create_inner(&self, request: NewOrder) -> Result<DetailedOrder, OrderError> {
        if request.buyer_id.0 <= 0 || request.seller_id.0 <= 0 {
            return Err(OrderError::InvalidInput(format!(
                "buyer {} and seller {} must be positive ids",
                request.buyer_id, request.seller_id
            )));
        }

        let now = self.clock.now();
        let prepared = self
            .ledger
            .prepare_initial(
                request.buyer_id,
                request.seller_id,
                now,
                &request.lines,
                request.additionals.as_deref(),
            )
            .await?;
        self.record_dropped(&prepared);

        let record = NewOrderRecord {
            buyer_id: request.buyer_id,
            seller_id: request.seller_id,
            address: request.address,
            is_cod: request.is_cod,
            delivery_fee: request.delivery_fee,
            notes: request.notes,
            created: now,
        };
        let batch = prepared.pending.batch;
        let order = self.orders.insert(record, &batch).await?;
        self.metrics
            .record_batch("create", batch.items.len(), batch.additionals.len());

        tracing::info!(
            order_id = %order.id,
            revision = %batch.revision,
            items = batch.items.len(),
            additionals = batch.additionals.len(),
            "🛒 Order created"
        );

        self.assembler.with_contents(order).await
    }

    /// Apply `command` on behalf of `actor` and return the refreshed order.
    ///
    /// `decide` rejects commands the order's status does not allow with
    /// `InvalidTransition`. When that check passed but storage then finds
    /// the guard broken or a newer batch, another write got in between the
    /// read and this one, and the caller gets `Conflict` so it can re-read
    /// and retry.
    pub async fn handle(
        &self,
        actor: Actor,
        order_id: OrderId,
        command: OrderCommand,
        correlation_id: Uuid,
    ) -> Result<DetailedOrder, OrderError> {
        let operation = command.operation();
        let span = tracing::info_span!(
            "order.transition",
            %correlation_id,
            %order_id,
            operation,
            role = actor.role()
        );
        let started = Instant::now();

        let result = self.handle_inner(actor, order_id, &command).instrument(span).await;
        self.record(operation, &result, started);
        result
    }

    async fn handle_inner(
        &self,
        actor: Actor,
        order_id: OrderId,
        command: &OrderCommand,
    ) -> Result<DetailedOrder, OrderError> {
        let order = self
            .orders
            .find(order_id)
            .await?
            .filter(|order| order.belongs_to(&actor))
            .ok_or(OrderError::OrderNotFound(order_id))?;

        let now = self.clock.now();
        let transition = order.decide(&actor, command, now)?;

        let prepared = match command.contents() {
            Some((lines, additionals)) if transition.rewrites_contents => {
                let prepared = self.ledger.prepare(&order, lines, additionals, now).await?;
                self.record_dropped(&prepared);
                Some(prepared)
            }
            _ => None,
        };
        let pending = prepared.as_ref().map(|prepared| &prepared.pending);

        let updated = match self
            .orders
            .transition(order_id, &transition.guard, &transition.patch, pending)
            .await?
        {
            TransitionOutcome::Applied(updated) => updated,
            // lost race, not a disallowed command
            TransitionOutcome::GuardRejected | TransitionOutcome::RevisionConflict => {
                tracing::warn!(order_id = %order_id, "Order changed between read and write");
                return Err(OrderError::Conflict(order_id));
            }
            TransitionOutcome::NotFound => return Err(OrderError::OrderNotFound(order_id)),
        };

        if let Some(pending) = pending {
            self.metrics.record_batch(
                command.operation(),
                pending.batch.items.len(),
                pending.batch.additionals.len(),
            );
        }

        tracing::info!(
            order_id = %order_id,
            from = %order.status(),
            to = %updated.status(),
            revision = ?pending.map(|pending| pending.batch.revision.0),
            "✅ Order {}",
            command.operation()
        );

        self.assembler.with_contents(updated).await
    }

    fn record_dropped(&self, prepared: &PreparedBatch) {
        if prepared.dropped_lines > 0 || prepared.dropped_additionals > 0 {
            tracing::debug!(
                dropped_lines = prepared.dropped_lines,
                dropped_additionals = prepared.dropped_additionals,
                "Dropped rows while staging batch"
            );
        }
        self.metrics
            .record_dropped(prepared.dropped_lines, prepared.dropped_additionals);
    }

    fn record<T>(&self, operation: &str, result: &Result<T, OrderError>, started: Instant) {
        let outcome = match result {
            Ok(_) => "ok",
            Err(e) => {
                tracing::warn!(operation, error = %e, kind = e.label(), "Order operation failed");
                e.label()
            }
        };
        self.metrics
            .record_transition(operation, outcome, started.elapsed().as_secs_f64());
    }
}
