use crate::domain::pricing::{PriceId, PricingError};
use crate::utils::IsTransient;

use super::value_objects::{DerivedStatus, OrderId};

// ============================================================================
// Order Business Rule Errors
// ============================================================================

/// Caller-facing classification of an [`OrderError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidTransition,
    InvalidInput,
    Conflict,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("Price not found: {0}")]
    PriceNotFound(PriceId),

    #[error("Cannot {operation} an order in status {status}")]
    InvalidTransition {
        operation: &'static str,
        status: DerivedStatus,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Order {0} was modified concurrently")]
    Conflict(OrderId),

    #[error("Pricing failure: {0}")]
    Pricing(#[from] PricingError),

    #[error("Storage failure: {0}")]
    Storage(#[from] anyhow::Error),
}

impl OrderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrderError::OrderNotFound(_) | OrderError::PriceNotFound(_) => ErrorKind::NotFound,
            OrderError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            OrderError::InvalidInput(_) => ErrorKind::InvalidInput,
            OrderError::Conflict(_) => ErrorKind::Conflict,
            OrderError::Pricing(PricingError::RelationNotFound { .. }) => ErrorKind::NotFound,
            OrderError::Pricing(PricingError::EmptyUnit) => ErrorKind::InvalidInput,
            OrderError::Pricing(PricingError::Storage(_)) | OrderError::Storage(_) => ErrorKind::Internal,
        }
    }

    /// Short label used for metrics.
    pub fn label(&self) -> &'static str {
        match self.kind() {
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidTransition => "invalid_transition",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Internal => "internal",
        }
    }
}

impl IsTransient for OrderError {
    fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Internal
    }
}
