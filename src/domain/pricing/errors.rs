use crate::domain::order::{BuyerId, SellerId};

// ============================================================================
// Pricing Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PricingError {
    #[error("No relation between seller {seller} and buyer {buyer}")]
    RelationNotFound { buyer: BuyerId, seller: SellerId },

    #[error("Unit cannot be empty")]
    EmptyUnit,

    #[error("Storage failure: {0}")]
    Storage(#[from] anyhow::Error),
}
