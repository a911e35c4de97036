// ============================================================================
// Pricing Domain - Tiers, Price Slots & Buyer Relations
// ============================================================================
//
// - Value objects (Tier, PriceSlot, BuyerSellerRelation)
// - Tier resolution and price normalization
// - Price book for seller-side configuration
//
// ============================================================================

pub mod value_objects;
pub mod errors;
pub mod resolver;
pub mod price_book;

pub use value_objects::*;
pub use errors::*;
pub use resolver::*;
pub use price_book::*;
