// ============================================================================
// Line-Item Ledger
// ============================================================================
//
// Append-only, revision-versioned storage of order items and additionals.
//
// ============================================================================

mod core;
mod store;

pub use self::core::*;
pub use self::store::*;
