// ============================================================================
// Ledger Store - Staging and appending batches through the repositories
// ============================================================================

pub mod line_item_ledger;

pub use line_item_ledger::{LineItemLedger, PreparedBatch};
