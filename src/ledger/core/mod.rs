// ============================================================================
// Ledger Core - Rows, Batches & Revisions
// ============================================================================
//
// Pure types and read-side derivations (current contents, version history).
// No storage access here.
//
// ============================================================================

pub mod batch;
pub mod revision;

pub use batch::{
    LineItemBatch, OrderAdditional, OrderContents, OrderItem, OrderRows, PendingBatch,
    RevisionContents, VersionHistory,
};
pub use revision::Revision;
