// ============================================================================
// Query Layer - Read Models over Orders
// ============================================================================
//
// - OrderAssembler  header + current contents + version map + parties
// - OrderQueries    listing, detail, unread counter, dashboard roll-ups
//
// ============================================================================

mod dashboard;
mod detail;
mod listing;

pub use dashboard::{DashboardReport, LatestOrderSummary, OrderTotal, PopularItem, StatusCounts};
pub use detail::{DetailedOrder, OrderAssembler};
pub use listing::{OrderPage, OrderQueries};
