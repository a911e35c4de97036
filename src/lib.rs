// ============================================================================
// Wholesale Orders
// ============================================================================
//
// Buyer-to-seller wholesale ordering:
// - domain::pricing   tiers, price slots, buyer relations
// - ledger            append-only, revisioned line items
// - domain::order     order header, derived status, lifecycle controller
// - query             listing, detail and dashboard read models
// - repository        storage traits with in-memory and PostgreSQL stores
//
// ============================================================================

pub mod clock;
pub mod config;
pub mod directory;
pub mod domain;
pub mod ledger;
pub mod metrics;
pub mod query;
pub mod repository;
pub mod utils;
