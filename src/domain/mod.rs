// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// Each aggregate has its own subdirectory:
// - order: header, derived status, guarded transitions, lifecycle controller
// - pricing: tiers, price slots, buyer relations
//
// Storage lives behind the traits in `crate::repository`.
//
// ============================================================================

pub mod order;
pub mod pricing;
