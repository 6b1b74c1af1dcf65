// =============================================================================
// Combination domain — entity, structural rules, recognition, analytics,
// lifecycle instructions and the owning aggregate
// =============================================================================

pub mod aggregate;
pub mod entity;
pub mod facade;
pub mod greeks;
pub mod lifecycle;
pub mod pnl;
pub mod recognizer;
pub mod risk;
pub mod rules;
