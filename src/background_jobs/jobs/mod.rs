//! Specific background job implementations.
//!
//! This module contains implementations of the `BackgroundJob` trait for
//! the periodic sync and maintenance tasks.

pub mod delta_update;
pub mod full_reconcile;
pub mod variant_sweep;

pub use delta_update::DeltaUpdateJob;
pub use full_reconcile::FullReconcileJob;
pub use variant_sweep::VariantSweepJob;
