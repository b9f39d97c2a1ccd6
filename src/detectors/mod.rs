//! Swing-based chart formation detectors
//!
//! # Formations
//!
//! - **Continuation**: DPD (drop-pause-drop), UPU (up-pause-up)
//! - **Reversal**: DPU (drop-pause-up), UPD (up-pause-down)
//! - **Structure**: Head & Shoulders, Double Top, Double Bottom
//!
//! Every detector consumes the candles plus their precomputed swing points and
//! returns `None` whenever its structural preconditions are not met.

pub mod helpers;

/// Generate `with_defaults()` -> `Self::default()` for multiple detector types.
macro_rules! impl_with_defaults {
  ($($detector:ty),* $(,)?) => {
    $(impl $detector {
      pub fn with_defaults() -> Self { Self::default() }
    })*
  };
}

pub mod continuation;
pub mod reversal;
pub mod structure;

// Re-export all detectors for convenience
pub use continuation::*;
pub use helpers::*;
pub use reversal::*;
pub use structure::*;
