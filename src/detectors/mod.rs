//! Pattern detectors
//!
//! Every detector evaluates one candidate against one annotated series
//! through a [`ScanContext`](crate::scanner::ScanContext).
//!
//! # Pattern Categories
//!
//! - **Support (5)**: support retest and the double-bottom family
//! - **Breakout (5)**: pivot breakouts and rolling-high breakouts
//! - **Momentum (6)**: SMA-20 trend, weekly candles, relative volume, change

pub mod helpers;

/// Generate `with_defaults()` -> `Self::default()` for multiple detector types.
macro_rules! impl_with_defaults {
  ($($detector:ty),* $(,)?) => {
    $(impl $detector {
      pub fn with_defaults() -> Self { Self::default() }
    })*
  };
}

pub mod breakout;
pub mod momentum;
pub mod support;

// Re-export all detectors for convenience
pub use breakout::*;
pub use helpers::*;
pub use momentum::*;
pub use support::*;
