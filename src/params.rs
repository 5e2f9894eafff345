//! Scan tunables and their metadata
//!
//! All thresholds the pivot and scanner passes use live in [`ScanParams`],
//! which is set once per scan run and passed explicitly into every pass.
//! Parameters can come from code, from a JSON document, or from a flat
//! name/value map (e.g. command-line overrides).
//!
//! # Example
//!
//! ```rust
//! use pivotscan::params::ScanParams;
//!
//! let params = ScanParams::from_json_str(r#"{ "tolerance": 0.01, "lookback": 120 }"#).unwrap();
//! assert_eq!(params.lookback.get(), 120);
//! assert_eq!(params.min_confirm.get(), 5);
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
  bar::{fraction_of, Price},
  PatternError, Period, Ratio, Result,
};

// ============================================================
// PARAMETER TYPES
// ============================================================

/// Type of parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
  /// Fraction of a reference price (0.0..=1.0)
  Ratio,
  /// Count of bars (positive integer)
  Period,
}

/// Metadata for a single tunable
#[derive(Debug, Clone)]
pub struct ParamMeta {
  /// Parameter name, identical to the serde field name
  pub name: &'static str,
  pub param_type: ParamType,
  pub default: f64,
  /// Accepted range: (min, max)
  pub range: (f64, f64),
  pub description: &'static str,
}

impl ParamMeta {
  pub const fn ratio(
    name: &'static str,
    default: f64,
    range: (f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Ratio, default, range, description }
  }

  pub const fn period(
    name: &'static str,
    default: f64,
    range: (f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Period, default, range, description }
  }

  /// Validate a value for this parameter
  pub fn validate(&self, value: f64) -> Result<()> {
    let (min, max) = self.range;
    if value.is_nan() || value < min || value > max {
      return Err(PatternError::OutOfRange { field: self.name, value, min, max });
    }
    match self.param_type {
      ParamType::Ratio => Ok(()),
      ParamType::Period => {
        if value < 1.0 || value.fract() != 0.0 {
          return Err(PatternError::InvalidValue("Period must be a positive integer"));
        }
        Ok(())
      },
    }
  }
}

const SCAN_PARAMS: &[ParamMeta] = &[
  ParamMeta::ratio(
    "height_margin",
    0.012,
    (0.0, 0.2),
    "Minimum confirming height of a pivot, as a fraction of its price",
  ),
  ParamMeta::ratio(
    "tolerance",
    0.015,
    (0.0, 0.1),
    "Band around a pivot price that counts as a support touch",
  ),
  ParamMeta::ratio(
    "breakout_margin",
    0.02,
    (0.0, 0.2),
    "How far the close must clear a pivot to count as a breakout",
  ),
  ParamMeta::ratio(
    "pullback_margin",
    0.05,
    (0.0, 0.5),
    "Height of the run into the candidate before pivots are tested",
  ),
  ParamMeta::ratio(
    "adj_threshold",
    0.05,
    (0.0, 1.0),
    "Close/adjusted-close divergence that triggers rescaling",
  ),
  ParamMeta::ratio("big_up_body", 0.7, (0.0, 1.0), "Body share of range for a big up day"),
  ParamMeta::ratio(
    "big_up_move",
    0.07,
    (0.0, 1.0),
    "Sell-off depth a big up day must reverse",
  ),
  ParamMeta::period(
    "min_confirm",
    5.0,
    (2.0, 20.0),
    "Pivot confirmation: min_confirm - 1 bars needed on each side",
  ),
  ParamMeta::period("max_confirm", 19.0, (1.0, 60.0), "Confirmations after which a side stops"),
  ParamMeta::period("max_window", 20.0, (1.0, 60.0), "Bars scanned on each side of a pivot"),
  ParamMeta::period(
    "height_decay_days",
    60.0,
    (1.0, 1000.0),
    "Elapsed bars over which the required pivot height doubles",
  ),
  ParamMeta::period("lookback", 250.0, (1.0, 4096.0), "Bars walked by the scanner"),
  ParamMeta::period("max_history", 1024.0, (1.0, 4096.0), "Bars kept per series"),
];

// ============================================================
// SCAN PARAMS
// ============================================================

/// Tunables of one scan run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanParams {
  pub height_margin: Ratio,
  pub tolerance: Ratio,
  pub breakout_margin: Ratio,
  pub pullback_margin: Ratio,
  pub adj_threshold: Ratio,
  pub big_up_body: Ratio,
  pub big_up_move: Ratio,
  pub min_confirm: Period,
  pub max_confirm: Period,
  pub max_window: Period,
  pub height_decay_days: Period,
  pub lookback: Period,
  pub max_history: Period,
}

impl Default for ScanParams {
  fn default() -> Self {
    Self {
      height_margin: Ratio::new_const(0.012),
      tolerance: Ratio::new_const(0.015),
      breakout_margin: Ratio::new_const(0.02),
      pullback_margin: Ratio::new_const(0.05),
      adj_threshold: Ratio::new_const(0.05),
      big_up_body: Ratio::new_const(0.7),
      big_up_move: Ratio::new_const(0.07),
      min_confirm: Period::new_const(5),
      max_confirm: Period::new_const(19),
      max_window: Period::new_const(20),
      height_decay_days: Period::new_const(60),
      lookback: Period::new_const(250),
      max_history: Period::new_const(1024),
    }
  }
}

impl ScanParams {
  /// Metadata of every tunable
  pub fn param_meta() -> &'static [ParamMeta] {
    SCAN_PARAMS
  }

  /// Parse from JSON; missing fields keep their defaults.
  pub fn from_json_str(json: &str) -> Result<Self> {
    let params: ScanParams =
      serde_json::from_str(json).map_err(|e| PatternError::InvalidConfig(e.to_string()))?;
    params.validate()?;
    Ok(params)
  }

  /// Build from a name/value map; missing names use their defaults.
  pub fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    if let Some(unknown) = params.keys().find(|k| !SCAN_PARAMS.iter().any(|m| m.name == **k)) {
      return Err(PatternError::InvalidConfig(format!("unknown parameter: {unknown}")));
    }
    let d = Self::default();
    let built = Self {
      height_margin: get_ratio(params, "height_margin", d.height_margin.get())?,
      tolerance: get_ratio(params, "tolerance", d.tolerance.get())?,
      breakout_margin: get_ratio(params, "breakout_margin", d.breakout_margin.get())?,
      pullback_margin: get_ratio(params, "pullback_margin", d.pullback_margin.get())?,
      adj_threshold: get_ratio(params, "adj_threshold", d.adj_threshold.get())?,
      big_up_body: get_ratio(params, "big_up_body", d.big_up_body.get())?,
      big_up_move: get_ratio(params, "big_up_move", d.big_up_move.get())?,
      min_confirm: get_period(params, "min_confirm", d.min_confirm.get())?,
      max_confirm: get_period(params, "max_confirm", d.max_confirm.get())?,
      max_window: get_period(params, "max_window", d.max_window.get())?,
      height_decay_days: get_period(params, "height_decay_days", d.height_decay_days.get())?,
      lookback: get_period(params, "lookback", d.lookback.get())?,
      max_history: get_period(params, "max_history", d.max_history.get())?,
    };
    built.validate()?;
    Ok(built)
  }

  /// Current value of a tunable by name
  pub fn get(&self, name: &str) -> Option<f64> {
    let value = match name {
      "height_margin" => self.height_margin.get(),
      "tolerance" => self.tolerance.get(),
      "breakout_margin" => self.breakout_margin.get(),
      "pullback_margin" => self.pullback_margin.get(),
      "adj_threshold" => self.adj_threshold.get(),
      "big_up_body" => self.big_up_body.get(),
      "big_up_move" => self.big_up_move.get(),
      "min_confirm" => self.min_confirm.get() as f64,
      "max_confirm" => self.max_confirm.get() as f64,
      "max_window" => self.max_window.get() as f64,
      "height_decay_days" => self.height_decay_days.get() as f64,
      "lookback" => self.lookback.get() as f64,
      "max_history" => self.max_history.get() as f64,
      _ => return None,
    };
    Some(value)
  }

  /// Check every value against its range, plus cross-field constraints
  pub fn validate(&self) -> Result<()> {
    for meta in SCAN_PARAMS {
      if let Some(value) = self.get(meta.name) {
        meta.validate(value)?;
      }
    }
    let run = self.confirm_run();
    if self.max_confirm.get() < run {
      return Err(PatternError::InvalidConfig(format!(
        "max_confirm ({}) must be >= min_confirm - 1 ({run})",
        self.max_confirm.get()
      )));
    }
    if self.max_window.get() < run {
      return Err(PatternError::InvalidConfig(format!(
        "max_window ({}) must be >= min_confirm - 1 ({run})",
        self.max_window.get()
      )));
    }
    Ok(())
  }

  /// Number of confirming bars a run needs: `min_confirm - 1`.
  #[inline]
  pub fn confirm_run(&self) -> usize {
    self.min_confirm.get().saturating_sub(1)
  }

  /// Minimum height for a pivot at `reference` to be asserted.
  #[inline]
  pub fn pivot_margin(&self, reference: Price) -> Price {
    fraction_of(reference, self.height_margin)
  }

  /// Minimum pivot height for a scanner hit `elapsed` bars back.
  ///
  /// Grows linearly from the pivot margin, doubling every `height_decay_days`.
  pub fn significance(&self, reference: Price, elapsed: usize) -> Price {
    let decay = self.height_decay_days.get() as f64;
    let scale = (decay + elapsed as f64) / decay;
    (reference as f64 * self.height_margin.get() * scale).round() as Price
  }
}

// ============================================================
// PARAMETER VALUE HELPERS
// ============================================================

/// Helper to get a Ratio from params with default fallback
pub fn get_ratio(params: &HashMap<&str, f64>, key: &str, default: f64) -> Result<Ratio> {
  let value = params.get(key).copied().unwrap_or(default);
  Ratio::new(value)
}

/// Helper to get a Period from params with default fallback
pub fn get_period(params: &HashMap<&str, f64>, key: &str, default: usize) -> Result<Period> {
  let value = params.get(key).copied().unwrap_or(default as f64);
  if value < 0.0 || value.fract() != 0.0 {
    return Err(PatternError::InvalidValue("Period must be a positive integer"));
  }
  Period::new(value as usize)
}

// ============================================================
// TESTS
// ============================================================
