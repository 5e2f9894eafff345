//! # pivotscan - support/resistance pivot and chart pattern screening
//!
//! Screens daily price histories for support retests, double bottoms,
//! breakouts and related setups. A series is annotated once (moving averages,
//! candle classification, money flow, pivots) and a candidate bar (the latest
//! bar, a historical date or an external quote) is then evaluated against it.
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::{Days, NaiveDate};
//! use pivotscan::prelude::*;
//!
//! // Prices are fixed-point thousandths: 100_000 = 100.000
//! let first = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
//! let rows = (0..60u64).map(|i| {
//!     let close = 100_000 + (i as i64 % 7) * 1_000;
//!     RawBar {
//!         date: first + Days::new(i),
//!         open: close - 500,
//!         high: close + 1_000,
//!         low: close - 1_000,
//!         close,
//!         volume: 10_000,
//!         adj_close: None,
//!     }
//! });
//!
//! // Create engine with every builtin predicate
//! let engine = EngineBuilder::new().with_all_defaults().build().unwrap();
//!
//! // Load + annotate, then evaluate the latest bar
//! let series = engine.load_series("ACME", None, rows);
//! let verdicts = engine.evaluate(&series, &CandidateSource::Latest).unwrap();
//! assert_eq!(verdicts.len(), 16);
//!
//! for verdict in verdicts.iter().filter(|v| v.matched) {
//!     println!("{}", format_verdict(series.symbol(), verdict));
//! }
//! ```

use tracing::{debug, info, warn};

pub mod bar;
pub mod detectors;
pub mod indicators;
pub mod params;
pub mod pivots;
pub mod report;
pub mod scanner;
pub mod series;

pub mod prelude {
    pub use crate::{
        // Bars
        bar::{Bar, CandleColor, CandleTrend, PivotFlags, PivotKind, Price, RawBar},
        // Detectors
        detectors::*,
        // Parameters
        params::{get_period, get_ratio, ParamMeta, ParamType, ScanParams},
        // Output
        indicators::MoneyFlow,
        report::{format_verdict, BatchReport, Summary, Verdict},
        // Parallel
        scan_parallel,
        // Scanner
        scanner::{check_breakout, check_support, PivotHit, ScanContext},
        // Series
        series::{Candidate, CandidateSource, Series},
        // Engine
        BuiltinDetector,
        Direction,
        EngineBuilder,
        // Core traits
        PatternDetector,
        // Errors
        PatternError,
        PatternId,
        Period,
        Ratio,
        Result,
        ScanEngine,
        ScanError,
        ScanResult,
    };
}

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, PatternError>;

/// Errors that can occur while loading or scanning a series
#[derive(Debug, Clone, thiserror::Error)]
pub enum PatternError {
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Insufficient data: need {need} bars, got {got}")]
    InsufficientData { need: usize, got: usize },

    #[error("Invalid bar on {date}: {reason}")]
    InvalidBar {
        date: chrono::NaiveDate,
        reason: &'static str,
    },

    #[error("No bar dated {0} in series")]
    CandidateNotFound(chrono::NaiveDate),

    #[error("CSV: {0}")]
    Csv(String),
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Normalized value in range 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Ratio(f64);

impl Ratio {
    /// Create a new Ratio, validating the value is in [0.0, 1.0]
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(PatternError::InvalidValue(
                "Ratio cannot be NaN or infinite",
            ));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(PatternError::OutOfRange {
                field: "Ratio",
                value,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(Self(value))
    }

    /// Create a Ratio from a compile-time constant (library internal use)
    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl serde::Serialize for Ratio {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Ratio {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Ratio::new(value).map_err(serde::de::Error::custom)
    }
}

/// Period in bars (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Period(usize);

impl Period {
    /// Create a new Period, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(PatternError::InvalidValue("Period must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl serde::Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Period::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// PATTERN IDS
// ============================================================

/// Unique identifier for a pattern predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PatternId(pub &'static str);

impl PatternId {
    /// Returns the string identifier
    #[inline]
    pub fn as_str(&self) -> &'static str {
        self.0
    }

    /// Returns the signal direction of this pattern, `None` for unknown ids.
    pub fn typical_direction(&self) -> Option<Direction> {
        match self.0 {
            "SUPPORT"
            | "DOUBLE_BOTTOM"
            | "PULLBACK_DOUBLE_BOTTOM"
            | "MFI_DOUBLE_BOTTOM"
            | "YEAR_LOW_DOUBLE_BOTTOM"
            | "BREAKOUT"
            | "SECOND_BREAKOUT"
            | "TREND_BREAKOUT"
            | "STRONG_UPTREND"
            | "STRONG_BREAKOUT"
            | "STRONG_BODY_BREAKOUT"
            | "WEEK_UP"
            | "WEEK_REVERSAL" => Some(Direction::Bullish),

            "LOW_VOLUME" | "HIGH_VOLUME" | "CHANGE" => Some(Direction::Neutral),

            _ => None,
        }
    }

    /// Returns true for predicates that always match and only describe the bar
    pub fn is_informational(&self) -> bool {
        self.0 == "CHANGE"
    }
}

impl serde::Serialize for PatternId {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(self.0)
    }
}

/// Direction/bias of a pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Direction {
    Bullish,
    Neutral,
}

// ============================================================
// PATTERN DETECTOR TRAIT
// ============================================================

use bar::RawBar;
use params::ScanParams;
use report::{BatchReport, Summary, Verdict};
use scanner::{PivotHit, ScanContext};
use series::{CandidateSource, Series};

/// One pattern predicate
pub trait PatternDetector: Send + Sync {
    fn id(&self) -> PatternId;

    /// Bars older than the candidate the predicate needs; fewer means no match.
    fn min_history(&self) -> usize;

    /// `Some(hits)` on a match. Predicates that do not look at pivots match
    /// with an empty hit list.
    fn detect(&self, ctx: &ScanContext<'_>) -> Option<Vec<PivotHit>>;

    fn validate_config(&self) -> Result<()> {
        Ok(())
    }
}

// ============================================================
// BUILTIN DETECTORS - generated via macro
// ============================================================

use detectors::*;

/// Macro to generate BuiltinDetector enum without boilerplate
macro_rules! define_builtin_detectors {
    (
        $(
            $variant:ident($detector:ty)
        ),* $(,)?
    ) => {
        /// All builtin detectors - dispatched via enum match
        #[derive(Debug, Clone)]
        pub enum BuiltinDetector {
            $($variant($detector)),*
        }

        impl BuiltinDetector {
            #[inline]
            pub fn detect(&self, ctx: &ScanContext<'_>) -> Option<Vec<PivotHit>> {
                match self {
                    $(Self::$variant(d) => PatternDetector::detect(d, ctx)),*
                }
            }

            #[inline]
            pub fn id(&self) -> PatternId {
                match self {
                    $(Self::$variant(d) => PatternDetector::id(d)),*
                }
            }

            #[inline]
            pub fn min_history(&self) -> usize {
                match self {
                    $(Self::$variant(d) => PatternDetector::min_history(d)),*
                }
            }

            pub fn validate_config(&self) -> Result<()> {
                match self {
                    $(Self::$variant(d) => PatternDetector::validate_config(d)),*
                }
            }
        }
    };
}

define_builtin_detectors! {
    // Support (5)
    Support(SupportDetector),
    DoubleBottom(DoubleBottomDetector),
    PullbackDoubleBottom(PullbackDoubleBottomDetector),
    MoneyFlowDoubleBottom(MoneyFlowDoubleBottomDetector),
    YearLowDoubleBottom(YearLowDoubleBottomDetector),

    // Breakout (5)
    Breakout(BreakoutDetector),
    SecondBreakout(SecondBreakoutDetector),
    TrendBreakout(TrendBreakoutDetector),
    StrongBreakout(StrongBreakoutDetector),
    StrongBodyBreakout(StrongBodyBreakoutDetector),

    // Momentum (6)
    StrongUptrend(StrongUptrendDetector),
    WeekUp(WeekUpDetector),
    WeekReversal(WeekReversalDetector),
    LowVolume(LowVolumeDetector),
    HighVolume(HighVolumeDetector),
    Change(ChangeDetector),
}

// ============================================================
// SCAN ENGINE
// ============================================================

/// Engine configuration
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub pattern_filter: Option<Vec<PatternId>>,
    /// Drop verdicts that did not match
    pub matched_only: bool,
}

/// Annotates series and evaluates candidates against them
#[derive(Debug, Clone)]
pub struct ScanEngine {
    builtin: Vec<BuiltinDetector>,
    params: ScanParams,
    config: EngineConfig,
}

impl ScanEngine {
    #[inline]
    pub fn params(&self) -> &ScanParams {
        &self.params
    }

    #[inline]
    pub fn detectors(&self) -> &[BuiltinDetector] {
        &self.builtin
    }

    // ===========================================
    // Annotation
    // ===========================================

    /// Compute indicators and pivots of `series` in place.
    pub fn annotate(&self, series: &mut Series) {
        indicators::compute(series.bars_mut());
        let flagged = pivots::detect(series.bars_mut(), &self.params);
        debug!(symbol = series.symbol(), bars = series.len(), flagged, "series annotated");
    }

    /// Build and annotate a series from raw rows.
    pub fn load_series(
        &self,
        symbol: impl Into<String>,
        sector: Option<String>,
        rows: impl IntoIterator<Item = RawBar>,
    ) -> Series {
        let mut series = Series::from_raw(symbol, sector, rows, &self.params);
        self.annotate(&mut series);
        series
    }

    // ===========================================
    // Evaluation
    // ===========================================

    /// Evaluate every active predicate for one candidate of an annotated series.
    pub fn evaluate(&self, series: &Series, source: &CandidateSource) -> Result<Vec<Verdict>> {
        let candidate = series.candidate(source, &self.params)?;
        let ctx = ScanContext::new(series, &candidate, &self.params);
        let summary = Summary::of(ctx.cand(), ctx.prior());
        debug!(
            symbol = series.symbol(),
            date = %candidate.bar.date,
            history = ctx.history().len(),
            "evaluating candidate"
        );

        let verdicts = self
            .select()
            .map(|detector| {
                let hits = if ctx.history().len() >= detector.min_history() {
                    detector.detect(&ctx)
                } else {
                    None
                };
                let id = detector.id();
                Verdict {
                    pattern: id,
                    direction: id.typical_direction().unwrap_or(Direction::Neutral),
                    matched: hits.is_some(),
                    date: candidate.bar.date,
                    summary: summary.clone(),
                    hits: hits.unwrap_or_default(),
                }
            })
            .filter(|v| v.matched || !self.config.matched_only)
            .collect();
        Ok(verdicts)
    }

    /// Annotate `series`, then evaluate.
    pub fn scan(&self, series: &mut Series, source: &CandidateSource) -> Result<Vec<Verdict>> {
        self.annotate(series);
        self.evaluate(series, source)
    }

    /// Annotate and evaluate an owned series into a [`ScanResult`].
    pub fn scan_owned(&self, mut series: Series, source: &CandidateSource) -> Result<ScanResult> {
        let verdicts = self.scan(&mut series, source)?;
        Ok(ScanResult {
            symbol: series.symbol().to_string(),
            sector: series.sector().map(str::to_string),
            verdicts,
        })
    }

    // ===========================================
    // Internal helpers
    // ===========================================

    fn select(&self) -> impl Iterator<Item = &BuiltinDetector> {
        self.builtin.iter().filter(|d| match self.config.pattern_filter {
            Some(ref filter) => filter.contains(&d.id()),
            None => true,
        })
    }

    fn validate(&self) -> Result<()> {
        self.params.validate()?;
        for d in &self.builtin {
            d.validate_config()?;
        }
        Ok(())
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for creating ScanEngine instances
#[derive(Debug, Default)]
pub struct EngineBuilder {
    builtin: Vec<BuiltinDetector>,
    params: ScanParams,
    config: EngineConfig,
}

/// Generate an array of `BuiltinDetector` variants using `Default::default()` for each inner type.
macro_rules! builtin_defaults {
  ($($variant:ident),* $(,)?) => {
    [$(BuiltinDetector::$variant(Default::default())),*]
  };
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add all builtin patterns with default configurations
    pub fn with_all_defaults(self) -> Self {
        self.with_support_defaults()
            .with_breakout_defaults()
            .with_momentum_defaults()
    }

    /// Add support and double-bottom patterns with defaults
    pub fn with_support_defaults(mut self) -> Self {
        self.builtin.extend(builtin_defaults![
            Support,
            DoubleBottom,
            PullbackDoubleBottom,
            MoneyFlowDoubleBottom,
            YearLowDoubleBottom,
        ]);
        self
    }

    /// Add breakout patterns with defaults
    pub fn with_breakout_defaults(mut self) -> Self {
        self.builtin.extend(builtin_defaults![
            Breakout,
            SecondBreakout,
            TrendBreakout,
            StrongBreakout,
            StrongBodyBreakout,
        ]);
        self
    }

    /// Add trend, weekly, volume and change patterns with defaults
    pub fn with_momentum_defaults(mut self) -> Self {
        self.builtin.extend(builtin_defaults![
            StrongUptrend,
            WeekUp,
            WeekReversal,
            LowVolume,
            HighVolume,
            Change,
        ]);
        self
    }

    /// Add a builtin detector
    #[allow(clippy::should_implement_trait)]
    pub fn add(mut self, detector: BuiltinDetector) -> Self {
        self.builtin.push(detector);
        self
    }

    /// Add with config validation
    pub fn add_checked(mut self, detector: BuiltinDetector) -> Result<Self> {
        detector.validate_config()?;
        self.builtin.push(detector);
        Ok(self)
    }

    /// Set scan tunables
    pub fn params(mut self, params: ScanParams) -> Self {
        self.params = params;
        self
    }

    /// Only keep verdicts that matched
    pub fn matched_only(mut self, enable: bool) -> Self {
        self.config.matched_only = enable;
        self
    }

    /// Filter to specific patterns only
    pub fn only_patterns(mut self, ids: impl IntoIterator<Item = PatternId>) -> Self {
        self.config.pattern_filter = Some(ids.into_iter().collect());
        self
    }

    /// Build the engine
    pub fn build(self) -> Result<ScanEngine> {
        let engine = ScanEngine {
            builtin: self.builtin,
            params: self.params,
            config: self.config,
        };
        engine.validate()?;
        Ok(engine)
    }
}

// ============================================================
// PARALLEL SCANNING
// ============================================================

use rayon::prelude::*;

/// Result of scanning a single instrument
#[derive(Debug, Clone, serde::Serialize)]
pub struct ScanResult {
    pub symbol: String,
    pub sector: Option<String>,
    pub verdicts: Vec<Verdict>,
}

impl ScanResult {
    /// At least one non-informational predicate matched.
    pub fn is_match(&self) -> bool {
        self.verdicts
            .iter()
            .any(|v| v.matched && !v.pattern.is_informational())
    }
}

/// Error from scanning a single instrument
#[derive(Debug, Clone)]
pub struct ScanError {
    pub symbol: String,
    pub error: PatternError,
}

/// Parallel scanning of multiple instruments
///
/// Each worker owns one series, annotates it and evaluates the candidate
/// picked by `source`. A failing symbol is reported, never fatal to the batch.
pub fn scan_parallel<I>(engine: &ScanEngine, instruments: I, source: &CandidateSource) -> BatchReport
where
    I: IntoParallelIterator<Item = Series>,
{
    let results: Vec<_> = instruments
        .into_par_iter()
        .map(|series| {
            let symbol = series.symbol().to_string();
            engine
                .scan_owned(series, source)
                .map_err(|error| ScanError { symbol, error })
        })
        .collect();

    let mut report = BatchReport::default();

    for result in results {
        match result {
            Ok(r) => report.results.push(r),
            Err(e) => {
                warn!(symbol = %e.symbol, error = %e.error, "scan failed");
                report.errors.push(e);
            }
        }
    }

    info!(
        scanned = report.scanned(),
        matched = report.matched_count(),
        failed = report.errors.len(),
        "batch scan finished"
    );
    report
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use bar::Price;
    use chrono::{Days, NaiveDate};

    fn rows(n: u64) -> Vec<RawBar> {
        let first = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        (0..n)
            .map(|i| {
                let close = 50_000 + (i as Price * 311) % 4_000;
                RawBar {
                    date: first + Days::new(i),
                    open: close - 200,
                    high: close + 600,
                    low: close - 600,
                    close,
                    volume: 1_000 + i,
                    adj_close: None,
                }
            })
            .collect()
    }

    #[test]
    fn test_ratio_validation() {
        assert!(Ratio::new(0.0).is_ok());
        assert!(Ratio::new(1.0).is_ok());
        assert!(Ratio::new(0.5).is_ok());
        assert!(Ratio::new(-0.1).is_err());
        assert!(Ratio::new(1.1).is_err());
        assert!(Ratio::new(f64::NAN).is_err());
        assert!(Ratio::new(f64::INFINITY).is_err());
    }

    #[test]
    fn test_period_validation() {
        assert!(Period::new(1).is_ok());
        assert!(Period::new(100).is_ok());
        assert!(Period::new(0).is_err());
    }

    #[test]
    fn test_pattern_id_direction() {
        assert_eq!(PatternId("DOUBLE_BOTTOM").typical_direction(), Some(Direction::Bullish));
        assert_eq!(PatternId("CHANGE").typical_direction(), Some(Direction::Neutral));
        assert_eq!(PatternId("UNKNOWN").typical_direction(), None);
        assert!(PatternId("CHANGE").is_informational());
        assert!(!PatternId("BREAKOUT").is_informational());
    }

    #[test]
    fn test_engine_builder() {
        let engine = EngineBuilder::new().with_all_defaults().build().unwrap();
        assert_eq!(engine.detectors().len(), 16);

        let mut ids: Vec<_> = engine.detectors().iter().map(|d| d.id()).collect();
        ids.dedup();
        assert_eq!(ids.len(), 16);
    }

    #[test]
    fn test_builder_rejects_invalid_detector() {
        let bad = BuiltinDetector::PullbackDoubleBottom(PullbackDoubleBottomDetector {
            min_days: Period::new(30).unwrap(),
            max_days: Period::new(10).unwrap(),
        });
        assert!(EngineBuilder::new().add_checked(bad.clone()).is_err());
        assert!(EngineBuilder::new().add(bad).build().is_err());
    }

    #[test]
    fn test_builder_rejects_invalid_params() {
        let mut params = ScanParams::default();
        params.max_window = Period::new(2).unwrap();
        assert!(EngineBuilder::new().params(params).build().is_err());
    }

    #[test]
    fn test_empty_series() {
        let engine = EngineBuilder::new().with_all_defaults().build().unwrap();
        let mut series = engine.load_series("EMPTY", None, Vec::new());
        assert!(matches!(
            engine.scan(&mut series, &CandidateSource::Latest),
            Err(PatternError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_change_always_matches() {
        let engine = EngineBuilder::new()
            .add(BuiltinDetector::Change(ChangeDetector::with_defaults()))
            .build()
            .unwrap();
        let series = engine.load_series("ONE", None, rows(1));
        let verdicts = engine.evaluate(&series, &CandidateSource::Latest).unwrap();
        assert_eq!(verdicts.len(), 1);
        assert!(verdicts[0].matched);
        assert!(verdicts[0].hits.is_empty());
    }

    #[test]
    fn test_short_history_is_no_match() {
        let engine = EngineBuilder::new()
            .add(BuiltinDetector::YearLowDoubleBottom(
                YearLowDoubleBottomDetector::with_defaults(),
            ))
            .build()
            .unwrap();
        let series = engine.load_series("SHORT", None, rows(30));
        let verdicts = engine.evaluate(&series, &CandidateSource::Latest).unwrap();
        assert!(!verdicts[0].matched);
    }

    #[test]
    fn test_only_patterns_and_matched_only() {
        let engine = EngineBuilder::new()
            .with_all_defaults()
            .only_patterns([PatternId("CHANGE"), PatternId("SUPPORT")])
            .build()
            .unwrap();
        let series = engine.load_series("F", None, rows(40));
        let verdicts = engine.evaluate(&series, &CandidateSource::Latest).unwrap();
        assert_eq!(verdicts.len(), 2);

        let engine = EngineBuilder::new()
            .with_momentum_defaults()
            .only_patterns([PatternId("CHANGE"), PatternId("LOW_VOLUME")])
            .matched_only(true)
            .build()
            .unwrap();
        let verdicts = engine.evaluate(&series, &CandidateSource::Latest).unwrap();
        assert_eq!(verdicts.len(), 1);
        assert_eq!(verdicts[0].pattern, PatternId("CHANGE"));
    }

    #[test]
    fn test_scan_parallel_collects_errors() {
        let engine = EngineBuilder::new().with_all_defaults().build().unwrap();
        let params = engine.params().clone();
        let missing = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap();
        let batch = vec![
            Series::from_raw("AAA", None, rows(80), &params),
            Series::from_raw("BBB", Some("Energy".into()), rows(120), &params),
        ];

        let report = scan_parallel(&engine, batch.clone(), &CandidateSource::Latest);
        assert_eq!(report.results.len(), 2);
        assert!(report.errors.is_empty());
        assert!(report.results.iter().all(|r| r.verdicts.len() == 16));

        let report = scan_parallel(&engine, batch, &CandidateSource::Date(missing));
        assert_eq!(report.errors.len(), 2);
        assert!(report.to_string().ends_with("0/0 symbols matched, 2 failed"));
    }
}
