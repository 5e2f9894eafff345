//! Trend, weekly and volume detectors
//!
//! Patterns: STRONG_UPTREND, WEEK_UP, WEEK_REVERSAL, LOW_VOLUME,
//! HIGH_VOLUME, CHANGE
//!
//! None of these look at pivots, so a match carries no hits.

use super::helpers::current_and_previous_week;
use crate::{
    scanner::{PivotHit, ScanContext},
    PatternDetector, PatternError, PatternId, Period, Ratio, Result,
};

impl_with_defaults!(
    StrongUptrendDetector,
    WeekUpDetector,
    WeekReversalDetector,
    LowVolumeDetector,
    HighVolumeDetector,
    ChangeDetector,
);

// ============================================================
// TREND
// ============================================================

/// Close back above the SMA-20 after a short dip below it
#[derive(Debug, Clone, Copy)]
pub struct StrongUptrendDetector {
    pub max_days_below: Period,
}

impl Default for StrongUptrendDetector {
    fn default() -> Self {
        Self {
            max_days_below: Period::new_const(4),
        }
    }
}

impl PatternDetector for StrongUptrendDetector {
    fn id(&self) -> PatternId {
        PatternId("STRONG_UPTREND")
    }

    fn min_history(&self) -> usize {
        2
    }

    fn detect(&self, ctx: &ScanContext<'_>) -> Option<Vec<PivotHit>> {
        let cand = ctx.cand();
        let sma20 = cand.sma(20)?;
        if cand.close <= sma20 {
            return None;
        }
        if let Some(sma50) = cand.sma(50) {
            if sma20 < sma50 {
                return None;
            }
        }

        let history = ctx.history();
        let below = history
            .iter()
            .take_while(|bar| bar.sma(20).is_some_and(|avg| bar.close < avg))
            .count();
        if below == 0 || below > self.max_days_below.get() {
            return None;
        }

        // The dip must start from a close at or above the average
        let anchor = history.get(below)?;
        let avg = anchor.sma(20)?;
        (anchor.close >= avg).then(Vec::new)
    }
}

// ============================================================
// WEEKS
// ============================================================

/// Current week trades above the previous week's high
#[derive(Debug, Clone, Copy, Default)]
pub struct WeekUpDetector;

impl PatternDetector for WeekUpDetector {
    fn id(&self) -> PatternId {
        PatternId("WEEK_UP")
    }

    fn min_history(&self) -> usize {
        1
    }

    fn detect(&self, ctx: &ScanContext<'_>) -> Option<Vec<PivotHit>> {
        let (current, previous) = current_and_previous_week(ctx)?;
        (current.close > previous.high).then(Vec::new)
    }
}

/// Red week followed by a green week closing above its open
#[derive(Debug, Clone, Copy, Default)]
pub struct WeekReversalDetector;

impl PatternDetector for WeekReversalDetector {
    fn id(&self) -> PatternId {
        PatternId("WEEK_REVERSAL")
    }

    fn min_history(&self) -> usize {
        1
    }

    fn detect(&self, ctx: &ScanContext<'_>) -> Option<Vec<PivotHit>> {
        let (current, previous) = current_and_previous_week(ctx)?;
        let reversal = previous.is_red() && current.is_green() && current.close > previous.open;
        reversal.then(Vec::new)
    }
}

// ============================================================
// VOLUME
// ============================================================

/// Volume well under the 20-day average
#[derive(Debug, Clone, Copy)]
pub struct LowVolumeDetector {
    pub max_ratio: Ratio,
}

impl Default for LowVolumeDetector {
    fn default() -> Self {
        Self {
            max_ratio: Ratio::new_const(0.5),
        }
    }
}

impl PatternDetector for LowVolumeDetector {
    fn id(&self) -> PatternId {
        PatternId("LOW_VOLUME")
    }

    fn min_history(&self) -> usize {
        0
    }

    fn detect(&self, ctx: &ScanContext<'_>) -> Option<Vec<PivotHit>> {
        let cand = ctx.cand();
        let average = cand.vma(20)? as f64;
        ((cand.volume as f64) < average * self.max_ratio.get()).then(Vec::new)
    }
}

/// Volume a multiple of the 20-day average
#[derive(Debug, Clone, Copy)]
pub struct HighVolumeDetector {
    pub min_multiple: f64,
}

impl Default for HighVolumeDetector {
    fn default() -> Self {
        Self { min_multiple: 2.0 }
    }
}

impl PatternDetector for HighVolumeDetector {
    fn id(&self) -> PatternId {
        PatternId("HIGH_VOLUME")
    }

    fn min_history(&self) -> usize {
        0
    }

    fn detect(&self, ctx: &ScanContext<'_>) -> Option<Vec<PivotHit>> {
        let cand = ctx.cand();
        let average = cand.vma(20)? as f64;
        (cand.volume as f64 > average * self.min_multiple).then(Vec::new)
    }

    fn validate_config(&self) -> Result<()> {
        if !self.min_multiple.is_finite() || self.min_multiple < 1.0 {
            return Err(PatternError::OutOfRange {
                field: "min_multiple",
                value: self.min_multiple,
                min: 1.0,
                max: f64::INFINITY,
            });
        }
        Ok(())
    }
}

// ============================================================
// CHANGE
// ============================================================

/// Always matches; the verdict's summary is the report
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeDetector;

impl PatternDetector for ChangeDetector {
    fn id(&self) -> PatternId {
        PatternId("CHANGE")
    }

    fn min_history(&self) -> usize {
        0
    }

    fn detect(&self, _ctx: &ScanContext<'_>) -> Option<Vec<PivotHit>> {
        Some(Vec::new())
    }
}
