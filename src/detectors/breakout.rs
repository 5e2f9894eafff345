//! Breakout detectors
//!
//! Patterns: BREAKOUT, SECOND_BREAKOUT, TREND_BREAKOUT, STRONG_BREAKOUT,
//! STRONG_BODY_BREAKOUT

use super::helpers::{closes_rising, highest_high, MIN_PIVOT_HISTORY, RESISTANCE_KINDS};
use crate::{
    bar::{fraction_of, PivotKind},
    indicators::mean,
    scanner::{check_breakout, PivotHit, ScanContext},
    PatternDetector, PatternError, PatternId, Period, Ratio, Result,
};

impl_with_defaults!(
    BreakoutDetector,
    SecondBreakoutDetector,
    TrendBreakoutDetector,
    StrongBreakoutDetector,
    StrongBodyBreakoutDetector,
);

// ============================================================
// PIVOT BREAKOUTS
// ============================================================

/// Candidate closes clear above a resistance pivot it was below yesterday
#[derive(Debug, Clone, Copy, Default)]
pub struct BreakoutDetector;

impl PatternDetector for BreakoutDetector {
    fn id(&self) -> PatternId {
        PatternId("BREAKOUT")
    }

    fn min_history(&self) -> usize {
        MIN_PIVOT_HISTORY
    }

    fn detect(&self, ctx: &ScanContext<'_>) -> Option<Vec<PivotHit>> {
        let hits = check_breakout(ctx, &RESISTANCE_KINDS);
        (!hits.is_empty()).then_some(hits)
    }
}

/// Breakout after several closes below the average recent support level
#[derive(Debug, Clone, Copy)]
pub struct SecondBreakoutDetector {
    /// Bars searched for support pivots
    pub support_lookback: Period,
    /// Closes that must sit below the support average before the candidate
    pub below_days: Period,
}

impl Default for SecondBreakoutDetector {
    fn default() -> Self {
        Self {
            support_lookback: Period::new_const(60),
            below_days: Period::new_const(5),
        }
    }
}

impl PatternDetector for SecondBreakoutDetector {
    fn id(&self) -> PatternId {
        PatternId("SECOND_BREAKOUT")
    }

    fn min_history(&self) -> usize {
        self.below_days.get().max(MIN_PIVOT_HISTORY)
    }

    fn detect(&self, ctx: &ScanContext<'_>) -> Option<Vec<PivotHit>> {
        let hits = check_breakout(ctx, &RESISTANCE_KINDS);
        if hits.is_empty() {
            return None;
        }

        let history = ctx.history();
        let recent = &history[..history.len().min(self.support_lookback.get())];
        let levels: Vec<_> = recent
            .iter()
            .flat_map(|bar| {
                [PivotKind::Low, PivotKind::SecondLow]
                    .into_iter()
                    .filter(|kind| bar.pivots.contains(*kind))
                    .map(|kind| bar.reference(kind))
            })
            .collect();
        if levels.is_empty() {
            return None;
        }
        let average = mean(levels);

        let below = history.get(..self.below_days.get())?;
        let stayed_below = below.iter().all(|bar| bar.close < average);
        (stayed_below && ctx.cand().close > average).then_some(hits)
    }
}

// ============================================================
// ROLLING-HIGH BREAKOUTS
// ============================================================

/// Close above the rolling high after a clean run-up with a flat SMA-20
#[derive(Debug, Clone, Copy)]
pub struct TrendBreakoutDetector {
    pub high_period: Period,
    /// Consecutive higher closes right before the candidate
    pub rising_days: Period,
    /// Bars over which the SMA-20 slope is measured
    pub slope_days: Period,
    /// Maximum SMA-20 move over `slope_days`, as a fraction
    pub max_slope: Ratio,
}

impl Default for TrendBreakoutDetector {
    fn default() -> Self {
        Self {
            high_period: Period::new_const(40),
            rising_days: Period::new_const(3),
            slope_days: Period::new_const(10),
            max_slope: Ratio::new_const(0.02),
        }
    }
}

impl PatternDetector for TrendBreakoutDetector {
    fn id(&self) -> PatternId {
        PatternId("TREND_BREAKOUT")
    }

    fn min_history(&self) -> usize {
        self.high_period
            .get()
            .max(self.rising_days.get() + 1)
            .max(self.slope_days.get() + 1)
    }

    fn detect(&self, ctx: &ScanContext<'_>) -> Option<Vec<PivotHit>> {
        let history = ctx.history();
        let high = highest_high(history, self.high_period.get())?;
        if ctx.cand().close <= high || !closes_rising(history, self.rising_days.get()) {
            return None;
        }

        let now = history.first()?.sma(20)?;
        let then = history.get(self.slope_days.get())?.sma(20)?;
        ((now - then).abs() <= fraction_of(then, self.max_slope)).then(Vec::new)
    }
}

/// Close above the rolling high with no resistance pivot just below the close
#[derive(Debug, Clone, Copy)]
pub struct StrongBreakoutDetector {
    pub high_period: Period,
    /// Bars checked for nearby resistance
    pub recent_days: Period,
    /// How close to the candidate's close a resistance level may sit
    pub proximity: Ratio,
}

impl Default for StrongBreakoutDetector {
    fn default() -> Self {
        Self {
            high_period: Period::new_const(40),
            recent_days: Period::new_const(5),
            proximity: Ratio::new_const(0.007),
        }
    }
}

impl PatternDetector for StrongBreakoutDetector {
    fn id(&self) -> PatternId {
        PatternId("STRONG_BREAKOUT")
    }

    fn min_history(&self) -> usize {
        self.high_period.get().max(self.recent_days.get())
    }

    fn detect(&self, ctx: &ScanContext<'_>) -> Option<Vec<PivotHit>> {
        let cand = ctx.cand();
        let history = ctx.history();
        let high = highest_high(history, self.high_period.get())?;
        if cand.close <= high {
            return None;
        }

        let limit = cand.close - fraction_of(cand.close, self.proximity);
        let recent = &history[..history.len().min(self.recent_days.get())];
        let crowded = recent.iter().any(|bar| {
            RESISTANCE_KINDS
                .into_iter()
                .any(|kind| bar.pivots.contains(kind) && bar.reference(kind) >= limit)
        });
        (!crowded).then(Vec::new)
    }

    fn validate_config(&self) -> Result<()> {
        if self.recent_days > self.high_period {
            return Err(PatternError::InvalidConfig(
                "recent_days must not exceed high_period".to_string(),
            ));
        }
        Ok(())
    }
}

/// Strong breakout on a wide green candle
#[derive(Debug, Clone, Copy)]
pub struct StrongBodyBreakoutDetector {
    pub breakout: StrongBreakoutDetector,
    pub min_body: Ratio,
}

impl Default for StrongBodyBreakoutDetector {
    fn default() -> Self {
        Self {
            breakout: StrongBreakoutDetector::default(),
            min_body: Ratio::new_const(0.7),
        }
    }
}

impl PatternDetector for StrongBodyBreakoutDetector {
    fn id(&self) -> PatternId {
        PatternId("STRONG_BODY_BREAKOUT")
    }

    fn min_history(&self) -> usize {
        self.breakout.min_history()
    }

    fn detect(&self, ctx: &ScanContext<'_>) -> Option<Vec<PivotHit>> {
        let cand = ctx.cand();
        if !cand.is_green() || !cand.body_at_least(self.min_body) {
            return None;
        }
        self.breakout.detect(ctx)
    }

    fn validate_config(&self) -> Result<()> {
        self.breakout.validate_config()
    }
}
