//! Support retest and double-bottom detectors
//!
//! Patterns: SUPPORT, DOUBLE_BOTTOM, PULLBACK_DOUBLE_BOTTOM,
//! MFI_DOUBLE_BOTTOM, YEAR_LOW_DOUBLE_BOTTOM
//!
//! All of them are built on [`check_support`]; the double-bottom variants
//! narrow its hits down further.

use super::helpers::{double_bottoms, lowest_low, MIN_PIVOT_HISTORY};
use crate::{
    bar::{PivotKind, MFI_MAX},
    scanner::{check_support, PivotHit, ScanContext},
    PatternDetector, PatternError, PatternId, Period, Result,
};

impl_with_defaults!(
    SupportDetector,
    DoubleBottomDetector,
    PullbackDoubleBottomDetector,
    MoneyFlowDoubleBottomDetector,
    YearLowDoubleBottomDetector,
);

/// Keep `hits` as a match if any survive.
#[inline]
fn non_empty(hits: Vec<PivotHit>) -> Option<Vec<PivotHit>> {
    (!hits.is_empty()).then_some(hits)
}

// ============================================================
// SUPPORT
// ============================================================

/// Candidate retests any pivot level: support, former resistance or a big-up-day anchor
#[derive(Debug, Clone, Copy, Default)]
pub struct SupportDetector;

impl PatternDetector for SupportDetector {
    fn id(&self) -> PatternId {
        PatternId("SUPPORT")
    }

    fn min_history(&self) -> usize {
        MIN_PIVOT_HISTORY
    }

    fn detect(&self, ctx: &ScanContext<'_>) -> Option<Vec<PivotHit>> {
        non_empty(check_support(ctx, &PivotKind::ALL))
    }
}

// ============================================================
// DOUBLE BOTTOMS
// ============================================================

/// Support retest without a lower low in between
#[derive(Debug, Clone, Copy, Default)]
pub struct DoubleBottomDetector;

impl PatternDetector for DoubleBottomDetector {
    fn id(&self) -> PatternId {
        PatternId("DOUBLE_BOTTOM")
    }

    fn min_history(&self) -> usize {
        MIN_PIVOT_HISTORY
    }

    fn detect(&self, ctx: &ScanContext<'_>) -> Option<Vec<PivotHit>> {
        non_empty(double_bottoms(ctx))
    }
}

/// Double bottom whose first low lies a pullback's distance back
#[derive(Debug, Clone, Copy)]
pub struct PullbackDoubleBottomDetector {
    pub min_days: Period,
    pub max_days: Period,
}

impl Default for PullbackDoubleBottomDetector {
    fn default() -> Self {
        Self {
            min_days: Period::new_const(10),
            max_days: Period::new_const(25),
        }
    }
}

impl PatternDetector for PullbackDoubleBottomDetector {
    fn id(&self) -> PatternId {
        PatternId("PULLBACK_DOUBLE_BOTTOM")
    }

    fn min_history(&self) -> usize {
        self.min_days.get()
    }

    fn detect(&self, ctx: &ScanContext<'_>) -> Option<Vec<PivotHit>> {
        let days = self.min_days.get()..=self.max_days.get();
        let mut hits = double_bottoms(ctx);
        hits.retain(|h| days.contains(&h.elapsed));
        non_empty(hits)
    }

    fn validate_config(&self) -> Result<()> {
        if self.min_days > self.max_days {
            return Err(PatternError::InvalidConfig(format!(
                "min_days ({}) > max_days ({})",
                self.min_days.get(),
                self.max_days.get()
            )));
        }
        Ok(())
    }
}

/// Double bottom with money flow clearly stronger than at the first low
#[derive(Debug, Clone, Copy)]
pub struct MoneyFlowDoubleBottomDetector {
    /// Required MFI rise, in hundredths of a point
    pub min_mfi_rise: u32,
}

impl Default for MoneyFlowDoubleBottomDetector {
    fn default() -> Self {
        Self { min_mfi_rise: 1_000 }
    }
}

impl PatternDetector for MoneyFlowDoubleBottomDetector {
    fn id(&self) -> PatternId {
        PatternId("MFI_DOUBLE_BOTTOM")
    }

    fn min_history(&self) -> usize {
        MIN_PIVOT_HISTORY
    }

    fn detect(&self, ctx: &ScanContext<'_>) -> Option<Vec<PivotHit>> {
        let cand_mfi = ctx.cand().mfi;
        let mut hits = double_bottoms(ctx);
        hits.retain(|h| {
            ctx.pivot_bar(h)
                .is_some_and(|pivot| cand_mfi >= pivot.mfi.saturating_add(self.min_mfi_rise))
        });
        non_empty(hits)
    }

    fn validate_config(&self) -> Result<()> {
        if self.min_mfi_rise > MFI_MAX {
            return Err(PatternError::OutOfRange {
                field: "min_mfi_rise",
                value: f64::from(self.min_mfi_rise),
                min: 0.0,
                max: f64::from(MFI_MAX),
            });
        }
        Ok(())
    }
}

/// Double bottom whose first low is the lowest low of the past year
#[derive(Debug, Clone, Copy)]
pub struct YearLowDoubleBottomDetector {
    pub period: Period,
}

impl Default for YearLowDoubleBottomDetector {
    fn default() -> Self {
        Self {
            period: Period::new_const(250),
        }
    }
}

impl PatternDetector for YearLowDoubleBottomDetector {
    fn id(&self) -> PatternId {
        PatternId("YEAR_LOW_DOUBLE_BOTTOM")
    }

    fn min_history(&self) -> usize {
        self.period.get()
    }

    fn detect(&self, ctx: &ScanContext<'_>) -> Option<Vec<PivotHit>> {
        let year_low = lowest_low(ctx.history(), self.period.get())?;
        let mut hits = double_bottoms(ctx);
        hits.retain(|h| ctx.pivot_bar(h).is_some_and(|pivot| pivot.low == year_low));
        non_empty(hits)
    }
}
