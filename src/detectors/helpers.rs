//! Helpers shared across the detector modules
//!
//! Rolling extremes over the history before a candidate and the weekly
//! aggregation used by the week predicates.

use crate::{
    bar::{Bar, PivotKind, Price},
    scanner::{check_support, PivotHit, ScanContext},
};

// ============================================================
// CONSTANTS
// ============================================================

/// Kinds a double bottom can form on
pub const SUPPORT_KINDS: [PivotKind; 3] =
    [PivotKind::Low, PivotKind::SecondLow, PivotKind::BigUpDay];

pub const RESISTANCE_KINDS: [PivotKind; 2] = [PivotKind::High, PivotKind::SecondHigh];

/// History a pivot predicate needs at default tunables: a confirming run plus the pivot.
pub const MIN_PIVOT_HISTORY: usize = 5;

// ============================================================
// ROLLING EXTREMES
// ============================================================

/// Highest high of the first `n` bars, `None` if fewer than `n` exist.
pub fn highest_high(bars: &[Bar], n: usize) -> Option<Price> {
    bars.get(..n)?.iter().map(|b| b.high).max()
}

/// Lowest low of the first `n` bars, `None` if fewer than `n` exist.
pub fn lowest_low(bars: &[Bar], n: usize) -> Option<Price> {
    bars.get(..n)?.iter().map(|b| b.low).min()
}

/// Each of the first `days` bars closed above the bar before it.
pub fn closes_rising(bars: &[Bar], days: usize) -> bool {
    bars.len() > days && bars[..=days].windows(2).all(|w| w[0].close > w[1].close)
}

/// Support hits flagged as double bottoms.
pub fn double_bottoms(ctx: &ScanContext<'_>) -> Vec<PivotHit> {
    let mut hits = check_support(ctx, &SUPPORT_KINDS);
    hits.retain(|h| h.is_double_bottom);
    hits
}

// ============================================================
// WEEKS
// ============================================================

/// OHLC of a run of bars within one calendar week
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekCandle {
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
}

impl WeekCandle {
    fn from_bar(bar: &Bar) -> Self {
        Self {
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
        }
    }

    /// Extend backward in time with an older bar of the same week.
    fn push_older(&mut self, bar: &Bar) {
        self.open = bar.open;
        self.high = self.high.max(bar.high);
        self.low = self.low.min(bar.low);
    }

    #[inline]
    pub fn is_green(&self) -> bool {
        self.close > self.open
    }

    #[inline]
    pub fn is_red(&self) -> bool {
        self.close < self.open
    }
}

/// `older` belongs to an earlier week than `newer`.
pub fn starts_new_week(older: &Bar, newer: &Bar) -> bool {
    older.weekday.num_days_from_monday() >= newer.weekday.num_days_from_monday()
        || (newer.date - older.date).num_days() >= 7
}

/// The candidate's week so far and the full week before it.
pub fn current_and_previous_week(ctx: &ScanContext<'_>) -> Option<(WeekCandle, WeekCandle)> {
    let cand = ctx.cand();
    let history = ctx.history();

    let mut current = WeekCandle::from_bar(cand);
    let mut newer = cand;
    let mut split = history.len();
    for (i, bar) in history.iter().enumerate() {
        if starts_new_week(bar, newer) {
            split = i;
            break;
        }
        current.push_older(bar);
        newer = bar;
    }

    let first = history.get(split)?;
    let mut previous = WeekCandle::from_bar(first);
    let mut newer = first;
    for bar in &history[split + 1..] {
        if starts_new_week(bar, newer) {
            break;
        }
        previous.push_older(bar);
        newer = bar;
    }

    Some((current, previous))
}

// ============================================================
// TESTS
// ============================================================
