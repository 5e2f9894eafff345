//! Pattern scanner primitives
//!
//! Both primitives walk the history older than the candidate, newest first.
//! The walk starts with a trend phase: the bars right before the candidate
//! must show a confirmed run away from the candidate's level (a pullback
//! above it for support, a dip below it for breakouts) before any pivot
//! is allowed to count. Only bars after that run are tested as pivots.

use chrono::NaiveDate;
use serde::Serialize;

use crate::{
    bar::{fraction_of, Bar, PivotKind, Price},
    params::ScanParams,
    series::{Candidate, Series},
};

/// Everything a predicate needs to evaluate one candidate against one series
#[derive(Debug, Clone, Copy)]
pub struct ScanContext<'a> {
    pub series: &'a Series,
    pub candidate: &'a Candidate,
    pub params: &'a ScanParams,
    /// First series index strictly older than the candidate
    pub start: usize,
}

impl<'a> ScanContext<'a> {
    pub fn new(series: &'a Series, candidate: &'a Candidate, params: &'a ScanParams) -> Self {
        Self {
            series,
            candidate,
            params,
            start: series.older_than(candidate.bar.date),
        }
    }

    #[inline]
    pub fn cand(&self) -> &'a Bar {
        &self.candidate.bar
    }

    /// Bars older than the candidate, newest first.
    #[inline]
    pub fn history(&self) -> &'a [Bar] {
        &self.series.bars()[self.start..]
    }

    /// The bar right before the candidate.
    #[inline]
    pub fn prior(&self) -> Option<&'a Bar> {
        self.history().first()
    }

    /// The pivot bar a hit refers to.
    #[inline]
    pub fn pivot_bar(&self, hit: &PivotHit) -> Option<&'a Bar> {
        self.history().get(hit.elapsed.checked_sub(1)?)
    }
}

/// One pivot the candidate retested or broke through
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PivotHit {
    pub date: NaiveDate,
    pub kind: PivotKind,
    pub reference: Price,
    pub height: Price,
    /// Bars between the candidate and the pivot, 1 = the prior bar
    pub elapsed: usize,
    pub is_double_bottom: bool,
}

/// Confirmation state of the trend phase
#[derive(Debug, Default)]
struct TrendRun {
    confirms: usize,
    extreme: Price,
    established: bool,
}

/// Pivots of `kinds` whose level the candidate's low (or body bottom) retests.
///
/// A hit is a double bottom when the lowest low of the whole walk, candidate
/// included, is the pivot's own low or the candidate's low.
pub fn check_support(ctx: &ScanContext<'_>, kinds: &[PivotKind]) -> Vec<PivotHit> {
    let cand = ctx.cand();
    let params = ctx.params;
    let run = params.confirm_run();
    let floor = cand.low;
    let needed = fraction_of(floor, params.pullback_margin);

    let mut trend = TrendRun {
        extreme: floor,
        ..Default::default()
    };
    let mut lowest = cand.low;
    let mut hits = Vec::new();

    for (offset, bar) in ctx.history().iter().take(params.lookback.get()).enumerate() {
        lowest = lowest.min(bar.low);

        if !trend.established {
            if bar.low < floor {
                return hits;
            }
            if bar.high > floor {
                trend.confirms += 1;
                trend.extreme = trend.extreme.max(bar.high);
            }
            trend.established = trend.confirms >= run && trend.extreme - floor >= needed;
            continue;
        }

        let elapsed = offset + 1;
        for &kind in kinds {
            let Some((reference, height)) = significant(bar, kind, elapsed, params) else {
                continue;
            };
            let band = fraction_of(reference, params.tolerance);
            let touches = (cand.low - reference).abs() <= band
                || (cand.second_low() - reference).abs() <= band;
            if touches {
                hits.push(PivotHit {
                    date: bar.date,
                    kind,
                    reference,
                    height,
                    elapsed,
                    is_double_bottom: lowest == bar.low || lowest == cand.low,
                });
            }
        }
    }

    hits
}

/// Pivots of `kinds` the candidate closed clear above, having been below on the prior bar.
pub fn check_breakout(ctx: &ScanContext<'_>, kinds: &[PivotKind]) -> Vec<PivotHit> {
    let cand = ctx.cand();
    let params = ctx.params;
    let run = params.confirm_run();
    let ceiling = cand.high;
    let needed = fraction_of(ceiling, params.pullback_margin);
    let mut hits = Vec::new();

    let Some(prior) = ctx.prior() else {
        return hits;
    };

    let mut trend = TrendRun {
        extreme: ceiling,
        ..Default::default()
    };

    for (offset, bar) in ctx.history().iter().take(params.lookback.get()).enumerate() {
        if !trend.established {
            if bar.high > ceiling {
                return hits;
            }
            if bar.low < ceiling {
                trend.confirms += 1;
                trend.extreme = trend.extreme.min(bar.low);
            }
            trend.established = trend.confirms >= run && ceiling - trend.extreme >= needed;
            continue;
        }

        let elapsed = offset + 1;
        for &kind in kinds {
            let Some((reference, height)) = significant(bar, kind, elapsed, params) else {
                continue;
            };
            let clears = cand.close >= reference + fraction_of(reference, params.breakout_margin);
            if clears && prior.close < reference {
                hits.push(PivotHit {
                    date: bar.date,
                    kind,
                    reference,
                    height,
                    elapsed,
                    is_double_bottom: false,
                });
            }
        }
    }

    hits
}

/// Reference and height of a `kind` pivot on `bar` still significant after `elapsed` bars.
fn significant(
    bar: &Bar,
    kind: PivotKind,
    elapsed: usize,
    params: &ScanParams,
) -> Option<(Price, Price)> {
    if !bar.pivots.contains(kind) {
        return None;
    }
    let reference = bar.reference(kind);
    let height = bar.height(kind);
    (height >= params.significance(reference, elapsed)).then_some((reference, height))
}

// ============================================================
// TESTS
// ============================================================
