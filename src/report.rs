//! Verdicts and their human-readable rendering
//!
//! Every evaluated predicate yields a [`Verdict`]; a batch of symbols yields a
//! [`BatchReport`]. Both render to the one-line-per-alert text format and
//! serialize with serde for machine consumers.

use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

use crate::{
    bar::{percent, Bar, CandleColor, CandleTrend, DisplayPrice, Price},
    indicators::MoneyFlow,
    scanner::PivotHit,
    Direction, PatternId, ScanError, ScanResult,
};

// ============================================================
// SUMMARY
// ============================================================

/// Descriptive numbers of the candidate bar
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub close: Price,
    /// Change vs. the prior close, percent
    pub change_pct: Option<f64>,
    pub volume: u64,
    /// Volume over VMA-10 / VMA-20
    pub volume_vs_vma10: Option<f64>,
    pub volume_vs_vma20: Option<f64>,
    pub candle_color: CandleColor,
    pub candle_trend: CandleTrend,
    /// Body and wicks as percent of the range
    pub body_pct: f64,
    pub upper_wick_pct: f64,
    pub lower_wick_pct: f64,
    pub mfi: u32,
    pub money_flow: MoneyFlow,
}

impl Summary {
    pub fn of(cand: &Bar, prior: Option<&Bar>) -> Self {
        let range = cand.range();
        let ratio = |avg: Option<u64>| avg.map(|avg| cand.volume as f64 / avg as f64);
        Self {
            close: cand.close,
            change_pct: prior
                .filter(|p| p.close != 0)
                .map(|p| percent(cand.close - p.close, p.close)),
            volume: cand.volume,
            volume_vs_vma10: ratio(cand.vma(10)),
            volume_vs_vma20: ratio(cand.vma(20)),
            candle_color: cand.candle_color,
            candle_trend: cand.candle_trend,
            body_pct: percent(cand.body(), range),
            upper_wick_pct: percent(cand.upper_wick(), range),
            lower_wick_pct: percent(cand.lower_wick(), range),
            mfi: cand.mfi,
            money_flow: MoneyFlow::of(cand),
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "close {}", DisplayPrice(self.close))?;
        if let Some(change) = self.change_pct {
            write!(f, " {change:+.2}%")?;
        }
        write!(f, " vol {}", self.volume)?;
        if let Some(r) = self.volume_vs_vma10 {
            write!(f, " {r:.2}x/10d")?;
        }
        if let Some(r) = self.volume_vs_vma20 {
            write!(f, " {r:.2}x/20d")?;
        }
        write!(
            f,
            " {}/{} body {:.0}% up {:.0}% low {:.0}% mfi {:.2}",
            self.candle_color.as_str(),
            self.candle_trend.as_str(),
            self.body_pct,
            self.upper_wick_pct,
            self.lower_wick_pct,
            f64::from(self.mfi) / 100.0
        )?;
        let flow = &self.money_flow;
        write!(
            f,
            " flow {:+} in {:.0}% out {:.0}%",
            flow.net, flow.in_pct, flow.out_pct
        )
    }
}

// ============================================================
// VERDICT
// ============================================================

/// Outcome of one predicate for one candidate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub pattern: PatternId,
    pub direction: Direction,
    pub matched: bool,
    pub date: NaiveDate,
    pub summary: Summary,
    pub hits: Vec<PivotHit>,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.matched { "MATCH" } else { "-" };
        write!(f, "{} {:<22} {:<5} {}", self.date, self.pattern.as_str(), mark, self.summary)?;
        for hit in &self.hits {
            write!(
                f,
                "\n    {} {} at {} height {} {}d",
                hit.date,
                hit.kind.as_str(),
                DisplayPrice(hit.reference),
                DisplayPrice(hit.height),
                hit.elapsed
            )?;
            if hit.is_double_bottom {
                f.write_str(" double-bottom")?;
            }
        }
        Ok(())
    }
}

/// One alert block: the symbol followed by the rendered verdict.
pub fn format_verdict(symbol: &str, verdict: &Verdict) -> String {
    format!("{symbol:<8} {verdict}")
}

// ============================================================
// BATCH
// ============================================================

/// Everything a batch scan produced
#[derive(Debug, Default)]
pub struct BatchReport {
    pub results: Vec<ScanResult>,
    pub errors: Vec<ScanError>,
}

impl BatchReport {
    /// Symbols with at least one non-informational match.
    pub fn matched_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_match()).count()
    }

    /// Symbols that were evaluated; failed symbols are only counted in `errors`.
    #[inline]
    pub fn scanned(&self) -> usize {
        self.results.len()
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for result in &self.results {
            for verdict in result.verdicts.iter().filter(|v| v.matched) {
                writeln!(f, "{}", format_verdict(&result.symbol, verdict))?;
            }
        }
        for error in &self.errors {
            writeln!(f, "{:<8} error: {}", error.symbol, error.error)?;
        }
        write!(
            f,
            "{}/{} symbols matched, {} failed",
            self.matched_count(),
            self.scanned(),
            self.errors.len()
        )
    }
}

// ============================================================
// TESTS
// ============================================================
