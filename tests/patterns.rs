//! Integration tests for the pivotscan screening engine.
//!
//! Each scenario builds a small hand-shaped price history, runs the full
//! load -> annotate -> evaluate pipeline and checks the resulting verdicts.

use chrono::{Days, NaiveDate};
use pivotscan::prelude::*;

type Ohlc = (Price, Price, Price, Price);

fn first_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
}

/// Raw rows on consecutive calendar days from oldest-first (open, high, low, close).
fn rows_from(ohlc: &[Ohlc], start: NaiveDate) -> Vec<RawBar> {
    ohlc.iter()
        .enumerate()
        .map(|(i, &(open, high, low, close))| RawBar {
            date: start + Days::new(i as u64),
            open,
            high,
            low,
            close,
            volume: 10_000,
            adj_close: None,
        })
        .collect()
}

fn red(mid: Price) -> Ohlc {
    (mid + 1_000, mid + 1_500, mid - 1_500, mid - 1_000)
}

fn green(mid: Price) -> Ohlc {
    (mid - 1_000, mid + 1_500, mid - 1_500, mid + 1_000)
}

fn flat_range(close: Price) -> Ohlc {
    (close, close + 500, close - 500, close)
}

fn engine() -> ScanEngine {
    EngineBuilder::new().with_all_defaults().build().unwrap()
}

fn verdict<'a>(verdicts: &'a [Verdict], id: &str) -> &'a Verdict {
    verdicts
        .iter()
        .find(|v| v.pattern.as_str() == id)
        .unwrap_or_else(|| panic!("no verdict for {id}"))
}

/// Two troughs at 98.5 and 98.9, ten bars apart, between clean descents and rallies.
fn w_bottom() -> Vec<Ohlc> {
    let mut ohlc = Vec::new();
    for mid in (102..=118).rev().step_by(2) {
        ohlc.push(red(mid * 1_000));
    }
    ohlc.push(green(100_000));
    for mid in (102..=110).step_by(2) {
        ohlc.push(green(mid * 1_000));
    }
    for mid in (102..=108).rev().step_by(2) {
        ohlc.push(red(mid * 1_000));
    }
    ohlc.push(green(100_400));
    for mid in (102..=120).step_by(2) {
        ohlc.push(green(mid * 1_000));
    }
    ohlc
}

const FIRST_TROUGH: u64 = 9;
const SECOND_TROUGH: u64 = 19;

/// Rally, resistance day at 110, pullback to 98.5, rally, breakout day, two follow-through days.
fn breakout_run() -> Vec<Ohlc> {
    let mut ohlc = Vec::new();
    for mid in (96..=106).step_by(2) {
        ohlc.push(green(mid * 1_000));
    }
    ohlc.push((107_500, 110_000, 107_000, 109_000));
    for mid in [107, 105, 103, 101] {
        ohlc.push(red(mid * 1_000));
    }
    ohlc.push(red(100_000));
    for mid in [102_000, 104_000, 106_000, 107_500] {
        ohlc.push(green(mid));
    }
    ohlc.push((108_500, 113_500, 108_000, 113_000));
    ohlc.push((113_000, 114_000, 112_600, 113_600));
    ohlc.push((113_600, 114_600, 113_200, 114_200));
    ohlc
}

// ============================================================
// PIVOT + SUPPORT SCENARIOS
// ============================================================

#[test]
fn test_w_bottom_flags_both_troughs() {
    let engine = engine();
    let series = engine.load_series("WWW", None, rows_from(&w_bottom(), first_day()));
    assert_eq!(series.len(), 30);

    for offset in [FIRST_TROUGH, SECOND_TROUGH] {
        let date = first_day() + Days::new(offset);
        let index = series.position(date).unwrap();
        let bar = &series.bars()[index];
        assert!(bar.pivots.contains(PivotKind::Low), "trough on {date} not flagged");
        assert!(bar.height(PivotKind::Low) > 0);
        assert!(!bar.pivots.has_resistance());
    }
}

#[test]
fn test_w_bottom_second_trough_is_double_bottom() {
    let engine = engine();
    let series = engine.load_series("WWW", None, rows_from(&w_bottom(), first_day()));
    let second = first_day() + Days::new(SECOND_TROUGH);
    let first = first_day() + Days::new(FIRST_TROUGH);

    let verdicts = engine
        .evaluate(&series, &CandidateSource::Date(second))
        .unwrap();
    assert_eq!(verdicts.len(), 16);

    let support = verdict(&verdicts, "SUPPORT");
    assert!(support.matched);
    assert_eq!(support.date, second);

    let double = verdict(&verdicts, "DOUBLE_BOTTOM");
    assert!(double.matched);
    let low_hit = double
        .hits
        .iter()
        .find(|h| h.kind == PivotKind::Low)
        .expect("low pivot hit");
    assert_eq!(low_hit.date, first);
    assert_eq!(low_hit.reference, 98_500);
    assert_eq!(low_hit.elapsed, 10);
    assert!(low_hit.is_double_bottom);

    // Ten bars back is inside the pullback window
    assert!(verdict(&verdicts, "PULLBACK_DOUBLE_BOTTOM").matched);
    assert!(verdict(&verdicts, "MFI_DOUBLE_BOTTOM").matched);
    // Not enough history for a one-year low
    assert!(!verdict(&verdicts, "YEAR_LOW_DOUBLE_BOTTOM").matched);
    assert!(!verdict(&verdicts, "BREAKOUT").matched);
}

#[test]
fn test_zero_adjusted_close_row_is_skipped() {
    let engine = engine();
    let mut rows = rows_from(&w_bottom(), first_day());
    // A bar on the rally between the troughs
    rows[12].adj_close = Some(0);
    let series = engine.load_series("WWW", None, rows);
    assert_eq!(series.len(), 29);
    assert!(series.bars().iter().all(|b| b.low > 0));

    let second = first_day() + Days::new(SECOND_TROUGH);
    let verdicts = engine
        .evaluate(&series, &CandidateSource::Date(second))
        .unwrap();
    let double = verdict(&verdicts, "DOUBLE_BOTTOM");
    assert!(double.matched);
    let low_hit = double
        .hits
        .iter()
        .find(|h| h.kind == PivotKind::Low)
        .expect("low pivot hit");
    assert_eq!(low_hit.date, first_day() + Days::new(FIRST_TROUGH));
    assert_eq!(low_hit.elapsed, 9);
    assert!(low_hit.is_double_bottom);
}

#[test]
fn test_quote_candidate_retests_both_troughs() {
    let engine = engine();
    let series = engine.load_series("WWW", None, rows_from(&w_bottom(), first_day()));
    let quote_day = first_day() + Days::new(31);
    let quote = RawBar {
        date: quote_day,
        open: 101_000,
        high: 101_500,
        low: 98_700,
        close: 100_200,
        volume: 25_000,
        adj_close: None,
    };

    let verdicts = engine
        .evaluate(&series, &CandidateSource::Quote(quote))
        .unwrap();
    let double = verdict(&verdicts, "DOUBLE_BOTTOM");
    assert!(double.matched);
    assert_eq!(double.date, quote_day);

    let dates: Vec<_> = double.hits.iter().map(|h| h.date).collect();
    assert!(dates.contains(&(first_day() + Days::new(FIRST_TROUGH))));
    assert!(dates.contains(&(first_day() + Days::new(SECOND_TROUGH))));

    // Quote indicators come from the series behind it
    assert!(double.summary.change_pct.is_some());
    assert!(double.summary.volume_vs_vma20.is_some());
}

#[test]
fn test_unknown_date_is_an_error() {
    let engine = engine();
    let series = engine.load_series("WWW", None, rows_from(&w_bottom(), first_day()));
    let missing = first_day() + Days::new(400);
    assert!(matches!(
        engine.evaluate(&series, &CandidateSource::Date(missing)),
        Err(PatternError::CandidateNotFound(d)) if d == missing
    ));
}

#[test]
fn test_money_flow_double_bottom() {
    let engine = engine();
    let series = engine.load_series("WWW", None, rows_from(&w_bottom(), first_day()));
    let first = first_day() + Days::new(FIRST_TROUGH);
    let second = first_day() + Days::new(SECOND_TROUGH);

    // Selling into the first trough, a mixed tape into the second
    let mfi_at = |date| series.bars()[series.position(date).unwrap()].mfi;
    let rise = mfi_at(second) - mfi_at(first);
    assert!(rise > 1_000, "mfi rise {rise}");

    let verdicts = engine
        .evaluate(&series, &CandidateSource::Date(second))
        .unwrap();
    let mfi = verdict(&verdicts, "MFI_DOUBLE_BOTTOM");
    assert!(mfi.matched);
    assert!(mfi.hits.iter().all(|h| h.date == first));

    let strict = |min_mfi_rise| {
        EngineBuilder::new()
            .add(BuiltinDetector::MoneyFlowDoubleBottom(MoneyFlowDoubleBottomDetector {
                min_mfi_rise,
            }))
            .build()
            .unwrap()
    };
    let at_threshold = strict(rise).evaluate(&series, &CandidateSource::Date(second)).unwrap();
    assert!(at_threshold[0].matched);
    let just_under = strict(rise + 1).evaluate(&series, &CandidateSource::Date(second)).unwrap();
    assert!(!just_under[0].matched);
}

/// The W bottom after `pad` quiet bars at 125, so the second trough has a year of history.
fn padded_w_bottom(pad: usize) -> Vec<Ohlc> {
    let mut ohlc: Vec<Ohlc> = (0..pad).map(|_| flat_range(125_000)).collect();
    ohlc.extend(w_bottom());
    ohlc
}

#[test]
fn test_year_low_double_bottom() {
    let pad = 235;
    let second = first_day() + Days::new(pad as u64 + SECOND_TROUGH);

    let engine = engine();
    let series = engine.load_series("YYY", None, rows_from(&padded_w_bottom(pad), first_day()));
    let verdicts = engine
        .evaluate(&series, &CandidateSource::Date(second))
        .unwrap();
    let year_low = verdict(&verdicts, "YEAR_LOW_DOUBLE_BOTTOM");
    assert!(year_low.matched);
    assert!(year_low
        .hits
        .iter()
        .all(|h| h.date == first_day() + Days::new(pad as u64 + FIRST_TROUGH)));

    // A deeper wick inside the year means the first trough is not the year low
    let mut ohlc = padded_w_bottom(pad);
    ohlc[100] = (125_000, 125_500, 90_000, 125_000);
    let series = engine.load_series("YYY", None, rows_from(&ohlc, first_day()));
    let verdicts = engine
        .evaluate(&series, &CandidateSource::Date(second))
        .unwrap();
    assert!(verdict(&verdicts, "DOUBLE_BOTTOM").matched);
    assert!(!verdict(&verdicts, "YEAR_LOW_DOUBLE_BOTTOM").matched);
}

#[test]
fn test_big_up_day_anchor_is_support() {
    let mut ohlc = Vec::new();
    for k in 0..6 {
        ohlc.push(red(130_000 - k * 4_000));
    }
    // Anchor: wide green reversal candle, body bottom at 100.5
    ohlc.push((100_500, 107_500, 100_000, 107_000));
    // Undercut on the next day keeps the anchor from being a plain low
    ohlc.push((107_000, 107_200, 99_800, 100_200));
    for mid in [102_000, 105_000, 108_000, 111_000] {
        ohlc.push(green(mid));
    }
    for mid in [108_000, 105_000, 102_000] {
        ohlc.push(red(mid));
    }
    ohlc.push((101_000, 102_000, 100_300, 101_800));

    let engine = engine();
    let series = engine.load_series("BUD", None, rows_from(&ohlc, first_day()));
    let anchor_day = first_day() + Days::new(6);
    let anchor = &series.bars()[series.position(anchor_day).unwrap()];
    assert!(anchor.pivots.contains(PivotKind::BigUpDay));

    let verdicts = engine
        .evaluate(&series, &CandidateSource::Latest)
        .unwrap();
    let support = verdict(&verdicts, "SUPPORT");
    assert!(support.matched);
    let hit = support
        .hits
        .iter()
        .find(|h| h.kind == PivotKind::BigUpDay)
        .expect("big-up-day hit");
    assert_eq!(hit.date, anchor_day);
    assert_eq!(hit.reference, 100_500);
    assert_eq!(hit.height, 11_500);
    assert_eq!(hit.elapsed, 9);
    // The undercut day is lower than both lows
    assert!(!hit.is_double_bottom);
}

// ============================================================
// BREAKOUT SCENARIOS
// ============================================================

#[test]
fn test_breakout_day_hits_resistance() {
    let engine = engine();
    let series = engine.load_series("BRK", None, rows_from(&breakout_run(), first_day()));
    let resistance = first_day() + Days::new(6);
    let index = series.position(resistance).unwrap();
    assert!(series.bars()[index].pivots.contains(PivotKind::High));

    let verdicts = engine
        .evaluate(&series, &CandidateSource::Date(first_day() + Days::new(16)))
        .unwrap();
    let breakout = verdict(&verdicts, "BREAKOUT");
    assert!(breakout.matched);
    assert!(breakout
        .hits
        .iter()
        .any(|h| h.date == resistance && h.kind == PivotKind::High && h.reference == 110_000));
    assert!(breakout.hits.iter().all(|h| !h.is_double_bottom));
}

#[test]
fn test_stale_breakout_is_not_reported() {
    let engine = engine();
    let series = engine.load_series("BRK", None, rows_from(&breakout_run(), first_day()));
    let verdicts = engine
        .evaluate(&series, &CandidateSource::Latest)
        .unwrap();
    // Prior bar already closed above the resistance level
    assert!(!verdict(&verdicts, "BREAKOUT").matched);
}

/// Resistance at 110, a first support at 98.5, a flush under it and `base_days`
/// closes at 96 before a breakout day through the resistance.
fn second_breakout_run(base_days: usize) -> Vec<Ohlc> {
    let mut ohlc = Vec::new();
    for mid in (96..=106).step_by(2) {
        ohlc.push(green(mid * 1_000));
    }
    ohlc.push((107_500, 110_000, 107_000, 109_000));
    for mid in [107, 105, 103, 101, 100] {
        ohlc.push(red(mid * 1_000));
    }
    for mid in [102, 104, 106, 107] {
        ohlc.push(green(mid * 1_000));
    }
    ohlc.push((106_000, 106_500, 97_000, 97_500));
    for _ in 0..base_days {
        ohlc.push(flat_range(96_000));
    }
    ohlc.push((96_500, 113_500, 96_000, 113_000));
    ohlc
}

#[test]
fn test_second_breakout_after_base_under_support() {
    let engine = engine();
    let series = engine.load_series("SBO", None, rows_from(&second_breakout_run(5), first_day()));
    let verdicts = engine
        .evaluate(&series, &CandidateSource::Latest)
        .unwrap();

    let breakout = verdict(&verdicts, "BREAKOUT");
    assert!(breakout.matched);
    let second = verdict(&verdicts, "SECOND_BREAKOUT");
    assert!(second.matched);
    assert!(second
        .hits
        .iter()
        .any(|h| h.date == first_day() + Days::new(6) && h.reference == 110_000));
}

#[test]
fn test_second_breakout_needs_five_closes_below_support() {
    // With four base days the flush bar still closes above the support average
    let engine = engine();
    let series = engine.load_series("SBO", None, rows_from(&second_breakout_run(4), first_day()));
    let verdicts = engine
        .evaluate(&series, &CandidateSource::Latest)
        .unwrap();

    assert!(verdict(&verdicts, "BREAKOUT").matched);
    assert!(!verdict(&verdicts, "SECOND_BREAKOUT").matched);
}

#[test]
fn test_rolling_high_breakouts() {
    let mut ohlc: Vec<Ohlc> = (0..45).map(|_| flat_range(100_000)).collect();
    for close in [100_200, 100_400, 100_600] {
        ohlc.push((close - 100, close + 300, close - 500, close));
    }
    ohlc.push((100_600, 102_100, 100_500, 102_000));

    let engine = engine();
    let series = engine.load_series("TRN", None, rows_from(&ohlc, first_day()));
    let verdicts = engine
        .evaluate(&series, &CandidateSource::Latest)
        .unwrap();

    assert!(verdict(&verdicts, "TREND_BREAKOUT").matched);
    assert!(verdict(&verdicts, "STRONG_BREAKOUT").matched);
    assert!(verdict(&verdicts, "STRONG_BODY_BREAKOUT").matched);
}

// ============================================================
// TREND / WEEK / VOLUME SCENARIOS
// ============================================================

fn dip_below_sma20(days_below: usize) -> Vec<Ohlc> {
    let mut ohlc: Vec<Ohlc> = (0..30).map(|_| flat_range(100_000)).collect();
    for _ in 0..days_below {
        ohlc.push(flat_range(99_000));
    }
    ohlc.push((100_000, 101_200, 99_800, 101_000));
    ohlc
}

#[test]
fn test_strong_uptrend_after_short_dip() {
    let engine = engine();
    let series = engine.load_series("UPT", None, rows_from(&dip_below_sma20(2), first_day()));
    let verdicts = engine
        .evaluate(&series, &CandidateSource::Latest)
        .unwrap();
    assert!(verdict(&verdicts, "STRONG_UPTREND").matched);
}

#[test]
fn test_strong_uptrend_rejects_long_dip() {
    let engine = engine();
    let series = engine.load_series("UPT", None, rows_from(&dip_below_sma20(5), first_day()));
    let verdicts = engine
        .evaluate(&series, &CandidateSource::Latest)
        .unwrap();
    assert!(!verdict(&verdicts, "STRONG_UPTREND").matched);
}

#[test]
fn test_week_up_and_reversal() {
    // 2024-01-01 is a Monday; weekdays only
    let monday = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let mut rows = Vec::new();
    let mut push = |offset: u64, (open, high, low, close): Ohlc| {
        rows.push(RawBar {
            date: monday + Days::new(offset),
            open,
            high,
            low,
            close,
            volume: 10_000,
            adj_close: None,
        });
    };
    for (day, mid) in (0..5).zip([108_000, 109_000, 110_000, 111_000, 112_000]) {
        push(day, green(mid));
    }
    for (day, mid) in (7..12).zip([109_000, 107_000, 105_000, 103_000, 101_000]) {
        push(day, red(mid));
    }
    for (day, mid) in (14..17).zip([102_000, 106_000, 110_000]) {
        push(day, green(mid));
    }

    let engine = EngineBuilder::new()
        .with_momentum_defaults()
        .only_patterns([PatternId("WEEK_UP"), PatternId("WEEK_REVERSAL")])
        .build()
        .unwrap();
    let series = engine.load_series("WKS", None, rows);
    let verdicts = engine
        .evaluate(&series, &CandidateSource::Latest)
        .unwrap();
    assert_eq!(verdicts.len(), 2);
    assert!(verdict(&verdicts, "WEEK_UP").matched);
    assert!(verdict(&verdicts, "WEEK_REVERSAL").matched);
}

#[test]
fn test_relative_volume() {
    let ohlc: Vec<Ohlc> = (0..30).map(|_| flat_range(100_000)).collect();
    let engine = EngineBuilder::new()
        .with_momentum_defaults()
        .only_patterns([PatternId("LOW_VOLUME"), PatternId("HIGH_VOLUME")])
        .build()
        .unwrap();
    let series = engine.load_series("VOL", None, rows_from(&ohlc, first_day()));
    let day = first_day() + Days::new(30);

    let quote = |volume| RawBar {
        date: day,
        open: 100_000,
        high: 100_500,
        low: 99_500,
        close: 100_200,
        volume,
        adj_close: None,
    };

    let loud = engine
        .evaluate(&series, &CandidateSource::Quote(quote(30_000)))
        .unwrap();
    assert!(verdict(&loud, "HIGH_VOLUME").matched);
    assert!(!verdict(&loud, "LOW_VOLUME").matched);

    let quiet = engine
        .evaluate(&series, &CandidateSource::Quote(quote(2_000)))
        .unwrap();
    assert!(verdict(&quiet, "LOW_VOLUME").matched);
    assert!(!verdict(&quiet, "HIGH_VOLUME").matched);
}

// ============================================================
// DEGENERATE INPUT
// ============================================================

#[test]
fn test_flat_bar_is_harmless() {
    let mut ohlc = w_bottom();
    ohlc[12] = (105_000, 105_000, 105_000, 105_000);

    let engine = engine();
    let series = engine.load_series("FLT", None, rows_from(&ohlc, first_day()));
    let flat_day = first_day() + Days::new(12);
    let index = series.position(flat_day).unwrap();
    let bar = &series.bars()[index];
    assert!(bar.pivots.is_empty());
    assert_eq!(bar.candle_color, CandleColor::Doji);
    assert_eq!(bar.candle_trend, CandleTrend::Doji);

    let verdicts = engine
        .evaluate(&series, &CandidateSource::Date(flat_day))
        .unwrap();
    let change = verdict(&verdicts, "CHANGE");
    assert!(change.matched);
    assert_eq!(change.summary.body_pct, 0.0);
}

#[test]
fn test_csv_to_report() {
    let csv = "\
Date,Open,High,Low,Close,Adj Close,Volume
2024-01-02,10.5,11.0,10.0,10.8,10.8,1200
2024-01-03,10.8,11.2,10.6,11.1,11.1,1500
2024-01-04,11.1,11.3,10.9,11.0,11.0,900
";
    let engine = engine();
    let series =
        Series::from_csv_reader("CSV", None, csv.as_bytes(), engine.params()).unwrap();
    let report = scan_parallel(&engine, vec![series], &CandidateSource::Latest);

    assert_eq!(report.results.len(), 1);
    let text = report.to_string();
    assert!(text.contains("CHANGE"));
    assert!(text.ends_with("0/1 symbols matched, 0 failed"));
}
