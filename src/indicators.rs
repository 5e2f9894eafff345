//! Indicator engine: moving averages, candle classification and money flow
//!
//! Every indicator is produced by a single sweep over a newest-first slice,
//! walking from the oldest bar toward index 0 with a running sum per window
//! (the entering bar is added, the bar `window` positions older is removed).

use serde::Serialize;

use crate::bar::{
    percent, Bar, CandleColor, CandleTrend, Price, MFI_MAX, SMA_WINDOWS, VMA_WINDOWS,
};

/// Money flow index period, in bars.
pub const MFI_PERIOD: usize = 14;

/// History an out-of-series quote needs for every indicator to be defined.
const QUOTE_HISTORY: usize = SMA_WINDOWS[SMA_WINDOWS.len() - 1] + MFI_PERIOD;

/// Compute all indicators of a newest-first slice in place.
///
/// Indicator fields are overwritten, so running this twice gives the same result.
pub fn compute(bars: &mut [Bar]) {
    let len = bars.len();
    let mut sma_sums = [0i64; SMA_WINDOWS.len()];
    let mut vma_sums = [0u64; VMA_WINDOWS.len()];

    for i in (0..len).rev() {
        for (slot, &window) in SMA_WINDOWS.iter().enumerate() {
            sma_sums[slot] += bars[i].close;
            if i + window < len {
                sma_sums[slot] -= bars[i + window].close;
            }
            bars[i].sma[slot] = if i + window <= len {
                sma_sums[slot] / window as i64
            } else {
                0
            };
        }

        for (slot, &window) in VMA_WINDOWS.iter().enumerate() {
            vma_sums[slot] += bars[i].volume;
            if i + window < len {
                vma_sums[slot] -= bars[i + window].volume;
            }
            bars[i].vma[slot] = if i + window <= len {
                vma_sums[slot] / window as u64
            } else {
                0
            };
        }

        let color = candle_color(&bars[i]);
        bars[i].candle_color = color;
        bars[i].candle_trend = candle_trend(&bars[i], color);
    }

    compute_mfi(bars);
}

/// Annotate a quote that is not part of the series.
///
/// `history` holds the bars older than the quote, newest-first. The quote is
/// treated as if it were prepended to `history`.
pub fn annotate_quote(quote: &mut Bar, history: &[Bar]) {
    let depth = history.len().min(QUOTE_HISTORY);
    let mut window = Vec::with_capacity(depth + 1);
    window.push(quote.clone());
    window.extend_from_slice(&history[..depth]);
    compute(&mut window);

    let head = &window[0];
    quote.sma = head.sma;
    quote.vma = head.vma;
    quote.candle_color = head.candle_color;
    quote.candle_trend = head.candle_trend;
    quote.mfi = head.mfi;
}

// ============================================================
// CANDLES
// ============================================================

pub fn candle_color(bar: &Bar) -> CandleColor {
    match bar.close.cmp(&bar.open) {
        std::cmp::Ordering::Greater => CandleColor::Green,
        std::cmp::Ordering::Less => CandleColor::Red,
        std::cmp::Ordering::Equal => CandleColor::Doji,
    }
}

/// Classify where the close sits inside the range.
///
/// Compares the distance of the close from the low against its distance from
/// the high; an imbalance of 1% of the open or less is a doji. Bars with a
/// degenerate wick (zero range, or no upper or lower wick) whose body covers
/// at least 60% of the range follow their candle color instead.
pub fn candle_trend(bar: &Bar, color: CandleColor) -> CandleTrend {
    let range = bar.range();
    if range <= 0 {
        return CandleTrend::Doji;
    }

    let degenerate = bar.upper_wick() == 0 || bar.lower_wick() == 0;
    if degenerate && bar.body() * 10 >= range * 6 {
        return match color {
            CandleColor::Green => CandleTrend::Bull,
            CandleColor::Red => CandleTrend::Bear,
            CandleColor::Doji => CandleTrend::Doji,
        };
    }

    let up = bar.close - bar.low;
    let down = bar.high - bar.close;
    if (up - down).abs() * 100 <= bar.open {
        CandleTrend::Doji
    } else if up > down {
        CandleTrend::Bull
    } else {
        CandleTrend::Bear
    }
}

// ============================================================
// MONEY FLOW
// ============================================================

/// MFI from the positive and negative flow sums, in 0..=10000.
///
/// A zero negative sum is floored to 1.
pub fn money_flow_index(positive: u128, negative: u128) -> u32 {
    let negative = negative.max(1);
    let ratio = positive.saturating_mul(100) / negative;
    let index = 1_000_000 / ratio.saturating_add(100);
    MFI_MAX - index as u32
}

/// Raw money flow of bar `i` split into (positive, negative) against the next-older bar.
fn raw_flow(bars: &[Bar], i: usize) -> (u128, u128) {
    let Some(older) = bars.get(i + 1) else {
        return (0, 0);
    };
    let typical = bars[i].typical_price();
    let flow = typical.max(0) as u128 * u128::from(bars[i].volume);
    match typical.cmp(&older.typical_price()) {
        std::cmp::Ordering::Greater => (flow, 0),
        std::cmp::Ordering::Less => (0, flow),
        std::cmp::Ordering::Equal => (0, 0),
    }
}

fn compute_mfi(bars: &mut [Bar]) {
    let len = bars.len();
    let flows: Vec<(u128, u128)> = (0..len).map(|i| raw_flow(bars, i)).collect();

    let mut positive = 0u128;
    let mut negative = 0u128;
    for i in (0..len).rev() {
        positive += flows[i].0;
        negative += flows[i].1;
        if let Some(exiting) = flows.get(i + MFI_PERIOD) {
            positive -= exiting.0;
            negative -= exiting.1;
        }
        bars[i].mfi = money_flow_index(positive, negative);
    }
}

/// Single-bar split of traded value into buying and selling pressure.
///
/// The typical price times volume is divided by where the close sits in the
/// range: the part below the close counts as money in, the rest as money out.
/// Values are in price units (thousandths) times shares.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MoneyFlow {
    pub total: i64,
    pub money_in: i64,
    pub money_out: i64,
    pub net: i64,
    pub in_pct: f64,
    pub out_pct: f64,
}

impl MoneyFlow {
    /// Zero-range bars have no split and report zero in and out.
    pub fn of(bar: &Bar) -> Self {
        let total = i128::from(bar.typical_price().max(0)) * i128::from(bar.volume);
        let range = bar.range();
        if range <= 0 {
            return Self {
                total: saturate(total),
                ..Self::default()
            };
        }

        let up = bar.close - bar.low;
        let down = bar.high - bar.close;
        let money_in = total * i128::from(up) / i128::from(range);
        let money_out = total * i128::from(down) / i128::from(range);
        Self {
            total: saturate(total),
            money_in: saturate(money_in),
            money_out: saturate(money_out),
            net: saturate(money_in - money_out),
            in_pct: percent(up, range),
            out_pct: percent(down, range),
        }
    }
}

fn saturate(value: i128) -> i64 {
    value.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}

/// Mean of `values`, 0 for an empty slice.
pub(crate) fn mean(values: impl IntoIterator<Item = Price>) -> Price {
    let (sum, count) = values
        .into_iter()
        .fold((0i64, 0i64), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0
    } else {
        sum / count
    }
}

// ============================================================
// TESTS
// ============================================================
