//! Daily bar model and the raw-record normalizer
//!
//! Prices are fixed-point integers in thousandths of a currency unit, so that
//! every comparison the pivot and scanner passes make is exact.

use std::fmt;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::Serialize;

use crate::{PatternError, Ratio, Result};

/// Fixed-point price, scaled by [`PRICE_SCALE`].
pub type Price = i64;

/// Number of price units per currency unit (3 decimal digits).
pub const PRICE_SCALE: i64 = 1000;

/// Simple moving average windows carried on every bar, in days.
pub const SMA_WINDOWS: [usize; 8] = [10, 20, 30, 50, 60, 100, 120, 200];

/// Volume moving average windows carried on every bar, in days.
pub const VMA_WINDOWS: [usize; 3] = [10, 20, 60];

/// Upper bound of the money flow index.
pub const MFI_MAX: u32 = 10_000;

// ============================================================
// FIXED-POINT HELPERS
// ============================================================

/// Parse a decimal price string into thousandths.
///
/// A fourth decimal digit rounds half-up; further digits are ignored.
/// Returns `None` for empty, signed or non-numeric input.
pub fn parse_price(text: &str) -> Option<Price> {
    let text = text.trim();
    let (int_part, frac_part) = text.split_once('.').unwrap_or((text, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.bytes().all(|b| b.is_ascii_digit())
        || !frac_part.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }

    let whole: i64 = if int_part.is_empty() {
        0
    } else {
        int_part.parse().ok()?
    };

    let mut digits = frac_part.bytes();
    let mut milli = 0i64;
    for _ in 0..3 {
        milli = milli * 10 + digits.next().map_or(0, |b| i64::from(b - b'0'));
    }
    if digits.next().is_some_and(|b| b >= b'5') {
        milli += 1;
    }

    whole.checked_mul(PRICE_SCALE)?.checked_add(milli)
}

/// `price * ratio`, rounded to the nearest unit.
#[inline]
pub fn fraction_of(price: Price, ratio: Ratio) -> Price {
    (price as f64 * ratio.get()).round() as Price
}

/// Signed percentage of `part` relative to `base`, or 0.0 when `base` is zero.
#[inline]
pub fn percent(part: i64, base: i64) -> f64 {
    if base == 0 {
        0.0
    } else {
        part as f64 * 100.0 / base as f64
    }
}

/// Display adapter printing a [`Price`] as `123.456`.
#[derive(Debug, Clone, Copy)]
pub struct DisplayPrice(pub Price);

impl fmt::Display for DisplayPrice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let scale = PRICE_SCALE as u64;
        write!(f, "{sign}{}.{:03}", abs / scale, abs % scale)
    }
}

// ============================================================
// CANDLE CLASSIFICATION
// ============================================================

/// Candle color by close vs. open
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CandleColor {
    #[default]
    Doji,
    Green,
    Red,
}

impl CandleColor {
    pub fn as_str(self) -> &'static str {
        match self {
            CandleColor::Doji => "doji",
            CandleColor::Green => "green",
            CandleColor::Red => "red",
        }
    }
}

/// Candle trend by where the close sits inside the range
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CandleTrend {
    #[default]
    Doji,
    Bull,
    Bear,
}

impl CandleTrend {
    pub fn as_str(self) -> &'static str {
        match self {
            CandleTrend::Doji => "doji",
            CandleTrend::Bull => "bull",
            CandleTrend::Bear => "bear",
        }
    }
}

// ============================================================
// PIVOT FLAGS
// ============================================================

/// Kind of pivot a bar can be flagged with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PivotKind {
    /// Support at the wick low
    Low,
    /// Support at the candle body bottom
    SecondLow,
    /// Resistance at the wick high
    High,
    /// Resistance at the candle body top
    SecondHigh,
    /// Strong green reversal day after a sell-off
    BigUpDay,
}

impl PivotKind {
    /// Kinds confirmed by the two-sided window scan, in height-slot order.
    pub const WINDOWED: [PivotKind; 4] = [
        PivotKind::Low,
        PivotKind::SecondLow,
        PivotKind::High,
        PivotKind::SecondHigh,
    ];

    pub const ALL: [PivotKind; 5] = [
        PivotKind::Low,
        PivotKind::SecondLow,
        PivotKind::High,
        PivotKind::SecondHigh,
        PivotKind::BigUpDay,
    ];

    /// Slot in [`Bar::heights`]
    #[inline]
    pub fn height_slot(self) -> usize {
        match self {
            PivotKind::Low => 0,
            PivotKind::SecondLow => 1,
            PivotKind::High => 2,
            PivotKind::SecondHigh => 3,
            PivotKind::BigUpDay => 4,
        }
    }

    #[inline]
    pub fn is_support(self) -> bool {
        matches!(
            self,
            PivotKind::Low | PivotKind::SecondLow | PivotKind::BigUpDay
        )
    }

    #[inline]
    pub fn is_resistance(self) -> bool {
        matches!(self, PivotKind::High | PivotKind::SecondHigh)
    }

    #[inline]
    fn bit(self) -> u8 {
        match self {
            PivotKind::Low => 1 << 0,
            PivotKind::SecondLow => 1 << 1,
            PivotKind::High => 1 << 2,
            PivotKind::SecondHigh => 1 << 3,
            PivotKind::BigUpDay => 1 << 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PivotKind::Low => "low",
            PivotKind::SecondLow => "2nd-low",
            PivotKind::High => "high",
            PivotKind::SecondHigh => "2nd-high",
            PivotKind::BigUpDay => "big-up-day",
        }
    }
}

/// Bitset of [`PivotKind`]s
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PivotFlags(u8);

impl PivotFlags {
    pub const EMPTY: PivotFlags = PivotFlags(0);

    #[inline]
    pub fn contains(self, kind: PivotKind) -> bool {
        self.0 & kind.bit() != 0
    }

    #[inline]
    pub fn insert(&mut self, kind: PivotKind) {
        self.0 |= kind.bit();
    }

    #[inline]
    pub fn remove(&mut self, kind: PivotKind) {
        self.0 &= !kind.bit();
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if any of `Low`, `SecondLow` is set.
    #[inline]
    pub fn has_windowed_support(self) -> bool {
        self.contains(PivotKind::Low) || self.contains(PivotKind::SecondLow)
    }

    #[inline]
    pub fn has_resistance(self) -> bool {
        self.contains(PivotKind::High) || self.contains(PivotKind::SecondHigh)
    }

    pub fn iter(self) -> impl Iterator<Item = PivotKind> {
        PivotKind::ALL.into_iter().filter(move |k| self.contains(*k))
    }
}

// ============================================================
// RAW RECORD
// ============================================================

/// One quote row as delivered by a loader, before reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBar {
    pub date: NaiveDate,
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    pub volume: u64,
    pub adj_close: Option<Price>,
}

impl RawBar {
    /// Structural sanity checks on the OHLC values
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason| PatternError::InvalidBar {
            date: self.date,
            reason,
        };
        if self.low <= 0 || self.open <= 0 || self.close <= 0 {
            return Err(invalid("non-positive price"));
        }
        if self.high < self.low {
            return Err(invalid("high < low"));
        }
        if !(self.low..=self.high).contains(&self.open)
            || !(self.low..=self.high).contains(&self.close)
        {
            return Err(invalid("open/close outside high-low range"));
        }
        if let Some(adj) = self.adj_close {
            if adj <= 0 {
                return Err(invalid("non-positive adjusted close"));
            }
            // normalize() may rescale by adj / close; the low must survive it
            if rescale(self.low, adj, self.close) <= 0 {
                return Err(invalid("adjusted close rescales prices to zero"));
            }
        }
        Ok(())
    }

    /// Reconcile against the adjusted close and produce an unannotated [`Bar`].
    ///
    /// When close and adjusted close differ by more than `adj_threshold`
    /// (relative to close), open/high/low are rescaled by `adj_close / close`
    /// and close is replaced with the adjusted close.
    pub fn normalize(&self, adj_threshold: Ratio) -> Bar {
        let (mut open, mut high, mut low, mut close) = (self.open, self.high, self.low, self.close);

        if let Some(adj) = self.adj_close {
            if close > 0 && (adj - close).abs() > fraction_of(close, adj_threshold) {
                open = rescale(open, adj, close);
                high = rescale(high, adj, close);
                low = rescale(low, adj, close);
                close = adj;
            }
        }

        Bar::new(self.date, open, high, low, close, self.volume)
    }
}

#[inline]
fn rescale(value: Price, num: Price, den: Price) -> Price {
    let scaled = i128::from(value) * i128::from(num);
    let den = i128::from(den);
    ((scaled + den / 2) / den) as Price
}

// ============================================================
// BAR
// ============================================================

/// One trading day plus its derived indicators and pivot annotations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bar {
    pub date: NaiveDate,
    pub weekday: Weekday,
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    pub volume: u64,

    /// Price SMAs, slot order of [`SMA_WINDOWS`]; 0 = undefined
    pub sma: [Price; 8],
    /// Volume SMAs, slot order of [`VMA_WINDOWS`]; 0 = undefined
    pub vma: [u64; 3],
    pub candle_color: CandleColor,
    pub candle_trend: CandleTrend,
    /// Money flow index, 0..=10000
    pub mfi: u32,

    pub pivots: PivotFlags,
    /// Confirming height per pivot kind, slot order of [`PivotKind::ALL`].
    /// For a big up day this is the sell-off it reversed.
    pub heights: [Price; 5],
}

impl Bar {
    pub fn new(
        date: NaiveDate,
        open: Price,
        high: Price,
        low: Price,
        close: Price,
        volume: u64,
    ) -> Self {
        Self {
            date,
            weekday: date.weekday(),
            open,
            high,
            low,
            close,
            volume,
            sma: [0; 8],
            vma: [0; 3],
            candle_color: CandleColor::Doji,
            candle_trend: CandleTrend::Doji,
            mfi: 0,
            pivots: PivotFlags::EMPTY,
            heights: [0; 5],
        }
    }

    /// Price SMA for `window` days, `None` if undefined or not a carried window.
    pub fn sma(&self, window: usize) -> Option<Price> {
        let slot = SMA_WINDOWS.iter().position(|w| *w == window)?;
        let value = self.sma[slot];
        (value != 0).then_some(value)
    }

    /// Volume SMA for `window` days, `None` if undefined or not a carried window.
    pub fn vma(&self, window: usize) -> Option<u64> {
        let slot = VMA_WINDOWS.iter().position(|w| *w == window)?;
        let value = self.vma[slot];
        (value != 0).then_some(value)
    }

    #[inline]
    pub fn is_green(&self) -> bool {
        self.close > self.open
    }

    #[inline]
    pub fn is_red(&self) -> bool {
        self.close < self.open
    }

    /// Body bottom: open on a green candle, close otherwise.
    #[inline]
    pub fn second_low(&self) -> Price {
        if self.is_green() {
            self.open
        } else {
            self.close
        }
    }

    /// Body top: close on a green candle, open otherwise.
    #[inline]
    pub fn second_high(&self) -> Price {
        if self.is_green() {
            self.close
        } else {
            self.open
        }
    }

    #[inline]
    pub fn body(&self) -> Price {
        (self.close - self.open).abs()
    }

    #[inline]
    pub fn range(&self) -> Price {
        self.high - self.low
    }

    #[inline]
    pub fn upper_wick(&self) -> Price {
        self.high - self.open.max(self.close)
    }

    #[inline]
    pub fn lower_wick(&self) -> Price {
        self.open.min(self.close) - self.low
    }

    /// open == high == low == close
    #[inline]
    pub fn is_flat(&self) -> bool {
        self.high == self.low
    }

    #[inline]
    pub fn typical_price(&self) -> Price {
        (self.high + self.low + self.close) / 3
    }

    /// Body is at least `ratio` of the range. Always false on a flat bar.
    pub fn body_at_least(&self, ratio: Ratio) -> bool {
        let range = self.range();
        range > 0 && self.body() as f64 >= range as f64 * ratio.get()
    }

    /// Price level a pivot of `kind` on this bar stands for.
    #[inline]
    pub fn reference(&self, kind: PivotKind) -> Price {
        match kind {
            PivotKind::Low => self.low,
            PivotKind::SecondLow | PivotKind::BigUpDay => self.second_low(),
            PivotKind::High => self.high,
            PivotKind::SecondHigh => self.second_high(),
        }
    }

    /// Confirming height for `kind`, 0 when the flag is not set.
    #[inline]
    pub fn height(&self, kind: PivotKind) -> Price {
        self.heights[kind.height_slot()]
    }
}

// ============================================================
// TESTS
// ============================================================
