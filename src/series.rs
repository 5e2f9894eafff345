//! Newest-first bar series and candidate selection
//!
//! A [`Series`] is built once per symbol from raw rows: invalid rows are
//! skipped, the rest are reconciled against their adjusted close, ordered
//! newest-first, deduplicated by date and capped at `max_history` bars.

use std::io::Read;

use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::{
    bar::{parse_price, Bar, RawBar},
    indicators,
    params::ScanParams,
    PatternError, Result,
};

/// Daily history of one symbol, index 0 = most recent bar
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    symbol: String,
    sector: Option<String>,
    bars: Vec<Bar>,
}

impl Series {
    /// Build a series from already-normalized bars, which must be strictly newest-first.
    pub fn new(symbol: impl Into<String>, sector: Option<String>, bars: Vec<Bar>) -> Result<Self> {
        if let Some(pair) = bars.windows(2).find(|w| w[0].date <= w[1].date) {
            return Err(PatternError::InvalidBar {
                date: pair[1].date,
                reason: "bars must be strictly newest-first",
            });
        }
        Ok(Self {
            symbol: symbol.into(),
            sector,
            bars,
        })
    }

    /// Build a series from raw rows in any order.
    ///
    /// Rows failing validation are skipped with a warning. When two rows share
    /// a date the one that came later in `rows` wins.
    pub fn from_raw(
        symbol: impl Into<String>,
        sector: Option<String>,
        rows: impl IntoIterator<Item = RawBar>,
        params: &ScanParams,
    ) -> Self {
        let symbol = symbol.into();
        let mut bars: Vec<Bar> = rows
            .into_iter()
            .filter_map(|row| match row.validate() {
                Ok(()) => Some(row.normalize(params.adj_threshold)),
                Err(error) => {
                    warn!(%symbol, %error, "skipping bar");
                    None
                }
            })
            .collect();

        // Stable sort + reverse puts the later of two same-day rows first for dedup
        bars.sort_by_key(|b| b.date);
        bars.reverse();
        bars.dedup_by_key(|b| b.date);
        bars.truncate(params.max_history.get());

        debug!(%symbol, bars = bars.len(), "series loaded");
        Self {
            symbol,
            sector,
            bars,
        }
    }

    /// Read Yahoo-style daily CSV (`Date,Open,High,Low,Close,Adj Close,Volume`).
    ///
    /// Rows with missing or unparsable fields are skipped with a warning; only
    /// an I/O failure of `reader` is an error.
    pub fn from_csv_reader<R: Read>(
        symbol: impl Into<String>,
        sector: Option<String>,
        reader: R,
        params: &ScanParams,
    ) -> Result<Self> {
        let symbol = symbol.into();
        let mut csv = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut rows = Vec::new();
        for (line, record) in csv.deserialize::<CsvRow>().enumerate() {
            let row = match record {
                Ok(row) => row,
                Err(error) if error.is_io_error() => {
                    return Err(PatternError::Csv(error.to_string()));
                }
                Err(error) => {
                    warn!(%symbol, line = line + 2, %error, "skipping malformed row");
                    continue;
                }
            };
            match row.into_raw() {
                Some(raw) => rows.push(raw),
                None => warn!(%symbol, line = line + 2, "skipping row with missing fields"),
            }
        }

        Ok(Self::from_raw(symbol, sector, rows, params))
    }

    #[inline]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    #[inline]
    pub fn sector(&self) -> Option<&str> {
        self.sector.as_deref()
    }

    #[inline]
    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    #[inline]
    pub(crate) fn bars_mut(&mut self) -> &mut [Bar] {
        &mut self.bars
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Index of the bar dated `date`.
    pub fn position(&self, date: NaiveDate) -> Option<usize> {
        self.bars.binary_search_by(|b| date.cmp(&b.date)).ok()
    }

    /// First index whose bar is strictly older than `date`.
    pub fn older_than(&self, date: NaiveDate) -> usize {
        self.bars.partition_point(|b| b.date >= date)
    }

    /// Resolve `source` to a candidate bar with indicators.
    ///
    /// The series itself must already be annotated.
    pub fn candidate(&self, source: &CandidateSource, params: &ScanParams) -> Result<Candidate> {
        match source {
            CandidateSource::Latest => {
                let bar = self.bars.first().ok_or(PatternError::InsufficientData {
                    need: 1,
                    got: 0,
                })?;
                Ok(Candidate {
                    bar: bar.clone(),
                    index: Some(0),
                })
            }
            CandidateSource::Date(date) => {
                let index = self
                    .position(*date)
                    .ok_or(PatternError::CandidateNotFound(*date))?;
                Ok(Candidate {
                    bar: self.bars[index].clone(),
                    index: Some(index),
                })
            }
            CandidateSource::Quote(raw) => {
                raw.validate()?;
                let mut bar = raw.normalize(params.adj_threshold);
                let start = self.older_than(bar.date);
                indicators::annotate_quote(&mut bar, &self.bars[start..]);
                debug!(symbol = %self.symbol, date = %bar.date, "quote candidate");
                Ok(Candidate { bar, index: None })
            }
        }
    }
}

/// Where the candidate bar comes from
#[derive(Debug, Clone, PartialEq)]
pub enum CandidateSource {
    /// The most recent bar of the series
    Latest,
    /// A historical bar of the series
    Date(NaiveDate),
    /// A quote that is not part of the series (e.g. an intraday price)
    Quote(RawBar),
}

/// Bar evaluated against the series' pivots
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub bar: Bar,
    /// Position in the series, `None` for an external quote
    pub index: Option<usize>,
}

// ============================================================
// CSV ROWS
// ============================================================

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Open")]
    open: String,
    #[serde(rename = "High")]
    high: String,
    #[serde(rename = "Low")]
    low: String,
    #[serde(rename = "Close")]
    close: String,
    #[serde(rename = "Adj Close", default)]
    adj_close: Option<String>,
    #[serde(rename = "Volume")]
    volume: String,
}

impl CsvRow {
    fn into_raw(self) -> Option<RawBar> {
        let date = NaiveDate::parse_from_str(&self.date, "%Y-%m-%d").ok()?;
        Some(RawBar {
            date,
            open: parse_price(&self.open)?,
            high: parse_price(&self.high)?,
            low: parse_price(&self.low)?,
            close: parse_price(&self.close)?,
            volume: self.volume.parse().ok()?,
            adj_close: self.adj_close.as_deref().and_then(parse_price),
        })
    }
}

// ============================================================
// TESTS
// ============================================================
