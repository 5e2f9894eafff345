//! Pivot detection: support/resistance pivots and big-up-day anchors
//!
//! A bar is a pivot of a given kind when the bars on *both* sides of it,
//! scanned outward up to `max_window` bars, confirm the level it stands for:
//! for support the neighbours must trade above the level without undercutting
//! it, for resistance they must trade below it without exceeding it. Each side
//! is tracked by a small state machine ([`SideScan`]) that either dies (the
//! level was broken before enough confirmations), stops (broken after enough
//! confirmations, or `max_confirm` reached), or simply runs out of bars.

use tracing::debug;

use crate::{
    bar::{fraction_of, Bar, PivotFlags, PivotKind, Price},
    params::ScanParams,
};

/// Per-side confirmation state for one pivot kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SideScan {
    pub alive: bool,
    pub stopped: bool,
    pub confirms: usize,
    pub height: Price,
}

impl SideScan {
    const START: SideScan = SideScan {
        alive: true,
        stopped: false,
        confirms: 0,
        height: 0,
    };

    #[inline]
    fn done(&self) -> bool {
        !self.alive || self.stopped
    }

    fn observe(&mut self, neighbor: Neighbor, run: usize, max_confirm: usize) {
        if self.done() {
            return;
        }
        if neighbor.fails {
            if self.confirms >= run {
                self.stopped = true;
            } else {
                self.alive = false;
            }
            return;
        }
        if neighbor.confirms {
            self.confirms += 1;
            self.height = self.height.max(neighbor.gap);
            if self.confirms >= max_confirm {
                self.stopped = true;
            }
        }
    }

    /// Alive with at least `run` confirming neighbours.
    #[inline]
    pub fn confirmed(&self, run: usize) -> bool {
        self.alive && self.confirms >= run
    }
}

/// What one neighbour says about a pivot hypothesis
#[derive(Debug, Clone, Copy)]
struct Neighbor {
    fails: bool,
    confirms: bool,
    gap: Price,
}

fn compare(kind: PivotKind, reference: Price, n: &Bar) -> Neighbor {
    let (fails, confirms, gap) = match kind {
        PivotKind::Low => (n.low < reference, n.high > reference, n.high - reference),
        PivotKind::SecondLow => (
            n.second_low() < reference,
            n.high > reference,
            n.high - reference,
        ),
        PivotKind::High => (n.high > reference, n.low < reference, reference - n.low),
        PivotKind::SecondHigh => (
            n.second_high() > reference,
            n.low < reference,
            reference - n.low,
        ),
        // not windowed
        PivotKind::BigUpDay => (true, false, 0),
    };
    Neighbor {
        fails,
        confirms,
        gap,
    }
}

/// Scan one side of `cur`, nearest neighbour first.
pub fn scan_side<'a>(
    cur: &Bar,
    neighbours: impl Iterator<Item = &'a Bar>,
    params: &ScanParams,
) -> [SideScan; 4] {
    let run = params.confirm_run();
    let max_confirm = params.max_confirm.get();
    let mut sides = [SideScan::START; 4];

    for n in neighbours.take(params.max_window.get()) {
        for (side, kind) in sides.iter_mut().zip(PivotKind::WINDOWED) {
            side.observe(compare(kind, cur.reference(kind), n), run, max_confirm);
        }
        if sides.iter().all(SideScan::done) {
            break;
        }
    }
    sides
}

/// Annotate every bar of a newest-first slice with its pivot flags and heights.
///
/// Previous annotations are cleared first. Returns the number of bars that
/// carry at least one flag.
pub fn detect(bars: &mut [Bar], params: &ScanParams) -> usize {
    for bar in bars.iter_mut() {
        bar.pivots = PivotFlags::EMPTY;
        bar.heights = [0; 5];
    }

    let len = bars.len();
    let run = params.confirm_run();
    let mut flagged = 0;

    for i in 0..len {
        if i < run || i + run >= len || bars[i].is_flat() {
            continue;
        }
        let (flags, heights) = classify(bars, i, params);
        if !flags.is_empty() {
            flagged += 1;
        }
        bars[i].pivots = flags;
        bars[i].heights = heights;
    }

    flagged
}

fn classify(bars: &[Bar], i: usize, params: &ScanParams) -> (PivotFlags, [Price; 5]) {
    let cur = &bars[i];
    let run = params.confirm_run();
    let older = scan_side(cur, bars[i + 1..].iter(), params);
    let newer = scan_side(cur, bars[..i].iter().rev(), params);

    let mut flags = PivotFlags::EMPTY;
    let mut heights = [0; 5];

    for (slot, kind) in PivotKind::WINDOWED.into_iter().enumerate() {
        let (left, right) = (older[slot], newer[slot]);
        if !(left.confirmed(run) && right.confirmed(run)) {
            continue;
        }
        let height = left.height.max(right.height);
        if height > 0 && height >= params.pivot_margin(cur.reference(kind)) {
            flags.insert(kind);
            heights[kind.height_slot()] = height;
        }
    }

    if flags.has_windowed_support() && flags.has_resistance() {
        debug!(date = %cur.date, ?flags, "conflicting pivot, clearing support and resistance");
        flags = PivotFlags::EMPTY;
        heights = [0; 5];
    }

    if flags.is_empty() {
        if let Some(height) = big_up_day(bars, i, params) {
            flags.insert(PivotKind::BigUpDay);
            heights[PivotKind::BigUpDay.height_slot()] = height;
        }
    }

    (flags, heights)
}

/// Height of the sell-off reversed by a big green candle at `i`, if any.
///
/// Walks older bars while each closes above the previous one in the walk
/// (starting from the candle's body bottom) and holds above that body bottom.
fn big_up_day(bars: &[Bar], i: usize, params: &ScanParams) -> Option<Price> {
    let cur = &bars[i];
    if !cur.is_green() || !cur.body_at_least(params.big_up_body) {
        return None;
    }

    let floor = cur.second_low();
    let needed = fraction_of(cur.low, params.big_up_move);
    let mut prev_close = floor;
    let mut top = 0;

    for older in bars[i + 1..].iter().take(params.max_window.get()) {
        if older.close <= prev_close || older.low < floor {
            break;
        }
        prev_close = older.close;
        top = top.max(older.high);
        if top - cur.low >= needed {
            return Some(top - cur.low);
        }
    }
    None
}

// ============================================================
// TESTS
// ============================================================
