//! Swing point extraction
//!
//! A swing high at index `i` is a bar whose high is strictly greater than every
//! other high within `k` bars on either side; a swing low mirrors this on lows.
//! Equal neighbours (plateaus) never qualify.

use std::ops::RangeInclusive;

use crate::OHLCV;

/// Which extreme a swing point marks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwingKind {
    High,
    Low,
}

/// A local extremum in a candle window
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SwingPoint {
    pub index: usize,
    pub price: f64,
    pub timestamp: i64,
    pub kind: SwingKind,
}

impl SwingPoint {
    /// Point at a candle's high or low
    pub fn at<T: OHLCV>(bars: &[T], index: usize, kind: SwingKind) -> Option<Self> {
        let bar = bars.get(index)?;
        let price = match kind {
            SwingKind::High => bar.high(),
            SwingKind::Low => bar.low(),
        };
        Some(Self {
            index,
            price,
            timestamp: bar.timestamp().unwrap_or_default(),
            kind,
        })
    }
}

/// Swing highs and lows ordered by index, most recent last
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SwingPoints {
    pub highs: Vec<SwingPoint>,
    pub lows: Vec<SwingPoint>,
}

impl SwingPoints {
    pub fn is_empty(&self) -> bool {
        self.highs.is_empty() && self.lows.is_empty()
    }

    /// Points of one kind
    pub fn of(&self, kind: SwingKind) -> &[SwingPoint] {
        match kind {
            SwingKind::High => &self.highs,
            SwingKind::Low => &self.lows,
        }
    }

    /// The last `n` points of one kind, oldest first. `None` if fewer exist.
    pub fn last_n(&self, kind: SwingKind, n: usize) -> Option<&[SwingPoint]> {
        let points = self.of(kind);
        (n > 0 && points.len() >= n).then(|| &points[points.len() - n..])
    }

    /// Most recent point of `kind` strictly before `index`
    pub fn last_before(&self, kind: SwingKind, index: usize) -> Option<&SwingPoint> {
        self.of(kind).iter().rev().find(|p| p.index < index)
    }

    /// Points of `kind` strictly between two indices
    pub fn between(
        &self,
        kind: SwingKind,
        start: usize,
        end: usize,
    ) -> impl Iterator<Item = &SwingPoint> {
        self.of(kind)
            .iter()
            .filter(move |p| p.index > start && p.index < end)
    }
}

/// Neighbour range `[i-k, i+k]`, or `None` when it leaves the series
fn window(len: usize, i: usize, k: usize) -> Option<RangeInclusive<usize>> {
    if k == 0 || i < k {
        return None;
    }
    let end = i.checked_add(k).filter(|&end| end < len)?;
    Some(i - k..=end)
}

/// Strict local maximum of highs over `[i-k, i+k]`
pub fn is_swing_high<T: OHLCV>(bars: &[T], i: usize, k: usize) -> bool {
    let Some(range) = window(bars.len(), i, k) else {
        return false;
    };
    let h = bars[i].high();
    range.filter(|&j| j != i).all(|j| h > bars[j].high())
}

/// Strict local minimum of lows over `[i-k, i+k]`
pub fn is_swing_low<T: OHLCV>(bars: &[T], i: usize, k: usize) -> bool {
    let Some(range) = window(bars.len(), i, k) else {
        return false;
    };
    let l = bars[i].low();
    range.filter(|&j| j != i).all(|j| l < bars[j].low())
}

/// Extract swing highs and lows with lookback strength `k`.
///
/// Needs at least `2k + 1` bars; the first and last `k` bars never qualify.
/// A `k` too large for `2k + 1` to fit in `usize` yields nothing.
pub fn find_swing_points<T: OHLCV>(bars: &[T], k: usize) -> SwingPoints {
    let mut swings = SwingPoints::default();
    let span = k.checked_mul(2).and_then(|v| v.checked_add(1));
    match span {
        Some(span) if k > 0 && bars.len() >= span => {}
        _ => return swings,
    }

    for i in k..bars.len() - k {
        if is_swing_high(bars, i, k) {
            swings.highs.extend(SwingPoint::at(bars, i, SwingKind::High));
        }
        if is_swing_low(bars, i, k) {
            swings.lows.extend(SwingPoint::at(bars, i, SwingKind::Low));
        }
    }

    swings
}
