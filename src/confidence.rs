//! Confidence scoring shared by every formation detector.

/// Starting score before any factor is applied
pub const BASE_CONFIDENCE: f64 = 50.0;
pub const MIN_CONFIDENCE: f64 = 35.0;
pub const MAX_CONFIDENCE: f64 = 95.0;

/// Heuristic inputs to [`score`].
///
/// `symmetry` and `swing_clarity` are signed in `-1.0..=1.0`, where `0.0` is
/// neutral and negative values penalize the score.
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct ConfidenceFactors {
    /// Last volume over trailing average volume
    pub volume_ratio: f64,
    pub symmetry: f64,
    pub trend_aligned: bool,
    pub swing_clarity: f64,
    /// Price already moved past the entry in the trade direction
    pub price_confirmation: bool,
}

impl ConfidenceFactors {
    #[inline]
    pub fn score(&self) -> f64 {
        score(self)
    }
}

/// Combine factors into a confidence in `[35, 95]`.
pub fn score(factors: &ConfidenceFactors) -> f64 {
    let mut confidence = BASE_CONFIDENCE;

    let volume_ratio = finite_or(factors.volume_ratio, 0.0);
    if volume_ratio > 1.5 {
        confidence += 15.0;
    } else if volume_ratio > 1.2 {
        confidence += 10.0;
    }

    confidence += finite_or(factors.symmetry, 0.0).clamp(-1.0, 1.0) * 15.0;

    if factors.trend_aligned {
        confidence += 10.0;
    }

    confidence += finite_or(factors.swing_clarity, 0.0).clamp(-1.0, 1.0) * 10.0;

    if factors.price_confirmation {
        confidence += 5.0;
    }

    confidence.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE)
}

#[inline]
fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}
