//! Single- and two-bar bounce patterns.

use serde::{Deserialize, Serialize};

use crate::domain::PriceBar;

/// Bullish bounce pattern recognized on the most recent bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BouncePattern {
    BullishEngulfing,
    Hammer,
    TwoBarReversal,
    CloseAbovePriorHigh,
    StrongGreen,
}

impl BouncePattern {
    pub fn label(self) -> &'static str {
        match self {
            BouncePattern::BullishEngulfing => "bullish engulfing",
            BouncePattern::Hammer => "hammer",
            BouncePattern::TwoBarReversal => "two-bar reversal",
            BouncePattern::CloseAbovePriorHigh => "close above prior high",
            BouncePattern::StrongGreen => "strong green close",
        }
    }
}

impl std::fmt::Display for BouncePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Previous bar red, current bar green and its body covers the previous body.
pub fn is_bullish_engulfing(prev: &PriceBar, cur: &PriceBar) -> bool {
    prev.is_red() && cur.is_green() && cur.open <= prev.close && cur.close >= prev.open
}

/// Long lower wick (≥ 2× body), small upper wick, close in the upper 40%.
pub fn is_hammer(cur: &PriceBar) -> bool {
    let range = cur.range();
    if range <= 0.0 {
        return false;
    }
    let body = cur.body();
    cur.lower_wick() >= 2.0 * body.max(range * 0.05)
        && cur.upper_wick() <= range * 0.3
        && cur.close_location().is_some_and(|loc| loc >= 0.6)
}

/// Red bar closing in its lower half followed by a green bar closing above
/// the red bar's midpoint.
pub fn is_two_bar_reversal(prev: &PriceBar, cur: &PriceBar) -> bool {
    let prev_weak = prev.is_red() && prev.close_location().is_some_and(|loc| loc <= 0.5);
    let mid = (prev.high + prev.low) / 2.0;
    prev_weak && cur.is_green() && cur.close > mid
}

pub fn closes_above_prior_high(prev: &PriceBar, cur: &PriceBar) -> bool {
    cur.close > prev.high
}

/// Green body of at least half an ATR closing in the top 30% of the range.
pub fn is_strong_green(cur: &PriceBar, atr: f64) -> bool {
    cur.is_green()
        && atr > 0.0
        && cur.body() >= 0.5 * atr
        && cur.close_location().is_some_and(|loc| loc >= 0.7)
}

/// First matching pattern in priority order.
pub fn detect_bounce(prev: &PriceBar, cur: &PriceBar, atr: f64) -> Option<BouncePattern> {
    if is_bullish_engulfing(prev, cur) {
        Some(BouncePattern::BullishEngulfing)
    } else if is_hammer(cur) {
        Some(BouncePattern::Hammer)
    } else if is_two_bar_reversal(prev, cur) {
        Some(BouncePattern::TwoBarReversal)
    } else if closes_above_prior_high(prev, cur) {
        Some(BouncePattern::CloseAbovePriorHigh)
    } else if is_strong_green(cur, atr) {
        Some(BouncePattern::StrongGreen)
    } else {
        None
    }
}
