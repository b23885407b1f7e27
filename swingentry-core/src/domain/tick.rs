use serde::{Deserialize, Serialize};

/// Tick rounding policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TickPolicy {
    /// Round to nearest tick
    RoundNearest,
    /// Round down (stops sit below the computed price)
    RoundDown,
    /// Round up (targets sit above the computed price)
    RoundUp,
}

/// Tolerance absorbing float noise such as `95.6 / 0.01 = 9559.999...`.
const TICK_EPSILON: f64 = 1e-7;

/// Round `price` to a multiple of `tick` according to `policy`.
///
/// Non-positive or non-finite ticks leave the price untouched.
pub fn round_to_tick(price: f64, tick: f64, policy: TickPolicy) -> f64 {
    if !(tick.is_finite() && tick > 0.0) || !price.is_finite() {
        return price;
    }
    let ticks = price / tick;
    let rounded_ticks = match policy {
        TickPolicy::RoundNearest => ticks.round(),
        TickPolicy::RoundDown => (ticks + TICK_EPSILON).floor(),
        TickPolicy::RoundUp => (ticks - TICK_EPSILON).ceil(),
    };
    // Re-derive through the decimal count of the tick so 0.1-style ticks print cleanly.
    let scaled = rounded_ticks * tick;
    let decimals = tick_decimals(tick);
    let factor = 10f64.powi(decimals);
    (scaled * factor).round() / factor
}

fn tick_decimals(tick: f64) -> i32 {
    let mut decimals = 0;
    let mut t = tick;
    while decimals < 8 && (t - t.round()).abs() > 1e-9 {
        t *= 10.0;
        decimals += 1;
    }
    decimals
}

/// One price tier: prices up to and including `up_to` trade in `tick` increments.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TickTier {
    pub up_to: f64,
    pub tick: f64,
}

/// Price-tier tick table used when the snapshot carries no tick size.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TickTable {
    pub tiers: Vec<TickTier>,
    /// Tick for prices above the last tier.
    pub top_tick: f64,
}

impl TickTable {
    /// Standard cash-equity tiers (1 / 5 / 10 / 50 / 100 / 500 / 1,000 units).
    pub fn standard() -> Self {
        let tier = |up_to, tick| TickTier { up_to, tick };
        Self {
            tiers: vec![
                tier(3_000.0, 1.0),
                tier(5_000.0, 5.0),
                tier(30_000.0, 10.0),
                tier(50_000.0, 50.0),
                tier(300_000.0, 100.0),
                tier(500_000.0, 500.0),
                tier(3_000_000.0, 1_000.0),
            ],
            top_tick: 5_000.0,
        }
    }

    /// Tick size for a given price.
    pub fn tick_for(&self, price: f64) -> f64 {
        self.tiers
            .iter()
            .find(|t| price <= t.up_to)
            .map(|t| t.tick)
            .unwrap_or(self.top_tick)
    }
}

impl Default for TickTable {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_rounding() {
        assert_eq!(round_to_tick(100.126, 0.01, TickPolicy::RoundNearest), 100.13);
        assert_eq!(round_to_tick(100.124, 0.01, TickPolicy::RoundNearest), 100.12);
    }

    #[test]
    fn side_aware_rounding() {
        assert_eq!(round_to_tick(4500.10, 0.25, TickPolicy::RoundDown), 4500.00);
        assert_eq!(round_to_tick(4500.10, 0.25, TickPolicy::RoundUp), 4500.25);
    }

    #[test]
    fn aligned_prices_survive_float_noise() {
        assert_eq!(round_to_tick(95.6, 0.01, TickPolicy::RoundDown), 95.6);
        assert_eq!(round_to_tick(102.4, 0.01, TickPolicy::RoundUp), 102.4);
        assert_eq!(round_to_tick(0.3, 0.1, TickPolicy::RoundUp), 0.3);
    }

    #[test]
    fn invalid_tick_is_identity() {
        assert_eq!(round_to_tick(12.345, 0.0, TickPolicy::RoundDown), 12.345);
        assert_eq!(round_to_tick(12.345, f64::NAN, TickPolicy::RoundUp), 12.345);
    }

    #[test]
    fn tier_lookup() {
        let table = TickTable::standard();
        assert_eq!(table.tick_for(2_999.0), 1.0);
        assert_eq!(table.tick_for(3_000.0), 1.0);
        assert_eq!(table.tick_for(3_001.0), 5.0);
        assert_eq!(table.tick_for(45_000.0), 50.0);
        assert_eq!(table.tick_for(9_000_000.0), 5_000.0);
    }
}
