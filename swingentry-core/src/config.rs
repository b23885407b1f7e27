//! Engine configuration: typed presets, TOML overrides, sentiment bias.
//!
//! Every threshold the detectors, the RR engine, and the guards read lives
//! here. Presets are fully populated values; overrides and sentiment always
//! produce a fresh copy, so a preset is never mutated in place.
//!
//! Units: fields ending in `_pct` are percentages (`1.5` = 1.5%), fields
//! ending in `_atr` are ATR multiples, `_ratio` / `_fraction` are plain
//! fractions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("config parse error: {0}")]
    Parse(String),

    #[error("config override rejected: {0}")]
    Merge(String),

    #[error("sentiment scores must be within 1..=7 (got short-term {short_term}, long-term {long_term})")]
    InvalidSentiment { short_term: u8, long_term: u8 },
}

/// Named preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Strict,
    Balanced,
    Loose,
}

impl Mode {
    pub const ALL: [Mode; 3] = [Mode::Strict, Mode::Balanced, Mode::Loose];

    pub fn name(self) -> &'static str {
        match self {
            Mode::Strict => "strict",
            Mode::Balanced => "balanced",
            Mode::Loose => "loose",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(Mode::Strict),
            "balanced" => Ok(Mode::Balanced),
            "loose" => Ok(Mode::Loose),
            other => Err(ConfigError::Parse(format!("unknown mode '{other}'"))),
        }
    }
}

/// Short-term / long-term sentiment scores, 1 (very bearish) to 7 (very bullish).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentiment {
    pub short_term: u8,
    pub long_term: u8,
}

impl Sentiment {
    pub const NEUTRAL: u8 = 4;

    pub fn new(short_term: u8, long_term: u8) -> Result<Self, ConfigError> {
        let valid = |s: u8| (1..=7).contains(&s);
        if !valid(short_term) || !valid(long_term) {
            return Err(ConfigError::InvalidSentiment {
                short_term,
                long_term,
            });
        }
        Ok(Self {
            short_term,
            long_term,
        })
    }

    pub fn neutral() -> Self {
        Self {
            short_term: Self::NEUTRAL,
            long_term: Self::NEUTRAL,
        }
    }
}

// ─── Sections ───

/// Resistance / support discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LevelConfig {
    pub resistance_lookback: usize,
    pub support_lookback: usize,
    pub cluster_tolerance_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DipConfig {
    pub min_bars: usize,
    /// Bars before the current one searched for the swing high.
    pub pullback_window: usize,
    /// Bars before the swing high searched for the prior swing low.
    pub swing_lookback: usize,
    pub min_pullback_pct: f64,
    pub min_pullback_atr: f64,
    /// Widening applied to both ends of the 0.5..0.618 band.
    pub fib_tolerance: f64,
    pub strong_bounce_atr: f64,
    pub very_dry_ratio: f64,
    pub max_override_retracement: f64,
    pub max_low_age: usize,
    pub ma_band_atr: f64,
    pub min_pivot_touches: usize,
    pub touch_tolerance_pct: f64,
    pub micro_cluster_bars: usize,
    pub micro_cluster_min: usize,
    pub micro_cluster_pct: f64,
    pub min_bounce_atr: f64,
    pub volume_window: usize,
    pub dry_ratio: f64,
    pub hot_ratio: f64,
    pub recovery_cap_strong_up: f64,
    pub recovery_cap_up: f64,
    pub recovery_cap_weak_up: f64,
    pub recovery_cap_down: f64,
    pub override_headroom_atr: f64,
    pub divergence_check: bool,
    pub divergence_lookback: usize,
    pub divergence_headroom_atr: f64,
    pub stop_atr: f64,
    pub target_atr: f64,
    pub too_close_atr: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BreakoutConfig {
    pub min_bars: usize,
    pub base_len: usize,
    pub tap_band_pct: f64,
    pub min_taps: usize,
    pub max_base_depth_pct: f64,
    pub min_through_pct: f64,
    pub max_gap_pct: f64,
    pub volume_expansion: f64,
    pub rsi_ceiling: f64,
    pub stop_atr: f64,
    pub target_atr: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetestConfig {
    pub min_bars: usize,
    pub lookback: usize,
    pub min_through_pct: f64,
    pub touch_band_pct: f64,
    pub hold_tolerance_pct: f64,
    pub max_touch_age: usize,
    pub volume_window: usize,
    pub volume_ratio: f64,
    pub stop_atr: f64,
    pub target_atr: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReclaimConfig {
    pub min_bars: usize,
    pub buffer_pct: f64,
    pub rsi_min: f64,
    pub rsi_max: f64,
    pub volume_window: usize,
    pub volume_ratio: f64,
    pub stop_atr: f64,
    pub target_atr: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InsideDayConfig {
    pub min_bars: usize,
    /// Close must sit in this top fraction of the inside bar's range.
    pub upper_fraction: f64,
    pub stop_atr: f64,
    pub target_atr: f64,
}

/// What the horizon cap does with a target that implies too large a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HorizonPolicy {
    Clamp,
    Reject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RiskConfig {
    pub min_stop_atr_strong_up: f64,
    pub min_stop_atr_up: f64,
    pub min_stop_atr_weak_up: f64,
    pub min_stop_atr_down: f64,
    pub dip_fallback_stop_atr: f64,
    pub hop_threshold_atr: f64,
    pub dip_min_target_atr: f64,
    pub dip_min_target_pct: f64,
    pub base_rr: f64,
    pub strong_up_rr_bump: f64,
    pub weak_up_rr_bump: f64,
    pub low_vol_atr_pct: f64,
    pub low_vol_rr_bump: f64,
    pub high_vol_atr_pct: f64,
    pub high_vol_rr_bump: f64,
    pub dip_min_rr: f64,
    /// Largest shift of the required ratio an external score may cause.
    pub external_score_weight: f64,
    pub scoot_enabled: bool,
    pub scoot_max_hops: usize,
    pub scoot_cap_atr: f64,
    pub wall_lookback: usize,
    pub wall_min_gap_pct: f64,
    pub wall_volume_mult: f64,
    pub wall_wick_fraction: f64,
    pub horizon_bars: usize,
    pub atr_per_bar: f64,
    pub horizon_policy: HorizonPolicy,
    pub probation_slack: f64,
    pub probation_rsi_max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GuardConfig {
    pub hard_rsi: f64,
    pub min_headroom_atr: f64,
    pub min_headroom_pct: f64,
    pub too_close_atr: f64,
    pub max_ma25_atr: f64,
    pub ma25_margin_atr: f64,
    pub max_up_streak: usize,
    pub weekly_range_weeks: usize,
    pub weekly_top_fraction: f64,
    pub strong_up_top_bump: f64,
    pub weekly_bottom_fraction: f64,
    pub weekly_fast_ma: usize,
    pub weekly_slow_ma: usize,
    pub max_index_move_pct: f64,
    pub max_index_move_atr: f64,
    pub liquidity_window: usize,
    pub min_dollar_volume: f64,
    pub min_avg_volume: f64,
    pub min_price: f64,
    pub min_atr_ticks: f64,
    /// Fraction of a liquidity threshold below which the guard vetoes.
    pub hard_fraction: f64,
}

/// Exit milestone timeline, in R multiples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExitConfig {
    pub breakeven_r: f64,
    pub lock_r: f64,
    pub lock_fraction: f64,
    pub trail_r: f64,
    pub trail_ma25_atr: f64,
}

/// Complete, immutable engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    pub mode: Mode,
    pub levels: LevelConfig,
    pub dip: DipConfig,
    pub breakout: BreakoutConfig,
    pub retest: RetestConfig,
    pub reclaim: ReclaimConfig,
    pub inside_day: InsideDayConfig,
    pub risk: RiskConfig,
    pub guards: GuardConfig,
    pub exits: ExitConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::balanced()
    }
}

impl EngineConfig {
    pub fn preset(mode: Mode) -> Self {
        match mode {
            Mode::Strict => Self::strict(),
            Mode::Balanced => Self::balanced(),
            Mode::Loose => Self::loose(),
        }
    }

    pub fn balanced() -> Self {
        Self {
            mode: Mode::Balanced,
            levels: LevelConfig {
                resistance_lookback: 120,
                support_lookback: 120,
                cluster_tolerance_pct: 1.0,
            },
            dip: DipConfig {
                min_bars: 25,
                pullback_window: 10,
                swing_lookback: 20,
                min_pullback_pct: 3.0,
                min_pullback_atr: 1.5,
                fib_tolerance: 0.12,
                strong_bounce_atr: 1.2,
                very_dry_ratio: 0.6,
                max_override_retracement: 0.85,
                max_low_age: 5,
                ma_band_atr: 0.75,
                min_pivot_touches: 2,
                touch_tolerance_pct: 1.5,
                micro_cluster_bars: 5,
                micro_cluster_min: 3,
                micro_cluster_pct: 1.0,
                min_bounce_atr: 0.5,
                volume_window: 20,
                dry_ratio: 0.9,
                hot_ratio: 1.2,
                recovery_cap_strong_up: 0.75,
                recovery_cap_up: 0.65,
                recovery_cap_weak_up: 0.55,
                recovery_cap_down: 0.45,
                override_headroom_atr: 2.5,
                divergence_check: true,
                divergence_lookback: 30,
                divergence_headroom_atr: 1.5,
                stop_atr: 0.5,
                target_atr: 2.5,
                too_close_atr: 0.75,
            },
            breakout: BreakoutConfig {
                min_bars: 25,
                base_len: 10,
                tap_band_pct: 0.5,
                min_taps: 2,
                max_base_depth_pct: 8.0,
                min_through_pct: 0.3,
                max_gap_pct: 3.0,
                volume_expansion: 1.5,
                rsi_ceiling: 75.0,
                stop_atr: 1.0,
                target_atr: 2.0,
            },
            retest: RetestConfig {
                min_bars: 25,
                lookback: 30,
                min_through_pct: 0.3,
                touch_band_pct: 1.5,
                hold_tolerance_pct: 1.0,
                max_touch_age: 5,
                volume_window: 20,
                volume_ratio: 1.1,
                stop_atr: 0.5,
                target_atr: 2.5,
            },
            reclaim: ReclaimConfig {
                min_bars: 26,
                buffer_pct: 0.3,
                rsi_min: 40.0,
                rsi_max: 65.0,
                volume_window: 20,
                volume_ratio: 1.0,
                stop_atr: 0.5,
                target_atr: 2.5,
            },
            inside_day: InsideDayConfig {
                min_bars: 25,
                upper_fraction: 1.0 / 3.0,
                stop_atr: 0.25,
                target_atr: 2.0,
            },
            risk: RiskConfig {
                min_stop_atr_strong_up: 0.8,
                min_stop_atr_up: 1.0,
                min_stop_atr_weak_up: 1.1,
                min_stop_atr_down: 1.3,
                dip_fallback_stop_atr: 1.2,
                hop_threshold_atr: 0.6,
                dip_min_target_atr: 1.5,
                dip_min_target_pct: 3.0,
                base_rr: 1.5,
                strong_up_rr_bump: 0.1,
                weak_up_rr_bump: 0.2,
                low_vol_atr_pct: 1.0,
                low_vol_rr_bump: 0.2,
                high_vol_atr_pct: 5.0,
                high_vol_rr_bump: 0.3,
                dip_min_rr: 1.6,
                external_score_weight: 0.2,
                scoot_enabled: true,
                scoot_max_hops: 2,
                scoot_cap_atr: 4.0,
                wall_lookback: 60,
                wall_min_gap_pct: 1.0,
                wall_volume_mult: 2.0,
                wall_wick_fraction: 0.5,
                horizon_bars: 10,
                atr_per_bar: 0.45,
                horizon_policy: HorizonPolicy::Clamp,
                probation_slack: 0.15,
                probation_rsi_max: 65.0,
            },
            guards: GuardConfig {
                hard_rsi: 78.0,
                min_headroom_atr: 1.0,
                min_headroom_pct: 1.5,
                too_close_atr: 0.5,
                max_ma25_atr: 2.5,
                ma25_margin_atr: 0.1,
                max_up_streak: 5,
                weekly_range_weeks: 12,
                weekly_top_fraction: 0.5,
                strong_up_top_bump: 0.1,
                weekly_bottom_fraction: 0.2,
                weekly_fast_ma: 13,
                weekly_slow_ma: 26,
                max_index_move_pct: 2.0,
                max_index_move_atr: 1.5,
                liquidity_window: 20,
                min_dollar_volume: 1_000_000.0,
                min_avg_volume: 50_000.0,
                min_price: 1.0,
                min_atr_ticks: 5.0,
                hard_fraction: 0.5,
            },
            exits: ExitConfig {
                breakeven_r: 1.0,
                lock_r: 1.5,
                lock_fraction: 0.5,
                trail_r: 2.0,
                trail_ma25_atr: 1.0,
            },
        }
    }

    /// Fewer, cleaner entries: tighter bands, higher required ratio.
    pub fn strict() -> Self {
        let mut c = Self::balanced();
        c.mode = Mode::Strict;
        c.dip.fib_tolerance = 0.08;
        c.dip.max_low_age = 4;
        c.dip.min_bounce_atr = 0.6;
        c.dip.dry_ratio = 0.85;
        c.dip.hot_ratio = 1.3;
        c.breakout.min_taps = 3;
        c.breakout.volume_expansion = 1.8;
        c.breakout.rsi_ceiling = 72.0;
        c.retest.volume_ratio = 1.2;
        c.reclaim.volume_ratio = 1.2;
        c.risk.base_rr = 1.8;
        c.risk.dip_min_rr = 1.8;
        c.risk.probation_slack = 0.1;
        c.risk.horizon_policy = HorizonPolicy::Reject;
        c.guards.hard_rsi = 75.0;
        c.guards.max_up_streak = 4;
        c.guards.weekly_top_fraction = 0.45;
        c.guards.max_ma25_atr = 2.0;
        c
    }

    /// More entries: wider bands, lower required ratio.
    pub fn loose() -> Self {
        let mut c = Self::balanced();
        c.mode = Mode::Loose;
        c.dip.fib_tolerance = 0.18;
        c.dip.max_low_age = 7;
        c.dip.min_bounce_atr = 0.4;
        c.dip.dry_ratio = 1.0;
        c.dip.hot_ratio = 1.1;
        c.breakout.volume_expansion = 1.3;
        c.breakout.rsi_ceiling = 78.0;
        c.retest.volume_ratio = 1.0;
        c.reclaim.volume_ratio = 0.9;
        c.risk.base_rr = 1.3;
        c.risk.dip_min_rr = 1.4;
        c.risk.probation_slack = 0.2;
        c.guards.hard_rsi = 80.0;
        c.guards.max_up_streak = 6;
        c.guards.weekly_top_fraction = 0.6;
        c.guards.max_ma25_atr = 3.0;
        c
    }

    /// Parse a (possibly partial) TOML override document.
    pub fn parse_overrides(text: &str) -> Result<toml::Table, ConfigError> {
        text.parse::<toml::Table>()
            .map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Deep-merge a partial table over a copy of this config.
    ///
    /// Unknown keys and type mismatches are rejected.
    pub fn with_overrides(&self, overrides: &toml::Table) -> Result<Self, ConfigError> {
        let mut base =
            toml::Value::try_from(self).map_err(|e| ConfigError::Merge(e.to_string()))?;
        merge_into(&mut base, overrides);
        base.try_into()
            .map_err(|e: toml::de::Error| ConfigError::Merge(e.to_string()))
    }

    /// Copy biased by sentiment. Neutral scores leave the config unchanged.
    pub fn with_sentiment(&self, sentiment: Sentiment) -> Self {
        let mut c = self.clone();
        if sentiment.short_term >= 6 {
            c.risk.base_rr -= 0.1;
            c.guards.hard_rsi += 2.0;
        } else if sentiment.short_term <= 2 {
            c.risk.base_rr += 0.2;
            c.guards.hard_rsi -= 2.0;
        }
        if sentiment.long_term >= 6 {
            c.guards.weekly_top_fraction += 0.05;
        } else if sentiment.long_term <= 2 {
            c.guards.weekly_top_fraction -= 0.05;
        }
        c
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Stable content hash (blake3 over canonical JSON).
    pub fn fingerprint(&self) -> String {
        match serde_json::to_vec(self) {
            Ok(bytes) => blake3::hash(&bytes).to_hex().to_string(),
            Err(_) => String::new(),
        }
    }
}

fn merge_into(base: &mut toml::Value, overrides: &toml::Table) {
    let toml::Value::Table(table) = base else {
        return;
    };
    for (key, value) in overrides {
        match (table.get_mut(key), value) {
            (Some(existing @ toml::Value::Table(_)), toml::Value::Table(sub)) => {
                merge_into(existing, sub);
            }
            _ => {
                table.insert(key.clone(), value.clone());
            }
        }
    }
}
