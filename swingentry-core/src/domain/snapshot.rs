//! Indicator snapshot: raw (as supplied by the caller) and validated forms.

use serde::{Deserialize, Serialize};

/// Snapshot exactly as supplied by the upstream quote/indicator layer.
///
/// Every numeric field may be missing or non-finite. Nothing downstream reads
/// this type directly; it is converted once by [`Snapshot::from_raw`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSnapshot {
    #[serde(default)]
    pub ticker: String,
    #[serde(default, alias = "currentPrice")]
    pub price: Option<f64>,
    #[serde(default, alias = "openPrice")]
    pub open: Option<f64>,
    #[serde(default)]
    pub prev_close: Option<f64>,
    #[serde(default, alias = "movingAverage5d")]
    pub ma5: Option<f64>,
    #[serde(default, alias = "movingAverage20d")]
    pub ma20: Option<f64>,
    #[serde(default, alias = "movingAverage25d")]
    pub ma25: Option<f64>,
    #[serde(default, alias = "movingAverage50d")]
    pub ma50: Option<f64>,
    #[serde(default, alias = "movingAverage75d")]
    pub ma75: Option<f64>,
    #[serde(default, alias = "movingAverage200d")]
    pub ma200: Option<f64>,
    #[serde(default)]
    pub rsi14: Option<f64>,
    #[serde(default)]
    pub atr14: Option<f64>,
    #[serde(default)]
    pub macd: Option<f64>,
    #[serde(default)]
    pub macd_signal: Option<f64>,
    #[serde(default)]
    pub bb_upper: Option<f64>,
    #[serde(default)]
    pub bb_lower: Option<f64>,
    #[serde(default, alias = "fiftyTwoWeekHigh")]
    pub high_52w: Option<f64>,
    #[serde(default, alias = "fiftyTwoWeekLow")]
    pub low_52w: Option<f64>,
    #[serde(default)]
    pub tick_size: Option<f64>,
}

/// Validated snapshot. `None` always means "unknown", never zero.
///
/// `price` and `atr` are guaranteed: the validation boundary fills them from
/// bars when the raw values are unknown, or rejects the input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub ticker: String,
    pub price: f64,
    pub atr: f64,
    pub open: Option<f64>,
    pub prev_close: Option<f64>,
    pub ma5: Option<f64>,
    pub ma20: Option<f64>,
    pub ma25: Option<f64>,
    pub ma50: Option<f64>,
    pub ma75: Option<f64>,
    pub ma200: Option<f64>,
    pub rsi: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub bb_upper: Option<f64>,
    pub bb_lower: Option<f64>,
    pub high_52w: Option<f64>,
    pub low_52w: Option<f64>,
    pub tick_size: Option<f64>,
}

/// Keep a value only when it is a finite, strictly positive price-like number.
pub fn positive(v: Option<f64>) -> Option<f64> {
    v.filter(|x| x.is_finite() && *x > 0.0)
}

/// Keep a value only when it is finite.
pub fn finite(v: Option<f64>) -> Option<f64> {
    v.filter(|x| x.is_finite())
}

impl Snapshot {
    /// Normalize a raw snapshot. `price` and `atr` come from the caller, who
    /// has already resolved them against the bar series.
    pub fn from_raw(raw: &RawSnapshot, price: f64, atr: f64) -> Self {
        Self {
            ticker: raw.ticker.clone(),
            price,
            atr,
            open: positive(raw.open),
            prev_close: positive(raw.prev_close),
            ma5: positive(raw.ma5),
            ma20: positive(raw.ma20),
            ma25: positive(raw.ma25),
            ma50: positive(raw.ma50),
            ma75: positive(raw.ma75),
            ma200: positive(raw.ma200),
            rsi: finite(raw.rsi14).filter(|r| (0.0..=100.0).contains(r)),
            macd: finite(raw.macd),
            macd_signal: finite(raw.macd_signal),
            bb_upper: positive(raw.bb_upper),
            bb_lower: positive(raw.bb_lower),
            high_52w: positive(raw.high_52w),
            low_52w: positive(raw.low_52w),
            tick_size: positive(raw.tick_size),
        }
    }

    /// ATR expressed as a percentage of price.
    pub fn atr_pct(&self) -> f64 {
        self.atr / self.price * 100.0
    }
}
