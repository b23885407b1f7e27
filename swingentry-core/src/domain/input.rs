//! The single validation boundary between caller data and the engine.
//!
//! Everything downstream of [`MarketInput::validate`] sees sorted, sane bars
//! and a snapshot whose unknown fields are `None`.

use chrono::NaiveDate;
use thiserror::Error;

use super::bar::PriceBar;
use super::snapshot::{positive, RawSnapshot, Snapshot};
use crate::indicators::{latest_atr, latest_rsi};

/// Why an input could not be evaluated at all.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InputError {
    #[error("insufficient data: {have} bars, need {need}")]
    InsufficientBars { have: usize, need: usize },

    #[error("invalid last bar on {date}: {detail}")]
    InvalidLastBar { date: NaiveDate, detail: String },

    #[error("no usable price in snapshot or bars")]
    MissingPrice,

    #[error("volatility unknown: no ATR in snapshot and bars too short to derive one")]
    MissingVolatility,
}

/// Validated evaluation input.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketInput {
    pub snapshot: Snapshot,
    pub bars: Vec<PriceBar>,
}

/// Standard indicator periods.
pub const ATR_PERIOD: usize = 14;
pub const RSI_PERIOD: usize = 14;

impl MarketInput {
    /// Validate raw caller input.
    ///
    /// Bars are sorted by date with duplicate dates collapsed (last wins).
    /// Insane bars before the last one are dropped; an insane last bar is an
    /// error because every detector reads it.
    pub fn validate(
        raw: &RawSnapshot,
        bars: &[PriceBar],
        min_bars: usize,
    ) -> Result<Self, InputError> {
        let mut sorted: Vec<PriceBar> = bars.to_vec();
        sorted.sort_by_key(|b| b.date);
        // dedup_by keeps the first of a run; reverse so the last submitted bar wins.
        sorted.reverse();
        sorted.dedup_by_key(|b| b.date);
        sorted.reverse();

        if sorted.len() < min_bars {
            return Err(InputError::InsufficientBars {
                have: sorted.len(),
                need: min_bars,
            });
        }

        let last = sorted.last().ok_or(InputError::InsufficientBars {
            have: 0,
            need: min_bars,
        })?;
        if !last.is_sane() {
            let detail = if last.is_void() {
                "missing OHLC field".to_string()
            } else {
                format!(
                    "inconsistent OHLCV o={} h={} l={} c={} v={}",
                    last.open, last.high, last.low, last.close, last.volume
                )
            };
            return Err(InputError::InvalidLastBar {
                date: last.date,
                detail,
            });
        }

        let last_idx = sorted.len() - 1;
        let cleaned: Vec<PriceBar> = sorted
            .into_iter()
            .enumerate()
            .filter(|(i, b)| *i == last_idx || b.is_sane())
            .map(|(_, b)| b)
            .collect();
        if cleaned.len() < min_bars {
            return Err(InputError::InsufficientBars {
                have: cleaned.len(),
                need: min_bars,
            });
        }

        let price = positive(raw.price)
            .or_else(|| cleaned.last().map(|b| b.close))
            .filter(|p| *p > 0.0)
            .ok_or(InputError::MissingPrice)?;

        let atr = positive(raw.atr14)
            .or_else(|| latest_atr(&cleaned, ATR_PERIOD))
            .filter(|a| *a > 0.0)
            .ok_or(InputError::MissingVolatility)?;

        let mut snapshot = Snapshot::from_raw(raw, price, atr);
        if snapshot.rsi.is_none() {
            snapshot.rsi = latest_rsi(&cleaned, RSI_PERIOD);
        }

        Ok(Self {
            snapshot,
            bars: cleaned,
        })
    }

    /// Most recent bar. `validate` never produces an empty series.
    pub fn last_bar(&self) -> &PriceBar {
        &self.bars[self.bars.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}
