//! Daily → weekly resampling (ISO weeks).

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::domain::PriceBar;

/// One aggregated ISO week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyBar {
    /// Monday of the ISO week.
    pub week_start: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

fn week_monday(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

/// Group chronologically ordered daily bars into ISO weeks.
///
/// Open is the first daily open of the week, close the last daily close.
/// Void bars are skipped.
pub fn resample_weekly(bars: &[PriceBar]) -> Vec<WeeklyBar> {
    let mut weeks: Vec<WeeklyBar> = Vec::new();
    for bar in bars.iter().filter(|b| !b.is_void()) {
        let monday = week_monday(bar.date);
        match weeks.last_mut() {
            Some(week) if week.week_start == monday => {
                week.high = week.high.max(bar.high);
                week.low = week.low.min(bar.low);
                week.close = bar.close;
                week.volume += bar.volume;
            }
            _ => weeks.push(WeeklyBar {
                week_start: monday,
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
                volume: bar.volume,
            }),
        }
    }
    weeks
}

/// Mean of the last `n` weekly closes, `None` with fewer than `n` weeks.
pub fn weekly_close_sma(weeks: &[WeeklyBar], n: usize) -> Option<f64> {
    if n == 0 || weeks.len() < n {
        return None;
    }
    Some(weeks[weeks.len() - n..].iter().map(|w| w.close).sum::<f64>() / n as f64)
}
