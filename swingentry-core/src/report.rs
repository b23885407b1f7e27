//! Buy-now comparison report over backtest events.
//!
//! Splits a backtest's events by `signal.buyNow` and compares trade outcomes
//! of the two groups: win rate, R statistics, profit factor, exit mix, and
//! excursions. Numeric fields are read leniently (numbers or numeric
//! strings); anything else counts as missing.

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to parse backtest JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no events[] found in backtest JSON")]
    MissingEvents,
}

/// Outcome statistics for one group of events.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupSummary {
    pub trades: usize,
    pub wins: usize,
    pub win_rate_pct: f64,
    pub avg_r: f64,
    pub med_r: f64,
    pub expectancy_r: f64,
    pub profit_factor: f64,
    pub avg_return_pct: f64,
    pub avg_hold_days: f64,
    pub target_hit_pct: f64,
    pub stop_hit_pct: f64,
    pub time_exit_pct: f64,
    pub avg_rr_at_entry: f64,
    pub avg_mae_pct: f64,
    pub avg_mfe_pct: f64,
}

impl GroupSummary {
    pub fn from_events(events: &[&Value]) -> Self {
        let sim_num = |key: &str| -> Vec<Option<f64>> {
            events
                .iter()
                .map(|e| sim_field(e, key).and_then(number))
                .collect()
        };

        let n = events.len();
        let wins = events
            .iter()
            .filter(|e| sim_field(e, "result").and_then(Value::as_str) == Some("WIN"))
            .count();
        let exits = |kind: &str| {
            events
                .iter()
                .filter(|e| sim_field(e, "exitType").and_then(Value::as_str) == Some(kind))
                .count()
        };
        let r_values = sim_num("R");
        let rr_values: Vec<Option<f64>> = events
            .iter()
            .map(|e| e.get("risk").and_then(|r| r.get("rrAtEntry")).and_then(number))
            .collect();

        Self {
            trades: n,
            wins,
            win_rate_pct: pct(wins, n),
            avg_r: mean(&r_values),
            med_r: median(&r_values),
            expectancy_r: mean(&r_values),
            profit_factor: profit_factor(&r_values),
            avg_return_pct: mean(&sim_num("returnPct")),
            avg_hold_days: mean(&sim_num("holdingDays")),
            target_hit_pct: pct(exits("TARGET"), n),
            stop_hit_pct: pct(exits("STOP"), n),
            time_exit_pct: pct(exits("TIME"), n),
            avg_rr_at_entry: mean(&rr_values),
            avg_mae_pct: mean(&sim_num("maePct")),
            avg_mfe_pct: mean(&sim_num("mfePct")),
        }
    }

    /// Metrics that have a delta, keyed by their report label.
    fn comparable(&self) -> [(&'static str, f64); 13] {
        [
            ("win_rate_%", self.win_rate_pct),
            ("avg_R", self.avg_r),
            ("med_R", self.med_r),
            ("exp_R", self.expectancy_r),
            ("profit_factor", self.profit_factor),
            ("avg_return_%", self.avg_return_pct),
            ("avg_hold_days", self.avg_hold_days),
            ("target_hit_%", self.target_hit_pct),
            ("stop_hit_%", self.stop_hit_pct),
            ("time_exit_%", self.time_exit_pct),
            ("avg_rr_at_entry", self.avg_rr_at_entry),
            ("avg_mae_%", self.avg_mae_pct),
            ("avg_mfe_%", self.avg_mfe_pct),
        ]
    }

    fn rows(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Trades", self.trades.to_string()),
            ("Wins", self.wins.to_string()),
            ("Win rate %", fmt_num(self.win_rate_pct)),
            ("Avg R", fmt_num(self.avg_r)),
            ("Med R", fmt_num(self.med_r)),
            ("Expectancy R", fmt_num(self.expectancy_r)),
            ("Profit factor", fmt_num(self.profit_factor)),
            ("Avg return %", fmt_num(self.avg_return_pct)),
            ("Avg hold (days)", fmt_num(self.avg_hold_days)),
            ("Target hit %", fmt_num(self.target_hit_pct)),
            ("Stop hit %", fmt_num(self.stop_hit_pct)),
            ("Time exit %", fmt_num(self.time_exit_pct)),
            ("Avg RR at entry", fmt_num(self.avg_rr_at_entry)),
            ("Avg MAE %", fmt_num(self.avg_mae_pct)),
            ("Avg MFE %", fmt_num(self.avg_mfe_pct)),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuyNowReport {
    pub version: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub total_events: usize,
    pub buy_now: GroupSummary,
    pub wait: GroupSummary,
}

impl BuyNowReport {
    pub fn from_json(text: &str) -> Result<Self, ReportError> {
        let doc: Value = serde_json::from_str(text)?;
        Self::from_value(&doc)
    }

    pub fn from_value(doc: &Value) -> Result<Self, ReportError> {
        let events = doc
            .get("events")
            .and_then(Value::as_array)
            .ok_or(ReportError::MissingEvents)?;
        let (yes, no): (Vec<&Value>, Vec<&Value>) = events.iter().partition(|e| {
            e.get("signal")
                .and_then(|s| s.get("buyNow"))
                .and_then(Value::as_bool)
                == Some(true)
        });
        let text_field = |key: &str| {
            doc.get(key).filter(|v| !v.is_null()).map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
        };
        Ok(Self {
            version: text_field("version"),
            from: text_field("from").filter(|s| !s.is_empty()),
            to: text_field("to").filter(|s| !s.is_empty()),
            total_events: events.len(),
            buy_now: GroupSummary::from_events(&yes),
            wait: GroupSummary::from_events(&no),
        })
    }

    /// TRUE minus FALSE per metric; NaN unless both sides are finite.
    pub fn deltas(&self) -> Vec<(&'static str, f64)> {
        self.buy_now
            .comparable()
            .into_iter()
            .zip(self.wait.comparable())
            .map(|((key, a), (_, b))| {
                let d = if a.is_finite() && b.is_finite() {
                    a - b
                } else {
                    f64::NAN
                };
                (key, d)
            })
            .collect()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("BUY NOW COMPARISON REPORT\n");
        out.push_str("==========================\n");
        if let Some(v) = &self.version {
            out.push_str(&format!("Version : {v}\n"));
        }
        if self.from.is_some() || self.to.is_some() {
            out.push_str(&format!(
                "Range   : {} → {}\n",
                self.from.as_deref().unwrap_or("?"),
                self.to.as_deref().unwrap_or("?")
            ));
        }
        out.push_str(&format!("Total events: {}\n", self.total_events));
        out.push_str("==========================\n");

        render_table(&mut out, "Group: buyNow = TRUE", &self.buy_now.rows());
        render_table(&mut out, "Group: buyNow = FALSE", &self.wait.rows());

        let deltas: Vec<(&str, String)> = self
            .deltas()
            .into_iter()
            .map(|(k, v)| (k, fmt_num(v)))
            .collect();
        render_table(&mut out, "Δ True - False", &deltas);
        out
    }
}

impl std::fmt::Display for BuyNowReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────

fn sim_field<'a>(event: &'a Value, key: &str) -> Option<&'a Value> {
    event.get("simulation").and_then(|s| s.get(key))
}

fn render_table(out: &mut String, title: &str, rows: &[(&str, String)]) {
    let width_k = rows.iter().map(|(k, _)| k.chars().count()).max().unwrap_or(0);
    let width_v = rows.iter().map(|(_, v)| v.chars().count()).max().unwrap_or(0);
    let bar = "-".repeat(width_k + width_v + 5);
    out.push_str(&format!("\n{title}\n{bar}\n"));
    for (k, v) in rows {
        let pad_k = width_k - k.chars().count();
        let pad_v = width_v - v.chars().count();
        out.push_str(&format!(
            "{k}{} : {}{v}\n",
            " ".repeat(pad_k),
            " ".repeat(pad_v)
        ));
    }
    out.push_str(&bar);
    out.push('\n');
}

/// Two decimals; "∞" for infinities, "NaN" for NaN.
pub fn fmt_num(x: f64) -> String {
    if x.is_infinite() {
        "∞".to_string()
    } else if x.is_nan() {
        "NaN".to_string()
    } else {
        format!("{x:.2}")
    }
}

/// A number or a numeric string.
fn number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn finite(values: &[Option<f64>]) -> Vec<f64> {
    values.iter().flatten().copied().filter(|v| v.is_finite()).collect()
}

fn pct(n: usize, d: usize) -> f64 {
    if d == 0 {
        f64::NAN
    } else {
        100.0 * n as f64 / d as f64
    }
}

fn mean(values: &[Option<f64>]) -> f64 {
    let ys = finite(values);
    if ys.is_empty() {
        f64::NAN
    } else {
        ys.iter().sum::<f64>() / ys.len() as f64
    }
}

fn median(values: &[Option<f64>]) -> f64 {
    let mut ys = finite(values);
    if ys.is_empty() {
        return f64::NAN;
    }
    ys.sort_by(|a, b| a.total_cmp(b));
    let n = ys.len();
    if n % 2 == 1 {
        ys[n / 2]
    } else {
        (ys[n / 2 - 1] + ys[n / 2]) / 2.0
    }
}

/// Σ positive R / Σ |negative R|. Missing R counts as zero.
fn profit_factor(r_values: &[Option<f64>]) -> f64 {
    let (gains, losses) = r_values
        .iter()
        .map(|r| r.unwrap_or(0.0))
        .fold((0.0, 0.0), |(g, l), r| {
            if r > 0.0 {
                (g + r, l)
            } else if r < 0.0 {
                (g, l - r)
            } else {
                (g, l)
            }
        });
    if losses == 0.0 {
        if gains > 0.0 {
            f64::INFINITY
        } else {
            f64::NAN
        }
    } else {
        gains / losses
    }
}
