//! File loading for the CLI: bar series (CSV or JSON), snapshots, batch
//! instrument files and engine configuration.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use swingentry_core::{EngineConfig, Mode, PriceBar, RawSnapshot};

/// One CSV row. Header names match either lowercase or Yahoo-style columns;
/// blank OHLC cells load as void bars that validation later drops.
#[derive(Debug, Deserialize)]
struct BarRecord {
    #[serde(alias = "Date")]
    date: NaiveDate,
    #[serde(alias = "Open")]
    open: Option<f64>,
    #[serde(alias = "High")]
    high: Option<f64>,
    #[serde(alias = "Low")]
    low: Option<f64>,
    #[serde(alias = "Close")]
    close: Option<f64>,
    #[serde(default, alias = "Volume")]
    volume: Option<f64>,
}

impl From<BarRecord> for PriceBar {
    fn from(r: BarRecord) -> Self {
        PriceBar {
            date: r.date,
            open: r.open.unwrap_or(f64::NAN),
            high: r.high.unwrap_or(f64::NAN),
            low: r.low.unwrap_or(f64::NAN),
            close: r.close.unwrap_or(f64::NAN),
            volume: r.volume.unwrap_or(0.0),
        }
    }
}

/// One instrument for batch mode.
#[derive(Debug, Deserialize)]
pub struct InstrumentFile {
    pub snapshot: RawSnapshot,
    pub bars: Vec<PriceBar>,
}

fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"))
}

/// Load bars from a `.csv` file or a JSON array of bars.
pub fn load_bars(path: &Path) -> Result<Vec<PriceBar>> {
    if is_csv(path) {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .with_context(|| format!("opening {}", path.display()))?;
        let mut bars = Vec::new();
        for (i, record) in reader.deserialize::<BarRecord>().enumerate() {
            let record =
                record.with_context(|| format!("{}: bad row {}", path.display(), i + 1))?;
            bars.push(record.into());
        }
        Ok(bars)
    } else {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing bars in {}", path.display()))
    }
}

pub fn load_snapshot(path: &Path) -> Result<RawSnapshot> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing snapshot in {}", path.display()))
}

pub fn load_instrument(path: &Path) -> Result<InstrumentFile> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let mut file: InstrumentFile = serde_json::from_str(&text)
        .with_context(|| format!("parsing instrument in {}", path.display()))?;
    if file.snapshot.ticker.is_empty() {
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            file.snapshot.ticker = stem.to_string();
        }
    }
    Ok(file)
}

/// `*.json` files directly under `dir`, sorted by name.
pub fn instrument_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        bail!("input directory does not exist: {}", dir.display());
    }
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("listing {}", dir.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("json"))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Preset for `mode`, with an optional TOML override file merged on top.
pub fn load_config(mode: Mode, overrides: Option<&Path>) -> Result<EngineConfig> {
    let base = EngineConfig::preset(mode);
    let Some(path) = overrides else {
        return Ok(base);
    };
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let table = EngineConfig::parse_overrides(&text)
        .with_context(|| format!("parsing {}", path.display()))?;
    base.with_overrides(&table)
        .with_context(|| format!("applying overrides from {}", path.display()))
}
