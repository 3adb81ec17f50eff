//! 📈 Peak Tracker - Remembers the best each position has looked
//!
//! One record per symbol: peak unrealized profit, the price and volume at
//! that peak, and the profit already locked in by earlier partial exits.
//! A volume drop of 5%+ between observations means a scale-out happened:
//! the exited share of the peak is credited to realized profit and the
//! peak restarts from current profit.
//!
//! Storage goes through the [`PeakStore`] trait; the engine never cares
//! whether the host persists to a file or keeps everything in memory, and a
//! failing store never blocks a decision.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dashmap::DashMap;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::TrackerConfig;

/// Per-symbol peak state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeakRecord {
    /// Best unrealized profit seen since the last scale-out, % of account
    pub peak_profit_pct: f64,

    /// Price at the time the peak was set
    pub peak_price: f64,

    /// Position volume when the record was last written
    pub volume_at_peak: f64,

    /// Profit locked in by prior partial exits, % of account, cumulative
    pub realized_profit_pct: f64,

    /// Unix seconds of the last observation
    pub last_update: u64,
}

impl PeakRecord {
    /// Fraction of the peak given back since it was set, 0-1
    pub fn giveback(&self, current_profit_pct: f64) -> f64 {
        if self.peak_profit_pct <= 0.0 {
            return 0.0;
        }
        ((self.peak_profit_pct - current_profit_pct) / self.peak_profit_pct).clamp(0.0, 1.0)
    }
}

/// Outcome of one observation
#[derive(Debug, Clone)]
pub struct PeakUpdate {
    pub record: PeakRecord,

    /// True when a volume drop crossed the scale-out threshold
    pub scaled_out: bool,

    /// Profit credited to realized on this observation, % of account
    pub realized_delta: f64,
}

/// Storage backend for peak records. Implementations must tolerate being
/// called from multiple evaluation threads.
pub trait PeakStore: Send + Sync {
    fn load(&self) -> Result<HashMap<String, PeakRecord>>;
    fn persist(&self, records: &HashMap<String, PeakRecord>) -> Result<()>;
}

/// Single-JSON-file store: one object mapping SYMBOL -> PeakRecord,
/// rewritten wholesale on every update.
pub struct FilePeakStore {
    path: PathBuf,
}

impl FilePeakStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl PeakStore for FilePeakStore {
    fn load(&self) -> Result<HashMap<String, PeakRecord>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read peak file: {:?}", self.path))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Corrupt peak file: {:?}", self.path))
    }

    fn persist(&self, records: &HashMap<String, PeakRecord>) -> Result<()> {
        let json = serde_json::to_string_pretty(records)?;
        fs::write(&self.path, json)
            .with_context(|| format!("Failed to write peak file: {:?}", self.path))
    }
}

/// No-op store for tests and hosts that persist elsewhere
#[derive(Default)]
pub struct MemoryPeakStore;

impl PeakStore for MemoryPeakStore {
    fn load(&self) -> Result<HashMap<String, PeakRecord>> {
        Ok(HashMap::new())
    }

    fn persist(&self, _records: &HashMap<String, PeakRecord>) -> Result<()> {
        Ok(())
    }
}

/// Tracker statistics snapshot
#[derive(Debug, Clone)]
pub struct TrackerStats {
    pub tracked_symbols: usize,
}

/// Tracks peak records for all open positions
pub struct PeakTracker {
    records: DashMap<String, PeakRecord>,
    store: Box<dyn PeakStore>,
    config: TrackerConfig,
}

impl PeakTracker {
    pub fn new(store: Box<dyn PeakStore>) -> Self {
        Self::with_config(store, TrackerConfig::default())
    }

    pub fn with_config(store: Box<dyn PeakStore>, config: TrackerConfig) -> Self {
        let records = DashMap::new();
        match store.load() {
            Ok(loaded) => {
                for (symbol, record) in loaded {
                    records.insert(symbol, record);
                }
                info!("📈 Peak tracker loaded {} record(s)", records.len());
            }
            Err(e) => {
                warn!("📈 Peak store unreadable, starting empty: {:#}", e);
            }
        }
        Self {
            records,
            store,
            config,
        }
    }

    pub fn get(&self, symbol: &str) -> Option<PeakRecord> {
        self.records.get(symbol).map(|r| r.clone())
    }

    /// Record one evaluation's view of the position.
    ///
    /// Peak profit only ever rises between scale-outs; a volume drop past
    /// the reset threshold credits the exited share to realized profit and
    /// restarts the peak at current profit.
    pub fn observe(
        &self,
        symbol: &str,
        profit_pct: f64,
        price: f64,
        volume: f64,
        now: u64,
    ) -> PeakUpdate {
        let mut scaled_out = false;
        let mut realized_delta = 0.0;

        let record = match self.records.get(symbol).map(|r| r.clone()) {
            None => PeakRecord {
                peak_profit_pct: profit_pct.max(0.0),
                peak_price: price,
                volume_at_peak: volume,
                realized_profit_pct: 0.0,
                last_update: now,
            },
            Some(mut prev) => {
                let reset_at = prev.volume_at_peak * (1.0 - self.config.volume_reset_fraction);
                if prev.volume_at_peak > 0.0 && volume <= reset_at {
                    // Scale-out detected: credit the exited share of the peak
                    let reduction = (prev.volume_at_peak - volume) / prev.volume_at_peak;
                    realized_delta = prev.peak_profit_pct * reduction;
                    scaled_out = true;
                    debug!(
                        "{} scale-out detected ({:.1}% of volume), realized +{:.3}%",
                        symbol,
                        reduction * 100.0,
                        realized_delta
                    );
                    PeakRecord {
                        peak_profit_pct: profit_pct.max(0.0),
                        peak_price: price,
                        volume_at_peak: volume,
                        realized_profit_pct: prev.realized_profit_pct + realized_delta,
                        last_update: now,
                    }
                } else {
                    if profit_pct > prev.peak_profit_pct {
                        prev.peak_profit_pct = profit_pct;
                        prev.peak_price = price;
                    }
                    prev.last_update = now;
                    prev
                }
            }
        };

        self.records.insert(symbol.to_string(), record.clone());
        self.persist_best_effort();

        PeakUpdate {
            record,
            scaled_out,
            realized_delta,
        }
    }

    /// Drop the record when the position closes
    pub fn remove(&self, symbol: &str) -> Option<PeakRecord> {
        let removed = self.records.remove(symbol).map(|(_, r)| r);
        if removed.is_some() {
            self.persist_best_effort();
        }
        removed
    }

    pub fn stats(&self) -> TrackerStats {
        TrackerStats {
            tracked_symbols: self.records.len(),
        }
    }

    fn persist_best_effort(&self) {
        let map: HashMap<String, PeakRecord> = self
            .records
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        if let Err(e) = self.store.persist(&map) {
            warn!("📈 Peak persistence failed, continuing in memory: {:#}", e);
        }
    }
}
