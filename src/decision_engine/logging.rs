//! 📝 Decision Journal
//!
//! Append-only CSV record of every evaluation: the chosen action, the EVs
//! it beat, the probabilities and scores behind it, and the stop advice.
//! One row per decision with a monotonically increasing id. Journal
//! failures are the host's problem to notice, never the engine's reason
//! to stop deciding.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use log::info;

/// One journal row
#[derive(Debug, Clone)]
pub struct DecisionLogEntry {
    pub decision_id: u64,
    pub timestamp: u64,
    pub symbol: String,
    pub action: &'static str,

    // Expected values, % of account equity
    pub ev: f64,
    pub ev_hold: f64,
    pub ev_close: f64,

    // Probability estimate
    pub continuation: f64,
    pub reversal: f64,
    pub thesis_quality: f64,

    // Scores
    pub exit_score: f64,
    pub entry_score: f64,
    pub exhaustion: f64,
    pub premium_total: f64,

    pub confidence: f64,
    pub recommended_stop: f64,
    pub should_modify_stop: bool,
    pub reason: String,
}

impl DecisionLogEntry {
    /// CSV header
    pub fn csv_header() -> &'static str {
        "decision_id,timestamp,symbol,action,ev_pct,ev_hold_pct,ev_close_pct,continuation,reversal,thesis_quality,exit_score,entry_score,exhaustion,premium_pct,confidence,recommended_stop,modify_stop,reason,datetime"
    }

    /// Convert to CSV row
    pub fn to_csv_row(&self) -> String {
        // The reason text is free-form; keep the row parseable
        let reason = self.reason.replace(',', ";").replace('\n', " ");
        format!(
            "{},{},{},{},{:.4},{:.4},{:.4},{:.3},{:.3},{:.3},{:.3},{:.3},{:.3},{:.4},{:.0},{:.5},{},{},{}",
            self.decision_id,
            self.timestamp,
            self.symbol,
            self.action,
            self.ev,
            self.ev_hold,
            self.ev_close,
            self.continuation,
            self.reversal,
            self.thesis_quality,
            self.exit_score,
            self.entry_score,
            self.exhaustion,
            self.premium_total,
            self.confidence,
            self.recommended_stop,
            self.should_modify_stop,
            reason,
            chrono::DateTime::from_timestamp(self.timestamp as i64, 0)
                .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_default()
        )
    }
}

/// Decision journal that appends to a CSV file
pub struct DecisionLogger {
    log_file: Mutex<File>,
    decision_counter: Mutex<u64>,
    entries_logged: Mutex<u64>,
}

impl DecisionLogger {
    /// Open (or create with a header) the journal at `log_path`
    pub fn new<P: AsRef<Path>>(log_path: P) -> Result<Self> {
        let path = log_path.as_ref();
        let file_exists = path.exists();

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open decision journal: {:?}", path))?;

        if !file_exists {
            writeln!(file, "{}", DecisionLogEntry::csv_header())
                .context("Failed to write CSV header")?;
            file.flush()?;
            info!("📝 Created new decision journal: {:?}", path);
        } else {
            info!("📝 Opened existing decision journal: {:?}", path);
        }

        Ok(Self {
            log_file: Mutex::new(file),
            decision_counter: Mutex::new(1),
            entries_logged: Mutex::new(0),
        })
    }

    /// Append one decision, returning its assigned id
    pub fn log_decision(&self, mut entry: DecisionLogEntry) -> Result<u64> {
        let decision_id = {
            let mut counter = self.decision_counter.lock().unwrap();
            let id = *counter;
            *counter += 1;
            id
        };
        entry.decision_id = decision_id;

        {
            let mut file = self.log_file.lock().unwrap();
            writeln!(file, "{}", entry.to_csv_row()).context("Failed to write journal entry")?;
            file.flush()?;
        }

        *self.entries_logged.lock().unwrap() += 1;

        info!(
            "📝 Logged decision #{}: {} {} ev={:.2}% conf={:.0}",
            decision_id, entry.symbol, entry.action, entry.ev, entry.confidence
        );

        Ok(decision_id)
    }

    pub fn entries_logged(&self) -> u64 {
        *self.entries_logged.lock().unwrap()
    }

    pub fn next_decision_id(&self) -> u64 {
        *self.decision_counter.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn entry(symbol: &str, action: &'static str) -> DecisionLogEntry {
        DecisionLogEntry {
            decision_id: 0,
            timestamp: 1_750_100_000,
            symbol: symbol.to_string(),
            action,
            ev: 0.42,
            ev_hold: 0.10,
            ev_close: 0.42,
            continuation: 0.35,
            reversal: 0.50,
            thesis_quality: 0.30,
            exit_score: 0.72,
            entry_score: 0.15,
            exhaustion: 0.60,
            premium_total: 0.25,
            confidence: 64.0,
            recommended_stop: 1.09500,
            should_modify_stop: true,
            reason: "CLOSE ev=0.42% (hold=0.10%), target exceeded".to_string(),
        }
    }

    #[test]
    fn test_csv_header_fields() {
        let header = DecisionLogEntry::csv_header();
        assert!(header.contains("decision_id"));
        assert!(header.contains("symbol"));
        assert!(header.contains("ev_hold_pct"));
        assert!(header.contains("recommended_stop"));
    }

    #[test]
    fn test_csv_row_escapes_reason_commas() {
        let row = entry("EURUSD", "CLOSE").to_csv_row();
        assert_eq!(
            row.split(',').count(),
            DecisionLogEntry::csv_header().split(',').count()
        );
        assert!(row.contains("target exceeded"));
        assert!(row.contains("1.09500"));
    }

    #[test]
    fn test_journal_creation_and_append() {
        let path = "/tmp/position_brain_journal_test.csv";
        let _ = fs::remove_file(path);

        let logger = DecisionLogger::new(path).unwrap();
        let id = logger.log_decision(entry("EURUSD", "CLOSE")).unwrap();
        assert_eq!(id, 1);
        let id = logger.log_decision(entry("GBPUSD", "HOLD")).unwrap();
        assert_eq!(id, 2);
        assert_eq!(logger.entries_logged(), 2);
        assert_eq!(logger.next_decision_id(), 3);

        let content = fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3); // header + 2 rows
        assert!(lines[0].starts_with("decision_id,"));
        assert!(lines[1].contains("EURUSD"));
        assert!(lines[2].contains("GBPUSD"));

        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_reopening_appends_without_second_header() {
        let path = "/tmp/position_brain_journal_reopen.csv";
        let _ = fs::remove_file(path);

        {
            let logger = DecisionLogger::new(path).unwrap();
            logger.log_decision(entry("EURUSD", "HOLD")).unwrap();
        }
        {
            let logger = DecisionLogger::new(path).unwrap();
            logger.log_decision(entry("EURUSD", "SCALE_OUT_50")).unwrap();
        }

        let content = fs::read_to_string(path).unwrap();
        let headers = content
            .lines()
            .filter(|l| l.starts_with("decision_id,"))
            .count();
        assert_eq!(headers, 1);
        assert_eq!(content.lines().count(), 3);

        let _ = fs::remove_file(path);
    }
}
