// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Records every reported training step to a CSV file.
//
// Output file: {ckpt}/metrics.csv
//
// Example CSV output:
//   step,valid,hole,tv,perc,style,total
//   0,0.412000,0.398000,0.051000,0.912000,0.004100,4.029600
//   10,0.301000,0.352000,0.047000,0.803000,0.003900,3.357800
//
// Rows are appended, so a resumed run continues the same file.

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};
use serde::{Deserialize, Serialize};

use crate::domain::losses::{LossBreakdown, LossTerm};

/// One row of metrics data for a single reported step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepMetrics {
    /// Global training step
    pub step: usize,

    /// Unweighted value of every loss term
    pub losses: LossBreakdown,

    /// Weighted sum that was back-propagated
    pub total: f64,
}

impl StepMetrics {
    pub fn new(step: usize, losses: LossBreakdown, total: f64) -> Self {
        Self { step, losses, total }
    }
}

/// Appends step metrics to a CSV file for later analysis.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Create a new MetricsLogger in `dir`.
    /// Writes the CSV header if the file doesn't exist yet.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let csv_path = dir.join("metrics.csv");

        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)
                .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
            let keys: Vec<&str> = LossTerm::ALL.iter().map(|t| t.key()).collect();
            writeln!(f, "step,{},total", keys.join(","))?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    /// Append one step's metrics as a new row in the CSV.
    pub fn log(&self, m: &StepMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;

        let values: Vec<String> = LossTerm::ALL
            .iter()
            .map(|&t| format!("{:.6}", m.losses.get(t)))
            .collect();
        writeln!(f, "{},{},{:.6}", m.step, values.join(","), m.total)?;

        tracing::debug!("Logged step {} metrics: total={:.4}", m.step, m.total);
        Ok(())
    }

    /// Return the path to the metrics CSV file
    #[cfg(test)]
    pub fn csv_path(&self) -> &PathBuf {
        &self.csv_path
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_and_rows() {
        let dir    = tempfile::tempdir().unwrap();
        let logger = MetricsLogger::new(dir.path()).unwrap();

        let losses = LossBreakdown { valid: 1.0, hole: 2.0, tv: 0.5, perc: 0.25, style: 0.125 };
        logger.log(&StepMetrics::new(10, losses, 3.875)).unwrap();

        let text = fs::read_to_string(logger.csv_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "step,valid,hole,tv,perc,style,total");
        assert_eq!(lines[1], "10,1.000000,2.000000,0.500000,0.250000,0.125000,3.875000");
    }

    #[test]
    fn test_reopen_appends_without_second_header() {
        let dir = tempfile::tempdir().unwrap();
        MetricsLogger::new(dir.path()).unwrap()
            .log(&StepMetrics::new(0, LossBreakdown::default(), 1.0)).unwrap();
        MetricsLogger::new(dir.path()).unwrap()
            .log(&StepMetrics::new(1, LossBreakdown::default(), 1.0)).unwrap();

        let text = fs::read_to_string(dir.path().join("metrics.csv")).unwrap();
        assert_eq!(text.lines().count(), 3);
    }
}
