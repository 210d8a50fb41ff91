//! Per-iteration scoring history.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringEntry {
    /// Wall-clock time of the record, `%Y-%m-%d %H:%M:%S` UTC.
    pub timestamp: String,
    pub iteration: usize,
    pub log_likelihood: f64,
    pub noise_variance: f64,
}

/// Ordered table of scoring entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoringHistory {
    entries: Vec<ScoringEntry>,
}

impl ScoringHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, iteration: usize, log_likelihood: f64, noise_variance: f64) {
        self.entries.push(ScoringEntry {
            timestamp: chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            iteration,
            log_likelihood,
            noise_variance,
        });
    }

    pub fn entries(&self) -> &[ScoringEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&ScoringEntry> {
        self.entries.last()
    }

    /// Tab-separated rendering with a header line.
    pub fn to_table(&self) -> String {
        let mut out = String::from("timestamp\tnumber_of_iterations\tloglikelihood\tnoise_variance\n");
        for e in &self.entries {
            let _ = writeln!(
                out,
                "{}\t{}\t{:.6}\t{:.6}",
                e.timestamp, e.iteration, e.log_likelihood, e.noise_variance
            );
        }
        out
    }
}
