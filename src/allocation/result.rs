//! Result assembly: flatten a finished run into output rows

use super::ipf::{Diagnostic, IpfOutcome, IpfStatus};
use serde::{Deserialize, Serialize};

/// One row of `enrollment_allocated.csv`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocatedRow {
    pub year: u16,
    pub county: String,
    pub rating_area: u32,
    pub insurer: String,
    pub plan: String,
    pub metal_tier: String,
    pub enrollment_est: f64,
}

/// A year's allocation with its run metadata
#[derive(Debug, Clone, Serialize)]
pub struct YearAllocation {
    pub year: u16,
    pub status: IpfStatus,
    pub iterations: u32,
    pub final_max_change: f64,
    pub change_history: Vec<f64>,
    pub diagnostics: Vec<Diagnostic>,
    #[serde(skip)]
    pub rows: Vec<AllocatedRow>,
}

impl YearAllocation {
    /// Consume the outcome; the matrix is released once its rows are emitted
    pub fn assemble(outcome: IpfOutcome) -> Self {
        let year = outcome.matrix.year();
        let rows = outcome
            .matrix
            .into_cells()
            .map(|(key, value)| AllocatedRow {
                year: key.year,
                county: key.county,
                rating_area: key.rating_area,
                insurer: key.insurer,
                plan: key.plan,
                metal_tier: key.metal_tier.as_str().to_string(),
                enrollment_est: value,
            })
            .collect();

        Self {
            year,
            status: outcome.status,
            iterations: outcome.iterations,
            final_max_change: outcome.final_max_change,
            change_history: outcome.change_history,
            diagnostics: outcome.diagnostics,
            rows,
        }
    }

    pub fn total(&self) -> f64 {
        self.rows.iter().map(|r| r.enrollment_est).sum()
    }
}
