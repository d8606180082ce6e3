//! Allocation runner: one independent fitting run per year
//!
//! The crosswalk is built once and shared read-only; every year gets its own
//! matrix and target tables, so years run in parallel with no shared state.

use crate::allocation::{
    build_lattice, seed_equal_split, AllocatedRow, IpfRun, MarginTargets, YearAllocation,
};
use crate::config::IpfConfig;
use crate::crosswalk::CrosswalkIndex;
use crate::error::AllocationError;
use crate::inputs::InputTables;
use log::{error, info, warn};
use rayon::prelude::*;
use serde::Serialize;

/// A year that could not be allocated
#[derive(Debug, Clone, Serialize)]
pub struct YearFailure {
    pub year: u16,
    pub kind: &'static str,
    pub message: String,
    #[serde(skip)]
    pub error: AllocationError,
}

/// Everything produced by a run, successful years and failed years side by side
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub years: Vec<YearAllocation>,
    pub failures: Vec<YearFailure>,
}

impl RunReport {
    /// Output rows of every successful year
    pub fn rows(&self) -> impl Iterator<Item = &AllocatedRow> {
        self.years.iter().flat_map(|y| y.rows.iter())
    }

    pub fn year(&self, year: u16) -> Option<&YearAllocation> {
        self.years.iter().find(|y| y.year == year)
    }

    pub fn all_converged(&self) -> bool {
        self.failures.is_empty() && self.years.iter().all(|y| y.status.is_converged())
    }
}

/// Runs the two-stage allocation for every year in the base table
#[derive(Debug, Clone, Default)]
pub struct AllocationRunner {
    config: IpfConfig,
}

impl AllocationRunner {
    pub fn new(config: IpfConfig) -> Self {
        Self { config }
    }

    /// Stage 1 and stage 2 for a single year
    pub fn allocate_year(
        &self,
        year: u16,
        tables: &InputTables,
        crosswalk: &CrosswalkIndex,
    ) -> Result<YearAllocation, AllocationError> {
        let mut matrix = build_lattice(year, &tables.base, crosswalk)?;
        seed_equal_split(&mut matrix);
        info!(
            "year {}: {} cells seeded from {} base rows, total {:.1}",
            year,
            matrix.len(),
            matrix.groups().len(),
            matrix.total()
        );

        let insurer_targets = MarginTargets::insurer_county(year, &tables.insurer_targets)?;
        let metal_targets = MarginTargets::metal_county(year, &tables.metal_targets)?;

        let outcome = IpfRun::new(matrix, insurer_targets, metal_targets, self.config).run()?;
        Ok(YearAllocation::assemble(outcome))
    }

    /// Allocate every year; a fatal error in one year does not stop the others
    ///
    /// Crosswalk conflicts only fail the years whose base rows reference an
    /// affected rating area.
    pub fn run(&self, tables: &InputTables) -> RunReport {
        let crosswalk = CrosswalkIndex::build(&tables.crosswalk);
        for (county, areas) in crosswalk.conflicts() {
            warn!(
                "crosswalk: county {} belongs to several rating areas {:?}; years using them will fail",
                county, areas
            );
        }
        let years = tables.years();
        info!(
            "crosswalk: {} counties in {} rating areas; processing years {:?}",
            crosswalk.county_count(),
            crosswalk.rating_areas().count(),
            years
        );

        let results: Vec<(u16, Result<YearAllocation, AllocationError>)> = years
            .par_iter()
            .map(|&year| (year, self.allocate_year(year, tables, &crosswalk)))
            .collect();

        let mut report = RunReport::default();
        for (year, result) in results {
            match result {
                Ok(allocation) => report.years.push(allocation),
                Err(err) => {
                    error!("year {}: {}", year, err);
                    report.failures.push(YearFailure {
                        year,
                        kind: err.kind(),
                        message: err.to_string(),
                        error: err,
                    });
                }
            }
        }

        report
    }
}
