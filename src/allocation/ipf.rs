//! Stage 2: iterative proportional fitting against the two county margins
//!
//! One iteration is an insurer x county pass followed by a metal tier x
//! county pass. The order is fixed: the metal margin is applied last and is
//! therefore the one matched exactly at convergence, while the insurer margin
//! is only approximately matched when the two target tables disagree.

use super::lattice::AllocationMatrix;
use super::margins::{MarginIndex, MarginKey, MarginKind, MarginTargets};
use crate::config::IpfConfig;
use crate::error::AllocationError;
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle of one year's run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpfPhase {
    Seeded,
    Iterating,
    Converged,
    MaxItersReached,
}

/// Terminal state of a run; both carry a usable matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IpfStatus {
    Converged,
    MaxIterationsReached,
}

impl IpfStatus {
    pub fn is_converged(&self) -> bool {
        matches!(self, IpfStatus::Converged)
    }
}

/// Non-fatal findings attached to a year's result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Diagnostic {
    /// Positive target whose key has no support in the matrix
    UnreachableMargin { key: MarginKey, target: f64 },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::UnreachableMargin { key, target } => write!(
                f,
                "unreachable {} margin {}: target {:.2} has no supporting cells",
                key.kind().as_str(),
                key,
                target
            ),
        }
    }
}

/// What one pass did to each margin group
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    pub scaled: usize,
    pub without_target: usize,
    pub unreachable: usize,
    pub zero_to_zero: usize,
}

#[derive(Debug, Clone, Copy)]
enum GroupAction {
    Scale(f64),
    NoTarget,
    Unreachable(f64),
    ZeroToZero,
}

/// Largest |new - old| / old over cells with a positive old value
///
/// Zero-valued cells carry no relative change. Returns 0 when no cell is positive.
pub fn max_relative_change(previous: &[f64], current: &[f64]) -> f64 {
    previous
        .iter()
        .zip(current)
        .filter(|&(&old, _)| old > 0.0)
        .map(|(&old, &new)| (new - old).abs() / old)
        .fold(0.0, f64::max)
}

/// Per-year fitting context; owns exactly one year's matrix and targets
#[derive(Debug, Clone)]
pub struct IpfRun {
    config: IpfConfig,
    matrix: AllocationMatrix,
    insurer_index: MarginIndex,
    metal_index: MarginIndex,
    insurer_targets: MarginTargets,
    metal_targets: MarginTargets,
    phase: IpfPhase,
    iterations: u32,
    history: Vec<f64>,
    unreachable: BTreeMap<MarginKey, f64>,
}

/// Frozen result of a run
#[derive(Debug, Clone)]
pub struct IpfOutcome {
    pub status: IpfStatus,
    pub iterations: u32,
    pub final_max_change: f64,
    pub change_history: Vec<f64>,
    pub diagnostics: Vec<Diagnostic>,
    pub matrix: AllocationMatrix,
}

impl IpfRun {
    /// Wrap an already-seeded matrix
    ///
    /// Positive targets whose key no cell projects onto are recorded as
    /// unreachable right away; scaling can never give them support.
    pub fn new(
        matrix: AllocationMatrix,
        insurer_targets: MarginTargets,
        metal_targets: MarginTargets,
        config: IpfConfig,
    ) -> Self {
        let insurer_index = MarginIndex::build(&matrix, MarginKind::InsurerCounty);
        let metal_index = MarginIndex::build(&matrix, MarginKind::MetalCounty);

        let mut unreachable = BTreeMap::new();
        for (index, targets) in [(&insurer_index, &insurer_targets), (&metal_index, &metal_targets)] {
            for (key, target) in targets.iter() {
                if target > 0.0 && !index.contains(key) {
                    unreachable.insert(key.clone(), target);
                }
            }
        }

        Self {
            config,
            matrix,
            insurer_index,
            metal_index,
            insurer_targets,
            metal_targets,
            phase: IpfPhase::Seeded,
            iterations: 0,
            history: Vec::new(),
            unreachable,
        }
    }

    pub fn phase(&self) -> IpfPhase {
        self.phase
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn matrix(&self) -> &AllocationMatrix {
        &self.matrix
    }

    /// Rescale every group of one margin toward its target
    ///
    /// Groups without a target are left as they are. A group at zero with a
    /// positive target is recorded as unreachable; at zero with a zero target
    /// it is a no-op.
    pub fn apply_pass(&mut self, kind: MarginKind) -> Result<PassReport, AllocationError> {
        let Self {
            matrix,
            insurer_index,
            metal_index,
            insurer_targets,
            metal_targets,
            unreachable,
            ..
        } = self;
        let (index, targets) = match kind {
            MarginKind::InsurerCounty => (&*insurer_index, &*insurer_targets),
            MarginKind::MetalCounty => (&*metal_index, &*metal_targets),
        };

        let values = matrix.values();
        let actions: Vec<GroupAction> = index
            .groups()
            .par_iter()
            .map(|group| {
                let current = group.current(values);
                match targets.get(&group.key) {
                    None => GroupAction::NoTarget,
                    Some(target) if current > 0.0 => GroupAction::Scale(target / current),
                    Some(target) if target > 0.0 => GroupAction::Unreachable(target),
                    Some(_) => GroupAction::ZeroToZero,
                }
            })
            .collect();

        let year = matrix.year();
        let mut report = PassReport::default();
        for (group, action) in index.groups().iter().zip(actions) {
            match action {
                GroupAction::Scale(factor) => {
                    report.scaled += 1;
                    let values = matrix.values_mut();
                    for &i in &group.cells {
                        values[i] *= factor;
                    }
                    for &i in &group.cells {
                        let value = matrix.values()[i];
                        if !value.is_finite() {
                            return Err(AllocationError::NonFiniteValue {
                                year,
                                key: format!("{:?}", matrix.keys()[i]),
                            });
                        }
                        if value < 0.0 {
                            return Err(AllocationError::NegativeAllocationDetected {
                                year,
                                key: format!("{:?}", matrix.keys()[i]),
                                value,
                            });
                        }
                    }
                }
                GroupAction::NoTarget => report.without_target += 1,
                GroupAction::Unreachable(target) => {
                    report.unreachable += 1;
                    unreachable.entry(group.key.clone()).or_insert(target);
                }
                GroupAction::ZeroToZero => report.zero_to_zero += 1,
            }
        }

        Ok(report)
    }

    /// One full iteration; returns its max relative cell change
    pub fn iterate(&mut self) -> Result<f64, AllocationError> {
        self.phase = IpfPhase::Iterating;
        let previous = self.matrix.values().to_vec();

        self.apply_pass(MarginKind::InsurerCounty)?;
        self.apply_pass(MarginKind::MetalCounty)?;

        self.iterations += 1;
        let change = max_relative_change(&previous, self.matrix.values());
        self.history.push(change);
        Ok(change)
    }

    /// Iterate until the change drops below tolerance or the cap is hit
    ///
    /// The reported final change is that of the last completed iteration,
    /// or 0 when none ran.
    pub fn run(mut self) -> Result<IpfOutcome, AllocationError> {
        let year = self.matrix.year();
        let mut last_change = self.history.last().copied().unwrap_or(0.0);

        while self.iterations < self.config.max_iterations {
            last_change = self.iterate()?;

            if last_change < self.config.tolerance {
                self.phase = IpfPhase::Converged;
                info!(
                    "year {}: converged at iteration {}, max relative change = {:.6}",
                    year, self.iterations, last_change
                );
                break;
            }

            if self.iterations % 20 == 0 {
                debug!(
                    "year {}: iteration {}, max relative change = {:.6}",
                    year, self.iterations, last_change
                );
            }
        }

        let status = if self.phase == IpfPhase::Converged {
            IpfStatus::Converged
        } else {
            self.phase = IpfPhase::MaxItersReached;
            warn!(
                "year {}: did not converge after {} iterations, final max change = {:.6}",
                year, self.iterations, last_change
            );
            IpfStatus::MaxIterationsReached
        };

        let diagnostics: Vec<Diagnostic> = self
            .unreachable
            .into_iter()
            .map(|(key, target)| Diagnostic::UnreachableMargin { key, target })
            .collect();
        if !diagnostics.is_empty() {
            warn!("year {}: {} unreachable margin targets", year, diagnostics.len());
        }

        Ok(IpfOutcome {
            status,
            iterations: self.iterations,
            final_max_change: last_change,
            change_history: self.history,
            diagnostics,
            matrix: self.matrix,
        })
    }
}
