//! Rating-area to county allocation: lattice, seeding, margins, fitting, assembly

mod lattice;
mod margins;
mod ipf;
mod result;

pub use lattice::{build_lattice, seed_equal_split, AllocationMatrix, BaseGroup, CellKey};
pub use margins::{
    insurer_county_margin, margin_totals, metal_county_margin, MarginGroup, MarginIndex,
    MarginKey, MarginKind, MarginTargets,
};
pub use ipf::{
    max_relative_change, Diagnostic, IpfOutcome, IpfPhase, IpfRun, IpfStatus, PassReport,
};
pub use result::{AllocatedRow, YearAllocation};
