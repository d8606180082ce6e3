//! Rating-area enrollment allocation by iterative proportional fitting
//!
//! This library provides:
//! - County <-> rating area crosswalk indexing
//! - Equal-weight seeding of rating-area plan enrollment across member counties
//! - Two-margin IPF (insurer x county, then metal tier x county) per year
//! - Margin consistency and post-run validation reports
//! - Input loading/cleaning and `enrollment_allocated.csv` output

pub mod error;
pub mod config;
pub mod inputs;
pub mod crosswalk;
pub mod allocation;
pub mod runner;
pub mod validation;
pub mod output;

// Re-export commonly used types
pub use error::{AllocationError, LoadError};
pub use config::{IpfConfig, InputPaths};
pub use inputs::{InputTables, MetalTier};
pub use crosswalk::CrosswalkIndex;
pub use allocation::{AllocatedRow, IpfRun, IpfStatus, YearAllocation};
pub use runner::{AllocationRunner, RunReport};
