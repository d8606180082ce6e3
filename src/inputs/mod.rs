//! Input tables and CSV loading

mod data;
pub mod loader;

pub use data::{
    normalize_county, BaseRow, CrosswalkRow, InputTables, InsurerCountyTarget, MetalCountyTarget,
    MetalTier,
};
pub use loader::{
    load_base_from_reader, load_crosswalk_from_reader, load_inputs,
    load_insurer_targets_from_reader, load_metal_targets_from_reader, CleaningReport,
};
