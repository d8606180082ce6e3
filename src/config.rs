//! Run configuration: IPF stopping rules and input/output locations

use std::path::{Path, PathBuf};

/// Default directory holding the four input tables
pub const DEFAULT_INPUT_DIR: &str = "data";

/// Default output file name
pub const DEFAULT_OUTPUT_FILE: &str = "enrollment_allocated.csv";

/// Stopping rules for the fitting loop
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IpfConfig {
    /// Hard cap on full iterations (insurer pass + metal pass)
    pub max_iterations: u32,

    /// Stop once the max relative cell change of an iteration drops below this
    pub tolerance: f64,
}

impl Default for IpfConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 0.001,
        }
    }
}

/// Locations of the input tables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputPaths {
    pub base: PathBuf,
    pub county_insurer: PathBuf,
    pub county_metal: PathBuf,
    pub crosswalk: PathBuf,
}

impl InputPaths {
    /// Standard file names inside a directory
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            base: dir.join("base.csv"),
            county_insurer: dir.join("county_insurer.csv"),
            county_metal: dir.join("county_metal.csv"),
            crosswalk: dir.join("crosswalk.csv"),
        }
    }
}

impl Default for InputPaths {
    fn default() -> Self {
        Self::in_dir(Path::new(DEFAULT_INPUT_DIR))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = IpfConfig::default();
        assert_eq!(config.max_iterations, 100);
        assert_eq!(config.tolerance, 0.001);

        let paths = InputPaths::default();
        assert_eq!(paths.base, Path::new("data").join("base.csv"));
        assert_eq!(paths.crosswalk, Path::new("data").join("crosswalk.csv"));
    }
}
