//! Input record types for the base table, the two target tables and the crosswalk

use serde::{Deserialize, Serialize};
use std::fmt;

/// ACA benefit-richness category
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MetalTier {
    Bronze,
    Silver,
    Gold,
    Platinum,
    #[serde(rename = "Minimum Coverage")]
    MinimumCoverage,
    #[serde(rename = "Bronze HDHP")]
    BronzeHdhp,
}

impl MetalTier {
    pub const ALL: [MetalTier; 6] = [
        MetalTier::Bronze,
        MetalTier::Silver,
        MetalTier::Gold,
        MetalTier::Platinum,
        MetalTier::MinimumCoverage,
        MetalTier::BronzeHdhp,
    ];

    /// Harmonize a raw label; the high-deductible bronze spellings collapse to one tier
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "Bronze" => Some(MetalTier::Bronze),
            "Silver" => Some(MetalTier::Silver),
            "Gold" => Some(MetalTier::Gold),
            "Platinum" => Some(MetalTier::Platinum),
            "Minimum Coverage" => Some(MetalTier::MinimumCoverage),
            "Bronze HDHP" | "HDHP Bronze" | "HSA Bronze" | "HDHP" => Some(MetalTier::BronzeHdhp),
            _ => None,
        }
    }

    /// Label used in the target tables and the output file
    pub fn as_str(&self) -> &'static str {
        match self {
            MetalTier::Bronze => "Bronze",
            MetalTier::Silver => "Silver",
            MetalTier::Gold => "Gold",
            MetalTier::Platinum => "Platinum",
            MetalTier::MinimumCoverage => "Minimum Coverage",
            MetalTier::BronzeHdhp => "Bronze HDHP",
        }
    }
}

impl fmt::Display for MetalTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical county spelling shared by the crosswalk and both target tables
pub fn normalize_county(raw: &str) -> String {
    let county = raw.trim().to_uppercase();
    if county == "LA COUNTY" {
        "LOS ANGELES".to_string()
    } else {
        county
    }
}

/// Plan-level enrollment known only at rating-area resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseRow {
    pub year: u16,
    pub rating_area: u32,
    pub insurer: String,
    pub plan: String,
    pub metal_tier: MetalTier,
    pub enrollment: f64,
}

/// Insurer x county control total
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsurerCountyTarget {
    pub year: u16,
    pub insurer: String,
    pub county: String,
    pub enrollment: f64,
}

/// Metal tier x county control total
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetalCountyTarget {
    pub year: u16,
    pub metal_tier: MetalTier,
    pub county: String,
    pub enrollment: f64,
}

/// One county-to-rating-area membership; an empty county declares a rating area with no members
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrosswalkRow {
    pub county: String,
    pub rating_area: u32,
}

impl CrosswalkRow {
    pub fn new(county: &str, rating_area: u32) -> Self {
        Self {
            county: normalize_county(county),
            rating_area,
        }
    }
}

/// The four already-cleaned input tables
#[derive(Debug, Clone, Default)]
pub struct InputTables {
    pub base: Vec<BaseRow>,
    pub insurer_targets: Vec<InsurerCountyTarget>,
    pub metal_targets: Vec<MetalCountyTarget>,
    pub crosswalk: Vec<CrosswalkRow>,
}

impl InputTables {
    /// Distinct years present in the base table, ascending
    pub fn years(&self) -> Vec<u16> {
        let mut years: Vec<u16> = self.base.iter().map(|r| r.year).collect();
        years.sort_unstable();
        years.dedup();
        years
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metal_tier_harmonization() {
        assert_eq!(MetalTier::from_label("Silver"), Some(MetalTier::Silver));
        assert_eq!(MetalTier::from_label("HDHP Bronze"), Some(MetalTier::BronzeHdhp));
        assert_eq!(MetalTier::from_label("HSA Bronze"), Some(MetalTier::BronzeHdhp));
        assert_eq!(MetalTier::from_label("HDHP"), Some(MetalTier::BronzeHdhp));
        assert_eq!(MetalTier::from_label(" Minimum Coverage "), Some(MetalTier::MinimumCoverage));
        assert_eq!(MetalTier::from_label("Catastrophic"), None);

        for tier in MetalTier::ALL {
            assert_eq!(MetalTier::from_label(tier.as_str()), Some(tier));
        }
    }

    #[test]
    fn test_normalize_county() {
        assert_eq!(normalize_county("  Santa Cruz "), "SANTA CRUZ");
        assert_eq!(normalize_county("LA County"), "LOS ANGELES");
        assert_eq!(normalize_county("Los Angeles"), "LOS ANGELES");
    }
}
