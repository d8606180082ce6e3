//! Margin keys, margin target tables and the margin aggregator
//!
//! A margin is a 2-D projection of the cell cube: insurer x county or
//! metal tier x county. `MarginIndex` maps each margin key to the arena
//! indices of its contributing cells so a pass never rescans the matrix.

use super::lattice::{AllocationMatrix, CellKey};
use crate::error::AllocationError;
use crate::inputs::{InsurerCountyTarget, MetalCountyTarget, MetalTier};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// The two constrained margins, in the order they are applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum MarginKind {
    InsurerCounty,
    MetalCounty,
}

impl MarginKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarginKind::InsurerCounty => "insurer x county",
            MarginKind::MetalCounty => "metal tier x county",
        }
    }

    /// Project a cell onto this margin
    pub fn key_of(&self, cell: &CellKey) -> MarginKey {
        match self {
            MarginKind::InsurerCounty => MarginKey::InsurerCounty {
                insurer: cell.insurer.clone(),
                county: cell.county.clone(),
            },
            MarginKind::MetalCounty => MarginKey::MetalCounty {
                metal_tier: cell.metal_tier,
                county: cell.county.clone(),
            },
        }
    }
}

/// Key of one margin group
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum MarginKey {
    InsurerCounty { insurer: String, county: String },
    MetalCounty { metal_tier: MetalTier, county: String },
}

impl MarginKey {
    pub fn kind(&self) -> MarginKind {
        match self {
            MarginKey::InsurerCounty { .. } => MarginKind::InsurerCounty,
            MarginKey::MetalCounty { .. } => MarginKind::MetalCounty,
        }
    }
}

impl fmt::Display for MarginKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarginKey::InsurerCounty { insurer, county } => write!(f, "({insurer}, {county})"),
            MarginKey::MetalCounty { metal_tier, county } => write!(f, "({metal_tier}, {county})"),
        }
    }
}

/// Externally supplied control totals for one margin and one year
#[derive(Debug, Clone, PartialEq)]
pub struct MarginTargets {
    totals: HashMap<MarginKey, f64>,
}

impl MarginTargets {
    /// Insurer x county targets for `year`
    pub fn insurer_county(year: u16, rows: &[InsurerCountyTarget]) -> Result<Self, AllocationError> {
        let entries = rows.iter().filter(|r| r.year == year).map(|r| {
            (
                MarginKey::InsurerCounty {
                    insurer: r.insurer.clone(),
                    county: r.county.clone(),
                },
                r.enrollment,
            )
        });
        Self::from_entries(year, MarginKind::InsurerCounty, entries)
    }

    /// Metal tier x county targets for `year`
    pub fn metal_county(year: u16, rows: &[MetalCountyTarget]) -> Result<Self, AllocationError> {
        let entries = rows.iter().filter(|r| r.year == year).map(|r| {
            (
                MarginKey::MetalCounty {
                    metal_tier: r.metal_tier,
                    county: r.county.clone(),
                },
                r.enrollment,
            )
        });
        Self::from_entries(year, MarginKind::MetalCounty, entries)
    }

    /// Duplicate keys are summed; negative or non-finite totals are rejected
    fn from_entries(
        year: u16,
        kind: MarginKind,
        entries: impl Iterator<Item = (MarginKey, f64)>,
    ) -> Result<Self, AllocationError> {
        let mut totals: HashMap<MarginKey, f64> = HashMap::new();
        for (key, value) in entries {
            if !value.is_finite() {
                return Err(AllocationError::NonFiniteValue {
                    year,
                    key: format!("{} target {}", kind.as_str(), key),
                });
            }
            if value < 0.0 {
                return Err(AllocationError::NegativeAllocationDetected {
                    year,
                    key: format!("{} target {}", kind.as_str(), key),
                    value,
                });
            }
            *totals.entry(key).or_insert(0.0) += value;
        }
        Ok(Self { totals })
    }

    pub fn get(&self, key: &MarginKey) -> Option<f64> {
        self.totals.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.totals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MarginKey, f64)> {
        self.totals.iter().map(|(k, &v)| (k, v))
    }
}

/// Cells contributing to one margin key
#[derive(Debug, Clone, PartialEq)]
pub struct MarginGroup {
    pub key: MarginKey,
    pub cells: Vec<usize>,
}

impl MarginGroup {
    /// Current margin value under `values`
    pub fn current(&self, values: &[f64]) -> f64 {
        self.cells.iter().map(|&i| values[i]).sum()
    }
}

/// Margin key -> contributing cell indices, for one margin of one matrix
#[derive(Debug, Clone)]
pub struct MarginIndex {
    groups: Vec<MarginGroup>,
    by_key: HashMap<MarginKey, usize>,
}

impl MarginIndex {
    pub fn build(matrix: &AllocationMatrix, kind: MarginKind) -> Self {
        let mut grouped: BTreeMap<MarginKey, Vec<usize>> = BTreeMap::new();
        for (i, cell) in matrix.keys().iter().enumerate() {
            grouped.entry(kind.key_of(cell)).or_default().push(i);
        }

        let groups: Vec<MarginGroup> = grouped
            .into_iter()
            .map(|(key, cells)| MarginGroup { key, cells })
            .collect();
        let by_key = groups
            .iter()
            .enumerate()
            .map(|(i, g)| (g.key.clone(), i))
            .collect();

        Self { groups, by_key }
    }

    pub fn groups(&self) -> &[MarginGroup] {
        &self.groups
    }

    pub fn contains(&self, key: &MarginKey) -> bool {
        self.by_key.contains_key(key)
    }
}

/// Sum over all plans and metal tiers for one (insurer, county)
pub fn insurer_county_margin(matrix: &AllocationMatrix, insurer: &str, county: &str) -> f64 {
    matrix
        .keys()
        .iter()
        .zip(matrix.values())
        .filter(|(k, _)| k.insurer == insurer && k.county == county)
        .map(|(_, v)| v)
        .sum()
}

/// Sum over all insurers and plans for one (metal tier, county)
pub fn metal_county_margin(matrix: &AllocationMatrix, metal_tier: MetalTier, county: &str) -> f64 {
    matrix
        .keys()
        .iter()
        .zip(matrix.values())
        .filter(|(k, _)| k.metal_tier == metal_tier && k.county == county)
        .map(|(_, v)| v)
        .sum()
}

/// Every margin total of one kind, keyed and sorted
pub fn margin_totals(matrix: &AllocationMatrix, kind: MarginKind) -> BTreeMap<MarginKey, f64> {
    let mut totals = BTreeMap::new();
    for (cell, value) in matrix.keys().iter().zip(matrix.values()) {
        *totals.entry(kind.key_of(cell)).or_insert(0.0) += value;
    }
    totals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::lattice::{build_lattice, seed_equal_split};
    use crate::crosswalk::CrosswalkIndex;
    use crate::inputs::{BaseRow, CrosswalkRow};
    use approx::assert_relative_eq;

    fn seeded() -> AllocationMatrix {
        let crosswalk = CrosswalkIndex::build(&[
            CrosswalkRow::new("Santa Cruz", 9),
            CrosswalkRow::new("Monterey", 9),
        ]);
        let row = |insurer: &str, plan: &str, metal_tier, enrollment| BaseRow {
            year: 2016,
            rating_area: 9,
            insurer: insurer.to_string(),
            plan: plan.to_string(),
            metal_tier,
            enrollment,
        };
        let base = vec![
            row("Anthem", "HMO", MetalTier::Silver, 100.0),
            row("Anthem", "PPO", MetalTier::Gold, 60.0),
            row("Kaiser", "HMO", MetalTier::Silver, 40.0),
        ];
        let mut matrix = build_lattice(2016, &base, &crosswalk).unwrap();
        seed_equal_split(&mut matrix);
        matrix
    }

    #[test]
    fn test_pure_margin_functions() {
        let matrix = seeded();
        assert_relative_eq!(insurer_county_margin(&matrix, "Anthem", "SANTA CRUZ"), 80.0);
        assert_relative_eq!(insurer_county_margin(&matrix, "Kaiser", "MONTEREY"), 20.0);
        assert_eq!(insurer_county_margin(&matrix, "Blue Shield", "MONTEREY"), 0.0);
        assert_relative_eq!(metal_county_margin(&matrix, MetalTier::Silver, "MONTEREY"), 70.0);
        assert_relative_eq!(metal_county_margin(&matrix, MetalTier::Gold, "SANTA CRUZ"), 30.0);
    }

    #[test]
    fn test_index_agrees_with_scan() {
        let matrix = seeded();
        let index = MarginIndex::build(&matrix, MarginKind::InsurerCounty);
        assert_eq!(index.groups().len(), 4);

        for group in index.groups() {
            let MarginKey::InsurerCounty { insurer, county } = &group.key else {
                panic!("wrong key kind");
            };
            assert_relative_eq!(
                group.current(matrix.values()),
                insurer_county_margin(&matrix, insurer, county)
            );
        }

        let metal = MarginIndex::build(&matrix, MarginKind::MetalCounty);
        let key = MarginKey::MetalCounty {
            metal_tier: MetalTier::Silver,
            county: "SANTA CRUZ".to_string(),
        };
        assert!(metal.contains(&key));

        let totals = margin_totals(&matrix, MarginKind::MetalCounty);
        assert_eq!(totals.len(), 4);
        assert_relative_eq!(totals.values().sum::<f64>(), 200.0);
    }

    #[test]
    fn test_targets_reject_negative() {
        let rows = vec![InsurerCountyTarget {
            year: 2016,
            insurer: "Anthem".to_string(),
            county: "SANTA CRUZ".to_string(),
            enrollment: -5.0,
        }];
        let err = MarginTargets::insurer_county(2016, &rows).unwrap_err();
        assert!(matches!(err, AllocationError::NegativeAllocationDetected { year: 2016, .. }));

        // Other years are not inspected
        assert!(MarginTargets::insurer_county(2017, &rows).unwrap().is_empty());
    }

    #[test]
    fn test_targets_reject_non_finite() {
        let rows = vec![
            MetalCountyTarget {
                year: 2016,
                metal_tier: MetalTier::Gold,
                county: "MONTEREY".to_string(),
                enrollment: f64::NAN,
            },
            MetalCountyTarget {
                year: 2017,
                metal_tier: MetalTier::Gold,
                county: "MONTEREY".to_string(),
                enrollment: f64::INFINITY,
            },
        ];
        for year in [2016, 2017] {
            let err = MarginTargets::metal_county(year, &rows).unwrap_err();
            match err {
                AllocationError::NonFiniteValue { year: y, key } => {
                    assert_eq!(y, year);
                    assert!(key.contains("(Gold, MONTEREY)"));
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }
    }

    #[test]
    fn test_targets_filter_by_year_and_sum() {
        let rows = vec![
            MetalCountyTarget {
                year: 2016,
                metal_tier: MetalTier::Silver,
                county: "MONTEREY".to_string(),
                enrollment: 10.0,
            },
            MetalCountyTarget {
                year: 2016,
                metal_tier: MetalTier::Silver,
                county: "MONTEREY".to_string(),
                enrollment: 5.0,
            },
            MetalCountyTarget {
                year: 2017,
                metal_tier: MetalTier::Silver,
                county: "MONTEREY".to_string(),
                enrollment: 99.0,
            },
        ];
        let targets = MarginTargets::metal_county(2016, &rows).unwrap();
        assert_eq!(targets.len(), 1);
        let key = MarginKey::MetalCounty {
            metal_tier: MetalTier::Silver,
            county: "MONTEREY".to_string(),
        };
        assert_eq!(targets.get(&key), Some(15.0));
    }
}
