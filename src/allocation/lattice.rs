//! Cell lattice construction and equal-weight seeding
//!
//! Cells live in a flat arena; everything else (base-row groups, margin
//! groups) refers to them by index.

use crate::crosswalk::CrosswalkIndex;
use crate::error::AllocationError;
use crate::inputs::{BaseRow, MetalTier};
use std::collections::BTreeMap;
use std::ops::Range;

/// Address of one allocation cell
///
/// `rating_area` is derived: it is always the crosswalk rating area of `county`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey {
    pub year: u16,
    pub county: String,
    pub insurer: String,
    pub plan: String,
    pub metal_tier: MetalTier,
    pub rating_area: u32,
}

/// One aggregated base row and the contiguous cells it was expanded into
#[derive(Debug, Clone, PartialEq)]
pub struct BaseGroup {
    pub rating_area: u32,
    pub insurer: String,
    pub plan: String,
    pub metal_tier: MetalTier,
    pub enrollment: f64,
    pub cells: Range<usize>,
}

/// All cells of one year
#[derive(Debug, Clone)]
pub struct AllocationMatrix {
    year: u16,
    keys: Vec<CellKey>,
    values: Vec<f64>,
    groups: Vec<BaseGroup>,
}

impl AllocationMatrix {
    pub fn year(&self) -> u16 {
        self.year
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> &[CellKey] {
        &self.keys
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub(crate) fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    pub fn groups(&self) -> &[BaseGroup] {
        &self.groups
    }

    /// Sum of all cell values
    pub fn total(&self) -> f64 {
        self.values.iter().sum()
    }

    /// Sum of the base-row totals the lattice was built from
    pub fn base_total(&self) -> f64 {
        self.groups.iter().map(|g| g.enrollment).sum()
    }

    /// Release the arena as (key, value) pairs
    pub fn into_cells(self) -> impl Iterator<Item = (CellKey, f64)> {
        self.keys.into_iter().zip(self.values)
    }
}

/// Expand one year's base rows into zero-valued cells, one per member county
///
/// Rows sharing a (rating area, insurer, plan, metal tier) key are summed
/// first. Rows with zero enrollment still have their rating area checked but
/// produce no cells.
pub fn build_lattice(
    year: u16,
    base: &[BaseRow],
    crosswalk: &CrosswalkIndex,
) -> Result<AllocationMatrix, AllocationError> {
    let mut totals: BTreeMap<(u32, &str, &str, MetalTier), f64> = BTreeMap::new();
    for row in base.iter().filter(|r| r.year == year) {
        *totals
            .entry((row.rating_area, row.insurer.as_str(), row.plan.as_str(), row.metal_tier))
            .or_insert(0.0) += row.enrollment;
    }

    let mut keys = Vec::new();
    let mut groups = Vec::new();

    for ((rating_area, insurer, plan, metal_tier), enrollment) in totals {
        let label = || format!("({rating_area}, {insurer}, {plan}, {metal_tier})");

        if !enrollment.is_finite() {
            return Err(AllocationError::NonFiniteValue { year, key: label() });
        }
        if enrollment < 0.0 {
            return Err(AllocationError::NegativeAllocationDetected {
                year,
                key: label(),
                value: enrollment,
            });
        }

        let counties = crosswalk
            .counties_of(rating_area)?
            .ok_or_else(|| AllocationError::UnknownRatingArea {
                year,
                rating_area,
                insurer: insurer.to_string(),
            })?;

        if enrollment == 0.0 {
            continue;
        }

        let start = keys.len();
        for county in counties {
            keys.push(CellKey {
                year,
                county: county.clone(),
                insurer: insurer.to_string(),
                plan: plan.to_string(),
                metal_tier,
                rating_area,
            });
        }

        groups.push(BaseGroup {
            rating_area,
            insurer: insurer.to_string(),
            plan: plan.to_string(),
            metal_tier,
            enrollment,
            cells: start..keys.len(),
        });
    }

    let values = vec![0.0; keys.len()];
    Ok(AllocationMatrix {
        year,
        keys,
        values,
        groups,
    })
}

/// Stage 1: split each base total equally across its member counties
///
/// No population or other weighting signal is available, so every county of
/// a rating area gets E / N.
pub fn seed_equal_split(matrix: &mut AllocationMatrix) {
    for group in &matrix.groups {
        let n = group.cells.len();
        if n == 0 {
            continue;
        }
        let share = group.enrollment / n as f64;
        for value in &mut matrix.values[group.cells.clone()] {
            *value = share;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inputs::CrosswalkRow;
    use approx::assert_relative_eq;

    fn crosswalk() -> CrosswalkIndex {
        CrosswalkIndex::build(&[
            CrosswalkRow::new("Santa Cruz", 9),
            CrosswalkRow::new("Monterey", 9),
            CrosswalkRow::new("San Benito", 9),
            CrosswalkRow::new("San Luis Obispo", 10),
            CrosswalkRow::new("", 19),
        ])
    }

    fn base(year: u16, rating_area: u32, insurer: &str, metal_tier: MetalTier, enrollment: f64) -> BaseRow {
        BaseRow {
            year,
            rating_area,
            insurer: insurer.to_string(),
            plan: "HMO".to_string(),
            metal_tier,
            enrollment,
        }
    }

    #[test]
    fn test_expands_across_member_counties() {
        let rows = vec![
            base(2016, 9, "Anthem", MetalTier::Silver, 3000.0),
            base(2016, 10, "Anthem", MetalTier::Silver, 500.0),
            base(2017, 9, "Anthem", MetalTier::Gold, 10.0),
        ];
        let matrix = build_lattice(2016, &rows, &crosswalk()).unwrap();

        assert_eq!(matrix.year(), 2016);
        assert_eq!(matrix.len(), 4);
        assert_eq!(matrix.groups().len(), 2);
        assert!(matrix.values().iter().all(|&v| v == 0.0));
        for key in matrix.keys() {
            assert_eq!(crosswalk().rating_area_of(&key.county), Some(key.rating_area));
        }
    }

    #[test]
    fn test_zero_rows_make_no_cells() {
        let rows = vec![
            base(2016, 9, "Anthem", MetalTier::Silver, 0.0),
            base(2016, 10, "Anthem", MetalTier::Silver, 5.0),
        ];
        let matrix = build_lattice(2016, &rows, &crosswalk()).unwrap();
        assert_eq!(matrix.len(), 1);
        assert_eq!(matrix.keys()[0].county, "SAN LUIS OBISPO");
    }

    #[test]
    fn test_duplicate_base_keys_are_summed() {
        let rows = vec![
            base(2016, 10, "Anthem", MetalTier::Silver, 5.0),
            base(2016, 10, "Anthem", MetalTier::Silver, 7.0),
        ];
        let matrix = build_lattice(2016, &rows, &crosswalk()).unwrap();
        assert_eq!(matrix.len(), 1);
        assert_eq!(matrix.base_total(), 12.0);
    }

    #[test]
    fn test_unknown_rating_area() {
        let rows = vec![base(2016, 4, "Anthem", MetalTier::Silver, 5.0)];
        let err = build_lattice(2016, &rows, &crosswalk()).unwrap_err();
        assert_eq!(
            err,
            AllocationError::UnknownRatingArea {
                year: 2016,
                rating_area: 4,
                insurer: "Anthem".to_string(),
            }
        );
    }

    #[test]
    fn test_rating_area_without_counties() {
        let rows = vec![base(2016, 19, "Anthem", MetalTier::Silver, 5.0)];
        let err = build_lattice(2016, &rows, &crosswalk()).unwrap_err();
        assert!(matches!(err, AllocationError::InvalidCrosswalk { .. }));
    }

    #[test]
    fn test_negative_base_total_rejected() {
        let rows = vec![base(2016, 9, "Anthem", MetalTier::Silver, -1.0)];
        let err = build_lattice(2016, &rows, &crosswalk()).unwrap_err();
        assert!(matches!(err, AllocationError::NegativeAllocationDetected { year: 2016, .. }));
    }

    #[test]
    fn test_equal_weight_seeding() {
        let rows = vec![
            base(2016, 9, "Anthem", MetalTier::Silver, 3000.0),
            base(2016, 9, "Kaiser", MetalTier::Gold, 100.0),
        ];
        let mut matrix = build_lattice(2016, &rows, &crosswalk()).unwrap();
        seed_equal_split(&mut matrix);

        for group in matrix.groups() {
            let n = group.cells.len() as f64;
            let seeded = &matrix.values()[group.cells.clone()];
            for &v in seeded {
                assert_eq!(v, group.enrollment / n);
            }
            assert_relative_eq!(seeded.iter().sum::<f64>(), group.enrollment, max_relative = 1e-12);
        }
        assert_relative_eq!(matrix.total(), 3100.0, max_relative = 1e-12);
    }
}
