//! Pre-run margin consistency report and post-run validation checks

use crate::allocation::AllocatedRow;
use crate::inputs::{BaseRow, InsurerCountyTarget, MetalCountyTarget};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Percent difference above which a county-year counts as inconsistent
const INCONSISTENCY_PCT: f64 = 1.0;

/// Relative difference below which a check passes
pub const PASS_TOLERANCE: f64 = 0.001;

/// Insurer and metal target totals for one year
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearTargetTotals {
    pub year: u16,
    pub insurer_total: f64,
    pub metal_total: f64,
    pub diff_pct: f64,
}

/// How far the two target tables disagree on county totals
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsistencyReport {
    pub county_years: usize,
    pub inconsistent_county_years: usize,
    pub per_year: Vec<YearTargetTotals>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.inconsistent_county_years == 0
    }
}

/// Compare per-(year, county) totals of the insurer and metal target tables
pub fn check_margin_consistency(
    insurer: &[InsurerCountyTarget],
    metal: &[MetalCountyTarget],
) -> ConsistencyReport {
    let mut merged: BTreeMap<(u16, &str), (f64, f64)> = BTreeMap::new();
    for row in insurer {
        merged.entry((row.year, row.county.as_str())).or_default().0 += row.enrollment;
    }
    for row in metal {
        merged.entry((row.year, row.county.as_str())).or_default().1 += row.enrollment;
    }

    let inconsistent_county_years = merged
        .values()
        .filter(|&&(insurer_total, metal_total)| {
            metal_total > 0.0
                && 100.0 * (insurer_total - metal_total).abs() / metal_total > INCONSISTENCY_PCT
        })
        .count();

    let mut by_year: BTreeMap<u16, (f64, f64)> = BTreeMap::new();
    for (&(year, _), &(insurer_total, metal_total)) in &merged {
        let totals = by_year.entry(year).or_default();
        totals.0 += insurer_total;
        totals.1 += metal_total;
    }

    let per_year = by_year
        .into_iter()
        .map(|(year, (insurer_total, metal_total))| YearTargetTotals {
            year,
            insurer_total,
            metal_total,
            diff_pct: if metal_total > 0.0 {
                100.0 * (insurer_total - metal_total).abs() / metal_total
            } else {
                0.0
            },
        })
        .collect();

    ConsistencyReport {
        county_years: merged.len(),
        inconsistent_county_years,
        per_year,
    }
}

/// Distribution of |allocated - expected| / expected over positive expectations
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelativeDiffStats {
    pub compared: usize,
    pub max: f64,
    pub median: f64,
    pub within_1pct: f64,
    pub within_5pct: f64,
}

impl RelativeDiffStats {
    fn from_diffs(mut diffs: Vec<f64>) -> Option<Self> {
        if diffs.is_empty() {
            return None;
        }
        diffs.sort_by(|a, b| a.total_cmp(b));

        let n = diffs.len();
        let median = if n % 2 == 1 {
            diffs[n / 2]
        } else {
            (diffs[n / 2 - 1] + diffs[n / 2]) / 2.0
        };
        let share = |limit: f64| 100.0 * diffs.iter().filter(|&&d| d < limit).count() as f64 / n as f64;

        Some(Self {
            compared: n,
            max: diffs[n - 1],
            median,
            within_1pct: share(0.01),
            within_5pct: share(0.05),
        })
    }

    pub fn passes(&self) -> bool {
        self.max < PASS_TOLERANCE
    }
}

/// Post-run checks against both target tables and the base totals
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub insurer_county: Option<RelativeDiffStats>,
    pub metal_county: Option<RelativeDiffStats>,
    pub rating_area: Option<RelativeDiffStats>,
    pub negative_estimates: usize,
}

/// Relative diffs for every expected key present in `allocated` with a positive expectation
fn relative_diffs<K: std::hash::Hash + Eq>(
    allocated: &HashMap<K, f64>,
    expected: impl Iterator<Item = (K, f64)>,
) -> Vec<f64> {
    expected
        .filter(|(_, target)| *target > 0.0)
        .filter_map(|(key, target)| allocated.get(&key).map(|&est| (est - target).abs() / target))
        .collect()
}

/// Run all four checks over the allocated rows
pub fn validate(
    rows: &[AllocatedRow],
    base: &[BaseRow],
    insurer: &[InsurerCountyTarget],
    metal: &[MetalCountyTarget],
) -> ValidationReport {
    let mut by_insurer: HashMap<(u16, &str, &str), f64> = HashMap::new();
    let mut by_metal: HashMap<(u16, &str, &str), f64> = HashMap::new();
    let mut by_rating_area: HashMap<(u16, u32, &str, &str, &str), f64> = HashMap::new();

    for row in rows {
        *by_insurer
            .entry((row.year, row.insurer.as_str(), row.county.as_str()))
            .or_insert(0.0) += row.enrollment_est;
        *by_metal
            .entry((row.year, row.metal_tier.as_str(), row.county.as_str()))
            .or_insert(0.0) += row.enrollment_est;
        *by_rating_area
            .entry((
                row.year,
                row.rating_area,
                row.insurer.as_str(),
                row.plan.as_str(),
                row.metal_tier.as_str(),
            ))
            .or_insert(0.0) += row.enrollment_est;
    }

    let insurer_diffs = relative_diffs(
        &by_insurer,
        insurer
            .iter()
            .map(|t| ((t.year, t.insurer.as_str(), t.county.as_str()), t.enrollment)),
    );
    let metal_diffs = relative_diffs(
        &by_metal,
        metal
            .iter()
            .map(|t| ((t.year, t.metal_tier.as_str(), t.county.as_str()), t.enrollment)),
    );
    let rating_area_diffs = relative_diffs(
        &by_rating_area,
        base.iter().map(|b| {
            (
                (b.year, b.rating_area, b.insurer.as_str(), b.plan.as_str(), b.metal_tier.as_str()),
                b.enrollment,
            )
        }),
    );

    ValidationReport {
        insurer_county: RelativeDiffStats::from_diffs(insurer_diffs),
        metal_county: RelativeDiffStats::from_diffs(metal_diffs),
        rating_area: RelativeDiffStats::from_diffs(rating_area_diffs),
        negative_estimates: rows.iter().filter(|r| r.enrollment_est < 0.0).count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inputs::MetalTier;
    use approx::assert_relative_eq;

    fn insurer_target(year: u16, county: &str, enrollment: f64) -> InsurerCountyTarget {
        InsurerCountyTarget {
            year,
            insurer: "Anthem".to_string(),
            county: county.to_string(),
            enrollment,
        }
    }

    fn metal_target(year: u16, county: &str, enrollment: f64) -> MetalCountyTarget {
        MetalCountyTarget {
            year,
            metal_tier: MetalTier::Silver,
            county: county.to_string(),
            enrollment,
        }
    }

    fn row(county: &str, enrollment_est: f64) -> AllocatedRow {
        AllocatedRow {
            year: 2016,
            county: county.to_string(),
            rating_area: 9,
            insurer: "Anthem".to_string(),
            plan: "HMO".to_string(),
            metal_tier: "Silver".to_string(),
            enrollment_est,
        }
    }

    #[test]
    fn test_consistency_flags_disagreeing_counties() {
        let insurer = vec![
            insurer_target(2016, "SANTA CRUZ", 100.0),
            insurer_target(2016, "MONTEREY", 200.0),
            insurer_target(2017, "MONTEREY", 50.0),
        ];
        let metal = vec![
            metal_target(2016, "SANTA CRUZ", 100.5),
            metal_target(2016, "MONTEREY", 100.0),
            metal_target(2017, "SAN BENITO", 10.0),
        ];
        let report = check_margin_consistency(&insurer, &metal);

        assert_eq!(report.county_years, 4);
        // Monterey 2016 (100%) and San Benito 2017 (insurer side missing)
        assert_eq!(report.inconsistent_county_years, 2);
        assert!(!report.is_consistent());

        assert_eq!(report.per_year.len(), 2);
        let y2016 = &report.per_year[0];
        assert_eq!(y2016.insurer_total, 300.0);
        assert_eq!(y2016.metal_total, 200.5);
        assert_relative_eq!(y2016.diff_pct, 100.0 * 99.5 / 200.5);
    }

    #[test]
    fn test_validate_reports_each_check() {
        let rows = vec![row("SANTA CRUZ", 1200.0), row("MONTEREY", 1000.0), row("SAN BENITO", 800.0)];
        let base = vec![BaseRow {
            year: 2016,
            rating_area: 9,
            insurer: "Anthem".to_string(),
            plan: "HMO".to_string(),
            metal_tier: MetalTier::Silver,
            enrollment: 3000.0,
        }];
        let insurer = vec![
            insurer_target(2016, "SANTA CRUZ", 1200.0),
            insurer_target(2016, "MONTEREY", 1100.0),
            insurer_target(2016, "FRESNO", 5.0),
        ];
        let metal = vec![
            metal_target(2016, "SANTA CRUZ", 1200.0),
            metal_target(2016, "MONTEREY", 1000.0),
            metal_target(2016, "SAN BENITO", 0.0),
        ];

        let report = validate(&rows, &base, &insurer, &metal);

        let ic = report.insurer_county.unwrap();
        assert_eq!(ic.compared, 2);
        assert_relative_eq!(ic.max, 100.0 / 1100.0);
        assert_relative_eq!(ic.median, 50.0 / 1100.0);
        assert_eq!(ic.within_1pct, 50.0);
        assert!(!ic.passes());

        let mc = report.metal_county.unwrap();
        assert_eq!(mc.compared, 2);
        assert!(mc.passes());

        let ra = report.rating_area.unwrap();
        assert_eq!(ra.compared, 1);
        assert_eq!(ra.max, 0.0);
        assert_eq!(report.negative_estimates, 0);
    }

    #[test]
    fn test_no_positive_targets_means_no_stats() {
        let report = validate(&[row("SANTA CRUZ", 1.0)], &[], &[], &[]);
        assert!(report.insurer_county.is_none());
        assert!(report.metal_county.is_none());
        assert!(report.rating_area.is_none());
    }
}
