//! Write `enrollment_allocated.csv` and summarize its contents

use crate::allocation::AllocatedRow;
use csv::Writer;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::io::Write;
use std::path::Path;

/// Sort rows the way the output file lists them
pub fn sort_rows(rows: &mut [AllocatedRow]) {
    rows.sort_by(|a, b| {
        (a.year, &a.county, &a.insurer, &a.plan, &a.metal_tier)
            .cmp(&(b.year, &b.county, &b.insurer, &b.plan, &b.metal_tier))
    });
}

/// Round to `decimals` places at write time; the estimates themselves stay fractional
fn round_to(value: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    (value * scale).round() / scale
}

/// Write rows with the `year,county,rating_area,insurer,plan,metal_tier,enrollment_est` header
pub fn write_allocated<W: Write>(
    writer: W,
    rows: &[AllocatedRow],
    decimals: Option<u32>,
) -> Result<(), Box<dyn Error>> {
    let mut csv_writer = Writer::from_writer(writer);
    for row in rows {
        match decimals {
            Some(d) => csv_writer.serialize(AllocatedRow {
                enrollment_est: round_to(row.enrollment_est, d),
                ..row.clone()
            })?,
            None => csv_writer.serialize(row)?,
        }
    }
    csv_writer.flush()?;
    Ok(())
}

/// Write rows to a file path
pub fn write_allocated_csv<P: AsRef<Path>>(
    path: P,
    rows: &[AllocatedRow],
    decimals: Option<u32>,
) -> Result<(), Box<dyn Error>> {
    let file = std::fs::File::create(path)?;
    write_allocated(file, rows, decimals)
}

/// Descriptive statistics over the output table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputSummary {
    pub total_by_year: BTreeMap<u16, f64>,
    pub rows: usize,
    pub counties: usize,
    pub insurers: usize,
    pub plans: usize,
    pub metal_tiers: usize,
    pub year_range: Option<(u16, u16)>,
}

impl OutputSummary {
    pub fn from_rows<'a>(rows: impl IntoIterator<Item = &'a AllocatedRow>) -> Self {
        let mut total_by_year = BTreeMap::new();
        let mut counties = BTreeSet::new();
        let mut insurers = BTreeSet::new();
        let mut plans = BTreeSet::new();
        let mut metal_tiers = BTreeSet::new();
        let mut count = 0;

        for row in rows {
            count += 1;
            *total_by_year.entry(row.year).or_insert(0.0) += row.enrollment_est;
            counties.insert(row.county.as_str());
            insurers.insert(row.insurer.as_str());
            plans.insert(row.plan.as_str());
            metal_tiers.insert(row.metal_tier.as_str());
        }

        let year_range = match (total_by_year.keys().next(), total_by_year.keys().next_back()) {
            (Some(&first), Some(&last)) => Some((first, last)),
            _ => None,
        };

        Self {
            total_by_year,
            rows: count,
            counties: counties.len(),
            insurers: insurers.len(),
            plans: plans.len(),
            metal_tiers: metal_tiers.len(),
            year_range,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(year: u16, county: &str, insurer: &str, enrollment_est: f64) -> AllocatedRow {
        AllocatedRow {
            year,
            county: county.to_string(),
            rating_area: 9,
            insurer: insurer.to_string(),
            plan: "HMO".to_string(),
            metal_tier: "Silver".to_string(),
            enrollment_est,
        }
    }

    #[test]
    fn test_write_header_and_order() {
        let mut rows = vec![
            row(2017, "MONTEREY", "Anthem", 1.0),
            row(2016, "SANTA CRUZ", "Anthem", 1200.0),
            row(2016, "MONTEREY", "Kaiser", 2.5),
            row(2016, "MONTEREY", "Anthem", 1000.0),
        ];
        sort_rows(&mut rows);

        let mut buffer = Vec::new();
        write_allocated(&mut buffer, &rows, None).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "year,county,rating_area,insurer,plan,metal_tier,enrollment_est");
        assert_eq!(lines[1], "2016,MONTEREY,9,Anthem,HMO,Silver,1000.0");
        assert_eq!(lines[2], "2016,MONTEREY,9,Kaiser,HMO,Silver,2.5");
        assert_eq!(lines[3], "2016,SANTA CRUZ,9,Anthem,HMO,Silver,1200.0");
        assert_eq!(lines[4], "2017,MONTEREY,9,Anthem,HMO,Silver,1.0");
    }

    #[test]
    fn test_rounding_is_write_time_only() {
        let rows = vec![row(2016, "MONTEREY", "Anthem", 333.333333)];
        let mut buffer = Vec::new();
        write_allocated(&mut buffer, &rows, Some(2)).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.ends_with("333.33\n"));
        assert_eq!(rows[0].enrollment_est, 333.333333);
    }

    #[test]
    fn test_summary() {
        let rows = vec![
            row(2016, "MONTEREY", "Anthem", 10.0),
            row(2016, "SANTA CRUZ", "Kaiser", 5.0),
            row(2018, "MONTEREY", "Anthem", 1.0),
        ];
        let summary = OutputSummary::from_rows(&rows);
        assert_eq!(summary.rows, 3);
        assert_eq!(summary.total_by_year[&2016], 15.0);
        assert_eq!(summary.counties, 2);
        assert_eq!(summary.insurers, 2);
        assert_eq!(summary.plans, 1);
        assert_eq!(summary.metal_tiers, 1);
        assert_eq!(summary.year_range, Some((2016, 2018)));

        assert_eq!(OutputSummary::from_rows(Vec::<AllocatedRow>::new().iter()).year_range, None);
    }
}
