//! Load and clean the input tables from CSV
//!
//! Column names are accepted both in their cleaned form and under the raw
//! export names, so the survey extracts can be fed in without renaming.

use super::data::{
    normalize_county, BaseRow, CrosswalkRow, InputTables, InsurerCountyTarget, MetalCountyTarget,
    MetalTier,
};
use crate::config::InputPaths;
use crate::error::LoadError;
use csv::Reader;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Row accounting for one table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleaningReport {
    pub rows_read: usize,
    pub dropped_missing_keys: usize,
    pub dropped_unmapped_metal: usize,
    pub rows_after_aggregation: usize,
}

#[derive(Debug, Deserialize)]
struct RawBaseRow {
    year: Option<String>,
    rating_area: Option<String>,
    #[serde(alias = "issuer_name")]
    insurer: Option<String>,
    #[serde(alias = "plan_type")]
    plan: Option<String>,
    #[serde(alias = "metal_level")]
    metal_tier: Option<String>,
    #[serde(alias = "enrollment_total", alias = "Enrollees")]
    enrollment: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawInsurerTarget {
    year: Option<String>,
    #[serde(alias = "issuer")]
    insurer: Option<String>,
    county: Option<String>,
    #[serde(alias = "enrollees", alias = "enrollment_total")]
    enrollment: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMetalTarget {
    year: Option<String>,
    #[serde(alias = "metal_level")]
    metal_tier: Option<String>,
    county: Option<String>,
    #[serde(alias = "enrollees", alias = "enrollment_total")]
    enrollment: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawCrosswalkRow {
    #[serde(alias = "countyname")]
    county: Option<String>,
    #[serde(alias = "ratingarea")]
    rating_area: Option<String>,
}

/// Parse an integral field that may have been exported as `2016` or `2016.0`
fn parse_whole<T: TryFrom<i64>>(raw: Option<&str>) -> Option<T> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    let whole = match raw.parse::<i64>() {
        Ok(v) => v,
        Err(_) => {
            let v: f64 = raw.parse().ok()?;
            if v.fract() != 0.0 || !v.is_finite() {
                return None;
            }
            v as i64
        }
    };
    T::try_from(whole).ok()
}

/// Numeric totals: blanks and unparseable values count as zero
fn parse_total(raw: Option<&str>) -> f64 {
    raw.and_then(|s| s.trim().parse::<f64>().ok()).unwrap_or(0.0)
}

fn non_empty(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn open(path: &Path) -> Result<File, LoadError> {
    File::open(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Load the rating-area base table from any reader
pub fn load_base_from_reader<R: Read>(reader: R) -> Result<(Vec<BaseRow>, CleaningReport), LoadError> {
    let mut csv_reader = Reader::from_reader(reader);
    let mut report = CleaningReport::default();
    let mut totals: BTreeMap<(u16, u32, String, String, MetalTier), f64> = BTreeMap::new();

    for result in csv_reader.deserialize() {
        let row: RawBaseRow = result?;
        report.rows_read += 1;

        let year = parse_whole::<u16>(row.year.as_deref());
        let rating_area = parse_whole::<u32>(row.rating_area.as_deref());
        let insurer = non_empty(row.insurer);
        let plan = non_empty(row.plan);
        let metal_label = non_empty(row.metal_tier);

        let (Some(year), Some(rating_area), Some(insurer), Some(plan), Some(metal_label)) =
            (year, rating_area, insurer, plan, metal_label)
        else {
            report.dropped_missing_keys += 1;
            continue;
        };

        let Some(metal_tier) = MetalTier::from_label(&metal_label) else {
            report.dropped_unmapped_metal += 1;
            continue;
        };

        *totals
            .entry((year, rating_area, insurer, plan, metal_tier))
            .or_insert(0.0) += parse_total(row.enrollment.as_deref());
    }

    let rows: Vec<BaseRow> = totals
        .into_iter()
        .map(|((year, rating_area, insurer, plan, metal_tier), enrollment)| BaseRow {
            year,
            rating_area,
            insurer,
            plan,
            metal_tier,
            enrollment,
        })
        .collect();
    report.rows_after_aggregation = rows.len();

    Ok((rows, report))
}

/// Load insurer x county targets from any reader
pub fn load_insurer_targets_from_reader<R: Read>(
    reader: R,
) -> Result<(Vec<InsurerCountyTarget>, CleaningReport), LoadError> {
    let mut csv_reader = Reader::from_reader(reader);
    let mut report = CleaningReport::default();
    let mut totals: BTreeMap<(u16, String, String), f64> = BTreeMap::new();

    for result in csv_reader.deserialize() {
        let row: RawInsurerTarget = result?;
        report.rows_read += 1;

        let year = parse_whole::<u16>(row.year.as_deref());
        let insurer = non_empty(row.insurer);
        let county = non_empty(row.county).map(|c| normalize_county(&c));

        let (Some(year), Some(insurer), Some(county)) = (year, insurer, county) else {
            report.dropped_missing_keys += 1;
            continue;
        };

        *totals.entry((year, insurer, county)).or_insert(0.0) += parse_total(row.enrollment.as_deref());
    }

    let rows: Vec<InsurerCountyTarget> = totals
        .into_iter()
        .map(|((year, insurer, county), enrollment)| InsurerCountyTarget {
            year,
            insurer,
            county,
            enrollment,
        })
        .collect();
    report.rows_after_aggregation = rows.len();

    Ok((rows, report))
}

/// Load metal tier x county targets from any reader
pub fn load_metal_targets_from_reader<R: Read>(
    reader: R,
) -> Result<(Vec<MetalCountyTarget>, CleaningReport), LoadError> {
    let mut csv_reader = Reader::from_reader(reader);
    let mut report = CleaningReport::default();
    let mut totals: BTreeMap<(u16, MetalTier, String), f64> = BTreeMap::new();

    for result in csv_reader.deserialize() {
        let row: RawMetalTarget = result?;
        report.rows_read += 1;

        let year = parse_whole::<u16>(row.year.as_deref());
        let metal_label = non_empty(row.metal_tier);
        let county = non_empty(row.county).map(|c| normalize_county(&c));

        let (Some(year), Some(metal_label), Some(county)) = (year, metal_label, county) else {
            report.dropped_missing_keys += 1;
            continue;
        };

        let Some(metal_tier) = MetalTier::from_label(&metal_label) else {
            report.dropped_unmapped_metal += 1;
            continue;
        };

        *totals.entry((year, metal_tier, county)).or_insert(0.0) += parse_total(row.enrollment.as_deref());
    }

    let rows: Vec<MetalCountyTarget> = totals
        .into_iter()
        .map(|((year, metal_tier, county), enrollment)| MetalCountyTarget {
            year,
            metal_tier,
            county,
            enrollment,
        })
        .collect();
    report.rows_after_aggregation = rows.len();

    Ok((rows, report))
}

/// Load county-to-rating-area memberships from any reader
///
/// Rows without a rating area are unusable and dropped. A row with a blank
/// county is kept: it declares a rating area that owns no counties.
pub fn load_crosswalk_from_reader<R: Read>(
    reader: R,
) -> Result<(Vec<CrosswalkRow>, CleaningReport), LoadError> {
    let mut csv_reader = Reader::from_reader(reader);
    let mut report = CleaningReport::default();
    let mut rows = Vec::new();

    for (index, result) in csv_reader.deserialize().enumerate() {
        let row: RawCrosswalkRow = result?;
        report.rows_read += 1;

        let Some(rating_area) = parse_whole::<u32>(row.rating_area.as_deref()) else {
            if row.rating_area.as_deref().map_or(false, |s| !s.trim().is_empty()) {
                return Err(LoadError::InvalidRow {
                    row: index + 1,
                    reason: format!("unparseable rating area {:?}", row.rating_area),
                });
            }
            report.dropped_missing_keys += 1;
            continue;
        };

        rows.push(CrosswalkRow::new(row.county.as_deref().unwrap_or(""), rating_area));
    }
    report.rows_after_aggregation = rows.len();

    Ok((rows, report))
}

/// Load all four tables from their files
pub fn load_inputs(paths: &InputPaths) -> Result<InputTables, LoadError> {
    let (base, base_report) = load_base_from_reader(open(&paths.base)?)?;
    info!("{}: {:?}", paths.base.display(), base_report);

    let (insurer_targets, insurer_report) =
        load_insurer_targets_from_reader(open(&paths.county_insurer)?)?;
    info!("{}: {:?}", paths.county_insurer.display(), insurer_report);

    let (metal_targets, metal_report) = load_metal_targets_from_reader(open(&paths.county_metal)?)?;
    info!("{}: {:?}", paths.county_metal.display(), metal_report);

    let (crosswalk, crosswalk_report) = load_crosswalk_from_reader(open(&paths.crosswalk)?)?;
    info!("{}: {:?}", paths.crosswalk.display(), crosswalk_report);

    Ok(InputTables {
        base,
        insurer_targets,
        metal_targets,
        crosswalk,
    })
}
