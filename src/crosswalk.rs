//! County <-> rating area index
//!
//! Rating areas partition the counties: every county belongs to exactly one
//! rating area and every referenced rating area must own at least one county.

use crate::error::AllocationError;
use crate::inputs::CrosswalkRow;
use log::warn;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Static membership index, built once per run
///
/// A county mapped to more than one rating area poisons every rating area it
/// appears in; lookups of those areas fail while the rest stay usable.
#[derive(Debug, Clone, Default)]
pub struct CrosswalkIndex {
    counties_by_area: BTreeMap<u32, BTreeSet<String>>,
    area_by_county: HashMap<String, u32>,
    conflicts: BTreeMap<String, BTreeSet<u32>>,
}

impl CrosswalkIndex {
    /// Build the index; repeated identical rows are tolerated
    pub fn build(rows: &[CrosswalkRow]) -> Self {
        let mut index = Self::default();
        let mut areas_of: BTreeMap<&str, BTreeSet<u32>> = BTreeMap::new();

        for row in rows {
            let counties = index.counties_by_area.entry(row.rating_area).or_default();
            if row.county.is_empty() {
                continue;
            }
            counties.insert(row.county.clone());
            areas_of.entry(row.county.as_str()).or_default().insert(row.rating_area);
        }

        for (county, areas) in areas_of {
            if areas.len() > 1 {
                warn!("county {} is mapped to rating areas {:?}", county, areas);
                index.conflicts.insert(county.to_string(), areas);
            } else if let Some(&area) = areas.first() {
                index.area_by_county.insert(county.to_string(), area);
            }
        }

        index
    }

    /// Counties of a rating area
    ///
    /// Returns `Ok(None)` for a rating area the crosswalk never mentions.
    /// `InvalidCrosswalk` means the area owns no counties or shares a county
    /// with another rating area.
    pub fn counties_of(&self, rating_area: u32) -> Result<Option<&BTreeSet<String>>, AllocationError> {
        let Some(counties) = self.counties_by_area.get(&rating_area) else {
            return Ok(None);
        };
        if counties.is_empty() {
            return Err(AllocationError::InvalidCrosswalk {
                reason: format!("rating area {} has no counties", rating_area),
            });
        }
        if let Some((county, areas)) = self
            .conflicts
            .iter()
            .find(|(_, areas)| areas.contains(&rating_area))
        {
            let areas: Vec<String> = areas.iter().map(u32::to_string).collect();
            return Err(AllocationError::InvalidCrosswalk {
                reason: format!(
                    "county {} is mapped to rating areas {}",
                    county,
                    areas.join(" and ")
                ),
            });
        }
        Ok(Some(counties))
    }

    /// Counties mapped to more than one rating area
    pub fn conflicts(&self) -> impl Iterator<Item = (&str, &BTreeSet<u32>)> {
        self.conflicts.iter().map(|(county, areas)| (county.as_str(), areas))
    }

    /// Rating area that contains a county; `None` for unknown or conflicting counties
    pub fn rating_area_of(&self, county: &str) -> Option<u32> {
        self.area_by_county.get(county).copied()
    }

    /// All rating areas, ascending
    pub fn rating_areas(&self) -> impl Iterator<Item = u32> + '_ {
        self.counties_by_area.keys().copied()
    }

    /// Number of distinct counties, conflicting ones included
    pub fn county_count(&self) -> usize {
        self.area_by_county.len() + self.conflicts.len()
    }
}
