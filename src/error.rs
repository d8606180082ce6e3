//! Error taxonomy for crosswalk construction and per-year allocation runs

use thiserror::Error;

/// Fatal conditions for an allocation run.
///
/// Every variant that can arise inside a year carries the year so the caller
/// can report it next to the years that did succeed.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AllocationError {
    /// County-to-rating-area mapping is not a function, or a rating area has no counties
    #[error("invalid crosswalk: {reason}")]
    InvalidCrosswalk { reason: String },

    /// A base row references a rating area missing from the crosswalk
    #[error("year {year}: base row for insurer `{insurer}` references unknown rating area {rating_area}")]
    UnknownRatingArea {
        year: u16,
        rating_area: u32,
        insurer: String,
    },

    /// A negative target or base total, or a negative cell after scaling
    #[error("year {year}: negative allocation detected at {key} (value={value})")]
    NegativeAllocationDetected { year: u16, key: String, value: f64 },

    /// NaN or infinite input total
    #[error("year {year}: non-finite value at {key}")]
    NonFiniteValue { year: u16, key: String },
}

impl AllocationError {
    /// Year the error belongs to, if it is scoped to one
    pub fn year(&self) -> Option<u16> {
        match self {
            Self::InvalidCrosswalk { .. } => None,
            Self::UnknownRatingArea { year, .. }
            | Self::NegativeAllocationDetected { year, .. }
            | Self::NonFiniteValue { year, .. } => Some(*year),
        }
    }

    /// Short stable name used in summaries
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidCrosswalk { .. } => "InvalidCrosswalk",
            Self::UnknownRatingArea { .. } => "UnknownRatingArea",
            Self::NegativeAllocationDetected { .. } => "NegativeAllocationDetected",
            Self::NonFiniteValue { .. } => "NonFiniteValue",
        }
    }
}

/// Failures while reading the input tables
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error("row {row}: {reason}")]
    InvalidRow { row: usize, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_year_scoping() {
        let err = AllocationError::UnknownRatingArea {
            year: 2016,
            rating_area: 42,
            insurer: "Anthem".to_string(),
        };
        assert_eq!(err.year(), Some(2016));
        assert_eq!(err.kind(), "UnknownRatingArea");
        assert!(err.to_string().contains("rating area 42"));

        let err = AllocationError::InvalidCrosswalk { reason: "x".to_string() };
        assert_eq!(err.year(), None);
    }
}
