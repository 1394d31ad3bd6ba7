//! Commit-range filtering of transcript records

use chrono::{DateTime, FixedOffset};

use crate::error::UploadError;
use crate::transcript::TranscriptRecord;

/// Inclusive time range between two commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
}

impl TimeRange {
    /// Both bounds are required; an open-ended range is an error.
    pub fn from_bounds(
        start: Option<DateTime<FixedOffset>>,
        end: Option<DateTime<FixedOffset>>,
    ) -> Result<Self, UploadError> {
        match (start, end) {
            (Some(start), Some(end)) => Ok(Self { start, end }),
            (None, _) => Err(UploadError::MissingBound { missing: "start" }),
            (_, None) => Err(UploadError::MissingBound { missing: "end" }),
        }
    }

    pub fn contains(&self, ts: DateTime<FixedOffset>) -> bool {
        self.start <= ts && ts <= self.end
    }

    /// Keep records whose timestamp falls in the range, in input order.
    /// Records without a parsable timestamp are dropped.
    pub fn filter(&self, records: Vec<TranscriptRecord>) -> Vec<TranscriptRecord> {
        records
            .into_iter()
            .filter(|record| {
                record
                    .parsed_timestamp()
                    .map(|ts| self.contains(ts))
                    .unwrap_or(false)
            })
            .collect()
    }
}

/// Filter `records` to `[start, end]`, failing if either bound is absent.
pub fn filter_by_range(
    records: Vec<TranscriptRecord>,
    start: Option<DateTime<FixedOffset>>,
    end: Option<DateTime<FixedOffset>>,
) -> Result<Vec<TranscriptRecord>, UploadError> {
    let range = TimeRange::from_bounds(start, end)?;
    Ok(range.filter(records))
}
