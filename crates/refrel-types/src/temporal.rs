use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// The effective date of a release, member, or description.
///
/// Release names and artifact file names use the compact `YYYYMMDD` form,
/// which is also how effective times are written to export rows.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EffectiveTime(NaiveDate);

impl EffectiveTime {
    /// Compact date format used for release names.
    pub const FORMAT: &'static str = "%Y%m%d";

    /// Wrap a calendar date.
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Build from year/month/day, failing on an impossible date.
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Result<Self, TypeError> {
        NaiveDate::from_ymd_opt(year, month, day)
            .map(Self)
            .ok_or_else(|| TypeError::InvalidEffectiveTime(format!("{year}-{month}-{day}")))
    }

    /// Parse the compact `YYYYMMDD` form.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        NaiveDate::parse_from_str(s, Self::FORMAT)
            .map(Self)
            .map_err(|e| TypeError::InvalidEffectiveTime(format!("{s}: {e}")))
    }

    /// The underlying date.
    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// The release name derived from this effective time.
    pub fn release_name(&self) -> String {
        self.0.format(Self::FORMAT).to_string()
    }
}

impl FromStr for EffectiveTime {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Debug for EffectiveTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EffectiveTime({})", self.release_name())
    }
}

impl fmt::Display for EffectiveTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.release_name())
    }
}
