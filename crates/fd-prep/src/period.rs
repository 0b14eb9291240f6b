//! Fiscal period labels.
//!
//! Report columns are labelled `<year><quarter>`, e.g. `2019Q2`. Parsing the
//! label once into a [`FiscalPeriod`] lets every selection downstream be an
//! explicit filter over year and quarter instead of string matching.

use crate::{PrepError, Result};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Quarter of a fiscal year.
///
/// `Q0` is the zero baseline at the start of the fiscal year. Variants are
/// declared in chronological order so the derived ordering is chronological.
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum FiscalQuarter {
    /// Fiscal year start (synthetic baseline)
    Q0,
    /// First quarter
    Q1,
    /// Second quarter
    Q2,
    /// Third quarter
    Q3,
    /// Fourth quarter
    Q4,
}

impl FiscalQuarter {
    /// Parse the `Qn` suffix of a period label.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "Q0" => Some(Self::Q0),
            "Q1" => Some(Self::Q1),
            "Q2" => Some(Self::Q2),
            "Q3" => Some(Self::Q3),
            "Q4" => Some(Self::Q4),
            _ => None,
        }
    }
}

/// A fiscal year and quarter, ordered chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FiscalPeriod {
    /// Fiscal year
    pub year: i32,
    /// Quarter within the year
    pub quarter: FiscalQuarter,
}

impl FiscalPeriod {
    /// Create a period from its parts.
    pub const fn new(year: i32, quarter: FiscalQuarter) -> Self {
        Self { year, quarter }
    }

    /// Render the period as a column label.
    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for FiscalPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.year, self.quarter)
    }
}

impl FromStr for FiscalPeriod {
    type Err = PrepError;

    fn from_str(label: &str) -> Result<Self> {
        let invalid = || PrepError::InvalidPeriod(label.to_string());

        let split = label.rfind('Q').ok_or_else(invalid)?;
        let (year, quarter) = label.split_at(split);
        if year.is_empty() || !year.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let year = year.parse::<i32>().map_err(|_| invalid())?;
        let quarter = FiscalQuarter::from_label(quarter).ok_or_else(invalid)?;

        Ok(Self::new(year, quarter))
    }
}
