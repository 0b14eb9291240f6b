//! Industry membership and exposure matrices.
//!
//! Membership arrives as a long list of (instrument, industry) pairs. The
//! exposure matrix pivots it into a dense binary matrix with one row per
//! industry in a fixed universe and one column per instrument, which is the
//! form needed for dummy regressors in cross-sectional regression.

use crate::{DomainError, PrepError, Result};
use ndarray::{Array2, ArrayView1};
use polars::prelude::*;
use std::collections::{HashMap, HashSet};

/// Long-format (instrument, industry) pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndustryMembership {
    entries: Vec<(String, String)>,
}

impl IndustryMembership {
    /// Create an empty membership list.
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Build from (instrument, industry) pairs, keeping their order.
    pub fn from_pairs<I, A, B>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (A, B)>,
        A: Into<String>,
        B: Into<String>,
    {
        Self {
            entries: pairs
                .into_iter()
                .map(|(instrument, industry)| (instrument.into(), industry.into()))
                .collect(),
        }
    }

    /// Build from two columns of a DataFrame, skipping rows with a missing side.
    pub fn from_dataframe(df: &DataFrame, symbol_column: &str, industry_column: &str) -> Result<Self> {
        let symbols = string_column(df, symbol_column)?;
        let industries = string_column(df, industry_column)?;

        Ok(Self::from_pairs(
            symbols
                .into_iter()
                .zip(industries)
                .filter_map(|(s, i)| Some((s?, i?))),
        ))
    }

    /// Pairs in insertion order.
    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    /// Number of pairs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no pairs.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keep only the first pair seen for each instrument.
    pub fn deduplicated(&self) -> Self {
        let mut seen = HashSet::new();
        Self {
            entries: self
                .entries
                .iter()
                .filter(|(instrument, _)| seen.insert(instrument.as_str()))
                .cloned()
                .collect(),
        }
    }
}

/// Binary industry × instrument matrix.
///
/// Columns are sorted by instrument. Each column holds exactly one `1.0`
/// for an instrument with a membership and nothing else.
#[derive(Debug, Clone, PartialEq)]
pub struct IndustryExposureMatrix {
    industries: Vec<String>,
    instruments: Vec<String>,
    values: Array2<f64>,
}

impl IndustryExposureMatrix {
    /// Pivot a membership list against a fixed industry universe.
    ///
    /// Duplicate memberships are collapsed to the first occurrence. An
    /// industry outside `industries`, or a label repeated within it, is a
    /// domain error.
    pub fn build(membership: &IndustryMembership, industries: &[String]) -> Result<Self> {
        let mut industry_rows = HashMap::with_capacity(industries.len());
        for (row, industry) in industries.iter().enumerate() {
            if industry_rows.insert(industry.as_str(), row).is_some() {
                return Err(DomainError::DuplicateIndustry(industry.clone()).into());
            }
        }

        let membership = membership.deduplicated();

        // Group instruments by industry
        let mut groups: HashMap<&str, Vec<&str>> = HashMap::new();
        for (instrument, industry) in membership.entries() {
            groups
                .entry(industry.as_str())
                .or_default()
                .push(instrument.as_str());
        }

        let mut instruments: Vec<String> = membership
            .entries()
            .iter()
            .map(|(instrument, _)| instrument.clone())
            .collect();
        instruments.sort();
        let instrument_columns: HashMap<&str, usize> = instruments
            .iter()
            .enumerate()
            .map(|(i, s)| (s.as_str(), i))
            .collect();

        let mut values = Array2::from_elem((industries.len(), instruments.len()), f64::NAN);
        for (industry, members) in &groups {
            let Some(&row) = industry_rows.get(industry) else {
                return Err(DomainError::UnknownIndustry {
                    instrument: members.first().copied().unwrap_or_default().to_string(),
                    industry: (*industry).to_string(),
                }
                .into());
            };
            for member in members {
                values[[row, instrument_columns[member]]] = 1.0;
            }
        }
        values.mapv_inplace(|v| if v.is_nan() { 0.0 } else { v });

        Ok(Self {
            industries: industries.to_vec(),
            instruments,
            values,
        })
    }

    /// Industry labels, one per row.
    pub fn industries(&self) -> &[String] {
        &self.industries
    }

    /// Instrument identifiers, one per column, sorted.
    pub fn instruments(&self) -> &[String] {
        &self.instruments
    }

    /// The dense exposure values (industries × instruments).
    pub const fn values(&self) -> &Array2<f64> {
        &self.values
    }

    /// Exposure of an instrument to an industry, if both are present.
    pub fn get(&self, industry: &str, instrument: &str) -> Option<f64> {
        let row = self.industries.iter().position(|i| i == industry)?;
        let col = self.instrument_column(instrument)?;
        Some(self.values[[row, col]])
    }

    /// Exposure column of an instrument across all industries.
    pub fn exposures(&self, instrument: &str) -> Option<ArrayView1<'_, f64>> {
        let col = self.instrument_column(instrument)?;
        Some(self.values.column(col))
    }

    /// Row index of the industry an instrument belongs to.
    pub fn industry_of(&self, instrument: &str) -> Option<usize> {
        self.exposures(instrument)?
            .iter()
            .position(|&v| v == 1.0)
    }

    /// Dummy columns aligned to a panel's instrument column.
    ///
    /// One `f64` column per industry named `{prefix}{industry}`. Rows whose
    /// instrument has no membership get missing values in every column.
    pub fn dummy_columns(&self, symbols: &[Option<String>], prefix: &str) -> Vec<Column> {
        let columns: Vec<Option<usize>> = symbols
            .iter()
            .map(|s| s.as_deref().and_then(|s| self.instrument_column(s)))
            .collect();

        self.industries
            .iter()
            .enumerate()
            .map(|(row, industry)| {
                let values: Vec<Option<f64>> = columns
                    .iter()
                    .map(|col| col.map(|c| self.values[[row, c]]))
                    .collect();
                Column::new(format!("{prefix}{industry}").into(), values)
            })
            .collect()
    }

    /// Wide DataFrame with one row per industry and one column per instrument.
    pub fn to_dataframe(&self, industry_column: &str) -> Result<DataFrame> {
        let mut columns = Vec::with_capacity(self.instruments.len() + 1);
        columns.push(Column::new(
            industry_column.into(),
            self.industries.clone(),
        ));
        for (col, instrument) in self.instruments.iter().enumerate() {
            columns.push(Column::new(
                instrument.as_str().into(),
                self.values.column(col).to_vec(),
            ));
        }

        Ok(DataFrame::new(columns)?)
    }

    fn instrument_column(&self, instrument: &str) -> Option<usize> {
        self.instruments
            .binary_search_by(|s| s.as_str().cmp(instrument))
            .ok()
    }
}

/// Read a column as optional strings, casting non-string types.
pub(crate) fn string_column(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let column = df
        .column(name)
        .map_err(|_| PrepError::MissingColumn(name.to_string()))?
        .cast(&DataType::String)?;

    Ok(column
        .str()?
        .into_iter()
        .map(|s| s.map(str::to_string))
        .collect())
}
