//! Period-keyed tables of quarterly report values.
//!
//! A [`PeriodTable`] is an ordered list of typed columns, one per
//! [`FiscalPeriod`], over a fixed set of instruments. The same shape serves as
//! the cumulative input ([`QuarterlyReportTable`]) and the single-quarter
//! output ([`QuarterDeltaTable`]) of delta reconstruction.

use crate::{FiscalPeriod, PrepError, Result};
use polars::prelude::*;

/// A single period's values, one per instrument row.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodColumn {
    /// Period this column reports
    pub period: FiscalPeriod,
    /// Value per instrument; `None` is "not reported"
    pub values: Vec<Option<f64>>,
}

impl PeriodColumn {
    /// Create a column, treating NaN as missing.
    pub fn new(period: FiscalPeriod, values: Vec<Option<f64>>) -> Self {
        let values = values
            .into_iter()
            .map(|v| v.filter(|x| !x.is_nan()))
            .collect();
        Self { period, values }
    }
}

/// Instrument rows by fiscal period columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeriodTable {
    instruments: Vec<String>,
    columns: Vec<PeriodColumn>,
}

/// Cumulative year-to-date values as reported.
pub type QuarterlyReportTable = PeriodTable;

/// Single-quarter deltas for Q1, Q2 and Q3.
pub type QuarterDeltaTable = PeriodTable;

impl PeriodTable {
    /// Create an empty table over the given instruments.
    pub const fn new(instruments: Vec<String>) -> Self {
        Self {
            instruments,
            columns: Vec::new(),
        }
    }

    /// Add a period column, replacing any existing column for the same period.
    pub fn with_column(mut self, period: FiscalPeriod, values: Vec<Option<f64>>) -> Result<Self> {
        self.insert(PeriodColumn::new(period, values))?;
        Ok(self)
    }

    /// Insert a period column, replacing any existing column for the same period.
    pub fn insert(&mut self, column: PeriodColumn) -> Result<()> {
        if column.values.len() != self.instruments.len() {
            return Err(PrepError::LengthMismatch {
                column: column.period.label(),
                expected: self.instruments.len(),
                actual: column.values.len(),
            });
        }

        match self.columns.iter_mut().find(|c| c.period == column.period) {
            Some(existing) => *existing = column,
            None => self.columns.push(column),
        }
        Ok(())
    }

    /// Instrument identifiers, one per row.
    pub fn instruments(&self) -> &[String] {
        &self.instruments
    }

    /// Columns in their current order.
    pub fn columns(&self) -> &[PeriodColumn] {
        &self.columns
    }

    /// Periods in their current column order.
    pub fn periods(&self) -> Vec<FiscalPeriod> {
        self.columns.iter().map(|c| c.period).collect()
    }

    /// Number of instrument rows.
    pub fn height(&self) -> usize {
        self.instruments.len()
    }

    /// Number of period columns.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Look up a column by period.
    pub fn column(&self, period: FiscalPeriod) -> Option<&PeriodColumn> {
        self.columns.iter().find(|c| c.period == period)
    }

    /// Value for an instrument in a period, if reported.
    pub fn get(&self, instrument: &str, period: FiscalPeriod) -> Option<f64> {
        let row = self.instruments.iter().position(|i| i == instrument)?;
        self.column(period)?.values[row]
    }

    /// Columns whose period satisfies the predicate, in current order.
    pub fn select<F>(&self, predicate: F) -> Vec<&PeriodColumn>
    where
        F: Fn(&FiscalPeriod) -> bool,
    {
        self.columns
            .iter()
            .filter(|c| predicate(&c.period))
            .collect()
    }

    /// Reorder columns chronologically.
    pub fn sort_chronologically(&mut self) {
        self.columns.sort_by_key(|c| c.period);
    }

    /// Build a table from a wide DataFrame.
    ///
    /// `id_column` holds instrument identifiers; every other column must be
    /// labelled with a fiscal period and castable to `f64`.
    /// A null identifier is rejected rather than merged with other rows.
    pub fn from_dataframe(df: &DataFrame, id_column: &str) -> Result<Self> {
        let ids = df
            .column(id_column)
            .map_err(|_| PrepError::MissingColumn(id_column.to_string()))?
            .cast(&DataType::String)?;
        let instruments = ids
            .str()?
            .into_iter()
            .enumerate()
            .map(|(row, id)| {
                id.map(str::to_string)
                    .ok_or_else(|| PrepError::MissingIdentifier {
                        column: id_column.to_string(),
                        row,
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut table = Self::new(instruments);
        for column in df.get_columns() {
            let name = column.name().as_str();
            if name == id_column {
                continue;
            }

            let period: FiscalPeriod = name.parse()?;
            let values = column.cast(&DataType::Float64)?;
            let values = values.f64()?.into_iter().collect();
            table.insert(PeriodColumn::new(period, values))?;
        }

        Ok(table)
    }

    /// Convert to a wide DataFrame with period labels as column names.
    pub fn to_dataframe(&self, id_column: &str) -> Result<DataFrame> {
        let mut columns = Vec::with_capacity(self.columns.len() + 1);
        columns.push(Column::new(id_column.into(), self.instruments.clone()));
        for column in &self.columns {
            columns.push(Column::new(
                column.period.label().into(),
                column.values.clone(),
            ));
        }

        Ok(DataFrame::new(columns)?)
    }
}
