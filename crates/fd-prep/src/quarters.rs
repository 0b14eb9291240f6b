//! Single-quarter reconstruction from cumulative reports.
//!
//! Financial statements report year-to-date totals: the Q2 figure covers
//! Q1 + Q2, the Q3 figure covers Q1 + Q2 + Q3. This module recovers the
//! amount attributable to each individual quarter:
//!
//! - Q1 is already a single quarter and passes through unchanged.
//! - Q2 is differenced against Q1 after gap-filling. A zero baseline `Q0` is
//!   inserted at the start of every supported fiscal year and missing values
//!   are interpolated linearly, so a missing Q1 becomes half of Q2.
//! - Q3 is differenced against the same year's reported Q2.
//!
//! Derived deltas equal to exactly zero are treated as unreported.

use crate::{
    DomainError, FiscalPeriod, FiscalQuarter, PeriodColumn, QuarterDeltaTable,
    QuarterlyReportTable, Result,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Configuration for quarterly delta reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuarterConfig {
    /// First fiscal year that receives a zero baseline (inclusive).
    pub first_year: i32,
    /// Last fiscal year that receives a zero baseline (inclusive).
    pub last_year: i32,
}

impl Default for QuarterConfig {
    fn default() -> Self {
        Self {
            first_year: 2011,
            last_year: 2022,
        }
    }
}

impl QuarterConfig {
    /// Whether a fiscal year is inside the supported range.
    pub const fn supports(&self, year: i32) -> bool {
        year >= self.first_year && year <= self.last_year
    }

    fn validate(&self) -> Result<()> {
        if self.first_year > self.last_year {
            return Err(DomainError::InvalidYearRange {
                first: self.first_year,
                last: self.last_year,
            }
            .into());
        }
        Ok(())
    }
}

/// Converts cumulative quarterly report columns into single-quarter deltas.
#[derive(Debug, Clone, Default)]
pub struct QuarterDeltaReconstructor {
    config: QuarterConfig,
}

impl QuarterDeltaReconstructor {
    /// Create a reconstructor with a custom year range.
    pub const fn with_config(config: QuarterConfig) -> Self {
        Self { config }
    }

    /// Returns the current configuration.
    pub const fn config(&self) -> &QuarterConfig {
        &self.config
    }

    /// Reconstruct single-quarter deltas.
    ///
    /// The output holds exactly the Q1, Q2 and Q3 periods present in the
    /// input, sorted chronologically. The input is not modified.
    pub fn reconstruct(&self, table: &QuarterlyReportTable) -> Result<QuarterDeltaTable> {
        self.config.validate()?;

        let mut result = QuarterDeltaTable::new(table.instruments().to_vec());

        for column in table.select(|p| p.quarter == FiscalQuarter::Q1) {
            result.insert(column.clone())?;
        }
        for column in self.q2_deltas(table) {
            result.insert(column)?;
        }
        for column in q3_deltas(table) {
            result.insert(column)?;
        }

        result.sort_chronologically();

        debug!(
            instruments = result.height(),
            input_periods = table.width(),
            output_periods = result.width(),
            "reconstructed quarterly deltas"
        );

        Ok(result)
    }

    /// Q2 deltas from the interpolated Q0/Q1/Q2 chain.
    fn q2_deltas(&self, table: &QuarterlyReportTable) -> Vec<PeriodColumn> {
        let is_q1_q2 = |p: &FiscalPeriod| matches!(p.quarter, FiscalQuarter::Q1 | FiscalQuarter::Q2);

        // (period, source values); `None` marks a synthetic zero baseline
        let mut chain: Vec<(FiscalPeriod, Option<&[Option<f64>]>)> = table
            .select(|p| is_q1_q2(p) && self.config.supports(p.year))
            .into_iter()
            .map(|c| (c.period, Some(c.values.as_slice())))
            .collect();
        chain.extend(
            (self.config.first_year..=self.config.last_year)
                .map(|year| (FiscalPeriod::new(year, FiscalQuarter::Q0), None)),
        );
        chain.sort_by_key(|(period, _)| *period);

        let q2_positions: Vec<usize> = chain
            .iter()
            .enumerate()
            .filter(|(_, (period, _))| period.quarter == FiscalQuarter::Q2)
            .map(|(i, _)| i)
            .collect();

        let mut deltas: Vec<PeriodColumn> = q2_positions
            .iter()
            .map(|&i| PeriodColumn::new(chain[i].0, Vec::with_capacity(table.height())))
            .collect();

        let mut row_values = vec![None; chain.len()];
        for row in 0..table.height() {
            for (slot, (_, source)) in row_values.iter_mut().zip(&chain) {
                *slot = source.map_or(Some(0.0), |values| values[row]);
            }

            interpolate_linear(&mut row_values);
            let diffs = first_difference(&row_values);

            for (delta, &i) in deltas.iter_mut().zip(&q2_positions) {
                delta.values.push(zero_as_missing(diffs[i]));
            }
        }

        // Years without a baseline are differenced directly, without gap-filling
        for q2 in table.select(|p| p.quarter == FiscalQuarter::Q2 && !self.config.supports(p.year)) {
            let q1 = table.column(FiscalPeriod::new(q2.period.year, FiscalQuarter::Q1));
            deltas.push(paired_delta(q2, q1));
        }

        deltas
    }
}

/// Q3 deltas against the same year's reported Q2.
fn q3_deltas(table: &QuarterlyReportTable) -> Vec<PeriodColumn> {
    table
        .select(|p| p.quarter == FiscalQuarter::Q3)
        .into_iter()
        .map(|q3| {
            let q2 = table.column(FiscalPeriod::new(q3.period.year, FiscalQuarter::Q2));
            paired_delta(q3, q2)
        })
        .collect()
}

/// `current - previous` per row; missing when `previous` is absent.
fn paired_delta(current: &PeriodColumn, previous: Option<&PeriodColumn>) -> PeriodColumn {
    let values = match previous {
        Some(previous) => current
            .values
            .iter()
            .zip(&previous.values)
            .map(|(&c, &p)| zero_as_missing(subtract(c, p)))
            .collect(),
        None => vec![None; current.values.len()],
    };
    PeriodColumn::new(current.period, values)
}

/// Fill gaps linearly by position.
///
/// Interior gaps are interpolated between their known neighbours, trailing
/// gaps repeat the last known value and leading gaps stay missing.
pub(crate) fn interpolate_linear(values: &mut [Option<f64>]) {
    let mut last: Option<(usize, f64)> = None;

    for i in 0..values.len() {
        let Some(current) = values[i] else {
            continue;
        };

        if let Some((j, previous)) = last {
            let span = (i - j) as f64;
            for k in (j + 1)..i {
                let t = (k - j) as f64 / span;
                values[k] = Some(previous + (current - previous) * t);
            }
        }
        last = Some((i, current));
    }

    if let Some((j, previous)) = last {
        for value in &mut values[j + 1..] {
            *value = Some(previous);
        }
    }
}

/// Each value minus its predecessor; the first entry has none.
pub(crate) fn first_difference(values: &[Option<f64>]) -> Vec<Option<f64>> {
    std::iter::once(None)
        .chain(values.windows(2).map(|w| subtract(w[1], w[0])))
        .take(values.len())
        .collect()
}

fn subtract(current: Option<f64>, previous: Option<f64>) -> Option<f64> {
    Some(current? - previous?)
}

/// Zero deltas are indistinguishable from "nothing reported".
fn zero_as_missing(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v != 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PeriodTable;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn period(label: &str) -> FiscalPeriod {
        label.parse().unwrap()
    }

    fn table(columns: &[(&str, Vec<Option<f64>>)]) -> PeriodTable {
        let height = columns.first().map_or(0, |(_, v)| v.len());
        let instruments = (0..height).map(|i| format!("S{i}")).collect();
        columns
            .iter()
            .fold(PeriodTable::new(instruments), |t, (label, values)| {
                t.with_column(period(label), values.clone()).unwrap()
            })
    }

    #[rstest]
    #[case(vec![Some(0.0), None, Some(100.0)], vec![Some(0.0), Some(50.0), Some(100.0)])]
    #[case(vec![None, Some(2.0), None, Some(6.0)], vec![None, Some(2.0), Some(4.0), Some(6.0)])]
    #[case(vec![Some(1.0), None, None], vec![Some(1.0), Some(1.0), Some(1.0)])]
    #[case(vec![None, None], vec![None, None])]
    fn test_interpolate_linear(#[case] mut input: Vec<Option<f64>>, #[case] expected: Vec<Option<f64>>) {
        interpolate_linear(&mut input);
        assert_eq!(input, expected);
    }

    #[test]
    fn test_first_difference() {
        let diffs = first_difference(&[Some(1.0), Some(4.0), None, Some(5.0)]);
        assert_eq!(diffs, [None, Some(3.0), None, None]);
        assert!(first_difference(&[]).is_empty());
    }

    #[test]
    fn test_cumulative_conservation() {
        let input = table(&[
            ("2019Q3", vec![Some(45.0), Some(9.0)]),
            ("2019Q1", vec![Some(10.0), Some(2.0)]),
            ("2019Q2", vec![Some(25.0), Some(5.0)]),
        ]);

        let result = QuarterDeltaReconstructor::default()
            .reconstruct(&input)
            .unwrap();

        assert_eq!(
            result.periods(),
            [period("2019Q1"), period("2019Q2"), period("2019Q3")]
        );
        for (row, cumulative) in ["S0", "S1"].iter().zip([45.0, 9.0]) {
            let total: f64 = result
                .periods()
                .into_iter()
                .filter_map(|p| result.get(row, p))
                .sum();
            assert_relative_eq!(total, cumulative);
        }
        assert_eq!(result.get("S0", period("2019Q2")), Some(15.0));
        assert_eq!(result.get("S0", period("2019Q3")), Some(20.0));
    }

    #[test]
    fn test_missing_q1_is_midpoint() {
        let input = table(&[
            ("2019Q1", vec![None]),
            ("2019Q2", vec![Some(100.0)]),
        ]);

        let result = QuarterDeltaReconstructor::default()
            .reconstruct(&input)
            .unwrap();

        assert_relative_eq!(result.get("S0", period("2019Q2")).unwrap(), 50.0);
        // Q1 passes through as reported
        assert_eq!(result.get("S0", period("2019Q1")), None);
    }

    #[test]
    fn test_absent_q1_column_uses_baseline() {
        let input = table(&[("2020Q2", vec![Some(40.0)])]);

        let result = QuarterDeltaReconstructor::default()
            .reconstruct(&input)
            .unwrap();

        assert_eq!(result.periods(), [period("2020Q2")]);
        assert_eq!(result.get("S0", period("2020Q2")), Some(40.0));
    }

    #[test]
    fn test_zero_delta_becomes_missing() {
        let input = table(&[
            ("2019Q1", vec![Some(0.0)]),
            ("2019Q2", vec![Some(10.0)]),
            ("2019Q3", vec![Some(10.0)]),
        ]);

        let result = QuarterDeltaReconstructor::default()
            .reconstruct(&input)
            .unwrap();

        // Q1 keeps its reported zero; derived zero deltas do not survive
        assert_eq!(result.get("S0", period("2019Q1")), Some(0.0));
        assert_eq!(result.get("S0", period("2019Q2")), Some(10.0));
        assert_eq!(result.get("S0", period("2019Q3")), None);
    }

    #[test]
    fn test_unchanged_q2_is_missing() {
        let input = table(&[
            ("2019Q1", vec![Some(10.0), Some(10.0)]),
            ("2019Q2", vec![Some(10.0), Some(14.0)]),
        ]);

        let result = QuarterDeltaReconstructor::default()
            .reconstruct(&input)
            .unwrap();

        assert_eq!(result.get("S0", period("2019Q2")), None);
        assert_eq!(result.get("S1", period("2019Q2")), Some(4.0));
    }

    #[test]
    fn test_missing_q2_runs_toward_next_baseline() {
        // 2019Q2 sits halfway between 2019Q1 = 10 and 2020Q0 = 0
        let input = table(&[
            ("2019Q1", vec![Some(10.0)]),
            ("2019Q2", vec![None]),
        ]);

        let result = QuarterDeltaReconstructor::default()
            .reconstruct(&input)
            .unwrap();

        assert_relative_eq!(result.get("S0", period("2019Q2")).unwrap(), -5.0);
    }

    #[test]
    fn test_empty_row_is_all_missing() {
        let input = table(&[
            ("2019Q1", vec![None, Some(1.0)]),
            ("2019Q2", vec![None, Some(3.0)]),
            ("2019Q3", vec![None, Some(6.0)]),
        ]);

        let result = QuarterDeltaReconstructor::default()
            .reconstruct(&input)
            .unwrap();

        for p in result.periods() {
            assert_eq!(result.get("S0", p), None);
        }
        assert_eq!(result.get("S1", period("2019Q3")), Some(3.0));
    }

    #[test]
    fn test_q3_without_q2_is_missing() {
        let input = table(&[
            ("2018Q2", vec![Some(5.0)]),
            ("2019Q3", vec![Some(9.0)]),
        ]);

        let result = QuarterDeltaReconstructor::default()
            .reconstruct(&input)
            .unwrap();

        assert_eq!(result.get("S0", period("2019Q3")), None);
    }

    #[test]
    fn test_q4_is_dropped() {
        let input = table(&[
            ("2019Q1", vec![Some(1.0)]),
            ("2019Q4", vec![Some(9.0)]),
        ]);

        let result = QuarterDeltaReconstructor::default()
            .reconstruct(&input)
            .unwrap();

        assert_eq!(result.periods(), [period("2019Q1")]);
    }

    #[test]
    fn test_unsupported_year_skips_interpolation() {
        let config = QuarterConfig {
            first_year: 2015,
            last_year: 2020,
        };
        let input = table(&[
            ("2010Q1", vec![Some(4.0), None]),
            ("2010Q2", vec![Some(10.0), Some(10.0)]),
        ]);

        let result = QuarterDeltaReconstructor::with_config(config)
            .reconstruct(&input)
            .unwrap();

        assert_eq!(result.periods(), [period("2010Q1"), period("2010Q2")]);
        assert_eq!(result.get("S0", period("2010Q2")), Some(6.0));
        // No baseline, so no gap-filling for the missing Q1
        assert_eq!(result.get("S1", period("2010Q2")), None);
    }

    #[test]
    fn test_input_is_unchanged() {
        let input = table(&[
            ("2019Q1", vec![None]),
            ("2019Q2", vec![Some(100.0)]),
        ]);
        let before = input.clone();

        QuarterDeltaReconstructor::default()
            .reconstruct(&input)
            .unwrap();

        assert_eq!(input, before);
    }

    #[test]
    fn test_invalid_year_range() {
        let config = QuarterConfig {
            first_year: 2022,
            last_year: 2011,
        };
        let err = QuarterDeltaReconstructor::with_config(config)
            .reconstruct(&PeriodTable::default())
            .unwrap_err();

        assert!(matches!(
            err,
            crate::PrepError::Domain(DomainError::InvalidYearRange { .. })
        ));
    }
}
