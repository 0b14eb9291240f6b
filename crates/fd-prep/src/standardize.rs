//! Standardization of factor values against reference statistics.
//!
//! Unlike an in-sample z-score, the mean and standard deviation come from
//! externally supplied per-period tables, so a panel can be scaled with the
//! moments of a different (e.g. broader) universe.

use crate::{PrepError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

const MEAN_SUFFIX: &str = "__mean";
const STD_SUFFIX: &str = "__std";

/// Configuration for reference-based standardization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StandardizeConfig {
    /// Column holding the period key shared by panel and reference tables.
    pub period_column: String,
    /// Factor columns to standardize.
    pub factors: Vec<String>,
}

impl Default for StandardizeConfig {
    fn default() -> Self {
        Self {
            period_column: "period".to_string(),
            factors: Vec::new(),
        }
    }
}

/// Per-period means and standard deviations of factor columns.
#[derive(Debug, Clone)]
pub struct ReferenceStats {
    /// One row per period, one mean column per factor
    pub mean: DataFrame,
    /// One row per period, one standard deviation column per factor
    pub std: DataFrame,
}

/// Compute reference statistics from a panel.
///
/// Standard deviations are sample deviations (ddof = 1); single-observation
/// periods get a missing deviation.
pub fn reference_stats(
    panel: &DataFrame,
    period_column: &str,
    factors: &[String],
) -> Result<ReferenceStats> {
    require_columns(panel, period_column, factors)?;

    let grouped = || panel.clone().lazy().group_by([col(period_column)]);
    let mean = grouped()
        .agg(
            factors
                .iter()
                .map(|f| col(f.as_str()).mean())
                .collect::<Vec<_>>(),
        )
        .collect()?;
    let std = grouped()
        .agg(
            factors
                .iter()
                .map(|f| col(f.as_str()).std(1))
                .collect::<Vec<_>>(),
        )
        .collect()?;

    Ok(ReferenceStats { mean, std })
}

/// Rescales factor columns to zero mean and unit variance per period.
#[derive(Debug, Clone, Default)]
pub struct CrossSectionalStandardizer {
    config: StandardizeConfig,
}

impl CrossSectionalStandardizer {
    /// Create a standardizer for the given period column and factors.
    pub fn new(period_column: impl Into<String>, factors: &[&str]) -> Self {
        Self::with_config(StandardizeConfig {
            period_column: period_column.into(),
            factors: factors.iter().map(|f| f.to_string()).collect(),
        })
    }

    /// Create a standardizer from a configuration.
    pub const fn with_config(config: StandardizeConfig) -> Self {
        Self { config }
    }

    /// Returns the current configuration.
    pub const fn config(&self) -> &StandardizeConfig {
        &self.config
    }

    /// Standardize each factor as `(x - mean) / std` for its period.
    ///
    /// Reference tables are joined with a full outer merge on the period
    /// column, so periods missing from either side yield missing values. A
    /// zero or missing standard deviation yields a missing value. NaN in the
    /// panel or the reference tables counts as missing.
    pub fn standardize(
        &self,
        panel: &DataFrame,
        mean_by_period: &DataFrame,
        std_by_period: &DataFrame,
    ) -> Result<DataFrame> {
        let period = self.config.period_column.as_str();
        let factors = &self.config.factors;
        if factors.is_empty() {
            return Err(PrepError::NoFactorColumns);
        }

        require_columns(panel, period, factors)?;
        require_columns(mean_by_period, period, factors)?;
        require_columns(std_by_period, period, factors)?;

        let suffixed = |table: &DataFrame, suffix: &str| {
            let exprs: Vec<Expr> = std::iter::once(col(period))
                .chain(
                    factors
                        .iter()
                        .map(|f| col(f.as_str()).alias(format!("{f}{suffix}"))),
                )
                .collect();
            table.clone().lazy().select(exprs)
        };
        let full = JoinArgs::new(JoinType::Full).with_coalesce(JoinCoalesce::CoalesceColumns);

        let scaled: Vec<Expr> = factors
            .iter()
            .map(|f| {
                let mean = format!("{f}{MEAN_SUFFIX}");
                let std = format!("{f}{STD_SUFFIX}");
                when(col(std.as_str()).neq(lit(0.0)))
                    .then((col(f.as_str()) - col(mean.as_str())) / col(std.as_str()))
                    .otherwise(lit(NULL))
                    .fill_nan(lit(NULL))
                    .alias(f.as_str())
            })
            .collect();

        let helpers: Vec<String> = factors
            .iter()
            .flat_map(|f| [format!("{f}{MEAN_SUFFIX}"), format!("{f}{STD_SUFFIX}")])
            .collect();

        let result = panel
            .clone()
            .lazy()
            .join(
                suffixed(mean_by_period, MEAN_SUFFIX),
                [col(period)],
                [col(period)],
                full.clone(),
            )
            .join(
                suffixed(std_by_period, STD_SUFFIX),
                [col(period)],
                [col(period)],
                full,
            )
            .with_columns(scaled)
            .drop(helpers.iter().map(String::as_str).collect::<Vec<_>>())
            .collect()?;

        Ok(result)
    }
}

fn require_columns(df: &DataFrame, period: &str, factors: &[String]) -> Result<()> {
    let names = df.get_column_names();
    std::iter::once(period)
        .chain(factors.iter().map(String::as_str))
        .find(|name| !names.iter().any(|c| c.as_str() == *name))
        .map_or(Ok(()), |name| Err(PrepError::MissingColumn(name.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn values(df: &DataFrame, name: &str) -> Vec<Option<f64>> {
        df.column(name).unwrap().f64().unwrap().into_iter().collect()
    }

    fn sample_panel() -> DataFrame {
        df![
            "symbol" => ["A", "B", "C", "D"],
            "period" => ["2020Q1", "2020Q1", "2020Q1", "2020Q1"],
            "roe" => [0.05, 0.10, 0.15, 0.30],
            "sales_growth" => [-0.2, 0.1, 0.4, 0.3],
        ]
        .unwrap()
    }

    #[test]
    fn test_matching_moments_give_unit_scale() {
        let panel = sample_panel();
        let factors = ["roe", "sales_growth"];
        let standardizer = CrossSectionalStandardizer::new("period", &factors);
        let stats = reference_stats(&panel, "period", &standardizer.config().factors).unwrap();

        let result = standardizer
            .standardize(&panel, &stats.mean, &stats.std)
            .unwrap();

        assert_eq!(result.height(), 4);
        for factor in factors {
            let z: Vec<f64> = values(&result, factor).into_iter().flatten().collect();
            assert_eq!(z.len(), 4);
            let n = z.len() as f64;
            let mean = z.iter().sum::<f64>() / n;
            let var = z.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
            assert_relative_eq!(mean, 0.0, epsilon = 1e-10);
            assert_relative_eq!(var.sqrt(), 1.0, epsilon = 1e-10);
        }
        assert!(result.column("roe__mean").is_err());
        assert!(result.column("symbol").is_ok());
    }

    #[test]
    fn test_zero_std_is_missing() {
        let panel = df![
            "period" => ["2020Q1", "2020Q1"],
            "roe" => [1.0, 2.0],
        ]
        .unwrap();
        let mean = df!["period" => ["2020Q1"], "roe" => [1.5]].unwrap();
        let std = df!["period" => ["2020Q1"], "roe" => [0.0]].unwrap();

        let result = CrossSectionalStandardizer::new("period", &["roe"])
            .standardize(&panel, &mean, &std)
            .unwrap();

        assert_eq!(values(&result, "roe"), [None, None]);
    }

    #[test]
    fn test_nan_reference_is_missing() {
        let panel = df![
            "period" => ["2020Q1", "2020Q1", "2020Q2", "2020Q2"],
            "roe" => [1.0, 2.0, 3.0, f64::NAN],
        ]
        .unwrap();
        let mean = df!["period" => ["2020Q1", "2020Q2"], "roe" => [1.5, f64::NAN]].unwrap();
        let std = df!["period" => ["2020Q1", "2020Q2"], "roe" => [f64::NAN, 1.0]].unwrap();

        let result = CrossSectionalStandardizer::new("period", &["roe"])
            .standardize(&panel, &mean, &std)
            .unwrap();

        assert_eq!(values(&result, "roe"), [None, None, None, None]);
    }

    #[test]
    fn test_outer_merge_propagates_missing() {
        let panel = df![
            "period" => ["2020Q1", "2020Q2"],
            "roe" => [3.0, 5.0],
        ]
        .unwrap();
        let mean = df!["period" => ["2020Q1", "2020Q3"], "roe" => [1.0, 0.0]].unwrap();
        let std = df!["period" => ["2020Q1", "2020Q3"], "roe" => [2.0, 1.0]].unwrap();

        let result = CrossSectionalStandardizer::new("period", &["roe"])
            .standardize(&panel, &mean, &std)
            .unwrap()
            .lazy()
            .sort(["period"], SortMultipleOptions::default())
            .collect()
            .unwrap();

        assert_eq!(result.height(), 3);
        assert_eq!(values(&result, "roe"), [Some(1.0), None, None]);
    }

    #[test]
    fn test_missing_reference_column() {
        let panel = sample_panel();
        let mean = df!["period" => ["2020Q1"], "roe" => [0.1]].unwrap();

        let err = CrossSectionalStandardizer::new("period", &["roe", "sales_growth"])
            .standardize(&panel, &mean, &mean)
            .unwrap_err();

        assert!(matches!(err, PrepError::MissingColumn(c) if c == "sales_growth"));
    }

    #[test]
    fn test_no_factors() {
        let panel = sample_panel();
        let err = CrossSectionalStandardizer::default()
            .standardize(&panel, &panel, &panel)
            .unwrap_err();
        assert!(matches!(err, PrepError::NoFactorColumns));
    }
}
