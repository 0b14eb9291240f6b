//! Cross-sectional neutralization of factors.
//!
//! For every factor and every date, the factor is regressed on log market cap
//! and industry dummies and replaced by the regression residual. The result
//! carries no linear size or industry exposure within any date.
//!
//! Each factor uses its own listwise-deletion mask, so factors can be
//! processed in any order. A date whose design is singular is skipped and
//! reported in [`Neutralized::diagnostics`]; its rows keep their prior values.

use crate::{
    DomainError, IndustryExposureMatrix, IndustryMembership, PrepError, RegressionError, Result,
    industry::string_column,
    ols::{self, DEFAULT_RANK_TOLERANCE},
};
use ndarray::{Array1, Array2};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Configuration for factor neutralization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NeutralizeConfig {
    /// Column holding the cross-section key.
    pub date_column: String,
    /// Column holding instrument identifiers.
    pub symbol_column: String,
    /// Column holding market capitalization; replaced by its logarithm.
    pub market_cap_column: String,
    /// Column holding industry codes; dropped after use.
    pub industry_column: String,
    /// Ordered industry universe, one dummy column per entry.
    pub industries: Vec<String>,
    /// Prefix for the generated dummy columns.
    pub dummy_prefix: String,
    /// Relative tolerance for collinear design columns.
    pub rank_tolerance: f64,
}

impl Default for NeutralizeConfig {
    fn default() -> Self {
        Self {
            date_column: "date".to_string(),
            symbol_column: "symbol".to_string(),
            market_cap_column: "market_cap".to_string(),
            industry_column: "industry".to_string(),
            industries: Vec::new(),
            dummy_prefix: "industry_".to_string(),
            rank_tolerance: DEFAULT_RANK_TOLERANCE,
        }
    }
}

/// A (date, factor) cross-section that could not be fitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FitFailure {
    /// Factor column
    pub factor: String,
    /// Cross-section key
    pub date: String,
    /// Why the fit failed
    pub error: RegressionError,
}

/// Neutralized panel together with per-cell failures.
#[derive(Debug, Clone)]
pub struct Neutralized {
    /// Panel with residualized factors, log market cap and industry dummies
    pub panel: DataFrame,
    /// Cross-sections skipped because their regression failed
    pub diagnostics: Vec<FitFailure>,
}

/// Regresses factors on log market cap and industry dummies, date by date.
#[derive(Debug, Clone, Default)]
pub struct FactorNeutralizer {
    config: NeutralizeConfig,
}

#[derive(Debug, Clone, Copy)]
struct Observation {
    row: usize,
    log_cap: f64,
    industry: usize,
    value: f64,
}

impl FactorNeutralizer {
    /// Create a neutralizer with default date and symbol column names.
    pub fn new(industry_column: &str, industries: &[&str], market_cap_column: &str) -> Self {
        Self::with_config(NeutralizeConfig {
            industry_column: industry_column.to_string(),
            industries: industries.iter().map(|s| s.to_string()).collect(),
            market_cap_column: market_cap_column.to_string(),
            ..Default::default()
        })
    }

    /// Create a neutralizer from a configuration.
    pub const fn with_config(config: NeutralizeConfig) -> Self {
        Self { config }
    }

    /// Returns the current configuration.
    pub const fn config(&self) -> &NeutralizeConfig {
        &self.config
    }

    /// Columns treated as factors: everything except the key, market cap and
    /// industry columns.
    pub fn factor_columns(&self, panel: &DataFrame) -> Vec<String> {
        let reserved = [
            &self.config.date_column,
            &self.config.symbol_column,
            &self.config.market_cap_column,
            &self.config.industry_column,
        ];
        panel
            .get_column_names()
            .into_iter()
            .filter(|name| !reserved.iter().any(|r| r.as_str() == name.as_str()))
            .map(|name| name.to_string())
            .collect()
    }

    /// Neutralize every factor column of the panel.
    ///
    /// # Errors
    ///
    /// Fails on a missing required column, a panel without factor columns, a
    /// non-positive market cap or an industry outside the universe. Singular
    /// cross-sections do not fail the call; they are returned as diagnostics.
    pub fn neutralize(&self, panel: &DataFrame) -> Result<Neutralized> {
        let cfg = &self.config;
        for name in [
            &cfg.date_column,
            &cfg.symbol_column,
            &cfg.market_cap_column,
            &cfg.industry_column,
        ] {
            if panel.column(name).is_err() {
                return Err(PrepError::MissingColumn(name.clone()));
            }
        }

        let factors = self.factor_columns(panel);
        if factors.is_empty() {
            return Err(PrepError::NoFactorColumns);
        }

        let log_caps = log_market_cap(panel, &cfg.market_cap_column)?;
        let dates = string_column(panel, &cfg.date_column)?;
        let symbols = string_column(panel, &cfg.symbol_column)?;
        let codes = string_column(panel, &cfg.industry_column)?;

        let membership = IndustryMembership::from_pairs(
            symbols
                .iter()
                .zip(&codes)
                .filter_map(|(s, c)| Some((s.clone()?, c.clone()?))),
        );
        let exposure = IndustryExposureMatrix::build(&membership, &cfg.industries)?;
        let industries: Vec<Option<usize>> = symbols
            .iter()
            .map(|s| s.as_deref().and_then(|s| exposure.industry_of(s)))
            .collect();

        debug!(
            rows = panel.height(),
            factors = factors.len(),
            instruments = exposure.instruments().len(),
            "neutralizing panel"
        );

        let mut result = panel.drop(&cfg.industry_column)?;
        result.with_column(Column::new(
            cfg.market_cap_column.as_str().into(),
            log_caps.clone(),
        ))?;

        let mut diagnostics = Vec::new();
        for factor in &factors {
            let mut values = float_column(panel, factor)?;
            diagnostics.extend(self.neutralize_factor(
                factor,
                &mut values,
                &dates,
                &log_caps,
                &industries,
            ));
            result.with_column(Column::new(factor.as_str().into(), values))?;
        }

        for column in exposure.dummy_columns(&symbols, &cfg.dummy_prefix) {
            result.with_column(column)?;
        }

        Ok(Neutralized {
            panel: result,
            diagnostics,
        })
    }

    /// Replace `values` with per-date residuals where the fit succeeds.
    fn neutralize_factor(
        &self,
        factor: &str,
        values: &mut [Option<f64>],
        dates: &[Option<String>],
        log_caps: &[Option<f64>],
        industries: &[Option<usize>],
    ) -> Vec<FitFailure> {
        // Listwise deletion: every regression input must be present
        let mut groups: BTreeMap<&str, Vec<Observation>> = BTreeMap::new();
        for (row, value) in values.iter().enumerate() {
            let (Some(date), Some(log_cap), Some(industry), Some(value)) =
                (dates[row].as_deref(), log_caps[row], industries[row], *value)
            else {
                continue;
            };
            groups.entry(date).or_default().push(Observation {
                row,
                log_cap,
                industry,
                value,
            });
        }

        let mut failures = Vec::new();
        for (date, observations) in &groups {
            match fit_cross_section(observations, self.config.rank_tolerance) {
                Ok(residuals) => {
                    for (obs, residual) in observations.iter().zip(residuals) {
                        values[obs.row] = Some(residual);
                    }
                }
                Err(error) => {
                    warn!(factor, date, %error, "skipping cross-section");
                    failures.push(FitFailure {
                        factor: factor.to_string(),
                        date: (*date).to_string(),
                        error,
                    });
                }
            }
        }

        info!(
            factor,
            dates = groups.len(),
            failed = failures.len(),
            "neutralized factor"
        );
        failures
    }
}

/// Residuals of one date's regression on log cap and industry dummies.
///
/// Industries with no members in this cross-section would contribute
/// all-zero columns and are left out of the design.
fn fit_cross_section(
    observations: &[Observation],
    tolerance: f64,
) -> std::result::Result<Array1<f64>, RegressionError> {
    let mut present: Vec<usize> = observations.iter().map(|o| o.industry).collect();
    present.sort_unstable();
    present.dedup();

    let mut x = Array2::<f64>::zeros((observations.len(), present.len() + 1));
    let mut y = Array1::<f64>::zeros(observations.len());
    for (i, obs) in observations.iter().enumerate() {
        x[[i, 0]] = obs.log_cap;
        if let Ok(j) = present.binary_search(&obs.industry) {
            x[[i, j + 1]] = 1.0;
        }
        y[i] = obs.value;
    }

    ols::fit(&x, &y, tolerance).map(|fit| fit.residuals)
}

/// Natural log of a market cap column; missing stays missing.
pub(crate) fn log_market_cap(panel: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    float_column(panel, name)?
        .into_iter()
        .enumerate()
        .map(|(row, cap)| match cap {
            Some(value) if value <= 0.0 => {
                Err(DomainError::NonPositiveMarketCap { row, value }.into())
            }
            other => Ok(other.map(f64::ln)),
        })
        .collect()
}

/// Read a column as optional floats, treating NaN as missing.
pub(crate) fn float_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = df
        .column(name)
        .map_err(|_| PrepError::MissingColumn(name.to_string()))?
        .cast(&DataType::Float64)?;

    Ok(column
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| !x.is_nan()))
        .collect())
}
