//! Error types for delta reconstruction and neutralization.

use thiserror::Error;

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PrepError>;

/// Errors that abort a pipeline call.
#[derive(Debug, Error)]
pub enum PrepError {
    /// Missing required column in input data
    #[error("Missing required column: {0}")]
    MissingColumn(String),

    /// Panel has no columns left to neutralize
    #[error("No factor columns to process")]
    NoFactorColumns,

    /// Column label is not a `<year><quarter>` period
    #[error("Invalid period label: {0}")]
    InvalidPeriod(String),

    /// Column length does not match the table's row count
    #[error("Length mismatch for {column}: expected {expected} rows, got {actual}")]
    LengthMismatch {
        /// Column being inserted
        column: String,
        /// Rows in the table
        expected: usize,
        /// Rows in the column
        actual: usize,
    },

    /// Identifier column holds a null
    #[error("Missing identifier in {column} at row {row}")]
    MissingIdentifier {
        /// Identifier column
        column: String,
        /// Row holding the null
        row: usize,
    },

    /// Input precludes a well-defined transform
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Regression failure surfaced from a direct solver call
    #[error(transparent)]
    Regression(#[from] RegressionError),

    /// Polars DataFrame error
    #[error("DataFrame error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// Configuration file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),
}

/// Invalid inputs that corrupt every downstream cell.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DomainError {
    /// Logarithm undefined for non-positive market cap
    #[error("Non-positive market cap {value} at row {row}")]
    NonPositiveMarketCap {
        /// Row position in the panel
        row: usize,
        /// Offending value
        value: f64,
    },

    /// Membership references an industry outside the universe
    #[error("Instrument {instrument} maps to unknown industry {industry}")]
    UnknownIndustry {
        /// Instrument identifier
        instrument: String,
        /// Industry label not in the universe
        industry: String,
    },

    /// Industry universe lists a label twice
    #[error("Duplicate industry in universe: {0}")]
    DuplicateIndustry(String),

    /// Fiscal year range is inverted
    #[error("Invalid fiscal year range: {first} is after {last}")]
    InvalidYearRange {
        /// First supported year
        first: i32,
        /// Last supported year
        last: i32,
    },
}

/// Failure of a single cross-sectional least squares fit.
///
/// These are scoped to one (date, factor) cell and never abort neutralization.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegressionError {
    /// Fewer observations than regressors
    #[error("Under-determined regression: {observations} observations for {regressors} regressors")]
    Underdetermined {
        /// Rows in the design matrix
        observations: usize,
        /// Columns in the design matrix
        regressors: usize,
    },

    /// A design column lies in the span of the preceding ones
    #[error("Rank deficient design matrix: column {column} of {columns} is collinear")]
    RankDeficient {
        /// Index of the first collinear column
        column: usize,
        /// Number of columns
        columns: usize,
    },

    /// Design and response disagree on the number of observations
    #[error("Dimension mismatch: design has {rows} rows, response has {len}")]
    DimensionMismatch {
        /// Rows in the design matrix
        rows: usize,
        /// Length of the response vector
        len: usize,
    },
}

impl RegressionError {
    /// Returns whether the failure stems from the data rather than caller misuse.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Underdetermined { .. } | Self::RankDeficient { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regression_error_is_recoverable() {
        let err = RegressionError::Underdetermined {
            observations: 1,
            regressors: 2,
        };
        assert!(err.is_recoverable());

        let err = RegressionError::DimensionMismatch { rows: 3, len: 2 };
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_error_display() {
        let err = PrepError::from(DomainError::NonPositiveMarketCap {
            row: 4,
            value: -1.0,
        });
        assert_eq!(err.to_string(), "Non-positive market cap -1 at row 4");

        let err = PrepError::MissingColumn("industry".to_string());
        assert_eq!(err.to_string(), "Missing required column: industry");
    }
}
