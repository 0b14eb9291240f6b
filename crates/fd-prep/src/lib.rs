#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/fd-prep/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod industry;
pub mod neutralize;
pub mod ols;
pub mod period;
pub mod quarters;
pub mod standardize;
pub mod table;

// Re-export core types
pub use config::PrepConfig;
pub use error::{DomainError, PrepError, RegressionError, Result};
pub use industry::{IndustryExposureMatrix, IndustryMembership};
pub use neutralize::{FactorNeutralizer, FitFailure, NeutralizeConfig, Neutralized};
pub use ols::OlsFit;
pub use period::{FiscalPeriod, FiscalQuarter};
pub use quarters::{QuarterConfig, QuarterDeltaReconstructor};
pub use standardize::{CrossSectionalStandardizer, ReferenceStats, StandardizeConfig, reference_stats};
pub use table::{PeriodColumn, PeriodTable, QuarterDeltaTable, QuarterlyReportTable};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
