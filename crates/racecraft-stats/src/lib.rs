//! Statistical building blocks for the Racecraft driver-skill pipeline.
//!
//! This crate provides the small numeric toolkit the factor pipeline is built on:
//!
//! - **Descriptive statistics**: mean, median, sample variance, coefficient of variation
//! - **Percentiles**: mid-rank percentile positions within a reference sample
//! - **Correlation**: column standardization and Pearson correlation matrices
//! - **Regression**: SVD-backed ordinary least squares and simple slopes
//! - **Metrics**: R², MAE and RMSE for predicted vs. actual outcomes
//!
//! # Modules
//!
//! - [`descriptive`]: Descriptive statistics for summarizing datasets
//! - [`percentiles`]: Rank-based percentile computation
//! - [`correlation`]: Standardization and correlation matrices
//! - [`regression`]: Least-squares fitting
//! - [`metrics`]: Goodness-of-fit measures
//!
//! # Examples
//!
//! ## Computing descriptive statistics
//!
//! ```
//! use racecraft_stats::descriptive::DescriptiveStats;
//!
//! let values = [1.0, 2.0, 3.0, 4.0, 5.0];
//! let stats = DescriptiveStats::new(values).unwrap();
//! assert_eq!(stats.mean, 3.0);
//! ```
//!
//! ## Locating a value within a sample
//!
//! ```
//! use racecraft_stats::percentiles::rank_percentile;
//!
//! let sample = [1.0, 2.0, 3.0, 4.0, 5.0];
//! assert_eq!(rank_percentile(&sample, 3.0), 50.0);
//! ```
//!
//! ## Fitting a regression
//!
//! ```
//! use nalgebra::{DMatrix, DVector};
//! use racecraft_stats::regression::LinearFit;
//!
//! let x = DMatrix::from_column_slice(3, 1, &[1.0, 2.0, 3.0]);
//! let y = DVector::from_column_slice(&[2.0, 4.0, 6.0]);
//! let fit = LinearFit::fit(&x, &y).unwrap();
//! assert!((fit.coefficients[0] - 2.0).abs() < 1e-9);
//! ```

pub mod correlation;
pub mod descriptive;
pub mod metrics;
pub mod percentiles;
pub mod regression;
