//! Indoor air-quality time series: loading, cleaning and the derived views a
//! dashboard renders (date filtering, resampling, hour-of-day profiles,
//! summary statistics, CSV export).
//!
//! ```no_run
//! use airq_dash::cache::DatasetCache;
//! use airq_dash::query::{evaluate, DashboardQuery};
//!
//! let mut cache = DatasetCache::default();
//! let mut query = DashboardQuery::new("data/mediciones.csv");
//! query.resample = "1h".parse()?;
//! let view = evaluate(&mut cache, &query)?;
//! for s in &view.summary {
//!     println!("{}: mean {:?}", s.field.label(), s.mean);
//! }
//! # Ok::<(), airq_dash::error::DataError>(())
//! ```

pub mod cache;
pub mod data;
pub mod error;
pub mod query;
