//! Fuzzy-logic fishing-zone suitability.
//!
//! A [`RuleBase`] holds the expert rules for one species and season:
//! trapezoidal terms over environmental covariates, combined with
//! `and` / `or` and mapped onto a 0-100 suitability universe. An
//! [`InferenceEngine`] scores one pixel by Mamdani inference with centroid
//! defuzzification, and a [`GridProcessor`] applies it to every pixel of a
//! [`RasterBundle`].
//!
//! ```no_run
//! use pfz_core::{catalog, GridProcessor, InferenceEngine, RasterBundle};
//! use pfz_core::catalog::{Season, Species};
//!
//! # fn main() -> pfz_core::Result<()> {
//! let engine = InferenceEngine::new(catalog::rule_base(Species::Anchovy, Season::Summer)?);
//! let bundle = RasterBundle::new(); // sst, sla and depth layers go here
//! let run = GridProcessor::new(&engine, &bundle)?.run();
//! println!("{} pixels scored", run.stats.scored);
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod covariate;
pub mod engine;
pub mod error;
pub mod expression;
pub mod grid;
pub mod membership;
pub mod raster;
pub mod rulebase;
pub mod surface;
pub mod variable;

pub use covariate::Covariate;
pub use engine::{Explanation, Inference, InferenceEngine, InferenceOptions, PixelVector};
pub use error::{ConfigError, Error, Result};
pub use expression::RuleExpression;
pub use grid::{CancelToken, GridOptions, GridProcessor, GridRun, RunStats, SuitabilityMap, MISSING_VALUE};
pub use membership::Trapezoid;
pub use raster::{GeoBounds, Raster, RasterBundle};
pub use rulebase::{Antecedent, Rule, RuleBase, RuleBaseDocument};
pub use variable::{Term, Universe, Variable};
