//! Error taxonomy for rule-base loading and grid runs.
//!
//! Configuration errors are fatal and only raised while a rule base is being
//! built. Grid errors are raised once per run, before any pixel is touched.
//! Missing observations are never errors: they degrade to the fill value.

use std::path::PathBuf;

use crate::covariate::Covariate;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// A rule base that cannot be used for inference.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read rule base {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed rule-base document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown covariate '{0}' (expected one of sst, sla, chl, depth)")]
    UnknownCovariate(String),

    #[error("unknown species '{0}'")]
    UnknownSpecies(String),

    #[error("unknown season '{0}'")]
    UnknownSeason(String),

    #[error("no built-in rule base for {species} in {season}")]
    NotInCatalog { species: String, season: String },

    #[error("variable '{0}' is declared more than once")]
    DuplicateVariable(String),

    #[error("term '{term}' is declared more than once on '{variable}'")]
    DuplicateTerm { variable: String, term: String },

    #[error("variable '{0}' has no terms")]
    NoTerms(String),

    #[error("term '{term}' on '{variable}' has invalid break-points {points:?} (need finite a <= b <= c <= d)")]
    InvalidTrapezoid {
        variable: String,
        term: String,
        points: [f64; 4],
    },

    #[error("variable '{variable}' has an empty universe [{min}, {max}]")]
    InvalidUniverse { variable: String, min: f64, max: f64 },

    #[error("variable '{variable}' has resolution {resolution} (need at least 2)")]
    InvalidResolution { variable: String, resolution: usize },

    #[error("rule base declares no antecedents")]
    NoAntecedents,

    #[error("rule base declares no rules")]
    NoRules,

    #[error("'{0}' is not an antecedent of this rule base")]
    UnknownVariable(String),

    #[error("'{term}' is not a term of '{variable}'")]
    UnknownTerm { variable: String, term: String },

    #[error("weight {0} is outside (0, 1]")]
    InvalidWeight(f64),

    #[error("'{0}' clause has no operands")]
    EmptyClause(&'static str),

    #[error("expression parse error at offset {offset}: {message}")]
    Parse { offset: usize, message: String },

    #[error("rule {index}: {source}")]
    Rule {
        index: usize,
        #[source]
        source: Box<ConfigError>,
    },
}

impl ConfigError {
    /// Attach the index of the offending rule.
    pub(crate) fn in_rule(self, index: usize) -> Self {
        ConfigError::Rule { index, source: Box::new(self) }
    }
}

/// Top-level error for engine and grid operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("raster '{covariate}' is {found_rows}x{found_cols}, expected {rows}x{cols}")]
    ShapeMismatch {
        covariate: Covariate,
        rows: usize,
        cols: usize,
        found_rows: usize,
        found_cols: usize,
    },

    #[error("no raster supplied for required covariate '{0}'")]
    MissingRaster(Covariate),

    #[error("no value supplied for required covariate '{0}'")]
    MissingInput(Covariate),

    #[error("raster data has {len} values, expected {rows}x{cols}")]
    InvalidRaster { rows: usize, cols: usize, len: usize },

    #[error("invalid surface axis: {0}")]
    InvalidAxis(String),
}
