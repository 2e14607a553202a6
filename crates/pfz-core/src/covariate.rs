use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Environmental covariates a rule base can reason about.
/// The discriminant doubles as the lookup-table index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Covariate {
    /// Sea-surface temperature, kelvin.
    Sst,
    /// Sea-level anomaly, metres.
    Sla,
    /// Chlorophyll-a concentration, mg/m³.
    Chl,
    /// Bathymetric depth, metres (negative below sea level).
    Depth,
}

impl Covariate {
    pub const COUNT: usize = 4;
    pub const ALL: [Covariate; Covariate::COUNT] =
        [Covariate::Sst, Covariate::Sla, Covariate::Chl, Covariate::Depth];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Covariate::Sst   => "sst",
            Covariate::Sla   => "sla",
            Covariate::Chl   => "chl",
            Covariate::Depth => "depth",
        }
    }

    pub fn units(self) -> &'static str {
        match self {
            Covariate::Sst   => "K",
            Covariate::Sla   => "m",
            Covariate::Chl   => "mg m-3",
            Covariate::Depth => "m",
        }
    }
}

impl fmt::Display for Covariate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Covariate {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Covariate::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigError::UnknownCovariate(s.to_string()))
    }
}
