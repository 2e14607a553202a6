//! Built-in rule bases, one per (species, season), embedded at compile time
//! from `rules/*.json`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::rulebase::RuleBase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Species {
    Anchovy,
    Sardine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Season {
    Summer,
    EarlyAutumn,
    LateAutumn,
    Winter,
    June,
    September,
    December,
}

impl Species {
    pub const ALL: [Species; 2] = [Species::Anchovy, Species::Sardine];

    pub fn name(self) -> &'static str {
        match self {
            Species::Anchovy => "anchovy",
            Species::Sardine => "sardine",
        }
    }

    /// Seasons with a built-in rule base.
    pub fn seasons(self) -> &'static [Season] {
        match self {
            Species::Anchovy => &[Season::Summer, Season::EarlyAutumn, Season::LateAutumn, Season::Winter],
            Species::Sardine => &[Season::June, Season::September, Season::December],
        }
    }
}

impl Season {
    pub const ALL: [Season; 7] = [
        Season::Summer,
        Season::EarlyAutumn,
        Season::LateAutumn,
        Season::Winter,
        Season::June,
        Season::September,
        Season::December,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Season::Summer      => "summer",
            Season::EarlyAutumn => "early_autumn",
            Season::LateAutumn  => "late_autumn",
            Season::Winter      => "winter",
            Season::June        => "june",
            Season::September   => "september",
            Season::December    => "december",
        }
    }

    /// Human-readable form, e.g. `Early Autumn`.
    pub fn label(self) -> &'static str {
        match self {
            Season::Summer      => "Summer",
            Season::EarlyAutumn => "Early Autumn",
            Season::LateAutumn  => "Late Autumn",
            Season::Winter      => "Winter",
            Season::June        => "June",
            Season::September   => "September",
            Season::December    => "December",
        }
    }
}

impl fmt::Display for Species {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lowercase, with spaces and hyphens folded to underscores.
fn normalize(s: &str) -> String {
    s.trim()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c.to_ascii_lowercase() })
        .collect()
}

impl FromStr for Species {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = normalize(s);
        Species::ALL
            .into_iter()
            .find(|sp| sp.name() == key)
            .ok_or_else(|| ConfigError::UnknownSpecies(s.to_string()))
    }
}

impl FromStr for Season {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = normalize(s);
        Season::ALL
            .into_iter()
            .find(|se| se.name() == key)
            .ok_or_else(|| ConfigError::UnknownSeason(s.to_string()))
    }
}

/// Raw JSON of a built-in rule base.
pub fn document(species: Species, season: Season) -> Option<&'static str> {
    Some(match (species, season) {
        (Species::Anchovy, Season::Summer)      => include_str!("../rules/anchovy_summer.json"),
        (Species::Anchovy, Season::EarlyAutumn) => include_str!("../rules/anchovy_early_autumn.json"),
        (Species::Anchovy, Season::LateAutumn)  => include_str!("../rules/anchovy_late_autumn.json"),
        (Species::Anchovy, Season::Winter)      => include_str!("../rules/anchovy_winter.json"),
        (Species::Sardine, Season::June)        => include_str!("../rules/sardine_june.json"),
        (Species::Sardine, Season::September)   => include_str!("../rules/sardine_september.json"),
        (Species::Sardine, Season::December)    => include_str!("../rules/sardine_december.json"),
        _ => return None,
    })
}

/// Load and validate one built-in rule base.
pub fn rule_base(species: Species, season: Season) -> Result<RuleBase, ConfigError> {
    let json = document(species, season).ok_or_else(|| ConfigError::NotInCatalog {
        species: species.to_string(),
        season: season.to_string(),
    })?;
    RuleBase::from_json_str(json)
}

/// Every built-in rule base, in species then season order.
pub fn all() -> Result<Vec<(Species, Season, RuleBase)>, ConfigError> {
    let mut out = Vec::new();
    for species in Species::ALL {
        for &season in species.seasons() {
            out.push((species, season, rule_base(species, season)?));
        }
    }
    Ok(out)
}
