//! Rule bases: one validated set of fuzzy rules for a (species, season).
//!
//! Rule bases are loaded from JSON documents (see [`RuleBaseDocument`]) or
//! assembled in code, validated once, and are immutable afterwards. Loading
//! is the only place configuration errors surface; names are resolved to
//! integer slots here so inference never looks anything up by string.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, info};

use crate::covariate::Covariate;
use crate::error::ConfigError;
use crate::expression::{CompiledExpr, RuleExpression};
use crate::membership::Trapezoid;
use crate::variable::{Term, Universe, Variable};

// ── Serialized form ──────────────────────────────────────────────────────────

/// On-disk form of a rule base.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleBaseDocument {
    pub species: String,
    pub season: String,
    pub antecedents: Vec<VariableDocument>,
    pub consequent: VariableDocument,
    pub rules: Vec<RuleDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariableDocument {
    pub name: String,
    /// `[min, max]`.
    pub universe: [f64; 2],
    pub resolution: usize,
    /// Ordered `name -> [a, b, c, d]`; declaration order is term order.
    #[serde(serialize_with = "ordered_terms::serialize", deserialize_with = "ordered_terms::deserialize")]
    pub terms: Vec<(String, [f64; 4])>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleDocument {
    #[serde(rename = "if")]
    pub condition: ExpressionDocument,
    #[serde(rename = "then")]
    pub consequent: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

/// A rule condition: either the textual form or an explicit JSON tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExpressionDocument {
    Text(String),
    Leaf { var: String, term: String },
    And { and: Vec<ExpressionDocument> },
    Or { or: Vec<ExpressionDocument> },
}

impl ExpressionDocument {
    pub fn to_expression(&self) -> Result<RuleExpression, ConfigError> {
        match self {
            ExpressionDocument::Text(text) => RuleExpression::parse(text),
            ExpressionDocument::Leaf { var, term } => Ok(RuleExpression::is(var.as_str(), term.as_str())),
            ExpressionDocument::And { and } => {
                let operands = and.iter().map(|e| e.to_expression()).collect::<Result<Vec<_>, _>>()?;
                RuleExpression::all(operands).ok_or(ConfigError::EmptyClause("and"))
            }
            ExpressionDocument::Or { or } => {
                let operands = or.iter().map(|e| e.to_expression()).collect::<Result<Vec<_>, _>>()?;
                RuleExpression::any(operands).ok_or(ConfigError::EmptyClause("or"))
            }
        }
    }
}

/// Order-preserving (de)serialization of a JSON object into `(name, points)` pairs.
/// Repeated keys are kept so that validation can report them.
mod ordered_terms {
    use super::*;

    pub fn serialize<S: Serializer>(terms: &[(String, [f64; 4])], s: S) -> Result<S::Ok, S::Error> {
        let mut map = s.serialize_map(Some(terms.len()))?;
        for (name, points) in terms {
            map.serialize_entry(name, points)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<(String, [f64; 4])>, D::Error> {
        struct TermsVisitor;

        impl<'de> Visitor<'de> for TermsVisitor {
            type Value = Vec<(String, [f64; 4])>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of term name to four break-points")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut out = Vec::with_capacity(access.size_hint().unwrap_or(4));
                while let Some((name, points)) = access.next_entry::<String, [f64; 4]>()? {
                    out.push((name, points));
                }
                Ok(out)
            }
        }

        d.deserialize_map(TermsVisitor)
    }
}

impl VariableDocument {
    fn to_variable(&self) -> Result<Variable, ConfigError> {
        let terms = self
            .terms
            .iter()
            .map(|(name, points)| {
                Trapezoid::new(*points)
                    .map(|mf| Term::new(name.as_str(), mf))
                    .ok_or_else(|| ConfigError::InvalidTrapezoid {
                        variable: self.name.clone(),
                        term: name.clone(),
                        points: *points,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let universe = Universe::new(self.universe[0], self.universe[1], self.resolution);
        Variable::new(self.name.as_str(), universe, terms)
    }

    fn from_variable(v: &Variable) -> Self {
        let u = v.universe();
        Self {
            name: v.name().to_string(),
            universe: [u.min, u.max],
            resolution: u.resolution,
            terms: v.terms().iter().map(|t| (t.name.clone(), t.membership.points())).collect(),
        }
    }
}

// ── Validated form ───────────────────────────────────────────────────────────

/// An input variable bound to the covariate raster it reads from.
#[derive(Debug, Clone, PartialEq)]
pub struct Antecedent {
    pub covariate: Covariate,
    pub variable: Variable,
}

impl Antecedent {
    /// The variable's name must parse as a [`Covariate`].
    pub fn new(variable: Variable) -> Result<Self, ConfigError> {
        let covariate = variable.name().parse()?;
        Ok(Self { covariate, variable })
    }
}

/// One rule as authored: condition, target consequent term, weight.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub expression: RuleExpression,
    pub consequent_term: String,
    pub weight: f64,
}

impl Rule {
    pub fn new(expression: RuleExpression, consequent_term: impl Into<String>) -> Self {
        Self { expression, consequent_term: consequent_term.into(), weight: 1.0 }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "if {} then {}", self.expression, self.consequent_term)?;
        if self.weight != 1.0 {
            write!(f, " (weight {})", self.weight)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CompiledRule {
    pub(crate) condition: CompiledExpr,
    pub(crate) consequent: usize,
    pub(crate) weight: f64,
}

/// Validated, immutable rule base.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleBase {
    species: String,
    season: String,
    antecedents: Vec<Antecedent>,
    consequent: Variable,
    rules: Vec<Rule>,
    used_parameters: BTreeSet<Covariate>,
    /// Start of each antecedent's run of slots in the flat membership buffer.
    slot_offsets: Vec<usize>,
    compiled: Vec<CompiledRule>,
}

impl RuleBase {
    pub fn new(
        species: impl Into<String>,
        season: impl Into<String>,
        antecedents: Vec<Antecedent>,
        consequent: Variable,
        rules: Vec<Rule>,
    ) -> Result<Self, ConfigError> {
        if antecedents.is_empty() {
            return Err(ConfigError::NoAntecedents);
        }
        if rules.is_empty() {
            return Err(ConfigError::NoRules);
        }
        for (i, a) in antecedents.iter().enumerate() {
            if antecedents[..i].iter().any(|b| b.covariate == a.covariate) {
                return Err(ConfigError::DuplicateVariable(a.covariate.to_string()));
            }
        }

        let mut slot_offsets = Vec::with_capacity(antecedents.len());
        let mut next = 0;
        for a in &antecedents {
            slot_offsets.push(next);
            next += a.variable.terms().len();
        }

        // Leaves name antecedents by covariate, so `Depth` and `depth` agree.
        let position = |variable: &str| {
            let covariate = variable.parse::<Covariate>().ok()?;
            antecedents.iter().position(|a| a.covariate == covariate)
        };
        let resolve = |variable: &str, term: &str| -> Result<usize, ConfigError> {
            let idx = position(variable)
                .ok_or_else(|| ConfigError::UnknownVariable(variable.to_string()))?;
            let t = antecedents[idx].variable.term_index(term).ok_or_else(|| {
                ConfigError::UnknownTerm { variable: variable.to_string(), term: term.to_string() }
            })?;
            Ok(slot_offsets[idx] + t)
        };

        let mut used_parameters = BTreeSet::new();
        let mut compiled = Vec::with_capacity(rules.len());
        for (index, rule) in rules.iter().enumerate() {
            let condition = rule.expression.compile(&resolve).map_err(|e| e.in_rule(index))?;
            let consequent_idx = consequent.term_index(&rule.consequent_term).ok_or_else(|| {
                ConfigError::UnknownTerm {
                    variable: consequent.name().to_string(),
                    term: rule.consequent_term.clone(),
                }
                .in_rule(index)
            })?;
            if !(rule.weight > 0.0 && rule.weight <= 1.0) {
                return Err(ConfigError::InvalidWeight(rule.weight).in_rule(index));
            }
            for (variable, _) in rule.expression.leaves() {
                if let Some(idx) = position(variable) {
                    used_parameters.insert(antecedents[idx].covariate);
                }
            }
            compiled.push(CompiledRule { condition, consequent: consequent_idx, weight: rule.weight });
        }

        Ok(Self {
            species: species.into(),
            season: season.into(),
            antecedents,
            consequent,
            rules,
            used_parameters,
            slot_offsets,
            compiled,
        })
    }

    pub fn from_document(doc: &RuleBaseDocument) -> Result<Self, ConfigError> {
        let antecedents = doc
            .antecedents
            .iter()
            .map(|v| v.to_variable().and_then(Antecedent::new))
            .collect::<Result<Vec<_>, _>>()?;
        let consequent = doc.consequent.to_variable()?;
        let rules = doc
            .rules
            .iter()
            .enumerate()
            .map(|(i, r)| {
                r.condition
                    .to_expression()
                    .map(|e| Rule::new(e, r.consequent.as_str()).with_weight(r.weight))
                    .map_err(|e| e.in_rule(i))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let rb = Self::new(doc.species.as_str(), doc.season.as_str(), antecedents, consequent, rules)?;
        debug!(
            species = %rb.species,
            season = %rb.season,
            rules = rb.rules.len(),
            used = ?rb.used_parameters,
            "rule base validated"
        );
        Ok(rb)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let doc: RuleBaseDocument = serde_json::from_str(json)?;
        Self::from_document(&doc)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        let rb = Self::from_json_str(&json)?;
        info!(path = %path.display(), species = %rb.species, season = %rb.season, "loaded rule base");
        Ok(rb)
    }

    /// Serialized form; expressions are written in their textual form.
    pub fn to_document(&self) -> RuleBaseDocument {
        RuleBaseDocument {
            species: self.species.clone(),
            season: self.season.clone(),
            antecedents: self
                .antecedents
                .iter()
                .map(|a| VariableDocument::from_variable(&a.variable))
                .collect(),
            consequent: VariableDocument::from_variable(&self.consequent),
            rules: self
                .rules
                .iter()
                .map(|r| RuleDocument {
                    condition: ExpressionDocument::Text(r.expression.to_string()),
                    consequent: r.consequent_term.clone(),
                    weight: r.weight,
                })
                .collect(),
        }
    }

    pub fn species(&self) -> &str {
        &self.species
    }

    pub fn season(&self) -> &str {
        &self.season
    }

    pub fn antecedents(&self) -> &[Antecedent] {
        &self.antecedents
    }

    pub fn antecedent(&self, covariate: Covariate) -> Option<&Antecedent> {
        self.antecedents.iter().find(|a| a.covariate == covariate)
    }

    pub fn consequent(&self) -> &Variable {
        &self.consequent
    }

    /// Output semantic name, e.g. `anchovy`.
    pub fn output_name(&self) -> &str {
        self.consequent.name()
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Covariates referenced by at least one rule.
    pub fn used_parameters(&self) -> &BTreeSet<Covariate> {
        &self.used_parameters
    }

    pub(crate) fn compiled_rules(&self) -> &[CompiledRule] {
        &self.compiled
    }

    pub(crate) fn slot_offsets(&self) -> &[usize] {
        &self.slot_offsets
    }

    /// Total number of antecedent terms (size of the flat membership buffer).
    pub(crate) fn slot_count(&self) -> usize {
        self.antecedents.iter().map(|a| a.variable.terms().len()).sum()
    }
}
