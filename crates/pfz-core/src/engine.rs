//! Mamdani inference over one validated [`RuleBase`].
//!
//! Pipeline for one pixel:
//!   1. Fuzzify: every antecedent term's degree at the (clipped) input
//!   2. Fire: each rule's Zadeh strength times its weight, in [0, 1]
//!   3. Implicate: min(strength, consequent term curve)
//!   4. Aggregate: pointwise max over all rules
//!   5. Defuzzify: discrete centroid over the consequent universe
//!
//! Rules that target the same consequent term are merged in step 2 by taking
//! the maximum strength; since min-implication distributes over max this
//! yields the same aggregate as clipping every rule separately, and keeps the
//! inner loop proportional to the number of consequent terms.

use serde::{Deserialize, Serialize};

use crate::covariate::Covariate;
use crate::error::{Error, Result};
use crate::rulebase::{Antecedent, RuleBase};

/// Engine-wide switches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceOptions {
    /// Clamp each crisp input into its antecedent universe before
    /// fuzzification.
    pub clip_to_universe: bool,
}

impl Default for InferenceOptions {
    fn default() -> Self {
        Self { clip_to_universe: true }
    }
}

/// Result of defuzzifying one input vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Inference {
    /// Centroid of the aggregated output, within the consequent universe.
    Score(f64),
    /// Every rule fired with strength zero; the centroid is undefined.
    NoRuleFired,
}

impl Inference {
    pub fn score(self) -> Option<f64> {
        match self {
            Inference::Score(s) => Some(s),
            Inference::NoRuleFired => None,
        }
    }

    pub fn value_or(self, fill: f64) -> f64 {
        self.score().unwrap_or(fill)
    }
}

/// Crisp covariate values for one pixel.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PixelVector {
    values: [Option<f64>; Covariate::COUNT],
}

impl PixelVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, covariate: Covariate, value: f64) -> Self {
        self.set(covariate, value);
        self
    }

    pub fn set(&mut self, covariate: Covariate, value: f64) {
        self.values[covariate.index()] = Some(value);
    }

    pub fn get(&self, covariate: Covariate) -> Option<f64> {
        self.values[covariate.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Covariate, f64)> + '_ {
        Covariate::ALL.into_iter().filter_map(|c| self.get(c).map(|v| (c, v)))
    }

    /// True if any supplied value is NaN.
    pub fn has_missing(&self) -> bool {
        self.values.iter().flatten().any(|v| v.is_nan())
    }
}

impl FromIterator<(Covariate, f64)> for PixelVector {
    fn from_iter<I: IntoIterator<Item = (Covariate, f64)>>(iter: I) -> Self {
        let mut pv = PixelVector::new();
        for (c, v) in iter {
            pv.set(c, v);
        }
        pv
    }
}

/// Intermediate state of one inference, for inspection and debugging.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Explanation {
    /// Per antecedent, the degree of each term in declaration order.
    pub memberships: Vec<VariableMemberships>,
    /// Weighted firing strength of each rule, in rule order.
    pub rule_strengths: Vec<f64>,
    /// Consequent universe samples.
    pub universe: Vec<f64>,
    /// Aggregated output curve over `universe`.
    pub aggregate: Vec<f64>,
    pub inference: Inference,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableMemberships {
    pub covariate: Covariate,
    /// Value actually fuzzified (after clipping).
    pub input: f64,
    pub terms: Vec<(String, f64)>,
}

/// Reusable per-worker buffers.
#[derive(Debug, Clone)]
pub(crate) struct Scratch {
    memberships: Vec<f64>,
    term_strengths: Vec<f64>,
}

/// Evaluates a [`RuleBase`] against crisp inputs. Immutable and `Sync`; one
/// engine is shared by every worker of a grid run.
#[derive(Debug, Clone)]
pub struct InferenceEngine {
    rule_base: RuleBase,
    options: InferenceOptions,
    universe: Vec<f64>,
    /// Consequent term curves sampled over `universe`, in term order.
    curves: Vec<Vec<f64>>,
}

impl InferenceEngine {
    pub fn new(rule_base: RuleBase) -> Self {
        Self::with_options(rule_base, InferenceOptions::default())
    }

    pub fn with_options(rule_base: RuleBase, options: InferenceOptions) -> Self {
        let consequent = rule_base.consequent();
        let universe = consequent.universe().samples();
        let curves = (0..consequent.terms().len()).map(|t| consequent.term_curve(t)).collect();
        Self { rule_base, options, universe, curves }
    }

    pub fn rule_base(&self) -> &RuleBase {
        &self.rule_base
    }

    pub fn options(&self) -> &InferenceOptions {
        &self.options
    }

    /// Score one pixel. Every used parameter must be present in `inputs`;
    /// NaN values are allowed and belong to no term.
    pub fn infer(&self, inputs: &PixelVector) -> Result<Inference> {
        let values = self.dense_inputs(inputs)?;
        let mut scratch = self.scratch();
        Ok(self.infer_values(&values, &mut scratch))
    }

    /// Like [`infer`](Self::infer), keeping every intermediate step.
    pub fn explain(&self, inputs: &PixelVector) -> Result<Explanation> {
        let values = self.dense_inputs(inputs)?;
        let mut scratch = self.scratch();
        self.fuzzify(&values, &mut scratch.memberships);

        let memberships = self
            .rule_base
            .antecedents()
            .iter()
            .zip(self.rule_base.slot_offsets())
            .map(|(a, &offset)| VariableMemberships {
                covariate: a.covariate,
                input: self.prepare(a, values[a.covariate.index()]),
                terms: a
                    .variable
                    .terms()
                    .iter()
                    .zip(&scratch.memberships[offset..])
                    .map(|(t, &m)| (t.name.clone(), m))
                    .collect(),
            })
            .collect();

        let rule_strengths = self
            .rule_base
            .compiled_rules()
            .iter()
            .map(|r| (r.condition.strength(&scratch.memberships) * r.weight).clamp(0.0, 1.0))
            .collect();

        self.fire(&mut scratch);
        let aggregate = (0..self.universe.len())
            .map(|i| self.aggregate_at(i, &scratch.term_strengths))
            .collect();
        let inference = self.defuzzify(&scratch.term_strengths);

        Ok(Explanation {
            memberships,
            rule_strengths,
            universe: self.universe.clone(),
            aggregate,
            inference,
        })
    }

    // ── Hot path ────────────────────────────────────────────────────────────

    pub(crate) fn scratch(&self) -> Scratch {
        Scratch {
            memberships: vec![0.0; self.rule_base.slot_count()],
            term_strengths: vec![0.0; self.curves.len()],
        }
    }

    /// Inference on a dense, covariate-indexed input array. Entries for
    /// covariates the rule base does not declare are ignored.
    pub(crate) fn infer_values(&self, values: &[f64; Covariate::COUNT], scratch: &mut Scratch) -> Inference {
        self.fuzzify(values, &mut scratch.memberships);
        self.fire(scratch);
        self.defuzzify(&scratch.term_strengths)
    }

    fn dense_inputs(&self, inputs: &PixelVector) -> Result<[f64; Covariate::COUNT]> {
        if let Some(&missing) = self.rule_base.used_parameters().iter().find(|&&c| inputs.get(c).is_none()) {
            return Err(Error::MissingInput(missing));
        }
        let mut values = [f64::NAN; Covariate::COUNT];
        for (c, v) in inputs.iter() {
            values[c.index()] = v;
        }
        Ok(values)
    }

    #[inline]
    fn prepare(&self, antecedent: &Antecedent, x: f64) -> f64 {
        if self.options.clip_to_universe {
            antecedent.variable.universe().clip(x)
        } else {
            x
        }
    }

    fn fuzzify(&self, values: &[f64; Covariate::COUNT], memberships: &mut [f64]) {
        for (a, &offset) in self.rule_base.antecedents().iter().zip(self.rule_base.slot_offsets()) {
            let x = self.prepare(a, values[a.covariate.index()]);
            let n = a.variable.terms().len();
            a.variable.fuzzify_into(x, &mut memberships[offset..offset + n]);
        }
    }

    /// Strongest weighted firing per consequent term.
    fn fire(&self, scratch: &mut Scratch) {
        scratch.term_strengths.fill(0.0);
        for rule in self.rule_base.compiled_rules() {
            let s = (rule.condition.strength(&scratch.memberships) * rule.weight).clamp(0.0, 1.0);
            let slot = &mut scratch.term_strengths[rule.consequent];
            if s > *slot {
                *slot = s;
            }
        }
    }

    #[inline]
    fn aggregate_at(&self, i: usize, term_strengths: &[f64]) -> f64 {
        term_strengths
            .iter()
            .zip(&self.curves)
            .filter(|(s, _)| **s > 0.0)
            .fold(0.0, |acc: f64, (s, curve)| acc.max(s.min(curve[i])))
    }

    fn defuzzify(&self, term_strengths: &[f64]) -> Inference {
        if term_strengths.iter().all(|&s| s <= 0.0) {
            return Inference::NoRuleFired;
        }
        let mut num = 0.0;
        let mut den = 0.0;
        for (i, &u) in self.universe.iter().enumerate() {
            let m = self.aggregate_at(i, term_strengths);
            num += u * m;
            den += m;
        }
        if den > 0.0 {
            Inference::Score(num / den)
        } else {
            Inference::NoRuleFired
        }
    }
}
