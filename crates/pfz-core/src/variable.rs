//! Fuzzy variables: a sampled numeric universe plus named trapezoidal terms.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::membership::Trapezoid;

/// Numeric domain of a variable, sampled at `resolution` evenly spaced points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Universe {
    pub min: f64,
    pub max: f64,
    pub resolution: usize,
}

impl Universe {
    pub fn new(min: f64, max: f64, resolution: usize) -> Self {
        Self { min, max, resolution }
    }

    /// The `resolution` sample points spanning `[min, max]`, both ends included.
    pub fn samples(&self) -> Vec<f64> {
        let n = self.resolution;
        if n < 2 {
            return vec![self.min; n];
        }
        let span = self.max - self.min;
        (0..n)
            .map(|i| {
                if i == n - 1 {
                    self.max
                } else {
                    self.min + span * i as f64 / (n - 1) as f64
                }
            })
            .collect()
    }

    /// Clamp `x` into the universe. NaN passes through unchanged.
    #[inline]
    pub fn clip(&self, x: f64) -> f64 {
        if x.is_nan() {
            x
        } else {
            x.clamp(self.min, self.max)
        }
    }

    fn validate(&self, variable: &str) -> Result<(), ConfigError> {
        if !(self.min.is_finite() && self.max.is_finite() && self.min < self.max) {
            return Err(ConfigError::InvalidUniverse {
                variable: variable.to_string(),
                min: self.min,
                max: self.max,
            });
        }
        if self.resolution < 2 {
            return Err(ConfigError::InvalidResolution {
                variable: variable.to_string(),
                resolution: self.resolution,
            });
        }
        Ok(())
    }
}

/// A named fuzzy set on a variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Term {
    pub name: String,
    pub membership: Trapezoid,
}

impl Term {
    pub fn new(name: impl Into<String>, membership: Trapezoid) -> Self {
        Self { name: name.into(), membership }
    }
}

/// A validated fuzzy variable. Term order is preserved and defines each
/// term's index.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    name: String,
    universe: Universe,
    terms: Vec<Term>,
}

impl Variable {
    pub fn new(
        name: impl Into<String>,
        universe: Universe,
        terms: Vec<Term>,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        universe.validate(&name)?;
        if terms.is_empty() {
            return Err(ConfigError::NoTerms(name));
        }
        for (i, term) in terms.iter().enumerate() {
            if terms[..i].iter().any(|t| t.name == term.name) {
                return Err(ConfigError::DuplicateTerm {
                    variable: name,
                    term: term.name.clone(),
                });
            }
        }
        Ok(Self { name, universe, terms })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn universe(&self) -> &Universe {
        &self.universe
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    pub fn term_index(&self, term: &str) -> Option<usize> {
        self.terms.iter().position(|t| t.name == term)
    }

    /// Degree of `value` in every term, in term order.
    pub fn fuzzify(&self, value: f64) -> Vec<f64> {
        self.terms.iter().map(|t| t.membership.degree(value)).collect()
    }

    /// Writes one degree per term into `out`, which must hold `terms().len()` slots.
    #[inline]
    pub(crate) fn fuzzify_into(&self, value: f64, out: &mut [f64]) {
        for (slot, term) in out.iter_mut().zip(&self.terms) {
            *slot = term.membership.degree(value);
        }
    }

    /// Like [`fuzzify`](Self::fuzzify), keyed by term name.
    pub fn fuzzify_named(&self, value: f64) -> Vec<(String, f64)> {
        self.terms
            .iter()
            .map(|t| (t.name.clone(), t.membership.degree(value)))
            .collect()
    }

    /// Membership curve of term `index` sampled over the universe.
    pub fn term_curve(&self, index: usize) -> Vec<f64> {
        let mf = &self.terms[index].membership;
        self.universe.samples().into_iter().map(|u| mf.degree(u)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn depth() -> Variable {
        Variable::new(
            "depth",
            Universe::new(-5000.0, 0.0, 100),
            vec![
                Term::new("deep", Trapezoid::new([-5000.0, -5000.0, -200.0, -100.0]).unwrap()),
                Term::new("ideal", Trapezoid::new([-200.0, -100.0, 0.0, 0.0]).unwrap()),
            ],
        )
        .unwrap()
    }

    #[test]
    fn samples_span_universe_inclusive() {
        let s = Universe::new(0.0, 100.0, 101).samples();
        assert_eq!(s.len(), 101);
        assert_eq!(s[0], 0.0);
        assert_eq!(s[100], 100.0);
        assert_abs_diff_eq!(s[37], 37.0, epsilon = 1e-12);
    }

    #[test]
    fn fuzzify_evaluates_every_term() {
        let v = depth();
        assert_eq!(v.fuzzify(-50.0), vec![0.0, 1.0]);
        let m = v.fuzzify(-150.0);
        assert_abs_diff_eq!(m[0], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(m[1], 0.5, epsilon = 1e-12);

        let named = v.fuzzify_named(-3000.0);
        assert_eq!(named, vec![("deep".to_string(), 1.0), ("ideal".to_string(), 0.0)]);
    }

    #[test]
    fn term_index_follows_declaration_order() {
        let v = depth();
        assert_eq!(v.term_index("deep"), Some(0));
        assert_eq!(v.term_index("ideal"), Some(1));
        assert_eq!(v.term_index("shallow"), None);
    }

    #[test]
    fn clip_keeps_nan() {
        let u = Universe::new(273.0, 310.0, 37);
        assert_eq!(u.clip(250.0), 273.0);
        assert_eq!(u.clip(400.0), 310.0);
        assert!(u.clip(f64::NAN).is_nan());
    }

    #[test]
    fn rejects_bad_universe_and_duplicates() {
        let t = Trapezoid::new([0.0, 0.0, 1.0, 1.0]).unwrap();
        assert!(matches!(
            Variable::new("x", Universe::new(1.0, 1.0, 10), vec![Term::new("a", t)]),
            Err(ConfigError::InvalidUniverse { .. })
        ));
        assert!(matches!(
            Variable::new("x", Universe::new(0.0, 1.0, 1), vec![Term::new("a", t)]),
            Err(ConfigError::InvalidResolution { resolution: 1, .. })
        ));
        assert!(matches!(
            Variable::new("x", Universe::new(0.0, 1.0, 10), vec![]),
            Err(ConfigError::NoTerms(_))
        ));
        assert!(matches!(
            Variable::new(
                "x",
                Universe::new(0.0, 1.0, 10),
                vec![Term::new("a", t), Term::new("a", t)]
            ),
            Err(ConfigError::DuplicateTerm { term, .. }) if term == "a"
        ));
    }
}
