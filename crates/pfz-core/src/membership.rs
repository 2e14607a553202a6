//! Trapezoidal membership functions.
//!
//! A trapezoid `(a, b, c, d)` rises linearly over `a → b`, holds 1.0 over
//! `[b, c]` and falls linearly over `c → d`. Coincident points collapse a
//! ramp into a step, which is how the one-sided shoulders at the edges of a
//! universe are written (e.g. `deep = (-5000, -5000, -200, -100)`).

use serde::{Deserialize, Serialize};

/// Four ordered break-points `a <= b <= c <= d`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(into = "[f64; 4]", try_from = "[f64; 4]")]
pub struct Trapezoid {
    a: f64,
    b: f64,
    c: f64,
    d: f64,
}

impl Trapezoid {
    /// Returns `None` unless all points are finite and non-decreasing.
    pub fn new(points: [f64; 4]) -> Option<Self> {
        let [a, b, c, d] = points;
        let ordered = a <= b && b <= c && c <= d;
        if points.iter().all(|p| p.is_finite()) && ordered {
            Some(Self { a, b, c, d })
        } else {
            None
        }
    }

    pub fn points(&self) -> [f64; 4] {
        [self.a, self.b, self.c, self.d]
    }

    /// Membership degree of `x`, always in [0, 1]. NaN belongs to nothing.
    ///
    /// The plateau is checked first so that a collapsed shoulder (`a == b`
    /// or `c == d`) keeps degree 1 at its own edge point.
    pub fn degree(&self, x: f64) -> f64 {
        if x.is_nan() {
            return 0.0;
        }
        if self.b <= x && x <= self.c {
            return 1.0;
        }
        if x <= self.a || x >= self.d {
            return 0.0;
        }
        let y = if x < self.b {
            (x - self.a) / (self.b - self.a)
        } else {
            (self.d - x) / (self.d - self.c)
        };
        y.clamp(0.0, 1.0)
    }
}

impl From<Trapezoid> for [f64; 4] {
    fn from(t: Trapezoid) -> Self {
        t.points()
    }
}

impl TryFrom<[f64; 4]> for Trapezoid {
    type Error = String;

    fn try_from(points: [f64; 4]) -> Result<Self, Self::Error> {
        Trapezoid::new(points)
            .ok_or_else(|| format!("break-points {points:?} must be finite and non-decreasing"))
    }
}
