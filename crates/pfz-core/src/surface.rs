//! Control surfaces: the engine's response to two covariates swept over a
//! regular grid while every other input is held fixed.

use serde::{Deserialize, Serialize};

use crate::covariate::Covariate;
use crate::engine::{InferenceEngine, PixelVector};
use crate::error::{Error, Result};
use crate::raster::Raster;

/// `steps` evenly spaced samples over `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    pub covariate: Covariate,
    pub min: f64,
    pub max: f64,
    pub steps: usize,
}

impl Axis {
    pub fn new(covariate: Covariate, min: f64, max: f64, steps: usize) -> Self {
        Self { covariate, min, max, steps }
    }

    /// Spans the covariate's antecedent universe in `engine`, if declared.
    pub fn over_universe(engine: &InferenceEngine, covariate: Covariate, steps: usize) -> Option<Self> {
        let u = engine.rule_base().antecedent(covariate)?.variable.universe();
        Some(Self::new(covariate, u.min, u.max, steps))
    }

    pub fn samples(&self) -> Vec<f64> {
        (0..self.steps)
            .map(|i| {
                if i + 1 == self.steps {
                    self.max
                } else {
                    self.min + (self.max - self.min) * i as f64 / (self.steps - 1) as f64
                }
            })
            .collect()
    }

    fn validate(&self) -> Result<()> {
        if !(self.min.is_finite() && self.max.is_finite() && self.min < self.max) {
            return Err(Error::InvalidAxis(format!(
                "{} range [{}, {}] is empty",
                self.covariate, self.min, self.max
            )));
        }
        if self.steps < 2 {
            return Err(Error::InvalidAxis(format!("{} needs at least 2 steps", self.covariate)));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlSurface {
    pub x_axis: Axis,
    pub y_axis: Axis,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    /// Scores with one row per `y` sample and one column per `x` sample.
    pub z: Raster,
    /// Range of the scored cells; `None` if no rule fired anywhere.
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// Sweep `x_axis` and `y_axis`, taking every other input from `fixed`.
/// Cells where no rule fires hold `fill`.
pub fn control_surface(
    engine: &InferenceEngine,
    x_axis: Axis,
    y_axis: Axis,
    fixed: &PixelVector,
    fill: f64,
) -> Result<ControlSurface> {
    x_axis.validate()?;
    y_axis.validate()?;
    if x_axis.covariate == y_axis.covariate {
        return Err(Error::InvalidAxis(format!("both axes sweep {}", x_axis.covariate)));
    }

    let x = x_axis.samples();
    let y = y_axis.samples();
    let mut z = Raster::new(y.len(), x.len(), fill);
    let mut min: Option<f64> = None;
    let mut max: Option<f64> = None;
    let mut inputs = *fixed;

    for (row, &yv) in y.iter().enumerate() {
        for (col, &xv) in x.iter().enumerate() {
            inputs.set(x_axis.covariate, xv);
            inputs.set(y_axis.covariate, yv);
            if let Some(s) = engine.infer(&inputs)?.score() {
                z.set(row, col, s);
                min = Some(min.map_or(s, |m| m.min(s)));
                max = Some(max.map_or(s, |m| m.max(s)));
            }
        }
    }

    Ok(ControlSurface { x_axis, y_axis, x, y, z, min, max })
}
