use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::covariate::Covariate;
use crate::error::{Error, Result};

/// Geographic extent of a grid, pixel edges in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

/// A 2D grid of f64 values, row-major. NaN marks a missing observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Raster {
    pub data: Vec<f64>,
    pub rows: usize,
    pub cols: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<GeoBounds>,
}

impl Raster {
    /// Create a raster filled with the given value.
    pub fn new(rows: usize, cols: usize, fill: f64) -> Self {
        Self { data: vec![fill; rows * cols], rows, cols, bounds: None }
    }

    /// Wrap row-major `data`; its length must be `rows * cols`.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::InvalidRaster { rows, cols, len: data.len() });
        }
        Ok(Self { data, rows, cols, bounds: None })
    }

    pub fn with_bounds(mut self, bounds: GeoBounds) -> Self {
        self.bounds = Some(bounds);
        self
    }

    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, val: f64) {
        self.data[row * self.cols + col] = val;
    }

    pub fn row(&self, row: usize) -> &[f64] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    /// Centre of pixel `(row, col)` as `(lon, lat)`; row 0 is the northern edge.
    /// `None` without bounds or outside the grid.
    pub fn pixel_center(&self, row: usize, col: usize) -> Option<(f64, f64)> {
        let b = self.bounds?;
        if row >= self.rows || col >= self.cols {
            return None;
        }
        let lon = b.min_lon + (col as f64 + 0.5) / self.cols as f64 * (b.max_lon - b.min_lon);
        let lat = b.max_lat - (row as f64 + 0.5) / self.rows as f64 * (b.max_lat - b.min_lat);
        Some((lon, lat))
    }

    /// Smallest value, ignoring NaN. `None` if every value is NaN.
    pub fn min_value(&self) -> Option<f64> {
        self.data.iter().copied().filter(|v| !v.is_nan()).reduce(f64::min)
    }

    pub fn max_value(&self) -> Option<f64> {
        self.data.iter().copied().filter(|v| !v.is_nan()).reduce(f64::max)
    }

    pub fn nan_count(&self) -> usize {
        self.data.iter().filter(|v| v.is_nan()).count()
    }
}

/// Pixel-aligned input rasters keyed by covariate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RasterBundle {
    layers: BTreeMap<Covariate, Raster>,
}

impl RasterBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, covariate: Covariate, raster: Raster) -> Self {
        self.insert(covariate, raster);
        self
    }

    /// Returns the raster previously stored for `covariate`, if any.
    pub fn insert(&mut self, covariate: Covariate, raster: Raster) -> Option<Raster> {
        self.layers.insert(covariate, raster)
    }

    pub fn get(&self, covariate: Covariate) -> Option<&Raster> {
        self.layers.get(&covariate)
    }

    pub fn covariates(&self) -> impl Iterator<Item = Covariate> + '_ {
        self.layers.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Bounds of the first layer that carries any.
    pub fn bounds(&self) -> Option<GeoBounds> {
        self.layers.values().find_map(|r| r.bounds)
    }

    /// Check that every `required` covariate is present, that each layer's
    /// data fills its shape, and that all layers share one shape. Returns
    /// that shape.
    ///
    /// The reference shape is the first required layer in covariate order.
    pub fn validate(&self, required: &BTreeSet<Covariate>) -> Result<(usize, usize)> {
        let mut reference = None;
        for &c in required {
            let raster = self.get(c).ok_or(Error::MissingRaster(c))?;
            reference.get_or_insert(raster.shape());
        }
        let Some((rows, cols)) = reference.or_else(|| self.layers.values().next().map(Raster::shape)) else {
            return Ok((0, 0));
        };
        for (&covariate, raster) in &self.layers {
            let (found_rows, found_cols) = raster.shape();
            if raster.data.len() != found_rows * found_cols {
                return Err(Error::InvalidRaster { rows: found_rows, cols: found_cols, len: raster.data.len() });
            }
            if (found_rows, found_cols) != (rows, cols) {
                return Err(Error::ShapeMismatch { covariate, rows, cols, found_rows, found_cols });
            }
        }
        Ok((rows, cols))
    }
}

impl FromIterator<(Covariate, Raster)> for RasterBundle {
    fn from_iter<I: IntoIterator<Item = (Covariate, Raster)>>(iter: I) -> Self {
        Self { layers: iter.into_iter().collect() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn from_vec_checks_length() {
        assert!(Raster::from_vec(2, 3, vec![0.0; 6]).is_ok());
        assert!(matches!(
            Raster::from_vec(2, 3, vec![0.0; 5]),
            Err(Error::InvalidRaster { rows: 2, cols: 3, len: 5 })
        ));
    }

    #[test]
    fn get_set_are_row_major() {
        let mut r = Raster::new(2, 3, 0.0);
        r.set(1, 2, 7.0);
        assert_eq!(r.data[5], 7.0);
        assert_eq!(r.get(1, 2), 7.0);
        assert_eq!(r.row(1), &[0.0, 0.0, 7.0]);
    }

    #[test]
    fn statistics_skip_nan() {
        let r = Raster::from_vec(1, 4, vec![3.0, f64::NAN, -1.0, 2.0]).unwrap();
        assert_eq!(r.min_value(), Some(-1.0));
        assert_eq!(r.max_value(), Some(3.0));
        assert_eq!(r.nan_count(), 1);
        assert_eq!(Raster::new(1, 1, f64::NAN).min_value(), None);
    }

    #[test]
    fn pixel_centres_run_north_to_south() {
        let r = Raster::new(2, 4, 0.0).with_bounds(GeoBounds {
            min_lon: 100.0,
            max_lon: 104.0,
            min_lat: -2.0,
            max_lat: 0.0,
        });
        let (lon, lat) = r.pixel_center(0, 0).unwrap();
        assert_abs_diff_eq!(lon, 100.5, epsilon = 1e-12);
        assert_abs_diff_eq!(lat, -0.5, epsilon = 1e-12);
        let (lon, lat) = r.pixel_center(1, 3).unwrap();
        assert_abs_diff_eq!(lon, 103.5, epsilon = 1e-12);
        assert_abs_diff_eq!(lat, -1.5, epsilon = 1e-12);
        assert!(r.pixel_center(2, 0).is_none());
        assert!(Raster::new(2, 2, 0.0).pixel_center(0, 0).is_none());
    }

    #[test]
    fn bundle_validation_reports_missing_and_mismatched_layers() {
        let required: BTreeSet<_> = [Covariate::Sst, Covariate::Depth].into_iter().collect();

        let partial = RasterBundle::new().with(Covariate::Sst, Raster::new(3, 3, 0.0));
        assert!(matches!(partial.validate(&required), Err(Error::MissingRaster(Covariate::Depth))));

        let mismatched = partial.clone().with(Covariate::Depth, Raster::new(3, 4, 0.0));
        assert!(matches!(
            mismatched.validate(&required),
            Err(Error::ShapeMismatch { covariate: Covariate::Depth, rows: 3, cols: 3, found_rows: 3, found_cols: 4 })
        ));

        // Unused layers must still match.
        let extra = partial
            .clone()
            .with(Covariate::Depth, Raster::new(3, 3, 0.0))
            .with(Covariate::Chl, Raster::new(1, 1, 0.0));
        assert!(matches!(extra.validate(&required), Err(Error::ShapeMismatch { covariate: Covariate::Chl, .. })));

        let ok = partial.with(Covariate::Depth, Raster::new(3, 3, 0.0));
        assert_eq!(ok.validate(&required).unwrap(), (3, 3));
    }

    #[test]
    fn bundle_validation_rejects_truncated_data() {
        let required: BTreeSet<_> = [Covariate::Depth].into_iter().collect();
        let mut depth = Raster::new(2, 2, -50.0);
        depth.data.truncate(1);
        let bundle = RasterBundle::new().with(Covariate::Depth, depth);
        assert!(matches!(bundle.validate(&required), Err(Error::InvalidRaster { rows: 2, cols: 2, len: 1 })));
    }
}
