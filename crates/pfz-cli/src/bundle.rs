//! JSON interchange for raster bundles.
//!
//! ```json
//! { "rows": 2, "cols": 2,
//!   "bounds": { "min_lon": 100, "max_lon": 101, "min_lat": -1, "max_lat": 0 },
//!   "layers": { "sst": [290.1, null, 291.0, 290.4], "depth": [-20, -35, -60, -80] } }
//! ```
//!
//! `null` marks a missing observation and becomes NaN.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use pfz_core::{Covariate, GeoBounds, Raster, RasterBundle};
use serde::{Deserialize, Deserializer};

fn null_as_nan_vec<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Vec<f64>, D::Error> {
    let v: Vec<Option<f64>> = Vec::deserialize(d)?;
    Ok(v.into_iter().map(|x| x.unwrap_or(f64::NAN)).collect())
}

#[derive(Deserialize)]
struct Layer(#[serde(deserialize_with = "null_as_nan_vec")] Vec<f64>);

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct BundleFile {
    rows: usize,
    cols: usize,
    #[serde(default)]
    bounds: Option<GeoBounds>,
    layers: BTreeMap<Covariate, Layer>,
}

pub fn parse(json: &str) -> Result<RasterBundle> {
    let file: BundleFile = serde_json::from_str(json).context("malformed raster bundle")?;
    let mut bundle = RasterBundle::new();
    for (covariate, Layer(values)) in file.layers {
        let mut raster = Raster::from_vec(file.rows, file.cols, values)
            .with_context(|| format!("layer '{covariate}'"))?;
        raster.bounds = file.bounds;
        bundle.insert(covariate, raster);
    }
    Ok(bundle)
}

pub fn load(path: &Path) -> Result<RasterBundle> {
    let json = fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
    parse(&json).with_context(|| format!("in {}", path.display()))
}
