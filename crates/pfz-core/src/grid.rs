//! Per-pixel driver: applies one [`InferenceEngine`] to every pixel of a
//! [`RasterBundle`].
//!
//! The grid is cut into blocks of whole rows. Blocks are independent and
//! write disjoint slices of the output, so with the `threading` feature they
//! run on the rayon pool without locking; without it they run in order. The
//! result is identical either way.
//!
//! Per pixel:
//!   - read every used covariate at `(row, col)`
//!   - any NaN: write the fill value, count as missing, skip inference
//!   - otherwise: write the defuzzified score, or the fill value if no rule fired

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[cfg(feature = "threading")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::covariate::Covariate;
use crate::engine::{Inference, InferenceEngine};
use crate::error::Result;
use crate::raster::{Raster, RasterBundle};

/// Output value for pixels that could not be scored.
pub const MISSING_VALUE: f64 = -999.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridOptions {
    /// Written where an input is NaN or no rule fired.
    pub fill_value: f64,
    /// Rows per work unit; also the granularity of progress and cancellation.
    pub block_rows: usize,
}

impl Default for GridOptions {
    fn default() -> Self {
        Self { fill_value: MISSING_VALUE, block_rows: 16 }
    }
}

/// Suitability raster plus the metadata that travels with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuitabilityMap {
    /// Consequent name, e.g. `anchovy`.
    pub name: String,
    pub long_name: String,
    pub units: String,
    pub valid_range: [f64; 2],
    pub fill_value: f64,
    pub raster: Raster,
}

impl SuitabilityMap {
    /// Scores outside the fill value.
    pub fn valid_values(&self) -> impl Iterator<Item = f64> + '_ {
        let fill = self.fill_value;
        self.raster.data.iter().copied().filter(move |&v| v != fill)
    }
}

/// Pixel outcome counts for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub scored: usize,
    /// At least one used covariate was NaN.
    pub missing: usize,
    /// Inputs were present but every rule fired at zero strength.
    pub no_rule_fired: usize,
}

impl RunStats {
    pub fn merge(self, other: RunStats) -> RunStats {
        RunStats {
            scored: self.scored + other.scored,
            missing: self.missing + other.missing,
            no_rule_fired: self.no_rule_fired + other.no_rule_fired,
        }
    }

    pub fn total(&self) -> usize {
        self.scored + self.missing + self.no_rule_fired
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridRun {
    pub output: SuitabilityMap,
    pub stats: RunStats,
    /// True if the run stopped early; rows never reached hold the fill value.
    pub cancelled: bool,
}

/// Shared flag for stopping a run between blocks.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

pub struct GridProcessor<'a> {
    engine: &'a InferenceEngine,
    /// Used covariates with their rasters, in covariate order.
    layers: Vec<(Covariate, &'a Raster)>,
    rows: usize,
    cols: usize,
    options: GridOptions,
    bundle: &'a RasterBundle,
}

impl<'a> GridProcessor<'a> {
    /// Validates the bundle against the engine's used parameters once, up front.
    pub fn new(engine: &'a InferenceEngine, bundle: &'a RasterBundle) -> Result<Self> {
        let used = engine.rule_base().used_parameters();
        let (rows, cols) = bundle.validate(used)?;
        let layers = used
            .iter()
            .filter_map(|&c| bundle.get(c).map(|r| (c, r)))
            .collect();
        Ok(Self { engine, layers, rows, cols, options: GridOptions::default(), bundle })
    }

    pub fn with_options(mut self, options: GridOptions) -> Self {
        self.options = options;
        self
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn run(&self) -> GridRun {
        self.run_with(|_, _| {}, &CancelToken::new())
    }

    /// `progress(rows_done, rows_total)` is called after every block, possibly
    /// from worker threads and out of row order.
    pub fn run_with<P>(&self, progress: P, cancel: &CancelToken) -> GridRun
    where
        P: Fn(usize, usize) + Sync,
    {
        let start = Instant::now();
        let rb = self.engine.rule_base();
        info!(
            species = rb.species(),
            season = rb.season(),
            rows = self.rows,
            cols = self.cols,
            "grid run started"
        );

        let mut raster = Raster::new(self.rows, self.cols, self.options.fill_value);
        raster.bounds = self.bundle.bounds();

        let block_rows = self.options.block_rows.max(1);
        let block_len = block_rows * self.cols;
        let rows_done = AtomicUsize::new(0);
        let mut stats = RunStats::default();
        let mut cancelled = false;

        if block_len > 0 {
            let work = |(block, out): (usize, &mut [f64])| -> Option<RunStats> {
                if cancel.is_cancelled() {
                    return None;
                }
                let s = self.process_block(block * block_rows, out);
                let done = rows_done.fetch_add(out.len() / self.cols, Ordering::Relaxed) + out.len() / self.cols;
                progress(done, self.rows);
                Some(s)
            };

            #[cfg(feature = "threading")]
            let results: Vec<Option<RunStats>> = raster.data.par_chunks_mut(block_len).enumerate().map(work).collect();
            #[cfg(not(feature = "threading"))]
            let results: Vec<Option<RunStats>> = raster.data.chunks_mut(block_len).enumerate().map(work).collect();

            for r in results {
                match r {
                    Some(s) => stats = stats.merge(s),
                    None => cancelled = true,
                }
            }
        }

        info!(
            scored = stats.scored,
            missing = stats.missing,
            no_rule_fired = stats.no_rule_fired,
            cancelled,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "grid run finished"
        );

        GridRun {
            output: SuitabilityMap {
                name: rb.output_name().to_string(),
                long_name: format!("Possibility of {} Fishing Zone", capitalize(rb.species())),
                units: "%".to_string(),
                valid_range: [rb.consequent().universe().min, rb.consequent().universe().max],
                fill_value: self.options.fill_value,
                raster,
            },
            stats,
            cancelled,
        }
    }

    /// Score the rows starting at `first_row` into `out`.
    fn process_block(&self, first_row: usize, out: &mut [f64]) -> RunStats {
        let mut scratch = self.engine.scratch();
        let mut values = [f64::NAN; Covariate::COUNT];
        let mut stats = RunStats::default();
        let base = first_row * self.cols;

        for (i, px) in out.iter_mut().enumerate() {
            let idx = base + i;
            let mut missing = false;
            for &(c, r) in &self.layers {
                let v = r.data[idx];
                missing |= v.is_nan();
                values[c.index()] = v;
            }
            if missing {
                *px = self.options.fill_value;
                stats.missing += 1;
                continue;
            }
            match self.engine.infer_values(&values, &mut scratch) {
                Inference::Score(s) => {
                    *px = s;
                    stats.scored += 1;
                }
                Inference::NoRuleFired => {
                    *px = self.options.fill_value;
                    stats.no_rule_fired += 1;
                }
            }
        }
        debug!(first_row, pixels = out.len(), "block done");
        stats
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::rulebase::RuleBase;
    use approx::assert_abs_diff_eq;
    use std::sync::Mutex;

    const RULES: &str = r#"{
        "species": "anchovy", "season": "summer",
        "antecedents": [
            { "name": "depth", "universe": [-5000, 0], "resolution": 100,
              "terms": { "deep": [-5000, -5000, -200, -100], "ideal": [-200, -100, 0, 0] } },
            { "name": "sst", "universe": [273, 310], "resolution": 37,
              "terms": { "low": [273, 273, 285, 290], "ideal": [285, 290, 295, 300] } }
        ],
        "consequent": { "name": "anchovy", "universe": [0, 100], "resolution": 101,
                        "terms": { "low": [0, 0, 20, 30], "high": [50, 60, 80, 90] } },
        "rules": [
            { "if": "depth is ideal and sst is ideal", "then": "high" },
            { "if": "depth is deep and sst is low", "then": "low" }
        ]
    }"#;

    fn engine() -> InferenceEngine {
        InferenceEngine::new(RuleBase::from_json_str(RULES).unwrap())
    }

    fn bundle(rows: usize, cols: usize) -> RasterBundle {
        let mut depth = Raster::new(rows, cols, 0.0);
        let mut sst = Raster::new(rows, cols, 0.0);
        for r in 0..rows {
            for c in 0..cols {
                depth.set(r, c, -10.0 - 20.0 * (r * cols + c) as f64);
                sst.set(r, c, 280.0 + (c as f64) * 1.5);
            }
        }
        RasterBundle::new().with(Covariate::Depth, depth).with(Covariate::Sst, sst)
    }

    #[test]
    fn every_pixel_matches_single_inference() {
        let e = engine();
        let b = bundle(5, 7);
        let run = GridProcessor::new(&e, &b).unwrap().with_options(GridOptions { block_rows: 2, ..Default::default() }).run();
        assert!(!run.cancelled);
        assert_eq!(run.stats.total(), 35);
        for r in 0..5 {
            for c in 0..7 {
                let pv = crate::engine::PixelVector::new()
                    .with(Covariate::Depth, b.get(Covariate::Depth).unwrap().get(r, c))
                    .with(Covariate::Sst, b.get(Covariate::Sst).unwrap().get(r, c));
                let expected = e.infer(&pv).unwrap().value_or(MISSING_VALUE);
                assert_eq!(run.output.raster.get(r, c).to_bits(), expected.to_bits(), "pixel ({r}, {c})");
            }
        }
    }

    #[test]
    fn nan_pixels_get_fill_and_are_counted() {
        let e = engine();
        let mut b = bundle(2, 2);
        let mut sst = b.get(Covariate::Sst).unwrap().clone();
        sst.set(0, 1, f64::NAN);
        b.insert(Covariate::Sst, sst);
        let run = GridProcessor::new(&e, &b).unwrap().run();
        assert_eq!(run.output.raster.get(0, 1), MISSING_VALUE);
        assert_eq!(run.stats.missing, 1);
        assert_eq!(run.stats.total(), 4);
    }

    #[test]
    fn no_rule_fired_uses_fill_value() {
        let e = engine();
        // Deep and warm: neither rule fires.
        let b = RasterBundle::new()
            .with(Covariate::Depth, Raster::new(1, 3, -3000.0))
            .with(Covariate::Sst, Raster::new(1, 3, 297.0));
        let run = GridProcessor::new(&e, &b)
            .unwrap()
            .with_options(GridOptions { fill_value: -1.0, ..Default::default() })
            .run();
        assert_eq!(run.output.raster.data, vec![-1.0; 3]);
        assert_eq!(run.stats, RunStats { scored: 0, missing: 0, no_rule_fired: 3 });
        assert_eq!(run.output.valid_values().count(), 0);
    }

    #[test]
    fn output_carries_metadata() {
        let e = engine();
        let b = RasterBundle::new()
            .with(Covariate::Depth, Raster::new(1, 1, -50.0))
            .with(Covariate::Sst, Raster::new(1, 1, 292.0));
        let map = GridProcessor::new(&e, &b).unwrap().run().output;
        assert_eq!(map.name, "anchovy");
        assert_eq!(map.long_name, "Possibility of Anchovy Fishing Zone");
        assert_eq!(map.units, "%");
        assert_eq!(map.valid_range, [0.0, 100.0]);
        assert_eq!(map.fill_value, MISSING_VALUE);
        assert_abs_diff_eq!(map.raster.get(0, 0), 70.0, epsilon = 1e-9);
    }

    #[test]
    fn shape_mismatch_is_raised_at_construction() {
        let e = engine();
        // Sst comes first in covariate order, so its shape is the reference.
        let b = bundle(3, 3).with(Covariate::Sst, Raster::new(3, 2, 290.0));
        assert!(matches!(
            GridProcessor::new(&e, &b),
            Err(Error::ShapeMismatch { covariate: Covariate::Depth, rows: 3, cols: 2, found_rows: 3, found_cols: 3 })
        ));
    }

    #[test]
    fn short_raster_data_is_raised_at_construction() {
        let e = engine();
        let depth: Raster = serde_json::from_str(r#"{ "data": [-50.0], "rows": 2, "cols": 2 }"#).unwrap();
        let b = RasterBundle::new().with(Covariate::Depth, depth).with(Covariate::Sst, Raster::new(2, 2, 292.0));
        assert!(matches!(
            GridProcessor::new(&e, &b),
            Err(Error::InvalidRaster { rows: 2, cols: 2, len: 1 })
        ));
    }

    #[test]
    fn missing_used_raster_is_raised_at_construction() {
        let e = engine();
        let b = RasterBundle::new().with(Covariate::Depth, Raster::new(2, 2, -50.0));
        assert!(matches!(GridProcessor::new(&e, &b), Err(Error::MissingRaster(Covariate::Sst))));
    }

    #[test]
    fn empty_grid_runs_to_empty_output() {
        let e = engine();
        let b = bundle(0, 4);
        let run = GridProcessor::new(&e, &b).unwrap().run();
        assert!(run.output.raster.is_empty());
        assert_eq!(run.stats.total(), 0);
        assert!(!run.cancelled);
    }

    #[test]
    fn progress_reaches_total() {
        let e = engine();
        let b = bundle(10, 3);
        let seen = Mutex::new(Vec::new());
        let run = GridProcessor::new(&e, &b)
            .unwrap()
            .with_options(GridOptions { block_rows: 3, ..Default::default() })
            .run_with(|done, total| seen.lock().unwrap().push((done, total)), &CancelToken::new());
        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.len(), 4);
        assert!(seen.iter().all(|&(_, total)| total == 10));
        assert_eq!(seen.iter().map(|&(d, _)| d).max(), Some(10));
        assert_eq!(run.stats.total(), 30);
    }

    #[test]
    fn cancelled_run_leaves_fill_and_flags() {
        let e = engine();
        let b = bundle(4, 4);
        let cancel = CancelToken::new();
        cancel.cancel();
        let run = GridProcessor::new(&e, &b).unwrap().run_with(|_, _| {}, &cancel);
        assert!(run.cancelled);
        assert_eq!(run.stats.total(), 0);
        assert!(run.output.raster.data.iter().all(|&v| v == MISSING_VALUE));
    }

    #[test]
    fn block_size_does_not_change_output() {
        let e = engine();
        let b = bundle(9, 5);
        let a = GridProcessor::new(&e, &b).unwrap().with_options(GridOptions { block_rows: 1, ..Default::default() }).run();
        let z = GridProcessor::new(&e, &b).unwrap().with_options(GridOptions { block_rows: 64, ..Default::default() }).run();
        assert_eq!(a.output, z.output);
        assert_eq!(a.stats, z.stats);
    }
}
