//! End-to-end checks through the public API: rule-base document in,
//! suitability raster out.

use approx::assert_abs_diff_eq;
use pfz_core::catalog::{self, Season, Species};
use pfz_core::{
    Covariate, Error, GridOptions, GridProcessor, Inference, InferenceEngine, PixelVector, Raster, RasterBundle,
    RuleBase, MISSING_VALUE,
};

fn depth_rule_base(extra_rules: &str) -> RuleBase {
    let json = format!(
        r#"{{
        "species": "anchovy", "season": "summer",
        "antecedents": [
            {{ "name": "depth", "universe": [-5000, 0], "resolution": 100,
               "terms": {{ "deep": [-5000, -5000, -200, -100], "ideal": [-200, -100, 0, 0] }} }}
        ],
        "consequent": {{ "name": "anchovy", "universe": [0, 100], "resolution": 101,
                         "terms": {{ "low": [0, 0, 20, 30], "medium": [20, 30, 50, 60],
                                    "high": [50, 60, 80, 90], "extreme": [80, 90, 100, 100] }} }},
        "rules": [ {{ "if": "depth is ideal", "then": "high" }} {extra_rules} ]
    }}"#
    );
    RuleBase::from_json_str(&json).unwrap()
}

fn score(engine: &InferenceEngine, depth: f64) -> Inference {
    engine.infer(&PixelVector::new().with(Covariate::Depth, depth)).unwrap()
}

#[test]
fn full_membership_returns_centroid_of_high() {
    let engine = InferenceEngine::new(depth_rule_base(""));
    let a = score(&engine, -50.0).score().unwrap();
    assert_abs_diff_eq!(a, 70.0, epsilon = 1e-9);
}

#[test]
fn half_membership_stays_inside_high_support() {
    let engine = InferenceEngine::new(depth_rule_base(""));
    let a = score(&engine, -50.0).score().unwrap();
    let b = score(&engine, -150.0).score().unwrap();
    // Clipping a symmetric trapezoid at 0.5 keeps it symmetric.
    assert!(b > 50.0 && b <= a + 1e-9, "b = {b}, a = {a}");
    assert_abs_diff_eq!(b, 70.0, epsilon = 1e-9);

    let x = engine.explain(&PixelVector::new().with(Covariate::Depth, -150.0)).unwrap();
    assert_abs_diff_eq!(x.rule_strengths[0], 0.5, epsilon = 1e-12);
    let peak = x.aggregate.iter().copied().fold(0.0, f64::max);
    assert_abs_diff_eq!(peak, 0.5, epsilon = 1e-12);
}

#[test]
fn half_membership_with_competing_rule_shifts_score_down() {
    let engine = InferenceEngine::new(depth_rule_base(r#", { "if": "depth is deep", "then": "medium" }"#));
    let a = score(&engine, -50.0).score().unwrap();
    let b = score(&engine, -150.0).score().unwrap();
    assert_abs_diff_eq!(a, 70.0, epsilon = 1e-9);
    assert!(b > 50.0 && b < a, "b = {b}, a = {a}");
    assert_abs_diff_eq!(b, 55.0, epsilon = 1e-9);
}

#[test]
fn nan_depth_writes_fill_value() {
    let engine = InferenceEngine::new(depth_rule_base(""));
    let depth = Raster::from_vec(1, 3, vec![-50.0, f64::NAN, -150.0]).unwrap();
    let bundle = RasterBundle::new().with(Covariate::Depth, depth);
    let run = GridProcessor::new(&engine, &bundle).unwrap().run();

    assert_eq!(run.output.raster.get(0, 1), MISSING_VALUE);
    assert_abs_diff_eq!(run.output.raster.get(0, 0), 70.0, epsilon = 1e-9);
    assert_eq!(run.stats.missing, 1);
    assert_eq!(run.stats.scored, 2);
}

#[test]
fn nan_writes_fill_value_for_every_built_in_rule_base() {
    for (species, season, rb) in catalog::all().unwrap() {
        let engine = InferenceEngine::new(rb);
        let bundle: RasterBundle = engine
            .rule_base()
            .used_parameters()
            .iter()
            .map(|&c| (c, Raster::new(2, 2, f64::NAN)))
            .collect();
        let run = GridProcessor::new(&engine, &bundle).unwrap().run();
        assert!(
            run.output.raster.data.iter().all(|&v| v == MISSING_VALUE),
            "{species} {season} scored a NaN pixel"
        );
        assert_eq!(run.stats.missing, 4);
    }
}

#[test]
fn mismatched_shapes_fail_before_any_pixel() {
    let engine = InferenceEngine::new(catalog::rule_base(Species::Anchovy, Season::Summer).unwrap());
    let bundle = RasterBundle::new()
        .with(Covariate::Sst, Raster::new(4, 4, 290.0))
        .with(Covariate::Sla, Raster::new(4, 4, 0.0))
        .with(Covariate::Depth, Raster::new(4, 5, -50.0));
    let err = GridProcessor::new(&engine, &bundle).err().unwrap();
    assert!(matches!(
        err,
        Error::ShapeMismatch { covariate: Covariate::Depth, rows: 4, cols: 4, found_rows: 4, found_cols: 5 }
    ));
}

#[test]
fn zero_aggregate_is_fill_not_nan() {
    let engine = InferenceEngine::new(depth_rule_base(""));
    assert_eq!(score(&engine, -4000.0), Inference::NoRuleFired);

    let bundle = RasterBundle::new().with(Covariate::Depth, Raster::new(2, 2, -4000.0));
    let run = GridProcessor::new(&engine, &bundle).unwrap().run();
    assert!(run.output.raster.data.iter().all(|&v| v == MISSING_VALUE));
    assert_eq!(run.stats.no_rule_fired, 4);
}

#[test]
fn grid_output_is_deterministic_and_in_range() {
    let rb = catalog::rule_base(Species::Sardine, Season::September).unwrap();
    let engine = InferenceEngine::new(rb);
    let (rows, cols) = (23, 17);
    let layer = |f: &dyn Fn(usize, usize) -> f64| {
        let mut r = Raster::new(rows, cols, 0.0);
        for i in 0..rows {
            for j in 0..cols {
                r.set(i, j, f(i, j));
            }
        }
        r
    };
    let bundle = RasterBundle::new()
        .with(Covariate::Sst, layer(&|i, _| 288.0 + i as f64 * 0.6))
        .with(Covariate::Sla, layer(&|_, j| -0.1 + j as f64 * 0.02))
        .with(Covariate::Chl, layer(&|i, j| 0.05 + (i * j) as f64 * 0.01))
        .with(Covariate::Depth, layer(&|i, j| -300.0 + (i + j) as f64 * 8.0));

    let first = GridProcessor::new(&engine, &bundle)
        .unwrap()
        .with_options(GridOptions { block_rows: 4, ..Default::default() })
        .run();
    let second = GridProcessor::new(&engine, &bundle).unwrap().run();

    assert_eq!(first.output, second.output);
    assert_eq!(first.stats.total(), rows * cols);
    for v in first.output.valid_values() {
        assert!((0.0..=100.0).contains(&v), "score {v} out of range");
    }
}
