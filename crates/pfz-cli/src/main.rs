//! Command-line front end for the fishing-zone suitability engine.
//! Reads JSON raster bundles, writes JSON suitability maps.

mod bundle;

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use pfz_core::catalog::{self, Season, Species};
use pfz_core::surface::{control_surface, Axis};
use pfz_core::{
    CancelToken, Covariate, GridOptions, GridProcessor, InferenceEngine, InferenceOptions, PixelVector, RuleBase,
    MISSING_VALUE,
};
use serde::Serialize;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pfz", about = "Fuzzy-logic potential fishing zone scoring")]
struct Args {
    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Score every pixel of a raster bundle.
    Run {
        #[command(flatten)]
        rules: RuleSource,

        /// Raster bundle JSON.
        #[arg(short, long)]
        input: PathBuf,

        /// Output path; stdout if omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Value written where a pixel cannot be scored.
        #[arg(long, default_value_t = MISSING_VALUE, allow_hyphen_values = true)]
        fill: f64,

        /// Rows per work unit.
        #[arg(long, default_value_t = 16)]
        block_rows: usize,

        /// Fuzzify inputs as given, without clamping them into each universe.
        #[arg(long)]
        no_clip: bool,

        #[arg(long)]
        pretty: bool,
    },

    /// Validate rule-base documents (all built-ins if no paths are given).
    Check { paths: Vec<PathBuf> },

    /// List built-in rule bases.
    List,

    /// Sweep two covariates and print the score surface.
    Surface {
        #[command(flatten)]
        rules: RuleSource,

        /// Covariate on the x axis.
        #[arg(short = 'x', long)]
        x_axis: Covariate,

        /// Covariate on the y axis.
        #[arg(short = 'y', long)]
        y_axis: Covariate,

        /// Samples per axis.
        #[arg(long, default_value_t = 50)]
        steps: usize,

        /// Fixed inputs for the remaining covariates, e.g. `chl=0.8`.
        #[arg(long = "fix", value_parser = parse_assignment, allow_hyphen_values = true)]
        fixed: Vec<(Covariate, f64)>,

        #[arg(long)]
        pretty: bool,
    },

    /// Show memberships, rule strengths and the score for one input vector.
    Explain {
        #[command(flatten)]
        rules: RuleSource,

        /// Inputs such as `sst=291.5 depth=-40`.
        #[arg(value_parser = parse_assignment, allow_hyphen_values = true, required = true)]
        values: Vec<(Covariate, f64)>,

        /// Emit JSON instead of text.
        #[arg(long)]
        json: bool,
    },
}

/// A built-in (species, season) or a rule-base file.
#[derive(ClapArgs, Debug)]
struct RuleSource {
    #[arg(long, conflicts_with = "rules", requires = "season")]
    species: Option<Species>,

    #[arg(long, conflicts_with = "rules", requires = "species")]
    season: Option<Season>,

    /// Rule-base JSON document.
    #[arg(long)]
    rules: Option<PathBuf>,
}

impl RuleSource {
    fn load(&self) -> Result<RuleBase> {
        match (&self.rules, self.species, self.season) {
            (Some(path), _, _) => {
                RuleBase::from_path(path).with_context(|| format!("loading {}", path.display()))
            }
            (None, Some(species), Some(season)) => catalog::rule_base(species, season)
                .with_context(|| format!("built-in rule base {species}/{season}")),
            _ => bail!("specify --rules <FILE> or both --species and --season"),
        }
    }
}

fn parse_assignment(s: &str) -> std::result::Result<(Covariate, f64), String> {
    let (name, value) = s.split_once('=').ok_or_else(|| format!("expected NAME=VALUE, got '{s}'"))?;
    let covariate = name.parse::<Covariate>().map_err(|e| e.to_string())?;
    let value = value.trim().parse::<f64>().map_err(|e| format!("'{value}': {e}"))?;
    Ok((covariate, value))
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).init();
}

fn write_json<T: Serialize>(value: &T, output: Option<&Path>, pretty: bool) -> Result<()> {
    let writer: Box<dyn Write> = match output {
        Some(path) => Box::new(File::create(path).with_context(|| format!("cannot create {}", path.display()))?),
        None => Box::new(io::stdout().lock()),
    };
    let mut writer = BufWriter::new(writer);
    if pretty {
        serde_json::to_writer_pretty(&mut writer, value)?;
    } else {
        serde_json::to_writer(&mut writer, value)?;
    }
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

// ── Subcommands ──────────────────────────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
fn run(
    rules: &RuleSource,
    input: &Path,
    output: Option<&Path>,
    fill: f64,
    block_rows: usize,
    no_clip: bool,
    pretty: bool,
) -> Result<()> {
    let rb = rules.load()?;
    let engine = InferenceEngine::with_options(rb, InferenceOptions { clip_to_universe: !no_clip });
    let bundle = bundle::load(input)?;

    let unused: Vec<_> = bundle
        .covariates()
        .filter(|c| !engine.rule_base().used_parameters().contains(c))
        .collect();
    if !unused.is_empty() {
        warn!(?unused, "layers not referenced by any rule are ignored");
    }

    let processor = GridProcessor::new(&engine, &bundle)
        .context("raster bundle does not fit the rule base")?
        .with_options(GridOptions { fill_value: fill, block_rows });
    let result = processor.run_with(
        |done, total| debug!(done, total, "rows scored"),
        &CancelToken::new(),
    );

    info!(
        scored = result.stats.scored,
        missing = result.stats.missing,
        no_rule_fired = result.stats.no_rule_fired,
        "scored {} pixels",
        result.stats.total()
    );
    write_json(&result.output, output, pretty)
}

fn check(paths: &[PathBuf]) -> Result<()> {
    if paths.is_empty() {
        for (species, season, rb) in catalog::all().context("built-in catalog is invalid")? {
            println!("ok  {species}/{season}: {} rules", rb.rules().len());
        }
        return Ok(());
    }
    let mut failed = 0;
    for path in paths {
        match RuleBase::from_path(path) {
            Ok(rb) => println!("ok  {}: {}/{}, {} rules", path.display(), rb.species(), rb.season(), rb.rules().len()),
            Err(e) => {
                failed += 1;
                println!("ERR {}: {e}", path.display());
            }
        }
    }
    if failed > 0 {
        bail!("{failed} of {} rule bases invalid", paths.len());
    }
    Ok(())
}

fn list() -> Result<()> {
    for species in Species::ALL {
        for &season in species.seasons() {
            let rb = catalog::rule_base(species, season)?;
            let used: Vec<_> = rb.used_parameters().iter().map(|c| c.name()).collect();
            println!(
                "{species:<8} {:<13} {:<13} rules={:<3} inputs={}",
                season.name(),
                season.label(),
                rb.rules().len(),
                used.join(",")
            );
        }
    }
    Ok(())
}

fn surface(
    rules: &RuleSource,
    x: Covariate,
    y: Covariate,
    steps: usize,
    fixed: &[(Covariate, f64)],
    pretty: bool,
) -> Result<()> {
    let engine = InferenceEngine::new(rules.load()?);
    let x_axis = Axis::over_universe(&engine, x, steps)
        .with_context(|| format!("'{x}' is not an antecedent of this rule base"))?;
    let y_axis = Axis::over_universe(&engine, y, steps)
        .with_context(|| format!("'{y}' is not an antecedent of this rule base"))?;
    let fixed: PixelVector = fixed.iter().copied().collect();
    let s = control_surface(&engine, x_axis, y_axis, &fixed, MISSING_VALUE)?;
    if let (Some(lo), Some(hi)) = (s.min, s.max) {
        info!(min = lo, max = hi, "surface range");
    } else {
        warn!("no rule fired anywhere on the surface");
    }
    write_json(&s, None, pretty)
}

fn explain(rules: &RuleSource, values: &[(Covariate, f64)], json: bool) -> Result<()> {
    let engine = InferenceEngine::new(rules.load()?);
    let inputs: PixelVector = values.iter().copied().collect();
    if inputs.has_missing() {
        warn!("NaN input: a grid run writes the fill value for this pixel");
    }
    let x = engine.explain(&inputs)?;
    if json {
        return write_json(&x, None, true);
    }

    let rb = engine.rule_base();
    println!("{} / {}", rb.species(), rb.season());
    for m in &x.memberships {
        let terms: Vec<_> = m.terms.iter().map(|(t, d)| format!("{t}={d:.3}")).collect();
        let input = format!("{:.4} {}", m.input, m.covariate.units());
        println!("  {:<6} {:>16}  {}", m.covariate.name(), input, terms.join("  "));
    }
    for (rule, s) in rb.rules().iter().zip(&x.rule_strengths) {
        println!("  [{s:.3}] {rule}");
    }
    match x.inference.score() {
        Some(score) => println!("score: {score:.2} %"),
        None => println!("score: none (no rule fired)"),
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    match &args.command {
        Command::Run { rules, input, output, fill, block_rows, no_clip, pretty } => {
            run(rules, input, output.as_deref(), *fill, *block_rows, *no_clip, *pretty)
        }
        Command::Check { paths } => check(paths),
        Command::List => list(),
        Command::Surface { rules, x_axis, y_axis, steps, fixed, pretty } => {
            surface(rules, *x_axis, *y_axis, *steps, fixed, *pretty)
        }
        Command::Explain { rules, values, json } => explain(rules, values, *json),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_assignments() {
        assert_eq!(parse_assignment("sst=291.5").unwrap(), (Covariate::Sst, 291.5));
        assert_eq!(parse_assignment("Depth=-40").unwrap(), (Covariate::Depth, -40.0));
        assert!(parse_assignment("sst").is_err());
        assert!(parse_assignment("salinity=35").is_err());
        assert!(parse_assignment("chl=lots").is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn rule_source_requires_a_choice() {
        let none = RuleSource { species: None, season: None, rules: None };
        assert!(none.load().is_err());
        let builtin = RuleSource { species: Some(Species::Sardine), season: Some(Season::June), rules: None };
        assert_eq!(builtin.load().unwrap().season(), "june");
    }
}
