//! Rating-area IPF CLI
//!
//! Loads the base, target and crosswalk tables, allocates every year, runs the
//! validation checks and writes enrollment_allocated.csv

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use rating_area_ipf::config::{InputPaths, DEFAULT_INPUT_DIR, DEFAULT_OUTPUT_FILE};
use rating_area_ipf::inputs::load_inputs;
use rating_area_ipf::output::{sort_rows, write_allocated_csv, OutputSummary};
use rating_area_ipf::validation::{check_margin_consistency, validate, RelativeDiffStats};
use rating_area_ipf::{AllocatedRow, AllocationRunner, IpfConfig};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(
    name = "rating_area_ipf",
    version,
    about = "Allocate rating-area plan enrollment to counties by iterative proportional fitting"
)]
struct Cli {
    #[arg(long, default_value = DEFAULT_INPUT_DIR, help = "Directory holding the four input CSVs")]
    input_dir: PathBuf,
    #[arg(long, help = "Base table (defaults to <input-dir>/base.csv)")]
    base: Option<PathBuf>,
    #[arg(long, help = "Insurer x county targets (defaults to <input-dir>/county_insurer.csv)")]
    county_insurer: Option<PathBuf>,
    #[arg(long, help = "Metal tier x county targets (defaults to <input-dir>/county_metal.csv)")]
    county_metal: Option<PathBuf>,
    #[arg(long, help = "County to rating area crosswalk (defaults to <input-dir>/crosswalk.csv)")]
    crosswalk: Option<PathBuf>,
    #[arg(long, short, default_value = DEFAULT_OUTPUT_FILE)]
    output: PathBuf,
    #[arg(long, default_value_t = IpfConfig::default().max_iterations)]
    max_iterations: u32,
    #[arg(long, default_value_t = IpfConfig::default().tolerance)]
    tolerance: f64,
    #[arg(long, help = "Round estimates to this many decimals when writing")]
    decimals: Option<u32>,
    #[arg(long, help = "Print a machine-readable run summary")]
    json: bool,
}

impl Cli {
    fn input_paths(&self) -> InputPaths {
        let defaults = InputPaths::in_dir(&self.input_dir);
        InputPaths {
            base: self.base.clone().unwrap_or(defaults.base),
            county_insurer: self.county_insurer.clone().unwrap_or(defaults.county_insurer),
            county_metal: self.county_metal.clone().unwrap_or(defaults.county_metal),
            crosswalk: self.crosswalk.clone().unwrap_or(defaults.crosswalk),
        }
    }
}

#[derive(Serialize)]
struct RunSummary<'a> {
    output: String,
    summary: &'a OutputSummary,
    years: &'a rating_area_ipf::RunReport,
    validation: &'a rating_area_ipf::validation::ValidationReport,
    execution_time_ms: u64,
}

fn print_stats(label: &str, stats: &Option<RelativeDiffStats>, note: &str) {
    match stats {
        Some(s) => {
            println!(
                "{}: max relative diff = {:.6}, median = {:.6} ({} compared)",
                label, s.max, s.median, s.compared
            );
            println!("  {:.1}% within 1%, {:.1}% within 5%", s.within_1pct, s.within_5pct);
            println!("  {}", if s.passes() { "PASS" } else { note });
        }
        None => println!("{}: no positive targets to compare", label),
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let start = Instant::now();
    let paths = cli.input_paths();

    println!("{}", "=".repeat(60));
    println!("LOADING DATA");
    println!("{}", "=".repeat(60));
    let tables = load_inputs(&paths).context("failed to load input tables")?;
    println!("Base rows:               {:>8}", tables.base.len());
    println!("Insurer x county targets:{:>8}", tables.insurer_targets.len());
    println!("Metal x county targets:  {:>8}", tables.metal_targets.len());
    println!("Crosswalk rows:          {:>8}", tables.crosswalk.len());

    println!("\n{}", "=".repeat(60));
    println!("MARGIN CONSISTENCY CHECK");
    println!("{}", "=".repeat(60));
    let consistency = check_margin_consistency(&tables.insurer_targets, &tables.metal_targets);
    println!(
        "County-year combos with >1% margin inconsistency: {} / {}",
        consistency.inconsistent_county_years, consistency.county_years
    );
    if !consistency.is_consistent() {
        println!("NOTE: insurer and metal tier totals disagree; the metal tier margin is");
        println!("      matched exactly and the insurer margin approximately.");
    }
    for y in &consistency.per_year {
        println!(
            "  Year {}: insurer total={:.0}, metal total={:.0}, diff={:.1}%",
            y.year, y.insurer_total, y.metal_total, y.diff_pct
        );
    }

    println!("\n{}", "=".repeat(60));
    println!("ALLOCATION");
    println!("{}", "=".repeat(60));
    let config = IpfConfig {
        max_iterations: cli.max_iterations,
        tolerance: cli.tolerance,
    };
    let report = AllocationRunner::new(config).run(&tables);

    for year in &report.years {
        println!(
            "  Year {}: {:?} after {} iterations, max relative change = {:.6}, total = {:.1}",
            year.year,
            year.status,
            year.iterations,
            year.final_max_change,
            year.total()
        );
        for diagnostic in &year.diagnostics {
            println!("    warning: {}", diagnostic);
        }
    }
    for failure in &report.failures {
        println!("  Year {}: FAILED ({}) {}", failure.year, failure.kind, failure.message);
    }

    let mut rows: Vec<AllocatedRow> = report.rows().cloned().collect();
    sort_rows(&mut rows);

    println!("\n{}", "=".repeat(60));
    println!("VALIDATION CHECKS");
    println!("{}", "=".repeat(60));
    let validation = validate(&rows, &tables.base, &tables.insurer_targets, &tables.metal_targets);
    print_stats(
        "Check 1 (Insurer x County)",
        &validation.insurer_county,
        "NOTE: differences due to inconsistent margins between control files",
    );
    print_stats("Check 2 (Metal x County)", &validation.metal_county, "FAIL");
    print_stats(
        "Check 3 (Rating Area totals)",
        &validation.rating_area,
        "NOTE: rating area totals shift during IPF when margins conflict",
    );
    println!(
        "Check 4 (No negatives): {} ({} negative values)",
        if validation.negative_estimates == 0 { "PASS" } else { "FAIL" },
        validation.negative_estimates
    );

    write_allocated_csv(&cli.output, &rows, cli.decimals)
        .map_err(|e| anyhow!("failed to write {}: {}", cli.output.display(), e))?;

    let summary = OutputSummary::from_rows(&rows);
    if cli.json {
        let run_summary = RunSummary {
            output: cli.output.display().to_string(),
            summary: &summary,
            years: &report,
            validation: &validation,
            execution_time_ms: start.elapsed().as_millis() as u64,
        };
        println!("{}", serde_json::to_string_pretty(&run_summary)?);
    } else {
        println!("\nSaved {} ({} rows)", cli.output.display(), summary.rows);
        println!("\nTotal enrollment by year:");
        for (year, total) in &summary.total_by_year {
            println!("  {}: {:.1}", year, total);
        }
        println!("Unique counties: {}", summary.counties);
        println!("Unique insurers: {}", summary.insurers);
        println!("Unique plans: {}", summary.plans);
        println!("Unique metal tiers: {}", summary.metal_tiers);
        if let Some((first, last)) = summary.year_range {
            println!("Year range: {} - {}", first, last);
        }
        println!("\nTotal time: {:?}", start.elapsed());
    }

    if !report.failures.is_empty() {
        bail!("{} year(s) could not be allocated", report.failures.len());
    }
    Ok(())
}
