//! Report how far the insurer and metal tier target tables disagree
//!
//! Usage: check_margins <county_insurer.csv> <county_metal.csv> [--json]

use anyhow::{Context, Result};
use clap::Parser;
use rating_area_ipf::inputs::{load_insurer_targets_from_reader, load_metal_targets_from_reader};
use rating_area_ipf::validation::check_margin_consistency;
use std::fs::File;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "check_margins", version, about = "Margin consistency report")]
struct Cli {
    county_insurer: PathBuf,
    county_metal: PathBuf,
    #[arg(long, help = "Output machine-readable JSON")]
    json: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let file = File::open(&cli.county_insurer)
        .with_context(|| format!("failed to open {}", cli.county_insurer.display()))?;
    let (insurer, _) = load_insurer_targets_from_reader(file)?;

    let file = File::open(&cli.county_metal)
        .with_context(|| format!("failed to open {}", cli.county_metal.display()))?;
    let (metal, _) = load_metal_targets_from_reader(file)?;

    let report = check_margin_consistency(&insurer, &metal);

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "County-year combos with >1% margin inconsistency: {} / {}",
        report.inconsistent_county_years, report.county_years
    );
    for y in &report.per_year {
        println!(
            "  Year {}: insurer total={:.0}, metal total={:.0}, diff={:.1}%",
            y.year, y.insurer_total, y.metal_total, y.diff_pct
        );
    }
    Ok(())
}
