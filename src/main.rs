use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use funding_summary::config::{init_tracing, Config};
use funding_summary::report::{format_euro, write_csv, write_xlsx_file};
use funding_summary::{
    CorrectionRequest, FundingWindow, ManualMatch, Month, Pipeline, PipelineOutcome, Table,
};

/// Exit code when the report still needs manual registry matches
const EXIT_NEEDS_CORRECTION: i32 = 2;

#[derive(Parser)]
#[command(name = "funding-summary", version, about = "Annual childcare funding summary")]
struct Cli {
    /// Funding year start (1 Aug YEAR .. 31 Jul YEAR+1); overrides FUNDING_YEAR
    #[arg(long, global = true)]
    year: Option<i32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the summary workbook
    Summarize {
        /// Funding allocation export (.csv or .xlsx)
        #[arg(long)]
        funding: PathBuf,

        /// CHICK claims-confirmation export
        #[arg(long)]
        claims: PathBuf,

        /// Children registry with Full Name / Child ID
        #[arg(long)]
        registry: Option<PathBuf>,

        /// JSON list of {"name", "id"} resolving unmatched registry names
        #[arg(long)]
        matches: Option<PathBuf>,

        /// Output path; .csv writes plain text, anything else .xlsx
        #[arg(long, default_value = "funding_data_summary.xlsx")]
        out: PathBuf,

        /// Where unmatched names are written as JSON (default: next to --out)
        #[arg(long)]
        corrections: Option<PathBuf>,
    },

    /// Print each child's term pattern and yearly total
    Inspect {
        #[arg(long)]
        funding: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    init_tracing();

    if cli.year.is_some() {
        config.funding_year = cli.year;
    }

    match cli.command {
        Command::Summarize {
            funding,
            claims,
            registry,
            matches,
            out,
            corrections,
        } => {
            let corrections = corrections.unwrap_or_else(|| corrections_path(&out));
            run_summarize(
                &config,
                &funding,
                &claims,
                registry.as_deref(),
                matches.as_deref(),
                &out,
                &corrections,
            )
        }
        Command::Inspect { funding } => run_inspect(&config, &funding),
    }
}

fn run_summarize(
    config: &Config,
    funding: &Path,
    claims: &Path,
    registry: Option<&Path>,
    matches: Option<&Path>,
    out: &Path,
    corrections: &Path,
) -> Result<()> {
    println!("📊 Funding Summary");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    print_window(config.funding_window());

    println!("\n📂 Loading inputs...");
    let funding = Table::from_path(funding)
        .with_context(|| format!("Failed to load funding file {}", funding.display()))?;
    let claims = Table::from_path(claims)
        .with_context(|| format!("Failed to load claims file {}", claims.display()))?;
    let registry = registry
        .map(|path| {
            Table::from_path(path)
                .with_context(|| format!("Failed to load registry file {}", path.display()))
        })
        .transpose()?;
    println!("✓ {} allocation rows, {} claim rows", funding.len(), claims.len());

    println!("\n🔧 Aggregating and reconciling...");
    let outcome = Pipeline::from_config(config).run(&funding, &claims, registry.as_ref())?;

    let table = match outcome {
        PipelineOutcome::Complete(table) => table,
        PipelineOutcome::NeedsCorrection { table, request } => match matches {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read matches file {}", path.display()))?;
                let manual: Vec<ManualMatch> =
                    serde_json::from_str(&text).context("Failed to parse matches JSON")?;
                println!("✓ Applying {} manual matches", manual.len());
                Pipeline::finalize(table, &manual)
            }
            None => {
                write_corrections(&request, corrections)?;
                println!("\n⚠️  {} names have no registry match.", request.unmatched.len());
                println!("   Request written to {}", corrections.display());
                println!("   Resolve them and re-run with --matches <file.json>");
                std::process::exit(EXIT_NEEDS_CORRECTION);
            }
        },
    };

    println!("\n💾 Writing {}...", out.display());
    let is_csv = out
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);
    if is_csv {
        std::fs::write(out, write_csv(&table)?)?;
    } else {
        write_xlsx_file(&table, Local::now().naive_local(), out)?;
    }

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!(
        "✅ {} children, total {}",
        table.rows.len(),
        format_euro(table.grand_total()?)
    );

    Ok(())
}

fn run_inspect(config: &Config, funding: &Path) -> Result<()> {
    print_window(config.funding_window());

    let funding = Table::from_path(funding)
        .with_context(|| format!("Failed to load funding file {}", funding.display()))?;
    let (summaries, stats) = Pipeline::from_config(config).summarize(&funding)?;

    println!("{}\n", stats.summary());
    println!("{:<30} {:<16} {:>12}  {}", "Child", "Pattern", "Total", "Months");
    for summary in &summaries {
        let months: Vec<&str> = Month::FUNDING_YEAR
            .iter()
            .filter(|month| summary.month_value(**month).is_some())
            .map(|month| month.label())
            .collect();
        println!(
            "{:<30} {:<16} {:>12}  {}",
            summary.name,
            summary.term_pattern_label,
            format_euro(summary.total_value),
            months.join(" ")
        );
    }

    Ok(())
}

fn print_window(window: Option<FundingWindow>) {
    match window {
        Some(window) => println!("Funding window: {}", window),
        None => println!("Funding window: none (all allocations kept)"),
    }
}

/// Default correction file: `report.xlsx` → `report.corrections.json`
fn corrections_path(out: &Path) -> PathBuf {
    out.with_extension("corrections.json")
}

fn write_corrections(request: &CorrectionRequest, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(request)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write correction request {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use funding_summary::RegistryRow;

    #[test]
    fn test_corrections_path_sits_next_to_report() {
        assert_eq!(
            corrections_path(Path::new("out/funding_data_summary.xlsx")),
            PathBuf::from("out/funding_data_summary.corrections.json")
        );
    }

    #[test]
    fn test_correction_request_file_is_plain_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.corrections.json");
        let request = CorrectionRequest {
            unmatched: vec!["Alice Byrne".to_string()],
            possible_matches: vec![RegistryRow {
                full_name: "Alice M. Byrne".to_string(),
                child_id: "1042".to_string(),
            }],
        };

        write_corrections(&request, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["unmatched"][0], "Alice Byrne");
        assert_eq!(value["possibleMatches"][0]["Child ID"], "1042");

        let parsed: CorrectionRequest = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, request);
    }
}
