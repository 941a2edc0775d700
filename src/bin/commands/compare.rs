use asnhunt::lens::compare::{CompareLens, ComparisonResult};
use asnhunt::lens::snapshot::Snapshot;
use asnhunt::lens::utils::OutputFormat;
use clap::Args;
use std::path::PathBuf;
use tabled::settings::Style;
use tabled::Table;

/// Arguments for the Compare command
#[derive(Args)]
pub struct CompareArgs {
    /// Older snapshot file
    #[clap(required = true)]
    pub baseline: PathBuf,

    /// Newer snapshot file
    #[clap(required = true)]
    pub current: PathBuf,
}

fn load(path: &PathBuf) -> Snapshot {
    let loaded = std::fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|text| Snapshot::from_json(&text).map_err(|e| e.to_string()));
    match loaded {
        Ok(snapshot) => snapshot,
        Err(e) => {
            eprintln!("ERROR: unable to load {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}

pub fn run(args: CompareArgs, output_format: OutputFormat) {
    let baseline = load(&args.baseline);
    let current = load(&args.current);

    let result = CompareLens::new().compare(&baseline, &current);

    match output_format {
        OutputFormat::Json => match serde_json::to_string(&result) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("ERROR: Failed to serialize to JSON: {}", e),
        },
        OutputFormat::JsonPretty => match serde_json::to_string_pretty(&result) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("ERROR: Failed to serialize to JSON: {}", e),
        },
        OutputFormat::Csv => match rows_to_csv(&result) {
            Ok(text) => print!("{}", text),
            Err(e) => eprintln!("ERROR: Failed to write CSV: {}", e),
        },
        OutputFormat::Txt => {
            for row in result.rows() {
                println!("{}\tAS{}\t{}", row.change, row.asn, row.prefix);
            }
        }
        OutputFormat::Table | OutputFormat::Markdown => print_summary(&result, output_format),
    }
}

fn rows_to_csv(result: &ComparisonResult) -> anyhow::Result<String> {
    let mut w = csv::Writer::from_writer(Vec::new());
    for row in result.rows() {
        w.serialize(row)?;
    }
    let bytes = w.into_inner().map_err(|e| anyhow::anyhow!("{}", e))?;
    Ok(String::from_utf8(bytes)?)
}

fn print_summary(result: &ComparisonResult, output_format: OutputFormat) {
    println!(
        "Baseline: {}  Current: {}",
        result.baseline_timestamp, result.current_timestamp
    );
    println!("  New ASNs:         {}", result.new_asns.len());
    println!("  Removed ASNs:     {}", result.removed_asns.len());
    println!("  Changed ASNs:     {}", result.changed.len());
    println!("  New prefixes:     {}", result.total_new_prefixes());
    println!("  Removed prefixes: {}", result.total_removed_prefixes());

    if result.is_unchanged() {
        println!("\nno changes");
        return;
    }

    println!();
    let mut table = Table::new(result.rows());
    match output_format {
        OutputFormat::Markdown => println!("{}", table.with(Style::markdown())),
        _ => println!("{}", table.with(Style::rounded())),
    }
}
