use asnhunt::lens::resolve::ResolveLens;
use asnhunt::lens::utils::{truncate_name, OutputFormat, DEFAULT_NAME_MAX_LEN};
use asnhunt::sources::{CancelToken, HttpSession};
use asnhunt::{HunterConfig, OrganizationCandidate};
use clap::Args;
use itertools::Itertools;
use serde::Serialize;
use std::sync::Arc;
use tabled::settings::Style;
use tabled::{Table, Tabled};

/// Arguments for the Search command
#[derive(Args)]
pub struct SearchArgs {
    /// Organization keyword; separate several keywords with commas
    #[clap(required = true)]
    pub keyword: String,

    /// Query the search sources one after another
    #[clap(long)]
    pub sequential: bool,

    /// Show untruncated names
    #[clap(long)]
    pub full_names: bool,
}

/// One numbered line of the candidate list
#[derive(Debug, Serialize, Tabled)]
pub(crate) struct CandidateRow {
    #[tabled(rename = "#")]
    pub index: usize,
    pub asn: u32,
    pub name: String,
    pub country: String,
    pub rir: String,
    #[tabled(rename = "v4/v6 hint")]
    pub hint: String,
    pub sources: String,
}

pub(crate) fn candidate_rows(candidates: &[OrganizationCandidate], full_names: bool) -> Vec<CandidateRow> {
    candidates
        .iter()
        .enumerate()
        .map(|(i, c)| CandidateRow {
            index: i + 1,
            asn: c.asn,
            name: if full_names {
                c.name.clone()
            } else {
                truncate_name(&c.name, DEFAULT_NAME_MAX_LEN)
            },
            country: c.country.clone().unwrap_or_default(),
            rir: c.registry.map(|r| r.to_string()).unwrap_or_default(),
            hint: if c.expected_prefix_counts.is_empty() {
                String::new()
            } else {
                format!(
                    "{}/{}",
                    c.expected_prefix_counts.ipv4, c.expected_prefix_counts.ipv6
                )
            },
            sources: c.source_tags.iter().join(","),
        })
        .collect()
}

pub(crate) fn print_candidates(candidates: &[OrganizationCandidate], full_names: bool, output_format: OutputFormat) {
    match output_format {
        OutputFormat::Json => match serde_json::to_string(candidates) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("ERROR: Failed to serialize to JSON: {}", e),
        },
        OutputFormat::JsonPretty => match serde_json::to_string_pretty(candidates) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("ERROR: Failed to serialize to JSON: {}", e),
        },
        OutputFormat::Markdown => {
            let rows = candidate_rows(candidates, full_names);
            println!("{}", Table::new(rows).with(Style::markdown()));
        }
        OutputFormat::Csv => match candidates_to_csv(&candidate_rows(candidates, true)) {
            Ok(text) => print!("{}", text),
            Err(e) => eprintln!("ERROR: Failed to write CSV: {}", e),
        },
        OutputFormat::Txt => {
            for c in candidates {
                println!("AS{}\t{}", c.asn, c.name);
            }
        }
        OutputFormat::Table => {
            let rows = candidate_rows(candidates, full_names);
            println!("{}", Table::new(rows).with(Style::rounded()));
        }
    }
}

fn candidates_to_csv(rows: &[CandidateRow]) -> anyhow::Result<String> {
    let mut w = csv::Writer::from_writer(Vec::new());
    for row in rows {
        w.serialize(row)?;
    }
    let bytes = w.into_inner().map_err(|e| anyhow::anyhow!("{}", e))?;
    Ok(String::from_utf8(bytes)?)
}

pub fn run(config: &HunterConfig, args: SearchArgs, output_format: OutputFormat, cancel: CancelToken) {
    let SearchArgs {
        keyword,
        sequential,
        full_names,
    } = args;

    let session = Arc::new(HttpSession::new(config));
    let lens = ResolveLens::from_config(config, session, cancel).with_parallel(!sequential);

    let outcome = match lens.resolve_with_report(&keyword) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };

    for report in outcome.reports.iter().filter(|r| !r.success) {
        if let Some(error) = report.error {
            eprintln!(
                "WARNING: {} search for '{}' failed ({})",
                report.source, report.keyword, error
            );
        }
    }

    if outcome.candidates.is_empty() {
        eprintln!("no organizations found for '{}'", keyword);
        return;
    }

    print_candidates(&outcome.candidates, full_names, output_format);
}
