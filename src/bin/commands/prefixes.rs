use crate::commands::{emit, format_for_path, progress_callback, render_collection, report_problems, save_snapshot};
use asnhunt::lens::collect::CollectLens;
use asnhunt::lens::utils::OutputFormat;
use asnhunt::sources::{CancelToken, HttpSession};
use asnhunt::{parse_asn, HunterConfig, OrganizationCandidate};
use clap::Args;
use std::sync::Arc;

/// Arguments for the Prefixes command
#[derive(Args)]
pub struct PrefixesArgs {
    /// ASNs to collect, with or without the AS prefix (e.g. 13335 AS15169)
    #[clap(required = true)]
    pub asns: Vec<String>,

    /// Collect one ASN at a time instead of using the worker pool
    #[clap(long)]
    pub sequential: bool,

    /// Write the result to a file; .json, .csv, .txt and .md pick the format
    #[clap(short, long)]
    pub output: Option<String>,

    /// Also save a JSON snapshot to the snapshot directory
    #[clap(long)]
    pub snapshot: bool,
}

pub fn run(config: &HunterConfig, args: PrefixesArgs, output_format: OutputFormat, cancel: CancelToken) {
    let PrefixesArgs {
        asns,
        sequential,
        output,
        snapshot,
    } = args;

    let mut selected = Vec::with_capacity(asns.len());
    for input in &asns {
        match parse_asn(input) {
            Ok(asn) => selected.push(OrganizationCandidate::from_asn(asn)),
            Err(e) => {
                eprintln!("ERROR: {}", e);
                std::process::exit(1);
            }
        }
    }

    let session = Arc::new(HttpSession::new(config));
    let lens = CollectLens::from_config(config, session, cancel);
    let (_pb, callback) = progress_callback(selected.len());
    let report = lens.collect_with_progress(&selected, !sequential, Some(callback));
    report_problems(&report);

    if snapshot {
        match save_snapshot(config, &report.collection, None) {
            Ok(path) => eprintln!("snapshot saved to {}", path),
            Err(e) => eprintln!("ERROR: unable to save snapshot: {}", e),
        }
    }

    let format = match &output {
        Some(path) => format_for_path(path, output_format),
        None => output_format,
    };
    match render_collection(&report.collection, None, format) {
        Ok(rendered) => emit(&rendered, output.as_deref()),
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    }
}
