use crate::commands::search::print_candidates;
use crate::commands::{emit, format_for_path, progress_callback, render_collection, report_problems, save_snapshot};
use asnhunt::lens::collect::CollectLens;
use asnhunt::lens::resolve::ResolveLens;
use asnhunt::lens::select::apply_selection;
use asnhunt::lens::utils::OutputFormat;
use asnhunt::sources::{CancelToken, HttpSession};
use asnhunt::HunterConfig;
use clap::Args;
use std::sync::Arc;

/// Arguments for the Collect command
#[derive(Args)]
pub struct CollectArgs {
    /// Organization keyword; separate several keywords with commas
    #[clap(required = true)]
    pub keyword: String,

    /// Candidates to collect, by list number: "all", "1,3", "2-4".
    /// Without it the candidate list is printed and nothing is collected.
    #[clap(short, long)]
    pub select: Option<String>,

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

pub fn run(config: &HunterConfig, args: CollectArgs, output_format: OutputFormat, cancel: CancelToken) {
    let CollectArgs {
        keyword,
        select,
        sequential,
        output,
        snapshot,
    } = args;

    let session = Arc::new(HttpSession::new(config));
    let resolver = ResolveLens::from_config(config, session.clone(), cancel.clone())
        .with_parallel(!sequential);

    let candidates = match resolver.resolve(&keyword) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };
    if candidates.is_empty() {
        eprintln!("no organizations found for '{}'", keyword);
        return;
    }

    let Some(selection) = select else {
        print_candidates(&candidates, false, OutputFormat::Table);
        eprintln!("re-run with --select (e.g. --select all, --select 1,3) to collect prefixes");
        return;
    };

    let selected = apply_selection(&candidates, &selection);
    if selected.is_empty() {
        eprintln!("no ASNs selected, nothing to collect");
        return;
    }
    eprintln!("collecting prefixes for {} ASN(s)...", selected.len());

    let lens = CollectLens::from_config(config, session, cancel);
    let (_pb, callback) = progress_callback(selected.len());
    let report = lens.collect_with_progress(&selected, !sequential, Some(callback));
    report_problems(&report);

    if snapshot {
        match save_snapshot(config, &report.collection, Some(&keyword)) {
            Ok(path) => eprintln!("snapshot saved to {}", path),
            Err(e) => eprintln!("ERROR: unable to save snapshot: {}", e),
        }
    }

    let format = match &output {
        Some(path) => format_for_path(path, output_format),
        None => output_format,
    };
    match render_collection(&report.collection, Some(&keyword), format) {
        Ok(rendered) => emit(&rendered, output.as_deref()),
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    }
}
