pub mod collect;
pub mod compare;
pub mod config;
pub mod prefixes;
pub mod search;

use anyhow::Result;
use asnhunt::lens::collect::{AsnCollection, CollectProgress, CollectProgressCallback, CollectionReport};
use asnhunt::lens::snapshot::Snapshot;
use asnhunt::lens::stats::{AsnStats, CollectionStats};
use asnhunt::lens::utils::{format_count, truncate_name, OutputFormat, DEFAULT_NAME_MAX_LEN};
use asnhunt::{AddressFamily, HunterConfig};
use itertools::Itertools;
use std::sync::Arc;
use std::time::Duration;
use tabled::settings::Style;
use tabled::{Table, Tabled};

#[derive(Tabled)]
struct CollectionRow {
    asn: u32,
    name: String,
    country: String,
    ipv4: usize,
    ipv6: usize,
    ipv4_addresses: String,
    #[tabled(rename = "top v4 lengths")]
    top_ipv4_lengths: String,
}

/// Progress bar driven by collect progress events
pub(crate) fn progress_callback(total: usize) -> (indicatif::ProgressBar, CollectProgressCallback) {
    let pb = indicatif::ProgressBar::new(total as u64);
    if let Ok(sty) = indicatif::ProgressStyle::with_template(
        "[{elapsed_precise}] {bar:40.cyan/blue} {pos:>3}/{len:3} {msg}",
    ) {
        pb.set_style(sty.progress_chars("##-"));
    }
    pb.enable_steady_tick(Duration::from_millis(200));

    let bar = pb.clone();
    let callback: CollectProgressCallback = Arc::new(move |progress: CollectProgress| match progress {
        CollectProgress::AsnStarted { asn } => bar.set_message(format!("AS{}", asn)),
        CollectProgress::AsnFinished { done, .. } => bar.set_position(done as u64),
        CollectProgress::Completed { .. } => bar.finish_and_clear(),
        CollectProgress::Started { .. } => {}
    });
    (pb, callback)
}

/// Warnings about ASNs that produced nothing, printed to stderr
pub(crate) fn report_problems(report: &CollectionReport) {
    for asn in report.empty_asns() {
        eprintln!("WARNING: no data found for AS{} from any source", asn);
    }
    for (asn, reason) in report.failed() {
        eprintln!("WARNING: AS{} skipped: {}", asn, reason);
    }
    if report.cancelled {
        eprintln!(
            "WARNING: interrupted, {} ASN(s) not collected",
            report.skipped().len()
        );
    }
}

/// Render a finished collection in the requested format
pub(crate) fn render_collection(
    collection: &AsnCollection,
    keyword: Option<&str>,
    output_format: OutputFormat,
) -> Result<String> {
    let mut collection = collection.clone();
    collection.sort_by_asn();

    let rendered = match output_format {
        OutputFormat::Table | OutputFormat::Markdown => {
            let rows: Vec<CollectionRow> = collection
                .iter()
                .map(|set| {
                    let stats = AsnStats::of(set);
                    CollectionRow {
                        asn: set.asn(),
                        name: truncate_name(&set.org().name, DEFAULT_NAME_MAX_LEN),
                        country: set.org().country.clone().unwrap_or_default(),
                        ipv4: stats.ipv4_count,
                        ipv6: stats.ipv6_count,
                        ipv4_addresses: format_count(stats.total_ipv4_addresses),
                        top_ipv4_lengths: stats.prefix_lengths.describe(AddressFamily::IPv4, 3),
                    }
                })
                .collect();
            let style_table = match output_format {
                OutputFormat::Markdown => Table::new(rows).with(Style::markdown()).to_string(),
                _ => Table::new(rows).with(Style::rounded()).to_string(),
            };
            let stats = CollectionStats::of(&collection);
            let mut rendered = format!(
                "{}\n{} ASNs, {} IPv4 and {} IPv6 prefixes, {} IPv4 addresses",
                style_table,
                stats.total_asns,
                stats.total_ipv4_prefixes,
                stats.total_ipv6_prefixes,
                format_count(stats.total_ipv4_addresses)
            );
            for family in AddressFamily::ALL {
                let common = stats.prefix_lengths.describe(family, 5);
                if !common.is_empty() {
                    rendered.push_str(&format!("\nmost common {} lengths: {}", family, common));
                }
            }
            rendered
        }
        OutputFormat::Json => Snapshot::from_collection(&collection, keyword).to_json(false)?,
        OutputFormat::JsonPretty => Snapshot::from_collection(&collection, keyword).to_json(true)?,
        OutputFormat::Csv => collection_to_csv(&collection)?,
        OutputFormat::Txt => collection_to_txt(&collection, keyword),
    };
    Ok(rendered)
}

fn collection_to_csv(collection: &AsnCollection) -> Result<String> {
    let mut w = csv::Writer::from_writer(Vec::new());
    w.write_record([
        "ASN",
        "Name",
        "Description",
        "Country",
        "RIR",
        "IPv4_Count",
        "IPv6_Count",
        "Total_IPv4_IPs",
        "IPv4_Prefixes",
        "IPv6_Prefixes",
        "Sources",
    ])?;
    for set in collection.iter() {
        let org = set.org();
        let stats = AsnStats::of(set);
        w.write_record(&[
            set.asn().to_string(),
            org.name.clone(),
            org.description.clone(),
            org.country.clone().unwrap_or_default(),
            org.registry.map(|r| r.to_string()).unwrap_or_default(),
            stats.ipv4_count.to_string(),
            stats.ipv6_count.to_string(),
            stats.total_ipv4_addresses.to_string(),
            set.cidrs(AddressFamily::IPv4).join(";"),
            set.cidrs(AddressFamily::IPv6).join(";"),
            org.source_tags.iter().join(","),
        ])?;
    }
    let bytes = w.into_inner().map_err(|e| anyhow::anyhow!("{}", e))?;
    Ok(String::from_utf8(bytes)?)
}

fn collection_to_txt(collection: &AsnCollection, keyword: Option<&str>) -> String {
    let mut lines = Vec::new();
    if let Some(keyword) = keyword {
        lines.push(format!("# Prefixes for '{}'", keyword));
    }
    lines.push(format!(
        "# Generated {}",
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    ));
    for set in collection.iter() {
        let org = set.org();
        lines.push(String::new());
        lines.push(format!("# AS{} - {}", set.asn(), org.name));
        if !org.description.is_empty() {
            lines.push(format!("# Organization: {}", org.description));
        }
        lines.push(format!(
            "# Country: {} | RIR: {}",
            org.country.as_deref().unwrap_or("N/A"),
            org.registry.map(|r| r.to_string()).unwrap_or_else(|| "N/A".to_string())
        ));
        for family in AddressFamily::ALL {
            let cidrs = set.cidrs(family);
            if cidrs.is_empty() {
                continue;
            }
            lines.push(format!("## {} ({})", family, cidrs.len()));
            lines.extend(cidrs.into_iter().map(|c| c.to_string()));
        }
    }
    lines.join("\n")
}

/// Print the rendering, or write it to `path` and say so on stderr
pub(crate) fn emit(rendered: &str, path: Option<&str>) {
    match path {
        Some(path) => match std::fs::write(path, format!("{}\n", rendered)) {
            Ok(()) => eprintln!("results written to {}", path),
            Err(e) => {
                eprintln!("ERROR: unable to write {}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => println!("{}", rendered),
    }
}

/// Format implied by an output file extension, if any
pub(crate) fn format_for_path(path: &str, fallback: OutputFormat) -> OutputFormat {
    let extension = std::path::Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());
    match extension.as_deref() {
        Some("json") if fallback == OutputFormat::Json => OutputFormat::Json,
        Some("json") => OutputFormat::JsonPretty,
        Some("csv") => OutputFormat::Csv,
        Some("txt") => OutputFormat::Txt,
        Some("md") => OutputFormat::Markdown,
        _ => fallback,
    }
}

/// Save a JSON snapshot under the configured snapshot directory
pub(crate) fn save_snapshot(
    config: &HunterConfig,
    collection: &AsnCollection,
    keyword: Option<&str>,
) -> Result<String> {
    let dir = config.snapshot_dir();
    std::fs::create_dir_all(&dir)?;

    let label: String = keyword
        .unwrap_or("asns")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    let path = format!(
        "{}/{}_{}.json",
        dir,
        label,
        chrono::Utc::now().format("%Y%m%d_%H%M%S")
    );
    let json = Snapshot::from_collection(collection, keyword).to_json(true)?;
    std::fs::write(&path, json)?;
    Ok(path)
}
