//! Prefix Collection Example
//!
//! Resolves an organization keyword, collects the first two candidates'
//! prefixes with progress reporting, and prints a per-ASN summary.
//!
//! # Running
//!
//! ```bash
//! cargo run --example collect_lens -- cloudflare
//! ```

use asnhunt::lens::collect::{CollectLens, CollectProgress, CollectProgressCallback};
use asnhunt::lens::resolve::ResolveLens;
use asnhunt::lens::select::apply_selection;
use asnhunt::lens::stats::CollectionStats;
use asnhunt::sources::{CancelToken, HttpSession};
use asnhunt::HunterConfig;
use std::sync::Arc;

fn main() -> anyhow::Result<()> {
    let keyword = std::env::args().nth(1).unwrap_or_else(|| "cloudflare".to_string());

    let config = HunterConfig::default();
    let session = Arc::new(HttpSession::new(&config));
    let cancel = CancelToken::new();

    let candidates = ResolveLens::from_config(&config, session.clone(), cancel.clone())
        .resolve(&keyword)?;
    println!("{} candidate ASNs for '{}'", candidates.len(), keyword);
    for (i, c) in candidates.iter().enumerate().take(10) {
        println!("  {:>2}. AS{:<8} {}", i + 1, c.asn, c.name);
    }

    let selected = apply_selection(&candidates, "1-2");
    if selected.is_empty() {
        return Ok(());
    }

    let callback: CollectProgressCallback = Arc::new(|progress: CollectProgress| {
        if let CollectProgress::AsnFinished { asn, state, done, total } = progress {
            eprintln!("[{}/{}] AS{}: {:?}", done, total, asn, state);
        }
    });

    let report = CollectLens::from_config(&config, session, cancel)
        .collect_with_progress(&selected, true, Some(callback));

    let mut collection = report.collection;
    collection.sort_by_asn();
    for set in collection.iter() {
        println!(
            "AS{} ({}): {} IPv4, {} IPv6",
            set.asn(),
            set.org().name,
            set.ipv4().len(),
            set.ipv6().len()
        );
    }

    let stats = CollectionStats::of(&collection);
    println!(
        "\n{} prefixes, {} IPv4 addresses",
        stats.total_prefixes, stats.total_ipv4_addresses
    );

    Ok(())
}
