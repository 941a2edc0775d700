//! Snapshot Comparison Example
//!
//! Loads two snapshots written by `asnhunt collect --snapshot` and prints
//! what changed between them.
//!
//! # Running
//!
//! ```bash
//! cargo run --example compare_snapshots -- old.json new.json
//! ```

use anyhow::anyhow;
use asnhunt::lens::compare::CompareLens;
use asnhunt::lens::snapshot::Snapshot;

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let (Some(baseline), Some(current)) = (args.next(), args.next()) else {
        return Err(anyhow!("usage: compare_snapshots <baseline.json> <current.json>"));
    };

    let baseline = Snapshot::from_json(&std::fs::read_to_string(baseline)?)?;
    let current = Snapshot::from_json(&std::fs::read_to_string(current)?)?;

    let result = CompareLens::new().compare(&baseline, &current);
    if result.is_unchanged() {
        println!("no changes");
        return Ok(());
    }

    for asn in &result.new_asns {
        println!("+ AS{}", asn);
    }
    for asn in &result.removed_asns {
        println!("- AS{}", asn);
    }
    for change in &result.changed {
        println!(
            "~ AS{} {}: +{} / -{} prefixes",
            change.asn,
            change.name,
            change.new_prefixes.len(),
            change.removed_prefixes.len()
        );
    }

    Ok(())
}
