use asnhunt::lens::utils::OutputFormat;
use asnhunt::HunterConfig;
use clap::Args;
use serde::Serialize;
use std::path::Path;

/// Arguments for the Config command
#[derive(Args)]
pub struct ConfigArgs {
    /// List the saved snapshots as well
    #[clap(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Serialize)]
struct ConfigInfo {
    config_file: String,
    data_dir: String,
    snapshot_dir: String,
    request_delay_secs: f64,
    request_timeout_secs: u64,
    whois_timeout_secs: u64,
    max_workers: usize,
    max_retries: u32,
    retry_backoff_secs: f64,
    rate_limit_wait_secs: u64,
    max_pages: u32,
    user_agent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    snapshots: Option<Vec<FileInfo>>,
}

#[derive(Debug, Serialize)]
struct FileInfo {
    name: String,
    size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    modified: Option<String>,
}

pub fn run(config: &HunterConfig, args: ConfigArgs, output_format: OutputFormat) {
    let ConfigArgs { verbose } = args;

    let snapshot_dir = config.snapshot_dir();
    let snapshots = if verbose {
        let mut files = Vec::new();
        if let Ok(entries) = std::fs::read_dir(&snapshot_dir) {
            for entry in entries.flatten() {
                if let Ok(metadata) = entry.metadata() {
                    if metadata.is_file() {
                        let modified = metadata.modified().ok().map(|t| {
                            let datetime: chrono::DateTime<chrono::Utc> = t.into();
                            datetime.format("%Y-%m-%d %H:%M:%S UTC").to_string()
                        });
                        files.push(FileInfo {
                            name: entry.file_name().to_string_lossy().to_string(),
                            size_bytes: metadata.len(),
                            modified,
                        });
                    }
                }
            }
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Some(files)
    } else {
        None
    };

    let info = ConfigInfo {
        config_file: HunterConfig::config_file_path(),
        data_dir: config.data_dir.clone(),
        snapshot_dir,
        request_delay_secs: config.request_delay_secs,
        request_timeout_secs: config.request_timeout_secs,
        whois_timeout_secs: config.whois_timeout_secs,
        max_workers: config.max_workers,
        max_retries: config.max_retries,
        retry_backoff_secs: config.retry_backoff_secs,
        rate_limit_wait_secs: config.rate_limit_wait_secs,
        max_pages: config.max_pages,
        user_agent: config.user_agent.clone(),
        snapshots,
    };

    match output_format {
        OutputFormat::Json => match serde_json::to_string(&info) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Error serializing config info: {}", e),
        },
        OutputFormat::JsonPretty => match serde_json::to_string_pretty(&info) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Error serializing config info: {}", e),
        },
        _ => print_config(config, &info),
    }
}

fn print_config(config: &HunterConfig, info: &ConfigInfo) {
    println!("asnhunt Configuration");
    println!("=====================\n");
    println!("Config file:        {}", info.config_file);
    println!(
        "Status:             {}",
        if Path::new(&info.config_file).exists() {
            "exists"
        } else {
            "not created"
        }
    );
    println!("{}", config.summary());

    if let Some(ref files) = info.snapshots {
        println!();
        println!("Snapshots:");
        if files.is_empty() {
            println!("  (none)");
        }
        for file in files {
            println!(
                "  {:<48} {:>10}  {}",
                file.name,
                file.size_bytes,
                file.modified.as_deref().unwrap_or("-")
            );
        }
    }

    eprintln!();
    eprintln!("Tips:");
    eprintln!("  Use --verbose (-v) to list saved snapshots");
    eprintln!("  Use --format json for machine-readable output");
    eprintln!("  Edit ~/.asnhunt/asnhunt.toml or set ASNHUNT_* variables to customize settings");
}
