use anyhow::{anyhow, Result};
use config::Config;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub struct HunterConfig {
    /// Path to the directory where snapshots and exports are written
    pub data_dir: String,

    /// Base delay before each outbound HTTP request (default: 1 second)
    pub request_delay_secs: f64,

    /// Global timeout for one HTTP request (default: 20 seconds)
    pub request_timeout_secs: u64,

    /// Connect/read/write timeout for WHOIS sockets (default: 10 seconds)
    pub whois_timeout_secs: u64,

    /// Number of ASNs collected at the same time (default: 3)
    pub max_workers: usize,

    /// Attempts per request, including the first (default: 3)
    pub max_retries: u32,

    /// First retry wait, doubled every attempt (default: 1 second)
    pub retry_backoff_secs: f64,

    /// Wait after an HTTP 429 before trying again (default: 60 seconds)
    pub rate_limit_wait_secs: u64,

    /// Looking-glass pagination ceiling (default and maximum: 50)
    pub max_pages: u32,

    pub user_agent: String,
}

pub const DEFAULT_USER_AGENT: &str = concat!("asnhunt/", env!("CARGO_PKG_VERSION"));

const EMPTY_CONFIG: &str = r#"### asnhunt configuration file

### directory for exported snapshots
# data_dir = "~/.asnhunt"

### request pacing and timeouts (in seconds)
# request_delay_secs = 1.0
# request_timeout_secs = 20
# whois_timeout_secs = 10

### concurrency
# max_workers = 3

### retry policy
# max_retries = 3
# retry_backoff_secs = 1.0
# rate_limit_wait_secs = 60

### looking-glass pagination ceiling (at most 50)
# max_pages = 50

# user_agent = "asnhunt"
"#;

fn home_dir_string() -> String {
    dirs::home_dir()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|| ".".to_string())
}

impl Default for HunterConfig {
    fn default() -> Self {
        Self {
            data_dir: format!("{}/.asnhunt", home_dir_string()),
            request_delay_secs: 1.0,
            request_timeout_secs: 20,
            whois_timeout_secs: 10,
            max_workers: 3,
            max_retries: 3,
            retry_backoff_secs: 1.0,
            rate_limit_wait_secs: 60,
            max_pages: 50,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

fn value_or<T: FromStr>(values: &HashMap<String, String>, key: &str, default: T) -> T {
    values
        .get(key)
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

impl HunterConfig {
    /// Load `~/.asnhunt/asnhunt.toml` (or `path`), then `ASNHUNT_*` environment
    /// variables on top. A missing file is created from a commented template.
    pub fn new(path: &Option<String>) -> Result<HunterConfig> {
        let mut builder = Config::builder();

        let hunter_dir = format!("{}/.asnhunt", home_dir_string());

        match path {
            Some(p) => {
                let path = Path::new(p.as_str());
                if path.exists() {
                    let path_str = path
                        .to_str()
                        .ok_or_else(|| anyhow!("Could not convert path to string"))?;
                    builder = builder.add_source(config::File::with_name(path_str));
                } else {
                    std::fs::write(p.as_str(), EMPTY_CONFIG)
                        .map_err(|e| anyhow!("Unable to create config file: {}", e))?;
                }
            }
            None => {
                std::fs::create_dir_all(hunter_dir.as_str())
                    .map_err(|e| anyhow!("Unable to create asnhunt directory: {}", e))?;
                let p = format!("{}/asnhunt.toml", hunter_dir.as_str());
                if Path::new(p.as_str()).exists() {
                    builder = builder.add_source(config::File::with_name(p.as_str()));
                } else {
                    std::fs::write(p.as_str(), EMPTY_CONFIG).map_err(|e| {
                        anyhow!("Unable to create config file {}: {}", p.as_str(), e)
                    })?;
                }
            }
        }

        // e.g. `ASNHUNT_MAX_WORKERS=1 asnhunt collect acme`
        builder = builder.add_source(config::Environment::with_prefix("ASNHUNT"));

        let settings = builder
            .build()
            .map_err(|e| anyhow!("Failed to build configuration: {}", e))?;

        let values = settings
            .try_deserialize::<HashMap<String, String>>()
            .map_err(|e| anyhow!("Failed to deserialize configuration: {}", e))?;

        Ok(Self::from_values(&values))
    }

    fn from_values(values: &HashMap<String, String>) -> HunterConfig {
        let defaults = HunterConfig::default();

        let data_dir = match values.get("data_dir") {
            Some(dir) if !dir.trim().is_empty() => match dir.strip_prefix("~/") {
                Some(rest) => format!("{}/{}", home_dir_string(), rest),
                None => dir.to_string(),
            },
            _ => defaults.data_dir,
        };

        HunterConfig {
            data_dir,
            request_delay_secs: value_or(values, "request_delay_secs", defaults.request_delay_secs)
                .max(0.0),
            request_timeout_secs: value_or(
                values,
                "request_timeout_secs",
                defaults.request_timeout_secs,
            )
            .max(1),
            whois_timeout_secs: value_or(values, "whois_timeout_secs", defaults.whois_timeout_secs)
                .max(1),
            max_workers: value_or(values, "max_workers", defaults.max_workers).max(1),
            max_retries: value_or(values, "max_retries", defaults.max_retries).max(1),
            retry_backoff_secs: value_or(values, "retry_backoff_secs", defaults.retry_backoff_secs)
                .max(0.0),
            rate_limit_wait_secs: value_or(
                values,
                "rate_limit_wait_secs",
                defaults.rate_limit_wait_secs,
            ),
            max_pages: value_or(values, "max_pages", defaults.max_pages).clamp(1, 50),
            user_agent: values
                .get("user_agent")
                .filter(|ua| !ua.trim().is_empty())
                .cloned()
                .unwrap_or(defaults.user_agent),
        }
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_secs_f64(self.request_delay_secs.max(0.0))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn whois_timeout(&self) -> Duration {
        Duration::from_secs(self.whois_timeout_secs)
    }

    /// Directory holding exported snapshots
    pub fn snapshot_dir(&self) -> String {
        format!("{}/snapshots", self.data_dir.trim_end_matches('/'))
    }

    /// Display configuration summary
    pub fn summary(&self) -> String {
        let lines = [
            format!("Data Directory:     {}", self.data_dir),
            format!("Snapshot Directory: {}", self.snapshot_dir()),
            format!("Request Delay:      {} seconds", self.request_delay_secs),
            format!("Request Timeout:    {} seconds", self.request_timeout_secs),
            format!("WHOIS Timeout:      {} seconds", self.whois_timeout_secs),
            format!("Max Workers:        {}", self.max_workers),
            format!(
                "Retries:            {} attempts, {}s backoff, {}s on rate limit",
                self.max_retries, self.retry_backoff_secs, self.rate_limit_wait_secs
            ),
            format!("Max Pages:          {}", self.max_pages),
            format!("User Agent:         {}", self.user_agent),
        ];
        lines.join("\n")
    }

    /// Get the config file path
    pub fn config_file_path() -> String {
        let home_dir = dirs::home_dir()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|| "~".to_string());
        format!("{}/.asnhunt/asnhunt.toml", home_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HunterConfig::default();
        assert_eq!(config.max_workers, 3);
        assert_eq!(config.max_pages, 50);
        assert_eq!(config.request_timeout(), Duration::from_secs(20));
        assert_eq!(config.request_delay(), Duration::from_secs(1));
        assert!(config.data_dir.ends_with("/.asnhunt"));
    }

    #[test]
    fn test_from_values_clamps() {
        let values: HashMap<String, String> = [
            ("max_workers", "0"),
            ("max_pages", "500"),
            ("request_delay_secs", "0.25"),
            ("max_retries", "not-a-number"),
            ("data_dir", "/tmp/hunt/"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let config = HunterConfig::from_values(&values);
        assert_eq!(config.max_workers, 1);
        assert_eq!(config.max_pages, 50);
        assert_eq!(config.request_delay(), Duration::from_millis(250));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.snapshot_dir(), "/tmp/hunt/snapshots");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("asnhunt.toml");
        std::fs::write(
            &path,
            "max_workers = 5\nrequest_timeout_secs = 7\nuser_agent = \"tester/1.0\"\n",
        )
        .unwrap();

        let config = HunterConfig::new(&Some(path.to_string_lossy().to_string())).unwrap();
        assert_eq!(config.max_workers, 5);
        assert_eq!(config.request_timeout(), Duration::from_secs(7));
        assert_eq!(config.user_agent, "tester/1.0");
    }

    #[test]
    fn test_missing_file_gets_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("new.toml");
        let config = HunterConfig::new(&Some(path.to_string_lossy().to_string())).unwrap();
        assert_eq!(config.max_pages, 50);
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("### asnhunt configuration file"));
    }

    #[test]
    fn test_summary_lists_settings() {
        let summary = HunterConfig::default().summary();
        assert!(summary.contains("Max Workers:        3"));
        assert!(summary.contains("Max Pages:          50"));
    }
}
