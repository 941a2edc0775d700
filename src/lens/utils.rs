//! Formatting helpers shared by the lenses and the CLI

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default maximum length for organization names in tables
pub const DEFAULT_NAME_MAX_LEN: usize = 30;

/// Output format of every asnhunt command
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    /// Pretty table with borders (default)
    #[default]
    Table,
    /// Markdown table
    Markdown,
    /// Compact JSON
    Json,
    /// Indented JSON
    JsonPretty,
    /// One row per ASN, prefix lists joined with `;`
    Csv,
    /// Commented plain-text prefix lists, one CIDR per line
    Txt,
}

impl OutputFormat {
    pub fn is_json(&self) -> bool {
        matches!(self, Self::Json | Self::JsonPretty)
    }

    pub fn is_table(&self) -> bool {
        matches!(self, Self::Table | Self::Markdown)
    }

    /// File extension used when the output is written to disk
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Table | Self::Txt => "txt",
            Self::Markdown => "md",
            Self::Json | Self::JsonPretty => "json",
            Self::Csv => "csv",
        }
    }

    pub fn all_names() -> &'static [&'static str] {
        &["table", "markdown", "json", "json-pretty", "csv", "txt"]
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Table => "table",
            Self::Markdown => "markdown",
            Self::Json => "json",
            Self::JsonPretty => "json-pretty",
            Self::Csv => "csv",
            Self::Txt => "txt",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" | "pretty" => Ok(Self::Table),
            "markdown" | "md" => Ok(Self::Markdown),
            "json" => Ok(Self::Json),
            "json-pretty" | "jsonpretty" => Ok(Self::JsonPretty),
            "csv" => Ok(Self::Csv),
            "txt" | "text" | "plain" => Ok(Self::Txt),
            _ => Err(format!(
                "Unknown output format '{}'. Valid formats: {}",
                s,
                Self::all_names().join(", ")
            )),
        }
    }
}

/// Truncate a string to `max_len` characters, ending with "..." when cut
///
/// ```
/// use asnhunt::lens::utils::truncate_name;
///
/// assert_eq!(truncate_name("Short", 20), "Short");
/// assert_eq!(truncate_name("Cloudflare London, LLC", 12), "Cloudflar...");
/// ```
pub fn truncate_name(name: &str, max_len: usize) -> String {
    if name.chars().count() <= max_len {
        name.to_string()
    } else {
        let truncated: String = name.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

/// Group digits by thousands: `16777216` → `16,777,216`
pub fn format_count(value: u128) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_name() {
        assert_eq!(truncate_name("", 20), "");
        assert_eq!(truncate_name("12345678901234567890", 20), "12345678901234567890");
        assert_eq!(
            truncate_name("Deutsche Telekom AG, Internet Backbone", 20),
            "Deutsche Telekom ..."
        );
        assert_eq!(truncate_name("日本語テスト名前これは長い", 10), "日本語テスト名...");
        assert_eq!(truncate_name("Hello", 3), "...");
    }

    #[test]
    fn test_output_format_round_trip_names() {
        for name in OutputFormat::all_names() {
            let format = OutputFormat::from_str(name).unwrap();
            assert_eq!(format.to_string(), *name);
        }
        assert_eq!(OutputFormat::from_str("MD").unwrap(), OutputFormat::Markdown);
        assert_eq!(OutputFormat::from_str("text").unwrap(), OutputFormat::Txt);
        assert!(OutputFormat::from_str("psv").is_err());
    }

    #[test]
    fn test_output_format_kinds() {
        assert!(OutputFormat::JsonPretty.is_json());
        assert!(!OutputFormat::Csv.is_json());
        assert!(OutputFormat::Markdown.is_table());
        assert!(!OutputFormat::Txt.is_table());
        assert_eq!(OutputFormat::Csv.extension(), "csv");
        assert_eq!(OutputFormat::JsonPretty.extension(), "json");
    }

    #[test]
    fn test_format_count() {
        assert_eq!(format_count(0), "0");
        assert_eq!(format_count(256), "256");
        assert_eq!(format_count(1024), "1,024");
        assert_eq!(format_count(16_777_216), "16,777,216");
    }
}
