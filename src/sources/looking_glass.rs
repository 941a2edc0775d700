//! Looking-glass scrapers for bgp.he.net
//!
//! [`LookingGlassClient`] walks the paginated prefix tables of an ASN page.
//! Each data row's first cell links to `/net/<cidr>`; the CIDR is taken from
//! that link, or from the link text when the href has another shape. When the
//! table id is missing from the page, the first table mentioning "prefix" is
//! used instead.
//!
//! [`LookingGlassAltClient`] tries a few alternative endpoints and scans the
//! raw body for CIDR-looking text.

use crate::error::{ErrorKind, SourceError};
use crate::models::AddressFamily;
use crate::sources::{SourceClient, SourceContext, SourceId, SourceResult};
use itertools::Itertools;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};

pub const LOOKING_GLASS_URL: &str = "https://bgp.he.net";

/// Hard ceiling on the number of pages fetched per ASN and family
pub const DEFAULT_MAX_PAGES: u32 = 50;

const ALT_ENDPOINTS: [&str; 3] = ["data", "prefixes", "routes"];

fn table_id(family: AddressFamily) -> &'static str {
    match family {
        AddressFamily::IPv4 => "table_prefixes4",
        AddressFamily::IPv6 => "table_prefixes6",
    }
}

fn selector(css: &str) -> Result<Selector, SourceError> {
    Selector::parse(css).map_err(|e| SourceError::Parse(format!("selector '{}': {:?}", css, e)))
}

fn regex(pattern: &str) -> Result<Regex, SourceError> {
    Regex::new(pattern).map_err(|e| SourceError::Parse(format!("regex '{}': {}", pattern, e)))
}

// =============================================================================
// Page parsing
// =============================================================================

/// Prefixes found on one page and whether another page seems to follow
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct PageScan {
    pub prefixes: Vec<String>,
    pub has_next: bool,
}

/// Selectors and patterns for one address family, built once per fetch
pub(crate) struct PageParser {
    family: AddressFamily,
    by_id: Selector,
    any_table: Selector,
    row: Selector,
    cell: Selector,
    anchor: Selector,
    href_cidr: Regex,
    ipv4_text: Regex,
    next_text: Regex,
    page_param: Regex,
}

impl PageParser {
    pub(crate) fn new(family: AddressFamily) -> Result<Self, SourceError> {
        let href_cidr = match family {
            AddressFamily::IPv4 => r"/net/([\d\.]+/\d+)",
            AddressFamily::IPv6 => r"/net/([\da-fA-F:]+/\d+)",
        };
        Ok(Self {
            family,
            by_id: selector(&format!("table#{}", table_id(family)))?,
            any_table: selector("table")?,
            row: selector("tr")?,
            cell: selector("td")?,
            anchor: selector("a")?,
            href_cidr: regex(href_cidr)?,
            ipv4_text: regex(r"^\d+\.\d+\.\d+\.\d+/\d+$")?,
            next_text: regex(r"(?i)next|more|›|→")?,
            page_param: regex(r"p=(\d+)")?,
        })
    }

    fn find_table<'a>(&self, document: &'a Html) -> Option<ElementRef<'a>> {
        document.select(&self.by_id).next().or_else(|| {
            document
                .select(&self.any_table)
                .find(|t| t.html().to_lowercase().contains("prefix"))
        })
    }

    fn cidr_from_anchor(&self, anchor: ElementRef<'_>) -> Option<String> {
        if let Some(caps) = anchor
            .value()
            .attr("href")
            .and_then(|href| self.href_cidr.captures(href))
        {
            return caps.get(1).map(|m| m.as_str().to_string());
        }

        let text = anchor.text().collect::<String>();
        let text = text.trim();
        if !text.contains('/') {
            return None;
        }
        let accepted = match self.family {
            AddressFamily::IPv4 => self.ipv4_text.is_match(text),
            AddressFamily::IPv6 => text.contains(':'),
        };
        accepted.then(|| text.to_string())
    }

    fn has_next(&self, document: &Html, page: u32) -> bool {
        document.select(&self.anchor).any(|a| {
            let text = a.text().collect::<String>();
            if self.next_text.is_match(&text) {
                return true;
            }
            a.value()
                .attr("href")
                .and_then(|href| self.page_param.captures(href))
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse::<u32>().ok())
                .map(|p| p > page)
                .unwrap_or(false)
        })
    }

    pub(crate) fn parse_page(&self, html: &str, page: u32) -> PageScan {
        let document = Html::parse_document(html);
        let table = match self.find_table(&document) {
            Some(table) => table,
            None => return PageScan::default(),
        };

        let prefixes = table
            .select(&self.row)
            .filter_map(|row| row.select(&self.cell).next())
            .filter_map(|cell| cell.select(&self.anchor).next())
            .filter_map(|anchor| self.cidr_from_anchor(anchor))
            .collect::<Vec<_>>();

        let has_next = !prefixes.is_empty() && self.has_next(&document, page);
        PageScan { prefixes, has_next }
    }
}

// =============================================================================
// Paginated client
// =============================================================================

pub struct LookingGlassClient {
    ctx: SourceContext,
    base_url: String,
    max_pages: u32,
}

impl LookingGlassClient {
    pub fn new(ctx: SourceContext) -> Self {
        Self {
            ctx,
            base_url: LOOKING_GLASS_URL.to_string(),
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Page ceiling; values above the default are clamped to it
    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages.clamp(1, DEFAULT_MAX_PAGES);
        self
    }

    pub fn page_url(&self, asn: u32, page: u32) -> String {
        match page {
            0 | 1 => format!("{}/AS{}", self.base_url, asn),
            _ => format!("{}/AS{}?p={}", self.base_url, asn, page),
        }
    }
}

impl SourceClient for LookingGlassClient {
    fn id(&self) -> SourceId {
        SourceId::LookingGlass
    }

    fn fetch_prefixes(&self, asn: u32, family: AddressFamily) -> SourceResult {
        let parser = match PageParser::new(family) {
            Ok(parser) => parser,
            Err(e) => return SourceResult::failed(e.kind()),
        };

        let mut raw: Vec<String> = Vec::new();
        let mut partial: Option<ErrorKind> = None;

        for page in 1..=self.max_pages {
            let body = match self.ctx.get(&self.page_url(asn, page)) {
                Ok(body) => body,
                Err(e) if page == 1 => {
                    debug!("looking glass AS{} ({}) failed: {}", asn, family, e);
                    return SourceResult::failed(e.kind());
                }
                Err(e) => {
                    debug!("looking glass AS{} ({}) page {} failed: {}", asn, family, page, e);
                    partial = Some(e.kind());
                    break;
                }
            };

            let scan = parser.parse_page(&body, page);
            if scan.prefixes.is_empty() {
                break;
            }
            debug!("AS{} {} page {}: {} prefixes", asn, family, page, scan.prefixes.len());
            raw.extend(scan.prefixes);

            if !scan.has_next {
                break;
            }
            if page == self.max_pages {
                warn!(
                    "looking glass AS{} ({}): stopping at page ceiling {}",
                    asn, family, self.max_pages
                );
            }
        }

        let mut result = SourceResult::from_raw(family, raw);
        if let Some(kind) = partial {
            result = result.with_partial_error(kind);
        }
        if !result.prefixes.is_empty() {
            info!(
                "looking glass: {} {} prefixes for AS{}",
                result.prefixes.len(),
                family,
                asn
            );
        }
        result
    }
}

// =============================================================================
// Alternative endpoints
// =============================================================================

fn cidr_pattern(family: AddressFamily) -> &'static str {
    match family {
        AddressFamily::IPv4 => r"\b(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}/\d{1,2})\b",
        AddressFamily::IPv6 => r"\b([0-9a-fA-F]{1,4}(?::[0-9a-fA-F]{0,4}){1,7}/\d{1,3})\b",
    }
}

/// Unique CIDR-looking strings in a body, in order of first appearance
pub(crate) fn scan_cidrs(body: &str, pattern: &Regex) -> Vec<String> {
    pattern
        .captures_iter(body)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .unique()
        .collect()
}

pub struct LookingGlassAltClient {
    ctx: SourceContext,
    base_url: String,
}

impl LookingGlassAltClient {
    pub fn new(ctx: SourceContext) -> Self {
        Self {
            ctx,
            base_url: LOOKING_GLASS_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn endpoint_urls(&self, asn: u32) -> Vec<String> {
        ALT_ENDPOINTS
            .iter()
            .map(|endpoint| format!("{}/AS{}/{}", self.base_url, asn, endpoint))
            .collect()
    }
}

impl SourceClient for LookingGlassAltClient {
    fn id(&self) -> SourceId {
        SourceId::LookingGlassAlt
    }

    fn fetch_prefixes(&self, asn: u32, family: AddressFamily) -> SourceResult {
        let pattern = match regex(cidr_pattern(family)) {
            Ok(pattern) => pattern,
            Err(e) => return SourceResult::failed(e.kind()),
        };

        let mut last_error: Option<SourceError> = None;
        let mut answered = false;

        for url in self.endpoint_urls(asn) {
            match self.ctx.get(&url) {
                Ok(body) => {
                    answered = true;
                    let found = scan_cidrs(&body, &pattern);
                    if !found.is_empty() {
                        debug!("{}: {} candidate {} prefixes", url, found.len(), family);
                        return SourceResult::from_raw(family, found);
                    }
                }
                Err(SourceError::Cancelled) => {
                    return SourceResult::failed(ErrorKind::Cancelled);
                }
                Err(e) => {
                    debug!("{} failed: {}", url, e);
                    last_error = Some(e);
                }
            }
        }

        match (answered, last_error) {
            (false, Some(e)) => SourceResult::failed(e.kind()),
            _ => SourceResult::ok(Vec::new()),
        }
    }
}
