//! RIPEstat announced prefixes
//!
//! `GET https://stat.ripe.net/data/announced-prefixes/data.json?resource=AS<asn>`
//! lists both families in one `data.prefixes[]` array; the family is told apart
//! from the text of each entry.

use crate::error::SourceError;
use crate::models::AddressFamily;
use crate::sources::{SourceClient, SourceContext, SourceId, SourceResult};
use serde::Deserialize;
use tracing::debug;

pub const RIPESTAT_API: &str = "https://stat.ripe.net/data/announced-prefixes/data.json";

#[derive(Debug, Deserialize)]
struct RipeStatResponse {
    #[serde(default)]
    status: String,
    data: Option<AnnouncedPrefixes>,
}

#[derive(Debug, Default, Deserialize)]
struct AnnouncedPrefixes {
    #[serde(default)]
    prefixes: Vec<AnnouncedPrefix>,
}

#[derive(Debug, Deserialize)]
struct AnnouncedPrefix {
    #[serde(default)]
    prefix: Option<String>,
}

pub(crate) fn parse_announced_prefixes(
    body: &str,
    family: AddressFamily,
) -> Result<SourceResult, SourceError> {
    let response: RipeStatResponse = serde_json::from_str(body)?;
    if response.status != "ok" {
        return Err(SourceError::Parse(format!("status '{}'", response.status)));
    }
    let data = response.data.unwrap_or_default();
    Ok(SourceResult::from_raw(
        family,
        data.prefixes.into_iter().filter_map(|p| p.prefix),
    ))
}

pub struct RipeStatClient {
    ctx: SourceContext,
    base_url: String,
}

impl RipeStatClient {
    pub fn new(ctx: SourceContext) -> Self {
        Self {
            ctx,
            base_url: RIPESTAT_API.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn announced_url(&self, asn: u32) -> String {
        format!("{}?resource=AS{}", self.base_url, asn)
    }
}

impl SourceClient for RipeStatClient {
    fn id(&self) -> SourceId {
        SourceId::RipeStat
    }

    fn fetch_prefixes(&self, asn: u32, family: AddressFamily) -> SourceResult {
        let url = self.announced_url(asn);
        match self
            .ctx
            .get(&url)
            .and_then(|body| parse_announced_prefixes(&body, family))
        {
            Ok(result) => result,
            Err(e) => {
                debug!("RIPEstat for AS{} ({}) failed: {}", asn, family, e);
                SourceResult::failed(e.kind())
            }
        }
    }
}
