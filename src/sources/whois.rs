//! Route objects from the registry WHOIS servers
//!
//! Each regional registry only holds route objects for its own region, so
//! every server in [`WHOIS_SERVERS`] is asked in turn and the answers are
//! pooled. `route:` lines carry IPv4 blocks, `route6:` lines IPv6 blocks.

use crate::error::{ErrorKind, SourceError};
use crate::models::AddressFamily;
use crate::sources::{CancelToken, RetryPolicy, SourceClient, SourceId, SourceResult};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const WHOIS_PORT: u16 = 43;

pub const WHOIS_SERVERS: [&str; 4] = [
    "whois.radb.net",
    "whois.ripe.net",
    "whois.apnic.net",
    "whois.arin.net",
];

/// Upper bound on one WHOIS answer
const MAX_RESPONSE_BYTES: u64 = 16 * 1024 * 1024;

/// One WHOIS round trip: send `query`, read until the server closes
pub trait WhoisTransport: Send + Sync {
    fn query(&self, server: &str, query: &str) -> Result<String, SourceError>;
}

/// Plain TCP transport on port 43
pub struct TcpWhois {
    timeout: Duration,
}

impl TcpWhois {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl WhoisTransport for TcpWhois {
    fn query(&self, server: &str, query: &str) -> Result<String, SourceError> {
        let addrs = (server, WHOIS_PORT)
            .to_socket_addrs()
            .map_err(|e| SourceError::Connectivity(format!("{}: {}", server, e)))?;

        let mut stream = connect_any(server, addrs, self.timeout)?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;
        stream.write_all(format!("{}\r\n", query).as_bytes())?;

        let mut buf = Vec::new();
        stream.take(MAX_RESPONSE_BYTES).read_to_end(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

/// First address of `addrs` that accepts a connection
fn connect_any<I>(server: &str, addrs: I, timeout: Duration) -> Result<TcpStream, SourceError>
where
    I: IntoIterator<Item = SocketAddr>,
{
    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!("{} ({}): {}", server, addr, e);
                last_error = Some(e);
            }
        }
    }
    match last_error {
        Some(e) => Err(e.into()),
        None => Err(SourceError::Connectivity(format!("{}: no address", server))),
    }
}

/// Query text understood by `server`
pub fn query_for(server: &str, asn: u32) -> String {
    if server.contains("arin") {
        format!("AS{}", asn)
    } else {
        format!("-i origin AS{}", asn)
    }
}

/// Values of the `route:`/`route6:` lines of a WHOIS answer
pub(crate) fn parse_routes(text: &str, family: AddressFamily) -> Vec<String> {
    let key = match family {
        AddressFamily::IPv4 => "route:",
        AddressFamily::IPv6 => "route6:",
    };
    text.lines()
        .map(str::trim)
        .filter(|line| line.starts_with(key))
        .filter_map(|line| line.split_once(':').map(|(_, value)| value.trim()))
        .filter(|value| value.contains('/'))
        .map(str::to_string)
        .collect()
}

pub struct WhoisClient {
    transport: Arc<dyn WhoisTransport>,
    servers: Vec<String>,
    retry: RetryPolicy,
    cancel: CancelToken,
}

impl WhoisClient {
    pub fn new(transport: Arc<dyn WhoisTransport>, retry: RetryPolicy, cancel: CancelToken) -> Self {
        Self {
            transport,
            servers: WHOIS_SERVERS.iter().map(|s| s.to_string()).collect(),
            retry,
            cancel,
        }
    }

    pub fn with_servers(mut self, servers: Vec<String>) -> Self {
        self.servers = servers;
        self
    }
}

impl SourceClient for WhoisClient {
    fn id(&self) -> SourceId {
        SourceId::Whois
    }

    fn fetch_prefixes(&self, asn: u32, family: AddressFamily) -> SourceResult {
        let mut raw = Vec::new();
        let mut answered = 0;
        let mut last_error: Option<ErrorKind> = None;

        for server in &self.servers {
            let query = query_for(server, asn);
            let label = format!("whois {}", server);
            match self
                .retry
                .run(&label, &self.cancel, || self.transport.query(server, &query))
            {
                Ok(text) => {
                    answered += 1;
                    let routes = parse_routes(&text, family);
                    debug!("{}: {} {} route object(s) for AS{}", server, routes.len(), family, asn);
                    raw.extend(routes);
                }
                Err(SourceError::Cancelled) => {
                    last_error = Some(ErrorKind::Cancelled);
                    break;
                }
                Err(e) => {
                    debug!("{} failed for AS{}: {}", label, asn, e);
                    last_error = Some(e.kind());
                }
            }
        }

        if answered == 0 {
            return SourceResult::failed(last_error.unwrap_or(ErrorKind::Connectivity));
        }
        let result = SourceResult::from_raw(family, raw);
        match last_error {
            Some(kind) => result.with_partial_error(kind),
            None => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const RADB: &str = "\
route:          192.0.2.0/24
descr:          Example
origin:         AS64500
mnt-by:         MAINT-EXAMPLE

route6:         2001:db8::/32
origin:         AS64500

route:          not-a-prefix/xx
route:          198.51.100.0/24
";

    const RIPE: &str = "\
% This is the RIPE Database query service.
route:          192.0.2.0/24
origin:         AS64500
routes:         ignored
";

    #[derive(Default)]
    struct MockWhois {
        answers: HashMap<String, Result<String, SourceError>>,
        queries: Mutex<Vec<(String, String)>>,
    }

    impl MockWhois {
        fn answer(mut self, server: &str, response: Result<&str, SourceError>) -> Self {
            self.answers
                .insert(server.to_string(), response.map(|s| s.to_string()));
            self
        }
    }

    impl WhoisTransport for MockWhois {
        fn query(&self, server: &str, query: &str) -> Result<String, SourceError> {
            self.queries
                .lock()
                .unwrap()
                .push((server.to_string(), query.to_string()));
            self.answers
                .get(server)
                .cloned()
                .unwrap_or(Err(SourceError::Connectivity("refused".to_string())))
        }
    }

    #[test]
    fn test_parse_routes() {
        assert_eq!(
            parse_routes(RADB, AddressFamily::IPv4),
            vec!["192.0.2.0/24", "not-a-prefix/xx", "198.51.100.0/24"]
        );
        assert_eq!(parse_routes(RADB, AddressFamily::IPv6), vec!["2001:db8::/32"]);
        assert_eq!(parse_routes(RIPE, AddressFamily::IPv4), vec!["192.0.2.0/24"]);
    }

    #[test]
    fn test_queries_every_server() {
        let transport = Arc::new(
            MockWhois::default()
                .answer("whois.radb.net", Ok(RADB))
                .answer("whois.ripe.net", Ok(RIPE))
                .answer("whois.apnic.net", Ok("% no entries found"))
                .answer("whois.arin.net", Err(SourceError::Timeout)),
        );
        let client = WhoisClient::new(transport.clone(), RetryPolicy::no_retry(), CancelToken::new());
        let result = client.fetch_prefixes(64500, AddressFamily::IPv4);

        assert!(result.success);
        let cidrs: Vec<&str> = result.prefixes.iter().map(|p| p.cidr()).collect();
        assert_eq!(cidrs, vec!["192.0.2.0/24", "198.51.100.0/24", "192.0.2.0/24"]);
        assert_eq!(result.malformed_dropped, 1);
        assert_eq!(result.error, Some(ErrorKind::Timeout));

        let queries = transport.queries.lock().unwrap();
        assert_eq!(queries.len(), 4);
        assert_eq!(queries[0].1, "-i origin AS64500");
        assert_eq!(queries[3].1, "AS64500");
    }

    #[test]
    fn test_all_servers_down() {
        let client = WhoisClient::new(
            Arc::new(MockWhois::default()),
            RetryPolicy::immediate(2),
            CancelToken::new(),
        );
        let result = client.fetch_prefixes(64500, AddressFamily::IPv6);
        assert!(!result.success);
        assert_eq!(result.error, Some(ErrorKind::Connectivity));
    }

    #[test]
    fn test_cancelled_before_any_query() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let transport = Arc::new(MockWhois::default().answer("whois.radb.net", Ok(RADB)));
        let client = WhoisClient::new(transport.clone(), RetryPolicy::no_retry(), cancel);
        let result = client.fetch_prefixes(64500, AddressFamily::IPv4);
        assert_eq!(result.error, Some(ErrorKind::Cancelled));
        assert!(transport.queries.lock().unwrap().is_empty());
    }

    #[test]
    fn test_connect_falls_through_to_next_address() {
        let dead = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let live = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let live_addr = live.local_addr().unwrap();

        let stream = connect_any("example", vec![dead, live_addr], Duration::from_secs(2)).unwrap();
        assert_eq!(stream.peer_addr().unwrap(), live_addr);

        let none = connect_any("example", Vec::new(), Duration::from_secs(1));
        assert!(matches!(none, Err(SourceError::Connectivity(_))));
    }
}
