//! Reverse DNS lookup through remote relay servers
//!
//! A relay list is fetched from an operator-controlled URL, then every relay
//! is asked to resolve the IP. Each relay answers with the PTR record as seen
//! by several public resolvers; the hostnames are merged into one
//! deduplicated list. Failures never propagate: the worst case is an empty
//! list, which callers must treat as "verification failed".

use anyhow::{Context, Result};
use serde_json::Value;
use std::time::Duration;

use crate::panel_log::PanelLog;
use crate::settings::PanelSettings;

/// Resolver identities reported by every relay, in merge order
pub const RESOLVER_KEYS: &[&str] = &["8.8.8.8", "1.1.1.1", "9.9.9.9"];

/// Status code and body of an HTTP response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Minimal blocking GET used by the lookup
pub trait HttpFetch {
    fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse>;
}

/// [`HttpFetch`] backed by a blocking reqwest client
pub struct ReqwestFetch {
    client: reqwest::blocking::Client,
}

impl ReqwestFetch {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(format!("panelfix/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

impl HttpFetch for ReqwestFetch {
    fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse> {
        let response = self.client.get(url).timeout(timeout).send()?;
        let status = response.status().as_u16();
        let body = response.text()?;
        Ok(HttpResponse { status, body })
    }
}

/// Anything that can turn an IP into its rDNS hostnames
pub trait ReverseLookup {
    fn reverse_lookup(&self, ip_address: &str) -> Vec<String>;
}

/// Aggregated answer of one lookup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RdnsResults {
    /// Hostnames in first-seen order, without duplicates
    pub hostnames: Vec<String>,
    /// Relays that were queried
    pub attempted: usize,
    /// Relays that answered with `status == 1` and a valid `results` map
    pub successful: usize,
}

impl RdnsResults {
    /// Only a lookup with at least one successful relay is authoritative
    pub fn is_trusted(&self) -> bool {
        self.successful > 0 && !self.hostnames.is_empty()
    }

    fn merge(&mut self, results: &serde_json::Map<String, Value>) {
        for key in RESOLVER_KEYS {
            if let Some(hostname) = results.get(*key).and_then(Value::as_str) {
                if !hostname.is_empty() && !self.hostnames.iter().any(|h| h == hostname) {
                    self.hostnames.push(hostname.to_string());
                }
            }
        }
    }
}

/// Reverse DNS resolver querying every relay in the remote list
pub struct RdnsResolver<'a, F: HttpFetch> {
    fetch: F,
    log: &'a PanelLog,
    relay_list_url: String,
    list_timeout: Duration,
    query_timeout: Duration,
}

impl<'a, F: HttpFetch> RdnsResolver<'a, F> {
    pub fn new(fetch: F, log: &'a PanelLog, settings: &PanelSettings) -> Self {
        Self {
            fetch,
            log,
            relay_list_url: settings.relay_list_url.clone(),
            list_timeout: settings.relay_list_timeout(),
            query_timeout: settings.relay_query_timeout(),
        }
    }

    /// Look up `ip_address` on every relay
    pub fn lookup(&self, ip_address: &str) -> RdnsResults {
        let mut results = RdnsResults::default();

        let Some(relays) = self.fetch_relays() else {
            return results;
        };

        self.log.debug(&format!("DNS urls {:?}.", relays));

        for relay in &relays {
            results.attempted += 1;
            self.query_relay(relay, ip_address, &mut results);
        }

        self.log.debug(&format!(
            "rDNS result of {} is {:?} (successful queries: {}/{})",
            ip_address,
            results.hostnames,
            results.successful,
            relays.len()
        ));

        results
    }

    fn fetch_relays(&self) -> Option<Vec<String>> {
        let response = match self.fetch.get(&self.relay_list_url, self.list_timeout) {
            Ok(response) => response,
            Err(e) => {
                self.log.write(&format!(
                    "{} while fetching DNS server list from {}: {}",
                    failure_kind(&e),
                    self.relay_list_url,
                    e
                ));
                return None;
            }
        };

        if response.status != 200 {
            self.log.write(&format!(
                "Failed to fetch DNS server list: HTTP {}",
                response.status
            ));
            return None;
        }

        let data: Value = match serde_json::from_str(&response.body) {
            Ok(data) => data,
            Err(e) => {
                self.log
                    .write(&format!("Failed to parse DNS server list JSON: {}", e));
                return None;
            }
        };

        let Some(urls) = data.get("urls") else {
            self.log
                .write("DNS server list response missing \"urls\" key");
            return None;
        };

        let relays: Vec<String> = match urls.as_array() {
            Some(urls) if !urls.is_empty() => urls
                .iter()
                .filter_map(|url| match url.as_str() {
                    Some(url) => Some(url.trim_end_matches('/').to_string()),
                    None => {
                        self.log
                            .write(&format!("Ignoring non-string DNS server entry {}", url));
                        None
                    }
                })
                .collect(),
            _ => Vec::new(),
        };

        if relays.is_empty() {
            self.log.write("DNS server list is empty or invalid");
            return None;
        }

        Some(relays)
    }

    fn query_relay(&self, relay: &str, ip_address: &str, results: &mut RdnsResults) {
        let url = format!("{}/index.php?ip={}", relay, ip_address);
        self.log
            .debug(&format!("url to call {} is {}", ip_address, relay));

        let response = match self.fetch.get(&url, self.query_timeout) {
            Ok(response) => response,
            Err(e) => {
                self.log.write(&format!(
                    "{} while querying DNS server {}: {}",
                    failure_kind(&e),
                    relay,
                    e
                ));
                return;
            }
        };

        if response.status != 200 {
            self.log.debug(&format!(
                "DNS server {} returned HTTP {}",
                relay, response.status
            ));
            return;
        }

        let data: Value = match serde_json::from_str(&response.body) {
            Ok(data) => data,
            Err(e) => {
                self.log.write(&format!(
                    "Failed to parse JSON response from {}: {}",
                    relay, e
                ));
                return;
            }
        };

        self.log
            .debug(&format!("response from dns system {}", data));

        let Some(data) = data.as_object() else {
            self.log.write(&format!(
                "Invalid response format from {}: not a dictionary",
                relay
            ));
            return;
        };

        let Some(status) = data.get("status") else {
            self.log
                .write(&format!("Response from {} missing \"status\" key", relay));
            return;
        };

        if !is_success_status(status) {
            self.log.debug(&format!(
                "DNS server {} returned status != 1: {}",
                relay, status
            ));
            return;
        }

        match data.get("results").and_then(Value::as_object) {
            Some(map) => {
                results.merge(map);
                results.successful += 1;
            }
            None => self.log.write(&format!(
                "Response from {} missing or invalid \"results\" key",
                relay
            )),
        }
    }
}

impl<F: HttpFetch> ReverseLookup for RdnsResolver<'_, F> {
    fn reverse_lookup(&self, ip_address: &str) -> Vec<String> {
        self.lookup(ip_address).hostnames
    }
}

/// Relays report success as `1`; tolerate `1.0` and `true`
fn is_success_status(status: &Value) -> bool {
    match status {
        Value::Number(n) => n.as_f64() == Some(1.0),
        Value::Bool(b) => *b,
        _ => false,
    }
}

/// Log category for a transport failure
fn failure_kind(error: &anyhow::Error) -> &'static str {
    match error.downcast_ref::<reqwest::Error>() {
        Some(e) if e.is_timeout() => "Timeout",
        Some(e) if e.is_connect() => "Connection error",
        _ => "Request error",
    }
}
