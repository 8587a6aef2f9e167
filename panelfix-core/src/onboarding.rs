//! rDNS gate for server hostname onboarding
//!
//! Setting a server hostname is only allowed once the server IP's PTR record
//! points at the requested domain, unless the operator opted out of the check
//! (it only matters for mail delivery). The gate runs in two steps, matching
//! the onboarding workflow: the lookup happens early, and the domain is
//! checked against the result just before the hostname is committed.

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

use crate::panel_log::PanelLog;
use crate::rdns::ReverseLookup;

/// Onboarding stage meaning "waiting for DNS to be fixed"
pub const DNS_PENDING_STAGE: i64 = 3;

lazy_static::lazy_static! {
    static ref HOSTNAME_RE: regex::Regex = regex::Regex::new(
        r"^(?i)[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?(?:\.[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?)+$"
    )
    .unwrap();
}

/// Whether `name` is a syntactically valid fully qualified hostname
pub fn is_valid_hostname(name: &str) -> bool {
    name.len() <= 253 && HOSTNAME_RE.is_match(name)
}

/// Persisted onboarding record of the admin account
///
/// The panel owns this record and is loose about its types, so the three
/// fields the gate touches accept numbers, booleans, numeric strings and
/// null. They are always written back as a string and integers.
/// Unknown keys are kept so saving never drops settings owned by the panel.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OnboardingConfig {
    #[serde(default, deserialize_with = "lenient_string")]
    pub hostname: String,
    #[serde(default, deserialize_with = "lenient_int")]
    pub onboarding: i64,
    #[serde(rename = "skipRDNSCheck", default, deserialize_with = "lenient_int")]
    pub skip_rdns_check: i64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}

/// `true`/`false`, `1`, `1.0`, `"2"` and `null` all map to an integer
fn lenient_int<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let parsed = match &value {
        Value::Null => Some(0),
        Value::Bool(b) => Some(i64::from(*b)),
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            match s.to_ascii_lowercase().as_str() {
                "" | "false" => Some(0),
                "true" => Some(1),
                _ => s.parse::<i64>().ok(),
            }
        }
        _ => None,
    };

    parsed.ok_or_else(|| serde::de::Error::custom(format!("expected an integer, got {}", value)))
}

/// Where the onboarding record is saved
pub trait ConfigStore {
    fn save(&mut self, config: &OnboardingConfig) -> Result<()>;
}

/// Onboarding record kept as a JSON file
#[derive(Debug, Clone)]
pub struct JsonConfigStore {
    path: PathBuf,
}

impl JsonConfigStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the record, or an empty one if the file doesn't exist
    pub fn load(&self) -> Result<OnboardingConfig> {
        if !self.path.exists() {
            return Ok(OnboardingConfig::default());
        }

        let data = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        let config = serde_json::from_str(&data)
            .with_context(|| format!("Invalid onboarding config {}", self.path.display()))?;
        Ok(config)
    }
}

impl ConfigStore for JsonConfigStore {
    fn save(&mut self, config: &OnboardingConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let data = serde_json::to_string(config)?;
        fs::write(&self.path, data)
            .with_context(|| format!("Failed to save {}", self.path.display()))?;
        Ok(())
    }
}

/// Hostname onboarding request
#[derive(Debug, Clone)]
pub struct OnboardingRequest {
    /// Hostname the operator wants to set
    pub domain: String,
    pub current_hostname: String,
    pub server_ip: String,
    pub skip_rdns_check: bool,
}

/// Decision of a gate step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// Continue onboarding with these rDNS hostnames
    Verified { rdns: Vec<String> },
    /// Stop onboarding; `message` has already been logged and published
    Rejected { message: String },
}

impl GateOutcome {
    pub fn is_verified(&self) -> bool {
        matches!(self, GateOutcome::Verified { .. })
    }
}

const SKIP_HINT: &str = "select \"Skip rDNS/PTR Check\" if you do not need email services";

/// The two-step rDNS verification of hostname onboarding
pub struct RdnsGate<'a, L: ReverseLookup> {
    lookup: L,
    log: &'a PanelLog,
    status_path: PathBuf,
}

impl<'a, L: ReverseLookup> RdnsGate<'a, L> {
    pub fn new(lookup: L, log: &'a PanelLog, status_path: impl Into<PathBuf>) -> Self {
        Self {
            lookup,
            log,
            status_path: status_path.into(),
        }
    }

    /// Step one: collect the rDNS hostnames of the server IP
    ///
    /// With the skip flag set the set is `[current hostname, domain]`, which
    /// makes step two pass trivially. An empty lookup rejects onboarding
    /// without touching the config.
    pub fn resolve(&self, request: &OnboardingRequest) -> GateOutcome {
        if request.skip_rdns_check {
            log::info!("rDNS check skipped for {}", request.domain);
            return GateOutcome::Verified {
                rdns: vec![request.current_hostname.clone(), request.domain.clone()],
            };
        }

        let rdns = self.lookup.reverse_lookup(&request.server_ip);
        if rdns.is_empty() {
            let message = format!(
                "Failed to perform reverse DNS lookup for server IP {}. The DNS lookup service may be unavailable or the IP address may not have rDNS configured. Please verify your rDNS settings with your hosting provider or {}. [404]",
                request.server_ip, SKIP_HINT
            );
            self.publish(&message);
            return GateOutcome::Rejected { message };
        }

        GateOutcome::Verified { rdns }
    }

    /// Step two: require the domain among `rdns`
    ///
    /// On rejection the record is rewound to [`DNS_PENDING_STAGE`] with the
    /// requested hostname and saved, so the panel resumes at the DNS step.
    pub fn confirm(
        &self,
        request: &OnboardingRequest,
        rdns: &[String],
        config: &mut OnboardingConfig,
        store: &mut dyn ConfigStore,
    ) -> Result<GateOutcome> {
        let message = if rdns.is_empty() {
            format!(
                "Reverse DNS lookup failed for server IP {}. Unable to verify if domain \"{}\" is configured as rDNS. Please check your rDNS configuration with your hosting provider or {}. [404]",
                request.server_ip, request.domain, SKIP_HINT
            )
        } else if !rdns.iter().any(|hostname| hostname == &request.domain) {
            format!(
                "Domain \"{}\" that you have provided is not configured as rDNS for your server IP {}. Current rDNS records: {}. Please configure rDNS (PTR record) for your IP address to point to \"{}\" with your hosting provider, or {}. [404]",
                request.domain,
                request.server_ip,
                rdns.join(", "),
                request.domain,
                SKIP_HINT
            )
        } else {
            log::info!("{} is configured as rDNS for {}", request.domain, request.server_ip);
            return Ok(GateOutcome::Verified {
                rdns: rdns.to_vec(),
            });
        };

        self.publish(&message);

        config.hostname = request.domain.clone();
        config.onboarding = DNS_PENDING_STAGE;
        config.skip_rdns_check = i64::from(request.skip_rdns_check);
        store
            .save(config)
            .context("Failed to save onboarding config")?;

        Ok(GateOutcome::Rejected { message })
    }

    /// Run both steps in sequence
    pub fn run(
        &self,
        request: &OnboardingRequest,
        config: &mut OnboardingConfig,
        store: &mut dyn ConfigStore,
    ) -> Result<GateOutcome> {
        match self.resolve(request) {
            GateOutcome::Verified { rdns } => self.confirm(request, &rdns, config, store),
            rejected => Ok(rejected),
        }
    }

    fn publish(&self, message: &str) {
        self.log.status(&self.status_path, message);
        self.log.write(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use tempfile::TempDir;

    struct FixedLookup {
        hostnames: Vec<String>,
        calls: RefCell<usize>,
    }

    impl FixedLookup {
        fn new(hostnames: &[&str]) -> Self {
            Self {
                hostnames: hostnames.iter().map(|h| h.to_string()).collect(),
                calls: RefCell::new(0),
            }
        }
    }

    impl ReverseLookup for &FixedLookup {
        fn reverse_lookup(&self, _ip_address: &str) -> Vec<String> {
            *self.calls.borrow_mut() += 1;
            self.hostnames.clone()
        }
    }

    #[derive(Default)]
    struct RecordingStore {
        saved: Vec<OnboardingConfig>,
    }

    impl ConfigStore for RecordingStore {
        fn save(&mut self, config: &OnboardingConfig) -> Result<()> {
            self.saved.push(config.clone());
            Ok(())
        }
    }

    fn request(skip: bool) -> OnboardingRequest {
        OnboardingRequest {
            domain: "example.com".to_string(),
            current_hostname: "server1.host.test".to_string(),
            server_ip: "203.0.113.7".to_string(),
            skip_rdns_check: skip,
        }
    }

    fn panel_log(dir: &TempDir) -> PanelLog {
        PanelLog::new(dir.path().join("log.txt"), dir.path().join("debug"))
    }

    #[test]
    fn test_skip_flag_seeds_both_hostnames() -> Result<()> {
        let dir = TempDir::new()?;
        let log = panel_log(&dir);
        let lookup = FixedLookup::new(&[]);
        let gate = RdnsGate::new(&lookup, &log, dir.path().join("status"));
        let mut config = OnboardingConfig::default();
        let mut store = RecordingStore::default();

        let outcome = gate.run(&request(true), &mut config, &mut store)?;
        assert_eq!(
            outcome,
            GateOutcome::Verified {
                rdns: vec!["server1.host.test".to_string(), "example.com".to_string()]
            }
        );
        assert_eq!(*lookup.calls.borrow(), 0);
        assert!(store.saved.is_empty());
        Ok(())
    }

    #[test]
    fn test_empty_lookup_rejects_without_mutation() -> Result<()> {
        let dir = TempDir::new()?;
        let log = panel_log(&dir);
        let status = dir.path().join("status");
        let lookup = FixedLookup::new(&[]);
        let gate = RdnsGate::new(&lookup, &log, &status);
        let mut config = OnboardingConfig {
            hostname: "old.host.test".to_string(),
            onboarding: 1,
            ..Default::default()
        };
        let mut store = RecordingStore::default();

        let outcome = gate.run(&request(false), &mut config, &mut store)?;
        let GateOutcome::Rejected { message } = outcome else {
            panic!("expected rejection");
        };
        assert!(message.ends_with("[404]"));
        assert!(message.contains("203.0.113.7"));
        assert_eq!(config.hostname, "old.host.test");
        assert_eq!(config.onboarding, 1);
        assert!(store.saved.is_empty());
        assert_eq!(fs::read_to_string(&status)?.trim_end(), message);
        assert!(fs::read_to_string(log.log_path())?.contains(&message));
        Ok(())
    }

    #[test]
    fn test_domain_mismatch_rewinds_config() -> Result<()> {
        let dir = TempDir::new()?;
        let log = panel_log(&dir);
        let lookup = FixedLookup::new(&["other.com"]);
        let gate = RdnsGate::new(&lookup, &log, dir.path().join("status"));
        let mut config = OnboardingConfig {
            hostname: "old.host.test".to_string(),
            onboarding: 2,
            ..Default::default()
        };
        let mut store = RecordingStore::default();

        let outcome = gate.run(&request(false), &mut config, &mut store)?;
        let GateOutcome::Rejected { message } = outcome else {
            panic!("expected rejection");
        };
        assert!(message.contains("Current rDNS records: other.com."));
        assert!(message.ends_with("[404]"));
        assert_eq!(config.hostname, "example.com");
        assert_eq!(config.onboarding, DNS_PENDING_STAGE);
        assert_eq!(config.skip_rdns_check, 0);
        assert_eq!(store.saved, vec![config.clone()]);
        Ok(())
    }

    #[test]
    fn test_confirm_with_empty_set_rewinds_and_preserves_skip_flag() -> Result<()> {
        let dir = TempDir::new()?;
        let log = panel_log(&dir);
        let lookup = FixedLookup::new(&[]);
        let gate = RdnsGate::new(&lookup, &log, dir.path().join("status"));
        let mut config = OnboardingConfig::default();
        let mut store = RecordingStore::default();

        let outcome = gate.confirm(&request(true), &[], &mut config, &mut store)?;
        assert!(!outcome.is_verified());
        assert_eq!(config.skip_rdns_check, 1);
        assert_eq!(config.onboarding, DNS_PENDING_STAGE);
        assert_eq!(store.saved.len(), 1);
        Ok(())
    }

    #[test]
    fn test_matching_domain_passes() -> Result<()> {
        let dir = TempDir::new()?;
        let log = panel_log(&dir);
        let lookup = FixedLookup::new(&["mail.example.com", "example.com"]);
        let gate = RdnsGate::new(&lookup, &log, dir.path().join("status"));
        let mut config = OnboardingConfig::default();
        let mut store = RecordingStore::default();

        let outcome = gate.run(&request(false), &mut config, &mut store)?;
        assert!(outcome.is_verified());
        assert_eq!(config, OnboardingConfig::default());
        assert!(store.saved.is_empty());
        Ok(())
    }

    #[test]
    fn test_json_store_keeps_unknown_keys() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("admin").join("config.json");
        let mut store = JsonConfigStore::new(path.clone());
        assert_eq!(store.load()?, OnboardingConfig::default());

        fs::create_dir_all(path.parent().unwrap())?;
        fs::write(
            &path,
            r#"{"hostname":"old.test","onboarding":1,"skipRDNSCheck":1,"theme":"dark"}"#,
        )?;

        let mut config = store.load()?;
        assert_eq!(config.skip_rdns_check, 1);
        config.onboarding = DNS_PENDING_STAGE;
        store.save(&config)?;

        let saved: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path)?)?;
        assert_eq!(saved["theme"], "dark");
        assert_eq!(saved["onboarding"], 3);
        assert_eq!(saved["skipRDNSCheck"], 1);
        Ok(())
    }

    #[test]
    fn test_loosely_typed_record_loads_and_rewinds() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"hostname":null,"onboarding":"2","skipRDNSCheck":true,"theme":"dark"}"#,
        )?;
        let mut store = JsonConfigStore::new(path.clone());

        let mut config = store.load()?;
        assert_eq!(config.hostname, "");
        assert_eq!(config.onboarding, 2);
        assert_eq!(config.skip_rdns_check, 1);

        let log = panel_log(&dir);
        let lookup = FixedLookup::new(&[]);
        let gate = RdnsGate::new(&lookup, &log, dir.path().join("status"));
        let rdns = vec!["other.com".to_string()];

        let outcome = gate.confirm(&request(false), &rdns, &mut config, &mut store)?;
        assert!(!outcome.is_verified());

        let saved: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path)?)?;
        assert_eq!(saved["hostname"], "example.com");
        assert_eq!(saved["onboarding"], DNS_PENDING_STAGE);
        assert_eq!(saved["skipRDNSCheck"], 0);
        assert_eq!(saved["theme"], "dark");
        Ok(())
    }

    #[test]
    fn test_lenient_fields() -> Result<()> {
        let config: OnboardingConfig =
            serde_json::from_str(r#"{"hostname":"h.test","onboarding":3.0,"skipRDNSCheck":"0"}"#)?;
        assert_eq!(config.onboarding, 3);
        assert_eq!(config.skip_rdns_check, 0);

        let config: OnboardingConfig =
            serde_json::from_str(r#"{"onboarding":null,"skipRDNSCheck":"False"}"#)?;
        assert_eq!(config.hostname, "");
        assert_eq!(config.onboarding, 0);
        assert_eq!(config.skip_rdns_check, 0);

        assert!(serde_json::from_str::<OnboardingConfig>(r#"{"onboarding":"soon"}"#).is_err());
        assert!(serde_json::from_str::<OnboardingConfig>(r#"{"onboarding":[1]}"#).is_err());
        Ok(())
    }

    #[test]
    fn test_hostname_validation() {
        assert!(is_valid_hostname("example.com"));
        assert!(is_valid_hostname("mail.Example-Host.co.uk"));
        assert!(!is_valid_hostname("localhost"));
        assert!(!is_valid_hostname("-bad.example.com"));
        assert!(!is_valid_hostname("bad_.example.com"));
        assert!(!is_valid_hostname("example..com"));
        assert!(!is_valid_hostname(""));
    }
}
