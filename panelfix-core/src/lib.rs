//! Remediation tooling for CyberPanel hosts
//!
//! Two independent flows live here: patching the CyberPanel installer so it
//! detects the MariaDB client and service on AlmaLinux 9, and the reverse-DNS
//! gate that guards server hostname onboarding.

// Internal modules (private)
mod detector;
mod host;
mod onboarding;
mod panel_log;
mod patcher;
mod rdns;
mod settings;

// Re-export public types
pub use detector::{
    find_mariadb_command, find_mariadb_service, first_command, first_service, HostProbe,
    SystemProbe, FALLBACK_MARIADB_COMMAND, FALLBACK_MARIADB_SERVICE, MARIADB_COMMANDS,
    MARIADB_SERVICES,
};
pub use host::current_hostname;
pub use onboarding::{
    is_valid_hostname, ConfigStore, GateOutcome, JsonConfigStore, OnboardingConfig,
    OnboardingRequest, RdnsGate, DNS_PENDING_STAGE,
};
pub use panel_log::PanelLog;
pub use patcher::{
    apply_anchors, installer_anchors, patch_installer, python_helpers, Anchor, AnchorOutcome,
    Edit, PartialPolicy, PatchReport, PatchStatus, FILE_NOT_FOUND_EXIT,
};
pub use rdns::{
    HttpFetch, HttpResponse, RdnsResolver, RdnsResults, ReqwestFetch, ReverseLookup,
    RESOLVER_KEYS,
};
pub use settings::PanelSettings;
