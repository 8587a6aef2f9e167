use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Remediation tool for CyberPanel hosts
#[derive(Parser, Debug)]
#[command(name = "panelfix")]
#[command(author = "4n6h4x0r")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Patches the CyberPanel installer and verifies rDNS during onboarding", long_about = None)]
pub struct Args {
    /// JSON settings file (missing keys keep their defaults)
    #[arg(short = 'c', long = "settings", global = true)]
    pub settings: Option<PathBuf>,

    /// Panel log file
    #[arg(long = "log-file", global = true)]
    pub log_file: Option<PathBuf>,

    /// URL of the rDNS relay list
    #[arg(long = "relay-list", global = true)]
    pub relay_list: Option<String>,

    /// Verbose logging
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Rewrite installCyberPanel.py to detect the MariaDB client and service
    PatchInstaller {
        /// Installer to patch
        #[arg(long = "path", value_name = "FILE")]
        path: Option<PathBuf>,

        /// What to do when some anchors are missing
        #[arg(long = "policy", value_enum, default_value_t = Policy::WriteApplied)]
        policy: Policy,
    },

    /// Print the MariaDB client command and service detected on this host
    Detect,

    /// Reverse-resolve an IP address through the relay servers
    Rdns {
        /// IP address to resolve
        #[arg(value_name = "IP")]
        ip: std::net::IpAddr,
    },

    /// Verify rDNS before committing a new server hostname
    Onboard {
        /// Hostname to set up
        #[arg(long = "domain")]
        domain: String,

        /// Public IP address of this server
        #[arg(long = "ip")]
        ip: std::net::IpAddr,

        /// Current hostname (defaults to the system hostname)
        #[arg(long = "current-hostname")]
        current_hostname: Option<String>,

        /// Skip the rDNS/PTR check
        #[arg(long = "skip-rdns")]
        skip_rdns: bool,

        /// Onboarding config record, rewound on failure
        #[arg(long = "config", value_name = "FILE")]
        config: PathBuf,

        /// Status file polled by the panel
        #[arg(long = "status-file", value_name = "FILE")]
        status_file: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Write whatever applied
    WriteApplied,
    /// Leave the file untouched unless every anchor applies
    AllOrNothing,
}

/// Parses command-line arguments
pub fn parse_args() -> Args {
    Args::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_installer_defaults() {
        let args = Args::try_parse_from(["panelfix", "patch-installer"]).unwrap();
        match args.command {
            Command::PatchInstaller { path, policy } => {
                assert!(path.is_none());
                assert_eq!(policy, Policy::WriteApplied);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_onboard_args() {
        let args = Args::try_parse_from([
            "panelfix",
            "onboard",
            "--domain",
            "example.com",
            "--ip",
            "203.0.113.7",
            "--skip-rdns",
            "--config",
            "/tmp/admin.json",
            "-v",
        ])
        .unwrap();
        assert!(args.verbose);
        match args.command {
            Command::Onboard {
                domain,
                skip_rdns,
                current_hostname,
                ..
            } => {
                assert_eq!(domain, "example.com");
                assert!(skip_rdns);
                assert!(current_hostname.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_relay_list_is_global() {
        let args = Args::try_parse_from([
            "panelfix",
            "rdns",
            "203.0.113.7",
            "--relay-list",
            "http://relays.test/list",
        ])
        .unwrap();
        assert_eq!(args.relay_list.as_deref(), Some("http://relays.test/list"));

        let args = Args::try_parse_from(["panelfix", "--relay-list", "http://r.test", "detect"]).unwrap();
        assert_eq!(args.relay_list.as_deref(), Some("http://r.test"));
    }

    #[test]
    fn test_rdns_rejects_bad_ip() {
        assert!(Args::try_parse_from(["panelfix", "rdns", "not-an-ip"]).is_err());
        assert!(Args::try_parse_from(["panelfix", "patch-installer", "--policy", "sometimes"]).is_err());
    }
}
