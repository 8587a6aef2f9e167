use anyhow::Result;
use panelfix_core::{
    GateOutcome, HostProbe, JsonConfigStore, OnboardingRequest, PanelLog, PanelSettings,
    PartialPolicy, RdnsGate, RdnsResolver, ReqwestFetch,
};
use std::process::ExitCode;

mod cli;

use cli::{Command, Policy};

fn main() -> Result<ExitCode> {
    let args = cli::parse_args();

    // Initialize logger with appropriate level based on verbose flag
    if std::env::var("RUST_LOG").is_err() {
        if args.verbose {
            std::env::set_var("RUST_LOG", "debug");
        } else {
            std::env::set_var("RUST_LOG", "info");
        }
    }
    env_logger::init();

    let mut settings = PanelSettings::load(args.settings.as_deref())?;
    if let Some(log_file) = args.log_file {
        settings.log_file = log_file;
    }
    if let Some(url) = args.relay_list {
        settings.relay_list_url = url;
    }

    match args.command {
        Command::PatchInstaller { path, policy } => {
            if let Some(path) = path {
                settings.installer_path = path;
            }
            patch_installer(&settings, policy)
        }
        Command::Detect => {
            let probe = HostProbe;
            println!("client:  {}", panelfix_core::find_mariadb_command(&probe));
            println!("service: {}", panelfix_core::find_mariadb_service(&probe));
            Ok(ExitCode::SUCCESS)
        }
        Command::Rdns { ip } => {
            let log = PanelLog::from_settings(&settings);
            let resolver = RdnsResolver::new(ReqwestFetch::new()?, &log, &settings);
            let results = resolver.lookup(&ip.to_string());

            for hostname in &results.hostnames {
                println!("{}", hostname);
            }
            log::info!(
                "{} hostnames from {}/{} relays",
                results.hostnames.len(),
                results.successful,
                results.attempted
            );

            Ok(if results.is_trusted() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Onboard {
            domain,
            ip,
            current_hostname,
            skip_rdns,
            config,
            status_file,
        } => {
            if !panelfix_core::is_valid_hostname(&domain) {
                anyhow::bail!("{} is not a valid hostname", domain);
            }
            if let Some(status_file) = status_file {
                settings.status_file = status_file;
            }

            let request = OnboardingRequest {
                domain,
                current_hostname: current_hostname.unwrap_or_else(panelfix_core::current_hostname),
                server_ip: ip.to_string(),
                skip_rdns_check: skip_rdns,
            };

            let log = PanelLog::from_settings(&settings);
            let resolver = RdnsResolver::new(ReqwestFetch::new()?, &log, &settings);
            let gate = RdnsGate::new(resolver, &log, &settings.status_file);

            let mut store = JsonConfigStore::new(config);
            let mut record = store.load()?;

            match gate.run(&request, &mut record, &mut store)? {
                GateOutcome::Verified { rdns } => {
                    log::info!("rDNS verified for {}: {}", request.domain, rdns.join(", "));
                    Ok(ExitCode::SUCCESS)
                }
                GateOutcome::Rejected { message } => {
                    eprintln!("{}", message);
                    Ok(ExitCode::FAILURE)
                }
            }
        }
    }
}

fn patch_installer(settings: &PanelSettings, policy: Policy) -> Result<ExitCode> {
    #[cfg(unix)]
    {
        if unsafe { libc::geteuid() } != 0 {
            log::warn!("Not running as root; writing the installer may fail.");
        }
    }

    let policy = match policy {
        Policy::WriteApplied => PartialPolicy::WriteApplied,
        Policy::AllOrNothing => PartialPolicy::AllOrNothing,
    };

    println!("Applying CyberPanel AlmaLinux 9 patches...");
    let report = panelfix_core::patch_installer(&settings.installer_path, policy)?;
    println!("{}", report);

    if report.succeeded() {
        println!("Patches applied successfully!");
    } else {
        println!("Failed to apply patches!");
    }

    for outcome in report.missing() {
        log::warn!("Unmatched anchor {} (bit {})", outcome.name, 1 << outcome.index);
    }

    // Exit statuses are truncated to a byte; the anchor bitmask fits
    Ok(ExitCode::from(report.exit_code() as u8))
}
