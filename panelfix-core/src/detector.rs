use std::path::PathBuf;
use std::process::Command;

/// MariaDB client commands in order of preference
pub const MARIADB_COMMANDS: &[&str] = &["mariadb", "mysql", "/usr/bin/mariadb", "/usr/bin/mysql"];
/// Returned when no client command resolves
pub const FALLBACK_MARIADB_COMMAND: &str = "mysql";

/// MariaDB systemd unit names in order of preference
pub const MARIADB_SERVICES: &[&str] = &["mariadb", "mysqld", "mysql"];
/// Returned when no unit is registered
pub const FALLBACK_MARIADB_SERVICE: &str = "mariadb";

/// Queries the host for executables and service units
pub trait SystemProbe {
    /// Resolve a command name or path to an executable path
    fn resolve_command(&self, command: &str) -> Option<PathBuf>;

    /// Whether `unit` (e.g. `mariadb.service`) is known to the service manager
    fn has_unit(&self, unit: &str) -> bool;
}

/// Probe backed by `PATH` lookup and `systemctl`
#[derive(Debug, Default, Clone, Copy)]
pub struct HostProbe;

impl SystemProbe for HostProbe {
    fn resolve_command(&self, command: &str) -> Option<PathBuf> {
        match which::which(command) {
            Ok(path) => Some(path),
            Err(e) => {
                log::debug!("{} not found: {}", command, e);
                None
            }
        }
    }

    fn has_unit(&self, unit: &str) -> bool {
        match Command::new("systemctl")
            .arg("list-unit-files")
            .arg(unit)
            .output()
        {
            Ok(output) => {
                output.status.success() && String::from_utf8_lossy(&output.stdout).contains(unit)
            }
            Err(e) => {
                log::debug!("systemctl probe for {} failed: {}", unit, e);
                false
            }
        }
    }
}

/// First candidate that resolves to an existing executable, else `fallback`
pub fn first_command(probe: &dyn SystemProbe, candidates: &[&str], fallback: &str) -> String {
    for candidate in candidates {
        if let Some(path) = probe.resolve_command(candidate) {
            if path.exists() {
                log::debug!("Using {} for {}", path.display(), candidate);
                return path.to_string_lossy().into_owned();
            }
        }
    }

    log::debug!("No candidate command found, falling back to {}", fallback);
    fallback.to_string()
}

/// First candidate whose `.service` unit is registered, else `fallback`
pub fn first_service(probe: &dyn SystemProbe, candidates: &[&str], fallback: &str) -> String {
    candidates
        .iter()
        .find(|service| probe.has_unit(&format!("{}.service", service)))
        .map(|service| service.to_string())
        .unwrap_or_else(|| {
            log::debug!("No candidate service found, falling back to {}", fallback);
            fallback.to_string()
        })
}

/// Path of the MariaDB client on this system, or `mysql`
pub fn find_mariadb_command(probe: &dyn SystemProbe) -> String {
    first_command(probe, MARIADB_COMMANDS, FALLBACK_MARIADB_COMMAND)
}

/// Name of the MariaDB service unit on this system, or `mariadb`
pub fn find_mariadb_service(probe: &dyn SystemProbe) -> String {
    first_service(probe, MARIADB_SERVICES, FALLBACK_MARIADB_SERVICE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// Probe answering from fixed tables and recording what was asked
    #[derive(Default)]
    struct FakeProbe {
        commands: HashMap<String, PathBuf>,
        units: Vec<String>,
        asked: RefCell<Vec<String>>,
    }

    impl SystemProbe for FakeProbe {
        fn resolve_command(&self, command: &str) -> Option<PathBuf> {
            self.asked.borrow_mut().push(command.to_string());
            self.commands.get(command).cloned()
        }

        fn has_unit(&self, unit: &str) -> bool {
            self.asked.borrow_mut().push(unit.to_string());
            self.units.iter().any(|u| u == unit)
        }
    }

    #[test]
    fn test_command_fallback_when_nothing_resolves() {
        let probe = FakeProbe::default();
        assert_eq!(find_mariadb_command(&probe), "mysql");
        assert_eq!(*probe.asked.borrow(), MARIADB_COMMANDS.to_vec());
    }

    #[test]
    fn test_command_first_existing_wins() {
        // The current executable always exists; a made-up path never does.
        let existing = std::env::current_exe().unwrap();
        let mut probe = FakeProbe::default();
        probe
            .commands
            .insert("mariadb".to_string(), PathBuf::from("/definitely/not/here/mariadb"));
        probe.commands.insert("mysql".to_string(), existing.clone());
        probe
            .commands
            .insert("/usr/bin/mariadb".to_string(), PathBuf::from("/usr/bin/mariadb"));

        assert_eq!(
            find_mariadb_command(&probe),
            existing.to_string_lossy().into_owned()
        );
        assert_eq!(*probe.asked.borrow(), vec!["mariadb", "mysql"]);
    }

    #[test]
    fn test_service_first_listed_wins() {
        let probe = FakeProbe {
            units: vec!["mysqld.service".to_string(), "mysql.service".to_string()],
            ..Default::default()
        };
        assert_eq!(find_mariadb_service(&probe), "mysqld");
        assert_eq!(*probe.asked.borrow(), vec!["mariadb.service", "mysqld.service"]);
    }

    #[test]
    fn test_service_fallback() {
        let probe = FakeProbe::default();
        assert_eq!(find_mariadb_service(&probe), "mariadb");
        assert_eq!(probe.asked.borrow().len(), MARIADB_SERVICES.len());
    }

    #[test]
    fn test_custom_candidates() {
        let probe = FakeProbe {
            units: vec!["b.service".to_string()],
            ..Default::default()
        };
        assert_eq!(first_service(&probe, &["a", "b", "c"], "z"), "b");
        assert_eq!(first_service(&probe, &[], "z"), "z");
        assert_eq!(first_command(&probe, &[], "zz"), "zz");
    }
}
