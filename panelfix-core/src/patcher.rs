//! CyberPanel installer patcher
//!
//! `installCyberPanel.py` hardcodes the `mariadb` client binary and the
//! `mariadb` service unit, neither of which is guaranteed on AlmaLinux 9.
//! The patcher rewrites those call sites to use detector helpers and injects
//! the helpers into the installer. The helpers are rendered from the same
//! candidate lists the Rust detector uses.

use anyhow::{Context, Result};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::detector::{
    FALLBACK_MARIADB_COMMAND, FALLBACK_MARIADB_SERVICE, MARIADB_COMMANDS, MARIADB_SERVICES,
};

/// Exit status used when the installer file does not exist
pub const FILE_NOT_FOUND_EXIT: i32 = 16;

const OLD_CLIENT_COMMAND: &str = r#"            command = 'mariadb -u root -e "' + passwordCMD + '"'

            install_utils.call(command, self.distro, command, command, 0, 0, os.EX_OSERR)"#;

const NEW_CLIENT_COMMAND: &str = r#"            # Find the correct MariaDB client command
            mariadb_cmd = find_mariadb_command()
            command = mariadb_cmd + ' -u root -e "' + passwordCMD + '"'

            install_utils.call(command, self.distro, command, command, 0, 0, os.EX_OSERR)"#;

const OLD_SERVICE_START: &str = "            ############## Start mariadb ######################
            self.manage_service('mariadb', 'start')";

const NEW_SERVICE_START: &str = "            ############## Start mariadb ######################
            # Find the correct MariaDB service name
            mariadb_service = find_mariadb_service()
            self.manage_service(mariadb_service, 'start')";

const OLD_SERVICE_ENABLE: &str = "            self.manage_service('mariadb', 'enable')";

const NEW_SERVICE_ENABLE: &str = "            self.manage_service(mariadb_service, 'enable')";

/// Helpers are inserted in front of the installer class
const CLASS_MARKER: &str = "\nclass InstallCyberPanel:";

const HELPERS_SIGNATURE: &str = "def find_mariadb_command():";

/// What to do with the file when some anchors could not be found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PartialPolicy {
    /// Write whatever applied; success once the file existed
    #[default]
    WriteApplied,
    /// Leave the file untouched unless every anchor applied or was already applied
    AllOrNothing,
}

/// How an anchor edits the installer text
#[derive(Debug, Clone)]
pub enum Edit {
    /// Replace every occurrence of `find` with `replace`
    Replace { find: String, replace: String },
    /// Insert `text` in front of the first occurrence of `marker`.
    /// `signature` identifies text that was already inserted.
    InsertBefore {
        marker: String,
        text: String,
        signature: String,
    },
}

/// A named, self-describing edit of the installer
#[derive(Debug, Clone)]
pub struct Anchor {
    pub name: &'static str,
    /// Printed when the edit applies
    pub applied_message: &'static str,
    /// Printed when the anchor is missing
    pub missing_message: &'static str,
    pub edit: Edit,
}

impl Anchor {
    fn apply(&self, content: &mut String) -> PatchStatus {
        match &self.edit {
            Edit::Replace { find, replace } => {
                let occurrences = content.matches(find.as_str()).count();
                if occurrences > 0 {
                    *content = content.replace(find.as_str(), replace);
                    PatchStatus::Applied { occurrences }
                } else if content.contains(replace.as_str()) {
                    PatchStatus::AlreadyApplied
                } else {
                    PatchStatus::AnchorMissing
                }
            }
            Edit::InsertBefore {
                marker,
                text,
                signature,
            } => {
                if content.contains(signature.as_str()) {
                    return PatchStatus::AlreadyApplied;
                }
                match content.find(marker.as_str()) {
                    Some(pos) => {
                        content.insert_str(pos, text);
                        PatchStatus::Applied { occurrences: 1 }
                    }
                    None => PatchStatus::AnchorMissing,
                }
            }
        }
    }
}

/// Result of attempting a single anchor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchStatus {
    Applied { occurrences: usize },
    AlreadyApplied,
    AnchorMissing,
}

#[derive(Debug, Clone)]
pub struct AnchorOutcome {
    /// Position of the anchor in the table, starting at 0
    pub index: usize,
    pub name: &'static str,
    pub status: PatchStatus,
    message: String,
}

impl AnchorOutcome {
    /// Human-readable progress line for this anchor
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Outcome of a patcher run
#[derive(Debug, Clone)]
pub struct PatchReport {
    pub path: PathBuf,
    pub file_found: bool,
    /// Whether the file was rewritten
    pub written: bool,
    pub policy: PartialPolicy,
    pub outcomes: Vec<AnchorOutcome>,
}

impl PatchReport {
    fn not_found(path: &Path, policy: PartialPolicy) -> Self {
        Self {
            path: path.to_path_buf(),
            file_found: false,
            written: false,
            policy,
            outcomes: Vec::new(),
        }
    }

    /// Anchors that could not be found
    pub fn missing(&self) -> impl Iterator<Item = &AnchorOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.status == PatchStatus::AnchorMissing)
    }

    /// Every anchor is applied, now or by an earlier run
    pub fn is_complete(&self) -> bool {
        self.file_found && self.missing().next().is_none()
    }

    /// Overall success under the report's policy
    pub fn succeeded(&self) -> bool {
        match self.policy {
            PartialPolicy::WriteApplied => self.file_found,
            PartialPolicy::AllOrNothing => self.is_complete(),
        }
    }

    /// Process exit status: one bit per missing anchor, or
    /// [`FILE_NOT_FOUND_EXIT`] when there was nothing to patch
    pub fn exit_code(&self) -> i32 {
        if !self.file_found {
            return FILE_NOT_FOUND_EXIT;
        }
        self.missing().fold(0, |code, outcome| code | (1 << outcome.index))
    }
}

impl fmt::Display for PatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.file_found {
            return write!(f, "ERROR: {} not found", self.path.display());
        }

        let missing = self.missing().count();
        if self.written && missing == 0 {
            write!(f, "Successfully patched {}", self.path.display())
        } else if self.written {
            write!(
                f,
                "Patched {} with {} of {} anchors missing",
                self.path.display(),
                missing,
                self.outcomes.len()
            )
        } else {
            write!(
                f,
                "Left {} unchanged: {} of {} anchors missing",
                self.path.display(),
                missing,
                self.outcomes.len()
            )
        }
    }
}

/// The installer edits, in the order they are applied
pub fn installer_anchors() -> Vec<Anchor> {
    vec![
        Anchor {
            name: "mariadb-client-command",
            applied_message: "Applied patch 1: Fixed MariaDB command detection in changeMYSQLRootPassword",
            missing_message: "WARNING: Could not find changeMYSQLRootPassword method to patch",
            edit: Edit::Replace {
                find: OLD_CLIENT_COMMAND.to_string(),
                replace: NEW_CLIENT_COMMAND.to_string(),
            },
        },
        Anchor {
            name: "mariadb-service-start",
            applied_message: "Applied patch 2: Fixed MariaDB service detection in startMariaDB",
            missing_message: "WARNING: Could not find startMariaDB method to patch",
            edit: Edit::Replace {
                find: OLD_SERVICE_START.to_string(),
                replace: NEW_SERVICE_START.to_string(),
            },
        },
        Anchor {
            name: "mariadb-service-enable",
            applied_message: "Applied patch 3: Fixed MariaDB service enablement",
            missing_message: "WARNING: Could not find MariaDB enable command to patch",
            edit: Edit::Replace {
                find: OLD_SERVICE_ENABLE.to_string(),
                replace: NEW_SERVICE_ENABLE.to_string(),
            },
        },
        Anchor {
            name: "detector-helpers",
            applied_message: "Applied patch 4: Added helper functions for MariaDB detection",
            missing_message: "WARNING: Could not find class definition to add helper functions",
            edit: Edit::InsertBefore {
                marker: CLASS_MARKER.to_string(),
                text: python_helpers(),
                signature: HELPERS_SIGNATURE.to_string(),
            },
        },
    ]
}

fn python_list(items: &[&str]) -> String {
    let quoted: Vec<String> = items.iter().map(|item| format!("'{}'", item)).collect();
    format!("[{}]", quoted.join(", "))
}

/// Python source of the detector helpers injected into the installer
pub fn python_helpers() -> String {
    format!(
        r#"
# Helper functions for AlmaLinux 9 compatibility
def find_mariadb_command():
    """Return the first MariaDB client found on PATH, or '{command_fallback}'."""
    import subprocess
    import os

    for cmd in {commands}:
        try:
            result = subprocess.run(['which', cmd], capture_output=True, text=True)
            if result.returncode == 0 and os.path.exists(result.stdout.strip()):
                return result.stdout.strip()
        except Exception:
            continue

    return '{command_fallback}'

def find_mariadb_service():
    """Return the first registered MariaDB unit name, or '{service_fallback}'."""
    import subprocess

    for service in {services}:
        try:
            result = subprocess.run(['systemctl', 'list-unit-files', service + '.service'],
                                    capture_output=True, text=True)
            if result.returncode == 0 and service + '.service' in result.stdout:
                return service
        except Exception:
            continue

    return '{service_fallback}'

"#,
        commands = python_list(MARIADB_COMMANDS),
        command_fallback = FALLBACK_MARIADB_COMMAND,
        services = python_list(MARIADB_SERVICES),
        service_fallback = FALLBACK_MARIADB_SERVICE,
    )
}

/// Apply `anchors` in order, returning the new text and one outcome per anchor
pub fn apply_anchors(content: &str, anchors: &[Anchor]) -> (String, Vec<AnchorOutcome>) {
    let mut patched = content.to_string();

    let outcomes = anchors
        .iter()
        .enumerate()
        .map(|(index, anchor)| {
            let status = anchor.apply(&mut patched);
            let message = match status {
                PatchStatus::Applied { .. } => anchor.applied_message.to_string(),
                PatchStatus::AlreadyApplied => {
                    format!("Patch {} ({}) already applied", index + 1, anchor.name)
                }
                PatchStatus::AnchorMissing => anchor.missing_message.to_string(),
            };
            AnchorOutcome {
                index,
                name: anchor.name,
                status,
                message,
            }
        })
        .collect();

    (patched, outcomes)
}

/// Patch the installer at `path` in place
///
/// A missing file is reported in the returned report rather than as an
/// error; I/O failures on an existing file are errors.
pub fn patch_installer(path: &Path, policy: PartialPolicy) -> Result<PatchReport> {
    if !path.exists() {
        log::error!("{} not found", path.display());
        return Ok(PatchReport::not_found(path, policy));
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read installer {}", path.display()))?;

    let (patched, outcomes) = apply_anchors(&content, &installer_anchors());

    for outcome in &outcomes {
        println!("{}", outcome.message());
        match outcome.status {
            PatchStatus::AnchorMissing => {
                log::warn!("Anchor {} not found in {}", outcome.name, path.display())
            }
            _ => log::debug!("Anchor {}: {:?}", outcome.name, outcome.status),
        }
    }

    let mut report = PatchReport {
        path: path.to_path_buf(),
        file_found: true,
        written: false,
        policy,
        outcomes,
    };

    if policy == PartialPolicy::AllOrNothing && !report.is_complete() {
        log::warn!(
            "Not writing {}: all-or-nothing policy and {} anchors missing",
            path.display(),
            report.missing().count()
        );
        return Ok(report);
    }

    fs::write(path, patched)
        .with_context(|| format!("Failed to write installer {}", path.display()))?;
    report.written = true;

    Ok(report)
}
