//! Panel log writer
//!
//! Mirrors every message to the `log` facade and appends it, timestamped, to
//! the panel's error log. Debug detail is only written while the debug marker
//! file exists, so operators can toggle it without restarting anything.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::settings::PanelSettings;

/// Writes diagnostics to the panel log file and the onboarding status file
pub struct PanelLog {
    log_file: Mutex<Option<File>>,
    log_path: PathBuf,
    debug_marker: PathBuf,
}

impl PanelLog {
    /// Open (or create) the log file in append mode
    ///
    /// If the file cannot be opened the logger still works, but only through
    /// the `log` facade.
    pub fn new(log_path: impl Into<PathBuf>, debug_marker: impl Into<PathBuf>) -> Self {
        let log_path = log_path.into();

        let file = match OpenOptions::new().create(true).append(true).open(&log_path) {
            Ok(file) => Some(file),
            Err(e) => {
                log::warn!(
                    "Failed to open panel log at {:?}: {}. Logging to console only.",
                    log_path,
                    e
                );
                None
            }
        };

        Self {
            log_file: Mutex::new(file),
            log_path,
            debug_marker: debug_marker.into(),
        }
    }

    pub fn from_settings(settings: &PanelSettings) -> Self {
        Self::new(&settings.log_file, &settings.debug_marker)
    }

    /// Get the log file path
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Whether the debug marker file currently exists
    pub fn debug_enabled(&self) -> bool {
        self.debug_marker.exists()
    }

    /// Log a message unconditionally
    pub fn write(&self, message: &str) {
        log::info!("{}", message);
        self.append(message);
    }

    /// Log a message only while debugging is enabled
    pub fn debug(&self, message: &str) {
        log::debug!("{}", message);
        if self.debug_enabled() {
            self.append(message);
        }
    }

    /// Replace the contents of a status file with the latest message
    ///
    /// The panel UI polls this file for onboarding progress.
    pub fn status(&self, status_path: &Path, message: &str) {
        if let Err(e) = fs::write(status_path, format!("{}\n", message)) {
            log::warn!("Failed to write status file {:?}: {}", status_path, e);
            self.append(&format!(
                "Failed to write status file {}: {}",
                status_path.display(),
                e
            ));
        }
    }

    fn append(&self, message: &str) {
        let timestamp = chrono::Local::now().format("%m.%d.%Y_%H-%M-%S");
        let formatted = format!("[{}] {}", timestamp, message);

        if let Ok(mut file_opt) = self.log_file.lock() {
            if let Some(ref mut file) = *file_opt {
                let _ = writeln!(file, "{}", formatted);
                let _ = file.flush();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_appends_timestamped_lines() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let log_path = temp_dir.path().join("error-logs.txt");
        let log = PanelLog::new(&log_path, temp_dir.path().join("debug"));

        log.write("first");
        log.write("second");

        let content = fs::read_to_string(&log_path)?;
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("] first"));
        assert!(lines[1].ends_with("] second"));
        Ok(())
    }

    #[test]
    fn test_debug_gated_by_marker() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let log_path = temp_dir.path().join("error-logs.txt");
        let marker = temp_dir.path().join("debug");
        let log = PanelLog::new(&log_path, &marker);

        log.debug("hidden");
        assert!(!log.debug_enabled());

        fs::write(&marker, "")?;
        log.debug("shown");

        let content = fs::read_to_string(&log_path)?;
        assert!(!content.contains("hidden"));
        assert!(content.contains("shown"));
        Ok(())
    }

    #[test]
    fn test_status_overwrites() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let status_path = temp_dir.path().join("status");
        let log = PanelLog::new(temp_dir.path().join("log"), temp_dir.path().join("debug"));

        log.status(&status_path, "step one");
        log.status(&status_path, "step two");

        assert_eq!(fs::read_to_string(&status_path)?, "step two\n");
        Ok(())
    }

    #[test]
    fn test_unwritable_log_falls_back_to_console() {
        let log = PanelLog::new("/nonexistent-dir/panelfix/log.txt", "/nonexistent-dir/debug");
        log.write("still fine");
        assert_eq!(log.log_path(), Path::new("/nonexistent-dir/panelfix/log.txt"));
    }
}
