//! Application path management for portable and installed modes.
//!
//! - **Portable mode**: If a `.portable` marker file exists next to the
//!   executable, all data files live in the same directory.
//! - **Installed mode** (default): Data is stored under the platform data
//!   directory (`%APPDATA%` on Windows, `~/.local/share` on Linux).

use std::path::PathBuf;
use tracing::debug;

/// Application name used for directories in installed mode
const APP_NAME: &str = "VTX GW";

/// Application paths for config, saved programs, and logs.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Path to the configuration file
    pub config: PathBuf,
    /// Directory holding locally saved programs and full-amp files
    pub programs_dir: PathBuf,
    /// Path to the logs directory
    pub logs_dir: PathBuf,
    /// Whether running in portable mode (config next to exe)
    pub is_portable: bool,
}

impl AppPaths {
    /// Detect the appropriate paths based on environment.
    ///
    /// **Debug mode**: If `config.yaml` exists in the current working
    /// directory (typical when running with `cargo run`), use that
    /// directory.
    ///
    /// **Portable mode**: a `.portable` marker file next to the executable
    /// keeps everything beside the binary. Explicit opt-in so an install
    /// under `C:\Program Files` never tries to write there.
    ///
    /// Note: This is called before logging is initialized, so early
    /// diagnostics go to stderr.
    pub fn detect() -> Self {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."));

        #[cfg(debug_assertions)]
        {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            let cwd_config = cwd.join("config.yaml");
            if cwd_config.exists() {
                eprintln!(
                    "[paths] Running in DEV mode (config.yaml found in cwd: {})",
                    cwd.display()
                );
                return Self {
                    config: cwd_config,
                    programs_dir: cwd.join("programs"),
                    logs_dir: cwd.join("logs"),
                    is_portable: true,
                };
            }
        }

        let portable_marker = exe_dir.join(".portable");
        if portable_marker.exists() {
            Self {
                config: exe_dir.join("config.yaml"),
                programs_dir: exe_dir.join("programs"),
                logs_dir: exe_dir.join("logs"),
                is_portable: true,
            }
        } else {
            let app_data = dirs::data_dir()
                .unwrap_or_else(|| {
                    eprintln!(
                        "[paths] WARNING: dirs::data_dir() returned None, falling back to exe dir"
                    );
                    exe_dir.clone()
                })
                .join(APP_NAME);

            Self {
                config: app_data.join("config.yaml"),
                programs_dir: app_data.join("programs"),
                logs_dir: app_data.join("logs"),
                is_portable: false,
            }
        }
    }

    /// Get the base directory (for displaying in logs)
    pub fn base_dir(&self) -> PathBuf {
        self.config
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> anyhow::Result<()> {
        if !self.programs_dir.exists() {
            debug!(
                "Creating programs directory: {}",
                self.programs_dir.display()
            );
            std::fs::create_dir_all(&self.programs_dir)?;
        }

        if !self.logs_dir.exists() {
            debug!("Creating logs directory: {}", self.logs_dir.display());
            std::fs::create_dir_all(&self.logs_dir)?;
        }

        if !self.is_portable {
            if let Some(config_parent) = self.config.parent() {
                if !config_parent.exists() {
                    debug!("Creating config directory: {}", config_parent.display());
                    std::fs::create_dir_all(config_parent)?;
                }
            }
        }

        Ok(())
    }
}
