//! Tool presence detection and package installation.

use std::collections::BTreeMap;
use std::process::{Command, Stdio};
use std::time::Duration;

use tracing::{debug, error, info, instrument, warn};

use crate::cancel::CancelToken;
use crate::core::packages::{self, is_dangerous_package, package_for_tool, package_manager_for};
use crate::core::types::InstallationResult;
use crate::error::HealError;
use crate::io::config::{DEFAULT_OUTPUT_LIMIT_BYTES, InstallConfig};
use crate::io::process::run_command_with_timeout;

/// Installs missing tools through the host package manager.
pub trait Installer: Send + Sync {
    /// Whether `tool` resolves on `PATH` (a `which`-style lookup).
    fn is_installed(&self, tool: &str) -> bool;

    /// Whether `tool` may be installed without a human in the loop.
    fn is_safe_to_install(&self, tool: &str) -> bool;

    /// Install `tool` on `distro`.
    ///
    /// A package-manager failure is reported through the result. Deny-listed
    /// packages and distros without a package manager are errors. Cancelling
    /// `cancel` kills the package manager the way a timeout does.
    fn install(
        &self,
        tool: &str,
        distro: &str,
        cancel: &CancelToken,
    ) -> Result<InstallationResult, HealError>;
}

/// [`Installer`] that runs the distro's package manager directly (no shell).
#[derive(Debug, Clone)]
pub struct ToolInstaller {
    sudo: bool,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl ToolInstaller {
    pub fn new(config: &InstallConfig) -> Self {
        Self {
            sudo: config.sudo,
            timeout: Duration::from_secs(config.timeout_secs),
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
        }
    }

    pub fn with_output_limit(mut self, output_limit_bytes: usize) -> Self {
        self.output_limit_bytes = output_limit_bytes;
        self
    }

    /// Install argv for `tool` on `distro`, `sudo`-prefixed when configured.
    pub fn install_argv(&self, tool: &str, distro: &str) -> Result<Vec<String>, HealError> {
        let manager = package_manager_for(distro).ok_or_else(|| HealError::UnsupportedDistro {
            distro: distro.to_string(),
        })?;
        let mut argv = Vec::new();
        if self.sudo {
            argv.push("sudo".to_string());
        }
        argv.extend(manager.install_argv(&package_for_tool(tool, manager)));
        Ok(argv)
    }

    /// Rendered install command, as shown to operators.
    pub fn install_command(&self, tool: &str, distro: &str) -> Result<String, HealError> {
        Ok(self.install_argv(tool, distro)?.join(" "))
    }

    /// Install each tool in order. Refused or unsupported entries become
    /// failed results instead of stopping the batch.
    pub fn install_multiple(
        &self,
        tools: &[&str],
        distro: &str,
        cancel: &CancelToken,
    ) -> Vec<InstallationResult> {
        tools
            .iter()
            .map(|tool| match self.install(tool, distro, cancel) {
                Ok(result) => result,
                Err(err) => {
                    error!(tool, error = %err, "cannot install tool");
                    InstallationResult::refused(*tool, err.to_string())
                }
            })
            .collect()
    }

    /// Report which tools are present, installing missing safe ones when
    /// `auto_install` is set.
    pub fn check_and_install_missing(
        &self,
        tools: &[&str],
        distro: &str,
        auto_install: bool,
        cancel: &CancelToken,
    ) -> BTreeMap<String, bool> {
        let mut status = BTreeMap::new();
        for &tool in tools {
            if self.is_installed(tool) {
                debug!(tool, "tool already installed");
                status.insert(tool.to_string(), true);
                continue;
            }

            info!(tool, "tool is not installed");
            let installed = auto_install
                && self.is_safe_to_install(tool)
                && match self.install(tool, distro, cancel) {
                    Ok(result) => result.success,
                    Err(err) => {
                        error!(tool, error = %err, "failed to install tool");
                        false
                    }
                };
            status.insert(tool.to_string(), installed);
        }
        status
    }
}

impl Default for ToolInstaller {
    fn default() -> Self {
        Self::new(&InstallConfig::default())
    }
}

impl Installer for ToolInstaller {
    fn is_installed(&self, tool: &str) -> bool {
        // `command -v` is a shell builtin, unlike `which`.
        match Command::new("sh")
            .args(["-c", "command -v \"$1\"", "sh", tool])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
        {
            Ok(status) => status.success(),
            Err(err) => {
                debug!(tool, error = %err, "tool lookup failed");
                false
            }
        }
    }

    fn is_safe_to_install(&self, tool: &str) -> bool {
        let safe = packages::is_safe_to_install(tool);
        if !safe && !is_dangerous_package(tool) {
            warn!(tool, "unknown package requires manual confirmation");
        }
        safe
    }

    #[instrument(skip_all, fields(tool = %tool, distro = %distro))]
    fn install(
        &self,
        tool: &str,
        distro: &str,
        cancel: &CancelToken,
    ) -> Result<InstallationResult, HealError> {
        if is_dangerous_package(tool) {
            return Err(HealError::DangerousPackage {
                package: tool.to_string(),
            });
        }
        let argv = self.install_argv(tool, distro)?;
        info!(command = %argv.join(" "), "installing tool");

        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..]);
        let output = match run_command_with_timeout(
            cmd,
            self.timeout,
            self.output_limit_bytes,
            cancel,
        ) {
            Ok(output) => output,
            Err(err) => {
                error!(error = %format!("{err:#}"), "package manager did not start");
                return Ok(InstallationResult::refused(tool, format!("{err:#}")));
            }
        };

        let result = InstallationResult::new(
            tool,
            output.exit_code(),
            output.stdout_lossy(),
            output.stderr_lossy(),
        );
        if result.success {
            info!("tool installed");
        } else {
            let excerpt: String = result.stderr.chars().take(200).collect();
            error!(exit_code = result.exit_code, stderr = %excerpt, "tool install failed");
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn installer(sudo: bool) -> ToolInstaller {
        ToolInstaller::new(&InstallConfig {
            sudo,
            timeout_secs: 5,
        })
    }

    #[test]
    fn install_command_follows_distro_and_sudo() {
        assert_eq!(
            installer(true).install_command("nginx", "ubuntu").unwrap(),
            "sudo apt-get install -y nginx"
        );
        assert_eq!(
            installer(false).install_command("jq", "arch").unwrap(),
            "pacman -S --noconfirm jq"
        );
        assert_eq!(
            installer(false).install_command("netstat", "centos").unwrap(),
            "yum install -y net-tools"
        );
    }

    #[test]
    fn unsupported_distro_is_an_error() {
        assert_eq!(
            installer(false).install_command("jq", "plan9").unwrap_err(),
            HealError::UnsupportedDistro {
                distro: "plan9".to_string()
            }
        );
        assert!(installer(false)
                .install("jq", "plan9", &CancelToken::new())
                .is_err());
    }

    #[test]
    fn dangerous_package_is_refused_before_anything_runs() {
        let err = installer(false)
            .install("rootkit", "debian", &CancelToken::new())
            .unwrap_err();
        assert_eq!(
            err,
            HealError::DangerousPackage {
                package: "rootkit".to_string()
            }
        );
    }

    #[test]
    fn safety_uses_allow_and_deny_lists() {
        let installer = installer(false);
        assert!(installer.is_safe_to_install("git"));
        assert!(!installer.is_safe_to_install("cryptominer"));
        assert!(!installer.is_safe_to_install("some-unknown-thing"));
    }

    #[test]
    fn install_multiple_reports_refusals_as_failed_results() {
        let results = installer(false).install_multiple(
            &["rootkit", "jq"],
            "plan9",
            &CancelToken::new(),
        );
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|result| !result.success));
        assert!(results[0].stderr.contains("dangerous package"));
        assert!(results[1].stderr.contains("unsupported distribution"));
        assert_eq!(results[1].exit_code, 1);
    }

    #[cfg(unix)]
    #[test]
    fn check_and_install_missing_without_auto_install() {
        let status = installer(false).check_and_install_missing(
            &["sh", "definitely-not-a-real-tool-xyz"],
            "debian",
            false,
            &CancelToken::new(),
        );
        assert_eq!(status.get("sh"), Some(&true));
        assert_eq!(status.get("definitely-not-a-real-tool-xyz"), Some(&false));
    }
}
