//! Linux distribution detection.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::core::packages::package_manager_for;

const OS_RELEASE: &str = "/etc/os-release";

/// Reported when no distribution can be identified.
pub const UNKNOWN_DISTRO: &str = "unknown";

/// Detect the running distribution from `/etc/os-release`.
pub fn detect_distro() -> String {
    detect_distro_from(Path::new(OS_RELEASE))
}

pub fn detect_distro_from(path: &Path) -> String {
    match fs::read_to_string(path) {
        Ok(contents) => {
            parse_os_release_id(&contents).unwrap_or_else(|| UNKNOWN_DISTRO.to_string())
        }
        Err(err) => {
            debug!(path = %path.display(), error = %err, "os-release not readable");
            UNKNOWN_DISTRO.to_string()
        }
    }
}

/// Extract the distro id from os-release contents.
///
/// Prefers `ID`. If `ID` has no package-manager mapping, the first mapped
/// entry of `ID_LIKE` is used instead, so derivatives install through their
/// parent's package manager.
pub fn parse_os_release_id(contents: &str) -> Option<String> {
    let id = os_release_value(contents, "ID");
    if let Some(id) = id.as_deref()
        && package_manager_for(id).is_some()
    {
        return Some(id.to_string());
    }

    let like = os_release_value(contents, "ID_LIKE").and_then(|like| {
        like.split_whitespace()
            .find(|candidate| package_manager_for(candidate).is_some())
            .map(str::to_string)
    });
    like.or(id)
}

fn os_release_value(contents: &str, key: &str) -> Option<String> {
    contents.lines().find_map(|line| {
        let (name, value) = line.trim().split_once('=')?;
        if name.trim() != key {
            return None;
        }
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
        (!value.is_empty()).then(|| value.to_ascii_lowercase())
    })
}
