//! Fixed lookup tables for package installation.
//!
//! Distro → package manager, tool → package name, and the allow/deny lists
//! that gate automatic installation. Loaded once, never mutated.

use std::fmt;

/// Package-manager family used to install tools on a distro.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageManager {
    AptGet,
    Yum,
    Dnf,
    Pacman,
    Zypper,
    Apk,
}

impl PackageManager {
    pub fn binary(self) -> &'static str {
        match self {
            PackageManager::AptGet => "apt-get",
            PackageManager::Yum => "yum",
            PackageManager::Dnf => "dnf",
            PackageManager::Pacman => "pacman",
            PackageManager::Zypper => "zypper",
            PackageManager::Apk => "apk",
        }
    }

    /// Non-interactive install invocation for `package`, as argv.
    pub fn install_argv(self, package: &str) -> Vec<String> {
        let args: &[&str] = match self {
            PackageManager::AptGet | PackageManager::Yum | PackageManager::Dnf => {
                &["install", "-y"]
            }
            PackageManager::Pacman => &["-S", "--noconfirm"],
            PackageManager::Zypper => &["install", "-y"],
            PackageManager::Apk => &["add"],
        };
        let mut argv = Vec::with_capacity(args.len() + 2);
        argv.push(self.binary().to_string());
        argv.extend(args.iter().map(|arg| arg.to_string()));
        argv.push(package.to_string());
        argv
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binary())
    }
}

const DISTRO_TABLE: &[(&str, PackageManager)] = &[
    ("debian", PackageManager::AptGet),
    ("ubuntu", PackageManager::AptGet),
    ("mint", PackageManager::AptGet),
    ("linuxmint", PackageManager::AptGet),
    ("kali", PackageManager::AptGet),
    ("raspbian", PackageManager::AptGet),
    ("rhel", PackageManager::Yum),
    ("centos", PackageManager::Yum),
    ("fedora", PackageManager::Dnf),
    ("rocky", PackageManager::Dnf),
    ("alma", PackageManager::Dnf),
    ("almalinux", PackageManager::Dnf),
    ("amzn", PackageManager::Dnf),
    ("arch", PackageManager::Pacman),
    ("manjaro", PackageManager::Pacman),
    ("endeavouros", PackageManager::Pacman),
    ("opensuse", PackageManager::Zypper),
    ("opensuse-leap", PackageManager::Zypper),
    ("opensuse-tumbleweed", PackageManager::Zypper),
    ("sles", PackageManager::Zypper),
    ("alpine", PackageManager::Apk),
];

/// Packages that may be installed without confirmation.
const SAFE_PACKAGES: &[&str] = &[
    // Web servers
    "nginx",
    "apache2",
    "httpd",
    // Development tools
    "git",
    "curl",
    "wget",
    "vim",
    "nano",
    "emacs",
    // System utilities
    "htop",
    "tree",
    "jq",
    "tmux",
    "screen",
    "net-tools",
    "netstat",
    "ss",
    "iproute2",
    "iptables",
    "firewalld",
    "rsync",
    "unzip",
    "zip",
    "lsof",
    // Programming languages
    "python3",
    "python3-pip",
    "nodejs",
    "npm",
    "gcc",
    "make",
    "build-essential",
];

/// Packages that are never installed automatically.
const DANGEROUS_PACKAGES: &[&str] = &[
    "malware",
    "ransomware",
    "bitcoin-miner",
    "cryptominer",
    "rootkit",
];

/// Look up the package manager for a distro identifier (case-insensitive).
pub fn package_manager_for(distro: &str) -> Option<PackageManager> {
    let distro = distro.trim().to_ascii_lowercase();
    DISTRO_TABLE
        .iter()
        .find(|(id, _)| *id == distro)
        .map(|(_, manager)| *manager)
}

/// Map a tool (binary) name to the package that provides it.
pub fn package_for_tool(tool: &str, manager: PackageManager) -> String {
    let package = match (tool, manager) {
        ("netstat" | "ifconfig" | "route", _) => "net-tools",
        ("ss" | "ip", PackageManager::Yum | PackageManager::Dnf) => "iproute",
        ("ss" | "ip", _) => "iproute2",
        ("pip3", PackageManager::Pacman) => "python-pip",
        ("pip3", PackageManager::Apk) => "py3-pip",
        ("pip3", _) => "python3-pip",
        ("node", _) => "nodejs",
        _ => tool,
    };
    package.to_string()
}

pub fn is_dangerous_package(package: &str) -> bool {
    DANGEROUS_PACKAGES.contains(&package)
}

pub fn is_known_safe_package(package: &str) -> bool {
    SAFE_PACKAGES.contains(&package)
}

/// Whether `package` may be installed automatically.
///
/// Deny-list entries and unrecognized names are both refused.
pub fn is_safe_to_install(package: &str) -> bool {
    !is_dangerous_package(package) && is_known_safe_package(package)
}
