//! Pre-execution gate for catastrophic commands.
//!
//! Pure and stateless: the pattern tables are compiled once and never change,
//! so the verdict for a command does not depend on call order.

use std::sync::LazyLock;

use regex::Regex;

/// Patterns that always reject a command, matched case-insensitively.
const DANGEROUS_PATTERNS: &[(&str, &str)] = &[
    (
        "recursive delete of root",
        r"\brm\s+(?:-[a-z]*r[a-z]*\s+|-[a-z]+\s+|--recursive\s+|--force\s+|--no-preserve-root\s+)+/(?:\*|\s|$)",
    ),
    (
        "raw disk write",
        r"\bdd\s+.*\bof=/dev/(?:sd|hd|vd|xvd|nvme|mmcblk)",
    ),
    ("raw disk redirect", r">\s*/dev/(?:sd|hd|vd|xvd|nvme|mmcblk)"),
    ("permissive chmod of root", r"\bchmod\s+-R\s+777\s+/(?:\*|\s|$)"),
    ("fork bomb", r":\(\)\s*\{.*:\|:&\s*\};\s*:"),
    ("filesystem format", r"\bmkfs(?:\.|\s|$)"),
    ("wipe signatures", r"\bwipefs\b"),
    ("partition manipulation", r"\bfdisk\b|\bparted\b.*\b(?:rm|delete|mklabel)\b"),
    ("kill init", r"\bkill\s+-(?:9|KILL|SIGKILL)\s+1\b"),
];

/// Keyword rules: a command containing `keyword` is rejected unless it also
/// contains one of the `exceptions`.
const DANGEROUS_KEYWORDS: &[(&str, &[&str])] = &[
    ("format", &["date", "--format", "printf"]),
    (":(){", &[]),
];

static COMPILED: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    DANGEROUS_PATTERNS
        .iter()
        .map(|(label, pattern)| {
            let regex = Regex::new(&format!("(?i){pattern}")).expect("valid safety regex");
            (*label, regex)
        })
        .collect()
});

/// Return the reason a command is rejected, or `None` if it is allowed.
pub fn rejection_reason(command: &str) -> Option<&'static str> {
    for (label, regex) in &*COMPILED {
        if regex.is_match(command) {
            return Some(*label);
        }
    }

    let lower = command.to_lowercase();
    for (keyword, exceptions) in DANGEROUS_KEYWORDS {
        if lower.contains(keyword) && !exceptions.iter().any(|ctx| lower.contains(ctx)) {
            return Some(*keyword);
        }
    }

    None
}

/// Whether `command` may be executed.
pub fn is_safe(command: &str) -> bool {
    rejection_reason(command).is_none()
}
