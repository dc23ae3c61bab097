//! Deterministic classification of failed command output.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::types::ErrorType;
use crate::exit_codes;

/// Exit codes that decide the classification on their own.
const EXIT_CODE_TABLE: &[(i32, ErrorType)] = &[
    (exit_codes::NOT_FOUND, ErrorType::MissingTool),
    (exit_codes::NOT_EXECUTABLE, ErrorType::PermissionDenied),
    (exit_codes::TIMEOUT, ErrorType::Timeout),
    (exit_codes::SHELL_MISUSE, ErrorType::SyntaxError),
];

/// Stderr pattern groups in priority order; the first matching group wins.
///
/// `MissingTool` precedes `FileNotFound` so that `nginx: No such file or
/// directory` (a missing binary) is not read as a missing data file.
const PATTERN_GROUPS: &[(ErrorType, &[&str])] = &[
    (
        ErrorType::MissingTool,
        &[
            r"command not found",
            r"not found",
            r"no such file or directory.*bin/",
            r"not installed",
            r"/usr/bin/env:.*no such file",
            r"^[\w.+-]+:\s+no such file or directory\s*$",
        ],
    ),
    (
        ErrorType::PermissionDenied,
        &[
            r"permission denied",
            r"access denied",
            r"operation not permitted",
            r"you do not have permission",
            r"must be root",
            r"requires? root",
        ],
    ),
    (
        ErrorType::SyntaxError,
        &[
            r"syntax error",
            r"invalid option",
            r"unexpected token",
            r"unexpected eof",
            r"parse error",
            r"invalid syntax",
        ],
    ),
    (
        ErrorType::NetworkError,
        &[
            r"could not resolve host",
            r"connection refused",
            r"network is unreachable",
            r"name or service not known",
            r"temporary failure in name resolution",
            r"timeout.*connect",
        ],
    ),
    (
        ErrorType::FileNotFound,
        &[
            r"no such file or directory",
            r"cannot find.*file",
            r"does not exist",
            r"failed to open",
        ],
    ),
];

static COMPILED_GROUPS: LazyLock<Vec<(ErrorType, Vec<Regex>)>> = LazyLock::new(|| {
    PATTERN_GROUPS
        .iter()
        .map(|(error_type, patterns)| {
            let compiled = patterns
                .iter()
                .map(|pattern| {
                    Regex::new(&format!("(?im){pattern}")).expect("valid classifier regex")
                })
                .collect();
            (*error_type, compiled)
        })
        .collect()
});

static MISSING_TOOL_EXTRACTORS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // bash: nginx: command not found
        r"(?m)\b(?:ba|z|k|da)?sh:\s+(?:line \d+:\s+)?([\w.+-]+):\s+command not found",
        // zsh: command not found: nginx
        r"(?m)command not found:\s+([\w.+-]+)",
        // /usr/bin/env: 'python3': No such file or directory
        r"(?m)/usr/bin/env:\s+'?([\w.+-]+)'?:",
        // /bin/sh: 1: nginx: not found
        r"(?m)\bsh:\s+\d+:\s+([\w.+-]+):\s+not found",
        // nginx: not found
        r"(?m)^([\w.+-]+):\s+not found",
        // nginx: No such file or directory
        r"(?m)^([\w.+-]+):\s+No such file",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("valid extractor regex"))
    .collect()
});

static MISSING_FILE_EXTRACTORS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // cat: /etc/missing.conf: No such file or directory
        r":\s+'?([/\w.~-]*/[/\w.~-]*|[\w~-][\w.~-]*\.[\w~-]+)'?:\s+No such file or directory",
        // cannot find /etc/config.conf
        r"(?i)cannot find\s+'?([/\w.~-]+)'?",
        // cannot open '/etc/foo' (No such file or directory)
        r"(?i)cannot (?:open|access|stat)\s+'([^']+)'",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("valid extractor regex"))
    .collect()
});

/// Classify a failure from its stderr and exit code.
///
/// Pure: identical inputs always yield the same type, and exit-code table
/// entries take precedence over any stderr text.
pub fn classify(stderr: &str, exit_code: i32) -> ErrorType {
    if let Some((_, error_type)) = EXIT_CODE_TABLE.iter().find(|(code, _)| *code == exit_code) {
        return *error_type;
    }

    if stderr.trim().is_empty() {
        return ErrorType::Unknown;
    }

    COMPILED_GROUPS
        .iter()
        .find(|(_, patterns)| patterns.iter().any(|regex| regex.is_match(stderr)))
        .map(|(error_type, _)| *error_type)
        .unwrap_or(ErrorType::Unknown)
}

/// Extract the missing tool name from a "command not found" style message.
pub fn extract_missing_tool(stderr: &str) -> Option<String> {
    first_capture(&MISSING_TOOL_EXTRACTORS, stderr)
}

/// Extract the missing file path from a "no such file" style message.
pub fn extract_missing_file(stderr: &str) -> Option<String> {
    first_capture(&MISSING_FILE_EXTRACTORS, stderr)
}

fn first_capture(patterns: &[Regex], text: &str) -> Option<String> {
    patterns.iter().find_map(|regex| {
        regex
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .filter(|value| !value.is_empty())
    })
}
