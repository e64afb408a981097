// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Log Directive Parsing
//!
//! Extracts the file behind an nginx `access_log` / `error_log` directive.
//! Configuration may change between requests, so nothing here is cached.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A log stream whose location is declared in the nginx configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStream {
    Access,
    Error,
}

impl LogStream {
    /// Directive that declares this stream
    pub fn directive(&self) -> &'static str {
        match self {
            LogStream::Access => "access_log",
            LogStream::Error => "error_log",
        }
    }
}

/// Resolved location of a log directive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogDirective {
    pub directive_name: String,
    pub resolved_path: PathBuf,
}

/// Whether a directive value routes output somewhere other than a file
///
/// `off`, `stderr`, `syslog:...` and `memory:...` have no file to tail.
pub fn is_non_file_sink(value: &str) -> bool {
    value == "off"
        || value == "stderr"
        || value.starts_with("syslog:")
        || value.starts_with("memory:")
}

/// First usable path declared for `directive` in `config_text`
///
/// Comment lines are skipped. Values naming a non-file sink are passed over
/// and the search continues with the next occurrence. Relative values are
/// joined onto `config_dir`.
pub fn find_directive(config_text: &str, directive: &str, config_dir: &Path) -> Option<PathBuf> {
    let pattern = format!(r"^\s*{}\s+([^\s;]+)", regex::escape(directive));
    let re = Regex::new(&pattern).ok()?;

    for line in config_text.lines() {
        if line.trim_start().starts_with('#') {
            continue;
        }

        let Some(value) = re.captures(line).and_then(|c| c.get(1)).map(|m| m.as_str()) else {
            continue;
        };

        if is_non_file_sink(value) {
            continue;
        }

        let path = Path::new(value);
        return Some(if path.is_absolute() {
            path.to_path_buf()
        } else {
            config_dir.join(path)
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONF: &str = r#"
user www-data;
# access_log /var/log/commented.log;
error_log /var/log/nginx/error.log warn;

http {
    access_log   /var/log/nginx/access.log combined;
    access_log   /var/log/nginx/second.log;
}
"#;

    #[test]
    fn test_first_match_wins() {
        let found = find_directive(CONF, "access_log", Path::new("/etc/nginx"));
        assert_eq!(found, Some(PathBuf::from("/var/log/nginx/access.log")));
    }

    #[test]
    fn test_trailing_level_and_terminator_ignored() {
        let found = find_directive(CONF, "error_log", Path::new("/etc/nginx"));
        assert_eq!(found, Some(PathBuf::from("/var/log/nginx/error.log")));

        let found = find_directive("error_log logs/e.log;", "error_log", Path::new("/etc/nginx"));
        assert_eq!(found, Some(PathBuf::from("/etc/nginx/logs/e.log")));
    }

    #[test]
    fn test_relative_to_config_directory() {
        let found = find_directive("access_log logs/access.log;", "access_log", Path::new("/srv/nginx"));
        assert_eq!(found, Some(PathBuf::from("/srv/nginx/logs/access.log")));
    }

    #[test]
    fn test_sinks_are_skipped() {
        let conf = "access_log off;\naccess_log syslog:server=10.0.0.1;\naccess_log /var/log/real.log;\n";
        let found = find_directive(conf, "access_log", Path::new("/etc/nginx"));
        assert_eq!(found, Some(PathBuf::from("/var/log/real.log")));

        let conf = "error_log stderr;\nerror_log memory:32m debug;\n";
        assert_eq!(find_directive(conf, "error_log", Path::new("/etc/nginx")), None);
    }

    #[test]
    fn test_directive_name_must_match_whole_word() {
        let conf = "access_log_format x;\nmy_access_log /tmp/x.log;\n";
        assert_eq!(find_directive(conf, "access_log", Path::new("/etc/nginx")), None);
    }

    #[test]
    fn test_commented_directive_ignored() {
        let conf = "  # error_log /var/log/old.log;\n";
        assert_eq!(find_directive(conf, "error_log", Path::new("/etc/nginx")), None);
    }
}
