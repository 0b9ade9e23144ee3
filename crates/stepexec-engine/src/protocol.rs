//! Output protocol codec.
//!
//! A line-oriented protocol layered over stdout so structured results can
//! ride alongside arbitrary program output. The wrapper emits one
//! `__OUTPUT__<VAR>__:<value>` line per output variable; this module decodes
//! them back out and derives a marker-free log for display. A second variant
//! carries a single multi-line JSON document between `---START---` /
//! `---END---` sentinel lines (used by the helper process).

/// Opening sentinel for the JSON payload variant.
pub const JSON_START_MARKER: &str = "---START---";

/// Closing sentinel for the JSON payload variant.
pub const JSON_END_MARKER: &str = "---END---";

/// Line prefix tagging the value of output variable `name`.
pub fn marker(name: &str) -> String {
    format!("__OUTPUT__{}__:", name)
}

/// Decoded output values plus the marker-free log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    /// Resolved values in the order the variables were requested.
    pub values: Vec<String>,
    /// Stdout with every expected marker line removed.
    pub clean_stdout: String,
}

/// Decode output variables from captured stdout.
///
/// For each requested variable the first line carrying its marker wins; the
/// remainder of the line is the value, trimmed. A variable with no marker
/// resolves to `input_fallback` when one is available, otherwise it
/// contributes no value. Values preserve request order, not stdout order.
pub fn decode(stdout: &str, variables: &[String], input_fallback: Option<&str>) -> Decoded {
    let prefixes: Vec<String> = variables.iter().map(|v| marker(v)).collect();

    let mut values = Vec::new();
    for prefix in &prefixes {
        let found = stdout
            .lines()
            .find_map(|line| line.strip_prefix(prefix.as_str()))
            .map(|rest| rest.trim().to_string());
        match found {
            Some(value) => values.push(value),
            None => {
                if let Some(fallback) = input_fallback {
                    values.push(fallback.to_string());
                }
            }
        }
    }

    let clean_stdout = stdout
        .lines()
        .filter(|line| !prefixes.iter().any(|p| line.starts_with(p.as_str())))
        .collect::<Vec<_>>()
        .join("\n");

    Decoded {
        values,
        clean_stdout,
    }
}

/// Extract the JSON document between the sentinel lines of mixed log+payload
/// output.
///
/// Strict marker-delimited extraction first; when the closing sentinel is
/// missing (truncated output), fall back to the last closing brace after the
/// opening sentinel. Never parses the whole stdout as JSON.
pub fn extract_json(output: &str) -> Option<&str> {
    let start = output.find(JSON_START_MARKER)? + JSON_START_MARKER.len();
    let rest = &output[start..];

    let raw = match rest.find(JSON_END_MARKER) {
        Some(end) => &rest[..end],
        None => {
            let last_brace = rest.rfind('}')?;
            &rest[..=last_brace]
        }
    };

    let raw = raw.trim();
    if raw.is_empty() {
        None
    } else {
        Some(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_decode_preserves_request_order() {
        let stdout = "__OUTPUT__B__:/tmp/b.csv\nlog line\n__OUTPUT__A__:/tmp/a.csv\n";
        let decoded = decode(stdout, &vars(&["A", "B"]), None);
        assert_eq!(decoded.values, vec!["/tmp/a.csv", "/tmp/b.csv"]);
        assert_eq!(decoded.clean_stdout, "log line");
    }

    #[test]
    fn test_decode_first_marker_wins_and_trims() {
        let stdout = "__OUTPUT__OUT__:  /tmp/first.csv  \n__OUTPUT__OUT__:/tmp/second.csv\n";
        let decoded = decode(stdout, &vars(&["OUT"]), None);
        assert_eq!(decoded.values, vec!["/tmp/first.csv"]);
        assert!(decoded.clean_stdout.is_empty());
    }

    #[test]
    fn test_decode_missing_variable_falls_back_to_input() {
        let decoded = decode("just logs\n", &vars(&["OUT"]), Some("/tmp/in.csv"));
        assert_eq!(decoded.values, vec!["/tmp/in.csv"]);
    }

    #[test]
    fn test_decode_missing_variable_without_input_contributes_nothing() {
        let decoded = decode("just logs\n", &vars(&["OUT"]), None);
        assert!(decoded.values.is_empty());
    }

    #[test]
    fn test_clean_stdout_strips_all_marker_lines() {
        let stdout = "a\n__OUTPUT__X__:1\nb\n__OUTPUT__Y__:2\nc";
        let decoded = decode(stdout, &vars(&["X", "Y"]), None);
        assert_eq!(decoded.clean_stdout, "a\nb\nc");
        assert!(!decoded.clean_stdout.contains("__OUTPUT__"));
    }

    #[test]
    fn test_extract_json_between_markers() {
        let out = "fetching...\n---START---\n{\"success\": true}\n---END---\ndone\n";
        assert_eq!(extract_json(out), Some("{\"success\": true}"));
    }

    #[test]
    fn test_extract_json_truncated_end_marker() {
        let out = "log\n---START---{\"success\":true,\"datasetId\":\"abc\"}";
        let raw = extract_json(out).unwrap();
        let value: serde_json::Value = serde_json::from_str(raw).unwrap();
        assert_eq!(value["datasetId"], "abc");
    }

    #[test]
    fn test_extract_json_absent() {
        assert_eq!(extract_json("no markers here"), None);
        assert_eq!(extract_json("---START---no braces at all"), None);
    }
}
