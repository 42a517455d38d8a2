//! Response header block parsing and the `header-check` test.

use serde_json::json;

use sectoolbox_core::{InputKind, InputSpec, ResolvedInputs, RunContext, RunResult, SecurityTest, TestFailure};

const METHODS: [&str; 7] = ["GET", "POST", "PUT", "DELETE", "HEAD", "OPTIONS", "PATCH"];

/// Headers every hardened HTTPS response is expected to carry (lowercase).
const RECOMMENDED: [&str; 5] = [
    "strict-transport-security",
    "content-security-policy",
    "x-content-type-options",
    "x-frame-options",
    "referrer-policy",
];

/// Headers that leak implementation details when present.
const DISCLOSING: [&str; 3] = ["server", "x-powered-by", "x-aspnet-version"];

/// Turn literal `\n` sequences into newlines so a single-line flag can carry a header block.
pub(crate) fn unescape_newlines(raw: &str) -> String {
    raw.replace("\\r\\n", "\n").replace("\\n", "\n")
}

fn is_request_line(line: &str) -> bool {
    let parts: Vec<&str> = line.split_whitespace().collect();
    parts.len() >= 3
        && METHODS.contains(&parts[0].to_ascii_uppercase().as_str())
        && parts[parts.len() - 1].to_ascii_uppercase().contains("HTTP/")
}

/// Parse a pasted header block into `(name, value)` pairs in first-seen order.
///
/// Request lines and lines without a colon are skipped. Repeated headers are merged
/// case-insensitively: `Cookie` values join with `"; "`, everything else with `", "`.
pub fn parse_header_block(raw: &str) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = Vec::new();

    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() || is_request_line(line) {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim_start();
        if key.is_empty() {
            continue;
        }

        match headers.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(key)) {
            Some((k, existing)) => {
                if k.eq_ignore_ascii_case("cookie") {
                    let joined = format!("{}; {}", existing.trim_end_matches([';', ' ']), value);
                    *existing = joined;
                } else {
                    existing.push_str(", ");
                    existing.push_str(value);
                }
            }
            None => headers.push((key.to_string(), value.to_string())),
        }
    }

    headers
}

fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Checks a response header block for missing hardening headers and disclosure headers.
pub struct HeaderCheck;

impl SecurityTest for HeaderCheck {
    fn name(&self) -> &str {
        "header-check"
    }

    fn description(&self) -> &str {
        "Analyze pasted HTTP response headers for missing security headers and version disclosure."
    }

    fn requires(&self) -> Vec<InputSpec> {
        vec![
            InputSpec::required("headers", InputKind::String)
                .with_prompt("Response headers (separate lines with \\n)"),
        ]
    }

    fn run(&self, inputs: &ResolvedInputs, ctx: &RunContext) -> RunResult {
        let raw = unescape_newlines(inputs.text("headers").unwrap_or_default());
        let headers = parse_header_block(&raw);
        if headers.is_empty() {
            return Err(TestFailure::new("no `Name: value` header lines found in input"));
        }
        ctx.checkpoint()?;

        let mut present = Vec::new();
        let mut missing = Vec::new();
        for name in RECOMMENDED {
            if header(&headers, name).is_some() {
                present.push(name);
            } else {
                missing.push(name);
            }
        }

        let mut warnings: Vec<String> = missing.iter().map(|name| format!("Missing header: {name}")).collect();

        if let Some(value) = header(&headers, "x-content-type-options") {
            if !value.trim().eq_ignore_ascii_case("nosniff") {
                warnings.push(format!("X-Content-Type-Options should be 'nosniff', got '{value}'"));
            }
        }
        if let Some(value) = header(&headers, "strict-transport-security") {
            if !value.to_ascii_lowercase().contains("max-age=") {
                warnings.push("Strict-Transport-Security has no max-age directive".to_string());
            }
        }
        for name in DISCLOSING {
            if let Some(value) = header(&headers, name) {
                warnings.push(format!("Header '{name}' discloses implementation details: {value}"));
            }
        }

        let parsed: serde_json::Map<String, serde_json::Value> =
            headers.iter().map(|(k, v)| (k.clone(), json!(v))).collect();

        Ok(json!({
            "headers": parsed,
            "present": present,
            "missing": missing,
            "warnings": warnings,
        }))
    }
}
