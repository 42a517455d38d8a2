//! Set-Cookie parsing and the `cookie-verification` test.
//!
//! The test audits `Set-Cookie` values and reports which cookies lack `Secure`, `HttpOnly` or
//! `SameSite`. The values are either pasted (one per line, or as a single folded header) or
//! fetched by sending one request to `target` and reading the response's `Set-Cookie` headers.
//! Pasted values win when both are given.

use std::collections::BTreeMap;
use std::time::Instant;

use serde::Serialize;
use serde_json::{Map, Value, json};

use sectoolbox_core::{InputKind, InputSpec, ResolvedInputs, RunContext, RunResult, SecurityTest, TestFailure};

use crate::burst::{round4, seconds_input};
use crate::headers::unescape_newlines;
use crate::http::{self, Request};

/// Security-relevant flags of one cookie.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CookieFlags {
    pub secure: bool,
    pub httponly: bool,
    /// `Lax`, `Strict`, `None`, or absent.
    pub samesite: Option<String>,
}

/// One parsed `Set-Cookie` value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedCookie {
    pub raw: String,
    pub name: String,
    pub value: String,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub expires: Option<String>,
    pub flags: CookieFlags,
    /// Every `key=value` attribute, keys lowercased.
    pub attrs: BTreeMap<String, String>,
}

fn strip_header_name(line: &str) -> &str {
    let trimmed = line.trim();
    match trimmed.split_once(':') {
        Some((name, rest)) if name.trim().eq_ignore_ascii_case("set-cookie") => rest.trim(),
        _ => trimmed,
    }
}

/// `true` when `rest` starts with a cookie-name token followed by `=`.
fn starts_with_cookie_pair(rest: &str) -> bool {
    let token_len = rest
        .bytes()
        .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_' || *b == b'-')
        .count();
    token_len > 0 && rest.as_bytes().get(token_len) == Some(&b'=')
}

/// Split a block of Set-Cookie values into individual cookies.
///
/// Multiple non-empty lines are taken one cookie per line. A single line is split at `", "`
/// only where the next token looks like `name=`, which keeps `Expires` dates
/// (`Wed, 21 Oct 2026 07:28:00 GMT`) in one piece. A leading `Set-Cookie:` is dropped.
pub fn split_set_cookie_block(raw: &str) -> Vec<String> {
    let lines: Vec<&str> = raw.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.len() > 1 {
        return lines.into_iter().map(|l| strip_header_name(l).to_string()).collect();
    }
    let Some(single) = lines.first() else {
        return Vec::new();
    };
    let single = strip_header_name(single);

    let mut parts = Vec::new();
    let mut start = 0;
    let mut search_from = 0;
    while let Some(offset) = single[search_from..].find(", ") {
        let split_at = search_from + offset;
        let next = split_at + 2;
        if starts_with_cookie_pair(&single[next..]) {
            parts.push(single[start..split_at].trim().to_string());
            start = next;
        }
        search_from = next;
    }
    parts.push(single[start..].trim().to_string());
    parts.retain(|p| !p.is_empty());
    parts
}

/// Parse one `NAME=VALUE; Attr=x; Flag` string.
pub fn parse_set_cookie(header_value: &str) -> ParsedCookie {
    let mut parts = header_value.split(';').map(str::trim);

    let first = parts.next().unwrap_or_default();
    let (name, value) = match first.split_once('=') {
        Some((n, v)) => (n.trim().to_string(), v.trim().to_string()),
        None => (first.to_string(), String::new()),
    };

    let mut attrs = BTreeMap::new();
    let mut flags = CookieFlags::default();

    for attr in parts.filter(|a| !a.is_empty()) {
        match attr.split_once('=') {
            Some((k, v)) => {
                let key = k.trim().to_ascii_lowercase();
                let v = v.trim().to_string();
                if key == "samesite" {
                    flags.samesite = Some(v.clone());
                }
                attrs.insert(key, v);
            }
            None => match attr.to_ascii_lowercase().as_str() {
                "secure" => flags.secure = true,
                "httponly" => flags.httponly = true,
                _ => {}
            },
        }
    }

    ParsedCookie {
        raw: header_value.to_string(),
        name,
        value,
        domain: attrs.get("domain").cloned(),
        path: attrs.get("path").cloned(),
        expires: attrs.get("expires").cloned(),
        flags,
        attrs,
    }
}

/// Flags a cookie is missing, in the order they are reported.
pub fn missing_flags(cookie: &ParsedCookie) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if !cookie.flags.secure {
        missing.push("Secure");
    }
    if !cookie.flags.httponly {
        missing.push("HttpOnly");
    }
    if cookie.flags.samesite.is_none() {
        missing.push("SameSite");
    }
    missing
}

/// Audit one cookie against the exclude list.
fn warning_for(cookie: &ParsedCookie, excluded: &[String]) -> Option<String> {
    if excluded.contains(&cookie.name.to_ascii_lowercase()) {
        return None;
    }
    let missing = missing_flags(cookie);
    (!missing.is_empty()).then(|| format!("Cookie '{}' missing flags: {}", cookie.name, missing.join(", ")))
}

/// Where the audited values came from, plus what to report about it.
enum Source {
    Pasted,
    Fetched(Map<String, Value>),
}

/// Send `request` once and collect every `Set-Cookie` value of the final response.
fn fetch(request: &Request, inputs: &ResolvedInputs, ctx: &RunContext) -> Result<(Vec<String>, Source), TestFailure> {
    let limit = seconds_input(inputs, "timeout", 5.0);
    let client = http::client()?;
    let started = Instant::now();
    let response = http::send(&client, request, limit, ctx)
        .map_err(|e| TestFailure::new(format!("request to {} failed: {e}", request.url)))?;

    let values = response
        .headers()
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::to_string)
        .collect();

    let mut report = Map::new();
    report.insert("target".into(), json!(request.url.as_str()));
    report.insert("method".into(), json!(request.method.as_str()));
    report.insert("request_headers".into(), json!(request.header_names()));
    report.insert("timeout_seconds".into(), json!(limit.as_secs_f64()));
    report.insert("status_code".into(), json!(response.status().as_u16()));
    report.insert("duration_seconds".into(), json!(round4(started.elapsed().as_secs_f64())));
    Ok((values, Source::Fetched(report)))
}

/// Audits Set-Cookie values for missing `Secure`/`HttpOnly`/`SameSite`.
pub struct CookieVerification;

impl SecurityTest for CookieVerification {
    fn name(&self) -> &str {
        "cookie-verification"
    }

    fn description(&self) -> &str {
        "Parse Set-Cookie values (pasted or fetched from a URL) and flag cookies missing Secure, HttpOnly or SameSite."
    }

    fn requires(&self) -> Vec<InputSpec> {
        vec![
            InputSpec::optional("set_cookie", InputKind::String)
                .with_prompt("Set-Cookie values, blank to fetch from a URL (separate multiple cookies with \\n)"),
            InputSpec::optional("target", InputKind::String)
                .with_prompt("URL to fetch cookies from when none were pasted (e.g. https://example.com/login)"),
            InputSpec::optional("method", InputKind::String)
                .with_default("GET")
                .with_prompt("HTTP method for the fetch"),
            InputSpec::optional("timeout", InputKind::Number)
                .with_default("5")
                .with_prompt("Fetch timeout in seconds"),
            InputSpec::optional("request_headers", InputKind::Secret)
                .with_prompt("Request headers for the fetch, one `Name: value` per line (separate lines with \\n)"),
            InputSpec::optional("exclude_list", InputKind::String)
                .with_prompt("Cookie names to skip, comma separated (e.g. csrftoken,jsessionid)"),
        ]
    }

    fn run(&self, inputs: &ResolvedInputs, ctx: &RunContext) -> RunResult {
        let block = unescape_newlines(inputs.text("set_cookie").unwrap_or_default());
        let pasted = split_set_cookie_block(&block);
        let (raw_headers, source) = if !pasted.is_empty() {
            (pasted, Source::Pasted)
        } else if let Some(request) = Request::from_inputs(inputs, "request_headers")? {
            ctx.checkpoint()?;
            fetch(&request, inputs, ctx)?
        } else {
            return Err(TestFailure::new("no Set-Cookie values supplied and no target URL to fetch them from"));
        };

        let excluded: Vec<String> = inputs
            .text("exclude_list")
            .unwrap_or_default()
            .split(',')
            .map(|n| n.trim().to_ascii_lowercase())
            .filter(|n| !n.is_empty())
            .collect();

        let mut cookies = Vec::with_capacity(raw_headers.len());
        let mut warnings = Vec::new();
        for raw in &raw_headers {
            ctx.checkpoint()?;
            let cookie = parse_set_cookie(raw);
            warnings.extend(warning_for(&cookie, &excluded));
            cookies.push(cookie);
        }

        let mut payload = match source {
            Source::Pasted => Map::new(),
            Source::Fetched(report) => report,
        };
        payload.insert("cookie_count".into(), json!(cookies.len()));
        payload.insert("excluded".into(), json!(excluded));
        payload.insert("raw_set_cookie_headers".into(), json!(raw_headers));
        payload.insert("cookies".into(), json!(cookies));
        payload.insert("warnings".into(), json!(warnings));
        Ok(Value::Object(payload))
    }
}
