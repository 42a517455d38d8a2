//! Blocking HTTP plumbing for tests that talk to a target URL.
//!
//! Every request is bounded by the smaller of the test's own per-request timeout and the time the
//! runner has left for the run.

use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::redirect::Policy;
use reqwest::{Method, Url};

use sectoolbox_core::{ResolvedInputs, RunContext, TestFailure};

use crate::headers::{parse_header_block, unescape_newlines};

const MAX_REDIRECTS: usize = 10;

/// What to send, parsed once and reused for every attempt.
#[derive(Debug, Clone)]
pub(crate) struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
}

impl Request {
    /// Reads `target`, `method` and the request header block named `headers_input`.
    ///
    /// `Ok(None)` when `target` is blank.
    pub fn from_inputs(inputs: &ResolvedInputs, headers_input: &str) -> Result<Option<Self>, TestFailure> {
        let target = inputs.text("target").unwrap_or_default().trim();
        if target.is_empty() {
            return Ok(None);
        }
        let url = parse_target(target)?;
        let method = parse_method(inputs.text("method").unwrap_or("GET"))?;
        let raw = inputs
            .secret(headers_input)
            .map(|s| s.expose())
            .or_else(|| inputs.text(headers_input))
            .unwrap_or_default();
        let headers = header_map(&unescape_newlines(raw))?;
        Ok(Some(Self { method, url, headers }))
    }

    /// Names of the headers that will be sent, values left out.
    pub fn header_names(&self) -> Vec<&str> {
        self.headers.keys().map(HeaderName::as_str).collect()
    }
}

fn parse_target(target: &str) -> Result<Url, TestFailure> {
    let url = Url::parse(target).map_err(|e| TestFailure::new(format!("target is not a valid URL: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(TestFailure::new(format!("target must be an http or https URL, got `{other}`"))),
    }
}

fn parse_method(raw: &str) -> Result<Method, TestFailure> {
    let upper = raw.trim().to_ascii_uppercase();
    let upper = if upper.is_empty() { "GET".to_string() } else { upper };
    Method::from_bytes(upper.as_bytes()).map_err(|_| TestFailure::new(format!("`{upper}` is not an HTTP method")))
}

/// Request headers from a pasted block. Values never appear in errors.
pub(crate) fn header_map(raw: &str) -> Result<HeaderMap, TestFailure> {
    let mut map = HeaderMap::new();
    for (name, value) in parse_header_block(raw) {
        let key = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| TestFailure::new(format!("`{name}` is not a valid header name")))?;
        let value = HeaderValue::from_str(&value)
            .map_err(|_| TestFailure::new(format!("value of header `{name}` is not valid header text")))?;
        map.insert(key, value);
    }
    Ok(map)
}

pub(crate) fn client() -> Result<Client, TestFailure> {
    Client::builder()
        .redirect(Policy::limited(MAX_REDIRECTS))
        .user_agent(concat!("sectoolbox/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| TestFailure::new(format!("could not build HTTP client: {e}")))
}

/// Send `request` once, bounded by `limit` and the context deadline.
pub(crate) fn send(client: &Client, request: &Request, limit: Duration, ctx: &RunContext) -> Result<Response, String> {
    let budget = limit.min(ctx.remaining());
    if budget.is_zero() {
        return Err("no time left".to_string());
    }
    client
        .request(request.method.clone(), request.url.clone())
        .headers(request.headers.clone())
        .timeout(budget)
        .send()
        .map_err(|e| {
            if e.is_timeout() {
                format!("timed out after {:.3}s", budget.as_secs_f64())
            } else {
                e.to_string()
            }
        })
}

#[cfg(test)]
pub(crate) mod testing {
    //! A one-shot-per-connection HTTP/1.1 server for module tests.

    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::sync::mpsc::{self, Receiver};
    use std::thread;

    /// Serves `response` to `connections` requests and forwards each request head.
    pub fn serve(response: &'static str, connections: usize) -> (String, Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            for stream in listener.incoming().take(connections) {
                let Ok(mut stream) = stream else { continue };
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut head = String::new();
                loop {
                    let mut line = String::new();
                    if reader.read_line(&mut line).unwrap_or(0) == 0 || line == "\r\n" {
                        break;
                    }
                    head.push_str(&line);
                }
                let _ = stream.write_all(response.as_bytes());
                let _ = tx.send(head);
            }
        });
        (base, rx)
    }
}
