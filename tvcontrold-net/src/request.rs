//! Incremental parser for the GET requests of the TCP channel.

use std::str;

/// A complete, well-formed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// `/cmd/<line>`: execute the decoded command line.
    Command(String),
    /// `/ping`: report the environment without executing anything.
    Ping,
    /// Any other path.
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    /// The blank line ending the request head has not arrived yet.
    Incomplete,
    Complete(Request),
    Malformed(String),
}

/// Bytes of one request, accumulated until its head is complete.
#[derive(Debug)]
pub struct RequestBuffer {
    buf: Vec<u8>,
    limit: usize,
}

impl RequestBuffer {
    /// `limit` caps the size of the request head.
    pub fn new(limit: usize) -> Self {
        Self {
            buf: Vec::new(),
            limit,
        }
    }

    /// Append received bytes and try to parse the request.
    pub fn push(&mut self, bytes: &[u8]) -> ParseOutcome {
        self.buf.extend_from_slice(bytes);
        match head_end(&self.buf) {
            Some(end) if end > self.limit => ParseOutcome::Malformed("request too long".into()),
            Some(end) => match parse_head(&self.buf[..end]) {
                Ok(request) => ParseOutcome::Complete(request),
                Err(reason) => ParseOutcome::Malformed(reason),
            },
            None if self.buf.len() > self.limit => {
                ParseOutcome::Malformed("request too long".into())
            }
            None => ParseOutcome::Incomplete,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Length of the head, terminator excluded.
fn head_end(buf: &[u8]) -> Option<usize> {
    let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n");
    let lf = buf.windows(2).position(|w| w == b"\n\n");
    match (crlf, lf) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

/// Parse a request head: the request line and (ignored) header lines.
pub fn parse_head(head: &[u8]) -> Result<Request, String> {
    let head = str::from_utf8(head).map_err(|_| "request is not valid UTF-8".to_string())?;
    let line = head.lines().next().unwrap_or("");
    let mut parts = line.split(' ');
    let (method, path, version) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(m), Some(p), Some(v), None) => (m, p, v),
        _ => return Err(format!("malformed request line \"{}\"", line)),
    };
    if method != "GET" {
        return Err(format!("unsupported method \"{}\"", method));
    }
    if !version.starts_with("HTTP/") {
        return Err(format!("unsupported protocol \"{}\"", version));
    }
    parse_path(path)
}

fn parse_path(path: &str) -> Result<Request, String> {
    if !path.starts_with('/') {
        return Err(format!("path \"{}\" is not absolute", path));
    }
    let decoded = urlencoding::decode(path)
        .map_err(|_| "path does not decode to UTF-8".to_string())?
        .into_owned();
    if let Some(line) = decoded.strip_prefix("/cmd/") {
        return Ok(Request::Command(line.to_string()));
    }
    match decoded.as_str() {
        "/ping" | "/ping/" => Ok(Request::Ping),
        _ => Ok(Request::Other(decoded)),
    }
}
