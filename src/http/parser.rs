//! HTTP request-head parsing and response formatting.

/// Request protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    Http10,
    Http11,
}

impl Version {
    pub fn as_str(self) -> &'static str {
        match self {
            Version::Http10 => "HTTP/1.0",
            Version::Http11 => "HTTP/1.1",
        }
    }
}

/// Parsed request line and the headers we care about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,
    pub path: String,
    pub version: Version,
    pub content_length: usize,
}

/// Parse result.
#[derive(Debug)]
pub enum ParseResult {
    /// Head parsed, with bytes consumed (blank line included).
    Complete(RequestHead, usize),
    /// Need more data.
    Incomplete,
    /// Malformed request line or header.
    Error(&'static str),
}

/// Parse a request head from the start of `input`.
pub fn parse(input: &[u8]) -> ParseResult {
    let head_end = match find_blank_line(input) {
        Some(pos) => pos,
        None => return ParseResult::Incomplete,
    };
    let consumed = head_end + 4;

    let head = match std::str::from_utf8(&input[..head_end]) {
        Ok(head) => head,
        Err(_) => return ParseResult::Error("request head is not valid UTF-8"),
    };
    let mut lines = head.split("\r\n");

    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let (method, path, version) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(method), Some(path), Some(version), None) => (method, path, version),
        _ => return ParseResult::Error("bad request syntax"),
    };
    let version = match version {
        "HTTP/1.0" => Version::Http10,
        "HTTP/1.1" => Version::Http11,
        _ => return ParseResult::Error("bad request version"),
    };

    let mut content_length = 0;
    for line in lines {
        let (name, value) = match line.split_once(':') {
            Some(pair) => pair,
            None => return ParseResult::Error("bad header line"),
        };
        let value = value.trim();
        if name.eq_ignore_ascii_case("Content-Length") {
            content_length = match value.parse() {
                Ok(len) => len,
                Err(_) => return ParseResult::Error("bad content length"),
            };
        }
    }

    ParseResult::Complete(
        RequestHead {
            method: method.to_string(),
            path: path.to_string(),
            version,
            content_length,
        },
        consumed,
    )
}

/// Format a full response. `Server` and `Date` are always included.
pub fn response(
    version: Version,
    status: u16,
    reason: &str,
    headers: &[(&str, &str)],
    body: &[u8],
    date: &str,
) -> Vec<u8> {
    let mut out = format!(
        "{} {status} {reason}\r\nServer: {}\r\nDate: {date}\r\n",
        version.as_str(),
        super::SERVER_NAME
    );
    for (name, value) in headers {
        out.push_str(name);
        out.push_str(": ");
        out.push_str(value);
        out.push_str("\r\n");
    }
    out.push_str("\r\n");

    let mut bytes = out.into_bytes();
    bytes.extend_from_slice(body);
    bytes
}

/// HTML body for an error status.
pub fn error_page(status: u16, message: &str) -> String {
    format!(
        "<html><head><title>Error response</title></head><body>\
         <h1>Error response</h1><p>Error code: {status}</p>\
         <p>Message: {message}.</p></body></html>"
    )
}

/// Current time in IMF-fixdate form.
pub fn http_date() -> String {
    chrono::Utc::now()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

/// Find \r\n\r\n in buffer, returning the position of the first \r.
fn find_blank_line(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|w| w == b"\r\n\r\n")
}
