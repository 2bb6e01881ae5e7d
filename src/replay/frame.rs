//! Captured frame parsing and request rewriting.
//!
//! # Frame format
//! ```text
//! METHOD SP URL SP VERSION CRLF
//! (Name ":" SP? Value CRLF)*
//! CRLF
//! Body
//! ```
//!
//! Only what is needed to route and forward is validated. Header names are
//! case-folded, values trimmed, and the last duplicate wins.

use std::collections::HashMap;

use axum::body::Bytes;
use hyper::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, HOST};
use hyper::{Method, Uri};

const HEADER_END: &[u8] = b"\r\n\r\n";
const DEFAULT_CONTENT_TYPE: &str = "text/plain";
const DEFAULT_REAL_IP: &str = "127.0.0.1";
const X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");

/// Reasons a captured frame cannot be replayed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("no header/body delimiter")]
    MissingDelimiter,
    #[error("header block is not valid UTF-8")]
    Encoding,
    #[error("malformed request line `{0}`")]
    RequestLine(String),
    #[error("unrecognized method `{0}`")]
    UnknownMethod(String),
    #[error("malformed header line `{0}`")]
    HeaderLine(String),
    #[error("header `{0}` has an unforwardable value")]
    HeaderValue(&'static str),
    #[error("invalid request target `{0}`")]
    Target(String),
}

/// Request fields extracted from one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequest {
    pub method: Method,
    pub url: String,
    /// Lowercased names, trimmed values.
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl ParsedRequest {
    /// Split and parse a raw frame.
    pub fn parse(frame: &Bytes) -> Result<Self, FrameError> {
        let split = find(frame, HEADER_END).ok_or(FrameError::MissingDelimiter)?;
        let head = std::str::from_utf8(&frame[..split]).map_err(|_| FrameError::Encoding)?;
        let body = frame.slice(split + HEADER_END.len()..);

        let mut lines = head.split("\r\n");
        let request_line = lines.next().unwrap_or_default();
        let mut parts = request_line.splitn(3, ' ');
        let (token, url) = match (parts.next(), parts.next(), parts.next()) {
            (Some(token), Some(url), Some(_version)) if !token.is_empty() && !url.is_empty() => {
                (token, url)
            }
            _ => return Err(FrameError::RequestLine(request_line.to_string())),
        };
        let method = normalize_method(token)?;

        let mut headers = HashMap::new();
        for line in lines {
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| FrameError::HeaderLine(line.to_string()))?;
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }

        Ok(Self {
            method,
            url: url.to_string(),
            headers,
            body,
        })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// Map a captured method token onto one we replay.
///
/// Capture can glue stray bytes in front of the method (`XPOST`), so tokens
/// ending in `POST` or `GET` are accepted as such.
pub fn normalize_method(token: &str) -> Result<Method, FrameError> {
    match token {
        "GET" => Ok(Method::GET),
        "POST" => Ok(Method::POST),
        "PUT" => Ok(Method::PUT),
        "DELETE" => Ok(Method::DELETE),
        "HEAD" => Ok(Method::HEAD),
        t if t.ends_with("POST") => Ok(Method::POST),
        t if t.ends_with("GET") => Ok(Method::GET),
        t => Err(FrameError::UnknownMethod(t.to_string())),
    }
}

/// A rewritten request ready to send upstream.
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// What the rewrite step decided for a frame.
#[derive(Debug, Clone)]
pub enum Prepared {
    Forward(ForwardRequest),
    /// Parsed fine but excluded by the only-GET filter.
    Filtered,
}

/// Request rewriting applied to every replayed frame.
#[derive(Debug, Clone, Default)]
pub struct RewriteRules {
    /// Forward only GET requests.
    pub only_get: bool,
    /// Prepended to every URL.
    pub location_prefix: Option<String>,
    /// Host header sent when no override is configured.
    pub upstream_host: String,
    /// Host header override.
    pub host_header: Option<String>,
}

impl RewriteRules {
    /// Parse `frame` and turn it into an upstream request.
    pub fn prepare(&self, frame: &Bytes) -> Result<Prepared, FrameError> {
        let parsed = ParsedRequest::parse(frame)?;
        if self.only_get && parsed.method != Method::GET {
            return Ok(Prepared::Filtered);
        }
        self.rewrite(parsed).map(Prepared::Forward)
    }

    /// Apply URL prefix and build the forwarded header set.
    pub fn rewrite(&self, parsed: ParsedRequest) -> Result<ForwardRequest, FrameError> {
        let url = match &self.location_prefix {
            Some(prefix) => format!("{prefix}{}", parsed.url),
            None => parsed.url.clone(),
        };
        let uri = url.parse::<Uri>().map_err(|_| FrameError::Target(url.clone()))?;
        let headers = self.forwarded_headers(&parsed)?;

        Ok(ForwardRequest {
            method: parsed.method,
            uri,
            headers,
            body: parsed.body,
        })
    }

    /// `Content-Type` without parameters, `X-Real-IP`, and `Host`.
    pub fn forwarded_headers(&self, parsed: &ParsedRequest) -> Result<HeaderMap, FrameError> {
        let content_type = parsed
            .header("content-type")
            .and_then(|ct| ct.split(';').next())
            .map(str::trim)
            .filter(|ct| !ct.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE);
        let real_ip = parsed.header("x-real-ip").unwrap_or(DEFAULT_REAL_IP);
        let host = self.host_header.as_deref().unwrap_or(&self.upstream_host);

        let mut headers = HeaderMap::with_capacity(3);
        headers.insert(CONTENT_TYPE, header_value("content-type", content_type)?);
        headers.insert(X_REAL_IP, header_value("x-real-ip", real_ip)?);
        headers.insert(HOST, header_value("host", host)?);
        Ok(headers)
    }
}

fn header_value(name: &'static str, value: &str) -> Result<HeaderValue, FrameError> {
    HeaderValue::from_str(value).map_err(|_| FrameError::HeaderValue(name))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
