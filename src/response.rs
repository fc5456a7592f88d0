//! Splits curl's stdout back into status line, headers, body and timing.
//!
//! With `-D - -w <marker>...` curl writes, in order: every header block it
//! received (one per redirect hop or interim response), the body, then the
//! marker followed by `status|header_bytes|seconds`. The header byte count
//! is what separates headers from body, so the split is byte-exact even for
//! binary bodies.

use crate::curl::TrailerMarker;
use crate::decoder::decode_body;
use crate::error::CallError;
use bytes::Bytes;
use regex::Regex;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::sync::LazyLock;
use tracing::debug;

const ERR_NO_METADATA: &str = "Could not parse curl output metadata.";
const ERR_HEADER_SIZE: &str = "Could not parse response header size.";

static BLANK_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\r?\n\r?\n").expect("blank line pattern compiles"));
static LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\r?\n").expect("line pattern compiles"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum HeaderValue {
    Single(String),
    Multiple(Vec<String>),
}

impl HeaderValue {
    pub fn first(&self) -> &str {
        match self {
            HeaderValue::Single(v) => v,
            HeaderValue::Multiple(vs) => vs.first().map(String::as_str).unwrap_or_default(),
        }
    }

    pub fn values(&self) -> Vec<&str> {
        match self {
            HeaderValue::Single(v) => vec![v.as_str()],
            HeaderValue::Multiple(vs) => vs.iter().map(String::as_str).collect(),
        }
    }
}

/// Response headers in first-seen order. Names keep the casing of their
/// first occurrence; a repeated name collects its values in a list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, HeaderValue)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name matching is case-sensitive, the way curl prints them.
    pub fn append(&mut self, name: &str, value: &str) {
        let Some(idx) = self.entries.iter().position(|(n, _)| n == name) else {
            self.entries
                .push((name.to_string(), HeaderValue::Single(value.to_string())));
            return;
        };

        let existing = &mut self.entries[idx].1;
        match existing {
            HeaderValue::Single(first) => {
                let first = std::mem::take(first);
                *existing = HeaderValue::Multiple(vec![first, value.to_string()]);
            }
            HeaderValue::Multiple(values) => values.push(value.to_string()),
        }
    }

    #[cfg(test)]
    pub fn get(&self, name: &str) -> Option<&HeaderValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn get_ignore_case(&self, name: &str) -> Option<&HeaderValue> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HeaderValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for Headers {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedResponse {
    pub status_code: Option<u16>,
    pub status_line: String,
    pub headers: Headers,
    pub elapsed_seconds: Option<f64>,
    /// Display text of the body.
    pub body: String,
    /// The body exactly as received.
    #[serde(skip)]
    pub raw_body: Bytes,
}

pub fn parse(stdout: &[u8], marker: &TrailerMarker) -> Result<ParsedResponse, CallError> {
    let parse_error = |message: &str| CallError::Parse {
        message: message.to_string(),
        raw_output: String::from_utf8_lossy(stdout).into_owned(),
    };

    // The trailer is printed after all response content, so it is the last
    // occurrence even if the body happens to contain the marker.
    let marker_at = rfind(stdout, marker.as_bytes()).ok_or_else(|| parse_error(ERR_NO_METADATA))?;
    let payload = &stdout[..marker_at];
    let trailer = String::from_utf8_lossy(&stdout[marker_at + marker.as_bytes().len()..]);

    let mut fields = trailer.trim().split('|');
    let status_field = fields.next().unwrap_or_default();
    let size_field = fields.next().ok_or_else(|| parse_error(ERR_HEADER_SIZE))?;
    let elapsed_field = fields.next().unwrap_or_default();

    let header_size = size_field
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite() && *n >= 0.0)
        .ok_or_else(|| parse_error(ERR_HEADER_SIZE))?;
    // a byte count, clamped in case curl and the stream disagree
    let header_size = (header_size as usize).min(payload.len());

    let (header_bytes, body_bytes) = payload.split_at(header_size);
    let (status_line, headers) = parse_header_blocks(&String::from_utf8_lossy(header_bytes));

    let body = decode_body(
        body_bytes,
        headers.get_ignore_case("content-encoding").map(HeaderValue::first),
        headers.get_ignore_case("content-type").map(HeaderValue::first),
    );

    debug!(
        status = status_field,
        header_bytes = header_size,
        body_bytes = body_bytes.len(),
        "parsed curl output"
    );

    Ok(ParsedResponse {
        status_code: status_field.trim().parse::<u16>().ok().filter(|c| *c != 0),
        status_line,
        headers,
        elapsed_seconds: elapsed_field
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|s| s.is_finite() && *s != 0.0),
        body,
        raw_body: Bytes::copy_from_slice(body_bytes),
    })
}

/// Only the last non-empty block counts: earlier ones belong to redirect
/// hops or `100 Continue`.
fn parse_header_blocks(raw_headers: &str) -> (String, Headers) {
    let last_block = BLANK_LINE_RE
        .split(raw_headers)
        .map(str::trim)
        .filter(|block| !block.is_empty())
        .last()
        .unwrap_or_default();

    let mut lines = LINE_RE.split(last_block).filter(|line| !line.is_empty());
    let status_line = lines.next().unwrap_or_default().to_string();

    let mut headers = Headers::new();
    for line in lines {
        if let Some(idx) = line.find(':').filter(|idx| *idx > 0) {
            headers.append(line[..idx].trim(), line[idx + 1..].trim());
        }
    }

    (status_line, headers)
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).rposition(|w| w == needle)
}
