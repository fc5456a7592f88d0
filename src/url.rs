use crate::error::CallError;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fmt::{Display, Formatter},
    sync::LazyLock,
};
use url::Url;

const REGEX_PATTERN_TOKEN: &str = r":([A-Za-z_][A-Za-z0-9_]*)";

const ERR_INVALID_URL: &str = "Invalid URL. Please include protocol, e.g. https://...";

// The pattern is greedy over identifier characters, so `:team` never matches
// a prefix of `:teamId`.
static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(REGEX_PATTERN_TOKEN).expect("token pattern compiles"));

/// One `key=value` entry of the query string. Either side may be missing in
/// JSON input; a missing or empty key drops the entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryParam {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

impl QueryParam {
    pub fn new(key: &str, value: &str) -> Self {
        QueryParam {
            key: Some(key.to_string()),
            value: Some(value.to_string()),
        }
    }
}

/// A URL with `:name` placeholders, e.g. `https://api/teams/:teamId/bots`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTemplate {
    raw: String,
    names: Vec<String>,
}

impl UrlTemplate {
    pub fn new(raw: &str) -> Self {
        let mut names: Vec<String> = Vec::new();
        for caps in TOKEN_RE.captures_iter(raw) {
            let name = &caps[1];
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }

        UrlTemplate {
            raw: raw.to_string(),
            names,
        }
    }

    /// Distinct placeholder names in first-occurrence order.
    #[cfg(test)]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn build(
        &self,
        path_params: &HashMap<String, String>,
        query_params: &[QueryParam],
    ) -> Result<Url, CallError> {
        let missing = self
            .names
            .iter()
            .filter(|name| resolve(path_params, name).is_none())
            .map(|name| name.as_str())
            .collect::<Vec<&str>>();

        if !missing.is_empty() {
            return Err(CallError::Validation(format!(
                "Missing required path parameters: {}",
                missing.join(", ")
            )));
        }

        let populated = TOKEN_RE.replace_all(&self.raw, |caps: &Captures| {
            // every name was resolved above
            let value = resolve(path_params, &caps[1]).unwrap_or_default();
            urlencoding::encode(value).into_owned()
        });

        let mut url = Url::parse(&populated)
            .ok()
            .filter(|u| u.has_host())
            .ok_or_else(|| CallError::Validation(ERR_INVALID_URL.to_string()))?;

        set_query_params(&mut url, query_params);
        Ok(url)
    }
}

impl Display for UrlTemplate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

fn resolve<'a>(path_params: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    path_params
        .get(name)
        .map(|v| v.as_str())
        .filter(|v| !v.trim().is_empty())
}

/// Sets (never appends) each query key. The first existing occurrence takes
/// the new value and later duplicates are dropped, so the last entry for a
/// key wins. The URL is left untouched when no entry applies.
fn set_query_params(url: &mut Url, query_params: &[QueryParam]) {
    let mut pairs = url
        .query_pairs()
        .into_owned()
        .collect::<Vec<(String, String)>>();
    let mut touched = false;

    for param in query_params {
        let Some(key) = param.key.as_deref().filter(|k| !k.is_empty()) else {
            continue;
        };
        let value = param.value.clone().unwrap_or_default();
        touched = true;

        match pairs.iter().position(|(k, _)| k == key) {
            Some(first) => {
                pairs[first].1 = value;
                let mut seen = 0;
                pairs.retain(|(k, _)| {
                    if k != key {
                        return true;
                    }
                    seen += 1;
                    seen == 1
                });
            }
            None => pairs.push((key.to_string(), value)),
        }
    }

    if touched {
        url.query_pairs_mut().clear().extend_pairs(&pairs);
    }
}
