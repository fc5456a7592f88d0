//! Runs one request description through the whole pipeline: URL template,
//! curl arguments, subprocess, output parsing, classification.

use crate::curl::{build_args, display_command, normalize_method, CurlProcess, ProcessResult, TrailerMarker};
use crate::error::CallError;
use crate::response::{self, ParsedResponse};
use crate::settings::Defaults;
use crate::url::{QueryParam, UrlTemplate};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info, warn};

const ERR_URL_TEMPLATE_REQUIRED: &str = "URL template is required.";

/// A request as the caller describes it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSpec {
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub url_template: Option<String>,
    /// Numbers and booleans are accepted and taken as their text; `null`
    /// counts as blank.
    #[serde(default, deserialize_with = "scalar_map")]
    pub path_params: HashMap<String, String>,
    #[serde(default)]
    pub query_params: Vec<QueryParam>,
    /// `None` only when the field was left out, which means "use the
    /// settings default". A present field, even `""` or `null`, is taken
    /// as given.
    #[serde(default, deserialize_with = "present_string")]
    pub bearer_token: Option<String>,
    #[serde(default, alias = "requestBody")]
    pub body: Option<String>,
}

fn present_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Some(Option::<String>::deserialize(deserializer)?.unwrap_or_default()))
}

fn scalar_map<'de, D>(deserializer: D) -> Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<HashMap<String, Value>>::deserialize(deserializer)?.unwrap_or_default();
    raw.into_iter()
        .map(|(name, value)| {
            let text = match value {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Null => String::new(),
                other => {
                    return Err(D::Error::custom(format!(
                        "path parameter {name} must be a string, number or boolean, got {other}"
                    )))
                }
            };
            Ok((name, text))
        })
        .collect()
}

/// Everything needed to dispatch one call. Built fresh per call.
#[derive(Debug, Clone)]
pub struct BuiltRequest {
    pub method: String,
    pub final_url: String,
    pub command_args: Vec<String>,
    pub display_command: String,
    pub marker: TrailerMarker,
}

/// The outbound request as shown to the user, token redacted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSummary {
    pub method: String,
    pub final_url: String,
    pub display_command: String,
    pub body: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Validation,
    Launch,
    Parse,
    /// curl ran and exited non-zero.
    Transport,
    Completed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<ParsedResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
    #[serde(skip)]
    outcome: Outcome,
}

impl CallResult {
    fn failed(error: &CallError, request: Option<RequestSummary>, process: Option<&ProcessResult>) -> Self {
        let outcome = if error.is_validation() {
            Outcome::Validation
        } else if error.is_launch() {
            Outcome::Launch
        } else {
            Outcome::Parse
        };

        CallResult {
            ok: false,
            exit_code: process.map(|p| p.exit_code),
            stderr: process.and_then(stderr_text),
            request,
            response: None,
            error: Some(error.to_string()),
            raw_output: error.raw_output().map(str::to_string),
            outcome,
        }
    }

    fn completed(request: RequestSummary, process: &ProcessResult, response: ParsedResponse) -> Self {
        let ok = process.success() && response.status_code.is_some_and(|code| code < 400);
        let outcome = if process.success() {
            Outcome::Completed
        } else {
            Outcome::Transport
        };

        CallResult {
            ok,
            exit_code: Some(process.exit_code),
            stderr: stderr_text(process),
            request: Some(request),
            response: Some(response),
            error: None,
            raw_output: None,
            outcome,
        }
    }

    /// Status to answer with at an HTTP boundary. An upstream 4xx/5xx is a
    /// successful call that happens to carry a failing response, so it is
    /// 200 here; a curl exit failure is 502 whatever curl reported.
    pub fn http_status(&self) -> u16 {
        match self.outcome {
            Outcome::Validation => 400,
            Outcome::Launch | Outcome::Parse => 500,
            Outcome::Transport => 502,
            Outcome::Completed => 200,
        }
    }
}

fn stderr_text(process: &ProcessResult) -> Option<String> {
    Some(process.stderr.clone()).filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, Default)]
pub struct Caller {
    process: CurlProcess,
}

impl Caller {
    pub fn new(curl_binary: &str) -> Self {
        Caller {
            process: CurlProcess::new(curl_binary),
        }
    }

    /// Validates the description and turns it into a curl command line.
    /// Explicit path parameters and an explicit token (even an empty one)
    /// win over `defaults`.
    pub fn prepare(&self, spec: &RequestSpec, defaults: &Defaults) -> Result<BuiltRequest, CallError> {
        let url_template = spec
            .url_template
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| CallError::Validation(ERR_URL_TEMPLATE_REQUIRED.to_string()))?;

        let mut path_params = spec.path_params.clone();
        for (name, value) in defaults.path_params() {
            let blank = path_params.get(name).is_none_or(|v| v.trim().is_empty());
            if blank {
                path_params.insert(name.clone(), value.clone());
            }
        }

        let final_url = UrlTemplate::new(url_template)
            .build(&path_params, &spec.query_params)?
            .to_string();

        let bearer_token = match &spec.bearer_token {
            Some(token) => Some(token.as_str()),
            None => defaults.bearer_token(),
        };

        let marker = TrailerMarker::random();
        let command_args = build_args(
            spec.method.as_deref(),
            &final_url,
            bearer_token,
            spec.body.as_deref(),
            &marker,
        );

        Ok(BuiltRequest {
            method: normalize_method(spec.method.as_deref()),
            display_command: display_command(self.process.binary(), &command_args),
            final_url,
            command_args,
            marker,
        })
    }

    pub async fn call(&self, spec: &RequestSpec, defaults: &Defaults) -> CallResult {
        let built = match self.prepare(spec, defaults) {
            Ok(built) => built,
            Err(e) => {
                warn!("request rejected: {e}");
                return CallResult::failed(&e, None, None);
            }
        };

        let summary = RequestSummary {
            method: built.method.clone(),
            final_url: built.final_url.clone(),
            display_command: built.display_command.clone(),
            body: spec.body.clone().filter(|b| !b.is_empty()),
        };
        debug!(command = %built.display_command, "dispatching request");

        let process = match self.process.run(&built.command_args).await {
            Ok(process) => process,
            Err(e) => {
                warn!("failed to launch {}: {e}", self.process.binary());
                return CallResult::failed(&e, Some(summary), None);
            }
        };

        let result = match response::parse(&process.stdout, &built.marker) {
            Ok(parsed) => CallResult::completed(summary, &process, parsed),
            Err(e) => {
                warn!(exit_code = process.exit_code, "unparsable curl output: {e}");
                return CallResult::failed(&e, Some(summary), Some(&process));
            }
        };

        if process.success() {
            info!(
                method = %built.method,
                url = %built.final_url,
                status = ?result.response.as_ref().and_then(|r| r.status_code),
                "request finished"
            );
        } else {
            warn!(
                exit_code = process.exit_code,
                stderr = %process.stderr,
                "curl exited with an error"
            );
        }
        result
    }
}
