use regex::Regex;
use std::sync::LazyLock;
use uuid::Uuid;

pub const DEFAULT_METHOD: &str = "GET";
pub const CONTENT_TYPE_JSON: &str = "Content-Type: application/json";
pub const REDACTED_AUTHORIZATION: &str = "Authorization: Bearer ***";

const MARKER_PREFIX: &str = "__CURLPORT_META_";
const MARKER_SUFFIX: &str = "__";
// status | header bytes | seconds, in the order the demultiplexer reads them
const WRITE_OUT_FIELDS: &str = "%{http_code}|%{size_header}|%{time_total}";

const REGEX_PATTERN_SAFE_TOKEN: &str = r"^[A-Za-z0-9_/:.?=&-]+$";
const REGEX_PATTERN_BEARER: &str = r"(?i)^\s*Authorization:\s*Bearer\s";

static SAFE_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(REGEX_PATTERN_SAFE_TOKEN).expect("safe token pattern compiles"));
static BEARER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(REGEX_PATTERN_BEARER).expect("bearer pattern compiles"));

/// Sentinel that curl prints after the body, followed by the write-out
/// fields. A fresh random one is used per call so a response body cannot
/// collide with it by accident.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrailerMarker(String);

impl TrailerMarker {
    pub fn random() -> Self {
        TrailerMarker(format!(
            "{MARKER_PREFIX}{}{MARKER_SUFFIX}",
            Uuid::new_v4().simple()
        ))
    }

    #[cfg(test)]
    pub fn fixed(marker: &str) -> Self {
        TrailerMarker(marker.to_string())
    }

    #[cfg(test)]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// The `-w` argument for curl.
    pub fn write_out(&self) -> String {
        format!("{}{WRITE_OUT_FIELDS}", self.0)
    }
}

pub fn normalize_method(method: Option<&str>) -> String {
    match method.map(str::trim).filter(|m| !m.is_empty()) {
        Some(m) => m.to_uppercase(),
        None => DEFAULT_METHOD.to_string(),
    }
}

/// Builds the literal argument vector for curl. It is passed to the process
/// as-is, never through a shell.
pub fn build_args(
    method: Option<&str>,
    final_url: &str,
    bearer_token: Option<&str>,
    body: Option<&str>,
    marker: &TrailerMarker,
) -> Vec<String> {
    let mut args = vec![
        "-sS".to_string(),
        "-X".to_string(),
        normalize_method(method),
        final_url.to_string(),
    ];

    if let Some(token) = bearer_token.map(str::trim).filter(|t| !t.is_empty()) {
        args.push("-H".to_string());
        args.push(format!("Authorization: Bearer {token}"));
    }

    // sent for any method, GET and DELETE included
    if let Some(body) = body.filter(|b| !b.trim().is_empty()) {
        args.push("-H".to_string());
        args.push(CONTENT_TYPE_JSON.to_string());
        args.push("--data-raw".to_string());
        args.push(body.to_string());
    }

    args.push("-D".to_string());
    args.push("-".to_string());
    args.push("-w".to_string());
    args.push(marker.write_out());

    args
}

/// Renders the command as a copy-pasteable line with the bearer token
/// replaced by `***`.
pub fn display_command(binary: &str, args: &[String]) -> String {
    let mut line = quote(binary);
    for arg in args {
        let arg = if BEARER_RE.is_match(arg) {
            REDACTED_AUTHORIZATION
        } else {
            arg.as_str()
        };
        line.push(' ');
        line.push_str(&quote(arg));
    }
    line
}

fn quote(token: &str) -> String {
    if SAFE_TOKEN_RE.is_match(token) {
        token.to_string()
    } else {
        format!("\"{}\"", token.replace('"', "\\\""))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const TEST_URL: &str = "https://api.example.com/teams/t1/bots/b1/chat";

    fn marker() -> TrailerMarker {
        TrailerMarker::fixed("__TEST_MARKER__")
    }

    #[test]
    fn normalize_method_should_default_and_upper_case() {
        assert_eq!(normalize_method(None), "GET");
        assert_eq!(normalize_method(Some("  ")), "GET");
        assert_eq!(normalize_method(Some("post")), "POST");
        assert_eq!(normalize_method(Some(" Patch ")), "PATCH");
    }

    #[test]
    fn build_args_should_produce_minimal_get() {
        let args = build_args(None, TEST_URL, None, None, &marker());
        assert_eq!(
            args,
            vec![
                "-sS",
                "-X",
                "GET",
                TEST_URL,
                "-D",
                "-",
                "-w",
                "__TEST_MARKER__%{http_code}|%{size_header}|%{time_total}",
            ]
        );
    }

    #[test]
    fn build_args_should_add_token_and_body() {
        let args = build_args(
            Some("post"),
            TEST_URL,
            Some("  secret123 "),
            Some("{\"question\":\"hi\"}"),
            &marker(),
        );
        assert_eq!(&args[..4], &["-sS", "-X", "POST", TEST_URL]);
        assert_eq!(&args[4..6], &["-H", "Authorization: Bearer secret123"]);
        assert_eq!(
            &args[6..10],
            &["-H", CONTENT_TYPE_JSON, "--data-raw", "{\"question\":\"hi\"}"]
        );
        assert_eq!(&args[10..13], &["-D", "-", "-w"]);
    }

    #[test]
    fn build_args_should_skip_blank_token_and_body() {
        let args = build_args(Some("DELETE"), TEST_URL, Some("   "), Some(" \n "), &marker());
        assert!(!args.iter().any(|a| a.starts_with("Authorization")));
        assert!(!args.iter().any(|a| a == "--data-raw"));
    }

    #[test]
    fn build_args_should_send_body_with_get() {
        let args = build_args(Some("GET"), TEST_URL, None, Some("{}"), &marker());
        assert!(args.windows(2).any(|w| w[0] == "--data-raw" && w[1] == "{}"));
    }

    #[test]
    fn build_args_should_pass_at_sign_body_literally() {
        let args = build_args(Some("POST"), TEST_URL, None, Some("@/etc/passwd"), &marker());
        assert!(args
            .windows(2)
            .any(|w| w[0] == "--data-raw" && w[1] == "@/etc/passwd"));
        assert!(!args.iter().any(|a| a == "--data" || a == "-d"));
    }

    #[test]
    fn random_markers_differ_between_calls() {
        let a = TrailerMarker::random();
        let b = TrailerMarker::random();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with(MARKER_PREFIX));
        assert!(a.as_str().ends_with(MARKER_SUFFIX));
        assert!(!a.as_str().contains('%'));
    }

    #[test]
    fn display_command_should_quote_and_redact() {
        let args = build_args(
            Some("POST"),
            TEST_URL,
            Some("secret123"),
            Some("{\"a\": 1}"),
            &marker(),
        );
        let line = display_command("curl", &args);

        assert!(line.starts_with(&format!("curl -sS -X POST {TEST_URL} -H ")));
        assert!(line.contains("\"Authorization: Bearer ***\""));
        assert!(!line.contains("secret123"));
        assert!(line.contains("--data-raw \"{\\\"a\\\": 1}\""));
        assert!(line.contains(" -D - -w \"__TEST_MARKER__%{http_code}"));
    }

    #[test]
    fn display_command_should_redact_tokens_with_spaces() {
        let args = vec![
            "-H".to_string(),
            "authorization:  bearer two words".to_string(),
        ];
        assert_eq!(
            display_command("curl", &args),
            "curl -H \"Authorization: Bearer ***\""
        );
    }

    #[test]
    fn display_command_should_leave_other_headers() {
        let args = vec!["-H".to_string(), "X-Bearer: abc".to_string()];
        assert_eq!(display_command("curl", &args), "curl -H \"X-Bearer: abc\"");
    }
}
