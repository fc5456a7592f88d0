use crate::call::RequestSpec;
use crate::curl::DEFAULT_CURL_BINARY;
use crate::settings::DEFAULT_SETTINGS_FILE_PATH;
use crate::url::QueryParam;
use crate::utils::split_pair;

pub use clap::Parser;

pub const DEFAULT_PORT: u16 = 3100;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct CommandLineArgs {
    #[clap(requires = "url", help = "HTTP method (GET/POST/PUT/DELETE etc.)")]
    method: Option<String>,
    #[clap(help = "URL template, e.g. https://api.example.com/teams/:teamId")]
    url: Option<String>,
    #[clap(help = "JSON body to send with the request")]
    body: Option<String>,
    #[clap(
        short = 'P',
        long = "path",
        value_name = "NAME=VALUE",
        value_parser = split_pair,
        help = "value for a :NAME placeholder in the URL"
    )]
    path_params: Vec<(String, String)>,
    #[clap(
        short = 'q',
        long = "query",
        value_name = "KEY=VALUE",
        value_parser = split_pair,
        help = "query parameter; a repeated key keeps the last value"
    )]
    query_params: Vec<(String, String)>,
    #[clap(
        short = 't',
        long,
        help = "bearer token; pass an empty string to send none instead of the configured one"
    )]
    token: Option<String>,
    #[clap(short = 's', long, conflicts_with = "body", help = "read the body from stdin")]
    stdin: bool,
    #[clap(
        short = 'r',
        long,
        value_name = "FILE",
        conflicts_with_all = ["method", "url", "body", "stdin"],
        help = "read a JSON request description from FILE ('-' for stdin)"
    )]
    request: Option<String>,
    #[clap(
        short = 'c',
        long,
        default_value = DEFAULT_SETTINGS_FILE_PATH,
        help = "settings file with default token and path parameters"
    )]
    config: String,
    #[clap(short = 'p', long, help = "settings section to use instead of the top level")]
    profile: Option<String>,
    #[clap(long = "curl", value_name = "PATH", default_value = DEFAULT_CURL_BINARY, help = "curl binary to run")]
    curl: String,
    #[clap(short = 'o', long, value_name = "FILE", help = "write the raw response body to FILE")]
    output: Option<String>,
    #[clap(short = 'j', long, help = "print the full result as JSON")]
    json: bool,
    #[clap(
        short = 'v',
        long,
        help = "Print verbose message",
        default_value = "false"
    )]
    verbose: bool,
    #[clap(
        long,
        conflicts_with_all = ["method", "url", "body", "stdin", "request"],
        help = "serve the JSON API instead of running one request"
    )]
    serve: bool,
    #[clap(long, env = "PORT", default_value_t = DEFAULT_PORT, help = "port for --serve")]
    port: u16,
}

impl CommandLineArgs {
    pub fn get() -> Self {
        CommandLineArgs::parse()
    }

    /// The request described by the positional arguments and flags.
    /// `stdin_body` replaces the positional body when `--stdin` was given.
    pub fn to_request_spec(&self, stdin_body: Option<String>) -> RequestSpec {
        RequestSpec {
            method: self.method.clone(),
            url_template: self.url.clone(),
            path_params: self.path_params.iter().cloned().collect(),
            query_params: self
                .query_params
                .iter()
                .map(|(k, v)| QueryParam::new(k, v))
                .collect(),
            bearer_token: self.token.clone(),
            body: if self.stdin { stdin_body } else { self.body.clone() },
        }
    }

    pub fn request(&self) -> Option<&str> {
        self.request.as_deref()
    }

    pub fn stdin(&self) -> bool {
        self.stdin
    }

    pub fn config(&self) -> &str {
        &self.config
    }

    pub fn profile(&self) -> Option<&str> {
        self.profile.as_deref()
    }

    pub fn curl(&self) -> &str {
        &self.curl
    }

    pub fn output(&self) -> Option<&str> {
        self.output.as_deref()
    }

    pub fn json(&self) -> bool {
        self.json
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn serve(&self) -> bool {
        self.serve
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}
