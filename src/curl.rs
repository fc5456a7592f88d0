//! Everything that touches the external `curl` binary: the argument vector
//! handed to it and the subprocess that runs it.

pub mod args;
pub mod process;

pub use args::{build_args, display_command, normalize_method, TrailerMarker};
pub use process::{CurlProcess, ProcessResult, DEFAULT_CURL_BINARY};
