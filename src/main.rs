mod args;
mod call;
mod curl;
mod decoder;
mod error;
mod response;
mod server;
mod settings;
mod url;
mod utils;

use anyhow::Context;
use args::CommandLineArgs;
use call::{CallResult, Caller, RequestSpec};
use server::AppState;
use settings::Defaults;
use std::io::{stdin, IsTerminal};
use std::net::SocketAddr;
use std::process::ExitCode;
use tokio::net::TcpListener;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use utils::{read_capped, read_capped_text, Result};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cmd_args = CommandLineArgs::get();
    init_tracing(cmd_args.verbose());

    let caller = Caller::new(cmd_args.curl());

    if cmd_args.serve() {
        let addr = SocketAddr::from(([127, 0, 0, 1], cmd_args.port()));
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to listen on {addr}"))?;
        let state = AppState::new(caller, cmd_args.config(), cmd_args.profile());
        server::run(listener, state).await?;
        return Ok(ExitCode::SUCCESS);
    }

    let spec = get_request_spec(&cmd_args)?;
    let defaults = Defaults::load(cmd_args.config(), cmd_args.profile())?;
    let result = caller.call(&spec, &defaults).await;

    print_result(&cmd_args, &result).await?;

    Ok(if result.ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();
}

fn get_request_spec(cmd_args: &CommandLineArgs) -> Result<RequestSpec> {
    if let Some(source) = cmd_args.request() {
        let bytes = if source == "-" {
            read_capped(stdin().lock())?
        } else {
            let path = shellexpand::tilde(source).to_string();
            let file = std::fs::File::open(&path)
                .with_context(|| format!("Failed to open request file {path}"))?;
            read_capped(file)?
        };
        return serde_json::from_slice(&bytes).context("Invalid JSON request description.");
    }

    let stdin_body = if cmd_args.stdin() && !stdin().is_terminal() {
        debug!("reading body from stdin");
        read_capped_text(stdin().lock())?
    } else {
        None
    };

    Ok(cmd_args.to_request_spec(stdin_body))
}

async fn print_result(cmd_args: &CommandLineArgs, result: &CallResult) -> Result<()> {
    if let (Some(path), Some(response)) = (cmd_args.output(), &result.response) {
        tokio::fs::write(path, &response.raw_body)
            .await
            .with_context(|| format!("Failed to write response body to {path}"))?;
    }

    if cmd_args.json() {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    if cmd_args.verbose() {
        if let Some(request) = &result.request {
            eprintln!("> {}", request.display_command);
        }
        if let Some(response) = &result.response {
            eprintln!("< {}", response.status_line);
            for (name, value) in response.headers.iter() {
                for v in value.values() {
                    eprintln!("< {name}: {v}");
                }
            }
            if let Some(elapsed) = response.elapsed_seconds {
                eprintln!("< elapsed: {elapsed}s");
            }
        }
    }

    if let Some(stderr) = &result.stderr {
        eprintln!("{stderr}");
    }

    if let Some(error) = &result.error {
        eprintln!("error: {error}");
        if let Some(raw_output) = result.raw_output.as_ref().filter(|_| cmd_args.verbose()) {
            eprintln!("{raw_output}");
        }
        return Ok(());
    }

    let Some(response) = &result.response else {
        return Ok(());
    };

    if cmd_args.output().is_some() {
        if !result.ok {
            eprintln!("{}", response.status_line);
        }
    } else if result.ok {
        println!("{}", response.body);
    } else {
        eprintln!("{}: {}", response.status_line, response.body);
    }

    Ok(())
}
