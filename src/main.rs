//! streamgrab - CLI entry point.

use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use streamgrab::{
    cli::Args,
    config::Config,
    error::{exit_codes, Error, Result},
    output::{
        print_banner, print_error, print_info, print_outcome, print_request_summary,
        print_warning, EventRenderer, RenderMode,
    },
    task::{Supervisor, TaskOutcome},
};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => ExitCode::from(code as u8),
        Err(e) => {
            print_error(&format!("{}", e));
            ExitCode::from(exit_codes::for_error(&e) as u8)
        }
    }
}

async fn run() -> Result<i32> {
    // Parse CLI arguments
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug {
        "debug"
    } else if args.quiet || args.json {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mode = if args.json {
        RenderMode::Json
    } else if args.quiet {
        RenderMode::Quiet
    } else {
        RenderMode::Pretty
    };

    if mode == RenderMode::Pretty {
        print_banner();
    }

    // Load configuration
    let mut config = match args.config.clone() {
        Some(path) if path.exists() => Config::load(&path)?,
        Some(path) => {
            return Err(Error::MissingConfig(format!(
                "Configuration file not found: {}",
                path.display()
            )))
        }
        None => match Config::default_path().filter(|p| p.exists()) {
            Some(path) => {
                tracing::debug!("Using configuration {}", path.display());
                Config::load(&path)?
            }
            None => Config::default(),
        },
    };

    // Merge CLI arguments into config
    args.merge_into_config(&mut config);

    // Validates the merged configuration
    let supervisor = Supervisor::with_http(config)?;
    let request = args.into_request(supervisor.config())?;

    if mode == RenderMode::Pretty {
        print_request_summary(&request, supervisor.config().download.concurrency);
    }

    let mut handle = match supervisor.submit(request) {
        Ok(handle) => handle,
        Err(rejection) => {
            print_error(&rejection.to_string());
            return Ok(exit_codes::BUSY);
        }
    };

    let started = Instant::now();
    let mut renderer = EventRenderer::new(mode);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    let outcome = loop {
        tokio::select! {
            event = handle.next() => match event {
                Some(event) => {
                    if let Some(outcome) = renderer.render(event) {
                        break outcome;
                    }
                }
                None => break TaskOutcome::Failed(Error::Internal("event stream ended early".into())),
            },
            signal = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                if let Err(e) = signal {
                    print_warning(&format!("Failed to listen for Ctrl-C: {}", e));
                    continue;
                }
                print_info("Interrupted, cancelling task...");

                // Keep draining events while teardown runs
                let supervisor = supervisor.clone();
                let task_id = handle.task_id().clone();
                tokio::spawn(async move {
                    let ack = supervisor.cancel(&task_id).await;
                    tracing::debug!("{}", ack);
                });
            }
        }
    };
    renderer.finish();

    if mode != RenderMode::Json {
        print_outcome(&outcome, started.elapsed());
    }

    Ok(match &outcome {
        TaskOutcome::Completed(_) => exit_codes::SUCCESS,
        TaskOutcome::Cancelled => exit_codes::ABORT,
        TaskOutcome::Failed(e) => exit_codes::for_error(e),
    })
}
