pub mod logging;

use prebuilt_core::{
    Prebuilt,
    cli::{CliArgs, Command, MessageFormat},
    config::Config,
    messages::{InstallMessage, LockMessage, Message, MessageReporter},
};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::*;

// Re-export key types from prebuilt-core for convenience
pub use prebuilt_core::{
    cli,
    error::{Error, Result},
};

/// **INTERNAL - DO NOT USE IN PRODUCTION CODE**
///
/// Internal messaging types exposed solely for integration testing. This is NOT a stable interface
/// and WILL break without warning, outside of semver guarantees.
#[doc(hidden)]
pub use prebuilt_core::messages;

/// Re-export of the snafu [`snafu::Report`] type so that callers can refer to this type without
/// taking an explicit snafu dep
pub use snafu::Report as SnafuReport;

const MESSAGE_CHANNEL_SIZE: usize = 100;

/// Main entry point for the `prebuilt` tool.
///
/// Meant to be called from `main.rs` or other frontends.
#[snafu::report]
pub fn prebuilt_main() -> Result<()> {
    let args = CliArgs::parse_from_cli_args();

    // Initialize tracing early, before any other operations
    logging::init(&args)?;

    if args.version {
        print_version();
        return Ok(());
    }

    let Some(command) = args.command.clone() else {
        return CliArgs::print_help().map_err(|source| Error::Io {
            path: "<stdout>".into(),
            source,
        });
    };

    let mut config = Config::load(&args.config)?;
    args.apply_to(&mut config);

    // Apply log level from config file if appropriate
    logging::apply_config(&config, &args);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|source| Error::TokioRuntime { source })?;

    // All messages go to a separate thread.  In JSON mode every message is written to stdout;
    // otherwise only the outcome of each lock and install is summarized on stderr.
    let json_mode = matches!(args.message_format, Some(MessageFormat::Json));
    let (tx, rx) = std::sync::mpsc::sync_channel(MESSAGE_CHANNEL_SIZE);
    let reporter_thread = std::thread::spawn(move || {
        debug!("Starting message reporter thread");
        for msg in rx {
            if json_mode {
                match serde_json::to_string(&msg) {
                    Ok(json) => println!("{}", json),
                    Err(e) => eprintln!("Failed to serialize message: {}", e),
                }
            } else if let Some(line) = summary_line(&msg) {
                eprintln!("{}", line);
            }
        }
        debug!("Message reporter thread exiting");
    });

    let prebuilt = Prebuilt::new(config, &args.config, MessageReporter::channel(tx))?;
    let cancel = CancellationToken::new();

    let result = runtime.block_on(async {
        tokio::spawn(cancel_on_interrupt(cancel.clone(), args.timeout));

        match command {
            Command::Lock => prebuilt.lock(&cancel).await.map(|_| ()),
            Command::Install { names, no_lock } => prebuilt
                .install(&names, !no_lock, &cancel)
                .await
                .map(|_| ()),
        }
    });

    // Stops the interrupt watcher, which lets the runtime shut down
    cancel.cancel();
    drop(runtime);

    // Drop everything that can report messages, once all senders are dropped then the reporter
    // thread will exit cleanly.
    drop(prebuilt);

    debug!("Waiting for reporter thread to finish");
    let _ = reporter_thread.join();

    // Per-binary failure details only went to the log
    match (result, args.log_file) {
        (Err(e @ Error::InstallFailed { .. }), Some(path)) => Err(Error::SeeLogFile {
            path,
            source: Box::new(e),
        }),
        (result, _) => result,
    }
}

fn print_version() {
    let version = env!("CARGO_PKG_VERSION");

    match (
        option_env!("VERGEN_GIT_SHA"),
        option_env!("VERGEN_GIT_COMMIT_DATE"),
    ) {
        (Some(sha), Some(date))
            if sha != "VERGEN_IDEMPOTENT_OUTPUT" && date != "VERGEN_IDEMPOTENT_OUTPUT" =>
        {
            eprintln!("prebuilt {} ({} {})", version, sha, date);
        }
        _ => {
            eprintln!("prebuilt {}", version);
        }
    }
}

/// Cancel `cancel` on Ctrl-C or once `timeout` has elapsed, whichever comes first.  Returns
/// without doing anything if `cancel` is cancelled by someone else first.
async fn cancel_on_interrupt(cancel: CancellationToken, timeout: Option<Duration>) {
    let deadline = async {
        match timeout {
            Some(timeout) => tokio::time::sleep(timeout).await,
            None => std::future::pending().await,
        }
    };

    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            // Without a signal handler only the deadline can cancel the run
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = cancel.cancelled() => {}
        () = interrupt => {
            warn!("Interrupted, cancelling");
            cancel.cancel();
        }
        () = deadline => {
            warn!("Timed out after {}, cancelling", humantime::format_duration(timeout.unwrap_or_default()));
            cancel.cancel();
        }
    }
}

/// The line printed on stderr for `msg` when not in JSON mode, if any.
fn summary_line(msg: &Message) -> Option<String> {
    match msg {
        Message::Install(InstallMessage::Installed {
            name,
            version,
            path,
        }) => Some(format!("Installed {} {} to {}", name, version, path.display())),
        Message::Install(InstallMessage::Failed { name, error }) => {
            Some(format!("Failed to install {}: {}", name, error))
        }
        Message::Lock(LockMessage::Written {
            path, binaries, ..
        }) => Some(format!("Locked {} binaries in {}", binaries, path.display())),
        _ => None,
    }
}
