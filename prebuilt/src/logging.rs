use std::{
    io::IsTerminal,
    sync::{Mutex, OnceLock},
};
use tracing::Level;
use tracing_subscriber::reload;

use crate::{CliArgs, Error, Result};
use prebuilt_core::config::Config;

/// Environment variable holding a tracing filter, checked before `RUST_LOG`.
const LOG_ENV_VAR: &str = "PREBUILT_LOG";

/// Handle for reloading the tracing filter at runtime.
///
/// This allows us to update the log level after loading configuration from files,
/// while still having logging available during the config loading process itself.
type ReloadHandle = reload::Handle<tracing_subscriber::EnvFilter, tracing_subscriber::Registry>;

/// Global storage for the reload handle, initialized once during [`init`].
static RELOAD_HANDLE: OnceLock<ReloadHandle> = OnceLock::new();

/// Initialize tracing/logging based on the contents of the parsed CLI args.
///
/// # Verbosity levels
///
/// - `0`: WARN and ERROR only, simple format (silent on happy path)
/// - `1`: INFO level, structured format with timestamp/target
/// - `2`: DEBUG level, structured format
/// - `3+`: TRACE level, structured format
///
/// `PREBUILT_LOG`, then `RUST_LOG`, override the level derived from the verbosity.
///
/// If `--log-file` was given, the same events are also written to that file without colors.
///
/// # Panics
///
/// This function will panic if called more than once in the same process, as the
/// global tracing subscriber can only be initialized once.
pub(crate) fn init(args: &CliArgs) -> Result<()> {
    use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

    let level = match args.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    // Wrap the filter in a reload layer so we can update it later based on config
    let (filter, reload_handle) = reload::Layer::new(filter);
    let _ = RELOAD_HANDLE.set(reload_handle);

    let use_ansi = std::io::stderr().is_terminal();

    let stderr_layer = if args.verbose == 0 {
        // Just the message, one per line.  Not meant to look very "loggy".
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_level(true)
            .with_ansi(use_ansi)
            .without_time()
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_level(true)
            .with_ansi(use_ansi)
            .boxed()
    };

    let file_layer = match &args.log_file {
        Some(path) => {
            let file = std::fs::File::create(path).map_err(|source| Error::Io {
                path: path.clone(),
                source,
            })?;

            Some(
                fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_target(true)
                    .with_ansi(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(())
}

/// Apply the `logLevel` setting from the config file, unless `-v` or one of the log environment
/// variables already chose a level.  Must be called after [`init`].
pub(crate) fn apply_config(config: &Config, args: &CliArgs) {
    use tracing_subscriber::EnvFilter;

    if args.verbose > 0 {
        tracing::debug!("Not applying config log_level: CLI verbosity flag takes precedence");
        return;
    }

    if std::env::var(LOG_ENV_VAR).is_ok() || std::env::var("RUST_LOG").is_ok() {
        tracing::debug!("Not applying config log_level: environment variable takes precedence");
        return;
    }

    let Some(ref log_level) = config.log_level else {
        return;
    };

    let new_filter = match EnvFilter::try_new(log_level) {
        Ok(filter) => filter,
        Err(e) => {
            tracing::warn!("Invalid log_level in config file: {}: {}", log_level, e);
            return;
        }
    };

    match RELOAD_HANDLE.get().map(|handle| handle.reload(new_filter)) {
        Some(Ok(())) => tracing::debug!("Applied log level from config: {}", log_level),
        Some(Err(e)) => tracing::warn!("Failed to reload log filter: {}", e),
        None => tracing::warn!("Reload handle not initialized; cannot apply config log level"),
    }
}
