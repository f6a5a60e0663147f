use std::fs;
use std::io::IsTerminal;
use std::path::Path;

use anyhow::{
  Context,
  anyhow
};
use tracing::debug;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{
  EnvFilter,
  fmt
};

const LOG_FILE_PREFIX: &str = "ganle.log";

/// Installs the global subscriber. `RUST_LOG`
/// wins over the verbosity flags. With a
/// `log_dir`, events are also written to a
/// daily rolling file; keep the returned
/// guard alive until exit so it flushes.
pub fn init_tracing(
  verbose: u8,
  quiet: u8,
  log_dir: Option<&Path>
) -> anyhow::Result<Option<WorkerGuard>> {
  let filter = EnvFilter::try_from_default_env()
    .or_else(|_| {
      EnvFilter::try_new(default_directives(
        verbose, quiet
      ))
    })
    .map_err(|e| {
      anyhow!("invalid RUST_LOG / log filter: {e}")
    })?;

  let (file_layer, guard) = match log_dir {
    | Some(dir) => {
      fs::create_dir_all(dir).with_context(|| {
        format!("failed to create {}", dir.display())
      })?;
      let appender = tracing_appender::rolling::daily(
        dir,
        LOG_FILE_PREFIX
      );
      let (writer, guard) =
        tracing_appender::non_blocking(appender);
      let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true);
      (Some(layer), Some(guard))
    }
    | None => (None, None)
  };

  let init_result = tracing_subscriber::registry()
    .with(filter)
    .with(
      fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_line_number(true)
        .with_ansi(std::io::stderr().is_terminal())
    )
    .with(file_layer)
    .try_init();

  if let Err(err) = init_result {
    debug!(error = %err, "tracing subscriber already set, continuing");
  }

  Ok(guard)
}

fn default_directives(
  verbose: u8,
  quiet: u8
) -> &'static str {
  match (quiet, verbose) {
    | (2.., _) => "error",
    | (1, _) => "warn",
    | (0, 0) => "warn,ganle_core=info,ganle_cli=info",
    | (0, 1) => "info,ganle_core=debug,ganle_cli=debug",
    | (0, _) => "debug,ganle_core=trace,ganle_cli=trace"
  }
}
