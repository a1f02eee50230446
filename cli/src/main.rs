// Copyright (C) 2024 Daniel Mueller <deso@posteo.net>
// SPDX-License-Identifier: GPL-3.0-or-later

#![allow(
  clippy::collapsible_if,
  clippy::fn_to_numeric_cast,
  clippy::let_and_return,
  clippy::let_unit_value
)]

mod args;
mod config;

use std::env::args_os;
use std::env::var_os;
use std::ffi::OsString;
use std::fs::OpenOptions;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Mutex;

use clap::Parser as _;

use anyhow::Context as _;
use anyhow::Result;

use mailsend::build_message;
use mailsend::send;
use mailsend::Error;
use mailsend::ErrorKind;
use mailsend::Outcome;
use mailsend::RunResult;
use mailsend::SendOpts;

use file_rotate::compression::Compression;
use file_rotate::suffix::AppendCount;
use file_rotate::ContentLimit;
use file_rotate::FileRotate;

use tracing::error;
use tracing::info;
use tracing::Subscriber;
use tracing::subscriber::set_global_default as set_global_subscriber;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::Registry;

use crate::args::Args;
use crate::config::parse_config;


async fn run_impl(args: Args) -> Result<Outcome, Error> {
  let (spec, transport, dry_run) = parse_config(args).await?;
  let message = build_message(&spec)?;
  let recipients = message.recipients().join(", ");

  if dry_run {
    info!(
      recipients = %recipients,
      attachments = message.attachments().len(),
      "dry run enabled; email would be sent"
    );
  }

  let opts = SendOpts {
    dry_run,
    ..Default::default()
  };
  let outcome = send(&message, &transport, &opts).await?;
  if outcome == Outcome::Sent {
    info!(recipients = %recipients, host = %transport.host, "email sent");
  }
  Ok(outcome)
}


fn exit_code(kind: ErrorKind) -> u8 {
  match kind {
    ErrorKind::Config => 2,
    ErrorKind::Encoding => 3,
    ErrorKind::Transport => 4,
  }
}


/// Emit the log line summarizing a run and map it to an exit code.
fn report(result: &RunResult) -> u8 {
  let timestamp = result.timestamp.to_rfc3339();
  match &result.error {
    None => {
      info!(outcome = %result.outcome, timestamp = %timestamp, "{}", result.outcome);
      0
    },
    Some(err) => {
      error!(
        outcome = %result.outcome,
        kind = %err.kind(),
        error = %err.chain(),
        timestamp = %timestamp,
        "{}",
        result.outcome
      );
      exit_code(err.kind())
    },
  }
}


/// The log file to append to and its rotation settings.
#[derive(Clone, Copy, Debug)]
struct LogFile<'p> {
  path: &'p Path,
  max_bytes: usize,
  backups: usize,
}


/// Open the log file for appending, rotating it once it grows too
/// large.
fn log_writer(log_file: &LogFile<'_>) -> Result<FileRotate<AppendCount>, Error> {
  let LogFile {
    path,
    max_bytes,
    backups,
  } = *log_file;

  if max_bytes == 0 || backups == 0 {
    return Err(Error::Config(
      "log file size limit and backup count must be positive".to_string(),
    ))
  }

  // `FileRotate` does not report failure to open the file, so check
  // upfront.
  let _file = OpenOptions::new()
    .create(true)
    .append(true)
    .open(path)
    .map_err(|err| {
      Error::Config(format!(
        "failed to open log file `{}`: {err}",
        path.display()
      ))
    })?;

  let writer = FileRotate::new(
    path,
    AppendCount::new(backups),
    ContentLimit::BytesSurpassed(max_bytes),
    Compression::None,
    #[cfg(unix)]
    None,
  );
  Ok(writer)
}


fn log_subscriber(
  level: Option<LevelFilter>,
  log_file: Option<LogFile<'_>>,
) -> Result<impl Subscriber + Send + Sync + 'static, Error> {
  let filter = if let Some(level) = level {
    EnvFilter::new(level.to_string())
  } else {
    let directive = var_os(EnvFilter::DEFAULT_ENV).unwrap_or_default();
    let directive = directive.to_str().ok_or_else(|| {
      Error::Config(format!(
        "env var `{}` is not valid UTF-8",
        EnvFilter::DEFAULT_ENV
      ))
    })?;
    let directive = if directive.is_empty() {
      "info"
    } else {
      directive
    };
    EnvFilter::new(directive)
  };

  let timer = || ChronoLocal::new("%Y-%m-%dT%H:%M:%S%.3f%:z".to_string());
  let stderr = fmt::layer()
    .with_timer(timer())
    .with_writer(std::io::stderr);
  let file = log_file
    .map(|log_file| {
      let writer = log_writer(&log_file)?;
      let layer = fmt::layer()
        .with_ansi(false)
        .with_timer(timer())
        .with_writer(Mutex::new(writer));
      Result::<_, Error>::Ok(layer)
    })
    .transpose()?;

  let subscriber = Registry::default().with(filter).with(stderr).with(file);
  Ok(subscriber)
}


fn install<S>(subscriber: S) -> Result<()>
where
  S: Subscriber + Send + Sync + 'static,
{
  set_global_subscriber(subscriber).with_context(|| "failed to set tracing subscriber")
}


/// Run the program and report errors, if any.
async fn run<A, T>(args: A) -> Result<u8>
where
  A: IntoIterator<Item = T>,
  T: Into<OsString> + Clone,
{
  let args = match Args::try_parse_from(args) {
    Ok(args) => args,
    Err(err) => match err.kind() {
      clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
        print!("{}", err);
        return Ok(0)
      },
      _ => {
        let subscriber =
          log_subscriber(None, None).or_else(|_| log_subscriber(Some(LevelFilter::INFO), None))?;
        let () = install(subscriber)?;
        eprint!("{}", err);

        let rendered = err.to_string();
        let summary = rendered
          .lines()
          .next()
          .unwrap_or_default()
          .trim_start_matches("error: ");
        let err = Error::Config(format!("invalid arguments: {summary}"));
        return Ok(report(&RunResult::from(Err(err))))
      },
    },
  };

  let log_file = args.log_file.as_deref().map(|path| LogFile {
    path,
    max_bytes: args.log_max_bytes,
    backups: args.log_backups,
  });
  match log_subscriber(args.log_level, log_file) {
    Ok(subscriber) => {
      let () = install(subscriber)?;
    },
    Err(err) => {
      let level = args.log_level.unwrap_or(LevelFilter::INFO);
      let () = install(log_subscriber(Some(level), None)?)?;
      return Ok(report(&RunResult::from(Err(err))))
    },
  }

  let result = RunResult::from(run_impl(args).await);
  Ok(report(&result))
}


#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
  run(args_os()).await.map(ExitCode::from)
}
