// Copyright (C) 2024 Daniel Mueller <deso@posteo.net>
// SPDX-License-Identifier: GPL-3.0-or-later

use std::path::PathBuf;

use clap::Parser;

use mailsend::SmtpMode;

use tracing_subscriber::filter::LevelFilter;


/// A program for sending email notifications.
#[derive(Debug, Parser)]
#[clap(version = env!("VERSION"))]
pub(crate) struct Args {
  /// A recipient of the email.
  ///
  /// May be repeated or contain a comma separated list of addresses,
  /// e.g., '"Doe, Jane" <jane@example.com>, ops@example.com'.
  /// Recipients provided on the command line (including Cc and Bcc)
  /// replace those from the configuration file.
  #[clap(short, long, value_name = "ADDRESS")]
  pub to: Vec<String>,
  /// A carbon copy recipient of the email.
  #[clap(long, value_name = "ADDRESS")]
  pub cc: Vec<String>,
  /// A blind carbon copy recipient of the email.
  #[clap(long, value_name = "ADDRESS")]
  pub bcc: Vec<String>,
  /// The "From" identifier to use, e.g., 'CI <ci@example.com>'.
  #[clap(short, long, value_name = "ADDRESS")]
  pub from: Option<String>,
  /// The subject to use for the email.
  #[clap(short, long)]
  pub subject: Option<String>,
  /// The body of the email.
  ///
  /// If neither this option nor --body-file is given, the body is read
  /// from standard input.
  #[clap(short, long, conflicts_with = "body_file")]
  pub body: Option<String>,
  /// Read the body of the email from the provided file.
  #[clap(long, value_name = "PATH")]
  pub body_file: Option<PathBuf>,
  /// Send the body as HTML instead of plain text.
  #[clap(long)]
  pub html: bool,
  /// A file to attach; may be repeated.
  #[clap(short, long = "attach", value_name = "PATH")]
  pub attachments: Vec<PathBuf>,
  /// The hostname of the SMTP server.
  #[clap(long, env = "MAIL_NOTIFY_SMTP_HOST", value_name = "HOST")]
  pub smtp_host: Option<String>,
  /// The port of the SMTP server; defaults to the well-known port of
  /// the SMTP mode.
  #[clap(long, value_name = "PORT")]
  pub smtp_port: Option<u16>,
  /// The SMTP mode to use: 'unencrypted', 'starttls', or 'tls'.
  #[clap(long, value_name = "MODE")]
  pub smtp_mode: Option<SmtpMode>,
  /// The user to log in as.
  #[clap(long, env = "MAIL_NOTIFY_SMTP_USER", value_name = "USER")]
  pub smtp_user: Option<String>,
  /// The password to log in with.
  #[clap(
    long,
    env = "MAIL_NOTIFY_SMTP_PASSWORD",
    hide_env_values = true,
    value_name = "PASSWORD"
  )]
  pub smtp_password: Option<String>,
  /// Do not authenticate with the SMTP server.
  #[clap(long)]
  pub anonymous: bool,
  /// Give up on the SMTP exchange after this many seconds.
  #[clap(long, value_name = "SECONDS")]
  pub timeout: Option<u64>,
  /// The path to the configuration file.
  #[clap(short, long, env = "MAIL_NOTIFY_CONFIG", value_name = "PATH")]
  pub config: Option<PathBuf>,
  /// Do everything but actually sending the email.
  #[clap(long)]
  pub dry_run: bool,
  /// The maximum level of log messages to emit.
  ///
  /// One of 'off', 'error', 'warn', 'info', 'debug', or 'trace'. If not
  /// provided, the RUST_LOG environment variable is consulted, falling
  /// back to 'info'.
  #[clap(long, value_name = "LEVEL")]
  pub log_level: Option<LevelFilter>,
  /// Additionally append log messages to the provided file.
  #[clap(long, value_name = "PATH")]
  pub log_file: Option<PathBuf>,
  /// Rotate the log file once it grows beyond this many bytes.
  #[clap(long, value_name = "BYTES", default_value_t = 5 * 1024 * 1024)]
  pub log_max_bytes: usize,
  /// The number of rotated log files to keep around.
  #[clap(long, value_name = "COUNT", default_value_t = 3)]
  pub log_backups: usize,
}


#[cfg(test)]
impl Args {
  /// Parse arguments without consulting any environment variables.
  pub(crate) fn parse_isolated(args: &[&str]) -> Self {
    use clap::CommandFactory as _;
    use clap::FromArgMatches as _;

    let command = ["smtp_host", "smtp_user", "smtp_password", "config"]
      .into_iter()
      .fold(Self::command(), |command, id| {
        command.mut_arg(id, |arg| arg.env(None::<&'static str>))
      });
    let matches = command
      .try_get_matches_from(["mail-notify"].iter().chain(args).copied())
      .unwrap();
    Self::from_arg_matches(&matches).unwrap()
  }
}
