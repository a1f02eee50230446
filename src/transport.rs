// Copyright (C) 2024 Daniel Mueller <deso@posteo.net>
// SPDX-License-Identifier: GPL-3.0-or-later

use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;

use chrono::DateTime;
use chrono::Utc;

use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::Error as SmtpError;
use lettre::AsyncSmtpTransport;
use lettre::AsyncTransport as _;
use lettre::Tokio1Executor;

use tokio::time::timeout;

use crate::Auth;
use crate::EncodedMessage;
use crate::Error;
use crate::SmtpMode;
use crate::TransportConfig;


/// Options influencing how an email is sent.
#[derive(Clone, Debug, Default)]
pub struct SendOpts {
  /// Perform every step except for actually contacting the server.
  pub dry_run: bool,
  /// The type is non-exhaustive and open to extension.
  #[doc(hidden)]
  pub _non_exhaustive: (),
}


/// What became of an attempt to send an email.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
  Sent,
  DryRunSkipped,
  Failed,
}

impl Display for Outcome {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    let s = match self {
      Self::Sent => "sent",
      Self::DryRunSkipped => "dry-run-skipped",
      Self::Failed => "failed",
    };
    f.write_str(s)
  }
}


/// The result of a single invocation, suitable for reporting.
#[derive(Debug)]
pub struct RunResult {
  pub outcome: Outcome,
  /// The error that caused the run to fail, if any.
  pub error: Option<Error>,
  /// The time at which the run concluded.
  pub timestamp: DateTime<Utc>,
}

impl RunResult {
  /// Check whether the run achieved what it was asked to do.
  pub fn succeeded(&self) -> bool {
    self.outcome != Outcome::Failed
  }

  /// The error along with all its causes, if the run failed.
  pub fn detail(&self) -> Option<String> {
    self.error.as_ref().map(Error::chain)
  }
}

impl From<Result<Outcome, Error>> for RunResult {
  fn from(result: Result<Outcome, Error>) -> Self {
    let (outcome, error) = match result {
      Ok(outcome) => (outcome, None),
      Err(err) => (Outcome::Failed, Some(err)),
    };

    Self {
      outcome,
      error,
      timestamp: Utc::now(),
    }
  }
}


fn transport_error(transport: &TransportConfig, source: SmtpError) -> Error {
  Error::Transport {
    host: transport.host.clone(),
    port: transport.port,
    source,
  }
}

fn mailer(transport: &TransportConfig) -> Result<AsyncSmtpTransport<Tokio1Executor>, Error> {
  let host = transport.host.as_str();
  let builder = match transport.mode {
    SmtpMode::Unencrypted => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host),
    SmtpMode::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(host)
      .map_err(|err| transport_error(transport, err))?,
    SmtpMode::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
      .map_err(|err| transport_error(transport, err))?,
  };

  let builder = builder.port(transport.port).timeout(transport.timeout);
  let builder = match &transport.auth {
    Auth::Anonymous => builder,
    Auth::Login { user, password } => {
      builder.credentials(Credentials::new(user.clone(), password.clone()))
    },
  };
  Ok(builder.build())
}


/// Send `message` using the server described by `transport`.
///
/// A connection is established for this message only and torn down
/// before the function returns, regardless of the outcome. With
/// `opts.dry_run` set no connection is made at all.
#[cfg_attr(
  feature = "tracing",
  tracing::instrument(skip_all, fields(host = %transport.host, port = transport.port, mode = %transport.mode), err)
)]
pub async fn send(
  message: &EncodedMessage,
  transport: &TransportConfig,
  opts: &SendOpts,
) -> Result<Outcome, Error> {
  let () = transport.validate()?;

  let SendOpts {
    dry_run,
    _non_exhaustive: (),
  } = opts;

  if *dry_run {
    #[cfg(feature = "tracing")]
    tracing::debug!("dry run; not contacting SMTP server");
    return Ok(Outcome::DryRunSkipped)
  }

  let mailer = mailer(transport)?;
  let future = mailer.send(message.message().clone());
  let result = if let Some(duration) = transport.timeout {
    timeout(duration, future)
      .await
      .map_err(|_elapsed| Error::Timeout {
        host: transport.host.clone(),
        port: transport.port,
        timeout: duration,
      })?
  } else {
    future.await
  };

  let _response = result.map_err(|err| transport_error(transport, err))?;

  #[cfg(feature = "tracing")]
  tracing::debug!(code = %_response.code(), "server accepted message");
  Ok(Outcome::Sent)
}
