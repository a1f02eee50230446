// Copyright (C) 2024 Daniel Mueller <deso@posteo.net>
// SPDX-License-Identifier: GPL-3.0-or-later

use std::error::Error as StdError;
use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::io;
use std::iter::successors;
use std::path::PathBuf;
use std::string::FromUtf8Error;
use std::time::Duration;

use lettre::address::AddressError;
use lettre::transport::smtp::Error as SmtpError;


/// The broad class an [`Error`] belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
  /// Bad or missing configuration or arguments.
  Config,
  /// The message could not be assembled.
  Encoding,
  /// Connecting, authenticating, or transmitting failed.
  Transport,
}

impl Display for ErrorKind {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    let s = match self {
      Self::Config => "ConfigError",
      Self::Encoding => "EncodingError",
      Self::Transport => "TransportError",
    };
    f.write_str(s)
  }
}


/// An error reported by this crate.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
  #[error("{0}")]
  Config(String),
  #[error("failed to parse {field} address `{input}`")]
  Address {
    field: &'static str,
    input: String,
    #[source]
    source: AddressError,
  },
  #[error("failed to read `{}`", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
  #[error("failed to parse `{}` contents as JSON", path.display())]
  ConfigParse {
    path: PathBuf,
    #[source]
    source: Box<dyn StdError + Send + Sync>,
  },
  #[error("failed to attach `{}`", path.display())]
  Attachment {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
  #[error("message body is not valid UTF-8")]
  MalformedBody(#[source] FromUtf8Error),
  #[error("invalid content type `{0}`")]
  ContentType(String),
  #[error("failed to create email message")]
  Build(#[source] lettre::error::Error),
  #[error("failed to send email via {host}:{port}")]
  Transport {
    host: String,
    port: u16,
    #[source]
    source: SmtpError,
  },
  #[error("timed out after {timeout:?} sending email via {host}:{port}")]
  Timeout {
    host: String,
    port: u16,
    timeout: Duration,
  },
}

impl Error {
  /// Retrieve the class this error belongs to.
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::Config(..) | Self::Address { .. } | Self::Read { .. } | Self::ConfigParse { .. } => {
        ErrorKind::Config
      },
      Self::Attachment { .. }
      | Self::MalformedBody(..)
      | Self::ContentType(..)
      | Self::Build(..) => ErrorKind::Encoding,
      Self::Transport { .. } | Self::Timeout { .. } => ErrorKind::Transport,
    }
  }

  /// Render the error along with all its causes on a single line.
  pub fn chain(&self) -> String {
    successors(Some(self as &dyn StdError), |&err| err.source())
      .map(ToString::to_string)
      .collect::<Vec<_>>()
      .join(": ")
  }
}
