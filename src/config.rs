// Copyright (C) 2024 Daniel Mueller <deso@posteo.net>
// SPDX-License-Identifier: GPL-3.0-or-later

use std::fmt::Debug;
use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::str::FromStr;
use std::time::Duration;

#[cfg(feature = "config")]
use std::path::Path;

#[cfg(feature = "config")]
use serde::Deserialize;

use crate::Error;


/// The timeout used for the SMTP exchange unless configured otherwise.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);


#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "config", derive(Deserialize))]
#[cfg_attr(feature = "config", serde(rename_all = "lowercase"))]
#[non_exhaustive]
pub enum SmtpMode {
  /// Use unencrypted SMTP (typically on port 25).
  Unencrypted,
  /// Use StartTLS mode (often on port 587).
  #[default]
  StartTls,
  /// Use full TLS mode (often on port 465).
  Tls,
}

impl SmtpMode {
  /// The well-known port for this mode.
  pub fn default_port(&self) -> u16 {
    match self {
      Self::Unencrypted => 25,
      Self::StartTls => 587,
      Self::Tls => 465,
    }
  }
}

impl Display for SmtpMode {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    let s = match self {
      Self::Unencrypted => "unencrypted",
      Self::StartTls => "starttls",
      Self::Tls => "tls",
    };
    f.write_str(s)
  }
}

impl FromStr for SmtpMode {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "unencrypted" | "plain" => Ok(Self::Unencrypted),
      "starttls" => Ok(Self::StartTls),
      "tls" => Ok(Self::Tls),
      _ => Err(Error::Config(format!(
        "invalid SMTP mode `{s}`; expected one of `unencrypted`, `starttls`, `tls`"
      ))),
    }
  }
}


/// How to authenticate with the SMTP server.
#[derive(Clone, Eq, PartialEq)]
pub enum Auth {
  /// Do not authenticate at all.
  Anonymous,
  /// Log in with the provided user and password.
  Login { user: String, password: String },
}

impl Debug for Auth {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    match self {
      Self::Anonymous => f.write_str("Anonymous"),
      Self::Login { user, .. } => f
        .debug_struct("Login")
        .field("user", user)
        .field("password", &"<redacted>")
        .finish(),
    }
  }
}


/// Everything needed to reach and authenticate with an SMTP server.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TransportConfig {
  /// The hostname of the SMTP server.
  pub host: String,
  /// The port to connect to.
  pub port: u16,
  /// The SMTP "mode" to use.
  pub mode: SmtpMode,
  /// The credentials to log in with, if any.
  pub auth: Auth,
  /// Upper bound for the entire SMTP exchange.
  pub timeout: Option<Duration>,
}

impl TransportConfig {
  /// Create a configuration for `host` using the well-known port of
  /// `mode`, no authentication, and the default timeout.
  pub fn new(host: impl Into<String>, mode: SmtpMode) -> Self {
    Self {
      host: host.into(),
      port: mode.default_port(),
      mode,
      auth: Auth::Anonymous,
      timeout: Some(DEFAULT_TIMEOUT),
    }
  }

  /// Check the invariants of the configuration.
  pub fn validate(&self) -> Result<(), Error> {
    if self.host.trim().is_empty() {
      return Err(Error::Config("SMTP host must not be empty".to_string()))
    }

    if self.port == 0 {
      return Err(Error::Config("SMTP port must be in range 1-65535".to_string()))
    }

    if let Auth::Login { user, .. } = &self.auth {
      if user.is_empty() {
        return Err(Error::Config("SMTP user must not be empty".to_string()))
      }
    }

    if self.timeout == Some(Duration::ZERO) {
      return Err(Error::Config("SMTP timeout must be positive".to_string()))
    }
    Ok(())
  }
}


/// The SMTP section of the configuration file.
#[cfg(feature = "config")]
#[cfg_attr(docsrs, doc(cfg(feature = "config")))]
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SmtpConfig {
  /// The hostname of the SMTP server.
  pub host: Option<String>,
  /// The port to connect to; defaults to the mode's well-known port.
  pub port: Option<u16>,
  /// The SMTP "mode" to use.
  pub mode: Option<SmtpMode>,
  /// The user to log in as.
  pub user: Option<String>,
  /// The password to use for logging in.
  pub password: Option<String>,
  /// Skip authentication altogether.
  #[serde(default)]
  pub anonymous: bool,
  /// The timeout for the SMTP exchange, in seconds.
  pub timeout_secs: Option<u64>,
}


/// The configuration file contents.
#[cfg(feature = "config")]
#[cfg_attr(docsrs, doc(cfg(feature = "config")))]
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
  /// The "From" identifier to use.
  pub from: Option<String>,
  /// Default recipients.
  #[serde(default)]
  pub to: Vec<String>,
  /// Default CC recipients.
  #[serde(default)]
  pub cc: Vec<String>,
  /// Default BCC recipients.
  #[serde(default)]
  pub bcc: Vec<String>,
  /// SMTP server settings.
  #[serde(default)]
  pub smtp: SmtpConfig,
}

#[cfg(feature = "config")]
impl Config {
  /// Parse a configuration from JSON data read from `path`.
  pub fn from_json(data: &[u8], path: &Path) -> Result<Self, Error> {
    serde_json::from_slice(data).map_err(|err| Error::ConfigParse {
      path: path.to_path_buf(),
      source: Box::new(err),
    })
  }

  /// Read and parse the configuration file at `path`.
  pub async fn load(path: &Path) -> Result<Self, Error> {
    let data = tokio::fs::read(path).await.map_err(|source| Error::Read {
      path: path.to_path_buf(),
      source,
    })?;
    Self::from_json(&data, path)
  }

  /// Read and parse the configuration file at `path`, if it exists.
  pub async fn load_if_exists(path: &Path) -> Result<Option<Self>, Error> {
    let exists = tokio::fs::try_exists(path)
      .await
      .map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
      })?;

    if exists {
      Self::load(path).await.map(Some)
    } else {
      Ok(None)
    }
  }
}


/// Retrieve the path to the system-wide configuration file.
#[cfg(feature = "config")]
#[cfg_attr(docsrs, doc(cfg(feature = "config")))]
pub fn system_config_path() -> &'static Path {
  Path::new("/etc/mailsend/config.json")
}

/// Load the system-wide configuration, if present.
#[cfg(feature = "config")]
#[cfg_attr(docsrs, doc(cfg(feature = "config")))]
pub async fn system_config() -> Result<Option<Config>, Error> {
  Config::load_if_exists(system_config_path()).await
}
