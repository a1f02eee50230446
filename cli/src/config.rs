// Copyright (C) 2024 Daniel Mueller <deso@posteo.net>
// SPDX-License-Identifier: GPL-3.0-or-later

use std::env::var;
use std::io;
use std::io::IsTerminal as _;
use std::path::Path;
use std::time::Duration;

use mailsend::parse_mailbox;
use mailsend::parse_mailboxes;
use mailsend::system_config;
use mailsend::Auth;
use mailsend::Body;
use mailsend::BodyFormat;
use mailsend::Config;
use mailsend::Error;
use mailsend::Mailbox;
use mailsend::MessageSpec;
use mailsend::SmtpMode;
use mailsend::TransportConfig;
use mailsend::DEFAULT_TIMEOUT;

use tokio::fs::metadata;
use tokio::fs::read;
use tokio::io::stdin;
use tokio::io::AsyncReadExt as _;

use crate::args::Args;


/// Load the configuration file to use.
///
/// An explicitly provided file has to exist. Otherwise the system-wide
/// one is used if present.
async fn load_config(path: Option<&Path>) -> Result<Config, Error> {
  if let Some(path) = path {
    Config::load(path).await
  } else {
    Ok(system_config().await?.unwrap_or_default())
  }
}


/// Read the message body from the configured source.
async fn read_body(body: Option<String>, body_file: Option<&Path>) -> Result<String, Error> {
  if let Some(body) = body {
    return Ok(body)
  }

  let data = if let Some(path) = body_file {
    read(path).await.map_err(|source| Error::Read {
      path: path.to_path_buf(),
      source,
    })?
  } else {
    // At this point tokio's stdin does not sport the `is_terminal`
    // method so we have to go through std here.
    if io::stdin().is_terminal() {
      println!("Please enter message (terminate with Ctrl-D):");
    }

    let mut data = Vec::new();
    let _count = stdin()
      .read_to_end(&mut data)
      .await
      .map_err(|source| Error::Read {
        path: "<stdin>".into(),
        source,
      })?;
    data
  };

  String::from_utf8(data).map_err(Error::MalformedBody)
}


/// Parse a set of mailbox lists, as provided on the command line or in
/// the configuration file.
fn parse_recipients(field: &'static str, addrs: &[String]) -> Result<Vec<Mailbox>, Error> {
  let mut mailboxes = Vec::new();
  for addr in addrs.iter().filter(|addr| !addr.trim().is_empty()) {
    mailboxes.extend(parse_mailboxes(field, addr)?);
  }
  Ok(mailboxes)
}


/// Determine the sender to use in the absence of an explicit one.
fn default_sender(user: Option<&str>) -> Result<Mailbox, Error> {
  if let Some(user) = user.filter(|user| user.contains('@')) {
    return parse_mailbox("From", user)
  }

  let login = var("USER")
    .or_else(|_| var("LOGNAME"))
    .unwrap_or_else(|_| "mail-notify".to_string());
  parse_mailbox("From", &format!("{login}@localhost"))
}


/// Merge command line arguments with the configuration file contents.
pub(crate) async fn resolve(
  args: Args,
  config: Config,
) -> Result<(MessageSpec, TransportConfig, bool), Error> {
  let Args {
    to,
    cc,
    bcc,
    from,
    subject,
    body,
    body_file,
    html,
    attachments,
    smtp_host,
    smtp_port,
    smtp_mode,
    smtp_user,
    smtp_password,
    anonymous,
    timeout,
    config: _,
    dry_run,
    log_level: _,
    log_file: _,
    log_max_bytes: _,
    log_backups: _,
  } = args;
  let Config {
    from: config_from,
    to: config_to,
    cc: config_cc,
    bcc: config_bcc,
    smtp,
  } = config;

  let user = smtp_user.or(smtp.user);
  let password = smtp_password.or(smtp.password);

  let from = if let Some(from) = from.or(config_from) {
    parse_mailbox("From", &from)?
  } else {
    default_sender(user.as_deref())?
  };

  let (to, cc, bcc) = if to.is_empty() && cc.is_empty() && bcc.is_empty() {
    (config_to, config_cc, config_bcc)
  } else {
    (to, cc, bcc)
  };

  for path in &attachments {
    let meta = metadata(path).await.map_err(|source| Error::Read {
      path: path.clone(),
      source,
    })?;
    if !meta.is_file() {
      return Err(Error::Config(format!(
        "attachment `{}` is not a regular file",
        path.display()
      )))
    }
  }

  let mut spec = MessageSpec::new(from);
  spec.to = parse_recipients("To", &to)?;
  spec.cc = parse_recipients("Cc", &cc)?;
  spec.bcc = parse_recipients("Bcc", &bcc)?;
  spec.subject = subject.unwrap_or_default();
  spec.attachments = attachments;
  let () = spec.validate()?;

  let text = read_body(body, body_file.as_deref()).await?;
  spec.body = Body {
    text,
    format: if html {
      BodyFormat::Html
    } else {
      BodyFormat::Plain
    },
  };

  let host = match smtp_host.or(smtp.host) {
    Some(host) => host,
    // Dry runs never contact a server.
    None if dry_run => "localhost".to_string(),
    None => {
      return Err(Error::Config(
        "no SMTP host configured; use --smtp-host or the configuration file".to_string(),
      ))
    },
  };
  let mode = smtp_mode.or(smtp.mode).unwrap_or_default();

  let mut transport = TransportConfig::new(host, mode);
  transport.port = smtp_port.or(smtp.port).unwrap_or(mode.default_port());
  transport.timeout = Some(
    timeout
      .or(smtp.timeout_secs)
      .map(Duration::from_secs)
      .unwrap_or(DEFAULT_TIMEOUT),
  );
  transport.auth = match (user, password) {
    (Some(user), Some(password)) => Auth::Login { user, password },
    (Some(user), None) if !dry_run => {
      return Err(Error::Config(format!(
        "no SMTP password configured for user `{user}`"
      )))
    },
    (None, Some(_)) if !dry_run => {
      return Err(Error::Config(
        "SMTP password configured without a user".to_string(),
      ))
    },
    (None, None) if !(dry_run || anonymous || smtp.anonymous) => {
      return Err(Error::Config(
        "no SMTP credentials configured; provide --smtp-user and --smtp-password or pass --anonymous"
          .to_string(),
      ))
    },
    _ => Auth::Anonymous,
  };
  let () = transport.validate()?;

  if transport.mode == SmtpMode::Unencrypted && matches!(transport.auth, Auth::Login { .. }) {
    tracing::warn!(
      host = %transport.host,
      "sending credentials over an unencrypted connection"
    );
  }

  Ok((spec, transport, dry_run))
}


/// Parse the program's configuration from its arguments, the
/// environment, and the configuration file.
pub(crate) async fn parse_config(args: Args) -> Result<(MessageSpec, TransportConfig, bool), Error> {
  let config = load_config(args.config.as_deref()).await?;
  resolve(args, config).await
}


#[cfg(test)]
mod tests {
  use super::*;

  use std::io::Write as _;

  use mailsend::ErrorKind;
  use mailsend::SmtpConfig;

  use tempfile::NamedTempFile;

  use tokio::test;


  fn parse_args(args: &[&str]) -> Args {
    Args::parse_isolated(args)
  }


  /// Check that a minimal dry run invocation needs no transport
  /// settings.
  #[test]
  async fn minimal_dry_run() {
    let args = parse_args(&[
      "--to", "a@x.com", "--subject", "Hi", "--body", "hello", "--dry-run",
    ]);
    let (spec, transport, dry_run) = resolve(args, Config::default()).await.unwrap();
    assert!(dry_run);
    assert_eq!(spec.to.len(), 1);
    assert_eq!(spec.to[0].email.to_string(), "a@x.com");
    assert_eq!(spec.subject, "Hi");
    assert_eq!(spec.body, Body::plain("hello"));
    assert_eq!(transport.host, "localhost");
    assert_eq!(transport.auth, Auth::Anonymous);
  }

  /// Make sure that we insist on at least one recipient.
  #[test]
  async fn no_recipients() {
    let args = parse_args(&["--subject", "Hi", "--body", "hello", "--dry-run"]);
    let err = resolve(args, Config::default()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
  }

  /// Check that Cc or Bcc recipients alone suffice.
  #[test]
  async fn cc_and_bcc_only() {
    let args = parse_args(&["--bcc", "audit@x.com", "--body", "", "--dry-run"]);
    let (spec, _, _) = resolve(args, Config::default()).await.unwrap();
    assert!(spec.to.is_empty());
    assert_eq!(spec.bcc.len(), 1);

    let args = parse_args(&["--cc", "a@x.com,b@x.com", "--body", "", "--dry-run"]);
    let (spec, _, _) = resolve(args, Config::default()).await.unwrap();
    assert_eq!(spec.cc.len(), 2);
  }

  /// Check that display names containing commas survive as a single
  /// recipient, while options can still be repeated.
  #[test]
  async fn quoted_display_names() {
    let args = parse_args(&[
      "--to",
      r#""Doe, Jane" <jane@x.com>"#,
      "--to",
      "ops@x.com, lead@x.com",
      "--body",
      "",
      "--dry-run",
    ]);
    let (spec, _, _) = resolve(args, Config::default()).await.unwrap();
    assert_eq!(spec.to.len(), 3);
    assert_eq!(spec.to[0].name.as_deref(), Some("Doe, Jane"));
    assert_eq!(spec.to[0].email.to_string(), "jane@x.com");
    assert_eq!(spec.to[2].email.to_string(), "lead@x.com");

    let config = Config {
      to: vec![r#""Ops, Team" <ops@x.com>"#.to_string()],
      ..Default::default()
    };
    let args = parse_args(&["--body", "", "--dry-run"]);
    let (spec, _, _) = resolve(args, config).await.unwrap();
    assert_eq!(spec.to.len(), 1);
    assert_eq!(spec.to[0].name.as_deref(), Some("Ops, Team"));
  }

  /// Check that invalid addresses are reported as configuration errors.
  #[test]
  async fn invalid_address() {
    let args = parse_args(&["--to", "not-an-address", "--body", "", "--dry-run"]);
    let err = resolve(args, Config::default()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
    assert!(matches!(err, Error::Address { field: "To", .. }), "{err:?}");

    let args = parse_args(&["--to", "a@x.com", "--from", "@@", "--body", "", "--dry-run"]);
    let err = resolve(args, Config::default()).await.unwrap_err();
    assert!(matches!(err, Error::Address { field: "From", .. }), "{err:?}");
  }

  /// Make sure that missing attachments are detected early.
  #[test]
  async fn missing_attachment() {
    let args = parse_args(&[
      "--to",
      "a@x.com",
      "--body",
      "",
      "--attach",
      "/does/not/exist.txt",
      "--dry-run",
    ]);
    let err = resolve(args, Config::default()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
  }

  /// Check that a non-numeric port is rejected while parsing arguments.
  #[test]
  async fn non_numeric_port() {
    let result = <Args as clap::Parser>::try_parse_from([
      "mail-notify",
      "--to",
      "a@x.com",
      "--smtp-port",
      "abc",
    ]);
    assert!(result.is_err());
  }

  /// Check that transport settings are required for a real send.
  #[test]
  async fn transport_requirements() {
    let args = parse_args(&["--to", "a@x.com", "--body", "hi"]);
    let err = resolve(args, Config::default()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
    assert!(err.to_string().contains("SMTP host"), "{err}");

    let args = parse_args(&["--to", "a@x.com", "--body", "hi", "--smtp-host", "mx.x.com"]);
    let err = resolve(args, Config::default()).await.unwrap_err();
    assert!(err.to_string().contains("credentials"), "{err}");

    let args = parse_args(&[
      "--to",
      "a@x.com",
      "--body",
      "hi",
      "--smtp-host",
      "mx.x.com",
      "--smtp-user",
      "ci",
    ]);
    let err = resolve(args, Config::default()).await.unwrap_err();
    assert!(err.to_string().contains("password"), "{err}");

    let args = parse_args(&[
      "--to",
      "a@x.com",
      "--body",
      "hi",
      "--smtp-host",
      "mx.x.com",
      "--anonymous",
      "--smtp-mode",
      "tls",
    ]);
    let (_, transport, dry_run) = resolve(args, Config::default()).await.unwrap();
    assert!(!dry_run);
    assert_eq!(transport.mode, SmtpMode::Tls);
    assert_eq!(transport.port, 465);
    assert_eq!(transport.auth, Auth::Anonymous);
  }

  /// Check that command line arguments take precedence over the
  /// configuration file.
  #[test]
  async fn config_merging() {
    let config = Config {
      from: Some("CI <ci@x.com>".to_string()),
      to: vec!["ops@x.com".to_string()],
      cc: vec!["lead@x.com".to_string()],
      bcc: Vec::new(),
      smtp: SmtpConfig {
        host: Some("smtp.x.com".to_string()),
        port: Some(2525),
        mode: Some(SmtpMode::StartTls),
        user: Some("ci@x.com".to_string()),
        password: Some("secret".to_string()),
        anonymous: false,
        timeout_secs: Some(5),
      },
    };

    let args = parse_args(&["--body", "hi", "--smtp-port", "587"]);
    let (spec, transport, _) = resolve(args, config).await.unwrap();
    assert_eq!(spec.from.email.to_string(), "ci@x.com");
    assert_eq!(spec.to[0].email.to_string(), "ops@x.com");
    assert_eq!(spec.cc[0].email.to_string(), "lead@x.com");
    assert_eq!(transport.host, "smtp.x.com");
    assert_eq!(transport.port, 587);
    assert_eq!(transport.timeout, Some(Duration::from_secs(5)));
    assert_eq!(
      transport.auth,
      Auth::Login {
        user: "ci@x.com".to_string(),
        password: "secret".to_string(),
      }
    );

    // Recipients on the command line replace all configured ones.
    let config = Config {
      to: vec!["ops@x.com".to_string()],
      cc: vec!["lead@x.com".to_string()],
      ..Default::default()
    };
    let args = parse_args(&["--bcc", "audit@x.com", "--body", "hi", "--dry-run"]);
    let (spec, _, _) = resolve(args, config).await.unwrap();
    assert!(spec.to.is_empty());
    assert!(spec.cc.is_empty());
    assert_eq!(spec.bcc.len(), 1);
  }

  /// Check that the SMTP user doubles as sender if it is an address.
  #[test]
  async fn sender_from_user() {
    let args = parse_args(&[
      "--to",
      "a@x.com",
      "--body",
      "hi",
      "--smtp-user",
      "robot@x.com",
      "--dry-run",
    ]);
    let (spec, _, _) = resolve(args, Config::default()).await.unwrap();
    assert_eq!(spec.from.email.to_string(), "robot@x.com");
  }

  /// Check that the body can be read from a file and that invalid UTF-8
  /// is flagged.
  #[test]
  async fn body_file() {
    let mut file = NamedTempFile::new().unwrap();
    let () = file.write_all(b"<h1>Report</h1>").unwrap();
    let path = file.path().to_str().unwrap();

    let args = parse_args(&["--to", "a@x.com", "--body-file", path, "--html", "--dry-run"]);
    let (spec, _, _) = resolve(args, Config::default()).await.unwrap();
    assert_eq!(spec.body, Body::html("<h1>Report</h1>"));

    let mut file = NamedTempFile::new().unwrap();
    let () = file.write_all(&[0xff, 0xfe, 0x00]).unwrap();
    let path = file.path().to_str().unwrap();

    let args = parse_args(&["--to", "a@x.com", "--body-file", path, "--dry-run"]);
    let err = resolve(args, Config::default()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Encoding);
  }

  /// Make sure that an explicitly provided configuration file is loaded
  /// and has to exist.
  #[test]
  async fn explicit_config_file() {
    let err = load_config(Some(Path::new("/does/not/exist.json")))
      .await
      .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);

    let mut file = NamedTempFile::new().unwrap();
    let () = file
      .write_all(br#"{"to": ["ops@x.com"], "smtp": {"host": "smtp.x.com", "anonymous": true}}"#)
      .unwrap();
    let config = load_config(Some(file.path())).await.unwrap();
    assert_eq!(config.to, vec!["ops@x.com".to_string()]);
    assert!(config.smtp.anonymous);

    let mut file = NamedTempFile::new().unwrap();
    let () = file.write_all(b"{ not json").unwrap();
    let err = load_config(Some(file.path())).await.unwrap_err();
    assert!(matches!(err, Error::ConfigParse { .. }), "{err:?}");
  }
}
