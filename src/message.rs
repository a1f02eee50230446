// Copyright (C) 2024 Daniel Mueller <deso@posteo.net>
// SPDX-License-Identifier: GPL-3.0-or-later

use std::fs::read;
use std::path::Path;
use std::path::PathBuf;

use lettre::address::Envelope;
use lettre::message::header::ContentType;
use lettre::message::Attachment;
use lettre::message::Mailbox;
use lettre::message::Mailboxes;
use lettre::message::MultiPart;
use lettre::message::SinglePart;
use lettre::Message;

use crate::Error;


/// Parse a mailbox specification such as `Jane <jane@example.com>`.
///
/// `field` names the header the address is meant for and is only used
/// for error reporting.
pub fn parse_mailbox(field: &'static str, input: &str) -> Result<Mailbox, Error> {
  input.trim().parse().map_err(|source| Error::Address {
    field,
    input: input.to_string(),
    source,
  })
}


/// Parse a comma separated list of mailboxes.
///
/// Quoted display names may contain commas, e.g.,
/// `"Doe, Jane" <jane@example.com>, ops@example.com`.
pub fn parse_mailboxes(field: &'static str, input: &str) -> Result<Vec<Mailbox>, Error> {
  let mailboxes = input
    .trim()
    .parse::<Mailboxes>()
    .map_err(|source| Error::Address {
      field,
      input: input.to_string(),
      source,
    })?;
  Ok(mailboxes.into_iter().collect())
}


/// The format of a message body.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum BodyFormat {
  #[default]
  Plain,
  Html,
}


/// The textual body of an email.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Body {
  pub text: String,
  pub format: BodyFormat,
}

impl Body {
  pub fn plain(text: impl Into<String>) -> Self {
    Self {
      text: text.into(),
      format: BodyFormat::Plain,
    }
  }

  pub fn html(text: impl Into<String>) -> Self {
    Self {
      text: text.into(),
      format: BodyFormat::Html,
    }
  }

  fn content_type(&self) -> ContentType {
    match self.format {
      BodyFormat::Plain => ContentType::TEXT_PLAIN,
      BodyFormat::Html => ContentType::TEXT_HTML,
    }
  }
}


/// A description of the email to send.
#[derive(Clone, Debug)]
pub struct MessageSpec {
  /// The "From" mailbox.
  pub from: Mailbox,
  /// The "To" recipients.
  pub to: Vec<Mailbox>,
  /// The "Cc" recipients.
  pub cc: Vec<Mailbox>,
  /// Blind recipients; these never show up in the headers.
  pub bcc: Vec<Mailbox>,
  pub subject: String,
  pub body: Body,
  /// Paths of files to attach, in order.
  pub attachments: Vec<PathBuf>,
}

impl MessageSpec {
  /// Create a message from `from` without any recipients, subject,
  /// body, or attachments.
  pub fn new(from: Mailbox) -> Self {
    Self {
      from,
      to: Vec::new(),
      cc: Vec::new(),
      bcc: Vec::new(),
      subject: String::new(),
      body: Body::default(),
      attachments: Vec::new(),
    }
  }

  /// Check that the message has at least one recipient.
  pub fn validate(&self) -> Result<(), Error> {
    if self.to.is_empty() && self.cc.is_empty() && self.bcc.is_empty() {
      return Err(Error::Config(
        "no recipients specified; provide at least one To, Cc, or Bcc address".to_string(),
      ))
    }
    Ok(())
  }
}


/// An assembled email, ready to be handed to a transport.
#[derive(Clone, Debug)]
pub struct EncodedMessage {
  message: Message,
  attachments: Vec<String>,
}

impl EncodedMessage {
  /// The SMTP envelope, covering To, Cc, and Bcc recipients alike.
  pub fn envelope(&self) -> &Envelope {
    self.message.envelope()
  }

  /// The addresses the message will be delivered to.
  pub fn recipients(&self) -> Vec<String> {
    self
      .envelope()
      .to()
      .iter()
      .map(ToString::to_string)
      .collect()
  }

  /// The file names of all attachments, in order.
  pub fn attachments(&self) -> &[String] {
    &self.attachments
  }

  /// The message in its wire format.
  pub fn formatted(&self) -> Vec<u8> {
    self.message.formatted()
  }

  pub(crate) fn message(&self) -> &Message {
    &self.message
  }
}


const OCTET_STREAM: &str = "application/octet-stream";


fn attachment_name(path: &Path) -> String {
  path
    .file_name()
    .map(|name| name.to_string_lossy().into_owned())
    .unwrap_or_else(|| "attachment".to_string())
}


/// Assemble the MIME message described by `spec`.
///
/// The body always forms the first part of a `multipart/mixed` message
/// and every attachment follows as an `application/octet-stream` part.
#[cfg_attr(
  feature = "tracing",
  tracing::instrument(skip_all, fields(attachments = spec.attachments.len()), err)
)]
pub fn build_message(spec: &MessageSpec) -> Result<EncodedMessage, Error> {
  let () = spec.validate()?;

  let mut email = Message::builder()
    .from(spec.from.clone())
    .subject(spec.subject.as_str());

  for to in &spec.to {
    email = email.to(to.clone());
  }
  for cc in &spec.cc {
    email = email.cc(cc.clone());
  }
  for bcc in &spec.bcc {
    email = email.bcc(bcc.clone());
  }

  // Passing the body as string makes `lettre` take care of line ending
  // conversion; some mailers reject bare linefeeds.
  let body = SinglePart::builder()
    .header(spec.body.content_type())
    .body(spec.body.text.clone());
  let mut parts = MultiPart::mixed().singlepart(body);
  let mut names = Vec::with_capacity(spec.attachments.len());

  let octet_stream = ContentType::parse(OCTET_STREAM)
    .map_err(|_| Error::ContentType(OCTET_STREAM.to_string()))?;

  for path in &spec.attachments {
    // Blocking read; we only ever build a single message per process.
    let data = read(path).map_err(|source| Error::Attachment {
      path: path.clone(),
      source,
    })?;
    let name = attachment_name(path);

    #[cfg(feature = "tracing")]
    tracing::debug!(path = %path.display(), bytes = data.len(), "attaching file");

    parts = parts.singlepart(Attachment::new(name.clone()).body(data, octet_stream.clone()));
    let () = names.push(name);
  }

  let message = email.multipart(parts).map_err(Error::Build)?;
  Ok(EncodedMessage {
    message,
    attachments: names,
  })
}
