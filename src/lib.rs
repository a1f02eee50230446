// Copyright (C) 2024 Daniel Mueller <deso@posteo.net>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Sending of one-shot email notifications, with attachments, over
//! SMTP.

#![allow(
  clippy::collapsible_else_if,
  clippy::collapsible_if,
  clippy::fn_to_numeric_cast,
  clippy::let_and_return,
  clippy::let_unit_value
)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod config;
mod error;
mod message;
mod transport;

pub use lettre::message::Mailbox;

#[cfg(feature = "config")]
#[cfg_attr(docsrs, doc(cfg(feature = "config")))]
pub use crate::config::system_config;
#[cfg(feature = "config")]
#[cfg_attr(docsrs, doc(cfg(feature = "config")))]
pub use crate::config::system_config_path;
pub use crate::config::Auth;
#[cfg(feature = "config")]
#[cfg_attr(docsrs, doc(cfg(feature = "config")))]
pub use crate::config::Config;
#[cfg(feature = "config")]
#[cfg_attr(docsrs, doc(cfg(feature = "config")))]
pub use crate::config::SmtpConfig;
pub use crate::config::SmtpMode;
pub use crate::config::TransportConfig;
pub use crate::config::DEFAULT_TIMEOUT;
pub use crate::error::Error;
pub use crate::error::ErrorKind;
pub use crate::message::build_message;
pub use crate::message::parse_mailbox;
pub use crate::message::parse_mailboxes;
pub use crate::message::Body;
pub use crate::message::BodyFormat;
pub use crate::message::EncodedMessage;
pub use crate::message::MessageSpec;
pub use crate::transport::send;
pub use crate::transport::Outcome;
pub use crate::transport::RunResult;
pub use crate::transport::SendOpts;
