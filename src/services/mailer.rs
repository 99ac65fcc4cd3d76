// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Sign-in email delivery over SMTP.

use crate::config::SmtpConfig;
use chrono::{DateTime, Utc};
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::sync::Arc;
use std::time::Duration;

const SENDER_NAME: &str = "Zotpool";

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("could not build message: {0}")]
    Message(#[from] lettre::error::Error),
    #[error("SMTP delivery failed: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("SMTP delivery timed out after {0:?}")]
    Timeout(Duration),
}

/// Sends sign-in links. Without SMTP settings links are only logged.
#[derive(Clone)]
pub struct Mailer {
    transport: Option<Arc<AsyncSmtpTransport<Tokio1Executor>>>,
    from: Option<Mailbox>,
    timeout: Duration,
}

impl Mailer {
    /// `timeout` bounds each delivery, connection included.
    pub fn new(smtp: Option<&SmtpConfig>, timeout: Duration) -> Result<Self, MailError> {
        let Some(smtp) = smtp else {
            tracing::warn!("SMTP not configured; sign-in links will only be logged");
            return Ok(Self::log_only());
        };

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)?
            .port(smtp.port)
            .credentials(Credentials::new(smtp.user.clone(), smtp.pass.clone()))
            .timeout(Some(timeout))
            .build();
        let from = Mailbox::new(Some(SENDER_NAME.to_string()), smtp.from.parse()?);

        tracing::info!(host = %smtp.host, port = smtp.port, "SMTP mailer initialized");
        Ok(Self {
            transport: Some(Arc::new(transport)),
            from: Some(from),
            timeout,
        })
    }

    pub fn log_only() -> Self {
        Self {
            transport: None,
            from: None,
            timeout: Duration::ZERO,
        }
    }

    /// Email a sign-in link to `to`.
    pub async fn send_sign_in_link(
        &self,
        to: &str,
        link: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), MailError> {
        let (Some(transport), Some(from)) = (&self.transport, &self.from) else {
            tracing::info!(email = %to, link = %link, "Sign-in link (email delivery disabled)");
            return Ok(());
        };

        let message = Message::builder()
            .from(from.clone())
            .to(Mailbox::new(None, to.parse()?))
            .subject("Your Zotpool sign-in link")
            .multipart(MultiPart::alternative_plain_html(
                plain_body(link, expires_at),
                html_body(link, expires_at),
            ))?;

        tokio::time::timeout(self.timeout, transport.send(message))
            .await
            .map_err(|_| MailError::Timeout(self.timeout))??;
        tracing::info!(email = %to, "Sign-in link sent");
        Ok(())
    }
}

fn plain_body(link: &str, expires_at: DateTime<Utc>) -> String {
    format!(
        "Sign in to Zotpool by opening this link:\n\n{}\n\nThe link works once and expires at {}.\n\
         If you did not request it, you can ignore this email.\n",
        link,
        expires_at.format("%Y-%m-%d %H:%M UTC")
    )
}

fn html_body(link: &str, expires_at: DateTime<Utc>) -> String {
    format!(
        "<p>Sign in to Zotpool:</p>\
         <p><a href=\"{link}\">Sign in</a></p>\
         <p>The link works once and expires at {}.</p>\
         <p>If you did not request it, you can ignore this email.</p>",
        expires_at.format("%Y-%m-%d %H:%M UTC")
    )
}
