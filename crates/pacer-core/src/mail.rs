//! Mail sending on top of the dispatcher.
//!
//! One task per outbound message. The mailer never looks at whether the task ran or how long
//! the dispatcher is pausing; delivery problems only show up in the logs.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::dispatcher::Dispatcher;
use crate::error::TaskError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

/// Blocking mail transport (SMTP client, HTTP mail API, ...).
pub trait MailTransport: Send + Sync {
    fn send(&self, message: &MailMessage) -> Result<(), TaskError>;
}

/// Transport that only logs. For development and demos.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTransport;

impl MailTransport for LogTransport {
    fn send(&self, message: &MailMessage) -> Result<(), TaskError> {
        info!(
            from = %message.from,
            to = %message.to,
            subject = %message.subject,
            body_len = message.html_body.len(),
            "mail sent (log transport)"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfirmationCodeKind {
    Registration,
    Login,
    PasswordReset,
}

impl ConfirmationCodeKind {
    pub fn subject(self) -> &'static str {
        match self {
            ConfirmationCodeKind::Registration => "Registration confirmation code",
            ConfirmationCodeKind::Login => "Login code",
            ConfirmationCodeKind::PasswordReset => "Password reset code",
        }
    }
}

impl fmt::Display for ConfirmationCodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.subject())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MailError {
    #[error("recipient address is empty")]
    EmptyRecipient,

    #[error("confirmation code is empty")]
    EmptyCode,
}

/// Builds messages and hands them to the dispatcher.
pub struct Mailer {
    dispatcher: Arc<Dispatcher>,
    transport: Arc<dyn MailTransport>,
    from: String,
    site_url: String,
}

impl Mailer {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        transport: Arc<dyn MailTransport>,
        from: impl Into<String>,
        site_url: impl Into<String>,
    ) -> Self {
        Self {
            dispatcher,
            transport,
            from: from.into(),
            site_url: site_url.into(),
        }
    }

    /// Queue one message on the normal lane.
    ///
    /// `Ok` only means the message was well-formed; it may still be dropped if the
    /// dispatcher is not running.
    pub fn send_email(&self, to: &str, subject: &str, html_body: String) -> Result<(), MailError> {
        let message = self.message(to, subject, html_body)?;
        let transport = Arc::clone(&self.transport);
        self.dispatcher.submit(move || transport.send(&message));
        Ok(())
    }

    /// Queue one message on the low lane (newsletters, digests, ...).
    pub fn send_email_low_priority(
        &self,
        to: &str,
        subject: &str,
        html_body: String,
    ) -> Result<(), MailError> {
        let message = self.message(to, subject, html_body)?;
        let transport = Arc::clone(&self.transport);
        self.dispatcher
            .submit_low_priority(move || transport.send(&message));
        Ok(())
    }

    pub fn send_confirmation_code(
        &self,
        to: &str,
        code: &str,
        kind: ConfirmationCodeKind,
    ) -> Result<(), MailError> {
        if code.trim().is_empty() {
            return Err(MailError::EmptyCode);
        }
        let body = render_confirmation_body(code, &self.site_url);
        self.send_email(to, kind.subject(), body)
    }

    fn message(
        &self,
        to: &str,
        subject: &str,
        html_body: String,
    ) -> Result<MailMessage, MailError> {
        let to = to.trim();
        if to.is_empty() {
            return Err(MailError::EmptyRecipient);
        }
        Ok(MailMessage {
            from: self.from.clone(),
            to: to.to_string(),
            subject: subject.to_string(),
            html_body,
        })
    }
}

fn render_confirmation_body(code: &str, site_url: &str) -> String {
    let code = escape_html(code);
    let site_url = escape_html(site_url);
    format!(
        "<html><body>\
         <p>Your confirmation code:</p>\
         <h2>{code}</h2>\
         <p>If you did not request this code, ignore this message.</p>\
         <p><a href=\"{site_url}\">{site_url}</a></p>\
         </body></html>"
    )
}

/// Escapes text for use in element content and in double-quoted attribute values.
fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
