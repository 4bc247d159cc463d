//! Outbound email with the run's results.

use std::fs;
use std::path::{Path, PathBuf};

use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::{error, info};

use crate::error::PipelineError;
use crate::settings::Settings;

pub struct Notifier<'a> {
    settings: &'a Settings,
}

impl<'a> Notifier<'a> {
    pub fn new(settings: &'a Settings) -> Self {
        Self { settings }
    }

    /// Sends one email: the aggregate body, all summaries appended, and every
    /// generated audio/portfolio file attached.
    pub fn send(
        &self,
        body: &str,
        summaries: &[String],
        attachments: &[PathBuf],
    ) -> Result<(), PipelineError> {
        let recipients = self.settings.recipients();
        if recipients.is_empty() {
            return Err(PipelineError::Publish(
                "no email recipients configured".to_string(),
            ));
        }

        let mut full_body = body.to_string();
        if !summaries.is_empty() {
            full_body.push_str("\n\nSummaries:\n\n");
            full_body.push_str(&summaries.join("\n\n"));
        }

        let from: Mailbox = self
            .settings
            .email_from
            .parse()
            .map_err(|err| PipelineError::Publish(format!("invalid sender address: {err}")))?;
        let mut builder = Message::builder()
            .from(from)
            .subject(&self.settings.email_subject);
        for recipient in &recipients {
            let to: Mailbox = recipient.parse().map_err(|err| {
                PipelineError::Publish(format!("invalid recipient '{recipient}': {err}"))
            })?;
            builder = builder.to(to);
        }

        let mut multipart = MultiPart::mixed().singlepart(SinglePart::plain(full_body));
        for path in attachments {
            match attachment_part(path) {
                Ok(part) => multipart = multipart.singlepart(part),
                Err(err) => {
                    // A lost attachment should not lose the whole mail.
                    error!(file = %path.display(), error = %err, "skipping attachment");
                }
            }
        }

        let message = builder
            .multipart(multipart)
            .map_err(|err| PipelineError::Publish(format!("failed to build email: {err}")))?;

        let mailer = SmtpTransport::starttls_relay(&self.settings.smtp_host)
            .map_err(|err| PipelineError::Publish(format!("invalid SMTP relay: {err}")))?
            .port(self.settings.smtp_port)
            .credentials(Credentials::new(
                self.settings.smtp_user.clone(),
                self.settings.smtp_password.clone(),
            ))
            .build();
        mailer
            .send(&message)
            .map_err(|err| PipelineError::Publish(format!("failed to send email: {err}")))?;

        info!(recipients = recipients.len(), "results email sent");
        Ok(())
    }
}

fn attachment_part(path: &Path) -> Result<SinglePart, PipelineError> {
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("attachment")
        .to_string();
    let content = fs::read(path)?;
    let content_type = ContentType::parse("application/octet-stream")
        .map_err(|err| PipelineError::Publish(format!("invalid content type: {err}")))?;
    Ok(Attachment::new(filename).body(content, content_type))
}
