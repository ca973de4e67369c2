use async_trait::async_trait;
use tracing::info;

use super::hooks::HookCommand;
use super::{MailMessage, Mailer};
use crate::error::CollaboratorError;

/// Hands RFC 5322 messages to a sendmail-style command on stdin
pub struct CommandMailer {
    command: Option<HookCommand>,
}

impl CommandMailer {
    pub fn new(command: Option<HookCommand>) -> Self {
        Self { command }
    }
}

fn render(message: &MailMessage) -> String {
    format!(
        "From: {}\nTo: {}\nSubject: {}\nContent-Type: text/plain; charset=utf-8\n\n{}\n",
        message.from, message.to, message.subject, message.body
    )
}

#[async_trait]
impl Mailer for CommandMailer {
    async fn send(&self, message: &MailMessage) -> Result<(), CollaboratorError> {
        let command = self
            .command
            .as_ref()
            .ok_or(CollaboratorError::NotConfigured("mail"))?;

        command
            .run(&[], Some(render(message).as_bytes()))
            .await?;

        info!(to = %message.to, subject = %message.subject, "Sent mail");
        Ok(())
    }
}
