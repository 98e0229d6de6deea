use async_trait::async_trait;

use crate::domain::foundation::DomainError;
use crate::ports::{EmailSender, EmailTemplate};

/// Email sender that only logs what would have been sent.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEmailSender;

#[async_trait]
impl EmailSender for LoggingEmailSender {
    async fn send(
        &self,
        template: EmailTemplate,
        recipient: &str,
        context: serde_json::Value,
    ) -> Result<(), DomainError> {
        tracing::info!(
            template = template.id(),
            recipient = %recipient,
            context = %context,
            "Email not sent (logging sender)"
        );
        Ok(())
    }
}
