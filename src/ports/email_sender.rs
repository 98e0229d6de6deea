//! EmailSender port - Renders and delivers customer emails.

use async_trait::async_trait;

use crate::domain::foundation::DomainError;

/// Emails the billing engine sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmailTemplate {
    SubscriptionCanceled,
    BeforeDueRemind,
    DueRemind,
    DeadlineRemind,
}

impl EmailTemplate {
    /// Template identifier passed to the renderer.
    pub fn id(&self) -> &'static str {
        match self {
            EmailTemplate::SubscriptionCanceled => "subscription-canceled",
            EmailTemplate::BeforeDueRemind => "before-due-remind",
            EmailTemplate::DueRemind => "due-remind",
            EmailTemplate::DeadlineRemind => "deadline-remind",
        }
    }

    pub fn subject(&self) -> &'static str {
        match self {
            EmailTemplate::SubscriptionCanceled => "Your subscription was canceled",
            EmailTemplate::BeforeDueRemind => "Your subscription payment is due soon",
            EmailTemplate::DueRemind => "Your subscription payment is due",
            EmailTemplate::DeadlineRemind => "Your subscription payment is overdue",
        }
    }
}

/// Port for outgoing email.
///
/// `context` is the data handed to the template (product name, dates,
/// amounts).
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(
        &self,
        template: EmailTemplate,
        recipient: &str,
        context: serde_json::Value,
    ) -> Result<(), DomainError>;
}
