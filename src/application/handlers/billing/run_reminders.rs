//! RunRemindersHandler - Periodic job emailing customers whose payment is
//! due.
//!
//! Each subscription gets at most one reminder per threshold and billing
//! cycle. The level is raised with a compare-and-set before the email goes
//! out, so two overlapping runs never send the same reminder twice; an email
//! that then fails is not retried.

use std::sync::Arc;

use serde_json::json;

use crate::domain::billing::{
    BillingError, Purchase, ReminderCohort, ReminderQuery, ReminderThreshold,
};
use crate::ports::{Clock, EmailSender, EmailTemplate, PurchaseStore};

/// How far ahead the "due soon" reminder goes out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderSettings {
    pub days_before_due: u32,
    pub days_before_trial_end: u32,
}

impl Default for ReminderSettings {
    fn default() -> Self {
        Self {
            days_before_due: 10,
            days_before_trial_end: 10,
        }
    }
}

/// Counts of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunRemindersResult {
    pub sent: usize,
    /// Level raised but no email address on file.
    pub without_email: usize,
    pub failed: usize,
}

/// Handler for the reminder job.
pub struct RunRemindersHandler {
    store: Arc<dyn PurchaseStore>,
    email_sender: Arc<dyn EmailSender>,
    clock: Arc<dyn Clock>,
    settings: ReminderSettings,
}

fn template_for(threshold: ReminderThreshold) -> EmailTemplate {
    match threshold {
        ReminderThreshold::BeforeDue => EmailTemplate::BeforeDueRemind,
        ReminderThreshold::Due => EmailTemplate::DueRemind,
        ReminderThreshold::Deadline => EmailTemplate::DeadlineRemind,
    }
}

impl RunRemindersHandler {
    pub fn new(
        store: Arc<dyn PurchaseStore>,
        email_sender: Arc<dyn EmailSender>,
        clock: Arc<dyn Clock>,
        settings: ReminderSettings,
    ) -> Self {
        Self {
            store,
            email_sender,
            clock,
            settings,
        }
    }

    fn days_before(&self, cohort: ReminderCohort) -> u32 {
        match cohort {
            ReminderCohort::Trial => self.settings.days_before_trial_end,
            ReminderCohort::Regular => self.settings.days_before_due,
        }
    }

    pub async fn handle(&self) -> Result<RunRemindersResult, BillingError> {
        let today = self.clock.today();
        let mut result = RunRemindersResult::default();

        for cohort in ReminderCohort::ALL {
            let days_before = self.days_before(cohort);
            for threshold in ReminderThreshold::PROCESSING_ORDER {
                let query = ReminderQuery::new(threshold, cohort, today, days_before);
                let candidates = self.store.find_reminder_candidates(&query).await?;

                for purchase in candidates {
                    if !self
                        .store
                        .raise_reminder_level(purchase.id, threshold.level())
                        .await?
                    {
                        continue;
                    }
                    self.remind(&purchase, threshold, cohort, days_before, &mut result)
                        .await;
                }
            }
        }

        tracing::info!(
            sent = result.sent,
            without_email = result.without_email,
            failed = result.failed,
            "Reminder run finished"
        );
        Ok(result)
    }

    async fn remind(
        &self,
        purchase: &Purchase,
        threshold: ReminderThreshold,
        cohort: ReminderCohort,
        days_before: u32,
        result: &mut RunRemindersResult,
    ) {
        let Some(details) = purchase.subscription() else {
            return;
        };
        let Some(recipient) = details.email.as_deref() else {
            tracing::debug!(purchase_id = %purchase.id, "No email for reminder");
            result.without_email += 1;
            return;
        };

        let context = json!({
            "purchase_id": purchase.id.as_i64(),
            "product": purchase.item.product_name(),
            "due_date": details.due_payment_date.to_string(),
            "deadline": details.payment_deadline.map(|d| d.to_string()),
            "days_before": days_before,
            "trial": cohort == ReminderCohort::Trial,
        });

        match self
            .email_sender
            .send(template_for(threshold), recipient, context)
            .await
        {
            Ok(()) => {
                tracing::info!(
                    purchase_id = %purchase.id,
                    threshold = threshold.as_str(),
                    cohort = cohort.as_str(),
                    "Reminder sent"
                );
                result.sent += 1;
            }
            Err(e) => {
                tracing::error!(purchase_id = %purchase.id, error = %e, "Failed to send reminder");
                result.failed += 1;
            }
        }
    }
}
