//! Mock ports shared by the billing handler tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;

use crate::adapters::clock::FixedClock;
use crate::adapters::memory::InMemoryPurchaseStore;
use crate::domain::billing::{Currency, Payment, Purchase};
use crate::domain::foundation::DomainError;
use crate::ports::{
    EmailSender, EmailTemplate, NotificationVerifier, PaymentCallback, ProcessorClient,
    ProcessorError, Verification,
};

use super::lifecycle::SubscriptionLifecycle;

// ════════════════════════════════════════════════════════════════════════════════
// Processor
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Default)]
pub struct MockProcessor {
    fail_cancel: bool,
    fail_refund: bool,
    cancels: Mutex<Vec<(String, bool)>>,
    refunds: Mutex<Vec<(String, Option<Decimal>, String)>>,
}

impl MockProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_cancel() -> Self {
        Self {
            fail_cancel: true,
            ..Self::default()
        }
    }

    pub fn failing_refund() -> Self {
        Self {
            fail_refund: true,
            ..Self::default()
        }
    }

    pub fn cancels(&self) -> Vec<(String, bool)> {
        self.cancels.lock().unwrap().clone()
    }

    pub fn refunds(&self) -> Vec<(String, Option<Decimal>, String)> {
        self.refunds.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProcessorClient for MockProcessor {
    async fn cancel_agreement(&self, reference: &str, is_upgrade: bool) -> Result<(), ProcessorError> {
        self.cancels
            .lock()
            .unwrap()
            .push((reference.to_string(), is_upgrade));
        if self.fail_cancel {
            Err(ProcessorError::CannotCancel("Agreement not found".to_string()))
        } else {
            Ok(())
        }
    }

    async fn refund(
        &self,
        transaction_reference: &str,
        amount: Option<Decimal>,
        currency: &Currency,
    ) -> Result<(), ProcessorError> {
        self.refunds.lock().unwrap().push((
            transaction_reference.to_string(),
            amount,
            currency.to_string(),
        ));
        if self.fail_refund {
            Err(ProcessorError::CannotRefund("Refund refused".to_string()))
        } else {
            Ok(())
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Email
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Default)]
pub struct RecordingEmailSender {
    sent: Mutex<Vec<(EmailTemplate, String, serde_json::Value)>>,
}

impl RecordingEmailSender {
    pub fn sent(&self) -> Vec<(EmailTemplate, String, serde_json::Value)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn templates(&self) -> Vec<EmailTemplate> {
        self.sent().into_iter().map(|(template, _, _)| template).collect()
    }
}

#[async_trait]
impl EmailSender for RecordingEmailSender {
    async fn send(
        &self,
        template: EmailTemplate,
        recipient: &str,
        context: serde_json::Value,
    ) -> Result<(), DomainError> {
        self.sent
            .lock()
            .unwrap()
            .push((template, recipient.to_string(), context));
        Ok(())
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Verifier and callbacks
// ════════════════════════════════════════════════════════════════════════════════

pub struct StaticVerifier(pub Verification);

#[async_trait]
impl NotificationVerifier for StaticVerifier {
    async fn verify(&self, _raw_body: &[u8]) -> Result<Verification, DomainError> {
        Ok(self.0)
    }
}

#[derive(Default)]
pub struct RecordingCallback {
    events: Mutex<Vec<String>>,
}

impl RecordingCallback {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentCallback for RecordingCallback {
    async fn on_payment(&self, purchase: &Purchase, payment: &Payment) {
        self.events
            .lock()
            .unwrap()
            .push(format!("payment {} {}", purchase.id, payment.id));
    }

    async fn on_subscription_created(&self, purchase: &Purchase, reference: &str) {
        self.events
            .lock()
            .unwrap()
            .push(format!("created {} {}", purchase.id, reference));
    }

    async fn on_subscription_canceled(&self, purchase: &Purchase) {
        self.events
            .lock()
            .unwrap()
            .push(format!("canceled {}", purchase.id));
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Wiring
// ════════════════════════════════════════════════════════════════════════════════

pub fn clock_at(today: NaiveDate) -> Arc<FixedClock> {
    let midday = today.and_hms_opt(12, 0, 0).unwrap();
    Arc::new(FixedClock::new(Utc.from_utc_datetime(&midday)))
}

pub struct Harness {
    pub store: InMemoryPurchaseStore,
    pub processor: Arc<MockProcessor>,
    pub email: Arc<RecordingEmailSender>,
    pub clock: Arc<FixedClock>,
}

impl Harness {
    pub fn new(today: NaiveDate) -> Self {
        Self::with_processor(today, MockProcessor::new())
    }

    pub fn with_processor(today: NaiveDate, processor: MockProcessor) -> Self {
        Self {
            store: InMemoryPurchaseStore::new(),
            processor: Arc::new(processor),
            email: Arc::new(RecordingEmailSender::default()),
            clock: clock_at(today),
        }
    }

    pub fn lifecycle(&self) -> Arc<SubscriptionLifecycle> {
        Arc::new(SubscriptionLifecycle::new(
            Arc::new(self.store.clone()),
            self.processor.clone(),
            self.email.clone(),
            self.clock.clone(),
        ))
    }
}
