//! PurchaseStore port - Transactional storage for purchases and payments.
//!
//! Every notification is applied inside one [`PurchaseTransaction`]: the
//! purchase row is locked, payments are inserted, counters are bumped and the
//! processed-notification ledger is written, then everything commits or rolls
//! back together.
//!
//! Counter updates (`subinvoice`, `reminders_sent`) are done by storage
//! statements rather than read-modify-write in the caller, so two writers can
//! never lose an increment or send the same reminder twice.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::billing::{
    NewPayment, Payment, Processor, Purchase, ReminderQuery, Transaction, TransactionKind,
};
use crate::domain::foundation::{DomainError, PurchaseId, TransactionId};

/// Result of writing to the processed-notification ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveResult {
    /// First time this notification is seen.
    Inserted,
    /// Another delivery of the same notification was already applied.
    AlreadyExists,
}

/// Entry in the processed-notification ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRecord {
    /// `txn_id` or `ipn_track_id` of the notification.
    pub key: String,
    /// Kind the engine classified it as.
    pub kind: String,
    pub transaction_id: TransactionId,
    pub processed_at: DateTime<Utc>,
}

/// Port for purchase storage.
///
/// Reads and updates that belong to a notification go through [`begin`];
/// the reminder scheduler uses the standalone query and compare-and-set.
///
/// [`begin`]: PurchaseStore::begin
#[async_trait]
pub trait PurchaseStore: Send + Sync {
    /// Starts a unit of work.
    async fn begin(&self) -> Result<Box<dyn PurchaseTransaction>, DomainError>;

    /// Reads a purchase without locking it.
    async fn find_purchase(&self, id: PurchaseId) -> Result<Option<Purchase>, DomainError>;

    /// Subscriptions matching a reminder query.
    async fn find_reminder_candidates(
        &self,
        query: &ReminderQuery,
    ) -> Result<Vec<Purchase>, DomainError>;

    /// Raises `reminders_sent` to `level` if it is currently lower.
    ///
    /// Returns `false` when another run already reached `level`.
    async fn raise_reminder_level(&self, id: PurchaseId, level: i16) -> Result<bool, DomainError>;
}

/// One atomic unit of work against the purchase store.
///
/// Dropping a transaction without calling [`commit`] discards its changes.
///
/// [`commit`]: PurchaseTransaction::commit
#[async_trait]
pub trait PurchaseTransaction: Send {
    async fn find_transaction(
        &mut self,
        id: TransactionId,
    ) -> Result<Option<Transaction>, DomainError>;

    /// Records a new checkout for `purchase_id`.
    async fn create_transaction(
        &mut self,
        purchase_id: PurchaseId,
        processor: Processor,
        kind: TransactionKind,
        created_at: DateTime<Utc>,
    ) -> Result<Transaction, DomainError>;

    /// Reads a purchase and locks its row until the end of the transaction.
    async fn lock_purchase(&mut self, id: PurchaseId) -> Result<Option<Purchase>, DomainError>;

    /// Purchases whose parent is `parent_id`.
    async fn find_children(&mut self, parent_id: PurchaseId) -> Result<Vec<Purchase>, DomainError>;

    /// The automatic payment recorded for a processor agreement, if any.
    async fn find_automatic_payment(
        &mut self,
        processor: Processor,
        reference: &str,
    ) -> Result<Option<Payment>, DomainError>;

    async fn insert_payment(&mut self, payment: NewPayment) -> Result<Payment, DomainError>;

    /// Writes the purchase back.
    ///
    /// `subinvoice` and `reminders_sent` are not written; they only change
    /// through their dedicated statements.
    async fn save_purchase(&mut self, purchase: &Purchase) -> Result<(), DomainError>;

    /// Atomically adds one to a subscription's `subinvoice` and returns the
    /// new value.
    async fn increment_subinvoice(&mut self, id: PurchaseId) -> Result<i32, DomainError>;

    /// Sets `reminders_sent` to zero for a new billing cycle.
    async fn reset_reminders(&mut self, id: PurchaseId) -> Result<(), DomainError>;

    /// Inserts a ledger entry unless its key is already present.
    async fn record_notification(
        &mut self,
        record: NotificationRecord,
    ) -> Result<SaveResult, DomainError>;

    async fn commit(self: Box<Self>) -> Result<(), DomainError>;

    async fn rollback(self: Box<Self>) -> Result<(), DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purchase_store_is_object_safe() {
        fn _accepts_dyn(_store: &dyn PurchaseStore) {}
    }

    #[test]
    fn purchase_transaction_is_object_safe() {
        fn _accepts_dyn(_tx: Box<dyn PurchaseTransaction>) {}
    }

    #[test]
    fn save_results_are_distinct() {
        assert_ne!(SaveResult::Inserted, SaveResult::AlreadyExists);
    }
}
