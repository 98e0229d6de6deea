//! In-memory purchase store.
//!
//! Transactions are serialised: `begin` takes the store lock and works on a
//! copy of the state, `commit` writes the copy back. Dropping a transaction
//! releases the lock and discards its changes. Used by tests and local runs
//! without a database.
//!
//! Do not call store methods while holding a transaction from the same task;
//! they wait for the same lock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::billing::{
    NewPayment, Payment, PaymentKind, Processor, Purchase, ReminderQuery, Transaction,
    TransactionKind,
};
use crate::domain::foundation::{DomainError, ErrorCode, PaymentId, PurchaseId, TransactionId};
use crate::ports::{NotificationRecord, PurchaseStore, PurchaseTransaction, SaveResult};

#[derive(Debug, Clone, Default)]
struct State {
    purchases: BTreeMap<PurchaseId, Purchase>,
    transactions: BTreeMap<TransactionId, Transaction>,
    payments: BTreeMap<PaymentId, Payment>,
    ledger: HashMap<String, NotificationRecord>,
    last_transaction_id: i64,
    last_payment_id: i64,
}

fn purchase_not_found(id: PurchaseId) -> DomainError {
    DomainError::new(ErrorCode::PurchaseNotFound, format!("Purchase {} not found", id))
}

/// Purchase store kept in process memory.
#[derive(Clone, Default)]
pub struct InMemoryPurchaseStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryPurchaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    // === Seeding and inspection ===

    /// Stores a purchase as is, replacing one with the same id.
    pub async fn insert_purchase(&self, purchase: Purchase) {
        self.state.lock().await.purchases.insert(purchase.id, purchase);
    }

    /// Records a checkout for an existing purchase.
    pub async fn insert_transaction(
        &self,
        purchase_id: PurchaseId,
        kind: TransactionKind,
        created_at: DateTime<Utc>,
    ) -> Transaction {
        let mut state = self.state.lock().await;
        state.new_transaction(purchase_id, Processor::PayPal, kind, created_at)
    }

    pub async fn purchase(&self, id: PurchaseId) -> Option<Purchase> {
        self.state.lock().await.purchases.get(&id).cloned()
    }

    pub async fn payments(&self) -> Vec<Payment> {
        self.state.lock().await.payments.values().cloned().collect()
    }

    pub async fn processed_notifications(&self) -> usize {
        self.state.lock().await.ledger.len()
    }
}

impl State {
    fn new_transaction(
        &mut self,
        purchase_id: PurchaseId,
        processor: Processor,
        kind: TransactionKind,
        created_at: DateTime<Utc>,
    ) -> Transaction {
        self.last_transaction_id += 1;
        let transaction = Transaction {
            id: TransactionId::new(self.last_transaction_id),
            processor,
            created_at,
            purchase_id,
            kind,
        };
        self.transactions.insert(transaction.id, transaction.clone());
        transaction
    }
}

#[async_trait]
impl PurchaseStore for InMemoryPurchaseStore {
    async fn begin(&self) -> Result<Box<dyn PurchaseTransaction>, DomainError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryTransaction { guard, working }))
    }

    async fn find_purchase(&self, id: PurchaseId) -> Result<Option<Purchase>, DomainError> {
        Ok(self.purchase(id).await)
    }

    async fn find_reminder_candidates(
        &self,
        query: &ReminderQuery,
    ) -> Result<Vec<Purchase>, DomainError> {
        let state = self.state.lock().await;
        Ok(state
            .purchases
            .values()
            .filter(|purchase| query.matches(purchase))
            .cloned()
            .collect())
    }

    async fn raise_reminder_level(&self, id: PurchaseId, level: i16) -> Result<bool, DomainError> {
        let mut state = self.state.lock().await;
        let purchase = state.purchases.get_mut(&id).ok_or_else(|| purchase_not_found(id))?;
        if purchase.reminders_sent >= level {
            return Ok(false);
        }
        purchase.reminders_sent = level;
        Ok(true)
    }
}

/// Unit of work over a private copy of the store state.
pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<State>,
    working: State,
}

#[async_trait]
impl PurchaseTransaction for InMemoryTransaction {
    async fn find_transaction(
        &mut self,
        id: TransactionId,
    ) -> Result<Option<Transaction>, DomainError> {
        Ok(self.working.transactions.get(&id).cloned())
    }

    async fn create_transaction(
        &mut self,
        purchase_id: PurchaseId,
        processor: Processor,
        kind: TransactionKind,
        created_at: DateTime<Utc>,
    ) -> Result<Transaction, DomainError> {
        if !self.working.purchases.contains_key(&purchase_id) {
            return Err(purchase_not_found(purchase_id));
        }
        Ok(self.working.new_transaction(purchase_id, processor, kind, created_at))
    }

    async fn lock_purchase(&mut self, id: PurchaseId) -> Result<Option<Purchase>, DomainError> {
        Ok(self.working.purchases.get(&id).cloned())
    }

    async fn find_children(&mut self, parent_id: PurchaseId) -> Result<Vec<Purchase>, DomainError> {
        Ok(self
            .working
            .purchases
            .values()
            .filter(|purchase| purchase.parent_id == Some(parent_id))
            .cloned()
            .collect())
    }

    async fn find_automatic_payment(
        &mut self,
        processor: Processor,
        reference: &str,
    ) -> Result<Option<Payment>, DomainError> {
        Ok(self
            .working
            .payments
            .values()
            .find(|payment| {
                matches!(
                    &payment.kind,
                    PaymentKind::Automatic { processor: p, subscription_reference }
                        if *p == processor && subscription_reference == reference
                )
            })
            .cloned())
    }

    async fn insert_payment(&mut self, payment: NewPayment) -> Result<Payment, DomainError> {
        if let PaymentKind::Automatic {
            processor,
            subscription_reference,
        } = &payment.kind
        {
            if self
                .find_automatic_payment(*processor, subscription_reference)
                .await?
                .is_some()
            {
                return Err(DomainError::database(format!(
                    "Automatic payment for agreement {} already exists",
                    subscription_reference
                )));
            }
        }
        self.working.last_payment_id += 1;
        let payment = payment.into_payment(PaymentId::new(self.working.last_payment_id));
        self.working.payments.insert(payment.id, payment.clone());
        Ok(payment)
    }

    async fn save_purchase(&mut self, purchase: &Purchase) -> Result<(), DomainError> {
        let stored = self
            .working
            .purchases
            .get_mut(&purchase.id)
            .ok_or_else(|| purchase_not_found(purchase.id))?;

        let reminders_sent = stored.reminders_sent;
        let subinvoice = stored.subscription().map(|details| details.subinvoice);
        *stored = purchase.clone();
        stored.reminders_sent = reminders_sent;
        if let (Some(subinvoice), Some(details)) = (subinvoice, stored.subscription_mut()) {
            details.subinvoice = subinvoice;
        }
        Ok(())
    }

    async fn increment_subinvoice(&mut self, id: PurchaseId) -> Result<i32, DomainError> {
        let purchase = self
            .working
            .purchases
            .get_mut(&id)
            .ok_or_else(|| purchase_not_found(id))?;
        let details = purchase.subscription_mut().ok_or_else(|| {
            DomainError::new(
                ErrorCode::NotASubscription,
                format!("Purchase {} is not a subscription", id),
            )
        })?;
        details.subinvoice += 1;
        Ok(details.subinvoice)
    }

    async fn reset_reminders(&mut self, id: PurchaseId) -> Result<(), DomainError> {
        let purchase = self
            .working
            .purchases
            .get_mut(&id)
            .ok_or_else(|| purchase_not_found(id))?;
        purchase.reminders_sent = 0;
        Ok(())
    }

    async fn record_notification(
        &mut self,
        record: NotificationRecord,
    ) -> Result<SaveResult, DomainError> {
        if self.working.ledger.contains_key(&record.key) {
            return Ok(SaveResult::AlreadyExists);
        }
        self.working.ledger.insert(record.key.clone(), record);
        Ok(SaveResult::Inserted)
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        let InMemoryTransaction { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DomainError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::fixtures::*;

    async fn seeded() -> InMemoryPurchaseStore {
        let store = InMemoryPurchaseStore::new();
        store.insert_purchase(subscription(1, date(2024, 1, 31))).await;
        store
    }

    // ══════════════════════════════════════════════════════════════
    // Transactions
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn committed_changes_are_visible() {
        let store = seeded().await;
        let mut tx = store.begin().await.unwrap();
        let mut purchase = tx.lock_purchase(PurchaseId::new(1)).await.unwrap().unwrap();
        purchase.gratis = true;
        tx.save_purchase(&purchase).await.unwrap();
        tx.commit().await.unwrap();

        assert!(store.purchase(PurchaseId::new(1)).await.unwrap().gratis);
    }

    #[tokio::test]
    async fn dropped_transaction_discards_changes() {
        let store = seeded().await;
        {
            let mut tx = store.begin().await.unwrap();
            tx.increment_subinvoice(PurchaseId::new(1)).await.unwrap();
        }
        let stored = store.purchase(PurchaseId::new(1)).await.unwrap();
        assert_eq!(stored.subscription().unwrap().subinvoice, 1);
    }

    #[tokio::test]
    async fn rollback_discards_changes() {
        let store = seeded().await;
        let mut tx = store.begin().await.unwrap();
        tx.insert_payment(NewPayment::simple(TransactionId::new(1), Utc::now(), None))
            .await
            .unwrap();
        tx.rollback().await.unwrap();

        assert!(store.payments().await.is_empty());
    }

    // ══════════════════════════════════════════════════════════════
    // Counters
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn save_does_not_overwrite_counters() {
        let store = seeded().await;
        let mut tx = store.begin().await.unwrap();
        let stale = tx.lock_purchase(PurchaseId::new(1)).await.unwrap().unwrap();
        assert_eq!(tx.increment_subinvoice(PurchaseId::new(1)).await.unwrap(), 2);
        tx.save_purchase(&stale).await.unwrap();
        tx.commit().await.unwrap();

        let stored = store.purchase(PurchaseId::new(1)).await.unwrap();
        assert_eq!(stored.subscription().unwrap().subinvoice, 2);
    }

    #[tokio::test]
    async fn reminder_level_is_compare_and_set() {
        let store = seeded().await;

        assert!(store.raise_reminder_level(PurchaseId::new(1), 2).await.unwrap());
        assert!(!store.raise_reminder_level(PurchaseId::new(1), 2).await.unwrap());
        assert!(!store.raise_reminder_level(PurchaseId::new(1), 1).await.unwrap());
        assert!(store.raise_reminder_level(PurchaseId::new(1), 3).await.unwrap());
    }

    // ══════════════════════════════════════════════════════════════
    // Payments and ledger
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn automatic_payment_is_found_by_reference() {
        let store = seeded().await;
        let mut tx = store.begin().await.unwrap();
        let payment = tx
            .insert_payment(NewPayment::automatic(
                TransactionId::new(1),
                Utc::now(),
                None,
                Processor::PayPal,
                "I-1",
            ))
            .await
            .unwrap();

        let found = tx.find_automatic_payment(Processor::PayPal, "I-1").await.unwrap();
        assert_eq!(found, Some(payment));
        assert!(tx.find_automatic_payment(Processor::PayPal, "I-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ledger_detects_duplicates() {
        let store = seeded().await;
        let record = NotificationRecord {
            key: "T1".to_string(),
            kind: "regular_payment".to_string(),
            transaction_id: TransactionId::new(1),
            processed_at: Utc::now(),
        };
        let mut tx = store.begin().await.unwrap();

        assert_eq!(tx.record_notification(record.clone()).await.unwrap(), SaveResult::Inserted);
        assert_eq!(tx.record_notification(record).await.unwrap(), SaveResult::AlreadyExists);
    }

    #[tokio::test]
    async fn transaction_ids_increase() {
        let store = seeded().await;
        let first = store
            .insert_transaction(PurchaseId::new(1), TransactionKind::Subscription, Utc::now())
            .await;
        let mut tx = store.begin().await.unwrap();
        let second = tx
            .create_transaction(PurchaseId::new(1), Processor::PayPal, TransactionKind::Subscription, Utc::now())
            .await
            .unwrap();

        assert!(second.id > first.id);
        assert!(tx.create_transaction(PurchaseId::new(9), Processor::PayPal, TransactionKind::OneTime, Utc::now())
            .await
            .is_err());
    }
}
