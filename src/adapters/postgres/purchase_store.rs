//! PostgreSQL implementation of PurchaseStore.
//!
//! One `sqlx::Transaction` per unit of work. Purchases are read with
//! `FOR UPDATE OF p` so concurrent notifications for the same purchase queue
//! behind each other. Counters are changed by single statements.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres};

use crate::domain::billing::{
    AggregateDetails, Currency, Item, ItemKind, NewPayment, OneTimeDetails, Payment, PaymentKind,
    PaymentStatus, Period, PeriodUnit, Processor, Product, ProlongDetails, Purchase,
    PurchaseDetails, ReminderCohort, ReminderQuery, ReminderThreshold, SubscriptionDetails,
    SubscriptionState, SubscriptionTerms, Transaction, TransactionKind,
};
use crate::domain::foundation::{
    DomainError, ErrorCode, ItemId, PaymentId, ProductId, PurchaseId, TransactionId,
};
use crate::ports::{NotificationRecord, PurchaseStore, PurchaseTransaction, SaveResult};

const SELECT_PURCHASE: &str = r#"
    SELECT p.id, p.variant, p.parent_id, p.payment_id, p.blocked, p.gratis, p.shipping, p.tax,
           p.reminders_sent, p.old_subscription_id, p.created_at, p.payment_status,
           p.subscription_state, p.due_payment_date, p.payment_deadline, p.subinvoice,
           p.subscription_reference, p.processor, p.email,
           p.prolonged_id, p.prolong_unit, p.prolong_count, p.aggregate_price,
           i.id AS item_id, i.quantity, i.currency, i.price, i.is_subscription,
           i.grace_unit, i.grace_count, i.payment_unit, i.payment_count,
           i.trial_unit, i.trial_count,
           pr.id AS product_id, pr.name AS product_name
    FROM purchases p
    JOIN items i ON i.id = p.item_id
    JOIN products pr ON pr.id = i.product_id
"#;

/// PostgreSQL implementation of the PurchaseStore port.
pub struct PostgresPurchaseStore {
    pool: PgPool,
}

impl PostgresPurchaseStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Rows
// ════════════════════════════════════════════════════════════════════════════════

/// Joined purchase, item and product row.
#[derive(Debug, sqlx::FromRow)]
struct PurchaseRow {
    id: i64,
    variant: String,
    parent_id: Option<i64>,
    payment_id: Option<i64>,
    blocked: bool,
    gratis: bool,
    shipping: Decimal,
    tax: Decimal,
    reminders_sent: i16,
    old_subscription_id: Option<i64>,
    created_at: DateTime<Utc>,
    payment_status: Option<String>,
    subscription_state: Option<String>,
    due_payment_date: Option<NaiveDate>,
    payment_deadline: Option<NaiveDate>,
    subinvoice: Option<i32>,
    subscription_reference: Option<String>,
    processor: Option<i16>,
    email: Option<String>,
    prolonged_id: Option<i64>,
    prolong_unit: Option<i16>,
    prolong_count: Option<i32>,
    aggregate_price: Option<Decimal>,
    item_id: i64,
    quantity: i32,
    currency: String,
    price: Decimal,
    is_subscription: bool,
    grace_unit: i16,
    grace_count: i32,
    payment_unit: i16,
    payment_count: i32,
    trial_unit: i16,
    trial_count: i32,
    product_id: i64,
    product_name: String,
}

fn corrupt(message: impl Into<String>) -> DomainError {
    DomainError::new(ErrorCode::DatabaseError, message)
}

fn required<T>(value: Option<T>, column: &str, id: i64) -> Result<T, DomainError> {
    value.ok_or_else(|| corrupt(format!("Purchase {} has no {}", id, column)))
}

fn parse_period(unit: i16, count: i32) -> Result<Period, DomainError> {
    Ok(Period::new(PeriodUnit::from_code(unit)?, count))
}

fn parse_payment_status(value: Option<String>, id: i64) -> Result<PaymentStatus, DomainError> {
    Ok(PaymentStatus::parse(&required(value, "payment_status", id)?)?)
}

impl TryFrom<PurchaseRow> for Purchase {
    type Error = DomainError;

    fn try_from(row: PurchaseRow) -> Result<Self, Self::Error> {
        let kind = if row.is_subscription {
            ItemKind::Subscription(SubscriptionTerms {
                grace_period: parse_period(row.grace_unit, row.grace_count)?,
                payment_period: parse_period(row.payment_unit, row.payment_count)?,
                trial_period: parse_period(row.trial_unit, row.trial_count)?,
            })
        } else {
            ItemKind::OneTime
        };
        let item = Item {
            id: ItemId::new(row.item_id),
            product: Product {
                id: ProductId::new(row.product_id),
                name: row.product_name,
            },
            quantity: row.quantity,
            currency: Currency::new(row.currency.trim())?,
            price: row.price,
            kind,
        };

        let details = match row.variant.as_str() {
            "simple" => PurchaseDetails::Simple(OneTimeDetails {
                status: parse_payment_status(row.payment_status, row.id)?,
            }),
            "subscription" => {
                let state = SubscriptionState::parse(&required(
                    row.subscription_state,
                    "subscription_state",
                    row.id,
                )?)?;
                PurchaseDetails::Subscription(SubscriptionDetails {
                    state,
                    due_payment_date: required(row.due_payment_date, "due_payment_date", row.id)?,
                    payment_deadline: row.payment_deadline,
                    subinvoice: row.subinvoice.unwrap_or(1),
                    subscription_reference: row.subscription_reference,
                    processor: row.processor.map(Processor::from_code).transpose()?,
                    email: row.email,
                })
            }
            "prolong" => PurchaseDetails::Prolong(ProlongDetails {
                status: parse_payment_status(row.payment_status, row.id)?,
                prolonged_id: PurchaseId::new(required(row.prolonged_id, "prolonged_id", row.id)?),
                period: parse_period(
                    required(row.prolong_unit, "prolong_unit", row.id)?,
                    required(row.prolong_count, "prolong_count", row.id)?,
                )?,
            }),
            "aggregate" => PurchaseDetails::Aggregate(AggregateDetails {
                status: parse_payment_status(row.payment_status, row.id)?,
                price: row.aggregate_price.unwrap_or(Decimal::ZERO),
            }),
            other => return Err(corrupt(format!("Invalid purchase variant: {}", other))),
        };

        Ok(Purchase {
            id: PurchaseId::new(row.id),
            item,
            parent_id: row.parent_id.map(PurchaseId::new),
            payment_id: row.payment_id.map(PaymentId::new),
            blocked: row.blocked,
            gratis: row.gratis,
            shipping: row.shipping,
            tax: row.tax,
            reminders_sent: row.reminders_sent,
            old_subscription_id: row.old_subscription_id.map(PurchaseId::new),
            created_at: row.created_at,
            details,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PaymentRow {
    id: i64,
    transaction_id: i64,
    payment_time: DateTime<Utc>,
    email: Option<String>,
    processor: Option<i16>,
    subscription_reference: Option<String>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = DomainError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        let kind = match (row.processor, row.subscription_reference) {
            (Some(processor), Some(subscription_reference)) => PaymentKind::Automatic {
                processor: Processor::from_code(processor)?,
                subscription_reference,
            },
            _ => PaymentKind::Simple,
        };
        Ok(Payment {
            id: PaymentId::new(row.id),
            transaction_id: TransactionId::new(row.transaction_id),
            payment_time: row.payment_time,
            email: row.email,
            kind,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: i64,
    processor: i16,
    created_at: DateTime<Utc>,
    purchase_id: i64,
    kind: String,
}

fn parse_transaction_kind(value: &str) -> Result<TransactionKind, DomainError> {
    match value {
        "one_time" => Ok(TransactionKind::OneTime),
        "subscription" => Ok(TransactionKind::Subscription),
        other => Err(corrupt(format!("Invalid transaction kind: {}", other))),
    }
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = DomainError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        Ok(Transaction {
            id: TransactionId::new(row.id),
            processor: Processor::from_code(row.processor)?,
            created_at: row.created_at,
            purchase_id: PurchaseId::new(row.purchase_id),
            kind: parse_transaction_kind(&row.kind)?,
        })
    }
}

/// Variant columns written by `save_purchase`.
#[derive(Debug, Default, PartialEq)]
struct VariantColumns<'a> {
    payment_status: Option<&'static str>,
    subscription_state: Option<&'static str>,
    due_payment_date: Option<NaiveDate>,
    payment_deadline: Option<NaiveDate>,
    subscription_reference: Option<&'a str>,
    processor: Option<i16>,
    email: Option<&'a str>,
    aggregate_price: Option<Decimal>,
}

impl<'a> VariantColumns<'a> {
    fn of(details: &'a PurchaseDetails) -> Self {
        match details {
            PurchaseDetails::Simple(d) => Self {
                payment_status: Some(d.status.as_str()),
                ..Self::default()
            },
            PurchaseDetails::Prolong(d) => Self {
                payment_status: Some(d.status.as_str()),
                ..Self::default()
            },
            PurchaseDetails::Aggregate(d) => Self {
                payment_status: Some(d.status.as_str()),
                aggregate_price: Some(d.price),
                ..Self::default()
            },
            PurchaseDetails::Subscription(d) => Self {
                subscription_state: Some(d.state.as_str()),
                due_payment_date: Some(d.due_payment_date),
                payment_deadline: d.payment_deadline,
                subscription_reference: d.subscription_reference.as_deref(),
                processor: d.processor.map(|p| p.code()),
                email: d.email.as_deref(),
                ..Self::default()
            },
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Store
// ════════════════════════════════════════════════════════════════════════════════

#[async_trait]
impl PurchaseStore for PostgresPurchaseStore {
    async fn begin(&self) -> Result<Box<dyn PurchaseTransaction>, DomainError> {
        let tx = self.pool.begin().await.map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Failed to begin transaction: {}", e))
        })?;
        Ok(Box::new(PostgresPurchaseTransaction { tx }))
    }

    async fn find_purchase(&self, id: PurchaseId) -> Result<Option<Purchase>, DomainError> {
        let row: Option<PurchaseRow> = sqlx::query_as(&format!("{} WHERE p.id = $1", SELECT_PURCHASE))
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| corrupt(format!("Failed to find purchase: {}", e)))?;

        row.map(Purchase::try_from).transpose()
    }

    async fn find_reminder_candidates(
        &self,
        query: &ReminderQuery,
    ) -> Result<Vec<Purchase>, DomainError> {
        let rows: Vec<PurchaseRow> = sqlx::query_as(&format!(
            r#"{}
            WHERE p.variant = 'subscription'
              AND NOT p.blocked
              AND NOT p.gratis
              AND p.subscription_state <> 'canceled'
              AND p.reminders_sent < $1
              AND (p.subscription_state = 'trial') = $2
              AND (CASE WHEN $3 THEN p.payment_deadline ELSE p.due_payment_date END) <= $4
            ORDER BY p.id
            "#,
            SELECT_PURCHASE
        ))
        .bind(query.threshold.level())
        .bind(query.cohort == ReminderCohort::Trial)
        .bind(query.threshold == ReminderThreshold::Deadline)
        .bind(query.cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| corrupt(format!("Failed to find reminder candidates: {}", e)))?;

        rows.into_iter().map(Purchase::try_from).collect()
    }

    async fn raise_reminder_level(&self, id: PurchaseId, level: i16) -> Result<bool, DomainError> {
        let result = sqlx::query(
            "UPDATE purchases SET reminders_sent = $2 WHERE id = $1 AND reminders_sent < $2",
        )
        .bind(id.as_i64())
        .bind(level)
        .execute(&self.pool)
        .await
        .map_err(|e| corrupt(format!("Failed to raise reminder level: {}", e)))?;

        Ok(result.rows_affected() == 1)
    }
}

/// Unit of work over one database transaction.
pub struct PostgresPurchaseTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl PurchaseTransaction for PostgresPurchaseTransaction {
    async fn find_transaction(
        &mut self,
        id: TransactionId,
    ) -> Result<Option<Transaction>, DomainError> {
        let row: Option<TransactionRow> = sqlx::query_as(
            "SELECT id, processor, created_at, purchase_id, kind FROM transactions WHERE id = $1",
        )
        .bind(id.as_i64())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| corrupt(format!("Failed to find transaction: {}", e)))?;

        row.map(Transaction::try_from).transpose()
    }

    async fn create_transaction(
        &mut self,
        purchase_id: PurchaseId,
        processor: Processor,
        kind: TransactionKind,
        created_at: DateTime<Utc>,
    ) -> Result<Transaction, DomainError> {
        let row: TransactionRow = sqlx::query_as(
            r#"
            INSERT INTO transactions (processor, created_at, purchase_id, kind)
            VALUES ($1, $2, $3, $4)
            RETURNING id, processor, created_at, purchase_id, kind
            "#,
        )
        .bind(processor.code())
        .bind(created_at)
        .bind(purchase_id.as_i64())
        .bind(kind.as_str())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| corrupt(format!("Failed to create transaction: {}", e)))?;

        Transaction::try_from(row)
    }

    async fn lock_purchase(&mut self, id: PurchaseId) -> Result<Option<Purchase>, DomainError> {
        let row: Option<PurchaseRow> =
            sqlx::query_as(&format!("{} WHERE p.id = $1 FOR UPDATE OF p", SELECT_PURCHASE))
                .bind(id.as_i64())
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(|e| corrupt(format!("Failed to lock purchase: {}", e)))?;

        row.map(Purchase::try_from).transpose()
    }

    async fn find_children(&mut self, parent_id: PurchaseId) -> Result<Vec<Purchase>, DomainError> {
        let rows: Vec<PurchaseRow> =
            sqlx::query_as(&format!("{} WHERE p.parent_id = $1 ORDER BY p.id", SELECT_PURCHASE))
                .bind(parent_id.as_i64())
                .fetch_all(&mut *self.tx)
                .await
                .map_err(|e| corrupt(format!("Failed to find child purchases: {}", e)))?;

        rows.into_iter().map(Purchase::try_from).collect()
    }

    async fn find_automatic_payment(
        &mut self,
        processor: Processor,
        reference: &str,
    ) -> Result<Option<Payment>, DomainError> {
        let row: Option<PaymentRow> = sqlx::query_as(
            r#"
            SELECT id, transaction_id, payment_time, email, processor, subscription_reference
            FROM payments
            WHERE processor = $1 AND subscription_reference = $2
            "#,
        )
        .bind(processor.code())
        .bind(reference)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| corrupt(format!("Failed to find payment: {}", e)))?;

        row.map(Payment::try_from).transpose()
    }

    async fn insert_payment(&mut self, payment: NewPayment) -> Result<Payment, DomainError> {
        let (processor, reference) = match &payment.kind {
            PaymentKind::Automatic {
                processor,
                subscription_reference,
            } => (Some(processor.code()), Some(subscription_reference.as_str())),
            PaymentKind::Simple => (None, None),
        };

        let row: PaymentRow = sqlx::query_as(
            r#"
            INSERT INTO payments (transaction_id, payment_time, email, processor, subscription_reference)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, transaction_id, payment_time, email, processor, subscription_reference
            "#,
        )
        .bind(payment.transaction_id.as_i64())
        .bind(payment.payment_time)
        .bind(&payment.email)
        .bind(processor)
        .bind(reference)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| corrupt(format!("Failed to insert payment: {}", e)))?;

        Payment::try_from(row)
    }

    async fn save_purchase(&mut self, purchase: &Purchase) -> Result<(), DomainError> {
        let columns = VariantColumns::of(&purchase.details);
        let result = sqlx::query(
            r#"
            UPDATE purchases SET
                parent_id = $2,
                payment_id = $3,
                blocked = $4,
                gratis = $5,
                shipping = $6,
                tax = $7,
                old_subscription_id = $8,
                payment_status = $9,
                subscription_state = $10,
                due_payment_date = $11,
                payment_deadline = $12,
                subscription_reference = $13,
                processor = $14,
                email = $15,
                aggregate_price = $16
            WHERE id = $1
            "#,
        )
        .bind(purchase.id.as_i64())
        .bind(purchase.parent_id.map(|id| id.as_i64()))
        .bind(purchase.payment_id.map(|id| id.as_i64()))
        .bind(purchase.blocked)
        .bind(purchase.gratis)
        .bind(purchase.shipping)
        .bind(purchase.tax)
        .bind(purchase.old_subscription_id.map(|id| id.as_i64()))
        .bind(columns.payment_status)
        .bind(columns.subscription_state)
        .bind(columns.due_payment_date)
        .bind(columns.payment_deadline)
        .bind(columns.subscription_reference)
        .bind(columns.processor)
        .bind(columns.email)
        .bind(columns.aggregate_price)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| corrupt(format!("Failed to save purchase: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::PurchaseNotFound,
                format!("Purchase {} not found", purchase.id),
            ));
        }
        Ok(())
    }

    async fn increment_subinvoice(&mut self, id: PurchaseId) -> Result<i32, DomainError> {
        let subinvoice: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE purchases SET subinvoice = subinvoice + 1
            WHERE id = $1 AND variant = 'subscription'
            RETURNING subinvoice
            "#,
        )
        .bind(id.as_i64())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| corrupt(format!("Failed to increment subinvoice: {}", e)))?;

        subinvoice.ok_or_else(|| {
            DomainError::new(
                ErrorCode::NotASubscription,
                format!("Purchase {} is not a subscription", id),
            )
        })
    }

    async fn reset_reminders(&mut self, id: PurchaseId) -> Result<(), DomainError> {
        sqlx::query("UPDATE purchases SET reminders_sent = 0 WHERE id = $1")
            .bind(id.as_i64())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| corrupt(format!("Failed to reset reminders: {}", e)))?;
        Ok(())
    }

    async fn record_notification(
        &mut self,
        record: NotificationRecord,
    ) -> Result<SaveResult, DomainError> {
        let result = sqlx::query(
            r#"
            INSERT INTO processed_notifications (key, kind, transaction_id, processed_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (key) DO NOTHING
            "#,
        )
        .bind(&record.key)
        .bind(&record.kind)
        .bind(record.transaction_id.as_i64())
        .bind(record.processed_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| corrupt(format!("Failed to record notification: {}", e)))?;

        if result.rows_affected() == 0 {
            Ok(SaveResult::AlreadyExists)
        } else {
            Ok(SaveResult::Inserted)
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        self.tx
            .commit()
            .await
            .map_err(|e| corrupt(format!("Failed to commit transaction: {}", e)))
    }

    async fn rollback(self: Box<Self>) -> Result<(), DomainError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| corrupt(format!("Failed to roll back transaction: {}", e)))
    }
}
