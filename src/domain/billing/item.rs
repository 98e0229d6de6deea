//! Products and sellable items.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::{ItemId, ProductId, ValidationError};

use super::period::Period;

/// Reference data describing what is sold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
}

/// ISO-4217 style three letter currency code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    pub fn new(code: impl Into<String>) -> Result<Self, ValidationError> {
        let code = code.into();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(ValidationError::invalid_format(
                "currency",
                format!("expected three uppercase letters, got '{}'", code),
            ));
        }
        Ok(Self(code))
    }

    pub fn usd() -> Self {
        Self("USD".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Currency {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Currency> for String {
    fn from(value: Currency) -> Self {
        value.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Billing terms of a recurring item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionTerms {
    /// How far `payment_deadline` lies after `due_payment_date`.
    pub grace_period: Period,
    /// How often an automatic payment is charged.
    pub payment_period: Period,
    /// Free period before the first charge. Zero disables trials.
    pub trial_period: Period,
}

impl Default for SubscriptionTerms {
    fn default() -> Self {
        Self {
            grace_period: Period::days(20),
            payment_period: Period::months(1),
            trial_period: Period::months(0),
        }
    }
}

/// Whether an item is sold once or on a recurring basis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemKind {
    OneTime,
    Subscription(SubscriptionTerms),
}

/// Something sold: a product, a quantity and a price.
///
/// For recurring items `price` is the amount of a single charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub product: Product,
    pub quantity: i32,
    pub currency: Currency,
    pub price: Decimal,
    pub kind: ItemKind,
}

impl Item {
    /// Creates a one-time item with the price rounded to cents.
    pub fn one_time(id: ItemId, product: Product, price: Decimal, currency: Currency) -> Self {
        Self {
            id,
            product,
            quantity: 1,
            currency,
            price: price.round_dp(2),
            kind: ItemKind::OneTime,
        }
    }

    /// Creates a recurring item with the price rounded to cents.
    pub fn subscription(
        id: ItemId,
        product: Product,
        price: Decimal,
        currency: Currency,
        terms: SubscriptionTerms,
    ) -> Self {
        Self {
            kind: ItemKind::Subscription(terms),
            ..Self::one_time(id, product, price, currency)
        }
    }

    pub fn is_subscription(&self) -> bool {
        matches!(self.kind, ItemKind::Subscription(_))
    }

    /// Billing terms, present only for recurring items.
    pub fn terms(&self) -> Option<&SubscriptionTerms> {
        match &self.kind {
            ItemKind::Subscription(terms) => Some(terms),
            ItemKind::OneTime => None,
        }
    }

    pub fn product_name(&self) -> &str {
        &self.product.name
    }
}
