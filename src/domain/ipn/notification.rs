//! Parsed PayPal instant payment notification.
//!
//! PayPal posts a flat `application/x-www-form-urlencoded` body. Field names
//! follow the IPN variable reference (`txn_type`, `payment_status`, `mc_gross`,
//! `subscr_id`, ...). Only the fields the engine reads get accessors.

use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

use crate::domain::billing::BillingError;
use crate::domain::foundation::ValidationError;

/// Errors raised while reading a notification body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotificationError {
    #[error("Malformed form body: {0}")]
    Malformed(String),

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Field '{field}' is not a decimal: '{value}'")]
    InvalidDecimal { field: &'static str, value: String },

    #[error("Unknown txn_type '{0}'")]
    UnknownType(String),
}

impl From<NotificationError> for BillingError {
    fn from(err: NotificationError) -> Self {
        match err {
            NotificationError::MissingField(field) => BillingError::MissingField(field),
            NotificationError::InvalidDecimal { field, value } => {
                ValidationError::invalid_format(field, format!("'{}' is not a decimal", value)).into()
            }
            other => ValidationError::invalid_format("notification", other.to_string()).into(),
        }
    }
}

/// What a notification asks the engine to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    /// `payment_status=Refunded`, whatever the `txn_type`.
    Refund,
    /// `web_accept`, `cart`, `express_checkout`.
    RegularPayment,
    /// `recurring_payment` (Express Checkout profiles).
    RecurringPayment,
    /// `subscr_payment` (Payments Standard subscriptions).
    SubscriptionPayment,
    /// `recurring_payment_profile_created`.
    RecurringSignup,
    /// `subscr_signup`.
    SubscriptionSignup,
    /// `recurring_payment_profile_cancel`, `recurring_payment_suspended`.
    RecurringCanceled,
    /// `subscr_cancel`.
    SubscriptionCanceled,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Refund => "refund",
            NotificationKind::RegularPayment => "regular_payment",
            NotificationKind::RecurringPayment => "recurring_payment",
            NotificationKind::SubscriptionPayment => "subscription_payment",
            NotificationKind::RecurringSignup => "recurring_signup",
            NotificationKind::SubscriptionSignup => "subscription_signup",
            NotificationKind::RecurringCanceled => "recurring_canceled",
            NotificationKind::SubscriptionCanceled => "subscription_canceled",
        }
    }

    fn from_txn_type(txn_type: &str) -> Result<Self, NotificationError> {
        match txn_type {
            "web_accept" | "cart" | "express_checkout" => Ok(NotificationKind::RegularPayment),
            "recurring_payment" => Ok(NotificationKind::RecurringPayment),
            "subscr_payment" => Ok(NotificationKind::SubscriptionPayment),
            "recurring_payment_profile_created" => Ok(NotificationKind::RecurringSignup),
            "subscr_signup" => Ok(NotificationKind::SubscriptionSignup),
            "recurring_payment_profile_cancel" | "recurring_payment_suspended" => {
                Ok(NotificationKind::RecurringCanceled)
            }
            "subscr_cancel" => Ok(NotificationKind::SubscriptionCanceled),
            other => Err(NotificationError::UnknownType(other.to_string())),
        }
    }

    /// Kinds that carry money and are only acted on once `Completed`.
    pub fn is_payment(&self) -> bool {
        matches!(
            self,
            NotificationKind::RegularPayment
                | NotificationKind::RecurringPayment
                | NotificationKind::SubscriptionPayment
        )
    }

    /// Kinds that deal with a recurring agreement.
    pub fn is_recurring(&self) -> bool {
        !matches!(self, NotificationKind::Refund | NotificationKind::RegularPayment)
    }

    /// Field holding the agreement id for recurring kinds.
    pub fn reference_field(&self) -> Option<&'static str> {
        match self {
            NotificationKind::RecurringPayment
            | NotificationKind::RecurringSignup
            | NotificationKind::RecurringCanceled => Some("recurring_payment_id"),
            NotificationKind::SubscriptionPayment
            | NotificationKind::SubscriptionSignup
            | NotificationKind::SubscriptionCanceled => Some("subscr_id"),
            NotificationKind::Refund | NotificationKind::RegularPayment => None,
        }
    }
}

/// Outcome of classifying a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Act(NotificationKind),
    /// A payment kind whose `payment_status` is not `Completed`.
    Ignore {
        kind: NotificationKind,
    },
}

/// A notification body as an ordered list of form fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    fields: Vec<(String, String)>,
}

impl Notification {
    /// Decodes a form-encoded body.
    pub fn from_form(body: &[u8]) -> Result<Self, NotificationError> {
        let fields: Vec<(String, String)> = serde_urlencoded::from_bytes(body)
            .map_err(|e| NotificationError::Malformed(e.to_string()))?;
        Ok(Self { fields })
    }

    pub fn from_pairs<K: Into<String>, V: Into<String>>(pairs: impl IntoIterator<Item = (K, V)>) -> Self {
        Self {
            fields: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    /// First value of `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn require(&self, name: &'static str) -> Result<&str, NotificationError> {
        self.get(name).ok_or(NotificationError::MissingField(name))
    }

    pub fn decimal(&self, name: &'static str) -> Result<Decimal, NotificationError> {
        let value = self.require(name)?;
        parse_decimal(name, value)
    }

    /// Decimal field that may be absent.
    pub fn optional_decimal(&self, name: &'static str) -> Result<Option<Decimal>, NotificationError> {
        self.get(name).map(|value| parse_decimal(name, value)).transpose()
    }

    pub fn receiver_email(&self) -> Option<&str> {
        self.get("receiver_email")
    }

    pub fn payer_email(&self) -> Option<&str> {
        self.get("payer_email").filter(|email| !email.is_empty())
    }

    pub fn custom(&self) -> Result<&str, NotificationError> {
        self.require("custom")
    }

    pub fn txn_id(&self) -> Option<&str> {
        self.get("txn_id").filter(|id| !id.is_empty())
    }

    /// `mc_currency`, else `currency_code` (recurring payment profiles).
    pub fn currency(&self) -> Result<&str, NotificationError> {
        self.get("mc_currency")
            .or_else(|| self.get("currency_code"))
            .ok_or(NotificationError::MissingField("mc_currency"))
    }

    /// Recurring agreement id for recurring kinds.
    pub fn agreement_reference(&self, kind: NotificationKind) -> Result<&str, NotificationError> {
        match kind.reference_field() {
            Some(field) => self.require(field),
            None => Err(NotificationError::MissingField("subscr_id")),
        }
    }

    /// Key of the processed-notification ledger: `txn_id`, else `ipn_track_id`.
    ///
    /// Signups and cancels carry no `txn_id`; PayPal resends them with the
    /// same `ipn_track_id`.
    pub fn ledger_key(&self) -> Option<String> {
        self.txn_id()
            .or_else(|| self.get("ipn_track_id").filter(|id| !id.is_empty()))
            .map(str::to_string)
    }

    /// Sorts the notification into a kind.
    ///
    /// `payment_status=Refunded` wins over `txn_type`. Payment kinds with any
    /// other status than `Completed` are ignored.
    pub fn classify(&self) -> Result<Classification, NotificationError> {
        let status = self.get("payment_status");
        if status == Some("Refunded") {
            return Ok(Classification::Act(NotificationKind::Refund));
        }
        let kind = NotificationKind::from_txn_type(self.require("txn_type")?)?;
        if kind.is_payment() && status != Some("Completed") {
            return Ok(Classification::Ignore { kind });
        }
        Ok(Classification::Act(kind))
    }
}

fn parse_decimal(field: &'static str, value: &str) -> Result<Decimal, NotificationError> {
    Decimal::from_str(value.trim()).map_err(|_| NotificationError::InvalidDecimal {
        field,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(pairs: &[(&str, &str)]) -> Notification {
        Notification::from_pairs(pairs.iter().copied())
    }

    // ══════════════════════════════════════════════════════════════
    // Parsing
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn parses_form_body() {
        let parsed =
            Notification::from_form(b"txn_type=web_accept&mc_gross=10.00&payer_email=a%40example.com")
                .unwrap();

        assert_eq!(parsed.get("txn_type"), Some("web_accept"));
        assert_eq!(parsed.decimal("mc_gross").unwrap(), Decimal::new(1000, 2));
        assert_eq!(parsed.payer_email(), Some("a@example.com"));
    }

    #[test]
    fn missing_and_bad_decimals_are_reported() {
        let parsed = notification(&[("mc_gross", "ten")]);

        assert_eq!(parsed.decimal("shipping"), Err(NotificationError::MissingField("shipping")));
        assert!(matches!(
            parsed.decimal("mc_gross"),
            Err(NotificationError::InvalidDecimal { field: "mc_gross", .. })
        ));
        assert_eq!(parsed.optional_decimal("tax"), Ok(None));
    }

    #[test]
    fn ledger_key_prefers_txn_id() {
        let both = notification(&[("txn_id", "T1"), ("ipn_track_id", "K1")]);
        let track_only = notification(&[("txn_id", ""), ("ipn_track_id", "K1")]);
        let neither = notification(&[]);

        assert_eq!(both.ledger_key().as_deref(), Some("T1"));
        assert_eq!(track_only.ledger_key().as_deref(), Some("K1"));
        assert_eq!(neither.ledger_key(), None);
    }

    // ══════════════════════════════════════════════════════════════
    // Classification
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn txn_types_map_to_kinds() {
        let cases = [
            ("web_accept", NotificationKind::RegularPayment),
            ("cart", NotificationKind::RegularPayment),
            ("express_checkout", NotificationKind::RegularPayment),
            ("recurring_payment", NotificationKind::RecurringPayment),
            ("subscr_payment", NotificationKind::SubscriptionPayment),
            ("recurring_payment_profile_created", NotificationKind::RecurringSignup),
            ("subscr_signup", NotificationKind::SubscriptionSignup),
            ("recurring_payment_profile_cancel", NotificationKind::RecurringCanceled),
            ("recurring_payment_suspended", NotificationKind::RecurringCanceled),
            ("subscr_cancel", NotificationKind::SubscriptionCanceled),
        ];
        for (txn_type, kind) in cases {
            let parsed = notification(&[("txn_type", txn_type), ("payment_status", "Completed")]);
            assert_eq!(parsed.classify(), Ok(Classification::Act(kind)), "{}", txn_type);
        }
    }

    #[test]
    fn refunded_status_wins_over_txn_type() {
        let parsed = notification(&[("txn_type", "subscr_payment"), ("payment_status", "Refunded")]);
        assert_eq!(parsed.classify(), Ok(Classification::Act(NotificationKind::Refund)));
    }

    #[test]
    fn pending_payment_is_ignored() {
        let parsed = notification(&[("txn_type", "web_accept"), ("payment_status", "Pending")]);
        assert_eq!(
            parsed.classify(),
            Ok(Classification::Ignore {
                kind: NotificationKind::RegularPayment
            })
        );
    }

    #[test]
    fn signup_without_payment_status_is_acted_on() {
        let parsed = notification(&[("txn_type", "subscr_signup")]);
        assert_eq!(
            parsed.classify(),
            Ok(Classification::Act(NotificationKind::SubscriptionSignup))
        );
    }

    #[test]
    fn unknown_txn_type_is_an_error() {
        let parsed = notification(&[("txn_type", "adjustment")]);
        assert_eq!(
            parsed.classify(),
            Err(NotificationError::UnknownType("adjustment".to_string()))
        );
    }

    #[test]
    fn reference_comes_from_kind_specific_field() {
        let parsed = notification(&[("subscr_id", "S-1"), ("recurring_payment_id", "I-1")]);

        assert_eq!(
            parsed.agreement_reference(NotificationKind::SubscriptionPayment),
            Ok("S-1")
        );
        assert_eq!(parsed.agreement_reference(NotificationKind::RecurringSignup), Ok("I-1"));
        assert!(parsed.agreement_reference(NotificationKind::RegularPayment).is_err());
    }
}
