//! PayPal Payments Standard form fields for starting a checkout.

use serde::Serialize;

use crate::domain::billing::{BillingError, Purchase};

/// PayPal truncates longer item names.
const MAX_ITEM_NAME: usize = 127;

const LIVE_URL: &str = "https://www.paypal.com/cgi-bin/webscr";
const SANDBOX_URL: &str = "https://www.sandbox.paypal.com/cgi-bin/webscr";

/// Merchant-wide values every form carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSettings {
    /// PayPal account id or business email.
    pub business: String,
    /// Absolute URL PayPal posts notifications to.
    pub notify_url: String,
    pub sandbox: bool,
}

/// A form to post to PayPal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutForm {
    pub action: String,
    pub fields: Vec<(String, String)>,
}

impl CheckoutForm {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Builds the form for `purchase`.
///
/// `custom` is the signed correlation token and `invoice` the transaction's
/// invoice id. Subscriptions use `_xclick-subscriptions` with an optional free
/// trial (`a1/p1/t1`) and the regular charge (`a3/p3/t3`); everything else is
/// a one-time `_xclick`.
pub fn checkout_form(
    settings: &CheckoutSettings,
    purchase: &Purchase,
    custom: String,
    invoice: String,
) -> Result<CheckoutForm, BillingError> {
    let item_name: String = purchase.item.product_name().chars().take(MAX_ITEM_NAME).collect();
    let mut fields = vec![
        ("business".to_string(), settings.business.clone()),
        (
            "cmd".to_string(),
            if purchase.is_subscription() {
                "_xclick-subscriptions"
            } else {
                "_xclick"
            }
            .to_string(),
        ),
        ("notify_url".to_string(), settings.notify_url.clone()),
        ("custom".to_string(), custom),
        ("invoice".to_string(), invoice),
        ("item_name".to_string(), item_name),
        ("currency_code".to_string(), purchase.item.currency.to_string()),
    ];

    if purchase.is_subscription() {
        let terms = purchase
            .item
            .terms()
            .ok_or(BillingError::NotASubscription(purchase.id))?;
        fields.push(("src".to_string(), "1".to_string()));
        if terms.trial_period.count > 0 {
            fields.push(("a1".to_string(), "0".to_string()));
            fields.push(("p1".to_string(), terms.trial_period.count.to_string()));
            fields.push(("t1".to_string(), terms.trial_period.unit.letter().to_string()));
        }
        fields.push(("a3".to_string(), (purchase.price() + purchase.shipping).to_string()));
        fields.push(("p3".to_string(), terms.payment_period.count.to_string()));
        fields.push(("t3".to_string(), terms.payment_period.unit.letter().to_string()));
    } else {
        fields.push(("amount".to_string(), purchase.price().to_string()));
        fields.push(("shipping".to_string(), purchase.shipping.to_string()));
        fields.push(("tax".to_string(), purchase.tax.to_string()));
        fields.push(("quantity".to_string(), purchase.item.quantity.to_string()));
    }

    let action = if settings.sandbox { SANDBOX_URL } else { LIVE_URL };
    Ok(CheckoutForm {
        action: action.to_string(),
        fields,
    })
}
